use std::fmt;

/// Failure taxonomy shared by the generation client, the acquisition
/// pipeline and the HTTP boundary.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ImageError {
    #[error("Not authenticated")]
    Auth,
    #[error("{0}")]
    Validation(String),
    #[error("{0}")]
    Configuration(String),
    /// The generation service answered with an error response.
    #[error("{provider} API Error: {message}")]
    Upstream {
        provider: String,
        message: String,
        code: Option<String>,
        status: u16,
    },
    #[error("{0}")]
    Download(String),
    #[error("{0}")]
    StorageNotFound(String),
    #[error("{0}")]
    StoreWrite(String),
    #[error("Error: {0}")]
    Unexpected(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Auth,
    Validation,
    Configuration,
    Upstream,
    Download,
    StorageNotFound,
    StoreWrite,
    Unexpected,
}

impl ImageError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub fn download(message: impl Into<String>) -> Self {
        Self::Download(message.into())
    }

    pub fn store_write(message: impl Into<String>) -> Self {
        Self::StoreWrite(message.into())
    }

    pub fn unexpected(message: impl Into<String>) -> Self {
        Self::Unexpected(message.into())
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Auth => ErrorKind::Auth,
            Self::Validation(_) => ErrorKind::Validation,
            Self::Configuration(_) => ErrorKind::Configuration,
            Self::Upstream { .. } => ErrorKind::Upstream,
            Self::Download(_) => ErrorKind::Download,
            Self::StorageNotFound(_) => ErrorKind::StorageNotFound,
            Self::StoreWrite(_) => ErrorKind::StoreWrite,
            Self::Unexpected(_) => ErrorKind::Unexpected,
        }
    }

    /// True when the provider rejected the request itself (4xx), as opposed
    /// to failing while serving it.
    pub fn is_client_rejection(&self) -> bool {
        matches!(self, Self::Upstream { status, .. } if (400..500).contains(status))
    }
}

impl ErrorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Auth => "auth",
            Self::Validation => "validation",
            Self::Configuration => "configuration",
            Self::Upstream => "upstream",
            Self::Download => "download",
            Self::StorageNotFound => "storage_not_found",
            Self::StoreWrite => "store_write",
            Self::Unexpected => "unexpected",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::{ErrorKind, ImageError};

    #[test]
    fn upstream_message_keeps_provider_text() {
        let err = ImageError::Upstream {
            provider: "OpenAI".to_string(),
            message: "Billing hard limit has been reached".to_string(),
            code: Some("billing_hard_limit_reached".to_string()),
            status: 400,
        };
        assert_eq!(
            err.to_string(),
            "OpenAI API Error: Billing hard limit has been reached"
        );
        assert_eq!(err.kind(), ErrorKind::Upstream);
        assert!(err.is_client_rejection());
    }

    #[test]
    fn server_side_upstream_failure_is_not_a_client_rejection() {
        let err = ImageError::Upstream {
            provider: "Stub".to_string(),
            message: "overloaded".to_string(),
            code: None,
            status: 503,
        };
        assert_eq!(err.to_string(), "Stub API Error: overloaded");
        assert!(!err.is_client_rejection());
        assert!(!ImageError::download("gone").is_client_rejection());
    }

    #[test]
    fn kind_names_are_stable() {
        assert_eq!(
            ImageError::StorageNotFound("x".to_string()).kind().to_string(),
            "storage_not_found"
        );
        assert_eq!(ImageError::Auth.kind().as_str(), "auth");
    }
}
