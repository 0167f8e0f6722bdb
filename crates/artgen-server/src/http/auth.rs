//! Operator gate in front of every `/ai-images` route.

use std::sync::Arc;

use artgen_contracts::ImageError;
use axum::extract::{Request, State};
use axum::http::header::AUTHORIZATION;
use axum::http::HeaderMap;
use axum::middleware::Next;
use axum::response::Response;
use subtle::ConstantTimeEq;
use tracing::debug;

use super::error::ApiError;
use crate::state::AppState;

pub const OPERATOR_TOKEN_HEADER: &str = "x-operator-token";

/// Accepts a configured token either as `Authorization: Bearer <token>` or in
/// the `X-Operator-Token` header.
#[derive(Debug, Clone)]
pub struct OperatorGate {
    tokens: Arc<Vec<String>>,
    disabled: bool,
}

impl OperatorGate {
    pub fn new(tokens: Vec<String>) -> Self {
        Self {
            tokens: Arc::new(tokens),
            disabled: false,
        }
    }

    /// Lets every request through. Only for local development.
    pub fn open() -> Self {
        Self {
            tokens: Arc::new(Vec::new()),
            disabled: true,
        }
    }

    pub fn is_disabled(&self) -> bool {
        self.disabled
    }

    pub fn authorize(&self, headers: &HeaderMap) -> Result<(), ImageError> {
        if self.disabled {
            return Ok(());
        }
        let Some(presented) = presented_token(headers) else {
            debug!("request carries no operator token");
            return Err(ImageError::Auth);
        };
        // Compare against every token so timing does not reveal which one matched.
        let matched = self.tokens.iter().fold(false, |found, known| {
            let equal: bool = known.as_bytes().ct_eq(presented.as_bytes()).into();
            found | equal
        });
        if matched {
            Ok(())
        } else {
            debug!("operator token rejected");
            Err(ImageError::Auth)
        }
    }
}

fn presented_token(headers: &HeaderMap) -> Option<&str> {
    let bearer = headers
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(bearer_credentials)
        .filter(|token| !token.is_empty());
    let header = headers
        .get(OPERATOR_TOKEN_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|token| !token.is_empty());
    bearer.or(header)
}

/// Auth schemes are case-insensitive, so `bearer` and `BEARER` both count.
fn bearer_credentials(value: &str) -> Option<&str> {
    let (scheme, credentials) = value.trim().split_once(' ')?;
    scheme
        .eq_ignore_ascii_case("bearer")
        .then_some(credentials.trim())
}

pub(crate) async fn require_operator(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    state.gate().authorize(request.headers())?;
    Ok(next.run(request).await)
}
