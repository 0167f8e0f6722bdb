use std::io::Read;
use std::time::Duration;

use artgen_contracts::ImageError;
use reqwest::blocking::Client as HttpClient;
use reqwest::header::CONTENT_TYPE;

pub const DEFAULT_MAX_DOWNLOAD_BYTES: u64 = 32 * 1024 * 1024;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchedImage {
    pub bytes: Vec<u8>,
    pub mime_type: Option<String>,
}

pub trait ImageFetcher: Send + Sync {
    fn fetch(&self, url: &str) -> Result<FetchedImage, ImageError>;
}

/// Downloads generated images over HTTP(S).
pub struct HttpFetcher {
    http: HttpClient,
    max_bytes: u64,
}

impl HttpFetcher {
    pub fn new(timeout: Duration, max_bytes: u64) -> Result<Self, ImageError> {
        let http = HttpClient::builder()
            .timeout(timeout)
            .build()
            .map_err(|err| ImageError::unexpected(format!("failed to build HTTP client: {err}")))?;
        Ok(Self { http, max_bytes })
    }

    fn too_large(&self, size: u64) -> ImageError {
        ImageError::download(format!(
            "Image is too large ({size} bytes, limit {})",
            self.max_bytes
        ))
    }
}

impl ImageFetcher for HttpFetcher {
    fn fetch(&self, url: &str) -> Result<FetchedImage, ImageError> {
        let url = url.trim();
        if !(url.starts_with("https://") || url.starts_with("http://")) {
            return Err(ImageError::download("Unsupported image URL"));
        }

        let response = self.http.get(url).send().map_err(|err| {
            ImageError::download(format!("Failed to download image from URL: {err}"))
        })?;
        let status = response.status();
        if !status.is_success() {
            return Err(ImageError::download(format!(
                "Failed to download image from URL ({})",
                status.as_u16()
            )));
        }
        if let Some(length) = response.content_length() {
            if length > self.max_bytes {
                return Err(self.too_large(length));
            }
        }

        let mime_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string);
        // Chunked bodies carry no length; stop reading one byte past the cap.
        let mut bytes = Vec::new();
        response
            .take(self.max_bytes.saturating_add(1))
            .read_to_end(&mut bytes)
            .map_err(|err| ImageError::download(format!("failed reading image bytes: {err}")))?;
        if bytes.len() as u64 > self.max_bytes {
            return Err(ImageError::download(format!(
                "Image is too large (more than {} bytes)",
                self.max_bytes
            )));
        }
        if bytes.is_empty() {
            return Err(ImageError::download("Downloaded image is empty"));
        }
        Ok(FetchedImage { bytes, mime_type })
    }
}
