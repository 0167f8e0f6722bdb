use std::sync::Arc;
use std::time::Instant;

use artgen_contracts::generation::{GeneratedImage, GenerationRequest, ImageSize};
use artgen_contracts::ImageError;
use tracing::{error, info, warn};

use crate::provider::ImageProvider;

/// Validates generation input and forwards it to the configured provider.
#[derive(Clone)]
pub struct GenerationClient {
    provider: Arc<dyn ImageProvider>,
}

impl GenerationClient {
    pub fn new(provider: Arc<dyn ImageProvider>) -> Self {
        Self { provider }
    }

    pub fn provider_name(&self) -> &str {
        self.provider.name()
    }

    /// Blank prompts are rejected before the provider is touched; unknown
    /// size tokens fall back to `1024x1024`.
    pub fn generate(&self, prompt: &str, size: Option<&str>) -> Result<GeneratedImage, ImageError> {
        let mut warnings = Vec::new();
        let size = ImageSize::normalize(size, &mut warnings);
        for warning in &warnings {
            warn!(provider = self.provider.name(), "{warning}");
        }
        let request = GenerationRequest::new(prompt, size)?;

        let started = Instant::now();
        match self.provider.generate(&request) {
            Ok(mut image) => {
                image.prompt = request.prompt().to_string();
                info!(
                    provider = self.provider.name(),
                    size = %size,
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "image generated"
                );
                Ok(image)
            }
            Err(err) => {
                match &err {
                    ImageError::Upstream {
                        message,
                        code,
                        status,
                        ..
                    } => error!(
                        provider = self.provider.name(),
                        status,
                        code = code.as_deref().unwrap_or(""),
                        message = %message,
                        "provider rejected image generation"
                    ),
                    other => error!(
                        provider = self.provider.name(),
                        kind = %other.kind(),
                        error = %other,
                        "image generation failed"
                    ),
                }
                Err(err)
            }
        }
    }
}
