use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ImageError;

/// Output sizes accepted by the generation backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum ImageSize {
    #[default]
    #[serde(rename = "1024x1024")]
    Square,
    #[serde(rename = "1024x1792")]
    Portrait,
    #[serde(rename = "1792x1024")]
    Landscape,
}

impl ImageSize {
    pub const ALL: [ImageSize; 3] = [Self::Square, Self::Portrait, Self::Landscape];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Square => "1024x1024",
            Self::Portrait => "1024x1792",
            Self::Landscape => "1792x1024",
        }
    }

    pub fn dims(self) -> (u32, u32) {
        match self {
            Self::Square => (1024, 1024),
            Self::Portrait => (1024, 1792),
            Self::Landscape => (1792, 1024),
        }
    }

    /// Parses a size token, falling back to the default and recording a
    /// warning for anything outside the supported set.
    pub fn normalize(raw: Option<&str>, warnings: &mut Vec<String>) -> Self {
        let Some(raw) = raw.map(str::trim).filter(|value| !value.is_empty()) else {
            return Self::default();
        };
        match raw.parse() {
            Ok(size) => size,
            Err(_) => {
                warnings.push(format!(
                    "Unsupported size '{raw}'; using {}.",
                    Self::default().as_str()
                ));
                Self::default()
            }
        }
    }
}

impl FromStr for ImageSize {
    type Err = ImageError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let lowered = raw.trim().to_ascii_lowercase().replace(['×', '*'], "x");
        Self::ALL
            .into_iter()
            .find(|size| size.as_str() == lowered)
            .ok_or_else(|| {
                ImageError::validation(format!(
                    "invalid size '{raw}'; allowed: {}",
                    Self::ALL.map(Self::as_str).join(", ")
                ))
            })
    }
}

impl fmt::Display for ImageSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerationRequest {
    prompt: String,
    size: ImageSize,
}

impl GenerationRequest {
    pub fn new(prompt: &str, size: ImageSize) -> Result<Self, ImageError> {
        let prompt = prompt.trim();
        if prompt.is_empty() {
            return Err(ImageError::validation("Prompt is required"));
        }
        Ok(Self {
            prompt: prompt.to_string(),
            size,
        })
    }

    pub fn prompt(&self) -> &str {
        &self.prompt
    }

    pub fn size(&self) -> ImageSize {
        self.size
    }
}

/// A successful generation. `source_url` points into provider-hosted storage
/// and expires; download it within the same request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GeneratedImage {
    pub source_url: String,
    pub prompt: String,
    pub revised_prompt: Option<String>,
}
