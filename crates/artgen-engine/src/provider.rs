use std::env;
use std::fmt;
use std::time::Duration;

use artgen_contracts::generation::{GeneratedImage, GenerationRequest};
use artgen_contracts::ImageError;
use backon::{BlockingRetryable, ExponentialBuilder};
use reqwest::blocking::{Client as HttpClient, Response as HttpResponse};
use serde_json::{json, Value};
use tracing::{debug, warn};

pub const DEFAULT_OPENAI_API_BASE: &str = "https://api.openai.com/v1";
pub const DEFAULT_OPENAI_MODEL: &str = "dall-e-3";
pub const DEFAULT_OPENAI_QUALITY: &str = "standard";

const ERROR_BODY_MAX_CHARS: usize = 512;
const REDACTED: &str = "[redacted]";
const UPSTREAM_NAME: &str = "OpenAI";

/// One outbound generation call per invocation.
pub trait ImageProvider: Send + Sync {
    fn name(&self) -> &str;
    fn generate(&self, request: &GenerationRequest) -> Result<GeneratedImage, ImageError>;
}

#[derive(Clone)]
pub struct OpenAiSettings {
    pub api_base: String,
    pub api_key: Option<String>,
    pub model: String,
    pub quality: String,
    pub timeout: Duration,
    /// Allow a single jittered retry when the request never reached the API.
    pub transport_retry: bool,
    pub retry_backoff: Duration,
}

impl Default for OpenAiSettings {
    fn default() -> Self {
        Self {
            api_base: DEFAULT_OPENAI_API_BASE.to_string(),
            api_key: None,
            model: DEFAULT_OPENAI_MODEL.to_string(),
            quality: DEFAULT_OPENAI_QUALITY.to_string(),
            timeout: Duration::from_secs(120),
            transport_retry: true,
            retry_backoff: Duration::from_millis(500),
        }
    }
}

impl OpenAiSettings {
    /// Reads the key from `key_var` and the base URL from `OPENAI_API_BASE`.
    pub fn from_env(key_var: &str) -> Self {
        let mut settings = Self::default();
        if let Some(api_base) = non_empty_env("OPENAI_API_BASE") {
            settings.api_base = api_base;
        }
        settings.api_key = non_empty_env(key_var);
        settings
    }
}

impl fmt::Debug for OpenAiSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OpenAiSettings")
            .field("api_base", &self.api_base)
            .field("api_key", &self.api_key.as_ref().map(|_| REDACTED))
            .field("model", &self.model)
            .field("quality", &self.quality)
            .field("timeout", &self.timeout)
            .field("transport_retry", &self.transport_retry)
            .finish()
    }
}

pub struct OpenAiProvider {
    settings: OpenAiSettings,
    http: HttpClient,
}

impl OpenAiProvider {
    pub fn new(mut settings: OpenAiSettings) -> Result<Self, ImageError> {
        settings.api_base = settings.api_base.trim().trim_end_matches('/').to_string();
        let http = HttpClient::builder()
            .timeout(settings.timeout)
            .build()
            .map_err(|err| ImageError::unexpected(format!("failed to build HTTP client: {err}")))?;
        Ok(Self { settings, http })
    }

    pub fn settings(&self) -> &OpenAiSettings {
        &self.settings
    }

    fn api_key(&self) -> Result<&str, ImageError> {
        self.settings
            .api_key
            .as_deref()
            .map(str::trim)
            .filter(|key| !key.is_empty())
            .ok_or_else(|| {
                ImageError::Configuration("OpenAI API Key not configured".to_string())
            })
    }

    fn payload(&self, request: &GenerationRequest) -> Value {
        json!({
            "model": self.settings.model,
            "prompt": request.prompt(),
            "size": request.size().as_str(),
            "quality": self.settings.quality,
            "n": 1,
            "response_format": "url",
        })
    }

    fn post_with_transport_retry(
        &self,
        endpoint: &str,
        api_key: &str,
        payload: &Value,
    ) -> Result<HttpResponse, ImageError> {
        let backoff = ExponentialBuilder::default()
            .with_min_delay(self.settings.retry_backoff)
            .with_max_times(usize::from(self.settings.transport_retry))
            .with_jitter();
        let send = || {
            self.http
                .post(endpoint)
                .bearer_auth(api_key)
                .json(payload)
                .send()
        };
        send.retry(backoff)
            .sleep(std::thread::sleep)
            .when(is_retryable_transport_error)
            .notify(|err: &reqwest::Error, delay: Duration| {
                warn!(
                    provider = "openai",
                    delay_ms = delay.as_millis() as u64,
                    error = %redact_secret(&err.to_string(), api_key),
                    "transport failure before reaching the API, retrying once"
                );
            })
            .call()
            .map_err(|err| {
                ImageError::unexpected(redact_secret(
                    &format!("OpenAI request failed ({endpoint}): {err}"),
                    api_key,
                ))
            })
    }
}

impl ImageProvider for OpenAiProvider {
    fn name(&self) -> &str {
        "openai"
    }

    fn generate(&self, request: &GenerationRequest) -> Result<GeneratedImage, ImageError> {
        let api_key = self.api_key()?;
        let endpoint = format!("{}/images/generations", self.settings.api_base);
        let payload = self.payload(request);
        debug!(
            provider = "openai",
            model = %self.settings.model,
            size = %request.size(),
            "requesting image generation"
        );

        let response = self.post_with_transport_retry(&endpoint, api_key, &payload)?;
        let status = response.status();
        let body = response.text().map_err(|err| {
            ImageError::unexpected(redact_secret(
                &format!("OpenAI response body read failed: {err}"),
                api_key,
            ))
        })?;
        if !status.is_success() {
            return Err(upstream_error(status.as_u16(), &body, api_key));
        }

        let parsed: Value = serde_json::from_str(&body)
            .map_err(|_| ImageError::unexpected("OpenAI returned invalid JSON payload"))?;
        let (source_url, revised_prompt) = extract_image_url(&parsed)?;
        Ok(GeneratedImage {
            source_url,
            prompt: request.prompt().to_string(),
            revised_prompt,
        })
    }
}

fn is_retryable_transport_error(err: &reqwest::Error) -> bool {
    err.is_timeout() || err.is_connect()
}

fn upstream_error(status: u16, body: &str, api_key: &str) -> ImageError {
    let parsed = serde_json::from_str::<Value>(body).ok();
    let error = parsed.as_ref().and_then(|value| value.get("error"));
    let message = error
        .and_then(|value| value.get("message"))
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|message| !message.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| {
            format!(
                "request failed ({status}): {}",
                truncate_text(body.trim(), ERROR_BODY_MAX_CHARS)
            )
        });
    let code = error
        .and_then(|value| value.get("code").filter(|code| !code.is_null()))
        .or_else(|| error.and_then(|value| value.get("type")))
        .and_then(Value::as_str)
        .map(str::to_string);
    ImageError::Upstream {
        provider: UPSTREAM_NAME.to_string(),
        message: redact_secret(&message, api_key),
        code,
        status,
    }
}

fn extract_image_url(payload: &Value) -> Result<(String, Option<String>), ImageError> {
    let first = payload
        .get("data")
        .and_then(Value::as_array)
        .and_then(|rows| rows.first())
        .and_then(Value::as_object)
        .ok_or_else(|| ImageError::unexpected("OpenAI response returned no images"))?;
    let url = first
        .get("url")
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|url| !url.is_empty())
        .ok_or_else(|| ImageError::unexpected("Invalid response from image generation service"))?;
    let revised_prompt = first
        .get("revised_prompt")
        .and_then(Value::as_str)
        .map(str::to_string);
    Ok((url.to_string(), revised_prompt))
}

fn redact_secret(text: &str, secret: &str) -> String {
    let secret = secret.trim();
    if secret.is_empty() {
        return text.to_string();
    }
    text.replace(secret, REDACTED)
}

fn truncate_text(value: &str, max_chars: usize) -> String {
    if value.chars().count() <= max_chars {
        return value.to_string();
    }
    value.chars().take(max_chars).collect::<String>() + "…"
}

fn non_empty_env(key: &str) -> Option<String> {
    env::var(key)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}
