//! Configuration for the artgen server and CLI.
//!
//! Loaded from a TOML file. Every section is optional and falls back to
//! defaults suitable for local development. Relative paths are resolved
//! against the directory containing the config file. Secrets never live in
//! the file; the OpenAI key is read from the variable named by
//! `generation.api_key_env`.

use std::collections::HashSet;
use std::fs;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use artgen_contracts::storage::{FolderPath, StorageRoot};
use artgen_engine::{
    DEFAULT_MAX_DOWNLOAD_BYTES, DEFAULT_OPENAI_MODEL, DEFAULT_OPENAI_QUALITY,
};
use serde::{Deserialize, Serialize};

pub const DEFAULT_BIND: &str = "127.0.0.1:8080";
pub const DEFAULT_FOLDER: &str = "user_upload/";
pub const DEFAULT_API_KEY_ENV: &str = "OPENAI_API_KEY";

/// Non-fatal findings from [`Config::validate`].
#[derive(Debug, Default)]
pub struct ValidationResult {
    pub warnings: Vec<String>,
}

impl ValidationResult {
    #[must_use]
    pub fn has_warnings(&self) -> bool {
        !self.warnings.is_empty()
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub auth: AuthConfig,
    #[serde(default)]
    pub generation: GenerationConfig,
    #[serde(default)]
    pub acquisition: AcquisitionConfig,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub fields: Vec<FieldConfig>,
    #[serde(default)]
    pub activity_log: Option<PathBuf>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: SocketAddr,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
        }
    }
}

fn default_bind() -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], 8080))
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct AuthConfig {
    #[serde(default)]
    pub disabled: bool,
    #[serde(default)]
    pub operator_tokens: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GenerationConfig {
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_quality")]
    pub quality: String,
    /// Overrides both the built-in base URL and `OPENAI_API_BASE`.
    #[serde(default)]
    pub api_base: Option<String>,
    #[serde(default = "default_generation_timeout")]
    pub timeout_secs: u64,
    #[serde(default = "default_true")]
    pub transport_retry: bool,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            api_key_env: default_api_key_env(),
            model: default_model(),
            quality: default_quality(),
            api_base: None,
            timeout_secs: default_generation_timeout(),
            transport_retry: true,
        }
    }
}

impl GenerationConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

fn default_api_key_env() -> String {
    DEFAULT_API_KEY_ENV.to_string()
}

fn default_model() -> String {
    DEFAULT_OPENAI_MODEL.to_string()
}

fn default_quality() -> String {
    DEFAULT_OPENAI_QUALITY.to_string()
}

fn default_generation_timeout() -> u64 {
    120
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Deserialize)]
pub struct AcquisitionConfig {
    #[serde(default = "default_scratch_dir")]
    pub scratch_dir: PathBuf,
    #[serde(default = "default_folder")]
    pub default_folder: String,
    #[serde(default = "default_download_timeout")]
    pub download_timeout_secs: u64,
    #[serde(default = "default_max_download_bytes")]
    pub max_download_bytes: u64,
}

impl Default for AcquisitionConfig {
    fn default() -> Self {
        Self {
            scratch_dir: default_scratch_dir(),
            default_folder: default_folder(),
            download_timeout_secs: default_download_timeout(),
            max_download_bytes: default_max_download_bytes(),
        }
    }
}

impl AcquisitionConfig {
    pub fn download_timeout(&self) -> Duration {
        Duration::from_secs(self.download_timeout_secs)
    }
}

fn default_scratch_dir() -> PathBuf {
    PathBuf::from("var/transient")
}

fn default_folder() -> String {
    DEFAULT_FOLDER.to_string()
}

fn default_download_timeout() -> u64 {
    60
}

fn default_max_download_bytes() -> u64 {
    DEFAULT_MAX_DOWNLOAD_BYTES
}

#[derive(Debug, Clone, Deserialize)]
pub struct StoreConfig {
    #[serde(default = "default_index_path")]
    pub index_path: PathBuf,
    #[serde(default)]
    pub storages: Vec<StorageRoot>,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            index_path: default_index_path(),
            storages: Vec::new(),
        }
    }
}

fn default_index_path() -> PathBuf {
    PathBuf::from("var/file-index.json")
}

/// A record field the editor offers AI generation for.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldConfig {
    pub table: String,
    pub column: String,
}

impl Config {
    /// Load and validate the config at `path`. Relative paths
    /// in the file are rebased onto the file's directory.
    ///
    /// # Errors
    ///
    /// Fails when the file cannot be read, is not valid TOML or does not pass
    /// [`Config::validate`].
    pub fn load_from<P: AsRef<Path>>(path: P) -> Result<(Self, ValidationResult)> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        let mut config = Self::from_toml(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;
        if let Some(base) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            config.rebase(base);
        }
        let validation = config.validate()?;
        Ok((config, validation))
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    fn rebase(&mut self, base: &Path) {
        rebase_path(&mut self.acquisition.scratch_dir, base);
        rebase_path(&mut self.store.index_path, base);
        for storage in &mut self.store.storages {
            rebase_path(&mut storage.path, base);
        }
        if let Some(log) = self.activity_log.as_mut() {
            rebase_path(log, base);
        }
    }

    /// # Errors
    ///
    /// Returns every problem found in one error:
    /// - duplicate storage uids or uid 0 (reserved for "default storage")
    /// - more than one default storage
    /// - no operator tokens while auth is enabled
    /// - a zero timeout or download cap, or an invalid default folder
    pub fn validate(&self) -> Result<ValidationResult> {
        let mut errors = Vec::new();
        let mut warnings = Vec::new();

        let mut seen = HashSet::new();
        for storage in &self.store.storages {
            if storage.uid == 0 {
                errors.push(format!(
                    "storage '{}' uses uid 0, which is reserved for the default storage",
                    storage.name
                ));
            }
            if !seen.insert(storage.uid) {
                errors.push(format!("duplicate storage uid {}", storage.uid));
            }
        }

        let defaults = self.store.storages.iter().filter(|s| s.default).count();
        if defaults > 1 {
            errors.push(format!(
                "{defaults} storages are marked default; at most one is allowed"
            ));
        }
        if self.store.storages.is_empty() {
            warnings.push("no storages configured; every save will fail".to_string());
        } else if defaults == 0 {
            warnings.push(
                "no default storage configured; saves must name a storage uid".to_string(),
            );
        }

        if !self.auth.disabled {
            if self.auth.operator_tokens.is_empty() {
                errors.push(
                    "auth.operator_tokens is empty; add a token or set auth.disabled = true"
                        .to_string(),
                );
            }
            if self.auth.operator_tokens.iter().any(|t| t.trim().is_empty()) {
                errors.push("auth.operator_tokens contains an empty token".to_string());
            }
        } else {
            warnings.push("operator auth is disabled; every caller is trusted".to_string());
        }

        if self.generation.timeout_secs == 0 {
            errors.push("generation.timeout_secs cannot be 0".to_string());
        }

        if let Err(err) = FolderPath::parse(&self.acquisition.default_folder) {
            errors.push(format!("acquisition.default_folder: {err}"));
        }
        if self.acquisition.max_download_bytes == 0 {
            errors.push("acquisition.max_download_bytes cannot be 0".to_string());
        }

        if !errors.is_empty() {
            anyhow::bail!(
                "Configuration validation failed:\n  - {}",
                errors.join("\n  - ")
            );
        }
        Ok(ValidationResult { warnings })
    }
}

fn rebase_path(path: &mut PathBuf, base: &Path) {
    if path.is_relative() {
        *path = base.join(&*path);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const FULL: &str = r#"
[server]
bind = "0.0.0.0:9000"

[auth]
operator_tokens = ["editor-token"]

[generation]
model = "dall-e-3"
quality = "hd"

[acquisition]
scratch_dir = "tmp/scratch"

[store]
index_path = "state/index.json"

[[store.storages]]
uid = 1
name = "fileadmin"
path = "fileadmin"
default = true

[[store.storages]]
uid = 2
name = "archive"
path = "/srv/archive"
online = false

[[fields]]
table = "tt_content"
column = "image"
"#;

    #[test]
    fn parses_full_config() -> anyhow::Result<()> {
        let config = Config::from_toml(FULL)?;
        assert_eq!(config.server.bind.port(), 9000);
        assert_eq!(config.generation.quality, "hd");
        assert_eq!(config.generation.api_key_env, DEFAULT_API_KEY_ENV);
        assert_eq!(config.store.storages.len(), 2);
        assert!(config.store.storages[0].default);
        assert!(!config.store.storages[1].online);
        assert_eq!(
            config.fields,
            vec![FieldConfig {
                table: "tt_content".to_string(),
                column: "image".to_string(),
            }]
        );
        let result = config.validate()?;
        assert!(!result.has_warnings());
        Ok(())
    }

    #[test]
    fn empty_file_uses_defaults() -> anyhow::Result<()> {
        let config = Config::from_toml("")?;
        assert_eq!(config.server.bind.to_string(), DEFAULT_BIND);
        assert_eq!(config.acquisition.default_folder, DEFAULT_FOLDER);
        assert_eq!(config.generation.timeout(), Duration::from_secs(120));
        assert!(config.activity_log.is_none());
        Ok(())
    }

    #[test]
    fn missing_tokens_fail_unless_auth_disabled() -> anyhow::Result<()> {
        let err = Config::from_toml("")?.validate().unwrap_err();
        assert!(err.to_string().contains("operator_tokens is empty"));

        let config = Config::from_toml("[auth]\ndisabled = true\n")?;
        let result = config.validate()?;
        assert!(result.warnings.iter().any(|w| w.contains("auth is disabled")));
        Ok(())
    }

    #[test]
    fn duplicate_uids_and_defaults_are_reported_together() -> anyhow::Result<()> {
        let raw = r#"
[auth]
operator_tokens = ["t"]

[[store.storages]]
uid = 3
name = "a"
path = "a"
default = true

[[store.storages]]
uid = 3
name = "b"
path = "b"
default = true
"#;
        let err = Config::from_toml(raw)?.validate().unwrap_err().to_string();
        assert!(err.contains("duplicate storage uid 3"));
        assert!(err.contains("2 storages are marked default"));
        Ok(())
    }

    #[test]
    fn generation_section_has_no_provider_switch() -> anyhow::Result<()> {
        let raw = r#"
[auth]
operator_tokens = ["t"]

[generation]
provider = "anything"
model = "dall-e-2"
"#;
        let config = Config::from_toml(raw)?;
        assert_eq!(config.generation.model, "dall-e-2");
        config.validate()?;
        Ok(())
    }

    #[test]
    fn load_rebases_relative_paths() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("artgen.toml");
        fs::write(&path, FULL)?;

        let (config, _) = Config::load_from(&path)?;
        assert_eq!(config.acquisition.scratch_dir, dir.path().join("tmp/scratch"));
        assert_eq!(config.store.index_path, dir.path().join("state/index.json"));
        assert_eq!(config.store.storages[0].path, dir.path().join("fileadmin"));
        assert_eq!(config.store.storages[1].path, PathBuf::from("/srv/archive"));
        Ok(())
    }
}
