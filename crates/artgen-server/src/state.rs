use std::sync::Arc;

use anyhow::{Context, Result};
use artgen_contracts::events::{ActivityFields, ActivityKind, ActivityLog};
use artgen_contracts::storage::DirectoryStore;
use artgen_engine::{
    AcquisitionPipeline, GenerationClient, HttpFetcher, OpenAiProvider, OpenAiSettings,
};
use tracing::{info, warn};

use crate::config::{Config, FieldConfig, DEFAULT_FOLDER};
use crate::http::OperatorGate;

/// Everything a request handler needs, shared behind one `Arc`.
pub struct Services {
    generator: GenerationClient,
    pipeline: AcquisitionPipeline,
    gate: OperatorGate,
    activity: Option<ActivityLog>,
    fields: Vec<FieldConfig>,
    default_folder: String,
}

impl Services {
    pub fn new(generator: GenerationClient, pipeline: AcquisitionPipeline, gate: OperatorGate) -> Self {
        Self {
            generator,
            pipeline,
            gate,
            activity: None,
            fields: Vec::new(),
            default_folder: DEFAULT_FOLDER.to_string(),
        }
    }

    pub fn with_activity_log(mut self, log: ActivityLog) -> Self {
        self.activity = Some(log);
        self
    }

    pub fn with_fields(mut self, fields: Vec<FieldConfig>) -> Self {
        self.fields = fields;
        self
    }

    pub fn with_default_folder(mut self, folder: impl Into<String>) -> Self {
        self.default_folder = folder.into();
        self
    }
}

#[derive(Clone)]
pub struct AppState {
    inner: Arc<Services>,
}

impl AppState {
    pub fn new(services: Services) -> Self {
        Self {
            inner: Arc::new(services),
        }
    }

    /// Wires the OpenAI provider, HTTP fetcher and directory store from
    /// config. Builds blocking HTTP clients, so call it outside an async
    /// runtime.
    pub fn from_config(config: &Config) -> Result<Self> {
        let generation = &config.generation;
        let mut settings = OpenAiSettings::from_env(&generation.api_key_env);
        if let Some(api_base) = generation.api_base.as_ref() {
            settings.api_base = api_base.clone();
        }
        settings.model = generation.model.clone();
        settings.quality = generation.quality.clone();
        settings.timeout = generation.timeout();
        settings.transport_retry = generation.transport_retry;
        if settings.api_key.is_none() {
            warn!(
                env = %generation.api_key_env,
                "no OpenAI API key set; generate requests will fail"
            );
        }
        let provider =
            OpenAiProvider::new(settings).context("failed to build the OpenAI provider")?;

        let acquisition = &config.acquisition;
        let fetcher = HttpFetcher::new(
            acquisition.download_timeout(),
            acquisition.max_download_bytes,
        )
        .context("failed to build the image fetcher")?;
        std::fs::create_dir_all(&acquisition.scratch_dir).with_context(|| {
            format!(
                "failed to create scratch dir {}",
                acquisition.scratch_dir.display()
            )
        })?;

        let store = DirectoryStore::new(config.store.storages.clone(), &config.store.index_path);
        let pipeline = AcquisitionPipeline::new(
            Arc::new(fetcher),
            Arc::new(store),
            &acquisition.scratch_dir,
        );

        let gate = if config.auth.disabled {
            OperatorGate::open()
        } else {
            OperatorGate::new(config.auth.operator_tokens.clone())
        };

        let mut services = Services::new(GenerationClient::new(Arc::new(provider)), pipeline, gate)
            .with_fields(config.fields.clone())
            .with_default_folder(acquisition.default_folder.clone());
        if let Some(path) = config.activity_log.as_ref() {
            services = services.with_activity_log(ActivityLog::new(path));
        }

        info!(
            storages = config.store.storages.len(),
            scratch = %acquisition.scratch_dir.display(),
            auth_disabled = config.auth.disabled,
            "services ready"
        );
        Ok(Self::new(services))
    }

    pub fn generator(&self) -> &GenerationClient {
        &self.inner.generator
    }

    pub fn pipeline(&self) -> &AcquisitionPipeline {
        &self.inner.pipeline
    }

    pub fn gate(&self) -> &OperatorGate {
        &self.inner.gate
    }

    pub fn fields(&self) -> &[FieldConfig] {
        &self.inner.fields
    }

    pub fn default_folder(&self) -> &str {
        &self.inner.default_folder
    }

    /// Appends to the activity log when one is configured.
    pub fn record(&self, kind: ActivityKind, request_id: &str, fields: ActivityFields) {
        if let Some(log) = self.inner.activity.as_ref() {
            log.record(kind, request_id, fields);
        }
    }
}
