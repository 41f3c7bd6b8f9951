//! Model acquisition and the load-once model cell

use crate::fetch::{HttpFetcher, RetryPolicy};
use crate::integrity::verify_sha256;
use crate::scratch::ScratchArtifact;
use crate::source::ModelSource;
use crate::ProvisioningError;
use inference_engine::{ClassNames, InferenceError, ModelHandle, ModelState};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::OnceCell;
use tracing::{error, info};

/// Turns a model file on disk into a handle
pub type ModelLoader =
    Arc<dyn Fn(&Path, &ClassNames) -> Result<ModelHandle, InferenceError> + Send + Sync>;

/// Provisioning configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProvisionerConfig {
    /// Model reference: URL, `gdrive:<id>` or local path
    pub source: String,

    /// Class names in model output order
    pub class_names: ClassNames,

    /// Expected SHA-256 of the model file (hex)
    pub sha256: Option<String>,

    /// Directory for the scratch download (OS temp dir when unset)
    pub scratch_dir: Option<PathBuf>,

    /// Cap on a whole fetch attempt (milliseconds)
    pub fetch_timeout_ms: u64,

    /// Longest wait for response headers or the next body chunk (milliseconds)
    pub stall_timeout_ms: u64,

    /// Total fetch attempts
    pub max_attempts: u32,

    /// First retry delay (milliseconds), doubled per attempt
    pub retry_backoff_ms: u64,

    /// Retry delay cap (milliseconds)
    pub retry_backoff_max_ms: u64,
}

impl Default for ProvisionerConfig {
    fn default() -> Self {
        let retry = RetryPolicy::default();
        Self {
            source: "models/skinai.onnx".to_string(),
            class_names: ClassNames::default(),
            sha256: None,
            scratch_dir: None,
            fetch_timeout_ms: 1_800_000,
            stall_timeout_ms: 30_000,
            max_attempts: retry.max_attempts,
            retry_backoff_ms: retry.backoff_ms,
            retry_backoff_max_ms: retry.backoff_max_ms,
        }
    }
}

impl ProvisionerConfig {
    /// Retry settings as a policy
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_attempts,
            backoff_ms: self.retry_backoff_ms,
            backoff_max_ms: self.retry_backoff_max_ms,
        }
    }

    /// Scratch directory, defaulting to the OS temp dir
    pub fn scratch_dir(&self) -> PathBuf {
        self.scratch_dir.clone().unwrap_or_else(std::env::temp_dir)
    }
}

/// Acquires the model and caches the outcome for the process lifetime
pub struct Provisioner {
    config: ProvisionerConfig,
    source: ModelSource,
    fetcher: HttpFetcher,
    loader: ModelLoader,
    state: OnceCell<ModelState>,
}

impl Provisioner {
    /// Create a provisioner that loads ONNX models with tract
    pub fn new(config: ProvisionerConfig) -> Result<Self, ProvisioningError> {
        let source: ModelSource = config.source.parse()?;
        let fetcher = HttpFetcher::new(
            Duration::from_millis(config.fetch_timeout_ms),
            Duration::from_millis(config.stall_timeout_ms),
            config.retry_policy(),
        )?;

        info!("Model source: {}", source);

        Ok(Self {
            config,
            source,
            fetcher,
            loader: Arc::new(|path: &Path, names: &ClassNames| {
                ModelHandle::load_onnx(path, names.clone())
            }),
            state: OnceCell::new(),
        })
    }

    /// Replace the model loader
    pub fn with_loader(mut self, loader: ModelLoader) -> Self {
        self.loader = loader;
        self
    }

    /// Parsed model source
    pub fn source(&self) -> &ModelSource {
        &self.source
    }

    /// Fetch (if remote), verify and load the model.
    ///
    /// For remote sources the scratch file is reserved before any network
    /// activity and removed when this function returns, on every path.
    pub async fn acquire_model(&self) -> Result<ModelHandle, ProvisioningError> {
        match &self.source {
            ModelSource::Local { path } => self.load(path.clone()).await,
            ModelSource::Remote { url } => {
                let scratch = ScratchArtifact::create(&self.config.scratch_dir())?;
                self.fetcher.fetch_into(url, scratch.path()).await?;
                self.load(scratch.path().to_path_buf()).await
            }
        }
    }

    /// Acquire the model and convert the outcome into a [`ModelState`]
    pub async fn provision(&self) -> ModelState {
        let start = Instant::now();

        match self.acquire_model().await {
            Ok(handle) => {
                info!(
                    "Model ready from {} in {}ms",
                    self.source,
                    start.elapsed().as_millis()
                );
                ModelState::from(handle)
            }
            Err(e) => {
                error!("Model provisioning failed: {}", e);
                ModelState::Unavailable {
                    reason: e.user_message(),
                }
            }
        }
    }

    /// Provision on first call, then return the cached state
    pub async fn state(&self) -> ModelState {
        self.state.get_or_init(|| self.provision()).await.clone()
    }

    async fn load(&self, path: PathBuf) -> Result<ModelHandle, ProvisioningError> {
        let loader = Arc::clone(&self.loader);
        let class_names = self.config.class_names.clone();
        let expected = self.config.sha256.clone();

        tokio::task::spawn_blocking(move || {
            if let Some(expected) = expected {
                verify_sha256(&path, &expected)?;
            }
            loader(&path, &class_names).map_err(|e| ProvisioningError::Load(e.to_string()))
        })
        .await
        .map_err(|e| ProvisioningError::Load(format!("loader task failed: {}", e)))?
    }
}

/// Build a provisioner from `config` and acquire the model once
pub async fn acquire_model(config: &ProvisionerConfig) -> Result<ModelHandle, ProvisioningError> {
    Provisioner::new(config.clone())?.acquire_model().await
}
