//! Model Provisioning
//!
//! Acquires the serialized classifier exactly once per process:
//! - Local path or remote URL sources
//! - Uniquely named scratch file, removed on every exit path
//! - Bounded fetch timeout with retry and exponential backoff
//! - Optional SHA-256 integrity check before load

mod fetch;
mod integrity;
mod provisioner;
mod scratch;
mod source;

pub use fetch::{HttpFetcher, RetryPolicy};
pub use integrity::{sha256_file, verify_sha256};
pub use provisioner::{acquire_model, ModelLoader, Provisioner, ProvisionerConfig};
pub use scratch::ScratchArtifact;
pub use source::ModelSource;

use thiserror::Error;

/// Errors while acquiring the model
#[derive(Debug, Error)]
pub enum ProvisioningError {
    #[error("Invalid model source: {0}")]
    InvalidSource(String),

    #[error("Scratch storage error: {0}")]
    Scratch(String),

    #[error("Model fetch failed: {0}")]
    Fetch(String),

    #[error("Model fetch returned HTTP {status} from {url}")]
    HttpStatus { status: u16, url: String },

    #[error("Model fetch timed out after {0}ms")]
    Timeout(u64),

    #[error("Model fetch stalled: no data for {0}ms")]
    Stalled(u64),

    #[error("Model fetch from {url} returned {content_type} instead of a model file")]
    UnexpectedContent { content_type: String, url: String },

    #[error("Downloaded model is empty")]
    EmptyDownload,

    #[error("Model checksum mismatch: expected {expected}, got {actual}")]
    ChecksumMismatch { expected: String, actual: String },

    #[error("Model load failed: {0}")]
    Load(String),
}

impl ProvisioningError {
    /// Whether another fetch attempt may succeed
    pub fn is_retryable(&self) -> bool {
        match self {
            ProvisioningError::Fetch(_)
            | ProvisioningError::Timeout(_)
            | ProvisioningError::Stalled(_) => true,
            ProvisioningError::HttpStatus { status, .. } => *status == 429 || *status >= 500,
            _ => false,
        }
    }

    /// Readable message for end users, without internal detail
    pub fn user_message(&self) -> String {
        match self {
            ProvisioningError::InvalidSource(_) => {
                "The classification model is not configured correctly.".to_string()
            }
            ProvisioningError::Scratch(_) => {
                "The classification model could not be staged on this server.".to_string()
            }
            ProvisioningError::Fetch(_)
            | ProvisioningError::HttpStatus { .. }
            | ProvisioningError::Timeout(_)
            | ProvisioningError::Stalled(_)
            | ProvisioningError::EmptyDownload => {
                "The classification model could not be downloaded.".to_string()
            }
            ProvisioningError::UnexpectedContent { .. } => {
                "The model source returned a web page instead of the model file.".to_string()
            }
            ProvisioningError::ChecksumMismatch { .. } => {
                "The downloaded classification model failed its integrity check.".to_string()
            }
            ProvisioningError::Load(_) => {
                "The classification model file is corrupt or incompatible.".to_string()
            }
        }
    }
}

impl From<std::io::Error> for ProvisioningError {
    fn from(err: std::io::Error) -> Self {
        ProvisioningError::Scratch(err.to_string())
    }
}
