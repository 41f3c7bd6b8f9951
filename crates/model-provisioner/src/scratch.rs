//! Scoped scratch file for staging downloads

use crate::ProvisioningError;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tempfile::TempPath;
use tracing::{debug, warn};

/// Uniquely named local file that is removed when dropped.
///
/// Removal failures are logged and never returned, so they cannot replace
/// an error already propagating out of the provisioning path.
pub struct ScratchArtifact {
    path: PathBuf,
    guard: Option<TempPath>,
}

impl ScratchArtifact {
    /// Reserve a new empty file under `dir`
    pub fn create(dir: &Path) -> Result<Self, ProvisioningError> {
        let file = tempfile::Builder::new()
            .prefix("skinai-model-")
            .suffix(".onnx")
            .tempfile_in(dir)
            .map_err(|e| ProvisioningError::Scratch(format!("{}: {}", dir.display(), e)))?;

        let guard = file.into_temp_path();
        let path = guard.to_path_buf();
        debug!("Created scratch artifact {}", path.display());

        Ok(Self {
            path,
            guard: Some(guard),
        })
    }

    /// Location of the staged file
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for ScratchArtifact {
    fn drop(&mut self) {
        let Some(guard) = self.guard.take() else {
            return;
        };

        match guard.close() {
            Ok(()) => debug!("Removed scratch artifact {}", self.path.display()),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!("Scratch artifact {} already gone", self.path.display())
            }
            Err(e) => warn!(
                "Failed to remove scratch artifact {}: {}",
                self.path.display(),
                e
            ),
        }
    }
}
