//! Model source references

use crate::ProvisioningError;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

const GDRIVE_PREFIX: &str = "gdrive:";
const GDRIVE_DOWNLOAD_URL: &str = "https://drive.google.com/uc?export=download&id=";

/// Where the serialized model lives
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModelSource {
    /// Remote content store, staged through a scratch file
    Remote { url: String },
    /// Fixed local file, loaded in place
    Local { path: PathBuf },
}

impl ModelSource {
    /// Check if the source needs a download
    pub fn is_remote(&self) -> bool {
        matches!(self, ModelSource::Remote { .. })
    }
}

impl FromStr for ModelSource {
    type Err = ProvisioningError;

    /// `http(s)://…` is a URL, `gdrive:<id>` a Google Drive file id,
    /// anything else a local path.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.is_empty() {
            return Err(ProvisioningError::InvalidSource("empty reference".to_string()));
        }

        if let Some(id) = s.strip_prefix(GDRIVE_PREFIX) {
            let id = id.trim();
            if id.is_empty() || !id.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_') {
                return Err(ProvisioningError::InvalidSource(format!("bad file id in '{}'", s)));
            }
            return Ok(ModelSource::Remote {
                url: format!("{}{}", GDRIVE_DOWNLOAD_URL, id),
            });
        }

        let lower = s.to_ascii_lowercase();
        if lower.starts_with("http://") || lower.starts_with("https://") {
            return Ok(ModelSource::Remote { url: s.to_string() });
        }

        Ok(ModelSource::Local {
            path: PathBuf::from(s),
        })
    }
}

impl fmt::Display for ModelSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ModelSource::Remote { url } => write!(f, "{}", url),
            ModelSource::Local { path } => write!(f, "{}", path.display()),
        }
    }
}
