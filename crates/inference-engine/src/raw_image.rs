//! Raw image input from the upload or camera widgets

use crate::InvalidImageError;
use image::{DynamicImage, ImageFormat};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Where an image came from
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageSource {
    /// File picker upload
    #[default]
    Upload,
    /// Camera capture
    Camera,
}

impl ImageSource {
    /// Get string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            ImageSource::Upload => "upload",
            ImageSource::Camera => "camera",
        }
    }
}

/// Encoded image bytes of arbitrary size and color layout
#[derive(Debug, Clone)]
pub struct RawImage {
    /// Encoded bytes (JPEG or PNG)
    pub data: Vec<u8>,
    /// Capture origin
    pub source: ImageSource,
}

impl RawImage {
    /// Create a new raw image
    pub fn new(data: Vec<u8>, source: ImageSource) -> Self {
        Self { data, source }
    }

    /// Image from the file picker
    pub fn upload(data: Vec<u8>) -> Self {
        Self::new(data, ImageSource::Upload)
    }

    /// Image from the camera widget
    pub fn camera(data: Vec<u8>) -> Self {
        Self::new(data, ImageSource::Camera)
    }

    /// Detect the encoding. Only JPEG and PNG are accepted.
    pub fn format(&self) -> Result<ImageFormat, InvalidImageError> {
        if self.data.is_empty() {
            return Err(InvalidImageError::Empty);
        }

        let format = image::guess_format(&self.data)
            .map_err(|e| InvalidImageError::UnsupportedFormat(e.to_string()))?;

        match format {
            ImageFormat::Jpeg | ImageFormat::Png => Ok(format),
            other => Err(InvalidImageError::UnsupportedFormat(format!("{:?}", other))),
        }
    }

    /// Decode the bytes into an in-memory picture
    pub fn decode(&self) -> Result<DynamicImage, InvalidImageError> {
        let format = self.format()?;

        let img = image::load_from_memory_with_format(&self.data, format)
            .map_err(|e| InvalidImageError::Decode(e.to_string()))?;

        if img.width() == 0 || img.height() == 0 {
            return Err(InvalidImageError::ZeroDimension);
        }

        debug!(
            "Decoded {} image: {:?} {}x{} {:?}",
            self.source.as_str(),
            format,
            img.width(),
            img.height(),
            img.color()
        );

        Ok(img)
    }
}
