//! Skin Image Inference Engine
//!
//! Decodes an uploaded or captured photo, prepares it for the classifier
//! and runs a single forward pass through an ONNX model using tract.

mod engine;
mod raw_image;
mod labels;
mod preprocess;

pub use engine::{
    argmax, classify, Backend, ModelHandle, ModelState, Prediction, TractBackend,
};
pub use raw_image::{ImageSource, RawImage};
pub use labels::{ClassNames, CLASS_COUNT};
pub use preprocess::{prepare, PreparedTensor, INPUT_CHANNELS, INPUT_SIZE, RESAMPLE_FILTER};

use thiserror::Error;

/// Errors during inference
#[derive(Debug, Error)]
pub enum InferenceError {
    #[error("Model load failed: {0}")]
    ModelLoadError(String),
    #[error("Inference failed: {0}")]
    InferenceFailed(String),
    #[error("Invalid output shape: expected {expected} scores, got {actual}")]
    InvalidOutputShape { expected: usize, actual: usize },
    #[error("Model output contains non-finite scores")]
    NonFiniteOutput,
    #[error("Invalid class names: {0}")]
    InvalidClassNames(String),
    #[error(transparent)]
    InvalidImage(#[from] InvalidImageError),
    #[error("Model unavailable: {0}")]
    ModelUnavailable(String),
}

/// Errors while turning raw image bytes into a 3-channel picture
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InvalidImageError {
    #[error("Image is empty")]
    Empty,
    #[error("Unsupported image format: {0}")]
    UnsupportedFormat(String),
    #[error("Image could not be decoded: {0}")]
    Decode(String),
    #[error("Image has zero width or height")]
    ZeroDimension,
}
