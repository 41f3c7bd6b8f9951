//! Inference Engine Implementation

use crate::labels::ClassNames;
use crate::preprocess::{prepare, PreparedTensor, INPUT_CHANNELS, INPUT_SIZE};
use crate::raw_image::RawImage;
use crate::InferenceError;
use image::DynamicImage;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info, warn};
use tract_onnx::prelude::*;

/// Prediction result from inference
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Prediction {
    /// Predicted class name
    pub label: String,
    /// Position of the label in the class list
    pub class_index: usize,
    /// Confidence in percent (0.0 to 100.0)
    pub confidence: f64,
    /// Raw model scores, one per class
    pub scores: Vec<f32>,
}

impl Prediction {
    /// Confidence formatted for display, e.g. `87.43%`
    pub fn confidence_display(&self) -> String {
        format!("{:.2}%", self.confidence)
    }
}

/// A forward pass over a prepared tensor.
///
/// Implementations must be deterministic and must not mutate shared state,
/// a single backend is shared by every concurrent request.
pub trait Backend: Send + Sync {
    /// Run the model and return the flattened output scores
    fn forward(&self, input: &PreparedTensor) -> Result<Vec<f32>, InferenceError>;

    /// Short backend description for logs
    fn name(&self) -> &str;
}

type TractPlan = SimplePlan<TypedFact, Box<dyn TypedOp>, TypedModel>;

/// ONNX backend using tract
pub struct TractBackend {
    plan: TractPlan,
}

impl TractBackend {
    /// Load and optimize an ONNX graph with an NHWC `[1, 224, 224, 3]` input
    pub fn from_path(path: &Path) -> Result<Self, InferenceError> {
        info!("Loading ONNX model from {}", path.display());

        let size = INPUT_SIZE as usize;
        let plan = tract_onnx::onnx()
            .model_for_path(path)
            .and_then(|model| {
                model.with_input_fact(0, f32::fact([1, size, size, INPUT_CHANNELS]).into())
            })
            .and_then(|model| model.into_optimized())
            .and_then(|model| model.into_runnable())
            .map_err(|e| InferenceError::ModelLoadError(format!("{:#}", e)))?;

        info!("Model loaded successfully");
        Ok(Self { plan })
    }
}

impl Backend for TractBackend {
    fn forward(&self, input: &PreparedTensor) -> Result<Vec<f32>, InferenceError> {
        let data = input
            .as_slice()
            .ok_or_else(|| InferenceError::InferenceFailed("input tensor is not contiguous".into()))?;

        let tensor = Tensor::from_shape(&input.shape(), data)
            .map_err(|e| InferenceError::InferenceFailed(e.to_string()))?;

        let outputs = self
            .plan
            .run(tvec!(tensor.into_tvalue()))
            .map_err(|e| InferenceError::InferenceFailed(e.to_string()))?;

        let output = outputs
            .first()
            .ok_or_else(|| InferenceError::InferenceFailed("model produced no outputs".into()))?;

        let view = output
            .to_array_view::<f32>()
            .map_err(|e| InferenceError::InferenceFailed(e.to_string()))?;

        Ok(view.iter().copied().collect())
    }

    fn name(&self) -> &str {
        "tract-onnx"
    }
}

/// Loaded, read-only classifier
pub struct ModelHandle {
    backend: Box<dyn Backend>,
    class_names: ClassNames,
    origin: String,
}

impl fmt::Debug for ModelHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModelHandle")
            .field("backend", &self.backend.name())
            .field("class_names", &self.class_names)
            .field("origin", &self.origin)
            .finish()
    }
}

impl ModelHandle {
    /// Wrap an already constructed backend
    pub fn new(
        backend: impl Backend + 'static,
        class_names: ClassNames,
        origin: impl Into<String>,
    ) -> Self {
        Self {
            backend: Box::new(backend),
            class_names,
            origin: origin.into(),
        }
    }

    /// Load an ONNX model file
    pub fn load_onnx(path: &Path, class_names: ClassNames) -> Result<Self, InferenceError> {
        let backend = TractBackend::from_path(path)?;
        Ok(Self::new(backend, class_names, path.display().to_string()))
    }

    /// Class names in output order
    pub fn class_names(&self) -> &ClassNames {
        &self.class_names
    }

    /// Where the model was loaded from
    pub fn origin(&self) -> &str {
        &self.origin
    }

    /// Classify one encoded image
    pub fn classify(&self, image: &RawImage) -> Result<Prediction, InferenceError> {
        let decoded = image.decode()?;
        self.classify_image(&decoded)
    }

    /// Classify an already decoded image
    pub fn classify_image(&self, image: &DynamicImage) -> Result<Prediction, InferenceError> {
        let input = prepare(image);
        let scores = self.backend.forward(&input)?;

        if scores.len() != self.class_names.len() {
            return Err(InferenceError::InvalidOutputShape {
                expected: self.class_names.len(),
                actual: scores.len(),
            });
        }

        let class_index = argmax(&scores)?;
        let label = self
            .class_names
            .get(class_index)
            .ok_or_else(|| InferenceError::InferenceFailed(format!("no class at index {}", class_index)))?
            .to_string();

        let raw = scores[class_index] as f64 * 100.0;
        let confidence = raw.clamp(0.0, 100.0);
        if confidence != raw {
            warn!("Model score {} outside [0, 1], clamping confidence", scores[class_index]);
        }

        debug!("Prediction: {} (conf={:.2}%)", label, confidence);

        Ok(Prediction {
            label,
            class_index,
            confidence,
            scores,
        })
    }
}

/// Classify `image` with `handle`
pub fn classify(handle: &ModelHandle, image: &RawImage) -> Result<Prediction, InferenceError> {
    handle.classify(image)
}

/// Index of the highest score. Ties resolve to the lowest index.
pub fn argmax(scores: &[f32]) -> Result<usize, InferenceError> {
    if scores.is_empty() {
        return Err(InferenceError::InvalidOutputShape {
            expected: 1,
            actual: 0,
        });
    }
    if scores.iter().any(|s| !s.is_finite()) {
        return Err(InferenceError::NonFiniteOutput);
    }

    let mut best = 0;
    for (i, score) in scores.iter().enumerate().skip(1) {
        if *score > scores[best] {
            best = i;
        }
    }
    Ok(best)
}

/// Process-wide model availability
#[derive(Debug, Clone)]
pub enum ModelState {
    /// Model loaded and ready
    Ready(Arc<ModelHandle>),
    /// Provisioning failed; classification is refused until restart
    Unavailable { reason: String },
}

impl ModelState {
    /// Check if a model is loaded
    pub fn is_ready(&self) -> bool {
        matches!(self, ModelState::Ready(_))
    }

    /// Loaded model, if any
    pub fn handle(&self) -> Option<&Arc<ModelHandle>> {
        match self {
            ModelState::Ready(handle) => Some(handle),
            ModelState::Unavailable { .. } => None,
        }
    }

    /// Classify, failing fast when no model is loaded
    pub fn classify(&self, image: &RawImage) -> Result<Prediction, InferenceError> {
        match self {
            ModelState::Ready(handle) => handle.classify(image),
            ModelState::Unavailable { reason } => {
                Err(InferenceError::ModelUnavailable(reason.clone()))
            }
        }
    }
}

impl From<ModelHandle> for ModelState {
    fn from(handle: ModelHandle) -> Self {
        ModelState::Ready(Arc::new(handle))
    }
}
