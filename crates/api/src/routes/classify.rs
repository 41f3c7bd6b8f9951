//! Classification Route

use axum::{
    body::Bytes,
    extract::{Query, State},
    http::{header, HeaderMap},
    Json,
};
use inference_engine::{ImageSource, RawImage};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info};

use crate::{ApiError, AppState, METRIC_CLASSIFICATIONS, METRIC_LATENCY_MS};

/// Content types accepted for the request body
const ACCEPTED_TYPES: &[&str] = &["image/jpeg", "image/jpg", "image/png", "application/octet-stream"];

/// Query parameters for classify endpoint
#[derive(Debug, Deserialize)]
pub struct ClassifyQuery {
    /// Which widget produced the image
    #[serde(default)]
    pub source: ImageSource,
}

/// Response for classify endpoint
#[derive(Debug, Serialize)]
pub struct ClassifyResponse {
    pub label: String,
    pub class_index: usize,
    pub confidence: f64,
    pub confidence_display: String,
    pub source: ImageSource,
    pub latency_ms: u64,
}

/// Classify an uploaded or captured image
pub async fn post_classify(
    State(state): State<Arc<AppState>>,
    Query(params): Query<ClassifyQuery>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<ClassifyResponse>, ApiError> {
    check_content_type(&headers)?;

    let start = Instant::now();
    debug!("Classify request: {} bytes from {}", body.len(), params.source.as_str());

    let image = RawImage::new(body.to_vec(), params.source);
    let model = state.model.clone();

    let prediction = tokio::task::spawn_blocking(move || model.classify(&image))
        .await
        .map_err(|e| ApiError::Internal(e.to_string()))??;

    let latency_ms = start.elapsed().as_millis() as u64;
    metrics::counter!(METRIC_CLASSIFICATIONS, "label" => prediction.label.clone()).increment(1);
    metrics::histogram!(METRIC_LATENCY_MS).record(latency_ms as f64);

    info!(
        "Classified {} image as {} ({}) in {}ms",
        params.source.as_str(),
        prediction.label,
        prediction.confidence_display(),
        latency_ms
    );

    Ok(Json(ClassifyResponse {
        confidence_display: prediction.confidence_display(),
        label: prediction.label,
        class_index: prediction.class_index,
        confidence: prediction.confidence,
        source: params.source,
        latency_ms,
    }))
}

/// A missing content type is allowed; the decoder sniffs the format
fn check_content_type(headers: &HeaderMap) -> Result<(), ApiError> {
    let Some(value) = headers.get(header::CONTENT_TYPE) else {
        return Ok(());
    };

    let value = value
        .to_str()
        .map_err(|_| ApiError::UnsupportedMediaType("non-ASCII content type".into()))?;
    let essence = value.split(';').next().unwrap_or("").trim().to_ascii_lowercase();

    if ACCEPTED_TYPES.contains(&essence.as_str()) {
        Ok(())
    } else {
        Err(ApiError::UnsupportedMediaType(essence))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn headers(content_type: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(header::CONTENT_TYPE, HeaderValue::from_str(content_type).unwrap());
        headers
    }

    #[test]
    fn test_content_types() {
        assert!(check_content_type(&HeaderMap::new()).is_ok());
        assert!(check_content_type(&headers("image/png")).is_ok());
        assert!(check_content_type(&headers("IMAGE/JPEG; charset=binary")).is_ok());
        assert!(check_content_type(&headers("application/octet-stream")).is_ok());
        assert!(check_content_type(&headers("image/gif")).is_err());
        assert!(check_content_type(&headers("multipart/form-data; boundary=x")).is_err());
    }
}
