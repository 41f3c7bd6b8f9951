//! SkinAI API Server
//!
//! HTTP surface for the skin classifier: image classification, health
//! and Prometheus metrics.

use axum::{
    extract::{DefaultBodyLimit, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use inference_engine::{InferenceError, ModelState};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use model_provisioner::Provisioner;
use serde::Serialize;
use std::sync::Arc;
use thiserror::Error;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};
use tracing::subscriber::SetGlobalDefaultError;
use tracing_subscriber::FmtSubscriber;

mod routes;
pub mod settings;

pub use settings::{ConfigError, LoggingSettings, ServerSettings, Settings};

/// Classifications served, labelled by predicted class
pub const METRIC_CLASSIFICATIONS: &str = "skinai_classifications_total";
/// Failed classification requests, labelled by error code
pub const METRIC_FAILURES: &str = "skinai_classification_failures_total";
/// Decode + preprocess + forward pass time
pub const METRIC_LATENCY_MS: &str = "skinai_inference_latency_ms";

/// Application state shared across handlers.
///
/// Read-only after startup, so handlers share it without locking.
pub struct AppState {
    /// Loaded model or the reason it is unavailable
    pub model: ModelState,
    /// Version string
    pub version: String,
    /// Start time
    pub start_time: std::time::Instant,
    /// Prometheus exporter, when installed
    pub metrics: Option<PrometheusHandle>,
}

impl AppState {
    /// Create new application state
    pub fn new(model: ModelState) -> Self {
        Self {
            model,
            version: env!("CARGO_PKG_VERSION").to_string(),
            start_time: std::time::Instant::now(),
            metrics: None,
        }
    }

    /// Attach a Prometheus handle for `/metrics`
    pub fn with_metrics(mut self, handle: PrometheusHandle) -> Self {
        self.metrics = Some(handle);
        self
    }
}

/// Errors returned to HTTP clients
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Unsupported media type: {0}")]
    UnsupportedMediaType(String),

    #[error(transparent)]
    Inference(#[from] InferenceError),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// JSON error body
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: &'static str,
    pub message: String,
}

impl ApiError {
    /// Stable machine-readable code
    pub fn code(&self) -> &'static str {
        match self {
            ApiError::UnsupportedMediaType(_) => "unsupported_media_type",
            ApiError::Inference(InferenceError::InvalidImage(_)) => "invalid_image",
            ApiError::Inference(InferenceError::ModelUnavailable(_)) => "model_unavailable",
            ApiError::Inference(_) | ApiError::Internal(_) => "inference_failed",
        }
    }

    /// HTTP status for this error
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::UnsupportedMediaType(_) => StatusCode::UNSUPPORTED_MEDIA_TYPE,
            ApiError::Inference(InferenceError::InvalidImage(_)) => StatusCode::UNPROCESSABLE_ENTITY,
            ApiError::Inference(InferenceError::ModelUnavailable(_)) => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::Inference(_) | ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn message(&self) -> String {
        match self {
            ApiError::UnsupportedMediaType(_) => {
                "Please upload a JPEG or PNG image.".to_string()
            }
            ApiError::Inference(InferenceError::InvalidImage(e)) => e.to_string(),
            ApiError::Inference(InferenceError::ModelUnavailable(reason)) => reason.clone(),
            ApiError::Inference(_) | ApiError::Internal(_) => {
                "The image could not be classified.".to_string()
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!("Request failed: {}", self);
        } else {
            warn!("Request rejected: {}", self);
        }

        metrics::counter!(METRIC_FAILURES, "reason" => self.code()).increment(1);

        let body = ErrorResponse {
            error: self.code(),
            message: self.message(),
        };
        (status, Json(body)).into_response()
    }
}

/// Create the application router
pub fn create_router(state: Arc<AppState>, max_upload_bytes: usize) -> Router {
    Router::new()
        .route("/api/v1/health", get(routes::health::get_health))
        .route("/api/v1/classify", post(routes::classify::post_classify))
        .route("/metrics", get(metrics_handler))
        .layer(DefaultBodyLimit::max(max_upload_bytes))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Prometheus scrape handler
async fn metrics_handler(State(state): State<Arc<AppState>>) -> Response {
    match &state.metrics {
        Some(handle) => handle.render().into_response(),
        None => (StatusCode::NOT_FOUND, "metrics exporter not installed").into_response(),
    }
}

/// Initialize logging
pub fn init_logging(settings: &LoggingSettings) -> Result<(), SetGlobalDefaultError> {
    let level = settings.level().unwrap_or(tracing::Level::INFO);
    let builder = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(true);

    if settings.json {
        tracing::subscriber::set_global_default(builder.json().finish())
    } else {
        tracing::subscriber::set_global_default(builder.finish())
    }
}

/// Provision the model once; failures leave the service up but unavailable
pub async fn provision_model(settings: &Settings) -> ModelState {
    match Provisioner::new(settings.model.clone()) {
        Ok(provisioner) => provisioner.state().await,
        Err(e) => {
            error!("Model provisioner could not be created: {}", e);
            ModelState::Unavailable {
                reason: e.user_message(),
            }
        }
    }
}

/// Run the server
pub async fn run_server(settings: Settings) -> Result<(), Box<dyn std::error::Error>> {
    let metrics = match PrometheusBuilder::new().install_recorder() {
        Ok(handle) => Some(handle),
        Err(e) => {
            warn!("Prometheus exporter not installed: {}", e);
            None
        }
    };

    let model = provision_model(&settings).await;
    if !model.is_ready() {
        warn!("Serving without a model; classification requests will fail");
    }

    let mut state = AppState::new(model);
    if let Some(handle) = metrics {
        state = state.with_metrics(handle);
    }

    let app = create_router(Arc::new(state), settings.server.max_upload_bytes);

    info!("Starting API server on {}", settings.server.bind_addr);

    let listener = tokio::net::TcpListener::bind(&settings.server.bind_addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use image::{DynamicImage, ImageBuffer, ImageFormat, Rgb, Rgba};
    use inference_engine::{Backend, ClassNames, ModelHandle, PreparedTensor};
    use serde_json::Value;
    use std::io::Cursor;
    use tower::ServiceExt;

    /// Scores the red channel mean against the rest
    struct RedBackend;

    impl Backend for RedBackend {
        fn forward(&self, input: &PreparedTensor) -> Result<Vec<f32>, InferenceError> {
            let view = input.view();
            let red = view[[0, 0, 0, 0]];
            let rest = (1.0 - red) / 3.0;
            Ok(vec![red, rest, rest, rest])
        }

        fn name(&self) -> &str {
            "red"
        }
    }

    fn ready_app() -> Router {
        let handle = ModelHandle::new(RedBackend, ClassNames::default(), "test");
        create_router(Arc::new(AppState::new(ModelState::from(handle))), 1024 * 1024)
    }

    fn unavailable_app() -> Router {
        let state = ModelState::Unavailable {
            reason: "The classification model could not be downloaded.".into(),
        };
        create_router(Arc::new(AppState::new(state)), 1024 * 1024)
    }

    fn png(img: DynamicImage) -> Vec<u8> {
        let mut buf = Cursor::new(Vec::new());
        img.write_to(&mut buf, ImageFormat::Png).unwrap();
        buf.into_inner()
    }

    fn classify_request(uri: &str, content_type: &str, body: Vec<u8>) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", content_type)
            .body(Body::from(body))
            .unwrap()
    }

    async fn json(response: Response) -> Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_health_ready() {
        let response = ready_app()
            .oneshot(Request::get("/api/v1/health").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = json(response).await;
        assert_eq!(body["status"], "healthy");
        assert_eq!(body["model"]["status"], "ready");
        assert_eq!(body["model"]["class_names"][1], "hfmd");
    }

    #[tokio::test]
    async fn test_health_unavailable() {
        let response = unavailable_app()
            .oneshot(Request::get("/api/v1/health").body(Body::empty()).unwrap())
            .await
            .unwrap();

        let body = json(response).await;
        assert_eq!(body["status"], "degraded");
        assert_eq!(body["model"]["status"], "unavailable");
        assert_eq!(
            body["model"]["reason"],
            "The classification model could not be downloaded."
        );
    }

    #[tokio::test]
    async fn test_classify_rgba_png() {
        let img = DynamicImage::ImageRgba8(ImageBuffer::from_pixel(512, 512, Rgba([255, 0, 0, 255])));
        let response = ready_app()
            .oneshot(classify_request("/api/v1/classify", "image/png", png(img)))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = json(response).await;
        assert_eq!(body["label"], "chickenpox");
        assert_eq!(body["class_index"], 0);
        assert!(body["confidence"].as_f64().unwrap() > 99.0);
        assert!(body["confidence_display"].as_str().unwrap().ends_with('%'));
        assert_eq!(body["source"], "upload");
    }

    #[tokio::test]
    async fn test_classify_camera_capture() {
        let img = DynamicImage::ImageRgb8(ImageBuffer::from_pixel(64, 48, Rgb([0, 0, 0])));
        let response = ready_app()
            .oneshot(classify_request(
                "/api/v1/classify?source=camera",
                "application/octet-stream",
                png(img),
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = json(response).await;
        assert_eq!(body["source"], "camera");
        assert_eq!(body["label"], "hfmd");
    }

    #[tokio::test]
    async fn test_classify_truncated_image() {
        let img = DynamicImage::ImageRgb8(ImageBuffer::from_pixel(64, 64, Rgb([1, 2, 3])));
        let mut bytes = png(img);
        bytes.truncate(40);

        let response = ready_app()
            .oneshot(classify_request("/api/v1/classify", "image/png", bytes))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
        let body = json(response).await;
        assert_eq!(body["error"], "invalid_image");
    }

    #[tokio::test]
    async fn test_classify_without_model() {
        let img = DynamicImage::ImageRgb8(ImageBuffer::from_pixel(8, 8, Rgb([1, 2, 3])));
        let response = unavailable_app()
            .oneshot(classify_request("/api/v1/classify", "image/png", png(img)))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        let body = json(response).await;
        assert_eq!(body["error"], "model_unavailable");
    }

    #[tokio::test]
    async fn test_classify_rejects_media_type() {
        let response = ready_app()
            .oneshot(classify_request("/api/v1/classify", "text/plain", b"hello".to_vec()))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::UNSUPPORTED_MEDIA_TYPE);
    }

    #[tokio::test]
    async fn test_metrics_without_exporter() {
        let response = ready_app()
            .oneshot(Request::get("/metrics").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_provision_model_with_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let mut settings = Settings::default();
        settings.model.source = dir.path().join("absent.onnx").display().to_string();

        let state = provision_model(&settings).await;
        assert!(!state.is_ready());
    }
}
