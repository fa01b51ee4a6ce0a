//! # facemetry: face attribute analysis over HTTP
//!
//! `facemetry` exposes a small HTTP surface that accepts an image (captured
//! from a local webcam or uploaded by a browser), runs face analysis on it,
//! and returns the derived attributes: estimated age, gender classification
//! and dominant emotion.
//!
//! ## Overview
//!
//! The hard part of the problem (finding a face and estimating its
//! attributes) is delegated to pre-built external models consumed behind the
//! [`analysis::FaceAnalyzer`] trait. What this crate owns is the request
//! lifecycle around that black box: decoding and validating payloads,
//! capturing webcam frames, relaying frames to a second instance over HTTP,
//! classifying transport failures, and shaping stable JSON responses.
//!
//! ## Deployment roles
//!
//! One binary covers both of the system's deployment shapes, selected by the
//! `analysis.mode` configuration:
//!
//! - **`local`**: the analyzer runs in-process. The instance serves the
//!   client-facing `/camera/` endpoints *and* the analyzer-facing
//!   `POST /recognize/` endpoint. Running a single local instance is the
//!   collapsed, everything-in-one-process deployment.
//! - **`remote`**: the instance serves only `/camera/` and forwards every
//!   analysis to a local-mode instance's `/recognize/` endpoint through the
//!   [`relay::RelayClient`], with a bounded wait and no retries.
//!
//! ## Request flow
//!
//! ```text
//! client ──► handler ──► imaging (decode/validate)
//!                   ├──► capture (GET /camera/: one mutex-guarded frame)
//!                   └──► analysis (in-process)  ──┐
//!                        or relay (remote HTTP) ──┴──► JSON response
//! ```
//!
//! "No face detected" and analyzer failures are expected outcomes, not
//! errors: they produce HTTP 200 with null attributes and an explanatory
//! note, so UI callers always see the same response shape. Transport
//! failures to the remote analyzer map to distinct status codes (504 for a
//! slow upstream, 502 for a dead or garbled one); see [`errors::Error`].

pub mod analysis;
pub mod api;
pub mod capture;
pub mod config;
pub mod errors;
pub mod imaging;
mod openapi;
pub mod relay;
pub mod telemetry;

#[cfg(test)]
pub mod test_utils;

use std::sync::Arc;

use axum::{Router, http::HeaderValue, routing::get};
use bon::Builder;
use tokio::net::TcpListener;
use tower_http::{
    cors::CorsLayer,
    trace::{DefaultMakeSpan, DefaultOnRequest, DefaultOnResponse, TraceLayer},
};
use tracing::{Level, info};
use utoipa::OpenApi;
use utoipa_scalar::{Scalar, Servable};

use crate::analysis::FaceAnalyzer;
use crate::capture::FrameSource;
use crate::config::{AnalysisConfig, CorsOrigin};
use crate::openapi::ApiDoc;
use crate::relay::RelayClient;

pub use config::Config;

/// How analysis requests are satisfied: by an in-process engine or by
/// relaying to a remote instance.
#[derive(Clone)]
pub enum AnalysisBackend {
    Local(Arc<dyn FaceAnalyzer>),
    Remote(Arc<RelayClient>),
}

/// Application state shared across all request handlers.
///
/// Everything here is immutable or internally synchronized; requests share
/// no mutable state beyond the capture gate.
#[derive(Clone, Builder)]
pub struct AppState {
    pub config: Config,
    /// The configured analysis backend
    pub analysis: AnalysisBackend,
    /// Local capture device, when one is configured and compiled in
    pub camera: Option<Arc<dyn FrameSource>>,
    /// Serializes access to the capture device across concurrent requests
    #[builder(default)]
    pub capture_gate: Arc<tokio::sync::Mutex<()>>,
}

/// Build the analysis backend named by the configuration.
fn build_analysis_backend(config: &Config) -> anyhow::Result<AnalysisBackend> {
    match &config.analysis {
        AnalysisConfig::Local { models, score_threshold } => {
            #[cfg(feature = "onnx")]
            {
                let analyzer = analysis::onnx::OnnxAnalyzer::load(models, *score_threshold)?;
                Ok(AnalysisBackend::Local(Arc::new(analyzer)))
            }
            #[cfg(not(feature = "onnx"))]
            {
                let _ = (models, score_threshold);
                anyhow::bail!(
                    "analysis.mode is 'local' but the in-process analyzer is not compiled in. \
                     Rebuild with --features onnx, or configure analysis.mode: remote."
                );
            }
        }
        AnalysisConfig::Remote { url, timeout } => {
            let relay = RelayClient::new(url.clone(), *timeout)?;
            info!("relaying analysis to {}", relay.endpoint());
            Ok(AnalysisBackend::Remote(Arc::new(relay)))
        }
    }
}

/// Build the frame source, when capture is enabled and compiled in.
fn build_frame_source(config: &Config) -> Option<Arc<dyn FrameSource>> {
    if !config.capture.enabled {
        return None;
    }
    #[cfg(feature = "camera")]
    {
        Some(Arc::new(capture::V4lFrameSource::new(config.capture.device.clone())))
    }
    #[cfg(not(feature = "camera"))]
    {
        info!("camera support not compiled in; GET /camera/ will report the camera as unavailable");
        None
    }
}

/// Create CORS layer from configuration
fn create_cors_layer(config: &Config) -> anyhow::Result<CorsLayer> {
    let mut origins = Vec::new();
    for origin in &config.cors.allowed_origins {
        let header_value = match origin {
            CorsOrigin::Wildcard => "*".parse::<HeaderValue>()?,
            CorsOrigin::Url(url) => url.as_str().trim_end_matches('/').parse::<HeaderValue>()?,
        };
        origins.push(header_value);
    }

    let mut cors = CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([axum::http::Method::GET, axum::http::Method::POST])
        .allow_headers([axum::http::header::CONTENT_TYPE])
        .allow_credentials(config.cors.allow_credentials);

    if let Some(max_age) = config.cors.max_age {
        cors = cors.max_age(std::time::Duration::from_secs(max_age));
    }

    Ok(cors)
}

/// Build the application router with all endpoints and middleware.
///
/// `POST /recognize/` is only mounted when the analyzer runs in-process;
/// a remote-mode instance has nothing of its own to serve there.
pub fn build_router(state: AppState) -> anyhow::Result<Router> {
    let mut router = Router::new()
        .route("/healthz", get(|| async { "OK" }))
        .route(
            "/camera/",
            get(api::handlers::camera::capture_and_analyze).post(api::handlers::camera::analyze_upload),
        );

    if matches!(state.analysis, AnalysisBackend::Local(_)) {
        router = router.route("/recognize/", axum::routing::post(api::handlers::recognize::recognize));
    }

    let cors_layer = create_cors_layer(&state.config)?;

    let router = router
        .with_state(state)
        .route(
            "/api-docs/openapi.json",
            get(|| async { axum::Json(ApiDoc::openapi()) }),
        )
        .merge(Scalar::with_url("/docs", ApiDoc::openapi()))
        .layer(cors_layer)
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_request(DefaultOnRequest::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        );

    Ok(router)
}

/// Main application struct that owns the router and configuration.
///
/// # Lifecycle
///
/// 1. **Create**: [`Application::new`] loads the analysis backend (models or
///    relay client) and assembles the router
/// 2. **Serve**: [`Application::serve`] binds the TCP listener and handles
///    requests until the shutdown future resolves
pub struct Application {
    router: Router,
    config: Config,
}

impl Application {
    /// Create a new application instance from configuration.
    pub fn new(config: Config) -> anyhow::Result<Self> {
        let analysis = build_analysis_backend(&config)?;
        let camera = build_frame_source(&config);

        let state = AppState::builder()
            .config(config.clone())
            .analysis(analysis)
            .maybe_camera(camera)
            .build();

        let router = build_router(state)?;
        Ok(Self { router, config })
    }

    /// Convert application into a test server (for tests)
    #[cfg(test)]
    pub fn into_test_server(self) -> axum_test::TestServer {
        axum_test::TestServer::new(self.router).expect("Failed to create test server")
    }

    /// Start serving the application until `shutdown` resolves.
    pub async fn serve<F>(self, shutdown: F) -> anyhow::Result<()>
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        let bind_addr = self.config.bind_address();
        let listener = TcpListener::bind(&bind_addr).await?;
        info!(
            "facemetry listening on http://{}, available at http://localhost:{}",
            bind_addr, self.config.port
        );

        axum::serve(listener, self.router.into_make_service())
            .with_graceful_shutdown(shutdown)
            .await?;

        info!("Shutdown complete");
        Ok(())
    }
}
