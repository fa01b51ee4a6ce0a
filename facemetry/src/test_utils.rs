//! Test utilities: deterministic analyzer and camera fakes, fixture images
//! and test-server constructors.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum_test::TestServer;
use image::RgbImage;
use url::Url;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use crate::analysis::{FaceAnalyzer, FaceReading};
use crate::capture::FrameSource;
use crate::config::Config;
use crate::errors::{Error, Result};
use crate::relay::RelayClient;
use crate::{AnalysisBackend, AppState, build_router};

pub fn create_test_config() -> Config {
    Config {
        host: "127.0.0.1".to_string(),
        port: 0,
        ..Config::default()
    }
}

/// Build a test server over the real router with the given backend and
/// camera.
pub fn create_test_app(analysis: AnalysisBackend, camera: Option<Arc<dyn FrameSource>>) -> TestServer {
    let state = AppState::builder()
        .config(create_test_config())
        .analysis(analysis)
        .maybe_camera(camera)
        .build();

    let router = build_router(state).expect("Failed to build router");
    TestServer::new(router).expect("Failed to create test server")
}

pub fn local_backend(analyzer: impl FaceAnalyzer + 'static) -> AnalysisBackend {
    AnalysisBackend::Local(Arc::new(analyzer))
}

fn remote_backend(base_url: &str, timeout: Duration) -> AnalysisBackend {
    let relay = RelayClient::new(Url::parse(base_url).expect("mock server URL"), timeout).expect("relay client");
    AnalysisBackend::Remote(Arc::new(relay))
}

/// A remote-mode test app backed by a mock analysis service that reports a
/// 33 year old neutral woman. The mock server must be kept alive by the
/// caller.
pub async fn remote_test_app() -> (TestServer, MockServer) {
    let mock = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/recognize/"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "age": 33.0,
            "gender": "Woman",
            "emotion": "neutral"
        })))
        .mount(&mock)
        .await;

    let server = create_test_app(remote_backend(&mock.uri(), Duration::from_secs(5)), None);
    (server, mock)
}

/// Like [`remote_test_app`] but the upstream answers slower than the relay
/// timeout.
pub async fn slow_remote_test_app() -> (TestServer, MockServer) {
    let mock = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(serde_json::json!({}))
                .set_delay(Duration::from_secs(5)),
        )
        .mount(&mock)
        .await;

    let server = create_test_app(remote_backend(&mock.uri(), Duration::from_millis(200)), None);
    (server, mock)
}

/// Remote-mode app with a working fake camera, for relayed GET /camera/.
pub async fn remote_test_app_with_camera() -> (TestServer, MockServer) {
    let mock = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/recognize/"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "age": 33.0,
            "gender": "Woman",
            "emotion": "neutral"
        })))
        .mount(&mock)
        .await;

    let server = create_test_app(
        remote_backend(&mock.uri(), Duration::from_secs(5)),
        Some(Arc::new(StillFrameSource::default())),
    );
    (server, mock)
}

// --- Fixture images ---

/// A small gradient frame; enough structure to survive JPEG round trips.
pub fn sample_rgb_frame() -> RgbImage {
    RgbImage::from_fn(32, 24, |x, y| image::Rgb([(x * 8) as u8, (y * 10) as u8, ((x + y) * 4) as u8]))
}

pub fn sample_jpeg_bytes() -> Vec<u8> {
    use base64::{Engine, engine::general_purpose::STANDARD};
    STANDARD.decode(sample_jpeg_base64()).expect("fixture base64")
}

pub fn sample_jpeg_base64() -> String {
    crate::imaging::encode_jpeg_base64(&sample_rgb_frame()).expect("fixture jpeg")
}

// --- Analyzer fakes ---

/// Returns the same readings for every frame.
pub struct FixedAnalyzer {
    readings: Vec<FaceReading>,
}

impl FixedAnalyzer {
    pub fn new(readings: Vec<FaceReading>) -> Self {
        Self { readings }
    }

    /// A 29 year old happy man - the canonical test subject.
    pub fn person() -> Self {
        Self::new(vec![FaceReading {
            age: Some(29.0),
            dominant_gender: Some("Man".to_string()),
            dominant_emotion: Some("happy".to_string()),
        }])
    }
}

#[async_trait]
impl FaceAnalyzer for FixedAnalyzer {
    async fn analyze(&self, _frame: &RgbImage) -> anyhow::Result<Vec<FaceReading>> {
        Ok(self.readings.clone())
    }
}

/// Finds no faces in anything.
pub struct EmptyAnalyzer;

#[async_trait]
impl FaceAnalyzer for EmptyAnalyzer {
    async fn analyze(&self, _frame: &RgbImage) -> anyhow::Result<Vec<FaceReading>> {
        Ok(Vec::new())
    }
}

/// Fails every analysis with the given message.
pub struct FailingAnalyzer {
    message: String,
}

impl FailingAnalyzer {
    pub fn new(message: impl Into<String>) -> Self {
        Self { message: message.into() }
    }
}

#[async_trait]
impl FaceAnalyzer for FailingAnalyzer {
    async fn analyze(&self, _frame: &RgbImage) -> anyhow::Result<Vec<FaceReading>> {
        Err(anyhow::anyhow!("{}", self.message))
    }
}

/// Panics when reached; used to prove a code path short-circuits earlier.
pub struct PanickingAnalyzer;

#[async_trait]
impl FaceAnalyzer for PanickingAnalyzer {
    async fn analyze(&self, _frame: &RgbImage) -> anyhow::Result<Vec<FaceReading>> {
        panic!("analyzer must not be reached by this test");
    }
}

// --- Camera fakes ---

/// Always returns the same frame.
pub struct StillFrameSource {
    frame: RgbImage,
}

impl Default for StillFrameSource {
    fn default() -> Self {
        Self { frame: sample_rgb_frame() }
    }
}

#[async_trait]
impl FrameSource for StillFrameSource {
    async fn capture_frame(&self) -> Result<RgbImage> {
        Ok(self.frame.clone())
    }
}

/// Fails every capture, either at open or at read.
pub struct FailingFrameSource {
    error: fn(String) -> Error,
    detail: String,
}

impl FailingFrameSource {
    pub fn read_error(detail: impl Into<String>) -> Self {
        Self {
            error: |detail| Error::CaptureFailed { detail },
            detail: detail.into(),
        }
    }

    pub fn open_error(detail: impl Into<String>) -> Self {
        Self {
            error: |detail| Error::CameraUnavailable { detail },
            detail: detail.into(),
        }
    }
}

#[async_trait]
impl FrameSource for FailingFrameSource {
    async fn capture_frame(&self) -> Result<RgbImage> {
        Err((self.error)(self.detail.clone()))
    }
}
