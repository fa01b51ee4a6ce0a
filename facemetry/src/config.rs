//! Application configuration management.
//!
//! Configuration is loaded from a YAML file with environment variable
//! overrides. The configuration file path defaults to `config.yaml` but can
//! be specified via the `-f` flag or the `FACEMETRY_CONFIG` environment
//! variable.
//!
//! ## Loading Priority
//!
//! Configuration sources are merged in the following order (later sources
//! override earlier ones):
//!
//! 1. **YAML config file** - Base configuration (default: `config.yaml`)
//! 2. **Environment variables** - Variables prefixed with `FACEMETRY_`
//!
//! For nested values, use double underscores in environment variables. For
//! example, `FACEMETRY_CAPTURE__DEVICE=/dev/video2` sets `capture.device`.
//!
//! ## Analysis modes
//!
//! The `analysis` section decides which role this process plays:
//!
//! ```yaml
//! # Run the analyzer in-process; also serves POST /recognize/
//! analysis:
//!   mode: local
//!   models:
//!     face_detector: models/seeta_fd_frontal_v1.0.bin
//!     age: models/age.onnx
//!     gender: models/gender.onnx
//!     emotion: models/emotion.onnx
//!
//! # Relay every analysis to another instance's /recognize/ endpoint
//! analysis:
//!   mode: remote
//!   url: http://127.0.0.1:8001
//!   timeout: 10s
//! ```

use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use figment::{
    Figment,
    providers::{Env, Format, Yaml},
};
use serde::Deserialize;
use url::Url;

/// Simple CLI args - just for specifying the config file
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Path to configuration file
    #[arg(short = 'f', long, env = "FACEMETRY_CONFIG", default_value = "config.yaml")]
    pub config: String,

    /// Validate configuration and exit without starting the server.
    /// Useful for CI/CD pipelines to catch config errors before deployment.
    #[arg(long)]
    pub validate: bool,
}

/// Main application configuration.
///
/// Loaded from YAML and environment variables; every field has a sensible
/// default so an empty file is a valid configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// HTTP server host to bind to (e.g., "0.0.0.0" for all interfaces)
    pub host: String,
    /// HTTP server port to bind to
    pub port: u16,
    /// Local capture device configuration for `GET /camera/`
    pub capture: CaptureConfig,
    /// Face analysis backend: in-process or relayed to a second instance
    pub analysis: AnalysisConfig,
    /// CORS configuration for browser clients
    pub cors: CorsConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8000,
            capture: CaptureConfig::default(),
            analysis: AnalysisConfig::default(),
            cors: CorsConfig::default(),
        }
    }
}

/// Webcam capture configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CaptureConfig {
    /// Whether the local capture device should be used at all
    pub enabled: bool,
    /// V4L2 device path
    pub device: PathBuf,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            device: PathBuf::from("/dev/video0"),
        }
    }
}

/// Face analysis backend configuration.
///
/// `local` runs the analyzer in this process (requires the `onnx` feature and
/// the referenced model files); `remote` forwards each frame to another
/// facemetry instance over HTTP.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "mode", rename_all = "lowercase")]
pub enum AnalysisConfig {
    /// Run the analyzer in-process
    Local {
        /// Paths to the pre-built detection and attribute model files
        #[serde(default)]
        models: ModelPaths,
        /// Minimum detector confidence for a window to count as a face.
        /// Kept permissive so borderline faces are analyzed rather than
        /// reported as missing.
        #[serde(default = "default_score_threshold")]
        score_threshold: f64,
    },
    /// Relay analysis to a remote instance's `/recognize/` endpoint
    Remote {
        /// Base URL of the analysis service
        url: Url,
        /// Bound on the relay round trip (humantime string, e.g. "10s")
        #[serde(default = "default_relay_timeout", with = "humantime_serde")]
        timeout: Duration,
    },
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        AnalysisConfig::Local {
            models: ModelPaths::default(),
            score_threshold: default_score_threshold(),
        }
    }
}

fn default_score_threshold() -> f64 {
    2.0
}

fn default_relay_timeout() -> Duration {
    Duration::from_secs(10)
}

/// Locations of the externally supplied model files used by the in-process
/// analyzer. None of these are shipped with the crate.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ModelPaths {
    /// SeetaFace frontal face detection model
    pub face_detector: PathBuf,
    /// ONNX age estimation head
    pub age: PathBuf,
    /// ONNX gender classification head
    pub gender: PathBuf,
    /// ONNX emotion classification head
    pub emotion: PathBuf,
}

impl Default for ModelPaths {
    fn default() -> Self {
        Self {
            face_detector: PathBuf::from("models/seeta_fd_frontal_v1.0.bin"),
            age: PathBuf::from("models/age.onnx"),
            gender: PathBuf::from("models/gender.onnx"),
            emotion: PathBuf::from("models/emotion.onnx"),
        }
    }
}

/// CORS (Cross-Origin Resource Sharing) configuration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CorsConfig {
    /// Allowed origins for CORS requests
    pub allowed_origins: Vec<CorsOrigin>,
    /// Allow credentials (cookies) in CORS requests
    pub allow_credentials: bool,
    /// Cache preflight requests for this many seconds
    pub max_age: Option<u64>,
}

/// A single allowed CORS origin: either the `*` wildcard or a specific URL.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum CorsOrigin {
    /// Allow all origins (`*`)
    #[serde(deserialize_with = "parse_wildcard")]
    Wildcard,
    /// Specific origin URL (e.g., `https://app.example.com`)
    Url(Url),
}

fn parse_wildcard<'de, D>(deserializer: D) -> Result<(), D::Error>
where
    D: serde::Deserializer<'de>,
{
    let s: String = Deserialize::deserialize(deserializer)?;
    if s == "*" {
        Ok(())
    } else {
        Err(serde::de::Error::custom("Expected '*'"))
    }
}

impl Config {
    /// Load configuration from the file named in `args` plus environment
    /// overrides, then validate it.
    pub fn load(args: &Args) -> anyhow::Result<Self> {
        let config: Self = Self::figment(args).extract()?;
        config.validate()?;
        Ok(config)
    }

    pub fn figment(args: &Args) -> Figment {
        Figment::new()
            // Load base config file
            .merge(Yaml::file(&args.config))
            // Environment variables can still override specific values.
            // FACEMETRY_CONFIG names the file itself and is not a config key.
            .merge(Env::prefixed("FACEMETRY_").ignore(&["config"]).split("__"))
    }

    /// Validate the configuration for consistency
    pub fn validate(&self) -> anyhow::Result<()> {
        if let AnalysisConfig::Remote { url, .. } = &self.analysis {
            if !matches!(url.scheme(), "http" | "https") {
                anyhow::bail!(
                    "analysis.url must be an http(s) URL, got scheme '{}'",
                    url.scheme()
                );
            }
            if url.host_str().is_none() {
                anyhow::bail!("analysis.url has no host");
            }
        }
        Ok(())
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
