use std::time::Duration;

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error as ThisError;

#[derive(ThisError, Debug)]
pub enum Error {
    /// Request carried no image, neither as a base64 field nor a multipart file
    #[error("no image provided")]
    MissingImage {
        /// Top-level fields the request did carry, when it was a mapping at all
        received: Option<Vec<String>>,
    },

    /// The `image` field was present but is not valid base64
    #[error("image decode error: {detail}")]
    ImageDecode { detail: String },

    /// Decoded bytes are empty or not a recognized image format
    #[error("could not decode image")]
    InvalidImage,

    /// Capture device could not be opened
    #[error("camera not accessible: {detail}")]
    CameraUnavailable { detail: String },

    /// Capture device opened but reading a frame failed
    #[error("failed to capture frame: {detail}")]
    CaptureFailed { detail: String },

    /// The analysis service did not answer within the configured bound
    #[error("analysis service timed out after {timeout:?}")]
    RelayTimeout { timeout: Duration },

    /// The analysis service could not be reached at all
    #[error("analysis service unreachable: {detail}")]
    RelayUnavailable { detail: String },

    /// The analysis service answered with a non-success status
    #[error("analysis service returned HTTP {status}")]
    RelayStatus { status: u16, excerpt: String },

    /// The analysis service answered 2xx but the body is not a usable JSON object
    #[error("invalid analysis service response: {detail}")]
    RelayBody { detail: String },

    /// Unexpected error with full context chain
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl Error {
    pub fn status_code(&self) -> StatusCode {
        match self {
            Error::MissingImage { .. } | Error::ImageDecode { .. } | Error::InvalidImage => StatusCode::BAD_REQUEST,
            Error::CameraUnavailable { .. } | Error::CaptureFailed { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            Error::RelayTimeout { .. } => StatusCode::GATEWAY_TIMEOUT,
            Error::RelayUnavailable { .. } | Error::RelayStatus { .. } | Error::RelayBody { .. } => StatusCode::BAD_GATEWAY,
            Error::Other(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Short, stable `error` field for the response body.
    pub fn user_message(&self) -> &'static str {
        match self {
            Error::MissingImage { .. } => "No image provided",
            Error::ImageDecode { .. } => "Image decode error",
            Error::InvalidImage => "Could not decode image",
            Error::CameraUnavailable { .. } => "Camera not accessible",
            Error::CaptureFailed { .. } => "Failed to capture frame",
            Error::RelayTimeout { .. } => "Analysis service timed out",
            Error::RelayUnavailable { .. } => "Analysis service unavailable",
            Error::RelayStatus { .. } => "Analysis service error",
            Error::RelayBody { .. } => "Invalid analysis service response",
            Error::Other(_) => "Internal server error",
        }
    }

    /// Longer `detail` field, when there is something useful to add.
    pub fn detail(&self) -> Option<String> {
        match self {
            Error::MissingImage { received } => received
                .as_ref()
                .map(|keys| format!("received fields: [{}]", keys.join(", "))),
            Error::ImageDecode { detail } => Some(detail.clone()),
            Error::InvalidImage => None,
            Error::CameraUnavailable { detail } => Some(detail.clone()),
            Error::CaptureFailed { detail } => Some(detail.clone()),
            Error::RelayTimeout { timeout } => Some(format!(
                "the analysis service did not answer within {}; face analysis can take several seconds on a cold start",
                humantime::format_duration(*timeout)
            )),
            Error::RelayUnavailable { detail } => Some(format!(
                "could not connect to the analysis service ({detail}); check that it is running"
            )),
            Error::RelayStatus { status, excerpt } => Some(format!("upstream returned HTTP {status}: {excerpt}")),
            Error::RelayBody { detail } => Some(detail.clone()),
            Error::Other(e) => Some(format!("{e:#}")),
        }
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        // Log full error details - different log levels based on severity
        match &self {
            Error::Other(_) | Error::CameraUnavailable { .. } | Error::CaptureFailed { .. } => {
                tracing::error!("request failed: {:#}", self);
            }
            Error::RelayTimeout { .. } | Error::RelayUnavailable { .. } | Error::RelayStatus { .. } | Error::RelayBody { .. } => {
                tracing::warn!("relay failure: {}", self);
            }
            Error::MissingImage { .. } | Error::ImageDecode { .. } | Error::InvalidImage => {
                tracing::debug!("client error: {}", self);
            }
        }

        let status = self.status_code();
        let mut body = json!({ "error": self.user_message() });
        if let Some(detail) = self.detail() {
            body["detail"] = json!(detail);
        }

        (status, Json(body)).into_response()
    }
}

/// Type alias for request handling results
pub type Result<T> = std::result::Result<T, Error>;
