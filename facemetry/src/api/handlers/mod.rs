//! Axum route handlers, one module per endpoint group.

pub mod camera;
pub mod recognize;

use bytes::Bytes;
use image::RgbImage;

use crate::analysis::analyze_frame;
use crate::api::models::analysis::AnalysisData;
use crate::errors::{Error, Result};
use crate::imaging;
use crate::{AnalysisBackend, AppState};

/// Run a decoded frame through the configured analysis backend.
pub(crate) async fn analyze_or_relay(state: &AppState, frame: RgbImage) -> Result<AnalysisData> {
    match &state.analysis {
        AnalysisBackend::Local(analyzer) => Ok(analyze_frame(analyzer.as_ref(), &frame).await.into()),
        AnalysisBackend::Remote(relay) => relay.analyze(&frame).await,
    }
}

/// Pull the base64 `image` field out of a JSON request body and decode it.
///
/// The body is parsed as a generic value so a missing field can report which
/// fields actually arrived.
pub(crate) fn decode_json_image(body: &Bytes) -> Result<RgbImage> {
    let payload: serde_json::Value =
        serde_json::from_slice(body).map_err(|_| Error::MissingImage { received: None })?;

    // An absent, null or empty image field all count as "no image provided"
    let encoded = match payload.get("image") {
        Some(serde_json::Value::String(s)) if !s.is_empty() => s.as_str(),
        Some(serde_json::Value::String(_)) | Some(serde_json::Value::Null) | None => {
            let received = payload
                .as_object()
                .map(|fields| fields.keys().cloned().collect());
            return Err(Error::MissingImage { received });
        }
        Some(_) => {
            return Err(Error::ImageDecode {
                detail: "image field must be a base64 string".to_string(),
            });
        }
    };

    imaging::decode_base64_image(encoded)
}
