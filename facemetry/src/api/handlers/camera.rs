//! HTTP handlers for the client-facing `/camera/` endpoints.

use axum::{
    Json,
    extract::State,
    http::{HeaderMap, header},
};
use bytes::Bytes;
use image::RgbImage;

use super::{analyze_or_relay, decode_json_image};
use crate::AppState;
use crate::api::models::analysis::{AnalysisEnvelope, AnalyzeRequest};
use crate::errors::{Error, Result};
use crate::imaging;

#[utoipa::path(
    get,
    path = "/camera/",
    tag = "camera",
    summary = "Capture and analyze",
    description = "Capture one frame from the local webcam, analyze the primary face and return its attributes",
    responses(
        (status = 200, description = "Frame analyzed", body = AnalysisEnvelope),
        (status = 500, description = "Camera not accessible or frame capture failed"),
        (status = 502, description = "Remote analysis service failed"),
        (status = 504, description = "Remote analysis service timed out"),
    )
)]
#[tracing::instrument(skip_all)]
pub async fn capture_and_analyze(State(state): State<AppState>) -> Result<Json<AnalysisEnvelope>> {
    let source = state.camera.clone().ok_or_else(|| Error::CameraUnavailable {
        detail: "no capture device configured".to_string(),
    })?;

    // The device is exclusively owned for the duration of the capture;
    // analysis happens outside the critical section
    let frame = {
        let _gate = state.capture_gate.lock().await;
        source.capture_frame().await?
    };

    let data = analyze_or_relay(&state, frame).await?;
    Ok(Json(AnalysisEnvelope::new(data)))
}

#[utoipa::path(
    post,
    path = "/camera/",
    tag = "camera",
    summary = "Analyze an uploaded image",
    description = "Accept an image as a base64 JSON field or a multipart file named `image`, analyze the primary face and return its attributes",
    request_body = AnalyzeRequest,
    responses(
        (status = 200, description = "Image analyzed", body = AnalysisEnvelope),
        (status = 400, description = "Missing or undecodable image"),
        (status = 502, description = "Remote analysis service failed"),
        (status = 504, description = "Remote analysis service timed out"),
        (status = 500, description = "Unexpected failure"),
    )
)]
#[tracing::instrument(skip_all)]
pub async fn analyze_upload(State(state): State<AppState>, headers: HeaderMap, body: Bytes) -> Result<Json<AnalysisEnvelope>> {
    let frame = decode_request_image(&headers, body).await?;
    let data = analyze_or_relay(&state, frame).await?;
    Ok(Json(AnalysisEnvelope::new(data)))
}

/// Decode the request body into a frame, dispatching on content type:
/// multipart uploads carry the image as a file field, everything else is
/// treated as JSON with a base64 `image` field.
async fn decode_request_image(headers: &HeaderMap, body: Bytes) -> Result<RgbImage> {
    let content_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .unwrap_or("");

    if content_type.starts_with("multipart/form-data") {
        let bytes = multipart_image_field(content_type, body).await?;
        imaging::decode_image_bytes(&bytes)
    } else {
        decode_json_image(&body)
    }
}

/// Pull the `image` file field out of a multipart body.
async fn multipart_image_field(content_type: &str, body: Bytes) -> Result<Bytes> {
    let boundary = multer::parse_boundary(content_type).map_err(|e| Error::ImageDecode {
        detail: format!("invalid multipart request: {e}"),
    })?;

    let stream = futures::stream::once(async move { Ok::<Bytes, std::convert::Infallible>(body) });
    let mut multipart = multer::Multipart::new(stream, boundary);

    let mut received = Vec::new();
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| Error::ImageDecode {
            detail: format!("failed to parse multipart data: {e}"),
        })?
    {
        match field.name() {
            Some("image") => {
                return field.bytes().await.map_err(|e| Error::ImageDecode {
                    detail: format!("failed to read image field: {e}"),
                });
            }
            Some(other) => received.push(other.to_string()),
            None => {}
        }
    }

    Err(Error::MissingImage { received: Some(received) })
}
