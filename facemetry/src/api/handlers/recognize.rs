//! HTTP handler for the analyzer-facing `/recognize/` endpoint.
//!
//! This route is only mounted when the analyzer runs in-process; a remote-
//! mode instance has nothing to serve here.

use axum::{Json, extract::State};
use bytes::Bytes;

use super::decode_json_image;
use crate::analysis::analyze_frame;
use crate::api::models::analysis::{AnalysisData, RecognizeRequest};
use crate::errors::{Error, Result};
use crate::{AnalysisBackend, AppState};

#[utoipa::path(
    post,
    path = "/recognize/",
    tag = "recognize",
    summary = "Analyze a base64 image",
    description = "Service-to-service analysis endpoint: decode the base64 image and return the primary face's attributes as a flat object",
    request_body = RecognizeRequest,
    responses(
        (status = 200, description = "Image analyzed", body = AnalysisData),
        (status = 400, description = "Missing or undecodable image"),
        (status = 500, description = "Unexpected failure"),
    )
)]
#[tracing::instrument(skip_all)]
pub async fn recognize(State(state): State<AppState>, body: Bytes) -> Result<Json<AnalysisData>> {
    let frame = decode_json_image(&body)?;

    let AnalysisBackend::Local(analyzer) = &state.analysis else {
        // Unreachable through the router: the route is mounted only for
        // in-process analyzers
        return Err(Error::Other(anyhow::anyhow!(
            "recognize endpoint requires an in-process analyzer"
        )));
    };

    let outcome = analyze_frame(analyzer.as_ref(), &frame).await;
    Ok(Json(outcome.into()))
}

#[cfg(test)]
mod tests {
    use axum::http::StatusCode;
    use serde_json::{Value, json};

    use crate::test_utils::*;

    #[tokio::test]
    async fn recognize_returns_the_flat_shape() {
        let server = create_test_app(local_backend(FixedAnalyzer::person()), None);

        let response = server.post("/recognize/").json(&json!({ "image": sample_jpeg_base64() })).await;
        response.assert_status(StatusCode::OK);
        let body: Value = response.json();
        // Flat shape: no envelope
        assert!(body.get("success").is_none());
        assert_eq!(body["age"], 29.0);
        assert_eq!(body["gender"], "Man");
        assert_eq!(body["emotion"], "happy");
    }

    #[tokio::test]
    async fn recognize_without_image_is_rejected() {
        let server = create_test_app(local_backend(FixedAnalyzer::person()), None);

        let response = server.post("/recognize/").json(&json!({})).await;
        response.assert_status(StatusCode::BAD_REQUEST);
        let body: Value = response.json();
        assert_eq!(body["error"], "No image provided");
    }

    #[tokio::test]
    async fn recognize_with_bad_image_is_rejected() {
        let server = create_test_app(local_backend(FixedAnalyzer::person()), None);

        let response = server.post("/recognize/").json(&json!({ "image": "@@@" })).await;
        response.assert_status(StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn recognize_reports_no_face_as_success() {
        let server = create_test_app(local_backend(EmptyAnalyzer), None);

        let response = server.post("/recognize/").json(&json!({ "image": sample_jpeg_base64() })).await;
        response.assert_status(StatusCode::OK);
        let body: Value = response.json();
        assert!(body["age"].is_null());
        assert_eq!(body["note"], "No face detected");
    }

    #[tokio::test]
    async fn recognize_is_absent_in_remote_mode() {
        let (server, _mock) = remote_test_app().await;

        let response = server.post("/recognize/").json(&json!({ "image": sample_jpeg_base64() })).await;
        response.assert_status(StatusCode::NOT_FOUND);
    }
}
