//! OpenAPI documentation configuration.
//!
//! The rendered documentation is served at `/docs`; the raw document at
//! `/api-docs/openapi.json`.

use utoipa::OpenApi;

use crate::api::models::analysis::{AnalysisData, AnalysisEnvelope, AnalyzeRequest, RecognizeRequest};

#[derive(OpenApi)]
#[openapi(
    info(
        title = "facemetry",
        description = "Face attribute analysis over HTTP: estimated age, gender and dominant emotion from webcam captures or uploaded images."
    ),
    paths(
        crate::api::handlers::camera::capture_and_analyze,
        crate::api::handlers::camera::analyze_upload,
        crate::api::handlers::recognize::recognize,
    ),
    components(schemas(AnalyzeRequest, RecognizeRequest, AnalysisData, AnalysisEnvelope)),
    tags(
        (name = "camera", description = "Client-facing capture and upload analysis"),
        (name = "recognize", description = "Service-to-service analysis")
    )
)]
pub struct ApiDoc;
