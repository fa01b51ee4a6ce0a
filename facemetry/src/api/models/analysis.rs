use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::analysis::AnalysisOutcome;

/// Request payload for `POST /camera/` when sent as JSON.
///
/// The image may alternatively arrive as a multipart file field named
/// `image`; in that case this body is not used.
#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct AnalyzeRequest {
    /// Base64-encoded image, with or without a `data:` URL prefix
    pub image: Option<String>,
    /// Client capture timestamp; accepted and ignored
    pub timestamp: Option<String>,
}

/// Request payload for `POST /recognize/`.
#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct RecognizeRequest {
    /// Base64-encoded image
    pub image: Option<String>,
}

/// The analysis result for the primary face in a frame.
///
/// The three attribute keys are always present. They are all null when no
/// face was found or the analyzer failed; `note` then says which it was.
#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
#[serde(default)]
pub struct AnalysisData {
    /// Estimated age in years, null when no face was analyzed
    pub age: Option<f32>,
    /// Dominant gender label ("Unknown" when undecided), null when no face
    pub gender: Option<String>,
    /// Dominant emotion label ("Unknown" when undecided), null when no face
    pub emotion: Option<String>,
    /// Present when the attributes are null: why analysis produced nothing
    #[serde(skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

impl From<AnalysisOutcome> for AnalysisData {
    fn from(outcome: AnalysisOutcome) -> Self {
        match outcome {
            AnalysisOutcome::Face(attrs) => AnalysisData {
                age: attrs.age,
                gender: Some(attrs.gender),
                emotion: Some(attrs.emotion),
                note: None,
            },
            AnalysisOutcome::NoFace => AnalysisData {
                note: Some("No face detected".to_string()),
                ..Default::default()
            },
            AnalysisOutcome::Failed { detail } => AnalysisData {
                note: Some(format!("Analysis failed: {detail}")),
                ..Default::default()
            },
        }
    }
}

/// Envelope for the client-facing `/camera/` endpoints.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct AnalysisEnvelope {
    /// Always true: analysis outcomes (including "no face") are successes
    pub success: bool,
    pub data: AnalysisData,
}

impl AnalysisEnvelope {
    pub fn new(data: AnalysisData) -> Self {
        Self { success: true, data }
    }
}
