//! Face analysis: the narrow interface to the attribute estimation engine
//! and the normalization of its output into a stable, tagged outcome.
//!
//! The engine itself is an external collaborator (pre-built detection and
//! attribute models). Everything request-facing talks to it through the
//! [`FaceAnalyzer`] trait so the HTTP layer can be tested with deterministic
//! fakes.

use async_trait::async_trait;
use image::RgbImage;

#[cfg(feature = "onnx")]
pub mod onnx;

/// Label reported when a face was found but a classifier head produced
/// nothing usable.
pub const UNKNOWN_LABEL: &str = "Unknown";

/// Raw per-face record as produced by an analyzer backend.
#[derive(Debug, Clone, Default)]
pub struct FaceReading {
    /// Estimated age in years
    pub age: Option<f32>,
    /// Highest-confidence gender label
    pub dominant_gender: Option<String>,
    /// Highest-confidence emotion label
    pub dominant_emotion: Option<String>,
}

/// Attributes of the primary face after normalization.
#[derive(Debug, Clone, PartialEq)]
pub struct FaceAttributes {
    pub age: Option<f32>,
    pub gender: String,
    pub emotion: String,
}

/// The outcome of analyzing one frame.
///
/// "No face" and "the engine fell over" are expected outcomes of analysis,
/// not request errors: both are shaped into HTTP 200 responses with null
/// attributes so the caller always sees the same response shape.
#[derive(Debug, Clone, PartialEq)]
pub enum AnalysisOutcome {
    /// A face was found; attributes extracted
    Face(FaceAttributes),
    /// The detector found no face in the frame
    NoFace,
    /// The engine failed; carries a best-effort description
    Failed { detail: String },
}

/// A face analysis engine.
///
/// Implementations estimate age, gender and dominant emotion for every face
/// they can find in the frame, returning an empty list when there is none.
/// Detection is not enforced: an uncertain frame yields best-effort or empty
/// output rather than an error.
#[async_trait]
pub trait FaceAnalyzer: Send + Sync {
    async fn analyze(&self, frame: &RgbImage) -> anyhow::Result<Vec<FaceReading>>;
}

/// Run the analyzer over a frame and collapse its output into an
/// [`AnalysisOutcome`].
///
/// The first face is the primary one; missing labels default to
/// [`UNKNOWN_LABEL`]; engine failures are folded into
/// [`AnalysisOutcome::Failed`] instead of propagating.
pub async fn analyze_frame(analyzer: &dyn FaceAnalyzer, frame: &RgbImage) -> AnalysisOutcome {
    match analyzer.analyze(frame).await {
        Ok(readings) => match readings.into_iter().next() {
            Some(reading) => AnalysisOutcome::Face(FaceAttributes {
                age: reading.age,
                gender: reading.dominant_gender.unwrap_or_else(|| UNKNOWN_LABEL.to_string()),
                emotion: reading.dominant_emotion.unwrap_or_else(|| UNKNOWN_LABEL.to_string()),
            }),
            None => AnalysisOutcome::NoFace,
        },
        Err(e) => {
            tracing::error!("face analysis failed: {e:#}");
            AnalysisOutcome::Failed { detail: format!("{e:#}") }
        }
    }
}
