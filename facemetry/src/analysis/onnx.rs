//! In-process analyzer backend.
//!
//! Detection runs on the SeetaFace engine (`rustface`); the three attribute
//! heads (age, gender, emotion) are pre-built ONNX classifiers executed
//! through `ort`. All model files are supplied externally and referenced by
//! path in the configuration.
//!
//! Inference is CPU-bound and the ort sessions require exclusive access, so
//! each call moves onto a blocking thread and serializes on an internal
//! mutex.

use std::io::Cursor;
use std::path::Path;
use std::sync::{Arc, Mutex};

use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use image::RgbImage;
use image::imageops::FilterType;
use ndarray::Array4;
use ort::session::{Session, builder::GraphOptimizationLevel};
use ort::value::Value;

use super::{FaceAnalyzer, FaceReading};
use crate::config::ModelPaths;

/// Gender head output classes, in model output order.
const GENDER_LABELS: [&str; 2] = ["Woman", "Man"];

/// Emotion head output classes, in model output order.
const EMOTION_LABELS: [&str; 7] = ["angry", "disgust", "fear", "happy", "sad", "surprise", "neutral"];

/// Age and gender heads take a 224x224 BGR crop with values in [0, 255].
const ATTRIBUTE_INPUT_SIZE: u32 = 224;

/// The emotion head takes a 48x48 grayscale crop with values in [0, 1].
const EMOTION_INPUT_SIZE: u32 = 48;

pub struct OnnxAnalyzer {
    engine: Arc<Mutex<Engine>>,
}

struct Engine {
    detector_model: rustface::Model,
    score_threshold: f64,
    age: Session,
    gender: Session,
    emotion: Session,
}

impl OnnxAnalyzer {
    /// Load the detection and attribute models from disk.
    pub fn load(models: &ModelPaths, score_threshold: f64) -> Result<Self> {
        let raw = std::fs::read(&models.face_detector)
            .with_context(|| format!("read face detector model {}", models.face_detector.display()))?;
        let detector_model = rustface::read_model(Cursor::new(raw))
            .map_err(|e| anyhow!("load face detector model: {e:?}"))?;

        let engine = Engine {
            detector_model,
            score_threshold,
            age: attribute_session(&models.age)?,
            gender: attribute_session(&models.gender)?,
            emotion: attribute_session(&models.emotion)?,
        };

        tracing::info!(
            detector = %models.face_detector.display(),
            "analyzer models loaded"
        );

        Ok(Self {
            engine: Arc::new(Mutex::new(engine)),
        })
    }
}

fn attribute_session(path: &Path) -> Result<Session> {
    Session::builder()?
        .with_optimization_level(GraphOptimizationLevel::Level3)?
        .commit_from_file(path)
        .with_context(|| format!("load attribute model {}", path.display()))
}

#[async_trait]
impl FaceAnalyzer for OnnxAnalyzer {
    async fn analyze(&self, frame: &RgbImage) -> Result<Vec<FaceReading>> {
        let engine = self.engine.clone();
        let frame = frame.clone();

        tokio::task::spawn_blocking(move || {
            let mut engine = engine.lock().map_err(|_| anyhow!("analyzer state poisoned"))?;
            engine.analyze_frame(&frame)
        })
        .await
        .map_err(|e| anyhow!("analysis task failed: {e}"))?
    }
}

impl Engine {
    fn analyze_frame(&mut self, frame: &RgbImage) -> Result<Vec<FaceReading>> {
        let gray = image::DynamicImage::ImageRgb8(frame.clone()).to_luma8();

        let mut detector = rustface::create_detector_with_model(self.detector_model.clone());
        detector.set_min_face_size(20);
        detector.set_score_thresh(self.score_threshold);
        detector.set_pyramid_scale_factor(0.8);
        detector.set_slide_window_step(4, 4);

        let faces = detector.detect(&rustface::ImageData::new(gray.as_raw(), gray.width(), gray.height()));
        tracing::debug!(faces = faces.len(), "detection complete");

        let mut readings = Vec::with_capacity(faces.len());
        for face in &faces {
            let bbox = face.bbox();
            let crop = clamped_crop(
                frame,
                bbox.x() as i64,
                bbox.y() as i64,
                bbox.width() as i64,
                bbox.height() as i64,
            );
            let Some(crop) = crop else { continue };
            readings.push(self.read_attributes(&crop)?);
        }

        Ok(readings)
    }

    fn read_attributes(&mut self, face: &RgbImage) -> Result<FaceReading> {
        let attribute_input = bgr_tensor(face, ATTRIBUTE_INPUT_SIZE)?;

        let age_probs = run_head(&mut self.age, attribute_input.clone()).context("age head")?;
        let gender_probs = run_head(&mut self.gender, attribute_input).context("gender head")?;
        let emotion_probs = run_head(&mut self.emotion, gray_tensor(face, EMOTION_INPUT_SIZE)?).context("emotion head")?;

        let age = expected_age(&age_probs);
        let gender = argmax(&gender_probs).map(|i| GENDER_LABELS[i.min(GENDER_LABELS.len() - 1)].to_string());
        let emotion = argmax(&emotion_probs).map(|i| EMOTION_LABELS[i.min(EMOTION_LABELS.len() - 1)].to_string());

        Ok(FaceReading {
            age,
            dominant_gender: gender,
            dominant_emotion: emotion,
        })
    }
}

/// Run one attribute head and return its flattened output scores.
fn run_head(session: &mut Session, input: Array4<f32>) -> Result<Vec<f32>> {
    let tensor = Value::from_array(input)?;
    let outputs = session.run(ort::inputs![tensor])?;
    let (_shape, data) = outputs[0].try_extract_tensor::<f32>()?;
    Ok(data.to_vec())
}

/// Crop a face box out of the frame, clamped to the frame bounds.
/// Returns `None` when the clamped box is degenerate.
fn clamped_crop(frame: &RgbImage, x: i64, y: i64, w: i64, h: i64) -> Option<RgbImage> {
    let (fw, fh) = (frame.width() as i64, frame.height() as i64);
    let x0 = x.clamp(0, fw);
    let y0 = y.clamp(0, fh);
    let x1 = (x + w).clamp(0, fw);
    let y1 = (y + h).clamp(0, fh);
    if x1 - x0 < 2 || y1 - y0 < 2 {
        return None;
    }
    Some(image::imageops::crop_imm(frame, x0 as u32, y0 as u32, (x1 - x0) as u32, (y1 - y0) as u32).to_image())
}

/// Pack a face crop as a [1, 3, size, size] BGR tensor with values in
/// [0, 255], the layout the age/gender heads were exported with.
fn bgr_tensor(face: &RgbImage, size: u32) -> Result<Array4<f32>> {
    let resized = image::DynamicImage::ImageRgb8(face.clone())
        .resize_exact(size, size, FilterType::Triangle)
        .to_rgb8();

    let pixel_count = (size * size) as usize;
    let mut data = vec![0f32; 3 * pixel_count];
    let (b_channel, rest) = data.split_at_mut(pixel_count);
    let (g_channel, r_channel) = rest.split_at_mut(pixel_count);

    for (i, pixel) in resized.pixels().enumerate() {
        r_channel[i] = pixel[0] as f32;
        g_channel[i] = pixel[1] as f32;
        b_channel[i] = pixel[2] as f32;
    }

    Ok(Array4::from_shape_vec((1, 3, size as usize, size as usize), data)?)
}

/// Pack a face crop as a [1, 1, size, size] grayscale tensor with values in
/// [0, 1], the layout the emotion head was exported with.
fn gray_tensor(face: &RgbImage, size: u32) -> Result<Array4<f32>> {
    let resized = image::DynamicImage::ImageRgb8(face.clone())
        .resize_exact(size, size, FilterType::Triangle)
        .to_luma8();

    let data: Vec<f32> = resized.as_raw().iter().map(|&v| v as f32 / 255.0).collect();
    Ok(Array4::from_shape_vec((1, 1, size as usize, size as usize), data)?)
}

/// Softmax-expected value over the age classes: the age head emits one score
/// per year and the estimate is the probability-weighted mean.
fn expected_age(scores: &[f32]) -> Option<f32> {
    if scores.is_empty() {
        return None;
    }
    let probs = softmax(scores);
    Some(probs.iter().enumerate().map(|(year, p)| year as f32 * p).sum())
}

fn softmax(scores: &[f32]) -> Vec<f32> {
    let max = scores.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    let exps: Vec<f32> = scores.iter().map(|&s| (s - max).exp()).collect();
    let sum: f32 = exps.iter().sum();
    if sum == 0.0 {
        return vec![0.0; scores.len()];
    }
    exps.iter().map(|&e| e / sum).collect()
}

fn argmax(scores: &[f32]) -> Option<usize> {
    scores
        .iter()
        .enumerate()
        .max_by(|(_, a), (_, b)| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal))
        .map(|(i, _)| i)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn argmax_picks_the_dominant_class() {
        assert_eq!(argmax(&[0.1, 0.7, 0.2]), Some(1));
        assert_eq!(argmax(&[]), None);
    }

    #[test]
    fn softmax_normalizes_to_one() {
        let probs = softmax(&[1.0, 2.0, 3.0]);
        let sum: f32 = probs.iter().sum();
        assert!((sum - 1.0).abs() < 1e-5);
        assert!(probs[2] > probs[1] && probs[1] > probs[0]);
    }

    #[test]
    fn expected_age_of_a_certain_class_is_that_year() {
        // A huge logit on class 30 dominates the softmax
        let mut scores = vec![0.0f32; 101];
        scores[30] = 50.0;
        let age = expected_age(&scores).unwrap();
        assert!((age - 30.0).abs() < 0.5, "got {age}");
        assert_eq!(expected_age(&[]), None);
    }

    #[test]
    fn clamped_crop_stays_inside_the_frame() {
        let frame = RgbImage::new(100, 80);
        let crop = clamped_crop(&frame, 90, 70, 40, 40).unwrap();
        assert_eq!((crop.width(), crop.height()), (10, 10));

        // Fully outside boxes yield nothing
        assert!(clamped_crop(&frame, 200, 200, 10, 10).is_none());
    }

    #[test]
    fn tensors_have_the_expected_shapes() {
        let face = RgbImage::new(60, 60);
        let bgr = bgr_tensor(&face, ATTRIBUTE_INPUT_SIZE).unwrap();
        assert_eq!(bgr.shape(), &[1, 3, 224, 224]);

        let gray = gray_tensor(&face, EMOTION_INPUT_SIZE).unwrap();
        assert_eq!(gray.shape(), &[1, 1, 48, 48]);
    }
}
