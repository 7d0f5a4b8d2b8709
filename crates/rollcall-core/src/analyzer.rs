//! Per-frame face analysis behind a single trait seam.
//!
//! The recognition loop only sees [`FaceAnalyzer`]; the production
//! implementation composes the three ONNX models (detector, landmarker,
//! encoder). Tests drive the loop with scripted analyzers instead.

use image::RgbImage;
use thiserror::Error;

use crate::detector::{DetectorError, FaceDetector};
use crate::encoder::{EncoderError, FaceEncoder};
use crate::landmarks::{EyeLandmarker, LandmarkError};
use crate::types::{BoundingBox, DetectedFace};

#[derive(Error, Debug)]
pub enum AnalyzerError {
    #[error("detector: {0}")]
    Detector(#[from] DetectorError),
    #[error("landmarker: {0}")]
    Landmark(#[from] LandmarkError),
    #[error("encoder: {0}")]
    Encoder(#[from] EncoderError),
}

/// Produces every recognizable face in a frame: bounding box, embedding,
/// and the six-point eye contours.
pub trait FaceAnalyzer {
    fn analyze(&mut self, frame: &RgbImage) -> Result<Vec<DetectedFace>, AnalyzerError>;
}

/// Production analyzer: SCRFD detection, 68-point landmarks, ArcFace
/// embeddings. A landmark or encode failure drops that face only; the rest
/// of the frame still goes through.
pub struct OnnxFaceAnalyzer {
    detector: FaceDetector,
    landmarker: EyeLandmarker,
    encoder: FaceEncoder,
}

impl OnnxFaceAnalyzer {
    pub fn load(
        detector_model: &std::path::Path,
        landmark_model: &std::path::Path,
        recognition_model: &std::path::Path,
    ) -> Result<Self, AnalyzerError> {
        Ok(Self {
            detector: FaceDetector::load(detector_model)?,
            landmarker: EyeLandmarker::load(landmark_model)?,
            encoder: FaceEncoder::load(recognition_model)?,
        })
    }
}

impl FaceAnalyzer for OnnxFaceAnalyzer {
    fn analyze(&mut self, frame: &RgbImage) -> Result<Vec<DetectedFace>, AnalyzerError> {
        let detections = self.detector.detect(frame)?;
        let mut faces = Vec::with_capacity(detections.len());

        for det in detections {
            let crop = crop_face(frame, &det.bbox);

            let (left_eye, right_eye) = match self.landmarker.eye_points(&crop.image, crop.origin)
            {
                Ok(eyes) => eyes,
                Err(e) => {
                    tracing::warn!(error = %e, "landmark extraction failed, skipping face");
                    continue;
                }
            };

            let embedding = match self.encoder.encode(&crop.image) {
                Ok(embedding) => embedding,
                Err(e) => {
                    tracing::warn!(error = %e, "embedding extraction failed, skipping face");
                    continue;
                }
            };

            faces.push(DetectedFace {
                bbox: det.bbox,
                confidence: det.confidence,
                embedding,
                left_eye,
                right_eye,
            });
        }

        Ok(faces)
    }
}

/// Detection + encoding only, for enrollment flows with no liveness step.
pub struct FaceEnroller {
    detector: FaceDetector,
    encoder: FaceEncoder,
}

impl FaceEnroller {
    pub fn load(
        detector_model: &std::path::Path,
        recognition_model: &std::path::Path,
    ) -> Result<Self, AnalyzerError> {
        Ok(Self {
            detector: FaceDetector::load(detector_model)?,
            encoder: FaceEncoder::load(recognition_model)?,
        })
    }

    /// Embedding of the highest-confidence face in the image, if any.
    pub fn best_face_embedding(
        &mut self,
        image: &RgbImage,
    ) -> Result<Option<(crate::types::Embedding, f32)>, AnalyzerError> {
        let detections = self.detector.detect(image)?;
        let Some(best) = detections
            .iter()
            .max_by(|a, b| a.confidence.total_cmp(&b.confidence))
        else {
            return Ok(None);
        };

        let crop = crop_face(image, &best.bbox);
        let embedding = self.encoder.encode(&crop.image)?;
        Ok(Some((embedding, best.confidence)))
    }
}

/// Expansion factor applied around the detection box before cropping, so the
/// landmark model sees the full face including brows and jawline.
const CROP_EXPANSION: f32 = 1.3;

pub(crate) struct FaceCrop {
    pub image: RgbImage,
    /// Crop top-left in frame coordinates.
    pub origin: (f32, f32),
}

/// Square crop around a detection box, expanded and clamped to the frame.
pub(crate) fn crop_face(frame: &RgbImage, bbox: &BoundingBox) -> FaceCrop {
    let fw = frame.width();
    let fh = frame.height();

    let cx = (bbox.left + bbox.right) / 2.0;
    let cy = (bbox.top + bbox.bottom) / 2.0;
    let half = (bbox.width().max(bbox.height()) * CROP_EXPANSION / 2.0).max(0.5);

    let x0 = (cx - half).max(0.0).min(fw.saturating_sub(1) as f32) as u32;
    let y0 = (cy - half).max(0.0).min(fh.saturating_sub(1) as f32) as u32;
    let x1 = ((cx + half).ceil().max(0.0) as u32).clamp(x0 + 1, fw.max(x0 + 1));
    let y1 = ((cy + half).ceil().max(0.0) as u32).clamp(y0 + 1, fh.max(y0 + 1));

    let image = image::imageops::crop_imm(frame, x0, y0, x1 - x0, y1 - y0).to_image();
    FaceCrop { image, origin: (x0 as f32, y0 as f32) }
}
