//! SCRFD face detection via ONNX Runtime.
//!
//! Anchor-free decoding over strides 8/16/32 with greedy NMS. The model's
//! keypoint outputs are ignored — eye landmarks come from the dedicated
//! landmark model, which produces the full contours the blink gate needs.

use std::path::Path;

use image::RgbImage;
use ndarray::Array4;
use ort::session::Session;
use ort::value::TensorRef;
use thiserror::Error;

use crate::types::BoundingBox;

const DET_INPUT_SIZE: usize = 640;
const DET_MEAN: f32 = 127.5;
const DET_STD: f32 = 128.0;
const DET_SCORE_THRESHOLD: f32 = 0.5;
const DET_NMS_IOU: f32 = 0.4;
const DET_STRIDES: [usize; 3] = [8, 16, 32];
const DET_ANCHORS_PER_CELL: usize = 2;

#[derive(Error, Debug)]
pub enum DetectorError {
    #[error("detection model not found: {0}")]
    ModelNotFound(String),
    #[error("inference failed: {0}")]
    InferenceFailed(String),
    #[error("ort: {0}")]
    Ort(#[from] ort::Error),
}

/// One face detection: box in frame coordinates plus model confidence.
#[derive(Debug, Clone, Copy)]
pub struct Detection {
    pub bbox: BoundingBox,
    pub confidence: f32,
}

/// SCRFD-based face detector.
pub struct FaceDetector {
    session: Session,
}

impl FaceDetector {
    pub fn load(model_path: &Path) -> Result<Self, DetectorError> {
        if !model_path.exists() {
            return Err(DetectorError::ModelNotFound(model_path.display().to_string()));
        }

        let session = Session::builder()?
            .with_intra_threads(2)?
            .commit_from_file(model_path)?;

        tracing::info!(path = %model_path.display(), "face detection model loaded");
        Ok(Self { session })
    }

    /// Detect faces in an RGB frame. Results are in frame coordinates,
    /// sorted by descending confidence.
    pub fn detect(&mut self, frame: &RgbImage) -> Result<Vec<Detection>, DetectorError> {
        let (input, scale) = preprocess(frame);

        let outputs = self
            .session
            .run(ort::inputs![TensorRef::from_array_view(input.view())?])?;

        // SCRFD exports nine outputs grouped by kind:
        // [score8, score16, score32, bbox8, bbox16, bbox32, kps8, kps16, kps32]
        let mut candidates = Vec::new();
        for (si, &stride) in DET_STRIDES.iter().enumerate() {
            let (_, scores) = outputs[si].try_extract_tensor::<f32>().map_err(|e| {
                DetectorError::InferenceFailed(format!("scores stride {stride}: {e}"))
            })?;
            let (_, deltas) = outputs[si + 3].try_extract_tensor::<f32>().map_err(|e| {
                DetectorError::InferenceFailed(format!("boxes stride {stride}: {e}"))
            })?;
            decode_stride(
                scores,
                deltas,
                stride,
                DET_INPUT_SIZE,
                DET_SCORE_THRESHOLD,
                &mut candidates,
            );
        }

        let mut detections = non_max_suppression(candidates, DET_NMS_IOU);

        // Map letterbox coordinates back to the source frame.
        let fw = frame.width() as f32;
        let fh = frame.height() as f32;
        for det in &mut detections {
            det.bbox = BoundingBox {
                top: (det.bbox.top / scale).clamp(0.0, fh),
                right: (det.bbox.right / scale).clamp(0.0, fw),
                bottom: (det.bbox.bottom / scale).clamp(0.0, fh),
                left: (det.bbox.left / scale).clamp(0.0, fw),
            };
        }

        Ok(detections)
    }
}

/// Letterbox the frame into the square model input (top-left anchored) and
/// normalize. Returns the tensor and the resize scale.
fn preprocess(frame: &RgbImage) -> (Array4<f32>, f32) {
    let (w, h) = frame.dimensions();
    let scale = DET_INPUT_SIZE as f32 / w.max(h).max(1) as f32;
    let rw = ((w as f32 * scale).round() as u32).clamp(1, DET_INPUT_SIZE as u32);
    let rh = ((h as f32 * scale).round() as u32).clamp(1, DET_INPUT_SIZE as u32);
    let resized = image::imageops::resize(frame, rw, rh, image::imageops::FilterType::Triangle);

    let mut tensor = Array4::<f32>::zeros((1, 3, DET_INPUT_SIZE, DET_INPUT_SIZE));
    for (x, y, pixel) in resized.enumerate_pixels() {
        for c in 0..3 {
            tensor[[0, c, y as usize, x as usize]] = (pixel[c] as f32 - DET_MEAN) / DET_STD;
        }
    }

    (tensor, scale)
}

/// Decode one stride's anchor-free outputs into scored candidate boxes in
/// letterbox coordinates. Box deltas are (left, top, right, bottom)
/// distances from the anchor centre, in stride units.
fn decode_stride(
    scores: &[f32],
    deltas: &[f32],
    stride: usize,
    input_size: usize,
    threshold: f32,
    out: &mut Vec<Detection>,
) {
    let cells = input_size / stride;
    let rows = cells * cells * DET_ANCHORS_PER_CELL;
    if scores.len() < rows || deltas.len() < rows * 4 {
        tracing::warn!(stride, scores = scores.len(), "unexpected detector output shape");
        return;
    }

    let s = stride as f32;
    for r in 0..rows {
        let score = scores[r];
        if score < threshold {
            continue;
        }
        let cell = r / DET_ANCHORS_PER_CELL;
        let cx = (cell % cells * stride) as f32;
        let cy = (cell / cells * stride) as f32;
        let d = &deltas[r * 4..r * 4 + 4];
        out.push(Detection {
            bbox: BoundingBox {
                left: cx - d[0] * s,
                top: cy - d[1] * s,
                right: cx + d[2] * s,
                bottom: cy + d[3] * s,
            },
            confidence: score,
        });
    }
}

/// Greedy non-maximum suppression: keep the highest-scoring boxes, drop any
/// candidate overlapping a kept box at or above `iou_limit`.
fn non_max_suppression(mut candidates: Vec<Detection>, iou_limit: f32) -> Vec<Detection> {
    candidates.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));
    let mut kept: Vec<Detection> = Vec::new();
    for cand in candidates {
        if kept.iter().all(|k| k.bbox.iou(&cand.bbox) < iou_limit) {
            kept.push(cand);
        }
    }
    kept
}
