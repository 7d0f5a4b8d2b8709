//! ArcFace face embedding via ONNX Runtime.
//!
//! Produces L2-normalized 512-dimensional embeddings from 112×112 face
//! crops using the w600k_r50 model.

use std::path::Path;

use image::RgbImage;
use ndarray::Array4;
use ort::session::Session;
use ort::value::TensorRef;
use thiserror::Error;

use crate::types::{Embedding, EMBEDDING_DIM};

const REC_INPUT_SIZE: usize = 112;
const REC_MEAN: f32 = 127.5;
// Symmetric normalization — ArcFace uses 127.5, not the detector's 128.0.
const REC_STD: f32 = 127.5;

#[derive(Error, Debug)]
pub enum EncoderError {
    #[error("recognition model not found: {0}")]
    ModelNotFound(String),
    #[error("inference failed: {0}")]
    InferenceFailed(String),
    #[error("expected {EMBEDDING_DIM}-dim embedding, got {0}")]
    UnexpectedDimension(usize),
    #[error("ort: {0}")]
    Ort(#[from] ort::Error),
}

/// ArcFace-based face encoder.
pub struct FaceEncoder {
    session: Session,
}

impl FaceEncoder {
    pub fn load(model_path: &Path) -> Result<Self, EncoderError> {
        if !model_path.exists() {
            return Err(EncoderError::ModelNotFound(model_path.display().to_string()));
        }

        let session = Session::builder()?
            .with_intra_threads(2)?
            .commit_from_file(model_path)?;

        tracing::info!(path = %model_path.display(), "recognition model loaded");
        Ok(Self { session })
    }

    /// Extract an L2-normalized embedding from a face crop.
    pub fn encode(&mut self, crop: &RgbImage) -> Result<Embedding, EncoderError> {
        let input = preprocess(crop);

        let outputs = self
            .session
            .run(ort::inputs![TensorRef::from_array_view(input.view())?])?;

        let (_, raw) = outputs[0]
            .try_extract_tensor::<f32>()
            .map_err(|e| EncoderError::InferenceFailed(e.to_string()))?;

        if raw.len() != EMBEDDING_DIM {
            return Err(EncoderError::UnexpectedDimension(raw.len()));
        }

        Ok(Embedding { values: l2_normalize(raw.to_vec()) })
    }
}

/// Resize the crop to the model input and apply symmetric normalization.
fn preprocess(crop: &RgbImage) -> Array4<f32> {
    let size = REC_INPUT_SIZE as u32;
    let resized = image::imageops::resize(crop, size, size, image::imageops::FilterType::Triangle);

    let mut tensor = Array4::<f32>::zeros((1, 3, REC_INPUT_SIZE, REC_INPUT_SIZE));
    for (x, y, pixel) in resized.enumerate_pixels() {
        for c in 0..3 {
            tensor[[0, c, y as usize, x as usize]] = (pixel[c] as f32 - REC_MEAN) / REC_STD;
        }
    }
    tensor
}

/// Scale a vector to unit length. Zero vectors pass through unchanged.
pub fn l2_normalize(mut values: Vec<f32>) -> Vec<f32> {
    let norm: f32 = values.iter().map(|v| v * v).sum::<f32>().sqrt();
    if norm > 0.0 {
        for v in &mut values {
            *v /= norm;
        }
    }
    values
}
