//! 68-point facial landmark extraction.
//!
//! Runs a PFLD-style landmark model over a face crop and returns the two
//! six-point eye contours the blink gate consumes. The 68-point layout is
//! the dlib convention: left eye at indices 36–41, right eye at 42–47,
//! each ordered p1..p6 for the EAR formula.

use std::path::Path;

use image::RgbImage;
use ndarray::Array4;
use ort::session::Session;
use ort::value::TensorRef;
use thiserror::Error;

use crate::types::EyePoints;

const LMK_INPUT_SIZE: usize = 112;
const LMK_POINT_COUNT: usize = 68;
const LEFT_EYE_START: usize = 36;
const RIGHT_EYE_START: usize = 42;

#[derive(Error, Debug)]
pub enum LandmarkError {
    #[error("landmark model not found: {0}")]
    ModelNotFound(String),
    #[error("inference failed: {0}")]
    InferenceFailed(String),
    #[error("expected {expected} landmark values, got {got}")]
    UnexpectedOutput { expected: usize, got: usize },
    #[error("ort: {0}")]
    Ort(#[from] ort::Error),
}

/// 68-point landmark model over face crops.
pub struct EyeLandmarker {
    session: Session,
}

impl EyeLandmarker {
    pub fn load(model_path: &Path) -> Result<Self, LandmarkError> {
        if !model_path.exists() {
            return Err(LandmarkError::ModelNotFound(model_path.display().to_string()));
        }

        let session = Session::builder()?
            .with_intra_threads(2)?
            .commit_from_file(model_path)?;

        tracing::info!(path = %model_path.display(), "landmark model loaded");
        Ok(Self { session })
    }

    /// Landmark both eyes of a face crop. `origin` is the crop's top-left in
    /// frame coordinates; returned points are mapped back into frame space.
    pub fn eye_points(
        &mut self,
        crop: &RgbImage,
        origin: (f32, f32),
    ) -> Result<(EyePoints, EyePoints), LandmarkError> {
        let input = preprocess(crop);

        let outputs = self
            .session
            .run(ort::inputs![TensorRef::from_array_view(input.view())?])?;

        let (_, raw) = outputs[0]
            .try_extract_tensor::<f32>()
            .map_err(|e| LandmarkError::InferenceFailed(e.to_string()))?;

        if raw.len() != LMK_POINT_COUNT * 2 {
            return Err(LandmarkError::UnexpectedOutput {
                expected: LMK_POINT_COUNT * 2,
                got: raw.len(),
            });
        }

        let points = decode_points(raw, crop.width() as f32, crop.height() as f32, origin);
        Ok((eye_contour(&points, LEFT_EYE_START), eye_contour(&points, RIGHT_EYE_START)))
    }
}

/// Resize the crop to the model input and normalize to [0, 1].
fn preprocess(crop: &RgbImage) -> Array4<f32> {
    let size = LMK_INPUT_SIZE as u32;
    let resized = image::imageops::resize(crop, size, size, image::imageops::FilterType::Triangle);

    let mut tensor = Array4::<f32>::zeros((1, 3, LMK_INPUT_SIZE, LMK_INPUT_SIZE));
    for (x, y, pixel) in resized.enumerate_pixels() {
        for c in 0..3 {
            tensor[[0, c, y as usize, x as usize]] = pixel[c] as f32 / 255.0;
        }
    }
    tensor
}

/// Map flat normalized (x, y) pairs into frame coordinates.
fn decode_points(raw: &[f32], crop_w: f32, crop_h: f32, origin: (f32, f32)) -> Vec<(f32, f32)> {
    raw.chunks_exact(2)
        .map(|xy| (origin.0 + xy[0] * crop_w, origin.1 + xy[1] * crop_h))
        .collect()
}

fn eye_contour(points: &[(f32, f32)], start: usize) -> EyePoints {
    let mut eye = [(0.0f32, 0.0f32); 6];
    eye.copy_from_slice(&points[start..start + 6]);
    eye
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_preprocess_shape_and_range() {
        let crop = RgbImage::from_pixel(90, 130, image::Rgb([255, 0, 51]));
        let tensor = preprocess(&crop);
        assert_eq!(tensor.shape(), &[1, 3, LMK_INPUT_SIZE, LMK_INPUT_SIZE]);
        assert!((tensor[[0, 0, 56, 56]] - 1.0).abs() < 1e-6);
        assert_eq!(tensor[[0, 1, 56, 56]], 0.0);
        assert!((tensor[[0, 2, 56, 56]] - 0.2).abs() < 1e-6);
    }

    #[test]
    fn test_decode_points_maps_to_frame_space() {
        // Normalized (0.5, 0.25) in a 200x100 crop at origin (40, 60)
        let raw = [0.5f32, 0.25];
        let points = decode_points(&raw, 200.0, 100.0, (40.0, 60.0));
        assert_eq!(points, vec![(140.0, 85.0)]);
    }

    #[test]
    fn test_eye_contour_slicing() {
        let points: Vec<(f32, f32)> = (0..68).map(|i| (i as f32, -(i as f32))).collect();
        let left = eye_contour(&points, LEFT_EYE_START);
        let right = eye_contour(&points, RIGHT_EYE_START);
        assert_eq!(left[0], (36.0, -36.0));
        assert_eq!(left[5], (41.0, -41.0));
        assert_eq!(right[0], (42.0, -42.0));
        assert_eq!(right[5], (47.0, -47.0));
    }
}
