use serde::{Deserialize, Serialize};

/// Dimensionality of the embeddings produced by the recognition model.
pub const EMBEDDING_DIM: usize = 512;

/// Face embedding vector (512-dimensional, L2-normalized by the encoder).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Embedding {
    pub values: Vec<f32>,
}

impl Embedding {
    /// Compute Euclidean distance to another embedding. Lower = more similar.
    pub fn distance(&self, other: &Embedding) -> f32 {
        self.values
            .iter()
            .zip(other.values.iter())
            .map(|(a, b)| (a - b).powi(2))
            .sum::<f32>()
            .sqrt()
    }
}

/// Axis-aligned face bounding box in frame coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub top: f32,
    pub right: f32,
    pub bottom: f32,
    pub left: f32,
}

impl BoundingBox {
    pub fn width(&self) -> f32 {
        (self.right - self.left).max(0.0)
    }

    pub fn height(&self) -> f32 {
        (self.bottom - self.top).max(0.0)
    }

    pub fn area(&self) -> f32 {
        self.width() * self.height()
    }

    /// Intersection-over-union with another box, in [0, 1].
    pub fn iou(&self, other: &BoundingBox) -> f32 {
        let ix = (self.right.min(other.right) - self.left.max(other.left)).max(0.0);
        let iy = (self.bottom.min(other.bottom) - self.top.max(other.top)).max(0.0);
        let inter = ix * iy;
        let union = self.area() + other.area() - inter;
        if union > 0.0 {
            inter / union
        } else {
            0.0
        }
    }
}

/// Six ordered landmark points outlining one eye (p1..p6 of the EAR formula).
pub type EyePoints = [(f32, f32); 6];

/// One face found in a single frame. Transient: built per frame, discarded
/// with it, never persisted.
#[derive(Debug, Clone)]
pub struct DetectedFace {
    pub bbox: BoundingBox,
    pub confidence: f32,
    pub embedding: Embedding,
    pub left_eye: EyePoints,
    pub right_eye: EyePoints,
}

/// An enrolled student with a usable face encoding.
///
/// The gallery is a read-only snapshot loaded once at startup; re-enrollment
/// requires a restart.
#[derive(Debug, Clone)]
pub struct GalleryEntry {
    pub student_id: i64,
    pub name: String,
    pub matric_no: String,
    pub embedding: Embedding,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_distance_identical() {
        let a = Embedding { values: vec![0.5, -0.5, 0.25] };
        assert!(a.distance(&a.clone()) < 1e-6);
    }

    #[test]
    fn test_distance_known_geometry() {
        // 3-4-5 triangle
        let a = Embedding { values: vec![0.0, 0.0] };
        let b = Embedding { values: vec![3.0, 4.0] };
        assert!((a.distance(&b) - 5.0).abs() < 1e-6);
    }

    #[test]
    fn test_iou_identical_boxes() {
        let b = BoundingBox { top: 10.0, right: 30.0, bottom: 40.0, left: 0.0 };
        assert!((b.iou(&b) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_iou_disjoint_boxes() {
        let a = BoundingBox { top: 0.0, right: 10.0, bottom: 10.0, left: 0.0 };
        let b = BoundingBox { top: 20.0, right: 30.0, bottom: 30.0, left: 20.0 };
        assert_eq!(a.iou(&b), 0.0);
    }

    #[test]
    fn test_iou_half_overlap() {
        // Two 10x10 boxes sharing a 5x10 strip: inter 50, union 150
        let a = BoundingBox { top: 0.0, right: 10.0, bottom: 10.0, left: 0.0 };
        let b = BoundingBox { top: 0.0, right: 15.0, bottom: 10.0, left: 5.0 };
        assert!((a.iou(&b) - 1.0 / 3.0).abs() < 1e-6);
    }

    #[test]
    fn test_iou_degenerate_box() {
        let a = BoundingBox { top: 0.0, right: 0.0, bottom: 0.0, left: 0.0 };
        let b = BoundingBox { top: 0.0, right: 10.0, bottom: 10.0, left: 0.0 };
        assert_eq!(a.iou(&b), 0.0);
    }
}
