//! Gallery matching: nearest enrolled embedding within tolerance.

use std::collections::HashSet;

use crate::types::{Embedding, GalleryEntry};

/// Nearest gallery entry for a probe embedding.
#[derive(Debug, Clone, Copy)]
pub struct NearestMatch {
    pub index: usize,
    pub distance: f32,
}

/// Strategy for finding the closest gallery entry to a probe embedding.
pub trait Matcher {
    fn nearest(&self, probe: &Embedding, gallery: &[GalleryEntry]) -> Option<NearestMatch>;
}

/// Euclidean-distance matcher.
///
/// Scans the whole gallery and keeps the global minimum. Strict `<` keeps the
/// earlier entry on an exact tie, so ties resolve in gallery load order.
pub struct EuclideanMatcher;

impl Matcher for EuclideanMatcher {
    fn nearest(&self, probe: &Embedding, gallery: &[GalleryEntry]) -> Option<NearestMatch> {
        let mut best: Option<NearestMatch> = None;
        for (index, entry) in gallery.iter().enumerate() {
            let distance = probe.distance(&entry.embedding);
            if best.map_or(true, |b| distance < b.distance) {
                best = Some(NearestMatch { index, distance });
            }
        }
        best
    }
}

/// Per-face classification for one frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FaceClass {
    /// No gallery entry within tolerance.
    Unknown,
    /// Matched a student already checked in this session.
    Present { index: usize, distance: f32 },
    /// Matched a student who still needs the liveness check.
    PendingLiveness { index: usize, distance: f32 },
}

/// Classify a probe embedding against the gallery given the session's
/// presence set. `tolerance` is the maximum accepted distance.
pub fn classify<M: Matcher>(
    matcher: &M,
    probe: &Embedding,
    gallery: &[GalleryEntry],
    tolerance: f32,
    present: &HashSet<i64>,
) -> FaceClass {
    match matcher.nearest(probe, gallery) {
        Some(m) if m.distance <= tolerance => {
            if present.contains(&gallery[m.index].student_id) {
                FaceClass::Present { index: m.index, distance: m.distance }
            } else {
                FaceClass::PendingLiveness { index: m.index, distance: m.distance }
            }
        }
        _ => FaceClass::Unknown,
    }
}
