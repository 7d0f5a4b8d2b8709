//! Rollcall core — face matching, blink liveness, tracking, and the ONNX
//! vision pipeline behind the [`FaceAnalyzer`] seam.

pub mod analyzer;
pub mod detector;
pub mod encoder;
pub mod landmarks;
pub mod liveness;
pub mod matcher;
pub mod tracker;
pub mod types;

pub use analyzer::{AnalyzerError, FaceAnalyzer, FaceEnroller, OnnxFaceAnalyzer};
pub use liveness::{average_ear, eye_aspect_ratio, BlinkGate};
pub use matcher::{classify, EuclideanMatcher, FaceClass, Matcher, NearestMatch};
pub use tracker::{FaceTracker, TrackId};
pub use types::{BoundingBox, DetectedFace, Embedding, EyePoints, GalleryEntry, EMBEDDING_DIM};
