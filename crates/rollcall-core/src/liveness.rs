//! Blink liveness detection via eye aspect ratio (EAR).
//!
//! A static photograph of an enrolled student matches the gallery just as
//! well as the student does. Requiring a blink — eyes closed for a few
//! consecutive frames, then reopened — before attendance is recorded blocks
//! the trivial photo-spoof, with no extra model inference: EAR is computed
//! from eye landmarks the pipeline already produces.
//!
//! # Threat coverage
//!
//! - **Blocks:** printed photographs and static images held up to the camera.
//! - **Does not block:** video replay (a replayed blink confirms), 3D masks.

use std::collections::HashMap;

use crate::tracker::TrackId;
use crate::types::EyePoints;

/// EAR below this value counts as a closed eye.
pub const DEFAULT_EAR_THRESHOLD: f32 = 0.25;

/// Minimum consecutive closed-eye frames before a reopen confirms a blink.
/// Two frames rejects single-frame landmark noise while keeping latency low.
pub const DEFAULT_CONSEC_FRAMES: u32 = 2;

fn point_distance(a: (f32, f32), b: (f32, f32)) -> f32 {
    let dx = a.0 - b.0;
    let dy = a.1 - b.1;
    (dx * dx + dy * dy).sqrt()
}

/// Eye aspect ratio of a six-point eye contour:
/// `(‖p2−p6‖ + ‖p3−p5‖) / (2·‖p1−p4‖)`.
///
/// Points are ordered p1..p6: outer corner, two upper-lid points, inner
/// corner, two lower-lid points. Open eyes sit around 0.3; a closed eye
/// drops well below 0.2. The ratio is scale-invariant, so the coordinate
/// space of the landmarks does not matter.
pub fn eye_aspect_ratio(eye: &EyePoints) -> f32 {
    let a = point_distance(eye[1], eye[5]);
    let b = point_distance(eye[2], eye[4]);
    let c = point_distance(eye[0], eye[3]);
    if c > 0.0 {
        (a + b) / (2.0 * c)
    } else {
        0.0
    }
}

/// Mean EAR over both eyes.
pub fn average_ear(left: &EyePoints, right: &EyePoints) -> f32 {
    (eye_aspect_ratio(left) + eye_aspect_ratio(right)) / 2.0
}

/// Per-track blink state machine.
///
/// Each tracked face accumulates consecutive below-threshold EAR frames.
/// When the eye reopens, a blink is confirmed iff the run reached
/// `consec_frames`; the counter resets either way, so a track can confirm
/// again after another full blink (needed when a ledger write fails and the
/// student must stay retryable).
pub struct BlinkGate {
    ear_threshold: f32,
    consec_frames: u32,
    counters: HashMap<TrackId, u32>,
}

impl BlinkGate {
    pub fn new(ear_threshold: f32, consec_frames: u32) -> Self {
        Self {
            ear_threshold,
            consec_frames,
            counters: HashMap::new(),
        }
    }

    /// Feed one frame's EAR for a track. Returns `true` exactly when a blink
    /// is confirmed: the eye reopened after at least `consec_frames`
    /// consecutive low-EAR frames.
    pub fn observe(&mut self, track: TrackId, ear: f32) -> bool {
        let counter = self.counters.entry(track).or_insert(0);
        if ear < self.ear_threshold {
            *counter += 1;
            false
        } else {
            let confirmed = *counter >= self.consec_frames;
            *counter = 0;
            confirmed
        }
    }

    /// Drop counters for tracks that are no longer alive. Called once per
    /// frame after track assignment so a stale counter never carries over to
    /// a new face appearing at the same location.
    pub fn retain_tracks(&mut self, alive: impl Fn(TrackId) -> bool) {
        self.counters.retain(|id, _| alive(*id));
    }

    /// Number of tracks currently holding a counter.
    pub fn tracked(&self) -> usize {
        self.counters.len()
    }

    /// Whether a counter exists for the given track.
    pub fn is_tracking(&self, track: TrackId) -> bool {
        self.counters.contains_key(&track)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tracker::FaceTracker;
    use crate::types::BoundingBox;

    /// Helper: an eye contour with the given half-opening `h` and width 3.
    fn eye_with_opening(h: f32) -> EyePoints {
        [
            (0.0, 0.0),
            (1.0, h),
            (2.0, h),
            (3.0, 0.0),
            (2.0, -h),
            (1.0, -h),
        ]
    }

    /// Mint a real TrackId through a tracker so tests use the public surface.
    fn track(n: u64) -> TrackId {
        let mut t = FaceTracker::new(0.3, 0);
        let boxes: Vec<BoundingBox> = (0..=n)
            .map(|i| {
                let off = i as f32 * 100.0;
                BoundingBox { top: off, right: off + 10.0, bottom: off + 10.0, left: off }
            })
            .collect();
        t.observe(&boxes)[n as usize]
    }

    #[test]
    fn test_ear_open_eye() {
        // A=2h, B=2h, C=3 → EAR = 4h/6; h=0.5 → 0.333
        let ear = eye_aspect_ratio(&eye_with_opening(0.5));
        assert!((ear - 1.0 / 3.0).abs() < 1e-6);
        assert!(ear >= DEFAULT_EAR_THRESHOLD);
    }

    #[test]
    fn test_ear_closed_eye() {
        // h=0.1 → EAR = 0.4/6 ≈ 0.067
        let ear = eye_aspect_ratio(&eye_with_opening(0.1));
        assert!(ear < DEFAULT_EAR_THRESHOLD);
    }

    #[test]
    fn test_ear_degenerate_width() {
        let eye = [(1.0, 1.0); 6];
        assert_eq!(eye_aspect_ratio(&eye), 0.0);
    }

    #[test]
    fn test_average_ear() {
        let open = eye_with_opening(0.5);
        let closed = eye_with_opening(0.1);
        let avg = average_ear(&open, &closed);
        let expected = (eye_aspect_ratio(&open) + eye_aspect_ratio(&closed)) / 2.0;
        assert!((avg - expected).abs() < 1e-6);
    }

    #[test]
    fn test_blink_confirmed_after_exact_run() {
        // Exactly 2 low frames then a reopen: one confirmation
        let mut gate = BlinkGate::new(0.25, 2);
        let id = track(0);
        assert!(!gate.observe(id, 0.15));
        assert!(!gate.observe(id, 0.15));
        assert!(gate.observe(id, 0.30));
    }

    #[test]
    fn test_short_run_confirms_nothing() {
        let mut gate = BlinkGate::new(0.25, 2);
        let id = track(0);
        assert!(!gate.observe(id, 0.15));
        assert!(!gate.observe(id, 0.30));
    }

    #[test]
    fn test_no_confirmation_while_eye_stays_closed() {
        let mut gate = BlinkGate::new(0.25, 2);
        let id = track(0);
        for _ in 0..10 {
            assert!(!gate.observe(id, 0.10));
        }
        // Only the reopen confirms
        assert!(gate.observe(id, 0.30));
    }

    #[test]
    fn test_reopen_resets_counter() {
        let mut gate = BlinkGate::new(0.25, 2);
        let id = track(0);
        gate.observe(id, 0.15);
        gate.observe(id, 0.30); // short run, reset
        assert!(!gate.observe(id, 0.15));
        assert!(!gate.observe(id, 0.30)); // still only 1 consecutive low frame
    }

    #[test]
    fn test_two_full_blinks_confirm_twice() {
        let mut gate = BlinkGate::new(0.25, 2);
        let id = track(0);
        gate.observe(id, 0.15);
        gate.observe(id, 0.15);
        assert!(gate.observe(id, 0.30));
        gate.observe(id, 0.15);
        gate.observe(id, 0.15);
        assert!(gate.observe(id, 0.30));
    }

    #[test]
    fn test_tracks_are_independent() {
        let mut gate = BlinkGate::new(0.25, 2);
        let mut tracker = FaceTracker::new(0.3, 0);
        let ids = tracker.observe(&[
            BoundingBox { top: 0.0, right: 10.0, bottom: 10.0, left: 0.0 },
            BoundingBox { top: 0.0, right: 210.0, bottom: 10.0, left: 200.0 },
        ]);
        gate.observe(ids[0], 0.15);
        gate.observe(ids[0], 0.15);
        gate.observe(ids[1], 0.15);
        // Second track has only one low frame: no confirmation
        assert!(!gate.observe(ids[1], 0.30));
        assert!(gate.observe(ids[0], 0.30));
    }

    #[test]
    fn test_retain_purges_dead_tracks() {
        let mut gate = BlinkGate::new(0.25, 2);
        let id = track(0);
        gate.observe(id, 0.15);
        assert!(gate.is_tracking(id));
        gate.retain_tracks(|_| false);
        assert!(!gate.is_tracking(id));
        assert_eq!(gate.tracked(), 0);
    }
}
