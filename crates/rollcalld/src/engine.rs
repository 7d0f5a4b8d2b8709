//! The recognition loop.
//!
//! One frame at a time: pull → detect/encode → track → classify → blink
//! gate → record → render. Single-threaded by design; the only work pushed
//! off-thread is the relay trigger (via [`crate::relay`]) and the ledger
//! write, which stays synchronous from the loop's point of view. Per-frame
//! failures are absorbed; the loop ends only on operator quit or stream
//! loss, and always yields a session summary.

use rollcall_core::types::BoundingBox;
use rollcall_core::{average_ear, classify, BlinkGate, EuclideanMatcher, FaceAnalyzer, FaceClass, FaceTracker};
use rollcall_store::Gallery;

use crate::display::{FrameView, Ui, UiEvent};
use crate::recorder::AttendanceRecorder;
use crate::render::{FaceOverlay, OverlayKind};
use crate::session::{EndReason, SessionState, SessionSummary};
use crate::stream::FrameSource;

/// Loop tuning, split from [`crate::config::Config`] so tests construct it
/// directly.
#[derive(Debug, Clone, Copy)]
pub struct EngineOptions {
    pub match_tolerance: f32,
    pub ear_threshold: f32,
    pub ear_consec_frames: u32,
    pub track_min_iou: f32,
    pub track_grace_frames: u32,
    pub feed_capacity: usize,
}

impl EngineOptions {
    pub fn from_config(config: &crate::config::Config) -> Self {
        Self {
            match_tolerance: config.match_tolerance,
            ear_threshold: config.ear_threshold,
            ear_consec_frames: config.ear_consec_frames,
            track_min_iou: config.track_min_iou,
            track_grace_frames: config.track_grace_frames,
            feed_capacity: config.feed_capacity,
        }
    }
}

/// Run the recognition loop to completion.
pub fn run_loop<S, A, U>(
    options: EngineOptions,
    gallery: &Gallery,
    source: &mut S,
    analyzer: &mut A,
    ui: &mut U,
    recorder: &AttendanceRecorder,
) -> SessionSummary
where
    S: FrameSource,
    A: FaceAnalyzer,
    U: Ui,
{
    let matcher = EuclideanMatcher;
    let mut tracker = FaceTracker::new(options.track_min_iou, options.track_grace_frames);
    let mut gate = BlinkGate::new(options.ear_threshold, options.ear_consec_frames);
    let mut session = SessionState::new(options.feed_capacity);

    tracing::info!(
        recognizable = gallery.entries.len(),
        roster = gallery.roster.len(),
        "recognition loop started"
    );

    let end = 'frames: loop {
        let frame = match source.next_frame() {
            Ok(Some(frame)) => frame,
            Ok(None) => break EndReason::StreamEnded,
            Err(e) => break EndReason::StreamFailed(e.to_string()),
        };

        let faces = match analyzer.analyze(&frame) {
            Ok(faces) => faces,
            Err(e) => {
                tracing::warn!(error = %e, "frame analysis failed, skipping frame");
                continue;
            }
        };

        let boxes: Vec<BoundingBox> = faces.iter().map(|f| f.bbox).collect();
        let track_ids = tracker.observe(&boxes);
        // Stale counters die with their tracks
        gate.retain_tracks(|id| tracker.is_alive(id));

        let mut overlays = Vec::with_capacity(faces.len());
        for (face, track) in faces.iter().zip(track_ids.iter().copied()) {
            let class = classify(
                &matcher,
                &face.embedding,
                &gallery.entries,
                options.match_tolerance,
                session.present_ids(),
            );

            let overlay = match class {
                FaceClass::Unknown => FaceOverlay {
                    bbox: face.bbox,
                    label: "Unknown".to_string(),
                    kind: OverlayKind::Unknown,
                    ear: None,
                },
                FaceClass::Present { index, .. } => FaceOverlay {
                    bbox: face.bbox,
                    label: gallery.entries[index].name.clone(),
                    kind: OverlayKind::Present,
                    ear: None,
                },
                FaceClass::PendingLiveness { index, .. } => {
                    let ear = average_ear(&face.left_eye, &face.right_eye);
                    if gate.observe(track, ear) {
                        let entry = &gallery.entries[index];
                        tracing::info!(student = %entry.name, "blink confirmed");
                        recorder.record(&mut session, entry);
                    }
                    FaceOverlay {
                        bbox: face.bbox,
                        label: format!("{} (blink to check in)", gallery.entries[index].name),
                        kind: OverlayKind::PendingLiveness,
                        ear: Some(ear),
                    }
                }
            };
            overlays.push(overlay);
        }

        let view = FrameView {
            frame: &frame,
            overlays: &overlays,
            feed: session.feed(),
            roster: &gallery.roster,
            present: session.present_ids(),
        };
        let events = match ui.present(&view) {
            Ok(events) => events,
            Err(e) => break EndReason::DisplayFailed(e.to_string()),
        };

        for event in events {
            match event {
                UiEvent::Quit => break 'frames EndReason::OperatorQuit,
                UiEvent::EnterFullscreen => {
                    if let Err(e) = ui.set_fullscreen(true) {
                        tracing::warn!(error = %e, "fullscreen switch failed");
                    }
                }
                UiEvent::ExitFullscreen => {
                    if let Err(e) = ui.set_fullscreen(false) {
                        tracing::warn!(error = %e, "windowed switch failed");
                    }
                }
            }
        }
    };

    tracing::info!(end = ?end, "recognition loop ended");
    session.into_summary(gallery.roster.len(), end)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::display::UiError;
    use crate::relay::RelayTrigger;
    use crate::stream::StreamError;
    use image::RgbImage;
    use rollcall_core::types::{DetectedFace, Embedding, EyePoints};
    use rollcall_core::AnalyzerError;
    use rollcall_store::{AttendanceStore, RosterEntry};
    use std::collections::VecDeque;
    use std::path::Path;
    use tokio::runtime::Handle;

    struct FakeSource {
        frames: VecDeque<RgbImage>,
    }

    impl FrameSource for FakeSource {
        fn next_frame(&mut self) -> Result<Option<RgbImage>, StreamError> {
            Ok(self.frames.pop_front())
        }
    }

    /// One scripted face per frame: fixed box and embedding, per-frame EAR.
    struct FakeAnalyzer {
        embedding: Vec<f32>,
        ears: VecDeque<f32>,
    }

    /// Eye contour of width 3 whose EAR is exactly `ear`.
    fn eye_with_ear(ear: f32) -> EyePoints {
        let h = 1.5 * ear;
        [
            (0.0, 0.0),
            (1.0, h),
            (2.0, h),
            (3.0, 0.0),
            (2.0, -h),
            (1.0, -h),
        ]
    }

    impl FaceAnalyzer for FakeAnalyzer {
        fn analyze(&mut self, _frame: &RgbImage) -> Result<Vec<DetectedFace>, AnalyzerError> {
            let ear = self.ears.pop_front().unwrap_or(0.3);
            let eye = eye_with_ear(ear);
            Ok(vec![DetectedFace {
                bbox: rollcall_core::types::BoundingBox {
                    top: 10.0,
                    right: 50.0,
                    bottom: 50.0,
                    left: 10.0,
                },
                confidence: 0.95,
                embedding: Embedding { values: self.embedding.clone() },
                left_eye: eye,
                right_eye: eye,
            }])
        }
    }

    struct FakeUi {
        frames_seen: usize,
        quit_after: Option<usize>,
    }

    impl Ui for FakeUi {
        fn present(&mut self, _view: &FrameView) -> Result<Vec<UiEvent>, UiError> {
            self.frames_seen += 1;
            match self.quit_after {
                Some(n) if self.frames_seen >= n => Ok(vec![UiEvent::Quit]),
                _ => Ok(vec![]),
            }
        }

        fn set_fullscreen(&mut self, _enabled: bool) -> Result<(), UiError> {
            Ok(())
        }
    }

    fn one_student_gallery(student_id: i64, embedding: Vec<f32>) -> Gallery {
        Gallery {
            entries: vec![rollcall_core::types::GalleryEntry {
                student_id,
                name: "Aminah".to_string(),
                matric_no: "A23001".to_string(),
                embedding: Embedding { values: embedding },
            }],
            roster: vec![RosterEntry {
                student_id,
                name: "Aminah".to_string(),
                matric_no: "A23001".to_string(),
            }],
        }
    }

    fn options() -> EngineOptions {
        EngineOptions {
            match_tolerance: 0.45,
            ear_threshold: 0.25,
            ear_consec_frames: 2,
            track_min_iou: 0.3,
            track_grace_frames: 2,
            feed_capacity: 7,
        }
    }

    fn frames(n: usize) -> VecDeque<RgbImage> {
        (0..n).map(|_| RgbImage::new(64, 48)).collect()
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_blink_gated_attendance_end_to_end() {
        let store = AttendanceStore::open(Path::new(":memory:")).await.unwrap();
        let id = store.add_student("Aminah", "A23001", None).await.unwrap();
        let recorder =
            AttendanceRecorder::new(store.clone(), Handle::current(), RelayTrigger::disconnected());

        let summary = tokio::task::spawn_blocking(move || {
            let gallery = one_student_gallery(id, vec![1.0, 0.0]);
            let mut source = FakeSource { frames: frames(5) };
            // Closed for exactly two frames, then open: one blink
            let mut analyzer = FakeAnalyzer {
                embedding: vec![1.0, 0.0],
                ears: [0.15, 0.15, 0.30, 0.30, 0.30].into_iter().collect(),
            };
            let mut ui = FakeUi { frames_seen: 0, quit_after: None };
            run_loop(options(), &gallery, &mut source, &mut analyzer, &mut ui, &recorder)
        })
        .await
        .unwrap();

        assert_eq!(summary.present_count, 1);
        assert_eq!(summary.roster_total, 1);
        assert_eq!(summary.arrivals.len(), 1);
        assert_eq!(summary.arrivals[0].matric_no, "A23001");
        assert_eq!(summary.end, EndReason::StreamEnded);
        // Exactly one ledger row for the whole run
        assert_eq!(store.count_attendance().await.unwrap(), 1);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_short_blink_records_nothing() {
        let store = AttendanceStore::open(Path::new(":memory:")).await.unwrap();
        let id = store.add_student("Aminah", "A23001", None).await.unwrap();
        let recorder =
            AttendanceRecorder::new(store.clone(), Handle::current(), RelayTrigger::disconnected());

        let summary = tokio::task::spawn_blocking(move || {
            let gallery = one_student_gallery(id, vec![1.0, 0.0]);
            let mut source = FakeSource { frames: frames(3) };
            // Only one closed frame before the reopen: no blink
            let mut analyzer = FakeAnalyzer {
                embedding: vec![1.0, 0.0],
                ears: [0.15, 0.30, 0.30].into_iter().collect(),
            };
            let mut ui = FakeUi { frames_seen: 0, quit_after: None };
            run_loop(options(), &gallery, &mut source, &mut analyzer, &mut ui, &recorder)
        })
        .await
        .unwrap();

        assert_eq!(summary.present_count, 0);
        assert_eq!(store.count_attendance().await.unwrap(), 0);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_unknown_face_never_recorded() {
        let store = AttendanceStore::open(Path::new(":memory:")).await.unwrap();
        let id = store.add_student("Aminah", "A23001", None).await.unwrap();
        let recorder =
            AttendanceRecorder::new(store.clone(), Handle::current(), RelayTrigger::disconnected());

        let summary = tokio::task::spawn_blocking(move || {
            let gallery = one_student_gallery(id, vec![1.0, 0.0]);
            let mut source = FakeSource { frames: frames(4) };
            // Probe far outside tolerance: blinks must not matter
            let mut analyzer = FakeAnalyzer {
                embedding: vec![-1.0, 0.0],
                ears: [0.15, 0.15, 0.30, 0.30].into_iter().collect(),
            };
            let mut ui = FakeUi { frames_seen: 0, quit_after: None };
            run_loop(options(), &gallery, &mut source, &mut analyzer, &mut ui, &recorder)
        })
        .await
        .unwrap();

        assert_eq!(summary.present_count, 0);
        assert_eq!(store.count_attendance().await.unwrap(), 0);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_operator_quit_ends_loop() {
        let store = AttendanceStore::open(Path::new(":memory:")).await.unwrap();
        let id = store.add_student("Aminah", "A23001", None).await.unwrap();
        let recorder =
            AttendanceRecorder::new(store.clone(), Handle::current(), RelayTrigger::disconnected());

        let (summary, frames_seen) = tokio::task::spawn_blocking(move || {
            let gallery = one_student_gallery(id, vec![1.0, 0.0]);
            let mut source = FakeSource { frames: frames(100) };
            let mut analyzer = FakeAnalyzer { embedding: vec![1.0, 0.0], ears: VecDeque::new() };
            let mut ui = FakeUi { frames_seen: 0, quit_after: Some(3) };
            let summary =
                run_loop(options(), &gallery, &mut source, &mut analyzer, &mut ui, &recorder);
            (summary, ui.frames_seen)
        })
        .await
        .unwrap();

        assert_eq!(summary.end, EndReason::OperatorQuit);
        assert_eq!(frames_seen, 3);
    }
}
