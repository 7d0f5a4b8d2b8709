//! Frame-to-frame face correlation.
//!
//! The blink gate needs to follow one face across consecutive frames.
//! Keying on raw bounding-box coordinates is fragile — one pixel of
//! detection jitter creates a new identity and resets the blink counter —
//! so detections are matched to live tracks by bounding-box overlap
//! instead, and each track carries a stable synthetic id. A track survives
//! a short run of missed frames (`grace`) to tolerate single-frame
//! detection dropout.

use crate::types::BoundingBox;

/// Stable synthetic identity for one face across consecutive frames.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TrackId(u64);

#[derive(Debug)]
struct Track {
    id: TrackId,
    bbox: BoundingBox,
    missed: u32,
}

/// Greedy IoU tracker.
///
/// Each detection claims the live track it overlaps most (at or above
/// `min_iou`); detections with no overlapping track start new ones. Tracks
/// unseen for more than `grace` consecutive frames are retired. With
/// `grace = 0` a track dies the first frame its face is absent.
pub struct FaceTracker {
    tracks: Vec<Track>,
    next_id: u64,
    min_iou: f32,
    grace: u32,
}

impl FaceTracker {
    pub fn new(min_iou: f32, grace: u32) -> Self {
        Self {
            tracks: Vec::new(),
            next_id: 0,
            min_iou,
            grace,
        }
    }

    /// Assign a [`TrackId`] to each detection box, in order, updating track
    /// state and retiring stale tracks.
    pub fn observe(&mut self, boxes: &[BoundingBox]) -> Vec<TrackId> {
        let mut claimed = vec![false; self.tracks.len()];
        let mut ids = Vec::with_capacity(boxes.len());

        for bbox in boxes {
            let mut best: Option<(usize, f32)> = None;
            for (ti, track) in self.tracks.iter().enumerate() {
                if claimed[ti] {
                    continue;
                }
                let iou = track.bbox.iou(bbox);
                if iou >= self.min_iou && best.map_or(true, |(_, b)| iou > b) {
                    best = Some((ti, iou));
                }
            }

            match best {
                Some((ti, _)) => {
                    claimed[ti] = true;
                    self.tracks[ti].bbox = *bbox;
                    self.tracks[ti].missed = 0;
                    ids.push(self.tracks[ti].id);
                }
                None => {
                    let id = TrackId(self.next_id);
                    self.next_id += 1;
                    self.tracks.push(Track { id, bbox: *bbox, missed: 0 });
                    claimed.push(true);
                    ids.push(id);
                }
            }
        }

        // Age unclaimed tracks; retire those past the grace window.
        let grace = self.grace;
        let mut kept = Vec::with_capacity(self.tracks.len());
        for (ti, mut track) in self.tracks.drain(..).enumerate() {
            if claimed[ti] {
                kept.push(track);
            } else {
                track.missed += 1;
                if track.missed <= grace {
                    kept.push(track);
                }
            }
        }
        self.tracks = kept;

        ids
    }

    /// Whether a track survived the most recent `observe` call.
    pub fn is_alive(&self, id: TrackId) -> bool {
        self.tracks.iter().any(|t| t.id == id)
    }

    /// Number of live tracks (including those inside their grace window).
    pub fn len(&self) -> usize {
        self.tracks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tracks.is_empty()
    }
}
