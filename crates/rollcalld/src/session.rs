//! Per-run session state, owned exclusively by the recognition loop thread.
//!
//! The source system kept this as loose fields on a long-lived object;
//! here it is one owned struct so the at-most-once and feed-cap invariants
//! have a single home.

use std::collections::HashSet;

/// One line of the recent check-ins panel.
#[derive(Debug, Clone, PartialEq)]
pub struct FeedEntry {
    pub name: String,
    pub matric_no: String,
    pub time: String,
}

/// Why the recognition loop ended.
#[derive(Debug, Clone, PartialEq)]
pub enum EndReason {
    OperatorQuit,
    StreamEnded,
    StreamFailed(String),
    DisplayFailed(String),
}

/// Session-mutable state: who has checked in, and the display feed.
pub struct SessionState {
    present: HashSet<i64>,
    /// Most-recent-first, capped at `feed_capacity`.
    feed: Vec<FeedEntry>,
    feed_capacity: usize,
}

impl SessionState {
    pub fn new(feed_capacity: usize) -> Self {
        Self {
            present: HashSet::new(),
            feed: Vec::new(),
            feed_capacity,
        }
    }

    pub fn is_present(&self, student_id: i64) -> bool {
        self.present.contains(&student_id)
    }

    /// Mark a student present. The set only grows within a session.
    pub fn mark_present(&mut self, student_id: i64) {
        self.present.insert(student_id);
    }

    pub fn present_ids(&self) -> &HashSet<i64> {
        &self.present
    }

    pub fn present_count(&self) -> usize {
        self.present.len()
    }

    /// Push a check-in onto the display feed, dropping the oldest entry once
    /// the cap is reached.
    pub fn push_feed(&mut self, entry: FeedEntry) {
        self.feed.insert(0, entry);
        self.feed.truncate(self.feed_capacity);
    }

    /// Display feed, most recent first.
    pub fn feed(&self) -> &[FeedEntry] {
        &self.feed
    }

    pub fn into_summary(self, roster_total: usize, end: EndReason) -> SessionSummary {
        let mut arrivals = self.feed;
        arrivals.reverse();
        SessionSummary {
            present_count: self.present.len(),
            roster_total,
            arrivals,
            end,
        }
    }
}

/// Printed when the loop exits, however it exits.
#[derive(Debug)]
pub struct SessionSummary {
    pub present_count: usize,
    pub roster_total: usize,
    /// Recent arrivals in chronological order. Display feed only — the
    /// attendance ledger is authoritative.
    pub arrivals: Vec<FeedEntry>,
    pub end: EndReason,
}

impl SessionSummary {
    pub fn render(&self) -> String {
        let mut out = String::new();
        out.push_str("===== attendance session summary =====\n");
        if self.present_count == 0 {
            out.push_str("no attendance recorded\n");
        } else {
            out.push_str(&format!(
                "present: {}/{}\n",
                self.present_count, self.roster_total
            ));
            for entry in &self.arrivals {
                out.push_str(&format!(
                    "- {} ({}) @ {}\n",
                    entry.name, entry.matric_no, entry.time
                ));
            }
        }
        out
    }
}
