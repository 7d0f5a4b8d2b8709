//! Attendance recording.

use rollcall_core::types::GalleryEntry;
use rollcall_store::{now_timestamp, AttendanceStore};
use tokio::runtime::Handle;

use crate::relay::RelayTrigger;
use crate::session::{FeedEntry, SessionState};

/// Commits liveness-confirmed recognitions: at most one ledger row and one
/// relay trigger per student per session.
pub struct AttendanceRecorder {
    store: AttendanceStore,
    runtime: Handle,
    relay: RelayTrigger,
}

impl AttendanceRecorder {
    pub fn new(store: AttendanceStore, runtime: Handle, relay: RelayTrigger) -> Self {
        Self {
            store,
            runtime,
            relay,
        }
    }

    /// Record attendance for a matched student.
    ///
    /// Returns `false` without any I/O if the student is already present
    /// this session. Returns `false` leaving session state untouched if the
    /// ledger write fails — the student stays retryable on a later blink.
    /// The relay trigger is fire-and-forget and never affects the outcome.
    pub fn record(&self, session: &mut SessionState, entry: &GalleryEntry) -> bool {
        if session.is_present(entry.student_id) {
            return false;
        }

        let timestamp = now_timestamp();
        let append = self
            .runtime
            .block_on(self.store.append_attendance(entry.student_id, &timestamp));
        if let Err(e) = append {
            tracing::warn!(student = %entry.name, error = %e, "attendance write failed");
            return false;
        }

        session.mark_present(entry.student_id);
        let time = timestamp.get(11..).unwrap_or(&timestamp).to_string();
        session.push_feed(FeedEntry {
            name: entry.name.clone(),
            matric_no: entry.matric_no.clone(),
            time,
        });

        tracing::info!(student = %entry.name, matric = %entry.matric_no, "attendance recorded");
        self.relay.fire();
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rollcall_core::types::Embedding;
    use std::path::Path;

    fn entry(student_id: i64) -> GalleryEntry {
        GalleryEntry {
            student_id,
            name: "Aminah".to_string(),
            matric_no: "A23001".to_string(),
            embedding: Embedding { values: vec![1.0, 0.0] },
        }
    }

    async fn store_with_student() -> (AttendanceStore, i64) {
        let store = AttendanceStore::open(Path::new(":memory:")).await.unwrap();
        let id = store.add_student("Aminah", "A23001", None).await.unwrap();
        (store, id)
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_record_is_at_most_once_per_session() {
        let (store, id) = store_with_student().await;
        let recorder =
            AttendanceRecorder::new(store.clone(), Handle::current(), RelayTrigger::disconnected());

        let (first, second, present, feed_len) = tokio::task::spawn_blocking(move || {
            let mut session = SessionState::new(7);
            let first = recorder.record(&mut session, &entry(id));
            let second = recorder.record(&mut session, &entry(id));
            (first, second, session.present_count(), session.feed().len())
        })
        .await
        .unwrap();

        assert!(first);
        assert!(!second);
        assert_eq!(present, 1);
        assert_eq!(feed_len, 1);
        // Exactly one ledger row despite two record calls
        assert_eq!(store.count_attendance().await.unwrap(), 1);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_dead_relay_does_not_block_recording() {
        let (store, id) = store_with_student().await;
        let recorder =
            AttendanceRecorder::new(store.clone(), Handle::current(), RelayTrigger::disconnected());

        let recorded = tokio::task::spawn_blocking(move || {
            let mut session = SessionState::new(7);
            recorder.record(&mut session, &entry(id))
        })
        .await
        .unwrap();

        assert!(recorded);
        assert_eq!(store.count_attendance().await.unwrap(), 1);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_ledger_failure_leaves_student_retryable() {
        let store = AttendanceStore::open(Path::new(":memory:")).await.unwrap();
        let id = store.add_student("Aminah", "A23001", None).await.unwrap();
        let recorder =
            AttendanceRecorder::new(store.clone(), Handle::current(), RelayTrigger::disconnected());

        let (failed, then_ok, present) = tokio::task::spawn_blocking(move || {
            let mut session = SessionState::new(7);
            // Unknown student id violates the foreign key: the write fails
            let failed = recorder.record(&mut session, &entry(999));
            let still_absent = !session.is_present(999);
            // A valid student still records fine afterwards
            let then_ok = recorder.record(&mut session, &entry(id));
            (failed, then_ok && still_absent, session.present_count())
        })
        .await
        .unwrap();

        assert!(!failed);
        assert!(then_ok);
        assert_eq!(present, 1);
        assert_eq!(store.count_attendance().await.unwrap(), 1);
    }
}
