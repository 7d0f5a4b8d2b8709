//! Startup gallery loading.
//!
//! Reads every student row once and resolves encoding files into an
//! in-memory gallery. A missing or corrupt encoding excludes only that
//! student from recognition — they still appear on the roster — and never
//! aborts the load. Whether an empty gallery is fatal is the caller's call.

use std::path::Path;

use rollcall_core::types::GalleryEntry;

use crate::encoding;
use crate::store::{AttendanceStore, StoreError};

/// Roster entry: every enrolled student, recognizable or not.
#[derive(Debug, Clone)]
pub struct RosterEntry {
    pub student_id: i64,
    pub name: String,
    pub matric_no: String,
}

/// In-memory snapshot of the enrolled students, loaded once at startup.
pub struct Gallery {
    /// Students with a usable encoding, in load order (tie-break order for
    /// the matcher).
    pub entries: Vec<GalleryEntry>,
    /// Every student, for the full-roster display.
    pub roster: Vec<RosterEntry>,
}

/// Load all students and resolve their encodings.
pub async fn load_gallery(store: &AttendanceStore) -> Result<Gallery, StoreError> {
    let students = store.all_students().await?;

    let mut entries = Vec::new();
    let mut roster = Vec::with_capacity(students.len());

    for student in students {
        roster.push(RosterEntry {
            student_id: student.id,
            name: student.name.clone(),
            matric_no: student.matric_no.clone(),
        });

        let Some(path) = student.encoding_path.as_deref() else {
            tracing::debug!(student = %student.name, "no face encoding on record");
            continue;
        };

        match encoding::read_encoding(Path::new(path)) {
            Ok(embedding) => entries.push(GalleryEntry {
                student_id: student.id,
                name: student.name,
                matric_no: student.matric_no,
                embedding,
            }),
            Err(e) => {
                tracing::warn!(
                    student = %student.name,
                    path,
                    error = %e,
                    "failed to load face encoding, student excluded from recognition"
                );
            }
        }
    }

    tracing::info!(
        recognizable = entries.len(),
        roster = roster.len(),
        "gallery loaded"
    );

    Ok(Gallery { entries, roster })
}
