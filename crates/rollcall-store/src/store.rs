use std::path::Path;

use thiserror::Error;
use tokio_rusqlite::Connection;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("database error: {0}")]
    Db(#[from] tokio_rusqlite::Error),
    #[error("rusqlite error: {0}")]
    Rusqlite(#[from] rusqlite::Error),
    #[error("a student with matric number '{0}' already exists")]
    DuplicateMatric(String),
    #[error("no student with matric number '{0}'")]
    UnknownMatric(String),
}

/// One enrolled student row.
#[derive(Debug, Clone, serde::Serialize)]
pub struct StudentRow {
    pub id: i64,
    pub name: String,
    pub matric_no: String,
    pub encoding_path: Option<String>,
    pub created_at: String,
}

/// One attendance event joined with its student.
#[derive(Debug, Clone, serde::Serialize)]
pub struct AttendanceRow {
    pub name: String,
    pub matric_no: String,
    pub checked_in_at: String,
}

/// Result of removing a student (manual cascade).
#[derive(Debug)]
pub struct RemovedStudent {
    pub student_id: i64,
    pub encoding_path: Option<String>,
    pub attendance_deleted: usize,
}

/// Current local time in the ledger's `YYYY-MM-DD HH:MM:SS` format, so
/// SQLite `date(...)` scoping works on the stored text.
pub fn now_timestamp() -> String {
    chrono::Local::now().format("%Y-%m-%d %H:%M:%S").to_string()
}

/// SQLite-backed student roster and attendance ledger.
///
/// The attendance table is append-only from the station's point of view;
/// only the operator-facing reset deletes rows.
#[derive(Clone)]
pub struct AttendanceStore {
    conn: Connection,
}

impl AttendanceStore {
    /// Open (or create) the database at the given path and run migrations.
    pub async fn open(db_path: &Path) -> Result<Self, StoreError> {
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent).ok();
        }

        let conn = Connection::open(db_path).await?;

        conn.call(|conn| {
            conn.execute_batch(
                "PRAGMA journal_mode = WAL;
                 PRAGMA foreign_keys = ON;
                 CREATE TABLE IF NOT EXISTS students (
                     id INTEGER PRIMARY KEY AUTOINCREMENT,
                     name TEXT NOT NULL,
                     matric_no TEXT NOT NULL UNIQUE,
                     encoding_path TEXT,
                     created_at TEXT NOT NULL
                 );
                 CREATE TABLE IF NOT EXISTS attendance (
                     id INTEGER PRIMARY KEY AUTOINCREMENT,
                     student_id INTEGER NOT NULL REFERENCES students(id),
                     checked_in_at TEXT NOT NULL
                 );
                 CREATE INDEX IF NOT EXISTS idx_attendance_student ON attendance(student_id);
                 CREATE INDEX IF NOT EXISTS idx_attendance_time ON attendance(checked_in_at);",
            )?;
            Ok(())
        })
        .await?;

        Ok(Self { conn })
    }

    /// Insert a new student. Returns the generated row id.
    pub async fn add_student(
        &self,
        name: &str,
        matric_no: &str,
        encoding_path: Option<&str>,
    ) -> Result<i64, StoreError> {
        let name = name.to_string();
        let matric = matric_no.to_string();
        let path = encoding_path.map(str::to_string);
        let created_at = now_timestamp();

        let result = self
            .conn
            .call(move |conn| {
                conn.execute(
                    "INSERT INTO students (name, matric_no, encoding_path, created_at)
                     VALUES (?1, ?2, ?3, ?4)",
                    rusqlite::params![name, matric, path, created_at],
                )?;
                Ok(conn.last_insert_rowid())
            })
            .await;

        match result {
            Ok(id) => Ok(id),
            Err(tokio_rusqlite::Error::Rusqlite(rusqlite::Error::SqliteFailure(e, _)))
                if e.code == rusqlite::ErrorCode::ConstraintViolation =>
            {
                Err(StoreError::DuplicateMatric(matric_no.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Every enrolled student, ordered by name.
    pub async fn all_students(&self) -> Result<Vec<StudentRow>, StoreError> {
        self.conn
            .call(|conn| {
                let mut stmt = conn.prepare(
                    "SELECT id, name, matric_no, encoding_path, created_at
                     FROM students ORDER BY name",
                )?;
                let rows = stmt.query_map([], |row| {
                    Ok(StudentRow {
                        id: row.get(0)?,
                        name: row.get(1)?,
                        matric_no: row.get(2)?,
                        encoding_path: row.get(3)?,
                        created_at: row.get(4)?,
                    })
                })?;
                Ok(rows.collect::<Result<Vec<_>, _>>()?)
            })
            .await
            .map_err(StoreError::from)
    }

    /// Remove a student by matric number: attendance rows first, then the
    /// student row (manual cascade). Returns what was removed so the caller
    /// can clean up the encoding file.
    pub async fn remove_student(&self, matric_no: &str) -> Result<RemovedStudent, StoreError> {
        let matric = matric_no.to_string();

        let removed = self
            .conn
            .call(move |conn| {
                let found: Option<(i64, Option<String>)> = conn
                    .query_row(
                        "SELECT id, encoding_path FROM students WHERE matric_no = ?1",
                        [&matric],
                        |row| Ok((row.get(0)?, row.get(1)?)),
                    )
                    .map(Some)
                    .or_else(|e| match e {
                        rusqlite::Error::QueryReturnedNoRows => Ok(None),
                        other => Err(other),
                    })?;

                let Some((student_id, encoding_path)) = found else {
                    return Ok(None);
                };

                let attendance_deleted = conn.execute(
                    "DELETE FROM attendance WHERE student_id = ?1",
                    [student_id],
                )?;
                conn.execute("DELETE FROM students WHERE id = ?1", [student_id])?;

                Ok(Some(RemovedStudent {
                    student_id,
                    encoding_path,
                    attendance_deleted,
                }))
            })
            .await?;

        removed.ok_or_else(|| StoreError::UnknownMatric(matric_no.to_string()))
    }

    /// Append one attendance event. Timestamp format: `YYYY-MM-DD HH:MM:SS`.
    pub async fn append_attendance(
        &self,
        student_id: i64,
        timestamp: &str,
    ) -> Result<(), StoreError> {
        let timestamp = timestamp.to_string();
        self.conn
            .call(move |conn| {
                conn.execute(
                    "INSERT INTO attendance (student_id, checked_in_at) VALUES (?1, ?2)",
                    rusqlite::params![student_id, timestamp],
                )?;
                Ok(())
            })
            .await
            .map_err(StoreError::from)
    }

    /// Every attendance event recorded today, oldest first.
    pub async fn attendance_today(&self) -> Result<Vec<AttendanceRow>, StoreError> {
        self.conn
            .call(|conn| {
                let mut stmt = conn.prepare(
                    "SELECT s.name, s.matric_no, a.checked_in_at
                     FROM attendance a JOIN students s ON a.student_id = s.id
                     WHERE date(a.checked_in_at) = date('now', 'localtime')
                     ORDER BY a.checked_in_at",
                )?;
                let rows = stmt.query_map([], |row| {
                    Ok(AttendanceRow {
                        name: row.get(0)?,
                        matric_no: row.get(1)?,
                        checked_in_at: row.get(2)?,
                    })
                })?;
                Ok(rows.collect::<Result<Vec<_>, _>>()?)
            })
            .await
            .map_err(StoreError::from)
    }

    /// Each student's first check-in today, ordered by arrival.
    pub async fn first_checkins_today(&self) -> Result<Vec<AttendanceRow>, StoreError> {
        self.conn
            .call(|conn| {
                let mut stmt = conn.prepare(
                    "SELECT s.name, s.matric_no, MIN(a.checked_in_at) AS first_in
                     FROM attendance a JOIN students s ON a.student_id = s.id
                     WHERE date(a.checked_in_at) = date('now', 'localtime')
                     GROUP BY s.id ORDER BY first_in",
                )?;
                let rows = stmt.query_map([], |row| {
                    Ok(AttendanceRow {
                        name: row.get(0)?,
                        matric_no: row.get(1)?,
                        checked_in_at: row.get(2)?,
                    })
                })?;
                Ok(rows.collect::<Result<Vec<_>, _>>()?)
            })
            .await
            .map_err(StoreError::from)
    }

    /// Delete today's attendance rows. Returns how many were removed.
    pub async fn reset_today(&self) -> Result<usize, StoreError> {
        self.conn
            .call(|conn| {
                let deleted = conn.execute(
                    "DELETE FROM attendance WHERE date(checked_in_at) = date('now', 'localtime')",
                    [],
                )?;
                Ok(deleted)
            })
            .await
            .map_err(StoreError::from)
    }

    /// Total enrolled students.
    pub async fn count_students(&self) -> Result<u64, StoreError> {
        self.conn
            .call(|conn| {
                let count: u64 =
                    conn.query_row("SELECT COUNT(*) FROM students", [], |row| row.get(0))?;
                Ok(count)
            })
            .await
            .map_err(StoreError::from)
    }

    /// Total attendance events, all dates.
    pub async fn count_attendance(&self) -> Result<u64, StoreError> {
        self.conn
            .call(|conn| {
                let count: u64 =
                    conn.query_row("SELECT COUNT(*) FROM attendance", [], |row| row.get(0))?;
                Ok(count)
            })
            .await
            .map_err(StoreError::from)
    }
}
