//! Rollcall storage — student roster, attendance ledger, and the
//! face-encoding files the gallery loads at startup.

pub mod encoding;
pub mod gallery;
pub mod store;

pub use encoding::{read_encoding, write_encoding, EncodingError};
pub use gallery::{load_gallery, Gallery, RosterEntry};
pub use store::{
    now_timestamp, AttendanceRow, AttendanceStore, RemovedStudent, StoreError, StudentRow,
};
