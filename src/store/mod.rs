//! Persisted state: history store, categorization memory, unhandled entries,
//! and run logs. All documents are plain JSON; a missing or corrupt document
//! recovers to an empty default rather than failing the run.

pub mod history;
pub mod memory;
pub mod runlog;
pub mod unhandled;
