//! Pipeline tests for db-backup
//!
//! Backup, restore, listing and scheduling against real SQLite files with
//! local storage, plus mock handlers where an engine or bucket would be needed.

mod list;
mod restore;
