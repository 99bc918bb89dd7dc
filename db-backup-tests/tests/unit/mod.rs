//! Unit tests for db-backup
//!
//! Configuration, escaping and artifact handling, no database required.

mod config;
