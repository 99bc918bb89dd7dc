//! Integration tests for db-backup
//!
//! These tests require Docker and run full backup/restore cycles against real
//! database servers.
//! Run with: `cargo test -p db-backup-tests --test integration -- --ignored`

mod common;
mod mongodb;
mod mysql;
mod postgres;
