// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! State store backends for the Courier delivery scheduler.
//!
//! [`SqliteStateStore`] persists state in a WAL-mode SQLite database with
//! embedded migrations; every write goes through tokio-rusqlite's single
//! background thread inside an immediate transaction. [`MemoryStateStore`]
//! keeps state in a sharded map for single-process deployments and tests.

pub mod database;
pub mod memory;
pub mod migrations;
pub mod sqlite;

pub use database::Database;
pub use memory::MemoryStateStore;
pub use sqlite::SqliteStateStore;
