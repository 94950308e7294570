// SPDX-FileCopyrightText: 2026 Atendo Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! SQLite persistence layer for the Atendo helpdesk core.
//!
//! Provides WAL-mode SQLite storage with embedded migrations, a
//! single-writer concurrency model via `tokio-rusqlite`, and typed CRUD
//! operations for connections, contacts, tickets, trackings, messages,
//! queues, and settings.
//!
//! All writes are serialized through the single background thread owned by
//! [`Database`]. Query modules accept `&Database` and call through
//! `connection().call()` — do not create additional connections for writes.

pub mod credential_store;
pub mod database;
pub mod migrations;
pub mod models;
pub mod queries;
pub mod settings_store;

pub use credential_store::SqliteCredentialStore;
pub use database::Database;
pub use models::*;
pub use settings_store::SqliteSettings;
