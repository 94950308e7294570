// SPDX-FileCopyrightText: 2026 Atendo Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Core library for the Atendo helpdesk ingestion pipeline.
//!
//! This crate provides the error type, wire-level protocol types, and the
//! collaborator traits the rest of the workspace builds on. The protocol
//! transport itself is external: everything here is the contract the core
//! holds it to.

pub mod error;
pub mod traits;
pub mod types;

pub use error::AtendoError;
pub use types::{ConnectionStatus, Presence, TicketStatus};

pub use traits::{
    CredentialStore, JobQueue, MessageLookup, Notifier, Schedules, Settings, Topic, Transcriber,
    Transport, TransportConnector,
};
