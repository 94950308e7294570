// SPDX-FileCopyrightText: 2026 Atendo Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Collaborator trait definitions for the Atendo core.
//!
//! Each trait is the seam to a subsystem this core treats as external:
//! the protocol transport, credential persistence, realtime notification,
//! background jobs, transcription, per-tenant settings, and schedules.
//! All async traits use `#[async_trait]` for dynamic dispatch.

pub mod credentials;
pub mod jobs;
pub mod notifier;
pub mod schedules;
pub mod settings;
pub mod transcriber;
pub mod transport;

pub use credentials::CredentialStore;
pub use jobs::JobQueue;
pub use notifier::{Notifier, Topic};
pub use schedules::Schedules;
pub use settings::Settings;
pub use transcriber::{Transcriber, TranscriberOptions};
pub use transport::{
    ConnectOptions, EventStream, GroupLookup, MediaStream, MessageLookup, Transport,
    TransportConnector,
};
