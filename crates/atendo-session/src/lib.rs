// SPDX-FileCopyrightText: 2026 Atendo Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Session management for the Atendo helpdesk core: connection lifecycle,
//! live-session registry, protocol version resolution, TTL caches, and the
//! per-key outbound debouncer.

pub mod cache;
pub mod debounce;
pub mod lifecycle;
pub mod message_cache;
pub mod registry;
pub mod version;

pub use cache::{GroupMetadataCache, TtlCache};
pub use debounce::Debouncer;
pub use lifecycle::{digits, ConnectionSupervisor, InboundHandler};
pub use message_cache::{RetryLookup, SentMessageCache};
pub use registry::{SessionHandle, SessionRegistry};
pub use version::{greater_version, VersionResolver, BUNDLED_VERSION};
