// SPDX-FileCopyrightText: 2026 Atendo Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Test utilities for Atendo integration tests.
//!
//! Provides mock collaborators and a storage harness for fast,
//! deterministic, CI-runnable tests without a live protocol connection.
//!
//! # Components
//!
//! - [`MockTransport`] / [`MockConnector`] - injectable protocol events and
//!   captured outbound traffic
//! - [`RecordingNotifier`] - captured realtime publications
//! - [`MemorySettings`], [`MockJobQueue`], [`FixedTranscriber`],
//!   [`FixedSchedules`] - the remaining collaborator seams
//! - [`TestHarness`] - an in-memory database with standard fixtures

pub mod harness;
pub mod mock_transport;
pub mod mocks;

pub use harness::{TestHarness, CONNECTION_ID, TENANT_ID};
pub use mock_transport::{MockConnector, MockTransport, SentText};
pub use mocks::{
    EnqueuedJob, FixedSchedules, FixedTranscriber, MemorySettings, MockJobQueue, Published,
    RecordingNotifier,
};
