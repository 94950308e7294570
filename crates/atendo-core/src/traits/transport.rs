// SPDX-FileCopyrightText: 2026 Atendo Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Transport trait: the boundary to the external multi-device protocol
//! library.
//!
//! The core never assumes the transport retries internally, and it
//! re-registers a fresh event stream on every reconnect. Media downloads
//! are exposed as chunked byte streams so the caller can apply its own
//! rate limiting and size ceiling.

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::BoxStream;
use tokio::sync::mpsc;

use crate::error::AtendoError;
use crate::types::{
    GroupMetadata, MediaKind, MediaRef, Presence, TransportEvent, TransportIdentity, WireKey,
    WireMessage,
};

/// Per-connection event stream handed out by [`TransportConnector::connect`].
pub type EventStream = mpsc::Receiver<TransportEvent>;

/// Chunked media byte stream.
pub type MediaStream = BoxStream<'static, Result<Bytes, AtendoError>>;

/// An open protocol connection for one tenant phone number.
#[async_trait]
pub trait Transport: Send + Sync {
    /// The connection's own identity, available once the session is open.
    fn identity(&self) -> Option<TransportIdentity>;

    /// Sends a plain text message and returns the echoed wire message.
    async fn send_text(&self, jid: &str, text: &str) -> Result<WireMessage, AtendoError>;

    /// Opens a download stream for the referenced media.
    async fn download_media(
        &self,
        media: &MediaRef,
        kind: MediaKind,
    ) -> Result<MediaStream, AtendoError>;

    /// Fetches group metadata from the network (not the cache).
    async fn group_metadata(&self, jid: &str) -> Result<GroupMetadata, AtendoError>;

    /// Acknowledges receipt of the given message keys.
    async fn send_receipts(&self, keys: &[WireKey]) -> Result<(), AtendoError>;

    /// Marks the given messages as read on the remote side.
    async fn read_messages(&self, keys: &[WireKey]) -> Result<(), AtendoError>;

    /// Publishes a presence state to a chat.
    async fn send_presence(&self, jid: &str, presence: Presence) -> Result<(), AtendoError>;

    /// Requests a full application-state resynchronization.
    async fn resync_state(&self) -> Result<(), AtendoError>;

    /// Logs the session out remotely, invalidating its credentials.
    async fn logout(&self) -> Result<(), AtendoError>;

    /// Tears down the socket without logging out.
    async fn close(&self);
}

/// Lookup used by the transport during retry-decrypt handshakes: the
/// protocol requires re-presenting previously sent message content.
#[async_trait]
pub trait MessageLookup: Send + Sync {
    /// Returns the raw payload of a previously sent message, if known.
    async fn get(&self, message_id: &str) -> Option<serde_json::Value>;
}

/// Lookup the transport uses for cached group metadata.
#[async_trait]
pub trait GroupLookup: Send + Sync {
    async fn get(&self, jid: &str) -> Option<GroupMetadata>;
}

/// Everything needed to open one connection.
pub struct ConnectOptions {
    pub connection_id: i64,
    /// Persisted credential material from a prior pairing, if any.
    pub credentials: Option<serde_json::Value>,
    /// Resolved protocol version components.
    pub version: Vec<u32>,
    /// Client identification presented to the remote service.
    pub client_name: String,
    pub message_lookup: Arc<dyn MessageLookup>,
    pub group_lookup: Arc<dyn GroupLookup>,
}

/// Factory opening transport connections.
#[async_trait]
pub trait TransportConnector: Send + Sync {
    /// Opens a connection and returns its handle plus its event stream.
    ///
    /// The stream carries every lifecycle, credential, message, presence,
    /// and group event for this connection until the socket dies.
    async fn connect(
        &self,
        opts: ConnectOptions,
    ) -> Result<(Arc<dyn Transport>, EventStream), AtendoError>;
}
