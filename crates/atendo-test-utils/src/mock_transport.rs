// SPDX-FileCopyrightText: 2026 Atendo Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Mock transport and connector for deterministic tests.
//!
//! `MockTransport` captures outbound traffic and serves configurable media
//! streams; `MockConnector` hands out the transport with a fresh event
//! stream per connect, and exposes `emit` to inject protocol events.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Mutex as StdMutex};

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::{self, StreamExt};
use tokio::sync::mpsc;

use atendo_core::traits::transport::{
    ConnectOptions, EventStream, MediaStream, Transport, TransportConnector,
};
use atendo_core::types::{
    GroupMetadata, MediaKind, MediaRef, MessageContent, Presence, TransportEvent,
    TransportIdentity, WireKey, WireMessage,
};
use atendo_core::AtendoError;

/// A captured outbound text send.
#[derive(Debug, Clone)]
pub struct SentText {
    pub jid: String,
    pub text: String,
}

/// Mock protocol transport capturing everything the core sends through it.
pub struct MockTransport {
    identity: StdMutex<Option<TransportIdentity>>,
    sent: StdMutex<Vec<SentText>>,
    send_counter: AtomicU64,
    /// Chunks served by `download_media` once failures are exhausted.
    media_chunks: StdMutex<Vec<Vec<u8>>>,
    /// Number of initial download attempts that fail.
    download_failures: AtomicU32,
    download_attempts: AtomicU32,
    groups: StdMutex<HashMap<String, GroupMetadata>>,
    group_fetches: AtomicU32,
    receipts: StdMutex<Vec<WireKey>>,
    reads: StdMutex<Vec<WireKey>>,
    presences: StdMutex<Vec<(String, Presence)>>,
    resyncs: AtomicU32,
    closed: AtomicBool,
    logged_out: AtomicBool,
}

impl Default for MockTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl MockTransport {
    pub fn new() -> Self {
        Self {
            identity: StdMutex::new(None),
            sent: StdMutex::new(Vec::new()),
            send_counter: AtomicU64::new(0),
            media_chunks: StdMutex::new(Vec::new()),
            download_failures: AtomicU32::new(0),
            download_attempts: AtomicU32::new(0),
            groups: StdMutex::new(HashMap::new()),
            group_fetches: AtomicU32::new(0),
            receipts: StdMutex::new(Vec::new()),
            reads: StdMutex::new(Vec::new()),
            presences: StdMutex::new(Vec::new()),
            resyncs: AtomicU32::new(0),
            closed: AtomicBool::new(false),
            logged_out: AtomicBool::new(false),
        }
    }

    /// Pretend the session paired as the given jid.
    pub fn set_identity(&self, jid: &str, lid: Option<&str>) {
        *self.identity.lock().unwrap() = Some(TransportIdentity {
            jid: jid.to_string(),
            lid: lid.map(|s| s.to_string()),
            name: None,
        });
    }

    /// Serve these chunks from `download_media`.
    pub fn set_media_chunks(&self, chunks: Vec<Vec<u8>>) {
        *self.media_chunks.lock().unwrap() = chunks;
    }

    /// Fail this many download attempts before succeeding.
    pub fn fail_downloads(&self, count: u32) {
        self.download_failures.store(count, Ordering::SeqCst);
    }

    pub fn add_group(&self, metadata: GroupMetadata) {
        self.groups.lock().unwrap().insert(metadata.jid.clone(), metadata);
    }

    pub fn sent_messages(&self) -> Vec<SentText> {
        self.sent.lock().unwrap().clone()
    }

    pub fn sent_count(&self) -> usize {
        self.sent.lock().unwrap().len()
    }

    pub fn receipts_sent(&self) -> Vec<WireKey> {
        self.receipts.lock().unwrap().clone()
    }

    pub fn reads_sent(&self) -> Vec<WireKey> {
        self.reads.lock().unwrap().clone()
    }

    pub fn download_attempts(&self) -> u32 {
        self.download_attempts.load(Ordering::SeqCst)
    }

    pub fn group_fetches(&self) -> u32 {
        self.group_fetches.load(Ordering::SeqCst)
    }

    pub fn resync_count(&self) -> u32 {
        self.resyncs.load(Ordering::SeqCst)
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    pub fn is_logged_out(&self) -> bool {
        self.logged_out.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Transport for MockTransport {
    fn identity(&self) -> Option<TransportIdentity> {
        self.identity.lock().unwrap().clone()
    }

    async fn send_text(&self, jid: &str, text: &str) -> Result<WireMessage, AtendoError> {
        let n = self.send_counter.fetch_add(1, Ordering::SeqCst);
        self.sent.lock().unwrap().push(SentText {
            jid: jid.to_string(),
            text: text.to_string(),
        });
        Ok(WireMessage {
            key: WireKey {
                id: format!("SENT-{n}"),
                remote_jid: jid.to_string(),
                from_me: true,
                participant: None,
            },
            content: Some(MessageContent::Conversation {
                text: text.to_string(),
            }),
            ..Default::default()
        })
    }

    async fn download_media(
        &self,
        _media: &MediaRef,
        _kind: MediaKind,
    ) -> Result<MediaStream, AtendoError> {
        self.download_attempts.fetch_add(1, Ordering::SeqCst);
        let failures = self.download_failures.load(Ordering::SeqCst);
        if failures > 0 {
            self.download_failures.store(failures - 1, Ordering::SeqCst);
            return Err(AtendoError::Transport {
                message: "mock download failure".into(),
                source: None,
            });
        }
        let chunks: Vec<Result<Bytes, AtendoError>> = self
            .media_chunks
            .lock()
            .unwrap()
            .iter()
            .map(|chunk| Ok(Bytes::from(chunk.clone())))
            .collect();
        Ok(stream::iter(chunks).boxed())
    }

    async fn group_metadata(&self, jid: &str) -> Result<GroupMetadata, AtendoError> {
        self.group_fetches.fetch_add(1, Ordering::SeqCst);
        self.groups
            .lock()
            .unwrap()
            .get(jid)
            .cloned()
            .ok_or_else(|| AtendoError::Transport {
                message: format!("unknown group {jid}"),
                source: None,
            })
    }

    async fn send_receipts(&self, keys: &[WireKey]) -> Result<(), AtendoError> {
        self.receipts.lock().unwrap().extend_from_slice(keys);
        Ok(())
    }

    async fn read_messages(&self, keys: &[WireKey]) -> Result<(), AtendoError> {
        self.reads.lock().unwrap().extend_from_slice(keys);
        Ok(())
    }

    async fn send_presence(&self, jid: &str, presence: Presence) -> Result<(), AtendoError> {
        self.presences.lock().unwrap().push((jid.to_string(), presence));
        Ok(())
    }

    async fn resync_state(&self) -> Result<(), AtendoError> {
        self.resyncs.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn logout(&self) -> Result<(), AtendoError> {
        self.logged_out.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}

/// Connector handing out one shared [`MockTransport`] with a fresh event
/// stream per connect.
pub struct MockConnector {
    pub transport: Arc<MockTransport>,
    events_tx: StdMutex<Option<mpsc::Sender<TransportEvent>>>,
    connect_count: AtomicU32,
    last_credentials: StdMutex<Option<serde_json::Value>>,
}

impl Default for MockConnector {
    fn default() -> Self {
        Self::new()
    }
}

impl MockConnector {
    pub fn new() -> Self {
        Self {
            transport: Arc::new(MockTransport::new()),
            events_tx: StdMutex::new(None),
            connect_count: AtomicU32::new(0),
            last_credentials: StdMutex::new(None),
        }
    }

    /// Inject a protocol event into the most recent event stream.
    pub async fn emit(&self, event: TransportEvent) {
        let tx = self
            .events_tx
            .lock()
            .unwrap()
            .clone()
            .expect("emit before connect");
        tx.send(event).await.expect("event stream closed");
    }

    pub fn connect_count(&self) -> u32 {
        self.connect_count.load(Ordering::SeqCst)
    }

    /// Credentials passed to the latest connect, if any.
    pub fn last_credentials(&self) -> Option<serde_json::Value> {
        self.last_credentials.lock().unwrap().clone()
    }
}

#[async_trait]
impl TransportConnector for MockConnector {
    async fn connect(
        &self,
        opts: ConnectOptions,
    ) -> Result<(Arc<dyn Transport>, EventStream), AtendoError> {
        self.connect_count.fetch_add(1, Ordering::SeqCst);
        *self.last_credentials.lock().unwrap() = opts.credentials.clone();
        let (tx, rx) = mpsc::channel(64);
        *self.events_tx.lock().unwrap() = Some(tx);
        Ok((Arc::clone(&self.transport) as Arc<dyn Transport>, rx))
    }
}
