// SPDX-FileCopyrightText: 2026 Atendo Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Live-session registry: at most one in-process connection per id.
//!
//! The registry is an explicitly owned object created at process start and
//! injected into its consumers; all mutation goes through its methods.
//! Each registered handle carries an epoch so callbacks from a superseded
//! connection can detect they are stale before touching shared state.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::DashMap;

use atendo_core::traits::Transport;
use atendo_core::AtendoError;

use crate::cache::GroupMetadataCache;
use crate::message_cache::SentMessageCache;

/// One live connection: transport handle plus its per-connection caches.
pub struct SessionHandle {
    pub connection_id: i64,
    pub tenant_id: i64,
    /// Monotone token distinguishing this connection object from any
    /// replacement for the same id.
    pub epoch: u64,
    pub transport: Arc<dyn Transport>,
    pub message_cache: Arc<SentMessageCache>,
    pub group_cache: Arc<GroupMetadataCache>,
}

impl std::fmt::Debug for SessionHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionHandle")
            .field("connection_id", &self.connection_id)
            .field("tenant_id", &self.tenant_id)
            .field("epoch", &self.epoch)
            .finish_non_exhaustive()
    }
}

impl SessionHandle {
    /// The connection's primary jid, once open.
    pub fn jid(&self) -> Option<String> {
        self.transport.identity().map(|id| id.jid)
    }

    /// The connection's alternate linked-device id, once open.
    pub fn lid(&self) -> Option<String> {
        self.transport.identity().and_then(|id| id.lid)
    }
}

/// Process-wide map of live sessions keyed by connection id.
pub struct SessionRegistry {
    sessions: DashMap<i64, Arc<SessionHandle>>,
    epochs: AtomicU64,
}

impl Default for SessionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self {
            sessions: DashMap::new(),
            epochs: AtomicU64::new(1),
        }
    }

    /// Allocate the epoch for a connection object about to be built.
    pub fn next_epoch(&self) -> u64 {
        self.epochs.fetch_add(1, Ordering::Relaxed)
    }

    /// Register a handle, replacing any stale prior entry for the id.
    pub fn insert(&self, handle: Arc<SessionHandle>) {
        self.sessions.insert(handle.connection_id, handle);
    }

    /// The live session for a connection id.
    pub fn get(&self, connection_id: i64) -> Result<Arc<SessionHandle>, AtendoError> {
        self.sessions
            .get(&connection_id)
            .map(|entry| Arc::clone(entry.value()))
            .ok_or_else(AtendoError::not_initialized)
    }

    /// Remove and return the session, regardless of epoch.
    pub fn remove(&self, connection_id: i64) -> Option<Arc<SessionHandle>> {
        self.sessions.remove(&connection_id).map(|(_, handle)| handle)
    }

    /// Remove the session only if it still belongs to `epoch`. A superseded
    /// connection's teardown must not evict its replacement.
    pub fn remove_if_epoch(&self, connection_id: i64, epoch: u64) -> bool {
        self.sessions
            .remove_if(&connection_id, |_, handle| handle.epoch == epoch)
            .is_some()
    }

    /// Whether a registered entry for the id belongs to a different epoch.
    /// Zombie callbacks use this to stop before mutating shared state.
    pub fn is_superseded(&self, connection_id: i64, epoch: u64) -> bool {
        self.sessions
            .get(&connection_id)
            .map(|entry| entry.epoch != epoch)
            .unwrap_or(false)
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use atendo_core::types::{
        GroupMetadata, MediaKind, MediaRef, Presence, TransportIdentity, WireKey, WireMessage,
    };
    use std::time::Duration;

    struct InertTransport;

    #[async_trait]
    impl Transport for InertTransport {
        fn identity(&self) -> Option<TransportIdentity> {
            None
        }
        async fn send_text(&self, _jid: &str, _text: &str) -> Result<WireMessage, AtendoError> {
            Ok(WireMessage::default())
        }
        async fn download_media(
            &self,
            _media: &MediaRef,
            _kind: MediaKind,
        ) -> Result<atendo_core::traits::transport::MediaStream, AtendoError> {
            Err(AtendoError::Transport {
                message: "inert".into(),
                source: None,
            })
        }
        async fn group_metadata(&self, _jid: &str) -> Result<GroupMetadata, AtendoError> {
            Err(AtendoError::Transport {
                message: "inert".into(),
                source: None,
            })
        }
        async fn send_receipts(&self, _keys: &[WireKey]) -> Result<(), AtendoError> {
            Ok(())
        }
        async fn read_messages(&self, _keys: &[WireKey]) -> Result<(), AtendoError> {
            Ok(())
        }
        async fn send_presence(&self, _jid: &str, _presence: Presence) -> Result<(), AtendoError> {
            Ok(())
        }
        async fn resync_state(&self) -> Result<(), AtendoError> {
            Ok(())
        }
        async fn logout(&self) -> Result<(), AtendoError> {
            Ok(())
        }
        async fn close(&self) {}
    }

    fn handle(registry: &SessionRegistry, connection_id: i64) -> Arc<SessionHandle> {
        Arc::new(SessionHandle {
            connection_id,
            tenant_id: 1,
            epoch: registry.next_epoch(),
            transport: Arc::new(InertTransport),
            message_cache: Arc::new(SentMessageCache::new(Duration::from_secs(120))),
            group_cache: Arc::new(GroupMetadataCache::new(Duration::from_secs(300))),
        })
    }

    #[test]
    fn missing_session_is_a_typed_error() {
        let registry = SessionRegistry::new();
        let err = registry.get(10).unwrap_err();
        assert_eq!(err.code(), "ERR_WAPP_NOT_INITIALIZED");
    }

    #[test]
    fn replacement_supersedes_prior_entry() {
        let registry = SessionRegistry::new();
        let first = handle(&registry, 10);
        let second = handle(&registry, 10);

        registry.insert(Arc::clone(&first));
        registry.insert(Arc::clone(&second));
        assert_eq!(registry.len(), 1);

        assert!(registry.is_superseded(10, first.epoch));
        assert!(!registry.is_superseded(10, second.epoch));

        // stale teardown must not evict the replacement
        assert!(!registry.remove_if_epoch(10, first.epoch));
        assert_eq!(registry.len(), 1);
        assert!(registry.remove_if_epoch(10, second.epoch));
        assert!(registry.is_empty());
    }
}
