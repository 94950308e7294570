// SPDX-FileCopyrightText: 2026 Atendo Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Short-TTL cache of sent message payloads, backing the retry-decrypt
//! lookup.
//!
//! The protocol requires re-presenting previously sent message content
//! during retry-decrypt handshakes. Lookups hit the in-memory cache first
//! and fall back to the persisted message stores, parsing the stored raw
//! payload.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::debug;

use atendo_core::traits::transport::MessageLookup;
use atendo_core::types::WireMessage;
use atendo_storage::queries::messages as message_queries;
use atendo_storage::Database;

use crate::cache::TtlCache;

/// In-memory cache keyed by raw message id, holding the content payload.
pub struct SentMessageCache {
    inner: TtlCache<String, serde_json::Value>,
}

impl SentMessageCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            inner: TtlCache::new(ttl),
        }
    }

    /// Cache the content of an own outbound message. Inbound messages are
    /// ignored: only own sends are re-presented on retry.
    pub fn cache_sent(&self, msg: &WireMessage) {
        if !msg.key.from_me {
            return;
        }
        if let Ok(content) = serde_json::to_value(&msg.content) {
            debug!(id = %msg.key.id, "sent-message cache: saved");
            self.inner.set(msg.key.id.clone(), content);
        }
    }

    pub fn get(&self, id: &str) -> Option<serde_json::Value> {
        self.inner.get(&id.to_string())
    }

    pub fn set(&self, id: String, content: serde_json::Value) {
        self.inner.set(id, content);
    }
}

/// [`MessageLookup`] over the cache with persisted-store fallback.
pub struct RetryLookup {
    cache: Arc<SentMessageCache>,
    db: Database,
}

impl RetryLookup {
    pub fn new(cache: Arc<SentMessageCache>, db: Database) -> Self {
        Self { cache, db }
    }

    fn content_of(data_json: &str) -> Option<serde_json::Value> {
        let raw: serde_json::Value = serde_json::from_str(data_json).ok()?;
        let content = raw.get("content")?.clone();
        if content.is_null() {
            return None;
        }
        Some(content)
    }
}

#[async_trait]
impl MessageLookup for RetryLookup {
    async fn get(&self, message_id: &str) -> Option<serde_json::Value> {
        if let Some(content) = self.cache.get(message_id) {
            debug!(message_id, "retry lookup: recovered from cache");
            return Some(content);
        }

        debug!(message_id, "retry lookup: not in cache, falling back to database");

        let data_json = match message_queries::find_sent_by_raw_id(&self.db, message_id).await {
            Ok(Some(msg)) => msg.data_json,
            Ok(None) => match message_queries::get_out_of_ticket(&self.db, message_id).await {
                Ok(data) => data,
                Err(e) => {
                    debug!(message_id, error = %e, "retry lookup: out-of-ticket read failed");
                    None
                }
            },
            Err(e) => {
                debug!(message_id, error = %e, "retry lookup: message read failed");
                None
            }
        };

        let content = data_json.as_deref().and_then(Self::content_of)?;
        self.cache.set(message_id.to_string(), content.clone());
        Some(content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use atendo_core::types::{MessageContent, WireKey};

    fn sent_message(id: &str, text: &str) -> WireMessage {
        WireMessage {
            key: WireKey {
                id: id.into(),
                remote_jid: "5511999990000@s.whatsapp.net".into(),
                from_me: true,
                participant: None,
            },
            content: Some(MessageContent::Conversation { text: text.into() }),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn cached_sends_are_recovered() {
        let cache = Arc::new(SentMessageCache::new(Duration::from_secs(120)));
        cache.cache_sent(&sent_message("M1", "hello"));

        let db = Database::open_in_memory().await.unwrap();
        let lookup = RetryLookup::new(cache, db);
        let content = lookup.get("M1").await.expect("cached content");
        assert_eq!(content["kind"], "conversation");
    }

    #[tokio::test]
    async fn inbound_messages_are_not_cached() {
        let cache = SentMessageCache::new(Duration::from_secs(120));
        let mut msg = sent_message("M1", "hello");
        msg.key.from_me = false;
        cache.cache_sent(&msg);
        assert!(cache.get("M1").is_none());
    }

    #[tokio::test]
    async fn database_fallback_parses_stored_payload() {
        let cache = Arc::new(SentMessageCache::new(Duration::from_secs(120)));
        let db = Database::open_in_memory().await.unwrap();

        atendo_storage::queries::connections::insert_connection(&db, 10, 1, "main")
            .await
            .unwrap();
        let contact =
            atendo_storage::queries::contacts::upsert_contact(&db, 1, "5511", "Alice", false)
                .await
                .unwrap();
        let ticket = atendo_storage::queries::tickets::insert_ticket(&db, 1, contact.id, 10)
            .await
            .unwrap();

        let wire = sent_message("M2", "stored");
        let mut stored = atendo_storage::Message::blank("M2", ticket.id, 1);
        stored.from_me = true;
        stored.data_json = Some(serde_json::to_string(&wire).unwrap());
        message_queries::upsert_message(&db, &stored).await.unwrap();

        let lookup = RetryLookup::new(Arc::clone(&cache), db);
        let content = lookup.get("M2").await.expect("database fallback");
        assert_eq!(content["text"], "stored");

        // the fallback result is re-cached
        assert!(cache.get("M2").is_some());
    }

    #[tokio::test]
    async fn unknown_id_returns_none() {
        let cache = Arc::new(SentMessageCache::new(Duration::from_secs(120)));
        let db = Database::open_in_memory().await.unwrap();
        let lookup = RetryLookup::new(cache, db);
        assert!(lookup.get("missing").await.is_none());
    }
}
