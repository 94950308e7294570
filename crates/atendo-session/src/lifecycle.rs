// SPDX-FileCopyrightText: 2026 Atendo Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Connection lifecycle manager.
//!
//! One supervisor drives every tenant connection: it opens the transport
//! with persisted credentials and the resolved protocol version, then owns
//! the connection's event loop. Events are consumed in arrival order on a
//! single task per connection, so inbound handlers never interleave within
//! one connection.
//!
//! State machine per connection:
//! `uninitialized -> qrcode <-> connecting -> connected -> {pending, disconnected}`
//! where `pending` is a soft drop followed by a delayed reconnect and
//! `disconnected` is terminal (credentials wiped, operator must re-pair).

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use serde_json::json;
use tokio::time::sleep;
use tracing::{debug, error, info, warn};

use atendo_config::model::SessionConfig;
use atendo_core::traits::transport::ConnectOptions;
use atendo_core::types::{
    close_code, AckUpdate, ConnectionStatus, ConnectionUpdate, PresenceUpdate, TransportEvent,
    WireMessage,
};
use atendo_core::{
    AtendoError, CredentialStore, Notifier, Topic, Transport, TransportConnector,
};
use atendo_storage::queries::{connections, contacts, tickets};
use atendo_storage::Database;

use crate::cache::GroupMetadataCache;
use crate::message_cache::{RetryLookup, SentMessageCache};
use crate::registry::{SessionHandle, SessionRegistry};
use crate::version::VersionResolver;

/// Consumer of inbound message traffic for one connection.
///
/// Implementations must catch their own failures: one bad message must
/// never take the connection's event loop down.
#[async_trait]
pub trait InboundHandler: Send + Sync {
    async fn messages_upsert(&self, session: Arc<SessionHandle>, messages: Vec<WireMessage>);
    async fn messages_update(&self, session: Arc<SessionHandle>, updates: Vec<AckUpdate>);
}

/// Drives the lifecycle of every tenant connection in the process.
pub struct ConnectionSupervisor {
    db: Database,
    config: SessionConfig,
    client_name: String,
    registry: Arc<SessionRegistry>,
    version: Arc<VersionResolver>,
    connector: Arc<dyn TransportConnector>,
    credentials: Arc<dyn CredentialStore>,
    notifier: Arc<dyn Notifier>,
    handler: Arc<dyn InboundHandler>,
    /// Unused-QR counters per connection id, reset on successful pairing.
    qr_retries: DashMap<i64, u32>,
}

impl ConnectionSupervisor {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        db: Database,
        config: SessionConfig,
        client_name: String,
        registry: Arc<SessionRegistry>,
        version: Arc<VersionResolver>,
        connector: Arc<dyn TransportConnector>,
        credentials: Arc<dyn CredentialStore>,
        notifier: Arc<dyn Notifier>,
        handler: Arc<dyn InboundHandler>,
    ) -> Self {
        Self {
            db,
            config,
            client_name,
            registry,
            version,
            connector,
            credentials,
            notifier,
            handler,
            qr_retries: DashMap::new(),
        }
    }

    pub fn registry(&self) -> &Arc<SessionRegistry> {
        &self.registry
    }

    /// Open the connection and start its event loop.
    ///
    /// Returns once the transport is connecting; pairing and open-state
    /// transitions arrive through the event loop. `is_refresh` marks a
    /// restart over existing credentials and schedules the deferred state
    /// resync once the connection opens.
    pub async fn start_session(
        self: Arc<Self>,
        connection_id: i64,
        is_refresh: bool,
    ) -> Result<(), AtendoError> {
        let connection = connections::get_connection(&self.db, connection_id)
            .await?
            .ok_or_else(|| AtendoError::app("ERR_NO_WAPP_FOUND", 404))?;

        let version = self.version.resolve().await;
        info!(
            connection = %connection.name,
            version = ?version,
            "starting session"
        );

        let credentials = self.credentials.load(connection_id).await?;

        let message_cache = Arc::new(SentMessageCache::new(Duration::from_secs(
            self.config.message_cache_ttl_secs,
        )));
        let group_cache = Arc::new(GroupMetadataCache::new(Duration::from_secs(
            self.config.group_cache_ttl_secs,
        )));

        let opts = ConnectOptions {
            connection_id,
            credentials,
            version,
            client_name: self.client_name.clone(),
            message_lookup: Arc::new(RetryLookup::new(
                Arc::clone(&message_cache),
                self.db.clone(),
            )),
            group_lookup: Arc::clone(&group_cache) as Arc<_>,
        };

        let (transport, events) = self.connector.connect(opts).await?;

        // The fetcher needs the transport, which only exists now.
        {
            let transport = Arc::clone(&transport);
            group_cache.set_fetcher(Arc::new(move |jid| {
                let transport = Arc::clone(&transport);
                Box::pin(async move { transport.group_metadata(&jid).await.ok() })
            }));
        }

        let handle = Arc::new(SessionHandle {
            connection_id,
            tenant_id: connection.tenant_id,
            epoch: self.registry.next_epoch(),
            transport,
            message_cache,
            group_cache,
        });

        let supervisor = Arc::clone(&self);
        tokio::spawn(async move {
            supervisor.run_event_loop(handle, events, is_refresh).await;
        });

        Ok(())
    }

    /// Tear a session down on operator request.
    ///
    /// With `logout` the remote pairing is invalidated and credentials are
    /// wiped; without it only the in-process socket dies.
    pub async fn disconnect_session(
        &self,
        connection_id: i64,
        logout: bool,
    ) -> Result<(), AtendoError> {
        let handle = self.registry.get(connection_id)?;
        if logout {
            if let Err(e) = handle.transport.logout().await {
                warn!(connection_id, error = %e, "remote logout failed");
            }
            self.credentials.wipe(connection_id).await?;
            connections::mark_disconnected(&self.db, connection_id).await?;
            self.notify_session(handle.tenant_id, connection_id, ConnectionStatus::Disconnected);
        }
        self.registry.remove(connection_id);
        handle.transport.close().await;
        self.qr_retries.remove(&connection_id);
        Ok(())
    }

    async fn run_event_loop(
        self: Arc<Self>,
        handle: Arc<SessionHandle>,
        mut events: atendo_core::traits::transport::EventStream,
        is_refresh: bool,
    ) {
        let connection_id = handle.connection_id;
        let mut pending_resync = is_refresh;

        while let Some(event) = events.recv().await {
            // A replacement connection owns this id now; this callback is a
            // zombie and must stop touching shared state.
            if self.registry.is_superseded(connection_id, handle.epoch) {
                debug!(connection_id, "event loop superseded, stopping");
                break;
            }

            match event {
                TransportEvent::Connection(ConnectionUpdate::Qr(qr)) => {
                    if self.handle_qr(&handle, &qr).await {
                        break;
                    }
                }
                TransportEvent::Connection(ConnectionUpdate::Open) => {
                    Arc::clone(&self).handle_open(&handle, pending_resync).await;
                    pending_resync = false;
                }
                TransportEvent::Connection(ConnectionUpdate::Close { status_code }) => {
                    Arc::clone(&self).handle_close(&handle, status_code).await;
                    break;
                }
                TransportEvent::CredsUpdate(creds) => {
                    if let Err(e) = self.credentials.save(connection_id, &creds).await {
                        error!(connection_id, error = %e, "failed to persist credentials");
                    }
                }
                TransportEvent::MessagesUpsert(messages) => {
                    for msg in &messages {
                        handle.message_cache.cache_sent(msg);
                    }
                    self.handler
                        .messages_upsert(Arc::clone(&handle), messages)
                        .await;
                }
                TransportEvent::MessagesUpdate(updates) => {
                    self.handler
                        .messages_update(Arc::clone(&handle), updates)
                        .await;
                }
                TransportEvent::Presence(update) => {
                    self.handle_presence(&handle, update).await;
                }
                TransportEvent::GroupsUpsert(groups) => {
                    debug!(connection_id, count = groups.len(), "received new groups");
                    for group in groups {
                        handle.group_cache.set(group.jid.clone(), group);
                    }
                }
                TransportEvent::GroupUpdate { jid }
                | TransportEvent::GroupParticipantsUpdate { jid } => {
                    match handle.transport.group_metadata(&jid).await {
                        Ok(metadata) => handle.group_cache.set(jid, metadata),
                        Err(_) => handle.group_cache.del(&jid),
                    }
                }
            }
        }
        debug!(connection_id, "event loop finished");
    }

    /// Handle a fresh QR challenge. Returns `true` when the pairing attempt
    /// was force-terminated and the event loop must stop.
    async fn handle_qr(&self, handle: &Arc<SessionHandle>, qr: &str) -> bool {
        let connection_id = handle.connection_id;
        let count = {
            let mut entry = self.qr_retries.entry(connection_id).or_insert(0);
            *entry += 1;
            *entry
        };

        if count > self.config.qr_max_retries {
            // Abandoned pairing: cap resource use instead of refreshing forever.
            warn!(connection_id, "QR retry cap reached, terminating pairing attempt");
            self.qr_retries.remove(&connection_id);
            self.registry.remove_if_epoch(connection_id, handle.epoch);
            handle.transport.close().await;
            if let Err(e) = self.credentials.wipe(connection_id).await {
                error!(connection_id, error = %e, "failed to wipe credentials");
            }
            if let Err(e) = connections::mark_disconnected(&self.db, connection_id).await {
                error!(connection_id, error = %e, "failed to mark connection disconnected");
            }
            self.notify_session(handle.tenant_id, connection_id, ConnectionStatus::Disconnected);
            return true;
        }

        info!(connection_id, attempt = count, "QR code issued");
        if let Err(e) = connections::record_qr(&self.db, connection_id, qr).await {
            error!(connection_id, error = %e, "failed to record QR code");
        }
        // Register so operators can reach the session while pairing.
        if self.registry.get(connection_id).is_err() {
            self.registry.insert(Arc::clone(handle));
        }
        self.notify_session(handle.tenant_id, connection_id, ConnectionStatus::Qrcode);
        false
    }

    async fn handle_open(self: Arc<Self>, handle: &Arc<SessionHandle>, pending_resync: bool) {
        let connection_id = handle.connection_id;
        info!(
            connection_id,
            jid = handle.jid().as_deref().unwrap_or(""),
            lid = handle.lid().as_deref().unwrap_or(""),
            "session open"
        );

        self.qr_retries.remove(&connection_id);
        self.registry.insert(Arc::clone(handle));

        if let Err(e) = connections::mark_connected(&self.db, connection_id).await {
            error!(connection_id, error = %e, "failed to mark connection connected");
        }
        self.notify_session(handle.tenant_id, connection_id, ConnectionStatus::Connected);

        if pending_resync {
            // Credential refresh rather than first pairing: resync the full
            // app state once the connection has settled.
            let supervisor = Arc::clone(&self);
            let handle = Arc::clone(handle);
            let delay = Duration::from_secs(self.config.resync_delay_secs);
            tokio::spawn(async move {
                sleep(delay).await;
                if supervisor
                    .registry
                    .is_superseded(handle.connection_id, handle.epoch)
                {
                    return;
                }
                if let Err(e) = handle.transport.resync_state().await {
                    error!(
                        connection_id = handle.connection_id,
                        error = %e,
                        "state resync failed"
                    );
                }
            });
        }
    }

    async fn handle_close(self: Arc<Self>, handle: &Arc<SessionHandle>, status_code: u16) {
        let connection_id = handle.connection_id;
        info!(connection_id, status_code, "connection closed");

        self.registry.remove_if_epoch(connection_id, handle.epoch);
        handle.transport.close().await;

        match status_code {
            close_code::FORBIDDEN | close_code::LOGGED_OUT => {
                // Auth rejection or explicit logout: terminal, wipe and
                // require operator re-pairing.
                if let Err(e) = self.credentials.wipe(connection_id).await {
                    error!(connection_id, error = %e, "failed to wipe credentials");
                }
                if let Err(e) = connections::mark_disconnected(&self.db, connection_id).await {
                    error!(connection_id, error = %e, "failed to mark connection disconnected");
                }
                self.notify_session(
                    handle.tenant_id,
                    connection_id,
                    ConnectionStatus::Disconnected,
                );
            }
            _ => {
                // Ordinary drop: soft state plus a delayed reconnect that
                // reloads tenant configuration first.
                if let Err(e) =
                    connections::set_status(&self.db, connection_id, ConnectionStatus::Pending)
                        .await
                {
                    error!(connection_id, error = %e, "failed to mark connection pending");
                }
                self.notify_session(handle.tenant_id, connection_id, ConnectionStatus::Pending);

                let supervisor = Arc::clone(&self);
                let delay = Duration::from_secs(self.config.reconnect_delay_secs);
                let epoch = handle.epoch;
                info!(connection_id, delay_secs = delay.as_secs(), "scheduling reconnect");
                // Routed through a free function so that the recursive call to
                // `start_session` lives outside this method's defining scope,
                // breaking the opaque-type `Send`-inference cycle between
                // `start_session`, `run_event_loop`, and `handle_close`.
                schedule_reconnect(supervisor, connection_id, epoch, delay);
            }
        }
    }

    /// Forward a presence update to the owning ticket's subscribers, if the
    /// contact has an open conversation.
    async fn handle_presence(&self, handle: &Arc<SessionHandle>, update: PresenceUpdate) {
        if update.remote_jid.ends_with("@g.us") {
            return;
        }

        let result: Result<(), AtendoError> = async {
            let number = digits(&update.remote_jid);
            let Some(contact) =
                contacts::find_by_number(&self.db, handle.tenant_id, &number).await?
            else {
                return Ok(());
            };
            contacts::set_presence(&self.db, contact.id, &update.presence.to_string()).await?;

            let Some(ticket) =
                tickets::find_open_for_contact(&self.db, contact.id, handle.connection_id).await?
            else {
                return Ok(());
            };

            let mut topics = vec![
                Topic::Ticket(ticket.id),
                Topic::TenantStatus(handle.tenant_id, ticket.status),
            ];
            if let Some(queue_id) = ticket.queue_id {
                topics.push(Topic::QueueStatus(queue_id, ticket.status));
            }
            self.notifier.publish(
                &topics,
                "presence",
                json!({
                    "ticketId": ticket.id,
                    "presence": update.presence,
                }),
            );
            Ok(())
        }
        .await;

        if let Err(e) = result {
            error!(
                remote_jid = %update.remote_jid,
                error = %e,
                "presence update failed"
            );
        }
    }

    fn notify_session(&self, tenant_id: i64, connection_id: i64, status: ConnectionStatus) {
        self.notifier.publish(
            &[Topic::TenantMain(tenant_id)],
            "session",
            json!({
                "connectionId": connection_id,
                "status": status,
            }),
        );
    }
}

/// Schedule a delayed reconnect for a dropped session.
///
/// Defined outside the `ConnectionSupervisor` impl so the recursive call to
/// [`ConnectionSupervisor::start_session`] is checked in a separate defining
/// scope, avoiding the opaque-type `Send`-inference cycle that arises when the
/// spawn lives inside `handle_close`.
fn schedule_reconnect(
    supervisor: Arc<ConnectionSupervisor>,
    connection_id: i64,
    epoch: u64,
    delay: Duration,
) {
    tokio::spawn(async move {
        sleep(delay).await;
        if supervisor.registry.is_superseded(connection_id, epoch) {
            return;
        }
        if let Err(e) = supervisor.start_session(connection_id, true).await {
            error!(connection_id, error = %e, "reconnect failed");
        }
    });
}

/// Digits of a jid, the contact-number form used for lookups.
pub fn digits(jid: &str) -> String {
    jid.chars().filter(|c| c.is_ascii_digit()).collect()
}
