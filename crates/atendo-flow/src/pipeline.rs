// SPDX-FileCopyrightText: 2026 Atendo Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The message normalization pipeline.
//!
//! Converts raw protocol events into canonical stored messages: content
//! classification, quoted-message resolution, media download with limits,
//! transcription, edit archival, soft deletes, and monotonic ack updates.
//! Every successful normalization also refreshes the owning ticket's
//! denormalized preview and publishes a realtime event.

use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use tracing::{debug, warn};

use atendo_config::model::AtendoConfig;
use atendo_core::types::{AckUpdate, MessageContent, TicketStatus, WireMessage};
use atendo_core::{
    AtendoError, JobQueue, Notifier, Schedules, Settings, Topic, Transcriber, Transport,
};
use atendo_core::traits::transcriber::TranscriberOptions;
use atendo_session::{Debouncer, SessionHandle, SessionRegistry, TtlCache};
use atendo_storage::models::{Contact, Message, Ticket};
use atendo_storage::queries::{contacts, messages, tickets};
use atendo_storage::Database;

use crate::body::{body_of, media_of, preview, thumbnail_of, unwrap_content};
use crate::media;

/// Options for recording one message.
#[derive(Default)]
pub struct RecordOptions {
    /// Acting agent for messages sent on an agent's behalf.
    pub user_id: Option<i64>,
    /// Suppress the realtime create event (used while the ticket itself is
    /// still being announced).
    pub skip_notify: bool,
}

/// The inbound pipeline plus the chatbot and ticket services built on it.
///
/// One instance serves every connection in the process; per-connection
/// state lives in the [`SessionHandle`].
pub struct MessagePipeline {
    pub(crate) db: Database,
    pub(crate) config: AtendoConfig,
    pub(crate) registry: Arc<SessionRegistry>,
    pub(crate) notifier: Arc<dyn Notifier>,
    pub(crate) settings: Arc<dyn Settings>,
    pub(crate) schedules: Arc<dyn Schedules>,
    pub(crate) transcriber: Arc<dyn Transcriber>,
    pub(crate) jobs: Arc<dyn JobQueue>,
    pub(crate) debouncer: Debouncer,
    /// Serializes delivery-receipt application so the monotonicity check is
    /// race-free.
    pub(crate) ack_lock: tokio::sync::Mutex<()>,
    /// Prevents duplicate concurrent group metadata fetch + contact
    /// creation for the same group.
    pub(crate) group_lock: tokio::sync::Mutex<()>,
    pub(crate) group_contact_cache: TtlCache<String, i64>,
    /// Per-ticket out-of-hours notice suppression, re-armed by activity.
    pub(crate) out_of_hours: TtlCache<i64, bool>,
}

impl MessagePipeline {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        db: Database,
        config: AtendoConfig,
        registry: Arc<SessionRegistry>,
        notifier: Arc<dyn Notifier>,
        settings: Arc<dyn Settings>,
        schedules: Arc<dyn Schedules>,
        transcriber: Arc<dyn Transcriber>,
        jobs: Arc<dyn JobQueue>,
    ) -> Self {
        let debounce = Duration::from_millis(config.chatbot.debounce_ms);
        let group_contact_ttl = Duration::from_secs(config.session.group_contact_cache_ttl_secs);
        let out_of_hours_ttl = Duration::from_secs(config.session.out_of_hours_cache_ttl_secs);
        Self {
            db,
            config,
            registry,
            notifier,
            settings,
            schedules,
            transcriber,
            jobs,
            debouncer: Debouncer::new(debounce),
            ack_lock: tokio::sync::Mutex::new(()),
            group_lock: tokio::sync::Mutex::new(()),
            group_contact_cache: TtlCache::new(group_contact_ttl),
            out_of_hours: TtlCache::new(out_of_hours_ttl),
        }
    }

    pub fn db(&self) -> &Database {
        &self.db
    }

    /// The network address of a contact.
    pub fn contact_jid(contact: &Contact) -> String {
        if contact.is_group {
            format!("{}@g.us", contact.number)
        } else {
            format!("{}@s.whatsapp.net", contact.number)
        }
    }

    /// Record an inbound or echoed text-class message.
    pub async fn record_message(
        &self,
        session: &Arc<SessionHandle>,
        msg: &WireMessage,
        ticket: &Ticket,
        contact: &Contact,
        opts: RecordOptions,
    ) -> Result<Message, AtendoError> {
        let quoted = self.resolve_quoted(session, msg, ticket).await?;
        let body = body_of(msg.content.as_ref());
        let is_reaction = matches!(
            msg.content.as_ref().map(unwrap_content),
            Some(MessageContent::Reaction { .. })
        );

        let mut record = Message::blank(msg.key.id.clone(), ticket.id, ticket.tenant_id);
        record.contact_id = (!msg.key.from_me).then_some(contact.id);
        record.queue_id = ticket.queue_id;
        record.remote_jid = Some(msg.key.remote_jid.clone());
        record.participant = msg.key.participant.clone();
        record.body = body.clone();
        record.from_me = msg.key.from_me;
        record.read = msg.key.from_me;
        record.media_type = is_reaction.then(|| "reactionMessage".to_string());
        record.ack = msg.ack;
        record.quoted_msg_id = quoted.map(|q| q.id);
        record.data_json = serde_json::to_string(msg).ok();
        if let Some(user_id) = opts.user_id {
            debug!(user_id, "message recorded on behalf of agent");
        }

        self.persist_and_announce(session, record, ticket, contact, &body, opts.skip_notify)
            .await
    }

    /// Record a message that carries media: gate, download, thumbnail, and
    /// optional transcription.
    pub async fn record_media_message(
        &self,
        session: &Arc<SessionHandle>,
        msg: &WireMessage,
        ticket: &Ticket,
        contact: &Contact,
        opts: RecordOptions,
    ) -> Result<Message, AtendoError> {
        let content = msg
            .content
            .as_ref()
            .map(unwrap_content)
            .ok_or_else(|| AtendoError::Internal("media message without content".into()))?;

        let quoted = self.resolve_quoted(session, msg, ticket).await?;

        // Thumbnail path is independent and best-effort.
        let mut thumbnail_url = None;
        if let Some(thumb_ref) = thumbnail_of(content) {
            if let Some(thumb) =
                media::download_thumbnail(session.transport.as_ref(), thumb_ref, &self.config.media)
                    .await
            {
                thumbnail_url =
                    match media::save_media(&self.config.storage.media_dir, ticket.tenant_id, &thumb)
                        .await
                    {
                        Ok(url) => Some(url),
                        Err(e) => {
                            warn!(error = %e, "failed to store thumbnail");
                            None
                        }
                    };
            }
        }

        let mut media_url = None;
        let mut media_type = None;
        let mut filename = String::new();

        if let Some(media_ref) = media_of(content) {
            let downloaded = self
                .fetch_media(session, ticket, contact, media_ref, msg.key.from_me)
                .await?;
            filename = downloaded.filename.clone();
            media_type = Some(media::media_type_tag(&downloaded.mimetype));
            media_url = Some(
                media::save_media(&self.config.storage.media_dir, ticket.tenant_id, &downloaded)
                    .await?,
            );
        } else if thumbnail_url.is_none() {
            return Err(AtendoError::MediaDownload { attempts: 0 });
        }

        let mut body = body_of(msg.content.as_ref());

        // Tenant-gated audio transcription replaces the placeholder body.
        if media_type.as_deref() == Some("audio")
            && self
                .settings
                .get(ticket.tenant_id, "audioTranscriptions", "disabled")
                .await
                == "enabled"
        {
            let api_key = self.settings.get(ticket.tenant_id, "aiApiKey", "").await;
            if !api_key.is_empty()
                && let Some(url) = &media_url
            {
                let provider = self
                    .settings
                    .get(ticket.tenant_id, "aiProvider", "openai")
                    .await;
                let options = TranscriberOptions { api_key, provider };
                if let Some(transcript) = self.transcriber.transcribe(url, &options).await {
                    body = transcript;
                }
            }
        }

        let mut record = Message::blank(msg.key.id.clone(), ticket.id, ticket.tenant_id);
        record.contact_id = (!msg.key.from_me).then_some(contact.id);
        record.queue_id = ticket.queue_id;
        record.remote_jid = Some(msg.key.remote_jid.clone());
        record.participant = msg.key.participant.clone();
        record.body = body.clone();
        record.from_me = msg.key.from_me;
        record.read = msg.key.from_me;
        record.media_type = media_type;
        record.media_url = media_url;
        record.thumbnail_url = thumbnail_url;
        record.ack = msg.ack;
        record.quoted_msg_id = quoted.map(|q| q.id);
        record.data_json = serde_json::to_string(msg).ok();

        let preview_body = if body.is_empty() && !filename.is_empty() {
            format!("\u{1F4CE} {filename}")
        } else {
            body.clone()
        };

        self.persist_and_announce(session, record, ticket, contact, &preview_body, opts.skip_notify)
            .await
    }

    /// Enforce the size ceiling, then download with throttling and retries.
    async fn fetch_media(
        &self,
        session: &Arc<SessionHandle>,
        ticket: &Ticket,
        contact: &Contact,
        media_ref: &atendo_core::types::MediaRef,
        from_me: bool,
    ) -> Result<media::DownloadedMedia, AtendoError> {
        let default_limit = self.config.media.download_limit_mib.to_string();
        let limit_mib: u64 = self
            .settings
            .get(ticket.tenant_id, "downloadLimit", &default_limit)
            .await
            .parse()
            .unwrap_or(self.config.media.download_limit_mib);
        let limit = limit_mib * 1024 * 1024;

        if let Some(size) = media_ref.file_length
            && size > limit
        {
            if !contact.is_group && !from_me {
                let notice = format!(
                    "*Automated message*: Our system only accepts files up to {limit_mib} MiB"
                );
                if let Err(e) = self.send_and_record(session, ticket, &notice).await {
                    warn!(error = %e, "failed to send size-limit notice");
                }
            }
            return Err(AtendoError::MediaOverLimit { size, limit });
        }

        let kind = media::media_kind(&media_ref.mimetype);
        media::download_media(session.transport.as_ref(), media_ref, kind, &self.config.media)
            .await
    }

    /// Shared tail of message recording: persist, refresh the preview,
    /// publish, and reopen a closed ticket touched by the contact.
    async fn persist_and_announce(
        &self,
        session: &Arc<SessionHandle>,
        record: Message,
        ticket: &Ticket,
        contact: &Contact,
        preview_body: &str,
        skip_notify: bool,
    ) -> Result<Message, AtendoError> {
        tickets::update_last_message(&self.db, ticket.id, &preview(preview_body)).await?;
        messages::upsert_message(&self.db, &record).await?;

        let stored = messages::get_message(&self.db, &record.id, ticket.id)
            .await?
            .ok_or_else(|| AtendoError::Internal("message vanished after upsert".into()))?;

        // A contact who messages us is evidently available.
        if !stored.from_me {
            contacts::set_presence(&self.db, contact.id, "available").await?;
        }

        let ticket = tickets::get_ticket(&self.db, ticket.id)
            .await?
            .ok_or_else(|| AtendoError::app("ERR_TICKET_NOT_FOUND", 404))?;

        if !skip_notify {
            self.notify_message_event("create", &stored, &ticket);
        }

        // Inbound traffic on a closed ticket pulls it back to pending.
        if !stored.from_me && ticket.status == TicketStatus::Closed {
            self.reopen_as_pending(session, &ticket).await?;
        }

        Ok(stored)
    }

    /// Move a closed ticket back to pending after new inbound traffic.
    async fn reopen_as_pending(
        &self,
        _session: &Arc<SessionHandle>,
        ticket: &Ticket,
    ) -> Result<(), AtendoError> {
        let update = crate::ticket::TicketUpdate {
            status: Some(TicketStatus::Pending),
            dont_run_chatbot: true,
            ..Default::default()
        };
        // Box::pin breaks the async recursion cycle (send_and_record ->
        // record_message -> persist_and_announce -> reopen_as_pending ->
        // update_ticket -> send_and_record) that would otherwise form an
        // infinitely sized future.
        Box::pin(self.update_ticket(ticket.id, update)).await?;

        let refreshed = tickets::get_ticket(&self.db, ticket.id)
            .await?
            .ok_or_else(|| AtendoError::app("ERR_TICKET_NOT_FOUND", 404))?;

        let mut closed_topics = vec![Topic::TenantStatus(ticket.tenant_id, TicketStatus::Closed)];
        if let Some(queue_id) = ticket.queue_id {
            closed_topics.push(Topic::QueueStatus(queue_id, TicketStatus::Closed));
        }
        self.notifier.publish(
            &closed_topics,
            "ticket",
            json!({"action": "delete", "ticketId": ticket.id}),
        );
        self.notify_ticket_event("update", &refreshed);
        Ok(())
    }

    /// Record an edit: archive the prior body and overwrite.
    pub async fn record_edit(
        &self,
        edited_id: &str,
        new_content: &MessageContent,
        ticket: &Ticket,
    ) -> Result<(), AtendoError> {
        let new_body = body_of(Some(new_content));
        if new_body.is_empty() {
            return Ok(());
        }

        let Some(edited) = messages::archive_edit(&self.db, edited_id, ticket.id, &new_body).await?
        else {
            debug!(edited_id, "edit for unknown message ignored");
            return Ok(());
        };

        tickets::update_last_message(&self.db, ticket.id, &preview(&new_body)).await?;

        let refreshed = tickets::get_ticket(&self.db, ticket.id)
            .await?
            .ok_or_else(|| AtendoError::app("ERR_TICKET_NOT_FOUND", 404))?;
        self.notify_message_event("update", &edited, &refreshed);
        Ok(())
    }

    /// Record a delete: flag the row, keep it for audit and ordering.
    pub async fn record_delete(&self, deleted_id: &str, ticket: &Ticket) -> Result<(), AtendoError> {
        let Some(message) = messages::find_by_raw_id(&self.db, deleted_id).await? else {
            return Ok(());
        };
        messages::mark_deleted(&self.db, &message.id, message.ticket_id).await?;

        let Some(stored) = messages::get_message(&self.db, &message.id, message.ticket_id).await?
        else {
            return Ok(());
        };
        let owning = tickets::get_ticket(&self.db, message.ticket_id)
            .await?
            .unwrap_or_else(|| ticket.clone());
        self.notify_message_event("update", &stored, &owning);
        Ok(())
    }

    /// Apply a delivery-acknowledgement report under the monotonic rule.
    ///
    /// Serialized by the ack lock; duplicate or out-of-order reports are
    /// no-ops and publish nothing.
    pub async fn apply_ack(&self, update: &AckUpdate) -> Result<(), AtendoError> {
        if update.ack == 0 {
            return Ok(());
        }
        let _guard = self.ack_lock.lock().await;

        let Some(existing) = messages::find_by_raw_id(&self.db, &update.key.id).await? else {
            return Ok(());
        };

        if let Some(updated) =
            messages::update_ack(&self.db, &existing.id, existing.ticket_id, update.ack).await?
        {
            let Some(ticket) = tickets::get_ticket(&self.db, updated.ticket_id).await? else {
                return Ok(());
            };
            self.notifier.publish(
                &[Topic::Ticket(updated.ticket_id)],
                "message",
                json!({"action": "update", "message": updated, "ticketId": ticket.id}),
            );
        }
        Ok(())
    }

    /// Send a text through the session and record the echoed message.
    pub async fn send_and_record(
        &self,
        session: &Arc<SessionHandle>,
        ticket: &Ticket,
        text: &str,
    ) -> Result<Message, AtendoError> {
        let contact = contacts::get_contact(&self.db, ticket.contact_id)
            .await?
            .ok_or_else(|| AtendoError::app("ERR_CONTACT_NOT_FOUND", 404))?;
        let sent = session
            .transport
            .send_text(&Self::contact_jid(&contact), text)
            .await?;
        session.message_cache.cache_sent(&sent);
        self.record_message(session, &sent, ticket, &contact, RecordOptions::default())
            .await
    }

    /// Debounced quick send: collapses rapid-fire duplicate triggers into a
    /// single message. The text is marked with U+200E so the listener skips
    /// the echo.
    pub fn send_quick(
        self: Arc<Self>,
        session: &Arc<SessionHandle>,
        ticket: &Ticket,
        text: &str,
        save_on_ticket: bool,
    ) {
        let pipeline = Arc::clone(&self);
        let session = Arc::clone(session);
        let ticket = ticket.clone();
        let text = format!("\u{200E}{text}");
        self.debouncer.schedule(ticket.id, async move {
            let contact = match contacts::get_contact(&pipeline.db, ticket.contact_id).await {
                Ok(Some(contact)) => contact,
                _ => return,
            };
            match session
                .transport
                .send_text(&MessagePipeline::contact_jid(&contact), &text)
                .await
            {
                Ok(sent) => {
                    session.message_cache.cache_sent(&sent);
                    if save_on_ticket
                        && let Err(e) = pipeline
                            .record_message(
                                &session,
                                &sent,
                                &ticket,
                                &contact,
                                RecordOptions::default(),
                            )
                            .await
                    {
                        warn!(error = %e, "failed to record quick message");
                    }
                }
                Err(e) => warn!(error = %e, "quick send failed"),
            }
        });
    }

    /// Publish a message event to the ticket and its list-view channels.
    pub(crate) fn notify_message_event(&self, action: &str, message: &Message, ticket: &Ticket) {
        let mut topics = vec![
            Topic::Ticket(ticket.id),
            Topic::TenantStatus(ticket.tenant_id, ticket.status),
            Topic::TenantNotification(ticket.tenant_id),
        ];
        if let Some(queue_id) = ticket.queue_id {
            topics.push(Topic::QueueStatus(queue_id, ticket.status));
            topics.push(Topic::QueueNotification(queue_id));
        }
        self.notifier.publish(
            &topics,
            "message",
            json!({"action": action, "message": message, "ticket": ticket}),
        );
    }

    /// Publish a ticket event to every channel a list view may watch.
    pub(crate) fn notify_ticket_event(&self, action: &str, ticket: &Ticket) {
        let mut topics = vec![
            Topic::Ticket(ticket.id),
            Topic::TenantStatus(ticket.tenant_id, ticket.status),
            Topic::TenantNotification(ticket.tenant_id),
        ];
        if let Some(user_id) = ticket.user_id {
            topics.push(Topic::User(user_id));
        }
        if let Some(queue_id) = ticket.queue_id {
            topics.push(Topic::QueueStatus(queue_id, ticket.status));
            topics.push(Topic::QueueNotification(queue_id));
        }
        self.notifier.publish(
            &topics,
            "ticket",
            json!({"action": action, "ticket": ticket, "ticketId": ticket.id}),
        );
    }
}
