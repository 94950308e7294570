// SPDX-FileCopyrightText: 2026 Atendo Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Inbound listener: consumes a connection's message events in arrival
//! order and drives the full pipeline for each one.
//!
//! This is the outermost handler boundary: every failure is caught and
//! logged here, so one tenant's bad message can never take the process (or
//! another tenant's connection) down.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use rand::Rng;
use serde_json::json;
use tracing::{debug, error, warn};

use atendo_core::types::{AckUpdate, MessageContent, TicketStatus, WireMessage};
use atendo_core::{AtendoError, JobQueue, Schedules, Settings, Transport};
use atendo_session::{digits, InboundHandler, SessionHandle};
use atendo_storage::models::{Contact, Ticket};
use atendo_storage::queries::{campaigns, connections, contacts, messages, queues, tickets};

use crate::body::{body_of, is_processable, media_of, thumbnail_of, unwrap_content};
use crate::pipeline::{MessagePipeline, RecordOptions};
use crate::ticket::TicketUpdate;

/// [`InboundHandler`] implementation over the shared pipeline.
pub struct InboundListener {
    pipeline: Arc<MessagePipeline>,
}

impl InboundListener {
    pub fn new(pipeline: Arc<MessagePipeline>) -> Self {
        Self { pipeline }
    }
}

#[async_trait]
impl InboundHandler for InboundListener {
    async fn messages_upsert(&self, session: Arc<SessionHandle>, msgs: Vec<WireMessage>) {
        for msg in msgs {
            if !is_processable(&msg) {
                continue;
            }

            if let Err(e) = session.transport.send_receipts(&[msg.key.clone()]).await {
                warn!(id = %msg.key.id, error = %e, "failed to send receipt");
            }

            match self.confirm_campaign(&session, &msg).await {
                Ok(true) => continue,
                Ok(false) => {}
                Err(e) => warn!(error = %e, "campaign confirmation check failed"),
            }

            if let Err(e) = self.handle_message(&session, &msg).await {
                error!(
                    connection_id = session.connection_id,
                    id = %msg.key.id,
                    error = %e,
                    "error handling inbound message"
                );
            }
        }
    }

    async fn messages_update(&self, session: Arc<SessionHandle>, updates: Vec<AckUpdate>) {
        for update in updates {
            if let Err(e) = session.transport.read_messages(&[update.key.clone()]).await {
                debug!(id = %update.key.id, error = %e, "failed to mark read on transport");
            }
            if let Err(e) = self.pipeline.apply_ack(&update).await {
                error!(id = %update.key.id, error = %e, "error handling message ack");
            }
        }
    }
}

impl InboundListener {
    /// Settle a pending campaign confirmation with this inbound reply.
    ///
    /// On match the confirmation is recorded and dispatch continues through
    /// the opaque job queue with a small random delay; normal message
    /// handling stops.
    async fn confirm_campaign(
        &self,
        session: &Arc<SessionHandle>,
        msg: &WireMessage,
    ) -> Result<bool, AtendoError> {
        if msg.key.from_me {
            return Ok(false);
        }
        let number = digits(&msg.key.remote_jid);
        let Some(shipping) =
            campaigns::find_pending_confirmation(&self.pipeline.db, session.tenant_id, &number)
                .await?
        else {
            return Ok(false);
        };

        campaigns::confirm(&self.pipeline.db, shipping.id).await?;
        let delay = Duration::from_secs(rand::thread_rng().gen_range(0..=10));
        self.pipeline
            .jobs
            .enqueue(
                "DispatchConfirmedCampaign",
                json!({
                    "campaignShippingId": shipping.id,
                    "campaignId": shipping.campaign_id,
                }),
                Some(delay),
            )
            .await;
        Ok(true)
    }

    /// The generic path for one inbound (or echoed) message.
    pub async fn handle_message(
        &self,
        session: &Arc<SessionHandle>,
        msg: &WireMessage,
    ) -> Result<(), AtendoError> {
        let pipeline = &self.pipeline;
        let tenant_id = session.tenant_id;
        let is_group = msg.key.remote_jid.ends_with("@g.us");

        // Group traffic is dropped unless the tenant opted in.
        if is_group
            && pipeline
                .settings
                .get(tenant_id, "CheckMsgIsGroup", "enabled")
                .await
                == "enabled"
        {
            return Ok(());
        }

        let content = msg.content.as_ref().map(unwrap_content);
        let body = body_of(msg.content.as_ref());

        if msg.key.from_me {
            // Own automated sends are marked with U+200E; skip the echo.
            if body.starts_with('\u{200E}') {
                return Ok(());
            }
            let has_media = content.map(|c| media_of(c).is_some()).unwrap_or(false);
            let is_plain_text = matches!(
                content,
                Some(MessageContent::Conversation { .. })
                    | Some(MessageContent::ExtendedText { .. })
            );
            if !has_media && !is_plain_text {
                return Ok(());
            }
        }

        let group_contact = if is_group {
            Some(self.materialize_group_contact(session, &msg.key.remote_jid).await?)
        } else {
            None
        };

        let contact = self.sender_contact(session, msg, is_group).await?;

        // The rating window intercepts the reply before any ticket routing.
        if !msg.key.from_me
            && !contact.is_group
            && self.try_rating_interception(session, &contact, &body).await?
        {
            return Ok(());
        }

        let schedule_type = pipeline
            .settings
            .get(tenant_id, "scheduleType", "disabled")
            .await;
        let company_inactive = schedule_type == "company"
            && pipeline.schedules.in_activity(tenant_id, None).await == Some(false);

        // With a single configured queue, traffic that will never reach the
        // menu is pre-assigned to it.
        let assigned_queues = queues::queues_for_connection(&self.pipeline.db, session.connection_id)
            .await?;
        let default_queue = if (msg.key.from_me || contact.disable_bot || company_inactive)
            && !is_group
            && assigned_queues.len() == 1
        {
            assigned_queues.first().map(|q| q.id)
        } else {
            None
        };

        let ticket_contact = group_contact.as_ref().unwrap_or(&contact);
        let find_only = matches!(
            content,
            Some(MessageContent::Reaction { .. })
                | Some(MessageContent::Sticker { .. })
                | Some(MessageContent::Edited { .. })
                | Some(MessageContent::Deleted { .. })
        );

        let Some((ticket, just_created)) = self
            .find_or_create_ticket(session, ticket_contact, msg.key.from_me, find_only, default_queue)
            .await?
        else {
            return Ok(());
        };
        let had_queue = ticket.queue_id.is_some();

        // `#` restarts root-level queue selection at any depth.
        if body.trim() == "#" && !is_group {
            pipeline
                .update_ticket(
                    ticket.id,
                    TicketUpdate {
                        queue_id: Some(None),
                        chatbot: Some(false),
                        queue_option_id: Some(None),
                        dont_run_chatbot: true,
                        ..Default::default()
                    },
                )
                .await?;
            let refreshed = self.refresh(ticket.id).await?;
            pipeline.verify_queue(session, None, &refreshed).await?;
            return Ok(());
        }

        let has_media = content
            .map(|c| media_of(c).is_some() || thumbnail_of(c).is_some())
            .unwrap_or(false);

        let mut new_message = None;
        match content {
            Some(MessageContent::Edited { key, content }) => {
                pipeline.record_edit(&key.id, content, &ticket).await?;
            }
            Some(MessageContent::Deleted { key }) => {
                pipeline.record_delete(&key.id, &ticket).await?;
            }
            _ if has_media => {
                new_message = Some(
                    pipeline
                        .record_media_message(
                            session,
                            msg,
                            &ticket,
                            &contact,
                            RecordOptions {
                                skip_notify: just_created,
                                ..Default::default()
                            },
                        )
                        .await?,
                );
            }
            _ => {
                new_message = Some(
                    pipeline
                        .record_message(
                            session,
                            msg,
                            &ticket,
                            &contact,
                            RecordOptions {
                                skip_notify: just_created,
                                ..Default::default()
                            },
                        )
                        .await?,
                );
            }
        }

        if is_group || contact.disable_bot {
            if just_created && let Some(message) = &new_message {
                let refreshed = self.refresh(ticket.id).await?;
                pipeline.notify_message_event("create", message, &refreshed);
            }
            return Ok(());
        }

        // Out-of-hours gating, one notice per ticket per window.
        if !msg.key.from_me
            && schedule_type != "disabled"
            && self
                .apply_out_of_hours(session, &schedule_type, ticket.id)
                .await?
        {
            return Ok(());
        }

        let ticket = self.refresh(ticket.id).await?;
        if ticket.queue_id.is_none()
            && !is_group
            && !msg.key.from_me
            && ticket.user_id.is_none()
            && !assigned_queues.is_empty()
        {
            pipeline.verify_queue(session, Some(body.as_str()), &ticket).await?;
        }

        if just_created && let Some(message) = &new_message {
            let refreshed = self.refresh(ticket.id).await?;
            pipeline.notify_message_event("create", message, &refreshed);
        }

        let ticket = self.refresh(ticket.id).await?;

        // Fresh queueless ticket with no agents configured: greet once,
        // debounced against rapid-fire first messages.
        if just_created
            && assigned_queues.is_empty()
            && ticket.user_id.is_none()
            && !is_group
            && !msg.key.from_me
        {
            let connection = connections::get_connection(&self.pipeline.db, session.connection_id)
                .await?
                .ok_or_else(|| AtendoError::app("ERR_NO_WAPP_FOUND", 404))?;
            if let Some(greeting) = connection
                .greeting_message
                .as_deref()
                .map(str::trim)
                .filter(|s| !s.is_empty())
            {
                let already_greeted = messages::last_from_me(&self.pipeline.db, ticket.id)
                    .await?
                    .map(|m| m.body.contains(greeting))
                    .unwrap_or(false);
                if !already_greeted {
                    Arc::clone(pipeline).send_quick(session, &ticket, greeting, false);
                }
                return Ok(());
            }
        }

        // Replies only reach the menu walk when the queue predates this
        // turn; a queue assigned just now already presented its menu.
        if had_queue && ticket.queue_id.is_some() && ticket.chatbot && !msg.key.from_me {
            pipeline.handle_chatbot(session, &ticket, &body).await?;
        }

        Ok(())
    }

    async fn refresh(&self, ticket_id: i64) -> Result<Ticket, AtendoError> {
        tickets::get_ticket(&self.pipeline.db, ticket_id)
            .await?
            .ok_or_else(|| AtendoError::app("ERR_TICKET_NOT_FOUND", 404))
    }

    /// Group contact, materialized under the group mutex through the
    /// short-TTL cache so concurrent events never double-create it.
    async fn materialize_group_contact(
        &self,
        session: &Arc<SessionHandle>,
        group_jid: &str,
    ) -> Result<Contact, AtendoError> {
        let pipeline = &self.pipeline;
        let _guard = pipeline.group_lock.lock().await;

        if let Some(contact_id) = pipeline.group_contact_cache.get(&group_jid.to_string())
            && let Some(contact) = contacts::get_contact(&self.pipeline.db, contact_id).await?
        {
            return Ok(contact);
        }

        let metadata = session.transport.group_metadata(group_jid).await?;
        let contact = contacts::upsert_contact(
            &self.pipeline.db,
            session.tenant_id,
            &digits(group_jid),
            &metadata.subject,
            true,
        )
        .await?;
        pipeline
            .group_contact_cache
            .set(group_jid.to_string(), contact.id);
        Ok(contact)
    }

    /// Upsert the sending contact from the message envelope.
    async fn sender_contact(
        &self,
        session: &Arc<SessionHandle>,
        msg: &WireMessage,
        is_group: bool,
    ) -> Result<Contact, AtendoError> {
        let push_name = msg.push_name.clone().unwrap_or_default();
        let (number, name) = if is_group {
            let sender = if msg.key.from_me {
                session.jid().unwrap_or_default()
            } else {
                msg.key
                    .participant
                    .clone()
                    .unwrap_or_else(|| msg.key.remote_jid.clone())
            };
            (digits(&sender), push_name)
        } else {
            let number = digits(&msg.key.remote_jid);
            let name = if msg.key.from_me {
                number.clone()
            } else if push_name.is_empty() {
                number.clone()
            } else {
                push_name
            };
            (number, name)
        };

        contacts::upsert_contact(&self.pipeline.db, session.tenant_id, &number, &name, false)
            .await
    }

    async fn find_or_create_ticket(
        &self,
        session: &Arc<SessionHandle>,
        contact: &Contact,
        from_me: bool,
        find_only: bool,
        default_queue: Option<i64>,
    ) -> Result<Option<(Ticket, bool)>, AtendoError> {
        let db = &self.pipeline.db;
        if let Some(ticket) =
            tickets::find_open_for_contact(db, contact.id, session.connection_id).await?
        {
            if !from_me {
                tickets::increment_unread(db, ticket.id).await?;
            }
            return Ok(Some((ticket, false)));
        }

        if find_only {
            // Narrow handlers (acks, edits, deletes, reactions) may target
            // closed history, but must never open a ticket.
            return Ok(tickets::find_latest_for_contact(db, contact.id, session.connection_id)
                .await?
                .map(|t| (t, false)));
        }

        // A closed thread is reused: recording the message pulls it back to
        // pending instead of spawning a parallel ticket.
        if let Some(latest) =
            tickets::find_latest_for_contact(db, contact.id, session.connection_id).await?
            && latest.status == TicketStatus::Closed
        {
            if !from_me {
                tickets::increment_unread(db, latest.id).await?;
            }
            return Ok(Some((latest, false)));
        }

        let mut ticket =
            tickets::insert_ticket(db, session.tenant_id, contact.id, session.connection_id)
                .await?;
        if let Some(queue_id) = default_queue {
            ticket.queue_id = Some(queue_id);
            tickets::update_ticket(db, &ticket).await?;
        }
        if !from_me {
            tickets::increment_unread(db, ticket.id).await?;
            ticket.unread_messages += 1;
        }
        debug!(ticket_id = ticket.id, contact_id = contact.id, "ticket created");
        Ok(Some((ticket, true)))
    }

    /// Send the out-of-hours notice (once per suppression window) and apply
    /// the configured fallback status. Returns `true` when handling for
    /// this turn must stop.
    async fn apply_out_of_hours(
        &self,
        session: &Arc<SessionHandle>,
        schedule_type: &str,
        ticket_id: i64,
    ) -> Result<bool, AtendoError> {
        let pipeline = &self.pipeline;
        let ticket = self.refresh(ticket_id).await?;

        // An agent actively handling the ticket overrides the gate.
        if ticket.status == TicketStatus::Open {
            return Ok(false);
        }

        let inactive = match schedule_type {
            "company" => {
                pipeline.schedules.in_activity(ticket.tenant_id, None).await == Some(false)
            }
            "queue" => match ticket.queue_id {
                Some(queue_id) => {
                    pipeline
                        .schedules
                        .in_activity(ticket.tenant_id, Some(queue_id))
                        .await
                        == Some(false)
                }
                None => false,
            },
            _ => false,
        };
        if !inactive {
            return Ok(false);
        }

        let suppressed = pipeline.out_of_hours.get(&ticket.id).unwrap_or(false);
        if !suppressed {
            pipeline.out_of_hours.set(ticket.id, true);
            let notice = self.out_of_hours_notice(session, &ticket).await?;
            if let Err(e) = pipeline.send_and_record(session, &ticket, &notice).await {
                warn!(ticket_id = ticket.id, error = %e, "failed to send out-of-hours notice");
            }
        }

        let fallback = pipeline.out_of_hours_action(ticket.tenant_id).await;
        pipeline
            .update_ticket(
                ticket.id,
                TicketUpdate {
                    chatbot: Some(false),
                    status: Some(fallback),
                    dont_run_chatbot: true,
                    ..Default::default()
                },
            )
            .await?;
        Ok(true)
    }

    async fn out_of_hours_notice(
        &self,
        session: &Arc<SessionHandle>,
        ticket: &Ticket,
    ) -> Result<String, AtendoError> {
        let db = &self.pipeline.db;
        if let Some(queue_id) = ticket.queue_id
            && let Some(queue) = queues::get_queue(db, queue_id).await?
            && let Some(text) = queue
                .out_of_hours_message
                .as_deref()
                .map(str::trim)
                .filter(|s| !s.is_empty())
        {
            return Ok(text.to_string());
        }
        let connection = connections::get_connection(db, session.connection_id)
            .await?
            .ok_or_else(|| AtendoError::app("ERR_NO_WAPP_FOUND", 404))?;
        Ok(connection
            .out_of_hours_message
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .unwrap_or("We are out of office hours right now")
            .to_string())
    }

    /// Intercept an inbound reply against a pending rating window.
    ///
    /// Returns `true` when the reply was consumed and normal handling must
    /// stop.
    async fn try_rating_interception(
        &self,
        session: &Arc<SessionHandle>,
        contact: &Contact,
        body: &str,
    ) -> Result<bool, AtendoError> {
        let pipeline = &self.pipeline;
        let Some(mut tracking) = pipeline
            .pending_rating(session.connection_id, contact)
            .await?
        else {
            return Ok(false);
        };
        let ticket = self.refresh(tracking.ticket_id).await?;
        let trimmed = body.trim();

        if let Ok(rate) = trimmed.parse::<i64>() {
            debug!(ticket_id = ticket.id, rate, "received rating");
            pipeline
                .handle_rating(session, &ticket, &mut tracking, rate)
                .await?;
            return Ok(true);
        }

        if trimmed == "!" {
            debug!(ticket_id = ticket.id, "ticket reopened by contact request");
            tracking.rating_at = None;
            atendo_storage::queries::trackings::update_tracking(&self.pipeline.db, &tracking)
                .await?;
            pipeline
                .update_ticket(
                    ticket.id,
                    TicketUpdate {
                        status: Some(TicketStatus::Open),
                        user_id: Some(tracking.user_id),
                        dont_run_chatbot: true,
                        ..Default::default()
                    },
                )
                .await?;
            Arc::clone(pipeline).send_quick(session, &ticket, "Service reopened", true);
            return Ok(true);
        }

        // Anything else expires the rating window.
        debug!(ticket_id = ticket.id, "rating window expired by reply");
        tracking.expired = true;
        atendo_storage::queries::trackings::update_tracking(&self.pipeline.db, &tracking).await?;
        Arc::clone(pipeline).send_quick(session, &ticket, "Rating cancelled", false);

        // Long replies fall through to normal handling; short ones stop here.
        Ok(trimmed.chars().count() < 10)
    }
}
