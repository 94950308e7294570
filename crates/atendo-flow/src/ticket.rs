// SPDX-FileCopyrightText: 2026 Atendo Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Ticket update service: the single entry point for ticket mutations.
//!
//! Enforces the business rules around status transitions (admin-only
//! acceptance of queueless pending tickets, the single-open-ticket rule on
//! reopen, the ordered close sequence with its rating gate) and publishes
//! a realtime event for every client-visible change, including the
//! previous-status channels so list views stay consistent.

use serde_json::json;
use tracing::warn;

use atendo_core::types::TicketStatus;
use atendo_core::{AtendoError, Settings, Topic};
use atendo_storage::models::Ticket;
use atendo_storage::queries::{connections, contacts, messages, queues, tickets, trackings, users};

use crate::pipeline::MessagePipeline;

/// A requested ticket mutation. `None` leaves a field untouched; the inner
/// `Option` distinguishes clearing a value from not changing it.
#[derive(Debug, Default, Clone)]
pub struct TicketUpdate {
    pub status: Option<TicketStatus>,
    pub user_id: Option<Option<i64>>,
    pub queue_id: Option<Option<i64>>,
    pub chatbot: Option<bool>,
    pub queue_option_id: Option<Option<i64>>,
    /// Close without completion/rating messaging.
    pub just_close: bool,
    /// The agent performing the mutation, for permission checks.
    pub acting_user_id: Option<i64>,
    /// Suppress chatbot re-entry after a queue change.
    pub dont_run_chatbot: bool,
}

impl MessagePipeline {
    /// Apply a mutation to a ticket under the business rules and notify.
    pub async fn update_ticket(
        &self,
        ticket_id: i64,
        update: TicketUpdate,
    ) -> Result<Ticket, AtendoError> {
        let mut ticket = tickets::get_ticket(&self.db, ticket_id)
            .await?
            .ok_or_else(|| AtendoError::app("ERR_TICKET_NOT_FOUND", 404))?;
        let contact = contacts::get_contact(&self.db, ticket.contact_id)
            .await?
            .ok_or_else(|| AtendoError::app("ERR_CONTACT_NOT_FOUND", 404))?;
        let connection = connections::get_connection(&self.db, ticket.connection_id)
            .await?
            .ok_or_else(|| AtendoError::app("ERR_NO_WAPP_FOUND", 404))?;

        let is_group = contact.is_group;
        let old_status = ticket.status;
        let old_user_id = ticket.user_id;
        let old_queue_id = ticket.queue_id;

        // A queue move must stay within the tenant.
        if let Some(Some(queue_id)) = update.queue_id
            && Some(queue_id) != ticket.queue_id
        {
            let queue = queues::get_queue(&self.db, queue_id)
                .await?
                .ok_or_else(|| AtendoError::app("ERR_QUEUE_NOT_FOUND", 404))?;
            if queue.tenant_id != ticket.tenant_id {
                return Err(AtendoError::app("ERR_FORBIDDEN", 403));
            }
        }

        // Non-admin agents may only touch their own non-pending tickets.
        if let Some(acting_id) = update.acting_user_id {
            let acting = users::get_user(&self.db, acting_id)
                .await?
                .ok_or_else(|| AtendoError::app("ERR_USER_NOT_FOUND", 404))?;
            if ticket.status != TicketStatus::Pending
                && acting.profile != "admin"
                && ticket.user_id != Some(acting.id)
            {
                return Err(AtendoError::app("ERR_FORBIDDEN", 403));
            }
        }

        // Only an admin may accept a pending ticket that has no queue.
        if old_queue_id.is_none()
            && old_status == TicketStatus::Pending
            && update.status == Some(TicketStatus::Open)
            && let Some(Some(user_id)) = update.user_id
        {
            let accepting = users::get_user(&self.db, user_id)
                .await?
                .ok_or_else(|| AtendoError::app("ERR_NO_PERMISSION", 403))?;
            if accepting.profile != "admin" {
                return Err(AtendoError::app("ERR_NO_PERMISSION", 403));
            }
        }

        let mut tracking = trackings::find_or_create_open(
            &self.db,
            ticket.id,
            ticket.tenant_id,
            ticket.connection_id,
        )
        .await?;

        let mut chatbot_change = update.chatbot;
        let mut option_change = update.queue_option_id;
        let mut queue_change = update.queue_id;
        let mut user_change = update.user_id;

        // Reopening is gated by the single-open-ticket rule.
        if old_status == TicketStatus::Closed {
            if tickets::has_other_open(&self.db, ticket.contact_id, ticket.connection_id, ticket.id)
                .await?
            {
                return Err(AtendoError::app("ERR_OTHER_OPEN_TICKET", 400));
            }
            chatbot_change = Some(false);
            option_change = Some(None);
        }

        // Opening marks messages read and clears out-of-hours suppression.
        if update.status == Some(TicketStatus::Open) {
            if let Err(e) = messages::mark_ticket_read(&self.db, ticket.id).await {
                warn!(ticket_id, error = %e, "could not mark messages as read");
            }
            ticket.unread_messages = 0;
            self.out_of_hours.del(&ticket.id);
        }

        if update.status == Some(TicketStatus::Closed) {
            let now = chrono::Utc::now().to_rfc3339();
            if tracking.finished_at.is_none() {
                tracking.finished_at = Some(now.clone());
                tracking.user_id = ticket.user_id;
            }

            let rating_enabled = self
                .settings
                .get(ticket.tenant_id, "userRating", "disabled")
                .await
                == "enabled";

            // The rating gate may short-circuit the close into
            // "awaiting rating".
            if rating_enabled
                && ticket.user_id.is_some()
                && !is_group
                && !contact.disable_bot
                && tracking.rating_at.is_none()
                && !update.just_close
            {
                if let Ok(session) = self.registry.get(ticket.connection_id) {
                    let rating_text = connection
                        .rating_message
                        .clone()
                        .filter(|s| !s.trim().is_empty())
                        .unwrap_or_else(|| "Please rate our service".to_string());
                    let body = format!(
                        "{rating_text}\n\n*Send a rating from 1 to 5*\n\nSend *`!`* to return to the service"
                    );
                    if let Err(e) = self.send_and_record(&session, &ticket, &body).await {
                        warn!(ticket_id, error = %e, "failed to send rating prompt");
                    }
                }
                tracking.rating_at = Some(now);
                trackings::update_tracking(&self.db, &tracking).await?;

                ticket.status = TicketStatus::Closed;
                ticket.chatbot = false;
                ticket.queue_option_id = None;
                tickets::update_ticket(&self.db, &ticket).await?;

                self.publish_removed_from(&ticket, old_status, old_user_id);
                self.notify_ticket_event("update", &ticket);
                return Ok(ticket);
            }

            // Completion message for direct, bot-enabled contacts.
            if !is_group
                && !contact.disable_bot
                && !update.just_close
                && let Some(completion) = connection
                    .completion_message
                    .clone()
                    .filter(|s| !s.trim().is_empty())
                && connection.status == atendo_core::types::ConnectionStatus::Connected
                && let Ok(session) = self.registry.get(ticket.connection_id)
                && let Err(e) = self.send_and_record(&session, &ticket, completion.trim()).await
            {
                warn!(ticket_id, error = %e, "failed to send completion message");
            }

            if self
                .settings
                .get(ticket.tenant_id, "keepUserAndQueue", "enabled")
                .await
                == "disabled"
            {
                queue_change = Some(None);
                user_change = Some(None);
            }
        }

        let now = chrono::Utc::now().to_rfc3339();
        if let Some(Some(_)) = queue_change
            && tracking.started_at.is_none()
        {
            tracking.queued_at = Some(now.clone());
        }
        if ticket.chatbot && chatbot_change == Some(false) {
            tracking.chatbot_end_at = Some(now.clone());
        }

        if let Some(status) = update.status {
            ticket.status = status;
        }
        if let Some(queue_id) = queue_change {
            ticket.queue_id = queue_id;
        }
        if let Some(user_id) = user_change {
            ticket.user_id = user_id;
        }
        if let Some(chatbot) = chatbot_change {
            ticket.chatbot = chatbot;
        }
        if let Some(option_id) = option_change {
            ticket.queue_option_id = option_id;
        }
        tickets::update_ticket(&self.db, &ticket).await?;

        match ticket.status {
            TicketStatus::Pending => {
                if tracking.started_at.is_none() {
                    tracking.queued_at.get_or_insert(now.clone());
                    tracking.user_id = None;
                }
                self.notify_main_channel(&ticket, "removeFromList");
            }
            TicketStatus::Open => {
                if tracking.started_at.is_none() {
                    tracking.started_at = Some(now.clone());
                    tracking.rating_at = None;
                    tracking.rated = false;
                    tracking.user_id = ticket.user_id;
                }
                self.notify_main_channel(&ticket, "removeFromList");
                self.notify_main_channel(&ticket, "updateUnread");
            }
            TicketStatus::Closed => {}
        }
        trackings::update_tracking(&self.db, &tracking).await?;

        // Entering a queue without an agent starts the chatbot.
        if !update.dont_run_chatbot
            && ticket.user_id.is_none()
            && let Some(queue_id) = ticket.queue_id
            && Some(queue_id) != old_queue_id
            && let Ok(session) = self.registry.get(ticket.connection_id)
            && let Some(queue) = queues::get_queue(&self.db, queue_id).await?
        {
            self.enter_queue(session, ticket.id, queue, true, 0).await?;
            ticket = tickets::get_ticket(&self.db, ticket.id)
                .await?
                .ok_or_else(|| AtendoError::app("ERR_TICKET_NOT_FOUND", 404))?;
        }

        // Accepted / transferred notices for human-driven changes.
        if !is_group
            && !ticket.chatbot
            && !contact.disable_bot
            && !update.chatbot.unwrap_or(false)
            && !update.dont_run_chatbot
        {
            let mut accepted = false;
            if ticket.user_id.is_some()
                && ticket.status == TicketStatus::Open
                && ticket.user_id != old_user_id
            {
                let accepted_message = self
                    .settings
                    .get(ticket.tenant_id, "ticketAcceptedMessage", "")
                    .await;
                if !accepted_message.is_empty()
                    && let Ok(session) = self.registry.get(ticket.connection_id)
                {
                    if let Err(e) = self
                        .send_and_record(&session, &ticket, &accepted_message)
                        .await
                    {
                        warn!(ticket_id, error = %e, "failed to send accepted message");
                    }
                    accepted = true;
                }
            }

            if !accepted
                && old_queue_id.is_some()
                && ticket.queue_id.is_some()
                && old_queue_id != ticket.queue_id
            {
                let fallback = self
                    .settings
                    .get(ticket.tenant_id, "transferMessage", "")
                    .await;
                let transfer = connection
                    .transfer_message
                    .clone()
                    .filter(|s| !s.trim().is_empty())
                    .unwrap_or(fallback);
                if !transfer.is_empty()
                    && let Ok(session) = self.registry.get(ticket.connection_id)
                    && let Err(e) = self.send_and_record(&session, &ticket, &transfer).await
                {
                    warn!(ticket_id, error = %e, "failed to send transfer message");
                }
            }
        }

        if update.just_close && ticket.status == TicketStatus::Closed {
            self.notify_main_channel(&ticket, "removeFromList");
        } else if ticket.status == TicketStatus::Closed && old_status != TicketStatus::Closed {
            self.publish_removed_from(&ticket, old_status, old_user_id);
        }
        self.notify_ticket_event("update", &ticket);

        Ok(ticket)
    }

    /// Tell list views on the previous status channels to drop the ticket.
    fn publish_removed_from(&self, ticket: &Ticket, old_status: TicketStatus, old_user: Option<i64>) {
        let mut topics = vec![
            Topic::Ticket(ticket.id),
            Topic::TenantStatus(ticket.tenant_id, old_status),
        ];
        if let Some(queue_id) = ticket.queue_id {
            topics.push(Topic::QueueStatus(queue_id, old_status));
        }
        if let Some(user_id) = old_user {
            topics.push(Topic::User(user_id));
        }
        self.notifier.publish(
            &topics,
            "ticket",
            json!({"action": "removeFromList", "ticketId": ticket.id}),
        );
    }

    fn notify_main_channel(&self, ticket: &Ticket, action: &str) {
        self.notifier.publish(
            &[Topic::TenantMain(ticket.tenant_id)],
            "ticket",
            json!({"action": action, "ticketId": ticket.id}),
        );
    }
}
