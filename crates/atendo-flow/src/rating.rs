// SPDX-FileCopyrightText: 2026 Atendo Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Post-close rating capture.
//!
//! A closed ticket whose tracking episode issued a rating prompt waits for
//! one more inbound reply: a number is clamped to 1..=5 and recorded, `!`
//! reopens the ticket, anything else expires the rating window.

use std::sync::Arc;

use tracing::warn;

use atendo_core::{AtendoError, Settings, Transport};
use atendo_session::SessionHandle;
use atendo_storage::models::{Contact, Ticket, TicketTracking};
use atendo_storage::queries::{connections, contacts, ratings, trackings};

use crate::pipeline::MessagePipeline;

impl MessagePipeline {
    /// Record a rating reply and finish the episode with the completion
    /// message.
    pub(crate) async fn handle_rating(
        &self,
        session: &Arc<SessionHandle>,
        ticket: &Ticket,
        tracking: &mut TicketTracking,
        rate: i64,
    ) -> Result<(), AtendoError> {
        // Out-of-range replies clamp to the nearest bound.
        let final_rate = rate.clamp(1, 5);
        ratings::insert_rating(
            &self.db,
            ticket.id,
            ticket.tenant_id,
            tracking.user_id,
            final_rate,
        )
        .await?;

        let connection = connections::get_connection(&self.db, ticket.connection_id)
            .await?
            .ok_or_else(|| AtendoError::app("ERR_NO_WAPP_FOUND", 404))?;
        let completion = connection
            .completion_message
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .unwrap_or("Service completed");

        let contact = contacts::get_contact(&self.db, ticket.contact_id)
            .await?
            .ok_or_else(|| AtendoError::app("ERR_CONTACT_NOT_FOUND", 404))?;

        match session
            .transport
            .send_text(
                &Self::contact_jid(&contact),
                &format!("\u{200E}{completion}"),
            )
            .await
        {
            Ok(sent) => {
                session.message_cache.cache_sent(&sent);
                tracking.rated = true;
                trackings::update_tracking(&self.db, tracking).await?;
            }
            Err(e) => warn!(ticket_id = ticket.id, error = %e, "error sending completion message"),
        }
        Ok(())
    }

    /// The tracking episode of a closed ticket still awaiting this
    /// contact's rating, if the tenant has ratings enabled.
    pub(crate) async fn pending_rating(
        &self,
        connection_id: i64,
        contact: &Contact,
    ) -> Result<Option<TicketTracking>, AtendoError> {
        if self
            .settings
            .get(contact.tenant_id, "userRating", "disabled")
            .await
            != "enabled"
        {
            return Ok(None);
        }
        trackings::find_awaiting_rating(&self.db, connection_id, contact.id).await
    }
}
