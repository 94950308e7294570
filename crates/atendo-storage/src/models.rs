// SPDX-FileCopyrightText: 2026 Atendo Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Domain model types for storage entities.

use atendo_core::types::{ConnectionStatus, TicketStatus};
use serde::Serialize;

/// One registered phone-number session to the messaging network.
#[derive(Debug, Clone, Serialize)]
pub struct Connection {
    pub id: i64,
    pub tenant_id: i64,
    pub name: String,
    pub status: ConnectionStatus,
    pub qrcode: String,
    pub retries: i64,
    pub greeting_message: Option<String>,
    pub completion_message: Option<String>,
    pub out_of_hours_message: Option<String>,
    pub transfer_message: Option<String>,
    pub rating_message: Option<String>,
}

/// A contact, identified by `(number, tenant_id)`. Never hard-deleted.
#[derive(Debug, Clone, Serialize)]
pub struct Contact {
    pub id: i64,
    pub tenant_id: i64,
    pub number: String,
    pub name: String,
    pub is_group: bool,
    pub disable_bot: bool,
    pub presence: String,
}

/// An agent account; `profile` is `admin` or `user`.
#[derive(Debug, Clone, Serialize)]
pub struct User {
    pub id: i64,
    pub tenant_id: i64,
    pub name: String,
    pub profile: String,
}

/// One conversation thread between a tenant agent/bot and a contact.
#[derive(Debug, Clone, Serialize)]
pub struct Ticket {
    pub id: i64,
    pub tenant_id: i64,
    pub contact_id: i64,
    pub connection_id: i64,
    pub status: TicketStatus,
    pub queue_id: Option<i64>,
    pub user_id: Option<i64>,
    /// Whether menu routing is active for this ticket.
    pub chatbot: bool,
    /// Current position in the queue-option menu tree.
    pub queue_option_id: Option<i64>,
    pub unread_messages: i64,
    /// Denormalized preview for chat lists, truncated to 255 chars.
    pub last_message: String,
}

/// One ticket lifecycle episode, for SLA metrics and the rating flow.
#[derive(Debug, Clone, Serialize)]
pub struct TicketTracking {
    pub id: i64,
    pub ticket_id: i64,
    pub tenant_id: i64,
    pub connection_id: i64,
    pub user_id: Option<i64>,
    pub queued_at: Option<String>,
    pub started_at: Option<String>,
    pub finished_at: Option<String>,
    pub rating_at: Option<String>,
    pub chatbot_end_at: Option<String>,
    pub rated: bool,
    pub expired: bool,
}

/// One stored message. Identity is the composite `(id, ticket_id)`.
#[derive(Debug, Clone, Serialize)]
pub struct Message {
    pub id: String,
    pub ticket_id: i64,
    pub tenant_id: i64,
    pub contact_id: Option<i64>,
    pub queue_id: Option<i64>,
    pub remote_jid: Option<String>,
    pub participant: Option<String>,
    pub body: String,
    pub from_me: bool,
    pub read: bool,
    pub media_type: Option<String>,
    pub media_url: Option<String>,
    pub thumbnail_url: Option<String>,
    /// Delivery-acknowledgement level; updates are strictly increasing.
    pub ack: i64,
    pub quoted_msg_id: Option<String>,
    pub is_deleted: bool,
    pub is_edited: bool,
    /// Raw protocol payload, kept opaque for replay/recovery.
    pub data_json: Option<String>,
    pub created_at: String,
}

impl Message {
    /// A blank message for the given composite key, with every optional
    /// column unset. Callers fill in what they know before upserting.
    pub fn blank(id: impl Into<String>, ticket_id: i64, tenant_id: i64) -> Self {
        Self {
            id: id.into(),
            ticket_id,
            tenant_id,
            contact_id: None,
            queue_id: None,
            remote_jid: None,
            participant: None,
            body: String::new(),
            from_me: false,
            read: false,
            media_type: None,
            media_url: None,
            thumbnail_url: None,
            ack: 0,
            quoted_msg_id: None,
            is_deleted: false,
            is_edited: false,
            data_json: None,
            created_at: chrono::Utc::now().to_rfc3339(),
        }
    }
}

/// An archived pre-edit body.
#[derive(Debug, Clone, Serialize)]
pub struct OldMessage {
    pub message_id: String,
    pub ticket_id: i64,
    pub body: String,
}

/// A named routing bucket.
#[derive(Debug, Clone, Serialize)]
pub struct Queue {
    pub id: i64,
    pub tenant_id: i64,
    pub name: String,
    pub greeting_message: Option<String>,
    pub out_of_hours_message: Option<String>,
}

/// One node of a queue's menu tree.
#[derive(Debug, Clone, Serialize)]
pub struct QueueOption {
    pub id: i64,
    pub queue_id: i64,
    pub parent_id: Option<i64>,
    /// The label a contact replies with to select this node.
    pub option: String,
    pub title: String,
    pub message: Option<String>,
    pub forward_queue_id: Option<i64>,
    pub exit_chatbot: bool,
}
