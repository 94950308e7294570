// SPDX-FileCopyrightText: 2026 Atendo Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Realtime notification trait.
//!
//! Delivery is at-most-once and best-effort; `publish` never blocks and
//! never errors from the core's perspective.

use std::fmt;

use crate::types::TicketStatus;

/// A named topic clients subscribe to.
///
/// Status-scoped topics exist so clients holding list views by status stay
/// consistent without polling: every client-visible change is published to
/// the ticket, the owning queue, the owning tenant, and the previous/next
/// status channels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Topic {
    Ticket(i64),
    User(i64),
    QueueStatus(i64, TicketStatus),
    QueueNotification(i64),
    TenantStatus(i64, TicketStatus),
    TenantNotification(i64),
    TenantMain(i64),
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Topic::Ticket(id) => write!(f, "ticket:{id}"),
            Topic::User(id) => write!(f, "user:{id}"),
            Topic::QueueStatus(id, status) => write!(f, "queue:{id}:{status}"),
            Topic::QueueNotification(id) => write!(f, "queue:{id}:notification"),
            Topic::TenantStatus(id, status) => write!(f, "tenant:{id}:{status}"),
            Topic::TenantNotification(id) => write!(f, "tenant:{id}:notification"),
            Topic::TenantMain(id) => write!(f, "tenant:{id}:mainchannel"),
        }
    }
}

/// Publishes realtime events to subscribed clients.
pub trait Notifier: Send + Sync {
    /// Publishes `payload` under `event` to every topic in `topics`.
    fn publish(&self, topics: &[Topic], event: &str, payload: serde_json::Value);
}
