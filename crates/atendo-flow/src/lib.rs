// SPDX-FileCopyrightText: 2026 Atendo Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Inbound message pipeline for the Atendo helpdesk core.
//!
//! Normalizes raw protocol events into stored messages and tickets, routes
//! conversations through the chatbot/queue state machine, captures
//! post-close ratings, and owns the single entry point for ticket
//! mutations. The [`InboundListener`] plugs the whole thing into a
//! connection's event loop.

pub mod body;
pub mod chatbot;
pub mod listener;
pub mod media;
pub mod pipeline;
pub mod quoted;
pub mod rating;
pub mod ticket;

pub use listener::InboundListener;
pub use pipeline::{MessagePipeline, RecordOptions};
pub use ticket::TicketUpdate;
