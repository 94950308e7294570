// SPDX-FileCopyrightText: 2026 Atendo Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Ticket CRUD operations.

use atendo_core::types::TicketStatus;
use atendo_core::AtendoError;
use rusqlite::{params, Row};

use crate::database::{map_tr_err, Database};
use crate::models::Ticket;

const TICKET_COLUMNS: &str = "id, tenant_id, contact_id, connection_id, status, queue_id, \
     user_id, chatbot, queue_option_id, unread_messages, last_message";

fn ticket_from_row(row: &Row<'_>) -> rusqlite::Result<Ticket> {
    let status: String = row.get(4)?;
    Ok(Ticket {
        id: row.get(0)?,
        tenant_id: row.get(1)?,
        contact_id: row.get(2)?,
        connection_id: row.get(3)?,
        status: status.parse().unwrap_or(TicketStatus::Pending),
        queue_id: row.get(5)?,
        user_id: row.get(6)?,
        chatbot: row.get(7)?,
        queue_option_id: row.get(8)?,
        unread_messages: row.get(9)?,
        last_message: row.get(10)?,
    })
}

/// Insert a fresh pending ticket and return it.
pub async fn insert_ticket(
    db: &Database,
    tenant_id: i64,
    contact_id: i64,
    connection_id: i64,
) -> Result<Ticket, AtendoError> {
    let id = db
        .connection()
        .call(move |conn| {
            conn.execute(
                "INSERT INTO tickets (tenant_id, contact_id, connection_id) VALUES (?1, ?2, ?3)",
                params![tenant_id, contact_id, connection_id],
            )?;
            Ok(conn.last_insert_rowid())
        })
        .await
        .map_err(map_tr_err)?;

    get_ticket(db, id)
        .await?
        .ok_or_else(|| AtendoError::Internal("ticket vanished after insert".into()))
}

/// Get a ticket by id.
pub async fn get_ticket(db: &Database, id: i64) -> Result<Option<Ticket>, AtendoError> {
    db.connection()
        .call(move |conn| {
            let sql = format!("SELECT {TICKET_COLUMNS} FROM tickets WHERE id = ?1");
            let mut stmt = conn.prepare(&sql)?;
            match stmt.query_row(params![id], ticket_from_row) {
                Ok(ticket) => Ok(Some(ticket)),
                Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
                Err(e) => Err(e.into()),
            }
        })
        .await
        .map_err(map_tr_err)
}

/// The single open/pending ticket for a contact on a connection, if any.
pub async fn find_open_for_contact(
    db: &Database,
    contact_id: i64,
    connection_id: i64,
) -> Result<Option<Ticket>, AtendoError> {
    db.connection()
        .call(move |conn| {
            let sql = format!(
                "SELECT {TICKET_COLUMNS} FROM tickets \
                 WHERE contact_id = ?1 AND connection_id = ?2 \
                   AND status IN ('open', 'pending') \
                 ORDER BY updated_at DESC LIMIT 1"
            );
            let mut stmt = conn.prepare(&sql)?;
            match stmt.query_row(params![contact_id, connection_id], ticket_from_row) {
                Ok(ticket) => Ok(Some(ticket)),
                Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
                Err(e) => Err(e.into()),
            }
        })
        .await
        .map_err(map_tr_err)
}

/// The most recent ticket for a contact on a connection regardless of
/// status. Used by narrow handlers (acks, edits, deletes) that must never
/// open a new ticket.
pub async fn find_latest_for_contact(
    db: &Database,
    contact_id: i64,
    connection_id: i64,
) -> Result<Option<Ticket>, AtendoError> {
    db.connection()
        .call(move |conn| {
            let sql = format!(
                "SELECT {TICKET_COLUMNS} FROM tickets \
                 WHERE contact_id = ?1 AND connection_id = ?2 \
                 ORDER BY updated_at DESC LIMIT 1"
            );
            let mut stmt = conn.prepare(&sql)?;
            match stmt.query_row(params![contact_id, connection_id], ticket_from_row) {
                Ok(ticket) => Ok(Some(ticket)),
                Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
                Err(e) => Err(e.into()),
            }
        })
        .await
        .map_err(map_tr_err)
}

/// Whether another open/pending ticket exists for the contact on this
/// connection. Guards ticket reopening.
pub async fn has_other_open(
    db: &Database,
    contact_id: i64,
    connection_id: i64,
    exclude_ticket_id: i64,
) -> Result<bool, AtendoError> {
    db.connection()
        .call(move |conn| {
            let count: i64 = conn.query_row(
                "SELECT count(*) FROM tickets \
                 WHERE contact_id = ?1 AND connection_id = ?2 AND id != ?3 \
                   AND status IN ('open', 'pending')",
                params![contact_id, connection_id, exclude_ticket_id],
                |row| row.get(0),
            )?;
            Ok(count > 0)
        })
        .await
        .map_err(map_tr_err)
}

/// Write all mutable ticket fields back to the store.
pub async fn update_ticket(db: &Database, ticket: &Ticket) -> Result<(), AtendoError> {
    let ticket = ticket.clone();
    db.connection()
        .call(move |conn| {
            conn.execute(
                "UPDATE tickets SET status = ?2, queue_id = ?3, user_id = ?4, chatbot = ?5, \
                     queue_option_id = ?6, unread_messages = ?7, last_message = ?8, \
                     updated_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now')
                 WHERE id = ?1",
                params![
                    ticket.id,
                    ticket.status.to_string(),
                    ticket.queue_id,
                    ticket.user_id,
                    ticket.chatbot,
                    ticket.queue_option_id,
                    ticket.unread_messages,
                    ticket.last_message,
                ],
            )?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}

/// Update only the denormalized chat-list preview.
pub async fn update_last_message(
    db: &Database,
    ticket_id: i64,
    preview: &str,
) -> Result<(), AtendoError> {
    let preview = preview.to_string();
    db.connection()
        .call(move |conn| {
            conn.execute(
                "UPDATE tickets SET last_message = ?2, \
                     updated_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now') \
                 WHERE id = ?1",
                params![ticket_id, preview],
            )?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}

/// Bump the unread counter for a ticket.
pub async fn increment_unread(db: &Database, ticket_id: i64) -> Result<(), AtendoError> {
    db.connection()
        .call(move |conn| {
            conn.execute(
                "UPDATE tickets SET unread_messages = unread_messages + 1 WHERE id = ?1",
                params![ticket_id],
            )?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}
