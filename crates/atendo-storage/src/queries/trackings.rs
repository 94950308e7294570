// SPDX-FileCopyrightText: 2026 Atendo Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Ticket-tracking operations: one row per ticket lifecycle episode.

use atendo_core::AtendoError;
use rusqlite::{params, Row};

use crate::database::{map_tr_err, Database};
use crate::models::TicketTracking;

const TRACKING_COLUMNS: &str = "id, ticket_id, tenant_id, connection_id, user_id, queued_at, \
     started_at, finished_at, rating_at, chatbot_end_at, rated, expired";

fn tracking_from_row(row: &Row<'_>) -> rusqlite::Result<TicketTracking> {
    Ok(TicketTracking {
        id: row.get(0)?,
        ticket_id: row.get(1)?,
        tenant_id: row.get(2)?,
        connection_id: row.get(3)?,
        user_id: row.get(4)?,
        queued_at: row.get(5)?,
        started_at: row.get(6)?,
        finished_at: row.get(7)?,
        rating_at: row.get(8)?,
        chatbot_end_at: row.get(9)?,
        rated: row.get(10)?,
        expired: row.get(11)?,
    })
}

/// The open (unfinished) tracking episode for a ticket, creating one if
/// none exists.
pub async fn find_or_create_open(
    db: &Database,
    ticket_id: i64,
    tenant_id: i64,
    connection_id: i64,
) -> Result<TicketTracking, AtendoError> {
    db.connection()
        .call(move |conn| {
            let sql = format!(
                "SELECT {TRACKING_COLUMNS} FROM ticket_trackings \
                 WHERE ticket_id = ?1 AND finished_at IS NULL \
                 ORDER BY id DESC LIMIT 1"
            );
            let mut stmt = conn.prepare(&sql)?;
            match stmt.query_row(params![ticket_id], tracking_from_row) {
                Ok(tracking) => return Ok(tracking),
                Err(rusqlite::Error::QueryReturnedNoRows) => {}
                Err(e) => return Err(e.into()),
            }

            conn.execute(
                "INSERT INTO ticket_trackings (ticket_id, tenant_id, connection_id) \
                 VALUES (?1, ?2, ?3)",
                params![ticket_id, tenant_id, connection_id],
            )?;
            let id = conn.last_insert_rowid();
            let sql = format!("SELECT {TRACKING_COLUMNS} FROM ticket_trackings WHERE id = ?1");
            let mut stmt = conn.prepare(&sql)?;
            let tracking = stmt.query_row(params![id], tracking_from_row)?;
            Ok(tracking)
        })
        .await
        .map_err(map_tr_err)
}

/// Get a tracking row by id.
pub async fn get_tracking(db: &Database, id: i64) -> Result<Option<TicketTracking>, AtendoError> {
    db.connection()
        .call(move |conn| {
            let sql = format!("SELECT {TRACKING_COLUMNS} FROM ticket_trackings WHERE id = ?1");
            let mut stmt = conn.prepare(&sql)?;
            match stmt.query_row(params![id], tracking_from_row) {
                Ok(tracking) => Ok(Some(tracking)),
                Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
                Err(e) => Err(e.into()),
            }
        })
        .await
        .map_err(map_tr_err)
}

/// Write all mutable tracking fields back to the store.
pub async fn update_tracking(db: &Database, tracking: &TicketTracking) -> Result<(), AtendoError> {
    let tracking = tracking.clone();
    db.connection()
        .call(move |conn| {
            conn.execute(
                "UPDATE ticket_trackings SET user_id = ?2, queued_at = ?3, started_at = ?4, \
                     finished_at = ?5, rating_at = ?6, chatbot_end_at = ?7, rated = ?8, \
                     expired = ?9
                 WHERE id = ?1",
                params![
                    tracking.id,
                    tracking.user_id,
                    tracking.queued_at,
                    tracking.started_at,
                    tracking.finished_at,
                    tracking.rating_at,
                    tracking.chatbot_end_at,
                    tracking.rated,
                    tracking.expired,
                ],
            )?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}

/// The tracking episode of a closed ticket still awaiting its rating reply
/// from the given contact, if any.
///
/// Gates the post-close rating flow: rated/expired episodes and episodes
/// that never issued a rating prompt are ignored.
pub async fn find_awaiting_rating(
    db: &Database,
    connection_id: i64,
    contact_id: i64,
) -> Result<Option<TicketTracking>, AtendoError> {
    db.connection()
        .call(move |conn| {
            let sql = format!(
                "SELECT t.id, t.ticket_id, t.tenant_id, t.connection_id, t.user_id, \
                        t.queued_at, t.started_at, t.finished_at, t.rating_at, \
                        t.chatbot_end_at, t.rated, t.expired \
                 FROM ticket_trackings t \
                 JOIN tickets tk ON tk.id = t.ticket_id \
                 WHERE t.connection_id = ?1 AND t.rated = 0 AND t.expired = 0 \
                   AND t.rating_at IS NOT NULL \
                   AND tk.status = 'closed' AND tk.contact_id = ?2 \
                 ORDER BY t.id DESC LIMIT 1"
            );
            let mut stmt = conn.prepare(&sql)?;
            match stmt.query_row(params![connection_id, contact_id], tracking_from_row) {
                Ok(tracking) => Ok(Some(tracking)),
                Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
                Err(e) => Err(e.into()),
            }
        })
        .await
        .map_err(map_tr_err)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queries::tests_support::seed_ticket;
    use crate::queries::tickets;
    use atendo_core::types::TicketStatus;

    #[tokio::test]
    async fn find_or_create_reuses_open_episode() {
        let (db, ticket) = seed_ticket().await;

        let first = find_or_create_open(&db, ticket.id, ticket.tenant_id, ticket.connection_id)
            .await
            .unwrap();
        let second = find_or_create_open(&db, ticket.id, ticket.tenant_id, ticket.connection_id)
            .await
            .unwrap();
        assert_eq!(first.id, second.id);
    }

    #[tokio::test]
    async fn finished_episode_spawns_a_new_one() {
        let (db, ticket) = seed_ticket().await;

        let mut first = find_or_create_open(&db, ticket.id, ticket.tenant_id, ticket.connection_id)
            .await
            .unwrap();
        first.finished_at = Some(chrono::Utc::now().to_rfc3339());
        update_tracking(&db, &first).await.unwrap();

        let second = find_or_create_open(&db, ticket.id, ticket.tenant_id, ticket.connection_id)
            .await
            .unwrap();
        assert_ne!(first.id, second.id);
    }

    #[tokio::test]
    async fn awaiting_rating_requires_closed_unrated_prompted() {
        let (db, mut ticket) = seed_ticket().await;
        let mut tracking =
            find_or_create_open(&db, ticket.id, ticket.tenant_id, ticket.connection_id)
                .await
                .unwrap();

        // open ticket, no rating prompt: nothing pending
        assert!(find_awaiting_rating(&db, ticket.connection_id, ticket.contact_id)
            .await
            .unwrap()
            .is_none());

        ticket.status = TicketStatus::Closed;
        tickets::update_ticket(&db, &ticket).await.unwrap();
        tracking.rating_at = Some(chrono::Utc::now().to_rfc3339());
        update_tracking(&db, &tracking).await.unwrap();

        let pending = find_awaiting_rating(&db, ticket.connection_id, ticket.contact_id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(pending.ticket_id, ticket.id);

        tracking.rated = true;
        update_tracking(&db, &tracking).await.unwrap();
        assert!(find_awaiting_rating(&db, ticket.connection_id, ticket.contact_id)
            .await
            .unwrap()
            .is_none());
    }
}
