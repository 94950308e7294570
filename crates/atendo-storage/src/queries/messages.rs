// SPDX-FileCopyrightText: 2026 Atendo Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Message CRUD operations.
//!
//! Messages are keyed by the composite `(id, ticket_id)`; a bare message id
//! is ambiguous across tickets. Acknowledgement updates enforce the
//! strictly-greater rule in SQL so out-of-order delivery reports are no-ops
//! at the store itself.

use atendo_core::AtendoError;
use rusqlite::{params, Row};

use crate::database::{map_tr_err, Database};
use crate::models::{Message, OldMessage};

const MESSAGE_COLUMNS: &str = "id, ticket_id, tenant_id, contact_id, queue_id, remote_jid, \
     participant, body, from_me, read, media_type, media_url, thumbnail_url, ack, \
     quoted_msg_id, is_deleted, is_edited, data_json, created_at";

fn message_from_row(row: &Row<'_>) -> rusqlite::Result<Message> {
    Ok(Message {
        id: row.get(0)?,
        ticket_id: row.get(1)?,
        tenant_id: row.get(2)?,
        contact_id: row.get(3)?,
        queue_id: row.get(4)?,
        remote_jid: row.get(5)?,
        participant: row.get(6)?,
        body: row.get(7)?,
        from_me: row.get(8)?,
        read: row.get(9)?,
        media_type: row.get(10)?,
        media_url: row.get(11)?,
        thumbnail_url: row.get(12)?,
        ack: row.get(13)?,
        quoted_msg_id: row.get(14)?,
        is_deleted: row.get(15)?,
        is_edited: row.get(16)?,
        data_json: row.get(17)?,
        created_at: row.get(18)?,
    })
}

/// Upsert a message by its composite key.
///
/// Re-applying an identical message leaves the row unchanged; replays with
/// new fields overwrite them.
pub async fn upsert_message(db: &Database, msg: &Message) -> Result<(), AtendoError> {
    let msg = msg.clone();
    db.connection()
        .call(move |conn| {
            conn.execute(
                "INSERT INTO messages (id, ticket_id, tenant_id, contact_id, queue_id, \
                     remote_jid, participant, body, from_me, read, media_type, media_url, \
                     thumbnail_url, ack, quoted_msg_id, is_deleted, is_edited, data_json, \
                     created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, \
                     ?16, ?17, ?18, ?19)
                 ON CONFLICT (id, ticket_id) DO UPDATE SET
                     contact_id = excluded.contact_id,
                     queue_id = excluded.queue_id,
                     remote_jid = excluded.remote_jid,
                     participant = excluded.participant,
                     body = excluded.body,
                     from_me = excluded.from_me,
                     read = excluded.read,
                     media_type = excluded.media_type,
                     media_url = excluded.media_url,
                     thumbnail_url = excluded.thumbnail_url,
                     quoted_msg_id = excluded.quoted_msg_id,
                     is_deleted = excluded.is_deleted,
                     is_edited = excluded.is_edited,
                     data_json = excluded.data_json",
                params![
                    msg.id,
                    msg.ticket_id,
                    msg.tenant_id,
                    msg.contact_id,
                    msg.queue_id,
                    msg.remote_jid,
                    msg.participant,
                    msg.body,
                    msg.from_me,
                    msg.read,
                    msg.media_type,
                    msg.media_url,
                    msg.thumbnail_url,
                    msg.ack,
                    msg.quoted_msg_id,
                    msg.is_deleted,
                    msg.is_edited,
                    msg.data_json,
                    msg.created_at,
                ],
            )?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}

/// Get a message by its composite key.
pub async fn get_message(
    db: &Database,
    id: &str,
    ticket_id: i64,
) -> Result<Option<Message>, AtendoError> {
    let id = id.to_string();
    db.connection()
        .call(move |conn| {
            let sql =
                format!("SELECT {MESSAGE_COLUMNS} FROM messages WHERE id = ?1 AND ticket_id = ?2");
            let mut stmt = conn.prepare(&sql)?;
            match stmt.query_row(params![id, ticket_id], message_from_row) {
                Ok(msg) => Ok(Some(msg)),
                Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
                Err(e) => Err(e.into()),
            }
        })
        .await
        .map_err(map_tr_err)
}

/// Find a message within a ticket by either its raw protocol id or a
/// ticket-scoped composite id. Used for quoted-message resolution.
pub async fn find_quoted(
    db: &Database,
    raw_id: &str,
    scoped_id: &str,
    ticket_id: i64,
) -> Result<Option<Message>, AtendoError> {
    let raw_id = raw_id.to_string();
    let scoped_id = scoped_id.to_string();
    db.connection()
        .call(move |conn| {
            let sql = format!(
                "SELECT {MESSAGE_COLUMNS} FROM messages \
                 WHERE (id = ?1 OR id = ?2) AND ticket_id = ?3"
            );
            let mut stmt = conn.prepare(&sql)?;
            match stmt.query_row(params![raw_id, scoped_id, ticket_id], message_from_row) {
                Ok(msg) => Ok(Some(msg)),
                Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
                Err(e) => Err(e.into()),
            }
        })
        .await
        .map_err(map_tr_err)
}

/// Find the most recent message carrying the given raw id in any ticket.
///
/// Used by ack and delete handling, where the protocol only supplies the
/// bare id.
pub async fn find_by_raw_id(db: &Database, id: &str) -> Result<Option<Message>, AtendoError> {
    let id = id.to_string();
    db.connection()
        .call(move |conn| {
            let sql = format!(
                "SELECT {MESSAGE_COLUMNS} FROM messages WHERE id = ?1 \
                 ORDER BY created_at DESC LIMIT 1"
            );
            let mut stmt = conn.prepare(&sql)?;
            match stmt.query_row(params![id], message_from_row) {
                Ok(msg) => Ok(Some(msg)),
                Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
                Err(e) => Err(e.into()),
            }
        })
        .await
        .map_err(map_tr_err)
}

/// Find a sent message by raw id, for the retry-decrypt lookup.
pub async fn find_sent_by_raw_id(db: &Database, id: &str) -> Result<Option<Message>, AtendoError> {
    let id = id.to_string();
    db.connection()
        .call(move |conn| {
            let sql = format!(
                "SELECT {MESSAGE_COLUMNS} FROM messages WHERE id = ?1 AND from_me = 1 \
                 ORDER BY created_at DESC LIMIT 1"
            );
            let mut stmt = conn.prepare(&sql)?;
            match stmt.query_row(params![id], message_from_row) {
                Ok(msg) => Ok(Some(msg)),
                Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
                Err(e) => Err(e.into()),
            }
        })
        .await
        .map_err(map_tr_err)
}

/// Messages of a ticket in chronological order, optionally limited.
pub async fn get_messages_for_ticket(
    db: &Database,
    ticket_id: i64,
    limit: Option<i64>,
) -> Result<Vec<Message>, AtendoError> {
    db.connection()
        .call(move |conn| {
            let sql = match limit {
                Some(_) => format!(
                    "SELECT {MESSAGE_COLUMNS} FROM messages WHERE ticket_id = ?1 \
                     ORDER BY created_at ASC LIMIT ?2"
                ),
                None => format!(
                    "SELECT {MESSAGE_COLUMNS} FROM messages WHERE ticket_id = ?1 \
                     ORDER BY created_at ASC"
                ),
            };
            let mut stmt = conn.prepare(&sql)?;
            let mut messages = Vec::new();
            match limit {
                Some(lim) => {
                    let rows = stmt.query_map(params![ticket_id, lim], message_from_row)?;
                    for row in rows {
                        messages.push(row?);
                    }
                }
                None => {
                    let rows = stmt.query_map(params![ticket_id], message_from_row)?;
                    for row in rows {
                        messages.push(row?);
                    }
                }
            }
            Ok(messages)
        })
        .await
        .map_err(map_tr_err)
}

/// The most recent own message on a ticket, if any.
pub async fn last_from_me(db: &Database, ticket_id: i64) -> Result<Option<Message>, AtendoError> {
    db.connection()
        .call(move |conn| {
            let sql = format!(
                "SELECT {MESSAGE_COLUMNS} FROM messages \
                 WHERE ticket_id = ?1 AND from_me = 1 \
                 ORDER BY created_at DESC LIMIT 1"
            );
            let mut stmt = conn.prepare(&sql)?;
            match stmt.query_row(params![ticket_id], message_from_row) {
                Ok(msg) => Ok(Some(msg)),
                Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
                Err(e) => Err(e.into()),
            }
        })
        .await
        .map_err(map_tr_err)
}

/// Apply an acknowledgement update under the monotonic rule.
///
/// The row is only touched when the incoming value is strictly greater than
/// the stored one. Returns the updated message, or `None` when the update
/// was a no-op (unknown id, duplicate, or out-of-order report).
pub async fn update_ack(
    db: &Database,
    id: &str,
    ticket_id: i64,
    ack: i64,
) -> Result<Option<Message>, AtendoError> {
    let owned_id = id.to_string();
    let changed = db
        .connection()
        .call(move |conn| {
            let n = conn.execute(
                "UPDATE messages SET ack = ?3 \
                 WHERE id = ?1 AND ticket_id = ?2 AND ack < ?3",
                params![owned_id, ticket_id, ack],
            )?;
            Ok(n)
        })
        .await
        .map_err(map_tr_err)?;

    if changed == 0 {
        return Ok(None);
    }
    get_message(db, id, ticket_id).await
}

/// Mark a message as read.
pub async fn mark_read(db: &Database, id: &str, ticket_id: i64) -> Result<(), AtendoError> {
    let id = id.to_string();
    db.connection()
        .call(move |conn| {
            conn.execute(
                "UPDATE messages SET read = 1 WHERE id = ?1 AND ticket_id = ?2",
                params![id, ticket_id],
            )?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}

/// Mark every message of a ticket as read.
pub async fn mark_ticket_read(db: &Database, ticket_id: i64) -> Result<(), AtendoError> {
    db.connection()
        .call(move |conn| {
            conn.execute(
                "UPDATE messages SET read = 1 WHERE ticket_id = ?1 AND read = 0",
                params![ticket_id],
            )?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}

/// Soft-delete a message. The row stays for audit trail and ordering.
pub async fn mark_deleted(db: &Database, id: &str, ticket_id: i64) -> Result<(), AtendoError> {
    let id = id.to_string();
    db.connection()
        .call(move |conn| {
            conn.execute(
                "UPDATE messages SET is_deleted = 1 WHERE id = ?1 AND ticket_id = ?2",
                params![id, ticket_id],
            )?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}

/// Archive the current body to `old_messages` and overwrite it with the
/// edited text, flagging the message as edited. One transaction.
pub async fn archive_edit(
    db: &Database,
    id: &str,
    ticket_id: i64,
    new_body: &str,
) -> Result<Option<Message>, AtendoError> {
    let owned_id = id.to_string();
    let new_body = new_body.to_string();
    let edited = db
        .connection()
        .call(move |conn| {
            let tx = conn.transaction()?;
            let old_body: Option<String> = {
                let mut stmt =
                    tx.prepare("SELECT body FROM messages WHERE id = ?1 AND ticket_id = ?2")?;
                match stmt.query_row(params![owned_id, ticket_id], |row| row.get(0)) {
                    Ok(body) => Some(body),
                    Err(rusqlite::Error::QueryReturnedNoRows) => None,
                    Err(e) => return Err(e.into()),
                }
            };

            let Some(old_body) = old_body else {
                return Ok(false);
            };

            tx.execute(
                "INSERT INTO old_messages (message_id, ticket_id, body) VALUES (?1, ?2, ?3)
                 ON CONFLICT (message_id, ticket_id) DO UPDATE SET body = excluded.body",
                params![owned_id, ticket_id, old_body],
            )?;
            tx.execute(
                "UPDATE messages SET body = ?3, is_edited = 1 \
                 WHERE id = ?1 AND ticket_id = ?2",
                params![owned_id, ticket_id, new_body],
            )?;
            tx.commit()?;
            Ok(true)
        })
        .await
        .map_err(map_tr_err)?;

    if !edited {
        return Ok(None);
    }
    get_message(db, id, ticket_id).await
}

/// Archived pre-edit bodies for a message.
pub async fn get_old_messages(
    db: &Database,
    id: &str,
    ticket_id: i64,
) -> Result<Vec<OldMessage>, AtendoError> {
    let id = id.to_string();
    db.connection()
        .call(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT message_id, ticket_id, body FROM old_messages \
                 WHERE message_id = ?1 AND ticket_id = ?2",
            )?;
            let rows = stmt.query_map(params![id, ticket_id], |row| {
                Ok(OldMessage {
                    message_id: row.get(0)?,
                    ticket_id: row.get(1)?,
                    body: row.get(2)?,
                })
            })?;
            let mut out = Vec::new();
            for row in rows {
                out.push(row?);
            }
            Ok(out)
        })
        .await
        .map_err(map_tr_err)
}

/// Persist a sent payload that never joined a ticket, so the retry-decrypt
/// lookup can re-present it.
pub async fn insert_out_of_ticket(
    db: &Database,
    id: &str,
    data_json: &str,
) -> Result<(), AtendoError> {
    let id = id.to_string();
    let data_json = data_json.to_string();
    db.connection()
        .call(move |conn| {
            conn.execute(
                "INSERT INTO out_of_ticket_messages (id, data_json) VALUES (?1, ?2)
                 ON CONFLICT (id) DO UPDATE SET data_json = excluded.data_json",
                params![id, data_json],
            )?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}

/// Raw payload of an out-of-ticket sent message.
pub async fn get_out_of_ticket(db: &Database, id: &str) -> Result<Option<String>, AtendoError> {
    let id = id.to_string();
    db.connection()
        .call(move |conn| {
            let mut stmt =
                conn.prepare("SELECT data_json FROM out_of_ticket_messages WHERE id = ?1")?;
            match stmt.query_row(params![id], |row| row.get(0)) {
                Ok(data) => Ok(Some(data)),
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

    #[tokio::test]
    async fn upsert_is_idempotent() {
        let (db, ticket) = seed_ticket().await;

        let mut msg = Message::blank("M1", ticket.id, ticket.tenant_id);
        msg.body = "hello".into();
        upsert_message(&db, &msg).await.unwrap();
        upsert_message(&db, &msg).await.unwrap();

        let rows = get_messages_for_ticket(&db, ticket.id, None).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].body, "hello");
    }

    #[tokio::test]
    async fn same_id_in_two_tickets_coexists() {
        let (db, ticket) = seed_ticket().await;
        let other =
            crate::queries::tickets::insert_ticket(&db, ticket.tenant_id, ticket.contact_id, ticket.connection_id)
                .await
                .unwrap();

        let msg_a = Message::blank("FWD1", ticket.id, ticket.tenant_id);
        let msg_b = Message::blank("FWD1", other.id, ticket.tenant_id);
        upsert_message(&db, &msg_a).await.unwrap();
        upsert_message(&db, &msg_b).await.unwrap();

        assert!(get_message(&db, "FWD1", ticket.id).await.unwrap().is_some());
        assert!(get_message(&db, "FWD1", other.id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn ack_is_monotonic_max() {
        let (db, ticket) = seed_ticket().await;
        let msg = Message::blank("M1", ticket.id, ticket.tenant_id);
        upsert_message(&db, &msg).await.unwrap();

        // out-of-order: 2 then 1
        let updated = update_ack(&db, "M1", ticket.id, 2).await.unwrap();
        assert_eq!(updated.unwrap().ack, 2);
        let noop = update_ack(&db, "M1", ticket.id, 1).await.unwrap();
        assert!(noop.is_none());

        let stored = get_message(&db, "M1", ticket.id).await.unwrap().unwrap();
        assert_eq!(stored.ack, 2);

        // duplicate report is also a no-op
        assert!(update_ack(&db, "M1", ticket.id, 2).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn edit_archives_exactly_one_old_body() {
        let (db, ticket) = seed_ticket().await;
        let mut msg = Message::blank("M1", ticket.id, ticket.tenant_id);
        msg.body = "first".into();
        upsert_message(&db, &msg).await.unwrap();

        let edited = archive_edit(&db, "M1", ticket.id, "second")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(edited.body, "second");
        assert!(edited.is_edited);

        let old = get_old_messages(&db, "M1", ticket.id).await.unwrap();
        assert_eq!(old.len(), 1);
        assert_eq!(old[0].body, "first");
    }

    #[tokio::test]
    async fn delete_is_soft() {
        let (db, ticket) = seed_ticket().await;
        let msg = Message::blank("M1", ticket.id, ticket.tenant_id);
        upsert_message(&db, &msg).await.unwrap();

        mark_deleted(&db, "M1", ticket.id).await.unwrap();
        let stored = get_message(&db, "M1", ticket.id).await.unwrap().unwrap();
        assert!(stored.is_deleted);
    }

    #[tokio::test]
    async fn out_of_ticket_round_trip() {
        let (db, _ticket) = seed_ticket().await;
        insert_out_of_ticket(&db, "OOT1", r#"{"kind":"conversation","text":"hi"}"#)
            .await
            .unwrap();
        let data = get_out_of_ticket(&db, "OOT1").await.unwrap().unwrap();
        assert!(data.contains("conversation"));
        assert!(get_out_of_ticket(&db, "nope").await.unwrap().is_none());
    }
}
