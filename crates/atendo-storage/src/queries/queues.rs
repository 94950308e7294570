// SPDX-FileCopyrightText: 2026 Atendo Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Queue and queue-option operations: the menu trees the chatbot walks.

use atendo_core::AtendoError;
use rusqlite::{params, Row};

use crate::database::{map_tr_err, Database};
use crate::models::{Queue, QueueOption};

const QUEUE_COLUMNS: &str = "id, tenant_id, name, greeting_message, out_of_hours_message";
const OPTION_COLUMNS: &str =
    "id, queue_id, parent_id, option, title, message, forward_queue_id, exit_chatbot";

fn queue_from_row(row: &Row<'_>) -> rusqlite::Result<Queue> {
    Ok(Queue {
        id: row.get(0)?,
        tenant_id: row.get(1)?,
        name: row.get(2)?,
        greeting_message: row.get(3)?,
        out_of_hours_message: row.get(4)?,
    })
}

fn option_from_row(row: &Row<'_>) -> rusqlite::Result<QueueOption> {
    Ok(QueueOption {
        id: row.get(0)?,
        queue_id: row.get(1)?,
        parent_id: row.get(2)?,
        option: row.get(3)?,
        title: row.get(4)?,
        message: row.get(5)?,
        forward_queue_id: row.get(6)?,
        exit_chatbot: row.get(7)?,
    })
}

/// Insert a queue and return it.
pub async fn insert_queue(
    db: &Database,
    tenant_id: i64,
    name: &str,
    greeting_message: Option<&str>,
    out_of_hours_message: Option<&str>,
) -> Result<Queue, AtendoError> {
    let name = name.to_string();
    let greeting = greeting_message.map(|s| s.to_string());
    let out_of_hours = out_of_hours_message.map(|s| s.to_string());
    db.connection()
        .call(move |conn| {
            conn.execute(
                "INSERT INTO queues (tenant_id, name, greeting_message, out_of_hours_message) \
                 VALUES (?1, ?2, ?3, ?4)",
                params![tenant_id, name, greeting, out_of_hours],
            )?;
            let id = conn.last_insert_rowid();
            let sql = format!("SELECT {QUEUE_COLUMNS} FROM queues WHERE id = ?1");
            let mut stmt = conn.prepare(&sql)?;
            let queue = stmt.query_row(params![id], queue_from_row)?;
            Ok(queue)
        })
        .await
        .map_err(map_tr_err)
}

/// Get a queue by id.
pub async fn get_queue(db: &Database, id: i64) -> Result<Option<Queue>, AtendoError> {
    db.connection()
        .call(move |conn| {
            let sql = format!("SELECT {QUEUE_COLUMNS} FROM queues WHERE id = ?1");
            let mut stmt = conn.prepare(&sql)?;
            match stmt.query_row(params![id], queue_from_row) {
                Ok(queue) => Ok(Some(queue)),
                Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
                Err(e) => Err(e.into()),
            }
        })
        .await
        .map_err(map_tr_err)
}

/// Insert a menu option node and return it.
#[allow(clippy::too_many_arguments)]
pub async fn insert_option(
    db: &Database,
    queue_id: i64,
    parent_id: Option<i64>,
    option: &str,
    title: &str,
    message: Option<&str>,
    forward_queue_id: Option<i64>,
    exit_chatbot: bool,
) -> Result<QueueOption, AtendoError> {
    let option = option.to_string();
    let title = title.to_string();
    let message = message.map(|s| s.to_string());
    db.connection()
        .call(move |conn| {
            conn.execute(
                "INSERT INTO queue_options \
                     (queue_id, parent_id, option, title, message, forward_queue_id, exit_chatbot) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![queue_id, parent_id, option, title, message, forward_queue_id, exit_chatbot],
            )?;
            let id = conn.last_insert_rowid();
            let sql = format!("SELECT {OPTION_COLUMNS} FROM queue_options WHERE id = ?1");
            let mut stmt = conn.prepare(&sql)?;
            let opt = stmt.query_row(params![id], option_from_row)?;
            Ok(opt)
        })
        .await
        .map_err(map_tr_err)
}

/// Get an option node by id.
pub async fn get_option(db: &Database, id: i64) -> Result<Option<QueueOption>, AtendoError> {
    db.connection()
        .call(move |conn| {
            let sql = format!("SELECT {OPTION_COLUMNS} FROM queue_options WHERE id = ?1");
            let mut stmt = conn.prepare(&sql)?;
            match stmt.query_row(params![id], option_from_row) {
                Ok(opt) => Ok(Some(opt)),
                Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
                Err(e) => Err(e.into()),
            }
        })
        .await
        .map_err(map_tr_err)
}

/// Root-level options of a queue, in label order.
pub async fn root_options(db: &Database, queue_id: i64) -> Result<Vec<QueueOption>, AtendoError> {
    db.connection()
        .call(move |conn| {
            let sql = format!(
                "SELECT {OPTION_COLUMNS} FROM queue_options \
                 WHERE queue_id = ?1 AND parent_id IS NULL \
                 ORDER BY CAST(option AS INTEGER) ASC, option ASC"
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt.query_map(params![queue_id], option_from_row)?;
            let mut out = Vec::new();
            for row in rows {
                out.push(row?);
            }
            Ok(out)
        })
        .await
        .map_err(map_tr_err)
}

/// Children of a menu node, in label order.
pub async fn child_options(db: &Database, parent_id: i64) -> Result<Vec<QueueOption>, AtendoError> {
    db.connection()
        .call(move |conn| {
            let sql = format!(
                "SELECT {OPTION_COLUMNS} FROM queue_options WHERE parent_id = ?1 \
                 ORDER BY CAST(option AS INTEGER) ASC, option ASC"
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt.query_map(params![parent_id], option_from_row)?;
            let mut out = Vec::new();
            for row in rows {
                out.push(row?);
            }
            Ok(out)
        })
        .await
        .map_err(map_tr_err)
}

/// Find the child of a node whose label matches the reply text.
pub async fn find_child_by_label(
    db: &Database,
    parent_id: i64,
    label: &str,
) -> Result<Option<QueueOption>, AtendoError> {
    let label = label.to_string();
    db.connection()
        .call(move |conn| {
            let sql = format!(
                "SELECT {OPTION_COLUMNS} FROM queue_options \
                 WHERE parent_id = ?1 AND option = ?2 LIMIT 1"
            );
            let mut stmt = conn.prepare(&sql)?;
            match stmt.query_row(params![parent_id, label], option_from_row) {
                Ok(opt) => Ok(Some(opt)),
                Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
                Err(e) => Err(e.into()),
            }
        })
        .await
        .map_err(map_tr_err)
}

/// Attach a queue to a connection at the given menu position.
pub async fn link_connection_queue(
    db: &Database,
    connection_id: i64,
    queue_id: i64,
    position: i64,
) -> Result<(), AtendoError> {
    db.connection()
        .call(move |conn| {
            conn.execute(
                "INSERT INTO connection_queues (connection_id, queue_id, position) \
                 VALUES (?1, ?2, ?3)
                 ON CONFLICT (connection_id, queue_id) DO UPDATE SET position = excluded.position",
                params![connection_id, queue_id, position],
            )?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}

/// Queues assigned to a connection, in menu order.
pub async fn queues_for_connection(
    db: &Database,
    connection_id: i64,
) -> Result<Vec<Queue>, AtendoError> {
    db.connection()
        .call(move |conn| {
            let sql = format!(
                "SELECT q.id, q.tenant_id, q.name, q.greeting_message, q.out_of_hours_message \
                 FROM queues q \
                 JOIN connection_queues cq ON cq.queue_id = q.id \
                 WHERE cq.connection_id = ?1 \
                 ORDER BY cq.position ASC, q.id ASC"
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt.query_map(params![connection_id], queue_from_row)?;
            let mut out = Vec::new();
            for row in rows {
                out.push(row?);
            }
            Ok(out)
        })
        .await
        .map_err(map_tr_err)
}
