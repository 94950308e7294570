// SPDX-FileCopyrightText: 2026 Atendo Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Connection CRUD operations.

use atendo_core::types::ConnectionStatus;
use atendo_core::AtendoError;
use rusqlite::{params, Row};

use crate::database::{map_tr_err, Database};
use crate::models::Connection;

const CONNECTION_COLUMNS: &str = "id, tenant_id, name, status, qrcode, retries, \
     greeting_message, completion_message, out_of_hours_message, transfer_message, \
     rating_message";

fn connection_from_row(row: &Row<'_>) -> rusqlite::Result<Connection> {
    let status: String = row.get(3)?;
    Ok(Connection {
        id: row.get(0)?,
        tenant_id: row.get(1)?,
        name: row.get(2)?,
        status: status.parse().unwrap_or(ConnectionStatus::Uninitialized),
        qrcode: row.get(4)?,
        retries: row.get(5)?,
        greeting_message: row.get(6)?,
        completion_message: row.get(7)?,
        out_of_hours_message: row.get(8)?,
        transfer_message: row.get(9)?,
        rating_message: row.get(10)?,
    })
}

/// Insert a connection with an explicit id (ids come from tenant
/// configuration, not autoincrement).
pub async fn insert_connection(
    db: &Database,
    id: i64,
    tenant_id: i64,
    name: &str,
) -> Result<Connection, AtendoError> {
    let name = name.to_string();
    db.connection()
        .call(move |conn| {
            conn.execute(
                "INSERT INTO connections (id, tenant_id, name) VALUES (?1, ?2, ?3)",
                params![id, tenant_id, name],
            )?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)?;
    get_connection(db, id)
        .await?
        .ok_or_else(|| AtendoError::Internal("connection vanished after insert".into()))
}

/// Get a connection by id.
pub async fn get_connection(db: &Database, id: i64) -> Result<Option<Connection>, AtendoError> {
    db.connection()
        .call(move |conn| {
            let sql = format!("SELECT {CONNECTION_COLUMNS} FROM connections WHERE id = ?1");
            let mut stmt = conn.prepare(&sql)?;
            match stmt.query_row(params![id], connection_from_row) {
                Ok(connection) => Ok(Some(connection)),
                Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
                Err(e) => Err(e.into()),
            }
        })
        .await
        .map_err(map_tr_err)
}

/// Write all mutable connection fields back to the store.
pub async fn update_connection(db: &Database, connection: &Connection) -> Result<(), AtendoError> {
    let connection = connection.clone();
    db.connection()
        .call(move |conn| {
            conn.execute(
                "UPDATE connections SET name = ?2, status = ?3, qrcode = ?4, retries = ?5, \
                     greeting_message = ?6, completion_message = ?7, out_of_hours_message = ?8, \
                     transfer_message = ?9, rating_message = ?10
                 WHERE id = ?1",
                params![
                    connection.id,
                    connection.name,
                    connection.status.to_string(),
                    connection.qrcode,
                    connection.retries,
                    connection.greeting_message,
                    connection.completion_message,
                    connection.out_of_hours_message,
                    connection.transfer_message,
                    connection.rating_message,
                ],
            )?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}

/// Set the lifecycle status only.
pub async fn set_status(
    db: &Database,
    id: i64,
    status: ConnectionStatus,
) -> Result<(), AtendoError> {
    db.connection()
        .call(move |conn| {
            conn.execute(
                "UPDATE connections SET status = ?2 WHERE id = ?1",
                params![id, status.to_string()],
            )?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}

/// Record a fresh QR challenge for pairing.
pub async fn record_qr(db: &Database, id: i64, qr: &str) -> Result<(), AtendoError> {
    let qr = qr.to_string();
    db.connection()
        .call(move |conn| {
            conn.execute(
                "UPDATE connections SET qrcode = ?2, status = 'qrcode', retries = 0 \
                 WHERE id = ?1",
                params![id, qr],
            )?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}

/// Mark the connection open: connected, QR cleared, retry counter reset.
pub async fn mark_connected(db: &Database, id: i64) -> Result<(), AtendoError> {
    db.connection()
        .call(move |conn| {
            conn.execute(
                "UPDATE connections SET status = 'connected', qrcode = '', retries = 0 \
                 WHERE id = ?1",
                params![id],
            )?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}

/// Mark the connection terminally disconnected and clear the QR.
pub async fn mark_disconnected(db: &Database, id: i64) -> Result<(), AtendoError> {
    db.connection()
        .call(move |conn| {
            conn.execute(
                "UPDATE connections SET status = 'disconnected', qrcode = '' WHERE id = ?1",
                params![id],
            )?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}
