// SPDX-FileCopyrightText: 2026 Atendo Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Service-rating records captured by the post-close rating flow.

use atendo_core::AtendoError;
use rusqlite::params;

use crate::database::{map_tr_err, Database};

/// Record a rating for a ticket.
pub async fn insert_rating(
    db: &Database,
    ticket_id: i64,
    tenant_id: i64,
    user_id: Option<i64>,
    rate: i64,
) -> Result<(), AtendoError> {
    db.connection()
        .call(move |conn| {
            conn.execute(
                "INSERT INTO ratings (ticket_id, tenant_id, user_id, rate) \
                 VALUES (?1, ?2, ?3, ?4)",
                params![ticket_id, tenant_id, user_id, rate],
            )?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}

/// All recorded rates for a ticket, oldest first.
pub async fn rates_for_ticket(db: &Database, ticket_id: i64) -> Result<Vec<i64>, AtendoError> {
    db.connection()
        .call(move |conn| {
            let mut stmt =
                conn.prepare("SELECT rate FROM ratings WHERE ticket_id = ?1 ORDER BY id ASC")?;
            let rows = stmt.query_map(params![ticket_id], |row| row.get(0))?;
            let mut out = Vec::new();
            for row in rows {
                out.push(row?);
            }
            Ok(out)
        })
        .await
        .map_err(map_tr_err)
}
