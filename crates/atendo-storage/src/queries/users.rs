// SPDX-FileCopyrightText: 2026 Atendo Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Agent account lookups. Profiles gate ticket acceptance rules.

use atendo_core::AtendoError;
use rusqlite::params;

use crate::database::{map_tr_err, Database};
use crate::models::User;

/// Insert an agent account and return it.
pub async fn insert_user(
    db: &Database,
    tenant_id: i64,
    name: &str,
    profile: &str,
) -> Result<User, AtendoError> {
    let name = name.to_string();
    let profile = profile.to_string();
    db.connection()
        .call(move |conn| {
            conn.execute(
                "INSERT INTO users (tenant_id, name, profile) VALUES (?1, ?2, ?3)",
                params![tenant_id, name, profile],
            )?;
            let id = conn.last_insert_rowid();
            let user = conn.query_row(
                "SELECT id, tenant_id, name, profile FROM users WHERE id = ?1",
                params![id],
                |row| {
                    Ok(User {
                        id: row.get(0)?,
                        tenant_id: row.get(1)?,
                        name: row.get(2)?,
                        profile: row.get(3)?,
                    })
                },
            )?;
            Ok(user)
        })
        .await
        .map_err(map_tr_err)
}

/// Get an agent account by id.
pub async fn get_user(db: &Database, id: i64) -> Result<Option<User>, AtendoError> {
    db.connection()
        .call(move |conn| {
            let result = conn.query_row(
                "SELECT id, tenant_id, name, profile FROM users WHERE id = ?1",
                params![id],
                |row| {
                    Ok(User {
                        id: row.get(0)?,
                        tenant_id: row.get(1)?,
                        name: row.get(2)?,
                        profile: row.get(3)?,
                    })
                },
            );
            match result {
                Ok(user) => Ok(Some(user)),
                Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
                Err(e) => Err(e.into()),
            }
        })
        .await
        .map_err(map_tr_err)
}
