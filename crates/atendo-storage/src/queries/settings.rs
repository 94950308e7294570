// SPDX-FileCopyrightText: 2026 Atendo Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Per-tenant settings storage.

use atendo_core::AtendoError;
use rusqlite::params;

use crate::database::{map_tr_err, Database};

/// Read a tenant setting, `None` when unset.
pub async fn get_setting(
    db: &Database,
    tenant_id: i64,
    key: &str,
) -> Result<Option<String>, AtendoError> {
    let key = key.to_string();
    db.connection()
        .call(move |conn| {
            let result = conn.query_row(
                "SELECT value FROM settings WHERE tenant_id = ?1 AND key = ?2",
                params![tenant_id, key],
                |row| row.get(0),
            );
            match result {
                Ok(value) => Ok(Some(value)),
                Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
                Err(e) => Err(e.into()),
            }
        })
        .await
        .map_err(map_tr_err)
}

/// Upsert a tenant setting.
pub async fn set_setting(
    db: &Database,
    tenant_id: i64,
    key: &str,
    value: &str,
) -> Result<(), AtendoError> {
    let key = key.to_string();
    let value = value.to_string();
    db.connection()
        .call(move |conn| {
            conn.execute(
                "INSERT INTO settings (tenant_id, key, value) VALUES (?1, ?2, ?3)
                 ON CONFLICT (tenant_id, key) DO UPDATE SET value = excluded.value",
                params![tenant_id, key, value],
            )?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}
