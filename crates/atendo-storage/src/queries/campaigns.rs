// SPDX-FileCopyrightText: 2026 Atendo Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Campaign shipping confirmations.
//!
//! Campaign dispatch itself lives behind the opaque job queue; the only
//! state this core touches is the per-number confirmation row an inbound
//! reply may settle.

use atendo_core::AtendoError;
use rusqlite::params;

use crate::database::{map_tr_err, Database};

/// A campaign shipping row awaiting confirmation.
#[derive(Debug, Clone)]
pub struct CampaignShipping {
    pub id: i64,
    pub campaign_id: i64,
    pub tenant_id: i64,
    pub number: String,
}

/// The oldest unconfirmed shipping for a contact number, if any.
pub async fn find_pending_confirmation(
    db: &Database,
    tenant_id: i64,
    number: &str,
) -> Result<Option<CampaignShipping>, AtendoError> {
    let number = number.to_string();
    db.connection()
        .call(move |conn| {
            let result = conn.query_row(
                "SELECT id, campaign_id, tenant_id, number FROM campaign_shippings \
                 WHERE tenant_id = ?1 AND number = ?2 AND confirmation IS NULL \
                 ORDER BY id ASC LIMIT 1",
                params![tenant_id, number],
                |row| {
                    Ok(CampaignShipping {
                        id: row.get(0)?,
                        campaign_id: row.get(1)?,
                        tenant_id: row.get(2)?,
                        number: row.get(3)?,
                    })
                },
            );
            match result {
                Ok(shipping) => Ok(Some(shipping)),
                Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
                Err(e) => Err(e.into()),
            }
        })
        .await
        .map_err(map_tr_err)
}

/// Record the confirmation timestamp for a shipping.
pub async fn confirm(db: &Database, shipping_id: i64) -> Result<(), AtendoError> {
    db.connection()
        .call(move |conn| {
            conn.execute(
                "UPDATE campaign_shippings SET confirmation = 1, \
                     confirmed_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now') \
                 WHERE id = ?1",
                params![shipping_id],
            )?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}

/// Insert a pending shipping row (seeded by the campaign subsystem).
pub async fn insert_shipping(
    db: &Database,
    campaign_id: i64,
    tenant_id: i64,
    number: &str,
) -> Result<i64, AtendoError> {
    let number = number.to_string();
    db.connection()
        .call(move |conn| {
            conn.execute(
                "INSERT INTO campaign_shippings (campaign_id, tenant_id, number) \
                 VALUES (?1, ?2, ?3)",
                params![campaign_id, tenant_id, number],
            )?;
            Ok(conn.last_insert_rowid())
        })
        .await
        .map_err(map_tr_err)
}
