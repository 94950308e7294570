// SPDX-FileCopyrightText: 2026 Atendo Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Contact CRUD operations. Contacts are upserted on first sight and never
//! hard-deleted.

use atendo_core::AtendoError;
use rusqlite::{params, Row};

use crate::database::{map_tr_err, Database};
use crate::models::Contact;

const CONTACT_COLUMNS: &str = "id, tenant_id, number, name, is_group, disable_bot, presence";

fn contact_from_row(row: &Row<'_>) -> rusqlite::Result<Contact> {
    Ok(Contact {
        id: row.get(0)?,
        tenant_id: row.get(1)?,
        number: row.get(2)?,
        name: row.get(3)?,
        is_group: row.get(4)?,
        disable_bot: row.get(5)?,
        presence: row.get(6)?,
    })
}

/// Upsert a contact by `(number, tenant_id)` and return the stored row.
///
/// A profile-data refresh overwrites the name; `disable_bot` is left alone
/// so operator choices survive re-upserts.
pub async fn upsert_contact(
    db: &Database,
    tenant_id: i64,
    number: &str,
    name: &str,
    is_group: bool,
) -> Result<Contact, AtendoError> {
    let number = number.to_string();
    let name = name.to_string();
    db.connection()
        .call(move |conn| {
            conn.execute(
                "INSERT INTO contacts (tenant_id, number, name, is_group) \
                 VALUES (?1, ?2, ?3, ?4)
                 ON CONFLICT (number, tenant_id) DO UPDATE SET
                     name = CASE WHEN excluded.name != '' THEN excluded.name ELSE name END,
                     is_group = excluded.is_group",
                params![tenant_id, number, name, is_group],
            )?;
            let sql = format!(
                "SELECT {CONTACT_COLUMNS} FROM contacts WHERE number = ?1 AND tenant_id = ?2"
            );
            let mut stmt = conn.prepare(&sql)?;
            let contact = stmt.query_row(params![number, tenant_id], contact_from_row)?;
            Ok(contact)
        })
        .await
        .map_err(map_tr_err)
}

/// Get a contact by id.
pub async fn get_contact(db: &Database, id: i64) -> Result<Option<Contact>, AtendoError> {
    db.connection()
        .call(move |conn| {
            let sql = format!("SELECT {CONTACT_COLUMNS} FROM contacts WHERE id = ?1");
            let mut stmt = conn.prepare(&sql)?;
            match stmt.query_row(params![id], contact_from_row) {
                Ok(contact) => Ok(Some(contact)),
                Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
                Err(e) => Err(e.into()),
            }
        })
        .await
        .map_err(map_tr_err)
}

/// Find a contact by number within a tenant.
pub async fn find_by_number(
    db: &Database,
    tenant_id: i64,
    number: &str,
) -> Result<Option<Contact>, AtendoError> {
    let number = number.to_string();
    db.connection()
        .call(move |conn| {
            let sql = format!(
                "SELECT {CONTACT_COLUMNS} FROM contacts WHERE number = ?1 AND tenant_id = ?2"
            );
            let mut stmt = conn.prepare(&sql)?;
            match stmt.query_row(params![number, tenant_id], contact_from_row) {
                Ok(contact) => Ok(Some(contact)),
                Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
                Err(e) => Err(e.into()),
            }
        })
        .await
        .map_err(map_tr_err)
}

/// Record the contact's last known presence.
pub async fn set_presence(db: &Database, id: i64, presence: &str) -> Result<(), AtendoError> {
    let presence = presence.to_string();
    db.connection()
        .call(move |conn| {
            conn.execute(
                "UPDATE contacts SET presence = ?2 WHERE id = ?1",
                params![id, presence],
            )?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}

/// Toggle chatbot suppression for a contact.
pub async fn set_disable_bot(db: &Database, id: i64, disable: bool) -> Result<(), AtendoError> {
    db.connection()
        .call(move |conn| {
            conn.execute(
                "UPDATE contacts SET disable_bot = ?2 WHERE id = ?1",
                params![id, disable],
            )?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::Database;

    #[tokio::test]
    async fn upsert_creates_then_updates() {
        let db = Database::open_in_memory().await.unwrap();

        let created = upsert_contact(&db, 1, "5511999990000", "Alice", false)
            .await
            .unwrap();
        let updated = upsert_contact(&db, 1, "5511999990000", "Alice Smith", false)
            .await
            .unwrap();

        assert_eq!(created.id, updated.id);
        assert_eq!(updated.name, "Alice Smith");
    }

    #[tokio::test]
    async fn empty_name_refresh_keeps_existing_name() {
        let db = Database::open_in_memory().await.unwrap();

        upsert_contact(&db, 1, "5511999990000", "Alice", false)
            .await
            .unwrap();
        let refreshed = upsert_contact(&db, 1, "5511999990000", "", false)
            .await
            .unwrap();
        assert_eq!(refreshed.name, "Alice");
    }

    #[tokio::test]
    async fn same_number_different_tenants_are_distinct() {
        let db = Database::open_in_memory().await.unwrap();

        let a = upsert_contact(&db, 1, "5511999990000", "Alice", false)
            .await
            .unwrap();
        let b = upsert_contact(&db, 2, "5511999990000", "Alice", false)
            .await
            .unwrap();
        assert_ne!(a.id, b.id);
    }

    #[tokio::test]
    async fn disable_bot_survives_upsert() {
        let db = Database::open_in_memory().await.unwrap();
        let contact = upsert_contact(&db, 1, "551199", "Bob", false).await.unwrap();
        set_disable_bot(&db, contact.id, true).await.unwrap();

        let refreshed = upsert_contact(&db, 1, "551199", "Bobby", false).await.unwrap();
        assert!(refreshed.disable_bot);
    }
}
