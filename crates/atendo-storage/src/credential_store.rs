// SPDX-FileCopyrightText: 2026 Atendo Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! SQLite implementation of the credential store.
//!
//! The single upsert statement goes through tokio-rusqlite's background
//! writer, so a concurrent `load` observes either the full old blob or the
//! full new one, never a partial write.

use async_trait::async_trait;
use rusqlite::params;
use tracing::debug;

use atendo_core::traits::CredentialStore;
use atendo_core::AtendoError;

use crate::database::{map_tr_err, Database};

/// Persists protocol session material in the `credentials` table.
#[derive(Clone)]
pub struct SqliteCredentialStore {
    db: Database,
}

impl SqliteCredentialStore {
    pub fn new(db: Database) -> Self {
        Self { db }
    }
}

#[async_trait]
impl CredentialStore for SqliteCredentialStore {
    async fn load(&self, connection_id: i64) -> Result<Option<serde_json::Value>, AtendoError> {
        let blob: Option<String> = self
            .db
            .connection()
            .call(move |conn| {
                let result = conn.query_row(
                    "SELECT blob FROM credentials WHERE connection_id = ?1",
                    params![connection_id],
                    |row| row.get(0),
                );
                match result {
                    Ok(blob) => Ok(Some(blob)),
                    Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
                    Err(e) => Err(e.into()),
                }
            })
            .await
            .map_err(map_tr_err)?;

        match blob {
            Some(blob) => {
                let value = serde_json::from_str(&blob).map_err(|e| AtendoError::Storage {
                    source: Box::new(e),
                })?;
                Ok(Some(value))
            }
            None => Ok(None),
        }
    }

    async fn save(
        &self,
        connection_id: i64,
        credentials: &serde_json::Value,
    ) -> Result<(), AtendoError> {
        let blob = credentials.to_string();
        self.db
            .connection()
            .call(move |conn| {
                conn.execute(
                    "INSERT INTO credentials (connection_id, blob, updated_at) \
                     VALUES (?1, ?2, strftime('%Y-%m-%dT%H:%M:%fZ', 'now'))
                     ON CONFLICT (connection_id) DO UPDATE SET
                         blob = excluded.blob,
                         updated_at = excluded.updated_at",
                    params![connection_id, blob],
                )?;
                Ok(())
            })
            .await
            .map_err(map_tr_err)?;
        debug!(connection_id, "credentials saved");
        Ok(())
    }

    async fn wipe(&self, connection_id: i64) -> Result<(), AtendoError> {
        self.db
            .connection()
            .call(move |conn| {
                conn.execute(
                    "DELETE FROM credentials WHERE connection_id = ?1",
                    params![connection_id],
                )?;
                Ok(())
            })
            .await
            .map_err(map_tr_err)?;
        debug!(connection_id, "credentials wiped");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queries::connections;
    use serde_json::json;

    #[tokio::test]
    async fn save_load_wipe_round_trip() {
        let db = Database::open_in_memory().await.unwrap();
        connections::insert_connection(&db, 10, 1, "main-line")
            .await
            .unwrap();
        let store = SqliteCredentialStore::new(db);

        assert!(store.load(10).await.unwrap().is_none());

        let creds = json!({"noise_key": "abc", "registered": true});
        store.save(10, &creds).await.unwrap();
        assert_eq!(store.load(10).await.unwrap().unwrap(), creds);

        // save replaces atomically
        let newer = json!({"noise_key": "def", "registered": true});
        store.save(10, &newer).await.unwrap();
        assert_eq!(store.load(10).await.unwrap().unwrap(), newer);

        store.wipe(10).await.unwrap();
        assert!(store.load(10).await.unwrap().is_none());
    }
}
