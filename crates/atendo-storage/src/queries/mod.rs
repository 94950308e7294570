// SPDX-FileCopyrightText: 2026 Atendo Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Typed query modules. Each module covers one entity and takes `&Database`.

pub mod campaigns;
pub mod connections;
pub mod contacts;
pub mod messages;
pub mod queues;
pub mod ratings;
pub mod settings;
pub mod tickets;
pub mod trackings;
pub mod users;

#[cfg(test)]
pub(crate) mod tests_support {
    use crate::database::Database;
    use crate::models::Ticket;
    use crate::queries::{connections, contacts, tickets};

    /// In-memory database with one connection, one contact, and one open
    /// pending ticket (tenant 1, connection 10).
    pub async fn seed_ticket() -> (Database, Ticket) {
        let db = Database::open_in_memory().await.unwrap();
        connections::insert_connection(&db, 10, 1, "main-line")
            .await
            .unwrap();
        let contact = contacts::upsert_contact(&db, 1, "5511999990000", "Alice", false)
            .await
            .unwrap();
        let ticket = tickets::insert_ticket(&db, 1, contact.id, 10).await.unwrap();
        (db, ticket)
    }
}
