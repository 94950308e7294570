// SPDX-FileCopyrightText: 2026 Atendo Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Test harness: an in-memory database with the standard fixtures most
//! integration tests need (tenant 1, connection 10, one direct contact).

use atendo_storage::models::{Connection, Contact, Queue, QueueOption, Ticket, User};
use atendo_storage::queries::{connections, contacts, queues, tickets, users};
use atendo_storage::Database;

pub const TENANT_ID: i64 = 1;
pub const CONNECTION_ID: i64 = 10;

/// Seeded in-memory storage for integration tests.
pub struct TestHarness {
    pub db: Database,
    pub connection: Connection,
    pub contact: Contact,
}

impl TestHarness {
    /// Build the harness: tenant 1, connection 10 with greeting and
    /// completion texts, and one direct contact.
    pub async fn new() -> Self {
        let db = Database::open_in_memory().await.unwrap();

        let mut connection = connections::insert_connection(&db, CONNECTION_ID, TENANT_ID, "main-line")
            .await
            .unwrap();
        connection.greeting_message = Some("Welcome to support".into());
        connection.completion_message = Some("Thanks for contacting us".into());
        connection.transfer_message = Some("Transferring you now".into());
        connection.rating_message = Some("Please rate our service".into());
        connections::update_connection(&db, &connection).await.unwrap();
        connections::mark_connected(&db, CONNECTION_ID).await.unwrap();
        connection = connections::get_connection(&db, CONNECTION_ID)
            .await
            .unwrap()
            .unwrap();

        let contact = contacts::upsert_contact(&db, TENANT_ID, "5511999990000", "Alice", false)
            .await
            .unwrap();

        Self {
            db,
            connection,
            contact,
        }
    }

    /// A fresh pending ticket for the default contact.
    pub async fn ticket(&self) -> Ticket {
        tickets::insert_ticket(&self.db, TENANT_ID, self.contact.id, CONNECTION_ID)
            .await
            .unwrap()
    }

    /// A queue linked to the default connection at the given menu position.
    pub async fn queue(&self, name: &str, greeting: Option<&str>, position: i64) -> Queue {
        let queue = queues::insert_queue(&self.db, TENANT_ID, name, greeting, None)
            .await
            .unwrap();
        queues::link_connection_queue(&self.db, CONNECTION_ID, queue.id, position)
            .await
            .unwrap();
        queue
    }

    /// A root-level menu option for a queue.
    pub async fn option(
        &self,
        queue_id: i64,
        parent_id: Option<i64>,
        label: &str,
        title: &str,
    ) -> QueueOption {
        queues::insert_option(&self.db, queue_id, parent_id, label, title, None, None, false)
            .await
            .unwrap()
    }

    /// An agent with the given profile.
    pub async fn user(&self, name: &str, profile: &str) -> User {
        users::insert_user(&self.db, TENANT_ID, name, profile)
            .await
            .unwrap()
    }

    /// A second, bot-disabled or group contact when a test needs one.
    pub async fn extra_contact(&self, number: &str, is_group: bool) -> Contact {
        contacts::upsert_contact(&self.db, TENANT_ID, number, "Extra", is_group)
            .await
            .unwrap()
    }
}
