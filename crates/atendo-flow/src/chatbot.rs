// SPDX-FileCopyrightText: 2026 Atendo Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Chatbot/queue routing state machine.
//!
//! Walks a queue's menu tree in response to inbound text: root queue
//! selection, nested option matching with single-child auto-advance,
//! exit-chatbot and forward-queue leaves, and out-of-hours gating. Queue
//! forwarding re-enters the machine at the target queue's root; the walk
//! is bounded by an explicit depth limit because tenant-configured queue
//! graphs are not guaranteed acyclic.

use std::sync::Arc;

use futures::future::BoxFuture;
use tracing::{debug, warn};

use atendo_core::types::TicketStatus;
use atendo_core::{AtendoError, Schedules, Settings};
use atendo_session::SessionHandle;
use atendo_storage::models::{Queue, QueueOption, Ticket};
use atendo_storage::queries::{connections, queues, tickets};

use crate::pipeline::MessagePipeline;
use crate::ticket::TicketUpdate;

const NUMBER_EMOJIS: [&str; 11] = [
    "0\u{FE0F}\u{20E3}",
    "1\u{FE0F}\u{20E3}",
    "2\u{FE0F}\u{20E3}",
    "3\u{FE0F}\u{20E3}",
    "4\u{FE0F}\u{20E3}",
    "5\u{FE0F}\u{20E3}",
    "6\u{FE0F}\u{20E3}",
    "7\u{FE0F}\u{20E3}",
    "8\u{FE0F}\u{20E3}",
    "9\u{FE0F}\u{20E3}",
    "\u{1F51F}",
];

fn emoji_number(n: usize) -> String {
    if n <= 10 {
        NUMBER_EMOJIS[n].to_string()
    } else {
        format!("[ {n} ]")
    }
}

impl MessagePipeline {
    /// Root-level queue selection for a ticket without a queue.
    ///
    /// One configured queue is auto-assigned; several present a numbered
    /// menu, where a 1-based numeric reply picks a queue and anything else
    /// re-sends the menu.
    pub async fn verify_queue(
        &self,
        session: &Arc<SessionHandle>,
        reply: Option<&str>,
        ticket: &Ticket,
    ) -> Result<(), AtendoError> {
        let assigned = queues::queues_for_connection(&self.db, ticket.connection_id).await?;
        if assigned.is_empty() {
            return Ok(());
        }

        if assigned.len() == 1 {
            let queue = assigned.into_iter().next().expect("non-empty");
            return self
                .enter_queue(Arc::clone(session), ticket.id, queue, false, 0)
                .await;
        }

        let chosen = reply
            .and_then(|r| r.trim().parse::<usize>().ok())
            .and_then(|n| n.checked_sub(1))
            .and_then(|i| assigned.get(i).cloned());

        if let Some(queue) = chosen {
            return self
                .enter_queue(Arc::clone(session), ticket.id, queue, true, 0)
                .await;
        }

        // No valid selection: (re-)send the root menu.
        let connection = connections::get_connection(&self.db, ticket.connection_id)
            .await?
            .ok_or_else(|| AtendoError::app("ERR_NO_WAPP_FOUND", 404))?;
        let show_icons = self.show_numeric_icons(ticket.tenant_id, assigned.len()).await;

        let mut options = String::new();
        for (index, queue) in assigned.iter().enumerate() {
            if show_icons {
                options.push_str(&format!("{} - {}\n", emoji_number(index + 1), queue.name));
            } else {
                options.push_str(&format!("*[ {} ]* - {}\n", index + 1, queue.name));
            }
        }

        let greeting = connection.greeting_message.unwrap_or_default();
        let text = format!("{greeting}\n\n{options}");
        self.send_and_record(session, ticket, text.trim()).await?;

        self.update_ticket(
            ticket.id,
            TicketUpdate {
                chatbot: Some(true),
                dont_run_chatbot: true,
                ..Default::default()
            },
        )
        .await?;
        Ok(())
    }

    /// Assign the ticket to a queue and start its menu.
    ///
    /// Boxed because queue forwarding recurses back into this entry point;
    /// `depth` bounds that same-turn recursion.
    pub fn enter_queue(
        &self,
        session: Arc<SessionHandle>,
        ticket_id: i64,
        queue: Queue,
        send_back: bool,
        depth: u32,
    ) -> BoxFuture<'_, Result<(), AtendoError>> {
        Box::pin(async move {
            let roots = queues::root_options(&self.db, queue.id).await?;

            self.update_ticket(
                ticket_id,
                TicketUpdate {
                    queue_id: Some(Some(queue.id)),
                    chatbot: Some(!roots.is_empty()),
                    status: Some(TicketStatus::Pending),
                    dont_run_chatbot: true,
                    ..Default::default()
                },
            )
            .await?;
            let ticket = tickets::get_ticket(&self.db, ticket_id)
                .await?
                .ok_or_else(|| AtendoError::app("ERR_TICKET_NOT_FOUND", 404))?;

            // Queue-scoped schedule enforcement gates the menu entirely.
            if self
                .settings
                .get(ticket.tenant_id, "scheduleType", "disabled")
                .await
                == "queue"
                && self
                    .schedules
                    .in_activity(ticket.tenant_id, Some(queue.id))
                    .await
                    == Some(false)
            {
                self.out_of_hours.set(ticket.id, true);
                let notice = queue
                    .out_of_hours_message
                    .clone()
                    .filter(|s| !s.trim().is_empty())
                    .unwrap_or_else(|| "We are out of office hours right now".to_string());
                self.send_and_record(&session, &ticket, &notice).await?;

                let fallback = self.out_of_hours_action(ticket.tenant_id).await;
                self.update_ticket(
                    ticket.id,
                    TicketUpdate {
                        chatbot: Some(false),
                        status: Some(fallback),
                        dont_run_chatbot: true,
                        ..Default::default()
                    },
                )
                .await?;
                return Ok(());
            }

            if roots.is_empty() {
                if let Some(greeting) = queue
                    .greeting_message
                    .as_deref()
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                {
                    self.send_and_record(&session, &ticket, greeting).await?;
                }
                return Ok(());
            }

            if roots.len() == 1 {
                // A single child makes the prompt redundant: auto-advance.
                let only = roots.into_iter().next().expect("non-empty");
                return self.advance_option(&session, &ticket, only, depth).await;
            }

            let heading = queue.greeting_message.clone().unwrap_or_default();
            self.send_menu(&session, &ticket, &heading, &roots, send_back)
                .await
        })
    }

    /// Select a menu node and act on it: exit, forward, or show the
    /// submenu.
    async fn advance_option(
        &self,
        session: &Arc<SessionHandle>,
        ticket: &Ticket,
        option: QueueOption,
        depth: u32,
    ) -> Result<(), AtendoError> {
        debug!(ticket_id = ticket.id, option_id = option.id, "advancing menu option");
        self.update_ticket(
            ticket.id,
            TicketUpdate {
                queue_option_id: Some(Some(option.id)),
                dont_run_chatbot: true,
                ..Default::default()
            },
        )
        .await?;

        let message = option
            .message
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string);

        if option.exit_chatbot {
            if let Some(message) = &message {
                self.send_and_record(session, ticket, message).await?;
            }
            self.update_ticket(
                ticket.id,
                TicketUpdate {
                    chatbot: Some(false),
                    queue_option_id: Some(None),
                    dont_run_chatbot: true,
                    ..Default::default()
                },
            )
            .await?;
            return Ok(());
        }

        if let Some(forward_id) = option.forward_queue_id {
            if let Some(message) = &message {
                self.send_and_record(session, ticket, message).await?;
            }
            if depth >= self.config.chatbot.max_forward_depth {
                warn!(
                    ticket_id = ticket.id,
                    forward_id, "queue forward depth exceeded, stopping walk"
                );
                return Ok(());
            }
            self.update_ticket(
                ticket.id,
                TicketUpdate {
                    queue_option_id: Some(None),
                    chatbot: Some(false),
                    dont_run_chatbot: true,
                    ..Default::default()
                },
            )
            .await?;
            let Some(target) = queues::get_queue(&self.db, forward_id).await? else {
                warn!(forward_id, "forward target queue missing");
                return Ok(());
            };
            return self
                .enter_queue(Arc::clone(session), ticket.id, target, true, depth + 1)
                .await;
        }

        let children = queues::child_options(&self.db, option.id).await?;
        let heading = message.unwrap_or_default();
        self.send_menu(session, ticket, &heading, &children, true).await
    }

    /// One inbound reply while the chatbot menu is active.
    pub async fn handle_chatbot(
        &self,
        session: &Arc<SessionHandle>,
        ticket: &Ticket,
        reply: &str,
    ) -> Result<(), AtendoError> {
        let Some(queue_id) = ticket.queue_id else {
            return Ok(());
        };
        let Some(queue) = queues::get_queue(&self.db, queue_id).await? else {
            return Ok(());
        };
        let reply = reply.trim();

        // `#` always returns to root-level queue selection.
        if reply == "#" {
            self.update_ticket(
                ticket.id,
                TicketUpdate {
                    queue_id: Some(None),
                    chatbot: Some(false),
                    queue_option_id: Some(None),
                    dont_run_chatbot: true,
                    ..Default::default()
                },
            )
            .await?;
            let refreshed = tickets::get_ticket(&self.db, ticket.id)
                .await?
                .ok_or_else(|| AtendoError::app("ERR_TICKET_NOT_FOUND", 404))?;
            return self.verify_queue(session, None, &refreshed).await;
        }

        if let Some(current_id) = ticket.queue_option_id {
            let children = queues::child_options(&self.db, current_id).await?;
            let selected = if children.len() == 1 {
                // Exactly one child: advance without requiring a match.
                children.into_iter().next()
            } else {
                children.into_iter().find(|o| o.option == reply)
            };

            if let Some(option) = selected {
                return self.advance_option(session, ticket, option, 0).await;
            }

            // No match: re-present the current node.
            let Some(current) = queues::get_option(&self.db, current_id).await? else {
                return Ok(());
            };
            let children = queues::child_options(&self.db, current_id).await?;
            let heading = current.message.unwrap_or_default();
            return self.send_menu(session, ticket, &heading, &children, true).await;
        }

        // Root level, no option selected yet.
        let roots = queues::root_options(&self.db, queue.id).await?;
        if roots.len() == 1 {
            let only = roots.into_iter().next().expect("non-empty");
            return self.advance_option(session, ticket, only, 0).await;
        }

        if let Some(option) = roots.iter().find(|o| o.option == reply).cloned() {
            return self.advance_option(session, ticket, option, 0).await;
        }

        if self
            .settings
            .get(ticket.tenant_id, "chatbotAutoExit", "disabled")
            .await
            == "enabled"
        {
            self.update_ticket(
                ticket.id,
                TicketUpdate {
                    chatbot: Some(false),
                    dont_run_chatbot: true,
                    ..Default::default()
                },
            )
            .await?;
            let connection = connections::get_connection(&self.db, ticket.connection_id)
                .await?
                .ok_or_else(|| AtendoError::app("ERR_NO_WAPP_FOUND", 404))?;
            if let Some(transfer) = connection
                .transfer_message
                .as_deref()
                .map(str::trim)
                .filter(|s| !s.is_empty())
            {
                self.send_and_record(session, ticket, transfer).await?;
            }
            return Ok(());
        }

        let heading = queue.greeting_message.clone().unwrap_or_default();
        self.send_menu(session, ticket, &heading, &roots, true).await
    }

    /// Send a menu: heading, labelled options, and the back-to-main line.
    async fn send_menu(
        &self,
        session: &Arc<SessionHandle>,
        ticket: &Ticket,
        heading: &str,
        options: &[QueueOption],
        send_back_to_main: bool,
    ) -> Result<(), AtendoError> {
        let show_icons = self.show_numeric_icons(ticket.tenant_id, options.len()).await;

        let mut lines = String::new();
        for option in options {
            if show_icons {
                let label = option
                    .option
                    .parse::<usize>()
                    .map(emoji_number)
                    .unwrap_or_else(|_| format!("[ {} ]", option.option));
                lines.push_str(&format!("{label} - {}\n", option.title));
            } else {
                lines.push_str(&format!("*[ {} ]* - {}\n", option.option, option.title));
            }
        }
        if send_back_to_main {
            let back = if show_icons { "#\u{FE0F}\u{20E3}" } else { "[ # ]" };
            lines.push_str(&format!("\n{back} - Back to Main Menu"));
        }

        let text = if heading.trim().is_empty() {
            lines
        } else {
            format!("{}\n\n{lines}", heading.trim())
        };
        self.send_and_record(session, ticket, text.trim()).await?;
        Ok(())
    }

    async fn show_numeric_icons(&self, tenant_id: i64, count: usize) -> bool {
        count <= 10
            && self
                .settings
                .get(tenant_id, "showNumericIcons", "disabled")
                .await
                == "enabled"
    }

    /// The configured fallback status applied outside activity windows.
    pub(crate) async fn out_of_hours_action(&self, tenant_id: i64) -> TicketStatus {
        self.settings
            .get(tenant_id, "outOfHoursAction", "pending")
            .await
            .parse()
            .unwrap_or(TicketStatus::Pending)
    }
}
