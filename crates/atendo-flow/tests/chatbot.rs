// SPDX-FileCopyrightText: 2026 Atendo Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Integration tests for the chatbot/queue state machine, the rating flow,
//! the out-of-hours gate, and the ticket service rules.

mod common;

use std::time::Duration;

use atendo_core::types::TicketStatus;
use atendo_flow::TicketUpdate;
use atendo_session::InboundHandler;
use atendo_storage::queries::{queues, ratings, tickets, trackings};
use common::*;

#[tokio::test]
async fn single_queue_is_auto_assigned_with_greeting() {
    let f = fixture().await;
    f.harness
        .queue("Support", Some("Welcome to Support"), 0)
        .await;

    f.listener
        .messages_upsert(f.session.clone(), vec![inbound_text("M1", "hi")])
        .await;

    let ticket = tickets::find_open_for_contact(&f.harness.db, f.harness.contact.id, 10)
        .await
        .unwrap()
        .unwrap();
    assert!(ticket.queue_id.is_some());
    assert!(!ticket.chatbot, "queue without options needs no menu");

    let sent = f.transport.sent_messages();
    assert!(sent.iter().any(|m| m.text.contains("Welcome to Support")));
}

#[tokio::test]
async fn multiple_queues_present_a_menu_and_accept_numeric_replies() {
    let f = fixture().await;
    f.harness.queue("Billing", None, 0).await;
    let tech = f.harness.queue("Tech", Some("Tech here"), 1).await;

    f.listener
        .messages_upsert(f.session.clone(), vec![inbound_text("M1", "hi")])
        .await;

    let ticket = tickets::find_open_for_contact(&f.harness.db, f.harness.contact.id, 10)
        .await
        .unwrap()
        .unwrap();
    assert!(ticket.queue_id.is_none());
    assert!(ticket.chatbot);

    let sent = f.transport.sent_messages();
    let menu = &sent.last().unwrap().text;
    assert!(menu.contains("*[ 1 ]* - Billing"));
    assert!(menu.contains("*[ 2 ]* - Tech"));

    // a 1-based numeric reply selects the queue
    f.listener
        .messages_upsert(f.session.clone(), vec![inbound_text("M2", "2")])
        .await;

    let ticket = tickets::get_ticket(&f.harness.db, ticket.id).await.unwrap().unwrap();
    assert_eq!(ticket.queue_id, Some(tech.id));
}

#[tokio::test]
async fn out_of_range_reply_resends_the_menu() {
    let f = fixture().await;
    f.harness.queue("Billing", None, 0).await;
    f.harness.queue("Tech", None, 1).await;

    f.listener
        .messages_upsert(f.session.clone(), vec![inbound_text("M1", "hi")])
        .await;
    let menus_before = f
        .transport
        .sent_messages()
        .iter()
        .filter(|m| m.text.contains("*[ 1 ]*"))
        .count();

    f.listener
        .messages_upsert(f.session.clone(), vec![inbound_text("M2", "9")])
        .await;

    let ticket = tickets::find_open_for_contact(&f.harness.db, f.harness.contact.id, 10)
        .await
        .unwrap()
        .unwrap();
    assert!(ticket.queue_id.is_none(), "invalid selection is ignored");
    let menus_after = f
        .transport
        .sent_messages()
        .iter()
        .filter(|m| m.text.contains("*[ 1 ]*"))
        .count();
    assert_eq!(menus_after, menus_before + 1);
}

#[tokio::test]
async fn single_root_option_auto_advances_without_a_reply() {
    let f = fixture().await;
    let queue = f.harness.queue("Support", Some("Pick one"), 0).await;
    let root = f.harness.option(queue.id, None, "1", "Only choice").await;
    f.harness.option(queue.id, Some(root.id), "1", "Child A").await;
    f.harness.option(queue.id, Some(root.id), "2", "Child B").await;

    f.listener
        .messages_upsert(f.session.clone(), vec![inbound_text("M1", "hi")])
        .await;

    let ticket = tickets::find_open_for_contact(&f.harness.db, f.harness.contact.id, 10)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(ticket.queue_id, Some(queue.id));
    assert_eq!(
        ticket.queue_option_id,
        Some(root.id),
        "menu auto-advances into the only root option"
    );

    // the submenu of the auto-selected node was presented
    let sent = f.transport.sent_messages();
    let menu = &sent.last().unwrap().text;
    assert!(menu.contains("Child A"));
    assert!(menu.contains("Child B"));

    // a reply now selects among the node's children
    f.listener
        .messages_upsert(f.session.clone(), vec![inbound_text("M2", "2")])
        .await;
    let ticket = tickets::get_ticket(&f.harness.db, ticket.id).await.unwrap().unwrap();
    let selected = queues::get_option(&f.harness.db, ticket.queue_option_id.unwrap())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(selected.title, "Child B");
}

#[tokio::test]
async fn exit_chatbot_leaf_disables_routing() {
    let f = fixture().await;
    let queue = f.harness.queue("Support", Some("Pick"), 0).await;
    queues::insert_option(
        &f.harness.db,
        queue.id,
        None,
        "1",
        "Talk to a human",
        Some("An agent will be with you shortly"),
        None,
        true,
    )
    .await
    .unwrap();

    f.listener
        .messages_upsert(f.session.clone(), vec![inbound_text("M1", "hi")])
        .await;

    let ticket = tickets::find_open_for_contact(&f.harness.db, f.harness.contact.id, 10)
        .await
        .unwrap()
        .unwrap();
    assert!(!ticket.chatbot);
    assert!(ticket.queue_option_id.is_none());
    assert!(f
        .transport
        .sent_messages()
        .iter()
        .any(|m| m.text.contains("agent will be with you")));
}

#[tokio::test]
async fn forward_leaf_moves_the_ticket_to_the_target_queue() {
    let f = fixture().await;
    let front = f.harness.queue("Front", Some("Pick"), 0).await;
    let back = queues::insert_queue(&f.harness.db, 1, "Backoffice", Some("Backoffice here"), None)
        .await
        .unwrap();
    queues::insert_option(
        &f.harness.db,
        front.id,
        None,
        "1",
        "Paperwork",
        Some("Forwarding you"),
        Some(back.id),
        false,
    )
    .await
    .unwrap();

    f.listener
        .messages_upsert(f.session.clone(), vec![inbound_text("M1", "hi")])
        .await;

    let ticket = tickets::find_open_for_contact(&f.harness.db, f.harness.contact.id, 10)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(ticket.queue_id, Some(back.id));
    let sent = f.transport.sent_messages();
    assert!(sent.iter().any(|m| m.text.contains("Forwarding you")));
    assert!(sent.iter().any(|m| m.text.contains("Backoffice here")));
}

#[tokio::test]
async fn cyclic_forwards_are_cut_off_by_the_depth_guard() {
    let f = fixture().await;
    let a = f.harness.queue("A", None, 0).await;
    let b = queues::insert_queue(&f.harness.db, 1, "B", None, None).await.unwrap();
    queues::insert_option(&f.harness.db, a.id, None, "1", "to B", None, Some(b.id), false)
        .await
        .unwrap();
    queues::insert_option(&f.harness.db, b.id, None, "1", "to A", None, Some(a.id), false)
        .await
        .unwrap();

    // must terminate despite the A -> B -> A cycle
    f.listener
        .messages_upsert(f.session.clone(), vec![inbound_text("M1", "hi")])
        .await;

    let ticket = tickets::find_open_for_contact(&f.harness.db, f.harness.contact.id, 10)
        .await
        .unwrap()
        .unwrap();
    assert!(ticket.queue_id.is_some(), "walk stops in the last reached queue");
}

#[tokio::test]
async fn hash_returns_to_root_queue_selection() {
    let f = fixture().await;
    f.harness.queue("Billing", None, 0).await;
    let tech = f.harness.queue("Tech", None, 1).await;

    f.listener
        .messages_upsert(f.session.clone(), vec![inbound_text("M1", "hi")])
        .await;
    f.listener
        .messages_upsert(f.session.clone(), vec![inbound_text("M2", "2")])
        .await;

    let ticket = tickets::find_open_for_contact(&f.harness.db, f.harness.contact.id, 10)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(ticket.queue_id, Some(tech.id));

    f.listener
        .messages_upsert(f.session.clone(), vec![inbound_text("M3", "#")])
        .await;

    let ticket = tickets::get_ticket(&f.harness.db, ticket.id).await.unwrap().unwrap();
    assert!(ticket.queue_id.is_none());
    assert!(ticket.queue_option_id.is_none());
    // and the root menu is on its way again
    let sent = f.transport.sent_messages();
    let menu = &sent.last().unwrap().text;
    assert!(menu.contains("Billing"));
    assert!(menu.contains("Tech"));
}

async fn close_awaiting_rating(f: &FlowFixture) -> (i64, i64) {
    f.settings.set(1, "userRating", "enabled");
    let agent = f.harness.user("Carol", "admin").await;

    f.listener
        .messages_upsert(f.session.clone(), vec![inbound_text("M1", "hi")])
        .await;
    let ticket = tickets::find_open_for_contact(&f.harness.db, f.harness.contact.id, 10)
        .await
        .unwrap()
        .unwrap();

    f.pipeline
        .update_ticket(
            ticket.id,
            TicketUpdate {
                status: Some(TicketStatus::Open),
                user_id: Some(Some(agent.id)),
                dont_run_chatbot: true,
                ..Default::default()
            },
        )
        .await
        .unwrap();
    f.pipeline
        .update_ticket(
            ticket.id,
            TicketUpdate {
                status: Some(TicketStatus::Closed),
                ..Default::default()
            },
        )
        .await
        .unwrap();

    let refreshed = tickets::get_ticket(&f.harness.db, ticket.id).await.unwrap().unwrap();
    assert_eq!(refreshed.status, TicketStatus::Closed);
    (ticket.id, agent.id)
}

#[tokio::test]
async fn closing_with_ratings_enabled_prompts_and_waits() {
    let f = fixture().await;
    let (ticket_id, _agent) = close_awaiting_rating(&f).await;

    assert!(f
        .transport
        .sent_messages()
        .iter()
        .any(|m| m.text.contains("rating from 1 to 5")));

    let tracking = trackings::find_awaiting_rating(&f.harness.db, 10, f.harness.contact.id)
        .await
        .unwrap()
        .expect("episode awaits rating");
    assert_eq!(tracking.ticket_id, ticket_id);
    assert!(!tracking.rated);
}

#[tokio::test]
async fn ratings_clamp_to_bounds() {
    for (reply, expected) in [("0", 1), ("6", 5), ("3", 3)] {
        let f = fixture().await;
        let (ticket_id, _) = close_awaiting_rating(&f).await;

        f.listener
            .messages_upsert(f.session.clone(), vec![inbound_text("R1", reply)])
            .await;

        let rates = ratings::rates_for_ticket(&f.harness.db, ticket_id).await.unwrap();
        assert_eq!(rates, vec![expected], "reply {reply} stores {expected}");

        // the episode is settled
        assert!(trackings::find_awaiting_rating(&f.harness.db, 10, f.harness.contact.id)
            .await
            .unwrap()
            .is_none());
    }
}

#[tokio::test]
async fn bang_reopens_the_ticket_and_cancels_rating() {
    let f = fixture().await;
    let (ticket_id, agent_id) = close_awaiting_rating(&f).await;

    f.listener
        .messages_upsert(f.session.clone(), vec![inbound_text("R1", "!")])
        .await;

    let ticket = tickets::get_ticket(&f.harness.db, ticket_id).await.unwrap().unwrap();
    assert_eq!(ticket.status, TicketStatus::Open);
    assert_eq!(ticket.user_id, Some(agent_id));
    assert!(ratings::rates_for_ticket(&f.harness.db, ticket_id)
        .await
        .unwrap()
        .is_empty());
}

#[tokio::test]
async fn other_replies_expire_the_rating_window() {
    let f = fixture().await;
    let (ticket_id, _) = close_awaiting_rating(&f).await;

    f.listener
        .messages_upsert(f.session.clone(), vec![inbound_text("R1", "thanks")])
        .await;

    assert!(trackings::find_awaiting_rating(&f.harness.db, 10, f.harness.contact.id)
        .await
        .unwrap()
        .is_none());
    assert!(ratings::rates_for_ticket(&f.harness.db, ticket_id)
        .await
        .unwrap()
        .is_empty());
}

#[tokio::test]
async fn out_of_hours_notice_is_sent_once_and_status_falls_back() {
    let f = fixture().await;
    f.settings.set(1, "scheduleType", "company");
    f.schedules.set(Some(false));

    f.listener
        .messages_upsert(f.session.clone(), vec![inbound_text("M1", "hi")])
        .await;

    let ticket = tickets::find_open_for_contact(&f.harness.db, f.harness.contact.id, 10)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(ticket.status, TicketStatus::Pending);
    let notices = f
        .transport
        .sent_messages()
        .iter()
        .filter(|m| m.text.contains("out of office hours"))
        .count();
    assert_eq!(notices, 1);

    // a second message within the suppression window sends no second notice
    f.listener
        .messages_upsert(f.session.clone(), vec![inbound_text("M2", "hello?")])
        .await;
    let notices = f
        .transport
        .sent_messages()
        .iter()
        .filter(|m| m.text.contains("out of office hours"))
        .count();
    assert_eq!(notices, 1);
}

#[tokio::test]
async fn inside_activity_window_no_notice_is_sent() {
    let f = fixture().await;
    f.settings.set(1, "scheduleType", "company");
    f.schedules.set(Some(true));

    f.listener
        .messages_upsert(f.session.clone(), vec![inbound_text("M1", "hi")])
        .await;

    assert!(!f
        .transport
        .sent_messages()
        .iter()
        .any(|m| m.text.contains("out of office hours")));
}

#[tokio::test]
async fn only_admins_accept_queueless_pending_tickets() {
    let f = fixture().await;
    let agent = f.harness.user("Dave", "user").await;
    let admin = f.harness.user("Erin", "admin").await;
    let ticket = f.harness.ticket().await;

    let err = f
        .pipeline
        .update_ticket(
            ticket.id,
            TicketUpdate {
                status: Some(TicketStatus::Open),
                user_id: Some(Some(agent.id)),
                dont_run_chatbot: true,
                ..Default::default()
            },
        )
        .await
        .expect_err("non-admin cannot accept");
    assert_eq!(err.code(), "ERR_NO_PERMISSION");
    assert_eq!(err.status(), 403);

    let updated = f
        .pipeline
        .update_ticket(
            ticket.id,
            TicketUpdate {
                status: Some(TicketStatus::Open),
                user_id: Some(Some(admin.id)),
                dont_run_chatbot: true,
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(updated.status, TicketStatus::Open);
    assert_eq!(updated.user_id, Some(admin.id));
}

#[tokio::test]
async fn closing_sends_the_completion_message() {
    let f = fixture().await;
    let admin = f.harness.user("Erin", "admin").await;

    f.listener
        .messages_upsert(f.session.clone(), vec![inbound_text("M1", "hi")])
        .await;
    let ticket = tickets::find_open_for_contact(&f.harness.db, f.harness.contact.id, 10)
        .await
        .unwrap()
        .unwrap();

    f.pipeline
        .update_ticket(
            ticket.id,
            TicketUpdate {
                status: Some(TicketStatus::Open),
                user_id: Some(Some(admin.id)),
                dont_run_chatbot: true,
                ..Default::default()
            },
        )
        .await
        .unwrap();
    f.pipeline
        .update_ticket(
            ticket.id,
            TicketUpdate {
                status: Some(TicketStatus::Closed),
                ..Default::default()
            },
        )
        .await
        .unwrap();

    assert!(f
        .transport
        .sent_messages()
        .iter()
        .any(|m| m.text.contains("Thanks for contacting us")));

    // ratings are disabled, so no episode is left waiting
    assert!(trackings::find_awaiting_rating(&f.harness.db, 10, f.harness.contact.id)
        .await
        .unwrap()
        .is_none());
}

#[tokio::test]
async fn just_close_skips_completion_and_rating() {
    let f = fixture().await;
    f.settings.set(1, "userRating", "enabled");
    let admin = f.harness.user("Erin", "admin").await;

    f.listener
        .messages_upsert(f.session.clone(), vec![inbound_text("M1", "hi")])
        .await;
    let ticket = tickets::find_open_for_contact(&f.harness.db, f.harness.contact.id, 10)
        .await
        .unwrap()
        .unwrap();

    f.pipeline
        .update_ticket(
            ticket.id,
            TicketUpdate {
                status: Some(TicketStatus::Open),
                user_id: Some(Some(admin.id)),
                dont_run_chatbot: true,
                ..Default::default()
            },
        )
        .await
        .unwrap();
    let before = f.transport.sent_count();

    f.pipeline
        .update_ticket(
            ticket.id,
            TicketUpdate {
                status: Some(TicketStatus::Closed),
                just_close: true,
                ..Default::default()
            },
        )
        .await
        .unwrap();

    assert_eq!(f.transport.sent_count(), before, "no outbound traffic on just_close");
    let refreshed = tickets::get_ticket(&f.harness.db, ticket.id).await.unwrap().unwrap();
    assert_eq!(refreshed.status, TicketStatus::Closed);
}

#[tokio::test]
async fn greeting_is_debounced_to_a_single_send() {
    let f = fixture().await;

    // rapid-fire first messages produce a single debounced greeting
    f.listener
        .messages_upsert(f.session.clone(), vec![inbound_text("M1", "hi")])
        .await;
    f.listener
        .messages_upsert(f.session.clone(), vec![inbound_text("M2", "hi again")])
        .await;

    tokio::time::sleep(Duration::from_millis(150)).await;

    let greetings = f
        .transport
        .sent_messages()
        .iter()
        .filter(|m| m.text.contains("Welcome to support"))
        .count();
    assert_eq!(greetings, 1);
}
