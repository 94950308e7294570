// SPDX-FileCopyrightText: 2026 Atendo Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Integration tests for the message normalization pipeline.

mod common;

use atendo_core::types::{AckUpdate, MessageContent, StubType, TicketStatus, WireKey};
use atendo_core::AtendoError;
use atendo_session::InboundHandler;
use atendo_storage::queries::{campaigns, messages, tickets};
use common::*;

#[tokio::test]
async fn inbound_text_creates_ticket_and_message() {
    let f = fixture().await;

    f.listener
        .messages_upsert(f.session.clone(), vec![inbound_text("M1", "hello there")])
        .await;

    let ticket = tickets::find_open_for_contact(&f.harness.db, f.harness.contact.id, 10)
        .await
        .unwrap()
        .expect("ticket created");
    assert_eq!(ticket.status, TicketStatus::Pending);
    assert_eq!(ticket.last_message, "hello there");
    assert_eq!(ticket.unread_messages, 1);

    let stored = messages::get_message(&f.harness.db, "M1", ticket.id)
        .await
        .unwrap()
        .expect("message stored");
    assert_eq!(stored.body, "hello there");
    assert!(!stored.from_me);
    assert_eq!(stored.contact_id, Some(f.harness.contact.id));
    assert!(stored.data_json.is_some());

    // receipts go out for every accepted upsert
    assert_eq!(f.transport.receipts_sent().len(), 1);
}

#[tokio::test]
async fn replaying_the_same_message_does_not_duplicate() {
    let f = fixture().await;
    let msg = inbound_text("M1", "hello");

    f.listener
        .messages_upsert(f.session.clone(), vec![msg.clone()])
        .await;
    f.listener.messages_upsert(f.session.clone(), vec![msg]).await;

    let ticket = tickets::find_open_for_contact(&f.harness.db, f.harness.contact.id, 10)
        .await
        .unwrap()
        .unwrap();
    let rows = messages::get_messages_for_ticket(&f.harness.db, ticket.id, None)
        .await
        .unwrap();
    assert_eq!(rows.len(), 1);
}

#[tokio::test]
async fn edits_archive_the_prior_body() {
    let f = fixture().await;
    f.listener
        .messages_upsert(f.session.clone(), vec![inbound_text("M1", "first")])
        .await;

    let mut edit = inbound_text("E1", "");
    edit.content = Some(MessageContent::Edited {
        key: WireKey {
            id: "M1".into(),
            remote_jid: "5511999990000@s.whatsapp.net".into(),
            from_me: false,
            participant: None,
        },
        content: Box::new(MessageContent::Conversation {
            text: "second".into(),
        }),
    });
    f.listener.messages_upsert(f.session.clone(), vec![edit]).await;

    let ticket = tickets::find_open_for_contact(&f.harness.db, f.harness.contact.id, 10)
        .await
        .unwrap()
        .unwrap();
    let stored = messages::get_message(&f.harness.db, "M1", ticket.id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored.body, "second");
    assert!(stored.is_edited);

    let old = messages::get_old_messages(&f.harness.db, "M1", ticket.id)
        .await
        .unwrap();
    assert_eq!(old.len(), 1);
    assert_eq!(old[0].body, "first");
    assert_eq!(ticket.last_message, "second");
}

#[tokio::test]
async fn deletes_are_soft() {
    let f = fixture().await;
    f.listener
        .messages_upsert(f.session.clone(), vec![inbound_text("M1", "delete me")])
        .await;

    let mut delete = inbound_text("D1", "");
    delete.content = Some(MessageContent::Deleted {
        key: WireKey {
            id: "M1".into(),
            remote_jid: "5511999990000@s.whatsapp.net".into(),
            from_me: false,
            participant: None,
        },
    });
    f.listener.messages_upsert(f.session.clone(), vec![delete]).await;

    let ticket = tickets::find_open_for_contact(&f.harness.db, f.harness.contact.id, 10)
        .await
        .unwrap()
        .unwrap();
    let stored = messages::get_message(&f.harness.db, "M1", ticket.id)
        .await
        .unwrap()
        .unwrap();
    assert!(stored.is_deleted);
    assert_eq!(stored.body, "delete me");
}

#[tokio::test]
async fn acks_are_monotonic_under_out_of_order_delivery() {
    let f = fixture().await;
    f.listener
        .messages_upsert(f.session.clone(), vec![inbound_text("M1", "hi")])
        .await;

    let key = WireKey {
        id: "M1".into(),
        remote_jid: "5511999990000@s.whatsapp.net".into(),
        from_me: false,
        participant: None,
    };

    // ack=2 then ack=1: the stored value is the maximum
    f.listener
        .messages_update(
            f.session.clone(),
            vec![
                AckUpdate { key: key.clone(), ack: 2 },
                AckUpdate { key: key.clone(), ack: 1 },
            ],
        )
        .await;

    let ticket = tickets::find_open_for_contact(&f.harness.db, f.harness.contact.id, 10)
        .await
        .unwrap()
        .unwrap();
    let stored = messages::get_message(&f.harness.db, "M1", ticket.id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored.ack, 2);

    // duplicate reports publish nothing new
    f.notifier.clear();
    f.listener
        .messages_update(f.session.clone(), vec![AckUpdate { key, ack: 2 }])
        .await;
    assert!(f.notifier.events_named("message").is_empty());
}

#[tokio::test]
async fn oversized_media_is_rejected_with_one_notice() {
    let f = fixture().await;
    // 16 MiB against the default 15 MiB ceiling
    let msg = inbound_image("BIG1", None, Some(16 * 1024 * 1024));

    // seed the ticket so the notice has somewhere to go
    f.listener
        .messages_upsert(f.session.clone(), vec![inbound_text("M0", "hi")])
        .await;
    let before = f.transport.sent_count();

    let err = f
        .listener
        .handle_message(&f.session, &msg)
        .await
        .expect_err("oversized media must fail");
    assert_eq!(err.code(), "ERR_FILESIZE_OVER_LIMIT");

    // exactly one notice went to the contact
    assert_eq!(f.transport.sent_count(), before + 1);
    let notice = &f.transport.sent_messages()[before];
    assert!(notice.text.contains("15 MiB"));

    // and no message row with a media url exists
    let ticket = tickets::find_open_for_contact(&f.harness.db, f.harness.contact.id, 10)
        .await
        .unwrap()
        .unwrap();
    assert!(messages::get_message(&f.harness.db, "BIG1", ticket.id)
        .await
        .unwrap()
        .is_none());
    let rows = messages::get_messages_for_ticket(&f.harness.db, ticket.id, None)
        .await
        .unwrap();
    assert!(rows.iter().all(|m| m.media_url.is_none()));
}

#[tokio::test]
async fn tenant_download_limit_overrides_the_default() {
    let f = fixture().await;
    f.settings.set(1, "downloadLimit", "1");
    f.listener
        .messages_upsert(f.session.clone(), vec![inbound_text("M0", "hi")])
        .await;

    let msg = inbound_image("BIG2", None, Some(2 * 1024 * 1024));
    let err = f
        .listener
        .handle_message(&f.session, &msg)
        .await
        .expect_err("2 MiB against tenant limit of 1 MiB");
    assert!(matches!(err, AtendoError::MediaOverLimit { .. }));
}

#[tokio::test]
async fn media_download_stores_file_and_url() {
    let f = fixture().await;
    f.transport.set_media_chunks(vec![vec![10, 20], vec![30]]);

    f.listener
        .messages_upsert(
            f.session.clone(),
            vec![inbound_image("IMG1", Some("a photo"), Some(3))],
        )
        .await;

    let ticket = tickets::find_open_for_contact(&f.harness.db, f.harness.contact.id, 10)
        .await
        .unwrap()
        .unwrap();
    let stored = messages::get_message(&f.harness.db, "IMG1", ticket.id)
        .await
        .unwrap()
        .expect("media message stored");
    assert_eq!(stored.media_type.as_deref(), Some("image"));
    assert_eq!(stored.body, "a photo");

    let media_url = stored.media_url.expect("media url");
    let on_disk = f.media_dir.path().join(&media_url);
    assert_eq!(std::fs::read(on_disk).unwrap(), vec![10, 20, 30]);
}

#[tokio::test]
async fn enabled_transcription_replaces_the_audio_body() {
    let f = fixture_with_transcript(Some("hello from audio")).await;
    f.settings.set(1, "audioTranscriptions", "enabled");
    f.settings.set(1, "aiApiKey", "sk-test");

    f.listener
        .messages_upsert(f.session.clone(), vec![inbound_audio("AUD1")])
        .await;

    let ticket = tickets::find_open_for_contact(&f.harness.db, f.harness.contact.id, 10)
        .await
        .unwrap()
        .unwrap();
    let stored = messages::get_message(&f.harness.db, "AUD1", ticket.id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored.body, "hello from audio");
    assert_eq!(f.transcriber.calls(), 1);
}

#[tokio::test]
async fn failed_transcription_keeps_the_placeholder() {
    let f = fixture_with_transcript(None).await;
    f.settings.set(1, "audioTranscriptions", "enabled");
    f.settings.set(1, "aiApiKey", "sk-test");

    f.listener
        .messages_upsert(f.session.clone(), vec![inbound_audio("AUD2")])
        .await;

    let ticket = tickets::find_open_for_contact(&f.harness.db, f.harness.contact.id, 10)
        .await
        .unwrap()
        .unwrap();
    let stored = messages::get_message(&f.harness.db, "AUD2", ticket.id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored.body, "\u{1F50A}");
}

#[tokio::test]
async fn disabled_transcription_never_calls_the_collaborator() {
    let f = fixture_with_transcript(Some("ignored")).await;

    f.listener
        .messages_upsert(f.session.clone(), vec![inbound_audio("AUD3")])
        .await;
    assert_eq!(f.transcriber.calls(), 0);
}

#[tokio::test]
async fn quoted_message_links_to_existing_row() {
    let f = fixture().await;
    f.listener
        .messages_upsert(f.session.clone(), vec![inbound_text("M1", "original")])
        .await;

    let reply = with_quote(inbound_text("M2", "replying"), "M1", None);
    f.listener.messages_upsert(f.session.clone(), vec![reply]).await;

    let ticket = tickets::find_open_for_contact(&f.harness.db, f.harness.contact.id, 10)
        .await
        .unwrap()
        .unwrap();
    let stored = messages::get_message(&f.harness.db, "M2", ticket.id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored.quoted_msg_id.as_deref(), Some("M1"));
}

#[tokio::test]
async fn missing_quoted_message_is_materialized() {
    let f = fixture().await;

    let reply = with_quote(
        inbound_text("M2", "replying to history"),
        "GONE1",
        Some(MessageContent::Conversation {
            text: "the old words".into(),
        }),
    );
    f.listener.messages_upsert(f.session.clone(), vec![reply]).await;

    let ticket = tickets::find_open_for_contact(&f.harness.db, f.harness.contact.id, 10)
        .await
        .unwrap()
        .unwrap();
    let scoped = format!("GONE1-{}", ticket.id);
    let stand_in = messages::get_message(&f.harness.db, &scoped, ticket.id)
        .await
        .unwrap()
        .expect("stand-in materialized");
    assert_eq!(stand_in.body, "the old words");
    assert!(stand_in.read);

    let stored = messages::get_message(&f.harness.db, "M2", ticket.id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored.quoted_msg_id, Some(scoped));
}

#[tokio::test]
async fn inbound_on_closed_ticket_reopens_as_pending() {
    let f = fixture().await;
    f.listener
        .messages_upsert(f.session.clone(), vec![inbound_text("M1", "hi")])
        .await;

    let mut ticket = tickets::find_open_for_contact(&f.harness.db, f.harness.contact.id, 10)
        .await
        .unwrap()
        .unwrap();
    ticket.status = TicketStatus::Closed;
    tickets::update_ticket(&f.harness.db, &ticket).await.unwrap();

    f.listener
        .messages_upsert(f.session.clone(), vec![inbound_text("M2", "anyone there?")])
        .await;

    let refreshed = tickets::get_ticket(&f.harness.db, ticket.id).await.unwrap().unwrap();
    assert_eq!(refreshed.status, TicketStatus::Pending);
}

#[tokio::test]
async fn filtered_events_produce_no_rows() {
    let f = fixture().await;

    let mut broadcast = inbound_text("B1", "status");
    broadcast.key.remote_jid = "status@broadcast".into();

    let mut stub = inbound_text("S1", "x");
    stub.stub = Some(StubType::Ciphertext);

    let mut unknown = inbound_text("U1", "");
    unknown.content = Some(MessageContent::Unrecognized {
        type_name: "pollCreationMessageV4".into(),
    });

    f.listener
        .messages_upsert(f.session.clone(), vec![broadcast, stub, unknown])
        .await;

    assert!(
        tickets::find_open_for_contact(&f.harness.db, f.harness.contact.id, 10)
            .await
            .unwrap()
            .is_none()
    );
}

#[tokio::test]
async fn campaign_confirmation_intercepts_and_enqueues_dispatch() {
    let f = fixture().await;
    campaigns::insert_shipping(&f.harness.db, 77, 1, "5511999990000")
        .await
        .unwrap();

    f.listener
        .messages_upsert(f.session.clone(), vec![inbound_text("M1", "confirm")])
        .await;

    // the reply settles the confirmation instead of opening a ticket
    assert!(
        tickets::find_open_for_contact(&f.harness.db, f.harness.contact.id, 10)
            .await
            .unwrap()
            .is_none()
    );
    let jobs = f.jobs.jobs();
    assert_eq!(jobs.len(), 1);
    assert_eq!(jobs[0].job_type, "DispatchConfirmedCampaign");
    assert_eq!(jobs[0].payload["campaignId"], 77);

    // settled rows do not intercept again
    f.listener
        .messages_upsert(f.session.clone(), vec![inbound_text("M2", "hello")])
        .await;
    assert!(
        tickets::find_open_for_contact(&f.harness.db, f.harness.contact.id, 10)
            .await
            .unwrap()
            .is_some()
    );
}

#[tokio::test]
async fn own_marked_sends_are_skipped() {
    let f = fixture().await;
    let mut echo = inbound_text("E1", "\u{200E}Automated notice");
    echo.key.from_me = true;

    f.listener.messages_upsert(f.session.clone(), vec![echo]).await;

    assert!(
        tickets::find_open_for_contact(&f.harness.db, f.harness.contact.id, 10)
            .await
            .unwrap()
            .is_none()
    );
}
