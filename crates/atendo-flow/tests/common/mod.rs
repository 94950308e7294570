// SPDX-FileCopyrightText: 2026 Atendo Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Shared fixture for flow integration tests: a seeded in-memory store, a
//! registered mock session, and the pipeline wired to mock collaborators.

#![allow(dead_code)] // each test binary uses a different slice of the fixture

use std::sync::Arc;
use std::time::Duration;

use atendo_config::model::AtendoConfig;
use atendo_core::types::{MediaRef, MessageContent, WireContext, WireKey, WireMessage};
use atendo_core::Transport;
use atendo_flow::{InboundListener, MessagePipeline};
use atendo_session::{GroupMetadataCache, SentMessageCache, SessionHandle, SessionRegistry};
use atendo_test_utils::{
    FixedSchedules, FixedTranscriber, MemorySettings, MockJobQueue, MockTransport,
    RecordingNotifier, TestHarness, CONNECTION_ID, TENANT_ID,
};

pub struct FlowFixture {
    pub harness: TestHarness,
    pub pipeline: Arc<MessagePipeline>,
    pub listener: InboundListener,
    pub session: Arc<SessionHandle>,
    pub transport: Arc<MockTransport>,
    pub notifier: Arc<RecordingNotifier>,
    pub settings: Arc<MemorySettings>,
    pub schedules: Arc<FixedSchedules>,
    pub transcriber: Arc<FixedTranscriber>,
    pub jobs: Arc<MockJobQueue>,
    pub registry: Arc<SessionRegistry>,
    // Holds the temp media dir alive for the fixture's lifetime.
    pub media_dir: tempfile::TempDir,
}

pub async fn fixture() -> FlowFixture {
    fixture_with_transcript(None).await
}

pub async fn fixture_with_transcript(transcript: Option<&str>) -> FlowFixture {
    let harness = TestHarness::new().await;
    let media_dir = tempfile::tempdir().unwrap();

    let mut config = AtendoConfig::default();
    config.storage.media_dir = media_dir.path().to_str().unwrap().to_string();
    // keep throttle sleeps negligible and retries fast in tests
    config.media.max_rate_bps = u64::MAX / 4;
    config.media.throttle_rate_bps = u64::MAX / 4;
    config.media.download_attempts = 2;
    config.chatbot.debounce_ms = 10;

    let registry = Arc::new(SessionRegistry::new());
    let transport = Arc::new(MockTransport::new());
    transport.set_identity("5511888887777@s.whatsapp.net", None);
    transport.set_media_chunks(vec![vec![1, 2, 3]]);

    let session = Arc::new(SessionHandle {
        connection_id: CONNECTION_ID,
        tenant_id: TENANT_ID,
        epoch: registry.next_epoch(),
        transport: Arc::clone(&transport) as Arc<dyn Transport>,
        message_cache: Arc::new(SentMessageCache::new(Duration::from_secs(120))),
        group_cache: Arc::new(GroupMetadataCache::new(Duration::from_secs(300))),
    });
    registry.insert(Arc::clone(&session));

    let notifier = Arc::new(RecordingNotifier::new());
    let settings = Arc::new(MemorySettings::new());
    let schedules = Arc::new(FixedSchedules::new(None));
    let transcriber = Arc::new(FixedTranscriber::new(transcript));
    let jobs = Arc::new(MockJobQueue::new());

    let pipeline = Arc::new(MessagePipeline::new(
        harness.db.clone(),
        config,
        Arc::clone(&registry),
        Arc::clone(&notifier) as Arc<_>,
        Arc::clone(&settings) as Arc<_>,
        Arc::clone(&schedules) as Arc<_>,
        Arc::clone(&transcriber) as Arc<_>,
        Arc::clone(&jobs) as Arc<_>,
    ));
    let listener = InboundListener::new(Arc::clone(&pipeline));

    FlowFixture {
        harness,
        pipeline,
        listener,
        session,
        transport,
        notifier,
        settings,
        schedules,
        transcriber,
        jobs,
        registry,
        media_dir,
    }
}

pub fn inbound_text(id: &str, text: &str) -> WireMessage {
    WireMessage {
        key: WireKey {
            id: id.to_string(),
            remote_jid: "5511999990000@s.whatsapp.net".into(),
            from_me: false,
            participant: None,
        },
        push_name: Some("Alice".into()),
        content: Some(MessageContent::Conversation {
            text: text.to_string(),
        }),
        ..Default::default()
    }
}

pub fn inbound_image(id: &str, caption: Option<&str>, file_length: Option<u64>) -> WireMessage {
    WireMessage {
        key: WireKey {
            id: id.to_string(),
            remote_jid: "5511999990000@s.whatsapp.net".into(),
            from_me: false,
            participant: None,
        },
        push_name: Some("Alice".into()),
        content: Some(MessageContent::Image {
            media: MediaRef {
                mimetype: "image/jpeg".into(),
                url: Some("https://example.invalid/media".into()),
                file_length,
                ..Default::default()
            },
            caption: caption.map(|s| s.to_string()),
        }),
        ..Default::default()
    }
}

pub fn inbound_audio(id: &str) -> WireMessage {
    WireMessage {
        key: WireKey {
            id: id.to_string(),
            remote_jid: "5511999990000@s.whatsapp.net".into(),
            from_me: false,
            participant: None,
        },
        content: Some(MessageContent::Audio {
            media: MediaRef {
                mimetype: "audio/ogg".into(),
                url: Some("https://example.invalid/audio".into()),
                ..Default::default()
            },
        }),
        ..Default::default()
    }
}

pub fn with_quote(mut msg: WireMessage, quoted_id: &str, quoted: Option<MessageContent>) -> WireMessage {
    msg.context = Some(WireContext {
        stanza_id: Some(quoted_id.to_string()),
        participant: Some("5511999990000@s.whatsapp.net".into()),
        quoted: quoted.map(Box::new),
    });
    msg
}
