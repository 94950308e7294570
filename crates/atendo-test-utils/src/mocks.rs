// SPDX-FileCopyrightText: 2026 Atendo Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Mock collaborators: notifier, settings, job queue, transcriber, and
//! schedules.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use atendo_core::traits::{JobQueue, Notifier, Schedules, Settings, Topic, Transcriber};
use atendo_core::traits::transcriber::TranscriberOptions;

/// One captured realtime publication.
#[derive(Debug, Clone)]
pub struct Published {
    pub topics: Vec<String>,
    pub event: String,
    pub payload: serde_json::Value,
}

/// Notifier recording every publication for assertions.
#[derive(Default)]
pub struct RecordingNotifier {
    published: Mutex<Vec<Published>>,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn published(&self) -> Vec<Published> {
        self.published.lock().unwrap().clone()
    }

    pub fn events_named(&self, event: &str) -> Vec<Published> {
        self.published
            .lock()
            .unwrap()
            .iter()
            .filter(|p| p.event == event)
            .cloned()
            .collect()
    }

    pub fn clear(&self) {
        self.published.lock().unwrap().clear();
    }
}

impl Notifier for RecordingNotifier {
    fn publish(&self, topics: &[Topic], event: &str, payload: serde_json::Value) {
        self.published.lock().unwrap().push(Published {
            topics: topics.iter().map(|t| t.to_string()).collect(),
            event: event.to_string(),
            payload,
        });
    }
}

/// In-memory settings store.
#[derive(Default)]
pub struct MemorySettings {
    values: Mutex<HashMap<(i64, String), String>>,
}

impl MemorySettings {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, tenant_id: i64, key: &str, value: &str) {
        self.values
            .lock()
            .unwrap()
            .insert((tenant_id, key.to_string()), value.to_string());
    }
}

#[async_trait]
impl Settings for MemorySettings {
    async fn get(&self, tenant_id: i64, key: &str, default: &str) -> String {
        self.values
            .lock()
            .unwrap()
            .get(&(tenant_id, key.to_string()))
            .cloned()
            .unwrap_or_else(|| default.to_string())
    }
}

/// One captured job enqueue.
#[derive(Debug, Clone)]
pub struct EnqueuedJob {
    pub job_type: String,
    pub payload: serde_json::Value,
    pub delay: Option<Duration>,
}

/// Job queue recording every enqueue.
#[derive(Default)]
pub struct MockJobQueue {
    jobs: Mutex<Vec<EnqueuedJob>>,
}

impl MockJobQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn jobs(&self) -> Vec<EnqueuedJob> {
        self.jobs.lock().unwrap().clone()
    }
}

#[async_trait]
impl JobQueue for MockJobQueue {
    async fn enqueue(&self, job_type: &str, payload: serde_json::Value, delay: Option<Duration>) {
        self.jobs.lock().unwrap().push(EnqueuedJob {
            job_type: job_type.to_string(),
            payload,
            delay,
        });
    }
}

/// Transcriber returning a fixed transcript (or nothing).
pub struct FixedTranscriber {
    text: Option<String>,
    calls: AtomicU32,
}

impl FixedTranscriber {
    pub fn new(text: Option<&str>) -> Self {
        Self {
            text: text.map(|s| s.to_string()),
            calls: AtomicU32::new(0),
        }
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Transcriber for FixedTranscriber {
    async fn transcribe(&self, _media_url: &str, _options: &TranscriberOptions) -> Option<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.text.clone()
    }
}

/// Schedules collaborator returning a fixed activity answer.
pub struct FixedSchedules {
    value: Mutex<Option<bool>>,
}

impl FixedSchedules {
    /// `None` models "no schedule configured".
    pub fn new(value: Option<bool>) -> Self {
        Self {
            value: Mutex::new(value),
        }
    }

    pub fn set(&self, value: Option<bool>) {
        *self.value.lock().unwrap() = value;
    }
}

#[async_trait]
impl Schedules for FixedSchedules {
    async fn in_activity(&self, _tenant_id: i64, _queue_id: Option<i64>) -> Option<bool> {
        *self.value.lock().unwrap()
    }
}
