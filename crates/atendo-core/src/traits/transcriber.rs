// SPDX-FileCopyrightText: 2026 Atendo Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Audio transcription collaborator.

use async_trait::async_trait;

/// Provider selection and credentials for a transcription call.
#[derive(Debug, Clone)]
pub struct TranscriberOptions {
    pub api_key: String,
    pub provider: String,
}

/// Transcribes stored audio media. Failures never propagate as errors:
/// a `None` return means the caller keeps its placeholder body.
#[async_trait]
pub trait Transcriber: Send + Sync {
    async fn transcribe(&self, media_url: &str, options: &TranscriberOptions) -> Option<String>;
}
