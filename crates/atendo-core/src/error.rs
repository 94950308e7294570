// SPDX-FileCopyrightText: 2026 Atendo Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Error types for the Atendo helpdesk core.

use thiserror::Error;

/// The primary error type used across the Atendo workspace.
#[derive(Debug, Error)]
pub enum AtendoError {
    /// Configuration errors (invalid TOML, missing required fields, bad values).
    #[error("configuration error: {0}")]
    Config(String),

    /// Storage backend errors (database connection, query failure, serialization).
    #[error("storage error: {source}")]
    Storage {
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// Protocol transport errors (connect failure, send failure, stream errors).
    #[error("transport error: {message}")]
    Transport {
        message: String,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Typed domain errors surfaced to callers with a machine-readable code
    /// and an HTTP-style status.
    #[error("{code}")]
    App { code: &'static str, status: u16 },

    /// Inbound media larger than the configured download ceiling.
    #[error("media of {size} bytes exceeds the {limit} byte limit")]
    MediaOverLimit { size: u64, limit: u64 },

    /// Media download exhausted its retry budget.
    #[error("media download failed after {attempts} attempts")]
    MediaDownload { attempts: u32 },

    /// Operation timed out.
    #[error("operation timed out after {duration:?}")]
    Timeout { duration: std::time::Duration },

    /// Internal or unexpected errors.
    #[error("internal error: {0}")]
    Internal(String),
}

impl AtendoError {
    /// Construct a typed domain error.
    pub fn app(code: &'static str, status: u16) -> Self {
        Self::App { code, status }
    }

    /// No live in-process connection is registered for the requested id.
    pub fn not_initialized() -> Self {
        Self::app("ERR_WAPP_NOT_INITIALIZED", 404)
    }

    /// The machine-readable code for this error, used in API payloads.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Config(_) => "ERR_CONFIG",
            Self::Storage { .. } => "ERR_STORAGE",
            Self::Transport { .. } => "ERR_TRANSPORT",
            Self::App { code, .. } => code,
            Self::MediaOverLimit { .. } => "ERR_FILESIZE_OVER_LIMIT",
            Self::MediaDownload { .. } => "ERR_WAPP_DOWNLOAD_MEDIA",
            Self::Timeout { .. } => "ERR_TIMEOUT",
            Self::Internal(_) => "ERR_INTERNAL",
        }
    }

    /// The HTTP-style status callers should map this error to.
    pub fn status(&self) -> u16 {
        match self {
            Self::App { status, .. } => *status,
            Self::MediaOverLimit { .. } => 413,
            Self::Config(_) => 400,
            _ => 500,
        }
    }
}
