// SPDX-FileCopyrightText: 2026 Atendo Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration model structs for the Atendo core.
//!
//! All structs use `#[serde(deny_unknown_fields)]` to reject unrecognized
//! config keys at startup.

use serde::{Deserialize, Serialize};

/// Top-level Atendo configuration.
///
/// Loaded from TOML files following the XDG hierarchy, with environment
/// variable overrides. All sections are optional and default to sensible
/// values.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct AtendoConfig {
    /// Service identity and logging.
    #[serde(default)]
    pub service: ServiceConfig,

    /// Storage backend settings.
    #[serde(default)]
    pub storage: StorageConfig,

    /// Media download limits and throttling.
    #[serde(default)]
    pub media: MediaConfig,

    /// Connection lifecycle tuning.
    #[serde(default)]
    pub session: SessionConfig,

    /// Protocol version resolution.
    #[serde(default)]
    pub version: VersionConfig,

    /// Chatbot/queue routing tuning.
    #[serde(default)]
    pub chatbot: ChatbotConfig,
}

/// Service identity and logging configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ServiceConfig {
    /// Display name presented to the remote service as the client name.
    #[serde(default = "default_service_name")]
    pub name: String,

    /// Logging level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            name: default_service_name(),
            log_level: default_log_level(),
        }
    }
}

fn default_service_name() -> String {
    "Atendo".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Storage backend configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct StorageConfig {
    /// Path to the SQLite database file.
    #[serde(default = "default_database_path")]
    pub database_path: String,

    /// Directory where downloaded media and thumbnails are written.
    #[serde(default = "default_media_dir")]
    pub media_dir: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
            media_dir: default_media_dir(),
        }
    }
}

fn default_database_path() -> String {
    "atendo.db".to_string()
}

fn default_media_dir() -> String {
    "media".to_string()
}

/// Media download configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct MediaConfig {
    /// Default size ceiling in MiB; overridable per tenant through the
    /// `downloadLimit` setting.
    #[serde(default = "default_download_limit_mib")]
    pub download_limit_mib: u64,

    /// Initial read-rate cap in bytes per second.
    #[serde(default = "default_max_rate")]
    pub max_rate_bps: u64,

    /// Reduced read rate applied once the throttle threshold is crossed.
    #[serde(default = "default_throttle_rate")]
    pub throttle_rate_bps: u64,

    /// Downloaded-bytes threshold that triggers the reduced rate.
    #[serde(default = "default_throttle_threshold")]
    pub throttle_threshold_bytes: u64,

    /// Maximum download attempts before failing permanently.
    #[serde(default = "default_download_attempts")]
    pub download_attempts: u32,
}

impl Default for MediaConfig {
    fn default() -> Self {
        Self {
            download_limit_mib: default_download_limit_mib(),
            max_rate_bps: default_max_rate(),
            throttle_rate_bps: default_throttle_rate(),
            throttle_threshold_bytes: default_throttle_threshold(),
            download_attempts: default_download_attempts(),
        }
    }
}

fn default_download_limit_mib() -> u64 {
    15
}

fn default_max_rate() -> u64 {
    5 * 1024 * 1024 / 8 // 5 Mbps
}

fn default_throttle_rate() -> u64 {
    1024 * 1024 / 8 // 1 Mbps
}

fn default_throttle_threshold() -> u64 {
    1024 * 1024 // 1 MiB
}

fn default_download_attempts() -> u32 {
    10
}

/// Connection lifecycle configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct SessionConfig {
    /// Unused QR refreshes tolerated before the pairing attempt is
    /// force-terminated.
    #[serde(default = "default_qr_max_retries")]
    pub qr_max_retries: u32,

    /// Delay before reconnecting after an ordinary connection drop.
    #[serde(default = "default_reconnect_delay_secs")]
    pub reconnect_delay_secs: u64,

    /// Delay before the deferred state resync after a credential refresh.
    #[serde(default = "default_resync_delay_secs")]
    pub resync_delay_secs: u64,

    /// TTL of the in-memory sent-message cache used for retry-decrypt.
    #[serde(default = "default_message_cache_ttl_secs")]
    pub message_cache_ttl_secs: u64,

    /// TTL of the group-metadata cache.
    #[serde(default = "default_group_cache_ttl_secs")]
    pub group_cache_ttl_secs: u64,

    /// TTL of the group-contact materialization cache.
    #[serde(default = "default_group_contact_cache_ttl_secs")]
    pub group_contact_cache_ttl_secs: u64,

    /// TTL of the per-ticket out-of-hours notice suppression.
    #[serde(default = "default_out_of_hours_cache_ttl_secs")]
    pub out_of_hours_cache_ttl_secs: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            qr_max_retries: default_qr_max_retries(),
            reconnect_delay_secs: default_reconnect_delay_secs(),
            resync_delay_secs: default_resync_delay_secs(),
            message_cache_ttl_secs: default_message_cache_ttl_secs(),
            group_cache_ttl_secs: default_group_cache_ttl_secs(),
            group_contact_cache_ttl_secs: default_group_contact_cache_ttl_secs(),
            out_of_hours_cache_ttl_secs: default_out_of_hours_cache_ttl_secs(),
        }
    }
}

fn default_qr_max_retries() -> u32 {
    3
}

fn default_reconnect_delay_secs() -> u64 {
    2
}

fn default_resync_delay_secs() -> u64 {
    5
}

fn default_message_cache_ttl_secs() -> u64 {
    120
}

fn default_group_cache_ttl_secs() -> u64 {
    5 * 60
}

fn default_group_contact_cache_ttl_secs() -> u64 {
    30
}

fn default_out_of_hours_cache_ttl_secs() -> u64 {
    5 * 60
}

/// Protocol version resolution configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct VersionConfig {
    /// Remote endpoint serving the preferred protocol version as a JSON
    /// array. `None` disables remote fetch and uses the bundled default.
    #[serde(default)]
    pub endpoint: Option<String>,

    /// Cache TTL in hours for the resolved version.
    #[serde(default = "default_version_ttl_hours")]
    pub ttl_hours: u64,
}

impl Default for VersionConfig {
    fn default() -> Self {
        Self {
            endpoint: None,
            ttl_hours: default_version_ttl_hours(),
        }
    }
}

fn default_version_ttl_hours() -> u64 {
    24
}

/// Chatbot routing configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ChatbotConfig {
    /// Debounce window for outbound greeting/quick-reply sends.
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,

    /// Maximum same-turn queue-forward hops before the walk is cut off.
    #[serde(default = "default_max_forward_depth")]
    pub max_forward_depth: u32,
}

impl Default for ChatbotConfig {
    fn default() -> Self {
        Self {
            debounce_ms: default_debounce_ms(),
            max_forward_depth: default_max_forward_depth(),
        }
    }
}

fn default_debounce_ms() -> u64 {
    1000
}

fn default_max_forward_depth() -> u32 {
    8
}
