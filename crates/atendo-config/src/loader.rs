// SPDX-FileCopyrightText: 2026 Atendo Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration loader using Figment for layered config merging.
//!
//! Supports the XDG hierarchy: `./atendo.toml` > `~/.config/atendo/atendo.toml`
//! > `/etc/atendo/atendo.toml`, with environment variable overrides via the
//! `ATENDO_` prefix.

#![allow(clippy::result_large_err)] // figment::Error is external and cannot be boxed without wrapper

use std::path::Path;

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};

use crate::model::AtendoConfig;

/// Load configuration from the standard XDG hierarchy with env var overrides.
///
/// Merge order (later overrides earlier):
/// 1. Compiled defaults
/// 2. `/etc/atendo/atendo.toml` (system-wide)
/// 3. `~/.config/atendo/atendo.toml` (user XDG config)
/// 4. `./atendo.toml` (local directory)
/// 5. `ATENDO_*` environment variables
pub fn load_config() -> Result<AtendoConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(AtendoConfig::default()))
        .merge(Toml::file("/etc/atendo/atendo.toml"))
        .merge(Toml::file(
            dirs::config_dir()
                .map(|d| d.join("atendo/atendo.toml"))
                .unwrap_or_default(),
        ))
        .merge(Toml::file("atendo.toml"))
        .merge(env_provider())
        .extract()
}

/// Load configuration from a TOML string only (no XDG lookup).
///
/// Used for testing and explicit configuration.
pub fn load_config_from_str(toml_content: &str) -> Result<AtendoConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(AtendoConfig::default()))
        .merge(Toml::string(toml_content))
        .extract()
}

/// Load configuration from a specific file path with env var overrides.
pub fn load_config_from_path(path: &Path) -> Result<AtendoConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(AtendoConfig::default()))
        .merge(Toml::file(path))
        .merge(env_provider())
        .extract()
}

/// Create the environment variable provider using explicit `map()` for
/// section-to-dot mapping.
///
/// Uses `Env::map()` NOT `Env::split("_")` to avoid ambiguity with
/// underscore-containing key names: `ATENDO_MEDIA_DOWNLOAD_LIMIT_MIB` must
/// map to `media.download_limit_mib`, not `media.download.limit.mib`.
fn env_provider() -> Env {
    Env::prefixed("ATENDO_").map(|key| {
        let key_str = key.as_str();
        let mapped = key_str
            .replacen("service_", "service.", 1)
            .replacen("storage_", "storage.", 1)
            .replacen("media_", "media.", 1)
            .replacen("session_", "session.", 1)
            .replacen("version_", "version.", 1)
            .replacen("chatbot_", "chatbot.", 1);
        mapped.into()
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_load_without_files() {
        let config = load_config_from_str("").unwrap();
        assert_eq!(config.service.name, "Atendo");
        assert_eq!(config.media.download_limit_mib, 15);
        assert_eq!(config.session.qr_max_retries, 3);
        assert_eq!(config.version.ttl_hours, 24);
        assert_eq!(config.chatbot.debounce_ms, 1000);
    }

    #[test]
    fn toml_overrides_defaults() {
        let config = load_config_from_str(
            r#"
            [media]
            download_limit_mib = 20

            [session]
            reconnect_delay_secs = 5
            "#,
        )
        .unwrap();
        assert_eq!(config.media.download_limit_mib, 20);
        assert_eq!(config.session.reconnect_delay_secs, 5);
        // untouched sections keep their defaults
        assert_eq!(config.chatbot.max_forward_depth, 8);
    }

    #[test]
    fn unknown_keys_are_rejected() {
        let result = load_config_from_str(
            r#"
            [media]
            downlaod_limit_mib = 20
            "#,
        );
        assert!(result.is_err());
    }
}
