// SPDX-FileCopyrightText: 2026 Atendo Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Post-deserialization validation of configuration values.

use atendo_core::AtendoError;

use crate::model::AtendoConfig;

const LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

/// Validate values Figment cannot check structurally.
pub fn validate_config(config: &AtendoConfig) -> Result<(), AtendoError> {
    if !LOG_LEVELS.contains(&config.service.log_level.as_str()) {
        return Err(AtendoError::Config(format!(
            "service.log_level must be one of {LOG_LEVELS:?}, got {:?}",
            config.service.log_level
        )));
    }

    if config.media.download_limit_mib == 0 {
        return Err(AtendoError::Config(
            "media.download_limit_mib must be greater than zero".into(),
        ));
    }

    if config.media.throttle_rate_bps == 0 || config.media.max_rate_bps == 0 {
        return Err(AtendoError::Config(
            "media rates must be greater than zero".into(),
        ));
    }

    if config.media.download_attempts == 0 {
        return Err(AtendoError::Config(
            "media.download_attempts must be greater than zero".into(),
        ));
    }

    if config.session.qr_max_retries == 0 {
        return Err(AtendoError::Config(
            "session.qr_max_retries must be greater than zero".into(),
        ));
    }

    if config.chatbot.debounce_ms == 0 {
        return Err(AtendoError::Config(
            "chatbot.debounce_ms must be greater than zero".into(),
        ));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        assert!(validate_config(&AtendoConfig::default()).is_ok());
    }

    #[test]
    fn zero_download_limit_is_rejected() {
        let mut config = AtendoConfig::default();
        config.media.download_limit_mib = 0;
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn bad_log_level_is_rejected() {
        let mut config = AtendoConfig::default();
        config.service.log_level = "verbose".into();
        assert!(validate_config(&config).is_err());
    }
}
