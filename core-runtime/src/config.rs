//! # Session Configuration Module
//!
//! Provides configuration management for the voice session core.
//!
//! ## Overview
//!
//! The configuration system uses a builder pattern to construct a
//! `SessionConfig` instance that holds the externally adjustable parameters
//! of the session core: the play-stack hold durations and the default set of
//! capabilities that participate in play-sync barriers. It enforces
//! fail-fast validation so a misconfigured session is rejected before any
//! capability starts using it.
//!
//! ## Usage
//!
//! ```rust
//! use core_runtime::config::SessionConfig;
//! use std::time::Duration;
//!
//! let config = SessionConfig::builder()
//!     .normal_hold(Duration::from_secs(5))
//!     .long_hold(Duration::from_secs(120))
//!     .sync_capability("Alerts")
//!     .build()
//!     .expect("Failed to build config");
//! ```

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Grace period applied when a play-service context is removed in `Normal`
/// mode: the context stays on stage this long to tolerate a quick follow-up
/// turn.
pub const DEFAULT_NORMAL_HOLD: Duration = Duration::from_secs(7);

/// Grace period applied when a play-service context is removed in `Later`
/// mode (long-lived contexts such as paused media).
pub const DEFAULT_LONG_HOLD: Duration = Duration::from_secs(600);

/// Capabilities that participate in play-sync barriers by default.
pub const DEFAULT_SYNC_CAPABILITIES: [&str; 3] = ["TTS", "AudioPlayer", "Display"];

/// Configuration for one voice session.
///
/// Holds the only externally adjustable parameters of the session core.
/// Use [`SessionConfigBuilder`] to construct instances; all fields have
/// product defaults.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Hold duration for `Normal` removals.
    pub normal_hold: Duration,

    /// Hold duration for `Later` removals.
    pub long_hold: Duration,

    /// Capability names registered for play-sync participation.
    pub sync_capabilities: Vec<String>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            normal_hold: DEFAULT_NORMAL_HOLD,
            long_hold: DEFAULT_LONG_HOLD,
            sync_capabilities: DEFAULT_SYNC_CAPABILITIES
                .iter()
                .map(|name| name.to_string())
                .collect(),
        }
    }
}

impl SessionConfig {
    /// Creates a new builder for constructing a `SessionConfig`.
    pub fn builder() -> SessionConfigBuilder {
        SessionConfigBuilder::default()
    }

    /// Validates the configuration and returns an error if invalid.
    ///
    /// This checks:
    /// - Hold durations are non-zero
    /// - At least one sync capability is registered
    /// - Capability names are non-empty and unique
    pub fn validate(&self) -> Result<()> {
        if self.normal_hold.is_zero() {
            return Err(Error::Config(
                "Normal hold duration must be greater than zero".to_string(),
            ));
        }

        if self.long_hold.is_zero() {
            return Err(Error::Config(
                "Long hold duration must be greater than zero".to_string(),
            ));
        }

        if self.sync_capabilities.is_empty() {
            return Err(Error::Config(
                "At least one sync capability is required. \
                 Use .sync_capability() to register one."
                    .to_string(),
            ));
        }

        for (index, name) in self.sync_capabilities.iter().enumerate() {
            if name.is_empty() {
                return Err(Error::Config(
                    "Sync capability names cannot be empty".to_string(),
                ));
            }

            if self.sync_capabilities[..index].contains(name) {
                return Err(Error::Config(format!(
                    "Sync capability '{}' is registered twice",
                    name
                )));
            }
        }

        Ok(())
    }
}

/// Builder for constructing [`SessionConfig`] instances.
#[derive(Debug, Default)]
pub struct SessionConfigBuilder {
    normal_hold: Option<Duration>,
    long_hold: Option<Duration>,
    sync_capabilities: Option<Vec<String>>,
}

impl SessionConfigBuilder {
    /// Sets the hold duration for `Normal` removals.
    ///
    /// Default: 7 seconds.
    pub fn normal_hold(mut self, duration: Duration) -> Self {
        self.normal_hold = Some(duration);
        self
    }

    /// Sets the hold duration for `Later` removals.
    ///
    /// Default: 600 seconds.
    pub fn long_hold(mut self, duration: Duration) -> Self {
        self.long_hold = Some(duration);
        self
    }

    /// Registers an additional capability for play-sync participation, on
    /// top of the defaults (`TTS`, `AudioPlayer`, `Display`).
    pub fn sync_capability(mut self, name: impl Into<String>) -> Self {
        self.sync_capabilities
            .get_or_insert_with(|| {
                DEFAULT_SYNC_CAPABILITIES
                    .iter()
                    .map(|name| name.to_string())
                    .collect()
            })
            .push(name.into());
        self
    }

    /// Replaces the capability registry wholesale.
    pub fn sync_capabilities<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.sync_capabilities = Some(names.into_iter().map(Into::into).collect());
        self
    }

    /// Builds the final `SessionConfig` instance.
    ///
    /// Returns an error if the resulting configuration fails validation.
    pub fn build(self) -> Result<SessionConfig> {
        let defaults = SessionConfig::default();

        let config = SessionConfig {
            normal_hold: self.normal_hold.unwrap_or(defaults.normal_hold),
            long_hold: self.long_hold.unwrap_or(defaults.long_hold),
            sync_capabilities: self
                .sync_capabilities
                .unwrap_or(defaults.sync_capabilities),
        };

        config.validate()?;

        Ok(config)
    }
}
