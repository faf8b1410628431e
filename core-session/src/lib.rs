//! # Voice Session Module
//!
//! Owns one instance of each session-coordination subsystem and wires them
//! together.
//!
//! ## Overview
//!
//! A [`VoiceSession`] constructs the [`FocusArbiter`], the
//! [`PlayStackLedger`] and the [`PlaySyncCoordinator`] from one
//! [`SessionConfig`] and hands references to capability modules at their
//! construction. Nothing here is a process-wide singleton: embedders may
//! run several sessions side by side (multi-instance testing relies on
//! this).
//!
//! ## Usage
//!
//! ```ignore
//! use core_runtime::{ManualTimer, SessionConfig};
//! use core_session::VoiceSession;
//!
//! let session = VoiceSession::new(SessionConfig::default(), ManualTimer::new())?;
//! session.play_sync().prepare_sync("ps_id_1", &groups);
//! session.focus().request(&claim, ResourceKind::Speaker, None);
//! ```

use core_focus::{FocusArbiter, ResourceKind};
use core_playsync::{HoldTimes, PlayStackLedger, PlaySyncCoordinator};
use core_runtime::timer::SessionTimer;
use core_runtime::{Result, SessionConfig};
use std::rc::Rc;
use tracing::info;

/// One device session: focus arbitration, play-stack lifecycle and
/// play-sync barrier, constructed together and sharing one configuration.
pub struct VoiceSession {
    config: SessionConfig,
    focus: FocusArbiter,
    play_stack: Rc<PlayStackLedger>,
    play_sync: Rc<PlaySyncCoordinator>,
}

impl VoiceSession {
    /// Builds a session from `config`, driving hold/expiry through the
    /// injected `timer`.
    ///
    /// # Errors
    ///
    /// Returns an error if `config` fails validation.
    pub fn new(config: SessionConfig, timer: Rc<dyn SessionTimer>) -> Result<Self> {
        config.validate()?;

        let play_stack = PlayStackLedger::with_hold_times(
            timer,
            HoldTimes {
                normal: config.normal_hold,
                long: config.long_hold,
            },
        );
        let play_sync =
            PlaySyncCoordinator::new(Rc::clone(&play_stack), config.sync_capabilities.clone());

        info!(
            capabilities = ?config.sync_capabilities,
            "Voice session constructed"
        );

        Ok(Self {
            config,
            focus: FocusArbiter::new(),
            play_stack,
            play_sync,
        })
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn focus(&self) -> &FocusArbiter {
        &self.focus
    }

    pub fn play_stack(&self) -> &Rc<PlayStackLedger> {
        &self.play_stack
    }

    pub fn play_sync(&self) -> &Rc<PlaySyncCoordinator> {
        &self.play_sync
    }

    /// Full teardown: unconditionally releases every play-sync context and
    /// force-unfocuses every claim on both resources.
    pub fn shutdown(&self) {
        info!("Voice session shutting down");
        self.play_sync.release_sync_unconditionally();
        self.focus.release_all(ResourceKind::Microphone);
        self.focus.release_all(ResourceKind::Speaker);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core_runtime::timer::ManualTimer;
    use std::time::Duration;

    #[test]
    fn test_session_construction_applies_config() {
        let config = SessionConfig::builder()
            .normal_hold(Duration::from_secs(5))
            .long_hold(Duration::from_secs(60))
            .sync_capability("Alerts")
            .build()
            .unwrap();

        let session = VoiceSession::new(config, ManualTimer::new()).unwrap();

        let hold_times = session.play_stack().hold_times();
        assert_eq!(hold_times.normal, Duration::from_secs(5));
        assert_eq!(hold_times.long, Duration::from_secs(60));
        assert_eq!(
            session.config().sync_capabilities,
            ["TTS", "AudioPlayer", "Display", "Alerts"]
        );
    }

    #[test]
    fn test_invalid_config_is_rejected() {
        let config = SessionConfig {
            normal_hold: Duration::ZERO,
            ..SessionConfig::default()
        };

        assert!(VoiceSession::new(config, ManualTimer::new()).is_err());
    }

    #[test]
    fn test_sessions_are_independent() {
        let first = VoiceSession::new(SessionConfig::default(), ManualTimer::new()).unwrap();
        let second = VoiceSession::new(SessionConfig::default(), ManualTimer::new()).unwrap();

        let groups = core_playsync::DirectiveGroups::new(["TTS.Speak"]);
        first.play_sync().prepare_sync("ps_id_1", &groups);

        assert_eq!(first.play_sync().play_stack_items(), ["ps_id_1"]);
        assert!(second.play_sync().play_stack_items().is_empty());
    }
}
