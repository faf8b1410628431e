//! Walks one dialog turn through the session core with real timers.
//!
//! Run with: `cargo run --example dialog_turn -p core-session`

use core_focus::{
    FocusClaim, FocusEvent, FocusHandler, FocusPriority, ResourceKind, StealVerdict,
    UnfocusDisposition, UnfocusMode,
};
use core_playsync::{DirectiveGroups, ExtraData, PlaySyncListener, SyncState};
use core_runtime::logging::{init_logging, LogFormat, LogLevel, LoggingConfig};
use core_runtime::timer::TokioTimer;
use core_runtime::SessionConfig;
use core_session::VoiceSession;
use std::rc::Rc;
use std::time::Duration;

struct SpeechChannel {
    label: &'static str,
}

impl FocusHandler for SpeechChannel {
    fn on_focus(&self, _event: Option<&FocusEvent>) {
        tracing::info!(channel = self.label, "channel active");
    }

    fn on_unfocus(&self, mode: UnfocusMode, _event: Option<&FocusEvent>) -> UnfocusDisposition {
        tracing::info!(channel = self.label, ?mode, "channel yielded");
        UnfocusDisposition::Remove
    }

    fn on_steal_request(
        &self,
        _event: Option<&FocusEvent>,
        requester: &FocusClaim,
    ) -> StealVerdict {
        tracing::info!(channel = self.label, requester = requester.name(), "steal allowed");
        StealVerdict::Allow
    }
}

struct SyncLogger {
    capability: &'static str,
}

impl PlaySyncListener for SyncLogger {
    fn on_sync_state(&self, ps_id: &str, state: SyncState, _extra: Option<&ExtraData>) {
        tracing::info!(capability = self.capability, ps_id, ?state, "sync state");
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> core_runtime::Result<()> {
    init_logging(
        LoggingConfig::default()
            .with_format(LogFormat::Compact)
            .with_level(LogLevel::Debug),
    )?;

    let local = tokio::task::LocalSet::new();
    local
        .run_until(async {
            // Short grace period so the expiry is visible in this demo
            let config = SessionConfig::builder()
                .normal_hold(Duration::from_millis(300))
                .build()?;
            let session = VoiceSession::new(config, TokioTimer::new())?;

            let tts_logger: Rc<dyn PlaySyncListener> =
                Rc::new(SyncLogger { capability: "TTS" });
            let display_logger: Rc<dyn PlaySyncListener> =
                Rc::new(SyncLogger { capability: "Display" });
            session.play_sync().add_listener("TTS", &tts_logger);
            session.play_sync().add_listener("Display", &display_logger);

            // The user asks something: ASR takes the microphone
            let asr = FocusClaim::new(
                "asr",
                FocusPriority::Asr,
                Rc::new(SpeechChannel { label: "asr" }),
            );
            session.focus().request(&asr, ResourceKind::Microphone, None);
            session.focus().release(&asr, ResourceKind::Microphone);

            // The answer arrives: narration plus an on-screen card
            let groups = DirectiveGroups::new(["TTS.Speak", "Display.FullText1"]);
            session.play_sync().prepare_sync("turn_1", &groups);

            let tts = FocusClaim::new(
                "tts",
                FocusPriority::Tts,
                Rc::new(SpeechChannel { label: "tts" }),
            );
            session.focus().request(&tts, ResourceKind::Speaker, None);
            session.play_sync().start_sync("turn_1", "TTS", None);
            session.play_sync().start_sync("turn_1", "Display", None);

            // Narration finishes; the context lingers for the grace period
            session.focus().release(&tts, ResourceKind::Speaker);
            session.play_sync().release_sync("turn_1", "TTS");
            tracing::info!(items = ?session.play_sync().play_stack_items(), "holding");

            tokio::time::sleep(Duration::from_millis(500)).await;
            tracing::info!(items = ?session.play_sync().play_stack_items(), "expired");

            session.shutdown();
            Ok(())
        })
        .await
}
