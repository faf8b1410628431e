//! End-to-end flows across focus arbitration and play-sync coordination.

use core_focus::{
    FocusClaim, FocusEvent, FocusHandler, FocusPriority, ResourceKind, StealVerdict,
    UnfocusDisposition, UnfocusMode,
};
use core_playsync::{DirectiveGroups, ExtraData, PlaySyncListener, SyncState};
use core_runtime::timer::ManualTimer;
use core_runtime::SessionConfig;
use core_session::VoiceSession;
use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::rc::Rc;

struct Capability {
    label: &'static str,
    log: Rc<RefCell<Vec<String>>>,
    steal: Cell<StealVerdict>,
    unfocus: Cell<UnfocusDisposition>,
}

impl Capability {
    fn new(label: &'static str, log: &Rc<RefCell<Vec<String>>>) -> Rc<Self> {
        Rc::new(Self {
            label,
            log: Rc::clone(log),
            steal: Cell::new(StealVerdict::Allow),
            unfocus: Cell::new(UnfocusDisposition::Remove),
        })
    }
}

impl FocusHandler for Capability {
    fn on_focus(&self, _event: Option<&FocusEvent>) {
        self.log.borrow_mut().push(format!("{}:focus", self.label));
    }

    fn on_unfocus(&self, mode: UnfocusMode, _event: Option<&FocusEvent>) -> UnfocusDisposition {
        self.log
            .borrow_mut()
            .push(format!("{}:unfocus:{:?}", self.label, mode));
        self.unfocus.get()
    }

    fn on_steal_request(
        &self,
        _event: Option<&FocusEvent>,
        requester: &FocusClaim,
    ) -> StealVerdict {
        self.log
            .borrow_mut()
            .push(format!("{}:steal-req:{}", self.label, requester.name()));
        self.steal.get()
    }
}

#[derive(Default)]
struct SyncProbe {
    states: RefCell<HashMap<String, SyncState>>,
}

impl SyncProbe {
    fn new() -> Rc<Self> {
        Rc::new(Self::default())
    }

    fn state(&self, ps_id: &str) -> Option<SyncState> {
        self.states.borrow().get(ps_id).copied()
    }
}

impl PlaySyncListener for SyncProbe {
    fn on_sync_state(&self, ps_id: &str, state: SyncState, _extra: Option<&ExtraData>) {
        self.states.borrow_mut().insert(ps_id.to_string(), state);
    }
}

fn session() -> (VoiceSession, Rc<ManualTimer>) {
    let timer = ManualTimer::new();
    let session = VoiceSession::new(SessionConfig::default(), timer.clone()).unwrap();
    (session, timer)
}

#[test]
fn focus_handoff_across_one_dialog_turn() {
    // TTS holds the mic resource, ASR steals it for the user's turn, and
    // TTS regains it automatically when recognition finishes.
    let (session, _timer) = session();
    let log = Rc::new(RefCell::new(Vec::new()));

    let tts_handler = Capability::new("tts", &log);
    tts_handler.unfocus.set(UnfocusDisposition::Pause);
    let tts = FocusClaim::new("tts", FocusPriority::Tts, tts_handler);
    let asr = FocusClaim::new("asr", FocusPriority::Asr, Capability::new("asr", &log));

    session.focus().request(&tts, ResourceKind::Microphone, None);
    session.focus().request(&asr, ResourceKind::Microphone, None);
    assert_eq!(
        session
            .focus()
            .peek_top(ResourceKind::Microphone)
            .unwrap()
            .name(),
        "asr"
    );

    session.focus().release(&asr, ResourceKind::Microphone);
    assert_eq!(
        session
            .focus()
            .peek_top(ResourceKind::Microphone)
            .unwrap()
            .name(),
        "tts"
    );
    assert_eq!(
        *log.borrow(),
        [
            "tts:focus",
            "tts:steal-req:asr",
            "tts:unfocus:Judge",
            "asr:focus",
            "asr:unfocus:Judge",
            "tts:focus"
        ]
    );
}

#[test]
fn dialog_turn_with_display_card() {
    // One spoken answer with an on-screen card: both capabilities sync,
    // the turn ends, the card survives the grace period, then expires.
    let (session, timer) = session();
    let play_sync = session.play_sync();

    let tts_probe = SyncProbe::new();
    let display_probe = SyncProbe::new();
    play_sync.add_listener("TTS", &(tts_probe.clone() as Rc<dyn PlaySyncListener>));
    play_sync.add_listener("Display", &(display_probe.clone() as Rc<dyn PlaySyncListener>));

    let groups = DirectiveGroups::new(["TTS.Speak", "Display.FullText1"]);
    play_sync.prepare_sync("turn_1", &groups);
    assert_eq!(tts_probe.state("turn_1"), Some(SyncState::Prepared));
    assert_eq!(display_probe.state("turn_1"), Some(SyncState::Prepared));

    play_sync.start_sync("turn_1", "Display", None);
    assert_eq!(tts_probe.state("turn_1"), Some(SyncState::Prepared));

    play_sync.start_sync("turn_1", "TTS", None);
    assert_eq!(tts_probe.state("turn_1"), Some(SyncState::Synced));
    assert_eq!(display_probe.state("turn_1"), Some(SyncState::Synced));

    play_sync.release_sync("turn_1", "TTS");
    // Grace period: context still live for a quick follow-up turn
    assert_eq!(play_sync.play_stack_items(), ["turn_1"]);
    assert_eq!(tts_probe.state("turn_1"), Some(SyncState::Synced));

    timer.elapse();
    assert!(play_sync.play_stack_items().is_empty());
    assert_eq!(tts_probe.state("turn_1"), Some(SyncState::Released));
    assert_eq!(display_probe.state("turn_1"), Some(SyncState::Released));
}

#[test]
fn info_card_stacks_over_playing_media() {
    // Music keeps playing in the background while a spoken answer with a
    // card comes and goes on top of it.
    let (session, timer) = session();
    let play_sync = session.play_sync();

    let probe = SyncProbe::new();
    play_sync.add_listener("TTS", &(probe.clone() as Rc<dyn PlaySyncListener>));

    let media = DirectiveGroups::new(["TTS.Speak", "AudioPlayer.Play"]);
    play_sync.prepare_sync("music", &media);
    play_sync.start_sync("music", "TTS", None);
    play_sync.start_sync("music", "AudioPlayer", None);
    assert_eq!(probe.state("music"), Some(SyncState::Synced));

    let card = DirectiveGroups::new(["TTS.Speak", "Display.FullText1"]);
    play_sync.prepare_sync("answer", &card);
    play_sync.start_sync("answer", "TTS", None);
    play_sync.start_sync("answer", "Display", None);
    assert_eq!(play_sync.play_stack_items(), ["answer", "music"]);

    // The stacked answer tears down synchronously; the music context
    // outlives it and then honors its own long hold
    play_sync.release_sync("answer", "TTS");
    assert_eq!(probe.state("answer"), Some(SyncState::Released));
    assert_eq!(play_sync.play_stack_items(), ["music"]);

    play_sync.release_sync_later("music", "AudioPlayer");
    assert_eq!(probe.state("music"), Some(SyncState::Synced));

    timer.elapse();
    assert_eq!(probe.state("music"), Some(SyncState::Released));
    assert!(play_sync.play_stack_items().is_empty());
}

#[test]
fn shutdown_tears_everything_down() {
    let (session, _timer) = session();
    let log = Rc::new(RefCell::new(Vec::new()));

    let media_handler = Capability::new("media", &log);
    // Pause answers are overridden by the forced teardown
    media_handler.unfocus.set(UnfocusDisposition::Pause);
    let media = FocusClaim::new("media", FocusPriority::Media, media_handler);
    session.focus().request(&media, ResourceKind::Speaker, None);

    let probe = SyncProbe::new();
    session
        .play_sync()
        .add_listener("TTS", &(probe.clone() as Rc<dyn PlaySyncListener>));
    let groups = DirectiveGroups::new(["TTS.Speak"]);
    session.play_sync().prepare_sync("turn_1", &groups);
    session.play_sync().start_sync("turn_1", "TTS", None);

    session.shutdown();

    assert!(!session.focus().is_focus_held(ResourceKind::Speaker));
    assert!(session.play_sync().play_stack_items().is_empty());
    assert_eq!(probe.state("turn_1"), Some(SyncState::Released));
    assert_eq!(log.borrow().last().unwrap(), "media:unfocus:Force");
}
