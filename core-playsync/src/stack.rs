//! Layered container of live play-service contexts.

use crate::directive::{DirectiveGroups, PlayActivity};
use core_runtime::config::{DEFAULT_LONG_HOLD, DEFAULT_NORMAL_HOLD};
use core_runtime::timer::SessionTimer;
use serde::{Deserialize, Serialize};
use std::cell::{Cell, RefCell};
use std::rc::{Rc, Weak};
use std::time::Duration;
use tracing::{debug, warn};

/// How a context leaves the play stack.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RemoveMode {
    /// Remove after the normal grace period (7 s default).
    Normal,
    /// Remove synchronously.
    Immediate,
    /// Remove after the long grace period (600 s default).
    Later,
}

/// Grace periods applied by deferred removals.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HoldTimes {
    pub normal: Duration,
    pub long: Duration,
}

impl Default for HoldTimes {
    fn default() -> Self {
        Self {
            normal: DEFAULT_NORMAL_HOLD,
            long: DEFAULT_LONG_HOLD,
        }
    }
}

/// Callbacks fired when the set of live contexts changes.
///
/// Registrations are held as `Weak` references: the registering side keeps
/// its listener alive and unregisters before dropping it. Notifications are
/// delivered after the ledger has finished mutating, so a listener may call
/// back into the ledger.
pub trait PlayStackListener {
    fn on_stack_added(&self, ps_id: &str);
    fn on_stack_removed(&self, ps_id: &str);
}

/// Ordered set of currently live play-service contexts.
///
/// The layering policy keeps at most one foreground context, optionally
/// stacked over one background `Media` context. Removals other than
/// [`RemoveMode::Immediate`] may be deferred by a single-shot hold timer so
/// a context tolerates a quick follow-up turn.
///
/// Constructed via [`PlayStackLedger::new`] with an injected
/// [`SessionTimer`]; the timer callback re-enters the ledger on the owning
/// thread.
pub struct PlayStackLedger {
    weak_self: Weak<PlayStackLedger>,
    timer: Rc<dyn SessionTimer>,
    entries: RefCell<Vec<(String, PlayActivity)>>,
    listeners: RefCell<Vec<Weak<dyn PlayStackListener>>>,
    hold_times: Cell<HoldTimes>,
    // The id a pending hold timer will remove when it fires.
    held_id: RefCell<Option<String>>,
    has_long_timer: Cell<bool>,
    has_holding: Cell<bool>,
    is_expect_speech: Cell<bool>,
    is_stacked: Cell<bool>,
    adding_render: Cell<bool>,
}

impl PlayStackLedger {
    pub fn new(timer: Rc<dyn SessionTimer>) -> Rc<Self> {
        Self::with_hold_times(timer, HoldTimes::default())
    }

    pub fn with_hold_times(timer: Rc<dyn SessionTimer>, hold_times: HoldTimes) -> Rc<Self> {
        Rc::new_cyclic(|weak_self| Self {
            weak_self: weak_self.clone(),
            timer,
            entries: RefCell::new(Vec::new()),
            listeners: RefCell::new(Vec::new()),
            hold_times: Cell::new(hold_times),
            held_id: RefCell::new(None),
            has_long_timer: Cell::new(false),
            has_holding: Cell::new(false),
            is_expect_speech: Cell::new(false),
            is_stacked: Cell::new(false),
            adding_render: Cell::new(false),
        })
    }

    // ========================================================================
    // Listener registry
    // ========================================================================

    pub fn add_listener(&self, listener: &Rc<dyn PlayStackListener>) {
        let candidate = Rc::downgrade(listener);
        let mut listeners = self.listeners.borrow_mut();

        if listeners.iter().any(|existing| existing.ptr_eq(&candidate)) {
            warn!("The play stack listener is already registered");
            return;
        }

        listeners.push(candidate);
    }

    pub fn remove_listener(&self, listener: &Rc<dyn PlayStackListener>) {
        let candidate = Rc::downgrade(listener);
        self.listeners
            .borrow_mut()
            .retain(|existing| !existing.ptr_eq(&candidate));
    }

    pub fn listener_count(&self) -> usize {
        let mut listeners = self.listeners.borrow_mut();
        listeners.retain(|listener| listener.strong_count() > 0);
        listeners.len()
    }

    // ========================================================================
    // Stack mutation
    // ========================================================================

    /// Adds `ps_id` to the stack, applying the layering policy.
    ///
    /// Returns `false` without creating an entry when the id is already
    /// present: identical activity and media-backed ids are rejected
    /// outright, a differing activity replaces the existing entry in place
    /// (a transition, not an addition). Returns `true` when a new entry was
    /// inserted and `on_stack_added` delivered.
    pub fn add(&self, ps_id: &str, groups: &DirectiveGroups) -> bool {
        if ps_id.is_empty() || groups.is_empty() {
            warn!("The play service id or directive groups are empty");
            return false;
        }

        let activity = groups.activity();

        let existing = self
            .entries
            .borrow()
            .iter()
            .find(|(id, _)| id == ps_id)
            .map(|(_, current)| *current);

        if let Some(current) = existing {
            if current == activity {
                warn!(ps_id, "Already added to the play stack");
                return false;
            }

            if current == PlayActivity::Media {
                warn!(ps_id, "Blocked by the active media context");
                return false;
            }

            debug!(ps_id, from = ?current, to = ?activity, "Activity transition in place");
            let mut entries = self.entries.borrow_mut();
            if let Some(entry) = entries.iter_mut().find(|(id, _)| id == ps_id) {
                entry.1 = activity;
            }
            return false;
        }

        self.is_expect_speech.set(groups.expects_speech());
        self.adding_render.set(groups.has_render_payload());

        let stacked = self.is_stacked_activity(activity);
        self.handle_previous_stack(stacked);
        self.is_stacked.set(stacked);

        self.entries
            .borrow_mut()
            .push((ps_id.to_string(), activity));
        debug!(ps_id, ?activity, stacked, "Added to the play stack");
        self.notify_added(ps_id);

        self.adding_render.set(false);
        true
    }

    /// Removes `ps_id` from the stack.
    ///
    /// `Immediate` removes synchronously and cancels a pending hold
    /// tracking this id. `Normal`/`Later` remove synchronously when the
    /// entry is a stacked foreground (unless an expect-speech turn is
    /// pending on the stacked context), and otherwise arm the hold timer.
    /// Unknown ids are safe no-ops returning `false`.
    pub fn remove(&self, ps_id: &str, mode: RemoveMode) -> bool {
        if ps_id.is_empty() {
            warn!("The play service id is empty");
            return false;
        }

        let known = self.entries.borrow().iter().any(|(id, _)| id == ps_id);
        if !known {
            warn!(ps_id, "Not present in the play stack");
            return false;
        }

        match mode {
            RemoveMode::Immediate => {
                if self.held_id.borrow().as_deref() == Some(ps_id) {
                    self.cancel_hold();
                }
                self.remove_from_container(ps_id);
            }
            RemoveMode::Normal | RemoveMode::Later => {
                let stacked_entry = self.is_stacked_id(ps_id);
                let expect_speech_pending =
                    self.is_stacked.get() && self.is_expect_speech.get();

                if stacked_entry && !expect_speech_pending {
                    // Stacked foreground teardown must not flicker behind a
                    // hold delay; the media background stays.
                    self.is_stacked.set(false);
                    self.remove_from_container(ps_id);
                } else {
                    self.arm_hold_timer(ps_id, mode);
                }
            }
        }

        true
    }

    fn arm_hold_timer(&self, ps_id: &str, mode: RemoveMode) {
        let hold_times = self.hold_times.get();
        let interval = match mode {
            RemoveMode::Later => hold_times.long,
            _ => hold_times.normal,
        };

        let weak_self = self.weak_self.clone();
        let target = ps_id.to_string();
        self.timer.set_callback(Rc::new(move || {
            let Some(ledger) = weak_self.upgrade() else {
                return;
            };
            debug!(ps_id = %target, "Hold expired");
            ledger.held_id.borrow_mut().take();
            ledger.has_long_timer.set(false);
            ledger.has_holding.set(false);
            ledger.remove_from_container(&target);
        }));
        self.timer.set_interval(interval);
        self.timer.start();

        *self.held_id.borrow_mut() = Some(ps_id.to_string());
        self.has_long_timer.set(mode == RemoveMode::Later);
        debug!(
            ps_id,
            ?mode,
            interval_secs = interval.as_secs(),
            "Hold timer armed"
        );
    }

    fn cancel_hold(&self) {
        self.timer.stop();
        self.held_id.borrow_mut().take();
        self.has_long_timer.set(false);
        self.has_holding.set(false);
    }

    // Layering: a stacked newcomer displaces the single non-media entry; a
    // non-stacked newcomer clears the whole ledger.
    fn handle_previous_stack(&self, stacked: bool) {
        let removed: Vec<String> = {
            let mut entries = self.entries.borrow_mut();
            if stacked {
                let victims = entries
                    .iter()
                    .filter(|(_, activity)| *activity != PlayActivity::Media)
                    .map(|(id, _)| id.clone())
                    .collect();
                entries.retain(|(_, activity)| *activity == PlayActivity::Media);
                victims
            } else {
                let victims = entries.iter().map(|(id, _)| id.clone()).collect();
                entries.clear();
                victims
            }
        };

        let held_displaced = {
            let held_id = self.held_id.borrow();
            held_id
                .as_ref()
                .map(|id| removed.contains(id))
                .unwrap_or(false)
        };
        if held_displaced {
            self.cancel_hold();
        }

        for ps_id in removed {
            self.notify_removed(&ps_id);
        }
    }

    fn remove_from_container(&self, ps_id: &str) {
        let removed = {
            let mut entries = self.entries.borrow_mut();
            let before = entries.len();
            entries.retain(|(id, _)| id != ps_id);
            before != entries.len()
        };

        if removed {
            debug!(ps_id, "Removed from the play stack");
            self.notify_removed(ps_id);
        }
    }

    // ========================================================================
    // Hold control
    // ========================================================================

    /// Pauses a pending hold timer because a new turn is about to begin.
    pub fn stop_holding(&self) {
        if self.timer.is_started() {
            self.timer.stop();
            self.has_holding.set(true);
        }
    }

    /// Resumes a hold paused by [`stop_holding`](Self::stop_holding).
    ///
    /// When the paused context was itself an expect-speech + stacked
    /// situation the expiry fires immediately instead of restarting —
    /// queued work must not silently expire while a follow-up turn is
    /// expected.
    pub fn reset_holding(&self) {
        if !self.has_holding.get() {
            return;
        }

        if self.is_expect_speech.get() && self.is_stacked.get() {
            debug!("Expect-speech on a stacked context; firing hold expiry now");
            self.timer.fire_now();
        } else {
            self.timer.start();
        }
        self.has_holding.set(false);
    }

    /// Stops the hold timer and drops the interrupted-hold bookkeeping.
    pub fn clear_holding(&self) {
        self.cancel_hold();
    }

    /// Whether the hold timer is currently armed.
    pub fn is_active_holding(&self) -> bool {
        self.timer.is_started()
    }

    // ========================================================================
    // Queries
    // ========================================================================

    /// The activity `ps_id` is classified as, or `PlayActivity::None` for
    /// unknown ids.
    pub fn activity(&self, ps_id: &str) -> PlayActivity {
        self.entries
            .borrow()
            .iter()
            .find(|(id, _)| id == ps_id)
            .map(|(_, activity)| *activity)
            .unwrap_or(PlayActivity::None)
    }

    /// Live ids, most recently added first.
    pub fn items(&self) -> Vec<String> {
        self.entries
            .borrow()
            .iter()
            .rev()
            .map(|(id, _)| id.clone())
            .collect()
    }

    /// Whether an in-progress `add` carries visual-rendering payload.
    ///
    /// Meaningful to listeners reacting to the removal notifications the
    /// add triggers: it tells them whether a visual context is about to
    /// replace the one being torn down.
    pub fn has_adding_play_stack(&self) -> bool {
        self.adding_render.get()
    }

    /// Whether adding `groups` now would stack over live media.
    pub fn is_stacked_condition(&self, groups: &DirectiveGroups) -> bool {
        self.is_stacked_activity(groups.activity())
    }

    /// Whether the most recent add stacked over media.
    pub fn is_stacked(&self) -> bool {
        self.is_stacked.get()
    }

    /// Whether the most recent add announced a follow-up user turn.
    pub fn is_expect_speech(&self) -> bool {
        self.is_expect_speech.get()
    }

    fn is_stacked_activity(&self, activity: PlayActivity) -> bool {
        activity != PlayActivity::Media && self.has_media_entry()
    }

    fn is_stacked_id(&self, ps_id: &str) -> bool {
        let activity = self.activity(ps_id);
        activity != PlayActivity::None
            && activity != PlayActivity::Media
            && self.has_media_entry()
    }

    fn has_media_entry(&self) -> bool {
        self.entries
            .borrow()
            .iter()
            .any(|(_, activity)| *activity == PlayActivity::Media)
    }

    // ========================================================================
    // Configuration & teardown
    // ========================================================================

    pub fn set_hold_times(&self, hold_times: HoldTimes) {
        self.hold_times.set(hold_times);
    }

    pub fn hold_times(&self) -> HoldTimes {
        self.hold_times.get()
    }

    pub fn reset_hold_times(&self) {
        self.hold_times.set(HoldTimes::default());
    }

    /// Full teardown: stops the timer, clears every flag and drops every
    /// entry without listener callbacks.
    pub fn reset(&self) {
        debug!("Resetting the play stack");
        self.cancel_hold();
        self.entries.borrow_mut().clear();
        self.is_expect_speech.set(false);
        self.is_stacked.set(false);
        self.adding_render.set(false);
    }

    // ========================================================================
    // Notification
    // ========================================================================

    fn live_listeners(&self) -> Vec<Rc<dyn PlayStackListener>> {
        let mut listeners = self.listeners.borrow_mut();
        listeners.retain(|listener| listener.strong_count() > 0);
        listeners
            .iter()
            .filter_map(Weak::upgrade)
            .collect()
    }

    fn notify_added(&self, ps_id: &str) {
        for listener in self.live_listeners() {
            listener.on_stack_added(ps_id);
        }
    }

    fn notify_removed(&self, ps_id: &str) {
        for listener in self.live_listeners() {
            listener.on_stack_removed(ps_id);
        }
    }
}
