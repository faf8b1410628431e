//! # Session Timer
//!
//! Single-shot delayed-callback abstraction used by the play-stack hold and
//! expiry logic.
//!
//! ## Overview
//!
//! The session core runs on one thread and its only source of re-entry is a
//! timer firing: the callback invokes the same synchronous APIs from the
//! loop thread, never from a separate timer thread. The [`SessionTimer`]
//! trait captures that contract as an injectable dependency:
//!
//! - [`TokioTimer`] arms the callback on the current-thread task set
//!   (`tokio::task::spawn_local`), so the callback runs on the owning
//!   thread when the sleep elapses.
//! - [`ManualTimer`] is a deterministic fake for tests: it never fires on
//!   its own; the test drives it with [`ManualTimer::elapse`].
//!
//! ## Usage
//!
//! ```ignore
//! use core_runtime::timer::{ManualTimer, SessionTimer};
//! use std::rc::Rc;
//! use std::time::Duration;
//!
//! let timer = ManualTimer::new();
//! timer.set_interval(Duration::from_secs(7));
//! timer.set_callback(Rc::new(|| println!("hold expired")));
//! timer.start();
//! timer.elapse(); // deterministic fire
//! ```

use std::cell::{Cell, RefCell};
use std::rc::Rc;
use std::time::Duration;
use tracing::debug;

/// Callback invoked when a timer elapses.
///
/// Stored as `Rc<dyn Fn()>` so a firing timer can clone the callback out
/// and release all interior borrows before invoking it; the callback is
/// free to re-enter the component that armed the timer.
pub type TimerCallback = Rc<dyn Fn()>;

/// Single-shot delayed-callback contract.
///
/// Implementations are not thread-safe by design: the whole session core is
/// single-threaded and timers must fire on the owning thread.
pub trait SessionTimer {
    /// Replaces the callback invoked when the timer elapses.
    fn set_callback(&self, callback: TimerCallback);

    /// Sets the delay used by the next `start`.
    fn set_interval(&self, interval: Duration);

    /// Arms the timer. A running timer is rearmed from scratch.
    fn start(&self);

    /// Disarms the timer without invoking the callback.
    fn stop(&self);

    /// Whether the timer is currently armed.
    fn is_started(&self) -> bool;

    /// Disarms the timer and invokes the callback synchronously.
    fn fire_now(&self);
}

// ============================================================================
// Tokio implementation
// ============================================================================

struct TokioTimerState {
    interval: Cell<Duration>,
    callback: RefCell<Option<TimerCallback>>,
    started: Cell<bool>,
    // Invalidates sleeps armed by earlier start() calls.
    generation: Cell<u64>,
    handle: RefCell<Option<tokio::task::JoinHandle<()>>>,
}

/// [`SessionTimer`] backed by `tokio::time::sleep` on the current-thread
/// task set.
///
/// `start` must be called from within a `tokio::task::LocalSet` (or a
/// current-thread runtime driving one); the armed callback runs on that
/// same thread.
pub struct TokioTimer {
    state: Rc<TokioTimerState>,
}

impl TokioTimer {
    pub fn new() -> Rc<Self> {
        Rc::new(Self {
            state: Rc::new(TokioTimerState {
                interval: Cell::new(Duration::ZERO),
                callback: RefCell::new(None),
                started: Cell::new(false),
                generation: Cell::new(0),
                handle: RefCell::new(None),
            }),
        })
    }
}

impl SessionTimer for TokioTimer {
    fn set_callback(&self, callback: TimerCallback) {
        *self.state.callback.borrow_mut() = Some(callback);
    }

    fn set_interval(&self, interval: Duration) {
        self.state.interval.set(interval);
    }

    fn start(&self) {
        self.stop();

        let generation = self.state.generation.get();
        let interval = self.state.interval.get();
        self.state.started.set(true);

        debug!(interval_ms = interval.as_millis() as u64, "Timer armed");

        let weak = Rc::downgrade(&self.state);
        let handle = tokio::task::spawn_local(async move {
            tokio::time::sleep(interval).await;

            let Some(state) = weak.upgrade() else {
                return;
            };

            if state.generation.get() != generation || !state.started.get() {
                return;
            }

            state.started.set(false);
            let callback = state.callback.borrow().clone();
            if let Some(callback) = callback {
                callback();
            }
        });

        *self.state.handle.borrow_mut() = Some(handle);
    }

    fn stop(&self) {
        self.state.started.set(false);
        self.state.generation.set(self.state.generation.get() + 1);

        if let Some(handle) = self.state.handle.borrow_mut().take() {
            handle.abort();
        }
    }

    fn is_started(&self) -> bool {
        self.state.started.get()
    }

    fn fire_now(&self) {
        self.stop();

        let callback = self.state.callback.borrow().clone();
        if let Some(callback) = callback {
            callback();
        }
    }
}

// ============================================================================
// Deterministic fake for tests
// ============================================================================

/// Deterministic [`SessionTimer`] that only fires when the test calls
/// [`ManualTimer::elapse`].
///
/// Exported so the play-stack and play-sync test suites (and embedders'
/// tests) can drive hold/expiry behavior without sleeping.
#[derive(Default)]
pub struct ManualTimer {
    interval: Cell<Duration>,
    callback: RefCell<Option<TimerCallback>>,
    started: Cell<bool>,
    start_count: Cell<usize>,
}

impl ManualTimer {
    pub fn new() -> Rc<Self> {
        Rc::new(Self::default())
    }

    /// Simulates the armed delay elapsing: disarms the timer and invokes
    /// the callback. No-op when the timer is not armed.
    pub fn elapse(&self) {
        if !self.started.get() {
            return;
        }

        self.started.set(false);
        let callback = self.callback.borrow().clone();
        if let Some(callback) = callback {
            callback();
        }
    }

    /// The interval most recently configured.
    pub fn interval(&self) -> Duration {
        self.interval.get()
    }

    /// How many times `start` has been called.
    pub fn start_count(&self) -> usize {
        self.start_count.get()
    }
}

impl SessionTimer for ManualTimer {
    fn set_callback(&self, callback: TimerCallback) {
        *self.callback.borrow_mut() = Some(callback);
    }

    fn set_interval(&self, interval: Duration) {
        self.interval.set(interval);
    }

    fn start(&self) {
        self.started.set(true);
        self.start_count.set(self.start_count.get() + 1);
    }

    fn stop(&self) {
        self.started.set(false);
    }

    fn is_started(&self) -> bool {
        self.started.get()
    }

    fn fire_now(&self) {
        self.stop();

        let callback = self.callback.borrow().clone();
        if let Some(callback) = callback {
            callback();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_manual_timer_elapse_fires_once() {
        let timer = ManualTimer::new();
        let fired = Rc::new(Cell::new(0));

        let fired_probe = Rc::clone(&fired);
        timer.set_callback(Rc::new(move || {
            fired_probe.set(fired_probe.get() + 1);
        }));
        timer.set_interval(Duration::from_secs(7));
        timer.start();

        assert!(timer.is_started());
        assert_eq!(timer.interval(), Duration::from_secs(7));

        timer.elapse();
        assert_eq!(fired.get(), 1);
        assert!(!timer.is_started());

        // Disarmed: further elapse calls do nothing
        timer.elapse();
        assert_eq!(fired.get(), 1);
    }

    #[test]
    fn test_manual_timer_stop_suppresses_fire() {
        let timer = ManualTimer::new();
        let fired = Rc::new(Cell::new(0));

        let fired_probe = Rc::clone(&fired);
        timer.set_callback(Rc::new(move || {
            fired_probe.set(fired_probe.get() + 1);
        }));
        timer.start();
        timer.stop();
        timer.elapse();

        assert_eq!(fired.get(), 0);
        assert_eq!(timer.start_count(), 1);
    }

    #[test]
    fn test_manual_timer_fire_now() {
        let timer = ManualTimer::new();
        let fired = Rc::new(Cell::new(0));

        let fired_probe = Rc::clone(&fired);
        timer.set_callback(Rc::new(move || {
            fired_probe.set(fired_probe.get() + 1);
        }));
        timer.start();
        timer.fire_now();

        assert_eq!(fired.get(), 1);
        assert!(!timer.is_started());
    }

    #[test]
    fn test_manual_timer_callback_can_rearm() {
        // A callback re-entering start() must observe a disarmed timer.
        let timer = ManualTimer::new();
        let observed_started = Rc::new(Cell::new(true));

        let timer_probe = Rc::downgrade(&timer);
        let observed_probe = Rc::clone(&observed_started);
        timer.set_callback(Rc::new(move || {
            if let Some(timer) = timer_probe.upgrade() {
                observed_probe.set(timer.is_started());
                timer.start();
            }
        }));
        timer.start();
        timer.elapse();

        assert!(!observed_started.get());
        assert!(timer.is_started());
    }

    #[tokio::test]
    async fn test_tokio_timer_fires_on_local_set() {
        let local = tokio::task::LocalSet::new();
        local
            .run_until(async {
                let timer = TokioTimer::new();
                let fired = Rc::new(Cell::new(0));

                let fired_probe = Rc::clone(&fired);
                timer.set_callback(Rc::new(move || {
                    fired_probe.set(fired_probe.get() + 1);
                }));
                timer.set_interval(Duration::from_millis(5));
                timer.start();
                assert!(timer.is_started());

                tokio::time::sleep(Duration::from_millis(50)).await;

                assert_eq!(fired.get(), 1);
                assert!(!timer.is_started());
            })
            .await;
    }

    #[tokio::test]
    async fn test_tokio_timer_stop_cancels_pending_fire() {
        let local = tokio::task::LocalSet::new();
        local
            .run_until(async {
                let timer = TokioTimer::new();
                let fired = Rc::new(Cell::new(0));

                let fired_probe = Rc::clone(&fired);
                timer.set_callback(Rc::new(move || {
                    fired_probe.set(fired_probe.get() + 1);
                }));
                timer.set_interval(Duration::from_millis(5));
                timer.start();
                timer.stop();

                tokio::time::sleep(Duration::from_millis(50)).await;

                assert_eq!(fired.get(), 0);
            })
            .await;
    }

    #[tokio::test]
    async fn test_tokio_timer_restart_uses_latest_arm_only() {
        let local = tokio::task::LocalSet::new();
        local
            .run_until(async {
                let timer = TokioTimer::new();
                let fired = Rc::new(Cell::new(0));

                let fired_probe = Rc::clone(&fired);
                timer.set_callback(Rc::new(move || {
                    fired_probe.set(fired_probe.get() + 1);
                }));
                timer.set_interval(Duration::from_millis(5));
                timer.start();
                timer.start();

                tokio::time::sleep(Duration::from_millis(50)).await;

                assert_eq!(fired.get(), 1);
            })
            .await;
    }
}
