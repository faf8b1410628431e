//! Per-context readiness and teardown barrier.

use crate::directive::{DirectiveGroups, PlayActivity};
use crate::stack::{PlayStackLedger, PlayStackListener, RemoveMode};
use serde::{Deserialize, Serialize};
use std::any::Any;
use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::rc::{Rc, Weak};
use tracing::{debug, info, warn};

/// Barrier state of one `(ps_id, capability)` participant.
///
/// Absence of a participant entry is the implicit "not participating"
/// state; queries return `Option<SyncState>`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SyncState {
    /// Registered by `prepare_sync`, not yet acknowledged.
    Prepared,
    /// Acknowledged readiness.
    Synced,
    /// Joined after the initial all-participants barrier completed.
    Appending,
    /// The context was torn down.
    Released,
}

/// Opaque per-participant payload supplied at `start_sync`.
///
/// Owned by the registering capability; the coordinator holds a shared
/// handle while the participant is registered and only forwards change
/// notifications, never interpreting the value.
pub type ExtraData = Rc<dyn Any>;

/// Callbacks a capability registers to follow its contexts.
///
/// `on_sync_state` and `on_data_changed` are delivered only to the
/// listener of the affected participant; `on_stack_changed` goes to every
/// registered listener. All callbacks run synchronously after the
/// coordinator finished mutating, so re-entrant calls are safe.
pub trait PlaySyncListener {
    fn on_sync_state(&self, ps_id: &str, state: SyncState, extra: Option<&ExtraData>);

    fn on_data_changed(&self, ps_id: &str, previous: Option<&ExtraData>, current: &ExtraData) {
        let _ = (ps_id, previous, current);
    }

    fn on_stack_changed(&self, added: Option<&str>, removed: Option<&str>) {
        let _ = (added, removed);
    }
}

struct Participant {
    capability: String,
    state: SyncState,
    extra: Option<ExtraData>,
}

/// All-or-nothing readiness barrier per play-service context, gated by
/// [`PlayStackLedger`] membership.
///
/// A context is rendered by several capabilities at once — audio playback,
/// narration, an on-screen card. None of them may treat it as live until
/// all relevant ones acknowledged readiness, and it must not be torn down
/// until all of them released it. The coordinator owns one participant
/// container per live ps_id and delegates the actual add/remove to the
/// ledger, which reports removals back so containers die exactly with
/// their stack entries.
pub struct PlaySyncCoordinator {
    ledger: Rc<PlayStackLedger>,
    registry: RefCell<Vec<String>>,
    listeners: RefCell<Vec<(String, Weak<dyn PlaySyncListener>)>>,
    containers: RefCell<HashMap<String, Vec<Participant>>>,
    postpone: Cell<bool>,
    pending_release: RefCell<Option<Box<dyn FnOnce()>>>,
}

impl PlaySyncCoordinator {
    /// Creates a coordinator over `ledger` with the given participant
    /// registry, registering itself as the ledger's removal listener.
    pub fn new(ledger: Rc<PlayStackLedger>, capabilities: Vec<String>) -> Rc<Self> {
        let coordinator = Rc::new(Self {
            ledger: Rc::clone(&ledger),
            registry: RefCell::new(capabilities),
            listeners: RefCell::new(Vec::new()),
            containers: RefCell::new(HashMap::new()),
            postpone: Cell::new(false),
            pending_release: RefCell::new(None),
        });

        ledger.add_listener(&(Rc::clone(&coordinator) as Rc<dyn PlayStackListener>));
        coordinator
    }

    // ========================================================================
    // Listener & registry management
    // ========================================================================

    /// Registers `listener` as the receiver for `capability`'s sync
    /// notifications. One listener per capability name.
    pub fn add_listener(&self, capability: &str, listener: &Rc<dyn PlaySyncListener>) {
        if capability.is_empty() {
            warn!("The capability name is empty");
            return;
        }

        let mut listeners = self.listeners.borrow_mut();
        if listeners.iter().any(|(name, _)| name == capability) {
            warn!(capability, "Sync listener already registered");
            return;
        }

        listeners.push((capability.to_string(), Rc::downgrade(listener)));
    }

    pub fn remove_listener(&self, capability: &str) {
        if capability.is_empty() {
            warn!("The capability name is empty");
            return;
        }

        self.listeners
            .borrow_mut()
            .retain(|(name, _)| name != capability);
    }

    pub fn listener_count(&self) -> usize {
        let mut listeners = self.listeners.borrow_mut();
        listeners.retain(|(_, listener)| listener.strong_count() > 0);
        listeners.len()
    }

    /// Extends the participant registry beyond the configured default.
    pub fn register_capability_for_sync(&self, capability: &str) {
        if capability.is_empty() {
            warn!("The capability name is empty");
            return;
        }

        let mut registry = self.registry.borrow_mut();
        if !registry.iter().any(|name| name == capability) {
            debug!(capability, "Capability registered for sync");
            registry.push(capability.to_string());
        }
    }

    // ========================================================================
    // Barrier protocol
    // ========================================================================

    /// Opens (or extends) the barrier for `ps_id`.
    ///
    /// A newly added context gets a fresh container: every declared
    /// capability present in the registry becomes a `Prepared` participant
    /// and its listener is notified. When the ledger rejects the add (the
    /// context already lives), declared capabilities not yet participating
    /// join as `Appending` late-comers instead.
    pub fn prepare_sync(&self, ps_id: &str, groups: &DirectiveGroups) {
        if ps_id.is_empty() || groups.is_empty() {
            warn!("The play service id or directive groups are empty");
            return;
        }

        if self.ledger.add(ps_id, groups) {
            let participants = self.participants_of(groups);
            if participants.is_empty() {
                warn!(ps_id, "No registered capability participates in this context");
            }

            self.containers.borrow_mut().insert(
                ps_id.to_string(),
                participants
                    .iter()
                    .map(|capability| Participant {
                        capability: capability.clone(),
                        state: SyncState::Prepared,
                        extra: None,
                    })
                    .collect(),
            );
            debug!(ps_id, ?participants, "Play sync prepared");

            for capability in &participants {
                if let Some(listener) = self.listener_for(capability) {
                    listener.on_sync_state(ps_id, SyncState::Prepared, None);
                }
            }
        } else {
            self.append_sync(ps_id, groups);
        }
    }

    fn append_sync(&self, ps_id: &str, groups: &DirectiveGroups) {
        let mut containers = self.containers.borrow_mut();
        let Some(container) = containers.get_mut(ps_id) else {
            debug!(ps_id, "No container to append to");
            return;
        };

        let registry = self.registry.borrow();
        for capability in self.declared_in(groups, &registry) {
            if !container
                .iter()
                .any(|participant| participant.capability == capability)
            {
                debug!(ps_id, capability = %capability, "Joined after the initial barrier");
                container.push(Participant {
                    capability,
                    state: SyncState::Appending,
                    extra: None,
                });
            }
        }
    }

    /// Acknowledges `capability`'s readiness for `ps_id`.
    ///
    /// A supplied `extra` replaces the stored payload, notifying the
    /// participant's listener of the change when one was already present.
    /// Late joiners (`Appending`) are notified individually; everyone else
    /// waits for the full barrier, which notifies every participant with
    /// `Synced` exactly once.
    pub fn start_sync(&self, ps_id: &str, capability: &str, extra: Option<ExtraData>) {
        if ps_id.is_empty() || capability.is_empty() {
            warn!("The play service id or capability name is empty");
            return;
        }

        let mut data_change: Option<(Option<ExtraData>, ExtraData)> = None;
        let mut notifications: Vec<(String, Option<ExtraData>)> = Vec::new();

        {
            let mut containers = self.containers.borrow_mut();
            let Some(container) = containers.get_mut(ps_id) else {
                debug!(ps_id, "Not prepared for sync");
                return;
            };
            let Some(index) = container
                .iter()
                .position(|participant| participant.capability == capability)
            else {
                debug!(ps_id, capability, "Not a participant");
                return;
            };

            if let Some(new_extra) = extra {
                let previous = container[index].extra.take();
                if previous.is_some() {
                    data_change = Some((previous.clone(), Rc::clone(&new_extra)));
                }
                container[index].extra = Some(new_extra);
            }

            match container[index].state {
                SyncState::Synced => {}
                SyncState::Appending => {
                    container[index].state = SyncState::Synced;
                    notifications
                        .push((capability.to_string(), container[index].extra.clone()));
                    debug!(ps_id, capability, "Late joiner synced");
                }
                _ => {
                    container[index].state = SyncState::Synced;
                    if container
                        .iter()
                        .all(|participant| participant.state == SyncState::Synced)
                    {
                        notifications.extend(container.iter().map(|participant| {
                            (participant.capability.clone(), participant.extra.clone())
                        }));
                        info!(ps_id, "All participants synced");
                    }
                }
            }
        }

        if let Some((previous, current)) = data_change {
            if let Some(listener) = self.listener_for(capability) {
                listener.on_data_changed(ps_id, previous.as_ref(), &current);
            }
        }

        for (participant, extra) in notifications {
            if let Some(listener) = self.listener_for(&participant) {
                listener.on_sync_state(ps_id, SyncState::Synced, extra.as_ref());
            }
        }
    }

    /// Withdraws `capability` from the barrier outright (it decided not to
    /// participate after all).
    pub fn cancel_sync(&self, ps_id: &str, capability: &str) {
        if ps_id.is_empty() || capability.is_empty() {
            warn!("The play service id or capability name is empty");
            return;
        }

        let mut containers = self.containers.borrow_mut();
        let Some(container) = containers.get_mut(ps_id) else {
            debug!(ps_id, "Not prepared for sync");
            return;
        };

        let before = container.len();
        container.retain(|participant| participant.capability != capability);
        if container.len() != before {
            debug!(ps_id, capability, "Sync canceled");
        }
    }

    /// Releases the context with the normal grace period.
    pub fn release_sync(&self, ps_id: &str, capability: &str) {
        self.release_sync_by(ps_id, capability, RemoveMode::Normal);
    }

    /// Releases the context with the long grace period.
    pub fn release_sync_later(&self, ps_id: &str, capability: &str) {
        self.release_sync_by(ps_id, capability, RemoveMode::Later);
    }

    /// Releases the context synchronously.
    pub fn release_sync_immediately(&self, ps_id: &str, capability: &str) {
        self.release_sync_by(ps_id, capability, RemoveMode::Immediate);
    }

    fn release_sync_by(&self, ps_id: &str, capability: &str, mode: RemoveMode) {
        if ps_id.is_empty() || capability.is_empty() {
            warn!("The play service id or capability name is empty");
            return;
        }

        let participating = {
            let containers = self.containers.borrow();
            containers.get(ps_id).is_some_and(|container| {
                container.iter().any(|participant| {
                    participant.capability == capability
                        && participant.state != SyncState::Released
                })
            })
        };

        if !participating {
            debug!(ps_id, capability, "No participant to release");
            return;
        }

        let ledger = Rc::clone(&self.ledger);
        let target = ps_id.to_string();
        let release = move || {
            ledger.stop_holding();
            ledger.remove(&target, mode);
        };

        if self.postpone.get() {
            debug!(ps_id, "Release postponed");
            *self.pending_release.borrow_mut() = Some(Box::new(release));
        } else {
            release();
        }
    }

    /// Tears down every live context synchronously.
    pub fn release_sync_unconditionally(&self) {
        info!("Releasing all play sync contexts unconditionally");

        {
            let containers = self.containers.borrow();
            for (ps_id, container) in containers.iter() {
                for participant in container {
                    if matches!(
                        participant.state,
                        SyncState::Prepared | SyncState::Appending
                    ) {
                        warn!(
                            ps_id = %ps_id,
                            capability = %participant.capability,
                            "Releasing a participant that never reached sync"
                        );
                    }
                }
            }
        }

        self.ledger.clear_holding();
        for ps_id in self.ledger.items() {
            self.ledger.remove(&ps_id, RemoveMode::Immediate);
        }

        self.postpone.set(false);
        self.pending_release.borrow_mut().take();
    }

    // ========================================================================
    // Postponed release
    // ========================================================================

    /// Defers releases issued from now on into a single stored step.
    ///
    /// Lets a caller batch release requests arriving during one synchronous
    /// processing pass and avoid intermediate teardown flicker.
    pub fn postpone_release(&self) {
        self.postpone.set(true);
    }

    /// Ends the postpone and runs the stored release, if any, once.
    pub fn continue_release(&self) {
        self.postpone.set(false);

        let pending = self.pending_release.borrow_mut().take();
        if let Some(release) = pending {
            debug!("Running postponed release");
            release();
        }
    }

    pub fn has_postponed_release(&self) -> bool {
        self.postpone.get()
    }

    // ========================================================================
    // Hold passthrough
    // ========================================================================

    pub fn stop_holding(&self) {
        self.ledger.stop_holding();
    }

    pub fn reset_holding(&self) {
        self.ledger.reset_holding();
    }

    pub fn clear_holding(&self) {
        self.ledger.clear_holding();
    }

    // ========================================================================
    // Queries
    // ========================================================================

    pub fn sync_state(&self, ps_id: &str, capability: &str) -> Option<SyncState> {
        let containers = self.containers.borrow();
        containers.get(ps_id).and_then(|container| {
            container
                .iter()
                .find(|participant| participant.capability == capability)
                .map(|participant| participant.state)
        })
    }

    pub fn has_container(&self, ps_id: &str) -> bool {
        self.containers.borrow().contains_key(ps_id)
    }

    /// Whether `ps_id` is live with the given activity.
    pub fn has_activity(&self, ps_id: &str, activity: PlayActivity) -> bool {
        !ps_id.is_empty() && self.ledger.activity(ps_id) == activity
    }

    /// Whether a visual context is about to replace the one being removed.
    ///
    /// Meaningful inside `on_sync_state(Released)` / `on_stack_changed`
    /// callbacks triggered by an in-progress add.
    pub fn has_next_play_stack(&self) -> bool {
        self.ledger.has_adding_play_stack()
    }

    /// Live ids, most recently added first.
    pub fn play_stack_items(&self) -> Vec<String> {
        self.ledger.items()
    }

    /// Whether the previous dialog still needs handling: the current
    /// directive stacks onto live media and the previous one does not
    /// expect a follow-up turn.
    pub fn is_condition_to_handle_prev_dialog(
        &self,
        previous: &DirectiveGroups,
        current: &DirectiveGroups,
    ) -> bool {
        self.ledger.is_stacked_condition(current) && !previous.expects_speech()
    }

    // ========================================================================
    // Teardown
    // ========================================================================

    /// Silently drops every container, pending release and ledger entry.
    /// Listeners stay registered.
    pub fn clear(&self) {
        debug!("Clearing all play sync state");
        self.containers.borrow_mut().clear();
        self.postpone.set(false);
        self.pending_release.borrow_mut().take();
        self.ledger.reset();
    }

    /// [`clear`](Self::clear) plus hold-time restore to defaults.
    pub fn reset(&self) {
        self.clear();
        self.ledger.reset_hold_times();
    }

    // ========================================================================
    // Internal helpers
    // ========================================================================

    fn participants_of(&self, groups: &DirectiveGroups) -> Vec<String> {
        let registry = self.registry.borrow();
        self.declared_in(groups, &registry)
    }

    fn declared_in(&self, groups: &DirectiveGroups, registry: &[String]) -> Vec<String> {
        groups
            .capabilities()
            .into_iter()
            .filter(|capability| registry.iter().any(|name| name == capability))
            .collect()
    }

    fn listener_for(&self, capability: &str) -> Option<Rc<dyn PlaySyncListener>> {
        let listeners = self.listeners.borrow();
        listeners
            .iter()
            .find(|(name, _)| name == capability)
            .and_then(|(_, listener)| listener.upgrade())
    }

    fn live_listeners(&self) -> Vec<Rc<dyn PlaySyncListener>> {
        let mut listeners = self.listeners.borrow_mut();
        listeners.retain(|(_, listener)| listener.strong_count() > 0);
        listeners
            .iter()
            .filter_map(|(_, listener)| listener.upgrade())
            .collect()
    }

    fn notify_stack_changed(&self, added: Option<&str>, removed: Option<&str>) {
        for listener in self.live_listeners() {
            listener.on_stack_changed(added, removed);
        }
    }
}

impl PlayStackListener for PlaySyncCoordinator {
    fn on_stack_added(&self, ps_id: &str) {
        self.notify_stack_changed(Some(ps_id), None);
    }

    fn on_stack_removed(&self, ps_id: &str) {
        // Drop the container before notifying so a listener reacting to
        // Released can immediately prepare the same id afresh.
        let container = self.containers.borrow_mut().remove(ps_id);

        if let Some(participants) = container {
            debug!(ps_id, "Releasing sync container");
            for participant in &participants {
                if participant.state == SyncState::Released {
                    continue;
                }
                if let Some(listener) = self.listener_for(&participant.capability) {
                    listener.on_sync_state(
                        ps_id,
                        SyncState::Released,
                        participant.extra.as_ref(),
                    );
                }
            }
        }

        self.notify_stack_changed(None, Some(ps_id));
    }
}
