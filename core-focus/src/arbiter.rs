//! Per-resource focus ownership stacks.

use crate::types::{
    FocusClaim, FocusEvent, ResourceKind, StealVerdict, UnfocusDisposition, UnfocusMode,
};
use std::cell::RefCell;
use tracing::{debug, info, warn};

struct FocusEntry {
    claim: FocusClaim,
    event: Option<FocusEvent>,
}

/// Priority-ordered, stealable ownership stack per [`ResourceKind`].
///
/// The front entry of a stack is the current holder; entries behind it are
/// pending claims sorted ascending by priority value with stable insertion
/// order for equal priorities. A claim appears at most once per stack.
///
/// All methods are synchronous and non-blocking. Handler callbacks are
/// invoked only after the stacks have been mutated, so a callback may
/// re-enter the arbiter.
#[derive(Default)]
pub struct FocusArbiter {
    stacks: RefCell<[Vec<FocusEntry>; ResourceKind::COUNT]>,
}

// Stable insert: equal priorities keep their arrival order.
fn insert_by_priority(stack: &mut Vec<FocusEntry>, entry: FocusEntry) {
    let position = stack
        .iter()
        .position(|existing| existing.claim.priority() > entry.claim.priority())
        .unwrap_or(stack.len());
    stack.insert(position, entry);
}

impl FocusArbiter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests ownership of `resource` for `claim`.
    ///
    /// An empty stack grants immediately. Otherwise the current holder is
    /// asked for permission via `on_steal_request`: on `Allow` the holder
    /// is unfocused (`Judge`) and may pause back into the stack while the
    /// requester takes over; on `Reject` the requester is queued at its
    /// priority-sorted position. Re-requesting is idempotent — any earlier
    /// entry for the same claim is dropped first.
    pub fn request(&self, claim: &FocusClaim, resource: ResourceKind, event: Option<FocusEvent>) {
        info!(
            name = claim.name(),
            priority = %claim.priority(),
            resource = %resource,
            "Focus requested"
        );

        let holder = {
            let stacks = self.stacks.borrow();
            stacks[resource.index()]
                .first()
                .map(|entry| (entry.claim.clone(), entry.event.clone()))
        };

        let Some((holder_claim, holder_event)) = holder else {
            {
                let mut stacks = self.stacks.borrow_mut();
                stacks[resource.index()].push(FocusEntry {
                    claim: claim.clone(),
                    event: event.clone(),
                });
            }
            info!(name = claim.name(), resource = %resource, "Focus granted");
            claim.handler().on_focus(event.as_ref());
            return;
        };

        let verdict = holder_claim
            .handler()
            .on_steal_request(holder_event.as_ref(), claim);

        if verdict == StealVerdict::Allow {
            debug!(holder = holder_claim.name(), "Steal allowed");

            let disposition = holder_claim
                .handler()
                .on_unfocus(UnfocusMode::Judge, holder_event.as_ref());

            {
                let mut stacks = self.stacks.borrow_mut();
                let stack = &mut stacks[resource.index()];

                if let Some(position) = stack
                    .iter()
                    .position(|entry| entry.claim.name() == holder_claim.name())
                {
                    let displaced = stack.remove(position);
                    if disposition == UnfocusDisposition::Pause {
                        debug!(holder = holder_claim.name(), "Holder paused, requeued by priority");
                        insert_by_priority(stack, displaced);
                    }
                }

                stack.retain(|entry| entry.claim.name() != claim.name());
                stack.insert(
                    0,
                    FocusEntry {
                        claim: claim.clone(),
                        event: event.clone(),
                    },
                );
            }

            info!(name = claim.name(), resource = %resource, "Focus granted");
            claim.handler().on_focus(event.as_ref());
        } else {
            debug!(
                holder = holder_claim.name(),
                requester = claim.name(),
                "Steal rejected, requester queued by priority"
            );

            let mut stacks = self.stacks.borrow_mut();
            let stack = &mut stacks[resource.index()];
            stack.retain(|entry| entry.claim.name() != claim.name());
            insert_by_priority(
                stack,
                FocusEntry {
                    claim: claim.clone(),
                    event,
                },
            );
        }
    }

    /// Releases `claim`'s interest in `resource`.
    ///
    /// A non-holder simply loses its queued entries. The holder is popped
    /// and unfocused (`Judge`; `Pause` re-inserts it by priority), then the
    /// new top — if any and different from `claim` — receives `on_focus`.
    pub fn release(&self, claim: &FocusClaim, resource: ResourceKind) {
        info!(name = claim.name(), resource = %resource, "Focus released");

        let is_holder = {
            let stacks = self.stacks.borrow();
            match stacks[resource.index()].first() {
                None => {
                    debug!(resource = %resource, "Focus stack empty");
                    return;
                }
                Some(front) => front.claim.name() == claim.name(),
            }
        };

        if !is_holder {
            let mut stacks = self.stacks.borrow_mut();
            stacks[resource.index()].retain(|entry| entry.claim.name() != claim.name());
            return;
        }

        let entry = {
            let mut stacks = self.stacks.borrow_mut();
            stacks[resource.index()].remove(0)
        };

        let disposition = entry
            .claim
            .handler()
            .on_unfocus(UnfocusMode::Judge, entry.event.as_ref());

        if disposition == UnfocusDisposition::Pause {
            debug!(name = claim.name(), "Released holder paused, requeued by priority");
            let mut stacks = self.stacks.borrow_mut();
            insert_by_priority(&mut stacks[resource.index()], entry);
        }

        let next = {
            let stacks = self.stacks.borrow();
            stacks[resource.index()]
                .first()
                .map(|entry| (entry.claim.clone(), entry.event.clone()))
        };

        if let Some((next_claim, next_event)) = next {
            if next_claim.name() != claim.name() {
                info!(name = next_claim.name(), resource = %resource, "Focus granted");
                next_claim.handler().on_focus(next_event.as_ref());
            }
        }
    }

    /// Unconditionally tears down every claim on `resource`, front to back.
    ///
    /// Each entry receives `on_unfocus(Force)` and is dropped regardless of
    /// its answer; a `Pause` answer is logged as a warning.
    pub fn release_all(&self, resource: ResourceKind) {
        info!(resource = %resource, "Releasing all focus claims");

        loop {
            let entry = {
                let mut stacks = self.stacks.borrow_mut();
                let stack = &mut stacks[resource.index()];
                if stack.is_empty() {
                    None
                } else {
                    Some(stack.remove(0))
                }
            };

            let Some(entry) = entry else {
                break;
            };

            let disposition = entry
                .claim
                .handler()
                .on_unfocus(UnfocusMode::Force, entry.event.as_ref());

            if disposition == UnfocusDisposition::Pause {
                warn!(
                    name = entry.claim.name(),
                    "Pause requested during forced release; removing anyway"
                );
            }
        }
    }

    /// Drops every entry for `name` on every stack without invoking any
    /// callback. Must be called before the claim's handler is destroyed.
    pub fn forget(&self, name: &str) {
        debug!(name, "Forgetting focus claim");

        let mut stacks = self.stacks.borrow_mut();
        for stack in stacks.iter_mut() {
            stack.retain(|entry| entry.claim.name() != name);
        }
    }

    /// The current holder of `resource`, if any.
    pub fn peek_top(&self, resource: ResourceKind) -> Option<FocusClaim> {
        let stacks = self.stacks.borrow();
        stacks[resource.index()].first().map(|entry| entry.claim.clone())
    }

    /// Whether any claim currently holds or awaits `resource`.
    pub fn is_focus_held(&self, resource: ResourceKind) -> bool {
        let stacks = self.stacks.borrow();
        !stacks[resource.index()].is_empty()
    }
}
