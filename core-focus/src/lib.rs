//! # Focus Arbitration Module
//!
//! Grants exclusive, priority-ordered, preemptible ownership of the
//! device's physical audio resources (microphone, speaker-like output) to
//! at most one capability claim at a time.
//!
//! ## Overview
//!
//! Every capability that needs to record or emit audio registers a
//! [`FocusClaim`] carrying a name, a [`FocusPriority`] and the reactions it
//! wants invoked when focus is granted, withdrawn, or contested. The
//! [`FocusArbiter`] keeps one priority-sorted claim stack per
//! [`ResourceKind`]; the front of a stack is the current holder, everything
//! behind it is pending by priority.
//!
//! Preemption is negotiated, not unilateral: a request against a held
//! resource first asks the holder's `on_steal_request`. A rejected steal
//! leaves the holder untouched and queues the requester by priority until
//! the holder releases on its own.
//!
//! ## Components
//!
//! - **Claim types** (`types`): resource kinds, priorities, the handler
//!   trait and the claim handle
//! - **Arbiter** (`arbiter`): the per-resource ownership stacks

pub mod arbiter;
pub mod types;

pub use arbiter::FocusArbiter;
pub use types::{
    FocusClaim, FocusEvent, FocusHandler, FocusPriority, ResourceKind, StealVerdict,
    UnfocusDisposition, UnfocusMode,
};
