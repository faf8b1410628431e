//! # Play-Stack & Play-Sync Module
//!
//! Tracks which server-issued play-service contexts are currently "on
//! stage" and coordinates the capabilities rendering them.
//!
//! ## Overview
//!
//! A play-service id (`ps_id`) correlates one logical "now happening"
//! context — one song, one dialog turn — across the capabilities that
//! render it (TTS narration, audio playback, on-screen card). This crate
//! manages that shared lifecycle in two layers:
//!
//! - **Play-Stack Ledger** (`stack`): the layered container of live
//!   contexts, with a replace-vs-stack policy (at most one foreground
//!   context over at most one background media context) and timer-deferred
//!   expiry so a context survives the grace period between turns.
//! - **Play-Sync Coordinator** (`sync`): an all-or-nothing readiness
//!   barrier per context. No capability treats a context as live until all
//!   interested ones acknowledged it, and the context is not torn down
//!   until all of them released it — otherwise a display card could be
//!   cleared while audio is still playing.
//!
//! The classification input each directive carries — group list, expect-
//! speech flag — is modeled by [`DirectiveGroups`] (`directive`); nothing
//! else of the wire payload is read here.

pub mod directive;
pub mod stack;
pub mod sync;

pub use directive::{DirectiveGroups, PlayActivity};
pub use stack::{HoldTimes, PlayStackLedger, PlayStackListener, RemoveMode};
pub use sync::{ExtraData, PlaySyncCoordinator, PlaySyncListener, SyncState};
