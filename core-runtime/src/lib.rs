//! # Core Runtime Module
//!
//! Provides foundational runtime infrastructure for the voice session core:
//! - Logging and tracing infrastructure
//! - Session configuration management
//! - The single-shot timer contract backing hold/expiry semantics
//!
//! ## Overview
//!
//! This crate contains the runtime utilities the session subsystems depend
//! on. It establishes the logging conventions, the externally adjustable
//! configuration surface, and the timer abstraction whose firings are the
//! only source of re-entry into the single-threaded core.

pub mod config;
pub mod error;
pub mod logging;
pub mod timer;

pub use config::SessionConfig;
pub use error::{Error, Result};
pub use timer::{ManualTimer, SessionTimer, TimerCallback, TokioTimer};
