//! Claim-side types of the focus arbitration protocol.

use serde::{Deserialize, Serialize};
use std::any::Any;
use std::fmt;
use std::rc::Rc;

/// Physical audio channel a claim competes for.
///
/// Two independent arbitration stacks exist, one per kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ResourceKind {
    /// Audio capture channel.
    Microphone,
    /// Speaker-like output channel (TTS, media, alarm sounds, call audio).
    Speaker,
}

impl ResourceKind {
    pub(crate) const COUNT: usize = 2;

    pub(crate) fn index(self) -> usize {
        match self {
            ResourceKind::Microphone => 0,
            ResourceKind::Speaker => 1,
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResourceKind::Microphone => write!(f, "Microphone"),
            ResourceKind::Speaker => write!(f, "Speaker"),
        }
    }
}

/// Priority of a focus claim.
///
/// Variant order is the total order used as the sole tie-break on
/// contention: the earlier the variant, the higher the priority.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub enum FocusPriority {
    Call,
    Alert,
    Asr,
    Tts,
    AsrExpect,
    Media,
    Custom,
}

impl fmt::Display for FocusPriority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FocusPriority::Call => "Call",
            FocusPriority::Alert => "Alert",
            FocusPriority::Asr => "Asr",
            FocusPriority::Tts => "Tts",
            FocusPriority::AsrExpect => "AsrExpect",
            FocusPriority::Media => "Media",
            FocusPriority::Custom => "Custom",
        };
        write!(f, "{}", name)
    }
}

/// How focus is being withdrawn from a claim.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnfocusMode {
    /// Graceful yield: the claim decides whether it pauses (stays queued)
    /// or is removed.
    Judge,
    /// Unconditional teardown: the claim must fully release.
    Force,
}

/// A claim's answer to `on_unfocus`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnfocusDisposition {
    /// Drop the claim from the stack.
    Remove,
    /// Re-insert the claim at its priority-sorted position so it regains
    /// focus once higher-priority work finishes.
    Pause,
}

/// A holder's answer to a steal request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StealVerdict {
    Allow,
    Reject,
}

/// Opaque payload attached to a focus request.
///
/// Returned verbatim to the claim's callbacks; the arbiter never inspects
/// it.
pub type FocusEvent = Rc<dyn Any>;

/// Reactions a capability attaches to its focus claim.
///
/// All callbacks are invoked synchronously on the session thread, after
/// the arbiter has finished mutating its stacks; a handler may call back
/// into the arbiter.
pub trait FocusHandler {
    /// The claim became the active holder of the resource.
    fn on_focus(&self, event: Option<&FocusEvent>);

    /// Focus is being withdrawn. The returned disposition is honored for
    /// [`UnfocusMode::Judge`]; under [`UnfocusMode::Force`] a `Pause`
    /// answer is logged and ignored.
    fn on_unfocus(&self, mode: UnfocusMode, event: Option<&FocusEvent>) -> UnfocusDisposition;

    /// Another claim asks to take over the resource. Rejecting leaves the
    /// requester queued by priority.
    fn on_steal_request(&self, event: Option<&FocusEvent>, requester: &FocusClaim) -> StealVerdict;
}

/// Handle identifying one capability's interest in a resource.
///
/// Cheap to clone; the arbiter keeps clones only while the claim is queued
/// or active. Call [`crate::FocusArbiter::forget`] before dropping the
/// handler a claim points to.
#[derive(Clone)]
pub struct FocusClaim {
    inner: Rc<ClaimInner>,
}

struct ClaimInner {
    name: String,
    priority: FocusPriority,
    handler: Rc<dyn FocusHandler>,
}

impl FocusClaim {
    pub fn new(
        name: impl Into<String>,
        priority: FocusPriority,
        handler: Rc<dyn FocusHandler>,
    ) -> Self {
        Self {
            inner: Rc::new(ClaimInner {
                name: name.into(),
                priority,
                handler,
            }),
        }
    }

    /// Unique label, used for logging and entry lookup.
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    pub fn priority(&self) -> FocusPriority {
        self.inner.priority
    }

    pub(crate) fn handler(&self) -> Rc<dyn FocusHandler> {
        Rc::clone(&self.inner.handler)
    }
}

impl fmt::Debug for FocusClaim {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FocusClaim")
            .field("name", &self.inner.name)
            .field("priority", &self.inner.priority)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_priority_order() {
        assert!(FocusPriority::Call < FocusPriority::Alert);
        assert!(FocusPriority::Alert < FocusPriority::Asr);
        assert!(FocusPriority::Asr < FocusPriority::Tts);
        assert!(FocusPriority::Tts < FocusPriority::AsrExpect);
        assert!(FocusPriority::AsrExpect < FocusPriority::Media);
        assert!(FocusPriority::Media < FocusPriority::Custom);
    }

    #[test]
    fn test_priority_wire_names() {
        let json = serde_json::to_string(&FocusPriority::AsrExpect).unwrap();
        assert_eq!(json, "\"AsrExpect\"");

        let parsed: FocusPriority = serde_json::from_str("\"Media\"").unwrap();
        assert_eq!(parsed, FocusPriority::Media);
    }

    #[test]
    fn test_resource_kind_display() {
        assert_eq!(ResourceKind::Microphone.to_string(), "Microphone");
        assert_eq!(ResourceKind::Speaker.to_string(), "Speaker");
    }
}
