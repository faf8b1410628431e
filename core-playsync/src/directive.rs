//! Classification input extracted from a directive bundle.

use serde::{Deserialize, Serialize};

/// Activity classification of a play-service context.
///
/// Derived from a directive's declared groups and used only by the
/// play-stack layering policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PlayActivity {
    /// No context (unknown id).
    None,
    Alert,
    Call,
    Tts,
    Media,
}

/// The `"Namespace.Name"` entries one directive bundle declares, e.g.
/// `["TTS.Speak", "Display.FullText1"]`.
///
/// This is the only piece of the wire payload the session core reads: it
/// yields the activity classification, the expect-more-speech flag, the
/// visual-rendering flag, and the capability names participating in the
/// context. Payload parsing and validation stay in the directive layer.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DirectiveGroups {
    entries: Vec<String>,
}

impl DirectiveGroups {
    pub fn new<I, S>(entries: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            entries: entries.into_iter().map(Into::into).collect(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &[String] {
        &self.entries
    }

    /// The play-stack activity this directive bundle classifies as.
    pub fn activity(&self) -> PlayActivity {
        if self.has_namespace("AudioPlayer") {
            PlayActivity::Media
        } else if self.has_namespace("PhoneCall") {
            PlayActivity::Call
        } else if self.has_namespace("Alerts") {
            PlayActivity::Alert
        } else {
            PlayActivity::Tts
        }
    }

    /// Whether the bundle announces a follow-up user turn.
    pub fn expects_speech(&self) -> bool {
        self.entries.iter().any(|entry| entry == "ASR.ExpectSpeech")
    }

    /// Whether the bundle carries visual-rendering payload (a display card
    /// or a media template).
    pub fn has_render_payload(&self) -> bool {
        self.has_namespace("Display") || self.has_namespace("AudioPlayer")
    }

    /// Declared capability names in declaration order, deduplicated.
    pub fn capabilities(&self) -> Vec<String> {
        let mut names: Vec<String> = Vec::new();
        for entry in &self.entries {
            let namespace = Self::namespace_of(entry);
            if !names.iter().any(|name| name == namespace) {
                names.push(namespace.to_string());
            }
        }
        names
    }

    fn has_namespace(&self, namespace: &str) -> bool {
        self.entries
            .iter()
            .any(|entry| Self::namespace_of(entry) == namespace)
    }

    fn namespace_of(entry: &str) -> &str {
        entry.split('.').next().unwrap_or(entry)
    }
}
