//! Voice profiles
//!
//! A profile pairs an opaque voice identifier with the persona instruction
//! the service speaks under. It is fixed for the lifetime of a session.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Default prebuilt voice
pub const DEFAULT_VOICE: &str = "Puck";

/// Persona used by the companion characters
pub const COMPANION_INSTRUCTION: &str = "You are a friendly, encouraging companion for a 5-year-old child. \
     Keep sentences short, simple, and very enthusiastic. Do not use complex words.";

/// Prebuilt voices known to the service
pub const PREBUILT_VOICES: &[&str] = &["Puck", "Kore", "Fenrir", "Charon", "Zephyr"];

/// Voice identifier plus persona instruction
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct VoiceProfile {
    voice: String,
    instruction: String,
}

impl VoiceProfile {
    #[must_use]
    pub fn new(voice: impl Into<String>, instruction: impl Into<String>) -> Self {
        Self {
            voice: voice.into(),
            instruction: instruction.into(),
        }
    }

    /// Profile speaking as the child-friendly companion
    #[must_use]
    pub fn companion(voice: impl Into<String>) -> Self {
        Self::new(voice, COMPANION_INSTRUCTION)
    }

    #[must_use]
    pub fn voice(&self) -> &str {
        &self.voice
    }

    #[must_use]
    pub fn instruction(&self) -> &str {
        &self.instruction
    }

    /// Whether the voice is one of the prebuilt catalog entries
    #[must_use]
    pub fn is_prebuilt(&self) -> bool {
        PREBUILT_VOICES
            .iter()
            .any(|v| v.eq_ignore_ascii_case(&self.voice))
    }
}

impl Default for VoiceProfile {
    fn default() -> Self {
        Self::companion(DEFAULT_VOICE)
    }
}

impl fmt::Display for VoiceProfile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.voice)
    }
}
