//! Configuration management for Buddy voice

pub mod file;

use std::time::Duration;

use secrecy::SecretString;

use crate::persona::{COMPANION_INSTRUCTION, DEFAULT_VOICE, VoiceProfile};
use crate::session::{DEFAULT_LIVE_MODEL, SessionOptions};
use crate::voice::FRAME_LEN;
use file::BuddyConfigFile;

/// Default live WebSocket endpoint
pub const DEFAULT_LIVE_URL: &str = "wss://generativelanguage.googleapis.com/ws/google.ai.generativelanguage.v1beta.GenerativeService.BidiGenerateContent";

/// Default REST API base URL
pub const DEFAULT_API_URL: &str = "https://generativelanguage.googleapis.com";

/// Default one-shot TTS model
pub const DEFAULT_TTS_MODEL: &str = "gemini-2.5-flash-preview-tts";

const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 15;

/// Buddy voice configuration
#[derive(Debug)]
pub struct Config {
    /// API key for both the live and the one-shot service
    pub api_key: Option<SecretString>,

    /// Live conversation settings
    pub live: LiveConfig,

    /// One-shot speech settings
    pub speech: SpeechConfig,

    /// Default voice profile
    pub profile: VoiceProfile,
}

/// Live session configuration
#[derive(Debug, Clone)]
pub struct LiveConfig {
    pub url: String,
    pub model: String,
    pub connect_timeout: Duration,
    pub frame_len: usize,
}

impl LiveConfig {
    #[must_use]
    pub fn session_options(&self) -> SessionOptions {
        SessionOptions {
            model: self.model.clone(),
            connect_timeout: self.connect_timeout,
            frame_len: self.frame_len,
        }
    }
}

/// One-shot speech configuration
#[derive(Debug, Clone)]
pub struct SpeechConfig {
    pub api_url: String,
    pub model: String,
}

impl Config {
    /// Load configuration from the environment and the config file
    ///
    /// Priority: env var > config file > default.
    #[must_use]
    pub fn load() -> Self {
        let fc = file::load_config_file();
        Self::resolve(fc, |key| std::env::var(key).ok())
    }

    /// Resolve configuration from a parsed file and an env lookup
    pub fn resolve<F>(fc: BuddyConfigFile, env: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let api_key = env("BUDDY_API_KEY")
            .or_else(|| env("GEMINI_API_KEY"))
            .or_else(|| env("API_KEY"))
            .or(fc.api_key)
            .filter(|k| !k.is_empty())
            .map(SecretString::from);

        let connect_timeout_secs = fc
            .live
            .connect_timeout_secs
            .filter(|&s| s > 0)
            .unwrap_or(DEFAULT_CONNECT_TIMEOUT_SECS);

        let live = LiveConfig {
            url: env("BUDDY_LIVE_URL")
                .or(fc.live.url)
                .unwrap_or_else(|| DEFAULT_LIVE_URL.to_string()),
            model: env("BUDDY_LIVE_MODEL")
                .or(fc.live.model)
                .unwrap_or_else(|| DEFAULT_LIVE_MODEL.to_string()),
            connect_timeout: Duration::from_secs(connect_timeout_secs),
            frame_len: fc.live.frame_len.filter(|&n| n > 0).unwrap_or(FRAME_LEN),
        };

        let speech = SpeechConfig {
            api_url: env("BUDDY_API_URL")
                .or(fc.speech.api_url)
                .unwrap_or_else(|| DEFAULT_API_URL.to_string()),
            model: env("BUDDY_TTS_MODEL")
                .or(fc.speech.model)
                .unwrap_or_else(|| DEFAULT_TTS_MODEL.to_string()),
        };

        let voice = env("BUDDY_VOICE")
            .or(fc.persona.voice)
            .unwrap_or_else(|| DEFAULT_VOICE.to_string());
        let instruction = fc
            .persona
            .instruction
            .unwrap_or_else(|| COMPANION_INSTRUCTION.to_string());

        if api_key.is_none() {
            tracing::debug!("no API key configured");
        }

        Self {
            api_key,
            live,
            speech,
            profile: VoiceProfile::new(voice, instruction),
        }
    }

    /// Default profile with a different voice
    #[must_use]
    pub fn profile_with_voice(&self, voice: Option<&str>) -> VoiceProfile {
        voice.map_or_else(
            || self.profile.clone(),
            |v| VoiceProfile::new(v, self.profile.instruction()),
        )
    }
}
