//! TOML configuration file loading
//!
//! Supports `~/.config/buddy/config.toml` as a persistent config source.
//! All fields are optional; the file is a partial overlay on top of defaults.

use std::path::{Path, PathBuf};

use serde::Deserialize;

/// Top-level TOML configuration file schema
#[derive(Debug, Default, Deserialize)]
pub struct BuddyConfigFile {
    /// API key for the speech service
    pub api_key: Option<String>,

    /// Live conversation settings
    #[serde(default)]
    pub live: LiveFileConfig,

    /// One-shot speech settings
    #[serde(default)]
    pub speech: SpeechFileConfig,

    /// Default voice and persona
    #[serde(default)]
    pub persona: PersonaFileConfig,
}

/// Live session configuration
#[derive(Debug, Default, Deserialize)]
pub struct LiveFileConfig {
    /// WebSocket endpoint
    pub url: Option<String>,

    /// Native-audio model identifier
    pub model: Option<String>,

    /// Open handshake timeout in seconds
    pub connect_timeout_secs: Option<u64>,

    /// Capture frame length in samples
    pub frame_len: Option<usize>,
}

/// One-shot speech configuration
#[derive(Debug, Default, Deserialize)]
pub struct SpeechFileConfig {
    /// REST API base URL
    pub api_url: Option<String>,

    /// TTS model identifier
    pub model: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct PersonaFileConfig {
    /// Voice identifier (e.g. "Puck")
    pub voice: Option<String>,

    /// Persona instruction
    pub instruction: Option<String>,
}

/// Load the TOML config file from the standard path
///
/// Returns `BuddyConfigFile::default()` if the file doesn't exist or can't be parsed.
pub fn load_config_file() -> BuddyConfigFile {
    config_file_path().map_or_else(BuddyConfigFile::default, |path| load_from_path(&path))
}

/// Load a TOML config file from `path`, falling back to defaults
pub fn load_from_path(path: &Path) -> BuddyConfigFile {
    if !path.exists() {
        return BuddyConfigFile::default();
    }

    match std::fs::read_to_string(path) {
        Ok(content) => match toml::from_str(&content) {
            Ok(config) => {
                tracing::info!(path = %path.display(), "loaded config file");
                config
            }
            Err(e) => {
                tracing::warn!(
                    path = %path.display(),
                    error = %e,
                    "failed to parse config file, using defaults"
                );
                BuddyConfigFile::default()
            }
        },
        Err(e) => {
            tracing::warn!(
                path = %path.display(),
                error = %e,
                "failed to read config file"
            );
            BuddyConfigFile::default()
        }
    }
}

/// Return the config file path: `~/.config/buddy/config.toml`
pub fn config_file_path() -> Option<PathBuf> {
    directories::BaseDirs::new().map(|d| d.config_dir().join("buddy").join("config.toml"))
}
