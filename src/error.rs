//! Error types for Buddy voice sessions

use thiserror::Error;

use crate::session::SessionState;

/// Result type alias for Buddy voice operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in Buddy voice sessions
#[derive(Debug, Error)]
pub enum Error {
    /// Microphone permission denied or no usable input device
    #[error("capture unavailable: {0}")]
    CaptureUnavailable(String),

    /// Connection drop or protocol-level failure on the live transport
    #[error("transport error: {0}")]
    Transport(String),

    /// Malformed audio payload
    #[error("codec error: {0}")]
    Codec(String),

    /// One-shot synthesis returned no audio
    #[error("synthesis returned no audio")]
    SynthesisEmpty,

    /// `connect` called while a session is already live
    #[error("session busy: already {0}")]
    SessionBusy(SessionState),

    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// Output device error
    #[error("audio error: {0}")]
    Audio(String),

    /// IO error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// HTTP error
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// TOML parsing error
    #[error("toml error: {0}")]
    Toml(#[from] toml::de::Error),
}

impl From<tokio_tungstenite::tungstenite::Error> for Error {
    fn from(err: tokio_tungstenite::tungstenite::Error) -> Self {
        Self::Transport(err.to_string())
    }
}
