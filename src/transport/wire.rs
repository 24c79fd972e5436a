//! Live API JSON wire format
//!
//! Shapes shared by the streaming session and the one-shot speech request.

use serde::{Deserialize, Serialize};

use super::{ServerMessage, SessionSetup};
use crate::voice::EncodedChunk;
use crate::{Error, Result};

/// Response modality requested from the service
pub const AUDIO_MODALITY: &str = "AUDIO";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Content {
    #[serde(default)]
    pub parts: Vec<Part>,
}

impl Content {
    /// Single text part
    #[must_use]
    pub fn text(text: &str) -> Self {
        Self {
            parts: vec![Part {
                text: Some(text.to_string()),
                inline_data: None,
            }],
        }
    }

    /// Inline audio parts, in order
    ///
    /// Inline data that is not a well-formed chunk is logged and skipped.
    pub fn audio(self) -> impl Iterator<Item = EncodedChunk> {
        self.parts
            .into_iter()
            .filter_map(|p| p.inline_data)
            .filter_map(|raw| match serde_json::from_value::<EncodedChunk>(raw) {
                Ok(chunk) => Some(chunk),
                Err(e) => {
                    tracing::warn!(error = %e, "dropping malformed inline data");
                    None
                }
            })
            .filter(|d| d.mime_type.to_ascii_lowercase().starts_with("audio/"))
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Part {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    /// Kept raw; each part is parsed on its own by [`Content::audio`]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub inline_data: Option<serde_json::Value>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationConfig {
    pub response_modalities: Vec<&'static str>,
    pub speech_config: SpeechConfig,
}

impl GenerationConfig {
    /// Audio-only output in the given prebuilt voice
    #[must_use]
    pub fn audio(voice: &str) -> Self {
        Self {
            response_modalities: vec![AUDIO_MODALITY],
            speech_config: SpeechConfig {
                voice_config: VoiceConfig {
                    prebuilt_voice_config: PrebuiltVoiceConfig {
                        voice_name: voice.to_string(),
                    },
                },
            },
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SpeechConfig {
    pub voice_config: VoiceConfig,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VoiceConfig {
    pub prebuilt_voice_config: PrebuiltVoiceConfig,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PrebuiltVoiceConfig {
    pub voice_name: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SetupEnvelope {
    setup: Setup,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct Setup {
    model: String,
    generation_config: GenerationConfig,
    #[serde(skip_serializing_if = "Option::is_none")]
    system_instruction: Option<Content>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct RealtimeInputEnvelope<'a> {
    realtime_input: RealtimeInput<'a>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct RealtimeInput<'a> {
    media_chunks: [&'a EncodedChunk; 1],
}

/// Model resource name, adding the `models/` prefix when absent
#[must_use]
pub fn model_resource(model: &str) -> String {
    if model.starts_with("models/") {
        model.to_string()
    } else {
        format!("models/{model}")
    }
}

/// First message of a live session
///
/// # Errors
///
/// Returns error if serialization fails
pub fn setup_message(setup: &SessionSetup) -> Result<String> {
    let instruction = setup.profile.instruction();
    let envelope = SetupEnvelope {
        setup: Setup {
            model: model_resource(&setup.model),
            generation_config: GenerationConfig::audio(setup.profile.voice()),
            system_instruction: (!instruction.is_empty()).then(|| Content::text(instruction)),
        },
    };
    Ok(serde_json::to_string(&envelope)?)
}

/// One capture frame sent upstream
///
/// # Errors
///
/// Returns error if serialization fails
pub fn audio_message(chunk: &EncodedChunk) -> Result<String> {
    let envelope = RealtimeInputEnvelope {
        realtime_input: RealtimeInput {
            media_chunks: [chunk],
        },
    };
    Ok(serde_json::to_string(&envelope)?)
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ServerEnvelope {
    #[serde(default)]
    setup_complete: Option<serde_json::Value>,
    #[serde(default)]
    server_content: Option<ServerContent>,
    #[serde(default)]
    go_away: Option<serde_json::Value>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ServerContent {
    #[serde(default)]
    model_turn: Option<Content>,
    #[serde(default)]
    interrupted: bool,
    #[serde(default)]
    turn_complete: bool,
}

/// A decoded server frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerFrame {
    /// Session is open and ready for audio
    SetupComplete,
    /// Content for the session
    Message(ServerMessage),
    /// Nothing the session acts on
    Ignored,
}

/// Parse one server frame
///
/// # Errors
///
/// Returns `Error::Transport` if the frame is not valid JSON
pub fn parse_server_frame(raw: &[u8]) -> Result<ServerFrame> {
    let envelope: ServerEnvelope = serde_json::from_slice(raw)
        .map_err(|e| Error::Transport(format!("malformed server message: {e}")))?;

    if envelope.setup_complete.is_some() {
        return Ok(ServerFrame::SetupComplete);
    }

    let closed = envelope.go_away.is_some();
    let Some(content) = envelope.server_content else {
        return Ok(if closed {
            ServerFrame::Message(ServerMessage {
                closed,
                ..ServerMessage::default()
            })
        } else {
            ServerFrame::Ignored
        });
    };

    let mut parts = content.model_turn.map(Content::audio).into_iter().flatten();
    let audio = parts.next();
    let extra = parts.count();
    if extra > 0 {
        tracing::debug!(extra, "only the first audio part of a message is played");
    }

    Ok(ServerFrame::Message(ServerMessage {
        audio,
        interrupted: content.interrupted,
        turn_complete: content.turn_complete,
        closed,
    }))
}
