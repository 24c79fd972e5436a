//! Text-to-speech (TTS) requests

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};

use super::codec::EncodedChunk;
use crate::persona::VoiceProfile;
use crate::transport::wire::{Content, GenerationConfig, model_resource};
use crate::{Error, Result};

/// Produces a complete utterance for a piece of text
#[async_trait]
pub trait SpeechSynthesizer: Send + Sync {
    /// Synthesize `text` in the profile's voice
    ///
    /// # Errors
    ///
    /// Returns `Error::SynthesisEmpty` if the service returned no audio, or
    /// a transport/HTTP error if the request failed
    async fn synthesize(&self, text: &str, profile: &VoiceProfile) -> Result<EncodedChunk>;
}

/// Synthesizes speech with a `generateContent` request
pub struct HttpSynthesizer {
    client: reqwest::Client,
    api_key: SecretString,
    base_url: String,
    model: String,
}

impl HttpSynthesizer {
    /// Create a synthesizer
    ///
    /// # Errors
    ///
    /// Returns error if API key is missing
    pub fn new(api_key: Option<SecretString>, base_url: String, model: String) -> Result<Self> {
        let api_key = api_key
            .filter(|k| !k.expose_secret().is_empty())
            .ok_or_else(|| Error::Config("API key required for TTS".to_string()))?;

        Ok(Self {
            client: reqwest::Client::new(),
            api_key,
            base_url: base_url.trim_end_matches('/').to_string(),
            model,
        })
    }

    fn url(&self) -> String {
        format!(
            "{}/v1beta/{}:generateContent",
            self.base_url,
            model_resource(&self.model)
        )
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateRequest {
    contents: [Content; 1],
    generation_config: GenerationConfig,
}

#[derive(Debug, Default, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Default, Deserialize)]
struct Candidate {
    #[serde(default)]
    content: Content,
}

/// First audio part of a `generateContent` response body
///
/// # Errors
///
/// Returns `Error::SynthesisEmpty` when the body has no audio part, or a
/// serialization error for malformed JSON
pub fn extract_audio(body: &[u8]) -> Result<EncodedChunk> {
    let response: GenerateResponse = serde_json::from_slice(body)?;
    response
        .candidates
        .into_iter()
        .next()
        .and_then(|c| c.content.audio().next())
        .ok_or(Error::SynthesisEmpty)
}

#[async_trait]
impl SpeechSynthesizer for HttpSynthesizer {
    async fn synthesize(&self, text: &str, profile: &VoiceProfile) -> Result<EncodedChunk> {
        let request = GenerateRequest {
            contents: [Content::text(text)],
            generation_config: GenerationConfig::audio(profile.voice()),
        };

        let response = self
            .client
            .post(self.url())
            .header("x-goog-api-key", self.api_key.expose_secret())
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Transport(format!("TTS error {status}: {body}")));
        }

        let body = response.bytes().await?;
        extract_audio(&body)
    }
}
