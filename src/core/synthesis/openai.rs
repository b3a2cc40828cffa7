//! OpenAI TTS provider
//!
//! - Endpoint: `POST https://api.openai.com/v1/audio/speech`
//! - Output: MP3 bytes (the only format the channel protocol emits)

use async_trait::async_trait;
use serde_json::json;
use tracing::debug;

use super::{SpeechSynthesizer, SynthesisError, SynthesisResult};

/// OpenAI speech endpoint
pub const OPENAI_SPEECH_URL: &str = "https://api.openai.com/v1/audio/speech";

/// Synthesis model
const SPEECH_MODEL: &str = "tts-1";

/// Speech synthesizer backed by the OpenAI Audio Speech API
pub struct OpenAISpeech {
    client: reqwest::Client,
    api_key: Option<String>,
    voice: String,
}

impl OpenAISpeech {
    /// Create a new synthesizer. A missing API key fails at call time, not
    /// at construction.
    pub fn new(api_key: Option<String>, voice: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key,
            voice,
        }
    }
}

#[async_trait]
impl SpeechSynthesizer for OpenAISpeech {
    async fn synthesize(&self, text: &str) -> SynthesisResult<Vec<u8>> {
        let api_key = self.api_key.as_deref().ok_or(SynthesisError::NotConfigured)?;

        let body = json!({
            "model": SPEECH_MODEL,
            "input": text,
            "voice": self.voice,
            "response_format": "mp3",
        });

        let response = self
            .client
            .post(OPENAI_SPEECH_URL)
            .bearer_auth(api_key)
            .json(&body)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(SynthesisError::InvalidResponse(format!(
                "status {}",
                response.status()
            )));
        }

        let audio = response.bytes().await?;
        debug!(voice = %self.voice, bytes = audio.len(), "speech synthesized");
        Ok(audio.to_vec())
    }
}
