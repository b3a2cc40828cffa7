//! Speech-synthesis provider
//!
//! Converts reply text into encoded audio. The synthesizer is a black box
//! behind the [`SpeechSynthesizer`] trait; the gateway only ever asks for
//! MP3 output.

mod openai;

use async_trait::async_trait;
use thiserror::Error;

pub use openai::OpenAISpeech;

/// Synthesis provider errors
#[derive(Debug, Error)]
pub enum SynthesisError {
    #[error("synthesis provider is not configured")]
    NotConfigured,

    #[error("synthesis request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("synthesis returned an invalid response: {0}")]
    InvalidResponse(String),
}

pub type SynthesisResult<T> = Result<T, SynthesisError>;

/// External text-to-audio service
#[async_trait]
pub trait SpeechSynthesizer: Send + Sync {
    /// Synthesize the given text and return encoded MP3 bytes
    async fn synthesize(&self, text: &str) -> SynthesisResult<Vec<u8>>;
}
