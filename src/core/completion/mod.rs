//! Chat-completion provider
//!
//! The dialogue engine talks to the language model through the
//! [`CompletionProvider`] trait; the model itself is a black box that takes
//! the full ordered turn sequence and returns one assistant reply.

mod openai;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use openai::OpenAICompletion;

/// Conversation turn role
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// One conversation turn
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Turn {
    pub role: Role,
    pub content: String,
}

impl Turn {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// Completion provider errors
#[derive(Debug, Error)]
pub enum CompletionError {
    #[error("completion provider is not configured")]
    NotConfigured,

    #[error("completion request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("completion returned an invalid response: {0}")]
    InvalidResponse(String),
}

pub type CompletionResult<T> = Result<T, CompletionError>;

/// External text-completion service
#[async_trait]
pub trait CompletionProvider: Send + Sync {
    /// Generate the next assistant reply for the given turn sequence
    async fn complete(&self, turns: &[Turn]) -> CompletionResult<String>;
}
