//! OpenAI chat-completion provider
//!
//! - Endpoint: `POST https://api.openai.com/v1/chat/completions`
//! - Request: `{model, messages: [{role, content}, ...]}`
//! - Response: first choice's `message.content`

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use tracing::debug;

use super::{CompletionError, CompletionProvider, CompletionResult, Turn};

/// OpenAI chat completions endpoint
pub const OPENAI_CHAT_URL: &str = "https://api.openai.com/v1/chat/completions";

/// Chat-completion provider backed by the OpenAI API
pub struct OpenAICompletion {
    client: reqwest::Client,
    api_key: Option<String>,
    model: String,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    content: Option<String>,
}

impl OpenAICompletion {
    /// Create a new provider. A missing API key fails at call time, not at
    /// construction, so the server can boot without credentials.
    pub fn new(api_key: Option<String>, model: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key,
            model,
        }
    }
}

#[async_trait]
impl CompletionProvider for OpenAICompletion {
    async fn complete(&self, turns: &[Turn]) -> CompletionResult<String> {
        let api_key = self.api_key.as_deref().ok_or(CompletionError::NotConfigured)?;

        let body = json!({
            "model": self.model,
            "messages": turns,
        });

        let response = self
            .client
            .post(OPENAI_CHAT_URL)
            .bearer_auth(api_key)
            .json(&body)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(CompletionError::InvalidResponse(format!(
                "status {}",
                response.status()
            )));
        }

        let parsed: ChatResponse = response
            .json()
            .await
            .map_err(|e| CompletionError::InvalidResponse(e.to_string()))?;

        let reply = parsed
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| {
                CompletionError::InvalidResponse("response contained no choices".to_string())
            })?;

        debug!(model = %self.model, turns = turns.len(), "completion received");
        Ok(reply)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_missing_api_key_errors() {
        let provider = OpenAICompletion::new(None, "gpt-4o-mini".to_string());
        let result = provider.complete(&[Turn::user("hi")]).await;
        assert!(matches!(result, Err(CompletionError::NotConfigured)));
    }

    #[test]
    fn test_chat_response_parses() {
        let json = r#"{
            "choices": [{"message": {"role": "assistant", "content": "Hi there!"}}]
        }"#;
        let parsed: ChatResponse = serde_json::from_str(json).expect("Should parse");
        assert_eq!(
            parsed.choices[0].message.content.as_deref(),
            Some("Hi there!")
        );
    }

    #[test]
    fn test_empty_choices_parse_without_content() {
        let parsed: ChatResponse = serde_json::from_str("{}").expect("Should parse");
        assert!(parsed.choices.is_empty());
    }
}
