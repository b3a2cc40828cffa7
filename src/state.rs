//! Shared application state
//!
//! One [`AppState`] is built at startup and cloned into every handler via
//! axum's `State` extractor. It wires the concrete providers together; the
//! handlers only see the trait objects.

use std::sync::Arc;
use std::time::Duration;

use crate::config::ServerConfig;
use crate::core::detect::{
    DetectionOutcome, DetectorError, DetectorResult, HttpDetector, ObjectDetector,
};
use crate::core::dialogue::DialogueEngine;
use crate::core::prompts::PersonaPrompts;
use crate::core::{OpenAICompletion, OpenAISpeech};
use crate::session::SessionRegistry;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<ServerConfig>,
    pub registry: Arc<SessionRegistry>,
    pub dialogue: Arc<DialogueEngine>,
    pub detector: Arc<dyn ObjectDetector>,
}

impl AppState {
    /// Build the production state: OpenAI-backed dialogue and an HTTP
    /// detection adapter, both configured from `config`
    pub fn new(config: ServerConfig) -> Self {
        let completion = Arc::new(OpenAICompletion::new(
            config.openai_api_key.clone(),
            config.completion_model.clone(),
        ));
        let synthesizer = Arc::new(OpenAISpeech::new(
            config.openai_api_key.clone(),
            config.synthesis_voice.clone(),
        ));
        let prompts = PersonaPrompts::load(config.prompts_path.as_deref());
        let detector = Arc::new(HttpDetector::new(
            config.detector_url.clone(),
            config.detector_api_key.clone(),
        ));

        let dialogue = DialogueEngine::new(
            completion,
            synthesizer,
            prompts,
            config.completion_model.clone(),
            config.max_history_turns,
            config.audios_dir.clone(),
            Duration::from_secs(config.external_call_timeout_secs),
        );

        Self {
            config: Arc::new(config),
            registry: Arc::new(SessionRegistry::new()),
            dialogue: Arc::new(dialogue),
            detector,
        }
    }

    /// Run detection under the configured external-call timeout. All detect
    /// call sites go through here; a stalled inference endpoint surfaces as
    /// a recoverable error instead of hanging the caller.
    pub async fn detect(&self, image: &[u8]) -> DetectorResult<DetectionOutcome> {
        let secs = self.config.external_call_timeout_secs;
        match tokio::time::timeout(Duration::from_secs(secs), self.detector.detect(image)).await
        {
            Ok(result) => result,
            Err(_) => Err(DetectorError::Timeout(secs)),
        }
    }

    /// Build state over caller-supplied services; used by tests to swap in
    /// mock providers
    pub fn with_services(
        config: ServerConfig,
        dialogue: DialogueEngine,
        detector: Arc<dyn ObjectDetector>,
    ) -> Self {
        Self {
            config: Arc::new(config),
            registry: Arc::new(SessionRegistry::new()),
            dialogue: Arc::new(dialogue),
            detector,
        }
    }
}
