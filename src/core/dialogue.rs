//! Dialogue engine
//!
//! Owns the per-(session, persona) conversation cache and orchestrates the
//! external completion and synthesis services. Each conversation is seeded
//! exactly once with the resolved persona prompt as its system turn; after
//! that, turns strictly alternate user/assistant.
//!
//! The full turn history is resent on every completion call. By default it
//! grows for the process lifetime; `max_history_turns` caps the retained
//! non-system turns when set.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use dashmap::DashMap;
use thiserror::Error;
use tracing::{debug, warn};

use super::completion::{CompletionError, CompletionProvider, Turn};
use super::prompts::PersonaPrompts;
use super::synthesis::{SpeechSynthesizer, SynthesisError};
use crate::utils::storage;

/// Stand-in user utterance for voice messages; transcription is out of scope
const PLACEHOLDER_UTTERANCE: &str = "Hi! What do you see right now?";

/// Dialogue engine errors
#[derive(Debug, Error)]
pub enum DialogueError {
    #[error("completion failed: {0}")]
    Completion(#[from] CompletionError),

    #[error("speech synthesis failed: {0}")]
    Synthesis(#[from] SynthesisError),

    #[error("external call timed out after {0}s")]
    Timeout(u64),
}

pub type DialogueResult<T> = Result<T, DialogueError>;

#[derive(Debug, Clone, Hash, PartialEq, Eq)]
struct ConversationKey {
    session_id: String,
    persona: String,
}

impl ConversationKey {
    fn new(session_id: &str, persona: &str) -> Self {
        Self {
            session_id: session_id.to_string(),
            persona: persona.to_string(),
        }
    }
}

/// Orchestrates conversations against the completion and synthesis services
pub struct DialogueEngine {
    completion: Arc<dyn CompletionProvider>,
    synthesizer: Arc<dyn SpeechSynthesizer>,
    prompts: PersonaPrompts,
    model: String,
    conversations: DashMap<ConversationKey, Vec<Turn>>,
    max_history_turns: Option<usize>,
    audios_dir: PathBuf,
    call_timeout: Duration,
}

impl DialogueEngine {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        completion: Arc<dyn CompletionProvider>,
        synthesizer: Arc<dyn SpeechSynthesizer>,
        prompts: PersonaPrompts,
        model: String,
        max_history_turns: Option<usize>,
        audios_dir: PathBuf,
        call_timeout: Duration,
    ) -> Self {
        Self {
            completion,
            synthesizer,
            prompts,
            model,
            conversations: DashMap::new(),
            max_history_turns,
            audios_dir,
            call_timeout,
        }
    }

    /// Run one chat turn: append the user turn, call the completion service
    /// with the full history, append the reply, synthesize it, and return
    /// `(reply_text, mp3_base64)`.
    ///
    /// On a provider failure the already-appended user turn stays in the
    /// history, so a retried chat resends it.
    pub async fn converse(
        &self,
        session_id: &str,
        persona: &str,
        user_text: &str,
    ) -> DialogueResult<(String, String)> {
        let key = ConversationKey::new(session_id, persona);

        // Snapshot the turns so no map shard lock is held across an await.
        let turns = {
            let mut entry = self.conversations.entry(key.clone()).or_insert_with(|| {
                let prompt = self.prompts.resolve(&self.model, persona);
                debug!(session_id, persona, "conversation created");
                vec![Turn::system(prompt)]
            });
            entry.push(Turn::user(user_text));
            self.trim_history(&mut entry);
            entry.clone()
        };

        let reply = self
            .with_timeout(self.completion.complete(&turns))
            .await?;

        if let Some(mut entry) = self.conversations.get_mut(&key) {
            entry.push(Turn::assistant(reply.as_str()));
            self.trim_history(&mut entry);
        }

        let audio = self
            .with_timeout(self.synthesizer.synthesize(&reply))
            .await?;

        Ok((reply, BASE64.encode(audio)))
    }

    /// Persist a voice message and run a chat turn on its behalf.
    ///
    /// Decode and storage failures are recovered locally and reported in the
    /// returned status string; provider failures propagate. The synthesized
    /// audio of the inner chat turn is discarded on this path.
    pub async fn ingest_audio(
        &self,
        session_id: &str,
        persona: &str,
        data_b64: &str,
        filename: &str,
    ) -> DialogueResult<String> {
        let bytes = match BASE64.decode(data_b64) {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!(session_id, "voice message payload did not decode: {e}");
                return Ok(format!("Could not decode audio {filename}: {e}"));
            }
        };

        if let Err(e) = storage::save_media(&self.audios_dir, filename, &bytes).await {
            warn!(session_id, "voice message could not be saved: {e}");
            return Ok(format!("Could not save audio {filename}: {e}"));
        }

        let (reply, _audio) = self
            .converse(session_id, persona, PLACEHOLDER_UTTERANCE)
            .await?;

        Ok(format!("Audio saved as {filename}. Reply: {reply}"))
    }

    /// Snapshot of a conversation's turns, if it exists
    pub fn history(&self, session_id: &str, persona: &str) -> Option<Vec<Turn>> {
        self.conversations
            .get(&ConversationKey::new(session_id, persona))
            .map(|turns| turns.clone())
    }

    /// Evict the oldest user/assistant pair while over the cap, keeping the
    /// system turn first and the alternation intact
    fn trim_history(&self, turns: &mut Vec<Turn>) {
        let Some(cap) = self.max_history_turns else {
            return;
        };
        while turns.len() - 1 > cap && turns.len() > 3 {
            turns.drain(1..3);
        }
    }

    async fn with_timeout<T, E>(
        &self,
        call: impl Future<Output = Result<T, E>>,
    ) -> DialogueResult<T>
    where
        DialogueError: From<E>,
    {
        match tokio::time::timeout(self.call_timeout, call).await {
            Ok(result) => result.map_err(DialogueError::from),
            Err(_) => Err(DialogueError::Timeout(self.call_timeout.as_secs())),
        }
    }
}
