//! Session registry
//!
//! The single source of truth for per-client session state: the outbound
//! channel handle, the bound persona, the tracking-mode flag, and the
//! last-known detection. One registry instance is created at process start
//! and shared through [`crate::state::AppState`]; connection tasks and HTTP
//! handlers all go through it.
//!
//! Every operation is a non-suspending map access; the concurrent map's
//! shard locks make each read-modify-write atomic under the multi-threaded
//! runtime. Session state lives exactly as long as the registry entry:
//! a persona set out-of-band survives until `disconnect`, and a reconnect
//! after `disconnect` starts a fresh, unbound session.

use dashmap::DashMap;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::core::detect::NormalizedBox;
use crate::core::prompts::UNBOUND_PERSONA;
use crate::handlers::ws::messages::OutgoingMessage;

/// Last-known detection retained per tracking session
#[derive(Debug, Clone, PartialEq)]
pub struct TrackedDetection {
    pub label: String,
    pub confidence: f32,
    pub bbox: NormalizedBox,
}

#[derive(Debug)]
struct Session {
    /// Outbound channel of the currently-connected socket, if any
    channel: Option<mpsc::Sender<OutgoingMessage>>,
    persona: String,
    tracking: bool,
    last_detection: Option<TrackedDetection>,
}

impl Default for Session {
    fn default() -> Self {
        Self {
            channel: None,
            persona: UNBOUND_PERSONA.to_string(),
            tracking: false,
            last_detection: None,
        }
    }
}

/// Tracks live connections and their session state by session identifier
#[derive(Debug, Default)]
pub struct SessionRegistry {
    sessions: DashMap<String, Session>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach a connection's outbound channel. Idempotent with respect to
    /// session state: a persona bound before the channel connected (via the
    /// out-of-band identify flow) is left untouched.
    pub fn connect(&self, session_id: &str, sender: mpsc::Sender<OutgoingMessage>) {
        let mut entry = self.sessions.entry(session_id.to_string()).or_default();
        entry.channel = Some(sender);
        info!("session connected: {session_id}");
    }

    /// Drop all state for the session. Runs exactly once per connection
    /// teardown; a later reconnect under the same id starts unbound.
    pub fn disconnect(&self, session_id: &str) {
        if self.sessions.remove(session_id).is_some() {
            info!("session disconnected: {session_id}");
        }
    }

    /// Bind a persona, creating the session entry when no channel is
    /// connected yet. Always succeeds and overwrites.
    pub fn set_persona(&self, session_id: &str, persona: &str) -> bool {
        let mut entry = self.sessions.entry(session_id.to_string()).or_default();
        if entry.channel.is_none() {
            warn!("persona '{persona}' set for session {session_id} with no connected channel");
        }
        entry.persona = persona.to_string();
        true
    }

    /// Bound persona, or the unbound sentinel when the session is absent
    pub fn persona(&self, session_id: &str) -> String {
        self.sessions
            .get(session_id)
            .map(|session| session.persona.clone())
            .unwrap_or_else(|| UNBOUND_PERSONA.to_string())
    }

    /// Snapshot of currently-connected (channel-present) session ids
    pub fn session_ids(&self) -> Vec<String> {
        self.sessions
            .iter()
            .filter(|entry| entry.channel.is_some())
            .map(|entry| entry.key().clone())
            .collect()
    }

    /// Queue a message on the session's outbound channel. A no-op
    /// when no channel is attached; a send failure for a dead peer is owned
    /// by the channel loop's own disconnect detection, not reported here.
    pub async fn send(&self, session_id: &str, message: OutgoingMessage) {
        let sender = self
            .sessions
            .get(session_id)
            .and_then(|session| session.channel.clone());
        match sender {
            Some(sender) => {
                if sender.send(message).await.is_err() {
                    debug!("channel for session {session_id} is closed; message dropped");
                }
            }
            None => debug!("no channel connected for session {session_id}; message dropped"),
        }
    }

    /// Whether the session is in tracking mode
    pub fn is_tracking(&self, session_id: &str) -> bool {
        self.sessions
            .get(session_id)
            .map(|session| session.tracking)
            .unwrap_or(false)
    }

    /// Enter tracking mode and bind the persona to the tracked target, so
    /// chat and tracking share the same subject
    pub fn start_tracking(&self, session_id: &str, target: &str) {
        let mut entry = self.sessions.entry(session_id.to_string()).or_default();
        entry.tracking = true;
        entry.persona = target.to_string();
    }

    /// Leave tracking mode; the last-known detection and persona persist
    pub fn stop_tracking(&self, session_id: &str) {
        if let Some(mut entry) = self.sessions.get_mut(session_id) {
            entry.tracking = false;
        }
    }

    /// Last-known detection for the session, if any
    pub fn last_detection(&self, session_id: &str) -> Option<TrackedDetection> {
        self.sessions
            .get(session_id)
            .and_then(|session| session.last_detection.clone())
    }

    /// Store or overwrite the last-known detection (including decayed
    /// confidences written back on tracking misses)
    pub fn record_detection(&self, session_id: &str, detection: TrackedDetection) {
        if let Some(mut entry) = self.sessions.get_mut(session_id) {
            entry.last_detection = Some(detection);
        }
    }
}
