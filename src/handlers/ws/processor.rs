//! Channel protocol loop
//!
//! One entry point per text frame; every inbound message resolves to zero or
//! more outbound messages on the session channel. Failures are reported to
//! the peer as `text` or `tracking_status` messages and never close the
//! connection.

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use tracing::{info, warn};

use super::messages::{
    IncomingMessage, OutgoingMessage, ParsedInbound, TrackingStatusKind, parse_incoming,
};
use crate::core::detect::{DetectionOutcome, FALLBACK_CANVAS};
use crate::core::prompts::UNBOUND_PERSONA;
use crate::session::TrackedDetection;
use crate::state::AppState;
use crate::utils::storage;

/// Minimum confidence for detections reported over the channel
const WS_CONF_THRESHOLD: f32 = 0.3;

/// Per-frame confidence decay applied while a tracked subject stays missing
const MISS_DECAY: f32 = 0.8;

/// Guidance sent when chat arrives before any persona is bound
const UNBOUND_GUIDANCE: &str = "No companion is set yet. Identify an animal first.";

/// Decode and dispatch one inbound text frame
pub async fn handle_text_frame(state: &AppState, session_id: &str, raw: &str) {
    match parse_incoming(raw) {
        ParsedInbound::Known(message) => handle_incoming(state, session_id, message).await,
        ParsedInbound::UnknownType(msg_type) => {
            warn!(session_id, msg_type, "unknown message type");
            send_text(state, session_id, format!("unknown message type: {msg_type}")).await;
        }
        ParsedInbound::Invalid(detail) => {
            warn!(session_id, "malformed message: {detail}");
            send_text(state, session_id, format!("invalid message: {detail}")).await;
        }
    }
}

async fn handle_incoming(state: &AppState, session_id: &str, message: IncomingMessage) {
    match message {
        IncomingMessage::SetAnimal { animal_type } => {
            set_animal(state, session_id, animal_type).await;
        }
        IncomingMessage::Message { content } => {
            handle_chat(state, session_id, &content).await;
        }
        IncomingMessage::Image { data, .. } => {
            if state.registry.is_tracking(session_id) {
                handle_tracking_image(state, session_id, &data).await;
            } else {
                handle_idle_image(state, session_id, &data).await;
            }
        }
        IncomingMessage::Audio { data, filename } => {
            handle_audio(state, session_id, &data, filename).await;
        }
        IncomingMessage::StartTracking { animal_type } => {
            start_tracking(state, session_id, animal_type).await;
        }
        IncomingMessage::StopTracking => {
            stop_tracking(state, session_id).await;
        }
    }
}

async fn set_animal(state: &AppState, session_id: &str, animal_type: Option<String>) {
    let persona = animal_type.unwrap_or_else(|| UNBOUND_PERSONA.to_string());
    state.registry.set_persona(session_id, &persona);
    info!(session_id, persona, "persona bound over the channel");
    send_text(
        state,
        session_id,
        format!("{persona} is now your companion. Let's talk!"),
    )
    .await;
}

/// One chat turn: reply text first, then its synthesized speech
async fn handle_chat(state: &AppState, session_id: &str, content: &str) {
    let persona = state.registry.persona(session_id);
    if persona == UNBOUND_PERSONA {
        send_text(state, session_id, UNBOUND_GUIDANCE).await;
        return;
    }

    match state.dialogue.converse(session_id, &persona, content).await {
        Ok((reply, audio_b64)) => {
            send(state, session_id, OutgoingMessage::text(reply)).await;
            send(state, session_id, OutgoingMessage::audio_mp3(audio_b64)).await;
        }
        Err(e) => {
            warn!(session_id, persona, "chat turn failed: {e}");
            send_text(state, session_id, format!("Could not reply right now: {e}")).await;
        }
    }
}

/// One-shot detection on a camera frame while not tracking. A confident hit
/// answers with a `bbox` message; a miss answers with nothing. The frame is
/// stored only for the duration of the pass.
async fn handle_idle_image(state: &AppState, session_id: &str, data_b64: &str) {
    let Some(bytes) = decode_payload(state, session_id, data_b64, "image").await else {
        return;
    };

    let filename = format!("image_{}.jpg", storage::unix_millis());
    let path = match storage::save_media(&state.config.images_dir, &filename, &bytes).await {
        Ok(path) => path,
        Err(e) => {
            warn!(session_id, "image could not be saved: {e}");
            send_text(state, session_id, format!("Could not save image: {e}")).await;
            return;
        }
    };

    let outcome = match state.detect(&bytes).await {
        Ok(outcome) => outcome.at_threshold(WS_CONF_THRESHOLD),
        Err(e) => {
            warn!(session_id, "detection failed: {e}");
            send_text(state, session_id, format!("Could not analyze image: {e}")).await;
            storage::remove_media(&path).await;
            return;
        }
    };

    if let DetectionOutcome::Hit(detection) = outcome {
        let (width, height) = frame_dimensions(&bytes);
        let normalized = detection.bbox.normalized(width, height);
        match serde_json::to_string(&normalized) {
            Ok(payload) => {
                send(state, session_id, OutgoingMessage::Bbox { data: payload }).await;
            }
            Err(e) => warn!(session_id, "bbox payload did not serialize: {e}"),
        }
    }

    storage::remove_media(&path).await;
}

/// One tracking frame. A confident hit refreshes the last-known detection;
/// a miss re-reports the previous one with decayed confidence so the client
/// can fade the overlay instead of dropping it.
async fn handle_tracking_image(state: &AppState, session_id: &str, data_b64: &str) {
    let Some(bytes) = decode_payload(state, session_id, data_b64, "image").await else {
        return;
    };

    let filename = format!("track_{}.jpg", storage::unix_millis());
    if let Err(e) = storage::save_media(&state.config.images_dir, &filename, &bytes).await {
        warn!(session_id, "tracking frame could not be saved: {e}");
    }

    let outcome = match state.detect(&bytes).await {
        Ok(outcome) => outcome.at_threshold(WS_CONF_THRESHOLD),
        Err(e) => {
            warn!(session_id, "tracking detection failed: {e}");
            send(
                state,
                session_id,
                OutgoingMessage::tracking_status(
                    TrackingStatusKind::Error,
                    format!("detection failed: {e}"),
                ),
            )
            .await;
            return;
        }
    };

    match outcome {
        DetectionOutcome::Hit(detection) => {
            let (width, height) = frame_dimensions(&bytes);
            let tracked = TrackedDetection {
                label: detection.label,
                confidence: detection.confidence,
                bbox: detection.bbox.normalized(width, height),
            };
            state.registry.record_detection(session_id, tracked.clone());
            send_tracking_result(state, session_id, tracked).await;
        }
        DetectionOutcome::Miss => match state.registry.last_detection(session_id) {
            Some(mut previous) => {
                // Compounds across consecutive misses: the decayed value is
                // written back and decayed again on the next miss.
                previous.confidence *= MISS_DECAY;
                state
                    .registry
                    .record_detection(session_id, previous.clone());
                send_tracking_result(state, session_id, previous).await;
            }
            None => {
                send(
                    state,
                    session_id,
                    OutgoingMessage::tracking_status(
                        TrackingStatusKind::Error,
                        "subject not found",
                    ),
                )
                .await;
            }
        },
    }
}

async fn handle_audio(
    state: &AppState,
    session_id: &str,
    data_b64: &str,
    filename: Option<String>,
) {
    let persona = state.registry.persona(session_id);
    if persona == UNBOUND_PERSONA {
        send_text(state, session_id, UNBOUND_GUIDANCE).await;
        return;
    }

    let filename =
        filename.unwrap_or_else(|| format!("audio_{}.mp3", storage::unix_millis()));

    match state
        .dialogue
        .ingest_audio(session_id, &persona, data_b64, &filename)
        .await
    {
        Ok(status) => send_text(state, session_id, status).await,
        Err(e) => {
            warn!(session_id, persona, "voice turn failed: {e}");
            send_text(state, session_id, format!("Could not reply right now: {e}")).await;
        }
    }
}

async fn start_tracking(state: &AppState, session_id: &str, animal_type: Option<String>) {
    let Some(target) = animal_type.filter(|t| !t.is_empty()) else {
        send(
            state,
            session_id,
            OutgoingMessage::tracking_status(
                TrackingStatusKind::Error,
                "no tracking target specified",
            ),
        )
        .await;
        return;
    };

    state.registry.start_tracking(session_id, &target);
    info!(session_id, target, "tracking started");
    send(
        state,
        session_id,
        OutgoingMessage::tracking_status(
            TrackingStatusKind::Starting,
            format!("tracking {target}"),
        ),
    )
    .await;
}

async fn stop_tracking(state: &AppState, session_id: &str) {
    state.registry.stop_tracking(session_id);
    info!(session_id, "tracking stopped");
    send(
        state,
        session_id,
        OutgoingMessage::tracking_status(TrackingStatusKind::Stopped, "tracking stopped"),
    )
    .await;
}

async fn send_tracking_result(state: &AppState, session_id: &str, tracked: TrackedDetection) {
    send(
        state,
        session_id,
        OutgoingMessage::TrackingResult {
            object_name: tracked.label,
            confidence: tracked.confidence,
            bounding_box: tracked.bbox,
        },
    )
    .await;
}

/// Read the frame's pixel dimensions without decoding it; unreadable frames
/// fall back to the fixed canvas
fn frame_dimensions(bytes: &[u8]) -> (f32, f32) {
    image::ImageReader::new(std::io::Cursor::new(bytes))
        .with_guessed_format()
        .ok()
        .and_then(|reader| reader.into_dimensions().ok())
        .map(|(width, height)| (width as f32, height as f32))
        .unwrap_or((FALLBACK_CANVAS, FALLBACK_CANVAS))
}

/// Decode a base64 payload, reporting a failure to the peer
async fn decode_payload(
    state: &AppState,
    session_id: &str,
    data_b64: &str,
    kind: &str,
) -> Option<Vec<u8>> {
    match BASE64.decode(data_b64) {
        Ok(bytes) => Some(bytes),
        Err(e) => {
            warn!(session_id, "{kind} payload did not decode: {e}");
            send_text(state, session_id, format!("Could not decode {kind}: {e}")).await;
            None
        }
    }
}

async fn send(state: &AppState, session_id: &str, message: OutgoingMessage) {
    state.registry.send(session_id, message).await;
}

async fn send_text(state: &AppState, session_id: &str, text: impl Into<String>) {
    send(state, session_id, OutgoingMessage::text(text)).await;
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use async_trait::async_trait;
    use tokio::sync::mpsc;

    use super::*;
    use crate::config::ServerConfig;
    use crate::core::completion::{CompletionProvider, CompletionResult, Turn};
    use crate::core::detect::{
        BoundingBox, Detection, DetectorResult, NormalizedBox, ObjectDetector,
    };
    use crate::core::dialogue::DialogueEngine;
    use crate::core::prompts::PersonaPrompts;
    use crate::core::synthesis::{SpeechSynthesizer, SynthesisResult};

    struct CountingCompletion {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl CompletionProvider for CountingCompletion {
        async fn complete(&self, turns: &[Turn]) -> CompletionResult<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let last = turns.last().expect("Turns should not be empty");
            Ok(format!("echo: {}", last.content))
        }
    }

    struct FixedSynth;

    #[async_trait]
    impl SpeechSynthesizer for FixedSynth {
        async fn synthesize(&self, _text: &str) -> SynthesisResult<Vec<u8>> {
            Ok(b"MP3".to_vec())
        }
    }

    /// Detector that always reports the same outcome
    struct FixedDetector(DetectionOutcome);

    #[async_trait]
    impl ObjectDetector for FixedDetector {
        async fn detect(&self, _image: &[u8]) -> DetectorResult<DetectionOutcome> {
            Ok(self.0.clone())
        }
    }

    /// Detector whose calls never resolve
    struct StalledDetector;

    #[async_trait]
    impl ObjectDetector for StalledDetector {
        async fn detect(&self, _image: &[u8]) -> DetectorResult<DetectionOutcome> {
            std::future::pending().await
        }
    }

    fn test_state(
        completion: Arc<CountingCompletion>,
        detector: Arc<dyn ObjectDetector>,
    ) -> (AppState, tempfile::TempDir) {
        let tmp = tempfile::tempdir().expect("Should create tempdir");
        let config = ServerConfig {
            images_dir: tmp.path().join("images"),
            audios_dir: tmp.path().join("audios"),
            ..Default::default()
        };
        let dialogue = DialogueEngine::new(
            completion,
            Arc::new(FixedSynth),
            PersonaPrompts::default(),
            config.completion_model.clone(),
            None,
            config.audios_dir.clone(),
            Duration::from_secs(5),
        );
        (AppState::with_services(config, dialogue, detector), tmp)
    }

    fn connected(state: &AppState, session_id: &str) -> mpsc::Receiver<OutgoingMessage> {
        let (tx, rx) = mpsc::channel(16);
        state.registry.connect(session_id, tx);
        rx
    }

    fn next_outgoing(rx: &mut mpsc::Receiver<OutgoingMessage>) -> OutgoingMessage {
        rx.try_recv().expect("Should have a routed message")
    }

    #[tokio::test]
    async fn test_unknown_type_is_echoed_by_name() {
        let completion = Arc::new(CountingCompletion {
            calls: AtomicUsize::new(0),
        });
        let (state, _tmp) =
            test_state(completion, Arc::new(FixedDetector(DetectionOutcome::Miss)));
        let mut rx = connected(&state, "c1");

        handle_text_frame(&state, "c1", r#"{"type": "dance"}"#).await;

        match next_outgoing(&mut rx) {
            OutgoingMessage::Text { data } => {
                assert_eq!(data, "unknown message type: dance");
            }
            other => panic!("Expected text, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_chat_without_persona_gets_guidance_and_no_model_call() {
        let completion = Arc::new(CountingCompletion {
            calls: AtomicUsize::new(0),
        });
        let (state, _tmp) = test_state(
            completion.clone(),
            Arc::new(FixedDetector(DetectionOutcome::Miss)),
        );
        let mut rx = connected(&state, "c1");

        handle_text_frame(&state, "c1", r#"{"type": "message", "content": "hi"}"#).await;

        match next_outgoing(&mut rx) {
            OutgoingMessage::Text { data } => assert_eq!(data, UNBOUND_GUIDANCE),
            other => panic!("Expected text, got {other:?}"),
        }
        assert_eq!(completion.calls.load(Ordering::SeqCst), 0);
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_chat_with_persona_replies_text_then_audio() {
        let completion = Arc::new(CountingCompletion {
            calls: AtomicUsize::new(0),
        });
        let (state, _tmp) =
            test_state(completion, Arc::new(FixedDetector(DetectionOutcome::Miss)));
        let mut rx = connected(&state, "c1");

        handle_text_frame(&state, "c1", r#"{"type": "set_animal", "animal_type": "fox"}"#).await;
        match next_outgoing(&mut rx) {
            OutgoingMessage::Text { data } => {
                assert_eq!(data, "fox is now your companion. Let's talk!");
            }
            other => panic!("Expected text, got {other:?}"),
        }

        handle_text_frame(&state, "c1", r#"{"type": "message", "content": "hi"}"#).await;

        match next_outgoing(&mut rx) {
            OutgoingMessage::Text { data } => assert_eq!(data, "echo: hi"),
            other => panic!("Expected text, got {other:?}"),
        }
        match next_outgoing(&mut rx) {
            OutgoingMessage::Audio { format, .. } => assert_eq!(format, "mp3"),
            other => panic!("Expected audio, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_start_tracking_requires_a_target() {
        let completion = Arc::new(CountingCompletion {
            calls: AtomicUsize::new(0),
        });
        let (state, _tmp) =
            test_state(completion, Arc::new(FixedDetector(DetectionOutcome::Miss)));
        let mut rx = connected(&state, "c1");

        handle_text_frame(&state, "c1", r#"{"type": "start_tracking"}"#).await;

        match next_outgoing(&mut rx) {
            OutgoingMessage::TrackingStatus { status, message } => {
                assert_eq!(status, TrackingStatusKind::Error);
                assert_eq!(message, "no tracking target specified");
            }
            other => panic!("Expected tracking_status, got {other:?}"),
        }
        assert!(!state.registry.is_tracking("c1"));
    }

    #[tokio::test]
    async fn test_start_and_stop_tracking_lifecycle() {
        let completion = Arc::new(CountingCompletion {
            calls: AtomicUsize::new(0),
        });
        let (state, _tmp) =
            test_state(completion, Arc::new(FixedDetector(DetectionOutcome::Miss)));
        let mut rx = connected(&state, "c1");

        handle_text_frame(
            &state,
            "c1",
            r#"{"type": "start_tracking", "animal_type": "fox"}"#,
        )
        .await;
        match next_outgoing(&mut rx) {
            OutgoingMessage::TrackingStatus { status, .. } => {
                assert_eq!(status, TrackingStatusKind::Starting);
            }
            other => panic!("Expected tracking_status, got {other:?}"),
        }
        assert!(state.registry.is_tracking("c1"));
        assert_eq!(state.registry.persona("c1"), "fox");

        handle_text_frame(&state, "c1", r#"{"type": "stop_tracking"}"#).await;
        match next_outgoing(&mut rx) {
            OutgoingMessage::TrackingStatus { status, .. } => {
                assert_eq!(status, TrackingStatusKind::Stopped);
            }
            other => panic!("Expected tracking_status, got {other:?}"),
        }
        assert!(!state.registry.is_tracking("c1"));
    }

    #[tokio::test]
    async fn test_tracking_miss_decays_previous_confidence() {
        let completion = Arc::new(CountingCompletion {
            calls: AtomicUsize::new(0),
        });
        let (state, _tmp) =
            test_state(completion, Arc::new(FixedDetector(DetectionOutcome::Miss)));
        let mut rx = connected(&state, "c1");

        state.registry.start_tracking("c1", "fox");
        state.registry.record_detection(
            "c1",
            TrackedDetection {
                label: "fox".to_string(),
                confidence: 0.9,
                bbox: NormalizedBox {
                    x: 0.1,
                    y: 0.1,
                    width: 0.2,
                    height: 0.2,
                },
            },
        );

        let frame = BASE64.encode(b"not-a-real-jpeg");
        let payload = format!(r#"{{"type": "image", "data": "{frame}"}}"#);

        handle_text_frame(&state, "c1", &payload).await;
        match next_outgoing(&mut rx) {
            OutgoingMessage::TrackingResult { confidence, .. } => {
                assert_eq!(confidence, 0.9 * MISS_DECAY);
            }
            other => panic!("Expected tracking_result, got {other:?}"),
        }

        // Second miss compounds the decay
        handle_text_frame(&state, "c1", &payload).await;
        match next_outgoing(&mut rx) {
            OutgoingMessage::TrackingResult { confidence, .. } => {
                assert_eq!(confidence, 0.9 * MISS_DECAY * MISS_DECAY);
            }
            other => panic!("Expected tracking_result, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_tracking_miss_without_prior_detection_reports_error() {
        let completion = Arc::new(CountingCompletion {
            calls: AtomicUsize::new(0),
        });
        let (state, _tmp) =
            test_state(completion, Arc::new(FixedDetector(DetectionOutcome::Miss)));
        let mut rx = connected(&state, "c1");
        state.registry.start_tracking("c1", "fox");

        let frame = BASE64.encode(b"not-a-real-jpeg");
        handle_text_frame(
            &state,
            "c1",
            &format!(r#"{{"type": "image", "data": "{frame}"}}"#),
        )
        .await;

        match next_outgoing(&mut rx) {
            OutgoingMessage::TrackingStatus { status, message } => {
                assert_eq!(status, TrackingStatusKind::Error);
                assert_eq!(message, "subject not found");
            }
            other => panic!("Expected tracking_status, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_idle_image_hit_emits_bbox_and_removes_frame() {
        let completion = Arc::new(CountingCompletion {
            calls: AtomicUsize::new(0),
        });
        let hit = DetectionOutcome::Hit(Detection {
            label: "fox".to_string(),
            confidence: 0.9,
            bbox: BoundingBox {
                x: 100.0,
                y: 100.0,
                width: 200.0,
                height: 200.0,
            },
        });
        let (state, tmp) = test_state(completion, Arc::new(FixedDetector(hit)));
        let mut rx = connected(&state, "c1");

        let frame = BASE64.encode(b"not-a-real-jpeg");
        handle_text_frame(
            &state,
            "c1",
            &format!(r#"{{"type": "image", "data": "{frame}"}}"#),
        )
        .await;

        match next_outgoing(&mut rx) {
            OutgoingMessage::Bbox { data } => {
                // Undecodable image bytes fall back to the 1000x1000 canvas
                let parsed: NormalizedBox =
                    serde_json::from_str(&data).expect("Should parse bbox payload");
                assert_eq!(parsed.x, 0.1);
                assert_eq!(parsed.width, 0.2);
            }
            other => panic!("Expected bbox, got {other:?}"),
        }

        // The one-shot frame is not retained
        let entries: Vec<_> = std::fs::read_dir(tmp.path().join("images"))
            .expect("Should read images dir")
            .collect();
        assert!(entries.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_stalled_detector_times_out_with_error_text() {
        let completion = Arc::new(CountingCompletion {
            calls: AtomicUsize::new(0),
        });
        let (state, _tmp) = test_state(completion, Arc::new(StalledDetector));
        let mut rx = connected(&state, "c1");

        let frame = BASE64.encode(b"not-a-real-jpeg");
        handle_text_frame(
            &state,
            "c1",
            &format!(r#"{{"type": "image", "data": "{frame}"}}"#),
        )
        .await;

        match next_outgoing(&mut rx) {
            OutgoingMessage::Text { data } => {
                assert!(data.starts_with("Could not analyze image:"));
                assert!(data.contains("timed out"));
            }
            other => panic!("Expected text, got {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_stalled_detector_while_tracking_reports_status_error() {
        let completion = Arc::new(CountingCompletion {
            calls: AtomicUsize::new(0),
        });
        let (state, _tmp) = test_state(completion, Arc::new(StalledDetector));
        let mut rx = connected(&state, "c1");
        state.registry.start_tracking("c1", "fox");

        let frame = BASE64.encode(b"not-a-real-jpeg");
        handle_text_frame(
            &state,
            "c1",
            &format!(r#"{{"type": "image", "data": "{frame}"}}"#),
        )
        .await;

        match next_outgoing(&mut rx) {
            OutgoingMessage::TrackingStatus { status, message } => {
                assert_eq!(status, TrackingStatusKind::Error);
                assert!(message.contains("timed out"));
            }
            other => panic!("Expected tracking_status, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_idle_image_miss_stays_silent() {
        let completion = Arc::new(CountingCompletion {
            calls: AtomicUsize::new(0),
        });
        let (state, _tmp) =
            test_state(completion, Arc::new(FixedDetector(DetectionOutcome::Miss)));
        let mut rx = connected(&state, "c1");

        let frame = BASE64.encode(b"not-a-real-jpeg");
        handle_text_frame(
            &state,
            "c1",
            &format!(r#"{{"type": "image", "data": "{frame}"}}"#),
        )
        .await;

        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_audio_without_persona_gets_guidance() {
        let completion = Arc::new(CountingCompletion {
            calls: AtomicUsize::new(0),
        });
        let (state, _tmp) = test_state(
            completion.clone(),
            Arc::new(FixedDetector(DetectionOutcome::Miss)),
        );
        let mut rx = connected(&state, "c1");

        let voice = BASE64.encode(b"voice");
        handle_text_frame(
            &state,
            "c1",
            &format!(r#"{{"type": "audio", "data": "{voice}"}}"#),
        )
        .await;

        match next_outgoing(&mut rx) {
            OutgoingMessage::Text { data } => assert_eq!(data, UNBOUND_GUIDANCE),
            other => panic!("Expected text, got {other:?}"),
        }
        assert_eq!(completion.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_audio_with_persona_saves_and_replies() {
        let completion = Arc::new(CountingCompletion {
            calls: AtomicUsize::new(0),
        });
        let (state, tmp) = test_state(
            completion,
            Arc::new(FixedDetector(DetectionOutcome::Miss)),
        );
        let mut rx = connected(&state, "c1");
        state.registry.set_persona("c1", "fox");

        let voice = BASE64.encode(b"voice");
        handle_text_frame(
            &state,
            "c1",
            &format!(r#"{{"type": "audio", "data": "{voice}", "filename": "greeting.mp3"}}"#),
        )
        .await;

        match next_outgoing(&mut rx) {
            OutgoingMessage::Text { data } => {
                assert!(data.contains("Audio saved as greeting.mp3"));
                assert!(data.contains("Reply:"));
            }
            other => panic!("Expected text, got {other:?}"),
        }
        assert!(tmp.path().join("audios").join("greeting.mp3").exists());
    }
}
