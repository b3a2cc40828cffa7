//! Plain HTTP handlers
//!
//! The identify endpoint exists for clients whose capture pipeline sits
//! outside the WebSocket channel: it runs the same detection path and,
//! given a `session_id`, binds the detected persona to that session
//! out-of-band.

use axum::Json;
use axum::extract::State;
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tracing::info;

use crate::core::detect::DetectionOutcome;
use crate::core::prompts::UNBOUND_PERSONA;
use crate::errors::{AppError, AppResult};
use crate::state::AppState;
use crate::utils::storage;

/// Minimum confidence for the identify endpoint to accept a detection
const IDENTIFY_CONF_THRESHOLD: f32 = 0.2;

/// Health check endpoint
pub async fn health_check() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "timestamp": storage::unix_millis() as u64,
    }))
}

#[derive(Debug, Deserialize)]
pub struct IdentifyRequest {
    pub image: String,
    /// When present, the detected persona is bound to this session
    #[serde(default)]
    pub session_id: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct IdentifyResponse {
    pub animal: String,
    pub confidence: f32,
    pub filename: String,
}

/// Identify the animal in a base64-encoded image and optionally bind it as
/// the persona of an existing session
pub async fn identify_animal(
    State(state): State<AppState>,
    Json(request): Json<IdentifyRequest>,
) -> AppResult<Json<IdentifyResponse>> {
    let bytes = BASE64
        .decode(&request.image)
        .map_err(|e| AppError::BadRequest(format!("image is not valid base64: {e}")))?;

    let filename = format!("animal_{}.jpg", storage::unix_millis());
    storage::save_media(&state.config.images_dir, &filename, &bytes).await?;

    let outcome = state
        .detect(&bytes)
        .await?
        .at_threshold(IDENTIFY_CONF_THRESHOLD);

    let (animal, confidence) = match outcome {
        DetectionOutcome::Hit(detection) => (detection.label, detection.confidence),
        DetectionOutcome::Miss => (UNBOUND_PERSONA.to_string(), 0.0),
    };

    if let Some(session_id) = &request.session_id {
        state.registry.set_persona(session_id, &animal);
        info!(session_id, animal, "persona bound via identify endpoint");
    }

    Ok(Json(IdentifyResponse {
        animal,
        confidence,
        filename,
    }))
}
