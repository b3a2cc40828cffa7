//! Route configuration

use axum::Router;
use axum::routing::{get, post};

use crate::handlers::{api, ws};
use crate::state::AppState;

/// Build the application router
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health-check", get(api::health_check))
        .route("/identify-animal", post(api::identify_animal))
        .route("/ws", get(ws::ws_handler))
        .with_state(state)
}
