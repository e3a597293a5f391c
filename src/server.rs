//! HTTP surface: the Telegram webhook and the housekeeping endpoint.

use std::sync::Arc;

use axum::{
    Json, Router,
    body::Bytes,
    extract::State,
    http::StatusCode,
    routing::{get, post},
};
use chrono::Utc;
use tracing::{error, info, warn};

use crate::relay::RelayBot;
use crate::relay::update::Event;
use crate::relay::worker::UpdateSender;

/// Shared state for the HTTP handlers.
pub struct AppState {
    pub bot: Arc<RelayBot>,
    pub updates: UpdateSender,
}

/// Build the router. Updates are accepted at `/{token}` so only Telegram
/// knows the webhook path.
pub fn router(token: &str, state: Arc<AppState>) -> Router {
    Router::new()
        .route(&format!("/{token}"), post(receive_update))
        .route("/cron/clearmessages", get(clear_messages))
        .with_state(state)
}

async fn receive_update(State(state): State<Arc<AppState>>, body: Bytes) -> StatusCode {
    let event = Event::decode(&body);
    if state.updates.send(event).is_err() {
        warn!("update queue closed, dropping update");
    }
    StatusCode::OK
}

async fn clear_messages(State(state): State<Arc<AppState>>) -> Json<&'static str> {
    match state.bot.purge_expired(Utc::now()) {
        Ok(purged) => {
            info!(purged, "housekeeping sweep done");
            Json("OK")
        }
        Err(e) => {
            error!("housekeeping sweep failed: {e}");
            Json("failed")
        }
    }
}
