use axum::{Json, extract::State, http::StatusCode};
use tracing::info;

use crate::{error::Result, models::EngineStatus, state::AppState};

/// GET /clear_cache: delete every generated clip
pub async fn clear_cache(State(state): State<AppState>) -> Result<StatusCode> {
    let removed = state.media.cache().evict_all().await?;
    info!("Cache cleared ({removed} clip(s))");
    Ok(StatusCode::OK)
}

/// GET /status: engine health, readable while queries are in flight
pub async fn status(State(state): State<AppState>) -> Json<EngineStatus> {
    Json(state.engine.status())
}

/// POST /restart: replace the engine process (after a desync or timeout)
pub async fn restart(State(state): State<AppState>) -> Result<Json<EngineStatus>> {
    info!("Engine restart requested");
    state.engine.restart().await?;
    Ok(Json(state.engine.status()))
}
