use axum::{
    Json,
    extract::{Query, State},
};

use crate::{
    error::Result,
    models::{EpisodeResult, SearchParams},
    state::AppState,
};

/// GET /search?q=...
///
/// Results come back in engine order, shaped by the configured wire format.
/// An empty `q` yields `[]` without a round trip to the engine.
pub async fn search(
    State(state): State<AppState>,
    Query(params): Query<SearchParams>,
) -> Result<Json<Vec<EpisodeResult>>> {
    let results = state.engine.search(&params.q).await?;
    tracing::debug!("Query {:?}: {} result(s)", params.q, results.len());
    Ok(Json(results))
}
