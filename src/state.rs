use std::sync::Arc;

use crate::{engine::SearchClient, media::MediaExtractor};

/// Shared application state injected into every Axum handler.
#[derive(Debug, Clone)]
pub struct AppState {
    pub engine: SearchClient,
    pub media: Arc<MediaExtractor>,
}
