use axum::{
    extract::{Path, Query, Request, State},
    http::header,
    response::{IntoResponse, Response},
};
use tower::ServiceExt;
use tower_http::services::ServeFile;

use crate::{
    error::{AppError, Result},
    media::{MediaRequest, validate},
    models::MediaParams,
    state::AppState,
};

/// GET /image?episodeName=...&timestamp=...: one JPEG frame
pub async fn image(
    State(state): State<AppState>,
    Query(params): Query<MediaParams>,
) -> Result<Response> {
    let req = MediaRequest::from_params(&params)?;
    let jpeg = state.media.extract_frame(&req).await?;
    Ok(([(header::CONTENT_TYPE, "image/jpeg")], jpeg).into_response())
}

/// GET /video?episodeName=...&timestamp=...: generate (or reuse) a clip and
/// return its file name, fetchable at `/<file name>`.
pub async fn video(
    State(state): State<AppState>,
    Query(params): Query<MediaParams>,
) -> Result<String> {
    let req = MediaRequest::from_params(&params)?;
    state.media.extract_clip(&req).await?;
    Ok(req.clip_file_name())
}

/// GET /{episode}.{timestamp}.webm: serve a previously generated clip
pub async fn clip_file(
    State(state): State<AppState>,
    Path(file): Path<String>,
    request: Request,
) -> Result<Response> {
    let clip = validate::parse_clip_file_name(&file).ok_or(AppError::NotFound)?;
    let path = state.media.cache().path_for(&clip);

    // ServeFile handles ranges and conditional requests, which browsers rely
    // on for <video> seeking.
    let response = ServeFile::new(path)
        .oneshot(request)
        .await
        .unwrap_or_else(|never| match never {});
    Ok(response.into_response())
}
