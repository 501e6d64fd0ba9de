use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;

use crate::{engine::EngineError, media::MediaError};

#[derive(Debug, Error)]
pub enum AppError {
    #[error(transparent)]
    Engine(#[from] EngineError),

    #[error(transparent)]
    Media(#[from] MediaError),

    #[error("not found")]
    NotFound,
}

impl AppError {
    fn status(&self) -> StatusCode {
        match self {
            AppError::Engine(e) => match e {
                EngineError::InvalidQuery(_) => StatusCode::BAD_REQUEST,
                EngineError::Timeout(_) | EngineError::Busy(_) => StatusCode::SERVICE_UNAVAILABLE,
                EngineError::ProtocolDesync(_)
                | EngineError::Faulted(_)
                | EngineError::Launch(_)
                | EngineError::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
            },
            AppError::Media(e) => match e {
                MediaError::InvalidInput(_) => StatusCode::BAD_REQUEST,
                MediaError::SourceMissing(_) => StatusCode::NOT_FOUND,
                MediaError::ExternalTool(_) => StatusCode::BAD_GATEWAY,
                MediaError::Timeout(_) => StatusCode::SERVICE_UNAVAILABLE,
                MediaError::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
            },
            AppError::NotFound => StatusCode::NOT_FOUND,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!("{status}: {self:#}");
        } else {
            tracing::debug!("{status}: {self}");
        }

        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}

pub type Result<T, E = AppError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[test]
    fn status_mapping() {
        let cases: Vec<(AppError, StatusCode)> = vec![
            (MediaError::InvalidInput("x".into()).into(), StatusCode::BAD_REQUEST),
            (EngineError::InvalidQuery("x".into()).into(), StatusCode::BAD_REQUEST),
            (MediaError::SourceMissing("x".into()).into(), StatusCode::NOT_FOUND),
            (AppError::NotFound, StatusCode::NOT_FOUND),
            (MediaError::ExternalTool("x".into()).into(), StatusCode::BAD_GATEWAY),
            (EngineError::Timeout(Duration::from_secs(1)).into(), StatusCode::SERVICE_UNAVAILABLE),
            (EngineError::Busy(Duration::from_secs(1)).into(), StatusCode::SERVICE_UNAVAILABLE),
            (EngineError::ProtocolDesync("x".into()).into(), StatusCode::INTERNAL_SERVER_ERROR),
            (EngineError::Faulted("x".into()).into(), StatusCode::INTERNAL_SERVER_ERROR),
        ];
        for (err, status) in cases {
            assert_eq!(err.status(), status, "{err}");
        }
    }
}
