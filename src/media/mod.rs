//! Still frames and short clips cut from the source videos on demand.

pub mod cache;
pub mod ffmpeg;
pub mod validate;

use std::{
    path::{Path, PathBuf},
    sync::Arc,
    time::Duration,
};

use thiserror::Error;
use tracing::{debug, info, warn};

pub use cache::ClipCache;
pub use ffmpeg::{FfmpegTranscoder, Transcoder};
pub use validate::MediaRequest;

#[derive(Debug, Error)]
pub enum MediaError {
    #[error("{0}")]
    InvalidInput(String),

    #[error("no source video for episode {0:?}")]
    SourceMissing(String),

    #[error("{0}")]
    ExternalTool(String),

    #[error("ffmpeg did not finish within {0:?}")]
    Timeout(Duration),

    #[error("media io error: {0}")]
    Io(#[from] std::io::Error),
}

pub struct MediaExtractor {
    video_dir: PathBuf,
    source_extension: String,
    transcoder: Arc<dyn Transcoder>,
    cache: ClipCache,
}

impl std::fmt::Debug for MediaExtractor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MediaExtractor")
            .field("video_dir", &self.video_dir)
            .field("source_extension", &self.source_extension)
            .field("cache", &self.cache)
            .finish()
    }
}

impl MediaExtractor {
    pub fn new(
        video_dir: impl Into<PathBuf>,
        source_extension: impl Into<String>,
        transcoder: Arc<dyn Transcoder>,
        cache: ClipCache,
    ) -> Self {
        Self {
            video_dir: video_dir.into(),
            source_extension: source_extension.into(),
            transcoder,
            cache,
        }
    }

    pub fn cache(&self) -> &ClipCache {
        &self.cache
    }

    /// `<video dir>/<episode>.<ext>`, for a name that passes the allow-list.
    pub fn source_path(&self, episode_name: &str) -> Result<PathBuf, MediaError> {
        let name = validate::episode_name_checked(episode_name)?;
        Ok(self
            .video_dir
            .join(format!("{name}.{}", self.source_extension)))
    }

    async fn existing_source(&self, episode_name: &str) -> Result<PathBuf, MediaError> {
        let path = self.source_path(episode_name)?;
        if tokio::fs::try_exists(&path).await? {
            Ok(path)
        } else {
            Err(MediaError::SourceMissing(episode_name.to_string()))
        }
    }

    /// One JPEG frame at the requested offset.
    pub async fn extract_frame(&self, req: &MediaRequest) -> Result<Vec<u8>, MediaError> {
        let source = self.existing_source(&req.episode_name).await?;
        let image = self
            .transcoder
            .run(ffmpeg::frame_args(&source, req.timestamp_ms))
            .await?;

        if image.is_empty() {
            warn!(
                "ffmpeg produced no frame for {} at {}ms",
                req.episode_name, req.timestamp_ms
            );
            return Err(MediaError::ExternalTool(
                "ffmpeg produced no image data".to_string(),
            ));
        }
        Ok(image)
    }

    /// A ten-second clip starting at the requested offset, generated at most
    /// once per `(episode, timestamp)`. Returns the clip's path.
    pub async fn extract_clip(&self, req: &MediaRequest) -> Result<PathBuf, MediaError> {
        let guard = self.cache.lock_key(req).await;
        let result = self.generate_clip(req).await;
        drop(guard);
        self.cache.prune_key_locks();
        result
    }

    async fn generate_clip(&self, req: &MediaRequest) -> Result<PathBuf, MediaError> {
        let output = self.cache.path_for(req);

        if tokio::fs::try_exists(&output).await? {
            debug!("Clip {} already exists, skipping ffmpeg", output.display());
            if self.cache.get(req).is_none() {
                self.cache.record(req.clone(), output.clone());
            }
            return Ok(output);
        }

        let source = self.existing_source(&req.episode_name).await?;
        let partial = self.cache.partial_path_for(req);

        let written = self.write_clip(&source, req.timestamp_ms, &partial).await;
        if let Err(e) = written {
            if let Err(rm) = cache::remove_if_present(&partial).await {
                warn!("Could not remove partial clip {}: {rm}", partial.display());
            }
            return Err(e);
        }

        tokio::fs::rename(&partial, &output).await?;
        info!("Generated clip {}", output.display());
        self.cache.record(req.clone(), output.clone());
        Ok(output)
    }

    async fn write_clip(
        &self,
        source: &Path,
        timestamp_ms: u64,
        partial: &Path,
    ) -> Result<(), MediaError> {
        self.transcoder
            .run(ffmpeg::clip_args(source, timestamp_ms, partial))
            .await?;

        let size = match tokio::fs::metadata(partial).await {
            Ok(meta) => meta.len(),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => 0,
            Err(e) => return Err(e.into()),
        };
        if size == 0 {
            return Err(MediaError::ExternalTool(
                "ffmpeg produced an empty clip".to_string(),
            ));
        }
        Ok(())
    }
}
