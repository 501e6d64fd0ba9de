use std::{ffi::OsString, path::PathBuf, time::Duration};

use anyhow::Context;
use clap::Parser;
use serde::Deserialize;

use crate::models::WireFormat;

/// Positional arguments: the engine and the three paths it is started with.
#[derive(Debug, Clone, Parser)]
#[command(name = "karen-bridge", version, about)]
pub struct Cli {
    /// Path to the search engine executable.
    pub engine: PathBuf,

    /// Directory holding the source videos (`<episode>.<ext>`).
    pub videos_dir: PathBuf,

    /// Subtitle directory, passed through to the engine.
    pub subtitles_dir: PathBuf,

    /// Offsets file, passed through to the engine.
    pub offsets_file: PathBuf,
}

impl Cli {
    /// Arguments the engine is launched with.
    pub fn engine_args(&self) -> Vec<OsString> {
        vec![
            self.videos_dir.clone().into_os_string(),
            self.subtitles_dir.clone().into_os_string(),
            self.offsets_file.clone().into_os_string(),
        ]
    }
}

/// Tunables, loaded from environment variables / .env.
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    /// Bind address for the HTTP server.
    #[serde(default = "default_bind")]
    pub bind: String,

    /// Response framing the engine emits: `flat` or `grouped`.
    #[serde(default)]
    pub protocol: WireFormat,

    /// Path to the ffmpeg binary.
    #[serde(default = "default_ffmpeg_path")]
    pub ffmpeg_path: String,

    /// Directory where generated clips are written and served from.
    #[serde(default = "default_clip_dir")]
    pub clip_dir: String,

    /// Extension of the source videos.
    #[serde(default = "default_source_extension")]
    pub source_extension: String,

    /// Longest a single engine exchange may take before the engine is
    /// considered hung.
    #[serde(default = "default_engine_timeout_secs")]
    pub engine_timeout_secs: u64,

    /// Longest a query waits for its turn at the engine.
    #[serde(default = "default_queue_timeout_secs")]
    pub queue_timeout_secs: u64,

    /// Longest a single ffmpeg run may take.
    #[serde(default = "default_transcode_timeout_secs")]
    pub transcode_timeout_secs: u64,

    /// Relaunch a faulted engine on the next query instead of waiting for
    /// `POST /restart`.
    #[serde(default)]
    pub auto_restart: bool,
}

fn default_bind() -> String {
    "0.0.0.0:8000".to_string()
}
fn default_ffmpeg_path() -> String {
    "ffmpeg".to_string()
}
fn default_clip_dir() -> String {
    "clips".to_string()
}
fn default_source_extension() -> String {
    "avi".to_string()
}
fn default_engine_timeout_secs() -> u64 {
    30
}
fn default_queue_timeout_secs() -> u64 {
    60
}
fn default_transcode_timeout_secs() -> u64 {
    120
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        // Load .env if present; a missing file is fine
        let _ = dotenvy::dotenv();

        let config: AppConfig =
            envy::from_env().context("Failed to load config from environment")?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> anyhow::Result<()> {
        for (name, secs) in [
            ("ENGINE_TIMEOUT_SECS", self.engine_timeout_secs),
            ("QUEUE_TIMEOUT_SECS", self.queue_timeout_secs),
            ("TRANSCODE_TIMEOUT_SECS", self.transcode_timeout_secs),
        ] {
            anyhow::ensure!(secs > 0, "{name} must be greater than zero");
        }
        anyhow::ensure!(
            !self.source_extension.is_empty()
                && self.source_extension.chars().all(|c| c.is_ascii_alphanumeric()),
            "SOURCE_EXTENSION must be a plain extension such as `avi`, got {:?}",
            self.source_extension
        );
        Ok(())
    }

    pub fn engine_timeout(&self) -> Duration {
        Duration::from_secs(self.engine_timeout_secs)
    }

    pub fn queue_timeout(&self) -> Duration {
        Duration::from_secs(self.queue_timeout_secs)
    }

    pub fn transcode_timeout(&self) -> Duration {
        Duration::from_secs(self.transcode_timeout_secs)
    }
}
