mod config;
mod engine;
mod error;
mod media;
mod models;
mod routes;
mod state;
mod timecode;

use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tracing::info;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use crate::{
    engine::{ClientOptions, ProcessLauncher, SearchClient},
    media::{ClipCache, FfmpegTranscoder, MediaExtractor},
    state::AppState,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // ── Arguments ────────────────────────────────────────────────────────────
    // Parsed before logging so `--help` and usage errors print cleanly.
    let cli = config::Cli::parse();

    // ── Logging ──────────────────────────────────────────────────────────────
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "karen_bridge=info,tower_http=info".into()),
        )
        .with(fmt::layer())
        .init();

    // ── Config ───────────────────────────────────────────────────────────────
    let config = config::AppConfig::from_env()?;
    info!(
        "Starting karen-bridge, binding to {} ({} engine framing)",
        config.bind, config.protocol
    );

    anyhow::ensure!(
        cli.videos_dir.is_dir(),
        "videos directory {} does not exist",
        cli.videos_dir.display()
    );

    // ── Search engine ────────────────────────────────────────────────────────
    let launcher = Arc::new(ProcessLauncher::new(cli.engine.clone(), cli.engine_args()));
    let engine = SearchClient::start(
        launcher,
        ClientOptions {
            format: config.protocol,
            exchange_timeout: config.engine_timeout(),
            queue_timeout: config.queue_timeout(),
            auto_restart: config.auto_restart,
        },
    )
    .await
    .with_context(|| format!("start search engine {}", cli.engine.display()))?;

    // ── Media ────────────────────────────────────────────────────────────────
    let cache = ClipCache::open(&config.clip_dir)
        .await
        .with_context(|| format!("open clip directory {}", config.clip_dir))?;
    info!("Serving clips from {}", cache.dir().display());

    let transcoder = Arc::new(FfmpegTranscoder::new(
        &config.ffmpeg_path,
        config.transcode_timeout(),
    ));
    let media = MediaExtractor::new(
        &cli.videos_dir,
        &config.source_extension,
        transcoder,
        cache,
    );

    // ── Application state ────────────────────────────────────────────────────
    let state = AppState {
        engine,
        media: Arc::new(media),
    };

    // ── HTTP server ──────────────────────────────────────────────────────────
    let router = routes::build_router(state);

    let listener = tokio::net::TcpListener::bind(&config.bind)
        .await
        .with_context(|| format!("bind {}", config.bind))?;
    info!("Listening on http://{}", config.bind);

    axum::serve(listener, router).await?;

    Ok(())
}
