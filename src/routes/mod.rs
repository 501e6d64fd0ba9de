pub mod admin;
pub mod media;
pub mod search;

use axum::{
    Router,
    routing::{get, post},
};
use tower_http::{
    compression::CompressionLayer,
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use crate::state::AppState;

pub fn build_router(state: AppState) -> Router {
    // The preview UI is served from elsewhere and calls us cross-origin.
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/search", get(search::search))
        .route("/image", get(media::image))
        .route("/video", get(media::video))
        .route("/clear_cache", get(admin::clear_cache))
        .route("/status", get(admin::status))
        .route("/restart", post(admin::restart))
        // Generated clips: /<episode>.<timestamp>.webm
        .route("/{file}", get(media::clip_file))
        .layer(cors)
        .layer(CompressionLayer::new())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use std::sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    };

    use axum::http::StatusCode;
    use axum_test::TestServer;
    use serde_json::{Value, json};

    use super::*;
    use crate::{
        engine::{
            SearchClient,
            tests::{ScriptedLauncher, echo_reply, opts},
        },
        media::{
            ClipCache, MediaExtractor,
            tests::{FakeTranscoder, Fixture, fixture},
        },
    };

    struct Harness {
        server: TestServer,
        transcoder: Arc<FakeTranscoder>,
        launcher: Arc<ScriptedLauncher>,
        fx: Fixture,
    }

    /// Engine echoes the query back as one flat result, except `desync`,
    /// which gets a garbage count line the first time it is sent.
    async fn harness() -> Harness {
        let poisoned = Arc::new(AtomicUsize::new(0));
        let launcher = ScriptedLauncher::new(move |q: String| {
            let first_desync = q == "desync" && poisoned.fetch_add(1, Ordering::SeqCst) == 0;
            async move {
                if first_desync {
                    Some("???\n".to_string())
                } else {
                    Some(echo_reply(&q))
                }
            }
        });
        let engine = SearchClient::start(launcher.clone(), opts()).await.unwrap();

        let fx = fixture(&["Ep1"]).await;
        let transcoder = Arc::new(FakeTranscoder::default());
        let cache = ClipCache::open(&fx.clips).await.unwrap();
        let media = MediaExtractor::new(&fx.videos, "avi", transcoder.clone(), cache);

        let state = AppState {
            engine,
            media: Arc::new(media),
        };

        Harness {
            server: TestServer::new(build_router(state)).unwrap(),
            transcoder,
            launcher,
            fx,
        }
    }

    #[tokio::test]
    async fn search_returns_flat_json() {
        let h = harness().await;
        let res = h.server.get("/search").add_query_param("q", "hello, world").await;

        res.assert_status_ok();
        assert_eq!(
            res.json::<Value>(),
            json!([{
                "similarity": 1.0,
                "episodeName": "hello, world",
                "time_begin": 0,
                "time_end": 0,
                "text": "hello, world",
            }])
        );
    }

    #[tokio::test]
    async fn empty_search_is_empty_array() {
        let h = harness().await;
        let res = h.server.get("/search").add_query_param("q", "").await;
        res.assert_status_ok();
        assert_eq!(res.json::<Value>(), json!([]));

        let res = h.server.get("/search").await;
        assert_eq!(res.json::<Value>(), json!([]));
    }

    #[tokio::test]
    async fn multi_line_search_is_bad_request() {
        let h = harness().await;
        let res = h.server.get("/search").add_query_param("q", "a\nb").await;
        res.assert_status(StatusCode::BAD_REQUEST);
        assert!(res.json::<Value>()["error"].is_string());
    }

    #[tokio::test]
    async fn desync_faults_engine_until_restart() {
        let h = harness().await;

        let res = h.server.get("/search").add_query_param("q", "desync").await;
        res.assert_status(StatusCode::INTERNAL_SERVER_ERROR);

        let res = h.server.get("/search").add_query_param("q", "after").await;
        res.assert_status(StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(h.server.get("/status").await.json::<Value>()["engine"], "faulted");

        let res = h.server.post("/restart").await;
        res.assert_status_ok();
        assert_eq!(res.json::<Value>()["engine"], "ready");
        assert_eq!(h.launcher.launches(), 2);

        let res = h.server.get("/search").add_query_param("q", "after").await;
        res.assert_status_ok();
        assert_eq!(res.json::<Value>()[0]["text"], "after");
    }

    #[tokio::test]
    async fn image_returns_jpeg() {
        let h = harness().await;
        let res = h
            .server
            .get("/image")
            .add_query_param("episodeName", "Ep1")
            .add_query_param("timestamp", "1500")
            .await;

        res.assert_status_ok();
        assert_eq!(res.header("content-type"), "image/jpeg");
        assert_eq!(&res.as_bytes()[..], b"\xFF\xD8jpeg");
    }

    #[tokio::test]
    async fn unsafe_input_is_rejected_before_ffmpeg() {
        let h = harness().await;
        for (name, ts) in [("../Ep1", "0"), ("a/b", "0"), ("a\\b", "0"), ("Ep1", "-5"), ("Ep1", "")] {
            for path in ["/image", "/video"] {
                let res = h
                    .server
                    .get(path)
                    .add_query_param("episodeName", name)
                    .add_query_param("timestamp", ts)
                    .await;
                res.assert_status(StatusCode::BAD_REQUEST);
            }
        }
        assert_eq!(h.transcoder.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn unknown_episode_is_not_found() {
        let h = harness().await;
        let res = h
            .server
            .get("/image")
            .add_query_param("episodeName", "Missing")
            .add_query_param("timestamp", "0")
            .await;
        res.assert_status_not_found();
    }

    #[tokio::test]
    async fn video_then_fetch_then_clear() {
        let h = harness().await;

        let res = h
            .server
            .get("/video")
            .add_query_param("episodeName", "Ep1")
            .add_query_param("timestamp", "1500")
            .await;
        res.assert_status_ok();
        assert_eq!(res.text(), "Ep1.1500.webm");
        assert!(h.fx.clips.join("Ep1.1500.webm").exists());

        let res = h.server.get("/Ep1.1500.webm").await;
        res.assert_status_ok();
        assert_eq!(res.header("content-type"), "video/webm");
        assert_eq!(&res.as_bytes()[..], b"webm");

        h.server.get("/clear_cache").await.assert_status_ok();
        assert!(!h.fx.clips.join("Ep1.1500.webm").exists());
        h.server.get("/Ep1.1500.webm").await.assert_status_not_found();

        // Clearing an empty cache still succeeds.
        h.server.get("/clear_cache").await.assert_status_ok();
    }

    #[tokio::test]
    async fn repeated_video_requests_transcode_once() {
        let h = harness().await;
        for _ in 0..3 {
            h.server
                .get("/video")
                .add_query_param("episodeName", "Ep1")
                .add_query_param("timestamp", "0")
                .await
                .assert_status_ok();
        }
        assert_eq!(h.transcoder.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn static_route_serves_clip_names_only() {
        let h = harness().await;
        tokio::fs::create_dir_all(&h.fx.clips).await.unwrap();
        tokio::fs::write(h.fx.clips.join("notes.txt"), b"secret").await.unwrap();
        tokio::fs::write(h.fx.clips.join("Ep1.0.webm.part"), b"half").await.unwrap();

        h.server.get("/notes.txt").await.assert_status_not_found();
        h.server.get("/Ep1.0.webm.part").await.assert_status_not_found();
        h.server.get("/Ep1.0.webm").await.assert_status_not_found();
    }

    #[tokio::test]
    async fn status_reports_protocol() {
        let h = harness().await;
        let status = h.server.get("/status").await.json::<Value>();
        assert_eq!(status, json!({"engine": "ready", "protocol": "flat"}));
    }
}
