// ==========================================
// STREAM PROXY SERVER
// ==========================================
// HTTP front for yt-dlp search and audio streaming.
//
// Routes:
// - /search?query=     JSON list of tracks ([] on upstream failure)
// - /stream?videoId=   audio/mpeg chunked relay of the track's audio
// - /api/stream        combined endpoint: query searches, videoId streams
// - /health            liveness check
//
// With CORS enabled every response carries Access-Control-Allow-Origin: *
// and the proxy endpoints answer OPTIONS with 204.

pub mod handlers;

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    http::{header, HeaderValue},
    routing::{get, MethodRouter},
    Router,
};
use tokio::signal;
use tower_http::{set_header::SetResponseHeaderLayer, trace::TraceLayer};
use tracing::info;

use crate::error::{Error, Result};
use crate::youtube::{SearchService, StreamProvider};

/// Shared state handed to every handler
#[derive(Clone)]
pub struct AppState {
    pub search: Arc<dyn SearchService>,
    pub streams: Arc<dyn StreamProvider>,
}

pub fn create_router(state: AppState, cors: bool) -> Router {
    let endpoint = |route: MethodRouter<AppState>| {
        if cors {
            route.options(handlers::preflight)
        } else {
            route
        }
    };

    let router = Router::new()
        .route("/health", get(handlers::health))
        .route("/search", endpoint(get(handlers::search)))
        .route("/stream", endpoint(get(handlers::stream)))
        .route("/api/stream", endpoint(get(handlers::combined)))
        .with_state(state);

    let router = if cors {
        router.layer(SetResponseHeaderLayer::overriding(
            header::ACCESS_CONTROL_ALLOW_ORIGIN,
            HeaderValue::from_static("*"),
        ))
    } else {
        router
    };

    router.layer(TraceLayer::new_for_http())
}

/// Binds `addr` and serves until Ctrl+C / SIGTERM.
pub async fn run(addr: SocketAddr, state: AppState, cors: bool) -> Result<()> {
    let app = create_router(state, cors);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| Error::Http(format!("Failed to bind to {}: {}", addr, e)))?;
    info!(%addr, cors, "Proxy listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|e| Error::Http(e.to_string()))?;

    info!("Server shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        let _ = signal::ctrl_c().await;
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(_) => std::future::pending::<()>().await,
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received");
}

#[cfg(test)]
mod tests {
    use std::io;

    use async_trait::async_trait;
    use axum::{
        body::Body,
        http::{Method, Request, StatusCode},
    };
    use bytes::Bytes;
    use http_body_util::BodyExt;
    use serde_json::Value;
    use tower::ServiceExt;

    use super::*;
    use crate::player::queue::Track;
    use crate::youtube::AudioStream;

    struct FakeSearch {
        fail: bool,
    }

    #[async_trait]
    impl SearchService for FakeSearch {
        async fn search(&self, query: &str) -> Result<Vec<Track>> {
            if self.fail {
                return Err(Error::Search("upstream down".to_string()));
            }
            Ok(vec![Track::new(
                "abc123".to_string(),
                format!("Result for {query}"),
                "Artist".to_string(),
                Some("https://img/abc123.jpg".to_string()),
            )])
        }
    }

    enum StreamMode {
        Ok,
        FailBeforeStart,
        FailMidStream,
    }

    struct FakeStreams {
        mode: StreamMode,
    }

    #[async_trait]
    impl StreamProvider for FakeStreams {
        async fn open(&self, _video_id: &str) -> Result<AudioStream> {
            let chunks: Vec<io::Result<Bytes>> = match self.mode {
                StreamMode::Ok => vec![Ok(Bytes::from_static(b"ID3")), Ok(Bytes::from_static(b"audio"))],
                StreamMode::FailBeforeStart => {
                    return Err(Error::Stream("no audio format".to_string()))
                }
                StreamMode::FailMidStream => vec![
                    Ok(Bytes::from_static(b"ID3")),
                    Err(io::Error::new(io::ErrorKind::Other, "connection reset")),
                ],
            };
            Ok(Box::pin(futures::stream::iter(chunks)))
        }
    }

    fn app(search_fails: bool, mode: StreamMode, cors: bool) -> Router {
        let state = AppState {
            search: Arc::new(FakeSearch { fail: search_fails }),
            streams: Arc::new(FakeStreams { mode }),
        };
        create_router(state, cors)
    }

    async fn send(app: Router, method: Method, uri: &str) -> axum::response::Response {
        let request = Request::builder()
            .method(method)
            .uri(uri)
            .header("Origin", "http://example.com")
            .body(Body::empty())
            .unwrap();
        app.oneshot(request).await.unwrap()
    }

    async fn json_body(response: axum::response::Response) -> Value {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    fn allow_origin(response: &axum::response::Response) -> Option<&str> {
        response
            .headers()
            .get(header::ACCESS_CONTROL_ALLOW_ORIGIN)
            .and_then(|v| v.to_str().ok())
    }

    #[tokio::test]
    async fn search_returns_tracks() {
        let response = send(app(false, StreamMode::Ok, true), Method::GET, "/search?query=rick").await;

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(allow_origin(&response), Some("*"));
        let body = json_body(response).await;
        assert_eq!(body[0]["videoId"], "abc123");
        assert_eq!(body[0]["name"], "Result for rick");
        assert_eq!(body[0]["artist"], "Artist");
        assert_eq!(body[0]["thumbnail"], "https://img/abc123.jpg");
    }

    #[tokio::test]
    async fn search_failure_is_empty_list() {
        let response = send(app(true, StreamMode::Ok, true), Method::GET, "/search?query=rick").await;

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(json_body(response).await, serde_json::json!([]));
    }

    #[tokio::test]
    async fn stream_relays_audio() {
        let response = send(app(false, StreamMode::Ok, true), Method::GET, "/stream?videoId=abc123").await;

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[header::CONTENT_TYPE], "audio/mpeg");
        assert_eq!(allow_origin(&response), Some("*"));
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        assert_eq!(&bytes[..], b"ID3audio");
    }

    #[tokio::test]
    async fn stream_failure_before_start_is_json_500() {
        let response = send(
            app(false, StreamMode::FailBeforeStart, true),
            Method::GET,
            "/stream?videoId=abc123",
        )
        .await;

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(allow_origin(&response), Some("*"));
        assert_eq!(json_body(response).await["error"], "Streaming failed");
    }

    #[tokio::test]
    async fn stream_failure_after_headers_errors_the_body() {
        let response = send(
            app(false, StreamMode::FailMidStream, true),
            Method::GET,
            "/stream?videoId=abc123",
        )
        .await;

        assert_eq!(response.status(), StatusCode::OK);
        assert!(response.into_body().collect().await.is_err());
    }

    #[tokio::test]
    async fn missing_video_id_is_bad_request() {
        let response = send(app(false, StreamMode::Ok, true), Method::GET, "/stream").await;

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(allow_origin(&response), Some("*"));
        assert!(json_body(response).await["error"].is_string());
    }

    #[tokio::test]
    async fn options_is_no_content_with_cors_headers() {
        let response = send(app(false, StreamMode::Ok, true), Method::OPTIONS, "/stream").await;

        assert_eq!(response.status(), StatusCode::NO_CONTENT);
        assert_eq!(allow_origin(&response), Some("*"));
        assert_eq!(
            response.headers()[header::ACCESS_CONTROL_ALLOW_METHODS],
            handlers::ALLOWED_METHODS
        );
        assert_eq!(
            response.headers()[header::ACCESS_CONTROL_ALLOW_HEADERS],
            handlers::ALLOWED_HEADERS
        );
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        assert!(bytes.is_empty());
    }

    #[tokio::test]
    async fn cors_disabled_has_no_headers_or_options() {
        let response = send(app(false, StreamMode::Ok, false), Method::GET, "/search?query=x").await;
        assert_eq!(allow_origin(&response), None);

        let response = send(app(false, StreamMode::Ok, false), Method::OPTIONS, "/stream").await;
        assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
    }

    #[tokio::test]
    async fn combined_endpoint_dispatches() {
        let response = send(app(false, StreamMode::Ok, true), Method::GET, "/api/stream?query=rick").await;
        assert_eq!(json_body(response).await[0]["videoId"], "abc123");

        let response = send(app(false, StreamMode::Ok, true), Method::GET, "/api/stream?videoId=abc123").await;
        assert_eq!(response.headers()[header::CONTENT_TYPE], "audio/mpeg");
    }

    #[tokio::test]
    async fn health_ok() {
        let response = send(app(false, StreamMode::Ok, false), Method::GET, "/health").await;
        assert_eq!(json_body(response).await["status"], "ok");
    }
}
