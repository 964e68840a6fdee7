// Request handlers for the search/stream proxy

use axum::{
    body::Body,
    extract::{Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use tracing::{error, warn};

use super::AppState;
use crate::error::Error;
use crate::player::queue::Track;
use crate::youtube::{is_valid_video_id, search_or_empty};

pub const ALLOWED_METHODS: &str = "GET, POST, PUT, DELETE, OPTIONS";
pub const ALLOWED_HEADERS: &str = "Content-Type, Authorization";

#[derive(Debug, Deserialize)]
pub struct SearchParams {
    pub query: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct StreamParams {
    #[serde(rename = "videoId")]
    pub video_id: Option<String>,
}

/// Query string of the combined `/api/stream` endpoint
#[derive(Debug, Deserialize)]
pub struct CombinedParams {
    pub query: Option<String>,
    #[serde(rename = "videoId")]
    pub video_id: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: String,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
}

/// Collaborator failures are reported at the boundary with a JSON body; the
/// details only go to the log.
impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            Error::InvalidVideoId(_) => (StatusCode::BAD_REQUEST, "Invalid or missing videoId"),
            _ => (StatusCode::INTERNAL_SERVER_ERROR, "Streaming failed"),
        };

        if status.is_server_error() {
            error!(error = %self, "Request failed");
        } else {
            warn!(error = %self, "Rejected request");
        }

        (
            status,
            Json(ErrorBody {
                error: message.to_string(),
            }),
        )
            .into_response()
    }
}

pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse { status: "ok" })
}

/// GET /search?query=...
///
/// Always answers with a list; upstream failures degrade to `[]`.
pub async fn search(
    State(state): State<AppState>,
    Query(params): Query<SearchParams>,
) -> Json<Vec<Track>> {
    let query = params.query.unwrap_or_default();
    Json(search_or_empty(state.search.as_ref(), &query).await)
}

/// GET /stream?videoId=...
///
/// Relays audio bytes as they arrive. Failures before the first byte become a
/// JSON error; a failure after that aborts the chunked body.
pub async fn stream(
    State(state): State<AppState>,
    Query(params): Query<StreamParams>,
) -> Result<Response, Error> {
    open_stream(&state, params.video_id.unwrap_or_default()).await
}

/// GET /api/stream?query=... | ?videoId=...
pub async fn combined(
    State(state): State<AppState>,
    Query(params): Query<CombinedParams>,
) -> Result<Response, Error> {
    match params.query {
        Some(query) => {
            let results = search_or_empty(state.search.as_ref(), &query).await;
            Ok(Json(results).into_response())
        }
        None => open_stream(&state, params.video_id.unwrap_or_default()).await,
    }
}

/// OPTIONS on the proxy endpoints. Allow-Origin is added by the CORS layer.
pub async fn preflight() -> impl IntoResponse {
    (
        StatusCode::NO_CONTENT,
        [
            (header::ACCESS_CONTROL_ALLOW_METHODS, ALLOWED_METHODS),
            (header::ACCESS_CONTROL_ALLOW_HEADERS, ALLOWED_HEADERS),
        ],
    )
}

async fn open_stream(state: &AppState, video_id: String) -> Result<Response, Error> {
    if !is_valid_video_id(&video_id) {
        return Err(Error::InvalidVideoId(video_id));
    }

    let audio = state.streams.open(&video_id).await?;

    Ok((
        [(header::CONTENT_TYPE, "audio/mpeg")],
        Body::from_stream(audio),
    )
        .into_response())
}
