// External collaborators: where track metadata and audio bytes come from
//
// The proxy implements both traits directly on top of yt-dlp
// (YouTubeExtractor); the terminal player implements them by calling the
// proxy over HTTP (RemoteClient).

pub mod auth;
pub mod extractor;
pub mod remote;

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::BoxStream;
use tracing::{info, warn};

use crate::error::Result;
use crate::player::queue::Track;

/// Raw audio bytes, forwarded chunk by chunk as they arrive.
///
/// An `Err` item means the upstream fetch died mid-stream; dropping the
/// stream cancels the fetch.
pub type AudioStream = BoxStream<'static, std::io::Result<Bytes>>;

#[async_trait]
pub trait SearchService: Send + Sync {
    async fn search(&self, query: &str) -> Result<Vec<Track>>;
}

#[async_trait]
pub trait StreamProvider: Send + Sync {
    /// Resolves `video_id` and starts the fetch. Errors returned here happen
    /// before any byte was produced.
    async fn open(&self, video_id: &str) -> Result<AudioStream>;
}

/// YouTube ids are 11 chars of [A-Za-z0-9_-]; be a bit lenient on length but
/// never let anything else reach a subprocess argument or a URL.
pub fn is_valid_video_id(video_id: &str) -> bool {
    !video_id.is_empty()
        && video_id.len() <= 64
        && video_id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}

pub fn watch_url(video_id: &str) -> String {
    format!("https://www.youtube.com/watch?v={}", video_id)
}

// Search as seen by callers: blank queries never reach the service and
// service failures become an empty list, so nothing ever propagates.
pub async fn search_or_empty(service: &dyn SearchService, query: &str) -> Vec<Track> {
    let query = query.trim();
    if query.is_empty() {
        return Vec::new();
    }

    match service.search(query).await {
        Ok(results) => {
            info!(query, count = results.len(), "Search complete");
            results
        }
        Err(e) => {
            warn!(query, error = %e, "Search failed");
            Vec::new()
        }
    }
}
