// Client for a running `stable-stream serve` instance
//
// The terminal player never talks to YouTube itself: search and audio both
// go through the proxy's /search and /stream endpoints.

use std::io;

use async_trait::async_trait;
use futures::TryStreamExt;

use crate::error::{Error, Result};
use crate::player::queue::Track;
use crate::youtube::{is_valid_video_id, AudioStream, SearchService, StreamProvider};

#[derive(Debug, Clone)]
pub struct RemoteClient {
    base_url: String,
    http: reqwest::Client,
}

impl RemoteClient {
    pub fn new(base_url: &str) -> Result<Self> {
        let base_url = base_url.trim_end_matches('/').to_string();
        if !(base_url.starts_with("http://") || base_url.starts_with("https://")) {
            return Err(Error::Config(format!("Server URL must be http(s): {}", base_url)));
        }

        let http = reqwest::Client::builder()
            .user_agent(concat!("stable-stream/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(RemoteClient { base_url, http })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }
}

#[async_trait]
impl SearchService for RemoteClient {
    async fn search(&self, query: &str) -> Result<Vec<Track>> {
        let response = self
            .http
            .get(self.endpoint("/search"))
            .query(&[("query", query)])
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| Error::Search(e.to_string()))?;

        let tracks = response
            .json::<Vec<Track>>()
            .await
            .map_err(|e| Error::Search(format!("Malformed search response: {}", e)))?;

        Ok(tracks)
    }
}

#[async_trait]
impl StreamProvider for RemoteClient {
    async fn open(&self, video_id: &str) -> Result<AudioStream> {
        if !is_valid_video_id(video_id) {
            return Err(Error::InvalidVideoId(video_id.to_string()));
        }

        let response = self
            .http
            .get(self.endpoint("/stream"))
            .query(&[("videoId", video_id)])
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| Error::Stream(e.to_string()))?;

        let stream = response
            .bytes_stream()
            .map_err(|e| io::Error::new(io::ErrorKind::Other, e));

        Ok(Box::pin(stream))
    }
}
