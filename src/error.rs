// Error types shared by the proxy, the client and the playback engine

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("HTTP server error: {0}")]
    Http(String),

    /// Search Service unreachable or returned garbage
    #[error("Search failed: {0}")]
    Search(String),

    /// Stream Provider could not produce audio for an identifier
    #[error("Streaming failed: {0}")]
    Stream(String),

    #[error("Invalid video id: {0:?}")]
    InvalidVideoId(String),

    #[error("Audio output error: {0}")]
    AudioOutput(String),

    #[error("Audio decode error: {0}")]
    Decode(String),

    /// Command issued against an engine instance that was already destroyed
    #[error("Playback engine instance {0} was destroyed")]
    EngineDestroyed(u64),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Request error: {0}")]
    Request(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
