// YouTube search and audio extraction
// Uses the yt-dlp binary as a subprocess for both metadata and audio bytes

use std::io;
use std::path::PathBuf;
use std::process::Stdio;

use async_trait::async_trait;
use bytes::Bytes;
use tokio::io::AsyncReadExt;
use tokio::process::Command;
use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::player::queue::Track;
use crate::youtube::auth::YouTubeAuth;
use crate::youtube::{is_valid_video_id, watch_url, AudioStream, SearchService, StreamProvider};

const CHUNK_SIZE: usize = 16 * 1024;

// AAC in MP4 first: the terminal player decodes it, while YouTube's usual
// best audio (Opus in WebM) it cannot
pub const AUDIO_FORMAT: &str = "bestaudio[ext=m4a]/bestaudio[acodec^=mp4a]/bestaudio";

pub struct YouTubeExtractor {
    binary: PathBuf,
    auth: YouTubeAuth,
    max_results: usize,
}

impl YouTubeExtractor {
    pub fn new(binary: PathBuf, auth: YouTubeAuth, max_results: usize) -> Self {
        YouTubeExtractor {
            binary,
            auth,
            max_results,
        }
    }

    fn stream_args(&self, video_id: &str) -> Vec<String> {
        let mut args = self.auth.ytdlp_args();
        args.extend(
            ["-f", AUDIO_FORMAT, "--no-playlist", "--quiet", "--no-warnings", "-o", "-"]
                .iter()
                .map(|arg| arg.to_string()),
        );
        args.push(watch_url(video_id));
        args
    }
}

#[async_trait]
impl SearchService for YouTubeExtractor {
    async fn search(&self, query: &str) -> Result<Vec<Track>> {
        // Run yt-dlp search in a blocking task to avoid blocking async runtime
        let mut cmd = std::process::Command::new(&self.binary);
        cmd.args(self.auth.ytdlp_args())
            .arg("--dump-json")
            .arg("--flat-playlist")
            .arg("--skip-download")
            .arg("--no-warnings")
            .arg(format!("ytsearch{}:{}", self.max_results, query));

        let output = tokio::task::spawn_blocking(move || cmd.output())
            .await
            .map_err(|e| Error::Search(format!("Task join error: {}", e)))?
            .map_err(|e| Error::Search(format!("Failed to run yt-dlp: {}. Is yt-dlp installed?", e)))?;

        if !output.status.success() {
            let error = String::from_utf8_lossy(&output.stderr);
            return Err(Error::Search(format!("yt-dlp search failed: {}", error.trim())));
        }

        let stdout = String::from_utf8(output.stdout)
            .map_err(|e| Error::Search(format!("Invalid UTF-8: {}", e)))?;

        let mut results = Vec::new();
        for line in stdout.lines() {
            if line.trim().is_empty() {
                continue;
            }

            let json: serde_json::Value = serde_json::from_str(line)?;
            match parse_search_entry(&json) {
                Some(track) => results.push(track),
                None => debug!("Skipping search entry without id"),
            }
        }

        Ok(results)
    }
}

#[async_trait]
impl StreamProvider for YouTubeExtractor {
    async fn open(&self, video_id: &str) -> Result<AudioStream> {
        if !is_valid_video_id(video_id) {
            return Err(Error::InvalidVideoId(video_id.to_string()));
        }

        let mut child = Command::new(&self.binary)
            .args(self.stream_args(video_id))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            // dropping the body (client went away) kills the fetch
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| Error::Stream(format!("Failed to run yt-dlp: {}. Is yt-dlp installed?", e)))?;

        let mut stdout = child
            .stdout
            .take()
            .ok_or_else(|| Error::Stream("yt-dlp stdout not captured".to_string()))?;

        // drain stderr concurrently so yt-dlp never blocks on a full pipe
        let stderr_task = child.stderr.take().map(|mut stderr| {
            tokio::spawn(async move {
                let mut text = String::new();
                let _ = stderr.read_to_string(&mut text).await;
                text
            })
        });

        // Format selection and extraction errors all surface before the
        // first byte; report them as a plain failure instead of a stream
        let mut buf = vec![0u8; CHUNK_SIZE];
        let first = stdout.read(&mut buf).await?;
        if first == 0 {
            let status = child.wait().await?;
            let stderr = collect_stderr(stderr_task).await;
            return Err(Error::Stream(format!(
                "yt-dlp exited with {} before producing audio: {}",
                status,
                stderr.trim()
            )));
        }

        info!(video_id, "Streaming audio");
        let first_chunk = Bytes::copy_from_slice(&buf[..first]);
        let video_id = video_id.to_string();

        let stream = async_stream::stream! {
            yield Ok::<Bytes, io::Error>(first_chunk);

            loop {
                match stdout.read(&mut buf).await {
                    Ok(0) => break,
                    Ok(n) => yield Ok(Bytes::copy_from_slice(&buf[..n])),
                    Err(e) => {
                        warn!(%video_id, error = %e, "Upstream read failed");
                        yield Err(e);
                        return;
                    }
                }
            }

            match child.wait().await {
                Ok(status) if status.success() => {
                    debug!(%video_id, "Upstream fetch complete");
                }
                Ok(status) => {
                    let stderr = collect_stderr(stderr_task).await;
                    warn!(%video_id, %status, stderr = %stderr.trim(), "yt-dlp failed mid-stream");
                    yield Err(io::Error::new(
                        io::ErrorKind::Other,
                        format!("yt-dlp exited with {}", status),
                    ));
                }
                Err(e) => yield Err(e),
            }
        };

        Ok(Box::pin(stream))
    }
}

async fn collect_stderr(task: Option<tokio::task::JoinHandle<String>>) -> String {
    match task {
        Some(task) => task.await.unwrap_or_default(),
        None => String::new(),
    }
}

// Maps one line of `yt-dlp --dump-json --flat-playlist` output to a Track.
// Music uploads carry `artist`; plain videos only have channel/uploader.
pub fn parse_search_entry(json: &serde_json::Value) -> Option<Track> {
    let video_id = json["id"].as_str().filter(|id| is_valid_video_id(id))?;

    let name = json["title"].as_str().unwrap_or("Unknown").to_string();
    let artist = ["artist", "channel", "uploader"]
        .iter()
        .find_map(|key| json[*key].as_str())
        .unwrap_or("Unknown")
        .to_string();

    let thumbnail = json["thumbnail"]
        .as_str()
        .or_else(|| json["thumbnails"][0]["url"].as_str())
        .map(|s| s.to_string());

    Some(Track::new(video_id.to_string(), name, artist, thumbnail))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_flat_playlist_entry() {
        let entry = json!({
            "id": "dQw4w9WgXcQ",
            "title": "Never Gonna Give You Up",
            "channel": "Rick Astley",
            "uploader": "RickAstleyVEVO",
            "thumbnails": [{"url": "https://i.ytimg.com/vi/dQw4w9WgXcQ/hq720.jpg"}]
        });

        let track = parse_search_entry(&entry).unwrap();
        assert_eq!(track.video_id, "dQw4w9WgXcQ");
        assert_eq!(track.name, "Never Gonna Give You Up");
        assert_eq!(track.artist, "Rick Astley");
        assert_eq!(
            track.thumbnail.as_deref(),
            Some("https://i.ytimg.com/vi/dQw4w9WgXcQ/hq720.jpg")
        );
    }

    #[test]
    fn artist_field_wins_over_channel() {
        let entry = json!({"id": "abc", "title": "t", "artist": "Band", "channel": "Band - Topic"});
        assert_eq!(parse_search_entry(&entry).unwrap().artist, "Band");
    }

    #[test]
    fn missing_fields_fall_back() {
        let track = parse_search_entry(&json!({"id": "abc"})).unwrap();
        assert_eq!(track.name, "Unknown");
        assert_eq!(track.artist, "Unknown");
        assert_eq!(track.thumbnail, None);
    }

    #[test]
    fn entry_without_usable_id_is_skipped() {
        assert!(parse_search_entry(&json!({"title": "x"})).is_none());
        assert!(parse_search_entry(&json!({"id": "a b"})).is_none());
    }

    #[tokio::test]
    async fn open_rejects_invalid_id_without_spawning() {
        let extractor = YouTubeExtractor::new(
            PathBuf::from("/nonexistent/yt-dlp"),
            YouTubeAuth::default(),
            5,
        );
        let result = extractor.open("bad id").await;
        assert!(matches!(result, Err(Error::InvalidVideoId(_))));
    }

    #[tokio::test]
    async fn missing_binary_is_a_stream_error() {
        let extractor = YouTubeExtractor::new(
            PathBuf::from("/nonexistent/yt-dlp"),
            YouTubeAuth::default(),
            5,
        );
        assert!(matches!(extractor.open("abc").await, Err(Error::Stream(_))));
        assert!(matches!(extractor.search("abc").await, Err(Error::Search(_))));
    }

    #[test]
    fn stream_asks_for_a_decodable_format() {
        let extractor = YouTubeExtractor::new(PathBuf::from("yt-dlp"), YouTubeAuth::default(), 5);
        let args = extractor.stream_args("abc123");

        let format = args.iter().position(|arg| arg == "-f").map(|i| args[i + 1].as_str());
        assert_eq!(format, Some(AUDIO_FORMAT));
        assert!(AUDIO_FORMAT.starts_with("bestaudio[ext=m4a]"));
        assert_eq!(args.last().map(String::as_str), Some("https://www.youtube.com/watch?v=abc123"));
        assert!(args.windows(2).any(|w| w[0] == "-o" && w[1] == "-"));
    }

    #[test]
    fn stream_args_carry_credentials_first() {
        let auth = YouTubeAuth::new(Some("SID=1".to_string()), None);
        let extractor = YouTubeExtractor::new(PathBuf::from("yt-dlp"), auth, 5);
        let args = extractor.stream_args("abc123");

        assert_eq!(args[0], "--add-header");
        assert_eq!(args[1], "Cookie:SID=1");
    }

    // Stand-in yt-dlp: a shell script that ignores its arguments
    #[cfg(unix)]
    fn fake_ytdlp(dir: &tempfile::TempDir, body: &str) -> YouTubeExtractor {
        use std::os::unix::fs::PermissionsExt;

        let path = dir.path().join("yt-dlp");
        std::fs::write(&path, format!("#!/bin/sh\n{}\n", body)).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        YouTubeExtractor::new(path, YouTubeAuth::default(), 5)
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn streams_stdout_until_clean_exit() {
        use futures::TryStreamExt;

        let dir = tempfile::tempdir().unwrap();
        let extractor = fake_ytdlp(&dir, "printf 'ID3audio'");

        let chunks: Vec<Bytes> = extractor.open("abc").await.unwrap().try_collect().await.unwrap();
        assert_eq!(chunks.concat(), b"ID3audio");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn nothing_on_stdout_is_an_open_error() {
        let dir = tempfile::tempdir().unwrap();
        let extractor = fake_ytdlp(&dir, "echo 'Requested format is not available' >&2; exit 1");

        match extractor.open("abc").await {
            Err(Error::Stream(message)) => assert!(message.contains("Requested format")),
            Err(other) => panic!("unexpected error: {other}"),
            Ok(_) => panic!("expected open to fail"),
        }
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn failure_after_first_bytes_errors_the_stream() {
        use futures::StreamExt;

        let dir = tempfile::tempdir().unwrap();
        let extractor = fake_ytdlp(&dir, "printf 'ID3audio!!'; exit 3");

        let items: Vec<io::Result<Bytes>> = extractor.open("abc").await.unwrap().collect().await;

        let (last, received) = items.split_last().unwrap();
        let received: Vec<u8> = received
            .iter()
            .flat_map(|chunk| chunk.as_ref().unwrap().to_vec())
            .collect();
        assert_eq!(received, b"ID3audio!!");
        let err = last.as_ref().unwrap_err();
        assert!(err.to_string().contains("exit status: 3"), "unexpected error: {err}");
    }

    #[cfg(target_os = "linux")]
    fn is_running(pid: u32) -> bool {
        // a killed but not yet reaped child shows up as a zombie
        match std::fs::read_to_string(format!("/proc/{pid}/stat")) {
            Ok(stat) => !stat.contains(") Z "),
            Err(_) => false,
        }
    }

    #[cfg(target_os = "linux")]
    #[tokio::test]
    async fn dropping_the_stream_kills_ytdlp() {
        use futures::StreamExt;

        let dir = tempfile::tempdir().unwrap();
        let pid_file = dir.path().join("pid");
        let extractor = fake_ytdlp(
            &dir,
            &format!("echo $$ > '{}'; printf 'ID3'; exec sleep 30", pid_file.display()),
        );

        let mut stream = extractor.open("abc").await.unwrap();
        assert_eq!(stream.next().await.unwrap().unwrap(), Bytes::from_static(b"ID3"));

        let pid: u32 = std::fs::read_to_string(&pid_file).unwrap().trim().parse().unwrap();
        assert!(is_running(pid));

        drop(stream);

        let mut alive = true;
        for _ in 0..100 {
            if !is_running(pid) {
                alive = false;
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        }
        assert!(!alive, "yt-dlp still running after the stream was dropped");
    }
}
