// Command line and environment configuration

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use clap::{ArgAction, Args, Parser, Subcommand};

use crate::player::controller::ControllerConfig;

#[derive(Parser, Debug)]
#[command(name = "stable-stream")]
#[command(about = "YouTube music search/stream proxy and terminal player")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run the search + audio stream proxy
    Serve(ServeArgs),
    /// Run the terminal player against a proxy
    Play(PlayArgs),
}

#[derive(Args, Debug, Clone)]
pub struct ServeArgs {
    /// Address to listen on
    #[arg(long, env = "BIND_ADDR", default_value = "0.0.0.0:3000")]
    pub bind: SocketAddr,

    /// Send CORS headers and answer OPTIONS preflights
    #[arg(long, env = "CORS_ENABLED", default_value_t = true, action = ArgAction::Set)]
    pub cors: bool,

    /// Cookie header value passed to yt-dlp
    #[arg(long, env = "YT_COOKIES", hide_env_values = true)]
    pub cookies: Option<String>,

    /// Netscape-format cookie file passed to yt-dlp
    #[arg(long, env = "YT_COOKIES_FILE")]
    pub cookies_file: Option<PathBuf>,

    /// yt-dlp executable
    #[arg(long, env = "YTDLP_PATH", default_value = "yt-dlp")]
    pub ytdlp: PathBuf,

    /// Upper bound on results per search
    #[arg(long, env = "SEARCH_MAX_RESULTS", default_value_t = 15)]
    pub max_results: usize,
}

#[derive(Args, Debug, Clone)]
pub struct PlayArgs {
    /// Base URL of the proxy
    #[arg(long, env = "STABLE_STREAM_SERVER", default_value = "http://127.0.0.1:3000")]
    pub server: String,

    /// How long a track may take to start playing before it is reloaded
    #[arg(long, env = "WATCHDOG_MS", default_value_t = 3000)]
    pub watchdog_ms: u64,

    /// Give up on a frozen track after this many reloads (unbounded if unset)
    #[arg(long, env = "MAX_RECOVERIES")]
    pub max_recoveries: Option<u32>,
}

impl PlayArgs {
    pub fn controller_config(&self) -> ControllerConfig {
        ControllerConfig {
            watchdog_timeout: Duration::from_millis(self.watchdog_ms),
            max_recoveries: self.max_recoveries,
        }
    }
}
