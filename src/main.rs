// Entry point: `serve` runs the HTTP proxy, `play` runs the terminal player

mod config;
mod error;
mod player;
mod server;
mod ui;
mod youtube;

use std::fs::{self, File};
use std::sync::{Arc, Mutex};

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use config::{Cli, Command, PlayArgs, ServeArgs};
use player::audio::AudioEngineFactory;
use player::controller::Controller;
use player::events;
use server::AppState;
use ui::app::MusicPlayerApp;
use youtube::auth::YouTubeAuth;
use youtube::extractor::YouTubeExtractor;
use youtube::remote::RemoteClient;

const DEFAULT_LOG_FILTER: &str = "stable_stream=info,tower_http=info";

fn env_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER))
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Command::Serve(args) => serve(args).await,
        Command::Play(args) => play(args).await,
    }
}

async fn serve(args: ServeArgs) -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(env_filter())
        .with_writer(std::io::stderr)
        .init();

    let auth = YouTubeAuth::new(args.cookies.clone(), args.cookies_file.clone());
    if !auth.is_authenticated() {
        warn!("No YouTube cookies configured, running unauthenticated");
    }

    let extractor = Arc::new(YouTubeExtractor::new(args.ytdlp.clone(), auth, args.max_results));
    let state = AppState {
        search: extractor.clone(),
        streams: extractor,
    };

    info!(bind = %args.bind, ytdlp = %args.ytdlp.display(), "Starting stream proxy");
    server::run(args.bind, state, args.cors)
        .await
        .context("Proxy server failed")
}

async fn play(args: PlayArgs) -> Result<()> {
    // The TUI owns the terminal, so logs go to a file
    let log_dir = dirs::cache_dir()
        .context("Could not determine cache directory")?
        .join("stable-stream");
    fs::create_dir_all(&log_dir)
        .with_context(|| format!("Failed to create log directory {}", log_dir.display()))?;
    let log_path = log_dir.join("client.log");
    let log_file = File::create(&log_path)
        .with_context(|| format!("Failed to open log file {}", log_path.display()))?;

    tracing_subscriber::fmt()
        .with_env_filter(env_filter())
        .with_writer(Mutex::new(log_file))
        .with_ansi(false)
        .init();

    // Suppress ALSA buffer warnings that would otherwise bleed into the TUI
    std::env::set_var("ALSA_PCM_NO_MMAP", "1");

    let client = Arc::new(RemoteClient::new(&args.server).context("Invalid --server URL")?);
    let factory = AudioEngineFactory::new(client.clone()).context("Failed to open audio output")?;

    let (tx, rx) = events::channel();
    let controller = Controller::new(args.controller_config(), Box::new(factory), tx);

    info!(server = %client.base_url(), log = %log_path.display(), "Starting player");
    let mut app = MusicPlayerApp::new(controller, rx, client);
    app.run().await.context("Terminal player failed")?;

    Ok(())
}
