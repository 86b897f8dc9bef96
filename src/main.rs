//! Serifu - Capture-and-Narrate Workflow
//!
//! Entry point wiring the CLI subcommands to the client session, the
//! coordinator, and the one-shot recognizer/lookup utilities.

use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use tracing::{Level, info, warn};
use tracing_appender::{non_blocking, rolling};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use serifu::capture::CaptureFactory;
use serifu::cli::{Args, Commands};
use serifu::client::ConnectionManager;
use serifu::config::Config;
use serifu::recognize::RecognizerFactory;
use serifu::server::{Coordinator, LogNotifier};
use serifu::speech::SpeechFactory;
use serifu::subtitle::{SubtitleLoader, SubtitleTrack};
use serifu::workflow::CaptureWorkflow;

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    setup_logging(args.verbose)?;

    // Load configuration
    let mut config = match &args.config {
        Some(config_path) => Config::from_file(config_path)?,
        None => {
            if std::path::Path::new("config.toml").exists() {
                info!("Found config.toml in current directory, loading...");
                Config::from_file("config.toml")?
            } else {
                Config::default()
            }
        }
    };

    match args.command {
        Commands::Client {
            host,
            port,
            subtitles,
        } => {
            if let Some(host) = host {
                config.client.coordinator_host = host;
            }
            if let Some(port) = port {
                config.client.coordinator_port = port;
            }
            if let Some(subtitles) = subtitles {
                config.subtitles.source = Some(subtitles);
            }

            run_client(config).await?;
        }
        Commands::Server {
            bind,
            port,
            interval,
        } => {
            if let Some(bind) = bind {
                config.coordinator.bind_host = bind;
            }
            if let Some(port) = port {
                config.coordinator.port = port;
            }
            if let Some(interval) = interval {
                config.coordinator.trigger_interval_secs = interval;
            }

            run_server(config).await?;
        }
        Commands::Recognize { input } => {
            let image = image::open(&input)?;
            let recognizer = RecognizerFactory::create_available(config.recognizer).await;

            match recognizer.recognize(&image).await? {
                Some(timing) => println!("{}", timing),
                None => println!("No timestamp detected"),
            }
        }
        Commands::Lookup { subtitles, timing } => {
            let loader = SubtitleLoader::new();
            let track = loader.load(&subtitles).await?;

            match track.lookup(&timing) {
                Some((matched, text)) => println!("[{}] {}", matched, text),
                None => println!("No subtitle line at {}", timing),
            }
        }
    }

    Ok(())
}

/// Run the controlled-machine client until interrupted.
async fn run_client(config: Config) -> Result<()> {
    info!("Starting Serifu client");

    // Load the subtitle track. A failed load is logged and leaves the
    // track empty; every lookup then answers "nothing" until a reload.
    let track = Arc::new(RwLock::new(SubtitleTrack::new()));
    if let Some(source) = &config.subtitles.source {
        let loader = SubtitleLoader::new();
        match loader.load(source).await {
            Ok(loaded) => *track.write().await = loaded,
            Err(e) => warn!("Subtitle load failed, continuing with empty track: {}", e),
        }
    } else {
        warn!("No subtitle source configured; lookups will find nothing");
    }

    let recognizer = RecognizerFactory::create_available(config.recognizer.clone()).await;
    let speech = Arc::new(SpeechFactory::create_engine(config.speech.clone()));
    let crop_size = config.capture.region_width;

    let workflow = CaptureWorkflow::new(
        config.capture.clone(),
        config.speech.clone(),
        Arc::from(CaptureFactory::create_pointer()),
        CaptureFactory::create_capture(config.capture.clone()),
        recognizer,
        track,
        speech,
    )?;

    let shutdown = CancellationToken::new();
    spawn_signal_handler(shutdown.clone());

    let manager = ConnectionManager::new(config.client, crop_size, Arc::new(workflow), shutdown);
    info!("Client session id: {}", manager.client_id());

    manager.run().await?;

    info!("Client stopped");
    Ok(())
}

/// Run the coordinator until interrupted.
async fn run_server(config: Config) -> Result<()> {
    info!("Starting Serifu coordinator");

    let shutdown = CancellationToken::new();
    spawn_signal_handler(shutdown.clone());

    let coordinator = Arc::new(Coordinator::new(
        config.coordinator,
        Box::new(LogNotifier),
        shutdown,
    ));

    coordinator.run().await?;

    info!("Coordinator stopped");
    Ok(())
}

fn spawn_signal_handler(shutdown: CancellationToken) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Interrupt received, shutting down...");
            shutdown.cancel();
        }
    });
}

/// Setup logging to both console and file
fn setup_logging(verbose: bool) -> Result<()> {
    // Create log directory
    let serifu_dir = std::env::current_dir()?.join(".serifu");
    let log_dir = serifu_dir.join("log");
    std::fs::create_dir_all(&log_dir)?;

    // Set up file appender with daily rotation
    let file_appender = rolling::daily(&log_dir, "serifu.log");
    let (non_blocking_file, guard) = non_blocking(file_appender);
    // Keep the guard alive for the duration of the program
    std::mem::forget(guard);

    let log_level = if verbose { Level::DEBUG } else { Level::INFO };

    let console_layer = fmt::layer()
        .with_target(false)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true);

    let file_layer = fmt::layer()
        .with_writer(non_blocking_file)
        .with_target(false)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true)
        .with_ansi(false); // No ANSI colors in file

    let subscriber = tracing_subscriber::registry()
        .with(EnvFilter::from_default_env().add_directive(log_level.into()))
        .with(console_layer)
        .with(file_layer);

    subscriber
        .try_init()
        .map_err(|e| anyhow::anyhow!("Failed to initialize logging: {}", e))?;

    Ok(())
}
