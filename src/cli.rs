use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,

    /// Configuration file path
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the controlled-machine client
    Client {
        /// Coordinator host
        #[arg(long)]
        host: Option<String>,

        /// Coordinator port
        #[arg(long)]
        port: Option<u16>,

        /// Subtitle document to load (URL or file path)
        #[arg(short, long)]
        subtitles: Option<String>,
    },

    /// Run the coordinator
    Server {
        /// Bind address
        #[arg(long)]
        bind: Option<String>,

        /// Listener port
        #[arg(long)]
        port: Option<u16>,

        /// Periodic trigger interval in seconds (0 disables)
        #[arg(long)]
        interval: Option<u64>,
    },

    /// Run the timestamp recognizer once on an image file
    Recognize {
        /// Input image file
        #[arg(short, long)]
        input: PathBuf,
    },

    /// Look up a timing in a subtitle document
    Lookup {
        /// Subtitle document (URL or file path)
        #[arg(short, long)]
        subtitles: String,

        /// Timing to look up (H:MM:SS)
        #[arg(short, long)]
        timing: String,
    },
}
