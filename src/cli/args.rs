//! CLI argument definitions using Clap

use clap::{Parser, Subcommand};

/// Storycap - record audio clips, encode them to Opus, and upload them
/// with resumable transfers
#[derive(Parser, Debug)]
#[command(name = "storycap")]
#[command(version = "0.1.0")]
#[command(about = "Resumable audio clip recorder and uploader")]
#[command(long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

/// Subcommands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Record a new clip until Ctrl-C
    Record {
        /// Clip title
        #[arg(short, long, default_value = "clip")]
        title: String,

        /// Preferred input device (name substring); system default if omitted
        #[arg(short, long)]
        device: Option<String>,
    },
    /// List stored clips
    Clips,
    /// Upload a clip to an endpoint or the paired device
    Upload {
        /// Clip id (as shown by `storycap clips`)
        clip_id: String,

        /// Endpoint base URL; falls back to the configured endpoint, then
        /// the paired device
        #[arg(short, long, env = "STORYCAP_ENDPOINT")]
        endpoint: Option<String>,
    },
    /// Delete a clip and all of its stored data
    Delete {
        /// Clip id
        clip_id: String,
    },
    /// Manage paired-device credentials
    Pair {
        #[command(subcommand)]
        action: PairAction,
    },
    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

/// Pairing actions
#[derive(Subcommand, Debug)]
pub enum PairAction {
    /// Store a device URL and bearer token
    Set {
        /// Device base URL
        device: String,
        /// Bearer token from the pairing handshake
        token: String,
        /// Token lifetime in seconds
        #[arg(long)]
        ttl: Option<u64>,
    },
    /// Show the current pairing
    Show,
    /// Forget the pairing
    Clear,
}

/// Config action subcommands
#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Create config file with defaults
    Init,
    /// Set a config value
    Set {
        /// Config key
        key: String,
        /// Config value
        value: String,
    },
    /// Get a config value
    Get {
        /// Config key
        key: String,
    },
    /// List all config values
    List,
    /// Show config file path
    Path,
}
