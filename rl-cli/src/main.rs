//! RocketLink CLI - Command-line chat client.
//!
//! Logs in over REST, then either runs an interactive realtime chat session
//! or performs one-shot operations (listings, history, send, upload) for
//! scripting.

mod collab;
mod commands;

use clap::{Parser, Subcommand};
use tracing::info;

use rl_core::config::{AppConfig, ConfigHandle};
use rl_core::error::RlResult;
use rl_core::logging;
use rl_core::platform::Platform;

/// RocketLink - realtime chat from the terminal.
#[derive(Parser)]
#[command(
    name = "rocketlink",
    version,
    about = "RocketLink chat client CLI",
    long_about = "A command-line client for a Rocket.Chat style server.\n\
                   Log in, follow rooms live, and send messages and files from any terminal."
)]
struct Cli {
    /// Path to the configuration file.
    #[arg(short, long, global = true)]
    config: Option<String>,

    /// Enable verbose logging (debug level).
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Output format (text, json).
    #[arg(short = 'f', long, global = true, default_value = "text")]
    format: OutputFormat,

    /// Username (overrides config).
    #[arg(short, long, global = true)]
    user: Option<String>,

    /// Password. Falls back to $ROCKETLINK_PASSWORD, then a prompt.
    #[arg(long, global = true)]
    password: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

/// Output format for CLI responses.
#[derive(Debug, Clone, Copy, clap::ValueEnum)]
pub enum OutputFormat {
    /// Human-readable text output.
    Text,
    /// JSON output for scripting.
    Json,
}

#[derive(Subcommand)]
enum Commands {
    /// Open an interactive chat session with live messages.
    Chat {
        /// Room id to open first (defaults to the configured room).
        #[arg(short, long, conflicts_with = "dm")]
        room: Option<String>,
        /// Open the direct room with this user instead.
        #[arg(long)]
        dm: Option<String>,
    },
    /// List joined channels and direct rooms.
    Rooms,
    /// List users and their presence.
    Users,
    /// Show the latest messages of a room.
    History {
        /// Room id.
        #[arg(short, long)]
        room: String,
        /// Room kind (channel, dm).
        #[arg(short, long, default_value = "channel")]
        kind: String,
        /// Number of messages.
        #[arg(short = 'n', long, default_value = "50")]
        count: u32,
    },
    /// Post a text message to a room.
    Send {
        /// Room id.
        #[arg(short, long)]
        room: String,
        /// Message text.
        text: String,
    },
    /// Upload a file to a room.
    Upload {
        /// Room id.
        #[arg(short, long)]
        room: String,
        /// File to upload.
        path: String,
        /// Optional description shown with the file.
        #[arg(short, long)]
        description: Option<String>,
    },
    /// View or create the configuration file.
    Config {
        #[command(subcommand)]
        action: commands::config::ConfigAction,
    },
}

/// Credentials given on the command line.
pub struct LoginArgs {
    pub user: Option<String>,
    pub password: Option<String>,
}

#[tokio::main]
async fn main() -> RlResult<()> {
    let cli = Cli::parse();

    // Load configuration
    let config_path = cli.config.as_deref().map(std::path::PathBuf::from);
    let config = match &config_path {
        Some(path) => AppConfig::load_from_file(path)?,
        None => AppConfig::load_default()?,
    };

    // Initialize logging
    let log_dir = config
        .effective_log_dir()
        .unwrap_or_else(|_| std::path::PathBuf::from("logs"));
    let _guard = logging::init_from_config(&config.logging, &log_dir, cli.verbose)?;

    info!(
        "{} CLI v{} on {}",
        rl_core::constants::APP_NAME,
        rl_core::constants::APP_VERSION,
        Platform::current()
    );

    let config_handle = ConfigHandle::new(config);
    let login = LoginArgs {
        user: cli.user,
        password: cli.password,
    };

    // Dispatch to command handlers
    match cli.command {
        Commands::Chat { room, dm } => commands::chat::run(config_handle, login, room, dm).await,
        Commands::Rooms => commands::rooms::run(config_handle, login, cli.format).await,
        Commands::Users => commands::users::run(config_handle, login, cli.format).await,
        Commands::History { room, kind, count } => {
            commands::history::run(config_handle, login, room, kind, count, cli.format).await
        }
        Commands::Send { room, text } => {
            commands::send::send_text(config_handle, login, room, text).await
        }
        Commands::Upload {
            room,
            path,
            description,
        } => commands::send::upload(config_handle, login, room, path, description).await,
        Commands::Config { action } => {
            commands::config::run(config_handle, config_path, action, cli.format).await
        }
    }
}
