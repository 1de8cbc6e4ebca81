//! Config commands.

use std::path::{Path, PathBuf};

use clap::Subcommand;
use console::style;

use rl_core::config::{AppConfig, ConfigHandle};
use rl_core::error::{RlError, RlResult};

use crate::OutputFormat;

#[derive(Subcommand)]
pub enum ConfigAction {
    /// Show the effective configuration.
    Show,
    /// Write a configuration file.
    Init {
        /// Server address.
        #[arg(short, long)]
        address: Option<String>,
        /// Username to log in with.
        #[arg(short, long)]
        username: Option<String>,
        /// Overwrite an existing file.
        #[arg(long)]
        force: bool,
    },
}

pub async fn run(
    config: ConfigHandle,
    config_path: Option<PathBuf>,
    action: ConfigAction,
    format: OutputFormat,
) -> RlResult<()> {
    let path = match config_path {
        Some(path) => path,
        None => AppConfig::default_config_path()?,
    };

    match action {
        ConfigAction::Show => {
            let cfg = config.read().await;
            match format {
                OutputFormat::Json => {
                    println!("{}", serde_json::to_string_pretty(&*cfg).unwrap_or_default());
                }
                OutputFormat::Text => {
                    let source = if path.exists() {
                        path.display().to_string()
                    } else {
                        "built-in defaults".to_string()
                    };
                    println!("{} {}", style("Config:").bold(), source);
                    for (key, value) in settings(&cfg) {
                        println!("  {:<32} {}", style(key).dim(), value);
                    }
                }
            }
        }
        ConfigAction::Init {
            address,
            username,
            force,
        } => {
            init_config(&path, address.as_deref(), username.as_deref(), force)?;
            println!("{} Config written to {}", style("OK").green(), path.display());
        }
    }

    Ok(())
}

/// Write a default configuration to `path`, with optional overrides.
pub fn init_config(
    path: &Path,
    address: Option<&str>,
    username: Option<&str>,
    force: bool,
) -> RlResult<AppConfig> {
    if path.exists() && !force {
        return Err(RlError::Config(format!(
            "{} already exists (use --force to overwrite)",
            path.display()
        )));
    }

    let mut cfg = AppConfig::default();
    if let Some(address) = address {
        cfg.server.address = AppConfig::sanitize_server_address(address);
        // Fails early on an address the session could not connect to.
        cfg.server.websocket_url()?;
    }
    if let Some(username) = username {
        cfg.server.username = username.to_string();
    }
    cfg.save_to_file(path)?;
    Ok(cfg)
}

/// Flattened `key = value` view of the configuration.
fn settings(cfg: &AppConfig) -> Vec<(&'static str, String)> {
    let s = &cfg.session;
    vec![
        ("server.address", cfg.server.address.clone()),
        ("server.username", cfg.server.username.clone()),
        ("server.api_timeout_ms", cfg.server.api_timeout_ms.to_string()),
        (
            "server.accept_self_signed_certs",
            cfg.server.accept_self_signed_certs.to_string(),
        ),
        (
            "server.websocket_url",
            cfg.server
                .websocket_url()
                .unwrap_or_else(|e| format!("<{e}>")),
        ),
        ("session.reconnect_base_ms", s.reconnect_base_ms.to_string()),
        ("session.reconnect_max_ms", s.reconnect_max_ms.to_string()),
        ("session.reconnect_multiplier", s.reconnect_multiplier.to_string()),
        ("session.reconnect_jitter", s.reconnect_jitter.to_string()),
        (
            "session.reconnect_max_attempts",
            s.reconnect_max_attempts.to_string(),
        ),
        ("session.request_timeout_ms", s.request_timeout_ms.to_string()),
        ("session.connect_timeout_ms", s.connect_timeout_ms.to_string()),
        ("session.seen_capacity", s.seen_capacity.to_string()),
        ("session.history_limit", s.history_limit.to_string()),
        (
            "session.background_messages",
            format!("{:?}", s.background_messages).to_lowercase(),
        ),
        ("session.buffer_limit", s.buffer_limit.to_string()),
        ("session.default_room", s.default_room.clone()),
        ("logging.level", cfg.logging.level.clone()),
        ("logging.directory", cfg.logging.directory.clone()),
        ("logging.json_output", cfg.logging.json_output.to_string()),
    ]
}
