//! Send and upload commands.

use std::path::Path;

use console::style;

use rl_core::config::ConfigHandle;
use rl_core::error::{RlError, RlResult};

use crate::LoginArgs;

/// Post one text message.
pub async fn send_text(
    config: ConfigHandle,
    login: LoginArgs,
    room: String,
    text: String,
) -> RlResult<()> {
    if text.trim().is_empty() {
        return Err(RlError::Internal("refusing to send an empty message".into()));
    }
    let session = super::login(&config, login).await?;
    let posted = session.api.post_message(&room, text.trim()).await?;
    match posted {
        Some(message) => println!("{} Sent ({})", style("OK").green().bold(), message.id),
        None => println!("{} Sent", style("OK").green().bold()),
    }
    Ok(())
}

/// Upload one file.
pub async fn upload(
    config: ConfigHandle,
    login: LoginArgs,
    room: String,
    path: String,
    description: Option<String>,
) -> RlResult<()> {
    let path = Path::new(&path);
    let bytes = tokio::fs::read(path).await?;
    let filename = path
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| RlError::Internal(format!("not a file: {}", path.display())))?
        .to_string();
    let mime = rl_api::guess_mime(path);

    let session = super::login(&config, login).await?;
    println!(
        "Uploading {filename} ({}, {mime})...",
        format_bytes(bytes.len() as u64)
    );
    session
        .api
        .upload_file(&room, bytes, &filename, mime, description.as_deref())
        .await?;
    println!("{} Uploaded", style("OK").green().bold());
    Ok(())
}

/// Format a byte count as a human-readable string.
pub fn format_bytes(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{} B", bytes)
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else if bytes < 1024 * 1024 * 1024 {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    } else {
        format!("{:.2} GB", bytes as f64 / (1024.0 * 1024.0 * 1024.0))
    }
}
