//! CLI command implementations.

pub mod chat;
pub mod config;
pub mod history;
pub mod rooms;
pub mod send;
pub mod users;

use chrono::{DateTime, Local, Utc};
use console::style;
use dialoguer::{Input, Password};

use rl_api::ApiClient;
use rl_core::config::ConfigHandle;
use rl_core::error::{RlError, RlResult};
use rl_models::{ChatMessage, Credential};

use crate::LoginArgs;

/// Environment variable consulted for the password.
pub const PASSWORD_ENV: &str = "ROCKETLINK_PASSWORD";

/// A logged-in REST client.
pub struct LoggedIn {
    pub api: ApiClient,
    pub credential: Credential,
    pub username: String,
}

/// Helper to create an API client from config.
pub async fn create_api_client(config: &ConfigHandle) -> RlResult<ApiClient> {
    let server_config = config.read().await.server.clone();
    ApiClient::new(&server_config)
}

/// Log in with credentials from args, config, environment or prompts.
pub async fn login(config: &ConfigHandle, args: LoginArgs) -> RlResult<LoggedIn> {
    let configured = config.read().await.server.username.clone();
    let username = match args.user.or_else(|| non_empty(configured)) {
        Some(u) => u,
        None => Input::new()
            .with_prompt("Username")
            .interact_text()
            .map_err(|e| RlError::Internal(e.to_string()))?,
    };

    let password = match args
        .password
        .or_else(|| std::env::var(PASSWORD_ENV).ok().and_then(non_empty))
    {
        Some(p) => p,
        None => Password::new()
            .with_prompt(format!("Password for {username}"))
            .interact()
            .map_err(|e| RlError::Internal(e.to_string()))?,
    };

    let api = create_api_client(config).await?;
    let credential = api.login(&username, &password).await?;
    Ok(LoggedIn {
        api,
        credential,
        username,
    })
}

fn non_empty(s: String) -> Option<String> {
    if s.trim().is_empty() {
        None
    } else {
        Some(s)
    }
}

/// Truncate a string to a maximum number of characters, appending an
/// ellipsis if truncated.
pub fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else if max_len > 3 {
        let kept: String = s.chars().take(max_len - 3).collect();
        format!("{kept}...")
    } else {
        s.chars().take(max_len).collect()
    }
}

/// Local wall-clock time of a message, `HH:MM`.
pub fn format_time(ts: Option<DateTime<Utc>>) -> String {
    ts.map(|t| t.with_timezone(&Local).format("%H:%M").to_string())
        .unwrap_or_else(|| "--:--".to_string())
}

/// One message as printed in the terminal. Own messages are highlighted;
/// attachments follow as absolute links on `origin`.
pub fn render_message(message: &ChatMessage, own_username: &str, origin: &str) -> String {
    let author = message.author_name();
    let author = if message.is_from(own_username) {
        style(author).cyan().bold().to_string()
    } else {
        style(author).bold().to_string()
    };

    let mut out = format!(
        "{} {}: {}",
        style(format!("[{}]", format_time(message.timestamp))).dim(),
        author,
        message.text
    );
    for attachment in &message.attachments {
        let label = match attachment.kind() {
            Some(rl_models::AttachmentKind::Audio) => "audio",
            Some(rl_models::AttachmentKind::Image) => "image",
            _ => "file",
        };
        out.push_str(&format!(
            "\n    {} {}",
            style(format!("[{label}] {}", attachment.display_title())).yellow(),
            attachment.url(origin).unwrap_or_default()
        ));
        if let Some(description) = attachment.description.as_deref() {
            out.push_str(&format!(" ({description})"));
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate() {
        assert_eq!(truncate("hello", 10), "hello");
        assert_eq!(truncate("hello world", 8), "hello...");
        assert_eq!(truncate("héllo wörld", 8), "héllo...");
    }

    #[test]
    fn test_format_time_missing() {
        assert_eq!(format_time(None), "--:--");
    }

    #[test]
    fn test_render_message_with_attachment() {
        console::set_colors_enabled(false);
        let message = ChatMessage::from_server_map(&serde_json::json!({
            "_id": "m1",
            "rid": "R1",
            "msg": "",
            "u": {"_id": "u2", "username": "bob"},
            "attachments": [{"title": "voice-1.webm", "audio_url": "/file-upload/x/voice-1.webm"}]
        }))
        .unwrap();
        let out = render_message(&message, "alice", "http://chat.test");
        assert!(out.contains("bob: "));
        assert!(out.contains("[audio] voice-1.webm http://chat.test/file-upload/x/voice-1.webm"));
    }
}
