//! History command - latest messages of a room.

use rl_core::config::ConfigHandle;
use rl_core::error::{RlError, RlResult};
use rl_models::RoomKind;

use crate::{LoginArgs, OutputFormat};

pub async fn run(
    config: ConfigHandle,
    login: LoginArgs,
    room: String,
    kind: String,
    count: u32,
    format: OutputFormat,
) -> RlResult<()> {
    let kind = RoomKind::parse(&kind)
        .ok_or_else(|| RlError::Config(format!("unknown room kind: {kind} (use channel or dm)")))?;
    let session = super::login(&config, login).await?;
    let messages = session.api.room_history(&room, kind, count).await?;

    match format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(&messages).unwrap_or_default());
        }
        OutputFormat::Text => {
            if messages.is_empty() {
                println!("No messages.");
            }
            for message in &messages {
                println!(
                    "{}",
                    super::render_message(message, &session.username, session.api.origin())
                );
            }
        }
    }

    Ok(())
}
