//! Rooms command - joined channels and direct rooms.

use comfy_table::{modifiers::UTF8_ROUND_CORNERS, presets::UTF8_FULL, ContentArrangement, Table};

use rl_core::config::ConfigHandle;
use rl_core::error::RlResult;

use crate::{LoginArgs, OutputFormat};

pub async fn run(config: ConfigHandle, login: LoginArgs, format: OutputFormat) -> RlResult<()> {
    let session = super::login(&config, login).await?;
    let channels = session.api.joined_channels().await?;
    let directs = session.api.direct_rooms().await?;

    match format {
        OutputFormat::Json => {
            let json = serde_json::json!({
                "channels": channels,
                "direct": directs
                    .iter()
                    .map(|d| serde_json::json!({
                        "id": d.id,
                        "peer": d.peer_name(&session.username),
                        "usernames": d.usernames,
                    }))
                    .collect::<Vec<_>>(),
            });
            println!("{}", serde_json::to_string_pretty(&json).unwrap_or_default());
        }
        OutputFormat::Text => {
            if channels.is_empty() && directs.is_empty() {
                println!("No rooms found.");
                return Ok(());
            }

            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .apply_modifier(UTF8_ROUND_CORNERS)
                .set_content_arrangement(ContentArrangement::Dynamic);
            table.set_header(vec!["Room", "Kind", "Id", "Messages"]);

            for channel in &channels {
                let room = channel.to_room();
                table.add_row(vec![
                    super::truncate(&room.title(), 30),
                    room.kind.to_string(),
                    room.id.clone(),
                    channel.message_count.to_string(),
                ]);
            }
            for direct in &directs {
                let room = direct.to_room(&session.username);
                table.add_row(vec![
                    super::truncate(&room.title(), 30),
                    room.kind.to_string(),
                    room.id.clone(),
                    "-".to_string(),
                ]);
            }

            println!("{table}");
            println!(
                "\n{} channels, {} direct rooms",
                channels.len(),
                directs.len()
            );
        }
    }

    Ok(())
}
