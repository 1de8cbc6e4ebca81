//! Users command - list users and presence.

use comfy_table::{modifiers::UTF8_ROUND_CORNERS, presets::UTF8_FULL, ContentArrangement, Table};
use console::style;

use rl_core::config::ConfigHandle;
use rl_core::error::RlResult;

use crate::{LoginArgs, OutputFormat};

pub async fn run(config: ConfigHandle, login: LoginArgs, format: OutputFormat) -> RlResult<()> {
    let session = super::login(&config, login).await?;
    let mut users = session.api.list_users().await?;
    users.retain(|u| u.username != session.username);
    users.sort_by(|a, b| {
        b.is_online()
            .cmp(&a.is_online())
            .then_with(|| a.username.to_lowercase().cmp(&b.username.to_lowercase()))
    });

    match format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(&users).unwrap_or_default());
        }
        OutputFormat::Text => {
            if users.is_empty() {
                println!("No other users.");
                return Ok(());
            }

            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .apply_modifier(UTF8_ROUND_CORNERS)
                .set_content_arrangement(ContentArrangement::Dynamic);
            table.set_header(vec!["Username", "Name", "Status"]);

            for user in &users {
                let status = user.status.as_deref().unwrap_or("offline");
                let status = if user.is_online() {
                    style(status).green().to_string()
                } else {
                    style(status).dim().to_string()
                };
                table.add_row(vec![
                    user.username.clone(),
                    super::truncate(user.name.as_deref().unwrap_or("-"), 30),
                    status,
                ]);
            }

            println!("{table}");
        }
    }

    Ok(())
}
