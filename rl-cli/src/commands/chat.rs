//! Chat command - interactive realtime session.
//!
//! Live messages for the focused room are printed as they arrive; each line
//! typed on stdin is posted to that room. Lines starting with `/` are
//! commands.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use console::style;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, warn};

use rl_api::ApiClient;
use rl_core::config::{AppConfig, ConfigHandle};
use rl_core::constants;
use rl_core::error::{RlError, RlResult};
use rl_models::Room;
use rl_realtime::{
    ConnectionStatus, EventBroadcaster, Session, SessionEvent, SessionHandle, SessionOptions,
    WsConnector,
};

use crate::collab::RestCollaborator;
use crate::LoginArgs;

/// A line typed by the user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChatInput {
    Empty,
    Text(String),
    Join(String),
    Dm(String),
    Upload(PathBuf),
    Rooms,
    Status,
    Help,
    Quit,
    Invalid(String),
}

/// Parse one input line.
pub fn parse_input(line: &str) -> ChatInput {
    let line = line.trim();
    if line.is_empty() {
        return ChatInput::Empty;
    }
    let Some(command) = line.strip_prefix('/') else {
        return ChatInput::Text(line.to_string());
    };
    // "//text" posts "/text".
    if command.starts_with('/') {
        return ChatInput::Text(command.to_string());
    }

    let (name, arg) = match command.split_once(char::is_whitespace) {
        Some((name, arg)) => (name, arg.trim()),
        None => (command, ""),
    };
    match (name, arg.is_empty()) {
        ("join", false) => ChatInput::Join(arg.to_string()),
        ("dm", false) => ChatInput::Dm(arg.trim_start_matches('@').to_string()),
        ("upload", false) => ChatInput::Upload(PathBuf::from(arg)),
        ("join" | "dm" | "upload", true) => ChatInput::Invalid(format!("/{name} needs an argument")),
        ("rooms", _) => ChatInput::Rooms,
        ("status", _) => ChatInput::Status,
        ("help" | "?", _) => ChatInput::Help,
        ("quit" | "exit" | "q", _) => ChatInput::Quit,
        _ => ChatInput::Invalid(format!("unknown command /{name}")),
    }
}

struct ChatContext {
    api: ApiClient,
    handle: SessionHandle,
    username: String,
}

/// Run the chat command.
pub async fn run(
    config: ConfigHandle,
    login: LoginArgs,
    room: Option<String>,
    dm: Option<String>,
) -> RlResult<()> {
    let super::LoggedIn {
        api,
        credential,
        username,
    } = super::login(&config, login).await?;
    let cfg = config.read().await.clone();

    let options = SessionOptions::from_config(&cfg)?;
    println!(
        "{} Logged in as {}. Connecting to {}...",
        style("OK").green().bold(),
        style(&username).cyan(),
        options.url
    );

    let connector = WsConnector::new(options.connect_timeout)
        .with_headers(cfg.server.custom_headers.clone());
    let broadcaster = EventBroadcaster::new(256);
    let mut events = broadcaster.subscribe();
    let collaborator = Arc::new(RestCollaborator::new(api.clone()));
    let handle = Session::spawn(
        options,
        Arc::new(connector),
        collaborator.clone(),
        collaborator,
        Arc::new(broadcaster),
    );

    let ctx = ChatContext {
        api,
        handle,
        username,
    };

    let first_room = match dm {
        Some(peer) => open_direct_room(&ctx.api, &peer).await?,
        None => resolve_room(&ctx.api, &cfg, room.as_deref()).await,
    };
    focus(&ctx, first_room)?;
    ctx.handle.connect(credential)?;

    println!(
        "  Type to send, {} for commands, Ctrl+C to leave.",
        style("/help").bold()
    );

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            event = events.recv() => match event {
                Ok(event) => print_event(&event, &ctx),
                Err(RecvError::Lagged(n)) => {
                    println!("  {} Missed {n} events (slow consumer)", style("WARN").yellow());
                }
                Err(RecvError::Closed) => break,
            },
            line = lines.next_line() => match line? {
                Some(line) => {
                    if !handle_input(&ctx, parse_input(&line)).await {
                        break;
                    }
                }
                None => break,
            },
            _ = tokio::signal::ctrl_c() => {
                println!();
                break;
            }
        }
    }

    println!("  Disconnecting...");
    ctx.handle.shutdown();
    ctx.api.logout().await;
    Ok(())
}

/// Act on one line. Returns false to leave the session.
async fn handle_input(ctx: &ChatContext, input: ChatInput) -> bool {
    let result = match input {
        ChatInput::Empty => Ok(()),
        ChatInput::Quit => return false,
        ChatInput::Text(text) => ctx.handle.post_message(text).await,
        ChatInput::Join(target) => {
            let room = find_channel(&ctx.api, &target)
                .await
                .unwrap_or_else(|| Room::channel(target.clone(), target.clone()));
            focus(ctx, room)
        }
        ChatInput::Dm(peer) => match open_direct_room(&ctx.api, &peer).await {
            Ok(room) => focus(ctx, room),
            Err(e) => Err(e),
        },
        ChatInput::Upload(path) => upload(ctx, &path).await,
        ChatInput::Rooms => print_rooms(ctx).await,
        ChatInput::Status => print_status(ctx).await,
        ChatInput::Help => {
            print_help();
            Ok(())
        }
        ChatInput::Invalid(reason) => Err(RlError::Internal(reason)),
    };

    if let Err(e) = result {
        match e {
            RlError::SessionClosed => return false,
            other => println!("  {} {other}", style("ERROR").red().bold()),
        }
    }
    true
}

fn focus(ctx: &ChatContext, room: Room) -> RlResult<()> {
    println!();
    println!("{}", style(format!("── {} ──", room.title())).bold());
    ctx.handle.switch_room(room)
}

async fn upload(ctx: &ChatContext, path: &Path) -> RlResult<()> {
    let bytes = tokio::fs::read(path).await?;
    let filename = path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("upload")
        .to_string();
    let mime = rl_api::guess_mime(path);
    println!(
        "  Uploading {} ({})...",
        filename,
        super::send::format_bytes(bytes.len() as u64)
    );
    ctx.handle.upload_attachment(bytes, filename, mime).await
}

/// Room named on the command line, or the configured default.
async fn resolve_room(api: &ApiClient, cfg: &AppConfig, requested: Option<&str>) -> Room {
    let target = requested.unwrap_or(&cfg.session.default_room);
    match find_channel(api, target).await {
        Some(room) => room,
        None if target == constants::DEFAULT_ROOM_ID => {
            Room::channel(constants::DEFAULT_ROOM_ID, constants::DEFAULT_ROOM_NAME)
        }
        None => Room::channel(target, target),
    }
}

/// Look up a joined channel by id or name.
async fn find_channel(api: &ApiClient, target: &str) -> Option<Room> {
    let name = target.trim_start_matches('#');
    match api.joined_channels().await {
        Ok(channels) => channels
            .iter()
            .find(|c| c.id == target || c.name == name)
            .map(|c| c.to_room()),
        Err(e) => {
            warn!("could not list channels: {e}");
            None
        }
    }
}

async fn open_direct_room(api: &ApiClient, peer: &str) -> RlResult<Room> {
    let room_id = api.create_direct_room(peer).await?;
    debug!("direct room with {peer} is {room_id}");
    Ok(Room::direct(room_id, peer))
}

async fn print_rooms(ctx: &ChatContext) -> RlResult<()> {
    let channels = ctx.api.joined_channels().await?;
    let directs = ctx.api.direct_rooms().await?;
    for channel in &channels {
        println!("  {}  {}", style(format!("#{}", channel.name)).bold(), style(&channel.id).dim());
    }
    for direct in &directs {
        println!(
            "  {}  {}",
            style(format!("@{}", direct.peer_name(&ctx.username))).bold(),
            style(&direct.id).dim()
        );
    }
    Ok(())
}

async fn print_status(ctx: &ChatContext) -> RlResult<()> {
    let room = ctx.handle.active_room().await?;
    println!("  Session: {}", ctx.handle.state());
    println!(
        "  Room:    {}",
        room.map(|r| r.title()).unwrap_or_else(|| "-".to_string())
    );
    Ok(())
}

fn print_help() {
    println!("  /join <room id or #name>   switch to a channel");
    println!("  /dm <username>             open a direct conversation");
    println!("  /upload <path>             send a file to the current room");
    println!("  /rooms                     list your rooms");
    println!("  /status                    show the connection state");
    println!("  /quit                      leave");
}

fn print_event(event: &SessionEvent, ctx: &ChatContext) {
    match event {
        SessionEvent::Message(message) => {
            println!(
                "{}",
                super::render_message(message, &ctx.username, ctx.api.origin())
            );
        }
        SessionEvent::ConnectionStatus(status) => {
            let line = format!("* {status}");
            let styled = match status {
                ConnectionStatus::Authenticated | ConnectionStatus::Connected => {
                    style(line).green()
                }
                ConnectionStatus::Reconnecting { .. } | ConnectionStatus::Disconnected => {
                    style(line).yellow()
                }
                ConnectionStatus::AuthFailed(_) | ConnectionStatus::Failed(_) => {
                    style(line).red().bold()
                }
                ConnectionStatus::Connecting => style(line).dim(),
            };
            println!("  {styled}");
        }
        SessionEvent::SubscriptionReady { room_id } => {
            debug!("live updates active for room {room_id}");
        }
        SessionEvent::SendFailed { room_id, reason } => {
            println!(
                "  {} not delivered to {room_id}: {reason}",
                style("SEND FAILED").red().bold()
            );
        }
    }
}
