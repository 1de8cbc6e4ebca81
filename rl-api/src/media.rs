//! File naming and content type helpers for uploads.

use std::path::Path;

use chrono::{DateTime, Utc};

/// Content type for a file, from its extension.
pub fn guess_mime(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .unwrap_or_default();
    match ext.as_str() {
        "webm" => "audio/webm",
        "ogg" | "oga" | "opus" => "audio/ogg",
        "mp3" => "audio/mpeg",
        "m4a" => "audio/mp4",
        "wav" => "audio/wav",
        "mp4" => "video/mp4",
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "webp" => "image/webp",
        "pdf" => "application/pdf",
        "txt" | "log" => "text/plain",
        "json" => "application/json",
        "zip" => "application/zip",
        _ => "application/octet-stream",
    }
}

/// File extension for a recorded audio clip of type `mime_type`.
///
/// Parameters such as `;codecs=opus` are ignored. Unknown types get `webm`.
pub fn voice_extension(mime_type: &str) -> &'static str {
    let base = mime_type.split(';').next().unwrap_or_default();
    if base.contains("ogg") {
        "ogg"
    } else if base.contains("mp4") {
        "mp4"
    } else if base.contains("mpeg") {
        "mp3"
    } else if base.contains("wav") {
        "wav"
    } else {
        "webm"
    }
}

/// Name for a voice message recorded at `recorded_at`: `voice-<millis>.<ext>`.
pub fn voice_file_name(mime_type: &str, recorded_at: DateTime<Utc>) -> String {
    format!(
        "voice-{}.{}",
        recorded_at.timestamp_millis(),
        voice_extension(mime_type)
    )
}

/// Whether a content type is audio, so the upload is labelled a voice message.
pub fn is_audio(mime_type: &str) -> bool {
    mime_type.starts_with("audio/")
}
