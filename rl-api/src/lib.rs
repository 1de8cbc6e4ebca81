//! RocketLink API - HTTP client for the chat server REST API.
//!
//! Covers what a chat client needs around the realtime session: login,
//! user and room listings, room history, posting messages and multipart
//! file uploads. Requests carry the `X-Auth-Token` / `X-User-Id` headers
//! once logged in; reads are retried with exponential backoff.

pub mod client;
pub mod endpoints;
pub mod media;
pub mod response;

// Re-export key types
pub use client::{ApiClient, RetryConfig};
pub use media::{guess_mime, voice_file_name};
pub use response::{PaginationMetadata, ServerResponse};
