//! API endpoint modules organized by category.
//!
//! Each module adds typed methods on [`ApiClient`](crate::ApiClient) for a
//! group of related server endpoints.

pub mod auth;
pub mod chat;
pub mod rooms;
pub mod users;
