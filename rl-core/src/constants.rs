//! Application-wide constants.

/// Application name.
pub const APP_NAME: &str = "RocketLink";

/// Application version.
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

/// REST API version prefix.
pub const API_VERSION: &str = "v1";

/// Default server address used when nothing is configured.
pub const DEFAULT_SERVER_ADDRESS: &str = "http://localhost:3001";

/// Path of the realtime endpoint on the server.
pub const WEBSOCKET_PATH: &str = "/websocket";

/// Default server API timeout in milliseconds.
pub const DEFAULT_API_TIMEOUT_MS: u64 = 30_000;

/// Extended timeout multiplier for uploads.
pub const EXTENDED_TIMEOUT_MULTIPLIER: u64 = 4;

/// Delay before reconnecting after the connection drops.
pub const RECONNECT_DELAY_MS: u64 = 3_000;

/// Window for a correlated request to receive its response.
pub const DEFAULT_REQUEST_TIMEOUT_MS: u64 = 30_000;

/// Timeout for opening the realtime connection.
pub const DEFAULT_CONNECT_TIMEOUT_MS: u64 = 15_000;

/// Maximum number of message ids remembered for deduplication.
pub const MAX_SEEN_MESSAGE_HISTORY: usize = 500;

/// Number of messages fetched when a room is opened.
pub const DEFAULT_HISTORY_LIMIT: u32 = 50;

/// Maximum messages buffered per background room.
pub const DEFAULT_BUFFER_LIMIT: usize = 100;

/// Room opened after login when none is requested.
pub const DEFAULT_ROOM_ID: &str = "GENERAL";

/// Display name of the default room.
pub const DEFAULT_ROOM_NAME: &str = "general";

/// Realtime protocol constants.
pub mod ddp {
    /// Protocol version we request in the handshake.
    pub const VERSION: &str = "1";

    /// Versions we declare support for.
    pub const SUPPORTED_VERSIONS: &[&str] = &["1"];

    /// Method used to authenticate with a resume token.
    pub const LOGIN_METHOD: &str = "login";

    /// Collection carrying room message pushes.
    pub const ROOM_MESSAGES_COLLECTION: &str = "stream-room-messages";
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_protocol_constants() {
        assert_eq!(ddp::VERSION, "1");
        assert!(ddp::SUPPORTED_VERSIONS.contains(&ddp::VERSION));
        assert_eq!(ddp::ROOM_MESSAGES_COLLECTION, "stream-room-messages");
    }

    #[test]
    fn test_default_reconnect_delay() {
        assert_eq!(RECONNECT_DELAY_MS, 3_000);
    }
}
