//! Subscription registry.
//!
//! Tracks standing subscriptions by `(channel kind, target)`. The registry
//! only records state; frames are sent by the engine. Nothing here survives
//! a disconnect.

use std::collections::HashMap;

use tracing::debug;

use rl_core::constants::ddp;

/// Logical channel kinds a subscription can target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChannelKind {
    /// Live messages of one room (`stream-room-messages`).
    RoomMessages,
}

impl ChannelKind {
    /// Subscription / collection name on the wire.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::RoomMessages => ddp::ROOM_MESSAGES_COLLECTION,
        }
    }

    /// Map a `changed` frame's collection back to a channel kind.
    pub fn from_collection(name: &str) -> Option<Self> {
        match name {
            ddp::ROOM_MESSAGES_COLLECTION => Some(Self::RoomMessages),
            _ => None,
        }
    }
}

impl std::fmt::Display for ChannelKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Subscription identity.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SubscriptionKey {
    pub kind: ChannelKind,
    pub target: String,
}

impl SubscriptionKey {
    pub fn new(kind: ChannelKind, target: impl Into<String>) -> Self {
        Self {
            kind,
            target: target.into(),
        }
    }

    pub fn room(room_id: impl Into<String>) -> Self {
        Self::new(ChannelKind::RoomMessages, room_id)
    }
}

impl std::fmt::Display for SubscriptionKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.kind, self.target)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubscriptionStatus {
    Pending,
    Active,
}

/// One tracked subscription.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Subscription {
    pub request_id: String,
    pub status: SubscriptionStatus,
}

#[derive(Debug, Default)]
pub struct SubscriptionRegistry {
    entries: HashMap<SubscriptionKey, Subscription>,
}

impl SubscriptionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether `key` is Pending or Active.
    pub fn contains(&self, key: &SubscriptionKey) -> bool {
        self.entries.contains_key(key)
    }

    pub fn get(&self, key: &SubscriptionKey) -> Option<&Subscription> {
        self.entries.get(key)
    }

    /// Record a new Pending subscription.
    ///
    /// Returns `false` and leaves the registry untouched if `key` is
    /// already tracked.
    pub fn insert(&mut self, key: SubscriptionKey, request_id: impl Into<String>) -> bool {
        if self.entries.contains_key(&key) {
            return false;
        }
        self.entries.insert(
            key,
            Subscription {
                request_id: request_id.into(),
                status: SubscriptionStatus::Pending,
            },
        );
        true
    }

    /// Mark the subscription created by `request_id` Active.
    ///
    /// Unknown ids are logged and ignored.
    pub fn confirm(&mut self, request_id: &str) -> Option<SubscriptionKey> {
        let found = self
            .entries
            .iter_mut()
            .find(|(_, sub)| sub.request_id == request_id);
        match found {
            Some((key, sub)) => {
                sub.status = SubscriptionStatus::Active;
                Some(key.clone())
            }
            None => {
                debug!("confirmation for unknown subscription request {request_id}");
                None
            }
        }
    }

    /// Drop the subscription created by `request_id`.
    pub fn remove_by_request(&mut self, request_id: &str) -> Option<SubscriptionKey> {
        let key = self
            .entries
            .iter()
            .find(|(_, sub)| sub.request_id == request_id)
            .map(|(key, _)| key.clone())?;
        self.entries.remove(&key);
        Some(key)
    }

    /// Forget everything.
    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn active_count(&self) -> usize {
        self.entries
            .values()
            .filter(|s| s.status == SubscriptionStatus::Active)
            .count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insert_is_idempotent() {
        let mut registry = SubscriptionRegistry::new();
        assert!(registry.insert(SubscriptionKey::room("R1"), "1"));
        assert!(!registry.insert(SubscriptionKey::room("R1"), "2"));
        assert_eq!(registry.len(), 1);
        assert_eq!(
            registry.get(&SubscriptionKey::room("R1")).unwrap().request_id,
            "1"
        );
    }

    #[test]
    fn test_confirm_activates() {
        let mut registry = SubscriptionRegistry::new();
        registry.insert(SubscriptionKey::room("R1"), "4");
        assert_eq!(registry.active_count(), 0);

        assert_eq!(registry.confirm("4"), Some(SubscriptionKey::room("R1")));
        assert_eq!(
            registry.get(&SubscriptionKey::room("R1")).unwrap().status,
            SubscriptionStatus::Active
        );
        assert_eq!(registry.active_count(), 1);

        // Still tracked, so a second insert is refused.
        assert!(!registry.insert(SubscriptionKey::room("R1"), "5"));
    }

    #[test]
    fn test_unmatched_confirmation_ignored() {
        let mut registry = SubscriptionRegistry::new();
        registry.insert(SubscriptionKey::room("R1"), "1");
        assert_eq!(registry.confirm("99"), None);
        assert_eq!(registry.active_count(), 0);
    }

    #[test]
    fn test_remove_and_clear() {
        let mut registry = SubscriptionRegistry::new();
        registry.insert(SubscriptionKey::room("R1"), "1");
        registry.insert(SubscriptionKey::room("R2"), "2");

        assert_eq!(registry.remove_by_request("1"), Some(SubscriptionKey::room("R1")));
        assert_eq!(registry.remove_by_request("1"), None);
        assert!(!registry.contains(&SubscriptionKey::room("R1")));

        registry.clear();
        assert!(registry.is_empty());
    }

    #[test]
    fn test_channel_kind_mapping() {
        assert_eq!(ChannelKind::RoomMessages.as_str(), "stream-room-messages");
        assert_eq!(
            ChannelKind::from_collection("stream-room-messages"),
            Some(ChannelKind::RoomMessages)
        );
        assert_eq!(ChannelKind::from_collection("stream-notify-user"), None);
        assert_eq!(
            SubscriptionKey::room("R1").to_string(),
            "stream-room-messages/R1"
        );
    }
}
