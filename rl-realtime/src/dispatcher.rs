//! Message dispatch with deduplication.
//!
//! Messages reach the UI through [`MessageDispatcher::dispatch`], whether
//! they came from a history fetch or the live stream. Each identity is
//! delivered at most once while it stays in the bounded seen-set.

use std::collections::{HashMap, HashSet, VecDeque};

use tracing::debug;

use rl_models::ChatMessage;

use crate::events::UiSink;

/// Bounded set of recently seen message ids. The oldest insert ages out
/// first once capacity is exceeded.
#[derive(Debug)]
pub struct SeenMessages {
    ids: HashSet<String>,
    order: VecDeque<String>,
    capacity: usize,
}

impl SeenMessages {
    pub fn new(capacity: usize) -> Self {
        Self {
            ids: HashSet::new(),
            order: VecDeque::new(),
            capacity: capacity.max(1),
        }
    }

    pub fn contains(&self, id: &str) -> bool {
        self.ids.contains(id)
    }

    /// Insert `id`; returns `false` if it was already present.
    pub fn insert(&mut self, id: &str) -> bool {
        if !self.ids.insert(id.to_string()) {
            return false;
        }
        self.order.push_back(id.to_string());
        while self.order.len() > self.capacity {
            if let Some(oldest) = self.order.pop_front() {
                self.ids.remove(&oldest);
            }
        }
        true
    }

    pub fn clear(&mut self) {
        self.ids.clear();
        self.order.clear();
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}

/// What happens to messages for rooms that are not focused.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackgroundPolicy {
    /// Drop them.
    Discard,
    /// Keep up to `per_room_limit` per room and hand them over on focus.
    Buffer { per_room_limit: usize },
}

impl Default for BackgroundPolicy {
    fn default() -> Self {
        Self::Discard
    }
}

/// Outcome of one dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    Delivered,
    Duplicate,
    Buffered,
    Dropped,
}

#[derive(Debug)]
pub struct MessageDispatcher {
    seen: SeenMessages,
    policy: BackgroundPolicy,
    buffered: HashMap<String, VecDeque<ChatMessage>>,
}

impl MessageDispatcher {
    pub fn new(seen_capacity: usize, policy: BackgroundPolicy) -> Self {
        Self {
            seen: SeenMessages::new(seen_capacity),
            policy,
            buffered: HashMap::new(),
        }
    }

    pub fn policy(&self) -> BackgroundPolicy {
        self.policy
    }

    /// Route one message.
    ///
    /// Duplicates are dropped silently. A new message is recorded as seen
    /// and delivered to `sink` if it belongs to `active_room`; otherwise the
    /// background policy applies.
    pub fn dispatch(
        &mut self,
        message: ChatMessage,
        active_room: Option<&str>,
        sink: &dyn UiSink,
    ) -> Delivery {
        if self.seen.contains(&message.id) {
            debug!("duplicate message {} in room {} skipped", message.id, message.room_id);
            return Delivery::Duplicate;
        }

        if active_room == Some(message.room_id.as_str()) {
            self.seen.insert(&message.id);
            sink.on_message(&message);
            return Delivery::Delivered;
        }

        match self.policy {
            BackgroundPolicy::Discard => {
                self.seen.insert(&message.id);
                debug!("message {} for unfocused room {} dropped", message.id, message.room_id);
                Delivery::Dropped
            }
            BackgroundPolicy::Buffer { per_room_limit } => {
                let queue = self.buffered.entry(message.room_id.clone()).or_default();
                // Already queued messages are not in the seen-set, so check here.
                if queue.iter().any(|m| m.id == message.id) {
                    return Delivery::Duplicate;
                }
                debug!("message {} for unfocused room {} buffered", message.id, message.room_id);
                queue.push_back(message);
                while queue.len() > per_room_limit {
                    queue.pop_front();
                }
                Delivery::Buffered
            }
        }
    }

    /// Messages buffered for `room_id`, oldest first.
    pub fn take_buffered(&mut self, room_id: &str) -> Vec<ChatMessage> {
        self.buffered
            .remove(room_id)
            .map(Vec::from)
            .unwrap_or_default()
    }

    pub fn buffered_count(&self, room_id: &str) -> usize {
        self.buffered.get(room_id).map_or(0, VecDeque::len)
    }

    /// Forget seen ids. Used when the focused view is cleared.
    pub fn reset_seen(&mut self) {
        self.seen.clear();
    }

    pub fn seen(&self) -> &SeenMessages {
        &self.seen
    }

    /// Forget everything, including buffers.
    pub fn clear(&mut self) {
        self.seen.clear();
        self.buffered.clear();
    }
}
