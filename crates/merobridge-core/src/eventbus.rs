//! State change bus.
//!
//! Every value written to the store is published here as a [`StateChange`].
//! Subscribers receive either all changes or only those whose id matches a
//! glob pattern such as `dev1.*`.

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::value::StateValue;

/// Default channel capacity for the event bus.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 1000;

/// A single state change notification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateChange {
    /// Fully qualified state id (`<device>.<point>`)
    pub id: String,
    /// New value
    pub value: StateValue,
    /// `true` when the value was confirmed by the device
    pub ack: bool,
    /// Timestamp in milliseconds since epoch
    pub ts: i64,
}

impl StateChange {
    pub fn new(id: impl Into<String>, value: StateValue, ack: bool) -> Self {
        Self {
            id: id.into(),
            value,
            ack,
            ts: chrono::Utc::now().timestamp_millis(),
        }
    }

    /// A change not yet confirmed by the device, i.e. a user command.
    pub fn is_command(&self) -> bool {
        !self.ack
    }
}

/// Broadcast bus for state changes.
///
/// Slow subscribers may miss changes when they fall more than the channel
/// capacity behind; receivers skip the gap and keep going.
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<StateChange>,
    name: String,
}

impl EventBus {
    /// Create a new event bus with default capacity.
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CHANNEL_CAPACITY)
    }

    /// Create a new event bus with the specified capacity.
    pub fn with_capacity(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self {
            tx,
            name: "default".to_string(),
        }
    }

    /// Create a new event bus with a name.
    pub fn with_name(name: impl Into<String>) -> Self {
        Self {
            tx: broadcast::channel(DEFAULT_CHANNEL_CAPACITY).0,
            name: name.into(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Get the number of current subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }

    /// Publish a change. Returns `true` if there was at least one subscriber.
    pub fn publish(&self, change: StateChange) -> bool {
        self.tx.send(change).is_ok()
    }

    /// Subscribe to all changes.
    pub fn subscribe(&self) -> EventBusReceiver {
        EventBusReceiver {
            rx: self.tx.subscribe(),
        }
    }

    /// Subscribe to changes whose id matches `pattern`.
    pub fn subscribe_pattern(&self, pattern: impl Into<String>) -> PatternReceiver {
        PatternReceiver {
            rx: self.tx.subscribe(),
            pattern: pattern.into(),
        }
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

/// Receiver for all changes from the event bus.
pub struct EventBusReceiver {
    rx: broadcast::Receiver<StateChange>,
}

impl EventBusReceiver {
    /// Receive the next change.
    ///
    /// Returns `None` if the event bus is closed.
    pub async fn recv(&mut self) -> Option<StateChange> {
        loop {
            match self.rx.recv().await {
                Ok(change) => return Some(change),
                Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }

    /// Try to receive a change without blocking.
    pub fn try_recv(&mut self) -> Option<StateChange> {
        self.rx.try_recv().ok()
    }
}

/// Receiver for changes whose id matches a glob pattern.
pub struct PatternReceiver {
    rx: broadcast::Receiver<StateChange>,
    pattern: String,
}

impl PatternReceiver {
    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    /// Receive the next matching change.
    ///
    /// Returns `None` if the event bus is closed.
    pub async fn recv(&mut self) -> Option<StateChange> {
        loop {
            match self.rx.recv().await {
                Ok(change) => {
                    if pattern_matches(&self.pattern, &change.id) {
                        return Some(change);
                    }
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!(pattern = %self.pattern, skipped, "State subscriber lagged");
                    continue;
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }

    /// Try to receive a matching change without blocking.
    pub fn try_recv(&mut self) -> Option<StateChange> {
        while let Ok(change) = self.rx.try_recv() {
            if pattern_matches(&self.pattern, &change.id) {
                return Some(change);
            }
        }
        None
    }
}

/// Match `id` against a glob pattern where `*` matches any run of characters.
pub fn pattern_matches(pattern: &str, id: &str) -> bool {
    let parts: Vec<&str> = pattern.split('*').collect();
    if parts.len() == 1 {
        return pattern == id;
    }

    let first = parts[0];
    let last = parts[parts.len() - 1];
    if !id.starts_with(first) || id.len() < first.len() + last.len() || !id.ends_with(last) {
        return false;
    }

    let mut rest = &id[first.len()..id.len() - last.len()];
    for part in &parts[1..parts.len() - 1] {
        if part.is_empty() {
            continue;
        }
        match rest.find(part) {
            Some(pos) => rest = &rest[pos + part.len()..],
            None => return false,
        }
    }
    true
}
