//! State store contract and in-memory implementation.
//!
//! The engine never owns state values itself: projected data points are
//! registered with [`StateStore::define_or_update`], device-confirmed values
//! are written with `ack = true`, and user commands arrive as `ack = false`
//! changes through [`StateStore::subscribe`].

use async_trait::async_trait;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::error::{Error, Result};
use crate::eventbus::{EventBus, PatternReceiver, StateChange};
use crate::object::ObjectDefinition;
use crate::value::StateValue;

/// Subscription handle returned by [`StateStore::subscribe`].
pub type StateSubscription = PatternReceiver;

/// Current value of a state with its acknowledgement flag.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateRecord {
    pub value: StateValue,
    pub ack: bool,
    /// Timestamp in milliseconds since epoch
    pub ts: i64,
}

/// Object and state storage provided by the host.
#[async_trait]
pub trait StateStore: Send + Sync {
    /// Read the current value of a state.
    async fn get_value(&self, id: &str) -> Option<StateRecord>;

    /// Write a state value.
    ///
    /// `ack = true` marks the value as confirmed by the device. Writing a
    /// state that has no object definition fails with [`Error::NotFound`].
    async fn set_value(&self, id: &str, value: StateValue, ack: bool) -> Result<()>;

    /// Subscribe to changes of all states matching a glob pattern.
    fn subscribe(&self, pattern: &str) -> StateSubscription;

    /// Create or replace an object definition, optionally seeding its value.
    ///
    /// The initial value is stored as acknowledged.
    async fn define_or_update(
        &self,
        id: &str,
        definition: ObjectDefinition,
        initial: Option<StateValue>,
    ) -> Result<()>;

    /// Read an object definition.
    async fn get_object(&self, id: &str) -> Option<ObjectDefinition>;
}

/// In-memory state store with change notification.
pub struct MemoryStore {
    objects: RwLock<HashMap<String, ObjectDefinition>>,
    states: RwLock<HashMap<String, StateRecord>>,
    bus: EventBus,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            objects: RwLock::new(HashMap::new()),
            states: RwLock::new(HashMap::new()),
            bus: EventBus::with_name("states"),
        }
    }

    /// Number of defined objects.
    pub fn len(&self) -> usize {
        self.objects.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.read().is_empty()
    }

    /// Ids of all defined objects, sorted.
    pub fn object_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.objects.read().keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Ids of objects under `prefix`, sorted.
    pub fn object_ids_with_prefix(&self, prefix: &str) -> Vec<String> {
        let mut ids: Vec<String> = self
            .objects
            .read()
            .keys()
            .filter(|id| id.starts_with(prefix))
            .cloned()
            .collect();
        ids.sort();
        ids
    }

    /// Current values of all states under `prefix`, sorted by id.
    pub fn values_with_prefix(&self, prefix: &str) -> Vec<(String, StateValue)> {
        let mut values: Vec<(String, StateValue)> = self
            .states
            .read()
            .iter()
            .filter(|(id, _)| id.starts_with(prefix))
            .map(|(id, record)| (id.clone(), record.value.clone()))
            .collect();
        values.sort_by(|a, b| a.0.cmp(&b.0));
        values
    }

    /// Synchronous read of a state value.
    pub fn value(&self, id: &str) -> Option<StateValue> {
        self.states.read().get(id).map(|r| r.value.clone())
    }

    fn store_value(&self, id: &str, value: StateValue, ack: bool) {
        let change = StateChange::new(id, value, ack);
        self.states.write().insert(
            id.to_string(),
            StateRecord {
                value: change.value.clone(),
                ack,
                ts: change.ts,
            },
        );
        self.bus.publish(change);
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl StateStore for MemoryStore {
    async fn get_value(&self, id: &str) -> Option<StateRecord> {
        self.states.read().get(id).cloned()
    }

    async fn set_value(&self, id: &str, value: StateValue, ack: bool) -> Result<()> {
        if !self.objects.read().contains_key(id) {
            return Err(Error::NotFound(format!("state {}", id)));
        }
        self.store_value(id, value, ack);
        Ok(())
    }

    fn subscribe(&self, pattern: &str) -> StateSubscription {
        self.bus.subscribe_pattern(pattern)
    }

    async fn define_or_update(
        &self,
        id: &str,
        definition: ObjectDefinition,
        initial: Option<StateValue>,
    ) -> Result<()> {
        if id.is_empty() {
            return Err(Error::Validation("object id must not be empty".to_string()));
        }
        self.objects.write().insert(id.to_string(), definition);
        if let Some(value) = initial {
            self.store_value(id, value, true);
        }
        Ok(())
    }

    async fn get_object(&self, id: &str) -> Option<ObjectDefinition> {
        self.objects.read().get(id).cloned()
    }
}
