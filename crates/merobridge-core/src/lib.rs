//! Host-side contracts for the merobridge device engine.
//!
//! This crate defines what the synchronization engine expects from the
//! surrounding home-automation host: a state store with subscribe/notify,
//! object definitions for data points, and the ambient configuration and
//! logging setup shared by every crate in the workspace.

pub mod config;
pub mod error;
pub mod eventbus;
pub mod logging;
pub mod object;
pub mod store;
pub mod value;

pub use config::{BridgeConfig, LoggingConfig};
pub use error::{Error, Result};
pub use eventbus::{
    DEFAULT_CHANNEL_CAPACITY, EventBus, EventBusReceiver, PatternReceiver, StateChange,
    pattern_matches,
};
pub use object::{Access, ObjectDefinition, ObjectKind, ValueType};
pub use store::{MemoryStore, StateRecord, StateStore, StateSubscription};
pub use value::StateValue;

/// Re-exports commonly used types.
pub mod prelude {
    pub use crate::config::{BridgeConfig, LoggingConfig};
    pub use crate::error::{Error, Result};
    pub use crate::eventbus::{EventBus, StateChange};
    pub use crate::object::{Access, ObjectDefinition, ObjectKind, ValueType};
    pub use crate::store::{MemoryStore, StateStore};
    pub use crate::value::StateValue;
}
