//! Device capability mapping and synchronization engine.
//!
//! Bridges devices speaking the vendor namespace/ability protocol to the
//! host state model of `merobridge-core`.
//!
//! ## Architecture
//!
//! - **Catalog**: namespace identifiers and per-field scale, unit, role and bounds
//! - **Projector**: maps ability set and payloads onto typed data point descriptors
//! - **SyncBus**: applies pushes and poll results, turns user writes into control calls
//! - **LifecycleManager**: connect, initialize, reconnect and local/remote route selection
//! - **Poller**: self-rescheduling metering and consumption polls with jitter
//!
//! [`DeviceFleet`] owns the sessions and is the entry point for the adapter.

pub mod catalog;
pub mod control;
pub mod descriptor;
pub mod payload;
pub mod projector;
pub mod scale;

// Runtime
pub mod fleet;
pub mod lifecycle;
pub mod poller;
pub mod session;
pub mod sync;
pub mod timer;

// Transport interface consumed from the adapter
pub mod transport;

pub use catalog::{facet_meta, AbilitySet, FacetMeta, Namespace};
pub use control::{ControlCall, WriteError};
pub use descriptor::{ChannelRef, DataPointDescriptor, WriteAction, WriteBinding};
pub use fleet::{DeviceFleet, FleetContext, ReadySignal, CONNECTION_INDICATOR};
pub use lifecycle::{InitError, LifecycleManager};
pub use payload::Facet;
pub use poller::{PollDelay, PollKind, Poller};
pub use projector::{ProjectedPoint, Projector};
pub use session::{ConnectionState, DeviceDefinition, DeviceSession};
pub use sync::SyncBus;
pub use timer::TimerSlot;
pub use transport::{
    LocalIdentity, MockTransport, Route, Transport, TransportError, TransportEvent, TransportResult,
};
