//! Per-device session state.

use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

use crate::catalog::{AbilitySet, Namespace};
use crate::descriptor::DataPointDescriptor;
use crate::poller::PollSlots;
use crate::timer::TimerSlot;
use crate::transport::{Route, Transport};

/// Device connection state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConnectionState {
    /// Not connected
    Disconnected,
    /// Connect issued, waiting for the transport
    Connecting,
    /// Connected and operational
    Connected,
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Disconnected => write!(f, "disconnected"),
            Self::Connecting => write!(f, "connecting"),
            Self::Connected => write!(f, "connected"),
        }
    }
}

/// Channel entry of a device definition.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChannelDef {
    #[serde(rename = "devName", default, skip_serializing_if = "Option::is_none")]
    pub dev_name: Option<String>,
}

/// Device definition as provided by the discovery layer.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DeviceDefinition {
    #[serde(rename = "devName", default)]
    pub dev_name: Option<String>,
    #[serde(default)]
    pub channels: Vec<ChannelDef>,
    /// Local address known from a previous session
    #[serde(rename = "localAddress", default)]
    pub local_address: Option<String>,
    /// Raw definition, attached to the device object
    #[serde(skip)]
    pub native: Value,
}

impl DeviceDefinition {
    /// Parse a raw definition, keeping it as `native`.
    ///
    /// Unrecognized shapes yield an empty definition.
    pub fn from_native(native: Value) -> Self {
        let mut definition: Self = serde_json::from_value(native.clone()).unwrap_or_else(|e| {
            tracing::debug!(error = %e, "Device definition not understood, using defaults");
            Self::default()
        });
        definition.native = native;
        definition
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.dev_name = Some(name.into());
        self
    }

    pub fn with_channel(mut self, name: impl Into<String>) -> Self {
        self.channels.push(ChannelDef {
            dev_name: Some(name.into()),
        });
        self
    }

    pub fn with_local_address(mut self, address: impl Into<String>) -> Self {
        self.local_address = Some(address.into());
        self
    }

    /// Display name of the device object.
    pub fn display_name(&self, device_id: &str) -> String {
        match self.dev_name.as_deref() {
            Some(name) if !name.is_empty() => name.to_string(),
            _ => format!("Device {}", device_id),
        }
    }

    /// Name hint of a channel, if the definition has a non-empty one.
    pub fn channel_name(&self, channel: u32) -> Option<&str> {
        self.channels
            .get(channel as usize)
            .and_then(|c| c.dev_name.as_deref())
            .filter(|name| !name.is_empty())
    }
}

/// Session of one device.
///
/// Holds the transport handle, the advertised abilities, the projected
/// descriptors and the timers. Values live in the state store, not here.
pub struct DeviceSession {
    pub device_id: String,
    pub definition: DeviceDefinition,
    transport: RwLock<Option<Arc<dyn Transport>>>,
    abilities: RwLock<Option<AbilitySet>>,
    descriptors: RwLock<BTreeMap<String, DataPointDescriptor>>,
    state: RwLock<ConnectionState>,
    route: RwLock<Route>,
    learned_address: RwLock<Option<String>>,
    disabled: AtomicBool,
    reconnect: TimerSlot,
    init_retry: TimerSlot,
    polls: PollSlots,
    event_loop: Mutex<Option<JoinHandle<()>>>,
    ready: Mutex<Option<oneshot::Sender<()>>>,
    init_lock: tokio::sync::Mutex<()>,
}

impl DeviceSession {
    pub fn new(device_id: impl Into<String>, definition: DeviceDefinition) -> Self {
        let learned = definition.local_address.clone();
        Self {
            device_id: device_id.into(),
            definition,
            transport: RwLock::new(None),
            abilities: RwLock::new(None),
            descriptors: RwLock::new(BTreeMap::new()),
            state: RwLock::new(ConnectionState::Disconnected),
            route: RwLock::new(Route::Remote),
            learned_address: RwLock::new(learned),
            disabled: AtomicBool::new(false),
            reconnect: TimerSlot::new(),
            init_retry: TimerSlot::new(),
            polls: PollSlots::default(),
            event_loop: Mutex::new(None),
            ready: Mutex::new(None),
            init_lock: tokio::sync::Mutex::new(()),
        }
    }

    pub fn with_transport(self, transport: Arc<dyn Transport>) -> Self {
        *self.transport.write() = Some(transport);
        self
    }

    /// Store id of a point of this device.
    pub fn store_id(&self, point_id: &str) -> String {
        format!("{}.{}", self.device_id, point_id)
    }

    pub fn transport(&self) -> Option<Arc<dyn Transport>> {
        self.transport.read().clone()
    }

    /// Transport handle, only while connected.
    pub fn live_transport(&self) -> Option<Arc<dyn Transport>> {
        if !self.is_connected() {
            return None;
        }
        self.transport()
    }

    pub fn state(&self) -> ConnectionState {
        *self.state.read()
    }

    pub fn set_state(&self, state: ConnectionState) -> ConnectionState {
        std::mem::replace(&mut *self.state.write(), state)
    }

    pub fn is_connected(&self) -> bool {
        self.state() == ConnectionState::Connected
    }

    pub fn abilities(&self) -> Option<AbilitySet> {
        self.abilities.read().clone()
    }

    pub fn set_abilities(&self, abilities: AbilitySet) {
        *self.abilities.write() = Some(abilities);
    }

    /// Whether the current ability set advertises `namespace`.
    pub fn supports(&self, namespace: Namespace) -> bool {
        self.abilities
            .read()
            .as_ref()
            .is_some_and(|a| a.supports(namespace))
    }

    pub fn descriptor(&self, point_id: &str) -> Option<DataPointDescriptor> {
        self.descriptors.read().get(point_id).cloned()
    }

    pub fn descriptors(&self) -> Vec<DataPointDescriptor> {
        self.descriptors.read().values().cloned().collect()
    }

    pub fn descriptor_count(&self) -> usize {
        self.descriptors.read().len()
    }

    /// Insert a descriptor. Returns `true` when it was new or changed.
    pub fn upsert_descriptor(&self, descriptor: DataPointDescriptor) -> bool {
        let mut descriptors = self.descriptors.write();
        if descriptors.get(&descriptor.id) == Some(&descriptor) {
            return false;
        }
        descriptors.insert(descriptor.id.clone(), descriptor);
        true
    }

    pub fn clear_descriptors(&self) {
        self.descriptors.write().clear();
    }

    pub fn route(&self) -> Route {
        self.route.read().clone()
    }

    pub fn set_route(&self, route: Route) {
        *self.route.write() = route;
    }

    pub fn learned_address(&self) -> Option<String> {
        self.learned_address.read().clone()
    }

    pub fn set_learned_address(&self, address: Option<String>) {
        *self.learned_address.write() = address;
    }

    pub fn is_disabled(&self) -> bool {
        self.disabled.load(Ordering::Relaxed)
    }

    pub fn set_disabled(&self, disabled: bool) {
        self.disabled.store(disabled, Ordering::Relaxed);
    }

    pub fn reconnect_timer(&self) -> &TimerSlot {
        &self.reconnect
    }

    pub fn init_retry_timer(&self) -> &TimerSlot {
        &self.init_retry
    }

    pub fn polls(&self) -> &PollSlots {
        &self.polls
    }

    pub(crate) fn init_lock(&self) -> &tokio::sync::Mutex<()> {
        &self.init_lock
    }

    pub(crate) fn set_event_loop(&self, handle: JoinHandle<()>) {
        if let Some(previous) = self.event_loop.lock().replace(handle) {
            previous.abort();
        }
    }

    pub(crate) fn stop_event_loop(&self) {
        if let Some(handle) = self.event_loop.lock().take() {
            handle.abort();
        }
    }

    pub(crate) fn set_ready_sender(&self, sender: oneshot::Sender<()>) {
        *self.ready.lock() = Some(sender);
    }

    /// Fire the ready signal once.
    pub(crate) fn signal_ready(&self) {
        if let Some(sender) = self.ready.lock().take() {
            let _ = sender.send(());
        }
    }
}
