//! Device transport interface.
//!
//! The transport owns the wire protocol and handshake for one device. The
//! engine drives it through this trait and listens to its event stream;
//! [`MockTransport`] is a scriptable implementation for tests.

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use thiserror::Error;
use tokio::sync::broadcast;

use crate::catalog::Namespace;
use crate::control::ControlCall;

/// Result type for transport operations.
pub type TransportResult<T> = Result<T, TransportError>;

/// Error type for transport operations.
#[derive(Debug, Error)]
pub enum TransportError {
    /// Connection error
    #[error("Connection error: {0}")]
    Connection(String),

    /// Operation timeout
    #[error("Operation timeout after {0}ms")]
    Timeout(u64),

    /// Device answered with an error
    #[error("Device error {code}: {message}")]
    Device { code: i64, message: String },

    /// No connection is established
    #[error("Transport is not connected")]
    NotConnected,

    /// Namespace not implemented by this transport
    #[error("Unsupported namespace: {0}")]
    Unsupported(String),

    /// Other error
    #[error("Transport error: {0}")]
    Other(#[from] anyhow::Error),
}

/// Event emitted by a transport.
#[derive(Debug, Clone, PartialEq)]
pub enum TransportEvent {
    /// Connection established
    Connected,
    /// Connection closed, with an optional reason
    Closed(Option<String>),
    /// Connection failed
    Error(String),
    /// Transport is reconnecting on its own
    Reconnect,
    /// Pushed data for a namespace
    Data { namespace: String, payload: Value },
}

/// Route used to reach a device.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Route {
    /// Through the vendor cloud
    #[default]
    Remote,
    /// Directly on the local network
    Local(String),
}

impl std::fmt::Display for Route {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Remote => write!(f, "remote"),
            Self::Local(addr) => write!(f, "local({})", addr),
        }
    }
}

/// Answer of a direct local data fetch.
#[derive(Debug, Clone, PartialEq)]
pub struct LocalIdentity {
    /// Hardware identity reported by the device at that address
    pub uuid: String,
    /// Full data returned by the fetch
    pub data: Value,
}

impl LocalIdentity {
    /// Extract the identity from an `Appliance.System.All` response.
    pub fn from_system_all(data: Value) -> Option<Self> {
        let uuid = data
            .pointer("/all/system/hardware/uuid")
            .and_then(Value::as_str)?
            .to_string();
        Some(Self { uuid, data })
    }
}

/// Device transport.
///
/// One instance per device. All calls may suspend; none block other
/// devices.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Subscribe to connection and push events.
    fn subscribe(&self) -> broadcast::Receiver<TransportEvent>;

    /// Open a connection over `route`. Success is reported by a
    /// [`TransportEvent::Connected`] event.
    async fn connect(&self, route: Route) -> TransportResult<()>;

    /// Close the connection.
    async fn disconnect(&self) -> TransportResult<()>;

    /// Query `Appliance.System.Ability`.
    async fn get_system_abilities(&self) -> TransportResult<Value>;

    /// Query `Appliance.System.All`.
    async fn get_system_all_data(&self) -> TransportResult<Value>;

    /// Query the current state of a namespace.
    async fn query(&self, namespace: Namespace) -> TransportResult<Value>;

    /// Send a control call.
    async fn control(&self, call: &ControlCall) -> TransportResult<Value>;

    /// Fetch data directly from a local address.
    async fn probe_local(&self, address: &str) -> TransportResult<LocalIdentity>;
}

/// Mock transport for testing.
///
/// Query answers are scripted per namespace; every call is recorded.
pub struct MockTransport {
    event_tx: broadcast::Sender<TransportEvent>,
    abilities: Mutex<Value>,
    all_data: Mutex<Value>,
    responses: Mutex<HashMap<Namespace, Value>>,
    failing: Mutex<HashSet<&'static str>>,
    local: Mutex<HashMap<String, LocalIdentity>>,
    controls: Mutex<Vec<ControlCall>>,
    queries: Mutex<Vec<Namespace>>,
    routes: Mutex<Vec<Route>>,
    probes: Mutex<Vec<String>>,
    auto_connect: AtomicBool,
    disconnects: AtomicUsize,
}

const ABILITIES: &str = "abilities";
const ALL_DATA: &str = "all_data";
const CONNECT: &str = "connect";
const CONTROL: &str = "control";

impl MockTransport {
    /// Create a mock that answers `connect` with a `Connected` event.
    pub fn new() -> Self {
        let (event_tx, _) = broadcast::channel(100);
        Self {
            event_tx,
            abilities: Mutex::new(json!({"ability": {}})),
            all_data: Mutex::new(json!({"all": {"digest": {}}})),
            responses: Mutex::new(HashMap::new()),
            failing: Mutex::new(HashSet::new()),
            local: Mutex::new(HashMap::new()),
            controls: Mutex::new(Vec::new()),
            queries: Mutex::new(Vec::new()),
            routes: Mutex::new(Vec::new()),
            probes: Mutex::new(Vec::new()),
            auto_connect: AtomicBool::new(true),
            disconnects: AtomicUsize::new(0),
        }
    }

    /// Advertise the given namespaces.
    pub fn with_abilities(self, namespaces: &[Namespace]) -> Self {
        let ability: serde_json::Map<String, Value> = namespaces
            .iter()
            .map(|ns| (ns.as_str().to_string(), json!({})))
            .collect();
        *self.abilities.lock() = json!({ "ability": ability });
        self
    }

    /// Set the `Appliance.System.All` answer.
    pub fn with_all_data(self, data: Value) -> Self {
        *self.all_data.lock() = data;
        self
    }

    /// Set the answer for queries of `namespace`.
    pub fn with_response(self, namespace: Namespace, payload: Value) -> Self {
        self.set_response(namespace, payload);
        self
    }

    /// Answer local probes of `address` with `identity`.
    pub fn with_local_identity(self, address: impl Into<String>, identity: LocalIdentity) -> Self {
        self.local.lock().insert(address.into(), identity);
        self
    }

    /// Emit no `Connected` event on `connect`.
    pub fn without_auto_connect(self) -> Self {
        self.auto_connect.store(false, Ordering::SeqCst);
        self
    }

    pub fn set_response(&self, namespace: Namespace, payload: Value) {
        self.responses.lock().insert(namespace, payload);
    }

    pub fn set_all_data(&self, data: Value) {
        *self.all_data.lock() = data;
    }

    /// Make ability queries fail.
    pub fn fail_abilities(&self, fail: bool) {
        self.set_failing(ABILITIES, fail);
    }

    /// Make `Appliance.System.All` queries fail.
    pub fn fail_all_data(&self, fail: bool) {
        self.set_failing(ALL_DATA, fail);
    }

    /// Make namespace queries fail.
    pub fn fail_query(&self, namespace: Namespace, fail: bool) {
        self.set_failing(namespace.as_str(), fail);
    }

    pub fn fail_connect(&self, fail: bool) {
        self.set_failing(CONNECT, fail);
    }

    pub fn fail_control(&self, fail: bool) {
        self.set_failing(CONTROL, fail);
    }

    fn set_failing(&self, key: &'static str, fail: bool) {
        let mut failing = self.failing.lock();
        if fail {
            failing.insert(key);
        } else {
            failing.remove(key);
        }
    }

    fn check(&self, key: &str) -> TransportResult<()> {
        if self.failing.lock().contains(key) {
            return Err(TransportError::Connection(format!("mock failure: {}", key)));
        }
        Ok(())
    }

    /// Publish a test event. Returns the number of receivers.
    pub fn emit(&self, event: TransportEvent) -> usize {
        self.event_tx.send(event).unwrap_or(0)
    }

    /// Publish a data push.
    pub fn push(&self, namespace: &str, payload: Value) -> usize {
        self.emit(TransportEvent::Data {
            namespace: namespace.to_string(),
            payload,
        })
    }

    pub fn control_calls(&self) -> Vec<ControlCall> {
        self.controls.lock().clone()
    }

    pub fn queries(&self) -> Vec<Namespace> {
        self.queries.lock().clone()
    }

    pub fn query_count(&self, namespace: Namespace) -> usize {
        self.queries.lock().iter().filter(|ns| **ns == namespace).count()
    }

    pub fn routes(&self) -> Vec<Route> {
        self.routes.lock().clone()
    }

    pub fn connect_count(&self) -> usize {
        self.routes.lock().len()
    }

    pub fn probes(&self) -> Vec<String> {
        self.probes.lock().clone()
    }

    pub fn disconnect_count(&self) -> usize {
        self.disconnects.load(Ordering::SeqCst)
    }
}

impl Default for MockTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Transport for MockTransport {
    fn subscribe(&self) -> broadcast::Receiver<TransportEvent> {
        self.event_tx.subscribe()
    }

    async fn connect(&self, route: Route) -> TransportResult<()> {
        self.routes.lock().push(route);
        self.check(CONNECT)?;
        if self.auto_connect.load(Ordering::SeqCst) {
            self.emit(TransportEvent::Connected);
        }
        Ok(())
    }

    async fn disconnect(&self) -> TransportResult<()> {
        self.disconnects.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn get_system_abilities(&self) -> TransportResult<Value> {
        self.check(ABILITIES)?;
        Ok(self.abilities.lock().clone())
    }

    async fn get_system_all_data(&self) -> TransportResult<Value> {
        self.check(ALL_DATA)?;
        Ok(self.all_data.lock().clone())
    }

    async fn query(&self, namespace: Namespace) -> TransportResult<Value> {
        self.queries.lock().push(namespace);
        self.check(namespace.as_str())?;
        self.responses
            .lock()
            .get(&namespace)
            .cloned()
            .ok_or_else(|| TransportError::Unsupported(namespace.to_string()))
    }

    async fn control(&self, call: &ControlCall) -> TransportResult<Value> {
        self.controls.lock().push(call.clone());
        self.check(CONTROL)?;
        Ok(json!({}))
    }

    async fn probe_local(&self, address: &str) -> TransportResult<LocalIdentity> {
        self.probes.lock().push(address.to_string());
        self.local
            .lock()
            .get(address)
            .cloned()
            .ok_or_else(|| TransportError::Timeout(5000))
    }
}
