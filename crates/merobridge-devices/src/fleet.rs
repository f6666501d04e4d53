//! Device fleet.
//!
//! [`DeviceFleet`] is the entry point for the surrounding adapter: it owns
//! the session registry and hands a shared [`FleetContext`] to the
//! lifecycle manager, the sync bus and the poller.

use dashmap::DashMap;
use merobridge_core::{
    Access, BridgeConfig, ObjectDefinition, Result, StateStore, StateValue, ValueType,
};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

use crate::lifecycle::LifecycleManager;
use crate::poller::Poller;
use crate::session::{ConnectionState, DeviceDefinition, DeviceSession};
use crate::sync::SyncBus;
use crate::transport::Transport;

/// Store id of the fleet-wide connection indicator.
pub const CONNECTION_INDICATOR: &str = "info.connection";

/// State shared by the engine components.
pub struct FleetContext {
    pub store: Arc<dyn StateStore>,
    pub config: BridgeConfig,
    sessions: DashMap<String, Arc<DeviceSession>>,
    shutting_down: AtomicBool,
}

impl FleetContext {
    pub fn new(store: Arc<dyn StateStore>, config: BridgeConfig) -> Self {
        Self {
            store,
            config,
            sessions: DashMap::new(),
            shutting_down: AtomicBool::new(false),
        }
    }

    pub fn session(&self, device_id: &str) -> Option<Arc<DeviceSession>> {
        self.sessions.get(device_id).map(|s| s.value().clone())
    }

    pub fn sessions(&self) -> Vec<Arc<DeviceSession>> {
        self.sessions.iter().map(|s| s.value().clone()).collect()
    }

    pub fn is_shutting_down(&self) -> bool {
        self.shutting_down.load(Ordering::SeqCst)
    }

    pub fn connected_count(&self) -> usize {
        self.sessions.iter().filter(|s| s.is_connected()).count()
    }

    /// Set `info.connection` to whether any device is connected.
    pub async fn refresh_connection_indicator(&self) {
        let connected = self.connected_count() > 0;
        if let Err(e) = self
            .store
            .set_value(CONNECTION_INDICATOR, StateValue::Boolean(connected), true)
            .await
        {
            tracing::debug!(error = %e, "Failed to update connection indicator");
        }
    }
}

/// Resolves once the first initialization attempt of a device finished.
pub struct ReadySignal {
    rx: oneshot::Receiver<()>,
}

impl ReadySignal {
    /// Wait for the signal. Returns `false` if the session went away first.
    pub async fn wait(self) -> bool {
        self.rx.await.is_ok()
    }
}

/// Fleet of device sessions.
pub struct DeviceFleet {
    ctx: Arc<FleetContext>,
    listener: Mutex<Option<JoinHandle<()>>>,
}

impl DeviceFleet {
    pub fn new(store: Arc<dyn StateStore>, config: BridgeConfig) -> Self {
        Self {
            ctx: Arc::new(FleetContext::new(store, config.normalized())),
            listener: Mutex::new(None),
        }
    }

    pub fn context(&self) -> &Arc<FleetContext> {
        &self.ctx
    }

    pub fn lifecycle(&self) -> LifecycleManager {
        LifecycleManager::new(self.ctx.clone())
    }

    pub fn sync_bus(&self) -> SyncBus {
        SyncBus::new(self.ctx.clone())
    }

    pub fn poller(&self) -> Poller {
        Poller::new(self.ctx.clone())
    }

    /// Define the connection indicator and start dispatching user writes.
    pub async fn start(&self) -> Result<()> {
        self.ctx
            .store
            .define_or_update(
                CONNECTION_INDICATOR,
                ObjectDefinition::state(
                    "Connected to at least one device",
                    ValueType::Boolean,
                    Access::ReadOnly,
                    "indicator.connected",
                ),
                Some(StateValue::Boolean(false)),
            )
            .await?;

        let handle = self.sync_bus().spawn_write_listener();
        if let Some(previous) = self.listener.lock().replace(handle) {
            previous.abort();
        }
        tracing::info!(devices = self.ctx.sessions.len(), "Device fleet started");
        Ok(())
    }

    /// Register a discovered device and start connecting.
    ///
    /// Replaces an existing session with the same id. The returned signal
    /// resolves after the first initialization attempt.
    pub async fn init_device(
        &self,
        device_id: &str,
        definition: DeviceDefinition,
        transport: Arc<dyn Transport>,
    ) -> Result<ReadySignal> {
        if let Some((_, previous)) = self.ctx.sessions.remove(device_id) {
            tracing::info!(device_id = %device_id, "Replacing device session");
            self.stop_session(&previous).await;
        }

        let session =
            Arc::new(DeviceSession::new(device_id, definition).with_transport(transport.clone()));
        if self.ctx.config.is_disabled(device_id) {
            session.set_disabled(true);
        }
        let (tx, rx) = oneshot::channel();
        session.set_ready_sender(tx);

        let store = &self.ctx.store;
        store
            .define_or_update(
                device_id,
                ObjectDefinition::device(
                    session.definition.display_name(device_id),
                    session.definition.native.clone(),
                ),
                None,
            )
            .await?;
        store
            .define_or_update(
                &session.store_id("online"),
                ObjectDefinition::state(
                    "Online",
                    ValueType::Boolean,
                    Access::ReadOnly,
                    "indicator.reachable",
                ),
                Some(StateValue::Boolean(false)),
            )
            .await?;

        self.ctx.sessions.insert(device_id.to_string(), session.clone());

        let lifecycle = self.lifecycle();
        // subscribe before connecting so the connected event is not missed
        let events = transport.subscribe();
        session.set_event_loop(lifecycle.spawn_event_loop(session.clone(), events));
        tracing::info!(
            device_id = %device_id,
            disabled = session.is_disabled(),
            "Device registered"
        );
        lifecycle.connect(&session).await;

        Ok(ReadySignal { rx })
    }

    pub fn session(&self, device_id: &str) -> Option<Arc<DeviceSession>> {
        self.ctx.session(device_id)
    }

    pub fn device_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.ctx.sessions.iter().map(|s| s.key().clone()).collect();
        ids.sort();
        ids
    }

    pub fn len(&self) -> usize {
        self.ctx.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ctx.sessions.is_empty()
    }

    /// Toggle noise suppression for a device. Returns `false` for unknown ids.
    pub fn set_disabled(&self, device_id: &str, disabled: bool) -> bool {
        match self.ctx.session(device_id) {
            Some(session) => {
                session.set_disabled(disabled);
                true
            }
            None => false,
        }
    }

    /// Stop all reconnects, timers and event loops, disconnect every
    /// transport and mark everything unreachable.
    pub async fn shutdown(&self) {
        self.ctx.shutting_down.store(true, Ordering::SeqCst);
        if let Some(listener) = self.listener.lock().take() {
            listener.abort();
        }

        for session in self.ctx.sessions() {
            self.stop_session(&session).await;
        }

        if let Err(e) = self
            .ctx
            .store
            .set_value(CONNECTION_INDICATOR, StateValue::Boolean(false), true)
            .await
        {
            tracing::debug!(error = %e, "Failed to clear connection indicator");
        }
        tracing::info!("Device fleet stopped");
    }

    async fn stop_session(&self, session: &DeviceSession) {
        session.stop_event_loop();
        session.reconnect_timer().cancel();
        session.init_retry_timer().cancel();
        self.poller().cancel_all(session);
        let previous = session.set_state(ConnectionState::Disconnected);

        if let Some(transport) = session.transport() {
            if let Err(e) = transport.disconnect().await {
                tracing::debug!(device_id = %session.device_id, error = %e, "Disconnect failed");
            }
        }
        if previous != ConnectionState::Disconnected {
            let online = session.store_id("online");
            let result = self
                .ctx
                .store
                .set_value(&online, StateValue::Boolean(false), true)
                .await;
            if let Err(e) = result {
                tracing::debug!(
                    device_id = %session.device_id,
                    error = %e,
                    "Failed to update online state"
                );
            }
        }
    }
}
