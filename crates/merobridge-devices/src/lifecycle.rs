//! Connection lifecycle.
//!
//! Per device: `disconnected -> connecting -> connected -> (closed | error)
//! -> disconnected`. Transport events are handled strictly in arrival order
//! on one task per device. Closes and errors schedule a reconnect after
//! `reconnect_delay`; failed initialization (ability or snapshot fetch) is
//! retried after `init_retry_delay` with the device left without points.
//! Nothing is permanently fatal; only fleet shutdown stops the retries.

use futures::future::BoxFuture;
use merobridge_core::StateValue;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

use crate::catalog::{AbilitySet, Namespace};
use crate::fleet::FleetContext;
use crate::poller::Poller;
use crate::projector::{inner_ip, Projector};
use crate::session::{ConnectionState, DeviceSession};
use crate::sync::SyncBus;
use crate::transport::{Route, Transport, TransportError, TransportEvent};

/// Error type for device initialization after connecting.
#[derive(Debug, Error)]
pub enum InitError {
    /// Transport handle missing or not connected
    #[error("Device communication not initialized")]
    NoTransport,

    /// Ability query failed
    #[error("Ability query failed: {0}")]
    Abilities(#[source] TransportError),

    /// Ability response had no ability map
    #[error("Ability response not understood")]
    InvalidAbilities,

    /// Snapshot query failed
    #[error("Snapshot query failed: {0}")]
    Snapshot(#[source] TransportError),
}

/// Drives connect, initialization and reconnect for device sessions.
#[derive(Clone)]
pub struct LifecycleManager {
    ctx: Arc<FleetContext>,
}

impl LifecycleManager {
    pub fn new(ctx: Arc<FleetContext>) -> Self {
        Self { ctx }
    }

    /// Consume the transport events of `session` in order.
    pub fn spawn_event_loop(
        &self,
        session: Arc<DeviceSession>,
        mut events: broadcast::Receiver<TransportEvent>,
    ) -> JoinHandle<()> {
        let manager = self.clone();
        tokio::spawn(async move {
            loop {
                match events.recv().await {
                    Ok(event) => manager.handle_event(&session, event).await,
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        tracing::warn!(
                            device_id = %session.device_id,
                            skipped = n,
                            "Transport events lagged"
                        );
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
            tracing::debug!(device_id = %session.device_id, "Event loop stopped");
        })
    }

    pub async fn handle_event(&self, session: &Arc<DeviceSession>, event: TransportEvent) {
        match event {
            TransportEvent::Connected => self.on_connected(session).await,
            TransportEvent::Closed(reason) => {
                let reason = reason.unwrap_or_else(|| "connection closed".to_string());
                self.on_disconnected(session, &reason).await
            }
            TransportEvent::Error(error) => self.on_disconnected(session, &error).await,
            TransportEvent::Reconnect => {
                tracing::debug!(device_id = %session.device_id, "Transport reconnecting");
            }
            TransportEvent::Data { namespace, payload } => {
                SyncBus::new(self.ctx.clone())
                    .apply_push(session, &namespace, &payload)
                    .await;
            }
        }
    }

    async fn on_connected(&self, session: &Arc<DeviceSession>) {
        session.reconnect_timer().cancel();
        session.set_state(ConnectionState::Connected);
        tracing::info!(
            device_id = %session.device_id,
            route = %session.route(),
            "Device connected"
        );

        self.set_online(session, true).await;
        self.ctx.refresh_connection_indicator().await;
        self.run_initialization(session).await;
    }

    async fn on_disconnected(&self, session: &Arc<DeviceSession>, reason: &str) {
        let previous = session.set_state(ConnectionState::Disconnected);
        if session.is_disabled() {
            tracing::debug!(
                device_id = %session.device_id,
                reason = %reason,
                "Device disconnected"
            );
        } else {
            tracing::warn!(device_id = %session.device_id, reason = %reason, "Device disconnected");
        }

        Poller::new(self.ctx.clone()).cancel_all(session);
        session.init_retry_timer().cancel();
        if previous != ConnectionState::Disconnected {
            self.set_online(session, false).await;
            self.ctx.refresh_connection_indicator().await;
        }

        if !self.ctx.is_shutting_down() {
            self.schedule_reconnect(session);
        }
    }

    /// Initialize once, scheduling a retry on failure. Fires the ready
    /// signal after the first attempt either way.
    async fn run_initialization(&self, session: &Arc<DeviceSession>) {
        let _guard = session.init_lock().lock().await;
        match self.initialize(session).await {
            Ok(points) => {
                session.init_retry_timer().cancel();
                tracing::info!(device_id = %session.device_id, points, "Device initialized");
            }
            Err(e) => {
                if session.is_disabled() {
                    tracing::debug!(
                        device_id = %session.device_id,
                        error = %e,
                        "Device initialization failed"
                    );
                } else {
                    tracing::warn!(
                        device_id = %session.device_id,
                        error = %e,
                        "Device initialization failed"
                    );
                }
                if session.is_connected() && !self.ctx.is_shutting_down() {
                    self.schedule_init_retry(session);
                }
            }
        }
        session.signal_ready();
    }

    /// Fetch abilities and snapshot, project them and start the polls.
    ///
    /// Returns the number of points written.
    pub async fn initialize(&self, session: &Arc<DeviceSession>) -> Result<usize, InitError> {
        session.clear_descriptors();
        let transport = session.live_transport().ok_or(InitError::NoTransport)?;

        let response = transport
            .get_system_abilities()
            .await
            .map_err(InitError::Abilities)?;
        let abilities = AbilitySet::from_response(&response).ok_or(InitError::InvalidAbilities)?;
        let all = transport
            .get_system_all_data()
            .await
            .map_err(InitError::Snapshot)?;

        session.set_abilities(abilities.clone());
        tracing::debug!(
            device_id = %session.device_id,
            abilities = abilities.len(),
            "Abilities received"
        );

        if let Some(ip) = inner_ip(&all) {
            session.set_learned_address(Some(ip.to_string()));
        }

        let bus = SyncBus::new(self.ctx.clone());
        let points = Projector::new(&session.device_id, &session.definition)
            .with_abilities(&abilities)
            .project_snapshot(&all);
        let mut written = bus.write_points(session, points).await;

        for namespace in Namespace::FETCH_ON_CONNECT {
            if !abilities.supports(namespace) {
                continue;
            }
            match transport.query(namespace).await {
                Ok(payload) => written += bus.apply_poll_result(session, namespace, &payload).await,
                Err(e) => self.log_failure(session, namespace, &e),
            }
        }

        Poller::new(self.ctx.clone()).start_all(session);
        Ok(written)
    }

    /// Select a route and connect. A failed attempt schedules a reconnect.
    pub async fn connect(&self, session: &Arc<DeviceSession>) {
        let Some(transport) = session.transport() else {
            tracing::debug!(device_id = %session.device_id, "No transport to connect");
            return;
        };

        let Some(route) = self.select_route(session, transport.as_ref()).await else {
            tracing::debug!(device_id = %session.device_id, "No usable route, retrying later");
            self.schedule_reconnect(session);
            return;
        };

        session.set_route(route.clone());
        session.set_state(ConnectionState::Connecting);
        tracing::debug!(device_id = %session.device_id, route = %route, "Connecting");

        if let Err(e) = transport.connect(route).await {
            if session.is_disabled() {
                tracing::debug!(device_id = %session.device_id, error = %e, "Connect failed");
            } else {
                tracing::warn!(device_id = %session.device_id, error = %e, "Connect failed");
            }
            session.set_state(ConnectionState::Disconnected);
            if !self.ctx.is_shutting_down() {
                self.schedule_reconnect(session);
            }
        }
    }

    /// Choose between the local and the remote route.
    ///
    /// With local-first or local-only configured and a known local address,
    /// the address is probed and accepted only if the device there reports
    /// the expected identity. `None` means no route is usable right now.
    pub async fn select_route(
        &self,
        session: &DeviceSession,
        transport: &dyn Transport,
    ) -> Option<Route> {
        let config = &self.ctx.config;
        if !config.local_first && !config.local_only {
            return Some(Route::Remote);
        }

        let Some(address) = session.learned_address() else {
            if config.local_only {
                tracing::debug!(
                    device_id = %session.device_id,
                    "Local only, but no local address known"
                );
                return None;
            }
            return Some(Route::Remote);
        };

        match transport.probe_local(&address).await {
            Ok(identity) if identity.uuid.eq_ignore_ascii_case(&session.device_id) => {
                Some(Route::Local(address))
            }
            Ok(identity) => {
                tracing::warn!(
                    device_id = %session.device_id,
                    address = %address,
                    found = %identity.uuid,
                    "Different device at local address"
                );
                if config.local_only {
                    return None;
                }
                session.set_learned_address(None);
                Some(Route::Remote)
            }
            Err(e) => {
                tracing::debug!(
                    device_id = %session.device_id,
                    address = %address,
                    error = %e,
                    "Local probe failed"
                );
                if config.local_only {
                    None
                } else {
                    Some(Route::Remote)
                }
            }
        }
    }

    /// Schedule a reconnect, replacing a pending one.
    pub fn schedule_reconnect(&self, session: &Arc<DeviceSession>) {
        let delay = self.ctx.config.reconnect_delay();
        let manager = self.clone();
        let target = session.clone();
        session
            .reconnect_timer()
            .schedule(delay, move |generation| reconnect_tick(manager, target, generation));
        tracing::debug!(
            device_id = %session.device_id,
            delay_secs = delay.as_secs(),
            "Reconnect scheduled"
        );
    }

    fn schedule_init_retry(&self, session: &Arc<DeviceSession>) {
        let delay = self.ctx.config.init_retry_delay();
        let manager = self.clone();
        let target = session.clone();
        session
            .init_retry_timer()
            .schedule(delay, move |generation| init_retry_tick(manager, target, generation));
        tracing::debug!(
            device_id = %session.device_id,
            delay_secs = delay.as_secs(),
            "Initialization retry scheduled"
        );
    }

    async fn set_online(&self, session: &DeviceSession, online: bool) {
        let id = session.store_id("online");
        if let Err(e) = self.ctx.store.set_value(&id, StateValue::Boolean(online), true).await {
            tracing::debug!(
                device_id = %session.device_id,
                error = %e,
                "Failed to update online state"
            );
        }
    }

    fn log_failure(&self, session: &DeviceSession, namespace: Namespace, error: &TransportError) {
        if session.is_disabled() {
            tracing::debug!(
                device_id = %session.device_id,
                namespace = %namespace,
                error = %error,
                "Fetch failed"
            );
        } else {
            tracing::warn!(
                device_id = %session.device_id,
                namespace = %namespace,
                error = %error,
                "Fetch failed"
            );
        }
    }
}

fn reconnect_tick(
    manager: LifecycleManager,
    session: Arc<DeviceSession>,
    generation: u64,
) -> BoxFuture<'static, ()> {
    Box::pin(async move {
        if !session.reconnect_timer().release(generation) || manager.ctx.is_shutting_down() {
            return;
        }
        tracing::debug!(device_id = %session.device_id, "Reconnecting");
        manager.connect(&session).await;
    })
}

fn init_retry_tick(
    manager: LifecycleManager,
    session: Arc<DeviceSession>,
    generation: u64,
) -> BoxFuture<'static, ()> {
    Box::pin(async move {
        if !session.init_retry_timer().release(generation) || !session.is_connected() {
            return;
        }
        manager.run_initialization(&session).await;
    })
}
