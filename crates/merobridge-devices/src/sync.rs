//! Synchronization bus.
//!
//! Single funnel for value changes in both directions: device pushes and
//! poll results are projected and written to the store as acknowledged,
//! and unacknowledged store changes (user commands) are turned into control
//! calls. Writes are fire-and-forget; the device's own push or the next
//! poll brings the store back in line with the device.

use merobridge_core::{Error as StoreError, StateChange, StateValue};
use serde_json::Value;
use std::sync::Arc;
use tokio::task::JoinHandle;

use crate::catalog::Namespace;
use crate::control::WriteError;
use crate::fleet::FleetContext;
use crate::poller::{PollKind, Poller};
use crate::projector::{ProjectedPoint, Projector};
use crate::session::DeviceSession;

/// Routes pushes, poll results and local writes.
#[derive(Clone)]
pub struct SyncBus {
    ctx: Arc<FleetContext>,
}

impl SyncBus {
    pub fn new(ctx: Arc<FleetContext>) -> Self {
        Self { ctx }
    }

    /// Apply a pushed delta for `namespace`.
    ///
    /// Unknown namespaces are logged with their payload and otherwise
    /// ignored. Returns the number of points written.
    pub async fn apply_push_delta(
        &self,
        device_id: &str,
        namespace: &str,
        payload: &Value,
    ) -> usize {
        let Some(session) = self.ctx.session(device_id) else {
            tracing::debug!(
                device_id = %device_id,
                namespace = %namespace,
                "Push for unknown device ignored"
            );
            return 0;
        };
        self.apply_push(&session, namespace, payload).await
    }

    pub(crate) async fn apply_push(
        &self,
        session: &Arc<DeviceSession>,
        namespace: &str,
        payload: &Value,
    ) -> usize {
        let Some(ns) = Namespace::parse(namespace) else {
            tracing::info!(
                device_id = %session.device_id,
                namespace = %namespace,
                payload = %payload,
                "Unknown namespace received, ignoring"
            );
            return 0;
        };
        if ns.is_ignored() {
            tracing::debug!(device_id = %session.device_id, namespace = %ns, "Push ignored");
            return 0;
        }

        let written = self.apply_namespace(session, ns, payload).await;
        if written > 0 && matches!(ns, Namespace::ControlToggle | Namespace::ControlToggleX) {
            // a switched load changes the metering reading, which is not pushed
            Poller::new(self.ctx.clone()).request_expedited(session, PollKind::Electricity);
        }
        written
    }

    /// Apply the response of a poll or an on-connect fetch.
    pub async fn apply_poll_result(
        &self,
        session: &Arc<DeviceSession>,
        namespace: Namespace,
        payload: &Value,
    ) -> usize {
        self.apply_namespace(session, namespace, payload).await
    }

    async fn apply_namespace(
        &self,
        session: &DeviceSession,
        namespace: Namespace,
        payload: &Value,
    ) -> usize {
        let points = Projector::new(&session.device_id, &session.definition)
            .project_namespace(namespace, payload);
        self.write_points(session, points).await
    }

    /// Write projected points to the store.
    ///
    /// New or changed descriptors are (re)defined; known ones only get
    /// their value written. Store failures are logged per point.
    pub async fn write_points(
        &self,
        session: &DeviceSession,
        points: Vec<ProjectedPoint>,
    ) -> usize {
        let mut written = 0;
        for ProjectedPoint { descriptor, value } in points {
            let store_id = session.store_id(&descriptor.id);
            let definition = descriptor.to_object_definition();
            let changed = session.upsert_descriptor(descriptor);

            let result = if changed {
                self.ctx.store.define_or_update(&store_id, definition, value).await
            } else if let Some(value) = value {
                match self.ctx.store.set_value(&store_id, value.clone(), true).await {
                    Err(StoreError::NotFound(_)) => {
                        self.ctx.store.define_or_update(&store_id, definition, Some(value)).await
                    }
                    other => other,
                }
            } else {
                Ok(())
            };

            match result {
                Ok(()) => written += 1,
                Err(e) => {
                    tracing::warn!(
                        device_id = %session.device_id,
                        point = %store_id,
                        error = %e,
                        "Failed to write data point"
                    )
                }
            }
        }
        written
    }

    /// Apply a user write to `<device>.<point>`.
    ///
    /// Resolves the descriptor, converts the value and invokes its control
    /// call. A successful write may request an expedited re-read of values
    /// the device does not push.
    pub async fn apply_local_write(
        &self,
        store_id: &str,
        value: StateValue,
    ) -> Result<(), WriteError> {
        let (device_id, point_id) = store_id
            .split_once('.')
            .ok_or_else(|| WriteError::NotWritable(store_id.to_string()))?;
        let session = self
            .ctx
            .session(device_id)
            .ok_or_else(|| WriteError::NotWritable(store_id.to_string()))?;
        let descriptor = session
            .descriptor(point_id)
            .filter(|d| d.is_writable())
            .ok_or_else(|| WriteError::NotWritable(store_id.to_string()))?;
        let transport = session
            .live_transport()
            .ok_or_else(|| WriteError::NoTransport(device_id.to_string()))?;

        let call = descriptor.build_control(&value)?;
        tracing::debug!(
            device_id = %device_id,
            point = %point_id,
            namespace = %call.namespace,
            payload = %call.payload,
            "Sending control"
        );
        transport.control(&call).await?;

        if let Some(kind) = descriptor.write_binding().and_then(|b| b.action.follow_up()) {
            Poller::new(self.ctx.clone()).request_expedited(&session, kind);
        }
        Ok(())
    }

    /// Log the outcome of a local write at the level it deserves.
    async fn handle_command(&self, change: StateChange) {
        let Err(e) = self.apply_local_write(&change.id, change.value).await else {
            return;
        };
        let disabled = change
            .id
            .split_once('.')
            .and_then(|(device_id, _)| self.ctx.session(device_id))
            .is_some_and(|s| s.is_disabled());
        match e {
            WriteError::NoTransport(_) | WriteError::NotWritable(_) => {
                tracing::debug!(point = %change.id, error = %e, "Write dropped")
            }
            WriteError::Transport(_) if disabled => {
                tracing::debug!(point = %change.id, error = %e, "Write failed")
            }
            _ => tracing::warn!(point = %change.id, error = %e, "Write failed"),
        }
    }

    /// Subscribe to user writes on device points and dispatch them.
    ///
    /// Each write runs in its own task; concurrent writes to the same
    /// point are not deduplicated.
    pub fn spawn_write_listener(&self) -> JoinHandle<()> {
        let mut rx = self.ctx.store.subscribe("*");
        let bus = self.clone();
        tokio::spawn(async move {
            while let Some(change) = rx.recv().await {
                if change.ack {
                    continue;
                }
                let known = change
                    .id
                    .split_once('.')
                    .is_some_and(|(device_id, _)| bus.ctx.session(device_id).is_some());
                if !known {
                    continue;
                }
                let bus = bus.clone();
                tokio::spawn(async move { bus.handle_command(change).await });
            }
            tracing::debug!("Write listener stopped");
        })
    }
}
