//! Poll schedulers.
//!
//! Values the devices do not push reliably are re-read on a self-rescheduling
//! timer per (device, facet). Each tick releases its slot, issues one fetch,
//! applies the result through the [`SyncBus`] and then schedules the next
//! tick, whether the fetch succeeded or not. Only disconnect handling stops
//! the cycle.

use futures::future::BoxFuture;
use parking_lot::Mutex;
use rand::Rng;
use std::sync::Arc;
use std::time::Duration;

use crate::catalog::Namespace;
use crate::fleet::FleetContext;
use crate::session::DeviceSession;
use crate::sync::SyncBus;
use crate::timer::TimerSlot;

/// Polled facet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PollKind {
    /// Metering values, every `electricity_polling_interval`
    Electricity,
    /// Consumption history, every `consumption_polling_interval`
    Consumption,
    /// One-shot shutter position re-read after a move
    ShutterPosition,
}

impl PollKind {
    pub const RECURRING: [PollKind; 2] = [PollKind::Electricity, PollKind::Consumption];

    pub fn namespace(&self) -> Namespace {
        match self {
            Self::Electricity => Namespace::ControlElectricity,
            Self::Consumption => Namespace::ControlConsumptionX,
            Self::ShutterPosition => Namespace::RollerShutterPosition,
        }
    }

    pub fn is_recurring(&self) -> bool {
        !matches!(self, Self::ShutterPosition)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Electricity => "electricity",
            Self::Consumption => "consumption",
            Self::ShutterPosition => "shutter_position",
        }
    }
}

impl std::fmt::Display for PollKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Delay class of a scheduled tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollDelay {
    /// Configured interval plus jitter
    Regular,
    /// Short one-off delay superseding the regular tick
    Expedited,
}

#[derive(Debug, Default)]
struct PollState {
    /// Generation of the tick whose fetch is running
    in_flight: Option<u64>,
    /// Expedite requested while a fetch was running
    expedite_requested: bool,
}

/// Timer and in-flight tracking for one (device, facet) pair.
#[derive(Default)]
pub struct PollSlot {
    timer: TimerSlot,
    state: Mutex<PollState>,
}

impl PollSlot {
    pub fn is_pending(&self) -> bool {
        self.timer.is_pending()
    }

    pub fn is_in_flight(&self) -> bool {
        self.state.lock().in_flight.is_some()
    }

    /// Time left until the pending tick.
    pub fn remaining(&self) -> Option<Duration> {
        self.timer.remaining()
    }

    fn cancel(&self) -> bool {
        let mut state = self.state.lock();
        state.in_flight = None;
        state.expedite_requested = false;
        self.timer.cancel()
    }
}

/// Poll slots of one device.
#[derive(Default)]
pub struct PollSlots {
    electricity: PollSlot,
    consumption: PollSlot,
    shutter_position: PollSlot,
}

impl PollSlots {
    pub fn slot(&self, kind: PollKind) -> &PollSlot {
        match kind {
            PollKind::Electricity => &self.electricity,
            PollKind::Consumption => &self.consumption,
            PollKind::ShutterPosition => &self.shutter_position,
        }
    }

    /// Number of ticks waiting to fire.
    pub fn pending_count(&self) -> usize {
        [&self.electricity, &self.consumption, &self.shutter_position]
            .iter()
            .filter(|slot| slot.is_pending())
            .count()
    }
}

/// Schedules and cancels poll ticks.
#[derive(Clone)]
pub struct Poller {
    ctx: Arc<FleetContext>,
}

impl Poller {
    pub fn new(ctx: Arc<FleetContext>) -> Self {
        Self { ctx }
    }

    /// Start the recurring polls the device advertises.
    pub fn start_all(&self, session: &Arc<DeviceSession>) -> usize {
        PollKind::RECURRING
            .iter()
            .filter(|kind| self.schedule(session, **kind, PollDelay::Regular))
            .count()
    }

    /// Schedule the next tick of `kind`, replacing a pending one.
    ///
    /// Nothing is scheduled while the device is not connected or does not
    /// advertise the backing ability. While a fetch is running the request
    /// is deferred to the end of that tick. Returns `true` if a timer was
    /// set.
    pub fn schedule(&self, session: &Arc<DeviceSession>, kind: PollKind, delay: PollDelay) -> bool {
        if !session.is_connected() || !session.supports(kind.namespace()) {
            return false;
        }

        let slot = session.polls().slot(kind);
        let mut state = slot.state.lock();
        if state.in_flight.is_some() {
            if delay == PollDelay::Expedited {
                state.expedite_requested = true;
            }
            tracing::trace!(
                device_id = %session.device_id,
                poll = %kind,
                "Poll in flight, deferring"
            );
            return false;
        }

        let wait = self.delay_for(kind, delay);
        let ctx = self.ctx.clone();
        let tick_session = session.clone();
        slot.timer
            .schedule(wait, move |generation| tick(ctx, tick_session, kind, generation));
        tracing::debug!(
            device_id = %session.device_id,
            poll = %kind,
            delay_ms = wait.as_millis() as u64,
            "Poll scheduled"
        );
        true
    }

    /// Request a short one-off poll that supersedes the scheduled tick.
    pub fn request_expedited(&self, session: &Arc<DeviceSession>, kind: PollKind) -> bool {
        self.schedule(session, kind, PollDelay::Expedited)
    }

    /// Cancel every poll of the device.
    pub fn cancel_all(&self, session: &DeviceSession) {
        let polls = session.polls();
        let cancelled = [PollKind::Electricity, PollKind::Consumption, PollKind::ShutterPosition]
            .iter()
            .filter(|kind| polls.slot(**kind).cancel())
            .count();
        if cancelled > 0 {
            tracing::debug!(device_id = %session.device_id, cancelled, "Polls cancelled");
        }
    }

    fn delay_for(&self, kind: PollKind, delay: PollDelay) -> Duration {
        let config = &self.ctx.config;
        match (kind, delay) {
            (_, PollDelay::Expedited) | (PollKind::ShutterPosition, _) => config.expedited_delay(),
            (PollKind::Electricity, PollDelay::Regular) => {
                config.electricity_interval() + self.jitter()
            }
            (PollKind::Consumption, PollDelay::Regular) => {
                config.consumption_interval() + self.jitter()
            }
        }
    }

    fn jitter(&self) -> Duration {
        let max = self.ctx.config.poll_jitter_ms;
        if max == 0 {
            return Duration::ZERO;
        }
        let ms = rand::thread_rng().gen_range(0..=max);
        Duration::from_millis(ms)
    }
}

fn tick(
    ctx: Arc<FleetContext>,
    session: Arc<DeviceSession>,
    kind: PollKind,
    generation: u64,
) -> BoxFuture<'static, ()> {
    Box::pin(async move {
        let slot = session.polls().slot(kind);
        {
            let mut state = slot.state.lock();
            if !slot.timer.release(generation) {
                return;
            }
            state.in_flight = Some(generation);
        }

        let Some(transport) = session.live_transport() else {
            slot.state.lock().in_flight = None;
            return;
        };

        match transport.query(kind.namespace()).await {
            Ok(payload) => {
                SyncBus::new(ctx.clone())
                    .apply_poll_result(&session, kind.namespace(), &payload)
                    .await;
            }
            Err(e) => {
                if session.is_disabled() {
                    tracing::debug!(
                        device_id = %session.device_id,
                        poll = %kind,
                        error = %e,
                        "Poll failed"
                    );
                } else {
                    tracing::warn!(
                        device_id = %session.device_id,
                        poll = %kind,
                        error = %e,
                        "Poll failed"
                    );
                }
            }
        }

        let expedite = {
            let mut state = slot.state.lock();
            if state.in_flight != Some(generation) {
                // cancelled while the fetch was running
                return;
            }
            state.in_flight = None;
            std::mem::take(&mut state.expedite_requested)
        };

        let poller = Poller::new(ctx);
        if expedite {
            poller.schedule(&session, kind, PollDelay::Expedited);
        } else if kind.is_recurring() {
            poller.schedule(&session, kind, PollDelay::Regular);
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_poll_kind_namespaces() {
        assert_eq!(PollKind::Electricity.namespace(), Namespace::ControlElectricity);
        assert_eq!(PollKind::Consumption.namespace(), Namespace::ControlConsumptionX);
        assert!(!PollKind::ShutterPosition.is_recurring());
        assert_eq!(PollKind::RECURRING.len(), 2);
    }

    #[test]
    fn test_slots_start_idle() {
        let slots = PollSlots::default();
        assert_eq!(slots.pending_count(), 0);
        assert!(!slots.slot(PollKind::Electricity).is_in_flight());
    }
}
