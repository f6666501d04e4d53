//! Shared fixtures for the engine integration tests.

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use merobridge_core::{BridgeConfig, MemoryStore, StateStore};
use merobridge_devices::{DeviceDefinition, DeviceFleet, MockTransport, Namespace, Transport};
use serde_json::{json, Value};

pub const DEVICE_ID: &str = "dev1";

/// Config without poll jitter so tick times are exact.
pub fn config() -> BridgeConfig {
    BridgeConfig {
        poll_jitter_ms: 0,
        ..BridgeConfig::default()
    }
}

pub async fn start_fleet(config: BridgeConfig) -> (Arc<MemoryStore>, DeviceFleet) {
    let store = Arc::new(MemoryStore::new());
    let fleet = DeviceFleet::new(store.clone() as Arc<dyn StateStore>, config);
    fleet.start().await.unwrap();
    (store, fleet)
}

pub fn plug_snapshot() -> Value {
    json!({"all": {
        "system": {
            "hardware": {"uuid": DEVICE_ID},
            "firmware": {"innerIp": "192.168.1.20"}
        },
        "digest": {"togglex": [{"channel": 0, "onoff": 1}]}
    }})
}

/// Metering smart plug: ToggleX, Electricity and ConsumptionX.
pub fn plug_transport() -> Arc<MockTransport> {
    Arc::new(
        MockTransport::new()
            .with_abilities(&[
                Namespace::ControlToggleX,
                Namespace::ControlElectricity,
                Namespace::ControlConsumptionX,
            ])
            .with_all_data(plug_snapshot())
            .with_response(
                Namespace::ControlElectricity,
                json!({"electricity": {"channel": 0, "current": 0, "voltage": 2331, "power": 0}}),
            )
            .with_response(
                Namespace::ControlConsumptionX,
                json!({"consumptionx": [
                    {"date": "2024-03-01", "time": 1709251200, "value": 120},
                    {"date": "2024-03-02", "time": 1709337600, "value": 80}
                ]}),
            ),
    )
}

/// Roller shutter with position and state.
pub fn shutter_transport() -> Arc<MockTransport> {
    Arc::new(
        MockTransport::new()
            .with_abilities(&[Namespace::RollerShutterPosition, Namespace::RollerShutterState])
            .with_response(
                Namespace::RollerShutterPosition,
                json!({"position": [{"channel": 0, "position": 40}]}),
            )
            .with_response(
                Namespace::RollerShutterState,
                json!({"state": [{"channel": 0, "state": 0}]}),
            ),
    )
}

/// Register `transport` as `dev1` and wait for the first initialization.
pub async fn connect(fleet: &DeviceFleet, transport: &Arc<MockTransport>) {
    connect_with(fleet, transport, DeviceDefinition::default()).await;
}

pub async fn connect_with(
    fleet: &DeviceFleet,
    transport: &Arc<MockTransport>,
    definition: DeviceDefinition,
) {
    let ready = fleet
        .init_device(DEVICE_ID, definition, transport.clone() as Arc<dyn Transport>)
        .await
        .unwrap();
    assert!(ready.wait().await);
}

/// Let spawned tasks run without reaching any engine timer.
pub async fn settle() {
    tokio::time::sleep(Duration::from_millis(10)).await;
}
