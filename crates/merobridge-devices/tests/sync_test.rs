//! Push deltas, poll results and local writes through the sync bus.

mod common;

use std::time::Duration;

use common::{config, connect, plug_transport, settle, shutter_transport, start_fleet, DEVICE_ID};
use merobridge_core::{StateStore, StateValue};
use merobridge_devices::{ControlCall, Namespace, PollKind, TransportEvent, WriteError};
use serde_json::json;

#[tokio::test(start_paused = true)]
async fn test_unknown_namespace_changes_nothing() {
    let (store, fleet) = start_fleet(config()).await;
    let transport = plug_transport();
    connect(&fleet, &transport).await;

    let objects = store.object_ids();
    let values = store.values_with_prefix("dev1.");

    let written = fleet
        .sync_bus()
        .apply_push_delta(DEVICE_ID, "Appliance.Unknown.Foo", &json!({"foo": {"bar": 1}}))
        .await;
    assert_eq!(written, 0);

    transport.push("Appliance.Unknown.Foo", json!({"foo": 1}));
    settle().await;

    assert_eq!(store.object_ids(), objects);
    assert_eq!(store.values_with_prefix("dev1."), values);
}

#[tokio::test(start_paused = true)]
async fn test_push_single_object_and_array() {
    let (store, fleet) = start_fleet(config()).await;
    let transport = plug_transport();
    connect(&fleet, &transport).await;
    let bus = fleet.sync_bus();

    let single = json!({"togglex": {"channel": 0, "onoff": 0}});
    bus.apply_push_delta(DEVICE_ID, "Appliance.Control.ToggleX", &single).await;
    assert_eq!(store.value("dev1.0"), Some(StateValue::Boolean(false)));

    let list = json!({"togglex": [{"channel": 0, "onoff": 1}]});
    bus.apply_push_delta(DEVICE_ID, "Appliance.Control.ToggleX", &list).await;
    assert_eq!(store.value("dev1.0"), Some(StateValue::Boolean(true)));

    let record = store.get_value("dev1.0").await.unwrap();
    assert!(record.ack);
}

#[tokio::test(start_paused = true)]
async fn test_hub_push_single_object_and_array() {
    let (store, fleet) = start_fleet(config()).await;
    let transport = plug_transport();
    connect(&fleet, &transport).await;
    let bus = fleet.sync_bus();

    let single = json!({"togglex": {"id": "01005A2C", "onoff": 1}});
    let written = bus.apply_push_delta(DEVICE_ID, "Appliance.Hub.ToggleX", &single).await;
    assert_eq!(written, 1);
    assert_eq!(store.value("dev1.01005A2C.onoff"), Some(StateValue::Boolean(true)));

    let list = json!({"togglex": [{"id": "01005A2C", "onoff": 0}]});
    bus.apply_push_delta(DEVICE_ID, "Appliance.Hub.ToggleX", &list).await;
    assert_eq!(store.value("dev1.01005A2C.onoff"), Some(StateValue::Boolean(false)));

    bus.apply_local_write("dev1.01005A2C.onoff", StateValue::Boolean(true))
        .await
        .unwrap();
    assert_eq!(
        transport.control_calls(),
        vec![ControlCall::new(
            Namespace::HubToggleX,
            json!({"togglex": [{"id": "01005A2C", "onoff": 1}]})
        )]
    );
}

#[tokio::test(start_paused = true)]
async fn test_toggle_push_expedites_electricity() {
    let (store, fleet) = start_fleet(config()).await;
    let transport = plug_transport();
    connect(&fleet, &transport).await;
    let session = fleet.session(DEVICE_ID).unwrap();

    let remaining = session.polls().slot(PollKind::Electricity).remaining().unwrap();
    assert!(remaining > Duration::from_secs(20));

    let payload = json!({"toggle": {"onoff": 1}});
    let written = fleet
        .sync_bus()
        .apply_push_delta(DEVICE_ID, "Appliance.Control.Toggle", &payload)
        .await;
    assert_eq!(written, 1);
    assert_eq!(store.value("dev1.0-switch"), Some(StateValue::Boolean(true)));
    let remaining = session.polls().slot(PollKind::Electricity).remaining().unwrap();
    assert!(remaining <= Duration::from_secs(2));
}

#[tokio::test(start_paused = true)]
async fn test_single_channel_switch_write() {
    let (_store, fleet) = start_fleet(config()).await;
    let transport = plug_transport();
    connect(&fleet, &transport).await;
    let session = fleet.session(DEVICE_ID).unwrap();
    let bus = fleet.sync_bus();

    let payload = json!({"toggle": {"onoff": 1}});
    bus.apply_push_delta(DEVICE_ID, "Appliance.Control.Toggle", &payload).await;
    tokio::time::sleep(Duration::from_secs(3)).await;

    bus.apply_local_write("dev1.0-switch", StateValue::Boolean(false))
        .await
        .unwrap();
    assert_eq!(
        transport.control_calls(),
        vec![ControlCall::new(Namespace::ControlToggle, json!({"toggle": {"onoff": 0}}))]
    );
    let remaining = session.polls().slot(PollKind::Electricity).remaining().unwrap();
    assert!(remaining <= Duration::from_secs(2));
}

#[tokio::test(start_paused = true)]
async fn test_push_through_transport_events() {
    let (store, fleet) = start_fleet(config()).await;
    let transport = plug_transport();
    connect(&fleet, &transport).await;

    transport.emit(TransportEvent::Data {
        namespace: "Appliance.Control.Electricity".to_string(),
        payload: json!({"electricity": {
            "channel": 0, "current": 1250, "voltage": 2298, "power": 287500
        }}),
    });
    settle().await;

    assert_eq!(store.value("dev1.0-voltage"), Some(StateValue::Number(229.8)));
    assert_eq!(store.value("dev1.0-current"), Some(StateValue::Number(1.25)));
    assert_eq!(store.value("dev1.0-power"), Some(StateValue::Number(287.5)));
}

#[tokio::test(start_paused = true)]
async fn test_repeated_push_is_idempotent() {
    let (store, fleet) = start_fleet(config()).await;
    let transport = plug_transport();
    connect(&fleet, &transport).await;
    let bus = fleet.sync_bus();
    let payload = json!({"electricity": {"channel": 0, "current": 0, "voltage": 2331, "power": 0}});

    bus.apply_push_delta(DEVICE_ID, "Appliance.Control.Electricity", &payload).await;
    let objects = store.object_ids();
    let values = store.values_with_prefix("dev1.");

    bus.apply_push_delta(DEVICE_ID, "Appliance.Control.Electricity", &payload).await;
    assert_eq!(store.object_ids(), objects);
    assert_eq!(store.values_with_prefix("dev1."), values);
}

#[tokio::test(start_paused = true)]
async fn test_push_for_new_channel_defines_point() {
    let (store, fleet) = start_fleet(config()).await;
    let transport = plug_transport();
    connect(&fleet, &transport).await;

    let payload = json!({"togglex": [{"channel": 2, "onoff": 1}]});
    fleet
        .sync_bus()
        .apply_push_delta(DEVICE_ID, "Appliance.Control.ToggleX", &payload)
        .await;

    let object = store.get_object("dev1.2").await.unwrap();
    assert_eq!(object.name, "Channel 2");
    assert!(fleet.session(DEVICE_ID).unwrap().descriptor("2").is_some());
}

#[tokio::test(start_paused = true)]
async fn test_ignored_namespaces() {
    let (store, fleet) = start_fleet(config()).await;
    let transport = plug_transport();
    connect(&fleet, &transport).await;
    let objects = store.object_ids();

    let bus = fleet.sync_bus();
    assert_eq!(
        bus.apply_push_delta(DEVICE_ID, "Appliance.Control.Upgrade", &json!({"upgrade": {}})).await,
        0
    );
    assert_eq!(
        bus.apply_push_delta(DEVICE_ID, "Appliance.System.Report", &json!({"report": []})).await,
        0
    );
    assert_eq!(store.object_ids(), objects);
}

#[tokio::test(start_paused = true)]
async fn test_online_push_updates_reachability() {
    let (store, fleet) = start_fleet(config()).await;
    let transport = plug_transport();
    connect(&fleet, &transport).await;

    fleet
        .sync_bus()
        .apply_push_delta(DEVICE_ID, "Appliance.System.Online", &json!({"online": {"status": 2}}))
        .await;
    assert_eq!(store.value("dev1.online"), Some(StateValue::Boolean(false)));
}

#[tokio::test(start_paused = true)]
async fn test_user_write_sends_control_and_expedites_electricity() {
    let (store, fleet) = start_fleet(config()).await;
    let transport = plug_transport();
    connect(&fleet, &transport).await;
    let session = fleet.session(DEVICE_ID).unwrap();

    store
        .set_value("dev1.0", StateValue::Boolean(false), false)
        .await
        .unwrap();
    settle().await;

    assert_eq!(
        transport.control_calls(),
        vec![ControlCall::new(
            Namespace::ControlToggleX,
            json!({"togglex": {"channel": 0, "onoff": 0}})
        )]
    );
    let remaining = session.polls().slot(PollKind::Electricity).remaining().unwrap();
    assert!(remaining <= Duration::from_secs(2));

    tokio::time::sleep(Duration::from_secs(3)).await;
    assert_eq!(transport.query_count(Namespace::ControlElectricity), 2);
    // back on the regular interval afterwards
    let remaining = session.polls().slot(PollKind::Electricity).remaining().unwrap();
    assert!(remaining > Duration::from_secs(20));
}

#[tokio::test(start_paused = true)]
async fn test_acknowledged_changes_are_not_written() {
    let (store, fleet) = start_fleet(config()).await;
    let transport = plug_transport();
    connect(&fleet, &transport).await;

    store
        .set_value("dev1.0", StateValue::Boolean(false), true)
        .await
        .unwrap();
    settle().await;
    assert!(transport.control_calls().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_write_without_transport_is_dropped() {
    let (store, fleet) = start_fleet(config()).await;
    let transport = plug_transport();
    connect(&fleet, &transport).await;

    transport.emit(TransportEvent::Closed(None));
    settle().await;

    let result = fleet
        .sync_bus()
        .apply_local_write("dev1.0", StateValue::Boolean(true))
        .await;
    assert!(matches!(result, Err(WriteError::NoTransport(_))));

    store
        .set_value("dev1.0", StateValue::Boolean(true), false)
        .await
        .unwrap();
    settle().await;
    assert!(transport.control_calls().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_invalid_writes_are_rejected() {
    let (_store, fleet) = start_fleet(config()).await;
    let transport = plug_transport();
    connect(&fleet, &transport).await;
    let bus = fleet.sync_bus();

    assert!(matches!(
        bus.apply_local_write("dev1.0", StateValue::from("maybe")).await,
        Err(WriteError::InvalidValue(_))
    ));
    assert!(matches!(
        bus.apply_local_write("dev1.0-voltage", StateValue::Number(1.0)).await,
        Err(WriteError::NotWritable(_))
    ));
    assert!(matches!(
        bus.apply_local_write("dev9.0", StateValue::Boolean(true)).await,
        Err(WriteError::NotWritable(_))
    ));
    assert!(transport.control_calls().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_failed_control_surfaces_transport_error() {
    let (_store, fleet) = start_fleet(config()).await;
    let transport = plug_transport();
    connect(&fleet, &transport).await;
    let session = fleet.session(DEVICE_ID).unwrap();

    transport.fail_control(true);
    let result = fleet
        .sync_bus()
        .apply_local_write("dev1.0", StateValue::Boolean(true))
        .await;
    assert!(matches!(result, Err(WriteError::Transport(_))));
    // no follow-up poll for a failed write
    let remaining = session.polls().slot(PollKind::Electricity).remaining().unwrap();
    assert!(remaining > Duration::from_secs(20));
}

#[tokio::test(start_paused = true)]
async fn test_shutter_button_expedites_position_read() {
    let (store, fleet) = start_fleet(config()).await;
    let transport = shutter_transport();
    connect(&fleet, &transport).await;
    let session = fleet.session(DEVICE_ID).unwrap();

    assert_eq!(store.value("dev1.0-position"), Some(StateValue::Number(40.0)));
    assert_eq!(transport.query_count(Namespace::RollerShutterPosition), 1);

    transport.set_response(
        Namespace::RollerShutterPosition,
        json!({"position": [{"channel": 0, "position": 100}]}),
    );
    fleet
        .sync_bus()
        .apply_local_write("dev1.0-up", StateValue::Boolean(true))
        .await
        .unwrap();
    assert_eq!(
        transport.control_calls()[0].payload,
        json!({"position": {"channel": 0, "position": 100}})
    );
    assert!(session.polls().slot(PollKind::ShutterPosition).is_pending());

    tokio::time::sleep(Duration::from_secs(3)).await;
    assert_eq!(transport.query_count(Namespace::RollerShutterPosition), 2);
    assert_eq!(store.value("dev1.0-position"), Some(StateValue::Number(100.0)));
    // one-shot
    assert!(!session.polls().slot(PollKind::ShutterPosition).is_pending());
}
