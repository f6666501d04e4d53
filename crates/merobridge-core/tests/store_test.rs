//! State store behaviour seen through the trait object.

use std::sync::Arc;

use merobridge_core::{
    Access, MemoryStore, ObjectDefinition, StateStore, StateValue, ValueType,
};
use tokio::test;

fn level(name: &str) -> ObjectDefinition {
    ObjectDefinition::state(name, ValueType::Number, Access::ReadWrite, "level")
        .with_bounds(Some(0.0), Some(100.0))
}

#[test]
async fn test_commands_and_acks_reach_subscribers() {
    let memory = Arc::new(MemoryStore::new());
    let store: Arc<dyn StateStore> = memory.clone();

    store
        .define_or_update("dev1.0-position", level("Position"), Some(StateValue::Number(0.0)))
        .await
        .unwrap();

    let mut sub = store.subscribe("dev1.*");

    store
        .set_value("dev1.0-position", StateValue::Number(40.0), false)
        .await
        .unwrap();
    store
        .set_value("dev1.0-position", StateValue::Number(40.0), true)
        .await
        .unwrap();

    let command = sub.recv().await.unwrap();
    assert!(command.is_command());
    let ack = sub.recv().await.unwrap();
    assert!(ack.ack);

    let record = store.get_value("dev1.0-position").await.unwrap();
    assert_eq!(record.value, StateValue::Number(40.0));
    assert!(record.ack);
}

#[test]
async fn test_redefinition_replaces_object() {
    let store = MemoryStore::new();
    store
        .define_or_update("dev1.0-fanSpeed", level("Fan"), None)
        .await
        .unwrap();
    store
        .define_or_update(
            "dev1.0-fanSpeed",
            level("Fan").with_bounds(Some(0.0), Some(4.0)),
            None,
        )
        .await
        .unwrap();

    assert_eq!(store.len(), 1);
    let object = store.get_object("dev1.0-fanSpeed").await.unwrap();
    assert_eq!(object.max, Some(4.0));
    assert!(store.get_value("dev1.0-fanSpeed").await.is_none());
}

#[test]
async fn test_prefix_queries() {
    let store = MemoryStore::new();
    for id in ["dev1.0", "dev1.1", "dev2.0"] {
        store
            .define_or_update(id, level(id), Some(StateValue::Number(1.0)))
            .await
            .unwrap();
    }
    assert_eq!(store.object_ids_with_prefix("dev1."), vec!["dev1.0", "dev1.1"]);
    assert_eq!(store.values_with_prefix("dev2.").len(), 1);
}
