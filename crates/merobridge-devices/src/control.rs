//! Control calls sent to devices.

use serde_json::{json, Value};
use thiserror::Error;

use crate::catalog::Namespace;
use crate::descriptor::{ChannelRef, WriteAction, WriteBinding};
use crate::transport::TransportError;

/// Light capacity bits selecting which field a light control applies.
pub mod light_capacity {
    pub const RGB: i64 = 1;
    pub const TEMPERATURE: i64 = 2;
    pub const LUMINANCE: i64 = 4;
}

/// Shutter position meaning "stop where you are".
pub const SHUTTER_STOP_POSITION: i64 = -1;

/// Error type for local write handling.
#[derive(Debug, Error)]
pub enum WriteError {
    /// Value cannot be converted for this point
    #[error("Invalid value: {0}")]
    InvalidValue(String),

    /// Point has no write binding
    #[error("Data point is not writable: {0}")]
    NotWritable(String),

    /// Binding addresses the wrong kind of channel for its action
    #[error("Invalid binding: {0}")]
    InvalidBinding(String),

    /// Device has no live transport
    #[error("Device communication not initialized: {0}")]
    NoTransport(String),

    /// Transport rejected the call
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),
}

/// A control request: target namespace and payload.
#[derive(Debug, Clone, PartialEq)]
pub struct ControlCall {
    pub namespace: Namespace,
    pub payload: Value,
}

impl ControlCall {
    pub fn new(namespace: Namespace, payload: Value) -> Self {
        Self { namespace, payload }
    }

    /// Build the call applying `wire` (already converted to wire units)
    /// through `binding`.
    pub fn build(binding: &WriteBinding, wire: i64) -> Result<Self, WriteError> {
        use WriteAction::*;

        let call = match (binding.action, &binding.channel) {
            (Toggle, _) => Self::new(Namespace::ControlToggle, json!({"toggle": {"onoff": wire}})),
            (ToggleX, ChannelRef::Index(ch)) => Self::new(
                Namespace::ControlToggleX,
                json!({"togglex": {"channel": ch, "onoff": wire}}),
            ),
            (GarageDoor, ChannelRef::Index(ch)) => Self::new(
                Namespace::GarageDoorState,
                json!({"state": {"channel": ch, "open": wire, "uuid": binding.device_id}}),
            ),
            (SprayMode, ChannelRef::Index(ch)) => Self::new(
                Namespace::ControlSpray,
                json!({"spray": {"channel": ch, "mode": wire}}),
            ),
            (LightRgb, ChannelRef::Index(ch)) => Self::light(*ch, light_capacity::RGB, "rgb", wire),
            (LightTemperature, ChannelRef::Index(ch)) => {
                Self::light(*ch, light_capacity::TEMPERATURE, "temperature", wire)
            }
            (LightLuminance, ChannelRef::Index(ch)) => {
                Self::light(*ch, light_capacity::LUMINANCE, "luminance", wire)
            }
            (DoNotDisturb, _) => {
                Self::new(Namespace::SystemDndMode, json!({"DNDMode": {"mode": wire}}))
            }
            (ThermostatOnOff, ChannelRef::Index(ch)) => Self::thermostat(*ch, "onoff", wire),
            (ThermostatMode, ChannelRef::Index(ch)) => Self::thermostat(*ch, "mode", wire),
            (ThermostatSetpoint(field), ChannelRef::Index(ch)) => {
                Self::thermostat(*ch, field, wire)
            }
            (ShutterPosition, ChannelRef::Index(ch)) => Self::shutter(*ch, wire),
            (ShutterOpen, ChannelRef::Index(ch)) => Self::shutter(*ch, 100),
            (ShutterClose, ChannelRef::Index(ch)) => Self::shutter(*ch, 0),
            (ShutterStop, ChannelRef::Index(ch)) => Self::shutter(*ch, SHUTTER_STOP_POSITION),
            (HubOnOff, ChannelRef::SubDevice(id)) => Self::new(
                Namespace::HubToggleX,
                json!({"togglex": [{"id": id, "onoff": wire}]}),
            ),
            (HubMode, ChannelRef::SubDevice(id)) => Self::new(
                Namespace::HubMts100Mode,
                json!({"mode": [{"id": id, "state": wire}]}),
            ),
            (HubTargetTemp, ChannelRef::SubDevice(id)) => Self::new(
                Namespace::HubMts100Temperature,
                json!({"temperature": [{"id": id, "custom": wire}]}),
            ),
            (DiffuserLightOnOff, ChannelRef::Index(ch)) => Self::diffuser_light(*ch, "onoff", wire),
            (DiffuserLightMode, ChannelRef::Index(ch)) => Self::diffuser_light(*ch, "mode", wire),
            (DiffuserLightRgb, ChannelRef::Index(ch)) => Self::diffuser_light(*ch, "rgb", wire),
            (DiffuserLightLuminance, ChannelRef::Index(ch)) => {
                Self::diffuser_light(*ch, "luminance", wire)
            }
            (DiffuserSprayMode, ChannelRef::Index(ch)) => Self::new(
                Namespace::ControlDiffuserSpray,
                json!({"spray": [{"channel": ch, "mode": wire}]}),
            ),
            (FanSpeed, ChannelRef::Index(ch)) => Self::new(
                Namespace::ControlFan,
                json!({"fan": [{"channel": ch, "speed": wire}]}),
            ),
            (ChildLock, ChannelRef::Index(ch)) => Self::new(
                Namespace::ControlPhysicalLock,
                json!({"lock": [{"channel": ch, "onoff": wire}]}),
            ),
            (action, channel) => {
                return Err(WriteError::InvalidBinding(format!(
                    "{:?} cannot address channel {}",
                    action, channel
                )))
            }
        };
        Ok(call)
    }

    fn light(channel: u32, capacity: i64, field: &str, wire: i64) -> Self {
        let mut light = json!({"channel": channel, "capacity": capacity});
        light[field] = json!(wire);
        Self::new(Namespace::ControlLight, json!({ "light": light }))
    }

    fn thermostat(channel: u32, field: &str, wire: i64) -> Self {
        let mut mode = json!({"channel": channel});
        mode[field] = json!(wire);
        Self::new(Namespace::ControlThermostatMode, json!({ "mode": [mode] }))
    }

    fn shutter(channel: u32, position: i64) -> Self {
        Self::new(
            Namespace::RollerShutterPosition,
            json!({"position": {"channel": channel, "position": position}}),
        )
    }

    fn diffuser_light(channel: u32, field: &str, wire: i64) -> Self {
        let mut light = json!({"channel": channel});
        light[field] = json!(wire);
        Self::new(Namespace::ControlDiffuserLight, json!({ "light": [light] }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_togglex_payload() {
        let binding = WriteBinding::new("dev1", ChannelRef::Index(2), WriteAction::ToggleX);
        let call = ControlCall::build(&binding, 1).unwrap();
        assert_eq!(call.namespace, Namespace::ControlToggleX);
        assert_eq!(call.payload, json!({"togglex": {"channel": 2, "onoff": 1}}));
    }

    #[test]
    fn test_shutter_buttons_ignore_wire_value() {
        let stop = WriteBinding::new("dev1", ChannelRef::Index(0), WriteAction::ShutterStop);
        let call = ControlCall::build(&stop, 1).unwrap();
        assert_eq!(call.payload, json!({"position": {"channel": 0, "position": -1}}));

        let open = WriteBinding::new("dev1", ChannelRef::Index(0), WriteAction::ShutterOpen);
        let call = ControlCall::build(&open, 1).unwrap();
        assert_eq!(call.payload["position"]["position"], json!(100));
    }

    #[test]
    fn test_hub_calls_address_sub_device() {
        let binding = WriteBinding::new(
            "hub1",
            ChannelRef::SubDevice("01005A2C".to_string()),
            WriteAction::HubTargetTemp,
        );
        let call = ControlCall::build(&binding, 215).unwrap();
        assert_eq!(call.namespace, Namespace::HubMts100Temperature);
        assert_eq!(call.payload, json!({"temperature": [{"id": "01005A2C", "custom": 215}]}));
    }

    #[test]
    fn test_thermostat_setpoint_field() {
        let binding = WriteBinding::new(
            "dev1",
            ChannelRef::Index(0),
            WriteAction::ThermostatSetpoint("ecoTemp"),
        );
        let call = ControlCall::build(&binding, 180).unwrap();
        assert_eq!(call.payload, json!({"mode": [{"channel": 0, "ecoTemp": 180}]}));
    }

    #[test]
    fn test_mismatched_channel_rejected() {
        let binding = WriteBinding::new("dev1", ChannelRef::Index(0), WriteAction::HubOnOff);
        assert!(matches!(
            ControlCall::build(&binding, 1),
            Err(WriteError::InvalidBinding(_))
        ));
    }
}
