//! Data point descriptors.
//!
//! A descriptor is the normalized definition of one addressable data point:
//! id, value type, access, unit, scale, bounds, enumerated states and role.
//! Write-capable points carry a [`WriteBinding`] naming the control call
//! that applies a new value; the constructors make it impossible to build a
//! writable descriptor without one.

use merobridge_core::{Access, ObjectDefinition, StateValue, ValueType};
use std::collections::BTreeMap;

use crate::catalog::FacetMeta;
use crate::control::{ControlCall, WriteError};
use crate::poller::PollKind;
use crate::scale::{parse_color, unscale_value};

/// Channel or sub-device a binding addresses.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ChannelRef {
    /// Numbered channel of the device itself
    Index(u32),
    /// Hub sub-device id
    SubDevice(String),
    /// Device-wide setting
    Device,
}

impl std::fmt::Display for ChannelRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Index(ch) => write!(f, "{}", ch),
            Self::SubDevice(id) => write!(f, "{}", id),
            Self::Device => write!(f, "device"),
        }
    }
}

/// Control action a writable point is bound to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WriteAction {
    Toggle,
    ToggleX,
    GarageDoor,
    SprayMode,
    LightRgb,
    LightTemperature,
    LightLuminance,
    DoNotDisturb,
    ThermostatOnOff,
    ThermostatMode,
    /// Adjustable thermostat setpoint; holds the wire field name
    ThermostatSetpoint(&'static str),
    ShutterPosition,
    ShutterOpen,
    ShutterClose,
    ShutterStop,
    HubOnOff,
    HubMode,
    HubTargetTemp,
    DiffuserLightOnOff,
    DiffuserLightMode,
    DiffuserLightRgb,
    DiffuserLightLuminance,
    DiffuserSprayMode,
    FanSpeed,
    ChildLock,
}

/// How a user value is converted to wire units.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Encoding {
    /// Boolean sent as 0/1
    Flag,
    /// Number sent with the inverse scale applied
    Scaled,
    /// `#rrggbb` sent as a packed integer
    Color,
    /// Write-only button; only `true` triggers
    Trigger,
}

impl WriteAction {
    pub fn encoding(&self) -> Encoding {
        match self {
            Self::Toggle
            | Self::ToggleX
            | Self::GarageDoor
            | Self::DoNotDisturb
            | Self::ThermostatOnOff
            | Self::HubOnOff
            | Self::DiffuserLightOnOff
            | Self::ChildLock => Encoding::Flag,
            Self::LightRgb | Self::DiffuserLightRgb => Encoding::Color,
            Self::ShutterOpen | Self::ShutterClose | Self::ShutterStop => Encoding::Trigger,
            _ => Encoding::Scaled,
        }
    }

    /// Poll to expedite after a successful write whose result the device
    /// does not push.
    pub fn follow_up(&self) -> Option<PollKind> {
        match self {
            Self::Toggle | Self::ToggleX => Some(PollKind::Electricity),
            Self::ShutterPosition | Self::ShutterOpen | Self::ShutterClose | Self::ShutterStop => {
                Some(PollKind::ShutterPosition)
            }
            _ => None,
        }
    }
}

/// Binding of a writable point to its control call.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct WriteBinding {
    pub device_id: String,
    pub channel: ChannelRef,
    pub action: WriteAction,
}

impl WriteBinding {
    pub fn new(device_id: impl Into<String>, channel: ChannelRef, action: WriteAction) -> Self {
        Self {
            device_id: device_id.into(),
            channel,
            action,
        }
    }
}

/// Definition of one data point.
#[derive(Debug, Clone, PartialEq)]
pub struct DataPointDescriptor {
    /// Point id relative to the device, e.g. `0-voltage`
    pub id: String,
    pub name: String,
    pub value_type: ValueType,
    pub unit: Option<String>,
    /// Power-of-ten exponent applied to raw wire values
    pub exponent: i32,
    pub min: Option<f64>,
    pub max: Option<f64>,
    pub states: BTreeMap<i64, String>,
    role: Option<String>,
    access: Access,
    write: Option<WriteBinding>,
}

impl DataPointDescriptor {
    fn base(
        id: impl Into<String>,
        name: impl Into<String>,
        value_type: ValueType,
        access: Access,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            value_type,
            unit: None,
            exponent: 0,
            min: None,
            max: None,
            states: BTreeMap::new(),
            role: None,
            access,
            write: None,
        }
    }

    /// Read-only point.
    pub fn sensor(id: impl Into<String>, name: impl Into<String>, value_type: ValueType) -> Self {
        Self::base(id, name, value_type, Access::ReadOnly)
    }

    /// Read-write point bound to a control call.
    pub fn control(
        id: impl Into<String>,
        name: impl Into<String>,
        value_type: ValueType,
        binding: WriteBinding,
    ) -> Self {
        let mut descriptor = Self::base(id, name, value_type, Access::ReadWrite);
        descriptor.write = Some(binding);
        descriptor
    }

    /// Write-only boolean trigger.
    pub fn button(id: impl Into<String>, name: impl Into<String>, binding: WriteBinding) -> Self {
        let mut descriptor = Self::base(id, name, ValueType::Boolean, Access::WriteOnly);
        descriptor.write = Some(binding);
        descriptor
    }

    /// Apply catalog metadata (scale, unit, role, bounds, states).
    pub fn with_meta(mut self, meta: Option<&FacetMeta>) -> Self {
        if let Some(meta) = meta {
            self.exponent = meta.exponent;
            self.unit = meta.unit.map(String::from);
            self.role = meta.role.map(String::from);
            self.min = meta.min;
            self.max = meta.max;
            self.states = meta.states_map();
        }
        self
    }

    pub fn with_role(mut self, role: impl Into<String>) -> Self {
        self.role = Some(role.into());
        self
    }

    pub fn with_bounds(mut self, min: Option<f64>, max: Option<f64>) -> Self {
        self.min = min;
        self.max = max;
        self
    }

    pub fn access(&self) -> Access {
        self.access
    }

    pub fn is_writable(&self) -> bool {
        self.access.is_writable()
    }

    pub fn write_binding(&self) -> Option<&WriteBinding> {
        self.write.as_ref()
    }

    /// Catalog role, or one inferred from type and access.
    pub fn role(&self) -> String {
        self.role
            .clone()
            .unwrap_or_else(|| infer_role(self.value_type, self.access).to_string())
    }

    pub fn to_object_definition(&self) -> ObjectDefinition {
        let mut definition =
            ObjectDefinition::state(&self.name, self.value_type, self.access, self.role())
                .with_bounds(self.min, self.max)
                .with_states(self.states.clone());
        definition.unit = self.unit.clone();
        definition
    }

    /// Convert a user value into wire units.
    pub fn encode(&self, value: &StateValue) -> Result<i64, WriteError> {
        let binding = self
            .write
            .as_ref()
            .ok_or_else(|| WriteError::NotWritable(self.id.clone()))?;

        match binding.action.encoding() {
            Encoding::Flag => value
                .as_bool()
                .map(i64::from)
                .ok_or_else(|| self.invalid(value, "expected a boolean")),
            Encoding::Trigger => match value.as_bool() {
                Some(true) => Ok(1),
                _ => Err(self.invalid(value, "buttons only accept true")),
            },
            Encoding::Color => parse_color(value)
                .map(i64::from)
                .ok_or_else(|| self.invalid(value, "expected #rrggbb")),
            Encoding::Scaled => {
                let number = value
                    .as_f64()
                    .ok_or_else(|| self.invalid(value, "expected a number"))?;
                let below = self.min.is_some_and(|min| number < min);
                let above = self.max.is_some_and(|max| number > max);
                if below || above {
                    return Err(self.invalid(value, "out of bounds"));
                }
                if self.value_type == ValueType::Enum
                    && (number.fract() != 0.0 || !self.states.contains_key(&(number as i64)))
                {
                    return Err(self.invalid(value, "not an enumerated state"));
                }
                Ok(unscale_value(number, self.exponent))
            }
        }
    }

    /// Build the control call that applies `value`.
    pub fn build_control(&self, value: &StateValue) -> Result<ControlCall, WriteError> {
        let wire = self.encode(value)?;
        let binding = self
            .write
            .as_ref()
            .ok_or_else(|| WriteError::NotWritable(self.id.clone()))?;
        ControlCall::build(binding, wire)
    }

    fn invalid(&self, value: &StateValue, reason: &str) -> WriteError {
        WriteError::InvalidValue(format!("{} = {} ({})", self.id, value, reason))
    }
}

/// Derive a role from value type and access.
///
/// boolean: ro sensor, wo button, rw switch. number: ro value, otherwise
/// level. string: text.
pub fn infer_role(value_type: ValueType, access: Access) -> &'static str {
    match (value_type, access) {
        (ValueType::Boolean, Access::ReadOnly) => "sensor",
        (ValueType::Boolean, Access::WriteOnly) => "button",
        (ValueType::Boolean, Access::ReadWrite) => "switch",
        (ValueType::Number | ValueType::Enum, Access::ReadOnly) => "value",
        (ValueType::Number | ValueType::Enum, _) => "level",
        (ValueType::Text, _) => "text",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{facet_meta, Namespace};
    use serde_json::json;

    fn binding(action: WriteAction) -> WriteBinding {
        WriteBinding::new("dev1", ChannelRef::Index(0), action)
    }

    #[test]
    fn test_infer_role() {
        assert_eq!(infer_role(ValueType::Boolean, Access::ReadOnly), "sensor");
        assert_eq!(infer_role(ValueType::Boolean, Access::WriteOnly), "button");
        assert_eq!(infer_role(ValueType::Boolean, Access::ReadWrite), "switch");
        assert_eq!(infer_role(ValueType::Number, Access::ReadOnly), "value");
        assert_eq!(infer_role(ValueType::Number, Access::WriteOnly), "level");
        assert_eq!(infer_role(ValueType::Number, Access::ReadWrite), "level");
        assert_eq!(infer_role(ValueType::Text, Access::ReadOnly), "text");
    }

    #[test]
    fn test_writable_points_carry_binding() {
        let sensor = DataPointDescriptor::sensor("0-power", "power", ValueType::Number);
        assert!(!sensor.is_writable());
        assert!(sensor.write_binding().is_none());

        let switch = DataPointDescriptor::control(
            "0",
            "All",
            ValueType::Boolean,
            binding(WriteAction::ToggleX),
        );
        assert!(switch.is_writable());
        assert!(switch.write_binding().is_some());
        assert_eq!(switch.role(), "switch");

        let up = DataPointDescriptor::button("0-up", "Up", binding(WriteAction::ShutterOpen));
        assert_eq!(up.access(), Access::WriteOnly);
        assert_eq!(up.role(), "button");
    }

    #[test]
    fn test_encode_scaled_with_bounds() {
        let target = DataPointDescriptor::control(
            "0-heatTemp",
            "Heat temperature",
            ValueType::Number,
            binding(WriteAction::ThermostatSetpoint("heatTemp")),
        )
        .with_meta(facet_meta(Namespace::ControlThermostatMode, "heatTemp"));

        assert_eq!(target.encode(&StateValue::Number(21.5)).unwrap(), 215);
        assert!(matches!(
            target.encode(&StateValue::Number(80.0)),
            Err(WriteError::InvalidValue(_))
        ));
        assert!(target.encode(&StateValue::from("warm")).is_err());
    }

    #[test]
    fn test_encode_enum_and_trigger() {
        let spray = DataPointDescriptor::control(
            "0-spray",
            "Spray mode",
            ValueType::Enum,
            binding(WriteAction::SprayMode),
        )
        .with_meta(facet_meta(Namespace::ControlSpray, "mode"));
        assert_eq!(spray.encode(&StateValue::Number(2.0)).unwrap(), 2);
        assert!(spray.encode(&StateValue::Number(7.0)).is_err());
        assert!(spray.encode(&StateValue::Number(1.5)).is_err());

        let stop = DataPointDescriptor::button("0-stop", "Stop", binding(WriteAction::ShutterStop));
        assert_eq!(stop.encode(&StateValue::Boolean(true)).unwrap(), 1);
        assert!(stop.encode(&StateValue::Boolean(false)).is_err());
    }

    #[test]
    fn test_build_control_color() {
        let rgb = DataPointDescriptor::control(
            "0-rgb",
            "Color",
            ValueType::Text,
            binding(WriteAction::LightRgb),
        );
        let call = rgb.build_control(&StateValue::from("#ff8000")).unwrap();
        assert_eq!(call.namespace, Namespace::ControlLight);
        assert_eq!(
            call.payload,
            json!({"light": {"channel": 0, "capacity": 1, "rgb": 0xFF8000}})
        );
    }

    #[test]
    fn test_sensor_rejects_writes() {
        let sensor = DataPointDescriptor::sensor("0-voltage", "voltage", ValueType::Number);
        assert!(matches!(
            sensor.build_control(&StateValue::Number(1.0)),
            Err(WriteError::NotWritable(_))
        ));
    }

    #[test]
    fn test_object_definition() {
        let voltage = DataPointDescriptor::sensor("0-voltage", "voltage", ValueType::Number)
            .with_meta(facet_meta(Namespace::ControlElectricity, "voltage"));
        let def = voltage.to_object_definition();
        assert_eq!(def.role, "value.voltage");
        assert_eq!(def.unit.as_deref(), Some("V"));
        assert_eq!(def.access, Access::ReadOnly);
    }
}
