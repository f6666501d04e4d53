//! Data point projector.
//!
//! Maps decoded facets onto [`DataPointDescriptor`]s and their current
//! values. Projection is a pure function of the payload, the ability set
//! and the channel naming hints, so projecting the same input twice yields
//! the same points.

use chrono::NaiveDate;
use merobridge_core::{StateValue, ValueType};
use serde_json::Value;

use crate::catalog::{facet_meta, AbilitySet, Namespace};
use crate::descriptor::{ChannelRef, DataPointDescriptor, WriteAction, WriteBinding};
use crate::payload::{
    ConsumptionEntry, DiffuserLightEntry, ElectricityEntry, Facet, LightEntry, SubDeviceReading,
    ThermostatEntry,
};
use crate::scale::{packed_to_hex, scale_value};
use crate::session::DeviceDefinition;

/// A projected data point with its current value.
///
/// Buttons and points absent from the payload carry no value.
#[derive(Debug, Clone, PartialEq)]
pub struct ProjectedPoint {
    pub descriptor: DataPointDescriptor,
    pub value: Option<StateValue>,
}

impl ProjectedPoint {
    fn new(descriptor: DataPointDescriptor, value: Option<StateValue>) -> Self {
        Self { descriptor, value }
    }
}

/// Extract `all.system.firmware.innerIp` from a snapshot.
pub fn inner_ip(all: &Value) -> Option<&str> {
    all.pointer("/all/system/firmware/innerIp")
        .and_then(Value::as_str)
        .filter(|ip| !ip.is_empty())
}

/// Projects facets of one device.
pub struct Projector<'a> {
    device_id: &'a str,
    definition: &'a DeviceDefinition,
    abilities: Option<&'a AbilitySet>,
}

impl<'a> Projector<'a> {
    pub fn new(device_id: &'a str, definition: &'a DeviceDefinition) -> Self {
        Self {
            device_id,
            definition,
            abilities: None,
        }
    }

    /// Gate snapshot facets on the advertised abilities.
    pub fn with_abilities(mut self, abilities: &'a AbilitySet) -> Self {
        self.abilities = Some(abilities);
        self
    }

    /// Project a full `Appliance.System.All` snapshot.
    ///
    /// Facets whose backing ability is not advertised are skipped. The
    /// digest block is read from `all.digest`, falling back to the legacy
    /// `all.control` block.
    pub fn project_snapshot(&self, all: &Value) -> Vec<ProjectedPoint> {
        let mut points = Vec::new();
        if let Some(ip) = inner_ip(all) {
            let descriptor = DataPointDescriptor::sensor("ip", "IP address", ValueType::Text)
                .with_role("info.ip");
            points.push(ProjectedPoint::new(descriptor, Some(StateValue::from(ip))));
        }

        let root = all.get("all").unwrap_or(all);
        let Some(digest) = root.get("digest").or_else(|| root.get("control")) else {
            tracing::debug!(device_id = %self.device_id, "Snapshot has no digest");
            return points;
        };

        let facets = Facet::from_digest(digest)
            .into_iter()
            .filter(|facet| self.is_advertised(facet));
        points.extend(self.project_facets(facets));
        points
    }

    /// Project a pushed or fetched payload of `namespace`.
    ///
    /// Not gated on abilities: a device pushing a namespace evidently
    /// supports it.
    pub fn project_namespace(&self, namespace: Namespace, payload: &Value) -> Vec<ProjectedPoint> {
        self.project_facets(Facet::from_push(namespace, payload))
    }

    pub fn project_facets<I>(&self, facets: I) -> Vec<ProjectedPoint>
    where
        I: IntoIterator<Item = Facet>,
    {
        facets
            .into_iter()
            .flat_map(|facet| self.project_facet(&facet))
            .collect()
    }

    /// Project one facet. Unsupported facets are logged and yield nothing.
    pub fn project_facet(&self, facet: &Facet) -> Vec<ProjectedPoint> {
        match facet {
            Facet::Toggle(entry) => vec![ProjectedPoint::new(
                DataPointDescriptor::control(
                    "0-switch",
                    "Switch",
                    ValueType::Boolean,
                    self.bind(ChannelRef::Index(0), WriteAction::Toggle),
                ),
                Some(StateValue::Boolean(entry.onoff != 0)),
            )],
            Facet::ToggleX(entry) => vec![ProjectedPoint::new(
                DataPointDescriptor::control(
                    entry.channel.to_string(),
                    self.channel_name(entry.channel),
                    ValueType::Boolean,
                    self.bind(ChannelRef::Index(entry.channel), WriteAction::ToggleX),
                ),
                Some(StateValue::Boolean(entry.onoff != 0)),
            )],
            Facet::Electricity(entry) => self.electricity(entry),
            Facet::Consumption(entries) => self.consumption(entries),
            Facet::GarageDoor(entry) => vec![ProjectedPoint::new(
                DataPointDescriptor::control(
                    format!("{}-garageDoor", entry.channel),
                    self.label(entry.channel, "garage door"),
                    ValueType::Boolean,
                    self.bind(ChannelRef::Index(entry.channel), WriteAction::GarageDoor),
                )
                .with_meta(facet_meta(Namespace::GarageDoorState, "open")),
                Some(StateValue::Boolean(entry.open == 1)),
            )],
            Facet::Spray(entry) => vec![ProjectedPoint::new(
                DataPointDescriptor::control(
                    format!("{}-spray", entry.channel),
                    self.label(entry.channel, "spray mode"),
                    ValueType::Enum,
                    self.bind(ChannelRef::Index(entry.channel), WriteAction::SprayMode),
                )
                .with_meta(facet_meta(Namespace::ControlSpray, "mode")),
                Some(StateValue::from(entry.mode)),
            )],
            Facet::Light(entry) => self.light(entry),
            Facet::DoNotDisturb(entry) => vec![ProjectedPoint::new(
                DataPointDescriptor::control(
                    "dnd",
                    "Do not disturb",
                    ValueType::Boolean,
                    self.bind(ChannelRef::Device, WriteAction::DoNotDisturb),
                )
                .with_meta(facet_meta(Namespace::SystemDndMode, "mode")),
                Some(StateValue::Boolean(entry.mode == 1)),
            )],
            Facet::Thermostat(entry) => self.thermostat(entry),
            Facet::ShutterPosition(entry) => {
                let ch = entry.channel;
                let channel = ChannelRef::Index(ch);
                vec![
                    ProjectedPoint::new(
                        DataPointDescriptor::control(
                            format!("{}-position", ch),
                            self.label(ch, "position"),
                            ValueType::Number,
                            self.bind(channel.clone(), WriteAction::ShutterPosition),
                        )
                        .with_meta(facet_meta(Namespace::RollerShutterPosition, "position")),
                        Some(StateValue::from(entry.position)),
                    ),
                    ProjectedPoint::new(
                        DataPointDescriptor::button(
                            format!("{}-up", ch),
                            self.label(ch, "open"),
                            self.bind(channel.clone(), WriteAction::ShutterOpen),
                        )
                        .with_role("button.open"),
                        None,
                    ),
                    ProjectedPoint::new(
                        DataPointDescriptor::button(
                            format!("{}-down", ch),
                            self.label(ch, "close"),
                            self.bind(channel.clone(), WriteAction::ShutterClose),
                        )
                        .with_role("button.close"),
                        None,
                    ),
                    ProjectedPoint::new(
                        DataPointDescriptor::button(
                            format!("{}-stop", ch),
                            self.label(ch, "stop"),
                            self.bind(channel, WriteAction::ShutterStop),
                        )
                        .with_role("button.stop"),
                        None,
                    ),
                ]
            }
            Facet::ShutterState(entry) => vec![ProjectedPoint::new(
                DataPointDescriptor::sensor(
                    format!("{}-state", entry.channel),
                    self.label(entry.channel, "state"),
                    ValueType::Enum,
                )
                .with_meta(facet_meta(Namespace::RollerShutterState, "state")),
                Some(StateValue::from(entry.state)),
            )],
            Facet::DiffuserLight(entry) => self.diffuser_light(entry),
            Facet::DiffuserSpray(entry) => vec![ProjectedPoint::new(
                DataPointDescriptor::control(
                    format!("{}-sprayMode", entry.channel),
                    self.label(entry.channel, "spray mode"),
                    ValueType::Enum,
                    self.bind(ChannelRef::Index(entry.channel), WriteAction::DiffuserSprayMode),
                )
                .with_meta(facet_meta(Namespace::ControlDiffuserSpray, "mode")),
                Some(StateValue::from(entry.mode)),
            )],
            Facet::Fan(entry) => {
                let mut descriptor = DataPointDescriptor::control(
                    format!("{}-fanSpeed", entry.channel),
                    self.label(entry.channel, "fan speed"),
                    ValueType::Number,
                    self.bind(ChannelRef::Index(entry.channel), WriteAction::FanSpeed),
                )
                .with_meta(facet_meta(Namespace::ControlFan, "speed"));
                if let Some(max) = entry.max_speed {
                    descriptor = descriptor.with_bounds(Some(0.0), Some(max as f64));
                }
                vec![ProjectedPoint::new(descriptor, Some(StateValue::from(entry.speed)))]
            }
            Facet::Filter(entry) => vec![ProjectedPoint::new(
                DataPointDescriptor::sensor(
                    format!("{}-filterLife", entry.channel),
                    self.label(entry.channel, "filter life"),
                    ValueType::Number,
                )
                .with_meta(facet_meta(Namespace::ControlFilterMaintenance, "life")),
                Some(StateValue::from(entry.life)),
            )],
            Facet::PhysicalLock(entry) => vec![ProjectedPoint::new(
                DataPointDescriptor::control(
                    format!("{}-childLock", entry.channel),
                    self.label(entry.channel, "child lock"),
                    ValueType::Boolean,
                    self.bind(ChannelRef::Index(entry.channel), WriteAction::ChildLock),
                )
                .with_meta(facet_meta(Namespace::ControlPhysicalLock, "onoff")),
                Some(StateValue::Boolean(entry.onoff != 0)),
            )],
            Facet::SubDevice(reading) => self.sub_device(reading),
            Facet::Online(entry) => vec![ProjectedPoint::new(
                DataPointDescriptor::sensor("online", "Online", ValueType::Boolean)
                    .with_role("indicator.reachable"),
                Some(StateValue::Boolean(entry.status == 1)),
            )],
            Facet::Unsupported { family, reason, raw } => {
                tracing::info!(
                    device_id = %self.device_id,
                    family = %family,
                    reason = %reason,
                    payload = %raw,
                    "Unsupported payload shape, skipping"
                );
                Vec::new()
            }
        }
    }

    fn is_advertised(&self, facet: &Facet) -> bool {
        let Some(abilities) = self.abilities else {
            return true;
        };
        let advertised = match facet {
            Facet::SubDevice(_) => abilities.supports_hub(),
            Facet::Unsupported { .. } => true,
            other => other.namespace().is_some_and(|ns| abilities.supports(ns)),
        };
        if !advertised {
            tracing::debug!(
                device_id = %self.device_id,
                family = %facet.family(),
                "Facet not advertised, skipping"
            );
        }
        advertised
    }

    fn bind(&self, channel: ChannelRef, action: WriteAction) -> WriteBinding {
        WriteBinding::new(self.device_id, channel, action)
    }

    /// Channel name hint, `All` for an unnamed channel 0.
    fn channel_name(&self, channel: u32) -> String {
        match self.definition.channel_name(channel) {
            Some(name) => name.to_string(),
            None if channel == 0 => "All".to_string(),
            None => format!("Channel {}", channel),
        }
    }

    fn label(&self, channel: u32, field: &str) -> String {
        match self.definition.channel_name(channel) {
            Some(name) => format!("{} {}", name, field),
            None => field.to_string(),
        }
    }

    fn electricity(&self, entry: &ElectricityEntry) -> Vec<ProjectedPoint> {
        let mut points = Vec::new();
        for (key, raw) in &entry.readings {
            let Some(raw) = raw.as_f64() else {
                tracing::debug!(
                    device_id = %self.device_id,
                    field = %key,
                    "Non-numeric electricity field skipped"
                );
                continue;
            };
            let descriptor = DataPointDescriptor::sensor(
                format!("{}-{}", entry.channel, key),
                self.label(entry.channel, key),
                ValueType::Number,
            )
            .with_meta(facet_meta(Namespace::ControlElectricity, key));
            let value = scale_value(raw, descriptor.exponent);
            points.push(ProjectedPoint::new(descriptor, Some(StateValue::Number(value))));
        }
        points
    }

    fn consumption(&self, entries: &[ConsumptionEntry]) -> Vec<ProjectedPoint> {
        let meta = |field: &str| facet_meta(Namespace::ControlConsumptionX, field);
        let mut points = Vec::new();

        let latest = entries
            .iter()
            .filter_map(|e| {
                NaiveDate::parse_from_str(&e.date, "%Y-%m-%d")
                    .ok()
                    .map(|date| (date, e.time.unwrap_or(0), e.value))
            })
            .max_by_key(|(date, time, _)| (*date, *time));
        if let Some((_, _, value)) = latest {
            points.push(ProjectedPoint::new(
                DataPointDescriptor::sensor(
                    "0-consumptionToday",
                    "Consumption today",
                    ValueType::Number,
                )
                .with_meta(meta("consumptionToday")),
                Some(StateValue::Number(scale_value(value, 0))),
            ));
        }

        let total: f64 = entries.iter().map(|e| e.value).sum();
        points.push(ProjectedPoint::new(
            DataPointDescriptor::sensor(
                "0-consumptionTotal",
                "Consumption total",
                ValueType::Number,
            )
            .with_meta(meta("consumptionTotal")),
            Some(StateValue::Number(scale_value(total, 0))),
        ));
        points
    }

    fn light(&self, entry: &LightEntry) -> Vec<ProjectedPoint> {
        let ch = entry.channel;
        let channel = ChannelRef::Index(ch);
        let meta = |field: &str| facet_meta(Namespace::ControlLight, field);
        let mut points = Vec::new();

        if let Some(rgb) = entry.rgb {
            points.push(ProjectedPoint::new(
                DataPointDescriptor::control(
                    format!("{}-rgb", ch),
                    self.label(ch, "color"),
                    ValueType::Text,
                    self.bind(channel.clone(), WriteAction::LightRgb),
                )
                .with_meta(meta("rgb")),
                Some(StateValue::Text(packed_to_hex(rgb))),
            ));
        }
        if let Some(temperature) = entry.temperature {
            points.push(ProjectedPoint::new(
                DataPointDescriptor::control(
                    format!("{}-temperature", ch),
                    self.label(ch, "color temperature"),
                    ValueType::Number,
                    self.bind(channel.clone(), WriteAction::LightTemperature),
                )
                .with_meta(meta("temperature")),
                Some(StateValue::from(temperature)),
            ));
        }
        if let Some(luminance) = entry.luminance {
            points.push(ProjectedPoint::new(
                DataPointDescriptor::control(
                    format!("{}-luminance", ch),
                    self.label(ch, "brightness"),
                    ValueType::Number,
                    self.bind(channel, WriteAction::LightLuminance),
                )
                .with_meta(meta("luminance")),
                Some(StateValue::from(luminance)),
            ));
        }
        points
    }

    fn thermostat(&self, entry: &ThermostatEntry) -> Vec<ProjectedPoint> {
        let ch = entry.channel;
        let channel = ChannelRef::Index(ch);
        let meta = |field: &str| facet_meta(Namespace::ControlThermostatMode, field);
        let mut points = Vec::new();

        if let Some(onoff) = entry.onoff {
            points.push(ProjectedPoint::new(
                DataPointDescriptor::control(
                    format!("{}-onoff", ch),
                    self.label(ch, "power"),
                    ValueType::Boolean,
                    self.bind(channel.clone(), WriteAction::ThermostatOnOff),
                )
                .with_meta(meta("onoff")),
                Some(StateValue::Boolean(onoff != 0)),
            ));
        }
        if let Some(mode) = entry.mode {
            points.push(ProjectedPoint::new(
                DataPointDescriptor::control(
                    format!("{}-mode", ch),
                    self.label(ch, "mode"),
                    ValueType::Enum,
                    self.bind(channel.clone(), WriteAction::ThermostatMode),
                )
                .with_meta(meta("mode")),
                Some(StateValue::from(mode)),
            ));
        }
        let readings = [
            ("currentTemp", entry.current_temp),
            ("targetTemp", entry.target_temp),
        ];
        for (field, raw) in readings {
            let Some(raw) = raw else { continue };
            let descriptor = DataPointDescriptor::sensor(
                format!("{}-{}", ch, field),
                self.label(ch, field),
                ValueType::Number,
            )
            .with_meta(meta(field));
            let value = scale_value(raw, descriptor.exponent);
            points.push(ProjectedPoint::new(descriptor, Some(StateValue::Number(value))));
        }
        for (field, raw) in entry.setpoints() {
            let descriptor = DataPointDescriptor::control(
                format!("{}-{}", ch, field),
                self.label(ch, field),
                ValueType::Number,
                self.bind(channel.clone(), WriteAction::ThermostatSetpoint(field)),
            )
            .with_meta(meta(field));
            let value = scale_value(raw, descriptor.exponent);
            points.push(ProjectedPoint::new(descriptor, Some(StateValue::Number(value))));
        }
        points
    }

    fn diffuser_light(&self, entry: &DiffuserLightEntry) -> Vec<ProjectedPoint> {
        let ch = entry.channel;
        let channel = ChannelRef::Index(ch);
        let meta = |field: &str| facet_meta(Namespace::ControlDiffuserLight, field);
        let mut points = Vec::new();

        if let Some(onoff) = entry.onoff {
            points.push(ProjectedPoint::new(
                DataPointDescriptor::control(
                    format!("{}-lightOnoff", ch),
                    self.label(ch, "light"),
                    ValueType::Boolean,
                    self.bind(channel.clone(), WriteAction::DiffuserLightOnOff),
                ),
                Some(StateValue::Boolean(onoff != 0)),
            ));
        }
        if let Some(mode) = entry.mode {
            points.push(ProjectedPoint::new(
                DataPointDescriptor::control(
                    format!("{}-lightMode", ch),
                    self.label(ch, "light mode"),
                    ValueType::Enum,
                    self.bind(channel.clone(), WriteAction::DiffuserLightMode),
                )
                .with_meta(meta("mode")),
                Some(StateValue::from(mode)),
            ));
        }
        if let Some(rgb) = entry.rgb {
            points.push(ProjectedPoint::new(
                DataPointDescriptor::control(
                    format!("{}-lightRgb", ch),
                    self.label(ch, "light color"),
                    ValueType::Text,
                    self.bind(channel.clone(), WriteAction::DiffuserLightRgb),
                )
                .with_meta(meta("rgb")),
                Some(StateValue::Text(packed_to_hex(rgb))),
            ));
        }
        if let Some(luminance) = entry.luminance {
            points.push(ProjectedPoint::new(
                DataPointDescriptor::control(
                    format!("{}-lightLuminance", ch),
                    self.label(ch, "light brightness"),
                    ValueType::Number,
                    self.bind(channel, WriteAction::DiffuserLightLuminance),
                )
                .with_meta(meta("luminance")),
                Some(StateValue::from(luminance)),
            ));
        }
        points
    }

    /// Points of one hub sub-device, prefixed by its id.
    fn sub_device(&self, reading: &SubDeviceReading) -> Vec<ProjectedPoint> {
        let sub = reading.id.as_str();
        let channel = ChannelRef::SubDevice(reading.id.clone());
        let id = |field: &str| format!("{}.{}", sub, field);
        let name = |field: &str| format!("{} {}", sub, field);
        let mut points = Vec::new();

        if let Some(online) = reading.online {
            points.push(ProjectedPoint::new(
                DataPointDescriptor::sensor(id("online"), name("online"), ValueType::Boolean)
                    .with_meta(facet_meta(Namespace::HubOnline, "online")),
                Some(StateValue::Boolean(online)),
            ));
        }
        if let Some(onoff) = reading.onoff {
            points.push(ProjectedPoint::new(
                DataPointDescriptor::control(
                    id("onoff"),
                    name("power"),
                    ValueType::Boolean,
                    self.bind(channel.clone(), WriteAction::HubOnOff),
                ),
                Some(StateValue::Boolean(onoff)),
            ));
        }
        if let Some(mode) = reading.mode {
            points.push(ProjectedPoint::new(
                DataPointDescriptor::control(
                    id("mode"),
                    name("mode"),
                    ValueType::Enum,
                    self.bind(channel.clone(), WriteAction::HubMode),
                )
                .with_meta(facet_meta(Namespace::HubMts100Mode, "mode")),
                Some(StateValue::from(mode)),
            ));
        }
        if let Some(raw) = reading.current_temp {
            let descriptor = DataPointDescriptor::sensor(
                id("currentTemp"),
                name("temperature"),
                ValueType::Number,
            )
            .with_meta(facet_meta(Namespace::HubMts100Temperature, "currentTemp"));
            let value = scale_value(raw, descriptor.exponent);
            points.push(ProjectedPoint::new(descriptor, Some(StateValue::Number(value))));
        }
        if let Some(raw) = reading.target_temp {
            let descriptor = DataPointDescriptor::control(
                id("targetTemp"),
                name("target temperature"),
                ValueType::Number,
                self.bind(channel, WriteAction::HubTargetTemp),
            )
            .with_meta(facet_meta(Namespace::HubMts100Temperature, "targetTemp"));
            let value = scale_value(raw, descriptor.exponent);
            points.push(ProjectedPoint::new(descriptor, Some(StateValue::Number(value))));
        }
        if let Some(heating) = reading.heating {
            points.push(ProjectedPoint::new(
                DataPointDescriptor::sensor(id("heating"), name("heating"), ValueType::Boolean)
                    .with_meta(facet_meta(Namespace::HubMts100Temperature, "heating")),
                Some(StateValue::Boolean(heating)),
            ));
        }
        for (field, raw) in [("temperature", reading.temperature), ("humidity", reading.humidity)] {
            let Some(raw) = raw else { continue };
            let descriptor = DataPointDescriptor::sensor(id(field), name(field), ValueType::Number)
                .with_meta(facet_meta(Namespace::HubSensorTempHum, field));
            let value = scale_value(raw, descriptor.exponent);
            points.push(ProjectedPoint::new(descriptor, Some(StateValue::Number(value))));
        }
        if let Some(battery) = reading.battery {
            points.push(ProjectedPoint::new(
                DataPointDescriptor::sensor(id("battery"), name("battery"), ValueType::Number)
                    .with_meta(facet_meta(Namespace::HubBattery, "battery")),
                Some(StateValue::Number(battery)),
            ));
        }
        points
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use merobridge_core::Access;
    use serde_json::json;

    fn project(ns: Namespace, payload: Value) -> Vec<ProjectedPoint> {
        let definition = DeviceDefinition::default();
        Projector::new("dev1", &definition).project_namespace(ns, &payload)
    }

    fn point<'p>(points: &'p [ProjectedPoint], id: &str) -> &'p ProjectedPoint {
        points
            .iter()
            .find(|p| p.descriptor.id == id)
            .unwrap_or_else(|| panic!("no point {}", id))
    }

    #[test]
    fn test_togglex_snapshot() {
        let definition = DeviceDefinition::default();
        let abilities = AbilitySet::from_namespaces(&[Namespace::ControlToggleX]);
        let snapshot = json!({"all": {"digest": {"togglex": [{"channel": 0, "onoff": 1}]}}});
        let points = Projector::new("dev1", &definition)
            .with_abilities(&abilities)
            .project_snapshot(&snapshot);

        assert_eq!(points.len(), 1);
        let switch = &points[0];
        assert_eq!(switch.descriptor.id, "0");
        assert_eq!(switch.descriptor.name, "All");
        assert_eq!(switch.descriptor.value_type, ValueType::Boolean);
        assert_eq!(switch.descriptor.access(), Access::ReadWrite);
        assert_eq!(switch.value, Some(StateValue::Boolean(true)));
    }

    #[test]
    fn test_snapshot_gated_on_abilities() {
        let definition = DeviceDefinition::default();
        let abilities = AbilitySet::from_namespaces(&[Namespace::ControlToggleX]);
        let snapshot = json!({"all": {"digest": {
            "togglex": [{"channel": 0, "onoff": 0}],
            "light": {"channel": 0, "rgb": 255, "luminance": 50}
        }}});
        let points = Projector::new("dev1", &definition)
            .with_abilities(&abilities)
            .project_snapshot(&snapshot);
        assert_eq!(points.len(), 1);

        let ungated = Projector::new("dev1", &definition).project_snapshot(&snapshot);
        assert_eq!(ungated.len(), 3);
    }

    #[test]
    fn test_electricity_scaling() {
        let points = project(
            Namespace::ControlElectricity,
            json!({"electricity": {"channel": 0, "current": 0, "voltage": 2331, "power": 0}}),
        );
        assert_eq!(points.len(), 3);
        let voltage = point(&points, "0-voltage");
        assert_eq!(voltage.value, Some(StateValue::Number(233.1)));
        assert_eq!(voltage.descriptor.unit.as_deref(), Some("V"));
        assert!(!voltage.descriptor.is_writable());
        assert_eq!(point(&points, "0-power").value, Some(StateValue::Number(0.0)));
    }

    #[test]
    fn test_channel_names_from_definition() {
        let definition = DeviceDefinition::default()
            .with_channel("Strip")
            .with_channel("Lamp");
        let points = Projector::new("dev1", &definition).project_namespace(
            Namespace::ControlToggleX,
            &json!({"togglex": [{"channel": 1, "onoff": 0}, {"channel": 3, "onoff": 1}]}),
        );
        assert_eq!(point(&points, "1").descriptor.name, "Lamp");
        assert_eq!(point(&points, "3").descriptor.name, "Channel 3");
    }

    #[test]
    fn test_light_color_as_hex() {
        let points = project(
            Namespace::ControlLight,
            json!({"light": {"channel": 0, "capacity": 5, "rgb": 16744448, "luminance": 80}}),
        );
        assert_eq!(points.len(), 2);
        assert_eq!(point(&points, "0-rgb").value, Some(StateValue::from("#ff8000")));
        assert_eq!(point(&points, "0-luminance").descriptor.max, Some(100.0));
    }

    #[test]
    fn test_thermostat_points() {
        let points = project(
            Namespace::ControlThermostatMode,
            json!({"mode": [{"channel": 0, "onoff": 1, "mode": 2, "currentTemp": 215,
                             "targetTemp": 200, "heatTemp": 230, "ecoTemp": 180}]}),
        );
        assert_eq!(points.len(), 6);
        assert_eq!(point(&points, "0-currentTemp").value, Some(StateValue::Number(21.5)));
        assert!(!point(&points, "0-targetTemp").descriptor.is_writable());
        let heat = point(&points, "0-heatTemp");
        assert!(heat.descriptor.is_writable());
        assert_eq!(heat.value, Some(StateValue::Number(23.0)));
        let mode = &point(&points, "0-mode").descriptor;
        assert_eq!(mode.states.get(&2).map(String::as_str), Some("economy"));
    }

    #[test]
    fn test_shutter_buttons() {
        let points = project(
            Namespace::RollerShutterPosition,
            json!({"position": [{"channel": 0, "position": 40}]}),
        );
        assert_eq!(points.len(), 4);
        let up = point(&points, "0-up");
        assert_eq!(up.descriptor.access(), Access::WriteOnly);
        assert!(up.value.is_none());
        assert_eq!(point(&points, "0-position").value, Some(StateValue::Number(40.0)));
    }

    #[test]
    fn test_hub_sub_devices_prefixed() {
        let definition = DeviceDefinition::default();
        let abilities =
            AbilitySet::from_namespaces(&[Namespace::HubOnline, Namespace::HubMts100Mode]);
        let snapshot = json!({"all": {"digest": {"hub": {"subdevice": [
            {"id": "01005A2C", "status": 1, "onoff": 1,
             "mts100v3": {"mode": {"state": 1}, "room": 215, "currentSet": 200, "heating": 0}},
            {"id": "0200C81A", "status": 1,
             "ms100": {"latestTemperature": 198, "latestHumidity": 512}}
        ]}}}});
        let points = Projector::new("hub1", &definition)
            .with_abilities(&abilities)
            .project_snapshot(&snapshot);

        assert_eq!(point(&points, "01005A2C.currentTemp").value, Some(StateValue::Number(21.5)));
        assert!(point(&points, "01005A2C.targetTemp").descriptor.is_writable());
        assert_eq!(point(&points, "0200C81A.humidity").value, Some(StateValue::Number(51.2)));
        assert_eq!(point(&points, "0200C81A.online").descriptor.role(), "indicator.reachable");
    }

    #[test]
    fn test_consumption_today_and_total() {
        let points = project(
            Namespace::ControlConsumptionX,
            json!({"consumptionx": [
                {"date": "2024-03-02", "time": 1709337600, "value": 80},
                {"date": "2024-03-01", "time": 1709251200, "value": 120}
            ]}),
        );
        assert_eq!(point(&points, "0-consumptionToday").value, Some(StateValue::Number(80.0)));
        assert_eq!(point(&points, "0-consumptionTotal").value, Some(StateValue::Number(200.0)));
    }

    #[test]
    fn test_malformed_entry_skipped() {
        let points = project(
            Namespace::ControlToggleX,
            json!({"togglex": [{"channel": 0, "onoff": 1}, {"onoff": 1}]}),
        );
        assert_eq!(points.len(), 1);
    }

    #[test]
    fn test_snapshot_ip_point() {
        let definition = DeviceDefinition::default();
        let snapshot = json!({"all": {
            "system": {"firmware": {"innerIp": "192.168.1.20"}},
            "digest": {}
        }});
        assert_eq!(inner_ip(&snapshot), Some("192.168.1.20"));
        let points = Projector::new("dev1", &definition).project_snapshot(&snapshot);
        assert_eq!(points.len(), 1);
        assert_eq!(points[0].descriptor.id, "ip");
        assert_eq!(points[0].descriptor.role(), "info.ip");
    }

    #[test]
    fn test_projection_is_idempotent() {
        let payload = json!({"all": {"digest": {
            "togglex": [{"channel": 0, "onoff": 1}, {"channel": 1, "onoff": 0}],
            "thermostat": {"mode": [{"channel": 0, "mode": 1, "heatTemp": 210}]},
            "fan": [{"channel": 0, "speed": 2, "maxSpeed": 4}]
        }}});
        let definition = DeviceDefinition::default();
        let projector = Projector::new("dev1", &definition);
        assert_eq!(projector.project_snapshot(&payload), projector.project_snapshot(&payload));
    }

    #[test]
    fn test_point_ids_unique_across_families() {
        let snapshot = json!({"all": {"digest": {
            "toggle": {"onoff": 1},
            "togglex": [{"channel": 0, "onoff": 1}],
            "garageDoor": [{"channel": 0, "open": 0}],
            "spray": [{"channel": 0, "mode": 1}],
            "light": {"channel": 0, "rgb": 255, "temperature": 50, "luminance": 60},
            "DNDMode": {"mode": 0},
            "thermostat": {"mode": [{"channel": 0, "onoff": 1, "mode": 1, "currentTemp": 210,
                                     "targetTemp": 200, "heatTemp": 220, "coolTemp": 180}]},
            "hub": {"subdevice": [{"id": "01005A2C", "status": 1, "onoff": 1}]},
            "diffuser": {
                "light": [{"channel": 0, "onoff": 1, "mode": 1, "rgb": 65280, "luminance": 30}],
                "spray": [{"channel": 0, "mode": 2}]
            },
            "fan": [{"channel": 0, "speed": 1, "maxSpeed": 3}],
            "filter": [{"channel": 0, "life": 80}],
            "lock": [{"channel": 0, "onoff": 0}]
        }}});
        let definition = DeviceDefinition::default();
        let points = Projector::new("dev1", &definition).project_snapshot(&snapshot);

        let ids: std::collections::BTreeSet<&str> =
            points.iter().map(|p| p.descriptor.id.as_str()).collect();
        assert_eq!(ids.len(), points.len());
        for id in ["0-spray", "0-mode", "0-sprayMode", "0-garageDoor", "dnd", "0-switch"] {
            assert!(ids.contains(id), "missing {}", id);
        }
    }

    #[test]
    fn test_single_channel_toggle() {
        let points = project(Namespace::ControlToggle, json!({"toggle": {"onoff": 1}}));
        assert_eq!(points.len(), 1);
        let switch = point(&points, "0-switch");
        assert_eq!(switch.value, Some(StateValue::Boolean(true)));

        let call = switch.descriptor.build_control(&StateValue::Boolean(false)).unwrap();
        assert_eq!(call.namespace, Namespace::ControlToggle);
        assert_eq!(call.payload, json!({"toggle": {"onoff": 0}}));
    }

    #[test]
    fn test_garage_door() {
        let points = project(
            Namespace::GarageDoorState,
            json!({"state": [{"channel": 0, "open": 1}]}),
        );
        let door = point(&points, "0-garageDoor");
        assert_eq!(door.value, Some(StateValue::Boolean(true)));
        assert_eq!(door.descriptor.role(), "switch.gate");

        let closed = project(
            Namespace::GarageDoorState,
            json!({"state": [{"channel": 0, "open": 0}]}),
        );
        assert_eq!(point(&closed, "0-garageDoor").value, Some(StateValue::Boolean(false)));

        let call = door.descriptor.build_control(&StateValue::Boolean(true)).unwrap();
        assert_eq!(call.namespace, Namespace::GarageDoorState);
        assert_eq!(call.payload["state"]["open"], json!(1));
        assert_eq!(call.payload["state"]["channel"], json!(0));
        assert_eq!(call.payload["state"]["uuid"], json!("dev1"));
    }

    #[test]
    fn test_do_not_disturb() {
        let points = project(Namespace::SystemDndMode, json!({"DNDMode": {"mode": 1}}));
        let dnd = point(&points, "dnd");
        assert_eq!(dnd.value, Some(StateValue::Boolean(true)));
        assert_eq!(dnd.descriptor.access(), Access::ReadWrite);

        let call = dnd.descriptor.build_control(&StateValue::Boolean(false)).unwrap();
        assert_eq!(call.namespace, Namespace::SystemDndMode);
        assert_eq!(call.payload, json!({"DNDMode": {"mode": 0}}));
    }

    #[test]
    fn test_spray_mode() {
        let points = project(
            Namespace::ControlSpray,
            json!({"spray": [{"channel": 0, "mode": 2}]}),
        );
        let spray = point(&points, "0-spray");
        assert_eq!(spray.value, Some(StateValue::Number(2.0)));

        let call = spray.descriptor.build_control(&StateValue::Number(1.0)).unwrap();
        assert_eq!(call.namespace, Namespace::ControlSpray);
        assert_eq!(call.payload, json!({"spray": {"channel": 0, "mode": 1}}));
        assert!(spray.descriptor.build_control(&StateValue::Number(5.0)).is_err());
    }

    #[test]
    fn test_diffuser_light_and_spray() {
        let points = project(
            Namespace::ControlDiffuserLight,
            json!({"light": [
                {"channel": 0, "onoff": 1, "mode": 1, "rgb": 65280, "luminance": 30}
            ]}),
        );
        assert_eq!(points.len(), 4);
        assert_eq!(point(&points, "0-lightOnoff").value, Some(StateValue::Boolean(true)));
        assert_eq!(point(&points, "0-lightRgb").value, Some(StateValue::from("#00ff00")));

        let onoff = &point(&points, "0-lightOnoff").descriptor;
        let call = onoff.build_control(&StateValue::Boolean(false)).unwrap();
        assert_eq!(call.namespace, Namespace::ControlDiffuserLight);
        assert_eq!(call.payload, json!({"light": [{"channel": 0, "onoff": 0}]}));

        let mode = &point(&points, "0-lightMode").descriptor;
        let call = mode.build_control(&StateValue::Number(2.0)).unwrap();
        assert_eq!(call.payload, json!({"light": [{"channel": 0, "mode": 2}]}));

        let rgb = &point(&points, "0-lightRgb").descriptor;
        let call = rgb.build_control(&StateValue::from("#0000ff")).unwrap();
        assert_eq!(call.payload, json!({"light": [{"channel": 0, "rgb": 255}]}));

        let luminance = &point(&points, "0-lightLuminance").descriptor;
        let call = luminance.build_control(&StateValue::Number(75.0)).unwrap();
        assert_eq!(call.payload, json!({"light": [{"channel": 0, "luminance": 75}]}));

        let spray = project(
            Namespace::ControlDiffuserSpray,
            json!({"spray": [{"channel": 0, "mode": 1}]}),
        );
        let spray = point(&spray, "0-sprayMode");
        assert_eq!(spray.descriptor.states.get(&1).map(String::as_str), Some("strong"));
        let call = spray.descriptor.build_control(&StateValue::Number(2.0)).unwrap();
        assert_eq!(call.namespace, Namespace::ControlDiffuserSpray);
        assert_eq!(call.payload, json!({"spray": [{"channel": 0, "mode": 2}]}));
    }

    #[test]
    fn test_filter_life_read_only() {
        let points = project(
            Namespace::ControlFilterMaintenance,
            json!({"filter": [{"channel": 0, "life": 63}]}),
        );
        let filter = point(&points, "0-filterLife");
        assert_eq!(filter.value, Some(StateValue::Number(63.0)));
        assert_eq!(filter.descriptor.unit.as_deref(), Some("%"));
        assert!(!filter.descriptor.is_writable());
        assert!(filter.descriptor.build_control(&StateValue::Number(10.0)).is_err());
    }

    #[test]
    fn test_child_lock() {
        let points = project(
            Namespace::ControlPhysicalLock,
            json!({"lock": [{"channel": 0, "onoff": 1}]}),
        );
        let lock = point(&points, "0-childLock");
        assert_eq!(lock.value, Some(StateValue::Boolean(true)));

        let call = lock.descriptor.build_control(&StateValue::Boolean(false)).unwrap();
        assert_eq!(call.namespace, Namespace::ControlPhysicalLock);
        assert_eq!(call.payload, json!({"lock": [{"channel": 0, "onoff": 0}]}));
    }
}
