//! Payload decoding.
//!
//! Raw snapshot and push payloads are decoded into one [`Facet`] variant per
//! facet family. Entries that do not match their family's shape become
//! [`Facet::Unsupported`] and are skipped by the projector with a log line,
//! so one bad entry never aborts a whole projection.

use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;
use std::collections::BTreeMap;

use crate::catalog::Namespace;

/// Normalize a payload that may be a single object or an array of objects.
pub fn one_or_many(value: &Value) -> Vec<&Value> {
    match value {
        Value::Array(items) => items.iter().collect(),
        Value::Null => Vec::new(),
        other => vec![other],
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ToggleEntry {
    pub onoff: i64,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ToggleXEntry {
    pub channel: u32,
    pub onoff: i64,
}

/// Metering reading; every field besides `channel` is a raw measurement.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ElectricityEntry {
    pub channel: u32,
    #[serde(flatten)]
    pub readings: BTreeMap<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ConsumptionEntry {
    /// `YYYY-MM-DD`
    pub date: String,
    #[serde(default)]
    pub time: Option<i64>,
    /// Consumption in Wh
    pub value: f64,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct GarageDoorEntry {
    #[serde(default)]
    pub channel: u32,
    pub open: i64,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct SprayEntry {
    #[serde(default)]
    pub channel: u32,
    pub mode: i64,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct LightEntry {
    #[serde(default)]
    pub channel: u32,
    #[serde(default)]
    pub capacity: Option<i64>,
    #[serde(default)]
    pub rgb: Option<u32>,
    #[serde(default)]
    pub temperature: Option<i64>,
    #[serde(default)]
    pub luminance: Option<i64>,
}

impl LightEntry {
    /// `true` when the entry carries none of the adjustable fields.
    pub fn is_empty(&self) -> bool {
        self.rgb.is_none() && self.temperature.is_none() && self.luminance.is_none()
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct DndEntry {
    pub mode: i64,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ThermostatEntry {
    #[serde(default)]
    pub channel: u32,
    #[serde(default)]
    pub onoff: Option<i64>,
    #[serde(default)]
    pub mode: Option<i64>,
    #[serde(default)]
    pub current_temp: Option<f64>,
    #[serde(default)]
    pub target_temp: Option<f64>,
    #[serde(default)]
    pub heat_temp: Option<f64>,
    #[serde(default)]
    pub cool_temp: Option<f64>,
    #[serde(default)]
    pub eco_temp: Option<f64>,
    #[serde(default)]
    pub manual_temp: Option<f64>,
}

impl ThermostatEntry {
    /// Adjustable setpoints present in this entry, keyed by wire field name.
    pub fn setpoints(&self) -> Vec<(&'static str, f64)> {
        [
            ("heatTemp", self.heat_temp),
            ("coolTemp", self.cool_temp),
            ("ecoTemp", self.eco_temp),
            ("manualTemp", self.manual_temp),
        ]
        .into_iter()
        .filter_map(|(k, v)| v.map(|v| (k, v)))
        .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ShutterPositionEntry {
    #[serde(default)]
    pub channel: u32,
    pub position: i64,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ShutterStateEntry {
    #[serde(default)]
    pub channel: u32,
    pub state: i64,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct DiffuserLightEntry {
    #[serde(default)]
    pub channel: u32,
    #[serde(default)]
    pub onoff: Option<i64>,
    #[serde(default)]
    pub mode: Option<i64>,
    #[serde(default)]
    pub rgb: Option<u32>,
    #[serde(default)]
    pub luminance: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct DiffuserSprayEntry {
    #[serde(default)]
    pub channel: u32,
    pub mode: i64,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FanEntry {
    #[serde(default)]
    pub channel: u32,
    pub speed: i64,
    #[serde(default)]
    pub max_speed: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct FilterEntry {
    #[serde(default)]
    pub channel: u32,
    pub life: i64,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct LockEntry {
    #[serde(default)]
    pub channel: u32,
    pub onoff: i64,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct OnlineEntry {
    pub status: i64,
}

/// State of one hub sub-device, normalized from digest or push entries.
///
/// Only the fields present in the source entry are set.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SubDeviceReading {
    pub id: String,
    pub online: Option<bool>,
    pub onoff: Option<bool>,
    pub mode: Option<i64>,
    /// Raw room temperature (tenths of a degree)
    pub current_temp: Option<f64>,
    /// Raw setpoint (tenths of a degree)
    pub target_temp: Option<f64>,
    pub heating: Option<bool>,
    pub temperature: Option<f64>,
    pub humidity: Option<f64>,
    pub battery: Option<f64>,
}

const THERMOSTAT_VALVE_KEYS: [&str; 3] = ["mts100v3", "mts100", "mts150"];

impl SubDeviceReading {
    /// Decode a `hub.subdevice[]` digest entry.
    pub fn from_digest(entry: &Value) -> Option<Self> {
        let id = id_of(entry)?;
        let mut reading = Self {
            id,
            online: entry.get("status").and_then(Value::as_i64).map(|s| s == 1),
            onoff: entry.get("onoff").and_then(Value::as_i64).map(|v| v != 0),
            ..Default::default()
        };

        if let Some(valve) = THERMOSTAT_VALVE_KEYS.iter().find_map(|k| entry.get(*k)) {
            reading.mode = match valve.get("mode") {
                Some(Value::Object(m)) => m.get("state").and_then(Value::as_i64),
                Some(v) => v.as_i64(),
                None => None,
            };
            reading.current_temp = valve.get("room").and_then(Value::as_f64);
            reading.target_temp = valve.get("currentSet").and_then(Value::as_f64);
            reading.heating = valve.get("heating").and_then(Value::as_i64).map(|v| v != 0);
        }

        if let Some(sensor) = entry.get("ms100") {
            reading.temperature = sensor.get("latestTemperature").and_then(Value::as_f64);
            reading.humidity = sensor.get("latestHumidity").and_then(Value::as_f64);
        }

        Some(reading)
    }

    /// Decode one entry of an `Appliance.Hub.*` push.
    pub fn from_push(namespace: Namespace, entry: &Value) -> Option<Self> {
        let id = id_of(entry)?;
        let int = |key: &str| entry.get(key).and_then(Value::as_i64);
        let num = |key: &str| entry.get(key).and_then(Value::as_f64);
        let mut reading = Self {
            id,
            ..Default::default()
        };
        match namespace {
            Namespace::HubToggleX => reading.onoff = Some(int("onoff")? != 0),
            Namespace::HubOnline => reading.online = Some(int("status")? == 1),
            Namespace::HubMts100Mode => reading.mode = Some(int("state")?),
            Namespace::HubMts100Temperature => {
                reading.current_temp = num("room");
                reading.target_temp = num("currentSet");
                reading.heating = int("heating").map(|v| v != 0);
            }
            Namespace::HubSensorTempHum => {
                reading.temperature = num("latestTemperature");
                reading.humidity = num("latestHumidity");
            }
            Namespace::HubBattery => reading.battery = Some(num("value")?),
            _ => return None,
        }
        if reading.is_empty() {
            return None;
        }
        Some(reading)
    }

    /// `true` when no field besides the id is set.
    pub fn is_empty(&self) -> bool {
        self.online.is_none()
            && self.onoff.is_none()
            && self.mode.is_none()
            && self.current_temp.is_none()
            && self.target_temp.is_none()
            && self.heating.is_none()
            && self.temperature.is_none()
            && self.humidity.is_none()
            && self.battery.is_none()
    }
}

fn id_of(entry: &Value) -> Option<String> {
    match entry.get("id")? {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// One decoded facet of a device.
#[derive(Debug, Clone, PartialEq)]
pub enum Facet {
    Toggle(ToggleEntry),
    ToggleX(ToggleXEntry),
    Electricity(ElectricityEntry),
    Consumption(Vec<ConsumptionEntry>),
    GarageDoor(GarageDoorEntry),
    Spray(SprayEntry),
    Light(LightEntry),
    DoNotDisturb(DndEntry),
    Thermostat(ThermostatEntry),
    ShutterPosition(ShutterPositionEntry),
    ShutterState(ShutterStateEntry),
    DiffuserLight(DiffuserLightEntry),
    DiffuserSpray(DiffuserSprayEntry),
    Fan(FanEntry),
    Filter(FilterEntry),
    PhysicalLock(LockEntry),
    SubDevice(SubDeviceReading),
    Online(OnlineEntry),
    /// Entry that did not match its family's shape
    Unsupported {
        family: &'static str,
        reason: String,
        raw: Value,
    },
}

/// Digest keys in projection order.
const DIGEST_KEYS: [&str; 12] = [
    "toggle",
    "togglex",
    "garageDoor",
    "spray",
    "light",
    "DNDMode",
    "thermostat",
    "hub",
    "diffuser",
    "fan",
    "filter",
    "lock",
];

impl Facet {
    /// Short family name used in logs.
    pub fn family(&self) -> &'static str {
        match self {
            Self::Toggle(_) => "toggle",
            Self::ToggleX(_) => "togglex",
            Self::Electricity(_) => "electricity",
            Self::Consumption(_) => "consumption",
            Self::GarageDoor(_) => "garageDoor",
            Self::Spray(_) => "spray",
            Self::Light(_) => "light",
            Self::DoNotDisturb(_) => "DNDMode",
            Self::Thermostat(_) => "thermostat",
            Self::ShutterPosition(_) => "shutterPosition",
            Self::ShutterState(_) => "shutterState",
            Self::DiffuserLight(_) => "diffuserLight",
            Self::DiffuserSpray(_) => "diffuserSpray",
            Self::Fan(_) => "fan",
            Self::Filter(_) => "filter",
            Self::PhysicalLock(_) => "lock",
            Self::SubDevice(_) => "hub",
            Self::Online(_) => "online",
            Self::Unsupported { family, .. } => family,
        }
    }

    /// Namespace backing this facet, used for ability gating.
    ///
    /// Sub-devices return `None`; they are gated on any hub ability.
    pub fn namespace(&self) -> Option<Namespace> {
        let ns = match self {
            Self::Toggle(_) => Namespace::ControlToggle,
            Self::ToggleX(_) => Namespace::ControlToggleX,
            Self::Electricity(_) => Namespace::ControlElectricity,
            Self::Consumption(_) => Namespace::ControlConsumptionX,
            Self::GarageDoor(_) => Namespace::GarageDoorState,
            Self::Spray(_) => Namespace::ControlSpray,
            Self::Light(_) => Namespace::ControlLight,
            Self::DoNotDisturb(_) => Namespace::SystemDndMode,
            Self::Thermostat(_) => Namespace::ControlThermostatMode,
            Self::ShutterPosition(_) => Namespace::RollerShutterPosition,
            Self::ShutterState(_) => Namespace::RollerShutterState,
            Self::DiffuserLight(_) => Namespace::ControlDiffuserLight,
            Self::DiffuserSpray(_) => Namespace::ControlDiffuserSpray,
            Self::Fan(_) => Namespace::ControlFan,
            Self::Filter(_) => Namespace::ControlFilterMaintenance,
            Self::PhysicalLock(_) => Namespace::ControlPhysicalLock,
            Self::Online(_) => Namespace::SystemOnline,
            Self::SubDevice(_) | Self::Unsupported { .. } => return None,
        };
        Some(ns)
    }

    pub fn is_supported(&self) -> bool {
        !matches!(self, Self::Unsupported { .. })
    }

    /// Decode the `all.digest` block of a snapshot.
    ///
    /// Unknown digest keys (timers, triggers) are ignored.
    pub fn from_digest(digest: &Value) -> Vec<Facet> {
        let mut facets = Vec::new();
        for key in DIGEST_KEYS {
            let Some(data) = digest.get(key) else {
                continue;
            };
            match key {
                "toggle" => facets.extend(decode(key, data, Facet::Toggle)),
                "togglex" => facets.extend(decode(key, data, Facet::ToggleX)),
                "garageDoor" => facets.extend(decode(key, data, Facet::GarageDoor)),
                "spray" => facets.extend(decode(key, data, Facet::Spray)),
                "light" => facets.extend(decode_light(data)),
                "DNDMode" => facets.extend(decode(key, data, Facet::DoNotDisturb)),
                "thermostat" => match data.get("mode") {
                    Some(modes) => facets.extend(decode(key, modes, Facet::Thermostat)),
                    None => facets.push(unsupported(key, "missing mode block", data)),
                },
                "hub" => match data.get("subdevice") {
                    Some(subs) => {
                        for entry in one_or_many(subs) {
                            match SubDeviceReading::from_digest(entry) {
                                Some(reading) => facets.push(Facet::SubDevice(reading)),
                                None => {
                                    facets.push(unsupported(key, "missing sub-device id", entry))
                                }
                            }
                        }
                    }
                    None => facets.push(unsupported(key, "missing subdevice list", data)),
                },
                "diffuser" => {
                    if let Some(light) = data.get("light") {
                        facets.extend(decode("diffuserLight", light, Facet::DiffuserLight));
                    }
                    if let Some(spray) = data.get("spray") {
                        facets.extend(decode("diffuserSpray", spray, Facet::DiffuserSpray));
                    }
                }
                "fan" => facets.extend(decode(key, data, Facet::Fan)),
                "filter" => facets.extend(decode(key, data, Facet::Filter)),
                "lock" => facets.extend(decode(key, data, Facet::PhysicalLock)),
                _ => {}
            }
        }
        facets
    }

    /// Decode a pushed or fetched payload of `namespace`.
    pub fn from_push(namespace: Namespace, payload: &Value) -> Vec<Facet> {
        let key = namespace.payload_key();
        let Some(data) = payload.get(key) else {
            return vec![unsupported(key, "missing payload key", payload)];
        };

        match namespace {
            Namespace::ControlToggle => decode(key, data, Facet::Toggle),
            Namespace::ControlToggleX => decode(key, data, Facet::ToggleX),
            Namespace::ControlElectricity => decode(key, data, Facet::Electricity),
            Namespace::ControlConsumptionX => decode_consumption(data),
            Namespace::GarageDoorState => decode(key, data, Facet::GarageDoor),
            Namespace::ControlSpray => decode(key, data, Facet::Spray),
            Namespace::ControlLight => decode_light(data),
            Namespace::SystemDndMode => decode(key, data, Facet::DoNotDisturb),
            Namespace::ControlThermostatMode => decode(key, data, Facet::Thermostat),
            Namespace::RollerShutterPosition => decode(key, data, Facet::ShutterPosition),
            Namespace::RollerShutterState => decode(key, data, Facet::ShutterState),
            Namespace::ControlDiffuserLight => decode(key, data, Facet::DiffuserLight),
            Namespace::ControlDiffuserSpray => decode(key, data, Facet::DiffuserSpray),
            Namespace::ControlFan => decode(key, data, Facet::Fan),
            Namespace::ControlFilterMaintenance => decode(key, data, Facet::Filter),
            Namespace::ControlPhysicalLock => decode(key, data, Facet::PhysicalLock),
            Namespace::SystemOnline => decode(key, data, Facet::Online),
            Namespace::DigestHub => data
                .get("subdevice")
                .map(|subs| {
                    one_or_many(subs)
                        .into_iter()
                        .map(|entry| match SubDeviceReading::from_digest(entry) {
                            Some(reading) => Facet::SubDevice(reading),
                            None => unsupported(key, "missing sub-device id", entry),
                        })
                        .collect()
                })
                .unwrap_or_else(|| vec![unsupported(key, "missing subdevice list", data)]),
            ns if ns.is_hub() => one_or_many(data)
                .into_iter()
                .map(|entry| match SubDeviceReading::from_push(ns, entry) {
                    Some(reading) => Facet::SubDevice(reading),
                    None => unsupported(key, "unexpected sub-device entry", entry),
                })
                .collect(),
            _ => vec![unsupported(key, "no facet family for namespace", payload)],
        }
    }
}

fn unsupported(family: &'static str, reason: &str, raw: &Value) -> Facet {
    Facet::Unsupported {
        family,
        reason: reason.to_string(),
        raw: raw.clone(),
    }
}

fn decode<T, F>(family: &'static str, data: &Value, wrap: F) -> Vec<Facet>
where
    T: DeserializeOwned,
    F: Fn(T) -> Facet,
{
    one_or_many(data)
        .into_iter()
        .map(|entry| match T::deserialize(entry) {
            Ok(parsed) => wrap(parsed),
            Err(e) => unsupported(family, &e.to_string(), entry),
        })
        .collect()
}

fn decode_light(data: &Value) -> Vec<Facet> {
    one_or_many(data)
        .into_iter()
        .map(|entry| match LightEntry::deserialize(entry) {
            Ok(light) if light.is_empty() => {
                unsupported("light", "no rgb, temperature or luminance field", entry)
            }
            Ok(light) => Facet::Light(light),
            Err(e) => unsupported("light", &e.to_string(), entry),
        })
        .collect()
}

fn decode_consumption(data: &Value) -> Vec<Facet> {
    let mut facets = Vec::new();
    let mut entries = Vec::new();
    for entry in one_or_many(data) {
        match ConsumptionEntry::deserialize(entry) {
            Ok(parsed) => entries.push(parsed),
            Err(e) => facets.push(unsupported("consumption", &e.to_string(), entry)),
        }
    }
    if !entries.is_empty() {
        facets.insert(0, Facet::Consumption(entries));
    }
    facets
}
