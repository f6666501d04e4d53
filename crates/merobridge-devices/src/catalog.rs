//! Capability catalog.
//!
//! Static tables for the vendor namespace identifiers and the per-field
//! scaling, unit, role and bounds metadata. The projector and the push
//! handlers both consult this module so unit logic lives in one place.

use once_cell::sync::Lazy;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};

/// Vendor namespace identifiers understood by the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Namespace {
    SystemAll,
    SystemAbility,
    SystemOnline,
    SystemReport,
    SystemDndMode,
    ControlUpgrade,
    ControlToggle,
    ControlToggleX,
    ControlElectricity,
    ControlConsumptionX,
    ControlSpray,
    ControlLight,
    ControlThermostatMode,
    ControlDiffuserLight,
    ControlDiffuserSpray,
    ControlFan,
    ControlFilterMaintenance,
    ControlPhysicalLock,
    GarageDoorState,
    RollerShutterPosition,
    RollerShutterState,
    DigestHub,
    HubToggleX,
    HubOnline,
    HubMts100Mode,
    HubMts100Temperature,
    HubSensorTempHum,
    HubBattery,
}

const ALL_NAMESPACES: [Namespace; 28] = [
    Namespace::SystemAll,
    Namespace::SystemAbility,
    Namespace::SystemOnline,
    Namespace::SystemReport,
    Namespace::SystemDndMode,
    Namespace::ControlUpgrade,
    Namespace::ControlToggle,
    Namespace::ControlToggleX,
    Namespace::ControlElectricity,
    Namespace::ControlConsumptionX,
    Namespace::ControlSpray,
    Namespace::ControlLight,
    Namespace::ControlThermostatMode,
    Namespace::ControlDiffuserLight,
    Namespace::ControlDiffuserSpray,
    Namespace::ControlFan,
    Namespace::ControlFilterMaintenance,
    Namespace::ControlPhysicalLock,
    Namespace::GarageDoorState,
    Namespace::RollerShutterPosition,
    Namespace::RollerShutterState,
    Namespace::DigestHub,
    Namespace::HubToggleX,
    Namespace::HubOnline,
    Namespace::HubMts100Mode,
    Namespace::HubMts100Temperature,
    Namespace::HubSensorTempHum,
    Namespace::HubBattery,
];

static BY_NAME: Lazy<HashMap<&'static str, Namespace>> =
    Lazy::new(|| ALL_NAMESPACES.iter().map(|ns| (ns.as_str(), *ns)).collect());

impl Namespace {
    /// Namespaces whose state is not part of the snapshot digest and is
    /// queried once after connecting.
    pub const FETCH_ON_CONNECT: [Namespace; 5] = [
        Namespace::ControlElectricity,
        Namespace::ControlConsumptionX,
        Namespace::RollerShutterPosition,
        Namespace::RollerShutterState,
        Namespace::HubBattery,
    ];

    pub fn all() -> &'static [Namespace] {
        &ALL_NAMESPACES
    }

    /// Wire identifier, e.g. `Appliance.Control.ToggleX`.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SystemAll => "Appliance.System.All",
            Self::SystemAbility => "Appliance.System.Ability",
            Self::SystemOnline => "Appliance.System.Online",
            Self::SystemReport => "Appliance.System.Report",
            Self::SystemDndMode => "Appliance.System.DNDMode",
            Self::ControlUpgrade => "Appliance.Control.Upgrade",
            Self::ControlToggle => "Appliance.Control.Toggle",
            Self::ControlToggleX => "Appliance.Control.ToggleX",
            Self::ControlElectricity => "Appliance.Control.Electricity",
            Self::ControlConsumptionX => "Appliance.Control.ConsumptionX",
            Self::ControlSpray => "Appliance.Control.Spray",
            Self::ControlLight => "Appliance.Control.Light",
            Self::ControlThermostatMode => "Appliance.Control.Thermostat.Mode",
            Self::ControlDiffuserLight => "Appliance.Control.Diffuser.Light",
            Self::ControlDiffuserSpray => "Appliance.Control.Diffuser.Spray",
            Self::ControlFan => "Appliance.Control.Fan",
            Self::ControlFilterMaintenance => "Appliance.Control.FilterMaintenance",
            Self::ControlPhysicalLock => "Appliance.Control.PhysicalLock",
            Self::GarageDoorState => "Appliance.GarageDoor.State",
            Self::RollerShutterPosition => "Appliance.RollerShutter.Position",
            Self::RollerShutterState => "Appliance.RollerShutter.State",
            Self::DigestHub => "Appliance.Digest.Hub",
            Self::HubToggleX => "Appliance.Hub.ToggleX",
            Self::HubOnline => "Appliance.Hub.Online",
            Self::HubMts100Mode => "Appliance.Hub.Mts100.Mode",
            Self::HubMts100Temperature => "Appliance.Hub.Mts100.Temperature",
            Self::HubSensorTempHum => "Appliance.Hub.Sensor.TempHum",
            Self::HubBattery => "Appliance.Hub.Battery",
        }
    }

    /// Look up a wire identifier. Unknown identifiers return `None`.
    pub fn parse(name: &str) -> Option<Self> {
        BY_NAME.get(name).copied()
    }

    /// Key under which the namespace's data appears in a payload.
    pub fn payload_key(&self) -> &'static str {
        match self {
            Self::SystemAll => "all",
            Self::SystemAbility => "ability",
            Self::SystemOnline | Self::HubOnline => "online",
            Self::SystemReport => "report",
            Self::SystemDndMode => "DNDMode",
            Self::ControlUpgrade => "upgrade",
            Self::ControlToggle => "toggle",
            Self::ControlToggleX | Self::HubToggleX => "togglex",
            Self::ControlElectricity => "electricity",
            Self::ControlConsumptionX => "consumptionx",
            Self::ControlSpray | Self::ControlDiffuserSpray => "spray",
            Self::ControlLight | Self::ControlDiffuserLight => "light",
            Self::ControlThermostatMode | Self::HubMts100Mode => "mode",
            Self::ControlFan => "fan",
            Self::ControlFilterMaintenance => "filter",
            Self::ControlPhysicalLock => "lock",
            Self::GarageDoorState | Self::RollerShutterState => "state",
            Self::RollerShutterPosition => "position",
            Self::DigestHub => "hub",
            Self::HubMts100Temperature => "temperature",
            Self::HubSensorTempHum => "tempHum",
            Self::HubBattery => "battery",
        }
    }

    /// Namespaces accepted on push without any state change.
    pub fn is_ignored(&self) -> bool {
        matches!(
            self,
            Self::ControlUpgrade | Self::SystemReport | Self::SystemAll | Self::SystemAbility
        )
    }

    pub fn is_hub(&self) -> bool {
        matches!(
            self,
            Self::DigestHub
                | Self::HubToggleX
                | Self::HubOnline
                | Self::HubMts100Mode
                | Self::HubMts100Temperature
                | Self::HubSensorTempHum
                | Self::HubBattery
        )
    }
}

impl std::fmt::Display for Namespace {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Scaling and presentation metadata for one facet field.
#[derive(Debug, Clone, PartialEq)]
pub struct FacetMeta {
    /// Power-of-ten exponent applied to raw wire values
    pub exponent: i32,
    pub unit: Option<&'static str>,
    pub role: Option<&'static str>,
    pub min: Option<f64>,
    pub max: Option<f64>,
    /// Enumerated states (ordinal -> label)
    pub states: &'static [(i64, &'static str)],
}

impl FacetMeta {
    fn new(exponent: i32, unit: Option<&'static str>, role: &'static str) -> Self {
        Self {
            exponent,
            unit,
            role: Some(role),
            min: None,
            max: None,
            states: &[],
        }
    }

    fn bounded(mut self, min: f64, max: f64) -> Self {
        self.min = Some(min);
        self.max = Some(max);
        self
    }

    fn enumerated(mut self, states: &'static [(i64, &'static str)]) -> Self {
        self.states = states;
        self
    }

    pub fn states_map(&self) -> BTreeMap<i64, String> {
        self.states
            .iter()
            .map(|(k, v)| (*k, (*v).to_string()))
            .collect()
    }
}

const SPRAY_MODES: &[(i64, &str)] = &[(0, "off"), (1, "continuous"), (2, "intermittent")];
const THERMOSTAT_MODES: &[(i64, &str)] =
    &[(0, "heat"), (1, "cool"), (2, "economy"), (3, "auto"), (4, "manual")];
const HUB_THERMOSTAT_MODES: &[(i64, &str)] =
    &[(0, "custom"), (1, "comfort"), (2, "economy"), (3, "schedule")];
const SHUTTER_STATES: &[(i64, &str)] = &[(0, "idle"), (1, "opening"), (2, "closing")];
const DIFFUSER_LIGHT_MODES: &[(i64, &str)] = &[(0, "rainbow"), (1, "color"), (2, "temperature")];
const DIFFUSER_SPRAY_MODES: &[(i64, &str)] = &[(0, "light"), (1, "strong"), (2, "off")];

const CELSIUS: Option<&str> = Some("°C");
const PERCENT: Option<&str> = Some("%");

static CATALOG: Lazy<HashMap<Namespace, HashMap<&'static str, FacetMeta>>> = Lazy::new(|| {
    use Namespace::*;
    let entries: Vec<((Namespace, &'static str), FacetMeta)> = vec![
        ((ControlElectricity, "power"), FacetMeta::new(-3, Some("W"), "value.power")),
        ((ControlElectricity, "current"), FacetMeta::new(-3, Some("A"), "value.current")),
        ((ControlElectricity, "voltage"), FacetMeta::new(-1, Some("V"), "value.voltage")),
        (
            (ControlConsumptionX, "consumptionToday"),
            FacetMeta::new(0, Some("Wh"), "value.power.consumption"),
        ),
        (
            (ControlConsumptionX, "consumptionTotal"),
            FacetMeta::new(0, Some("Wh"), "value.power.consumption"),
        ),
        ((GarageDoorState, "open"), FacetMeta::new(0, None, "switch.gate")),
        ((ControlSpray, "mode"), FacetMeta::new(0, None, "level.mode").enumerated(SPRAY_MODES)),
        ((ControlLight, "rgb"), FacetMeta::new(0, None, "level.color.rgb")),
        (
            (ControlLight, "temperature"),
            FacetMeta::new(0, PERCENT, "level.color.temperature").bounded(1.0, 100.0),
        ),
        (
            (ControlLight, "luminance"),
            FacetMeta::new(0, PERCENT, "level.dimmer").bounded(0.0, 100.0),
        ),
        ((SystemDndMode, "mode"), FacetMeta::new(0, None, "switch")),
        ((ControlThermostatMode, "onoff"), FacetMeta::new(0, None, "switch.power")),
        (
            (ControlThermostatMode, "mode"),
            FacetMeta::new(0, None, "level.mode.thermostat").enumerated(THERMOSTAT_MODES),
        ),
        ((ControlThermostatMode, "currentTemp"), FacetMeta::new(-1, CELSIUS, "value.temperature")),
        ((ControlThermostatMode, "targetTemp"), FacetMeta::new(-1, CELSIUS, "value.temperature")),
        (
            (ControlThermostatMode, "heatTemp"),
            FacetMeta::new(-1, CELSIUS, "level.temperature").bounded(5.0, 35.0),
        ),
        (
            (ControlThermostatMode, "coolTemp"),
            FacetMeta::new(-1, CELSIUS, "level.temperature").bounded(5.0, 35.0),
        ),
        (
            (ControlThermostatMode, "ecoTemp"),
            FacetMeta::new(-1, CELSIUS, "level.temperature").bounded(5.0, 35.0),
        ),
        (
            (ControlThermostatMode, "manualTemp"),
            FacetMeta::new(-1, CELSIUS, "level.temperature").bounded(5.0, 35.0),
        ),
        (
            (RollerShutterPosition, "position"),
            FacetMeta::new(0, PERCENT, "level.blind").bounded(0.0, 100.0),
        ),
        (
            (RollerShutterState, "state"),
            FacetMeta::new(0, None, "value.blind").enumerated(SHUTTER_STATES),
        ),
        ((HubOnline, "online"), FacetMeta::new(0, None, "indicator.reachable")),
        (
            (HubMts100Mode, "mode"),
            FacetMeta::new(0, None, "level.mode.thermostat").enumerated(HUB_THERMOSTAT_MODES),
        ),
        ((HubMts100Temperature, "currentTemp"), FacetMeta::new(-1, CELSIUS, "value.temperature")),
        (
            (HubMts100Temperature, "targetTemp"),
            FacetMeta::new(-1, CELSIUS, "level.temperature").bounded(5.0, 35.0),
        ),
        ((HubMts100Temperature, "heating"), FacetMeta::new(0, None, "indicator.working")),
        ((HubSensorTempHum, "temperature"), FacetMeta::new(-1, CELSIUS, "value.temperature")),
        ((HubSensorTempHum, "humidity"), FacetMeta::new(-1, PERCENT, "value.humidity")),
        (
            (HubBattery, "battery"),
            FacetMeta::new(0, PERCENT, "value.battery").bounded(0.0, 100.0),
        ),
        ((ControlDiffuserLight, "rgb"), FacetMeta::new(0, None, "level.color.rgb")),
        (
            (ControlDiffuserLight, "mode"),
            FacetMeta::new(0, None, "level.mode").enumerated(DIFFUSER_LIGHT_MODES),
        ),
        (
            (ControlDiffuserLight, "luminance"),
            FacetMeta::new(0, PERCENT, "level.dimmer").bounded(0.0, 100.0),
        ),
        (
            (ControlDiffuserSpray, "mode"),
            FacetMeta::new(0, None, "level.mode").enumerated(DIFFUSER_SPRAY_MODES),
        ),
        ((ControlFan, "speed"), FacetMeta::new(0, None, "level.speed")),
        (
            (ControlFilterMaintenance, "life"),
            FacetMeta::new(0, PERCENT, "value.health").bounded(0.0, 100.0),
        ),
        ((ControlPhysicalLock, "onoff"), FacetMeta::new(0, None, "switch.lock")),
    ];
    let mut catalog: HashMap<Namespace, HashMap<&'static str, FacetMeta>> = HashMap::new();
    for ((namespace, field), meta) in entries {
        catalog.entry(namespace).or_default().insert(field, meta);
    }
    catalog
});

/// Metadata for `field` of `namespace`, if catalogued.
///
/// Unknown fields get no metadata; callers fall back to exponent 0 and an
/// inferred role.
pub fn facet_meta(namespace: Namespace, field: &str) -> Option<&'static FacetMeta> {
    CATALOG.get(&namespace)?.get(field)
}

/// Scale exponent for a field, 0 when not catalogued.
pub fn exponent_for(namespace: Namespace, field: &str) -> i32 {
    facet_meta(namespace, field).map(|m| m.exponent).unwrap_or(0)
}

/// Abilities a device advertised after connecting.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AbilitySet {
    ability: BTreeMap<String, Value>,
}

impl AbilitySet {
    /// Build from an `Appliance.System.Ability` response (`{"ability": {...}}`).
    ///
    /// A bare ability map is accepted as well.
    pub fn from_response(response: &Value) -> Option<Self> {
        let map = response
            .get("ability")
            .and_then(Value::as_object)
            .or_else(|| response.as_object())?;
        Some(Self {
            ability: map.iter().map(|(k, v)| (k.clone(), v.clone())).collect(),
        })
    }

    pub fn from_namespaces(namespaces: &[Namespace]) -> Self {
        Self {
            ability: namespaces
                .iter()
                .map(|ns| (ns.as_str().to_string(), Value::Object(Default::default())))
                .collect(),
        }
    }

    pub fn supports(&self, namespace: Namespace) -> bool {
        self.ability.contains_key(namespace.as_str())
    }

    /// Whether any hub sub-device namespace is advertised.
    pub fn supports_hub(&self) -> bool {
        Namespace::all()
            .iter()
            .any(|ns| ns.is_hub() && self.supports(*ns))
    }

    pub fn len(&self) -> usize {
        self.ability.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ability.is_empty()
    }
}
