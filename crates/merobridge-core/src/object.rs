//! Object definitions the engine registers in the host store.
//!
//! Every data point is described by an [`ObjectDefinition`] of kind
//! [`ObjectKind::State`]; devices get a [`ObjectKind::Device`] object that
//! carries the raw device definition as `native`.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Kind of object stored in the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ObjectKind {
    Device,
    Channel,
    State,
}

/// Value shape of a data point.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValueType {
    Boolean,
    Number,
    /// Number restricted to an enumerated set of ordinals
    Enum,
    #[serde(rename = "string")]
    Text,
}

impl std::fmt::Display for ValueType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Boolean => write!(f, "boolean"),
            Self::Number => write!(f, "number"),
            Self::Enum => write!(f, "enum"),
            Self::Text => write!(f, "string"),
        }
    }
}

/// Read/write semantics of a data point.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Access {
    ReadOnly,
    WriteOnly,
    ReadWrite,
}

impl Access {
    pub fn is_readable(self) -> bool {
        matches!(self, Self::ReadOnly | Self::ReadWrite)
    }

    pub fn is_writable(self) -> bool {
        matches!(self, Self::WriteOnly | Self::ReadWrite)
    }
}

/// Definition of an object in the host store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObjectDefinition {
    /// Object kind
    pub kind: ObjectKind,
    /// Human-readable name
    pub name: String,
    /// Value type (states only)
    pub value_type: Option<ValueType>,
    /// Read/write semantics (states only)
    pub access: Access,
    /// Semantic role used by UIs
    pub role: String,
    /// Unit of measurement
    pub unit: Option<String>,
    /// Minimum value (numeric states)
    pub min: Option<f64>,
    /// Maximum value (numeric states)
    pub max: Option<f64>,
    /// Enumerated states (ordinal -> label)
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub states: BTreeMap<i64, String>,
    /// Raw source data attached to the object
    #[serde(default)]
    pub native: serde_json::Value,
}

impl ObjectDefinition {
    /// Create a device object.
    pub fn device(name: impl Into<String>, native: serde_json::Value) -> Self {
        Self {
            kind: ObjectKind::Device,
            name: name.into(),
            value_type: None,
            access: Access::ReadOnly,
            role: String::new(),
            unit: None,
            min: None,
            max: None,
            states: BTreeMap::new(),
            native,
        }
    }

    /// Create a state object.
    pub fn state(
        name: impl Into<String>,
        value_type: ValueType,
        access: Access,
        role: impl Into<String>,
    ) -> Self {
        Self {
            kind: ObjectKind::State,
            name: name.into(),
            value_type: Some(value_type),
            access,
            role: role.into(),
            unit: None,
            min: None,
            max: None,
            states: BTreeMap::new(),
            native: serde_json::Value::Null,
        }
    }

    pub fn with_unit(mut self, unit: impl Into<String>) -> Self {
        self.unit = Some(unit.into());
        self
    }

    pub fn with_bounds(mut self, min: Option<f64>, max: Option<f64>) -> Self {
        self.min = min;
        self.max = max;
        self
    }

    pub fn with_states(mut self, states: BTreeMap<i64, String>) -> Self {
        self.states = states;
        self
    }

    pub fn is_state(&self) -> bool {
        self.kind == ObjectKind::State
    }
}
