//! ==============================================================================
//! model.rs - dashboard records
//! ==============================================================================
//!
//! purpose:
//!     typed versions of the loosely-typed mappings the server pushes.
//!     every record can be built from a partial mapping (a "patch") and can
//!     absorb later patches, which is what upsert-by-id needs.
//!
//! relationships:
//!     - used by: collection.rs (keys, merge), controller.rs, app.rs
//!     - wire shape: bridge.rs (records travel inside event payloads)
//!
//! notes:
//!     fields that only matter to the view (editing, show_chart, pending_*)
//!     live on the record too, the same way the server-side payloads carry
//!     `pending_refresh` or `is_initialized`.
//!
//! ==============================================================================

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt::Display;
use std::hash::Hash;

use crate::error::{DashboardError, Result};

/// a partial record: only the keys present are applied
pub type Patch = Map<String, Value>;

/// turn a json value into a patch
pub fn to_patch(kind: &'static str, value: Value) -> Result<Patch> {
    match value {
        Value::Object(map) => Ok(map),
        _ => Err(DashboardError::NotAnObject { kind }),
    }
}

// ==============================================================================
// record trait
// ==============================================================================

pub trait Record: Serialize + DeserializeOwned + Clone {
    /// human readable name for errors and logs
    const KIND: &'static str;
    /// mapping field holding the identity
    const KEY_FIELD: &'static str;

    type Key: Clone + Eq + Hash + Display + Serialize + DeserializeOwned;

    fn key(&self) -> Self::Key;

    /// read the identity out of a patch
    fn patch_key(patch: &Patch) -> Result<Self::Key> {
        match patch.get(Self::KEY_FIELD) {
            None | Some(Value::Null) => Err(DashboardError::MissingKey {
                kind: Self::KIND,
                field: Self::KEY_FIELD,
            }),
            Some(v) => serde_json::from_value(v.clone()).map_err(|source| DashboardError::Decode {
                kind: Self::KIND,
                source,
            }),
        }
    }

    /// build a fresh record; absent fields take their defaults
    fn from_patch(patch: &Patch) -> Result<Self> {
        Self::patch_key(patch)?;
        serde_json::from_value(Value::Object(patch.clone())).map_err(|source| DashboardError::Decode {
            kind: Self::KIND,
            source,
        })
    }

    /// overlay a patch on this record
    ///
    /// the record is left untouched when the merged mapping does not decode.
    fn merge(&mut self, patch: &Patch) -> Result<()> {
        let decode = |source| DashboardError::Decode { kind: Self::KIND, source };
        let mut current = match serde_json::to_value(&*self).map_err(decode)? {
            Value::Object(map) => map,
            _ => return Err(DashboardError::NotAnObject { kind: Self::KIND }),
        };
        for (k, v) in patch {
            current.insert(k.clone(), v.clone());
        }
        *self = serde_json::from_value(Value::Object(current)).map_err(decode)?;
        Ok(())
    }
}

// ==============================================================================
// sensor
// ==============================================================================

/// one day of averaged history shipped with the initial snapshot
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SensorHistory {
    /// unix seconds of the first sample
    pub from: i64,
    pub to: i64,
    /// seconds between samples
    pub step: i64,
    pub data: Vec<Option<f64>>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Sensor {
    pub id: Option<i64>,
    pub sensor_code: String,
    pub description: String,
    pub unit: String,
    pub type_name: Option<String>,

    pub value: Option<f64>,
    /// unix seconds of the last reading
    pub read_ts: Option<i64>,
    /// seconds between readings
    pub step: Option<i64>,

    pub min_possible_value: Option<f64>,
    pub max_possible_value: Option<f64>,
    pub min_warning_value: Option<f64>,
    pub max_warning_value: Option<f64>,

    pub enable_warnings: bool,
    pub observable_measurements: Option<i64>,
    pub observable_alarming_measurements: Option<i64>,
    pub warning_wait_minutes: Option<i64>,

    pub has_warning: bool,
    pub has_notification: bool,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub history: Option<SensorHistory>,

    // view state
    pub show_gauge: bool,
    pub show_chart: bool,
    pub editing: bool,
    pub pending_min_warning_input: bool,
    pub pending_max_warning_input: bool,
}

/// the four values that shape a sensor's value axis
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Thresholds {
    pub min_possible: Option<f64>,
    pub min_warning: Option<f64>,
    pub max_warning: Option<f64>,
    pub max_possible: Option<f64>,
}

impl Sensor {
    pub fn thresholds(&self) -> Thresholds {
        Thresholds {
            min_possible: self.min_possible_value,
            min_warning: self.min_warning_value,
            max_warning: self.max_warning_value,
            max_possible: self.max_possible_value,
        }
    }

    /// (read_ts, value) when both are known
    pub fn reading(&self) -> Option<(i64, f64)> {
        Some((self.read_ts?, self.value?))
    }
}

impl Record for Sensor {
    const KIND: &'static str = "sensor";
    const KEY_FIELD: &'static str = "sensor_code";
    type Key = String;

    fn key(&self) -> String {
        self.sensor_code.clone()
    }
}

// ==============================================================================
// relay
// ==============================================================================

/// relay switch state, numbered the way the server encodes it
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum RelayState {
    #[default]
    Off,
    PendingOff,
    On,
    PendingOn,
    Error,
}

impl From<RelayState> for u8 {
    fn from(state: RelayState) -> u8 {
        match state {
            RelayState::Off => 0,
            RelayState::PendingOff => 1,
            RelayState::On => 2,
            RelayState::PendingOn => 3,
            RelayState::Error => 4,
        }
    }
}

impl TryFrom<u8> for RelayState {
    type Error = String;

    fn try_from(v: u8) -> std::result::Result<Self, String> {
        Ok(match v {
            0 => RelayState::Off,
            1 => RelayState::PendingOff,
            2 => RelayState::On,
            3 => RelayState::PendingOn,
            4 => RelayState::Error,
            other => return Err(format!("invalid relay state {}", other)),
        })
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Relay {
    pub id: i64,
    pub description: String,
    pub switch_on_text: String,
    pub switch_off_text: String,
    pub arduino_pin: Option<i64>,
    pub state: RelayState,
    pub changed_ts: Option<i64>,
    /// false until the board reported the real state once
    pub is_initialized: bool,
    pub pending_refresh: bool,
    /// unlocked for switching
    pub editing: bool,
}

impl Record for Relay {
    const KIND: &'static str = "relay";
    const KEY_FIELD: &'static str = "id";
    type Key = i64;

    fn key(&self) -> i64 {
        self.id
    }
}

// ==============================================================================
// notification
// ==============================================================================

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Notification {
    pub id: i64,
    pub text: String,
    pub subject: Option<String>,
    pub created_ts: i64,
    /// most recent notification in the list
    pub is_first: bool,
}

impl Record for Notification {
    const KIND: &'static str = "notification";
    const KEY_FIELD: &'static str = "id";
    type Key = i64;

    fn key(&self) -> i64 {
        self.id
    }
}

// ==============================================================================
// contact
// ==============================================================================

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Contact {
    pub id: i64,
    pub name: String,
    pub phone: Option<String>,
    pub email: Option<String>,
    pub enable_sms_warnings: bool,
    pub enable_email_warnings: bool,
    pub enable_phone_call_warnings: bool,
    pub last_phone_call_ts: Option<i64>,
    pub next_available_phone_call: Option<i64>,
    pub call_wait_minutes: Option<i64>,
    /// an edit was sent and the server has not confirmed it yet
    pub pending: bool,
    pub editing: bool,
}

impl Record for Contact {
    const KIND: &'static str = "contact";
    const KEY_FIELD: &'static str = "id";
    type Key = i64;

    fn key(&self) -> i64 {
        self.id
    }
}

// ==============================================================================
// call
// ==============================================================================

/// a phone call in progress; the id is the number being dialled
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Call {
    pub id: String,
}

impl Record for Call {
    const KIND: &'static str = "call";
    const KEY_FIELD: &'static str = "id";
    type Key = String;

    fn key(&self) -> String {
        self.id.clone()
    }
}
