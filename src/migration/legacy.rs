//! The legacy flat-key layout and its decoding.
//!
//! Older clients stored each piece of the assessment under its own key.
//! Values may be JSON, JSON encoded inside a string, or bare strings.

use std::collections::BTreeMap;

use serde::Deserialize;
use serde_json::Value;

use crate::assessment::model::LegacyReflectionFormat;
use crate::error::MigrationError;

/// Legacy key names.
pub mod keys {
    pub const SELECTED_VALUES: &str = "selectedValues";
    pub const PRIORITIZED_VALUES: &str = "prioritizedValues";
    pub const REFLECTIONS: &str = "reflections";
    pub const COMPLETION_DATE: &str = "completionDate";

    /// Every key the legacy layout used, in read order.
    pub const ALL: [&str; 4] = [
        SELECTED_VALUES,
        PRIORITIZED_VALUES,
        REFLECTIONS,
        COMPLETION_DATE,
    ];

    /// Where the raw legacy blob is copied before the keys are deleted.
    pub const BACKUP: &str = "legacyBackup";
}

/// One `{valueId, text}` record from the array form of legacy reflections.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct LegacyReflectionRecord {
    #[serde(rename = "valueId")]
    pub value_id: String,
    #[serde(default)]
    pub text: String,
}

/// Legacy reflections, in either of the shapes old clients wrote.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum LegacyReflections {
    Records(Vec<LegacyReflectionRecord>),
    Map(BTreeMap<String, String>),
}

impl LegacyReflections {
    pub fn format(&self) -> LegacyReflectionFormat {
        match self {
            Self::Records(_) => LegacyReflectionFormat::Records,
            Self::Map(_) => LegacyReflectionFormat::Map,
        }
    }

    /// Convert to an id → text map, text untouched.
    ///
    /// Two records for the same value with different text cannot both be
    /// kept, so that is an error rather than a silent overwrite.
    pub fn into_entries(self) -> Result<BTreeMap<String, String>, MigrationError> {
        match self {
            Self::Map(map) => Ok(map),
            Self::Records(records) => {
                let mut map = BTreeMap::new();
                for record in records {
                    if let Some(existing) = map.get(&record.value_id) {
                        if *existing != record.text {
                            return Err(MigrationError::Transform {
                                key: keys::REFLECTIONS.to_string(),
                                reason: format!(
                                    "conflicting reflections for value {}",
                                    record.value_id
                                ),
                            });
                        }
                        continue;
                    }
                    map.insert(record.value_id, record.text);
                }
                Ok(map)
            }
        }
    }
}

/// The raw, non-empty legacy values found in one store.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LegacyPayload {
    raw: BTreeMap<String, Value>,
}

impl LegacyPayload {
    /// Keep `value` only if it holds something.
    pub fn insert(&mut self, key: &str, value: Value) {
        if is_present(&value) {
            self.raw.insert(key.to_string(), value);
        }
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.raw.get(key)
    }

    pub fn is_empty(&self) -> bool {
        self.raw.is_empty()
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.raw.keys().map(String::as_str)
    }

    /// All raw values as one JSON object, for backups.
    pub fn to_json(&self) -> Value {
        Value::Object(self.raw.clone().into_iter().collect())
    }

    /// Hex SHA-256 of the canonical JSON form. Keys are sorted, so equal
    /// payloads always hash the same.
    pub fn digest(&self) -> String {
        use sha2::Digest as _;
        use std::fmt::Write as _;

        let mut hasher = sha2::Sha256::new();
        hasher.update(self.to_json().to_string().as_bytes());
        let digest = hasher.finalize();
        let mut out = String::with_capacity(64);
        for b in digest {
            let _ = write!(&mut out, "{b:02x}");
        }
        out
    }
}

/// Whether a raw legacy value counts as present.
///
/// Null, blank strings and empty arrays/objects (including those encoded
/// inside a string) are treated as absent.
pub fn is_present(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::String(s) => {
            let trimmed = s.trim();
            if trimmed.is_empty() {
                return false;
            }
            match serde_json::from_str::<Value>(trimmed) {
                Ok(inner @ (Value::Null | Value::Array(_) | Value::Object(_))) => is_present(&inner),
                _ => true,
            }
        }
        Value::Array(items) => !items.is_empty(),
        Value::Object(map) => !map.is_empty(),
        Value::Bool(_) | Value::Number(_) => true,
    }
}

/// Legacy data decoded field by field. Absent keys stay `None`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LegacyData {
    pub selected_values: Option<Vec<String>>,
    pub prioritized_values: Option<Vec<String>>,
    pub reflections: Option<LegacyReflections>,
    pub completion_date: Option<String>,
}

impl LegacyData {
    pub fn decode(payload: &LegacyPayload) -> Result<Self, MigrationError> {
        Ok(Self {
            selected_values: decode_field(payload, keys::SELECTED_VALUES)?,
            prioritized_values: decode_field(payload, keys::PRIORITIZED_VALUES)?,
            reflections: decode_field(payload, keys::REFLECTIONS)?,
            completion_date: payload.get(keys::COMPLETION_DATE).map(|v| match v {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            }),
        })
    }
}

fn decode_field<T: serde::de::DeserializeOwned>(
    payload: &LegacyPayload,
    key: &str,
) -> Result<Option<T>, MigrationError> {
    let Some(value) = payload.get(key) else {
        return Ok(None);
    };
    let value = match value {
        Value::String(s) => serde_json::from_str(s).map_err(|e| MigrationError::Transform {
            key: key.to_string(),
            reason: format!("string value is not JSON: {e}"),
        })?,
        other => other.clone(),
    };
    serde_json::from_value(value)
        .map(Some)
        .map_err(|e| MigrationError::Transform {
            key: key.to_string(),
            reason: e.to_string(),
        })
}
