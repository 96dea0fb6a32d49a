//! Value catalog: the fixed list of values a user can pick from.

use std::collections::HashMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::CatalogError;

/// A catalog entry for one selectable value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValueDescriptor {
    /// Stable identifier, e.g. "honesty".
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
}

impl ValueDescriptor {
    pub fn new(id: &str, name: &str, description: &str) -> Self {
        Self {
            id: id.to_string(),
            name: name.to_string(),
            description: description.to_string(),
        }
    }
}

/// Ordered, read-only catalog with unique ids.
#[derive(Debug, Clone)]
pub struct ValueCatalog {
    values: Vec<ValueDescriptor>,
    index: HashMap<String, usize>,
}

impl ValueCatalog {
    /// Build a catalog, rejecting empty or duplicate ids.
    pub fn new(values: Vec<ValueDescriptor>) -> Result<Self, CatalogError> {
        let mut index = HashMap::with_capacity(values.len());
        for (i, value) in values.iter().enumerate() {
            if value.id.trim().is_empty() {
                return Err(CatalogError::EmptyId { index: i });
            }
            if index.insert(value.id.clone(), i).is_some() {
                return Err(CatalogError::DuplicateId(value.id.clone()));
            }
        }
        Ok(Self { values, index })
    }

    /// Parse a JSON array of `{id, name, description}` objects.
    pub fn from_json_str(json: &str) -> Result<Self, CatalogError> {
        let values: Vec<ValueDescriptor> =
            serde_json::from_str(json).map_err(|e| CatalogError::Parse(e.to_string()))?;
        Self::new(values)
    }

    /// Load a catalog from a JSON file.
    pub fn from_path(path: &Path) -> Result<Self, CatalogError> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json_str(&json)
    }

    /// The catalog shipped with the crate.
    pub fn builtin() -> Self {
        let values = BUILTIN_VALUES
            .iter()
            .map(|(id, name, description)| ValueDescriptor::new(id, name, description))
            .collect();
        // Ids below are unique literals.
        Self::new(values).unwrap_or_else(|_| Self {
            values: Vec::new(),
            index: HashMap::new(),
        })
    }

    pub fn get(&self, id: &str) -> Option<&ValueDescriptor> {
        self.index.get(id).map(|&i| &self.values[i])
    }

    pub fn contains(&self, id: &str) -> bool {
        self.index.contains_key(id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &ValueDescriptor> {
        self.values.iter()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

static BUILTIN_VALUES: &[(&str, &str, &str)] = &[
    ("achievement", "Achievement", "Accomplishing meaningful goals"),
    ("adventure", "Adventure", "Seeking new and exciting experiences"),
    ("authenticity", "Authenticity", "Being true to yourself"),
    ("balance", "Balance", "Keeping a healthy mix of work, rest and play"),
    ("community", "Community", "Belonging to and supporting a group"),
    ("compassion", "Compassion", "Caring about the suffering of others"),
    ("courage", "Courage", "Acting despite fear or uncertainty"),
    ("creativity", "Creativity", "Making new things and new ideas"),
    ("curiosity", "Curiosity", "Wanting to learn and explore"),
    ("family", "Family", "Caring for the people closest to you"),
    ("freedom", "Freedom", "Choosing your own path"),
    ("friendship", "Friendship", "Close, supportive relationships"),
    ("growth", "Growth", "Becoming a better version of yourself"),
    ("health", "Health", "Looking after body and mind"),
    ("honesty", "Honesty", "Telling the truth and acting openly"),
    ("humor", "Humor", "Finding and sharing joy and laughter"),
    ("independence", "Independence", "Relying on yourself"),
    ("justice", "Justice", "Fairness and equal treatment"),
    ("kindness", "Kindness", "Being generous and considerate"),
    ("knowledge", "Knowledge", "Understanding how things work"),
    ("leadership", "Leadership", "Guiding and inspiring others"),
    ("loyalty", "Loyalty", "Standing by people and commitments"),
    ("peace", "Peace", "Calm within yourself and with others"),
    ("respect", "Respect", "Treating people with dignity"),
    ("responsibility", "Responsibility", "Owning your choices and duties"),
    ("security", "Security", "Stability and safety"),
    ("service", "Service", "Helping others and contributing"),
    ("spirituality", "Spirituality", "Connection to something larger"),
    ("tradition", "Tradition", "Honoring customs and heritage"),
    ("wisdom", "Wisdom", "Sound judgement from experience"),
];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_catalog_is_populated() {
        let catalog = ValueCatalog::builtin();
        assert_eq!(catalog.len(), BUILTIN_VALUES.len());
        assert_eq!(catalog.get("honesty").unwrap().name, "Honesty");
        assert!(!catalog.contains("not-a-value"));
    }

    #[test]
    fn preserves_order() {
        let catalog = ValueCatalog::new(vec![
            ValueDescriptor::new("z", "Zeal", ""),
            ValueDescriptor::new("a", "Awe", ""),
        ])
        .unwrap();
        let ids: Vec<&str> = catalog.iter().map(|v| v.id.as_str()).collect();
        assert_eq!(ids, ["z", "a"]);
    }

    #[test]
    fn rejects_duplicate_ids() {
        let err = ValueCatalog::new(vec![
            ValueDescriptor::new("a", "A", ""),
            ValueDescriptor::new("a", "Again", ""),
        ])
        .unwrap_err();
        assert!(matches!(err, CatalogError::DuplicateId(id) if id == "a"));
    }

    #[test]
    fn rejects_empty_ids() {
        let err = ValueCatalog::new(vec![ValueDescriptor::new("  ", "Blank", "")]).unwrap_err();
        assert!(matches!(err, CatalogError::EmptyId { index: 0 }));
    }

    #[test]
    fn parses_json_without_descriptions() {
        let catalog =
            ValueCatalog::from_json_str(r#"[{"id": "grit", "name": "Grit"}]"#).unwrap();
        assert_eq!(catalog.get("grit").unwrap().description, "");
    }

    #[test]
    fn loads_from_file() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("values.json");
        std::fs::write(&path, r#"[{"id": "hope", "name": "Hope", "description": "x"}]"#).unwrap();
        let catalog = ValueCatalog::from_path(&path).unwrap();
        assert_eq!(catalog.len(), 1);
    }

    #[test]
    fn malformed_json_is_a_parse_error() {
        assert!(matches!(
            ValueCatalog::from_json_str("{not json"),
            Err(CatalogError::Parse(_))
        ));
    }
}
