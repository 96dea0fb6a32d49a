//! Assessment data model: the per-user record the wizard owns.

use std::collections::{BTreeMap, BTreeSet, HashSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::step::StepId;
use crate::config::AssessmentConfig;

/// Where a migrated assessment was read from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MigrationSource {
    Local,
    Server,
}

impl std::fmt::Display for MigrationSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Local => write!(f, "local"),
            Self::Server => write!(f, "server"),
        }
    }
}

/// Shape the legacy reflections were stored in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LegacyReflectionFormat {
    /// Array of `{valueId, text}` records.
    Records,
    /// Already an id → text map.
    Map,
}

/// Provenance attached to reflections that came out of a legacy migration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReflectionProvenance {
    pub source: MigrationSource,
    pub migrated_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub legacy_format: Option<LegacyReflectionFormat>,
    /// Raw legacy `completionDate`, kept verbatim.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completion_date: Option<String>,
    /// SHA-256 of the legacy payload this record was built from.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub legacy_digest: Option<String>,
}

/// Free-text reflections keyed by value id.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Reflections {
    #[serde(default)]
    pub entries: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provenance: Option<ReflectionProvenance>,
}

impl Reflections {
    pub fn get(&self, id: &str) -> Option<&str> {
        self.entries.get(id).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Bookkeeping carried alongside the assessment data.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssessmentMetadata {
    pub assessment_id: Uuid,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub archived_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub migrated_from: Option<MigrationSource>,
}

impl AssessmentMetadata {
    fn fresh() -> Self {
        let now = Utc::now();
        Self {
            assessment_id: Uuid::new_v4(),
            created_at: now,
            updated_at: now,
            completed_at: None,
            archived_at: None,
            migrated_from: None,
        }
    }
}

/// One user's assessment, in progress or finished.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssessmentState {
    /// Selected value ids in the order they were picked. No duplicates.
    #[serde(default)]
    pub selected_values: Vec<String>,
    /// Ranked value ids, highest priority first.
    #[serde(default)]
    pub prioritized_values: Vec<String>,
    #[serde(default)]
    pub reflections: Reflections,
    #[serde(default)]
    pub current_step: StepId,
    #[serde(default)]
    pub completed_steps: BTreeSet<StepId>,
    pub metadata: AssessmentMetadata,
}

impl Default for AssessmentState {
    fn default() -> Self {
        Self {
            selected_values: Vec::new(),
            prioritized_values: Vec::new(),
            reflections: Reflections::default(),
            current_step: StepId::default(),
            completed_steps: BTreeSet::new(),
            metadata: AssessmentMetadata::fresh(),
        }
    }
}

/// A broken data-model invariant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum InvariantViolation {
    DuplicateSelection { id: String },
    DuplicatePriority { id: String },
    PriorityNotSelected { id: String },
    ReflectionNotPrioritized { id: String },
    /// Selection is marked complete with a count outside `min..=max`.
    SelectionOutOfBounds { selected: usize, min: usize, max: usize },
}

impl std::fmt::Display for InvariantViolation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::DuplicateSelection { id } => write!(f, "{id} is selected more than once"),
            Self::DuplicatePriority { id } => write!(f, "{id} is ranked more than once"),
            Self::PriorityNotSelected { id } => write!(f, "{id} is ranked but not selected"),
            Self::ReflectionNotPrioritized { id } => {
                write!(f, "{id} has a reflection but is not ranked")
            }
            Self::SelectionOutOfBounds { selected, min, max } => write!(
                f,
                "selection is complete with {selected} values, outside {min}..={max}"
            ),
        }
    }
}

impl AssessmentState {
    pub fn is_selected(&self, id: &str) -> bool {
        self.selected_values.iter().any(|v| v == id)
    }

    pub fn is_prioritized(&self, id: &str) -> bool {
        self.prioritized_values.iter().any(|v| v == id)
    }

    /// Drop a value from every collection it appears in.
    ///
    /// Keeps `prioritized ⊆ selected` and `reflections ⊆ prioritized` when a
    /// value is deselected.
    pub(crate) fn remove_value(&mut self, id: &str) {
        self.selected_values.retain(|v| v != id);
        self.prioritized_values.retain(|v| v != id);
        self.reflections.entries.remove(id);
    }

    /// Bring the ranking in line with the selection.
    ///
    /// Still-selected ids keep their relative rank, newly selected ids are
    /// appended in selection order, deselected ids are dropped (together
    /// with their reflections). Returns true if anything changed.
    pub(crate) fn reconcile_priorities(&mut self) -> bool {
        let selected: HashSet<&str> = self.selected_values.iter().map(String::as_str).collect();
        let mut seen = HashSet::new();
        let mut ranked: Vec<String> = self
            .prioritized_values
            .iter()
            .filter(|id| selected.contains(id.as_str()) && seen.insert(id.as_str()))
            .cloned()
            .collect();
        for id in &self.selected_values {
            if seen.insert(id.as_str()) {
                ranked.push(id.clone());
            }
        }

        let changed = ranked != self.prioritized_values;
        self.prioritized_values = ranked;
        self.reflections
            .entries
            .retain(|id, _| self.prioritized_values.contains(id));
        changed
    }

    /// List every data-model invariant the state currently breaks.
    ///
    /// Selection bounds only apply once the selection step is completed.
    pub fn violations(&self, config: &AssessmentConfig) -> Vec<InvariantViolation> {
        let mut out = Vec::new();

        let selected = self.selected_values.len();
        if self.completed_steps.contains(&StepId::Selection)
            && !(config.min_selections..=config.max_selections).contains(&selected)
        {
            out.push(InvariantViolation::SelectionOutOfBounds {
                selected,
                min: config.min_selections,
                max: config.max_selections,
            });
        }

        let mut seen = HashSet::new();
        for id in &self.selected_values {
            if !seen.insert(id.as_str()) {
                out.push(InvariantViolation::DuplicateSelection { id: id.clone() });
            }
        }

        let mut ranked = HashSet::new();
        for id in &self.prioritized_values {
            if !ranked.insert(id.as_str()) {
                out.push(InvariantViolation::DuplicatePriority { id: id.clone() });
            }
            if !seen.contains(id.as_str()) {
                out.push(InvariantViolation::PriorityNotSelected { id: id.clone() });
            }
        }

        for id in self.reflections.entries.keys() {
            if !ranked.contains(id.as_str()) {
                out.push(InvariantViolation::ReflectionNotPrioritized { id: id.clone() });
            }
        }

        out
    }

    /// Whether every data-model invariant holds.
    pub fn is_consistent(&self, config: &AssessmentConfig) -> bool {
        self.violations(config).is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn default_state_is_empty() {
        let state = AssessmentState::default();
        assert!(state.selected_values.is_empty());
        assert!(state.prioritized_values.is_empty());
        assert!(state.reflections.is_empty());
        assert_eq!(state.current_step, StepId::Introduction);
        assert!(state.completed_steps.is_empty());
        assert!(state.metadata.migrated_from.is_none());
        assert!(state.is_consistent(&AssessmentConfig::default()));
    }

    #[test]
    fn serializes_with_camel_case_layout() {
        let mut state = AssessmentState::default();
        state.selected_values = ids(&["honesty", "family"]);
        state.prioritized_values = ids(&["family", "honesty"]);
        state
            .reflections
            .entries
            .insert("family".into(), "Sunday dinners".into());
        state.completed_steps.insert(StepId::Introduction);

        let json = serde_json::to_value(&state).unwrap();
        assert_eq!(json["selectedValues"][0], "honesty");
        assert_eq!(json["prioritizedValues"][0], "family");
        assert_eq!(json["reflections"]["entries"]["family"], "Sunday dinners");
        assert_eq!(json["currentStep"], "introduction");
        assert_eq!(json["completedSteps"][0], "introduction");
        assert!(json["metadata"]["assessmentId"].is_string());

        let parsed: AssessmentState = serde_json::from_value(json).unwrap();
        assert_eq!(parsed, state);
    }

    #[test]
    fn reconcile_keeps_rank_and_appends_new() {
        let mut state = AssessmentState::default();
        state.selected_values = ids(&["a", "b", "c", "d"]);
        state.prioritized_values = ids(&["c", "x", "a"]);
        state.reflections.entries.insert("x".into(), "gone".into());
        state.reflections.entries.insert("c".into(), "kept".into());

        assert!(state.reconcile_priorities());
        assert_eq!(state.prioritized_values, ids(&["c", "a", "b", "d"]));
        assert_eq!(state.reflections.get("c"), Some("kept"));
        assert!(state.reflections.get("x").is_none());
        assert!(!state.reconcile_priorities(), "second pass is a no-op");
    }

    #[test]
    fn remove_value_cascades() {
        let mut state = AssessmentState::default();
        state.selected_values = ids(&["a", "b"]);
        state.prioritized_values = ids(&["b", "a"]);
        state.reflections.entries.insert("b".into(), "text".into());

        state.remove_value("b");
        assert_eq!(state.selected_values, ids(&["a"]));
        assert_eq!(state.prioritized_values, ids(&["a"]));
        assert!(state.reflections.is_empty());
    }

    #[test]
    fn violations_are_reported() {
        let mut state = AssessmentState::default();
        state.selected_values = ids(&["a", "a"]);
        state.prioritized_values = ids(&["b"]);
        state.reflections.entries.insert("c".into(), "orphan".into());

        let config = AssessmentConfig::default();
        let violations = state.violations(&config);
        assert!(violations.contains(&InvariantViolation::DuplicateSelection { id: "a".into() }));
        assert!(violations.contains(&InvariantViolation::PriorityNotSelected { id: "b".into() }));
        assert!(
            violations.contains(&InvariantViolation::ReflectionNotPrioritized { id: "c".into() })
        );
        assert!(!state.is_consistent(&config));

        let json = serde_json::to_value(&violations[0]).unwrap();
        assert_eq!(json["kind"], "duplicate_selection");
        assert_eq!(json["id"], "a");
    }

    #[test]
    fn completed_selection_must_stay_in_bounds() {
        let config = AssessmentConfig {
            min_selections: 2,
            max_selections: 3,
            ..AssessmentConfig::default()
        };
        let mut state = AssessmentState::default();
        state.selected_values = ids(&["a"]);
        // Below the minimum is fine while the selection step is still open.
        assert!(state.is_consistent(&config));

        state.completed_steps.insert(StepId::Selection);
        assert_eq!(
            state.violations(&config),
            [InvariantViolation::SelectionOutOfBounds {
                selected: 1,
                min: 2,
                max: 3
            }]
        );

        state.selected_values = ids(&["a", "b", "c", "d"]);
        assert!(!state.is_consistent(&config));

        state.selected_values = ids(&["a", "b"]);
        assert!(state.is_consistent(&config));
    }
}
