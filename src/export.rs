//! Finished-assessment snapshots and the report exporters that consume them.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::assessment::model::AssessmentState;
use crate::assessment::step::StepId;
use crate::catalog::ValueCatalog;
use crate::error::ExportError;

/// One ranked value with its catalog details resolved.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RankedValue {
    /// 1-based rank.
    pub rank: usize,
    pub id: String,
    pub name: String,
    pub description: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reflection: Option<String>,
}

/// Immutable view of a finished assessment, handed to exporters.
#[derive(Debug, Clone, Serialize)]
pub struct ExportSnapshot {
    pub assessment_id: Uuid,
    pub selected_values: Vec<String>,
    pub prioritized_values: Vec<String>,
    pub reflections: BTreeMap<String, String>,
    pub ranked: Vec<RankedValue>,
    /// How many of `ranked` are the user's top values.
    pub top_values: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

impl ExportSnapshot {
    /// Build a snapshot. Only finished assessments can be exported.
    pub fn from_state(
        state: &AssessmentState,
        catalog: &ValueCatalog,
        top_values: usize,
    ) -> Result<Self, ExportError> {
        if state.current_step != StepId::Results {
            return Err(ExportError::NotFinished {
                current: state.current_step,
            });
        }

        let ranked = state
            .prioritized_values
            .iter()
            .enumerate()
            .map(|(i, id)| {
                // Ids carried over from old data may be missing from the catalog.
                let (name, description) = match catalog.get(id) {
                    Some(v) => (v.name.clone(), v.description.clone()),
                    None => (id.clone(), String::new()),
                };
                RankedValue {
                    rank: i + 1,
                    id: id.clone(),
                    name,
                    description,
                    reflection: state.reflections.get(id).map(str::to_string),
                }
            })
            .collect::<Vec<_>>();

        Ok(Self {
            assessment_id: state.metadata.assessment_id,
            selected_values: state.selected_values.clone(),
            prioritized_values: state.prioritized_values.clone(),
            reflections: state.reflections.entries.clone(),
            top_values: top_values.min(ranked.len()),
            ranked,
            completed_at: state.metadata.completed_at,
        })
    }

    /// The top-ranked values.
    pub fn top(&self) -> &[RankedValue] {
        &self.ranked[..self.top_values]
    }

    /// Ranked values below the top.
    pub fn rest(&self) -> &[RankedValue] {
        &self.ranked[self.top_values..]
    }
}

/// Consumer of a finished assessment (PDF renderer, share link, ...).
pub trait ReportExporter {
    type Output;

    fn export(&self, snapshot: &ExportSnapshot) -> Result<Self::Output, ExportError>;
}

/// Renders a shareable markdown summary.
#[derive(Debug, Clone, Default)]
pub struct MarkdownExporter;

impl ReportExporter for MarkdownExporter {
    type Output = String;

    fn export(&self, snapshot: &ExportSnapshot) -> Result<String, ExportError> {
        let mut parts = vec!["# My Values".to_string()];

        if let Some(at) = snapshot.completed_at {
            parts.push(format!("_Completed {}_", at.format("%Y-%m-%d")));
        }

        parts.push(String::new());
        parts.push(format!("## Top {}", snapshot.top().len()));
        for value in snapshot.top() {
            if value.description.is_empty() {
                parts.push(format!("{}. **{}**", value.rank, value.name));
            } else {
                parts.push(format!(
                    "{}. **{}**: {}",
                    value.rank, value.name, value.description
                ));
            }
            if let Some(ref reflection) = value.reflection {
                for line in reflection.lines() {
                    parts.push(format!("   > {line}"));
                }
            }
        }

        if !snapshot.rest().is_empty() {
            parts.push(String::new());
            parts.push("## Also important".to_string());
            for value in snapshot.rest() {
                parts.push(format!("{}. {}", value.rank, value.name));
            }
        }

        Ok(parts.join("\n"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::ValueDescriptor;

    fn catalog() -> ValueCatalog {
        ValueCatalog::new(vec![
            ValueDescriptor::new("honesty", "Honesty", "Telling the truth"),
            ValueDescriptor::new("family", "Family", ""),
            ValueDescriptor::new("growth", "Growth", "Getting better"),
            ValueDescriptor::new("humor", "Humor", "Laughing"),
        ])
        .unwrap()
    }

    fn finished_state() -> AssessmentState {
        let mut state = AssessmentState::default();
        state.selected_values = vec!["honesty".into(), "family".into(), "growth".into(), "humor".into()];
        state.prioritized_values = vec!["family".into(), "growth".into(), "honesty".into(), "humor".into()];
        state
            .reflections
            .entries
            .insert("family".into(), "Dinner together\nevery Sunday".into());
        state.current_step = StepId::Results;
        state
    }

    #[test]
    fn unfinished_assessment_cannot_be_exported() {
        let mut state = finished_state();
        state.current_step = StepId::Reflection;
        let err = ExportSnapshot::from_state(&state, &catalog(), 3).unwrap_err();
        assert!(matches!(
            err,
            ExportError::NotFinished {
                current: StepId::Reflection
            }
        ));
    }

    #[test]
    fn snapshot_resolves_catalog_entries() {
        let snapshot = ExportSnapshot::from_state(&finished_state(), &catalog(), 3).unwrap();
        assert_eq!(snapshot.ranked.len(), 4);
        assert_eq!(snapshot.top().len(), 3);
        assert_eq!(snapshot.rest().len(), 1);
        assert_eq!(snapshot.ranked[0].name, "Family");
        assert_eq!(snapshot.ranked[0].rank, 1);
        assert!(snapshot.ranked[0].reflection.is_some());
        assert!(snapshot.ranked[1].reflection.is_none());
    }

    #[test]
    fn unknown_ids_fall_back_to_the_id() {
        let mut state = finished_state();
        state.prioritized_values.push("retired-value".into());
        let snapshot = ExportSnapshot::from_state(&state, &catalog(), 3).unwrap();
        assert_eq!(snapshot.ranked[4].name, "retired-value");
    }

    #[test]
    fn top_is_capped_by_ranking_length() {
        let mut state = finished_state();
        state.prioritized_values.truncate(2);
        let snapshot = ExportSnapshot::from_state(&state, &catalog(), 3).unwrap();
        assert_eq!(snapshot.top().len(), 2);
        assert!(snapshot.rest().is_empty());
    }

    #[test]
    fn markdown_report_lists_top_values_and_reflections() {
        let snapshot = ExportSnapshot::from_state(&finished_state(), &catalog(), 3).unwrap();
        let report = MarkdownExporter.export(&snapshot).unwrap();

        assert!(report.starts_with("# My Values"));
        assert!(report.contains("## Top 3"));
        assert!(report.contains("1. **Family**"));
        assert!(report.contains("2. **Growth**: Getting better"));
        assert!(report.contains("   > Dinner together"));
        assert!(report.contains("   > every Sunday"));
        assert!(report.contains("## Also important"));
        assert!(report.contains("4. Humor"));
    }
}
