//! Assessment step machine: which screen of the wizard the user is on.

use serde::{Deserialize, Serialize};

/// The steps of the assessment.
///
/// Progresses linearly: Introduction → Selection → Prioritization →
/// Reflection → Results. Backward moves are allowed from any step but the
/// first.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum StepId {
    #[default]
    Introduction,
    Selection,
    Prioritization,
    Reflection,
    Results,
}

impl StepId {
    /// All steps in order.
    pub const ALL: [StepId; 5] = [
        StepId::Introduction,
        StepId::Selection,
        StepId::Prioritization,
        StepId::Reflection,
        StepId::Results,
    ];

    /// Whether this step is terminal (assessment is done).
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Results)
    }

    /// Get the next step in the linear progression, if any.
    pub fn next(&self) -> Option<StepId> {
        use StepId::*;
        match self {
            Introduction => Some(Selection),
            Selection => Some(Prioritization),
            Prioritization => Some(Reflection),
            Reflection => Some(Results),
            Results => None,
        }
    }

    /// Get the previous step, if any.
    pub fn previous(&self) -> Option<StepId> {
        use StepId::*;
        match self {
            Introduction => None,
            Selection => Some(Introduction),
            Prioritization => Some(Selection),
            Reflection => Some(Prioritization),
            Results => Some(Reflection),
        }
    }

    /// Zero-based position, for progress indicators.
    pub fn index(&self) -> usize {
        *self as usize
    }
}

impl std::fmt::Display for StepId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Introduction => "introduction",
            Self::Selection => "selection",
            Self::Prioritization => "prioritization",
            Self::Reflection => "reflection",
            Self::Results => "results",
        };
        write!(f, "{s}")
    }
}

/// Why the wizard refuses to move off the current step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AdvanceBlocker {
    /// Fewer values selected than the configured minimum.
    BelowMinimum { selected: usize, min: usize },
    /// More values selected than the configured maximum.
    AboveMaximum { selected: usize, max: usize },
    /// Not every selected value has been placed in the ranking.
    PrioritizationIncomplete { prioritized: usize, selected: usize },
    /// Already on the last step.
    Terminal,
    /// Already on the first step.
    Initial,
}

impl std::fmt::Display for AdvanceBlocker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::BelowMinimum { selected, min } => {
                write!(f, "select at least {min} values ({selected} selected)")
            }
            Self::AboveMaximum { selected, max } => {
                write!(f, "select at most {max} values ({selected} selected)")
            }
            Self::PrioritizationIncomplete {
                prioritized,
                selected,
            } => write!(f, "{prioritized} of {selected} selected values are ranked"),
            Self::Terminal => write!(f, "already at the final step"),
            Self::Initial => write!(f, "already at the first step"),
        }
    }
}
