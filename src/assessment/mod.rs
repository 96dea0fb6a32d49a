//! Assessment wizard: select, rank, reflect, review.
//!
//! `WizardEngine` owns an `AssessmentState` and is the only thing that
//! changes it. Forward navigation is gated per step; backward navigation
//! never discards data.

pub mod engine;
pub mod model;
pub mod reorder;
pub mod routes;
pub mod step;

pub use engine::{AssessmentView, ReflectionUpdate, WizardEngine};
pub use model::{AssessmentMetadata, AssessmentState, MigrationSource, Reflections};
pub use routes::{AssessmentRouteState, assessment_routes};
pub use step::{AdvanceBlocker, StepId};
