//! Error types for the values assessment engine.

use crate::assessment::step::{AdvanceBlocker, StepId};

/// Top-level error type for the crate.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Catalog error: {0}")]
    Catalog(#[from] CatalogError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Wizard error: {0}")]
    Wizard(#[from] WizardError),

    #[error("Migration error: {0}")]
    Migration(#[from] MigrationError),

    #[error("Export error: {0}")]
    Export(#[from] ExportError),
}

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required configuration: {key}. {hint}")]
    MissingRequired { key: String, hint: String },

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Value catalog errors.
#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    #[error("Duplicate value id in catalog: {0}")]
    DuplicateId(String),

    #[error("Catalog entry {index} has an empty id")]
    EmptyId { index: usize },

    #[error("Failed to parse catalog: {0}")]
    Parse(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Persistence adapter errors, shared by the local and remote stores.
#[derive(Debug, Clone, thiserror::Error)]
pub enum StoreError {
    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Query failed: {0}")]
    Query(String),

    #[error("Schema migration failed: {0}")]
    Schema(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Remote store requires authentication")]
    Unauthenticated,

    #[error("Remote store returned HTTP {status}: {body}")]
    Http { status: u16, body: String },

    #[error("Remote store request failed: {0}")]
    Transport(String),
}

/// Guard violations and persistence failures reported by the wizard.
///
/// None of these unwind UI state: the engine leaves its in-memory state as
/// it was before the rejected call (persistence failures excepted, which
/// keep the optimistic in-memory change).
#[derive(Debug, thiserror::Error)]
pub enum WizardError {
    #[error("Selection is full: at most {max} values can be selected")]
    CapacityExceeded { max: usize },

    #[error("Cannot leave step {from}: {reason}")]
    InvalidStepTransition { from: StepId, reason: AdvanceBlocker },

    #[error("Unknown value id: {id}")]
    UnknownValueId { id: String },

    #[error("{operation} is only available during {expected} (current step: {current})")]
    WrongStep {
        operation: &'static str,
        expected: StepId,
        current: StepId,
    },

    #[error("Persistence failed: {0}")]
    PersistenceFailed(#[from] StoreError),
}

impl WizardError {
    /// The gate that blocked a transition, if this is a transition error.
    pub fn blocker(&self) -> Option<&AdvanceBlocker> {
        match self {
            Self::InvalidStepTransition { reason, .. } => Some(reason),
            _ => None,
        }
    }

    /// Whether the error is the "not enough values selected" gate.
    pub fn is_below_minimum(&self) -> bool {
        matches!(self.blocker(), Some(AdvanceBlocker::BelowMinimum { .. }))
    }
}

/// Legacy data migration errors.
///
/// Every variant is non-destructive: the legacy keys are untouched whenever
/// one of these is returned from a migration attempt.
#[derive(Debug, thiserror::Error)]
pub enum MigrationError {
    #[error("No legacy data found")]
    NoLegacyData,

    #[error("Failed to read legacy key {key}: {reason}")]
    Extraction { key: String, reason: String },

    #[error("Failed to transform legacy key {key}: {reason}")]
    Transform { key: String, reason: String },

    #[error("Failed to persist migrated state: {0}")]
    PersistenceFailed(#[from] StoreError),

    #[error("Migrated state was not confirmed by the store")]
    Unconfirmed,

    #[error("Cleanup requires a successful migration")]
    NotMigrated,

    #[error("Failed to back up legacy data: {0}")]
    Backup(StoreError),
}

/// Report export errors.
#[derive(Debug, thiserror::Error)]
pub enum ExportError {
    #[error("Assessment is not finished (current step: {current})")]
    NotFinished { current: StepId },

    #[error("Export failed: {0}")]
    Render(String),
}

/// Result type alias for the crate.
pub type Result<T> = std::result::Result<T, Error>;
