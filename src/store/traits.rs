//! Persistence contracts consumed by the wizard and the migration engine.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::assessment::model::AssessmentState;
use crate::error::StoreError;

/// Layout version written by this crate. The flat-key legacy layout is 1.
pub const STORED_STATE_VERSION: u32 = 2;

fn current_version() -> u32 {
    STORED_STATE_VERSION
}

/// The persisted record: one per user, written and read as a whole.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredState {
    #[serde(default = "current_version")]
    pub version: u32,
    #[serde(flatten)]
    pub assessment: AssessmentState,
}

impl StoredState {
    pub fn new(assessment: AssessmentState) -> Self {
        Self {
            version: STORED_STATE_VERSION,
            assessment,
        }
    }
}

impl From<AssessmentState> for StoredState {
    fn from(assessment: AssessmentState) -> Self {
        Self::new(assessment)
    }
}

/// Which physical store an adapter talks to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreKind {
    Local,
    Remote,
}

impl std::fmt::Display for StoreKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Local => write!(f, "local"),
            Self::Remote => write!(f, "remote"),
        }
    }
}

/// Whole-record persistence for the current assessment layout.
///
/// Implementations must make `save_all` atomic from the caller's point of
/// view: `load_all` never observes a half-written record.
#[async_trait]
pub trait PersistenceAdapter: Send + Sync {
    fn kind(&self) -> StoreKind;

    /// Load the stored record, or `None` if nothing has been saved yet.
    async fn load_all(&self) -> Result<Option<StoredState>, StoreError>;

    /// Replace the stored record.
    async fn save_all(&self, state: &StoredState) -> Result<(), StoreError>;

    /// Delete the stored record. Removing a missing record is not an error.
    async fn remove_all(&self) -> Result<(), StoreError>;
}

/// Raw flat-key access, used only at the legacy migration boundary.
#[async_trait]
pub trait LegacyStore: Send + Sync {
    /// Read a raw key. Values that are not valid JSON come back as strings.
    async fn read_raw(&self, key: &str) -> Result<Option<serde_json::Value>, StoreError>;

    /// Write a raw key, replacing any previous value.
    async fn write_raw(&self, key: &str, value: &serde_json::Value) -> Result<(), StoreError>;

    /// Delete a raw key. Returns whether it existed.
    async fn delete_raw(&self, key: &str) -> Result<bool, StoreError>;
}
