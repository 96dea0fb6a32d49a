//! Legacy data migration.
//!
//! Older clients stored the assessment as loose keys (`selectedValues`,
//! `prioritizedValues`, `reflections`, `completionDate`). `MigrationEngine`
//! converts them into one `StoredState` and, when asked, removes the keys
//! after backing them up.

pub mod engine;
pub mod legacy;

pub use engine::{CleanupReport, MigrationEngine, MigrationResult};
pub use legacy::{LegacyData, LegacyPayload, is_present, keys};
