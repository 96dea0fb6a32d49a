//! Startup sequence: migrate legacy data once, then load the wizard.

use std::sync::Arc;

use tracing::{info, warn};

use crate::assessment::WizardEngine;
use crate::catalog::ValueCatalog;
use crate::config::AssessmentConfig;
use crate::error::WizardError;
use crate::migration::{MigrationEngine, MigrationResult};
use crate::store::PersistenceAdapter;

/// A loaded wizard plus what migration did on the way.
pub struct Startup {
    pub engine: WizardEngine,
    /// `None` when there was nothing to migrate (or it already ran).
    pub migration: Option<MigrationResult>,
}

/// Run the legacy migration (at most once per `migration` engine), then
/// load the wizard from `store`.
///
/// A failed migration is logged and leaves the legacy keys in place; the
/// wizard still starts from whatever `store` holds.
pub async fn start(
    migration: &MigrationEngine,
    store: Arc<dyn PersistenceAdapter>,
    catalog: Arc<ValueCatalog>,
    config: AssessmentConfig,
    cleanup_legacy: bool,
) -> Result<Startup, WizardError> {
    let result = migration.run_at_startup(cleanup_legacy).await;
    match &result {
        Some(r) if r.success => info!(
            source = ?r.source,
            cleanup = cleanup_legacy,
            "Legacy assessment migrated"
        ),
        Some(r) => warn!(
            error = r.error.as_deref().unwrap_or("unknown"),
            "Legacy migration failed, starting from stored state"
        ),
        None => {}
    }

    let engine = WizardEngine::load(store, catalog, config).await?;
    Ok(Startup {
        engine,
        migration: result,
    })
}
