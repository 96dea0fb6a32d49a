use std::sync::Arc;

use anyhow::Context;
use tokio::sync::Mutex;

use values_assessment::assessment::{AssessmentRouteState, assessment_routes};
use values_assessment::auth::{AuthTokenProvider, StaticToken};
use values_assessment::bootstrap;
use values_assessment::catalog::ValueCatalog;
use values_assessment::config::AppConfig;
use values_assessment::migration::MigrationEngine;
use values_assessment::store::{LibSqlStore, PersistenceAdapter, RemoteStore};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let config = AppConfig::from_env().context("Invalid configuration")?;

    eprintln!("Values Assessment v{}", env!("CARGO_PKG_VERSION"));
    eprintln!(
        "   Selections: {}..={} (top {})",
        config.assessment.min_selections, config.assessment.max_selections, config.assessment.top_values
    );

    // ── Catalog ──────────────────────────────────────────────────────────
    let catalog = match &config.catalog_path {
        Some(path) => ValueCatalog::from_path(path)
            .with_context(|| format!("Failed to load catalog from {}", path.display()))?,
        None => ValueCatalog::builtin(),
    };
    eprintln!("   Catalog: {} values", catalog.len());
    let catalog = Arc::new(catalog);

    // ── Stores ───────────────────────────────────────────────────────────
    let local = Arc::new(
        LibSqlStore::new_local(&config.db_path, &config.namespace)
            .await
            .with_context(|| format!("Failed to open database at {}", config.db_path.display()))?,
    );
    eprintln!("   Database: {}", config.db_path.display());

    let (store, migration): (Arc<dyn PersistenceAdapter>, MigrationEngine) =
        match (&config.remote_url, &config.auth_token) {
            (Some(url), Some(token)) => {
                let auth: Arc<dyn AuthTokenProvider> = Arc::new(StaticToken::new(token.clone()));
                let remote = Arc::new(RemoteStore::new(url, Arc::clone(&auth)));
                eprintln!("   Remote store: {}", url);
                let migration = MigrationEngine::new(local.clone(), remote.clone())
                    .with_remote(remote.clone(), auth)
                    .with_config(config.assessment.clone());
                let store: Arc<dyn PersistenceAdapter> = remote;
                (store, migration)
            }
            _ => {
                eprintln!("   Remote store: disabled");
                let store: Arc<dyn PersistenceAdapter> = local.clone();
                let migration = MigrationEngine::new(local.clone(), local)
                    .with_config(config.assessment.clone());
                (store, migration)
            }
        };

    // ── Migration + wizard ───────────────────────────────────────────────
    let startup = bootstrap::start(
        &migration,
        store,
        catalog,
        config.assessment.clone(),
        config.cleanup_legacy,
    )
    .await
    .context("Failed to load assessment")?;

    tracing::info!(
        step = %startup.engine.current_step(),
        migrated = startup.migration.as_ref().is_some_and(|r| r.success),
        "Assessment ready"
    );

    // ── HTTP ─────────────────────────────────────────────────────────────
    let app = assessment_routes(AssessmentRouteState {
        engine: Arc::new(Mutex::new(startup.engine)),
    });
    let listener = tokio::net::TcpListener::bind(config.bind_addr)
        .await
        .with_context(|| format!("Failed to bind {}", config.bind_addr))?;
    eprintln!("   API: http://{}/api/assessment\n", config.bind_addr);
    tracing::info!(addr = %config.bind_addr, "Assessment server started");

    axum::serve(listener, app).await?;
    Ok(())
}
