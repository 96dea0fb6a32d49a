//! MigrationEngine: moves flat-key legacy data into the structured layout.
//!
//! The legacy keys are only ever read until a migration has been written
//! and read back. Deleting them is a separate, caller-controlled step.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::assessment::model::{AssessmentState, MigrationSource, ReflectionProvenance};
use crate::assessment::step::StepId;
use crate::auth::AuthTokenProvider;
use crate::config::AssessmentConfig;
use crate::error::{MigrationError, StoreError};
use crate::store::traits::{LegacyStore, PersistenceAdapter, StoredState};

use super::legacy::{LegacyData, LegacyPayload, keys};

/// Outcome of `migrate_data`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MigrationResult {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<MigrationSource>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub migrated_data: Option<AssessmentState>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Raw values that were migrated, compared against before cleanup.
    #[serde(skip)]
    payload: Option<LegacyPayload>,
}

impl MigrationResult {
    fn succeeded(source: MigrationSource, state: AssessmentState, payload: LegacyPayload) -> Self {
        Self {
            success: true,
            source: Some(source),
            migrated_data: Some(state),
            error: None,
            payload: Some(payload),
        }
    }

    fn failed(source: Option<MigrationSource>, error: &MigrationError) -> Self {
        Self {
            success: false,
            source,
            migrated_data: None,
            error: Some(error.to_string()),
            payload: None,
        }
    }
}

/// What `cleanup` did with each legacy key.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CleanupReport {
    pub backup_key: String,
    pub deleted: Vec<String>,
    /// Keys left alone because their value changed after migration.
    pub skipped: Vec<String>,
    /// Keys whose deletion failed twice.
    pub failed: Vec<String>,
}

impl CleanupReport {
    pub fn is_complete(&self) -> bool {
        self.skipped.is_empty() && self.failed.is_empty()
    }
}

/// Detects, converts and (optionally) removes legacy assessment data.
pub struct MigrationEngine {
    local: Arc<dyn LegacyStore>,
    remote: Option<(Arc<dyn LegacyStore>, Arc<dyn AuthTokenProvider>)>,
    target: Arc<dyn PersistenceAdapter>,
    config: AssessmentConfig,
    attempted: AtomicBool,
}

impl MigrationEngine {
    pub fn new(local: Arc<dyn LegacyStore>, target: Arc<dyn PersistenceAdapter>) -> Self {
        Self {
            local,
            remote: None,
            target,
            config: AssessmentConfig::default(),
            attempted: AtomicBool::new(false),
        }
    }

    /// Selection bounds used when checking migrated records.
    pub fn with_config(mut self, config: AssessmentConfig) -> Self {
        self.config = config;
        self
    }

    /// Also look for legacy data on the server, ahead of the local store.
    pub fn with_remote(
        mut self,
        remote: Arc<dyn LegacyStore>,
        auth: Arc<dyn AuthTokenProvider>,
    ) -> Self {
        self.remote = Some((remote, auth));
        self
    }

    /// Stores to search, in priority order. The server is skipped while
    /// signed out.
    fn sources(&self) -> Vec<(MigrationSource, &Arc<dyn LegacyStore>)> {
        let mut sources = Vec::with_capacity(2);
        if let Some((remote, auth)) = &self.remote {
            if auth.is_authenticated() {
                sources.push((MigrationSource::Server, remote));
            } else {
                debug!("Not signed in, skipping server legacy check");
            }
        }
        sources.push((MigrationSource::Local, &self.local));
        sources
    }

    fn store_for(&self, source: MigrationSource) -> Option<&Arc<dyn LegacyStore>> {
        match source {
            MigrationSource::Local => Some(&self.local),
            MigrationSource::Server => self.remote.as_ref().map(|(store, _)| store),
        }
    }

    /// Whether any store holds non-empty legacy data.
    ///
    /// Read errors are logged and treated as "nothing there".
    pub async fn check_for_legacy_data(&self) -> bool {
        for (source, store) in self.sources() {
            match read_payload(store.as_ref()).await {
                Ok(payload) if !payload.is_empty() => {
                    info!(%source, keys = ?payload.keys().collect::<Vec<_>>(), "Legacy data found");
                    return true;
                }
                Ok(_) => {}
                Err(e) => warn!(%source, "Legacy data check failed: {}", e),
            }
        }
        false
    }

    /// Convert legacy data and write it through the persistence adapter.
    ///
    /// `success` is only true once the written record has been read back.
    /// On failure nothing has been deleted.
    pub async fn migrate_data(&self) -> MigrationResult {
        let (source, payload) = match self.locate().await {
            Ok(found) => found,
            Err(e) => {
                warn!("Legacy migration failed: {}", e);
                return MigrationResult::failed(None, &e);
            }
        };

        match self.migrate_from(source, payload).await {
            Ok((state, payload)) => {
                info!(
                    %source,
                    assessment_id = %state.metadata.assessment_id,
                    step = %state.current_step,
                    selected = state.selected_values.len(),
                    prioritized = state.prioritized_values.len(),
                    reflections = state.reflections.len(),
                    "Legacy data migrated"
                );
                MigrationResult::succeeded(source, state, payload)
            }
            Err(e) => {
                warn!(%source, "Legacy migration failed: {}", e);
                MigrationResult::failed(Some(source), &e)
            }
        }
    }

    /// First store holding legacy data.
    ///
    /// A store that cannot be read is skipped like in
    /// `check_for_legacy_data`; its error is only returned when no other
    /// store has data.
    async fn locate(&self) -> Result<(MigrationSource, LegacyPayload), MigrationError> {
        let mut first_error = None;
        for (source, store) in self.sources() {
            match read_payload(store.as_ref()).await {
                Ok(payload) if !payload.is_empty() => return Ok((source, payload)),
                Ok(_) => {}
                Err(e) => {
                    warn!(%source, "Skipping unreadable legacy store: {}", e);
                    if first_error.is_none() {
                        first_error = Some(e);
                    }
                }
            }
        }
        Err(first_error.unwrap_or(MigrationError::NoLegacyData))
    }

    async fn migrate_from(
        &self,
        source: MigrationSource,
        payload: LegacyPayload,
    ) -> Result<(AssessmentState, LegacyPayload), MigrationError> {
        let data = LegacyData::decode(&payload)?;
        let digest = payload.digest();

        let existing = self.target.load_all().await?;
        if let Some(existing) = existing {
            let assessment = &existing.assessment;
            let migrated_digest = assessment
                .reflections
                .provenance
                .as_ref()
                .and_then(|p| p.legacy_digest.as_deref());
            if assessment.metadata.migrated_from == Some(source)
                && migrated_digest == Some(digest.as_str())
            {
                debug!(%source, "Stored assessment already migrated from this data, reusing it");
                return Ok((existing.assessment, payload));
            }
            warn!(
                assessment_id = %assessment.metadata.assessment_id,
                "Replacing stored assessment with migrated legacy data"
            );
        }

        let state = build_state(source, data, digest)?;
        for violation in state.violations(&self.config) {
            warn!(%violation, "Migrated data breaks an invariant, kept as-is");
        }

        let stored = StoredState::new(state);
        self.target.save_all(&stored).await?;
        match self.target.load_all().await? {
            Some(written) if written == stored => Ok((stored.assessment, payload)),
            _ => Err(MigrationError::Unconfirmed),
        }
    }

    /// Back up the raw legacy values, then delete the legacy keys.
    ///
    /// Keys whose value changed since the migration read them are kept.
    /// Each deletion is retried once. Failures here never touch the
    /// migrated record.
    pub async fn cleanup(&self, result: &MigrationResult) -> Result<CleanupReport, MigrationError> {
        let (Some(source), Some(payload), true) = (result.source, &result.payload, result.success)
        else {
            return Err(MigrationError::NotMigrated);
        };
        let store = self
            .store_for(source)
            .ok_or(MigrationError::NotMigrated)?;

        let backup = serde_json::json!({
            "backedUpAt": Utc::now(),
            "source": source,
            "data": payload.to_json(),
        });
        store
            .write_raw(keys::BACKUP, &backup)
            .await
            .map_err(MigrationError::Backup)?;

        let mut report = CleanupReport {
            backup_key: keys::BACKUP.to_string(),
            ..Default::default()
        };
        for key in payload.keys() {
            let current = match store.read_raw(key).await {
                Ok(value) => value,
                Err(e) => {
                    warn!(key, "Could not re-read legacy key, leaving it: {}", e);
                    report.failed.push(key.to_string());
                    continue;
                }
            };
            if current.as_ref() != payload.get(key) {
                warn!(key, "Legacy key changed since migration, leaving it");
                report.skipped.push(key.to_string());
                continue;
            }
            match delete_with_retry(store.as_ref(), key).await {
                Ok(()) => report.deleted.push(key.to_string()),
                Err(e) => {
                    warn!(key, "Giving up on deleting legacy key: {}", e);
                    report.failed.push(key.to_string());
                }
            }
        }

        info!(
            %source,
            deleted = report.deleted.len(),
            skipped = report.skipped.len(),
            failed = report.failed.len(),
            "Legacy cleanup finished"
        );
        Ok(report)
    }

    /// Check and migrate once per engine. Later calls return `None`.
    pub async fn run_at_startup(&self, cleanup: bool) -> Option<MigrationResult> {
        if self.attempted.swap(true, Ordering::SeqCst) {
            debug!("Legacy migration already attempted");
            return None;
        }
        if !self.check_for_legacy_data().await {
            debug!("No legacy data to migrate");
            return None;
        }

        let result = self.migrate_data().await;
        if result.success && cleanup {
            if let Err(e) = self.cleanup(&result).await {
                warn!("Legacy cleanup failed, legacy keys kept: {}", e);
            }
        }
        Some(result)
    }
}

async fn read_payload(store: &dyn LegacyStore) -> Result<LegacyPayload, MigrationError> {
    let mut payload = LegacyPayload::default();
    for key in keys::ALL {
        let value = store
            .read_raw(key)
            .await
            .map_err(|e| MigrationError::Extraction {
                key: key.to_string(),
                reason: e.to_string(),
            })?;
        if let Some(value) = value {
            payload.insert(key, value);
        }
    }
    Ok(payload)
}

async fn delete_with_retry(store: &dyn LegacyStore, key: &str) -> Result<(), StoreError> {
    match store.delete_raw(key).await {
        Ok(_) => Ok(()),
        Err(first) => {
            debug!(key, "Legacy key deletion failed, retrying: {}", first);
            store.delete_raw(key).await.map(|_| ())
        }
    }
}

/// Assemble the structured record. Lists and reflection text are copied
/// verbatim; only the step bookkeeping is derived.
fn build_state(
    source: MigrationSource,
    data: LegacyData,
    legacy_digest: String,
) -> Result<AssessmentState, MigrationError> {
    let mut state = AssessmentState::default();
    let now = Utc::now();
    state.metadata.migrated_from = Some(source);

    let has_selected = data.selected_values.is_some();
    let has_prioritized = data.prioritized_values.is_some();
    let has_reflections = data.reflections.is_some();

    if let Some(selected) = data.selected_values {
        state.selected_values = selected;
    }
    if let Some(prioritized) = data.prioritized_values {
        state.prioritized_values = prioritized;
    }
    let legacy_format = match data.reflections {
        Some(reflections) => {
            let format = reflections.format();
            state.reflections.entries = reflections.into_entries()?;
            Some(format)
        }
        None => None,
    };
    state.reflections.provenance = Some(ReflectionProvenance {
        source,
        migrated_at: now,
        legacy_format,
        completion_date: data.completion_date.clone(),
        legacy_digest: Some(legacy_digest),
    });

    let step = if data.completion_date.is_some() {
        StepId::Results
    } else if has_reflections {
        StepId::Reflection
    } else if has_prioritized {
        StepId::Prioritization
    } else if has_selected {
        StepId::Selection
    } else {
        StepId::Introduction
    };
    state.current_step = step;
    state.completed_steps = StepId::ALL
        .into_iter()
        .filter(|s| *s < step)
        .collect::<BTreeSet<_>>();

    if step == StepId::Results {
        state.metadata.completed_at = data
            .completion_date
            .as_deref()
            .and_then(parse_completion_date);
    }
    Ok(state)
}

/// Legacy completion dates were RFC 3339 strings or epoch milliseconds.
fn parse_completion_date(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(date) = DateTime::parse_from_rfc3339(raw) {
        return Some(date.with_timezone(&Utc));
    }
    raw.parse::<i64>()
        .ok()
        .and_then(DateTime::<Utc>::from_timestamp_millis)
}
