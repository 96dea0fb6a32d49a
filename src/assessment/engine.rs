//! WizardEngine: owns one assessment and gates every change to it.
//!
//! Each mutation updates the in-memory state and hands a snapshot to a
//! background writer task; the caller never waits on the store. The writer
//! only keeps the latest snapshot, so a burst of mutations costs one write.
//! A failed write is logged and remembered but never rolls the in-memory
//! change back; it surfaces from the next `save_progress()`.

use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::catalog::{ValueCatalog, ValueDescriptor};
use crate::config::AssessmentConfig;
use crate::error::{Error, StoreError, WizardError};
use crate::export::{ExportSnapshot, ReportExporter};
use crate::store::traits::{PersistenceAdapter, StoredState};

use super::model::AssessmentState;
use super::reorder;
use super::step::{AdvanceBlocker, StepId};

/// Outcome of `update_reflection`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReflectionUpdate {
    /// Characters actually stored.
    pub stored_chars: usize,
    /// Whether the text was cut to the configured maximum.
    pub truncated: bool,
    /// Whether the reflection was removed (blank text).
    pub cleared: bool,
}

/// Read-only snapshot for the rendering layer.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AssessmentView {
    pub state: AssessmentState,
    pub step_index: usize,
    pub step_count: usize,
    pub can_advance: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub blocked_by: Option<AdvanceBlocker>,
    pub min_selections: usize,
    pub max_selections: usize,
    pub capacity_remaining: usize,
    /// The top-ranked values the reflection step asks about.
    pub reflection_targets: Vec<ValueDescriptor>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub persistence_error: Option<String>,
}

#[derive(Debug, Clone)]
enum WriteOp {
    Save(StoredState),
    Remove,
}

#[derive(Debug, Clone)]
struct PendingWrite {
    generation: u64,
    op: WriteOp,
}

/// Outcome of the most recent write the background task finished.
#[derive(Debug, Clone, Default)]
struct WriteStatus {
    generation: u64,
    error: Option<StoreError>,
}

/// The step-gated assessment wizard.
pub struct WizardEngine {
    store: Arc<dyn PersistenceAdapter>,
    catalog: Arc<ValueCatalog>,
    config: AssessmentConfig,
    state: AssessmentState,
    generation: u64,
    pending: watch::Sender<Option<PendingWrite>>,
    status: watch::Receiver<WriteStatus>,
}

/// Drain queued writes until the engine is dropped.
async fn write_loop(
    store: Arc<dyn PersistenceAdapter>,
    mut pending: watch::Receiver<Option<PendingWrite>>,
    status: watch::Sender<WriteStatus>,
) {
    while pending.changed().await.is_ok() {
        let Some(write) = pending.borrow_and_update().clone() else {
            continue;
        };
        let result = match &write.op {
            WriteOp::Save(stored) => store.save_all(stored).await,
            WriteOp::Remove => store.remove_all().await,
        };
        if let Err(e) = &result {
            warn!(
                store = %store.kind(),
                generation = write.generation,
                "Failed to persist assessment, keeping in-memory state: {}",
                e
            );
        }
        status.send_replace(WriteStatus {
            generation: write.generation,
            error: result.err(),
        });
    }
    debug!(store = %store.kind(), "Assessment writer stopped");
}

impl WizardEngine {
    /// Create an engine around a fresh, not yet persisted assessment.
    pub fn new(
        store: Arc<dyn PersistenceAdapter>,
        catalog: Arc<ValueCatalog>,
        config: AssessmentConfig,
    ) -> Self {
        Self::with_state(store, catalog, config, AssessmentState::default())
    }

    /// Create an engine around an existing assessment.
    ///
    /// Spawns the writer task, so this must run inside a Tokio runtime.
    pub fn with_state(
        store: Arc<dyn PersistenceAdapter>,
        catalog: Arc<ValueCatalog>,
        config: AssessmentConfig,
        state: AssessmentState,
    ) -> Self {
        let (pending, pending_rx) = watch::channel(None);
        let (status_tx, status) = watch::channel(WriteStatus::default());
        tokio::spawn(write_loop(Arc::clone(&store), pending_rx, status_tx));
        Self {
            store,
            catalog,
            config,
            state,
            generation: 0,
            pending,
            status,
        }
    }

    /// Load the stored assessment, or start and persist a new one.
    pub async fn load(
        store: Arc<dyn PersistenceAdapter>,
        catalog: Arc<ValueCatalog>,
        config: AssessmentConfig,
    ) -> Result<Self, WizardError> {
        let Some(stored) = store.load_all().await? else {
            let mut engine = Self::new(store, catalog, config);
            info!(
                assessment_id = %engine.state.metadata.assessment_id,
                "Starting new assessment"
            );
            engine.save_or_warn().await;
            return Ok(engine);
        };

        let state = stored.assessment;
        for violation in state.violations(&config) {
            warn!(%violation, "Loaded assessment breaks an invariant");
        }
        info!(
            assessment_id = %state.metadata.assessment_id,
            step = %state.current_step,
            "Resuming assessment"
        );

        let mut engine = Self::with_state(store, catalog, config, state);
        if engine.state.current_step == StepId::Prioritization
            && engine.state.reconcile_priorities()
        {
            engine.save_or_warn().await;
        }
        Ok(engine)
    }

    pub fn state(&self) -> &AssessmentState {
        &self.state
    }

    pub fn config(&self) -> &AssessmentConfig {
        &self.config
    }

    pub fn catalog(&self) -> &ValueCatalog {
        &self.catalog
    }

    pub fn current_step(&self) -> StepId {
        self.state.current_step
    }

    /// Error from the most recently finished write, cleared by the next success.
    pub fn persistence_error(&self) -> Option<String> {
        self.status.borrow().error.as_ref().map(ToString::to_string)
    }

    /// How many more values can be selected.
    pub fn capacity_remaining(&self) -> usize {
        self.config
            .max_selections
            .saturating_sub(self.state.selected_values.len())
    }

    // ── Guards ──────────────────────────────────────────────────────

    /// Why the current step cannot be left forward, if it can't.
    pub fn advance_blocker(&self) -> Option<AdvanceBlocker> {
        let step = self.state.current_step;
        if step.is_terminal() {
            return Some(AdvanceBlocker::Terminal);
        }
        let selected = self.state.selected_values.len();
        match step {
            StepId::Introduction | StepId::Reflection | StepId::Results => None,
            StepId::Selection if selected < self.config.min_selections => {
                Some(AdvanceBlocker::BelowMinimum {
                    selected,
                    min: self.config.min_selections,
                })
            }
            StepId::Selection if selected > self.config.max_selections => {
                Some(AdvanceBlocker::AboveMaximum {
                    selected,
                    max: self.config.max_selections,
                })
            }
            StepId::Selection => None,
            StepId::Prioritization if self.state.prioritized_values.len() != selected => {
                Some(AdvanceBlocker::PrioritizationIncomplete {
                    prioritized: self.state.prioritized_values.len(),
                    selected,
                })
            }
            StepId::Prioritization => None,
        }
    }

    pub fn can_advance(&self) -> bool {
        self.advance_blocker().is_none()
    }

    fn require_step(&self, operation: &'static str, expected: StepId) -> Result<(), WizardError> {
        if self.state.current_step != expected {
            return Err(WizardError::WrongStep {
                operation,
                expected,
                current: self.state.current_step,
            });
        }
        Ok(())
    }

    // ── Navigation ──────────────────────────────────────────────────

    /// Move to the next step if the current one is satisfied.
    pub async fn next_step(&mut self) -> Result<StepId, WizardError> {
        let from = self.state.current_step;
        if let Some(reason) = self.advance_blocker() {
            debug!(step = %from, %reason, "Forward navigation blocked");
            return Err(WizardError::InvalidStepTransition { from, reason });
        }
        let to = from.next().ok_or(WizardError::InvalidStepTransition {
            from,
            reason: AdvanceBlocker::Terminal,
        })?;

        self.state.completed_steps.insert(from);
        self.state.current_step = to;
        self.enter_step(to);

        info!(%from, %to, "Advanced assessment step");
        self.persist();
        Ok(to)
    }

    /// Move back one step. Nothing entered so far is cleared.
    pub async fn previous_step(&mut self) -> Result<StepId, WizardError> {
        let from = self.state.current_step;
        let to = from.previous().ok_or(WizardError::InvalidStepTransition {
            from,
            reason: AdvanceBlocker::Initial,
        })?;

        self.state.current_step = to;
        info!(%from, %to, "Went back an assessment step");
        self.persist();
        Ok(to)
    }

    fn enter_step(&mut self, step: StepId) {
        match step {
            StepId::Prioritization => {
                if self.state.reconcile_priorities() {
                    debug!(
                        ranked = self.state.prioritized_values.len(),
                        "Ranking reconciled with selection"
                    );
                }
            }
            StepId::Results => {
                self.state.metadata.completed_at.get_or_insert_with(Utc::now);
            }
            _ => {}
        }
    }

    // ── Selection ───────────────────────────────────────────────────

    /// Select or deselect a value. Returns whether it is now selected.
    pub async fn toggle_value(&mut self, id: &str) -> Result<bool, WizardError> {
        self.require_step("toggle_value", StepId::Selection)?;

        if self.state.is_selected(id) {
            self.state.remove_value(id);
            if self.state.selected_values.len() < self.config.min_selections {
                // Selection has to be passed again before later steps count as done.
                self.state.completed_steps.retain(|step| *step < StepId::Selection);
            }
            debug!(value = id, "Value deselected");
            self.persist();
            return Ok(false);
        }

        if !self.catalog.contains(id) {
            return Err(WizardError::UnknownValueId { id: id.to_string() });
        }
        if self.state.selected_values.len() >= self.config.max_selections {
            return Err(WizardError::CapacityExceeded {
                max: self.config.max_selections,
            });
        }

        self.state.selected_values.push(id.to_string());
        debug!(value = id, "Value selected");
        self.persist();
        Ok(true)
    }

    // ── Prioritization ──────────────────────────────────────────────

    /// Move the value at `index` one place up. False at the top.
    pub async fn move_value_up(&mut self, index: usize) -> Result<bool, WizardError> {
        self.require_step("move_value_up", StepId::Prioritization)?;
        let moved = reorder::move_up(&mut self.state.prioritized_values, index);
        if moved {
            self.persist();
        }
        Ok(moved)
    }

    /// Move the value at `index` one place down. False at the bottom.
    pub async fn move_value_down(&mut self, index: usize) -> Result<bool, WizardError> {
        self.require_step("move_value_down", StepId::Prioritization)?;
        let moved = reorder::move_down(&mut self.state.prioritized_values, index);
        if moved {
            self.persist();
        }
        Ok(moved)
    }

    /// Move a value to `target` (clamped to the list) one swap at a time.
    ///
    /// Returns the index the value ended up at.
    pub async fn move_value_to(&mut self, id: &str, target: usize) -> Result<usize, WizardError> {
        self.require_step("move_value_to", StepId::Prioritization)?;
        let list = &mut self.state.prioritized_values;
        let mut index = list
            .iter()
            .position(|v| v == id)
            .ok_or_else(|| WizardError::UnknownValueId { id: id.to_string() })?;
        let target = target.min(list.len() - 1);

        let start = index;
        while index > target && reorder::move_up(list, index) {
            index -= 1;
        }
        while index < target && reorder::move_down(list, index) {
            index += 1;
        }

        if index != start {
            self.persist();
        }
        Ok(index)
    }

    // ── Reflection ──────────────────────────────────────────────────

    /// Store (or clear, for blank text) the reflection on a ranked value.
    pub async fn update_reflection(
        &mut self,
        id: &str,
        text: &str,
    ) -> Result<ReflectionUpdate, WizardError> {
        self.require_step("update_reflection", StepId::Reflection)?;
        if !self.state.is_prioritized(id) {
            return Err(WizardError::UnknownValueId { id: id.to_string() });
        }

        if text.trim().is_empty() {
            self.state.reflections.entries.remove(id);
            self.persist();
            return Ok(ReflectionUpdate {
                stored_chars: 0,
                truncated: false,
                cleared: true,
            });
        }

        let max = self.config.max_reflection_chars;
        let truncated = text.chars().count() > max;
        let stored: String = if truncated {
            text.chars().take(max).collect()
        } else {
            text.to_string()
        };
        if truncated {
            debug!(value = id, max, "Reflection truncated");
        }

        let update = ReflectionUpdate {
            stored_chars: stored.chars().count(),
            truncated,
            cleared: false,
        };
        self.state.reflections.entries.insert(id.to_string(), stored);
        self.persist();
        Ok(update)
    }

    /// The top-ranked values the reflection step asks about.
    pub fn reflection_targets(&self) -> Vec<ValueDescriptor> {
        self.state
            .prioritized_values
            .iter()
            .take(self.config.top_values)
            .map(|id| {
                self.catalog
                    .get(id)
                    .cloned()
                    .unwrap_or_else(|| ValueDescriptor::new(id, id, ""))
            })
            .collect()
    }

    // ── Persistence ─────────────────────────────────────────────────

    /// Flush the current state. Safe to call at any step, any number of times.
    pub async fn save_progress(&mut self) -> Result<(), WizardError> {
        self.flush().await?;
        Ok(())
    }

    /// Throw the assessment away and start over.
    pub async fn reset(&mut self) -> Result<(), WizardError> {
        let previous = self.state.metadata.assessment_id;
        self.state = AssessmentState::default();
        let generation = self.enqueue(WriteOp::Remove);
        self.wait_for_write(generation).await?;
        info!(
            %previous,
            assessment_id = %self.state.metadata.assessment_id,
            "Assessment reset"
        );
        Ok(())
    }

    /// Queue the current state and wait until the writer has stored it.
    async fn flush(&mut self) -> Result<(), StoreError> {
        let generation = self.persist();
        self.wait_for_write(generation).await
    }

    async fn save_or_warn(&mut self) {
        if let Err(e) = self.flush().await {
            warn!(
                store = %self.store.kind(),
                step = %self.state.current_step,
                "Failed to save assessment, continuing in memory: {}",
                e
            );
        }
    }

    /// Queue a write of the current state. Returns its generation.
    fn persist(&mut self) -> u64 {
        self.state.metadata.updated_at = Utc::now();
        self.enqueue(WriteOp::Save(StoredState::new(self.state.clone())))
    }

    fn enqueue(&mut self, op: WriteOp) -> u64 {
        self.generation += 1;
        self.pending.send_replace(Some(PendingWrite {
            generation: self.generation,
            op,
        }));
        self.generation
    }

    /// Wait until the writer has finished `generation` or anything newer.
    async fn wait_for_write(&mut self, generation: u64) -> Result<(), StoreError> {
        let status = self
            .status
            .wait_for(|status| status.generation >= generation)
            .await
            .map_err(|_| StoreError::Connection("assessment writer stopped".into()))?;
        match &status.error {
            Some(e) => Err(e.clone()),
            None => Ok(()),
        }
    }

    // ── Rendering & export ──────────────────────────────────────────

    pub fn view(&self) -> AssessmentView {
        let blocked_by = self.advance_blocker();
        AssessmentView {
            state: self.state.clone(),
            step_index: self.state.current_step.index(),
            step_count: StepId::ALL.len(),
            can_advance: blocked_by.is_none(),
            blocked_by,
            min_selections: self.config.min_selections,
            max_selections: self.config.max_selections,
            capacity_remaining: self.capacity_remaining(),
            reflection_targets: self.reflection_targets(),
            persistence_error: self.persistence_error(),
        }
    }

    /// Snapshot of the finished assessment.
    pub fn export_snapshot(&self) -> Result<ExportSnapshot, WizardError> {
        ExportSnapshot::from_state(&self.state, &self.catalog, self.config.top_values).map_err(
            |_| WizardError::WrongStep {
                operation: "export",
                expected: StepId::Results,
                current: self.state.current_step,
            },
        )
    }

    /// Hand the finished assessment to an exporter and archive it.
    pub async fn finalize<E: ReportExporter>(&mut self, exporter: &E) -> Result<E::Output, Error> {
        let snapshot = self.export_snapshot()?;
        let output = exporter.export(&snapshot)?;
        self.state.metadata.archived_at.get_or_insert_with(Utc::now);
        info!(
            assessment_id = %self.state.metadata.assessment_id,
            "Assessment archived"
        );
        self.persist();
        Ok(output)
    }
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;

    use super::*;
    use crate::export::MarkdownExporter;
    use crate::store::MemoryStore;

    /// Store whose writes can be made to fail.
    #[derive(Default)]
    struct FlakyStore {
        inner: MemoryStore,
        fail_writes: std::sync::atomic::AtomicBool,
    }

    impl FlakyStore {
        fn set_failing(&self, failing: bool) {
            self.fail_writes
                .store(failing, std::sync::atomic::Ordering::SeqCst);
        }
    }

    /// Store whose writes never complete.
    struct HangingStore;

    #[async_trait]
    impl PersistenceAdapter for HangingStore {
        fn kind(&self) -> crate::store::StoreKind {
            crate::store::StoreKind::Remote
        }
        async fn load_all(&self) -> Result<Option<StoredState>, StoreError> {
            Ok(None)
        }
        async fn save_all(&self, _state: &StoredState) -> Result<(), StoreError> {
            std::future::pending().await
        }
        async fn remove_all(&self) -> Result<(), StoreError> {
            std::future::pending().await
        }
    }

    #[async_trait]
    impl PersistenceAdapter for FlakyStore {
        fn kind(&self) -> crate::store::StoreKind {
            crate::store::StoreKind::Remote
        }
        async fn load_all(&self) -> Result<Option<StoredState>, StoreError> {
            self.inner.load_all().await
        }
        async fn save_all(&self, state: &StoredState) -> Result<(), StoreError> {
            if self.fail_writes.load(std::sync::atomic::Ordering::SeqCst) {
                return Err(StoreError::Transport("connection reset".into()));
            }
            self.inner.save_all(state).await
        }
        async fn remove_all(&self) -> Result<(), StoreError> {
            self.inner.remove_all().await
        }
    }

    const IDS: [&str; 6] = ["honesty", "family", "growth", "courage", "humor", "peace"];

    fn test_config() -> AssessmentConfig {
        AssessmentConfig {
            min_selections: 3,
            max_selections: 5,
            top_values: 3,
            max_reflection_chars: 20,
        }
    }

    fn engine_with(store: Arc<dyn PersistenceAdapter>) -> WizardEngine {
        WizardEngine::new(store, Arc::new(ValueCatalog::builtin()), test_config())
    }

    fn test_engine() -> WizardEngine {
        engine_with(Arc::new(MemoryStore::new()))
    }

    async fn at_selection() -> WizardEngine {
        let mut engine = test_engine();
        engine.next_step().await.unwrap();
        engine
    }

    async fn at_prioritization() -> WizardEngine {
        let mut engine = at_selection().await;
        for id in &IDS[..4] {
            engine.toggle_value(id).await.unwrap();
        }
        engine.next_step().await.unwrap();
        engine
    }

    async fn at_reflection() -> WizardEngine {
        let mut engine = at_prioritization().await;
        engine.next_step().await.unwrap();
        engine
    }

    #[tokio::test]
    async fn load_creates_and_persists_new_assessment() {
        let store = Arc::new(MemoryStore::new());
        let engine = WizardEngine::load(
            store.clone(),
            Arc::new(ValueCatalog::builtin()),
            test_config(),
        )
        .await
        .unwrap();

        assert_eq!(engine.current_step(), StepId::Introduction);
        let stored = store.load_all().await.unwrap().unwrap();
        assert_eq!(
            stored.assessment.metadata.assessment_id,
            engine.state().metadata.assessment_id
        );
    }

    #[tokio::test]
    async fn load_resumes_stored_assessment() {
        let store = Arc::new(MemoryStore::new());
        let mut first = engine_with(store.clone());
        first.next_step().await.unwrap();
        first.toggle_value("honesty").await.unwrap();
        first.save_progress().await.unwrap();

        let resumed = WizardEngine::load(
            store.clone(),
            Arc::new(ValueCatalog::builtin()),
            test_config(),
        )
        .await
        .unwrap();
        assert_eq!(resumed.current_step(), StepId::Selection);
        assert_eq!(resumed.state().selected_values, ["honesty"]);
    }

    #[tokio::test]
    async fn introduction_always_advances() {
        let mut engine = test_engine();
        assert!(engine.can_advance());
        assert_eq!(engine.next_step().await.unwrap(), StepId::Selection);
        assert!(engine.state().completed_steps.contains(&StepId::Introduction));
    }

    #[tokio::test]
    async fn toggle_only_during_selection() {
        let mut engine = test_engine();
        let err = engine.toggle_value("honesty").await.unwrap_err();
        assert!(matches!(
            err,
            WizardError::WrongStep {
                expected: StepId::Selection,
                current: StepId::Introduction,
                ..
            }
        ));
        assert!(engine.state().selected_values.is_empty());
    }

    #[tokio::test]
    async fn toggle_adds_and_removes() {
        let mut engine = at_selection().await;
        assert!(engine.toggle_value("honesty").await.unwrap());
        assert!(engine.toggle_value("family").await.unwrap());
        assert!(!engine.toggle_value("honesty").await.unwrap());
        assert_eq!(engine.state().selected_values, ["family"]);
    }

    #[tokio::test]
    async fn deselecting_below_minimum_reopens_selection() {
        let mut engine = at_prioritization().await;
        engine.next_step().await.unwrap();
        engine.previous_step().await.unwrap();
        engine.previous_step().await.unwrap();
        assert_eq!(engine.current_step(), StepId::Selection);
        assert!(engine.state().completed_steps.contains(&StepId::Prioritization));

        // 4 -> 3 stays at the minimum.
        engine.toggle_value(IDS[0]).await.unwrap();
        assert!(engine.state().completed_steps.contains(&StepId::Selection));

        // 3 -> 2 drops below it.
        engine.toggle_value(IDS[1]).await.unwrap();
        let completed: Vec<StepId> = engine.state().completed_steps.iter().copied().collect();
        assert_eq!(completed, [StepId::Introduction]);
        assert!(engine.state().is_consistent(engine.config()));
        assert!(engine.next_step().await.unwrap_err().is_below_minimum());
    }

    #[tokio::test]
    async fn toggle_rejects_unknown_ids() {
        let mut engine = at_selection().await;
        let err = engine.toggle_value("not-a-value").await.unwrap_err();
        assert!(matches!(err, WizardError::UnknownValueId { id } if id == "not-a-value"));
    }

    #[tokio::test]
    async fn selection_never_exceeds_capacity() {
        let mut engine = at_selection().await;
        for id in &IDS[..5] {
            assert!(engine.toggle_value(id).await.unwrap());
        }
        assert_eq!(engine.capacity_remaining(), 0);

        let before = engine.state().selected_values.clone();
        let err = engine.toggle_value(IDS[5]).await.unwrap_err();
        assert!(matches!(err, WizardError::CapacityExceeded { max: 5 }));
        assert_eq!(engine.state().selected_values, before);

        // Removing still works at capacity, and frees a slot.
        assert!(!engine.toggle_value(IDS[0]).await.unwrap());
        assert!(engine.toggle_value(IDS[5]).await.unwrap());
        assert_eq!(engine.state().selected_values.len(), 5);
    }

    #[tokio::test]
    async fn selection_gate_needs_minimum() {
        let mut engine = at_selection().await;
        engine.toggle_value("honesty").await.unwrap();
        engine.toggle_value("family").await.unwrap();

        let err = engine.next_step().await.unwrap_err();
        assert!(err.is_below_minimum());
        assert!(matches!(
            err,
            WizardError::InvalidStepTransition {
                from: StepId::Selection,
                ..
            }
        ));
        assert_eq!(engine.current_step(), StepId::Selection);

        engine.toggle_value("growth").await.unwrap();
        assert_eq!(engine.next_step().await.unwrap(), StepId::Prioritization);
        assert!(engine.state().completed_steps.contains(&StepId::Selection));
    }

    #[tokio::test]
    async fn entering_prioritization_seeds_ranking() {
        let engine = at_prioritization().await;
        assert_eq!(engine.state().prioritized_values, &IDS[..4]);
        assert!(engine.can_advance());
    }

    #[tokio::test]
    async fn reordering_is_a_permutation() {
        let mut engine = at_prioritization().await;
        let original = engine.state().prioritized_values.clone();

        assert!(engine.move_value_down(0).await.unwrap());
        assert!(engine.move_value_up(3).await.unwrap());
        assert!(engine.move_value_down(1).await.unwrap());
        assert_eq!(engine.move_value_to("courage", 0).await.unwrap(), 0);

        let mut after = engine.state().prioritized_values.clone();
        assert_eq!(after[0], "courage");
        after.sort();
        let mut expected = original;
        expected.sort();
        assert_eq!(after, expected);
    }

    #[tokio::test]
    async fn reorder_boundaries_are_no_ops() {
        let mut engine = at_prioritization().await;
        let before = engine.state().prioritized_values.clone();
        assert!(!engine.move_value_up(0).await.unwrap());
        assert!(!engine.move_value_down(3).await.unwrap());
        assert!(!engine.move_value_up(42).await.unwrap());
        assert_eq!(engine.state().prioritized_values, before);
    }

    #[tokio::test]
    async fn move_value_to_unknown_id() {
        let mut engine = at_prioritization().await;
        let err = engine.move_value_to("peace", 0).await.unwrap_err();
        assert!(matches!(err, WizardError::UnknownValueId { .. }));
    }

    #[tokio::test]
    async fn move_value_to_clamps_target() {
        let mut engine = at_prioritization().await;
        assert_eq!(engine.move_value_to("honesty", 99).await.unwrap(), 3);
        assert_eq!(engine.state().prioritized_values[3], "honesty");
    }

    #[tokio::test]
    async fn reorder_only_during_prioritization() {
        let mut engine = at_selection().await;
        assert!(matches!(
            engine.move_value_up(1).await,
            Err(WizardError::WrongStep { .. })
        ));
    }

    #[tokio::test]
    async fn back_to_selection_keeps_ranking_and_reconciles() {
        let mut engine = at_prioritization().await;
        engine.move_value_to("courage", 0).await.unwrap();

        assert_eq!(engine.previous_step().await.unwrap(), StepId::Selection);
        assert_eq!(engine.state().prioritized_values[0], "courage");

        engine.toggle_value("family").await.unwrap();
        engine.toggle_value("humor").await.unwrap();
        engine.next_step().await.unwrap();

        assert_eq!(
            engine.state().prioritized_values,
            ["courage", "honesty", "growth", "humor"]
        );
    }

    #[tokio::test]
    async fn reflection_requires_ranked_value() {
        let mut engine = at_reflection().await;
        let err = engine.update_reflection("peace", "hi").await.unwrap_err();
        assert!(matches!(err, WizardError::UnknownValueId { .. }));
    }

    #[tokio::test]
    async fn reflection_upserts_truncates_and_clears() {
        let mut engine = at_reflection().await;

        let update = engine.update_reflection("honesty", "first").await.unwrap();
        assert!(!update.truncated);
        engine.update_reflection("honesty", "second").await.unwrap();
        assert_eq!(engine.state().reflections.get("honesty"), Some("second"));

        let long = "é".repeat(30);
        let update = engine.update_reflection("family", &long).await.unwrap();
        assert!(update.truncated);
        assert_eq!(update.stored_chars, 20);
        assert_eq!(engine.state().reflections.get("family").unwrap().chars().count(), 20);

        let update = engine.update_reflection("honesty", "   ").await.unwrap();
        assert!(update.cleared);
        assert!(engine.state().reflections.get("honesty").is_none());
    }

    #[tokio::test]
    async fn reflection_is_optional() {
        let mut engine = at_reflection().await;
        assert!(engine.can_advance());
        assert_eq!(engine.next_step().await.unwrap(), StepId::Results);
        assert!(engine.state().metadata.completed_at.is_some());
    }

    #[tokio::test]
    async fn back_navigation_preserves_reflections() {
        let mut engine = at_reflection().await;
        engine.update_reflection("honesty", "matters").await.unwrap();
        engine.update_reflection("family", "most").await.unwrap();

        engine.previous_step().await.unwrap();
        assert_eq!(engine.current_step(), StepId::Prioritization);
        engine.next_step().await.unwrap();

        assert_eq!(engine.current_step(), StepId::Reflection);
        assert_eq!(engine.state().reflections.get("honesty"), Some("matters"));
        assert_eq!(engine.state().reflections.get("family"), Some("most"));
    }

    #[tokio::test]
    async fn results_is_terminal_and_introduction_has_no_previous() {
        let mut engine = test_engine();
        let err = engine.previous_step().await.unwrap_err();
        assert_eq!(err.blocker(), Some(&AdvanceBlocker::Initial));

        let mut engine = at_reflection().await;
        engine.next_step().await.unwrap();
        assert!(!engine.can_advance());
        let err = engine.next_step().await.unwrap_err();
        assert_eq!(err.blocker(), Some(&AdvanceBlocker::Terminal));
        assert_eq!(engine.current_step(), StepId::Results);
    }

    #[tokio::test]
    async fn every_mutation_is_persisted() {
        let store = Arc::new(MemoryStore::new());
        let mut engine = engine_with(store.clone());
        engine.next_step().await.unwrap();
        engine.toggle_value("honesty").await.unwrap();
        engine.save_progress().await.unwrap();

        let stored = store.load_all().await.unwrap().unwrap();
        assert_eq!(stored.assessment.current_step, StepId::Selection);
        assert_eq!(stored.assessment.selected_values, ["honesty"]);
    }

    #[tokio::test]
    async fn failed_write_keeps_memory_state_and_surfaces_on_save() {
        let store = Arc::new(FlakyStore::default());
        let mut engine = engine_with(store.clone());
        engine.next_step().await.unwrap();

        store.set_failing(true);
        assert!(engine.toggle_value("honesty").await.unwrap());
        assert_eq!(engine.state().selected_values, ["honesty"]);

        let err = engine.save_progress().await.unwrap_err();
        assert!(matches!(err, WizardError::PersistenceFailed(_)));
        assert!(engine.persistence_error().is_some());
        assert!(engine.view().persistence_error.is_some());

        store.set_failing(false);
        engine.save_progress().await.unwrap();
        engine.save_progress().await.unwrap();
        assert!(engine.persistence_error().is_none());
        let stored = store.load_all().await.unwrap().unwrap();
        assert_eq!(stored.assessment.selected_values, ["honesty"]);
    }

    #[tokio::test]
    async fn view_reports_guards() {
        let mut engine = at_selection().await;
        engine.toggle_value("honesty").await.unwrap();

        let view = engine.view();
        assert_eq!(view.step_index, 1);
        assert_eq!(view.step_count, 5);
        assert!(!view.can_advance);
        assert_eq!(
            view.blocked_by,
            Some(AdvanceBlocker::BelowMinimum { selected: 1, min: 3 })
        );
        assert_eq!(view.capacity_remaining, 4);
    }

    #[tokio::test]
    async fn reflection_targets_are_top_ranked() {
        let engine = at_reflection().await;
        let targets: Vec<String> = engine.reflection_targets().into_iter().map(|v| v.id).collect();
        assert_eq!(targets, &IDS[..3]);
    }

    #[tokio::test]
    async fn finalize_exports_and_archives() {
        let store = Arc::new(MemoryStore::new());
        let mut engine = engine_with(store.clone());
        engine.next_step().await.unwrap();
        for id in &IDS[..3] {
            engine.toggle_value(id).await.unwrap();
        }
        engine.next_step().await.unwrap();
        engine.next_step().await.unwrap();
        engine.update_reflection("family", "roots").await.unwrap();

        assert!(engine.finalize(&MarkdownExporter).await.is_err());

        engine.next_step().await.unwrap();
        let report = engine.finalize(&MarkdownExporter).await.unwrap();
        assert!(report.contains("Family"));
        assert!(report.contains("roots"));

        engine.save_progress().await.unwrap();
        let stored = store.load_all().await.unwrap().unwrap();
        assert!(stored.assessment.metadata.archived_at.is_some());
    }

    #[tokio::test]
    async fn mutations_do_not_wait_for_a_stalled_store() {
        let mut engine = engine_with(Arc::new(HangingStore));

        let walk = async {
            engine.next_step().await.unwrap();
            for id in &IDS[..3] {
                engine.toggle_value(id).await.unwrap();
            }
            engine.next_step().await.unwrap();
            engine.move_value_down(0).await.unwrap();
        };
        tokio::time::timeout(std::time::Duration::from_secs(1), walk)
            .await
            .expect("mutations waited on the store");
        assert_eq!(engine.current_step(), StepId::Prioritization);

        // Only an explicit save waits for the write.
        let save = tokio::time::timeout(
            std::time::Duration::from_millis(50),
            engine.save_progress(),
        )
        .await;
        assert!(save.is_err());
    }

    #[tokio::test]
    async fn reset_starts_over() {
        let store = Arc::new(MemoryStore::new());
        let mut engine = engine_with(store.clone());
        engine.next_step().await.unwrap();
        engine.toggle_value("honesty").await.unwrap();
        let old_id = engine.state().metadata.assessment_id;

        engine.reset().await.unwrap();
        assert_eq!(engine.current_step(), StepId::Introduction);
        assert!(engine.state().selected_values.is_empty());
        assert_ne!(engine.state().metadata.assessment_id, old_id);
        assert!(store.load_all().await.unwrap().is_none());
    }
}
