//! Batch scheduler — runs many conversation orchestrators under a
//! concurrency cap.
//!
//! Each submitted scenario becomes one admission task: it waits for a
//! semaphore slot (suspending, never busy-waiting), drives one session to
//! a terminal status inside a failure-isolating wrapper, scores the
//! transcript, and reports the result exactly once. Admission follows
//! submission order; completion order is unconstrained. One scenario's
//! failure never aborts its siblings — only infrastructure faults fail a
//! batch call.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use dashmap::DashMap;
use parking_lot::Mutex;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, instrument, warn};

use parley_core::agents::AgentGraph;
use parley_core::batch::{BatchRecord, BatchStatus, Evaluation, ScenarioResult};
use parley_core::config::SimulationConfig;
use parley_core::ids::BatchId;
use parley_core::scenario::Scenario;
use parley_core::session::{Session, SessionStatus};
use parley_llm::evaluator::Evaluator;
use parley_llm::invoker::ToolInvoker;
use parley_llm::provider::CompletionProvider;
use parley_store::store::BatchStore;

use crate::errors::SchedulerError;
use crate::orchestrator::conversation::ConversationOrchestrator;
use crate::scheduler::progress::ProgressTracker;

/// Consistent point-in-time view of a batch for status polling.
#[derive(Clone, Debug, PartialEq, serde::Serialize)]
pub struct BatchStatusView {
    /// Batch status.
    pub status: BatchStatus,
    /// Completion percentage.
    pub progress: f64,
    /// Total scenario count.
    pub total: u32,
    /// Scenarios recorded as terminal.
    pub completed: u32,
    /// Scenarios recorded as failed.
    pub failed: u32,
}

/// Final outcome of one executed batch.
#[derive(Clone, Debug, serde::Serialize)]
pub struct BatchSummary {
    /// Batch ID.
    pub batch_id: BatchId,
    /// Terminal batch status.
    pub status: BatchStatus,
    /// Total scenario count.
    pub total: u32,
    /// Scenarios that did not fail.
    pub succeeded: u32,
    /// Scenarios that failed.
    pub failed: u32,
    /// Wall-clock execution time.
    pub duration: Duration,
    /// Per-scenario results.
    pub results: Vec<ScenarioResult>,
}

/// Mutable batch state behind the job's single-writer lock.
struct JobState {
    record: BatchRecord,
    /// Per-scenario recorded flags, keyed by submission index. Guarantees
    /// exactly-once result accounting even if an admission task dies
    /// mid-report and the join path records on its behalf.
    recorded: Vec<bool>,
}

/// One live batch.
struct BatchJob {
    progress: ProgressTracker,
    state: Mutex<JobState>,
    cancel: CancellationToken,
}

impl BatchJob {
    fn from_record(record: BatchRecord) -> Self {
        let total = record.total;
        let mut recorded = vec![false; total as usize];
        // Results loaded from a snapshot are only visible, never resumed;
        // flag their slots so a stray execute cannot double count.
        for slot in recorded.iter_mut().take(record.results.len()) {
            *slot = true;
        }
        Self {
            progress: ProgressTracker::new(total),
            state: Mutex::new(JobState { record, recorded }),
            cancel: CancellationToken::new(),
        }
    }

    /// Record one scenario result exactly once and persist a snapshot.
    fn record_result(&self, index: usize, result: ScenarioResult, store: &BatchStore) {
        let snapshot = {
            let mut state = self.state.lock();
            if state.recorded.get(index).copied().unwrap_or(true) {
                warn!(index, "duplicate scenario result ignored");
                return;
            }
            state.recorded[index] = true;
            let failed = result.status.is_failure();
            let (completed, failed_total) = self.progress.record(failed);
            state.record.completed = completed;
            state.record.failed = failed_total;
            state.record.results.push(result);
            if self.progress.is_complete() {
                state.record.status = BatchStatus::Completed;
                state.record.completed_at = Some(Utc::now());
            }
            state.record.clone()
        };
        metrics::counter!("parley_scenarios_completed").increment(1);
        if let Err(e) = store.save(&snapshot) {
            error!(batch_id = %snapshot.batch_id, error = %e, "failed to persist batch snapshot");
        }
    }

    fn status_view(&self) -> BatchStatusView {
        let state = self.state.lock();
        BatchStatusView {
            status: state.record.status,
            progress: state.record.progress(),
            total: state.record.total,
            completed: state.record.completed,
            failed: state.record.failed,
        }
    }
}

/// Runs batches of scenarios over one agent graph.
pub struct BatchScheduler {
    graph: Arc<AgentGraph>,
    config: SimulationConfig,
    provider: Arc<dyn CompletionProvider>,
    invoker: Arc<dyn ToolInvoker>,
    evaluator: Arc<dyn Evaluator>,
    store: Arc<BatchStore>,
    jobs: DashMap<BatchId, Arc<BatchJob>>,
}

impl BatchScheduler {
    /// Create a scheduler over the given graph and collaborators.
    #[must_use]
    pub fn new(
        graph: AgentGraph,
        config: SimulationConfig,
        provider: Arc<dyn CompletionProvider>,
        invoker: Arc<dyn ToolInvoker>,
        evaluator: Arc<dyn Evaluator>,
        store: Arc<BatchStore>,
    ) -> Self {
        Self {
            graph: Arc::new(graph),
            config,
            provider,
            invoker,
            evaluator,
            store,
            jobs: DashMap::new(),
        }
    }

    /// Load persisted batches into the catalog for status visibility.
    ///
    /// Batches that were running at crash time come back as-is and read as
    /// incomplete; they are not resumed. Returns the number loaded.
    pub fn load_catalog(&self) -> Result<usize, SchedulerError> {
        let records = self.store.load_all()?;
        let count = records.len();
        for record in records {
            let id = record.batch_id.clone();
            let _ = self.jobs.insert(id, Arc::new(BatchJob::from_record(record)));
        }
        info!(count, "loaded batch catalog from store");
        Ok(count)
    }

    /// Create a batch job and persist its first snapshot.
    #[instrument(skip_all, fields(scenarios = scenarios.len(), concurrency))]
    pub fn submit(
        &self,
        scenarios: Vec<Scenario>,
        concurrency: usize,
    ) -> Result<BatchId, SchedulerError> {
        let record = BatchRecord::new(scenarios, concurrency.max(1));
        let batch_id = record.batch_id.clone();
        self.store.save(&record)?;
        let _ = self
            .jobs
            .insert(batch_id.clone(), Arc::new(BatchJob::from_record(record)));
        info!(%batch_id, "batch submitted");
        Ok(batch_id)
    }

    /// Run every scenario in the batch and return once all are terminal.
    #[instrument(skip(self), fields(batch_id = %batch_id))]
    pub async fn execute(&self, batch_id: &BatchId) -> Result<BatchSummary, SchedulerError> {
        let job = self.job(batch_id)?;

        let (scenarios, concurrency) = {
            let mut state = job.state.lock();
            if state.record.status != BatchStatus::Created {
                return Err(SchedulerError::BatchNotRunnable {
                    batch_id: batch_id.to_string(),
                    status: state.record.status.to_string(),
                });
            }
            state.record.status = BatchStatus::Running;
            state.record.started_at = Some(Utc::now());
            (state.record.scenarios.clone(), state.record.concurrency)
        };
        job.progress.mark_started();
        self.persist(&job);

        let started = Instant::now();
        let semaphore = Arc::new(Semaphore::new(concurrency));

        // Spawn in submission order; the semaphore admits in that order.
        let mut handles: Vec<(usize, String, JoinHandle<()>)> = Vec::new();
        for (index, scenario) in scenarios.into_iter().enumerate() {
            let name = scenario.name.clone();
            let task = ScenarioTask {
                index,
                scenario,
                job: Arc::clone(&job),
                graph: Arc::clone(&self.graph),
                config: self.config.clone(),
                provider: Arc::clone(&self.provider),
                invoker: Arc::clone(&self.invoker),
                evaluator: Arc::clone(&self.evaluator),
                store: Arc::clone(&self.store),
                semaphore: Arc::clone(&semaphore),
            };
            handles.push((index, name, tokio::spawn(task.run())));
        }

        for (index, name, handle) in handles {
            if let Err(join_error) = handle.await {
                // A panicking scenario must not poison the batch: convert
                // it into a structured error result.
                error!(index, scenario = %name, error = %join_error, "scenario task died");
                job.record_result(index, panicked_result(&name, &join_error), &self.store);
            }
        }

        let summary = {
            let mut state = job.state.lock();
            state.record.status = BatchStatus::Completed;
            if state.record.completed_at.is_none() {
                state.record.completed_at = Some(Utc::now());
            }
            BatchSummary {
                batch_id: state.record.batch_id.clone(),
                status: state.record.status,
                total: state.record.total,
                succeeded: state.record.total - state.record.failed,
                failed: state.record.failed,
                duration: started.elapsed(),
                results: state.record.results.clone(),
            }
        };
        self.persist(&job);
        info!(
            total = summary.total,
            succeeded = summary.succeeded,
            failed = summary.failed,
            duration_ms = summary.duration.as_millis() as u64,
            "batch completed"
        );
        Ok(summary)
    }

    /// Consistent status snapshot for polling.
    pub fn status(&self, batch_id: &BatchId) -> Result<BatchStatusView, SchedulerError> {
        Ok(self.job(batch_id)?.status_view())
    }

    /// Per-scenario results recorded so far.
    pub fn results(&self, batch_id: &BatchId) -> Result<Vec<ScenarioResult>, SchedulerError> {
        let job = self.job(batch_id)?;
        let state = job.state.lock();
        Ok(state.record.results.clone())
    }

    /// Trip the batch's cancel signal. In-flight sessions terminate with a
    /// cancelled error and keep their partial history; already-recorded
    /// results are untouched. Returns whether the batch was running.
    pub fn cancel(&self, batch_id: &BatchId) -> Result<bool, SchedulerError> {
        let job = self.job(batch_id)?;
        let running = job.state.lock().record.status == BatchStatus::Running;
        if running {
            warn!(%batch_id, "batch cancel requested");
            job.cancel.cancel();
        }
        Ok(running)
    }

    fn job(&self, batch_id: &BatchId) -> Result<Arc<BatchJob>, SchedulerError> {
        self.jobs
            .get(batch_id)
            .map(|entry| Arc::clone(entry.value()))
            .ok_or_else(|| SchedulerError::BatchNotFound(batch_id.to_string()))
    }

    fn persist(&self, job: &BatchJob) {
        let snapshot = job.state.lock().record.clone();
        if let Err(e) = self.store.save(&snapshot) {
            error!(batch_id = %snapshot.batch_id, error = %e, "failed to persist batch snapshot");
        }
    }
}

/// Everything one admission task needs, bundled so the spawn site stays
/// readable.
struct ScenarioTask {
    index: usize,
    scenario: Scenario,
    job: Arc<BatchJob>,
    graph: Arc<AgentGraph>,
    config: SimulationConfig,
    provider: Arc<dyn CompletionProvider>,
    invoker: Arc<dyn ToolInvoker>,
    evaluator: Arc<dyn Evaluator>,
    store: Arc<BatchStore>,
    semaphore: Arc<Semaphore>,
}

impl ScenarioTask {
    async fn run(self) {
        // Suspends until a slot frees up. The permit is released by drop on
        // every exit path, normal or not.
        let permit = match Arc::clone(&self.semaphore).acquire_owned().await {
            Ok(permit) => permit,
            Err(e) => {
                self.job.record_result(
                    self.index,
                    infra_failure_result(&self.scenario.name, &format!("no worker capacity: {e}")),
                    &self.store,
                );
                return;
            }
        };
        let _permit = permit;

        metrics::gauge!("parley_sessions_active").increment(1.0);
        let started = Instant::now();
        let session = self.drive_session().await;
        metrics::gauge!("parley_sessions_active").decrement(1.0);

        let evaluation = self.evaluate(&session).await;
        let result = ScenarioResult {
            scenario: self.scenario.name.clone(),
            session_id: session.id.clone(),
            status: session.status,
            turn_count: session.turn_count,
            duration_ms: started.elapsed().as_millis() as u64,
            failure: session.failure.clone(),
            evaluation,
            messages: session.messages,
        };
        self.job.record_result(self.index, result, &self.store);
    }

    async fn drive_session(&self) -> Session {
        match ConversationOrchestrator::start(
            &self.scenario,
            &self.graph,
            Arc::clone(&self.provider),
            Arc::clone(&self.invoker),
            self.config.clone(),
            self.job.cancel.child_token(),
        ) {
            Ok(orchestrator) => orchestrator.run().await,
            Err(graph_error) => {
                warn!(
                    scenario = %self.scenario.name,
                    error = %graph_error,
                    "scenario rejected before start"
                );
                let mut session = Session::new(self.scenario.name.clone(), self.graph.entry.clone());
                session.finish(SessionStatus::Error, Some(graph_error.to_string()));
                session
            }
        }
    }

    /// Score transcripts that are scoreable; failed sessions get the floor
    /// score so no result ever lacks an explanation.
    async fn evaluate(&self, session: &Session) -> Option<Evaluation> {
        if session.status.is_failure() {
            return Some(Evaluation {
                score: 1,
                comment: format!(
                    "session not completed: {}",
                    session.failure.as_deref().unwrap_or("unknown failure")
                ),
            });
        }
        match self.evaluator.score(session).await {
            Ok(evaluation) => Some(evaluation),
            Err(e) => {
                warn!(session_id = %session.id, error = %e, "evaluation failed");
                None
            }
        }
    }
}

fn infra_failure_result(scenario: &str, message: &str) -> ScenarioResult {
    ScenarioResult {
        scenario: scenario.to_owned(),
        session_id: parley_core::ids::SessionId::new(),
        status: SessionStatus::Error,
        turn_count: 0,
        duration_ms: 0,
        failure: Some(message.to_owned()),
        evaluation: Some(Evaluation {
            score: 1,
            comment: format!("session not completed: {message}"),
        }),
        messages: Vec::new(),
    }
}

fn panicked_result(scenario: &str, join_error: &tokio::task::JoinError) -> ScenarioResult {
    infra_failure_result(scenario, &format!("scenario task panicked: {join_error}"))
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use parley_core::agents::{AgentDefinition, CLIENT_ROLE};
    use parley_llm::emulator::ToolEmulator;
    use parley_llm::evaluator::FixedEvaluator;
    use parley_llm::script::{ScriptedFailure, ScriptedProvider, ScriptedStep};
    use parley_store::connection::{ConnectionConfig, new_in_memory};
    use parley_store::migrations::run_migrations;
    use serde_json::json;

    fn graph() -> AgentGraph {
        AgentGraph::new(
            [
                AgentDefinition::new(CLIENT_ROLE, "You are a customer."),
                AgentDefinition::new("sales", "Sell things.").with_tool("get_cart"),
            ],
            "sales",
        )
        .unwrap()
    }

    fn store() -> Arc<BatchStore> {
        let pool = new_in_memory(&ConnectionConfig::default()).unwrap();
        {
            let conn = pool.get().unwrap();
            let _ = run_migrations(&conn).unwrap();
        }
        Arc::new(BatchStore::new(pool))
    }

    fn scheduler_with(provider: ScriptedProvider, store: Arc<BatchStore>) -> BatchScheduler {
        BatchScheduler::new(
            graph(),
            SimulationConfig::default(),
            Arc::new(provider),
            Arc::new(ToolEmulator::new().with_tool("get_cart", json!({"items": []}))),
            Arc::new(FixedEvaluator::new(3, "fine")),
            store,
        )
    }

    fn chatty_provider() -> ScriptedProvider {
        ScriptedProvider::new()
            .with_script(
                CLIENT_ROLE,
                [ScriptedStep::text("hello"), ScriptedStep::text("bye, end_call")],
            )
            .with_script("sales", [ScriptedStep::text("welcome")])
    }

    fn scenarios(n: usize) -> Vec<Scenario> {
        (0..n).map(|i| Scenario::named(format!("scenario-{i}"))).collect()
    }

    #[tokio::test]
    async fn submit_creates_and_persists_created_batch() {
        let store = store();
        let scheduler = scheduler_with(chatty_provider(), Arc::clone(&store));
        let batch_id = scheduler.submit(scenarios(3), 2).unwrap();

        let view = scheduler.status(&batch_id).unwrap();
        assert_eq!(view.status, BatchStatus::Created);
        assert_eq!(view.total, 3);
        assert_eq!(view.completed, 0);

        let persisted = store.load(&batch_id).unwrap().unwrap();
        assert_eq!(persisted.status, BatchStatus::Created);
    }

    #[tokio::test]
    async fn execute_runs_all_scenarios_to_completion() {
        let store = store();
        let scheduler = scheduler_with(chatty_provider(), Arc::clone(&store));
        let batch_id = scheduler.submit(scenarios(5), 2).unwrap();

        let summary = scheduler.execute(&batch_id).await.unwrap();
        assert_eq!(summary.status, BatchStatus::Completed);
        assert_eq!(summary.total, 5);
        assert_eq!(summary.succeeded + summary.failed, 5);
        assert_eq!(summary.failed, 0);
        assert_eq!(summary.results.len(), 5);
        for result in &summary.results {
            assert_eq!(result.status, SessionStatus::Completed);
            assert_eq!(result.evaluation.as_ref().unwrap().score, 3);
        }

        let view = scheduler.status(&batch_id).unwrap();
        assert_eq!(view.status, BatchStatus::Completed);
        assert!((view.progress - 100.0).abs() < f64::EPSILON);

        let persisted = store.load(&batch_id).unwrap().unwrap();
        assert_eq!(persisted.status, BatchStatus::Completed);
        assert_eq!(persisted.results.len(), 5);
    }

    #[tokio::test]
    async fn execute_unknown_batch_errors() {
        let scheduler = scheduler_with(chatty_provider(), store());
        let err = scheduler.execute(&BatchId::from("missing")).await.unwrap_err();
        assert_matches!(err, SchedulerError::BatchNotFound(_));
    }

    #[tokio::test]
    async fn execute_twice_is_not_runnable() {
        let scheduler = scheduler_with(chatty_provider(), store());
        let batch_id = scheduler.submit(scenarios(1), 1).unwrap();
        let _ = scheduler.execute(&batch_id).await.unwrap();

        let err = scheduler.execute(&batch_id).await.unwrap_err();
        assert_matches!(err, SchedulerError::BatchNotRunnable { .. });
    }

    #[tokio::test]
    async fn geo_blocked_scenario_counts_failed_but_batch_completes() {
        let provider = ScriptedProvider::new()
            .with_script(CLIENT_ROLE, [ScriptedStep::Fail(ScriptedFailure::GeoBlocked)]);
        let scheduler = scheduler_with(provider, store());
        let batch_id = scheduler.submit(scenarios(1), 1).unwrap();

        let summary = scheduler.execute(&batch_id).await.unwrap();
        assert_eq!(summary.status, BatchStatus::Completed);
        assert_eq!(summary.failed, 1);
        assert_eq!(summary.results[0].status, SessionStatus::Blocked);
        assert_eq!(summary.results[0].evaluation.as_ref().unwrap().score, 1);
    }

    /// Routes completions to one of two scripts depending on a marker the
    /// scenario variables rendered into the prompts.
    struct ModalProvider {
        broken: ScriptedProvider,
        normal: ScriptedProvider,
    }

    #[async_trait::async_trait]
    impl CompletionProvider for ModalProvider {
        async fn complete(
            &self,
            context: &parley_llm::provider::CompletionContext<'_>,
        ) -> Result<parley_llm::provider::CompletionReply, parley_llm::provider::ProviderError>
        {
            if context.system_prompt.contains("broken") {
                self.broken.complete(context).await
            } else {
                self.normal.complete(context).await
            }
        }
    }

    #[tokio::test]
    async fn misconfigured_handoff_does_not_affect_siblings() {
        let graph = AgentGraph::new(
            [
                AgentDefinition::new(CLIENT_ROLE, "You are a {{mode}} customer."),
                AgentDefinition::new("sales", "Sell things to a {{mode}} customer."),
            ],
            "sales",
        )
        .unwrap();
        let provider = ModalProvider {
            broken: ScriptedProvider::new()
                .with_script(CLIENT_ROLE, [ScriptedStep::text("hi")])
                .with_script("sales", [ScriptedStep::handoff("billing")]),
            normal: chatty_provider(),
        };
        let scheduler = BatchScheduler::new(
            graph,
            SimulationConfig::default(),
            Arc::new(provider),
            Arc::new(ToolEmulator::new()),
            Arc::new(FixedEvaluator::default()),
            store(),
        );
        let batch = vec![
            Scenario::named("bad-handoff").with_variable("mode", "broken"),
            Scenario::named("sibling-1").with_variable("mode", "regular"),
            Scenario::named("sibling-2").with_variable("mode", "regular"),
        ];
        let batch_id = scheduler.submit(batch, 3).unwrap();

        let summary = scheduler.execute(&batch_id).await.unwrap();
        assert_eq!(summary.status, BatchStatus::Completed);
        assert_eq!(summary.failed, 1);
        assert_eq!(summary.succeeded, 2);

        let bad = summary
            .results
            .iter()
            .find(|r| r.scenario == "bad-handoff")
            .unwrap();
        assert_eq!(bad.status, SessionStatus::Error);
        assert!(bad.failure.as_ref().unwrap().contains("billing"));
        assert_eq!(bad.turn_count, 1);
        for sibling in summary.results.iter().filter(|r| r.scenario != "bad-handoff") {
            assert_eq!(sibling.status, SessionStatus::Completed);
        }
    }

    #[tokio::test]
    async fn cancel_before_running_reports_not_running() {
        let scheduler = scheduler_with(chatty_provider(), store());
        let batch_id = scheduler.submit(scenarios(1), 1).unwrap();
        assert!(!scheduler.cancel(&batch_id).unwrap());
    }

    #[tokio::test]
    async fn results_returns_recorded_outcomes() {
        let scheduler = scheduler_with(chatty_provider(), store());
        let batch_id = scheduler.submit(scenarios(2), 1).unwrap();
        let _ = scheduler.execute(&batch_id).await.unwrap();

        let results = scheduler.results(&batch_id).unwrap();
        assert_eq!(results.len(), 2);
        let mut names: Vec<&str> = results.iter().map(|r| r.scenario.as_str()).collect();
        names.sort_unstable();
        assert_eq!(names, ["scenario-0", "scenario-1"]);
    }

    #[tokio::test]
    async fn catalog_reload_shows_previous_batches() {
        let store = store();
        let batch_id = {
            let scheduler = scheduler_with(chatty_provider(), Arc::clone(&store));
            let batch_id = scheduler.submit(scenarios(2), 1).unwrap();
            let _ = scheduler.execute(&batch_id).await.unwrap();
            batch_id
        };

        // Fresh scheduler over the same store: catalog is visible again.
        let scheduler = scheduler_with(chatty_provider(), store);
        assert_eq!(scheduler.load_catalog().unwrap(), 1);
        let view = scheduler.status(&batch_id).unwrap();
        assert_eq!(view.status, BatchStatus::Completed);
        assert_eq!(view.completed, 2);
    }

    #[tokio::test]
    async fn reloaded_completed_batch_is_not_runnable() {
        let store = store();
        let batch_id = {
            let scheduler = scheduler_with(chatty_provider(), Arc::clone(&store));
            let batch_id = scheduler.submit(scenarios(1), 1).unwrap();
            let _ = scheduler.execute(&batch_id).await.unwrap();
            batch_id
        };

        let scheduler = scheduler_with(chatty_provider(), store);
        let _ = scheduler.load_catalog().unwrap();
        let err = scheduler.execute(&batch_id).await.unwrap_err();
        assert_matches!(err, SchedulerError::BatchNotRunnable { .. });
    }

    #[tokio::test]
    async fn empty_batch_completes_immediately() {
        let scheduler = scheduler_with(chatty_provider(), store());
        let batch_id = scheduler.submit(Vec::new(), 4).unwrap();
        let summary = scheduler.execute(&batch_id).await.unwrap();
        assert_eq!(summary.status, BatchStatus::Completed);
        assert_eq!(summary.total, 0);
        assert!(summary.results.is_empty());
    }
}
