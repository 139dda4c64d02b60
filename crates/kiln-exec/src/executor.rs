//! Level-barrier scheduler.
//!
//! Each level of the [`ExecutionPlan`] is dispatched to tokio tasks bounded
//! by a semaphore, and every task of a level is awaited before the next
//! level starts. When a node errors or fails, its scheduled descendants are
//! recorded as skipped before their level is dispatched, so the adapter
//! never sees them.

use crate::compile::CompiledManifest;
use crate::error::{ExecError, ExecResult};
use crate::hooks::run_hooks;
use crate::plan::ExecutionPlan;
use crate::runner::NodeRunner;
use chrono::{DateTime, Utc};
use kiln_core::{
    Config, Event, EventSink, HookPhase, Node, QuotePolicy, ResultCollector, RunReport,
    RunResult, RunStatus, UniqueId,
};
use kiln_db::Adapter;
use std::collections::{BTreeSet, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Settings for one run.
#[derive(Debug, Clone, PartialEq)]
pub struct RunOptions {
    pub project_name: String,
    pub invocation_id: String,
    /// Maximum nodes executing at once
    pub threads: usize,
    /// Stop dispatching after the first error or failure
    pub fail_fast: bool,
    pub quoting: QuotePolicy,
    pub on_run_start: Vec<String>,
    pub on_run_end: Vec<String>,
}

impl RunOptions {
    pub fn from_config(config: &Config, invocation_id: impl Into<String>) -> Self {
        Self {
            project_name: config.name.clone(),
            invocation_id: invocation_id.into(),
            threads: config.threads,
            fail_fast: config.fail_fast,
            quoting: config.quoting,
            on_run_start: config.on_run_start.clone(),
            on_run_end: config.on_run_end.clone(),
        }
    }
}

/// Runs compiled manifests against an adapter.
pub struct Executor {
    adapter: Arc<dyn Adapter>,
    events: Arc<dyn EventSink>,
    options: RunOptions,
    cancel: CancellationToken,
}

/// Outcome of the model levels, before on-run-end.
struct LevelsOutcome {
    results: Vec<RunResult>,
    stopped: Option<String>,
}

/// State shared by the tasks of a run.
struct Worker {
    runner: NodeRunner,
    permits: Semaphore,
    events: Arc<dyn EventSink>,
    cancel: CancellationToken,
    /// Set by the first failure when fail_fast is on
    halt: AtomicBool,
    fail_fast: bool,
}

impl Worker {
    async fn execute(self: Arc<Self>, node: Node) -> ExecResult<RunResult> {
        let _permit = match self.permits.acquire().await {
            Ok(permit) => permit,
            Err(_) => return Ok(RunResult::skipped(node.unique_id, None)),
        };
        if self.cancel.is_cancelled() || self.halt.load(Ordering::SeqCst) {
            self.events.emit(Event::NodeSkipped {
                node_id: node.unique_id.clone(),
                cause: None,
            });
            return Ok(RunResult::skipped(node.unique_id, None));
        }

        self.events.emit(Event::NodeStarted {
            node_id: node.unique_id.clone(),
        });
        self.events.emit(Event::NodeExecuting {
            node_id: node.unique_id.clone(),
        });
        let result = self.runner.run(&node).await?;
        if self.fail_fast && result.status.is_failure() {
            self.halt.store(true, Ordering::SeqCst);
        }
        self.events.emit(Event::NodeFinished {
            result: result.clone(),
        });
        Ok(result)
    }
}

impl Executor {
    pub fn new(
        adapter: Arc<dyn Adapter>,
        events: Arc<dyn EventSink>,
        options: RunOptions,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            adapter,
            events,
            options,
            cancel,
        }
    }

    /// Run `selected` and everything it needs.
    ///
    /// Returns `Err` for invalid selections and for internal failures; the
    /// latter stop the run after the current level, without on-run-end.
    pub async fn run(&self, compiled: &CompiledManifest, selected: &[UniqueId]) -> ExecResult<RunReport> {
        let started_at = Utc::now();
        let clock = Instant::now();
        let plan = ExecutionPlan::build(&compiled.manifest, &compiled.graph, selected)?;

        self.events.emit(Event::RunStarted {
            invocation_id: self.options.invocation_id.clone(),
            node_count: plan.len(),
            threads: self.options.threads,
        });

        if let Err(e) = self.create_schemas(compiled, &plan).await {
            if e.is_internal() {
                return Err(e);
            }
            log::error!("Could not create schemas: {}", e);
            let collector = ResultCollector::new();
            for id in plan.order() {
                self.skip(&collector, id, None);
            }
            let results = collector.take_ordered(plan.order());
            return Ok(self.finish(started_at, clock, results, Some(e.to_string())));
        }

        let env = compiled.environment();
        let start_results = run_hooks(
            HookPhase::OnRunStart,
            &self.options.on_run_start,
            &self.options.project_name,
            env,
            self.adapter.as_ref(),
            self.events.as_ref(),
        )
        .await?;
        if let Some(failed) = start_results.iter().find(|r| r.status.is_failure()) {
            let reason = format!("on-run-start hook {} failed", failed.node_id);
            return Ok(self.finish(started_at, clock, start_results, Some(reason)));
        }

        let levels = self.run_levels(compiled, &plan).await?;

        let end_results = run_hooks(
            HookPhase::OnRunEnd,
            &self.options.on_run_end,
            &self.options.project_name,
            env,
            self.adapter.as_ref(),
            self.events.as_ref(),
        )
        .await?;

        let mut results = start_results;
        results.extend(levels.results);
        results.extend(end_results);
        Ok(self.finish(started_at, clock, results, levels.stopped))
    }

    async fn create_schemas(&self, compiled: &CompiledManifest, plan: &ExecutionPlan) -> ExecResult<()> {
        let schemas: BTreeSet<(&str, &str)> = plan
            .order()
            .iter()
            .filter_map(|id| compiled.manifest.get(id))
            .map(|node| (node.database.as_str(), node.schema.as_str()))
            .collect();
        for (database, schema) in schemas {
            log::debug!("Creating schema if not exists: {}.{}", database, schema);
            self.adapter.create_schema(database, schema).await?;
        }
        Ok(())
    }

    async fn run_levels(&self, compiled: &CompiledManifest, plan: &ExecutionPlan) -> ExecResult<LevelsOutcome> {
        let collector = ResultCollector::new();
        let worker = Arc::new(Worker {
            runner: NodeRunner::new(
                Arc::clone(&self.adapter),
                Arc::clone(compiled.environment()),
                self.options.quoting,
            ),
            permits: Semaphore::new(self.options.threads.max(1)),
            events: Arc::clone(&self.events),
            cancel: self.cancel.clone(),
            halt: AtomicBool::new(false),
            fail_fast: self.options.fail_fast,
        });
        // skipped node -> the failed node that caused it
        let mut skipped: HashMap<UniqueId, UniqueId> = HashMap::new();
        let mut stopped: Option<String> = None;

        for (level_index, level) in plan.levels().iter().enumerate() {
            if stopped.is_none() && self.cancel.is_cancelled() {
                stopped = Some("run cancelled".to_string());
            }
            if stopped.is_some() {
                for id in level {
                    self.skip(&collector, id, skipped.get(id));
                }
                continue;
            }

            self.events.emit(Event::LevelStarted {
                level: level_index,
                size: level.len(),
            });
            let watcher = self.watch_cancellation();
            let mut internal: Option<ExecError> = None;
            let mut finished: Vec<RunResult> = Vec::new();
            let mut handles: Vec<(UniqueId, JoinHandle<ExecResult<RunResult>>)> = Vec::new();

            for id in level {
                if let Some(cause) = skipped.get(id) {
                    self.skip(&collector, id, Some(cause));
                    continue;
                }
                if let Some(err) = compiled.failure(id) {
                    let result = RunResult::new(id.clone(), RunStatus::Error)
                        .with_message(err.to_string());
                    self.events.emit(Event::NodeFinished {
                        result: result.clone(),
                    });
                    finished.push(result);
                    continue;
                }
                let node = match compiled.manifest.expect_node(id) {
                    Ok(node) => node.clone(),
                    Err(e) => {
                        internal = Some(ExecError::Internal(e.to_string()));
                        break;
                    }
                };

                let handle = tokio::spawn(Arc::clone(&worker).execute(node));
                handles.push((id.clone(), handle));
            }

            // Barrier: the whole level finishes before anything else happens.
            for (id, handle) in handles {
                let failure = match handle.await {
                    Ok(Ok(result)) => {
                        finished.push(result);
                        continue;
                    }
                    Ok(Err(e)) => e,
                    Err(join) => ExecError::Internal(format!("worker for {} panicked: {}", id, join)),
                };
                finished.push(RunResult::new(id, RunStatus::Error).with_message(failure.to_string()));
                internal.get_or_insert(failure);
            }
            watcher.abort();

            for result in finished {
                if result.status.is_failure() {
                    for descendant in plan.descendants(&compiled.graph, &result.node_id) {
                        skipped
                            .entry(descendant)
                            .or_insert_with(|| result.node_id.clone());
                    }
                    if self.options.fail_fast && stopped.is_none() {
                        stopped = Some(format!("stopped after {} failed (fail_fast)", result.node_id));
                    }
                }
                collector.push(result);
            }

            if let Some(err) = internal {
                log::error!("Aborting run after level {}: {}", level_index, err);
                return Err(err);
            }
            if stopped.is_none() && self.cancel.is_cancelled() {
                stopped = Some("run cancelled".to_string());
            }
        }

        Ok(LevelsOutcome {
            results: collector.take_ordered(plan.order()),
            stopped,
        })
    }

    fn skip(&self, collector: &ResultCollector, id: &UniqueId, cause: Option<&UniqueId>) {
        self.events.emit(Event::NodeSkipped {
            node_id: id.clone(),
            cause: cause.cloned(),
        });
        collector.push(RunResult::skipped(id.clone(), cause));
    }

    /// Interrupt the adapter as soon as the run is cancelled.
    fn watch_cancellation(&self) -> JoinHandle<()> {
        let token = self.cancel.clone();
        let adapter = Arc::clone(&self.adapter);
        tokio::spawn(async move {
            token.cancelled().await;
            log::warn!("Run cancelled; interrupting in-flight statements");
            adapter.cancel();
        })
    }

    fn finish(
        &self,
        started_at: DateTime<Utc>,
        clock: Instant,
        results: Vec<RunResult>,
        aborted: Option<String>,
    ) -> RunReport {
        let elapsed = clock.elapsed().as_secs_f64();
        let report = RunReport::new(
            self.options.invocation_id.clone(),
            started_at,
            elapsed,
            results,
            aborted,
        );
        self.events.emit(Event::RunFinished {
            summary: report.summary,
            elapsed,
        });
        report
    }
}
