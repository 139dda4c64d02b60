//! Per-node run results and their aggregation into a run report.

use crate::unique_id::UniqueId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::Mutex;

/// Terminal status of a node in a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Success,
    /// Test found failing rows but is configured with `severity: warn`
    Warn,
    /// Compilation or database error
    Error,
    /// Test found failing rows
    Fail,
    /// Not run because an upstream node failed or the run stopped
    Skipped,
}

impl RunStatus {
    /// Whether descendants of a node with this status are skipped.
    pub fn is_failure(self) -> bool {
        matches!(self, RunStatus::Error | RunStatus::Fail)
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RunStatus::Success => "success",
            RunStatus::Warn => "warn",
            RunStatus::Error => "error",
            RunStatus::Fail => "fail",
            RunStatus::Skipped => "skipped",
        };
        f.write_str(s)
    }
}

/// Outcome of one node (or hook) in a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunResult {
    pub node_id: UniqueId,
    pub status: RunStatus,
    /// None for nodes that never started
    pub started_at: Option<DateTime<Utc>>,
    /// Wall-clock seconds spent on the node
    pub elapsed: f64,
    pub message: Option<String>,
    /// Number of failing rows, for tests
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failures: Option<u64>,
}

impl RunResult {
    pub fn new(node_id: UniqueId, status: RunStatus) -> Self {
        Self {
            node_id,
            status,
            started_at: None,
            elapsed: 0.0,
            message: None,
            failures: None,
        }
    }

    /// A node that never ran because `cause` failed upstream.
    pub fn skipped(node_id: UniqueId, cause: Option<&UniqueId>) -> Self {
        let message = match cause {
            Some(cause) => format!("Skipped because upstream '{}' failed", cause),
            None => "Skipped because the run was stopped".to_string(),
        };
        Self::new(node_id, RunStatus::Skipped).with_message(message)
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    pub fn with_timing(mut self, started_at: DateTime<Utc>, elapsed: f64) -> Self {
        self.started_at = Some(started_at);
        self.elapsed = elapsed;
        self
    }
}

/// Collects results pushed concurrently by workers.
#[derive(Debug, Default)]
pub struct ResultCollector {
    results: Mutex<Vec<RunResult>>,
}

impl ResultCollector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, result: RunResult) {
        self.results
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .push(result);
    }

    pub fn len(&self) -> usize {
        self.results.lock().unwrap_or_else(|p| p.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drain the collected results, ordered by position in `order`.
    ///
    /// Results for ids absent from `order` keep their arrival order after
    /// the listed ones.
    pub fn take_ordered(&self, order: &[UniqueId]) -> Vec<RunResult> {
        let mut results =
            std::mem::take(&mut *self.results.lock().unwrap_or_else(|p| p.into_inner()));
        let position: HashMap<&UniqueId, usize> =
            order.iter().enumerate().map(|(i, id)| (id, i)).collect();
        results.sort_by_key(|r| position.get(&r.node_id).copied().unwrap_or(usize::MAX));
        results
    }
}

/// Status counts for a run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunSummary {
    pub success: usize,
    pub warn: usize,
    pub error: usize,
    pub fail: usize,
    pub skipped: usize,
}

impl RunSummary {
    pub fn from_results(results: &[RunResult]) -> Self {
        let mut summary = Self::default();
        for result in results {
            match result.status {
                RunStatus::Success => summary.success += 1,
                RunStatus::Warn => summary.warn += 1,
                RunStatus::Error => summary.error += 1,
                RunStatus::Fail => summary.fail += 1,
                RunStatus::Skipped => summary.skipped += 1,
            }
        }
        summary
    }

    pub fn total(&self) -> usize {
        self.success + self.warn + self.error + self.fail + self.skipped
    }
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "PASS={} WARN={} ERROR={} FAIL={} SKIP={} TOTAL={}",
            self.success,
            self.warn,
            self.error,
            self.fail,
            self.skipped,
            self.total()
        )
    }
}

/// Everything a run produced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunReport {
    pub invocation_id: String,
    pub started_at: DateTime<Utc>,
    pub elapsed: f64,
    pub results: Vec<RunResult>,
    pub summary: RunSummary,
    /// Why the run stopped early, if it did
    pub aborted: Option<String>,
}

impl RunReport {
    pub fn new(
        invocation_id: String,
        started_at: DateTime<Utc>,
        elapsed: f64,
        results: Vec<RunResult>,
        aborted: Option<String>,
    ) -> Self {
        let summary = RunSummary::from_results(&results);
        Self {
            invocation_id,
            started_at,
            elapsed,
            results,
            summary,
            aborted,
        }
    }

    /// True when nothing errored, failed, or aborted the run.
    pub fn is_success(&self) -> bool {
        self.aborted.is_none() && self.summary.error == 0 && self.summary.fail == 0
    }

    pub fn get(&self, id: &str) -> Option<&RunResult> {
        self.results.iter().find(|r| r.node_id == *id)
    }

    pub fn status_of(&self, id: &str) -> Option<RunStatus> {
        self.get(id).map(|r| r.status)
    }
}

#[cfg(test)]
#[path = "run_result_test.rs"]
mod tests;
