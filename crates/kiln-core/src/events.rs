//! Run lifecycle events.
//!
//! The executor reports progress through an [`EventSink`]. [`LogSink`]
//! forwards events to the `log` facade; [`CollectingSink`] keeps them for
//! inspection in tests.

use crate::run_result::{RunResult, RunSummary};
use crate::unique_id::UniqueId;
use std::sync::Mutex;

/// Which run hook list a hook belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HookPhase {
    OnRunStart,
    OnRunEnd,
}

impl HookPhase {
    pub fn as_str(self) -> &'static str {
        match self {
            HookPhase::OnRunStart => "on-run-start",
            HookPhase::OnRunEnd => "on-run-end",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    RunStarted {
        invocation_id: String,
        node_count: usize,
        threads: usize,
    },
    HookStarted {
        phase: HookPhase,
        index: usize,
        total: usize,
    },
    HookFinished {
        phase: HookPhase,
        result: RunResult,
    },
    LevelStarted {
        level: usize,
        size: usize,
    },
    NodeStarted {
        node_id: UniqueId,
    },
    NodeCompiling {
        node_id: UniqueId,
    },
    NodeExecuting {
        node_id: UniqueId,
    },
    NodeFinished {
        result: RunResult,
    },
    NodeSkipped {
        node_id: UniqueId,
        cause: Option<UniqueId>,
    },
    PatchNotApplied {
        name: String,
    },
    RunFinished {
        summary: RunSummary,
        elapsed: f64,
    },
}

/// Receiver of run events. Called from worker tasks concurrently.
pub trait EventSink: Send + Sync {
    fn emit(&self, event: Event);
}

/// Forwards events to the `log` crate.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogSink;

impl EventSink for LogSink {
    fn emit(&self, event: Event) {
        match event {
            Event::RunStarted {
                invocation_id,
                node_count,
                threads,
            } => log::info!(
                "Running {} nodes with {} threads (invocation {})",
                node_count,
                threads,
                invocation_id
            ),
            Event::HookStarted {
                phase,
                index,
                total,
            } => log::info!("Running {} hook {} of {}", phase.as_str(), index + 1, total),
            Event::HookFinished { phase, result } => match &result.message {
                Some(msg) if result.status.is_failure() => {
                    log::error!("{} hook {} failed: {}", phase.as_str(), result.node_id, msg)
                }
                _ => log::info!("{} hook {} {}", phase.as_str(), result.node_id, result.status),
            },
            Event::LevelStarted { level, size } => {
                log::debug!("Dispatching level {} ({} nodes)", level, size)
            }
            Event::NodeStarted { node_id } => log::debug!("Started {}", node_id),
            Event::NodeCompiling { node_id } => log::debug!("Compiling {}", node_id),
            Event::NodeExecuting { node_id } => log::debug!("Executing {}", node_id),
            Event::NodeFinished { result } => {
                let msg = result.message.as_deref().unwrap_or("");
                if result.status.is_failure() {
                    log::error!("{} {} [{:.2}s] {}", result.status, result.node_id, result.elapsed, msg);
                } else {
                    log::info!("{} {} [{:.2}s] {}", result.status, result.node_id, result.elapsed, msg);
                }
            }
            Event::NodeSkipped { node_id, cause } => match cause {
                Some(cause) => log::warn!("Skipping {} (upstream {} failed)", node_id, cause),
                None => log::warn!("Skipping {}", node_id),
            },
            Event::PatchNotApplied { name } => {
                log::warn!("Did not find matching node for patch with name '{}'", name)
            }
            Event::RunFinished { summary, elapsed } => {
                log::info!("Finished in {:.2}s: {}", elapsed, summary)
            }
        }
    }
}

/// Discards every event.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl EventSink for NullSink {
    fn emit(&self, _event: Event) {}
}

/// Records events in arrival order.
#[derive(Debug, Default)]
pub struct CollectingSink {
    events: Mutex<Vec<Event>>,
}

impl CollectingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<Event> {
        self.events.lock().unwrap_or_else(|p| p.into_inner()).clone()
    }
}

impl EventSink for CollectingSink {
    fn emit(&self, event: Event) {
        self.events
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .push(event);
    }
}
