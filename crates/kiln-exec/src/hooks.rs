//! on-run-start / on-run-end hooks.

use crate::error::{ExecError, ExecResult};
use chrono::Utc;
use kiln_core::{Event, EventSink, HookPhase, NodeKind, RunResult, RunStatus, UniqueId};
use kiln_db::Adapter;
use kiln_jinja::JinjaEnvironment;
use std::time::Instant;

/// Id a run hook is reported under, e.g.
/// `operation.shop.shop-on-run-start-0`.
pub fn hook_id(project: &str, phase: HookPhase, index: usize) -> UniqueId {
    UniqueId::for_node(
        NodeKind::Operation,
        project,
        &format!("{}-{}-{}", project, phase.as_str(), index),
    )
}

/// Run hooks one at a time in declared order.
///
/// on-run-start stops at the first failure; on-run-end attempts every
/// hook. Only internal adapter errors are returned as `Err`.
pub(crate) async fn run_hooks(
    phase: HookPhase,
    hooks: &[String],
    project: &str,
    env: &JinjaEnvironment<'_>,
    adapter: &dyn Adapter,
    events: &dyn EventSink,
) -> ExecResult<Vec<RunResult>> {
    let mut results = Vec::with_capacity(hooks.len());
    for (index, hook) in hooks.iter().enumerate() {
        events.emit(Event::HookStarted {
            phase,
            index,
            total: hooks.len(),
        });
        let id = hook_id(project, phase, index);
        let started_at = Utc::now();
        let start = Instant::now();

        let status = match env.render(hook) {
            Err(e) => Err(format!("{} hook failed to render: {}", phase.as_str(), e)),
            Ok(sql) => match adapter.execute_batch(&sql).await {
                Ok(()) => Ok(()),
                Err(e) if e.is_internal() => return Err(ExecError::Db(e)),
                Err(e) => Err(e.to_string()),
            },
        };
        let result = match status {
            Ok(()) => RunResult::new(id, RunStatus::Success).with_message("OK"),
            Err(message) => RunResult::new(id, RunStatus::Error).with_message(message),
        }
        .with_timing(started_at, start.elapsed().as_secs_f64());

        let failed = result.status.is_failure();
        events.emit(Event::HookFinished {
            phase,
            result: result.clone(),
        });
        results.push(result);
        if failed && phase == HookPhase::OnRunStart {
            break;
        }
    }
    Ok(results)
}
