//! Running one scheduled node against the adapter.

use crate::capability::{capability, Capability};
use crate::error::{ExecError, ExecResult};
use chrono::Utc;
use kiln_core::{Materialization, Node, QuotePolicy, Relation, RunResult, RunStatus, Severity};
use kiln_db::{Adapter, DbError};
use kiln_jinja::JinjaEnvironment;
use std::sync::Arc;
use std::time::Instant;

/// Suffix of the relation a table or view is built into before the swap.
pub const TMP_SUFFIX: &str = "__kiln_tmp";

/// Column added by snapshots.
pub const SNAPSHOT_AT_COLUMN: &str = "kiln_snapshot_at";

/// Executes nodes on behalf of the scheduler's workers.
pub(crate) struct NodeRunner {
    adapter: Arc<dyn Adapter>,
    env: Arc<JinjaEnvironment<'static>>,
    quoting: QuotePolicy,
}

/// Why a node did not succeed.
enum Failure {
    /// The node's own work failed; it is reported and the run goes on
    Node(String),
    /// The adapter or an invariant broke; the run must stop
    Internal(ExecError),
}

impl From<DbError> for Failure {
    fn from(err: DbError) -> Self {
        if err.is_internal() {
            Failure::Internal(ExecError::Db(err))
        } else {
            Failure::Node(err.to_string())
        }
    }
}

/// What the node produced on success.
struct Outcome {
    status: RunStatus,
    message: String,
    failures: Option<u64>,
}

impl Outcome {
    fn success(message: impl Into<String>) -> Self {
        Self {
            status: RunStatus::Success,
            message: message.into(),
            failures: None,
        }
    }
}

impl NodeRunner {
    pub(crate) fn new(
        adapter: Arc<dyn Adapter>,
        env: Arc<JinjaEnvironment<'static>>,
        quoting: QuotePolicy,
    ) -> Self {
        Self {
            adapter,
            env,
            quoting,
        }
    }

    /// Run `node`, returning its result.
    ///
    /// Errors are returned only when the run must stop; a node that merely
    /// fails is an `Ok` result with status error or fail.
    pub(crate) async fn run(&self, node: &Node) -> ExecResult<RunResult> {
        let started_at = Utc::now();
        let start = Instant::now();
        let outcome = self.run_inner(node).await;
        let elapsed = start.elapsed().as_secs_f64();

        let result = match outcome {
            Ok(outcome) => {
                let mut result = RunResult::new(node.unique_id.clone(), outcome.status)
                    .with_message(outcome.message);
                result.failures = outcome.failures;
                result
            }
            Err(Failure::Node(message)) => {
                RunResult::new(node.unique_id.clone(), RunStatus::Error).with_message(message)
            }
            Err(Failure::Internal(err)) => return Err(err),
        };
        Ok(result.with_timing(started_at, elapsed))
    }

    async fn run_inner(&self, node: &Node) -> Result<Outcome, Failure> {
        let relation = node.relation(self.quoting);
        let this = relation.render();

        match capability(node.resource_type) {
            Capability::NotExecutable => {
                return Err(Failure::Internal(ExecError::Internal(format!(
                    "{} node '{}' was scheduled",
                    node.resource_type, node.unique_id
                ))))
            }
            Capability::LoadSeed => {
                let path = node.path.display().to_string();
                self.adapter.load_csv(&relation, &path).await?;
                return Ok(Outcome::success(format!("loaded seed {}", this)));
            }
            _ => {}
        }

        let sql = node.executable_sql().ok_or_else(|| {
            Failure::Internal(ExecError::Internal(format!(
                "node '{}' was scheduled without compiled SQL",
                node.unique_id
            )))
        })?;

        self.run_node_hooks(&node.config.pre_hook, &this, "pre-hook").await?;
        let outcome = match capability(node.resource_type) {
            Capability::Materialize => self.materialize(node, &relation, sql).await?,
            Capability::Snapshot => self.snapshot(&relation, sql).await?,
            Capability::AssertNoRows => self.assert_no_rows(node, sql).await?,
            Capability::ExecuteStatements => {
                self.adapter.execute_batch(sql).await?;
                Outcome::success("OK")
            }
            Capability::LoadSeed | Capability::NotExecutable => {
                return Err(Failure::Internal(ExecError::Internal(format!(
                    "unexpected capability for '{}'",
                    node.unique_id
                ))))
            }
        };
        self.run_node_hooks(&node.config.post_hook, &this, "post-hook").await?;
        Ok(outcome)
    }

    /// Render and execute hooks with `this` bound to the node's relation.
    async fn run_node_hooks(&self, hooks: &[String], this: &str, label: &str) -> Result<(), Failure> {
        for hook in hooks {
            let sql = self
                .env
                .render_with_this(hook, this)
                .map_err(|e| Failure::Node(format!("{} failed: {}", label, e)))?;
            self.adapter
                .execute_batch(&sql)
                .await
                .map_err(|e| match Failure::from(e) {
                    Failure::Node(msg) => Failure::Node(format!("{} failed: {}", label, msg)),
                    internal => internal,
                })?;
        }
        Ok(())
    }

    async fn materialize(&self, node: &Node, relation: &Relation, sql: &str) -> Result<Outcome, Failure> {
        match node.config.materialized {
            Materialization::Table | Materialization::View => {
                let temp = relation.with_identifier(format!("{}{}", relation.identifier, TMP_SUFFIX));
                self.adapter.drop_relation(&temp).await?;
                if node.config.materialized == Materialization::Table {
                    self.adapter.create_table_as(&temp, sql).await?;
                } else {
                    self.adapter.create_view_as(&temp, sql).await?;
                }
                if self
                    .adapter
                    .already_exists(&relation.schema, &relation.identifier)
                    .await?
                {
                    self.adapter.drop_relation(relation).await?;
                }
                self.adapter
                    .rename_relation(&temp, &relation.identifier)
                    .await?;
                Ok(Outcome::success(format!(
                    "created {} {}",
                    node.config.materialized, relation
                )))
            }
            Materialization::Incremental => {
                if self
                    .adapter
                    .already_exists(&relation.schema, &relation.identifier)
                    .await?
                {
                    self.adapter
                        .execute(&format!("insert into {}\n{}", relation, sql))
                        .await?;
                    Ok(Outcome::success(format!("inserted into {}", relation)))
                } else {
                    self.adapter.create_table_as(relation, sql).await?;
                    Ok(Outcome::success(format!("created incremental {}", relation)))
                }
            }
            Materialization::Ephemeral => Err(Failure::Internal(ExecError::Internal(format!(
                "ephemeral model '{}' was scheduled",
                node.unique_id
            )))),
        }
    }

    async fn snapshot(&self, relation: &Relation, sql: &str) -> Result<Outcome, Failure> {
        let stamped = format!(
            "select *, current_timestamp as {} from (\n{}\n) as snapshot_query",
            SNAPSHOT_AT_COLUMN, sql
        );
        if self
            .adapter
            .already_exists(&relation.schema, &relation.identifier)
            .await?
        {
            self.adapter
                .execute(&format!("insert into {}\n{}", relation, stamped))
                .await?;
            Ok(Outcome::success(format!("appended snapshot {}", relation)))
        } else {
            self.adapter.create_table_as(relation, &stamped).await?;
            Ok(Outcome::success(format!("created snapshot {}", relation)))
        }
    }

    async fn assert_no_rows(&self, node: &Node, sql: &str) -> Result<Outcome, Failure> {
        let wrapped = format!(
            "select count(*) as failures from (\n{}\n) as test_query",
            sql
        );
        let result = self.adapter.execute(&wrapped).await?;
        let failures = result
            .first_value()
            .and_then(|v| v.as_u64())
            .ok_or_else(|| {
                Failure::Node(format!(
                    "test query returned no failure count: {:?}",
                    result.first_value()
                ))
            })?;

        if failures == 0 {
            return Ok(Outcome {
                status: RunStatus::Success,
                message: "PASS".to_string(),
                failures: Some(0),
            });
        }
        let status = match node.config.severity {
            Severity::Warn => RunStatus::Warn,
            Severity::Error => RunStatus::Fail,
        };
        Ok(Outcome {
            status,
            message: format!("Got {} failing rows", failures),
            failures: Some(failures),
        })
    }
}

#[cfg(test)]
#[path = "runner_test.rs"]
mod tests;
