//! Top-level entry point: compile a manifest, then run a selection.

use crate::compile::{CompiledManifest, Compiler};
use crate::error::ExecResult;
use crate::executor::{Executor, RunOptions};
use chrono::{DateTime, Utc};
use kiln_core::{Config, EventSink, LogSink, Manifest, RunReport, UniqueId};
use kiln_db::Adapter;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// File name of the manifest artifact under the target path.
pub const MANIFEST_FILE: &str = "manifest.json";

/// One invocation against one adapter.
///
/// Every compile and run made through an engine shares its invocation id
/// and start time, which templates see as `invocation_id` and
/// `run_started_at`.
pub struct Engine {
    config: Config,
    adapter: Arc<dyn Adapter>,
    events: Arc<dyn EventSink>,
    cancel: CancellationToken,
    invocation_id: String,
    started_at: DateTime<Utc>,
}

impl Engine {
    /// An empty `config.database` is replaced by the adapter's catalog.
    pub fn new(mut config: Config, adapter: Arc<dyn Adapter>) -> ExecResult<Self> {
        config.validate()?;
        if config.database.is_empty() {
            config.database = adapter.default_database().to_string();
            log::debug!("Using {} catalog {}", adapter.adapter_type(), config.database);
        }
        Ok(Self {
            config,
            adapter,
            events: Arc::new(LogSink),
            cancel: CancellationToken::new(),
            invocation_id: Uuid::new_v4().to_string(),
            started_at: Utc::now(),
        })
    }

    pub fn with_events(mut self, events: Arc<dyn EventSink>) -> Self {
        self.events = events;
        self
    }

    pub fn with_invocation_id(mut self, invocation_id: impl Into<String>) -> Self {
        self.invocation_id = invocation_id.into();
        self
    }

    /// Token that cancels runs of this engine.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn invocation_id(&self) -> &str {
        &self.invocation_id
    }

    pub fn compile(&self, manifest: Manifest) -> ExecResult<CompiledManifest> {
        Compiler::new(
            &self.config,
            Arc::clone(&self.events),
            self.invocation_id.clone(),
            self.started_at,
        )
        .compile(manifest)
    }

    /// Run `selected` and the executable nodes they depend on.
    pub async fn run(&self, compiled: &CompiledManifest, selected: &[UniqueId]) -> ExecResult<RunReport> {
        let executor = Executor::new(
            Arc::clone(&self.adapter),
            Arc::clone(&self.events),
            RunOptions::from_config(&self.config, self.invocation_id.clone()),
            self.cancel.clone(),
        );
        executor.run(compiled, selected).await
    }

    /// Compile `manifest` and run every executable node in it.
    pub async fn build(&self, manifest: Manifest) -> ExecResult<(CompiledManifest, RunReport)> {
        let compiled = self.compile(manifest)?;
        let selected = compiled.manifest.executable_ids();
        let report = self.run(&compiled, &selected).await?;
        Ok((compiled, report))
    }

    /// Write the compiled manifest to `<target_path>/manifest.json`.
    pub fn write_manifest(&self, compiled: &CompiledManifest) -> ExecResult<PathBuf> {
        let path = Path::new(&self.config.target_path).join(MANIFEST_FILE);
        self.write_manifest_to(compiled, &path)?;
        Ok(path)
    }

    pub fn write_manifest_to(&self, compiled: &CompiledManifest, path: &Path) -> ExecResult<()> {
        compiled
            .manifest
            .writable(&self.config.name, &self.invocation_id)
            .write(path)?;
        Ok(())
    }
}
