//! Compile driver: parse configs, render every node, wire edges, reject
//! cycles, then inline ephemeral ancestors.
//!
//! Compilation is two-phase. The parse phase renders each template with
//! inert `ref()`/`source()` only to learn its `config()`, so that every
//! node's materialization and location are known before any reference is
//! resolved. The compile phase then renders against a snapshot of the
//! fully configured manifest.

use crate::error::{ExecError, ExecResult};
use chrono::{DateTime, Utc};
use kiln_core::{
    Config, Event, EventSink, Manifest, Materialization, Node, NodeGraph, NodeKind, NodePatch,
    UniqueId,
};
use kiln_jinja::{JinjaEnvironment, RefResolver, TargetContext};
use kiln_sql::inject_ctes;
use std::collections::BTreeMap;
use std::sync::Arc;

/// A manifest ready to schedule.
pub struct CompiledManifest {
    pub manifest: Manifest,
    pub graph: NodeGraph,
    /// Nodes that failed to compile; they are reported as errors when
    /// scheduled and their descendants are skipped
    pub failures: BTreeMap<UniqueId, ExecError>,
    environment: Arc<JinjaEnvironment<'static>>,
}

impl CompiledManifest {
    pub fn failure(&self, id: &str) -> Option<&ExecError> {
        self.failures.get(id)
    }

    /// True when every node compiled.
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }

    /// Environment used for hooks rendered at run time.
    pub fn environment(&self) -> &Arc<JinjaEnvironment<'static>> {
        &self.environment
    }
}

/// Compiles a parsed manifest against a project config.
pub struct Compiler<'c> {
    config: &'c Config,
    events: Arc<dyn EventSink>,
    invocation_id: String,
    run_started_at: DateTime<Utc>,
}

impl<'c> Compiler<'c> {
    pub fn new(
        config: &'c Config,
        events: Arc<dyn EventSink>,
        invocation_id: impl Into<String>,
        run_started_at: DateTime<Utc>,
    ) -> Self {
        Self {
            config,
            events,
            invocation_id: invocation_id.into(),
            run_started_at,
        }
    }

    /// Template environment with project vars, target, run context and the
    /// manifest's macros.
    pub fn environment(&self, manifest: &Manifest) -> ExecResult<JinjaEnvironment<'static>> {
        let env = JinjaEnvironment::new(&self.config.vars)
            .with_target(TargetContext {
                name: self.config.target_name.clone(),
                database: self.config.database.clone(),
                schema: self.config.schema.clone(),
                threads: self.config.threads,
            })
            .with_run_context(&self.invocation_id, self.run_started_at)
            .with_macros(manifest.macros.values().map(|m| m.macro_sql.as_str()))?;
        Ok(env)
    }

    /// Compile every node of `manifest`.
    ///
    /// Per-node failures are collected in [`CompiledManifest::failures`];
    /// only a dependency cycle fails the whole compile.
    pub fn compile(&self, mut manifest: Manifest) -> ExecResult<CompiledManifest> {
        let env = self.environment(&manifest)?;
        let mut failures = BTreeMap::new();

        self.parse_configs(&mut manifest, &env, &mut failures);
        self.place_sources(&mut manifest);
        self.render_nodes(&mut manifest, &env, &mut failures);

        manifest.build_edges();
        let graph = NodeGraph::from_manifest(&manifest)?;

        self.inject(&mut manifest, &graph, &mut failures)?;
        self.render_descriptions(&mut manifest, &env);

        if !failures.is_empty() {
            log::warn!("{} nodes failed to compile", failures.len());
        }
        Ok(CompiledManifest {
            manifest,
            graph,
            failures,
            environment: Arc::new(env),
        })
    }

    fn parse_configs(
        &self,
        manifest: &mut Manifest,
        env: &JinjaEnvironment<'_>,
        failures: &mut BTreeMap<UniqueId, ExecError>,
    ) {
        let mut disabled = Vec::new();
        for (id, node) in manifest.nodes.iter_mut() {
            if node.resource_type == NodeKind::Model
                && node.config.materialized == Materialization::default()
            {
                node.config.materialized = self.config.materialization;
            }
            if node.resource_type.has_template() {
                let applied = env
                    .parse_config(&node.raw_code, &node.name)
                    .map_err(|e| e.to_string())
                    .and_then(|values| {
                        node.config
                            .apply_overrides(&values)
                            .map_err(|e| e.to_string())
                    });
                if let Err(message) = applied {
                    failures.insert(id.clone(), compilation_error(node, message));
                }
            }
            if node.database.is_empty() {
                node.database = self.config.database.clone();
            }
            if let Some(schema) = &node.config.schema {
                node.schema = schema.clone();
            } else if node.schema.is_empty() {
                node.schema = self.config.schema.clone();
            }
            if !node.config.enabled {
                disabled.push(id.clone());
            }
        }
        for id in disabled {
            log::debug!("Node '{}' disabled by config()", id);
            failures.remove(&id);
            manifest.disable(&id);
        }
    }

    fn place_sources(&self, manifest: &mut Manifest) {
        for source in manifest.sources.values_mut() {
            if source.database.is_empty() {
                source.database = self.config.database.clone();
            }
            if source.schema.is_empty() {
                source.schema = source
                    .source_name
                    .clone()
                    .unwrap_or_else(|| self.config.schema.clone());
            }
        }
    }

    fn render_nodes(
        &self,
        manifest: &mut Manifest,
        env: &JinjaEnvironment<'_>,
        failures: &mut BTreeMap<UniqueId, ExecError>,
    ) {
        let snapshot = Arc::new(manifest.clone());
        for (id, node) in snapshot.nodes.iter() {
            if !node.resource_type.has_template() || failures.contains_key(id) {
                continue;
            }
            self.events.emit(Event::NodeCompiling {
                node_id: id.clone(),
            });

            let resolver = RefResolver::new(Arc::clone(&snapshot), node, self.config.quoting);
            let rendered = env.render_node(&node.raw_code, &resolver);
            let refs = resolver.take();

            let Some(target) = manifest.nodes.get_mut(id) else {
                continue;
            };
            // Edges resolved before a failure are kept so the graph stays
            // complete for skip propagation.
            target.depends_on.extend(refs.depends_on);
            match rendered {
                Ok(rendered) => target.compiled_code = Some(rendered.sql),
                Err(e) => {
                    failures.insert(id.clone(), compilation_error(target, e.to_string()));
                }
            }
        }
    }

    fn inject(
        &self,
        manifest: &mut Manifest,
        graph: &NodeGraph,
        failures: &mut BTreeMap<UniqueId, ExecError>,
    ) -> ExecResult<()> {
        for id in graph.topological_order()? {
            let Some(node) = manifest.nodes.get(&id) else {
                continue;
            };
            if node.compiled_code.is_none() || failures.contains_key(&id) {
                continue;
            }
            let path = node.path.display().to_string();
            if let Err(e) = inject_ctes(manifest, &id) {
                failures.insert(
                    id.clone(),
                    ExecError::Compilation {
                        node: id.to_string(),
                        path,
                        message: e.to_string(),
                    },
                );
            }
        }
        Ok(())
    }

    fn render_descriptions(&self, manifest: &mut Manifest, env: &JinjaEnvironment<'_>) {
        if !manifest.nodes.values().any(|n| n.description.contains("{{")) {
            return;
        }
        let snapshot = Arc::new(manifest.clone());
        for node in manifest.nodes.values_mut() {
            if !node.description.contains("{{") {
                continue;
            }
            match env.render_description(&node.description, Arc::clone(&snapshot), &node.package_name) {
                Ok(text) => node.description = text,
                Err(e) => log::warn!("Could not render description of {}: {}", node.unique_id, e),
            }
        }
    }
}

/// Apply property patches, reporting each unmatched patch as an event.
pub fn apply_patches(
    manifest: &mut Manifest,
    patches: impl IntoIterator<Item = NodePatch>,
    events: &dyn EventSink,
) -> Vec<String> {
    let unmatched = manifest.patch_nodes(patches);
    for name in &unmatched {
        events.emit(Event::PatchNotApplied { name: name.clone() });
    }
    unmatched
}

fn compilation_error(node: &Node, message: String) -> ExecError {
    ExecError::Compilation {
        node: node.unique_id.to_string(),
        path: node.path.display().to_string(),
        message,
    }
}

#[cfg(test)]
#[path = "compile_test.rs"]
mod tests;
