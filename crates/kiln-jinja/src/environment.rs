//! Jinja environment setup for kiln

use crate::error::{JinjaError, JinjaResult};
use crate::functions::{make_config_fn, make_doc_fn, make_var_fn, yaml_to_json, ConfigCapture};
use crate::resolver::RefResolver;
use chrono::{DateTime, Utc};
use kiln_core::Manifest;
use minijinja::{context, Environment, Value};
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex};

const PRELUDE_MARKER: &str = "__kiln_prelude_end__";

/// The active target, exposed to templates as `target`.
#[derive(Debug, Clone, Serialize)]
pub struct TargetContext {
    pub name: String,
    pub database: String,
    pub schema: String,
    pub threads: usize,
}

/// Output of rendering a node template.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderedNode {
    pub sql: String,
    /// Keyword arguments of every `config()` call, later calls winning
    pub config: BTreeMap<String, serde_json::Value>,
}

/// Jinja templating environment for kiln
pub struct JinjaEnvironment<'a> {
    env: Environment<'a>,
    config_capture: ConfigCapture,
    macro_prelude: String,
    prelude_output: String,
}

impl JinjaEnvironment<'static> {
    /// Create a new Jinja environment with project variables
    pub fn new(vars: &HashMap<String, serde_yaml::Value>) -> Self {
        let mut env = Environment::new();
        let config_capture: ConfigCapture = Arc::new(Mutex::new(HashMap::new()));

        let json_vars: HashMap<String, serde_json::Value> = vars
            .iter()
            .map(|(k, v)| (k.clone(), yaml_to_json(v)))
            .collect();

        env.add_function("config", make_config_fn(config_capture.clone()));
        env.add_function("var", make_var_fn(json_vars));

        Self {
            env,
            config_capture,
            macro_prelude: String::new(),
            prelude_output: String::new(),
        }
    }

    /// Expose `target` to every template.
    pub fn with_target(mut self, target: TargetContext) -> Self {
        self.env.add_global("target", Value::from_serialize(&target));
        self
    }

    /// Expose `invocation_id` and `run_started_at` to every template.
    pub fn with_run_context(mut self, invocation_id: &str, run_started_at: DateTime<Utc>) -> Self {
        self.env
            .add_global("invocation_id", Value::from(invocation_id.to_string()));
        self.env
            .add_global("run_started_at", Value::from(run_started_at.to_rfc3339()));
        self
    }

    /// Make macro definitions callable from every template.
    ///
    /// Macro sources are prepended to each template; the whitespace they
    /// render to is stripped from the output again.
    pub fn with_macros<'m>(mut self, macros: impl IntoIterator<Item = &'m str>) -> JinjaResult<Self> {
        let prelude: String = macros.into_iter().collect::<Vec<_>>().join("\n");
        if prelude.is_empty() {
            return Ok(self);
        }
        let rendered = self
            .env
            .render_str(&format!("{}\n{}", prelude, PRELUDE_MARKER), ())?;
        self.prelude_output = rendered
            .split(PRELUDE_MARKER)
            .next()
            .unwrap_or_default()
            .to_string();
        self.macro_prelude = prelude;
        Ok(self)
    }
}

impl JinjaEnvironment<'_> {
    /// Render a template without node context (hooks)
    pub fn render(&self, template: &str) -> JinjaResult<String> {
        self.render_in(template, context! {})
    }

    /// Render a template where `this` names a relation (node pre/post hooks)
    pub fn render_with_this(&self, template: &str, this: &str) -> JinjaResult<String> {
        self.render_in(template, context! { this => this })
    }

    /// Render a node template only to capture its `config()` calls.
    ///
    /// `ref()` and `source()` are stubs here: they resolve nothing and never
    /// fail, since the graph is not complete yet.
    pub fn parse_config(
        &self,
        template: &str,
        node_name: &str,
    ) -> JinjaResult<BTreeMap<String, serde_json::Value>> {
        let ctx = Value::from_iter([
            (
                "ref",
                Value::from_function(|name: &str, _package: Option<&str>| name.to_string()),
            ),
            (
                "source",
                Value::from_function(|source: &str, table: &str| format!("{}.{}", source, table)),
            ),
            ("this", Value::from(node_name)),
        ]);
        self.clear_config();
        self.render_in(template, ctx)?;
        self.take_config()
    }

    /// Render a node template, resolving references through `resolver`.
    ///
    /// When a reference fails, the structured resolution error is returned
    /// rather than the template engine's message.
    pub fn render_node(&self, template: &str, resolver: &RefResolver) -> JinjaResult<RenderedNode> {
        // `ref` is a Rust keyword, so the context is built by hand
        let ctx = Value::from_iter([
            ("ref", resolver.ref_function()),
            ("source", resolver.source_function()),
            ("this", Value::from(resolver.this())),
        ]);
        self.clear_config();
        match self.render_in(template, ctx) {
            Ok(sql) => Ok(RenderedNode {
                sql,
                config: self.take_config()?,
            }),
            Err(err) => match resolver.first_error() {
                Some(resolution) => Err(JinjaError::Resolution(resolution)),
                None => Err(err),
            },
        }
    }

    /// Render a description, resolving `doc()` blocks.
    pub fn render_description(
        &self,
        text: &str,
        manifest: Arc<Manifest>,
        package: &str,
    ) -> JinjaResult<String> {
        if !text.contains("{{") {
            return Ok(text.to_string());
        }
        let ctx = context! {
            doc => Value::from_function(make_doc_fn(manifest, package.to_string())),
        };
        Ok(self.env.render_str(text, ctx)?)
    }

    fn render_in(&self, template: &str, ctx: Value) -> JinjaResult<String> {
        if self.macro_prelude.is_empty() {
            return Ok(self.env.render_str(template, ctx)?);
        }
        let source = format!("{}\n{}", self.macro_prelude, template);
        let rendered = self.env.render_str(&source, ctx)?;
        Ok(rendered
            .strip_prefix(self.prelude_output.as_str())
            .unwrap_or(&rendered)
            .to_string())
    }

    fn clear_config(&self) {
        self.config_capture
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .clear();
    }

    fn take_config(&self) -> JinjaResult<BTreeMap<String, serde_json::Value>> {
        let captured = std::mem::take(
            &mut *self
                .config_capture
                .lock()
                .unwrap_or_else(|p| p.into_inner()),
        );
        captured
            .into_iter()
            .map(|(key, value)| {
                serde_json::to_value(&value)
                    .map(|json| (key.clone(), json))
                    .map_err(|e| JinjaError::InvalidConfig {
                        message: format!("{}: {}", key, e),
                    })
            })
            .collect()
    }
}

impl Default for JinjaEnvironment<'static> {
    fn default() -> Self {
        Self::new(&HashMap::new())
    }
}

#[cfg(test)]
#[path = "environment_test.rs"]
mod tests;
