//! Template functions: config(), var() and doc(), plus value conversions.

use kiln_core::{LookupError, Manifest};
use minijinja::value::{Kwargs, Value};
use minijinja::{Error, ErrorKind};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

/// Captured config values from config() calls
pub(crate) type ConfigCapture = Arc<Mutex<HashMap<String, Value>>>;

/// Create the config() function that captures node configuration
///
/// Usage in templates:
/// ```jinja
/// {{ config(materialized='ephemeral', tags=['nightly']) }}
/// ```
pub(crate) fn make_config_fn(
    capture: ConfigCapture,
) -> impl Fn(Kwargs) -> Result<String, Error> + Send + Sync + Clone + 'static {
    move |kwargs: Kwargs| {
        let mut captured = capture.lock().unwrap_or_else(|p| p.into_inner());
        for key in kwargs.args() {
            let value = kwargs.get::<Value>(key).map_err(|e| {
                Error::new(
                    ErrorKind::InvalidOperation,
                    format!("failed to get config kwarg '{}': {}", key, e),
                )
            })?;
            captured.insert(key.to_string(), value);
        }
        Ok(String::new())
    }
}

/// Create the var() function that retrieves project variables
///
/// Usage in templates:
/// ```jinja
/// {{ var('start_date') }}
/// {{ var('missing', 'fallback') }}
/// ```
pub(crate) fn make_var_fn(
    vars: HashMap<String, serde_json::Value>,
) -> impl Fn(&str, Option<Value>) -> Result<Value, Error> + Send + Sync + Clone + 'static {
    move |name: &str, default: Option<Value>| {
        if let Some(value) = vars.get(name) {
            Ok(Value::from_serialize(value))
        } else if let Some(default_val) = default {
            Ok(default_val)
        } else {
            Err(Error::new(
                ErrorKind::UndefinedError,
                format!("Variable '{}' is not defined and no default provided", name),
            ))
        }
    }
}

/// Create the doc() function used in descriptions.
///
/// `doc('name')` searches the current package first; `doc('name', 'pkg')`
/// pins the package.
pub(crate) fn make_doc_fn(
    manifest: Arc<Manifest>,
    current_package: String,
) -> impl Fn(&str, Option<&str>) -> Result<String, Error> + Send + Sync + 'static {
    move |name: &str, package: Option<&str>| {
        match manifest.find_doc(name, package, &current_package) {
            Ok(doc) => Ok(doc.block_contents.clone()),
            Err(LookupError::Ambiguous(candidates)) => Err(Error::new(
                ErrorKind::InvalidOperation,
                format!(
                    "Documentation for '{}' is ambiguous; found in {}. Pass the package name.",
                    name,
                    candidates.join(", ")
                ),
            )),
            Err(_) => Err(Error::new(
                ErrorKind::InvalidOperation,
                format!("Documentation for '{}' not found", name),
            )),
        }
    }
}

/// Convert serde_yaml::Value to serde_json::Value
pub(crate) fn yaml_to_json(yaml: &serde_yaml::Value) -> serde_json::Value {
    match yaml {
        serde_yaml::Value::Null => serde_json::Value::Null,
        serde_yaml::Value::Bool(b) => serde_json::Value::Bool(*b),
        serde_yaml::Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                serde_json::Value::from(i)
            } else if let Some(f) = n.as_f64() {
                serde_json::Number::from_f64(f)
                    .map(serde_json::Value::Number)
                    .unwrap_or_else(|| {
                        log::warn!("YAML number {} is NaN or Infinity; using null", f);
                        serde_json::Value::Null
                    })
            } else {
                serde_json::Value::Null
            }
        }
        serde_yaml::Value::String(s) => serde_json::Value::String(s.clone()),
        serde_yaml::Value::Sequence(seq) => {
            serde_json::Value::Array(seq.iter().map(yaml_to_json).collect())
        }
        serde_yaml::Value::Mapping(map) => serde_json::Value::Object(
            map.iter()
                .filter_map(|(k, v)| k.as_str().map(|key| (key.to_string(), yaml_to_json(v))))
                .collect(),
        ),
        serde_yaml::Value::Tagged(tagged) => yaml_to_json(&tagged.value),
    }
}

#[cfg(test)]
#[path = "functions_test.rs"]
mod tests;
