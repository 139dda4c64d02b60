use super::*;
use serde_json::json;

#[test]
fn test_unique_id_format() {
    let node = Node::model("shop", "orders", "select 1");
    assert_eq!(node.unique_id, "model.shop.orders");

    let src = Node::source("shop", "raw", "payments");
    assert_eq!(src.unique_id, "source.shop.raw.payments");
    assert_eq!(src.unique_id.resource_prefix(), "source");
}

#[test]
fn test_fqn_from_path_skips_resource_dir() {
    let node = Node::model("shop", "stg_orders", "select 1").with_path("models/staging/stg_orders.sql");
    assert_eq!(node.fqn, vec!["shop", "staging", "stg_orders"]);

    let flat = Node::model("shop", "orders", "select 1").with_path("models/orders.sql");
    assert_eq!(flat.fqn, vec!["shop", "orders"]);
}

#[test]
fn test_ephemeral_is_not_executable() {
    let node = Node::model("shop", "b", "select 1").with_materialization(Materialization::Ephemeral);
    assert!(node.is_ephemeral());
    assert!(!node.is_executable());
    assert_eq!(node.cte_alias(), "__kiln__cte__shop__b");
}

#[test]
fn test_cte_alias_is_package_qualified_and_sanitized() {
    let ours = Node::model("shop", "stg", "select 1");
    let theirs = Node::model("my-utils", "stg", "select 1");
    assert_ne!(ours.cte_alias(), theirs.cte_alias());
    assert_eq!(theirs.cte_alias(), "__kiln__cte__my_utils__stg");
}

#[test]
fn test_ephemeral_only_applies_to_models() {
    let mut test = Node::new(NodeKind::Test, "shop", "not_null_id", "select 1");
    test.config.materialized = Materialization::Ephemeral;
    assert!(!test.is_ephemeral());
    assert!(test.is_executable());
}

#[test]
fn test_source_not_executable() {
    assert!(!Node::source("shop", "raw", "payments").is_executable());
}

#[test]
fn test_relation_identifier_precedence() {
    let mut node = Node::model("shop", "orders", "select 1");
    node.database = "memory".into();
    node.schema = "main".into();
    assert_eq!(node.relation(QuotePolicy::default()).render(), r#""memory"."main"."orders""#);

    node.config.alias = Some("orders_v2".into());
    assert_eq!(node.relation_identifier(), "orders_v2");
}

#[test]
fn test_executable_sql_prefers_injected() {
    let mut node = Node::model("shop", "orders", "select 1");
    assert_eq!(node.executable_sql(), None);
    node.compiled_code = Some("select 1".into());
    assert_eq!(node.executable_sql(), Some("select 1"));
    node.injected_sql = Some("with x as (select 1) select 1".into());
    assert_eq!(node.executable_sql(), Some("with x as (select 1) select 1"));
}

#[test]
fn test_apply_overrides() {
    let mut config = NodeConfig::default();
    let mut values = BTreeMap::new();
    values.insert("materialized".to_string(), json!("table"));
    values.insert("tags".to_string(), json!("nightly"));
    values.insert("post_hook".to_string(), json!(["analyze {{ this }}"]));
    values.insert("owner".to_string(), json!("finance"));
    config.apply_overrides(&values).unwrap();

    assert_eq!(config.materialized, Materialization::Table);
    assert_eq!(config.tags, vec!["nightly"]);
    assert_eq!(config.post_hook, vec!["analyze {{ this }}"]);
    assert_eq!(config.meta.get("owner"), Some(&json!("finance")));
}

#[test]
fn test_apply_overrides_rejects_bad_materialization() {
    let mut config = NodeConfig::default();
    let mut values = BTreeMap::new();
    values.insert("materialized".to_string(), json!("snowflake_dynamic"));
    let err = config.apply_overrides(&values).unwrap_err();
    assert!(matches!(err, CoreError::Validation { .. }));
}

#[test]
fn test_node_config_deserialize_defaults() {
    let config: NodeConfig = serde_yaml::from_str("materialized: ephemeral").unwrap();
    assert!(config.enabled);
    assert_eq!(config.materialized, Materialization::Ephemeral);
    assert_eq!(config.severity, Severity::Error);
}
