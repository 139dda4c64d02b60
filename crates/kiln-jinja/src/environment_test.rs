use super::*;
use kiln_core::{CoreError, Doc, Materialization, Node, QuotePolicy};
use serde_json::json;

fn shop_manifest() -> Manifest {
    let mut a = Node::model("shop", "a", "select 1 as id");
    a.database = "memory".into();
    a.schema = "main".into();
    let mut b = Node::model("shop", "b", "select * from {{ ref('a') }}")
        .with_materialization(Materialization::Ephemeral);
    b.database = "memory".into();
    b.schema = "main".into();
    let mut c = Node::model("shop", "c", "select * from {{ ref('b') }}");
    c.database = "memory".into();
    c.schema = "main".into();
    let mut manifest = Manifest::new();
    manifest.add_nodes(vec![a, b, c]).unwrap();
    manifest
}

fn resolver_for(manifest: &Arc<Manifest>, id: &str) -> RefResolver {
    let node = manifest.get(id).unwrap();
    RefResolver::new(Arc::clone(manifest), node, QuotePolicy::default())
}

#[test]
fn test_render_simple() {
    let env = JinjaEnvironment::default();
    assert_eq!(env.render("select * from users").unwrap(), "select * from users");
}

#[test]
fn test_render_with_var() {
    let mut vars = HashMap::new();
    vars.insert(
        "start_date".to_string(),
        serde_yaml::Value::String("2024-01-01".to_string()),
    );
    let env = JinjaEnvironment::new(&vars);
    let result = env
        .render("select * from orders where created_at >= '{{ var(\"start_date\") }}'")
        .unwrap();
    assert_eq!(result, "select * from orders where created_at >= '2024-01-01'");
}

#[test]
fn test_var_missing_no_default() {
    let env = JinjaEnvironment::default();
    assert!(matches!(
        env.render("{{ var('missing') }}"),
        Err(JinjaError::RenderError(_))
    ));
}

#[test]
fn test_target_and_run_context() {
    let env = JinjaEnvironment::default()
        .with_target(TargetContext {
            name: "dev".into(),
            database: "memory".into(),
            schema: "main".into(),
            threads: 4,
        })
        .with_run_context("inv-42", Utc::now());
    assert_eq!(
        env.render("{{ target.name }}.{{ target.schema }} {{ invocation_id }}").unwrap(),
        "dev.main inv-42"
    );
}

#[test]
fn test_render_with_this() {
    let env = JinjaEnvironment::default();
    assert_eq!(
        env.render_with_this("analyze {{ this }}", r#""memory"."main"."orders""#).unwrap(),
        r#"analyze "memory"."main"."orders""#
    );
}

#[test]
fn test_parse_config_stubs_references() {
    let env = JinjaEnvironment::default();
    let config = env
        .parse_config(
            "{{ config(materialized='ephemeral', tags=['nightly']) }}select * from {{ ref('nowhere') }} join {{ source('raw', 'x') }}",
            "b",
        )
        .unwrap();
    assert_eq!(config.get("materialized"), Some(&json!("ephemeral")));
    assert_eq!(config.get("tags"), Some(&json!(["nightly"])));
}

#[test]
fn test_render_node_resolves_refs() {
    let manifest = Arc::new(shop_manifest());
    let env = JinjaEnvironment::default();

    let resolver = resolver_for(&manifest, "model.shop.b");
    let rendered = env
        .render_node("select * from {{ ref('a') }}", &resolver)
        .unwrap();
    assert_eq!(rendered.sql, r#"select * from "memory"."main"."a""#);
    assert!(rendered.config.is_empty());

    let refs = resolver.take();
    assert_eq!(refs.depends_on.len(), 1);
    assert!(refs.depends_on.contains("model.shop.a"));
}

#[test]
fn test_render_node_ephemeral_ref_uses_cte_alias() {
    let manifest = Arc::new(shop_manifest());
    let env = JinjaEnvironment::default();
    let resolver = resolver_for(&manifest, "model.shop.c");
    let rendered = env
        .render_node("select * from {{ ref('b') }}", &resolver)
        .unwrap();
    assert_eq!(rendered.sql, "select * from __kiln__cte__shop__b");
    assert!(resolver.take().depends_on.contains("model.shop.b"));
}

#[test]
fn test_render_node_reports_structured_error() {
    let manifest = Arc::new(shop_manifest());
    let env = JinjaEnvironment::default();
    let resolver = resolver_for(&manifest, "model.shop.c");
    let err = env
        .render_node("select * from {{ ref('a') }} join {{ ref('x') }}", &resolver)
        .unwrap_err();
    assert_eq!(
        err,
        JinjaError::Resolution(CoreError::TargetNotFound {
            referrer: "model.shop.c".into(),
            target: "ref('x')".into(),
        })
    );
    // references resolved before the failure are still captured
    assert!(resolver.take().depends_on.contains("model.shop.a"));
}

#[test]
fn test_render_node_captures_config() {
    let manifest = Arc::new(shop_manifest());
    let env = JinjaEnvironment::default();
    let resolver = resolver_for(&manifest, "model.shop.c");
    let rendered = env
        .render_node("{{ config(materialized='table') }}select 1", &resolver)
        .unwrap();
    assert_eq!(rendered.sql, "select 1");
    assert_eq!(rendered.config.get("materialized"), Some(&json!("table")));
}

#[test]
fn test_macros_are_callable() {
    let env = JinjaEnvironment::default()
        .with_macros(["{% macro cents_to_dollars(col) %}({{ col }} / 100.0){% endmacro %}\n"])
        .unwrap();
    assert_eq!(
        env.render("select {{ cents_to_dollars('amount') }} as amount").unwrap(),
        "select (amount / 100.0) as amount"
    );
}

#[test]
fn test_render_description_with_doc() {
    let mut manifest = Manifest::new();
    manifest
        .add_doc(Doc::new("shop", "orders_doc", "One row per order."))
        .unwrap();
    let env = JinjaEnvironment::default();
    let text = env
        .render_description("{{ doc('orders_doc') }}", Arc::new(manifest), "shop")
        .unwrap();
    assert_eq!(text, "One row per order.");
}
