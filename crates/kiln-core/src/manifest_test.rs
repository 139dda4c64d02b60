use super::*;
use crate::node::Materialization;

fn model_with_deps(package: &str, name: &str, deps: &[&str]) -> Node {
    let mut node = Node::model(package, name, "select 1");
    for dep in deps {
        node.depends_on.insert(UniqueId::from(*dep));
    }
    node
}

#[test]
fn test_add_nodes_rejects_duplicate_id() {
    let mut manifest = Manifest::new();
    manifest
        .add_nodes(vec![Node::model("shop", "orders", "select 1").with_path("models/a/orders.sql")])
        .unwrap();
    let err = manifest
        .add_nodes(vec![Node::model("shop", "orders", "select 2").with_path("models/b/orders.sql")])
        .unwrap_err();
    match err {
        CoreError::DuplicateResourceName {
            unique_id,
            first_path,
            second_path,
        } => {
            assert_eq!(unique_id, "model.shop.orders");
            assert_eq!(first_path, "models/a/orders.sql");
            assert_eq!(second_path, "models/b/orders.sql");
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn test_add_nodes_rejects_duplicate_of_disabled_node() {
    let mut legacy = Node::model("shop", "orders", "select 1").with_path("models/old/orders.sql");
    legacy.config.enabled = false;
    let mut manifest = Manifest::new();
    manifest.add_nodes(vec![legacy]).unwrap();

    let err = manifest
        .add_nodes(vec![Node::model("shop", "orders", "select 2").with_path("models/new/orders.sql")])
        .unwrap_err();
    assert!(matches!(
        err,
        CoreError::DuplicateResourceName { ref first_path, .. } if first_path == "models/old/orders.sql"
    ));
    assert!(manifest.nodes.is_empty());
    assert_eq!(manifest.disabled.len(), 1);
}

#[test]
fn test_add_nodes_routes_disabled_and_sources() {
    let mut disabled = Node::model("shop", "legacy", "select 1");
    disabled.config.enabled = false;
    let mut manifest = Manifest::new();
    manifest
        .add_nodes(vec![
            disabled,
            Node::source("shop", "raw", "payments"),
            Node::model("shop", "orders", "select 1"),
        ])
        .unwrap();

    assert_eq!(manifest.nodes.len(), 1);
    assert!(manifest.disabled.contains_key("model.shop.legacy"));
    assert!(manifest.sources.contains_key("source.shop.raw.payments"));
    assert!(manifest.get("source.shop.raw.payments").is_some());
}

#[test]
fn test_build_edges_populates_every_node() {
    let mut manifest = Manifest::new();
    manifest
        .add_nodes(vec![
            model_with_deps("shop", "a", &[]),
            model_with_deps("shop", "c", &["model.shop.a"]),
            model_with_deps("shop", "b", &["model.shop.a"]),
            model_with_deps("shop", "d", &["model.shop.c", "model.shop.b"]),
        ])
        .unwrap();
    manifest.build_edges();

    let forward = manifest.forward_edges();
    assert_eq!(forward["model.shop.a"], vec![UniqueId::from("model.shop.b"), UniqueId::from("model.shop.c")]);
    assert!(forward["model.shop.d"].is_empty());

    let backward = manifest.backward_edges();
    assert_eq!(backward["model.shop.d"], vec![UniqueId::from("model.shop.b"), UniqueId::from("model.shop.c")]);
    assert!(backward["model.shop.a"].is_empty());
}

#[test]
fn test_build_edges_includes_sources() {
    let mut manifest = Manifest::new();
    manifest
        .add_nodes(vec![
            Node::source("shop", "raw", "payments"),
            model_with_deps("shop", "stg_payments", &["source.shop.raw.payments"]),
        ])
        .unwrap();
    manifest.build_edges();
    assert_eq!(
        manifest.forward_edges()["source.shop.raw.payments"],
        vec![UniqueId::from("model.shop.stg_payments")]
    );
}

#[test]
fn test_find_by_name_prefers_current_package() {
    let mut manifest = Manifest::new();
    manifest
        .add_nodes(vec![
            Node::model("shop", "dates", "select 1"),
            Node::model("utils", "dates", "select 1"),
        ])
        .unwrap();

    let found = manifest
        .find_by_name("dates", None, "shop", NodeKind::REFABLE)
        .unwrap();
    assert_eq!(found.unique_id, "model.shop.dates");

    let explicit = manifest
        .find_by_name("dates", Some("utils"), "shop", NodeKind::REFABLE)
        .unwrap();
    assert_eq!(explicit.unique_id, "model.utils.dates");
}

#[test]
fn test_find_by_name_ambiguous_across_foreign_packages() {
    let mut manifest = Manifest::new();
    manifest
        .add_nodes(vec![
            Node::model("pkg_a", "dates", "select 1"),
            Node::model("pkg_b", "dates", "select 1"),
        ])
        .unwrap();
    let err = manifest
        .find_by_name("dates", None, "shop", NodeKind::REFABLE)
        .unwrap_err();
    assert_eq!(
        err,
        LookupError::Ambiguous(vec!["model.pkg_a.dates".into(), "model.pkg_b.dates".into()])
    );
}

#[test]
fn test_find_by_name_unique_foreign_match() {
    let mut manifest = Manifest::new();
    manifest
        .add_nodes(vec![Node::model("utils", "calendar", "select 1")])
        .unwrap();
    let found = manifest
        .find_by_name("calendar", None, "shop", NodeKind::REFABLE)
        .unwrap();
    assert_eq!(found.package_name, "utils");
}

#[test]
fn test_find_by_name_reports_disabled() {
    let mut node = Node::model("shop", "legacy", "select 1");
    node.config.enabled = false;
    let mut manifest = Manifest::new();
    manifest.add_nodes(vec![node]).unwrap();

    let err = manifest
        .find_by_name("legacy", None, "shop", NodeKind::REFABLE)
        .unwrap_err();
    assert_eq!(err, LookupError::Disabled);
    assert_eq!(
        manifest.find_by_name("nope", None, "shop", NodeKind::REFABLE).unwrap_err(),
        LookupError::NotFound
    );
}

#[test]
fn test_find_by_name_kind_filter() {
    let mut manifest = Manifest::new();
    manifest
        .add_nodes(vec![Node::new(NodeKind::Test, "shop", "not_null_id", "select 1")])
        .unwrap();
    assert_eq!(
        manifest
            .find_by_name("not_null_id", None, "shop", NodeKind::REFABLE)
            .unwrap_err(),
        LookupError::NotFound
    );
}

#[test]
fn test_find_by_name_includes_ephemeral() {
    let mut manifest = Manifest::new();
    manifest
        .add_nodes(vec![
            Node::model("shop", "b", "select 1").with_materialization(Materialization::Ephemeral)
        ])
        .unwrap();
    let node = manifest.find_by_name("b", None, "shop", NodeKind::REFABLE).unwrap();
    assert!(node.is_ephemeral());
}

#[test]
fn test_find_source() {
    let mut manifest = Manifest::new();
    manifest
        .add_nodes(vec![Node::source("shop", "raw", "payments")])
        .unwrap();
    assert!(manifest.find_source("raw", "payments", "shop").is_ok());
    assert_eq!(
        manifest.find_source("raw", "refunds", "shop").unwrap_err(),
        LookupError::NotFound
    );
}

#[test]
fn test_lookup_error_into_core() {
    let err = LookupError::NotFound.into_core(&UniqueId::from("model.shop.c"), "ref('x')".into());
    assert_eq!(err.to_string(), "[E004] Node 'model.shop.c' depends on ref('x') which was not found");
}

#[test]
fn test_patch_nodes_returns_unmatched() {
    let mut manifest = Manifest::new();
    manifest.add_nodes(vec![Node::model("shop", "orders", "select 1")]).unwrap();

    let unmatched = manifest.patch_nodes(vec![
        NodePatch {
            name: "orders".into(),
            package_name: "shop".into(),
            resource_type: NodeKind::Model,
            description: "One row per order".into(),
            columns: vec![ColumnInfo {
                name: "id".into(),
                description: "Primary key".into(),
            }],
        },
        NodePatch {
            name: "ghost".into(),
            package_name: "shop".into(),
            resource_type: NodeKind::Model,
            description: String::new(),
            columns: vec![],
        },
    ]);

    assert_eq!(unmatched, vec!["ghost"]);
    let orders = manifest.get("model.shop.orders").unwrap();
    assert_eq!(orders.description, "One row per order");
    assert_eq!(orders.columns["id"].description, "Primary key");
}

#[test]
fn test_find_doc() {
    let mut manifest = Manifest::new();
    manifest.add_doc(Doc::new("utils", "orders", "from utils")).unwrap();
    manifest.add_doc(Doc::new("shop", "orders", "from shop")).unwrap();
    manifest.add_doc(Doc::new("utils", "payments", "utils payments")).unwrap();

    assert_eq!(manifest.find_doc("orders", None, "shop").unwrap().block_contents, "from shop");
    assert_eq!(
        manifest.find_doc("orders", Some("utils"), "shop").unwrap().block_contents,
        "from utils"
    );
    assert_eq!(
        manifest.find_doc("payments", None, "shop").unwrap().block_contents,
        "utils payments"
    );
    assert_eq!(manifest.find_doc("missing", None, "shop"), Err(LookupError::NotFound));
    assert_eq!(
        manifest.find_doc("payments", Some("shop"), "shop"),
        Err(LookupError::NotFound)
    );
}

#[test]
fn test_find_doc_ambiguous_across_foreign_packages() {
    let mut manifest = Manifest::new();
    manifest.add_doc(Doc::new("utils", "orders", "from utils")).unwrap();
    manifest.add_doc(Doc::new("audit", "orders", "from audit")).unwrap();

    assert_eq!(
        manifest.find_doc("orders", None, "shop"),
        Err(LookupError::Ambiguous(vec![
            "doc.audit.orders".to_string(),
            "doc.utils.orders".to_string(),
        ]))
    );
}

#[test]
fn test_add_macro_duplicate() {
    let mut manifest = Manifest::new();
    manifest.add_macro(Macro::new("shop", "cents", "{% macro cents(c) %}{{ c }}/100{% endmacro %}")).unwrap();
    assert!(manifest.add_macro(Macro::new("shop", "cents", "")).is_err());
}
