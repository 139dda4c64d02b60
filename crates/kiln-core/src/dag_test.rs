use super::*;
use crate::node::Node;

fn manifest_from(edges: &[(&str, &[&str])]) -> Manifest {
    let mut manifest = Manifest::new();
    let nodes = edges.iter().map(|(name, deps)| {
        let mut node = Node::model("shop", name, "select 1");
        for dep in *deps {
            node.depends_on.insert(UniqueId::from(format!("model.shop.{}", dep)));
        }
        node
    });
    manifest.add_nodes(nodes).unwrap();
    manifest
}

fn id(name: &str) -> UniqueId {
    UniqueId::from(format!("model.shop.{}", name))
}

#[test]
fn test_topological_order() {
    let manifest = manifest_from(&[
        ("fct_orders", &["stg_orders", "stg_customers"]),
        ("stg_orders", &[]),
        ("stg_customers", &[]),
    ]);
    let graph = NodeGraph::from_manifest(&manifest).unwrap();
    let order = graph.topological_order().unwrap();

    let pos = |name: &str| order.iter().position(|m| *m == id(name)).unwrap();
    assert!(pos("fct_orders") > pos("stg_orders"));
    assert!(pos("fct_orders") > pos("stg_customers"));
}

#[test]
fn test_circular_dependency_reports_path() {
    let manifest = manifest_from(&[("a", &["c"]), ("b", &["a"]), ("c", &["b"])]);
    let err = NodeGraph::from_manifest(&manifest).unwrap_err();
    match err {
        CoreError::CircularDependency { cycle } => {
            let parts: Vec<&str> = cycle.split(" -> ").collect();
            assert_eq!(parts.len(), 4, "cycle was {cycle}");
            assert_eq!(parts.first(), parts.last());
            for name in ["a", "b", "c"] {
                assert!(cycle.contains(&format!("model.shop.{name}")));
            }
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn test_self_reference_is_a_cycle() {
    let manifest = manifest_from(&[("a", &["a"])]);
    let err = NodeGraph::from_manifest(&manifest).unwrap_err();
    assert_eq!(
        err,
        CoreError::CircularDependency {
            cycle: "model.shop.a -> model.shop.a".into()
        }
    );
}

#[test]
fn test_unknown_dependencies_are_ignored() {
    let manifest = manifest_from(&[("a", &["ghost"])]);
    let graph = NodeGraph::from_manifest(&manifest).unwrap();
    assert!(graph.parents(&id("a")).is_empty());
    assert_eq!(graph.len(), 1);
}

#[test]
fn test_ancestors_and_descendants() {
    let manifest = manifest_from(&[
        ("raw", &[]),
        ("stg", &["raw"]),
        ("fct", &["stg"]),
        ("other", &[]),
    ]);
    let graph = NodeGraph::from_manifest(&manifest).unwrap();

    let mut ancestors = graph.ancestors(&id("fct"));
    ancestors.sort();
    assert_eq!(ancestors, vec![id("raw"), id("stg")]);

    let mut descendants = graph.descendants(&id("raw"));
    descendants.sort();
    assert_eq!(descendants, vec![id("fct"), id("stg")]);

    assert!(graph.ancestors(&id("other")).is_empty());
    assert!(graph.ancestors("model.shop.missing").is_empty());
}

#[test]
fn test_parents_and_children() {
    let manifest = manifest_from(&[("a", &[]), ("b", &["a"]), ("c", &["a", "b"])]);
    let graph = NodeGraph::from_manifest(&manifest).unwrap();
    assert_eq!(graph.children(&id("a")), vec![id("b"), id("c")]);
    assert_eq!(graph.parents(&id("c")), vec![id("a"), id("b")]);
}
