use super::*;
use kiln_core::NodeKind;
use kiln_db::DuckDbBackend;
use serde_json::json;
use std::io::Write;

fn located(mut node: Node, sql: &str) -> Node {
    node.database = "memory".into();
    node.schema = "main".into();
    node.compiled_code = Some(sql.to_string());
    node
}

fn model(name: &str, materialized: Materialization, sql: &str) -> Node {
    located(
        Node::model("shop", name, sql).with_materialization(materialized),
        sql,
    )
}

fn setup() -> (Arc<DuckDbBackend>, NodeRunner) {
    let db = Arc::new(DuckDbBackend::in_memory().unwrap());
    let runner = NodeRunner::new(
        db.clone(),
        Arc::new(JinjaEnvironment::default()),
        QuotePolicy::default(),
    );
    (db, runner)
}

async fn scalar(db: &DuckDbBackend, sql: &str) -> serde_json::Value {
    db.execute(sql).await.unwrap().first_value().cloned().unwrap()
}

#[tokio::test]
async fn test_table_is_built_then_swapped() {
    let (db, runner) = setup();
    let node = model("orders", Materialization::Table, "select 1 as id");

    let first = runner.run(&node).await.unwrap();
    assert_eq!(first.status, RunStatus::Success);
    assert!(first.started_at.is_some());

    let rebuilt = model("orders", Materialization::Table, "select 1 as id union all select 2");
    runner.run(&rebuilt).await.unwrap();

    assert_eq!(scalar(&db, "select count(*) from main.orders").await, json!(2));
    assert!(!db.already_exists("main", "orders__kiln_tmp").await.unwrap());
}

#[tokio::test]
async fn test_view_replaces_existing_table() {
    let (db, runner) = setup();
    runner
        .run(&model("orders", Materialization::Table, "select 1 as id"))
        .await
        .unwrap();
    let result = runner
        .run(&model("orders", Materialization::View, "select 7 as id"))
        .await
        .unwrap();

    assert_eq!(result.status, RunStatus::Success, "{:?}", result.message);
    assert_eq!(
        db.relation_cache().lookup("main", "orders"),
        Some(Some(kiln_core::RelationKind::View))
    );
    assert_eq!(scalar(&db, "select id from main.orders").await, json!(7));
}

#[tokio::test]
async fn test_incremental_appends() {
    let (db, runner) = setup();
    let node = model("events", Materialization::Incremental, "select 1 as id");

    runner.run(&node).await.unwrap();
    let second = runner.run(&node).await.unwrap();

    assert_eq!(second.message.as_deref(), Some(r#"inserted into "memory"."main"."events""#));
    assert_eq!(scalar(&db, "select count(*) from main.events").await, json!(2));
}

#[tokio::test]
async fn test_snapshot_adds_timestamp() {
    let (db, runner) = setup();
    let node = located(
        Node::new(NodeKind::Snapshot, "shop", "prices", ""),
        "select 'tea' as item, 3 as price",
    );

    runner.run(&node).await.unwrap();
    runner.run(&node).await.unwrap();

    assert_eq!(scalar(&db, "select count(*) from main.prices").await, json!(2));
    let columns = db.get_columns_in_table("main", "prices").await.unwrap();
    assert_eq!(columns.last().unwrap().name, SNAPSHOT_AT_COLUMN);
}

#[tokio::test]
async fn test_data_test_statuses() {
    let (_db, runner) = setup();
    let passing = located(
        Node::new(NodeKind::Test, "shop", "no_rows", ""),
        "select 1 where false",
    );
    let failing = located(
        Node::new(NodeKind::Test, "shop", "two_rows", ""),
        "select 1 union all select 2",
    );
    let mut warning = failing.clone();
    warning.config.severity = Severity::Warn;

    let pass = runner.run(&passing).await.unwrap();
    assert_eq!(pass.status, RunStatus::Success);
    assert_eq!(pass.failures, Some(0));

    let fail = runner.run(&failing).await.unwrap();
    assert_eq!(fail.status, RunStatus::Fail);
    assert_eq!(fail.failures, Some(2));
    assert_eq!(fail.message.as_deref(), Some("Got 2 failing rows"));

    assert_eq!(runner.run(&warning).await.unwrap().status, RunStatus::Warn);
}

#[tokio::test]
async fn test_operation_runs_statements() {
    let (db, runner) = setup();
    let node = located(
        Node::new(NodeKind::Operation, "shop", "setup", ""),
        "create table audit (id int); insert into audit values (1);",
    );
    assert_eq!(runner.run(&node).await.unwrap().status, RunStatus::Success);
    assert_eq!(scalar(&db, "select count(*) from audit").await, json!(1));
}

#[tokio::test]
async fn test_node_hooks_see_this() {
    let (db, runner) = setup();
    db.execute_batch("create table hook_log (target varchar)")
        .await
        .unwrap();
    let mut node = model("orders", Materialization::Table, "select 1 as id");
    node.config.pre_hook = vec!["insert into hook_log values ('pre')".into()];
    node.config.post_hook = vec![
        "insert into hook_log select '{{ this }}' from {{ this }}".into(),
    ];

    let result = runner.run(&node).await.unwrap();
    assert_eq!(result.status, RunStatus::Success, "{:?}", result.message);
    let rows = db
        .execute("select target from hook_log order by target desc")
        .await
        .unwrap()
        .rows;
    assert_eq!(
        rows,
        vec![vec![json!("pre")], vec![json!(r#""memory"."main"."orders""#)]]
    );
}

#[tokio::test]
async fn test_failing_hook_marks_error() {
    let (_db, runner) = setup();
    let mut node = model("orders", Materialization::Table, "select 1 as id");
    node.config.post_hook = vec!["select * from missing_table".into()];

    let result = runner.run(&node).await.unwrap();
    assert_eq!(result.status, RunStatus::Error);
    assert!(result.message.unwrap().starts_with("post-hook failed"));
}

#[tokio::test]
async fn test_database_error_is_a_node_error() {
    let (_db, runner) = setup();
    let node = model("broken", Materialization::Table, "select * from nowhere");
    let result = runner.run(&node).await.unwrap();
    assert_eq!(result.status, RunStatus::Error);
    assert!(result.message.unwrap().contains("[D003]"));
}

#[tokio::test]
async fn test_seed_loads_csv() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("countries.csv");
    let mut file = std::fs::File::create(&path).unwrap();
    writeln!(file, "code,name\nNL,Netherlands").unwrap();

    let (db, runner) = setup();
    let mut seed = Node::new(NodeKind::Seed, "shop", "countries", "");
    seed.database = "memory".into();
    seed.schema = "main".into();
    seed.path = path;

    assert_eq!(runner.run(&seed).await.unwrap().status, RunStatus::Success);
    assert_eq!(scalar(&db, "select name from main.countries").await, json!("Netherlands"));
}

#[tokio::test]
async fn test_unschedulable_nodes_are_internal_errors() {
    let (_db, runner) = setup();
    let source = located(Node::source("shop", "raw", "payments"), "");
    assert!(matches!(runner.run(&source).await, Err(ExecError::Internal(_))));

    let ephemeral = model("eph", Materialization::Ephemeral, "select 1");
    assert!(matches!(runner.run(&ephemeral).await, Err(ExecError::Internal(_))));
}
