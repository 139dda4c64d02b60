use super::*;
use serde_json::json;
use std::io::Write;

fn rel(identifier: &str) -> Relation {
    Relation::new("memory", "main", identifier)
}

#[tokio::test]
async fn test_in_memory() {
    let db = DuckDbBackend::in_memory().unwrap();
    assert_eq!(db.adapter_type(), "duckdb");
    assert_eq!(db.default_database(), "memory");
}

#[tokio::test]
async fn test_file_catalog_is_named_after_the_file() {
    let dir = tempfile::tempdir().unwrap();
    let db = DuckDbBackend::from_path(&dir.path().join("warehouse.duckdb")).unwrap();
    assert_eq!(db.default_database(), "warehouse");

    db.create_schema("", "staging").await.unwrap();
    db.create_table_as(&Relation::new("", "staging", "orders"), "select 1 as id")
        .await
        .unwrap();
    assert!(db.already_exists("staging", "orders").await.unwrap());
}

#[tokio::test]
async fn test_execute_returns_rows() {
    let db = DuckDbBackend::in_memory().unwrap();
    let result = db
        .execute("select 1 as id, 'hello' as name, 2.5::double as score, true as flag, null as missing")
        .await
        .unwrap();
    assert_eq!(result.columns, vec!["id", "name", "score", "flag", "missing"]);
    assert_eq!(
        result.rows,
        vec![vec![json!(1), json!("hello"), json!(2.5), json!(true), json!(null)]]
    );
    assert_eq!(result.first_value(), Some(&json!(1)));
}

#[tokio::test]
async fn test_create_table_as() {
    let db = DuckDbBackend::in_memory().unwrap();
    db.create_table_as(&rel("test_table"), "select 1 as id, 'hello' as name")
        .await
        .unwrap();

    assert!(db.already_exists("main", "test_table").await.unwrap());
    let count = db.execute("select count(*) from main.test_table").await.unwrap();
    assert_eq!(count.first_value(), Some(&json!(1)));
}

#[tokio::test]
async fn test_create_view_as() {
    let db = DuckDbBackend::in_memory().unwrap();
    db.create_view_as(&rel("test_view"), "select 1 as id")
        .await
        .unwrap();

    assert!(db.already_exists("main", "test_view").await.unwrap());
    assert_eq!(
        db.relation_cache().lookup("main", "test_view"),
        Some(Some(RelationKind::View))
    );
}

#[tokio::test]
async fn test_relation_not_exists() {
    let db = DuckDbBackend::in_memory().unwrap();
    assert!(!db.already_exists("main", "nonexistent").await.unwrap());
}

#[tokio::test]
async fn test_cache_sees_relations_created_by_statements() {
    let db = DuckDbBackend::in_memory().unwrap();
    assert!(!db.already_exists("main", "t1").await.unwrap());

    db.execute_batch("CREATE TABLE t1 (id INT); CREATE VIEW v1 AS SELECT * FROM t1;")
        .await
        .unwrap();

    assert!(db.already_exists("main", "t1").await.unwrap());
    assert!(db.already_exists("main", "v1").await.unwrap());
}

#[tokio::test]
async fn test_drop_relation() {
    let db = DuckDbBackend::in_memory().unwrap();
    db.create_table_as(&rel("to_drop"), "select 1 as id")
        .await
        .unwrap();
    db.create_view_as(&rel("view_to_drop"), "select 1 as id")
        .await
        .unwrap();

    db.drop_relation(&rel("to_drop")).await.unwrap();
    db.drop_relation(&rel("view_to_drop")).await.unwrap();
    db.drop_relation(&rel("never_existed")).await.unwrap();

    assert!(!db.already_exists("main", "to_drop").await.unwrap());
    assert!(!db.already_exists("main", "view_to_drop").await.unwrap());
}

#[tokio::test]
async fn test_rename_relation() {
    let db = DuckDbBackend::in_memory().unwrap();
    db.create_table_as(&rel("orders__kiln_tmp"), "select 1 as id")
        .await
        .unwrap();

    db.rename_relation(&rel("orders__kiln_tmp"), "orders")
        .await
        .unwrap();

    assert!(db.already_exists("main", "orders").await.unwrap());
    assert!(!db.already_exists("main", "orders__kiln_tmp").await.unwrap());

    db.relation_cache().clear();
    assert!(db.already_exists("main", "orders").await.unwrap());
}

#[tokio::test]
async fn test_rename_missing_relation() {
    let db = DuckDbBackend::in_memory().unwrap();
    let err = db.rename_relation(&rel("ghost"), "spirit").await.unwrap_err();
    assert!(matches!(err, DbError::TableNotFound(_)));
}

#[tokio::test]
async fn test_create_schema() {
    let db = DuckDbBackend::in_memory().unwrap();

    db.create_schema("memory", "staging").await.unwrap();
    db.create_table_as(&Relation::new("memory", "staging", "test_table"), "select 1 as id")
        .await
        .unwrap();
    assert!(db.already_exists("staging", "test_table").await.unwrap());

    // Creating the same schema again should not fail (IF NOT EXISTS)
    db.create_schema("memory", "staging").await.unwrap();
}

#[tokio::test]
async fn test_get_columns_in_table() {
    let db = DuckDbBackend::in_memory().unwrap();
    db.create_table_as(&rel("typed"), "select 1::integer as id, 'x'::varchar as name")
        .await
        .unwrap();

    let columns = db.get_columns_in_table("main", "typed").await.unwrap();
    let names: Vec<&str> = columns.iter().map(|c| c.name.as_str()).collect();
    assert_eq!(names, vec!["id", "name"]);
    assert_eq!(columns[0].data_type, "INTEGER");
    assert_eq!(columns[1].data_type, "VARCHAR");
}

#[tokio::test]
async fn test_load_csv() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("countries.csv");
    let mut file = std::fs::File::create(&path).unwrap();
    writeln!(file, "code,name\nNL,Netherlands\nBE,Belgium").unwrap();

    let db = DuckDbBackend::in_memory().unwrap();
    db.load_csv(&rel("countries"), path.to_str().unwrap())
        .await
        .unwrap();

    let result = db
        .execute("select name from main.countries order by code")
        .await
        .unwrap();
    assert_eq!(result.rows, vec![vec![json!("Belgium")], vec![json!("Netherlands")]]);
}

#[tokio::test]
async fn test_load_csv_missing_file() {
    let db = DuckDbBackend::in_memory().unwrap();
    let err = db
        .load_csv(&rel("nothing"), "/definitely/not/here.csv")
        .await
        .unwrap_err();
    assert!(matches!(err, DbError::CsvError(_)));
}

#[tokio::test]
async fn test_execution_error_includes_sql() {
    let db = DuckDbBackend::in_memory().unwrap();
    let err = db.execute("select * from").await.unwrap_err();
    match err {
        DbError::ExecutionError(msg) => assert!(msg.contains("select * from")),
        other => panic!("expected execution error, got {:?}", other),
    }
}

#[tokio::test]
async fn test_missing_table_is_classified() {
    let db = DuckDbBackend::in_memory().unwrap();
    let err = db.execute("select * from nope").await.unwrap_err();
    assert!(matches!(err, DbError::TableNotFound(_)));
    assert!(!err.is_internal());
}

#[test]
fn test_is_read_only() {
    assert!(is_read_only("  SELECT 1"));
    assert!(is_read_only("with x as (select 1) select * from x"));
    assert!(!is_read_only("create table t as select 1"));
    assert!(!is_read_only(""));
}
