//! End-to-end behavior of a database handle.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::{Arc, Barrier};
use std::thread;
use std::time::Duration;

use quill_core::{CompareOp, DataType, ErrorKind, Value};
use quill_database::{Database, DatabaseConfig, ExecutionResult};
use quill_query::ast::{AggregateFunc, ColumnDef, Command, Condition, JoinCondition, SelectItem, SelectQuery};
use quill_storage::{LockConfig, LockManager};

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_max_level(tracing::Level::DEBUG)
        .try_init();
}

fn open(dir: &Path) -> Database {
    init_tracing();
    Database::open(DatabaseConfig::new(dir)).unwrap()
}

fn create(db: &mut Database, table: &str, columns: &[(&str, DataType)], primary_key: Option<&str>) {
    db.execute(Command::CreateTable {
        table: table.into(),
        columns: columns.iter().map(|(n, t)| ColumnDef::new(*n, *t)).collect(),
        primary_key: primary_key.map(str::to_string),
        unique: vec![],
        foreign_keys: BTreeMap::new(),
    })
    .unwrap();
}

fn insert(db: &mut Database, table: &str, values: Vec<Value>) -> quill_core::Result<ExecutionResult> {
    db.execute(Command::Insert {
        table: table.into(),
        columns: None,
        values,
    })
}

fn select(db: &mut Database, query: SelectQuery) -> Vec<Vec<Value>> {
    db.execute(Command::Select(query))
        .unwrap()
        .into_rows()
        .unwrap()
        .into_rows()
        .into_iter()
        .map(|r| r.into_values())
        .collect()
}

#[test]
fn duplicate_primary_key_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let mut db = open(dir.path());
    create(&mut db, "t", &[("id", DataType::Int), ("name", DataType::Str)], Some("id"));

    insert(&mut db, "t", vec![Value::Int(1), Value::from("a")]).unwrap();
    let err = insert(&mut db, "t", vec![Value::Int(1), Value::from("b")]).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ConstraintViolation);

    assert_eq!(
        select(&mut db, SelectQuery::all("t")),
        vec![vec![Value::Int(1), Value::from("a")]]
    );
    let reopened = &mut open(dir.path());
    assert_eq!(select(reopened, SelectQuery::all("t")).len(), 1);
}

#[test]
fn add_column_fills_defaults() {
    let dir = tempfile::tempdir().unwrap();
    let mut db = open(dir.path());
    create(&mut db, "t", &[("id", DataType::Int), ("name", DataType::Str)], Some("id"));
    insert(&mut db, "t", vec![Value::Int(1), Value::from("a")]).unwrap();
    insert(&mut db, "t", vec![Value::Int(2), Value::from("b")]).unwrap();

    db.execute(Command::AlterAddColumn {
        table: "t".into(),
        column: "age".into(),
        data_type: DataType::Int,
    })
    .unwrap();
    db.execute(Command::AlterAddColumn {
        table: "t".into(),
        column: "score".into(),
        data_type: DataType::Float,
    })
    .unwrap();

    let rows = select(&mut db, SelectQuery::columns("t", &["age", "score"]));
    assert_eq!(rows, vec![vec![Value::Int(0), Value::Float(0.0)]; 2]);

    let err = db
        .execute(Command::AlterAddColumn {
            table: "t".into(),
            column: "age".into(),
            data_type: DataType::Str,
        })
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Schema);

    // The new schema survives a reopen.
    let mut reopened = open(dir.path());
    let rows = select(&mut reopened, SelectQuery::all("t"));
    assert_eq!(rows[1], vec![Value::Int(2), Value::from("b"), Value::Int(0), Value::Float(0.0)]);
}

#[test]
fn students_join_courses() {
    let dir = tempfile::tempdir().unwrap();
    let mut db = open(dir.path());
    create(
        &mut db,
        "students",
        &[("id", DataType::Int), ("name", DataType::Str), ("course_id", DataType::Int)],
        Some("id"),
    );
    create(&mut db, "courses", &[("id", DataType::Int), ("title", DataType::Str)], Some("id"));
    insert(&mut db, "students", vec![Value::Int(101), Value::from("Collins"), Value::Int(1)]).unwrap();
    insert(&mut db, "students", vec![Value::Int(102), Value::from("John"), Value::Int(2)]).unwrap();
    insert(&mut db, "courses", vec![Value::Int(1), Value::from("CS")]).unwrap();
    insert(&mut db, "courses", vec![Value::Int(2), Value::from("EE")]).unwrap();

    let result = db
        .execute(Command::Join {
            left: "students".into(),
            right: "courses".into(),
            on: JoinCondition::new("students", "course_id", "courses", "id"),
            columns: vec![],
        })
        .unwrap()
        .into_rows()
        .unwrap();
    assert_eq!(result.columns(), ["id", "name", "course_id", "title"]);

    let mut rows: Vec<Vec<Value>> = result.into_rows().into_iter().map(|r| r.into_values()).collect();
    rows.sort();
    assert_eq!(
        rows,
        vec![
            vec![Value::Int(101), Value::from("Collins"), Value::Int(1), Value::from("CS")],
            vec![Value::Int(102), Value::from("John"), Value::Int(2), Value::from("EE")],
        ]
    );
}

#[test]
fn rollback_discards_staged_insert() {
    let dir = tempfile::tempdir().unwrap();
    let mut db = open(dir.path());
    create(&mut db, "t", &[("id", DataType::Int), ("name", DataType::Str)], Some("id"));

    db.execute(Command::Begin).unwrap();
    insert(&mut db, "t", vec![Value::Int(7), Value::from("staged")]).unwrap();
    assert_eq!(select(&mut db, SelectQuery::all("t")).len(), 1);
    db.execute(Command::Rollback).unwrap();

    assert!(select(&mut db, SelectQuery::all("t")).is_empty());
    let mut reopened = open(dir.path());
    assert!(select(&mut reopened, SelectQuery::all("t")).is_empty());
}

#[test]
fn simultaneous_acquire_has_one_winner() {
    let dir = tempfile::tempdir().unwrap();
    let config = LockConfig {
        timeout: Duration::from_millis(300),
        retry_interval: Duration::from_millis(20),
        stale_after: None,
    };
    let barrier = Arc::new(Barrier::new(2));

    let handles: Vec<_> = (0..2)
        .map(|_| {
            let dir = dir.path().to_path_buf();
            let config = config.clone();
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                let locks = LockManager::new(&dir, config);
                barrier.wait();
                let first = locks.try_acquire("t").unwrap();
                let immediate = first.is_some();
                // The winner holds on long enough for the loser to retry.
                let outcome = match first {
                    Some(guard) => {
                        thread::sleep(Duration::from_millis(100));
                        drop(guard);
                        Ok(())
                    }
                    None => locks.acquire("t").map(drop),
                };
                (immediate, outcome.map_err(|e| e.kind()))
            })
        })
        .collect();

    let results: Vec<(bool, Result<(), ErrorKind>)> = handles.into_iter().map(|h| h.join().unwrap()).collect();
    assert_eq!(results.iter().filter(|(immediate, _)| *immediate).count(), 1);
    for (_, outcome) in &results {
        assert!(matches!(outcome, Ok(()) | Err(ErrorKind::DatabaseBusy)));
    }
}

#[test]
fn busy_table_fails_after_timeout() {
    let dir = tempfile::tempdir().unwrap();
    init_tracing();
    let config = DatabaseConfig::new(dir.path())
        .with_lock_timeout(Duration::from_millis(100))
        .with_lock_retry_interval(Duration::from_millis(10))
        .with_stale_lock_after(None);
    let mut db = Database::open(config.clone()).unwrap();
    create(&mut db, "t", &[("id", DataType::Int)], None);

    let other = LockManager::new(dir.path(), config.lock_config());
    let held = other.acquire("t").unwrap();
    let err = insert(&mut db, "t", vec![Value::Int(1)]).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::DatabaseBusy);

    drop(held);
    insert(&mut db, "t", vec![Value::Int(1)]).unwrap();
    assert_eq!(select(&mut db, SelectQuery::all("t")).len(), 1);
}

#[test]
fn stale_lock_is_reclaimed() {
    let dir = tempfile::tempdir().unwrap();
    init_tracing();
    let config = DatabaseConfig::new(dir.path())
        .with_lock_timeout(Duration::from_millis(500))
        .with_lock_retry_interval(Duration::from_millis(10))
        .with_stale_lock_after(Some(Duration::from_millis(50)));
    let mut db = Database::open(config.clone()).unwrap();
    create(&mut db, "t", &[("id", DataType::Int)], None);

    // A crashed holder never removes its marker.
    let crashed = LockManager::new(dir.path(), config.lock_config());
    std::mem::forget(crashed.acquire("t").unwrap());
    thread::sleep(Duration::from_millis(100));

    insert(&mut db, "t", vec![Value::Int(1)]).unwrap();
    assert!(!crashed.is_locked("t"));
}

#[test]
fn manual_stale_lock_reclamation() {
    let dir = tempfile::tempdir().unwrap();
    let db = open(dir.path());
    let locks = LockManager::new(dir.path(), LockConfig::default());
    std::mem::forget(locks.acquire("orders").unwrap());

    assert!(db.reclaim_stale_locks(Duration::from_secs(60)).unwrap().is_empty());
    thread::sleep(Duration::from_millis(20));
    assert_eq!(db.reclaim_stale_locks(Duration::from_millis(1)).unwrap(), vec!["orders"]);
    assert!(!locks.is_locked("orders"));
}

#[test]
fn aggregates_over_table() {
    let dir = tempfile::tempdir().unwrap();
    let mut db = open(dir.path());
    create(
        &mut db,
        "orders",
        &[("id", DataType::Int), ("customer", DataType::Str), ("total", DataType::Float)],
        Some("id"),
    );
    for (id, customer, total) in [(1, "ann", 10.0), (2, "bob", 20.0), (3, "ann", 30.0)] {
        insert(&mut db, "orders", vec![Value::Int(id), Value::from(customer), Value::Float(total)]).unwrap();
    }

    let query = SelectQuery::all("orders")
        .item(SelectItem::aggregate(AggregateFunc::Count, None))
        .item(SelectItem::aggregate(AggregateFunc::Sum, Some("total")))
        .item(SelectItem::aggregate(AggregateFunc::Avg, Some("total")))
        .item(SelectItem::aggregate(AggregateFunc::Max, Some("id")))
        .filter(Condition::equals("customer", "ann"));
    let result = db.execute(Command::Select(query)).unwrap().into_rows().unwrap();
    assert_eq!(result.columns(), ["COUNT(*)", "SUM(total)", "AVG(total)", "MAX(id)"]);
    assert_eq!(
        result.rows()[0].values(),
        [Value::Int(2), Value::Float(40.0), Value::Float(20.0), Value::Int(3)]
    );

    let sum_names = SelectQuery::all("orders").item(SelectItem::aggregate(AggregateFunc::Sum, Some("customer")));
    let err = db.execute(Command::Select(sum_names)).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::TypeMismatch);
}

#[test]
fn in_subquery_filters_writes_and_reads() {
    let dir = tempfile::tempdir().unwrap();
    let mut db = open(dir.path());
    create(&mut db, "customers", &[("id", DataType::Int), ("vip", DataType::Int)], Some("id"));
    create(&mut db, "orders", &[("id", DataType::Int), ("customer_id", DataType::Int)], Some("id"));
    for (id, vip) in [(1, 1), (2, 0), (3, 1)] {
        insert(&mut db, "customers", vec![Value::Int(id), Value::Int(vip)]).unwrap();
    }
    for (id, customer) in [(10, 1), (11, 2), (12, 3), (13, 3)] {
        insert(&mut db, "orders", vec![Value::Int(id), Value::Int(customer)]).unwrap();
    }

    let vips = SelectQuery::columns("customers", &["id"]).filter(Condition::equals("vip", 1i64));
    let rows = select(
        &mut db,
        SelectQuery::columns("orders", &["id"]).filter(Condition::in_subquery("customer_id", vips.clone())),
    );
    assert_eq!(rows, vec![vec![Value::Int(10)], vec![Value::Int(12)], vec![Value::Int(13)]]);

    let deleted = db
        .execute(Command::Delete {
            table: "orders".into(),
            condition: Some(Condition::in_subquery("customer_id", vips)),
        })
        .unwrap();
    assert_eq!(deleted, ExecutionResult::Affected(3));
    assert_eq!(select(&mut db, SelectQuery::all("orders")), vec![vec![Value::Int(11), Value::Int(2)]]);
}

#[test]
fn select_limit_and_filters() {
    let dir = tempfile::tempdir().unwrap();
    let mut db = open(dir.path());
    create(&mut db, "n", &[("v", DataType::Int)], None);
    for v in 0..10 {
        insert(&mut db, "n", vec![Value::Int(v)]).unwrap();
    }
    let rows = select(
        &mut db,
        SelectQuery::all("n").filter(Condition::compare("v", CompareOp::Gt, 3i64)).limit(2),
    );
    assert_eq!(rows, vec![vec![Value::Int(4)], vec![Value::Int(5)]]);

    let err = db
        .execute(Command::Select(
            SelectQuery::all("n").filter(Condition::equals("v", "three")),
        ))
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::TypeMismatch);

    let err = db
        .execute(Command::Select(SelectQuery::columns("n", &["missing"])))
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Schema);
}

#[test]
fn type_checks_on_write() {
    let dir = tempfile::tempdir().unwrap();
    let mut db = open(dir.path());
    create(&mut db, "m", &[("id", DataType::Int), ("price", DataType::Float)], Some("id"));

    insert(&mut db, "m", vec![Value::Int(1), Value::Int(3)]).unwrap();
    let rows = select(&mut db, SelectQuery::all("m"));
    assert_eq!(rows[0][1], Value::Float(3.0));

    let err = insert(&mut db, "m", vec![Value::Float(2.5), Value::Float(1.0)]).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::TypeMismatch);
    let err = insert(&mut db, "m", vec![Value::Int(2), Value::from("cheap")]).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::TypeMismatch);
    let err = db
        .execute(Command::Update {
            table: "m".into(),
            assignments: vec![("price".into(), Value::from("free"))],
            condition: None,
        })
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::TypeMismatch);
    let err = insert(&mut db, "m", vec![Value::Int(2), Value::Float(f64::NAN)]).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::TypeMismatch);
    assert_eq!(select(&mut db, SelectQuery::all("m")).len(), 1);

    // The table file is still readable by a fresh handle.
    let mut reopened = open(dir.path());
    assert!(!reopened.is_quarantined("m"));
    assert_eq!(select(&mut reopened, SelectQuery::all("m")).len(), 1);
}
