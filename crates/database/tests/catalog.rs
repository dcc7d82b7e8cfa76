//! Schema changes, the metadata descriptor and recovery from damaged files.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use quill_core::{DataType, ErrorKind, Value};
use quill_database::{Catalog, Database, DatabaseConfig, ExecutionResult};
use quill_query::ast::{ColumnDef, Command, SelectQuery};
use quill_storage::file::table_path;

fn open(dir: &Path) -> Database {
    Database::open(DatabaseConfig::new(dir)).unwrap()
}

fn create_people(db: &mut Database) {
    db.execute(Command::CreateTable {
        table: "people".into(),
        columns: vec![
            ColumnDef::new("id", DataType::Int),
            ColumnDef::new("email", DataType::Str),
            ColumnDef::new("team_id", DataType::Int),
        ],
        primary_key: Some("id".into()),
        unique: vec!["email".into()],
        foreign_keys: BTreeMap::from([("team_id".to_string(), "teams.id".to_string())]),
    })
    .unwrap();
    for (id, email, team) in [(1, "a@x", 10), (2, "b@x", 20)] {
        db.execute(Command::Insert {
            table: "people".into(),
            columns: None,
            values: vec![Value::Int(id), Value::from(email), Value::Int(team)],
        })
        .unwrap();
    }
}

fn rows(db: &mut Database, table: &str) -> Vec<Vec<Value>> {
    db.execute(Command::Select(SelectQuery::all(table)))
        .unwrap()
        .into_rows()
        .unwrap()
        .into_rows()
        .into_iter()
        .map(|r| r.into_values())
        .collect()
}

fn metadata(dir: &Path) -> Catalog {
    Catalog::load(&dir.join("metadata.json")).unwrap()
}

#[test]
fn metadata_follows_every_schema_change() {
    let dir = tempfile::tempdir().unwrap();
    let mut db = open(dir.path());
    create_people(&mut db);

    let people = metadata(dir.path());
    let descriptor = people.get("people").unwrap();
    assert_eq!(descriptor.columns, vec!["id", "email", "team_id"]);
    assert_eq!(descriptor.primary_key.as_deref(), Some("id"));
    assert_eq!(descriptor.unique_columns, vec!["email"]);
    assert_eq!(descriptor.foreign_keys["team_id"], "teams.id");

    db.execute(Command::AlterRenameColumn {
        table: "people".into(),
        from: "email".into(),
        to: "mail".into(),
    })
    .unwrap();
    let descriptor = metadata(dir.path()).get("people").cloned().unwrap();
    assert_eq!(descriptor.columns, vec!["id", "mail", "team_id"]);
    assert_eq!(descriptor.unique_columns, vec!["mail"]);

    db.execute(Command::AlterDropColumn {
        table: "people".into(),
        column: "team_id".into(),
    })
    .unwrap();
    let descriptor = metadata(dir.path()).get("people").cloned().unwrap();
    assert_eq!(descriptor.columns, vec!["id", "mail"]);
    assert!(descriptor.foreign_keys.is_empty());

    let mut reopened = open(dir.path());
    assert_eq!(
        rows(&mut reopened, "people"),
        vec![vec![Value::Int(1), Value::from("a@x")], vec![Value::Int(2), Value::from("b@x")]]
    );
}

#[test]
fn renamed_column_keeps_uniqueness() {
    let dir = tempfile::tempdir().unwrap();
    let mut db = open(dir.path());
    create_people(&mut db);
    db.execute(Command::AlterRenameColumn {
        table: "people".into(),
        from: "email".into(),
        to: "mail".into(),
    })
    .unwrap();

    let err = db
        .execute(Command::Insert {
            table: "people".into(),
            columns: Some(vec!["id".into(), "mail".into(), "team_id".into()]),
            values: vec![Value::Int(3), Value::from("a@x"), Value::Int(10)],
        })
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ConstraintViolation);
}

#[test]
fn invalid_schema_changes() {
    let dir = tempfile::tempdir().unwrap();
    let mut db = open(dir.path());
    create_people(&mut db);

    let drop_key = Command::AlterDropColumn {
        table: "people".into(),
        column: "id".into(),
    };
    assert_eq!(db.execute(drop_key).unwrap_err().kind(), ErrorKind::Schema);

    let clash = Command::AlterRenameColumn {
        table: "people".into(),
        from: "email".into(),
        to: "id".into(),
    };
    assert_eq!(db.execute(clash).unwrap_err().kind(), ErrorKind::Schema);

    let missing = Command::AlterAddColumn {
        table: "nobody".into(),
        column: "x".into(),
        data_type: DataType::Int,
    };
    assert_eq!(db.execute(missing).unwrap_err().kind(), ErrorKind::Schema);

    assert_eq!(rows(&mut db, "people").len(), 2);
    assert_eq!(metadata(dir.path()).get("people").unwrap().columns.len(), 3);
}

#[test]
fn rename_and_drop_table() {
    let dir = tempfile::tempdir().unwrap();
    let mut db = open(dir.path());
    create_people(&mut db);

    db.execute(Command::RenameTable {
        table: "people".into(),
        to: "staff".into(),
    })
    .unwrap();
    assert_eq!(db.execute(Command::ShowTables).unwrap(), ExecutionResult::Tables(vec!["staff".into()]));
    assert!(!table_path(dir.path(), "people").exists());
    assert!(table_path(dir.path(), "staff").exists());
    assert_eq!(rows(&mut db, "staff").len(), 2);
    let err = db.execute(Command::Select(SelectQuery::all("people"))).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Schema);

    let mut reopened = open(dir.path());
    assert_eq!(rows(&mut reopened, "staff").len(), 2);
    drop(reopened);

    db.execute(Command::DropTable { table: "staff".into() }).unwrap();
    assert!(db.table_names().is_empty());
    assert!(!table_path(dir.path(), "staff").exists());
    assert!(metadata(dir.path()).is_empty());

    let err = db.execute(Command::DropTable { table: "staff".into() }).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Schema);
}

#[test]
fn rename_onto_existing_table_fails() {
    let dir = tempfile::tempdir().unwrap();
    let mut db = open(dir.path());
    create_people(&mut db);
    db.execute(Command::CreateTable {
        table: "teams".into(),
        columns: vec![ColumnDef::new("id", DataType::Int)],
        primary_key: None,
        unique: vec![],
        foreign_keys: BTreeMap::new(),
    })
    .unwrap();

    let err = db
        .execute(Command::RenameTable {
            table: "people".into(),
            to: "teams".into(),
        })
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Schema);
    assert_eq!(db.table_names(), vec!["people", "teams"]);
}

#[test]
fn describe_and_show_tables() {
    let dir = tempfile::tempdir().unwrap();
    let mut db = open(dir.path());
    create_people(&mut db);

    let described = db
        .execute(Command::Describe { table: "people".into() })
        .unwrap()
        .into_rows()
        .unwrap();
    let records: Vec<Vec<Value>> = described.into_rows().into_iter().map(|r| r.into_values()).collect();
    assert_eq!(
        records,
        vec![
            vec![Value::from("id"), Value::from("int"), Value::from("YES"), Value::from("NO"), Value::Null],
            vec![Value::from("email"), Value::from("str"), Value::from("NO"), Value::from("YES"), Value::Null],
            vec![
                Value::from("team_id"),
                Value::from("int"),
                Value::from("NO"),
                Value::from("NO"),
                Value::from("teams.id"),
            ],
        ]
    );
    assert_eq!(
        db.execute(Command::ShowTables).unwrap(),
        ExecutionResult::Tables(vec!["people".into()])
    );
}

#[test]
fn corrupted_table_is_quarantined() {
    let dir = tempfile::tempdir().unwrap();
    let mut db = open(dir.path());
    create_people(&mut db);
    db.execute(Command::CreateTable {
        table: "teams".into(),
        columns: vec![ColumnDef::new("id", DataType::Int)],
        primary_key: Some("id".into()),
        unique: vec![],
        foreign_keys: BTreeMap::new(),
    })
    .unwrap();
    drop(db);

    fs::write(table_path(dir.path(), "people"), b"[{\"id\": \"one\"}]").unwrap();

    let mut db = open(dir.path());
    assert!(db.is_quarantined("people"));
    let err = db.execute(Command::Select(SelectQuery::all("people"))).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::IoCorruption);
    let err = db
        .execute(Command::Insert {
            table: "people".into(),
            columns: None,
            values: vec![Value::Int(3), Value::from("c@x"), Value::Int(10)],
        })
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::IoCorruption);

    // The rest of the database keeps working, and the damaged table can
    // still be described and dropped.
    db.execute(Command::Insert {
        table: "teams".into(),
        columns: None,
        values: vec![Value::Int(10)],
    })
    .unwrap();
    assert_eq!(rows(&mut db, "teams").len(), 1);
    assert_eq!(db.describe("people").unwrap().len(), 3);
    db.execute(Command::DropTable { table: "people".into() }).unwrap();
    assert_eq!(db.table_names(), vec!["teams"]);
}

#[test]
fn open_from_toml_config() {
    let dir = tempfile::tempdir().unwrap();
    let data = dir.path().join("data");
    let config_path = dir.path().join("quill.toml");
    fs::write(
        &config_path,
        format!(
            "data_dir = {:?}\nmetadata_file = \"catalog.json\"\nlock_timeout_ms = 500\n",
            data.to_string_lossy()
        ),
    )
    .unwrap();

    let config = DatabaseConfig::load(&config_path).unwrap();
    let mut db = Database::open(config).unwrap();
    create_people(&mut db);
    assert!(data.join("catalog.json").exists());
    assert!(!data.join("metadata.json").exists());
    assert_eq!(db.config().lock_timeout_ms, 500);
}
