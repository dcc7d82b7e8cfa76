//! Integration tests for JOIN queries run through the executor.

use quill_core::schema::TableBuilder;
use quill_core::{DataType, ErrorKind, Value};
use quill_query::ast::{Condition, JoinCondition};
use quill_query::executor::join::{HashJoin, NestedLoopJoin};
use quill_query::executor::{InMemoryDataSource, QueryExecutor, Relation};

fn students_and_courses() -> InMemoryDataSource {
    let students = TableBuilder::new("students")
        .unwrap()
        .add_column("id", DataType::Int)
        .unwrap()
        .add_column("name", DataType::Str)
        .unwrap()
        .add_column("course_id", DataType::Int)
        .unwrap()
        .primary_key("id")
        .unwrap()
        .foreign_key("course_id", "courses.id")
        .unwrap()
        .build()
        .unwrap();
    let courses = TableBuilder::new("courses")
        .unwrap()
        .add_column("id", DataType::Int)
        .unwrap()
        .add_column("title", DataType::Str)
        .unwrap()
        .primary_key("id")
        .unwrap()
        .build()
        .unwrap();

    let mut source = InMemoryDataSource::new();
    source
        .add_table(
            students,
            vec![
                vec![Value::Int(101), Value::from("Collins"), Value::Int(1)],
                vec![Value::Int(102), Value::from("John"), Value::Int(2)],
            ],
        )
        .unwrap();
    source
        .add_table(
            courses,
            vec![vec![Value::Int(1), Value::from("CS")], vec![Value::Int(2), Value::from("EE")]],
        )
        .unwrap();
    source
}

fn sorted_rows(result: &Relation) -> Vec<Vec<Value>> {
    let mut rows: Vec<_> = result.rows().iter().map(|r| r.values().to_vec()).collect();
    rows.sort();
    rows
}

#[test]
fn test_students_join_courses() {
    let mut source = students_and_courses();
    let mut exec = QueryExecutor::new(&mut source);
    let on = JoinCondition::new("students", "course_id", "courses", "id");
    let result = exec.join("students", "courses", &on, &[]).unwrap();

    assert_eq!(result.columns(), ["id", "name", "course_id", "title"]);
    assert_eq!(
        sorted_rows(&result),
        vec![
            vec![Value::Int(101), Value::from("Collins"), Value::Int(1), Value::from("CS")],
            vec![Value::Int(102), Value::from("John"), Value::Int(2), Value::from("EE")],
        ]
    );
}

#[test]
fn test_qualified_projection_reads_named_table() {
    let mut source = students_and_courses();
    let mut exec = QueryExecutor::new(&mut source);
    let on = JoinCondition::new("students", "course_id", "courses", "id");
    let columns: Vec<String> = ["courses.id", "students.id", "title"].iter().map(|c| c.to_string()).collect();

    // Either order of the inputs, so either table can end up on the build side.
    for (left, right) in [("students", "courses"), ("courses", "students")] {
        let result = exec.join(left, right, &on, &columns).unwrap();
        assert_eq!(result.columns(), ["id", "id", "title"]);
        assert_eq!(
            sorted_rows(&result),
            vec![
                vec![Value::Int(1), Value::Int(101), Value::from("CS")],
                vec![Value::Int(2), Value::Int(102), Value::from("EE")],
            ]
        );
        assert_eq!(result.column_index("courses.id"), Some(0));
        assert_eq!(result.column_index("students.id"), Some(1));
    }

    let err = exec
        .join("students", "courses", &on, &["courses.name".to_string()])
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Schema);
}

#[test]
fn test_join_condition_written_backwards() {
    let mut source = students_and_courses();
    let mut exec = QueryExecutor::new(&mut source);
    let on = JoinCondition::new("courses", "id", "students", "course_id");
    let result = exec
        .join("students", "courses", &on, &["name".to_string(), "courses.title".to_string()])
        .unwrap();
    assert_eq!(
        sorted_rows(&result),
        vec![
            vec![Value::from("Collins"), Value::from("CS")],
            vec![Value::from("John"), Value::from("EE")],
        ]
    );
}

#[test]
fn test_join_unknown_column() {
    let mut source = students_and_courses();
    let mut exec = QueryExecutor::new(&mut source);
    let on = JoinCondition::new("students", "course", "courses", "id");
    assert_eq!(exec.join("students", "courses", &on, &[]).unwrap_err().kind(), ErrorKind::Schema);

    let on = JoinCondition::new("students", "course_id", "courses", "id");
    let err = exec.join("students", "courses", &on, &["grade".to_string()]).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Schema);
}

#[test]
fn test_join_then_filter_by_subquery() {
    let mut source = students_and_courses();
    let mut exec = QueryExecutor::new(&mut source);
    let cs = quill_query::SelectQuery::columns("courses", &["id"]).filter(Condition::equals("title", "CS"));
    let query = quill_query::SelectQuery::columns("students", &["name"]).filter(Condition::in_subquery("course_id", cs));
    let result = exec.select(&query).unwrap();
    assert_eq!(result.rows().len(), 1);
    assert_eq!(result.value(0, "name"), Some(&Value::from("Collins")));
}

/// Employees joined to jobs with many employees per job.
#[test]
fn test_join_many_to_one() {
    let employees: Vec<Vec<Value>> = (0..60)
        .map(|i| vec![Value::Int(i), Value::Str(format!("Employee{}", i)), Value::Int(i % 6)])
        .collect();
    let jobs: Vec<Vec<Value>> = (0..6).map(|i| vec![Value::Int(i), Value::Str(format!("Job{}", i))]).collect();
    let employees = Relation::from_values(vec!["id".into(), "name".into(), "job_id".into()], employees);
    let jobs = Relation::from_values(vec!["job".into(), "title".into()], jobs);

    let hash = HashJoin::new(2, 0).execute(employees.clone(), jobs.clone());
    let nested = NestedLoopJoin::new(2, 0).execute(employees, jobs);
    assert_eq!(hash.len(), 60);
    assert_eq!(sorted_rows(&hash), sorted_rows(&nested));
    for row in hash.rows() {
        assert_eq!(row.values()[2], row.values()[3]);
    }
}
