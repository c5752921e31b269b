// ==========================================
// Import pipeline integration tests
// ==========================================
// File to database, through the real parser, validator and repository
// ==========================================

mod test_helpers;

use org_structure_engine::config::ConfigManager;
use org_structure_engine::domain::ImportOptions;
use org_structure_engine::importer::{ImportError, OrgImporter, OrgImporterImpl};
use org_structure_engine::logging;
use org_structure_engine::repository::OrgImportRepositoryImpl;
use rusqlite::Connection;
use test_helpers::{create_test_db, write_temp_csv};

fn create_test_importer(db_path: &str) -> OrgImporterImpl<OrgImportRepositoryImpl, ConfigManager> {
    let import_repo =
        OrgImportRepositoryImpl::new(db_path).expect("Failed to create OrgImportRepository");
    let config = ConfigManager::new(db_path).expect("Failed to create ConfigManager");
    OrgImporterImpl::with_defaults(import_repo, config)
}

fn scalar(conn: &Connection, sql: &str) -> i64 {
    conn.query_row(sql, [], |row| row.get(0)).expect("scalar query")
}

// ===== Org chart =====

#[tokio::test]
async fn test_import_org_chart_csv() {
    logging::init_test();
    let (_db_file, db_path) = create_test_db().expect("Failed to create test db");
    let importer = create_test_importer(&db_path);

    let report = importer
        .import_org_structure("tests/fixtures/org_chart.csv", ImportOptions::default())
        .await
        .expect("import should succeed");

    assert_eq!(report.total_processed, 6);
    assert_eq!(report.successful, 6);
    assert_eq!(report.departments_created, 3);
    assert_eq!(report.employees_created, 3);
    assert_eq!(report.positions_created, 3);
    assert_eq!(report.errors, 0);
    assert!(report.error_details.is_empty());
    assert!(report.warnings.is_empty());

    let conn = Connection::open(&db_path).expect("open db");
    assert_eq!(scalar(&conn, "SELECT COUNT(*) FROM departments"), 3);
    assert_eq!(scalar(&conn, "SELECT COUNT(*) FROM employees"), 3);

    // AP.1 hangs under AP with a materialized path
    let (parent_id, path): (Option<String>, String) = conn
        .query_row(
            "SELECT parent_id, path FROM departments WHERE code = 'AP.1'",
            [],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )
        .unwrap();
    let root_id: String = conn
        .query_row("SELECT id FROM departments WHERE code = 'AP'", [], |row| {
            row.get(0)
        })
        .unwrap();
    assert_eq!(parent_id.as_deref(), Some(root_id.as_str()));
    assert_eq!(path, "Head Office / Sales");

    // both sheet employees below AP.1 landed there
    assert_eq!(
        scalar(
            &conn,
            "SELECT employee_count FROM departments WHERE code = 'AP.1'"
        ),
        2
    );
    assert_eq!(
        scalar(
            &conn,
            "SELECT employee_count FROM departments WHERE code = 'AP.2'"
        ),
        1
    );

    // a row without a position gets the configured default title
    let title: String = conn
        .query_row(
            r#"
            SELECT p.title FROM employees e
            JOIN positions p ON p.id = e.position_id
            WHERE e.tab_number = 'AR21000613'
            "#,
            [],
            |row| row.get(0),
        )
        .unwrap();
    assert_eq!(title, "Unassigned");
}

#[tokio::test]
async fn test_import_org_chart_is_idempotent() {
    let (_db_file, db_path) = create_test_db().expect("Failed to create test db");
    let importer = create_test_importer(&db_path);

    importer
        .import_org_structure("tests/fixtures/org_chart.csv", ImportOptions::default())
        .await
        .expect("first import");
    let second = importer
        .import_org_structure("tests/fixtures/org_chart.csv", ImportOptions::default())
        .await
        .expect("second import");

    assert_eq!(second.departments_created, 0);
    assert_eq!(second.positions_created, 0);
    assert_eq!(second.employees_created, 0);
    assert_eq!(second.employees_updated, 3);

    let conn = Connection::open(&db_path).expect("open db");
    assert_eq!(scalar(&conn, "SELECT COUNT(*) FROM departments"), 3);
    assert_eq!(scalar(&conn, "SELECT COUNT(*) FROM employees"), 3);
    assert_eq!(scalar(&conn, "SELECT COUNT(*) FROM positions"), 3);
}

#[tokio::test]
async fn test_parse_org_structure_writes_nothing() {
    let (_db_file, db_path) = create_test_db().expect("Failed to create test db");
    let importer = create_test_importer(&db_path);

    let parsed = importer
        .parse_org_structure("tests/fixtures/org_chart.csv")
        .await
        .expect("parse should succeed");

    assert_eq!(parsed.departments.len(), 3);
    assert_eq!(parsed.employees.len(), 3);
    assert!(parsed.errors.is_empty());
    let summary = parsed.summary();
    assert_eq!(summary.total_departments, 3);
    assert_eq!(summary.total_employees, 3);

    let conn = Connection::open(&db_path).expect("open db");
    assert_eq!(scalar(&conn, "SELECT COUNT(*) FROM departments"), 0);
}

// ===== Roster =====

#[tokio::test]
async fn test_import_roster_csv() {
    logging::init_test();
    let (_db_file, db_path) = create_test_db().expect("Failed to create test db");
    let importer = create_test_importer(&db_path);

    let report = importer
        .import_roster("tests/fixtures/roster.csv", ImportOptions::default())
        .await
        .expect("import should succeed");

    assert_eq!(report.total_processed, 3);
    assert_eq!(report.successful, 3);
    assert_eq!(report.departments_created, 2);
    assert_eq!(report.employees_created, 3);
    assert_eq!(report.positions_created, 3);
    assert_eq!(report.errors, 0);

    let conn = Connection::open(&db_path).expect("open db");
    let manager_of = |tab: &str| -> Option<String> {
        conn.query_row(
            "SELECT manager_id FROM employees WHERE tab_number = ?1",
            [tab],
            |row| row.get(0),
        )
        .unwrap()
    };
    let id_of: String = conn
        .query_row(
            "SELECT id FROM employees WHERE tab_number = 'EMP001'",
            [],
            |row| row.get(0),
        )
        .unwrap();
    assert_eq!(manager_of("EMP002").as_deref(), Some(id_of.as_str()));
    assert_eq!(manager_of("EMP003").as_deref(), Some(id_of.as_str()));

    assert_eq!(
        scalar(
            &conn,
            "SELECT employee_count FROM departments WHERE code = 'DEV'"
        ),
        2
    );
    assert_eq!(
        scalar(
            &conn,
            "SELECT employee_count FROM departments WHERE code = 'QA'"
        ),
        1
    );
}

#[tokio::test]
async fn test_roster_invalid_email_row_is_skipped_and_reported() {
    let (_db_file, db_path) = create_test_db().expect("Failed to create test db");
    let importer = create_test_importer(&db_path);

    let (_csv_file, csv_path) = write_temp_csv(
        "FullName,TabNumber,Email\n\
         Ivanov Ivan,EMP001,ivanov@example.com\n\
         Petrov Petr,EMP002,not-an-email\n\
         Sidorova Maria,EMP003,sidorova@example.com\n",
    )
    .expect("write csv");

    let report = importer
        .import_roster(&csv_path, ImportOptions::default())
        .await
        .expect("import should succeed");

    assert_eq!(report.total_processed, 3);
    assert_eq!(report.successful, 2);
    assert_eq!(report.employees_created, 2);
    assert_eq!(report.errors, 1);
    assert_eq!(report.error_details.len(), 1);
    assert_eq!(report.error_details[0].row, 3);
    assert_eq!(report.error_details[0].error_type, "validation");
    assert!(report.error_details[0].message.contains("Invalid email format"));

    let conn = Connection::open(&db_path).expect("open db");
    assert_eq!(scalar(&conn, "SELECT COUNT(*) FROM employees"), 2);
}

#[tokio::test]
async fn test_roster_strict_mode_applies_nothing() {
    let (_db_file, db_path) = create_test_db().expect("Failed to create test db");
    let importer = create_test_importer(&db_path);

    let (_csv_file, csv_path) = write_temp_csv(
        "FullName,TabNumber,Email\n\
         Ivanov Ivan,EMP001,ivanov@example.com\n\
         Petrov Petr,EMP002,not-an-email\n\
         Sidorova Maria,EMP003,sidorova@example.com\n",
    )
    .expect("write csv");

    let report = importer
        .import_roster(&csv_path, ImportOptions { skip_on_error: false })
        .await
        .expect("import call itself succeeds");

    // the report still lists every finding, but nothing was written
    assert_eq!(report.total_processed, 3);
    assert_eq!(report.successful, 0);
    assert_eq!(report.employees_created, 0);
    assert_eq!(report.errors, 1);

    let conn = Connection::open(&db_path).expect("open db");
    assert_eq!(scalar(&conn, "SELECT COUNT(*) FROM employees"), 0);
    assert_eq!(scalar(&conn, "SELECT COUNT(*) FROM departments"), 0);
}

#[tokio::test]
async fn test_roster_duplicate_tab_flags_second_row() {
    let (_db_file, db_path) = create_test_db().expect("Failed to create test db");
    let importer = create_test_importer(&db_path);

    let (_csv_file, csv_path) = write_temp_csv(
        "FullName,TabNumber\n\
         Ivanov Ivan,EMP001\n\
         Ivanov Clone,EMP001\n",
    )
    .expect("write csv");

    let report = importer
        .import_roster(&csv_path, ImportOptions::default())
        .await
        .expect("import should succeed");

    assert_eq!(report.employees_created, 1);
    assert_eq!(report.errors, 1);
    assert_eq!(report.error_details[0].row, 3);
    assert!(report.error_details[0].message.contains("Duplicate tab number"));
}

#[tokio::test]
async fn test_roster_manager_resolves_from_earlier_import() {
    let (_db_file, db_path) = create_test_db().expect("Failed to create test db");
    let importer = create_test_importer(&db_path);

    let (_first_file, first_path) = write_temp_csv(
        "FullName,TabNumber\n\
         Boss Person,EMP100\n",
    )
    .expect("write csv");
    importer
        .import_roster(&first_path, ImportOptions::default())
        .await
        .expect("first import");

    let (_second_file, second_path) = write_temp_csv(
        "FullName,TabNumber,ManagerTabNumber\n\
         New Hire,EMP101,EMP100\n",
    )
    .expect("write csv");
    let report = importer
        .import_roster(&second_path, ImportOptions::default())
        .await
        .expect("second import");
    assert_eq!(report.errors, 0);

    let conn = Connection::open(&db_path).expect("open db");
    let manager_id: Option<String> = conn
        .query_row(
            "SELECT manager_id FROM employees WHERE tab_number = 'EMP101'",
            [],
            |row| row.get(0),
        )
        .unwrap();
    assert!(manager_id.is_some());
}

#[tokio::test]
async fn test_roster_unknown_manager_fails_the_row() {
    let (_db_file, db_path) = create_test_db().expect("Failed to create test db");
    let importer = create_test_importer(&db_path);

    let (_csv_file, csv_path) = write_temp_csv(
        "FullName,TabNumber,ManagerTabNumber\n\
         Ivanov Ivan,EMP001,EMP999\n",
    )
    .expect("write csv");

    let report = importer
        .import_roster(&csv_path, ImportOptions::default())
        .await
        .expect("import should succeed");

    assert_eq!(report.employees_created, 0);
    assert_eq!(report.errors, 1);
    assert!(report.error_details[0]
        .message
        .contains("Manager with tab number EMP999 not found"));
}

#[tokio::test]
async fn test_validate_roster_writes_nothing() {
    let (_db_file, db_path) = create_test_db().expect("Failed to create test db");
    let importer = create_test_importer(&db_path);

    let (_csv_file, csv_path) = write_temp_csv(
        "FullName,TabNumber,Email\n\
         Ivanov Ivan,EMP001,ivanov@example.com\n\
         Petrov Petr,EMP002,not-an-email\n\
         Sidorova Maria,EMP003,sidorova@example.com\n",
    )
    .expect("write csv");

    let report = importer
        .validate_roster(&csv_path)
        .await
        .expect("validation should succeed");

    assert_eq!(report.total_rows, 3);
    assert_eq!(report.valid_rows, 2);
    assert_eq!(report.invalid_rows, 1);
    assert_eq!(report.error_details.len(), 1);

    let conn = Connection::open(&db_path).expect("open db");
    assert_eq!(scalar(&conn, "SELECT COUNT(*) FROM employees"), 0);
}

// ===== File-level errors =====

#[tokio::test]
async fn test_header_only_roster_is_empty_file() {
    let (_db_file, db_path) = create_test_db().expect("Failed to create test db");
    let importer = create_test_importer(&db_path);

    let (_csv_file, csv_path) =
        write_temp_csv("FullName,TabNumber,Email\n").expect("write csv");

    let err = importer
        .import_roster(&csv_path, ImportOptions::default())
        .await
        .unwrap_err();
    let import_err = err
        .downcast_ref::<ImportError>()
        .expect("should be an ImportError");
    assert!(matches!(import_err, ImportError::EmptyFile));
}

#[tokio::test]
async fn test_unknown_extension_rejected() {
    use std::io::Write;

    let (_db_file, db_path) = create_test_db().expect("Failed to create test db");
    let importer = create_test_importer(&db_path);

    let mut txt_file = tempfile::Builder::new()
        .suffix(".txt")
        .tempfile()
        .expect("temp file");
    txt_file.write_all(b"Code,Name\nAP,Head Office\n").unwrap();
    let txt_path = txt_file.path().to_str().unwrap().to_string();

    let err = importer
        .import_org_structure(&txt_path, ImportOptions::default())
        .await
        .unwrap_err();
    let import_err = err
        .downcast_ref::<ImportError>()
        .expect("should be an ImportError");
    assert!(matches!(import_err, ImportError::InvalidFileFormat(_)));
}

#[tokio::test]
async fn test_missing_file_rejected() {
    let (_db_file, db_path) = create_test_db().expect("Failed to create test db");
    let importer = create_test_importer(&db_path);

    let err = importer
        .import_org_structure("tests/fixtures/no_such_file.csv", ImportOptions::default())
        .await
        .unwrap_err();
    let import_err = err
        .downcast_ref::<ImportError>()
        .expect("should be an ImportError");
    assert!(matches!(import_err, ImportError::FileNotFound(_)));
}
