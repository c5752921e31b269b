// ==========================================
// Shared test helpers
// ==========================================
// Temp databases with the real schema, plus temp spreadsheet files
// ==========================================

use org_structure_engine::db::{configure_sqlite_connection, init_schema};
use rusqlite::Connection;
use std::error::Error;
use std::io::Write;
use tempfile::NamedTempFile;

/// Creates a temp database file with the full schema applied.
///
/// # Returns
/// - NamedTempFile: keep it alive for the db to exist
/// - String: database file path
pub fn create_test_db() -> Result<(NamedTempFile, String), Box<dyn Error>> {
    let temp_file = NamedTempFile::new()?;
    let db_path = temp_file.path().to_str().unwrap().to_string();

    let conn = Connection::open(&db_path)?;
    configure_sqlite_connection(&conn)?;
    init_schema(&conn)?;

    Ok((temp_file, db_path))
}

/// Writes CSV content to a temp file with a .csv extension (the
/// importer dispatches on the extension).
pub fn write_temp_csv(content: &str) -> Result<(NamedTempFile, String), Box<dyn Error>> {
    let mut temp_file = tempfile::Builder::new().suffix(".csv").tempfile()?;
    temp_file.write_all(content.as_bytes())?;
    temp_file.flush()?;
    let path = temp_file.path().to_str().unwrap().to_string();
    Ok((temp_file, path))
}
