// Imports an org-chart or roster file into the database and prints the
// report as JSON.
//
// Usage:
//   cargo run --bin org_import -- <db_path> <file> [--roster] [--strict] [--check]
//
// --roster  treat the file as a flat employee roster (default: org chart)
// --strict  any row error prevents all writes
// --check   parse / validate only, write nothing

use org_structure_engine::config::ConfigManager;
use org_structure_engine::db::{init_schema, open_sqlite_connection};
use org_structure_engine::domain::ImportOptions;
use org_structure_engine::importer::{OrgImporter, OrgImporterImpl};
use org_structure_engine::logging;
use org_structure_engine::repository::OrgImportRepositoryImpl;
use std::error::Error;
use std::sync::{Arc, Mutex};

const USAGE: &str = "usage: org_import <db_path> <file> [--roster] [--strict] [--check]";

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    logging::init();

    let mut db_path: Option<String> = None;
    let mut file: Option<String> = None;
    let mut roster = false;
    let mut strict = false;
    let mut check = false;
    for arg in std::env::args().skip(1) {
        if arg == "--roster" {
            roster = true;
        } else if arg == "--strict" {
            strict = true;
        } else if arg == "--check" {
            check = true;
        } else if arg.starts_with("--") {
            return Err(format!("unknown flag: {} ({})", arg, USAGE).into());
        } else if db_path.is_none() {
            db_path = Some(arg);
        } else if file.is_none() {
            file = Some(arg);
        } else {
            return Err(format!("unexpected argument: {} ({})", arg, USAGE).into());
        }
    }
    let db_path = db_path.ok_or(USAGE)?;
    let file = file.ok_or(USAGE)?;

    let conn = open_sqlite_connection(&db_path)?;
    init_schema(&conn)?;
    let conn = Arc::new(Mutex::new(conn));

    let repo = OrgImportRepositoryImpl::from_connection(conn.clone());
    let config = ConfigManager::from_connection(conn)?;
    let importer = OrgImporterImpl::with_defaults(repo, config);

    if check {
        if roster {
            let report = importer.validate_roster(&file).await?;
            println!("{}", serde_json::to_string_pretty(&report)?);
        } else {
            let parsed = importer.parse_org_structure(&file).await?;
            println!("{}", serde_json::to_string_pretty(&parsed)?);
        }
        return Ok(());
    }

    let options = ImportOptions {
        skip_on_error: !strict,
    };
    let report = if roster {
        importer.import_roster(&file, options).await?
    } else {
        importer.import_org_structure(&file, options).await?
    };
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}
