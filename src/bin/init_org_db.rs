// Creates or upgrades an org database: schema plus default configuration.
//
// Usage:
//   cargo run --bin init_org_db -- [db_path]
//
// Safe to re-run; existing rows and overridden config values are kept.

use org_structure_engine::config::ConfigManager;
use org_structure_engine::db::{init_schema, open_sqlite_connection, read_schema_version};
use std::error::Error;
use std::sync::{Arc, Mutex};

fn main() -> Result<(), Box<dyn Error>> {
    let db_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "org_structure.db".to_string());

    let conn = open_sqlite_connection(&db_path)?;
    init_schema(&conn)?;
    let version = read_schema_version(&conn)?.ok_or("schema_version row missing after init")?;

    let config = ConfigManager::from_connection(Arc::new(Mutex::new(conn)))?;
    let seeded = config.seed_defaults()?;

    println!(
        "db={} schema_version={} config_defaults_seeded={}",
        db_path, version, seeded
    );
    Ok(())
}
