// ==========================================
// Org Structure Engine - Configuration Manager
// ==========================================
// Responsibility: configuration load and query
// Storage: config_kv table (key-value, global scope)
// ==========================================

use crate::config::org_config_trait::OrgConfigReader;
use crate::db::open_sqlite_connection;
use crate::rules::{CodeRule, TabNumberRule, ValidationRules};
use async_trait::async_trait;
use rusqlite::{params, Connection};
use std::error::Error;
use std::sync::{Arc, Mutex};

// ==========================================
// ConfigManager
// ==========================================
pub struct ConfigManager {
    conn: Arc<Mutex<Connection>>,
}

impl ConfigManager {
    /// Opens a manager on the given database file.
    pub fn new(db_path: &str) -> Result<Self, Box<dyn Error>> {
        let conn = open_sqlite_connection(db_path)?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Builds a manager over an already opened shared connection.
    ///
    /// Re-applies the unified PRAGMA set so behavior does not depend on
    /// where the connection came from (idempotent).
    pub fn from_connection(conn: Arc<Mutex<Connection>>) -> Result<Self, Box<dyn Error>> {
        {
            let conn_guard = conn
                .lock()
                .map_err(|e| format!("connection lock poisoned: {}", e))?;
            crate::db::configure_sqlite_connection(&conn_guard)?;
        }

        Ok(Self { conn })
    }

    /// Reads one value from config_kv (scope_id='global').
    ///
    /// # Returns
    /// - Some(String): the stored value
    /// - None: key not present
    fn get_config_value(&self, key: &str) -> Result<Option<String>, Box<dyn Error>> {
        let conn = self
            .conn
            .lock()
            .map_err(|e| format!("connection lock poisoned: {}", e))?;

        let result = conn.query_row(
            "SELECT value FROM config_kv WHERE scope_id = 'global' AND key = ?1",
            params![key],
            |row| row.get::<_, String>(0),
        );

        match result {
            Ok(value) => Ok(Some(value)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(Box::new(e)),
        }
    }

    /// Global-scope read, exposed for other modules.
    pub fn get_global_config_value(&self, key: &str) -> Result<Option<String>, Box<dyn Error>> {
        self.get_config_value(key)
    }

    fn get_config_or_default(&self, key: &str, default: &str) -> Result<String, Box<dyn Error>> {
        Ok(self
            .get_config_value(key)?
            .unwrap_or_else(|| default.to_string()))
    }

    /// Parses a numeric config value, falling back on format trouble.
    fn get_usize_config(&self, key: &str, default: usize) -> Result<usize, Box<dyn Error>> {
        let raw = self.get_config_or_default(key, &default.to_string())?;
        Ok(raw.parse::<usize>().unwrap_or_else(|_| {
            tracing::warn!(
                config_key = key,
                raw_value = %raw,
                "unparsable config value, using default"
            );
            default
        }))
    }

    /// Upserts one global-scope value.
    pub fn set_config_value(&self, key: &str, value: &str) -> Result<(), Box<dyn Error>> {
        let conn = self
            .conn
            .lock()
            .map_err(|e| format!("connection lock poisoned: {}", e))?;

        conn.execute(
            "INSERT INTO config_kv (scope_id, key, value) VALUES ('global', ?1, ?2)
             ON CONFLICT(scope_id, key) DO UPDATE SET value = ?2, updated_at = datetime('now')",
            params![key, value],
        )?;

        Ok(())
    }

    /// Seeds every known key with its default, leaving present values
    /// alone.
    ///
    /// # Returns
    /// - usize: how many rows were actually inserted
    pub fn seed_defaults(&self) -> Result<usize, Box<dyn Error>> {
        let conn = self
            .conn
            .lock()
            .map_err(|e| format!("connection lock poisoned: {}", e))?;

        let mut inserted = 0;
        for (key, value) in config_keys::DEFAULTS {
            inserted += conn.execute(
                "INSERT OR IGNORE INTO config_kv (scope_id, key, value) VALUES ('global', ?1, ?2)",
                params![key, value],
            )?;
        }

        Ok(inserted)
    }
}

// ==========================================
// OrgConfigReader Trait implementation
// ==========================================
#[async_trait]
impl OrgConfigReader for ConfigManager {
    async fn get_code_rule(&self) -> Result<CodeRule, Box<dyn Error>> {
        Ok(CodeRule {
            max_length: self.get_usize_config(config_keys::CODE_MAX_LENGTH, 50)?,
            max_segments: self.get_usize_config(config_keys::CODE_MAX_SEGMENTS, 10)?,
        })
    }

    async fn get_tab_number_rule(&self) -> Result<TabNumberRule, Box<dyn Error>> {
        Ok(TabNumberRule {
            min_letters: self.get_usize_config(config_keys::TAB_MIN_LETTERS, 1)?,
            max_letters: self.get_usize_config(config_keys::TAB_MAX_LETTERS, 4)?,
            min_digits: self.get_usize_config(config_keys::TAB_MIN_DIGITS, 3)?,
            max_digits: self.get_usize_config(config_keys::TAB_MAX_DIGITS, 10)?,
        })
    }

    async fn get_validation_rules(&self) -> Result<ValidationRules, Box<dyn Error>> {
        let code = self.get_code_rule().await?;
        let tab = self.get_tab_number_rule().await?;
        Ok(ValidationRules { code, tab })
    }

    async fn get_default_position_title(&self) -> Result<String, Box<dyn Error>> {
        self.get_config_or_default(config_keys::DEFAULT_POSITION_TITLE, "Unassigned")
    }

    async fn get_header_scan_rows(&self) -> Result<usize, Box<dyn Error>> {
        self.get_usize_config(config_keys::HEADER_SCAN_ROWS, 10)
    }
}

// ==========================================
// Config key constants
// ==========================================
pub mod config_keys {
    // Department code grammar
    pub const CODE_MAX_LENGTH: &str = "code_max_length";
    pub const CODE_MAX_SEGMENTS: &str = "code_max_segments";

    // Tab number grammar
    pub const TAB_MIN_LETTERS: &str = "tab_min_letters";
    pub const TAB_MAX_LETTERS: &str = "tab_max_letters";
    pub const TAB_MIN_DIGITS: &str = "tab_min_digits";
    pub const TAB_MAX_DIGITS: &str = "tab_max_digits";

    // Import tunables
    pub const DEFAULT_POSITION_TITLE: &str = "default_position_title";
    pub const HEADER_SCAN_ROWS: &str = "header_scan_rows";

    /// Seed set written by `ConfigManager::seed_defaults`.
    pub const DEFAULTS: &[(&str, &str)] = &[
        (CODE_MAX_LENGTH, "50"),
        (CODE_MAX_SEGMENTS, "10"),
        (TAB_MIN_LETTERS, "1"),
        (TAB_MAX_LETTERS, "4"),
        (TAB_MIN_DIGITS, "3"),
        (TAB_MAX_DIGITS, "10"),
        (DEFAULT_POSITION_TITLE, "Unassigned"),
        (HEADER_SCAN_ROWS, "10"),
    ];
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{configure_sqlite_connection, init_schema};

    fn manager() -> ConfigManager {
        let conn = Connection::open_in_memory().unwrap();
        configure_sqlite_connection(&conn).unwrap();
        init_schema(&conn).unwrap();
        ConfigManager::from_connection(Arc::new(Mutex::new(conn))).unwrap()
    }

    #[tokio::test]
    async fn test_defaults_without_any_rows() {
        let mgr = manager();

        let rules = mgr.get_validation_rules().await.unwrap();
        assert_eq!(rules.code.max_length, 50);
        assert_eq!(rules.code.max_segments, 10);
        assert_eq!(rules.tab.min_letters, 1);
        assert_eq!(rules.tab.max_digits, 10);

        assert_eq!(
            mgr.get_default_position_title().await.unwrap(),
            "Unassigned"
        );
        assert_eq!(mgr.get_header_scan_rows().await.unwrap(), 10);
    }

    #[tokio::test]
    async fn test_stored_values_override_defaults() {
        let mgr = manager();
        mgr.set_config_value(config_keys::CODE_MAX_LENGTH, "20")
            .unwrap();
        mgr.set_config_value(config_keys::DEFAULT_POSITION_TITLE, "Specialist")
            .unwrap();

        let rule = mgr.get_code_rule().await.unwrap();
        assert_eq!(rule.max_length, 20);
        assert_eq!(
            mgr.get_default_position_title().await.unwrap(),
            "Specialist"
        );
    }

    #[tokio::test]
    async fn test_unparsable_value_falls_back() {
        let mgr = manager();
        mgr.set_config_value(config_keys::HEADER_SCAN_ROWS, "lots")
            .unwrap();

        assert_eq!(mgr.get_header_scan_rows().await.unwrap(), 10);
    }

    #[test]
    fn test_seed_defaults_is_idempotent() {
        let mgr = manager();

        let first = mgr.seed_defaults().unwrap();
        assert_eq!(first, config_keys::DEFAULTS.len());

        let second = mgr.seed_defaults().unwrap();
        assert_eq!(second, 0);

        // seeded rows do not clobber explicit settings
        mgr.set_config_value(config_keys::CODE_MAX_LENGTH, "20")
            .unwrap();
        mgr.seed_defaults().unwrap();
        assert_eq!(
            mgr.get_global_config_value(config_keys::CODE_MAX_LENGTH)
                .unwrap()
                .as_deref(),
            Some("20")
        );
    }
}
