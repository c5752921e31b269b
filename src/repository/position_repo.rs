// ==========================================
// Org Structure Engine - Position Repository
// ==========================================
// Responsibility: data access for the positions table
// ==========================================

use crate::db::open_sqlite_connection;
use crate::domain::org::Position;
use crate::repository::error::{RepositoryError, RepositoryResult};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, Result as SqliteResult, Transaction};
use std::sync::{Arc, Mutex};

fn parse_utc(raw: &str) -> DateTime<Utc> {
    raw.parse::<DateTime<Utc>>().unwrap_or_else(|_| Utc::now())
}

fn row_to_position(row: &rusqlite::Row<'_>) -> SqliteResult<Position> {
    Ok(Position {
        id: row.get(0)?,
        code: row.get(1)?,
        title: row.get(2)?,
        category: row.get(3)?,
        department_id: row.get(4)?,
        is_active: row.get(5)?,
        created_at: parse_utc(&row.get::<_, String>(6)?),
        updated_at: parse_utc(&row.get::<_, String>(7)?),
    })
}

// ==========================================
// PositionRepository
// ==========================================
/// Position storage access. Positions are resolved during import by
/// (title, department) pairs, so that lookup has a dedicated query.
pub struct PositionRepository {
    conn: Arc<Mutex<Connection>>,
}

impl PositionRepository {
    /// Opens a repository on the given database file.
    pub fn new(db_path: &str) -> RepositoryResult<Self> {
        let conn = open_sqlite_connection(db_path)
            .map_err(|e| RepositoryError::DatabaseConnectionError(e.to_string()))?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Builds a repository over an already opened shared connection.
    pub fn from_connection(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }

    fn get_conn(&self) -> RepositoryResult<std::sync::MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| RepositoryError::LockError(e.to_string()))
    }

    pub fn find_by_id(&self, id: &str) -> RepositoryResult<Option<Position>> {
        let conn = self.get_conn()?;
        let result = conn.query_row(
            r#"
            SELECT id, code, title, category, department_id,
                   is_active, created_at, updated_at
            FROM positions
            WHERE id = ?1
            "#,
            params![id],
            row_to_position,
        );

        match result {
            Ok(position) => Ok(Some(position)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Looks a position up by its unique code.
    pub fn find_by_code(&self, code: &str) -> RepositoryResult<Option<Position>> {
        let conn = self.get_conn()?;
        let result = conn.query_row(
            r#"
            SELECT id, code, title, category, department_id,
                   is_active, created_at, updated_at
            FROM positions
            WHERE code = ?1
            "#,
            params![code],
            row_to_position,
        );

        match result {
            Ok(position) => Ok(Some(position)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Resolves a position by title within one department. A NULL
    /// department scopes titles that are not bound to any unit.
    pub fn find_by_title_in_department(
        &self,
        title: &str,
        department_id: Option<&str>,
    ) -> RepositoryResult<Option<Position>> {
        let conn = self.get_conn()?;
        let result = conn.query_row(
            r#"
            SELECT id, code, title, category, department_id,
                   is_active, created_at, updated_at
            FROM positions
            WHERE title = ?1 AND department_id IS ?2
            "#,
            params![title, department_id],
            row_to_position,
        );

        match result {
            Ok(position) => Ok(Some(position)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// All positions of one department, title order.
    pub fn find_by_department(&self, department_id: &str) -> RepositoryResult<Vec<Position>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(
            r#"
            SELECT id, code, title, category, department_id,
                   is_active, created_at, updated_at
            FROM positions
            WHERE department_id = ?1
            ORDER BY title
            "#,
        )?;

        let positions = stmt
            .query_map(params![department_id], row_to_position)?
            .collect::<SqliteResult<Vec<Position>>>()?;
        Ok(positions)
    }

    pub fn count_by_department(&self, department_id: &str) -> RepositoryResult<i64> {
        let conn = self.get_conn()?;
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM positions WHERE department_id = ?1",
            params![department_id],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    /// Upserts a position keyed by id.
    pub fn save(&self, position: &Position) -> RepositoryResult<()> {
        let conn = self.get_conn()?;
        let tx = conn.unchecked_transaction()?;
        Self::upsert_tx(&tx, position)?;
        tx.commit()?;
        Ok(())
    }

    pub fn delete(&self, id: &str) -> RepositoryResult<()> {
        let conn = self.get_conn()?;
        conn.execute("DELETE FROM positions WHERE id = ?1", params![id])?;
        Ok(())
    }

    /// All positions, title order.
    pub fn list_all(&self) -> RepositoryResult<Vec<Position>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(
            r#"
            SELECT id, code, title, category, department_id,
                   is_active, created_at, updated_at
            FROM positions
            ORDER BY title
            "#,
        )?;

        let positions = stmt
            .query_map([], row_to_position)?
            .collect::<SqliteResult<Vec<Position>>>()?;
        Ok(positions)
    }

    /// Active positions only, title order.
    pub fn find_all_active(&self) -> RepositoryResult<Vec<Position>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(
            r#"
            SELECT id, code, title, category, department_id,
                   is_active, created_at, updated_at
            FROM positions
            WHERE is_active = 1
            ORDER BY title
            "#,
        )?;

        let positions = stmt
            .query_map([], row_to_position)?
            .collect::<SqliteResult<Vec<Position>>>()?;
        Ok(positions)
    }

    /// Soft activate / deactivate.
    pub fn set_active(&self, id: &str, active: bool) -> RepositoryResult<()> {
        let conn = self.get_conn()?;
        conn.execute(
            "UPDATE positions SET is_active = ?2, updated_at = ?3 WHERE id = ?1",
            params![id, active, Utc::now().to_rfc3339()],
        )?;
        Ok(())
    }

    // ===== Transaction-scoped helpers =====

    /// Upserts a position inside the caller's transaction.
    pub(crate) fn upsert_tx(tx: &Transaction, position: &Position) -> RepositoryResult<()> {
        tx.execute(
            r#"
            INSERT INTO positions (
                id, code, title, category, department_id,
                is_active, created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
            ON CONFLICT(id) DO UPDATE SET
                code = excluded.code,
                title = excluded.title,
                category = excluded.category,
                department_id = excluded.department_id,
                is_active = excluded.is_active,
                updated_at = excluded.updated_at
            "#,
            params![
                position.id,
                position.code,
                position.title,
                position.category,
                position.department_id,
                position.is_active,
                position.created_at.to_rfc3339(),
                position.updated_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    /// find_by_title_in_department inside the caller's transaction.
    pub(crate) fn find_by_title_in_department_tx(
        tx: &Transaction,
        title: &str,
        department_id: Option<&str>,
    ) -> RepositoryResult<Option<Position>> {
        let result = tx.query_row(
            r#"
            SELECT id, code, title, category, department_id,
                   is_active, created_at, updated_at
            FROM positions
            WHERE title = ?1 AND department_id IS ?2
            "#,
            params![title, department_id],
            row_to_position,
        );

        match result {
            Ok(position) => Ok(Some(position)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Finds the position with this title in this department or creates
    /// it with a generated unique code.
    ///
    /// # Returns
    /// - (position id, created flag)
    pub(crate) fn resolve_or_create_tx(
        tx: &Transaction,
        title: &str,
        department_id: Option<&str>,
    ) -> RepositoryResult<(String, bool)> {
        if let Some(position) = Self::find_by_title_in_department_tx(tx, title, department_id)? {
            return Ok((position.id, false));
        }

        let code = Self::unique_code_tx(tx, &Self::slugify(title))?;
        let mut position = Position::new(&code, title);
        position.department_id = department_id.map(|s| s.to_string());
        Self::upsert_tx(tx, &position)?;
        Ok((position.id, true))
    }

    /// Lowercased alphanumeric slug, '-' separated. Titles that slug to
    /// nothing fall back to "position".
    pub(crate) fn slugify(title: &str) -> String {
        let mut slug = String::with_capacity(title.len());
        for ch in title.trim().to_lowercase().chars() {
            if ch.is_alphanumeric() {
                slug.push(ch);
            } else if !slug.is_empty() && !slug.ends_with('-') {
                slug.push('-');
            }
        }
        let slug = slug.trim_end_matches('-');
        if slug.is_empty() {
            "position".to_string()
        } else {
            slug.to_string()
        }
    }

    /// Same title in different departments would collide on the unique
    /// position code; suffix until free.
    fn unique_code_tx(tx: &Transaction, base: &str) -> RepositoryResult<String> {
        let mut candidate = base.to_string();
        let mut n = 1;
        loop {
            let taken: i64 = tx.query_row(
                "SELECT COUNT(*) FROM positions WHERE code = ?1",
                params![candidate],
                |row| row.get(0),
            )?;
            if taken == 0 {
                return Ok(candidate);
            }
            n += 1;
            candidate = format!("{}-{}", base, n);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{configure_sqlite_connection, init_schema};
    use crate::domain::org::Department;
    use crate::repository::department_repo::DepartmentRepository;

    fn test_conn() -> Arc<Mutex<Connection>> {
        let conn = Connection::open_in_memory().unwrap();
        configure_sqlite_connection(&conn).unwrap();
        init_schema(&conn).unwrap();
        Arc::new(Mutex::new(conn))
    }

    #[test]
    fn test_save_then_find_by_code() {
        let repo = PositionRepository::from_connection(test_conn());
        let pos = Position::new("engineer", "Engineer");
        repo.save(&pos).unwrap();

        let found = repo.find_by_code("engineer").unwrap().unwrap();
        assert_eq!(found.id, pos.id);
        assert_eq!(found.title, "Engineer");
    }

    #[test]
    fn test_title_lookup_is_scoped_by_department() {
        let conn = test_conn();
        let dept_repo = DepartmentRepository::from_connection(conn.clone());
        let repo = PositionRepository::from_connection(conn);

        let dept = Department::new("AP", "Head Office");
        dept_repo.save(&dept).unwrap();

        let mut scoped = Position::new("engineer-ap", "Engineer");
        scoped.department_id = Some(dept.id.clone());
        repo.save(&scoped).unwrap();

        let unscoped = Position::new("engineer", "Engineer");
        repo.save(&unscoped).unwrap();

        let found = repo
            .find_by_title_in_department("Engineer", Some(dept.id.as_str()))
            .unwrap()
            .unwrap();
        assert_eq!(found.id, scoped.id);

        let found_global = repo
            .find_by_title_in_department("Engineer", None)
            .unwrap()
            .unwrap();
        assert_eq!(found_global.id, unscoped.id);

        assert!(repo
            .find_by_title_in_department("Manager", Some(dept.id.as_str()))
            .unwrap()
            .is_none());
    }

    #[test]
    fn test_slugify() {
        assert_eq!(PositionRepository::slugify("Lead Engineer"), "lead-engineer");
        assert_eq!(PositionRepository::slugify("  Инженер  "), "инженер");
        assert_eq!(PositionRepository::slugify("??"), "position");
    }

    #[test]
    fn test_resolve_or_create_reuses_and_disambiguates() {
        let conn = test_conn();
        let guard = conn.lock().unwrap();
        let tx = guard.unchecked_transaction().unwrap();

        let (first_id, created) =
            PositionRepository::resolve_or_create_tx(&tx, "Engineer", None).unwrap();
        assert!(created);

        let (again_id, created) =
            PositionRepository::resolve_or_create_tx(&tx, "Engineer", None).unwrap();
        assert!(!created);
        assert_eq!(again_id, first_id);

        // same title under a department gets its own code
        let dept = Department::new("AP", "Head Office");
        DepartmentRepository::upsert_tx(&tx, &dept).unwrap();
        let (scoped_id, created) =
            PositionRepository::resolve_or_create_tx(&tx, "Engineer", Some(&dept.id)).unwrap();
        assert!(created);
        assert_ne!(scoped_id, first_id);

        let codes: Vec<String> = {
            let mut stmt = tx
                .prepare("SELECT code FROM positions ORDER BY code")
                .unwrap();
            let rows = stmt
                .query_map([], |row| row.get::<_, String>(0))
                .unwrap()
                .collect::<SqliteResult<Vec<String>>>()
                .unwrap();
            rows
        };
        assert_eq!(codes, vec!["engineer", "engineer-2"]);
    }

    #[test]
    fn test_set_active_excludes_from_active_listing() {
        let repo = PositionRepository::from_connection(test_conn());
        let pos = Position::new("tester", "Tester");
        repo.save(&pos).unwrap();

        repo.set_active(&pos.id, false).unwrap();
        assert!(repo.find_all_active().unwrap().is_empty());
        assert!(!repo.find_by_id(&pos.id).unwrap().unwrap().is_active);
    }
}
