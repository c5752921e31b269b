// ==========================================
// Org Structure Engine - Department Repository
// ==========================================
// Responsibility: data access for the departments table
// Boundary: no business rules, plain CRUD plus the cached counter
// ==========================================

use crate::db::open_sqlite_connection;
use crate::domain::org::Department;
use crate::repository::error::{RepositoryError, RepositoryResult};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, Result as SqliteResult, Transaction};
use std::sync::{Arc, Mutex};

/// Lenient RFC3339 parse; rows written by raw fixtures fall back to now.
fn parse_utc(raw: &str) -> DateTime<Utc> {
    raw.parse::<DateTime<Utc>>().unwrap_or_else(|_| Utc::now())
}

/// Maps one departments row in full column order to the entity.
fn row_to_department(row: &rusqlite::Row<'_>) -> SqliteResult<Department> {
    Ok(Department {
        id: row.get(0)?,
        code: row.get(1)?,
        name: row.get(2)?,
        parent_id: row.get(3)?,
        level: row.get(4)?,
        path: row.get(5)?,
        employee_count: row.get(6)?,
        is_active: row.get(7)?,
        created_at: parse_utc(&row.get::<_, String>(8)?),
        updated_at: parse_utc(&row.get::<_, String>(9)?),
    })
}

// ==========================================
// DepartmentRepository
// ==========================================
/// Department storage access.
/// All queries are parameterized; the cached employee_count column is
/// only ever written through `recompute_employee_count_tx` so it cannot
/// drift from the live count inside one transaction.
pub struct DepartmentRepository {
    conn: Arc<Mutex<Connection>>,
}

impl DepartmentRepository {
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

    /// Looks a department up by its surrogate id.
    ///
    /// # Returns
    /// - Ok(Some(department)): row found
    /// - Ok(None): no such id
    pub fn find_by_id(&self, id: &str) -> RepositoryResult<Option<Department>> {
        let conn = self.get_conn()?;
        let result = conn.query_row(
            r#"
            SELECT id, code, name, parent_id, level, path,
                   employee_count, is_active, created_at, updated_at
            FROM departments
            WHERE id = ?1
            "#,
            params![id],
            row_to_department,
        );

        match result {
            Ok(department) => Ok(Some(department)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Looks a department up by its natural key (the hierarchical code).
    pub fn find_by_code(&self, code: &str) -> RepositoryResult<Option<Department>> {
        let conn = self.get_conn()?;
        let result = conn.query_row(
            r#"
            SELECT id, code, name, parent_id, level, path,
                   employee_count, is_active, created_at, updated_at
            FROM departments
            WHERE code = ?1
            "#,
            params![code],
            row_to_department,
        );

        match result {
            Ok(department) => Ok(Some(department)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Upserts a department keyed by id (insert if absent, update if present).
    pub fn save(&self, department: &Department) -> RepositoryResult<()> {
        let conn = self.get_conn()?;
        let tx = conn.unchecked_transaction()?;
        Self::upsert_tx(&tx, department)?;
        tx.commit()?;
        Ok(())
    }

    /// Deletes a department row. Child/employee checks belong to the
    /// service layer, not here.
    pub fn delete(&self, id: &str) -> RepositoryResult<()> {
        let conn = self.get_conn()?;
        conn.execute("DELETE FROM departments WHERE id = ?1", params![id])?;
        Ok(())
    }

    /// All departments, code order.
    pub fn find_all(&self) -> RepositoryResult<Vec<Department>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(
            r#"
            SELECT id, code, name, parent_id, level, path,
                   employee_count, is_active, created_at, updated_at
            FROM departments
            ORDER BY code
            "#,
        )?;

        let departments = stmt
            .query_map([], row_to_department)?
            .collect::<SqliteResult<Vec<Department>>>()?;
        Ok(departments)
    }

    /// Active departments only, code order.
    pub fn find_all_active(&self) -> RepositoryResult<Vec<Department>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(
            r#"
            SELECT id, code, name, parent_id, level, path,
                   employee_count, is_active, created_at, updated_at
            FROM departments
            WHERE is_active = 1
            ORDER BY code
            "#,
        )?;

        let departments = stmt
            .query_map([], row_to_department)?
            .collect::<SqliteResult<Vec<Department>>>()?;
        Ok(departments)
    }

    /// Root departments (no parent), code order.
    pub fn find_roots(&self) -> RepositoryResult<Vec<Department>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(
            r#"
            SELECT id, code, name, parent_id, level, path,
                   employee_count, is_active, created_at, updated_at
            FROM departments
            WHERE parent_id IS NULL
            ORDER BY code
            "#,
        )?;

        let departments = stmt
            .query_map([], row_to_department)?
            .collect::<SqliteResult<Vec<Department>>>()?;
        Ok(departments)
    }

    /// Direct children of one department, code order.
    pub fn find_children(&self, parent_id: &str) -> RepositoryResult<Vec<Department>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(
            r#"
            SELECT id, code, name, parent_id, level, path,
                   employee_count, is_active, created_at, updated_at
            FROM departments
            WHERE parent_id = ?1
            ORDER BY code
            "#,
        )?;

        let departments = stmt
            .query_map(params![parent_id], row_to_department)?
            .collect::<SqliteResult<Vec<Department>>>()?;
        Ok(departments)
    }

    /// Number of direct children.
    pub fn count_children(&self, id: &str) -> RepositoryResult<i64> {
        let conn = self.get_conn()?;
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM departments WHERE parent_id = ?1",
            params![id],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    /// Live count of active employees assigned to the department. This
    /// is the source of truth the cached employee_count must equal.
    pub fn count_active_employees(&self, id: &str) -> RepositoryResult<i64> {
        let conn = self.get_conn()?;
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM employees WHERE department_id = ?1 AND is_active = 1",
            params![id],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    /// Flips the active flag.
    pub fn set_active(&self, id: &str, active: bool) -> RepositoryResult<()> {
        let conn = self.get_conn()?;
        conn.execute(
            "UPDATE departments SET is_active = ?2, updated_at = ?3 WHERE id = ?1",
            params![id, active, Utc::now().to_rfc3339()],
        )?;
        Ok(())
    }

    // ===== Transaction-scoped helpers =====
    // Composed by the service layer and the import repository so that
    // multi-entity writes share one transaction.

    /// Upserts a department inside the caller's transaction.
    pub(crate) fn upsert_tx(tx: &Transaction, department: &Department) -> RepositoryResult<()> {
        tx.execute(
            r#"
            INSERT INTO departments (
                id, code, name, parent_id, level, path,
                employee_count, is_active, created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
            ON CONFLICT(id) DO UPDATE SET
                code = excluded.code,
                name = excluded.name,
                parent_id = excluded.parent_id,
                level = excluded.level,
                path = excluded.path,
                employee_count = excluded.employee_count,
                is_active = excluded.is_active,
                updated_at = excluded.updated_at
            "#,
            params![
                department.id,
                department.code,
                department.name,
                department.parent_id,
                department.level,
                department.path,
                department.employee_count,
                department.is_active,
                department.created_at.to_rfc3339(),
                department.updated_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    /// find_by_id inside the caller's transaction.
    pub(crate) fn find_by_id_tx(tx: &Transaction, id: &str) -> RepositoryResult<Option<Department>> {
        let result = tx.query_row(
            r#"
            SELECT id, code, name, parent_id, level, path,
                   employee_count, is_active, created_at, updated_at
            FROM departments
            WHERE id = ?1
            "#,
            params![id],
            row_to_department,
        );

        match result {
            Ok(department) => Ok(Some(department)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// find_by_code inside the caller's transaction.
    pub(crate) fn find_by_code_tx(
        tx: &Transaction,
        code: &str,
    ) -> RepositoryResult<Option<Department>> {
        let result = tx.query_row(
            r#"
            SELECT id, code, name, parent_id, level, path,
                   employee_count, is_active, created_at, updated_at
            FROM departments
            WHERE code = ?1
            "#,
            params![code],
            row_to_department,
        );

        match result {
            Ok(department) => Ok(Some(department)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// find_children inside the caller's transaction.
    pub(crate) fn find_children_tx(
        tx: &Transaction,
        parent_id: &str,
    ) -> RepositoryResult<Vec<Department>> {
        let mut stmt = tx.prepare(
            r#"
            SELECT id, code, name, parent_id, level, path,
                   employee_count, is_active, created_at, updated_at
            FROM departments
            WHERE parent_id = ?1
            ORDER BY code
            "#,
        )?;

        let departments = stmt
            .query_map(params![parent_id], row_to_department)?
            .collect::<SqliteResult<Vec<Department>>>()?;
        Ok(departments)
    }

    /// Rewrites the cached employee_count from a live COUNT over the
    /// employees table, inside the same transaction as the employee
    /// mutation that invalidated it. Returns the fresh count.
    pub(crate) fn recompute_employee_count_tx(
        tx: &Transaction,
        department_id: &str,
    ) -> RepositoryResult<i64> {
        tx.execute(
            r#"
            UPDATE departments
            SET employee_count = (
                    SELECT COUNT(*) FROM employees
                    WHERE department_id = ?1 AND is_active = 1
                ),
                updated_at = ?2
            WHERE id = ?1
            "#,
            params![department_id, Utc::now().to_rfc3339()],
        )?;

        let count: i64 = tx.query_row(
            "SELECT employee_count FROM departments WHERE id = ?1",
            params![department_id],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    /// count_children inside the caller's transaction.
    pub(crate) fn count_children_tx(tx: &Transaction, id: &str) -> RepositoryResult<i64> {
        let count: i64 = tx.query_row(
            "SELECT COUNT(*) FROM departments WHERE parent_id = ?1",
            params![id],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    /// Employees still assigned to the department, active or not.
    pub(crate) fn count_assigned_employees_tx(tx: &Transaction, id: &str) -> RepositoryResult<i64> {
        let count: i64 = tx.query_row(
            "SELECT COUNT(*) FROM employees WHERE department_id = ?1",
            params![id],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    /// delete inside the caller's transaction.
    pub(crate) fn delete_tx(tx: &Transaction, id: &str) -> RepositoryResult<()> {
        tx.execute("DELETE FROM departments WHERE id = ?1", params![id])?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{configure_sqlite_connection, init_schema};

    fn test_repo() -> DepartmentRepository {
        let conn = Connection::open_in_memory().unwrap();
        configure_sqlite_connection(&conn).unwrap();
        init_schema(&conn).unwrap();
        DepartmentRepository::from_connection(Arc::new(Mutex::new(conn)))
    }

    #[test]
    fn test_save_then_find_by_code() {
        let repo = test_repo();
        let dept = Department::new("AP.3", "Finance");
        repo.save(&dept).unwrap();

        let found = repo.find_by_code("AP.3").unwrap().unwrap();
        assert_eq!(found.id, dept.id);
        assert_eq!(found.name, "Finance");
        assert_eq!(found.level, 1);
        assert!(found.is_active);
    }

    #[test]
    fn test_save_is_an_update_on_existing_id() {
        let repo = test_repo();
        let mut dept = Department::new("AP", "Head Office");
        repo.save(&dept).unwrap();

        dept.name = "Headquarters".to_string();
        repo.save(&dept).unwrap();

        let found = repo.find_by_id(&dept.id).unwrap().unwrap();
        assert_eq!(found.name, "Headquarters");
        assert_eq!(repo.find_all().unwrap().len(), 1);
    }

    #[test]
    fn test_find_by_id_missing_returns_none() {
        let repo = test_repo();
        assert!(repo.find_by_id("no-such-id").unwrap().is_none());
    }

    #[test]
    fn test_roots_and_children() {
        let repo = test_repo();
        let root = Department::new("AP", "Head Office");
        repo.save(&root).unwrap();

        let mut child = Department::new("AP.1", "Sales");
        child.parent_id = Some(root.id.clone());
        repo.save(&child).unwrap();

        let roots = repo.find_roots().unwrap();
        assert_eq!(roots.len(), 1);
        assert_eq!(roots[0].code, "AP");

        let children = repo.find_children(&root.id).unwrap();
        assert_eq!(children.len(), 1);
        assert_eq!(children[0].code, "AP.1");
        assert_eq!(repo.count_children(&root.id).unwrap(), 1);
        assert_eq!(repo.count_children(&child.id).unwrap(), 0);
    }

    #[test]
    fn test_duplicate_code_is_a_unique_violation() {
        let repo = test_repo();
        repo.save(&Department::new("AP", "First")).unwrap();

        let err = repo.save(&Department::new("AP", "Second")).unwrap_err();
        assert!(matches!(err, RepositoryError::UniqueConstraintViolation(_)));
    }
}
