// ==========================================
// Org Structure Engine - Employee Repository
// ==========================================
// Responsibility: data access for the employees table
// Boundary: no business rules; tab-number grammar and counter upkeep
// live in rules / service
// ==========================================

use crate::db::open_sqlite_connection;
use crate::domain::org::Employee;
use crate::repository::error::{RepositoryError, RepositoryResult};
use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::{params, Connection, Result as SqliteResult, Transaction};
use std::sync::{Arc, Mutex};

fn parse_utc(raw: &str) -> DateTime<Utc> {
    raw.parse::<DateTime<Utc>>().unwrap_or_else(|_| Utc::now())
}

/// Maps one employees row in full column order to the entity.
fn row_to_employee(row: &rusqlite::Row<'_>) -> SqliteResult<Employee> {
    Ok(Employee {
        id: row.get(0)?,
        tab_number: row.get(1)?,
        full_name: row.get(2)?,
        email: row.get(3)?,
        phone: row.get(4)?,
        department_id: row.get(5)?,
        position_id: row.get(6)?,
        manager_id: row.get(7)?,
        hire_date: row
            .get::<_, Option<String>>(8)?
            .and_then(|s| NaiveDate::parse_from_str(&s, "%Y-%m-%d").ok()),
        is_active: row.get(9)?,
        created_at: parse_utc(&row.get::<_, String>(10)?),
        updated_at: parse_utc(&row.get::<_, String>(11)?),
    })
}

// ==========================================
// EmployeeRepository
// ==========================================
/// Employee storage access keyed by surrogate id, with lookups over the
/// tab_number natural key.
pub struct EmployeeRepository {
    conn: Arc<Mutex<Connection>>,
}

impl EmployeeRepository {
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

    pub fn find_by_id(&self, id: &str) -> RepositoryResult<Option<Employee>> {
        let conn = self.get_conn()?;
        let result = conn.query_row(
            r#"
            SELECT id, tab_number, full_name, email, phone,
                   department_id, position_id, manager_id,
                   hire_date, is_active, created_at, updated_at
            FROM employees
            WHERE id = ?1
            "#,
            params![id],
            row_to_employee,
        );

        match result {
            Ok(employee) => Ok(Some(employee)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Looks an employee up by the tab-number natural key.
    pub fn find_by_tab_number(&self, tab_number: &str) -> RepositoryResult<Option<Employee>> {
        let conn = self.get_conn()?;
        let result = conn.query_row(
            r#"
            SELECT id, tab_number, full_name, email, phone,
                   department_id, position_id, manager_id,
                   hire_date, is_active, created_at, updated_at
            FROM employees
            WHERE tab_number = ?1
            "#,
            params![tab_number],
            row_to_employee,
        );

        match result {
            Ok(employee) => Ok(Some(employee)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Cheap existence probe used by duplicate checks.
    pub fn exists_by_tab_number(&self, tab_number: &str) -> RepositoryResult<bool> {
        let conn = self.get_conn()?;
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM employees WHERE tab_number = ?1",
            params![tab_number],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    /// Upserts an employee keyed by id.
    pub fn save(&self, employee: &Employee) -> RepositoryResult<()> {
        let conn = self.get_conn()?;
        let tx = conn.unchecked_transaction()?;
        Self::upsert_tx(&tx, employee)?;
        tx.commit()?;
        Ok(())
    }

    pub fn delete(&self, id: &str) -> RepositoryResult<()> {
        let conn = self.get_conn()?;
        conn.execute("DELETE FROM employees WHERE id = ?1", params![id])?;
        Ok(())
    }

    /// All employees of one department, name order.
    pub fn find_by_department(&self, department_id: &str) -> RepositoryResult<Vec<Employee>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(
            r#"
            SELECT id, tab_number, full_name, email, phone,
                   department_id, position_id, manager_id,
                   hire_date, is_active, created_at, updated_at
            FROM employees
            WHERE department_id = ?1
            ORDER BY full_name
            "#,
        )?;

        let employees = stmt
            .query_map(params![department_id], row_to_employee)?
            .collect::<SqliteResult<Vec<Employee>>>()?;
        Ok(employees)
    }

    /// Live count of active employees in a department. The cached
    /// departments.employee_count must always equal this.
    pub fn count_by_department(&self, department_id: &str) -> RepositoryResult<i64> {
        let conn = self.get_conn()?;
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM employees WHERE department_id = ?1 AND is_active = 1",
            params![department_id],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    /// Direct reports of one manager, name order.
    pub fn find_by_manager(&self, manager_id: &str) -> RepositoryResult<Vec<Employee>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(
            r#"
            SELECT id, tab_number, full_name, email, phone,
                   department_id, position_id, manager_id,
                   hire_date, is_active, created_at, updated_at
            FROM employees
            WHERE manager_id = ?1
            ORDER BY full_name
            "#,
        )?;

        let employees = stmt
            .query_map(params![manager_id], row_to_employee)?
            .collect::<SqliteResult<Vec<Employee>>>()?;
        Ok(employees)
    }

    /// Substring search over name, tab number and email among active
    /// employees.
    ///
    /// # Arguments
    /// - query: raw search text, trimmed here
    /// - limit: result cap (0 or negative means no cap)
    pub fn search(&self, query: &str, limit: i32) -> RepositoryResult<Vec<Employee>> {
        let conn = self.get_conn()?;
        let pattern = format!("%{}%", query.trim());

        let sql = if limit > 0 {
            format!(
                r#"
                SELECT id, tab_number, full_name, email, phone,
                       department_id, position_id, manager_id,
                       hire_date, is_active, created_at, updated_at
                FROM employees
                WHERE is_active = 1
                  AND (full_name LIKE ?1 OR tab_number LIKE ?1 OR email LIKE ?1)
                ORDER BY full_name
                LIMIT {}
                "#,
                limit
            )
        } else {
            r#"
            SELECT id, tab_number, full_name, email, phone,
                   department_id, position_id, manager_id,
                   hire_date, is_active, created_at, updated_at
            FROM employees
            WHERE is_active = 1
              AND (full_name LIKE ?1 OR tab_number LIKE ?1 OR email LIKE ?1)
            ORDER BY full_name
            "#
            .to_string()
        };

        let mut stmt = conn.prepare(&sql)?;
        let employees = stmt
            .query_map(params![pattern], row_to_employee)?
            .collect::<SqliteResult<Vec<Employee>>>()?;
        Ok(employees)
    }

    /// All employees with pagination, tab-number order.
    ///
    /// # Arguments
    /// - limit: page size (0 or negative means all rows)
    /// - offset: pagination offset
    pub fn list_all(&self, limit: i32, offset: i32) -> RepositoryResult<Vec<Employee>> {
        let conn = self.get_conn()?;

        let sql = if limit > 0 {
            format!(
                r#"
                SELECT id, tab_number, full_name, email, phone,
                       department_id, position_id, manager_id,
                       hire_date, is_active, created_at, updated_at
                FROM employees
                ORDER BY tab_number
                LIMIT {} OFFSET {}
                "#,
                limit, offset
            )
        } else {
            r#"
            SELECT id, tab_number, full_name, email, phone,
                   department_id, position_id, manager_id,
                   hire_date, is_active, created_at, updated_at
            FROM employees
            ORDER BY tab_number
            "#
            .to_string()
        };

        let mut stmt = conn.prepare(&sql)?;
        let employees = stmt
            .query_map([], row_to_employee)?
            .collect::<SqliteResult<Vec<Employee>>>()?;
        Ok(employees)
    }

    /// Active employees only, tab-number order.
    pub fn find_all_active(&self) -> RepositoryResult<Vec<Employee>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(
            r#"
            SELECT id, tab_number, full_name, email, phone,
                   department_id, position_id, manager_id,
                   hire_date, is_active, created_at, updated_at
            FROM employees
            WHERE is_active = 1
            ORDER BY tab_number
            "#,
        )?;

        let employees = stmt
            .query_map([], row_to_employee)?
            .collect::<SqliteResult<Vec<Employee>>>()?;
        Ok(employees)
    }

    /// Flips the active flag.
    pub fn set_active(&self, id: &str, active: bool) -> RepositoryResult<()> {
        let conn = self.get_conn()?;
        conn.execute(
            "UPDATE employees SET is_active = ?2, updated_at = ?3 WHERE id = ?1",
            params![id, active, Utc::now().to_rfc3339()],
        )?;
        Ok(())
    }

    // ===== Transaction-scoped helpers =====

    /// Upserts an employee inside the caller's transaction.
    pub(crate) fn upsert_tx(tx: &Transaction, employee: &Employee) -> RepositoryResult<()> {
        tx.execute(
            r#"
            INSERT INTO employees (
                id, tab_number, full_name, email, phone,
                department_id, position_id, manager_id,
                hire_date, is_active, created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)
            ON CONFLICT(id) DO UPDATE SET
                tab_number = excluded.tab_number,
                full_name = excluded.full_name,
                email = excluded.email,
                phone = excluded.phone,
                department_id = excluded.department_id,
                position_id = excluded.position_id,
                manager_id = excluded.manager_id,
                hire_date = excluded.hire_date,
                is_active = excluded.is_active,
                updated_at = excluded.updated_at
            "#,
            params![
                employee.id,
                employee.tab_number,
                employee.full_name,
                employee.email,
                employee.phone,
                employee.department_id,
                employee.position_id,
                employee.manager_id,
                employee.hire_date.map(|d| d.to_string()),
                employee.is_active,
                employee.created_at.to_rfc3339(),
                employee.updated_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    /// find_by_id inside the caller's transaction.
    pub(crate) fn find_by_id_tx(tx: &Transaction, id: &str) -> RepositoryResult<Option<Employee>> {
        let result = tx.query_row(
            r#"
            SELECT id, tab_number, full_name, email, phone,
                   department_id, position_id, manager_id,
                   hire_date, is_active, created_at, updated_at
            FROM employees
            WHERE id = ?1
            "#,
            params![id],
            row_to_employee,
        );

        match result {
            Ok(employee) => Ok(Some(employee)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// find_by_tab_number inside the caller's transaction.
    pub(crate) fn find_by_tab_number_tx(
        tx: &Transaction,
        tab_number: &str,
    ) -> RepositoryResult<Option<Employee>> {
        let result = tx.query_row(
            r#"
            SELECT id, tab_number, full_name, email, phone,
                   department_id, position_id, manager_id,
                   hire_date, is_active, created_at, updated_at
            FROM employees
            WHERE tab_number = ?1
            "#,
            params![tab_number],
            row_to_employee,
        );

        match result {
            Ok(employee) => Ok(Some(employee)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// delete inside the caller's transaction, so the caller can
    /// recompute the former department's counter before committing.
    pub(crate) fn delete_tx(tx: &Transaction, id: &str) -> RepositoryResult<()> {
        tx.execute("DELETE FROM employees WHERE id = ?1", params![id])?;
        Ok(())
    }

    /// Unlinks every subordinate of a manager. Run before deleting the
    /// manager row; manager_id references employees(id).
    pub(crate) fn clear_manager_tx(tx: &Transaction, manager_id: &str) -> RepositoryResult<usize> {
        let cleared = tx.execute(
            "UPDATE employees SET manager_id = NULL, updated_at = ?2 WHERE manager_id = ?1",
            params![manager_id, Utc::now().to_rfc3339()],
        )?;
        Ok(cleared)
    }
}
