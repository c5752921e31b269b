// ==========================================
// Org Structure Engine - Import Repository Implementation
// ==========================================
// Responsibility: rusqlite implementation of OrgImportRepository
// Every apply_* call is one transaction; a failure anywhere rolls the
// whole batch back so counters never drift from the rows
// ==========================================

use crate::db::open_sqlite_connection;
use crate::domain::import::{ParsedDepartment, ParsedEmployee, RosterRow};
use crate::domain::org::{Department, Employee};
use crate::repository::department_repo::DepartmentRepository;
use crate::repository::employee_repo::EmployeeRepository;
use crate::repository::org_import_repo::{OrgApplyStats, OrgImportRepository, RosterApplyStats};
use crate::repository::position_repo::PositionRepository;
use crate::rules::{code_level, parent_code_of};
use async_trait::async_trait;
use chrono::Utc;
use rusqlite::{params, Connection, Transaction};
use std::collections::{HashMap, HashSet};
use std::error::Error;
use std::sync::{Arc, Mutex};

// ==========================================
// OrgImportRepositoryImpl
// ==========================================
pub struct OrgImportRepositoryImpl {
    conn: Arc<Mutex<Connection>>,
}

impl OrgImportRepositoryImpl {
    /// Opens a repository on the given database file.
    pub fn new(db_path: &str) -> Result<Self, Box<dyn Error>> {
        let conn = open_sqlite_connection(db_path)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Builds a repository over an already opened shared connection.
    pub fn from_connection(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }

    /// Chunked code -> id lookup (SQLite parameter limit).
    fn ids_by_code(
        conn: &Connection,
        codes: &[String],
    ) -> Result<HashMap<String, String>, Box<dyn Error>> {
        if codes.is_empty() {
            return Ok(HashMap::new());
        }

        const CHUNK_SIZE: usize = 900;

        let mut result = HashMap::with_capacity(codes.len());
        for chunk in codes.chunks(CHUNK_SIZE) {
            let placeholders = std::iter::repeat("?")
                .take(chunk.len())
                .collect::<Vec<_>>()
                .join(", ");
            let sql = format!(
                "SELECT code, id FROM departments WHERE code IN ({})",
                placeholders
            );

            let mut stmt = conn.prepare(&sql)?;
            let params_vec: Vec<&dyn rusqlite::ToSql> =
                chunk.iter().map(|s| s as &dyn rusqlite::ToSql).collect();

            let rows = stmt.query_map(params_vec.as_slice(), |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
            })?;
            for row in rows {
                let (code, id) = row?;
                result.insert(code, id);
            }
        }

        Ok(result)
    }

    /// Chunked tab_number -> id lookup.
    fn ids_by_tab(
        conn: &Connection,
        tab_numbers: &[String],
    ) -> Result<HashMap<String, String>, Box<dyn Error>> {
        if tab_numbers.is_empty() {
            return Ok(HashMap::new());
        }

        const CHUNK_SIZE: usize = 900;

        let mut result = HashMap::with_capacity(tab_numbers.len());
        for chunk in tab_numbers.chunks(CHUNK_SIZE) {
            let placeholders = std::iter::repeat("?")
                .take(chunk.len())
                .collect::<Vec<_>>()
                .join(", ");
            let sql = format!(
                "SELECT tab_number, id FROM employees WHERE tab_number IN ({})",
                placeholders
            );

            let mut stmt = conn.prepare(&sql)?;
            let params_vec: Vec<&dyn rusqlite::ToSql> =
                chunk.iter().map(|s| s as &dyn rusqlite::ToSql).collect();

            let rows = stmt.query_map(params_vec.as_slice(), |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
            })?;
            for row in rows {
                let (tab, id) = row?;
                result.insert(tab, id);
            }
        }

        Ok(result)
    }

    /// Resolves a department id by code, creating the row when absent.
    ///
    /// With a name given (org-chart flow) an existing row is refreshed:
    /// name, parent linkage, level and display path are recomputed from
    /// the current state. Without a name (roster flow) an existing row
    /// is left untouched. A created row is linked to its parent when the
    /// parent code already has a row, and falls back to the code as its
    /// provisional name.
    fn resolve_or_create_department_tx(
        tx: &Transaction,
        code: &str,
        name: Option<&str>,
    ) -> Result<(String, bool), Box<dyn Error>> {
        if let Some(dept) = DepartmentRepository::find_by_code_tx(tx, code)? {
            let fresh_name = match name.filter(|n| !n.is_empty()) {
                Some(n) => n,
                None => return Ok((dept.id, false)),
            };

            let parent = match parent_code_of(code) {
                Some(parent_code) => DepartmentRepository::find_by_code_tx(tx, parent_code)?,
                None => None,
            };
            let (parent_id, path) = match &parent {
                Some(p) => (Some(p.id.clone()), format!("{} / {}", p.path, fresh_name)),
                None => (None, fresh_name.to_string()),
            };

            tx.execute(
                r#"
                UPDATE departments
                SET name = ?2, parent_id = ?3, level = ?4, path = ?5, updated_at = ?6
                WHERE id = ?1
                "#,
                params![
                    dept.id,
                    fresh_name,
                    parent_id,
                    code_level(code),
                    path,
                    Utc::now().to_rfc3339(),
                ],
            )?;
            return Ok((dept.id, false));
        }

        let display_name = match name.filter(|n| !n.is_empty()) {
            Some(n) => n,
            None => code,
        };
        let mut dept = Department::new(code, display_name);

        let parent = match parent_code_of(code) {
            Some(parent_code) => DepartmentRepository::find_by_code_tx(tx, parent_code)?,
            None => None,
        };
        if let Some(p) = parent {
            dept.parent_id = Some(p.id.clone());
            dept.path = format!("{} / {}", p.path, display_name);
        }

        DepartmentRepository::upsert_tx(tx, &dept)?;
        Ok((dept.id, true))
    }

    /// Upserts one roster employee by tab number.
    ///
    /// # Returns
    /// - (employee id, created flag, previous department id)
    fn upsert_roster_employee_tx(
        tx: &Transaction,
        row: &RosterRow,
        department_id: Option<&str>,
        position_id: Option<&str>,
    ) -> Result<(String, bool, Option<String>), Box<dyn Error>> {
        if let Some(existing) = EmployeeRepository::find_by_tab_number_tx(tx, &row.tab_number)? {
            tx.execute(
                r#"
                UPDATE employees
                SET full_name = ?2, email = ?3, phone = ?4,
                    department_id = ?5, position_id = ?6, updated_at = ?7
                WHERE id = ?1
                "#,
                params![
                    existing.id,
                    row.full_name,
                    row.email,
                    row.phone,
                    department_id,
                    position_id,
                    Utc::now().to_rfc3339(),
                ],
            )?;
            Ok((existing.id, false, existing.department_id))
        } else {
            let mut employee = Employee::new(&row.tab_number, &row.full_name);
            employee.email = row.email.clone();
            employee.phone = row.phone.clone();
            employee.department_id = department_id.map(|s| s.to_string());
            employee.position_id = position_id.map(|s| s.to_string());
            EmployeeRepository::upsert_tx(tx, &employee)?;
            Ok((employee.id, true, None))
        }
    }

    /// Upserts one org-chart employee by tab number. The sheet carries
    /// no email/phone/manager, so those columns are left untouched on
    /// update.
    fn upsert_org_employee_tx(
        tx: &Transaction,
        parsed: &ParsedEmployee,
        department_id: Option<&str>,
        position_id: Option<&str>,
    ) -> Result<(String, bool, Option<String>), Box<dyn Error>> {
        if let Some(existing) = EmployeeRepository::find_by_tab_number_tx(tx, &parsed.tab_number)? {
            tx.execute(
                r#"
                UPDATE employees
                SET full_name = ?2, department_id = ?3, position_id = ?4, updated_at = ?5
                WHERE id = ?1
                "#,
                params![
                    existing.id,
                    parsed.full_name,
                    department_id,
                    position_id,
                    Utc::now().to_rfc3339(),
                ],
            )?;
            Ok((existing.id, false, existing.department_id))
        } else {
            let mut employee = Employee::new(&parsed.tab_number, &parsed.full_name);
            employee.department_id = department_id.map(|s| s.to_string());
            employee.position_id = position_id.map(|s| s.to_string());
            EmployeeRepository::upsert_tx(tx, &employee)?;
            Ok((employee.id, true, None))
        }
    }

    fn link_manager_tx(
        tx: &Transaction,
        employee_id: &str,
        manager_id: &str,
    ) -> Result<(), Box<dyn Error>> {
        tx.execute(
            "UPDATE employees SET manager_id = ?2, updated_at = ?3 WHERE id = ?1",
            params![employee_id, manager_id, Utc::now().to_rfc3339()],
        )?;
        Ok(())
    }
}

#[async_trait]
impl OrgImportRepository for OrgImportRepositoryImpl {
    async fn department_ids_by_code(
        &self,
        codes: &[String],
    ) -> Result<HashMap<String, String>, Box<dyn Error>> {
        let conn = self
            .conn
            .lock()
            .map_err(|e| format!("connection lock poisoned: {}", e))?;
        Self::ids_by_code(&conn, codes)
    }

    async fn employee_ids_by_tab(
        &self,
        tab_numbers: &[String],
    ) -> Result<HashMap<String, String>, Box<dyn Error>> {
        let conn = self
            .conn
            .lock()
            .map_err(|e| format!("connection lock poisoned: {}", e))?;
        Self::ids_by_tab(&conn, tab_numbers)
    }

    async fn apply_roster(
        &self,
        rows: Vec<RosterRow>,
    ) -> Result<RosterApplyStats, Box<dyn Error>> {
        let conn = self
            .conn
            .lock()
            .map_err(|e| format!("connection lock poisoned: {}", e))?;
        let tx = conn.unchecked_transaction()?;

        let mut stats = RosterApplyStats::default();
        let mut batch_ids: HashMap<String, String> = HashMap::new();
        let mut touched: HashSet<String> = HashSet::new();
        let mut pending_managers: Vec<(String, String)> = Vec::new();

        for row in &rows {
            let department_id = match row.department_code.as_deref().filter(|c| !c.is_empty()) {
                Some(code) => {
                    let (id, created) = Self::resolve_or_create_department_tx(&tx, code, None)?;
                    if created {
                        stats.departments_created += 1;
                    }
                    touched.insert(id.clone());
                    Some(id)
                }
                None => None,
            };

            let position_id = match row.position_title.as_deref().filter(|t| !t.is_empty()) {
                Some(title) => {
                    let (id, created) =
                        PositionRepository::resolve_or_create_tx(&tx, title, department_id.as_deref())?;
                    if created {
                        stats.positions_created += 1;
                    }
                    Some(id)
                }
                None => None,
            };

            let (employee_id, created, old_department) = Self::upsert_roster_employee_tx(
                &tx,
                row,
                department_id.as_deref(),
                position_id.as_deref(),
            )?;
            if created {
                stats.employees_created += 1;
            } else {
                stats.employees_updated += 1;
            }
            if let Some(old) = old_department {
                touched.insert(old);
            }

            batch_ids.insert(row.tab_number.clone(), employee_id.clone());

            if let Some(manager_tab) = row.manager_tab_number.as_deref().filter(|t| !t.is_empty()) {
                pending_managers.push((employee_id, manager_tab.to_string()));
            }
        }

        // Second pass: forward references resolve against the batch
        // first, then against rows already in the database.
        for (employee_id, manager_tab) in &pending_managers {
            let manager_id = match batch_ids.get(manager_tab) {
                Some(id) => Some(id.clone()),
                None => EmployeeRepository::find_by_tab_number_tx(&tx, manager_tab)?.map(|m| m.id),
            };
            match manager_id {
                Some(id) if &id != employee_id => {
                    Self::link_manager_tx(&tx, employee_id, &id)?;
                }
                Some(_) => stats.warnings.push(format!(
                    "Employee cannot be their own manager: {}",
                    manager_tab
                )),
                None => stats
                    .warnings
                    .push(format!("Manager with tab number {} not found", manager_tab)),
            }
        }

        for department_id in &touched {
            DepartmentRepository::recompute_employee_count_tx(&tx, department_id)?;
        }

        tx.commit()?;
        Ok(stats)
    }

    async fn apply_org_structure(
        &self,
        mut departments: Vec<ParsedDepartment>,
        employees: Vec<ParsedEmployee>,
    ) -> Result<OrgApplyStats, Box<dyn Error>> {
        let conn = self
            .conn
            .lock()
            .map_err(|e| format!("connection lock poisoned: {}", e))?;
        let tx = conn.unchecked_transaction()?;

        let mut stats = OrgApplyStats::default();
        let mut code_ids: HashMap<String, String> = HashMap::new();
        let mut touched: HashSet<String> = HashSet::new();

        // Parents first, so a child row listed above its parent in the
        // sheet still links up.
        departments.sort_by_key(|d| (code_level(&d.code), d.row));
        for dept in &departments {
            let (id, created) =
                Self::resolve_or_create_department_tx(&tx, &dept.code, Some(&dept.name))?;
            if created {
                stats.departments_created += 1;
            }
            code_ids.insert(dept.code.clone(), id);
        }

        for emp in &employees {
            let department_id = match emp.department_code.as_deref() {
                Some(code) => match code_ids.get(code) {
                    Some(id) => Some(id.clone()),
                    None => DepartmentRepository::find_by_code_tx(&tx, code)?.map(|d| d.id),
                },
                None => None,
            };
            if department_id.is_none() {
                stats.warnings.push(format!(
                    "Cannot determine department for employee '{}' at row {}",
                    emp.full_name, emp.row
                ));
            }

            let position_id = match emp.position_title.as_deref().filter(|t| !t.is_empty()) {
                Some(title) => {
                    let (id, created) =
                        PositionRepository::resolve_or_create_tx(&tx, title, department_id.as_deref())?;
                    if created {
                        stats.positions_created += 1;
                    }
                    Some(id)
                }
                None => None,
            };

            let (_, created, old_department) = Self::upsert_org_employee_tx(
                &tx,
                emp,
                department_id.as_deref(),
                position_id.as_deref(),
            )?;
            if created {
                stats.employees_created += 1;
            } else {
                stats.employees_updated += 1;
            }

            if let Some(old) = old_department {
                touched.insert(old);
            }
            if let Some(id) = department_id {
                touched.insert(id);
            }
        }

        for department_id in &touched {
            DepartmentRepository::recompute_employee_count_tx(&tx, department_id)?;
        }

        tx.commit()?;
        Ok(stats)
    }

    async fn count_departments(&self) -> Result<usize, Box<dyn Error>> {
        let conn = self
            .conn
            .lock()
            .map_err(|e| format!("connection lock poisoned: {}", e))?;
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM departments", [], |row| row.get(0))?;
        Ok(count as usize)
    }

    async fn count_employees(&self) -> Result<usize, Box<dyn Error>> {
        let conn = self
            .conn
            .lock()
            .map_err(|e| format!("connection lock poisoned: {}", e))?;
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM employees", [], |row| row.get(0))?;
        Ok(count as usize)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{configure_sqlite_connection, init_schema};

    fn test_conn() -> Arc<Mutex<Connection>> {
        let conn = Connection::open_in_memory().unwrap();
        configure_sqlite_connection(&conn).unwrap();
        init_schema(&conn).unwrap();
        Arc::new(Mutex::new(conn))
    }

    fn roster_row(tab: &str, name: &str, dept: &str, row: usize) -> RosterRow {
        RosterRow {
            tab_number: tab.to_string(),
            full_name: name.to_string(),
            department_code: Some(dept.to_string()),
            row,
            ..RosterRow::default()
        }
    }

    #[tokio::test]
    async fn test_apply_roster_creates_and_counts() {
        let conn = test_conn();
        let repo = OrgImportRepositoryImpl::from_connection(conn.clone());

        let rows = vec![
            roster_row("EMP001", "Ivanov Ivan", "IT", 2),
            roster_row("EMP002", "Petrov Petr", "IT", 3),
        ];
        let stats = repo.apply_roster(rows).await.unwrap();

        assert_eq!(stats.departments_created, 1);
        assert_eq!(stats.employees_created, 2);
        assert_eq!(stats.employees_updated, 0);

        let guard = conn.lock().unwrap();
        let count: i64 = guard
            .query_row(
                "SELECT employee_count FROM departments WHERE code = 'IT'",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(count, 2);
    }

    #[tokio::test]
    async fn test_apply_roster_is_idempotent_on_tab_number() {
        let repo = OrgImportRepositoryImpl::from_connection(test_conn());

        let first = repo
            .apply_roster(vec![roster_row("EMP001", "Ivanov Ivan", "IT", 2)])
            .await
            .unwrap();
        assert_eq!(first.employees_created, 1);

        let second = repo
            .apply_roster(vec![roster_row("EMP001", "Ivanov I. I.", "IT", 2)])
            .await
            .unwrap();
        assert_eq!(second.employees_created, 0);
        assert_eq!(second.employees_updated, 1);
        assert_eq!(second.departments_created, 0);
        assert_eq!(repo.count_employees().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_apply_roster_links_forward_manager_reference() {
        let conn = test_conn();
        let repo = OrgImportRepositoryImpl::from_connection(conn.clone());

        // EMP001 references a manager whose row comes later in the file.
        let mut subordinate = roster_row("EMP001", "Ivanov Ivan", "IT", 2);
        subordinate.manager_tab_number = Some("EMP002".to_string());
        let manager = roster_row("EMP002", "Petrov Petr", "IT", 3);

        let stats = repo.apply_roster(vec![subordinate, manager]).await.unwrap();
        assert!(stats.warnings.is_empty());

        let guard = conn.lock().unwrap();
        let manager_id: Option<String> = guard
            .query_row(
                "SELECT manager_id FROM employees WHERE tab_number = 'EMP001'",
                [],
                |row| row.get(0),
            )
            .unwrap();
        let expected: String = guard
            .query_row(
                "SELECT id FROM employees WHERE tab_number = 'EMP002'",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(manager_id.as_deref(), Some(expected.as_str()));
    }

    #[tokio::test]
    async fn test_apply_org_structure_links_parents_and_paths() {
        let conn = test_conn();
        let repo = OrgImportRepositoryImpl::from_connection(conn.clone());

        let departments = vec![
            ParsedDepartment {
                code: "AP".to_string(),
                name: "Head Office".to_string(),
                parent_code: None,
                row: 2,
            },
            ParsedDepartment {
                code: "AP.1".to_string(),
                name: "Sales".to_string(),
                parent_code: Some("AP".to_string()),
                row: 3,
            },
        ];
        let employees = vec![ParsedEmployee {
            tab_number: "AR21000612".to_string(),
            full_name: "Ivanov Ivan".to_string(),
            position_title: Some("Manager".to_string()),
            department_code: Some("AP.1".to_string()),
            row: 4,
        }];

        let stats = repo
            .apply_org_structure(departments, employees)
            .await
            .unwrap();
        assert_eq!(stats.departments_created, 2);
        assert_eq!(stats.positions_created, 1);
        assert_eq!(stats.employees_created, 1);
        assert_eq!(repo.count_departments().await.unwrap(), 2);

        let guard = conn.lock().unwrap();
        let (parent_id, path): (Option<String>, String) = guard
            .query_row(
                "SELECT parent_id, path FROM departments WHERE code = 'AP.1'",
                [],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .unwrap();
        let root_id: String = guard
            .query_row("SELECT id FROM departments WHERE code = 'AP'", [], |row| {
                row.get(0)
            })
            .unwrap();
        assert_eq!(parent_id.as_deref(), Some(root_id.as_str()));
        assert_eq!(path, "Head Office / Sales");

        let emp_count: i64 = guard
            .query_row(
                "SELECT employee_count FROM departments WHERE code = 'AP.1'",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(emp_count, 1);
    }

    #[tokio::test]
    async fn test_apply_org_structure_orders_parents_before_children() {
        let conn = test_conn();
        let repo = OrgImportRepositoryImpl::from_connection(conn.clone());

        // child listed above its parent; level sort must still link it
        let departments = vec![
            ParsedDepartment {
                code: "AP.2".to_string(),
                name: "Ops".to_string(),
                parent_code: Some("AP".to_string()),
                row: 2,
            },
            ParsedDepartment {
                code: "AP".to_string(),
                name: "Head Office".to_string(),
                parent_code: None,
                row: 3,
            },
        ];

        repo.apply_org_structure(departments, Vec::new())
            .await
            .unwrap();

        let guard = conn.lock().unwrap();
        let parent_id: Option<String> = guard
            .query_row(
                "SELECT parent_id FROM departments WHERE code = 'AP.2'",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert!(parent_id.is_some());
    }
}
