// ==========================================
// Org Structure Engine - Org Structure Service
// ==========================================
// Responsibility: direct CRUD over the hierarchy with the invariants
// enforced: unique codes and tab numbers, existing references, counter
// recomputation inside the mutating transaction
// ==========================================

use crate::db::open_sqlite_connection;
use crate::domain::org::{
    Department, DepartmentPath, DepartmentTreeNode, Employee, OrgStats,
};
use crate::repository::department_repo::DepartmentRepository;
use crate::repository::employee_repo::EmployeeRepository;
use crate::repository::position_repo::PositionRepository;
use crate::repository::RepositoryError;
use crate::rules::{can_delete, parent_code_of, valid_email, ValidationRules};
use crate::service::error::{ServiceError, ServiceResult};
use chrono::{NaiveDate, Utc};
use rusqlite::{Connection, Transaction};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{info, instrument, warn};

// search results are capped, the repository orders by name
const SEARCH_RESULT_CAP: i32 = 100;

// ==========================================
// Mutation requests
// ==========================================

/// create_department input.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CreateDepartmentRequest {
    pub code: String,
    pub name: String,
    /// Explicit parent; when absent the code prefix is tried.
    pub parent_id: Option<String>,
}

/// update_department input; None leaves the field unchanged.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdateDepartmentRequest {
    pub name: Option<String>,
    pub is_active: Option<bool>,
}

/// create_employee input.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CreateEmployeeRequest {
    pub tab_number: String,
    pub full_name: String,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub department_id: Option<String>,
    /// Resolved or created by title within the department.
    pub position_title: Option<String>,
    pub manager_id: Option<String>,
    pub hire_date: Option<NaiveDate>,
}

/// update_employee input; None leaves the field unchanged.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdateEmployeeRequest {
    pub full_name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub department_id: Option<String>,
    pub position_title: Option<String>,
    pub manager_id: Option<String>,
    pub is_active: Option<bool>,
}

// ==========================================
// OrgStructureService
// ==========================================
/// CRUD facade over the hierarchy.
///
/// Multi-write operations run inside one transaction on the shared
/// connection; the repositories' tx helpers do the row work while the
/// service decides what belongs together.
pub struct OrgStructureService {
    conn: Arc<Mutex<Connection>>,
    department_repo: DepartmentRepository,
    employee_repo: EmployeeRepository,
    position_repo: PositionRepository,
    rules: ValidationRules,
}

impl OrgStructureService {
    /// Opens a service on the given database file with default rules.
    pub fn new(db_path: &str) -> ServiceResult<Self> {
        let conn = open_sqlite_connection(db_path).map_err(RepositoryError::from)?;
        Ok(Self::from_connection(Arc::new(Mutex::new(conn))))
    }

    /// Builds a service over an already opened shared connection.
    pub fn from_connection(conn: Arc<Mutex<Connection>>) -> Self {
        Self::with_rules(conn, ValidationRules::default())
    }

    /// Same, with configured grammars instead of the defaults.
    pub fn with_rules(conn: Arc<Mutex<Connection>>, rules: ValidationRules) -> Self {
        Self {
            department_repo: DepartmentRepository::from_connection(conn.clone()),
            employee_repo: EmployeeRepository::from_connection(conn.clone()),
            position_repo: PositionRepository::from_connection(conn.clone()),
            conn,
            rules,
        }
    }

    // Inside a held guard only the *_tx helpers may run; repository
    // methods lock the same mutex and would deadlock.
    fn get_conn(&self) -> ServiceResult<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| ServiceError::Repository(RepositoryError::LockError(e.to_string())))
    }

    // ===== Departments =====

    /// Creates a department.
    ///
    /// # Returns
    /// - Err(DuplicateCode): the code is already taken
    /// - Err(DepartmentNotFound): the explicit parent does not exist
    #[instrument(skip(self, req), fields(code = %req.code))]
    pub fn create_department(&self, req: CreateDepartmentRequest) -> ServiceResult<Department> {
        self.rules
            .validate_department_code(&req.code)
            .map_err(|reason| ServiceError::InvalidDepartmentCode {
                code: req.code.clone(),
                reason,
            })?;
        if req.name.trim().is_empty() {
            return Err(ServiceError::Validation(
                "department name is required".to_string(),
            ));
        }

        let conn = self.get_conn()?;
        let tx = conn.unchecked_transaction().map_err(RepositoryError::from)?;

        if DepartmentRepository::find_by_code_tx(&tx, &req.code)?.is_some() {
            return Err(ServiceError::DuplicateCode(req.code));
        }

        // explicit parent wins; otherwise an existing department named
        // by the code prefix is linked automatically
        let parent = match &req.parent_id {
            Some(parent_id) => Some(
                DepartmentRepository::find_by_id_tx(&tx, parent_id)?
                    .ok_or_else(|| ServiceError::DepartmentNotFound(parent_id.clone()))?,
            ),
            None => match parent_code_of(&req.code) {
                Some(parent_code) => DepartmentRepository::find_by_code_tx(&tx, parent_code)?,
                None => None,
            },
        };

        let mut department = Department::new(&req.code, req.name.trim());
        if let Some(parent) = &parent {
            department.parent_id = Some(parent.id.clone());
            department.path = format!("{} / {}", parent.path, department.name);
        }
        DepartmentRepository::upsert_tx(&tx, &department)?;
        tx.commit().map_err(RepositoryError::from)?;

        info!(code = %department.code, id = %department.id, "department created");
        Ok(department)
    }

    /// Partially updates a department. A rename refreshes the
    /// materialized paths of the whole subtree in the same transaction.
    #[instrument(skip(self, changes))]
    pub fn update_department(
        &self,
        id: &str,
        changes: UpdateDepartmentRequest,
    ) -> ServiceResult<Department> {
        let conn = self.get_conn()?;
        let tx = conn.unchecked_transaction().map_err(RepositoryError::from)?;

        let mut department = DepartmentRepository::find_by_id_tx(&tx, id)?
            .ok_or_else(|| ServiceError::DepartmentNotFound(id.to_string()))?;

        let mut renamed = false;
        if let Some(name) = changes.name {
            let name = name.trim().to_string();
            if name.is_empty() {
                return Err(ServiceError::Validation(
                    "department name is required".to_string(),
                ));
            }
            if name != department.name {
                department.name = name;
                renamed = true;
            }
        }
        if let Some(active) = changes.is_active {
            department.is_active = active;
        }

        if renamed {
            let parent_path = match &department.parent_id {
                Some(parent_id) => {
                    DepartmentRepository::find_by_id_tx(&tx, parent_id)?.map(|p| p.path)
                }
                None => None,
            };
            department.path = match parent_path {
                Some(parent_path) => format!("{} / {}", parent_path, department.name),
                None => department.name.clone(),
            };
        }

        department.updated_at = Utc::now();
        DepartmentRepository::upsert_tx(&tx, &department)?;

        if renamed {
            Self::refresh_subtree_paths_tx(&tx, &department)?;
        }

        tx.commit().map_err(RepositoryError::from)?;
        info!(id = %department.id, renamed, "department updated");
        Ok(department)
    }

    /// Deletes a department.
    ///
    /// # Returns
    /// - Err(DepartmentHasChildren): child departments still exist
    /// - Err(DepartmentHasEmployees): employees are still assigned
    #[instrument(skip(self))]
    pub fn delete_department(&self, id: &str) -> ServiceResult<()> {
        let conn = self.get_conn()?;
        let tx = conn.unchecked_transaction().map_err(RepositoryError::from)?;

        let department = DepartmentRepository::find_by_id_tx(&tx, id)?
            .ok_or_else(|| ServiceError::DepartmentNotFound(id.to_string()))?;

        let children = DepartmentRepository::count_children_tx(&tx, id)?;
        let employees = DepartmentRepository::count_assigned_employees_tx(&tx, id)?;
        if !can_delete(children as usize, employees) {
            if children > 0 {
                return Err(ServiceError::DepartmentHasChildren {
                    id: id.to_string(),
                    children,
                });
            }
            return Err(ServiceError::DepartmentHasEmployees {
                id: id.to_string(),
                employees,
            });
        }

        DepartmentRepository::delete_tx(&tx, id)?;
        tx.commit().map_err(RepositoryError::from)?;

        info!(id, code = %department.code, "department deleted");
        Ok(())
    }

    /// Soft activate / deactivate of a department.
    #[instrument(skip(self))]
    pub fn set_department_active(&self, id: &str, active: bool) -> ServiceResult<()> {
        let conn = self.get_conn()?;
        let tx = conn.unchecked_transaction().map_err(RepositoryError::from)?;

        let mut department = DepartmentRepository::find_by_id_tx(&tx, id)?
            .ok_or_else(|| ServiceError::DepartmentNotFound(id.to_string()))?;
        if department.is_active != active {
            department.is_active = active;
            department.updated_at = Utc::now();
            DepartmentRepository::upsert_tx(&tx, &department)?;
        }

        tx.commit().map_err(RepositoryError::from)?;
        info!(id, active, "department active flag set");
        Ok(())
    }

    // ===== Employees =====

    /// Creates an employee and recomputes the owning department's
    /// counter in the same transaction.
    ///
    /// # Returns
    /// - Err(DuplicateTabNumber): the tab number is already taken
    /// - Err(DepartmentNotFound) / Err(EmployeeNotFound): dangling
    ///   department or manager reference
    #[instrument(skip(self, req), fields(tab_number = %req.tab_number))]
    pub fn create_employee(&self, req: CreateEmployeeRequest) -> ServiceResult<Employee> {
        self.rules
            .validate_tab_number(&req.tab_number)
            .map_err(|reason| ServiceError::InvalidTabNumber {
                value: req.tab_number.clone(),
                reason,
            })?;
        if req.full_name.trim().is_empty() {
            return Err(ServiceError::Validation("full name is required".to_string()));
        }
        if let Some(email) = req.email.as_deref() {
            if !email.is_empty() && !valid_email(email) {
                return Err(ServiceError::InvalidEmail(email.to_string()));
            }
        }

        let conn = self.get_conn()?;
        let tx = conn.unchecked_transaction().map_err(RepositoryError::from)?;

        if EmployeeRepository::find_by_tab_number_tx(&tx, &req.tab_number)?.is_some() {
            return Err(ServiceError::DuplicateTabNumber(req.tab_number));
        }
        if let Some(department_id) = &req.department_id {
            if DepartmentRepository::find_by_id_tx(&tx, department_id)?.is_none() {
                return Err(ServiceError::DepartmentNotFound(department_id.clone()));
            }
        }
        if let Some(manager_id) = &req.manager_id {
            if EmployeeRepository::find_by_id_tx(&tx, manager_id)?.is_none() {
                return Err(ServiceError::EmployeeNotFound(manager_id.clone()));
            }
        }

        let mut employee = Employee::new(&req.tab_number, req.full_name.trim());
        employee.email = req.email.filter(|e| !e.is_empty());
        employee.phone = req.phone.filter(|p| !p.is_empty());
        employee.department_id = req.department_id;
        employee.manager_id = req.manager_id;
        employee.hire_date = req.hire_date;

        if let Some(title) = req
            .position_title
            .as_deref()
            .map(str::trim)
            .filter(|t| !t.is_empty())
        {
            let (position_id, _) = PositionRepository::resolve_or_create_tx(
                &tx,
                title,
                employee.department_id.as_deref(),
            )?;
            employee.position_id = Some(position_id);
        }

        EmployeeRepository::upsert_tx(&tx, &employee)?;
        if let Some(department_id) = &employee.department_id {
            DepartmentRepository::recompute_employee_count_tx(&tx, department_id)?;
        }

        tx.commit().map_err(RepositoryError::from)?;
        info!(tab_number = %employee.tab_number, id = %employee.id, "employee created");
        Ok(employee)
    }

    /// Partially updates an employee. A department change is a move:
    /// both the old and the new department counters refresh here.
    #[instrument(skip(self, changes))]
    pub fn update_employee(
        &self,
        id: &str,
        changes: UpdateEmployeeRequest,
    ) -> ServiceResult<Employee> {
        if let Some(email) = changes.email.as_deref() {
            if !email.is_empty() && !valid_email(email) {
                return Err(ServiceError::InvalidEmail(email.to_string()));
            }
        }

        let conn = self.get_conn()?;
        let tx = conn.unchecked_transaction().map_err(RepositoryError::from)?;

        let mut employee = EmployeeRepository::find_by_id_tx(&tx, id)?
            .ok_or_else(|| ServiceError::EmployeeNotFound(id.to_string()))?;

        let mut touched: HashSet<String> = HashSet::new();

        if let Some(full_name) = changes.full_name {
            let full_name = full_name.trim().to_string();
            if full_name.is_empty() {
                return Err(ServiceError::Validation("full name is required".to_string()));
            }
            employee.full_name = full_name;
        }
        if let Some(email) = changes.email {
            employee.email = if email.is_empty() { None } else { Some(email) };
        }
        if let Some(phone) = changes.phone {
            employee.phone = if phone.is_empty() { None } else { Some(phone) };
        }
        if let Some(manager_id) = changes.manager_id {
            if manager_id == employee.id {
                return Err(ServiceError::Validation(
                    "an employee cannot be their own manager".to_string(),
                ));
            }
            if EmployeeRepository::find_by_id_tx(&tx, &manager_id)?.is_none() {
                return Err(ServiceError::EmployeeNotFound(manager_id));
            }
            employee.manager_id = Some(manager_id);
        }

        if let Some(department_id) = changes.department_id {
            if employee.department_id.as_deref() != Some(department_id.as_str()) {
                if DepartmentRepository::find_by_id_tx(&tx, &department_id)?.is_none() {
                    return Err(ServiceError::DepartmentNotFound(department_id));
                }
                if let Some(old) = employee.department_id.replace(department_id.clone()) {
                    touched.insert(old);
                }
                touched.insert(department_id);
            }
        }

        if let Some(title) = changes
            .position_title
            .as_deref()
            .map(str::trim)
            .filter(|t| !t.is_empty())
        {
            let (position_id, _) = PositionRepository::resolve_or_create_tx(
                &tx,
                title,
                employee.department_id.as_deref(),
            )?;
            employee.position_id = Some(position_id);
        }

        if let Some(active) = changes.is_active {
            if active != employee.is_active {
                employee.is_active = active;
                if let Some(department_id) = &employee.department_id {
                    touched.insert(department_id.clone());
                }
            }
        }

        employee.updated_at = Utc::now();
        EmployeeRepository::upsert_tx(&tx, &employee)?;
        for department_id in &touched {
            DepartmentRepository::recompute_employee_count_tx(&tx, department_id)?;
        }

        tx.commit().map_err(RepositoryError::from)?;
        info!(id = %employee.id, "employee updated");
        Ok(employee)
    }

    /// Deletes an employee. Subordinates lose their manager link; the
    /// former department's counter recomputes in the same transaction.
    #[instrument(skip(self))]
    pub fn delete_employee(&self, id: &str) -> ServiceResult<()> {
        let conn = self.get_conn()?;
        let tx = conn.unchecked_transaction().map_err(RepositoryError::from)?;

        let employee = EmployeeRepository::find_by_id_tx(&tx, id)?
            .ok_or_else(|| ServiceError::EmployeeNotFound(id.to_string()))?;

        let cleared = EmployeeRepository::clear_manager_tx(&tx, id)?;
        EmployeeRepository::delete_tx(&tx, id)?;
        if let Some(department_id) = &employee.department_id {
            DepartmentRepository::recompute_employee_count_tx(&tx, department_id)?;
        }

        tx.commit().map_err(RepositoryError::from)?;
        info!(
            id,
            tab_number = %employee.tab_number,
            subordinates_unlinked = cleared,
            "employee deleted"
        );
        Ok(())
    }

    /// Moves an employee between departments; both counters recompute
    /// from live counts in one transaction.
    #[instrument(skip(self))]
    pub fn move_employee_to_department(
        &self,
        employee_id: &str,
        new_department_id: &str,
    ) -> ServiceResult<Employee> {
        let conn = self.get_conn()?;
        let tx = conn.unchecked_transaction().map_err(RepositoryError::from)?;

        let mut employee = EmployeeRepository::find_by_id_tx(&tx, employee_id)?
            .ok_or_else(|| ServiceError::EmployeeNotFound(employee_id.to_string()))?;
        if DepartmentRepository::find_by_id_tx(&tx, new_department_id)?.is_none() {
            return Err(ServiceError::DepartmentNotFound(
                new_department_id.to_string(),
            ));
        }

        let old_department = employee
            .department_id
            .replace(new_department_id.to_string());
        employee.updated_at = Utc::now();
        EmployeeRepository::upsert_tx(&tx, &employee)?;

        DepartmentRepository::recompute_employee_count_tx(&tx, new_department_id)?;
        if let Some(old_id) = &old_department {
            if old_id != new_department_id {
                DepartmentRepository::recompute_employee_count_tx(&tx, old_id)?;
            }
        }

        tx.commit().map_err(RepositoryError::from)?;
        info!(
            employee_id,
            from = old_department.as_deref().unwrap_or("-"),
            to = new_department_id,
            "employee moved"
        );
        Ok(employee)
    }

    /// Soft activate / deactivate of an employee; the owning
    /// department's live counter follows the flag.
    #[instrument(skip(self))]
    pub fn set_employee_active(&self, id: &str, active: bool) -> ServiceResult<()> {
        let conn = self.get_conn()?;
        let tx = conn.unchecked_transaction().map_err(RepositoryError::from)?;

        let mut employee = EmployeeRepository::find_by_id_tx(&tx, id)?
            .ok_or_else(|| ServiceError::EmployeeNotFound(id.to_string()))?;
        if employee.is_active != active {
            employee.is_active = active;
            employee.updated_at = Utc::now();
            EmployeeRepository::upsert_tx(&tx, &employee)?;
            if let Some(department_id) = &employee.department_id {
                DepartmentRepository::recompute_employee_count_tx(&tx, department_id)?;
            }
        }

        tx.commit().map_err(RepositoryError::from)?;
        info!(id, active, "employee active flag set");
        Ok(())
    }

    // ===== Queries =====

    /// Full hierarchy as a forest, children depth-first under their
    /// parents, code order on every level.
    pub fn get_department_tree(&self) -> ServiceResult<Vec<DepartmentTreeNode>> {
        let roots = self.department_repo.find_roots()?;
        let mut tree = Vec::with_capacity(roots.len());
        for root in roots {
            tree.push(self.build_subtree(root)?);
        }
        Ok(tree)
    }

    /// One department with its ancestor chain, root first.
    pub fn get_department_with_path(&self, id: &str) -> ServiceResult<DepartmentPath> {
        let department = self
            .department_repo
            .find_by_id(id)?
            .ok_or_else(|| ServiceError::DepartmentNotFound(id.to_string()))?;

        let mut ancestors = Vec::new();
        let mut seen: HashSet<String> = HashSet::new();
        seen.insert(department.id.clone());

        let mut cursor = department.parent_id.clone();
        while let Some(parent_id) = cursor {
            if !seen.insert(parent_id.clone()) {
                warn!(id = %parent_id, "parent chain loops, stopping ascent");
                break;
            }
            match self.department_repo.find_by_id(&parent_id)? {
                Some(parent) => {
                    cursor = parent.parent_id.clone();
                    ancestors.push(parent);
                }
                None => break,
            }
        }
        ancestors.reverse();

        Ok(DepartmentPath {
            department,
            ancestors,
        })
    }

    /// Case-insensitive substring search over name, tab number and
    /// email among active employees.
    pub fn search_employees(&self, query: &str) -> ServiceResult<Vec<Employee>> {
        let trimmed = query.trim();
        if trimmed.is_empty() {
            return Ok(Vec::new());
        }
        Ok(self.employee_repo.search(trimmed, SEARCH_RESULT_CAP)?)
    }

    /// Hierarchy-wide statistics.
    pub fn get_org_stats(&self) -> ServiceResult<OrgStats> {
        let departments = self.department_repo.find_all()?;
        let employees = self.employee_repo.list_all(0, 0)?;
        let positions = self.position_repo.list_all()?;

        let mut departments_by_level: BTreeMap<i32, usize> = BTreeMap::new();
        let mut active_departments = 0;
        let mut max_depth = 0;
        for department in &departments {
            *departments_by_level.entry(department.level).or_insert(0) += 1;
            max_depth = max_depth.max(department.level);
            if department.is_active {
                active_departments += 1;
            }
        }

        Ok(OrgStats {
            total_departments: departments.len(),
            active_departments,
            total_employees: employees.len(),
            active_employees: employees.iter().filter(|e| e.is_active).count(),
            total_positions: positions.len(),
            departments_by_level,
            max_depth,
        })
    }

    // ===== Internals =====

    fn build_subtree(&self, department: Department) -> ServiceResult<DepartmentTreeNode> {
        let children = self.department_repo.find_children(&department.id)?;
        let mut node = DepartmentTreeNode::leaf(department);
        for child in children {
            node.children.push(self.build_subtree(child)?);
        }
        Ok(node)
    }

    fn refresh_subtree_paths_tx(tx: &Transaction, parent: &Department) -> ServiceResult<()> {
        for mut child in DepartmentRepository::find_children_tx(tx, &parent.id)? {
            child.path = format!("{} / {}", parent.path, child.name);
            child.updated_at = Utc::now();
            DepartmentRepository::upsert_tx(tx, &child)?;
            Self::refresh_subtree_paths_tx(tx, &child)?;
        }
        Ok(())
    }
}
