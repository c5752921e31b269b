// ==========================================
// Org Structure Engine - Hierarchy Entities
// ==========================================
// Aligned with the departments / employees / positions tables.
// Entities are rebuilt from storage rows through explicit row mappers
// in the repository layer; nothing here touches the database.
// ==========================================

use crate::rules::code_level;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

// ==========================================
// Department - organizational unit
// ==========================================
// The code is the natural key ("AP.3.2"); its prefix segments name the
// ancestor chain. employee_count is a cached projection of the live
// employee count and is only ever written inside the same transaction
// as the employee mutation that changed it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Department {
    // ===== Identity =====
    pub id: String,                 // UUID
    pub code: String,               // dot-delimited hierarchical code, unique

    // ===== Descriptive =====
    pub name: String,
    pub parent_id: Option<String>,  // parent department, None for roots
    pub level: i32,                 // hierarchy depth, root = 0
    pub path: String,               // materialized display path "Root / Child / ..."

    // ===== Projections =====
    pub employee_count: i64,        // cached live count, never a source of truth

    // ===== State =====
    pub is_active: bool,

    // ===== Audit =====
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Department {
    /// Builds a fresh department with the level derived from the code.
    ///
    /// parent_id and path are linked by the caller once the parent row
    /// is known; path defaults to the own name.
    pub fn new(code: &str, name: &str) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            code: code.to_string(),
            name: name.to_string(),
            parent_id: None,
            level: code_level(code),
            path: name.to_string(),
            employee_count: 0,
            is_active: true,
            created_at: now,
            updated_at: now,
        }
    }
}

// ==========================================
// Employee - personnel record
// ==========================================
// tab_number is the natural key. department_id stays None while the
// employee is unassigned; manager_id references another employee.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Employee {
    // ===== Identity =====
    pub id: String,                     // UUID
    pub tab_number: String,             // formatted personnel number, unique

    // ===== Descriptive =====
    pub full_name: String,
    pub email: Option<String>,
    pub phone: Option<String>,

    // ===== Assignments =====
    pub department_id: Option<String>,
    pub position_id: Option<String>,
    pub manager_id: Option<String>,

    // ===== Employment =====
    pub hire_date: Option<NaiveDate>,
    pub is_active: bool,

    // ===== Audit =====
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Employee {
    pub fn new(tab_number: &str, full_name: &str) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            tab_number: tab_number.to_string(),
            full_name: full_name.to_string(),
            email: None,
            phone: None,
            department_id: None,
            position_id: None,
            manager_id: None,
            hire_date: None,
            is_active: true,
            created_at: now,
            updated_at: now,
        }
    }
}

// ==========================================
// Position - job title
// ==========================================
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Position {
    pub id: String,                     // UUID
    pub code: String,                   // unique
    pub title: String,
    pub category: Option<String>,
    pub department_id: Option<String>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Position {
    pub fn new(code: &str, title: &str) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            code: code.to_string(),
            title: title.to_string(),
            category: None,
            department_id: None,
            is_active: true,
            created_at: now,
            updated_at: now,
        }
    }
}

// ==========================================
// DepartmentTreeNode - recursive tree view
// ==========================================
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DepartmentTreeNode {
    pub department: Department,
    pub children: Vec<DepartmentTreeNode>,
}

impl DepartmentTreeNode {
    pub fn leaf(department: Department) -> Self {
        Self {
            department,
            children: Vec::new(),
        }
    }

    /// Node count of the subtree, this node included.
    pub fn total_count(&self) -> usize {
        1 + self
            .children
            .iter()
            .map(DepartmentTreeNode::total_count)
            .sum::<usize>()
    }
}

// ==========================================
// DepartmentPath - department with its ancestor chain
// ==========================================
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DepartmentPath {
    pub department: Department,
    /// Ancestors from the root down to the direct parent.
    pub ancestors: Vec<Department>,
}

impl DepartmentPath {
    /// Display path: ancestor names then the own name, " / "-joined.
    pub fn display(&self) -> String {
        let mut names: Vec<&str> = self.ancestors.iter().map(|d| d.name.as_str()).collect();
        names.push(self.department.name.as_str());
        names.join(" / ")
    }
}

// ==========================================
// OrgStats - hierarchy-wide statistics
// ==========================================
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrgStats {
    pub total_departments: usize,
    pub active_departments: usize,
    pub total_employees: usize,
    pub active_employees: usize,
    pub total_positions: usize,
    pub departments_by_level: BTreeMap<i32, usize>,
    pub max_depth: i32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_department_new_derives_level() {
        assert_eq!(Department::new("AP", "Head Office").level, 0);
        assert_eq!(Department::new("AP.3.2", "IT Ops").level, 2);
    }

    #[test]
    fn test_tree_node_total_count() {
        let mut root = DepartmentTreeNode::leaf(Department::new("A", "A"));
        let mut child = DepartmentTreeNode::leaf(Department::new("A.1", "A1"));
        child
            .children
            .push(DepartmentTreeNode::leaf(Department::new("A.1.1", "A11")));
        root.children.push(child);
        root.children
            .push(DepartmentTreeNode::leaf(Department::new("A.2", "A2")));

        assert_eq!(root.total_count(), 4);
    }

    #[test]
    fn test_department_path_display() {
        let root = Department::new("A", "Head Office");
        let mid = Department::new("A.1", "Finance");
        let leaf = Department::new("A.1.2", "Payroll");

        let path = DepartmentPath {
            department: leaf,
            ancestors: vec![root, mid],
        };
        assert_eq!(path.display(), "Head Office / Finance / Payroll");
    }
}
