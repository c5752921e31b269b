// ==========================================
// Org Structure Engine - Import Repository Trait
// ==========================================
// Responsibility: data access interface for bulk import
// Boundary: no validation here; the importer decides which rows are
// applied, this layer only persists them atomically
// ==========================================

use crate::domain::import::{ParsedDepartment, ParsedEmployee, RosterRow};
use async_trait::async_trait;
use std::collections::HashMap;
use std::error::Error;

// ==========================================
// Apply statistics
// ==========================================
/// Counters produced by one roster apply transaction.
#[derive(Debug, Clone, Default)]
pub struct RosterApplyStats {
    pub departments_created: usize,
    pub positions_created: usize,
    pub employees_created: usize,
    pub employees_updated: usize,
    /// Non-fatal findings (e.g. a manager tab that resolved to nothing
    /// because its own row was skipped earlier).
    pub warnings: Vec<String>,
}

/// Counters produced by one org-chart apply transaction.
#[derive(Debug, Clone, Default)]
pub struct OrgApplyStats {
    pub departments_created: usize,
    pub positions_created: usize,
    pub employees_created: usize,
    pub employees_updated: usize,
    pub warnings: Vec<String>,
}

// ==========================================
// OrgImportRepository Trait
// ==========================================
// Implementor: OrgImportRepositoryImpl (rusqlite)
#[async_trait]
pub trait OrgImportRepository: Send + Sync {
    // ===== Read-only lookups (validation phase) =====

    /// Maps department codes to ids; codes with no row are absent from
    /// the result.
    async fn department_ids_by_code(
        &self,
        codes: &[String],
    ) -> Result<HashMap<String, String>, Box<dyn Error>>;

    /// Maps tab numbers to employee ids; unknown tabs are absent from
    /// the result.
    async fn employee_ids_by_tab(
        &self,
        tab_numbers: &[String],
    ) -> Result<HashMap<String, String>, Box<dyn Error>>;

    // ===== Batch writes (single transaction each) =====

    /// Applies one validated roster batch: resolves or creates the
    /// department per row (keyed by code), the position (keyed by title
    /// within the department), upserts the employee by tab number, then
    /// links managers in a second pass and recomputes the employee
    /// counters of every touched department.
    ///
    /// # Returns
    /// - Ok(stats): the whole batch committed
    /// - Err: the whole batch rolled back
    async fn apply_roster(
        &self,
        rows: Vec<RosterRow>,
    ) -> Result<RosterApplyStats, Box<dyn Error>>;

    /// Applies one parsed org chart: upserts departments by code,
    /// shallowest level first so parents exist before their children
    /// (parent linkage and display path recomputed from the current
    /// state), then upserts the sheet's employees by tab number.
    ///
    /// # Returns
    /// - Ok(stats): the whole batch committed
    /// - Err: the whole batch rolled back
    async fn apply_org_structure(
        &self,
        departments: Vec<ParsedDepartment>,
        employees: Vec<ParsedEmployee>,
    ) -> Result<OrgApplyStats, Box<dyn Error>>;

    // ===== Verification counts =====

    /// Total departments rows.
    async fn count_departments(&self) -> Result<usize, Box<dyn Error>>;

    /// Total employees rows.
    async fn count_employees(&self) -> Result<usize, Box<dyn Error>>;
}
