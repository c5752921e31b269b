// ==========================================
// Org Structure Engine - Import Transfer Objects
// ==========================================
// Parser output (unvalidated, no identity) and the structured report
// every import run returns to its caller.
// ==========================================

use crate::rules::code_level;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

// ==========================================
// ParsedDepartment - raw department row
// ==========================================
// Carries the provisional parent association derived from the code; no
// identity until persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParsedDepartment {
    pub code: String,
    pub name: String,
    pub parent_code: Option<String>,
    /// 1-based row in the source file, for diagnostics
    pub row: usize,
}

// ==========================================
// ParsedEmployee - raw employee row
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParsedEmployee {
    pub tab_number: String,
    pub full_name: String,
    pub position_title: Option<String>,
    /// Department the row was associated with (own cell or the nearest
    /// preceding department row)
    pub department_code: Option<String>,
    pub row: usize,
}

// ==========================================
// ParsedOrgStructure - org-chart parse output
// ==========================================
// Errors and warnings are row-scoped diagnostics collected during the
// best-effort parse; they never abort it.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParsedOrgStructure {
    pub departments: Vec<ParsedDepartment>,
    pub employees: Vec<ParsedEmployee>,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

impl ParsedOrgStructure {
    /// True when nothing at all was extracted, diagnostics included.
    pub fn is_empty(&self) -> bool {
        self.departments.is_empty() && self.employees.is_empty() && self.errors.is_empty()
    }

    /// Aggregates the parse into display statistics.
    pub fn summary(&self) -> ParseSummary {
        let mut departments_by_level: BTreeMap<i32, usize> = BTreeMap::new();
        for dept in &self.departments {
            *departments_by_level.entry(code_level(&dept.code)).or_insert(0) += 1;
        }

        let mut employees_by_position: BTreeMap<String, usize> = BTreeMap::new();
        for emp in &self.employees {
            let title = emp
                .position_title
                .clone()
                .unwrap_or_else(|| "-".to_string());
            *employees_by_position.entry(title).or_insert(0) += 1;
        }

        ParseSummary {
            total_departments: self.departments.len(),
            total_employees: self.employees.len(),
            departments_by_level,
            employees_by_position,
            errors: self.errors.len(),
            warnings: self.warnings.len(),
        }
    }
}

// ==========================================
// ParseSummary - org-chart parse statistics
// ==========================================
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParseSummary {
    pub total_departments: usize,
    pub total_employees: usize,
    pub departments_by_level: BTreeMap<i32, usize>,
    pub employees_by_position: BTreeMap<String, usize>,
    pub errors: usize,
    pub warnings: usize,
}

// ==========================================
// RosterRow - one mapped roster line
// ==========================================
// Output of the header mapper: named, trimmed, still unvalidated.
// `row` is the 1-based line in the source file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RosterRow {
    pub tab_number: String,
    pub full_name: String,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub department_code: Option<String>,
    pub position_title: Option<String>,
    pub manager_tab_number: Option<String>,
    pub row: usize,
}

// ==========================================
// ImportOptions
// ==========================================
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportOptions {
    /// true: best-effort, valid rows are applied and failures reported.
    /// false: all-or-nothing, any row error leaves the database untouched.
    pub skip_on_error: bool,
}

impl Default for ImportOptions {
    fn default() -> Self {
        Self { skip_on_error: true }
    }
}

// ==========================================
// ImportRowError - a single failed row
// ==========================================
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportRowError {
    /// Category: "parse" / "validation" / "import"
    #[serde(rename = "type")]
    pub error_type: String,
    pub message: String,
    /// 1-based row in the source file
    pub row: usize,
    /// Offending raw fields, when available
    pub data: Option<serde_json::Value>,
}

// ==========================================
// ImportReport - aggregate result of one import run
// ==========================================
// Always returned, errors included; a bad row lands here instead of
// aborting the batch.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportReport {
    pub total_processed: usize,
    pub successful: usize,
    pub departments_created: usize,
    pub positions_created: usize,
    pub employees_created: usize,
    pub employees_updated: usize,
    pub errors: usize,
    pub error_details: Vec<ImportRowError>,
    pub warnings: Vec<String>,
    pub elapsed_ms: u64,
}

impl ImportReport {
    pub fn push_error(&mut self, error: ImportRowError) {
        self.error_details.push(error);
        self.errors = self.error_details.len();
    }
}

// ==========================================
// RosterValidationReport - dry-run check of a roster file
// ==========================================
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RosterValidationReport {
    pub total_rows: usize,
    pub valid_rows: usize,
    pub invalid_rows: usize,
    pub error_details: Vec<ImportRowError>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_summary_counts_levels_and_positions() {
        let parsed = ParsedOrgStructure {
            departments: vec![
                ParsedDepartment {
                    code: "AP".to_string(),
                    name: "Head".to_string(),
                    parent_code: None,
                    row: 1,
                },
                ParsedDepartment {
                    code: "AP.1".to_string(),
                    name: "Child".to_string(),
                    parent_code: Some("AP".to_string()),
                    row: 2,
                },
                ParsedDepartment {
                    code: "AP.2".to_string(),
                    name: "Child2".to_string(),
                    parent_code: Some("AP".to_string()),
                    row: 3,
                },
            ],
            employees: vec![ParsedEmployee {
                tab_number: "EMP001".to_string(),
                full_name: "Ivanov Ivan".to_string(),
                position_title: Some("Engineer".to_string()),
                department_code: Some("AP.1".to_string()),
                row: 2,
            }],
            errors: vec!["bad row".to_string()],
            warnings: vec![],
        };

        let summary = parsed.summary();
        assert_eq!(summary.total_departments, 3);
        assert_eq!(summary.total_employees, 1);
        assert_eq!(summary.departments_by_level.get(&0), Some(&1));
        assert_eq!(summary.departments_by_level.get(&1), Some(&2));
        assert_eq!(summary.employees_by_position.get("Engineer"), Some(&1));
        assert_eq!(summary.errors, 1);
        assert_eq!(summary.warnings, 0);
    }

    #[test]
    fn test_import_report_error_counter_stays_in_sync() {
        let mut report = ImportReport::default();
        report.push_error(ImportRowError {
            error_type: "validation".to_string(),
            message: "bad email".to_string(),
            row: 4,
            data: None,
        });
        assert_eq!(report.errors, 1);
        assert_eq!(report.error_details.len(), 1);
    }

    #[test]
    fn test_report_serializes_with_boundary_keys() {
        let mut report = ImportReport {
            total_processed: 3,
            successful: 2,
            employees_created: 2,
            ..Default::default()
        };
        report.push_error(ImportRowError {
            error_type: "validation".to_string(),
            message: "Invalid email format: bad".to_string(),
            row: 3,
            data: None,
        });

        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["totalProcessed"], 3);
        assert_eq!(json["employeesCreated"], 2);
        assert_eq!(json["errors"], 1);
        assert_eq!(json["errorDetails"][0]["row"], 3);
        assert_eq!(json["errorDetails"][0]["type"], "validation");
    }
}
