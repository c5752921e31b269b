// ==========================================
// Org Structure Engine - Org-Chart Sheet Parser
// ==========================================
// Positional layout: A = department code, B = department name,
// C = tab number, D = employee full name, E = position title
// Best-effort extraction: malformed rows become row diagnostics and
// the rest of the sheet still goes through
// ==========================================

use crate::domain::{ParsedDepartment, ParsedEmployee, ParsedOrgStructure};
use crate::importer::error::ImportError;
use crate::importer::org_importer_trait::{OrgSheetParser as OrgSheetParserTrait, RawTable};
use crate::rules::{parent_code_of, ValidationRules};
use std::collections::HashSet;
use std::error::Error;
use tracing::debug;

const COL_CODE: usize = 0;
const COL_NAME: usize = 1;
const COL_TAB: usize = 2;
const COL_FULL_NAME: usize = 3;
const COL_POSITION: usize = 4;

/// Rows x columns window probed when deciding a sheet is blank.
const EMPTY_PROBE_WINDOW: usize = 10;

pub struct OrgSheetParser;

impl OrgSheetParserTrait for OrgSheetParser {
    fn parse(
        &self,
        table: &RawTable,
        rules: &ValidationRules,
        default_position_title: &str,
        header_scan_rows: usize,
    ) -> Result<ParsedOrgStructure, Box<dyn Error>> {
        if Self::leading_region_is_empty(table) {
            return Err(Box::new(ImportError::EmptyFile));
        }

        let header_row = Self::find_header_row(table, header_scan_rows);
        debug!(header_row = header_row + 1, "org sheet header located");

        let mut parsed = ParsedOrgStructure::default();
        let mut seen_codes: HashSet<String> = HashSet::new();
        let mut seen_tabs: HashSet<String> = HashSet::new();

        for idx in (header_row + 1)..table.row_count() {
            // 1-based for diagnostics
            let row_number = idx + 1;

            let code = table.cell(idx, COL_CODE).to_string();
            let name = table.cell(idx, COL_NAME).to_string();
            let tab_number = table.cell(idx, COL_TAB).to_string();
            let full_name = table.cell(idx, COL_FULL_NAME).to_string();
            let position = table.cell(idx, COL_POSITION).to_string();

            if code.is_empty() && name.is_empty() && tab_number.is_empty() {
                continue;
            }

            // A row may carry a department, an employee, or both
            if !code.is_empty() && !name.is_empty() {
                Self::collect_department(&mut parsed, &mut seen_codes, rules, &code, &name, row_number);
            }

            if !tab_number.is_empty() && !full_name.is_empty() {
                Self::collect_employee(
                    &mut parsed,
                    &mut seen_tabs,
                    rules,
                    table,
                    idx,
                    &code,
                    &tab_number,
                    &full_name,
                    &position,
                    default_position_title,
                    row_number,
                );
            }
        }

        if parsed.is_empty() {
            return Err(Box::new(ImportError::EmptyFile));
        }

        Ok(parsed)
    }
}

impl OrgSheetParser {
    /// Probes the top-left window for any value at all.
    fn leading_region_is_empty(table: &RawTable) -> bool {
        let rows = table.row_count().min(EMPTY_PROBE_WINDOW);
        for r in 0..rows {
            let width = table
                .rows
                .get(r)
                .map(|row| row.len())
                .unwrap_or(0)
                .min(EMPTY_PROBE_WINDOW);
            for c in 0..width {
                if !table.cell(r, c).is_empty() {
                    return false;
                }
            }
        }
        true
    }

    /// Scans the leading rows for the label row (column A carries a code
    /// label, column B a name label). Falls back to the first row so
    /// label-less exports still import.
    fn find_header_row(table: &RawTable, header_scan_rows: usize) -> usize {
        let limit = table.row_count().min(header_scan_rows);
        for idx in 0..limit {
            let a = table.cell(idx, COL_CODE).to_lowercase();
            let b = table.cell(idx, COL_NAME).to_lowercase();
            let code_label = a.contains("код") || a.contains("code");
            let name_label = b.contains("наимен") || b.contains("name");
            if code_label && name_label {
                return idx;
            }
        }
        0
    }

    fn collect_department(
        parsed: &mut ParsedOrgStructure,
        seen_codes: &mut HashSet<String>,
        rules: &ValidationRules,
        code: &str,
        name: &str,
        row_number: usize,
    ) {
        match rules.validate_department_code(code) {
            Ok(()) => {
                if seen_codes.contains(code) {
                    parsed.warnings.push(format!(
                        "Duplicate department code '{}' at row {}",
                        code, row_number
                    ));
                } else {
                    seen_codes.insert(code.to_string());
                    parsed.departments.push(ParsedDepartment {
                        code: code.to_string(),
                        name: name.to_string(),
                        parent_code: parent_code_of(code).map(|c| c.to_string()),
                        row: row_number,
                    });
                }
            }
            Err(reason) => {
                parsed.errors.push(format!(
                    "Invalid department code '{}' at row {}: {}",
                    code, row_number, reason
                ));
            }
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn collect_employee(
        parsed: &mut ParsedOrgStructure,
        seen_tabs: &mut HashSet<String>,
        rules: &ValidationRules,
        table: &RawTable,
        row_idx: usize,
        own_code: &str,
        tab_number: &str,
        full_name: &str,
        position: &str,
        default_position_title: &str,
        row_number: usize,
    ) {
        match rules.validate_tab_number(tab_number) {
            Ok(()) => {
                if seen_tabs.contains(tab_number) {
                    parsed.warnings.push(format!(
                        "Duplicate tab number '{}' at row {}",
                        tab_number, row_number
                    ));
                    return;
                }
                seen_tabs.insert(tab_number.to_string());

                match Self::department_code_for_row(table, row_idx, own_code, &parsed.departments) {
                    Some(dept_code) => {
                        let title = if position.is_empty() {
                            default_position_title.to_string()
                        } else {
                            position.to_string()
                        };
                        parsed.employees.push(ParsedEmployee {
                            tab_number: tab_number.to_string(),
                            full_name: full_name.to_string(),
                            position_title: Some(title),
                            department_code: Some(dept_code),
                            row: row_number,
                        });
                    }
                    None => {
                        parsed.errors.push(format!(
                            "Cannot determine department for employee '{}' at row {}",
                            full_name, row_number
                        ));
                    }
                }
            }
            Err(reason) => {
                parsed.errors.push(format!(
                    "Invalid tab number '{}' at row {}: {}",
                    tab_number, row_number, reason
                ));
            }
        }
    }

    /// The employee's own row code wins; otherwise the nearest preceding
    /// row whose code names an already-parsed department.
    fn department_code_for_row(
        table: &RawTable,
        row_idx: usize,
        own_code: &str,
        departments: &[ParsedDepartment],
    ) -> Option<String> {
        if !own_code.is_empty() {
            return Some(own_code.to_string());
        }

        for r in (0..row_idx).rev() {
            let code = table.cell(r, COL_CODE);
            if code.is_empty() {
                continue;
            }
            if departments.iter().any(|d| d.code == code) {
                return Some(code.to_string());
            }
        }
        None
    }
}
