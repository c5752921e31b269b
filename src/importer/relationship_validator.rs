// ==========================================
// Org Structure Engine - Roster Batch Validator
// ==========================================
// Row-level grammar checks plus batch-level referential checks
// (duplicate tabs, manager resolution, self-management, cycles).
// Findings are collected, never thrown; the pipeline decides which
// rows survive.
// ==========================================

use crate::domain::{ImportRowError, RosterRow};
use crate::importer::org_importer_trait::RelationshipValidator as RelationshipValidatorTrait;
use crate::rules::{valid_email, ValidationRules};
use serde_json::json;
use std::collections::{HashMap, HashSet};

pub struct RelationshipValidator;

impl RelationshipValidatorTrait for RelationshipValidator {
    fn validate(
        &self,
        rows: &[RosterRow],
        rules: &ValidationRules,
        existing_tabs: &HashMap<String, String>,
    ) -> Vec<ImportRowError> {
        let mut findings = Vec::new();

        // First occurrence wins; repeats are flagged below
        let mut batch_tabs: HashSet<&str> = HashSet::new();
        let mut manager_of: HashMap<&str, &str> = HashMap::new();
        for row in rows {
            if row.tab_number.is_empty() {
                continue;
            }
            if batch_tabs.insert(row.tab_number.as_str()) {
                if let Some(manager) = &row.manager_tab_number {
                    manager_of.insert(row.tab_number.as_str(), manager.as_str());
                }
            }
        }

        let mut seen: HashSet<&str> = HashSet::new();
        for row in rows {
            if row.full_name.is_empty() {
                findings.push(Self::finding(row, "Full name is required".to_string()));
            }

            if let Err(reason) = rules.validate_tab_number(&row.tab_number) {
                findings.push(Self::finding(
                    row,
                    format!("Invalid tab number '{}': {}", row.tab_number, reason),
                ));
            }

            if let Some(code) = &row.department_code {
                if let Err(reason) = rules.validate_department_code(code) {
                    findings.push(Self::finding(
                        row,
                        format!("Invalid department code '{}': {}", code, reason),
                    ));
                }
            }

            if let Some(email) = &row.email {
                if !valid_email(email) {
                    findings.push(Self::finding(
                        row,
                        format!("Invalid email format: {}", email),
                    ));
                }
            }

            if !row.tab_number.is_empty() && !seen.insert(row.tab_number.as_str()) {
                findings.push(Self::finding(
                    row,
                    format!("Duplicate tab number: {}", row.tab_number),
                ));
            }

            if let Some(manager) = &row.manager_tab_number {
                if manager == &row.tab_number {
                    findings.push(Self::finding(
                        row,
                        format!("Employee {} cannot be their own manager", row.tab_number),
                    ));
                } else if !batch_tabs.contains(manager.as_str())
                    && !existing_tabs.contains_key(manager.as_str())
                {
                    findings.push(Self::finding(
                        row,
                        format!("Manager with tab number {} not found", manager),
                    ));
                } else if Self::in_manager_cycle(&manager_of, &row.tab_number) {
                    findings.push(Self::finding(
                        row,
                        format!(
                            "Circular manager reference detected for tab number {}",
                            row.tab_number
                        ),
                    ));
                }
            }
        }

        findings
    }
}

impl RelationshipValidator {
    fn finding(row: &RosterRow, message: String) -> ImportRowError {
        ImportRowError {
            error_type: "validation".to_string(),
            message,
            row: row.row,
            data: Some(json!({
                "tabNumber": row.tab_number,
                "fullName": row.full_name,
            })),
        }
    }

    /// Walks the in-batch manager chain from `start`; true when the
    /// chain comes back around. Chains leaving the batch terminate.
    fn in_manager_cycle(manager_of: &HashMap<&str, &str>, start: &str) -> bool {
        let mut visited: HashSet<&str> = HashSet::new();
        let mut current = start;

        while let Some(&next) = manager_of.get(current) {
            if next == start {
                return true;
            }
            if !visited.insert(next) {
                // a cycle further up the chain, not through `start`
                return false;
            }
            current = next;
        }
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(tab: &str, name: &str, manager: Option<&str>, line: usize) -> RosterRow {
        RosterRow {
            tab_number: tab.to_string(),
            full_name: name.to_string(),
            manager_tab_number: manager.map(|m| m.to_string()),
            row: line,
            ..Default::default()
        }
    }

    fn validate(rows: &[RosterRow]) -> Vec<ImportRowError> {
        RelationshipValidator.validate(rows, &ValidationRules::default(), &HashMap::new())
    }

    #[test]
    fn test_clean_batch_has_no_findings() {
        let rows = vec![
            row("EMP001", "Ivanov Ivan", None, 2),
            row("EMP002", "Petrov Petr", Some("EMP001"), 3),
        ];
        assert!(validate(&rows).is_empty());
    }

    #[test]
    fn test_forward_manager_reference_is_accepted() {
        let rows = vec![
            row("EMP002", "Petrov Petr", Some("EMP001"), 2),
            row("EMP001", "Ivanov Ivan", None, 3),
        ];
        assert!(validate(&rows).is_empty());
    }

    #[test]
    fn test_manager_resolved_against_existing_storage() {
        let rows = vec![row("EMP002", "Petrov Petr", Some("EMP001"), 2)];
        let mut existing = HashMap::new();
        existing.insert("EMP001".to_string(), "some-id".to_string());

        let findings =
            RelationshipValidator.validate(&rows, &ValidationRules::default(), &existing);
        assert!(findings.is_empty());
    }

    #[test]
    fn test_unknown_manager_is_flagged() {
        let rows = vec![row("EMP002", "Petrov Petr", Some("EMP999"), 2)];
        let findings = validate(&rows);
        assert_eq!(findings.len(), 1);
        assert_eq!(
            findings[0].message,
            "Manager with tab number EMP999 not found"
        );
        assert_eq!(findings[0].row, 2);
    }

    #[test]
    fn test_self_manager_is_flagged() {
        let rows = vec![row("EMP001", "Ivanov Ivan", Some("EMP001"), 2)];
        let findings = validate(&rows);
        assert_eq!(findings.len(), 1);
        assert!(findings[0].message.contains("cannot be their own manager"));
    }

    #[test]
    fn test_manager_cycle_is_flagged_for_every_member() {
        let rows = vec![
            row("EMP001", "A", Some("EMP003"), 2),
            row("EMP002", "B", Some("EMP001"), 3),
            row("EMP003", "C", Some("EMP002"), 4),
        ];
        let findings = validate(&rows);
        assert_eq!(findings.len(), 3);
        assert!(findings
            .iter()
            .all(|f| f.message.contains("Circular manager reference")));
    }

    #[test]
    fn test_duplicate_tab_flags_second_occurrence() {
        let rows = vec![
            row("EMP001", "Ivanov Ivan", None, 2),
            row("EMP001", "Ivanov Clone", None, 3),
        ];
        let findings = validate(&rows);
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].message, "Duplicate tab number: EMP001");
        assert_eq!(findings[0].row, 3);
    }

    #[test]
    fn test_grammar_and_email_checks() {
        let mut bad = row("INVALID_CODE", "", None, 2);
        bad.email = Some("not-an-email".to_string());
        bad.department_code = Some("lowercase".to_string());

        let findings = validate(&[bad]);
        let messages: Vec<&str> = findings.iter().map(|f| f.message.as_str()).collect();
        assert_eq!(findings.len(), 4);
        assert!(messages.iter().any(|m| m.contains("Full name is required")));
        assert!(messages
            .iter()
            .any(|m| m.contains("Invalid tab number 'INVALID_CODE'")));
        assert!(messages
            .iter()
            .any(|m| m.contains("Invalid department code 'lowercase'")));
        assert!(messages
            .iter()
            .any(|m| m.contains("Invalid email format: not-an-email")));
        assert!(findings.iter().all(|f| f.row == 2));
        assert_eq!(findings[0].error_type, "validation");
    }

    #[test]
    fn test_finding_carries_offending_data() {
        let rows = vec![row("EMP001", "Ivanov Ivan", Some("EMP999"), 5)];
        let findings = validate(&rows);
        let data = findings[0].data.as_ref().unwrap();
        assert_eq!(data["tabNumber"], "EMP001");
        assert_eq!(data["fullName"], "Ivanov Ivan");
    }
}
