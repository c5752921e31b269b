// ==========================================
// Org Structure Engine - Roster Header Mapper
// ==========================================
// Flat roster CSVs carry a header row; columns are located by name
// through English/Russian aliases, then each data row becomes a named
// RosterRow. Field-level validation happens downstream.
// ==========================================

use crate::domain::RosterRow;
use crate::importer::error::ImportError;
use crate::importer::org_importer_trait::{RawTable, RosterMapper as RosterMapperTrait};
use std::error::Error;
use tracing::debug;

const FULL_NAME_ALIASES: &[&str] = &["fullname", "full name", "фио"];
const TAB_NUMBER_ALIASES: &[&str] = &[
    "tabnumber",
    "tab number",
    "таб.номер",
    "таб. номер",
    "табельный номер",
];
const EMAIL_ALIASES: &[&str] = &["email", "e-mail", "почта", "электронная почта"];
const PHONE_ALIASES: &[&str] = &["phone", "телефон"];
const DEPARTMENT_CODE_ALIASES: &[&str] = &[
    "departmentcode",
    "department code",
    "department",
    "подразделение",
    "код подразделения",
];
const POSITION_ALIASES: &[&str] = &["position", "должность"];
const MANAGER_ALIASES: &[&str] = &[
    "managertabnumber",
    "manager tab number",
    "manager",
    "руководитель",
];

pub struct RosterMapper;

/// Column indexes resolved from one header row.
struct ColumnMap {
    full_name: usize,
    tab_number: usize,
    email: Option<usize>,
    phone: Option<usize>,
    department_code: Option<usize>,
    position: Option<usize>,
    manager_tab_number: Option<usize>,
}

impl RosterMapperTrait for RosterMapper {
    fn map_rows(&self, table: &RawTable) -> Result<Vec<RosterRow>, Box<dyn Error>> {
        let header_idx = (0..table.row_count())
            .find(|&idx| !table.is_row_empty(idx))
            .ok_or(ImportError::EmptyFile)?;

        let columns = Self::resolve_columns(table, header_idx)?;
        debug!(header_row = header_idx + 1, "roster header mapped");

        let mut rows = Vec::new();
        for idx in (header_idx + 1)..table.row_count() {
            if table.is_row_empty(idx) {
                continue;
            }

            rows.push(RosterRow {
                tab_number: table.cell(idx, columns.tab_number).to_string(),
                full_name: table.cell(idx, columns.full_name).to_string(),
                email: Self::optional(table, idx, columns.email),
                phone: Self::optional(table, idx, columns.phone),
                department_code: Self::optional(table, idx, columns.department_code),
                position_title: Self::optional(table, idx, columns.position),
                manager_tab_number: Self::optional(table, idx, columns.manager_tab_number),
                row: idx + 1,
            });
        }

        if rows.is_empty() {
            return Err(Box::new(ImportError::EmptyFile));
        }

        Ok(rows)
    }

    fn roster_template(&self) -> String {
        // BOM keeps Excel from mangling the UTF-8 sample rows
        let mut out = String::from("\u{feff}");
        out.push_str("FullName,TabNumber,Email,Phone,DepartmentCode,Position,ManagerTabNumber\n");
        out.push_str("Ivanov Ivan Ivanovich,EMP001,ivanov@company.ru,+7-123-456-7890,DEV,Senior Developer,\n");
        out.push_str("Petrov Petr Petrovich,EMP002,petrov@company.ru,+7-123-456-7891,DEV,Developer,EMP001\n");
        out.push_str("Sidorova Maria Ivanovna,EMP003,sidorova@company.ru,+7-123-456-7892,QA,Tester,\n");
        out
    }
}

impl RosterMapper {
    fn resolve_columns(table: &RawTable, header_idx: usize) -> Result<ColumnMap, ImportError> {
        let width = table
            .rows
            .get(header_idx)
            .map(|row| row.len())
            .unwrap_or(0);

        let mut full_name = None;
        let mut tab_number = None;
        let mut email = None;
        let mut phone = None;
        let mut department_code = None;
        let mut position = None;
        let mut manager_tab_number = None;

        for col in 0..width {
            let label = table.cell(header_idx, col).trim().to_lowercase();
            if label.is_empty() {
                continue;
            }

            if Self::matches(&label, FULL_NAME_ALIASES) {
                full_name.get_or_insert(col);
            } else if Self::matches(&label, TAB_NUMBER_ALIASES) {
                tab_number.get_or_insert(col);
            } else if Self::matches(&label, EMAIL_ALIASES) {
                email.get_or_insert(col);
            } else if Self::matches(&label, PHONE_ALIASES) {
                phone.get_or_insert(col);
            } else if Self::matches(&label, DEPARTMENT_CODE_ALIASES) {
                department_code.get_or_insert(col);
            } else if Self::matches(&label, POSITION_ALIASES) {
                position.get_or_insert(col);
            } else if Self::matches(&label, MANAGER_ALIASES) {
                manager_tab_number.get_or_insert(col);
            }
        }

        let tab_number = match tab_number {
            Some(col) => col,
            None => return Err(ImportError::MissingColumn("TabNumber".to_string())),
        };
        let full_name = match full_name {
            Some(col) => col,
            None => return Err(ImportError::MissingColumn("FullName".to_string())),
        };

        Ok(ColumnMap {
            full_name,
            tab_number,
            email,
            phone,
            department_code,
            position,
            manager_tab_number,
        })
    }

    fn matches(label: &str, aliases: &[&str]) -> bool {
        aliases.iter().any(|alias| label == *alias)
    }

    fn optional(table: &RawTable, row: usize, col: Option<usize>) -> Option<String> {
        let col = col?;
        let value = table.cell(row, col);
        if value.is_empty() {
            None
        } else {
            Some(value.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table(rows: Vec<Vec<&str>>) -> RawTable {
        RawTable {
            rows: rows
                .into_iter()
                .map(|r| r.into_iter().map(|c| c.to_string()).collect())
                .collect(),
            merges: Vec::new(),
        }
    }

    #[test]
    fn test_maps_canonical_english_header() {
        let t = table(vec![
            vec![
                "FullName",
                "TabNumber",
                "Email",
                "Phone",
                "DepartmentCode",
                "Position",
                "ManagerTabNumber",
            ],
            vec![
                "Ivanov Ivan",
                "EMP001",
                "ivanov@company.ru",
                "+7-123",
                "DEV",
                "Developer",
                "",
            ],
        ]);

        let rows = RosterMapper.map_rows(&t).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].tab_number, "EMP001");
        assert_eq!(rows[0].full_name, "Ivanov Ivan");
        assert_eq!(rows[0].email.as_deref(), Some("ivanov@company.ru"));
        assert_eq!(rows[0].department_code.as_deref(), Some("DEV"));
        assert_eq!(rows[0].manager_tab_number, None);
        assert_eq!(rows[0].row, 2);
    }

    #[test]
    fn test_maps_russian_aliases() {
        let t = table(vec![
            vec![
                "ФИО",
                "Таб.номер",
                "Email",
                "Телефон",
                "Подразделение",
                "Должность",
                "Руководитель",
            ],
            vec![
                "Петров Петр",
                "EMP002",
                "",
                "",
                "DEV",
                "Разработчик",
                "EMP001",
            ],
        ]);

        let rows = RosterMapper.map_rows(&t).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].tab_number, "EMP002");
        assert_eq!(rows[0].email, None);
        assert_eq!(rows[0].position_title.as_deref(), Some("Разработчик"));
        assert_eq!(rows[0].manager_tab_number.as_deref(), Some("EMP001"));
    }

    #[test]
    fn test_header_found_below_leading_blank_rows() {
        let t = table(vec![
            vec!["", ""],
            vec!["FullName", "TabNumber"],
            vec!["Ivanov Ivan", "EMP001"],
        ]);

        let rows = RosterMapper.map_rows(&t).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].row, 3);
    }

    #[test]
    fn test_blank_data_rows_are_skipped_but_numbering_holds() {
        let t = table(vec![
            vec!["FullName", "TabNumber"],
            vec!["", ""],
            vec!["Ivanov Ivan", "EMP001"],
        ]);

        let rows = RosterMapper.map_rows(&t).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].row, 3);
    }

    #[test]
    fn test_missing_required_column() {
        let t = table(vec![
            vec!["FullName", "Email"],
            vec!["Ivanov Ivan", "ivanov@company.ru"],
        ]);

        let err = RosterMapper.map_rows(&t).unwrap_err();
        let import_err = err.downcast_ref::<ImportError>().unwrap();
        match import_err {
            ImportError::MissingColumn(name) => assert_eq!(name, "TabNumber"),
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn test_header_only_file() {
        let t = table(vec![vec!["FullName", "TabNumber"]]);

        let err = RosterMapper.map_rows(&t).unwrap_err();
        let import_err = err.downcast_ref::<ImportError>().unwrap();
        assert!(matches!(import_err, ImportError::EmptyFile));
    }

    #[test]
    fn test_template_shape() {
        let template = RosterMapper.roster_template();
        assert!(template.starts_with('\u{feff}'));
        assert!(template.contains(
            "FullName,TabNumber,Email,Phone,DepartmentCode,Position,ManagerTabNumber"
        ));
        assert_eq!(template.lines().count(), 4);
        assert!(template.contains("EMP003"));
    }
}
