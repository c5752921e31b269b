// ==========================================
// Org Structure Engine - Import Traits
// ==========================================
// Responsibility: import pipeline interfaces, no implementations
// Pipeline: file -> raw table -> parsed rows -> validation -> apply
// ==========================================

use crate::domain::import::{
    ImportOptions, ImportReport, ImportRowError, ParsedOrgStructure, RosterRow,
    RosterValidationReport,
};
use crate::rules::ValidationRules;
use async_trait::async_trait;
use std::collections::HashMap;
use std::error::Error;
use std::path::Path;

// ==========================================
// RawTable - positional cell grid
// ==========================================
/// One contiguous cell region within the grid, as spreadsheets record
/// merged cells. Only the anchor (top-left) cell carries the value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MergedRegion {
    pub start_row: u32,
    pub start_col: u32,
    pub end_row: u32,
    pub end_col: u32,
}

impl MergedRegion {
    pub fn contains(&self, row: u32, col: u32) -> bool {
        row >= self.start_row && row <= self.end_row && col >= self.start_col && col <= self.end_col
    }
}

/// Format-neutral view of one sheet: a dense row-major grid of trimmed
/// strings plus the merged regions. CSV files have no merges.
#[derive(Debug, Clone, Default)]
pub struct RawTable {
    pub rows: Vec<Vec<String>>,
    pub merges: Vec<MergedRegion>,
}

impl RawTable {
    /// Cell value with merged regions resolved: an empty cell inside a
    /// merge reads the anchor's value.
    pub fn cell(&self, row: usize, col: usize) -> &str {
        let direct = self
            .rows
            .get(row)
            .and_then(|r| r.get(col))
            .map(|s| s.as_str())
            .unwrap_or("");
        if !direct.is_empty() {
            return direct;
        }

        for merge in &self.merges {
            if merge.contains(row as u32, col as u32) {
                return self
                    .rows
                    .get(merge.start_row as usize)
                    .and_then(|r| r.get(merge.start_col as usize))
                    .map(|s| s.as_str())
                    .unwrap_or("");
            }
        }
        ""
    }

    /// True when every cell of the row is empty after merge resolution.
    pub fn is_row_empty(&self, row: usize) -> bool {
        let width = self.rows.get(row).map(|r| r.len()).unwrap_or(0);
        (0..width).all(|col| self.cell(row, col).is_empty())
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }
}

// ==========================================
// OrgImporter Trait
// ==========================================
// Main import interface
// Implementor: OrgImporterImpl
#[async_trait]
pub trait OrgImporter: Send + Sync {
    /// Imports a hierarchical org chart (positional columns, merged
    /// headers) and applies it to storage.
    ///
    /// # Returns
    /// - Ok(ImportReport): structured report, failed rows included
    /// - Err: file-level failure (missing file, wrong format, empty)
    async fn import_org_structure<P: AsRef<Path> + Send>(
        &self,
        file_path: P,
        options: ImportOptions,
    ) -> Result<ImportReport, Box<dyn Error>>;

    /// Imports a flat header-mapped roster file and applies it.
    async fn import_roster<P: AsRef<Path> + Send>(
        &self,
        file_path: P,
        options: ImportOptions,
    ) -> Result<ImportReport, Box<dyn Error>>;

    /// Parses an org chart without touching storage (preview).
    async fn parse_org_structure<P: AsRef<Path> + Send>(
        &self,
        file_path: P,
    ) -> Result<ParsedOrgStructure, Box<dyn Error>>;

    /// Validates a roster file without touching storage (dry run).
    async fn validate_roster<P: AsRef<Path> + Send>(
        &self,
        file_path: P,
    ) -> Result<RosterValidationReport, Box<dyn Error>>;
}

// ==========================================
// FileParser Trait
// ==========================================
// File reading stage
// Implementors: CsvFileParser, ExcelFileParser, UniversalFileParser
pub trait FileParser: Send + Sync {
    /// Reads a file into a positional cell grid.
    ///
    /// # Returns
    /// - Ok(RawTable): rows and merged regions
    /// - Err: FileNotFound / InvalidFileFormat / read or parse failure
    fn parse_table(&self, file_path: &Path) -> Result<RawTable, Box<dyn Error>>;
}

// ==========================================
// OrgSheetParser Trait
// ==========================================
// Org-chart extraction stage
// Implementor: OrgSheetParser (struct)
pub trait OrgSheetParser: Send + Sync {
    /// Extracts departments and employees from an org-chart table.
    /// Row-level findings are collected into the result, never thrown.
    ///
    /// # Arguments
    /// - rules: code / tab-number grammars in force
    /// - default_position_title: assigned when an employee row has no
    ///   position cell
    /// - header_scan_rows: how many leading rows may precede the header;
    ///   when no header is recognized the first row is assumed to be it
    ///
    /// # Returns
    /// - Err(EmptyFile): leading region blank, or nothing extracted at all
    fn parse(
        &self,
        table: &RawTable,
        rules: &ValidationRules,
        default_position_title: &str,
        header_scan_rows: usize,
    ) -> Result<ParsedOrgStructure, Box<dyn Error>>;
}

// ==========================================
// RosterMapper Trait
// ==========================================
// Header-mapping stage for flat rosters
// Implementor: RosterMapper (struct)
pub trait RosterMapper: Send + Sync {
    /// Maps a raw table to named roster rows via the header aliases.
    ///
    /// # Returns
    /// - Err(EmptyFile): header only, no data rows
    /// - Err(MissingColumn): a required column is absent
    fn map_rows(&self, table: &RawTable) -> Result<Vec<RosterRow>, Box<dyn Error>>;

    /// CSV template (UTF-8 BOM, canonical header order, sample rows)
    /// handed to roster producers.
    fn roster_template(&self) -> String;
}

// ==========================================
// RelationshipValidator Trait
// ==========================================
// Batch validation stage
// Implementor: RelationshipValidator (struct)
pub trait RelationshipValidator: Send + Sync {
    /// Validates one roster batch: grammar of tabs and department
    /// codes, email shape, duplicate tabs, manager resolution against
    /// the batch plus existing storage, self-management and cycles.
    ///
    /// # Arguments
    /// - existing_tabs: tab_number -> employee id already in storage
    ///
    /// # Returns
    /// - row-scoped findings; empty when the batch is clean
    fn validate(
        &self,
        rows: &[RosterRow],
        rules: &ValidationRules,
        existing_tabs: &HashMap<String, String>,
    ) -> Vec<ImportRowError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cell_resolves_merged_anchor() {
        let table = RawTable {
            rows: vec![
                vec!["AP".to_string(), "Head Office".to_string()],
                vec!["".to_string(), "".to_string()],
            ],
            merges: vec![MergedRegion {
                start_row: 0,
                start_col: 0,
                end_row: 1,
                end_col: 0,
            }],
        };

        assert_eq!(table.cell(0, 0), "AP");
        assert_eq!(table.cell(1, 0), "AP");
        assert_eq!(table.cell(1, 1), "");
        assert!(!table.is_row_empty(1));
    }

    #[test]
    fn test_cell_out_of_bounds_is_empty() {
        let table = RawTable::default();
        assert_eq!(table.cell(5, 5), "");
        assert!(table.is_row_empty(0));
    }
}
