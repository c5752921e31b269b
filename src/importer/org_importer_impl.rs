// ==========================================
// Org Structure Engine - Org Importer Implementation
// ==========================================
// Responsibility: wires the whole import pipeline, file to database
// Flow: read -> parse/map -> validate -> apply -> report
// ==========================================

use crate::config::OrgConfigReader;
use crate::domain::{
    ImportOptions, ImportReport, ImportRowError, ParsedOrgStructure, RosterRow,
    RosterValidationReport,
};
use crate::importer::file_parser::UniversalFileParser;
use crate::importer::org_importer_trait::{
    FileParser, OrgImporter, OrgSheetParser, RelationshipValidator, RosterMapper,
};
use crate::importer::org_sheet_parser::OrgSheetParser as OrgSheetParserImpl;
use crate::importer::relationship_validator::RelationshipValidator as RelationshipValidatorImpl;
use crate::importer::roster_mapper::RosterMapper as RosterMapperImpl;
use crate::repository::OrgImportRepository;
use std::collections::{HashMap, HashSet};
use std::error::Error;
use std::path::Path;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

/// Extracts the trailing "at row N" marker the parsers embed in their
/// findings; 0 when a finding has no row.
fn row_in_message(message: &str) -> usize {
    match message.rfind(" at row ") {
        Some(idx) => {
            let tail = &message[idx + " at row ".len()..];
            let digits: String = tail.chars().take_while(|c| c.is_ascii_digit()).collect();
            digits.parse().unwrap_or(0)
        }
        None => 0,
    }
}

// ==========================================
// OrgImporterImpl
// ==========================================
pub struct OrgImporterImpl<R, C>
where
    R: OrgImportRepository,
    C: OrgConfigReader,
{
    // data access layer
    import_repo: R,

    // config reader
    config: C,

    // pipeline components
    file_parser: Box<dyn FileParser>,
    sheet_parser: Box<dyn OrgSheetParser>,
    roster_mapper: Box<dyn RosterMapper>,
    relationship_validator: Box<dyn RelationshipValidator>,
}

impl<R, C> OrgImporterImpl<R, C>
where
    R: OrgImportRepository,
    C: OrgConfigReader,
{
    /// Creates an importer from explicit components.
    ///
    /// # Arguments
    /// - import_repo: batch lookup / apply repository
    /// - config: configuration reader
    /// - file_parser: file reading stage
    /// - sheet_parser: org-chart extraction stage
    /// - roster_mapper: roster header-mapping stage
    /// - relationship_validator: batch validation stage
    pub fn new(
        import_repo: R,
        config: C,
        file_parser: Box<dyn FileParser>,
        sheet_parser: Box<dyn OrgSheetParser>,
        roster_mapper: Box<dyn RosterMapper>,
        relationship_validator: Box<dyn RelationshipValidator>,
    ) -> Self {
        Self {
            import_repo,
            config,
            file_parser,
            sheet_parser,
            roster_mapper,
            relationship_validator,
        }
    }

    /// Stock pipeline: universal file reading plus the standard parser,
    /// mapper and validator components.
    pub fn with_defaults(import_repo: R, config: C) -> Self {
        Self::new(
            import_repo,
            config,
            Box::new(UniversalFileParser),
            Box::new(OrgSheetParserImpl),
            Box::new(RosterMapperImpl),
            Box::new(RelationshipValidatorImpl),
        )
    }
}

#[async_trait::async_trait]
impl<R, C> OrgImporter for OrgImporterImpl<R, C>
where
    R: OrgImportRepository + Send + Sync,
    C: OrgConfigReader + Send + Sync,
{
    /// Imports a hierarchical org-chart file.
    ///
    /// # Returns
    /// - Ok(ImportReport): counts plus row diagnostics; file-level
    ///   trouble (unreadable, empty, wrong format) comes back as Err
    #[instrument(skip(self, file_path, options), fields(import_id))]
    async fn import_org_structure<P: AsRef<Path> + Send>(
        &self,
        file_path: P,
        options: ImportOptions,
    ) -> Result<ImportReport, Box<dyn Error>> {
        use std::time::Instant;
        let start_time = Instant::now();
        let import_id = Uuid::new_v4().to_string();

        let file_path_str = file_path.as_ref().to_str().unwrap_or("unknown");
        info!(
            import_id = %import_id,
            file_path = %file_path_str,
            skip_on_error = options.skip_on_error,
            "starting org structure import"
        );

        // === Step 1: read the table ===
        debug!("step 1: read the table");
        let table = self
            .file_parser
            .parse_table(file_path.as_ref())
            .map_err(|e| {
                error!(error = %e, "file reading failed");
                e
            })?;
        info!(
            rows = table.row_count(),
            merges = table.merges.len(),
            "table read"
        );

        // === Step 2: assemble config ===
        debug!("step 2: assemble config");
        let rules = self.config.get_validation_rules().await?;
        let default_position_title = self.config.get_default_position_title().await?;
        let header_scan_rows = self.config.get_header_scan_rows().await?;

        // === Step 3: parse the org sheet ===
        debug!("step 3: parse the org sheet");
        let parsed = self
            .sheet_parser
            .parse(&table, &rules, &default_position_title, header_scan_rows)
            .map_err(|e| {
                error!(error = %e, "org sheet parsing failed");
                e
            })?;
        info!(
            departments = parsed.departments.len(),
            employees = parsed.employees.len(),
            errors = parsed.errors.len(),
            warnings = parsed.warnings.len(),
            "org sheet parsed"
        );

        let department_count = parsed.departments.len();
        let employee_count = parsed.employees.len();

        let mut report = ImportReport {
            total_processed: department_count + employee_count + parsed.errors.len(),
            ..Default::default()
        };
        for message in &parsed.errors {
            warn!(finding = %message, "parse finding");
            report.push_error(ImportRowError {
                error_type: "parse".to_string(),
                message: message.clone(),
                row: row_in_message(message),
                data: None,
            });
        }
        report.warnings.extend(parsed.warnings.iter().cloned());

        // === Step 4: all-or-nothing gate ===
        if !options.skip_on_error && !report.error_details.is_empty() {
            warn!(
                errors = report.errors,
                "errors present and skip_on_error disabled, nothing applied"
            );
            report.elapsed_ms = start_time.elapsed().as_millis() as u64;
            return Ok(report);
        }

        // === Step 5: apply in one transaction ===
        debug!("step 5: apply in one transaction");
        let stats = self
            .import_repo
            .apply_org_structure(parsed.departments, parsed.employees)
            .await
            .map_err(|e| {
                error!(error = %e, "org structure apply failed");
                e
            })?;

        for warning in &stats.warnings {
            warn!(warning = %warning, "apply warning");
        }

        report.successful = department_count + employee_count;
        report.departments_created = stats.departments_created;
        report.positions_created = stats.positions_created;
        report.employees_created = stats.employees_created;
        report.employees_updated = stats.employees_updated;
        report.warnings.extend(stats.warnings.iter().cloned());
        report.elapsed_ms = start_time.elapsed().as_millis() as u64;

        info!(
            import_id = %import_id,
            total = report.total_processed,
            successful = report.successful,
            departments_created = report.departments_created,
            employees_created = report.employees_created,
            employees_updated = report.employees_updated,
            errors = report.errors,
            elapsed_ms = report.elapsed_ms,
            "org structure import finished"
        );

        Ok(report)
    }

    /// Imports a flat employee-roster file.
    ///
    /// # Returns
    /// - Ok(ImportReport): with `skip_on_error = false` any finding
    ///   leaves the database untouched while the report still lists
    ///   every finding
    #[instrument(skip(self, file_path, options), fields(import_id))]
    async fn import_roster<P: AsRef<Path> + Send>(
        &self,
        file_path: P,
        options: ImportOptions,
    ) -> Result<ImportReport, Box<dyn Error>> {
        use std::time::Instant;
        let start_time = Instant::now();
        let import_id = Uuid::new_v4().to_string();

        let file_path_str = file_path.as_ref().to_str().unwrap_or("unknown");
        info!(
            import_id = %import_id,
            file_path = %file_path_str,
            skip_on_error = options.skip_on_error,
            "starting roster import"
        );

        // === Step 1: read the table ===
        debug!("step 1: read the table");
        let table = self
            .file_parser
            .parse_table(file_path.as_ref())
            .map_err(|e| {
                error!(error = %e, "file reading failed");
                e
            })?;
        info!(rows = table.row_count(), "table read");

        // === Step 2: map the header ===
        debug!("step 2: map the header");
        let rows = self.roster_mapper.map_rows(&table).map_err(|e| {
            error!(error = %e, "roster mapping failed");
            e
        })?;
        info!(rows = rows.len(), "roster mapped");

        // === Step 3: batch validation ===
        debug!("step 3: batch validation");
        let rules = self.config.get_validation_rules().await?;
        let existing_tabs = self.lookup_existing_tabs(&rows).await?;
        let findings = self
            .relationship_validator
            .validate(&rows, &rules, &existing_tabs);
        info!(findings = findings.len(), "batch validated");

        let mut report = ImportReport {
            total_processed: rows.len(),
            ..Default::default()
        };
        let mut failed_rows: HashSet<usize> = HashSet::new();
        for finding in findings {
            warn!(row = finding.row, finding = %finding.message, "validation finding");
            failed_rows.insert(finding.row);
            report.push_error(finding);
        }

        // === Step 4: all-or-nothing gate ===
        if !options.skip_on_error && !report.error_details.is_empty() {
            warn!(
                errors = report.errors,
                "errors present and skip_on_error disabled, nothing applied"
            );
            report.elapsed_ms = start_time.elapsed().as_millis() as u64;
            return Ok(report);
        }

        // === Step 5: apply valid rows in one transaction ===
        debug!("step 5: apply valid rows");
        let valid_rows: Vec<RosterRow> = rows
            .into_iter()
            .filter(|row| !failed_rows.contains(&row.row))
            .collect();
        let applied = valid_rows.len();

        let stats = self.import_repo.apply_roster(valid_rows).await.map_err(|e| {
            error!(error = %e, "roster apply failed");
            e
        })?;

        for warning in &stats.warnings {
            warn!(warning = %warning, "apply warning");
        }

        report.successful = applied;
        report.departments_created = stats.departments_created;
        report.positions_created = stats.positions_created;
        report.employees_created = stats.employees_created;
        report.employees_updated = stats.employees_updated;
        report.warnings.extend(stats.warnings.iter().cloned());
        report.elapsed_ms = start_time.elapsed().as_millis() as u64;

        info!(
            import_id = %import_id,
            total = report.total_processed,
            successful = report.successful,
            employees_created = report.employees_created,
            employees_updated = report.employees_updated,
            errors = report.errors,
            elapsed_ms = report.elapsed_ms,
            "roster import finished"
        );

        Ok(report)
    }

    /// Parses an org-chart file without touching the database.
    #[instrument(skip(self, file_path))]
    async fn parse_org_structure<P: AsRef<Path> + Send>(
        &self,
        file_path: P,
    ) -> Result<ParsedOrgStructure, Box<dyn Error>> {
        debug!("reading table for preview");
        let table = self.file_parser.parse_table(file_path.as_ref())?;

        let rules = self.config.get_validation_rules().await?;
        let default_position_title = self.config.get_default_position_title().await?;
        let header_scan_rows = self.config.get_header_scan_rows().await?;

        let parsed =
            self.sheet_parser
                .parse(&table, &rules, &default_position_title, header_scan_rows)?;
        info!(
            departments = parsed.departments.len(),
            employees = parsed.employees.len(),
            errors = parsed.errors.len(),
            "org sheet preview parsed"
        );

        Ok(parsed)
    }

    /// Dry-runs roster validation; writes nothing.
    #[instrument(skip(self, file_path))]
    async fn validate_roster<P: AsRef<Path> + Send>(
        &self,
        file_path: P,
    ) -> Result<RosterValidationReport, Box<dyn Error>> {
        let table = self.file_parser.parse_table(file_path.as_ref())?;
        let rows = self.roster_mapper.map_rows(&table)?;

        let rules = self.config.get_validation_rules().await?;
        let existing_tabs = self.lookup_existing_tabs(&rows).await?;
        let findings = self
            .relationship_validator
            .validate(&rows, &rules, &existing_tabs);

        let mut failed_rows: HashSet<usize> = HashSet::new();
        for finding in &findings {
            failed_rows.insert(finding.row);
        }

        let report = RosterValidationReport {
            total_rows: rows.len(),
            valid_rows: rows.len() - failed_rows.len(),
            invalid_rows: failed_rows.len(),
            error_details: findings,
        };
        info!(
            total = report.total_rows,
            invalid = report.invalid_rows,
            "roster validated"
        );

        Ok(report)
    }
}

impl<R, C> OrgImporterImpl<R, C>
where
    R: OrgImportRepository + Send + Sync,
    C: OrgConfigReader + Send + Sync,
{
    /// Collects every tab the batch mentions (own and manager) and
    /// resolves them against storage in one query.
    async fn lookup_existing_tabs(
        &self,
        rows: &[RosterRow],
    ) -> Result<HashMap<String, String>, Box<dyn Error>> {
        let mut tabs: Vec<String> = Vec::new();
        let mut seen: HashSet<&str> = HashSet::new();

        for row in rows {
            if !row.tab_number.is_empty() && seen.insert(row.tab_number.as_str()) {
                tabs.push(row.tab_number.clone());
            }
            if let Some(manager) = &row.manager_tab_number {
                if seen.insert(manager.as_str()) {
                    tabs.push(manager.clone());
                }
            }
        }

        self.import_repo.employee_ids_by_tab(&tabs).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_row_in_message() {
        assert_eq!(
            row_in_message("Invalid department code 'x' at row 7: bad"),
            7
        );
        assert_eq!(
            row_in_message("Cannot determine department for employee 'A' at row 12"),
            12
        );
        assert_eq!(row_in_message("no marker here"), 0);
    }
}
