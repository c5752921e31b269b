// ==========================================
// Org Structure Engine - Core Library
// ==========================================
// Stack: Rust + SQLite
// Role: organizational-structure import and hierarchy consistency
// ==========================================

// ==========================================
// Module declarations
// ==========================================

// Domain layer - entities and DTOs
pub mod domain;

// Repository layer - data access
pub mod repository;

// Rules layer - code/tab-number grammars, hierarchy derivations
pub mod rules;

// Importer layer - external data ingestion
pub mod importer;

// Service layer - direct CRUD over the hierarchy
pub mod service;

// Configuration layer
pub mod config;

// Database infrastructure (connection init / unified PRAGMAs / schema)
pub mod db;

// Logging
pub mod logging;

// ==========================================
// Re-exports
// ==========================================

// Domain entities
pub use domain::{
    Department, DepartmentPath, DepartmentTreeNode, Employee, OrgStats, Position,
};

// Import DTOs
pub use domain::{
    ImportOptions, ImportReport, ImportRowError, ParseSummary, ParsedDepartment, ParsedEmployee,
    ParsedOrgStructure, RosterRow, RosterValidationReport,
};

// Rules
pub use rules::{can_delete, code_level, parent_code_of, CodeRule, TabNumberRule, ValidationRules};

// Importer
pub use importer::{OrgImporter, OrgImporterImpl};

// Service
pub use service::{OrgStructureService, ServiceError, ServiceResult};

// ==========================================
// Constants
// ==========================================

// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

// System name
pub const APP_NAME: &str = "org-structure-engine";

// Database schema version
pub const DB_VERSION: &str = "v0.1";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(!VERSION.is_empty());
    }
}
