// ==========================================
// Org Structure Engine - Domain Layer
// ==========================================
// Responsibility: entities and transfer objects of the organizational
// hierarchy plus the import pipeline
// Boundary: no data access, no parsing, no business orchestration
// ==========================================

pub mod import;
pub mod org;

// Re-export core types
pub use import::{
    ImportOptions, ImportReport, ImportRowError, ParseSummary, ParsedDepartment, ParsedEmployee,
    ParsedOrgStructure, RosterRow, RosterValidationReport,
};
pub use org::{
    Department, DepartmentPath, DepartmentTreeNode, Employee, OrgStats, Position,
};
