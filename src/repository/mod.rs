// ==========================================
// Org Structure Engine - Data Repository Layer
// ==========================================
// Responsibility: data access interfaces, database details stay inside
// Boundary: repositories carry no business logic
// Constraint: every query is parameterized, no SQL injection surface
// ==========================================

pub mod department_repo;
pub mod employee_repo;
pub mod error;
pub mod org_import_repo;
pub mod org_import_repo_impl;
pub mod position_repo;

// Re-export core repositories
pub use department_repo::DepartmentRepository;
pub use employee_repo::EmployeeRepository;
pub use error::{RepositoryError, RepositoryResult};
pub use org_import_repo::{OrgApplyStats, OrgImportRepository, RosterApplyStats};
pub use org_import_repo_impl::OrgImportRepositoryImpl;
pub use position_repo::PositionRepository;
