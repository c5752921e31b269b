// ==========================================
// Org Structure Engine - Service Layer
// ==========================================
// Responsibility: business operations over the hierarchy
// Boundary: validation and transaction composition live here, row
// access stays in the repositories
// ==========================================

pub mod error;
pub mod org_service;

// Re-export core types
pub use error::{ServiceError, ServiceResult};
pub use org_service::{
    CreateDepartmentRequest, CreateEmployeeRequest, OrgStructureService, UpdateDepartmentRequest,
    UpdateEmployeeRequest,
};
