// ==========================================
// Org Structure Engine - Service Error Types
// ==========================================
// One variant per business rule, so callers can match on the reason a
// mutation was refused instead of parsing messages
// ==========================================

use crate::repository::RepositoryError;
use thiserror::Error;

/// Service-layer errors
#[derive(Error, Debug)]
pub enum ServiceError {
    // ===== Uniqueness =====
    #[error("department code already in use: {0}")]
    DuplicateCode(String),

    #[error("tab number already in use: {0}")]
    DuplicateTabNumber(String),

    // ===== Missing references =====
    #[error("department not found: {0}")]
    DepartmentNotFound(String),

    #[error("employee not found: {0}")]
    EmployeeNotFound(String),

    #[error("position not found: {0}")]
    PositionNotFound(String),

    // ===== Delete gates =====
    #[error("department {id} still has {children} child department(s)")]
    DepartmentHasChildren { id: String, children: i64 },

    #[error("department {id} still has {employees} assigned employee(s)")]
    DepartmentHasEmployees { id: String, employees: i64 },

    // ===== Field grammar =====
    #[error("invalid department code '{code}': {reason}")]
    InvalidDepartmentCode { code: String, reason: String },

    #[error("invalid tab number '{value}': {reason}")]
    InvalidTabNumber { value: String, reason: String },

    #[error("invalid email format: {0}")]
    InvalidEmail(String),

    #[error("validation failed: {0}")]
    Validation(String),

    // ===== Lower layers =====
    #[error(transparent)]
    Repository(#[from] RepositoryError),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Result alias
pub type ServiceResult<T> = Result<T, ServiceError>;
