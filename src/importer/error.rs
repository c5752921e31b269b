// ==========================================
// Org Structure Engine - Import Error Types
// ==========================================
// thiserror derive; file-level failures are typed so callers can tell
// a wrong file apart from an empty one
// ==========================================

use thiserror::Error;

/// Importer-layer errors
#[derive(Error, Debug)]
pub enum ImportError {
    // ===== File errors =====
    #[error("file not found: {0}")]
    FileNotFound(String),

    #[error("invalid file format: {0} (expected .xlsx/.xls/.ods/.csv)")]
    InvalidFileFormat(String),

    #[error("file contains no data rows")]
    EmptyFile,

    #[error("file read failed: {0}")]
    FileReadError(String),

    #[error("excel parse failed: {0}")]
    ExcelParseError(String),

    #[error("csv parse failed: {0}")]
    CsvParseError(String),

    // ===== Mapping errors =====
    #[error("required column missing: {0}")]
    MissingColumn(String),

    #[error("field mapping failed (row {row}): {message}")]
    FieldMappingError { row: usize, message: String },

    // ===== Database errors =====
    #[error("database query failed: {0}")]
    DatabaseQueryError(String),

    #[error("database transaction failed: {0}")]
    DatabaseTransactionError(String),

    // ===== Config errors =====
    #[error("config read failed (key: {key}): {message}")]
    ConfigReadError { key: String, message: String },

    // ===== Generic =====
    #[error("internal error: {0}")]
    InternalError(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl From<std::io::Error> for ImportError {
    fn from(err: std::io::Error) -> Self {
        ImportError::FileReadError(err.to_string())
    }
}

impl From<csv::Error> for ImportError {
    fn from(err: csv::Error) -> Self {
        ImportError::CsvParseError(err.to_string())
    }
}

impl From<calamine::Error> for ImportError {
    fn from(err: calamine::Error) -> Self {
        ImportError::ExcelParseError(err.to_string())
    }
}

/// Result alias
pub type ImportResult<T> = Result<T, ImportError>;
