// ==========================================
// Org Structure Engine - Import Layer
// ==========================================
// Responsibility: turn external files into org data
// Formats: Excel (xlsx/xls/ods), CSV
// ==========================================

// module declarations
pub mod error;
pub mod file_parser;
pub mod org_importer_impl;
pub mod org_importer_trait;
pub mod org_sheet_parser;
pub mod relationship_validator;
pub mod roster_mapper;

// concrete re-exports
pub use error::{ImportError, ImportResult};
pub use file_parser::{CsvFileParser, ExcelFileParser, UniversalFileParser};
pub use org_importer_impl::OrgImporterImpl;
pub use org_sheet_parser::OrgSheetParser as OrgSheetParserImpl;
pub use relationship_validator::RelationshipValidator as RelationshipValidatorImpl;
pub use roster_mapper::RosterMapper as RosterMapperImpl;

// trait re-exports
pub use org_importer_trait::{
    FileParser, MergedRegion, OrgImporter, OrgSheetParser, RawTable, RelationshipValidator,
    RosterMapper,
};
