// ==========================================
// Org Structure Engine - Configuration Layer
// ==========================================
// Responsibility: read-side configuration for the importer and the
// service layer
// Storage: config_kv table
// ==========================================

pub mod config_manager;
pub mod org_config_trait;

pub use config_manager::{config_keys, ConfigManager};
pub use org_config_trait::OrgConfigReader;
