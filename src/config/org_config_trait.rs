// ==========================================
// Org Structure Engine - Import Config Reader Trait
// ==========================================
// Read-side interface for the tunables the import pipeline and the
// service layer need; no write access, no business logic
// ==========================================

use crate::rules::{CodeRule, TabNumberRule, ValidationRules};
use async_trait::async_trait;
use std::error::Error;

// ==========================================
// OrgConfigReader Trait
// ==========================================
// Implementor: ConfigManager (reads the config_kv table)
#[async_trait]
pub trait OrgConfigReader: Send + Sync {
    /// Department-code grammar bounds.
    ///
    /// # Defaults
    /// - max_length 50, max_segments 10
    async fn get_code_rule(&self) -> Result<CodeRule, Box<dyn Error>>;

    /// Tab-number grammar bounds.
    ///
    /// # Defaults
    /// - 1-4 letters, 3-10 digits
    async fn get_tab_number_rule(&self) -> Result<TabNumberRule, Box<dyn Error>>;

    /// Both grammars assembled into one bundle.
    async fn get_validation_rules(&self) -> Result<ValidationRules, Box<dyn Error>>;

    /// Position title assigned when an org-sheet employee row has no
    /// position cell.
    ///
    /// # Default
    /// - "Unassigned"
    async fn get_default_position_title(&self) -> Result<String, Box<dyn Error>>;

    /// How many leading rows may precede the org-sheet header row.
    ///
    /// # Default
    /// - 10
    async fn get_header_scan_rows(&self) -> Result<usize, Box<dyn Error>>;
}
