// ==========================================
// Org Structure Engine - Validation & Hierarchy Rules
// ==========================================
// Responsibility: department-code / tab-number grammars, parent-code
// derivation, delete gating, email checks
// Shared by the importer and the service layer; pure functions only,
// no I/O and no persistence
// ==========================================

use serde::{Deserialize, Serialize};

// ==========================================
// CodeRule - department code grammar
// ==========================================
// A department code is a dot-delimited chain of segments. Each segment
// is made of uppercase letters (any alphabet) and ASCII digits. The
// prefix segments name the ancestor chain, so "AP.3.2" sits under
// "AP.3" which sits under "AP". Codes are case- and locale-sensitive.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CodeRule {
    /// Upper bound on total code length (characters)
    pub max_length: usize,
    /// Upper bound on segment count (hierarchy depth)
    pub max_segments: usize,
}

impl Default for CodeRule {
    fn default() -> Self {
        Self {
            max_length: 50,
            max_segments: 10,
        }
    }
}

impl CodeRule {
    /// Validates a department code against the grammar.
    ///
    /// # Returns
    /// - Ok(()): the code is well-formed
    /// - Err(String): human-readable reason, embedded into row diagnostics
    pub fn validate(&self, code: &str) -> Result<(), String> {
        if code.is_empty() {
            return Err("code is empty".to_string());
        }
        if code.chars().count() > self.max_length {
            return Err(format!("code exceeds {} characters", self.max_length));
        }

        let segments: Vec<&str> = code.split('.').collect();
        if segments.len() > self.max_segments {
            return Err(format!("code exceeds {} segments", self.max_segments));
        }

        for segment in segments {
            if segment.is_empty() {
                return Err("code contains an empty segment".to_string());
            }
            for ch in segment.chars() {
                let valid = ch.is_ascii_digit() || (ch.is_alphabetic() && ch.is_uppercase());
                if !valid {
                    return Err(format!("invalid character '{}'", ch));
                }
            }
        }

        Ok(())
    }
}

// ==========================================
// TabNumberRule - personnel tab number grammar
// ==========================================
// A tab number is an uppercase letter prefix followed by a digit run,
// e.g. "AR21000612" or "EMP001". Both parts are length-bounded; the
// bounds are configuration so deployments with stricter personnel
// numbering can narrow them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TabNumberRule {
    pub min_letters: usize,
    pub max_letters: usize,
    pub min_digits: usize,
    pub max_digits: usize,
}

impl Default for TabNumberRule {
    fn default() -> Self {
        Self {
            min_letters: 1,
            max_letters: 4,
            min_digits: 3,
            max_digits: 10,
        }
    }
}

impl TabNumberRule {
    /// Validates a tab number against the grammar.
    pub fn validate(&self, value: &str) -> Result<(), String> {
        if value.is_empty() {
            return Err("tab number is empty".to_string());
        }

        let letters: String = value
            .chars()
            .take_while(|ch| ch.is_alphabetic() && ch.is_uppercase())
            .collect();
        let rest = &value[letters.len()..];

        let letter_count = letters.chars().count();
        if letter_count < self.min_letters || letter_count > self.max_letters {
            return Err(format!(
                "letter prefix must be {}-{} uppercase letters",
                self.min_letters, self.max_letters
            ));
        }

        if let Some(bad) = rest.chars().find(|ch| !ch.is_ascii_digit()) {
            return Err(format!("unexpected character '{}'", bad));
        }

        let digit_count = rest.len();
        if digit_count < self.min_digits || digit_count > self.max_digits {
            return Err(format!(
                "digit part must be {}-{} digits",
                self.min_digits, self.max_digits
            ));
        }

        Ok(())
    }
}

// ==========================================
// ValidationRules - injected rule bundle
// ==========================================
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ValidationRules {
    pub code: CodeRule,
    pub tab: TabNumberRule,
}

impl ValidationRules {
    pub fn validate_department_code(&self, code: &str) -> Result<(), String> {
        self.code.validate(code)
    }

    pub fn validate_tab_number(&self, value: &str) -> Result<(), String> {
        self.tab.validate(value)
    }
}

// ==========================================
// Hierarchy derivations
// ==========================================

/// Derives the parent code by stripping the last dot segment.
///
/// Single-segment codes are roots and have no parent.
pub fn parent_code_of(code: &str) -> Option<&str> {
    code.rfind('.').map(|idx| &code[..idx])
}

/// Hierarchy depth encoded in the code: segment count minus one, root = 0.
pub fn code_level(code: &str) -> i32 {
    code.matches('.').count() as i32
}

/// A department may be deleted only when it has no children and no
/// assigned employees.
pub fn can_delete(child_count: usize, employee_count: i64) -> bool {
    child_count == 0 && employee_count == 0
}

// ==========================================
// Email check
// ==========================================

/// Minimal structural email check: one '@', non-empty local part, a
/// dotted domain, no whitespace. Deliverability is not our concern.
pub fn valid_email(value: &str) -> bool {
    if value.chars().any(|ch| ch.is_whitespace()) {
        return false;
    }

    let mut parts = value.splitn(2, '@');
    let local = parts.next().unwrap_or("");
    let domain = match parts.next() {
        Some(d) => d,
        None => return false,
    };

    if local.is_empty() || domain.is_empty() || domain.contains('@') {
        return false;
    }

    domain.contains('.') && !domain.starts_with('.') && !domain.ends_with('.')
}
