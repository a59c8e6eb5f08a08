//! Configuration validation
//!
//! Semantic checks that go beyond the field-level `validator` rules:
//! directory URLs, environment consistency and best-practice linting.

pub mod lint;

use std::fmt;

use crate::Config;

/// Validation error category
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Schema/syntax error
    Schema,
    /// ACME directory or account issue
    Acme,
    /// Secret vault issue
    Vault,
    /// Configuration logic error
    Logic,
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorCategory::Schema => write!(f, "Schema"),
            ErrorCategory::Acme => write!(f, "Acme"),
            ErrorCategory::Vault => write!(f, "Vault"),
            ErrorCategory::Logic => write!(f, "Logic"),
        }
    }
}

/// Validation error
#[derive(Debug, Clone)]
pub struct ValidationError {
    pub category: ErrorCategory,
    pub message: String,
}

impl ValidationError {
    pub fn new(category: ErrorCategory, message: impl Into<String>) -> Self {
        Self {
            category,
            message: message.into(),
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.category, self.message)
    }
}

/// Validation warning
#[derive(Debug, Clone)]
pub struct ValidationWarning {
    pub message: String,
}

impl ValidationWarning {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl fmt::Display for ValidationWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

/// Validation result containing errors and warnings
#[derive(Debug, Clone, Default)]
pub struct ValidationResult {
    pub errors: Vec<ValidationError>,
    pub warnings: Vec<ValidationWarning>,
}

impl ValidationResult {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_error(&mut self, error: ValidationError) {
        self.errors.push(error);
    }

    pub fn add_warning(&mut self, warning: ValidationWarning) {
        self.warnings.push(warning);
    }

    /// Merge another validation result into this one
    pub fn merge(&mut self, other: ValidationResult) {
        self.errors.extend(other.errors);
        self.warnings.extend(other.warnings);
    }

    /// Check if validation passed (no errors)
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn has_warnings(&self) -> bool {
        !self.warnings.is_empty()
    }
}

/// Check the ACME directory URLs
pub fn validate_directories(config: &Config) -> ValidationResult {
    let mut result = ValidationResult::new();

    for (label, raw) in [
        ("staging-directory", &config.acme.staging_directory),
        ("production-directory", &config.acme.production_directory),
    ] {
        match url::Url::parse(raw) {
            Ok(parsed) if parsed.scheme() == "https" => {}
            Ok(parsed) => result.add_error(ValidationError::new(
                ErrorCategory::Acme,
                format!(
                    "ACME {} '{}' must use https, found '{}'",
                    label,
                    raw,
                    parsed.scheme()
                ),
            )),
            Err(e) => result.add_error(ValidationError::new(
                ErrorCategory::Acme,
                format!("ACME {} '{}' is not a valid URL: {}", label, raw, e),
            )),
        }
    }

    if config.acme.staging_directory == config.acme.production_directory {
        result.add_warning(ValidationWarning::new(
            "Staging and production ACME directories are identical",
        ));
    }

    result
}

/// Run every semantic check
pub fn validate_all(config: &Config) -> ValidationResult {
    let mut result = validate_directories(config);
    result.merge(lint::lint_config(config));
    result
}
