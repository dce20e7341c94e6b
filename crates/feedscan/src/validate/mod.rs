//! Per-line validation of delimited feed rows.

pub mod reference;

use std::sync::Arc;

use crate::config::ValidatorSettings;

pub use reference::{ReferenceData, ReferenceProvider, StaticReferenceProvider};

/// A field whose value must be non-empty and, when reference data exists
/// for its category, a member of that category's set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldRule {
    /// Field name reported in errors, e.g. `currency`.
    pub name: String,
    /// Zero-based column index within the delimited line.
    pub column: usize,
    /// Reference-data category consulted for membership, e.g. `currencies`.
    pub category: String,
}

/// Validation rules for one feed layout.
#[derive(Debug, Clone)]
pub struct ValidatorConfig {
    pub min_columns: usize,
    pub delimiter: char,
    pub fields: Vec<FieldRule>,
}

impl ValidatorConfig {
    /// Builds the standard three-field layout from runtime settings.
    pub fn from_settings(settings: &ValidatorSettings) -> Self {
        Self {
            min_columns: settings.min_columns,
            delimiter: ';',
            fields: vec![
                FieldRule {
                    name: "currency".to_string(),
                    column: settings.currency_column,
                    category: "currencies".to_string(),
                },
                FieldRule {
                    name: "province".to_string(),
                    column: settings.province_column,
                    category: "provinces".to_string(),
                },
                FieldRule {
                    name: "product".to_string(),
                    column: settings.product_column,
                    category: "products".to_string(),
                },
            ],
        }
    }
}

/// Why a line was rejected. `code` is the stable machine-readable tag
/// (`too_few_columns`, `missing_field`, `invalid_<category>`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RowError {
    pub code: String,
    pub message: String,
    pub field: Option<String>,
    pub value: Option<String>,
}

impl RowError {
    fn too_few_columns(found: usize, min: usize) -> Self {
        Self {
            code: "too_few_columns".to_string(),
            message: format!("Expected at least {} columns, found {}", min, found),
            field: None,
            value: None,
        }
    }

    fn missing_field(field: &str) -> Self {
        Self {
            code: "missing_field".to_string(),
            message: format!("Required field '{}' is empty", field),
            field: Some(field.to_string()),
            value: None,
        }
    }

    fn invalid_reference(category: &str, field: &str, value: &str) -> Self {
        Self {
            code: format!("invalid_{}", category),
            message: format!("Value '{}' is not a known {}", value, field),
            field: Some(field.to_string()),
            value: Some(value.to_string()),
        }
    }
}

/// Checks a single line. Implemented by [`RowValidator`]; test code swaps
/// in other behaviors.
pub trait LineChecker: Send + Sync {
    fn check(&self, line: &str) -> Result<(), RowError>;
}

/// Stateless line validator over a frozen reference snapshot.
pub struct RowValidator {
    config: ValidatorConfig,
    reference: Arc<ReferenceData>,
}

impl RowValidator {
    pub fn new(config: ValidatorConfig, reference: Arc<ReferenceData>) -> Self {
        Self { config, reference }
    }

    /// Validates one non-empty line. Callers skip blank lines; this
    /// function assumes the line carries content.
    pub fn validate(&self, line: &str) -> Result<(), RowError> {
        let columns: Vec<&str> = line.split(self.config.delimiter).collect();
        if columns.len() < self.config.min_columns {
            return Err(RowError::too_few_columns(
                columns.len(),
                self.config.min_columns,
            ));
        }

        for rule in &self.config.fields {
            let value = columns.get(rule.column).map(|c| c.trim()).unwrap_or("");
            if value.is_empty() {
                return Err(RowError::missing_field(&rule.name));
            }
            if !self.reference.is_member(&rule.category, value) {
                return Err(RowError::invalid_reference(&rule.category, &rule.name, value));
            }
        }

        Ok(())
    }
}

impl LineChecker for RowValidator {
    fn check(&self, line: &str) -> Result<(), RowError> {
        self.validate(line)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::{HashMap, HashSet};

    use super::*;

    fn reference_with(categories: &[(&str, &[&str])]) -> Arc<ReferenceData> {
        let mut sets = HashMap::new();
        for (category, values) in categories {
            let set: HashSet<String> = values.iter().map(|v| v.to_string()).collect();
            sets.insert(category.to_string(), set);
        }
        Arc::new(ReferenceData::new(sets))
    }

    fn full_reference() -> Arc<ReferenceData> {
        reference_with(&[
            ("currencies", &["EUR", "USD"][..]),
            ("provinces", &["BC", "ON"][..]),
            ("products", &["WIDGET", "GADGET"][..]),
        ])
    }

    fn validator(min_columns: usize, reference: Arc<ReferenceData>) -> RowValidator {
        let settings = ValidatorSettings::with_min_columns(min_columns);
        RowValidator::new(ValidatorConfig::from_settings(&settings), reference)
    }

    /// 12 columns with currency at 3, province at 10, product at 11.
    fn line(currency: &str, province: &str, product: &str) -> String {
        let mut columns = vec!["x"; 12];
        columns[3] = currency;
        columns[10] = province;
        columns[11] = product;
        columns.join(";")
    }

    #[test]
    fn test_valid_line_passes() {
        let v = validator(12, full_reference());
        assert!(v.validate(&line("EUR", "BC", "WIDGET")).is_ok());
    }

    #[test]
    fn test_too_few_columns() {
        let v = validator(12, full_reference());
        let err = v.validate("a;b;c").unwrap_err();
        assert_eq!(err.code, "too_few_columns");
        assert!(err.message.contains("found 3"));
    }

    #[test]
    fn test_min_columns_is_parameterized() {
        let twelve = validator(12, full_reference());
        let eighteen = validator(18, full_reference());
        let row = line("EUR", "BC", "WIDGET");

        assert!(twelve.validate(&row).is_ok());
        let err = eighteen.validate(&row).unwrap_err();
        assert_eq!(err.code, "too_few_columns");
    }

    #[test]
    fn test_missing_field() {
        let v = validator(12, full_reference());
        let err = v.validate(&line("  ", "BC", "WIDGET")).unwrap_err();
        assert_eq!(err.code, "missing_field");
        assert_eq!(err.field.as_deref(), Some("currency"));
    }

    #[test]
    fn test_invalid_currency() {
        let v = validator(12, full_reference());
        let err = v.validate(&line("XXX", "BC", "WIDGET")).unwrap_err();
        assert_eq!(err.code, "invalid_currencies");
        assert_eq!(err.field.as_deref(), Some("currency"));
        assert_eq!(err.value.as_deref(), Some("XXX"));
    }

    #[test]
    fn test_invalid_province_and_product() {
        let v = validator(12, full_reference());

        let err = v.validate(&line("EUR", "ZZ", "WIDGET")).unwrap_err();
        assert_eq!(err.code, "invalid_provinces");

        let err = v.validate(&line("EUR", "BC", "NOPE")).unwrap_err();
        assert_eq!(err.code, "invalid_products");
    }

    #[test]
    fn test_empty_reference_set_skips_membership() {
        // Categories with no loaded values do not constrain the field.
        let v = validator(12, reference_with(&[("currencies", &["EUR"][..])]));
        assert!(v.validate(&line("EUR", "anything", "anything")).is_ok());
    }

    #[test]
    fn test_carriage_return_is_trimmed() {
        let v = validator(12, full_reference());
        let row = format!("{}\r", line("EUR", "BC", "WIDGET"));
        assert!(v.validate(&row).is_ok());
    }

    #[test]
    fn test_values_are_trimmed_before_lookup() {
        let v = validator(12, full_reference());
        assert!(v.validate(&line(" EUR ", "BC", "WIDGET")).is_ok());
    }
}
