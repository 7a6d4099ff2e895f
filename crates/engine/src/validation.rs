//! Data validation rules.
//!
//! Constrains what users may enter into cells: number and date bounds,
//! text length, list membership, and custom formulas. Rules are checked
//! on demand against a single proposed value; nothing here touches the
//! cell store or the dependency graph.
//!
//! List matching is case-sensitive ("Yes" != "yes"); users who want
//! case-insensitive lists should normalize their items.

use serde::{Deserialize, Serialize};

use crate::cell_id::ParsedRef;
use crate::formula::eval::{evaluate_formula, CellLookup, Value};
use crate::formula::eval_datetime::parse_iso_date;

/// What happens when a proposed value fails validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Severity {
    /// The edit must be refused.
    Reject,
    /// The edit may proceed with a warning.
    Warning,
    /// Informational only.
    Info,
}

/// Comparison operator for numeric constraints.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ComparisonOperator {
    Between,
    NotBetween,
    EqualTo,
    NotEqualTo,
    GreaterThan,
    LessThan,
    GreaterThanOrEqual,
    LessThanOrEqual,
}

/// Numeric constraint (used by WholeNumber, Decimal, Date, TextLength).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NumericConstraint {
    pub operator: ComparisonOperator,
    pub value1: f64,
    /// Required for Between/NotBetween, ignored otherwise.
    pub value2: Option<f64>,
}

impl NumericConstraint {
    pub fn between(min: f64, max: f64) -> Self {
        Self {
            operator: ComparisonOperator::Between,
            value1: min,
            value2: Some(max),
        }
    }

    pub fn greater_than(value: f64) -> Self {
        Self {
            operator: ComparisonOperator::GreaterThan,
            value1: value,
            value2: None,
        }
    }

    pub fn less_than(value: f64) -> Self {
        Self {
            operator: ComparisonOperator::LessThan,
            value1: value,
            value2: None,
        }
    }

    pub fn equal_to(value: f64) -> Self {
        Self {
            operator: ComparisonOperator::EqualTo,
            value1: value,
            value2: None,
        }
    }

    fn holds(&self, n: f64) -> bool {
        let v1 = self.value1;
        match self.operator {
            ComparisonOperator::Between => {
                let v2 = self.value2.unwrap_or(v1);
                n >= v1.min(v2) && n <= v1.max(v2)
            }
            ComparisonOperator::NotBetween => {
                let v2 = self.value2.unwrap_or(v1);
                n < v1.min(v2) || n > v1.max(v2)
            }
            ComparisonOperator::EqualTo => n == v1,
            ComparisonOperator::NotEqualTo => n != v1,
            ComparisonOperator::GreaterThan => n > v1,
            ComparisonOperator::LessThan => n < v1,
            ComparisonOperator::GreaterThanOrEqual => n >= v1,
            ComparisonOperator::LessThanOrEqual => n <= v1,
        }
    }
}

/// The predicate a rule applies.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ValidationType {
    /// Accept any value.
    AnyValue,
    /// Integers within bounds (fractional input is rejected).
    WholeNumber(NumericConstraint),
    /// Decimals within bounds.
    Decimal(NumericConstraint),
    /// Character count within bounds.
    TextLength(NumericConstraint),
    /// ISO `YYYY-MM-DD` dates; the constraint is over day serials.
    Date(NumericConstraint),
    /// Membership in a fixed list (case-sensitive).
    List(Vec<String>),
    /// Formula that must evaluate truthy against the proposed value,
    /// bound at A1 of a synthetic single-cell context.
    Custom(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationRule {
    pub id: String,
    /// The cells this rule covers (metadata for the caller; `check`
    /// itself is per-value).
    pub range: Option<ParsedRef>,
    pub rule_type: ValidationType,
    pub severity: Severity,
    /// Message shown on failure; a default is derived when absent.
    pub message: Option<String>,
    /// If true, empty input is always valid.
    pub ignore_blank: bool,
}

impl ValidationRule {
    pub fn new(id: &str, rule_type: ValidationType) -> Self {
        Self {
            id: id.to_string(),
            range: None,
            rule_type,
            severity: Severity::Reject,
            message: None,
            ignore_blank: true,
        }
    }

    pub fn with_severity(mut self, severity: Severity) -> Self {
        self.severity = severity;
        self
    }

    pub fn with_message(mut self, message: &str) -> Self {
        self.message = Some(message.to_string());
        self
    }

    pub fn with_range(mut self, range: ParsedRef) -> Self {
        self.range = Some(range);
        self
    }

    pub fn with_ignore_blank(mut self, ignore: bool) -> Self {
        self.ignore_blank = ignore;
        self
    }

    /// Date rule between two ISO dates. None if either date is invalid.
    pub fn date_between(id: &str, start_iso: &str, end_iso: &str) -> Option<Self> {
        let start = parse_iso_date(start_iso)?;
        let end = parse_iso_date(end_iso)?;
        Some(Self::new(
            id,
            ValidationType::Date(NumericConstraint::between(start, end)),
        ))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationOutcome {
    Valid,
    Invalid { severity: Severity, message: String },
}

impl ValidationOutcome {
    pub fn is_valid(&self) -> bool {
        matches!(self, ValidationOutcome::Valid)
    }
}

/// Check a proposed raw input against a rule.
///
/// Stateless: no cell store, no dependency graph, one call per value.
pub fn check(proposed: &str, rule: &ValidationRule) -> ValidationOutcome {
    let trimmed = proposed.trim();
    if trimmed.is_empty() {
        if rule.ignore_blank {
            return ValidationOutcome::Valid;
        }
        return invalid(rule, "value is required");
    }

    match &rule.rule_type {
        ValidationType::AnyValue => ValidationOutcome::Valid,

        ValidationType::WholeNumber(constraint) => match trimmed.parse::<f64>() {
            Ok(n) if n.fract() != 0.0 => invalid(rule, "whole number required"),
            Ok(n) if constraint.holds(n) => ValidationOutcome::Valid,
            Ok(_) => invalid(rule, "number out of allowed range"),
            Err(_) => invalid(rule, "not a valid number"),
        },

        ValidationType::Decimal(constraint) => match trimmed.parse::<f64>() {
            Ok(n) if constraint.holds(n) => ValidationOutcome::Valid,
            Ok(_) => invalid(rule, "number out of allowed range"),
            Err(_) => invalid(rule, "not a valid number"),
        },

        ValidationType::TextLength(constraint) => {
            let len = trimmed.chars().count() as f64;
            if constraint.holds(len) {
                ValidationOutcome::Valid
            } else {
                invalid(rule, "text length out of allowed range")
            }
        }

        ValidationType::Date(constraint) => match parse_iso_date(trimmed) {
            Some(serial) if constraint.holds(serial) => ValidationOutcome::Valid,
            Some(_) => invalid(rule, "date out of allowed range"),
            None => invalid(rule, "not a valid date (expected YYYY-MM-DD)"),
        },

        ValidationType::List(items) => {
            if items.iter().any(|item| item == trimmed) {
                ValidationOutcome::Valid
            } else {
                invalid(rule, "value not in the allowed list")
            }
        }

        ValidationType::Custom(formula) => {
            let lookup = ProposedLookup::new(trimmed);
            match evaluate_formula(formula, &lookup).to_bool() {
                Ok(true) => ValidationOutcome::Valid,
                Ok(false) => invalid(rule, "custom validation formula returned FALSE"),
                Err(e) => invalid(rule, &format!("custom validation formula failed: {}", e)),
            }
        }
    }
}

fn invalid(rule: &ValidationRule, default_message: &str) -> ValidationOutcome {
    ValidationOutcome::Invalid {
        severity: rule.severity,
        message: rule
            .message
            .clone()
            .unwrap_or_else(|| default_message.to_string()),
    }
}

/// Synthetic single-cell context for custom rules: the proposed value
/// sits at A1, every other cell reads as empty.
struct ProposedLookup {
    value: Value,
}

impl ProposedLookup {
    fn new(proposed: &str) -> Self {
        let value = match proposed.parse::<f64>() {
            Ok(n) => Value::Number(n),
            Err(_) => Value::Text(proposed.to_string()),
        };
        Self { value }
    }
}

impl CellLookup for ProposedLookup {
    fn value(&self, row: usize, col: usize) -> Value {
        if row == 0 && col == 0 {
            self.value.clone()
        } else {
            Value::Empty
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_any_value() {
        let rule = ValidationRule::new("r1", ValidationType::AnyValue);
        assert!(check("anything", &rule).is_valid());
    }

    #[test]
    fn test_whole_number_bounds() {
        let rule = ValidationRule::new(
            "r1",
            ValidationType::WholeNumber(NumericConstraint::between(1.0, 10.0)),
        );
        assert!(check("5", &rule).is_valid());
        assert!(check("1", &rule).is_valid());
        assert!(check("10", &rule).is_valid());
        assert!(!check("11", &rule).is_valid());
        assert!(!check("0", &rule).is_valid());
        assert!(!check("2.5", &rule).is_valid());
        assert!(!check("abc", &rule).is_valid());
    }

    #[test]
    fn test_decimal_operators() {
        let gt = ValidationRule::new(
            "r1",
            ValidationType::Decimal(NumericConstraint::greater_than(0.0)),
        );
        assert!(check("0.01", &gt).is_valid());
        assert!(!check("0", &gt).is_valid());
        assert!(!check("-1", &gt).is_valid());

        let eq = ValidationRule::new(
            "r2",
            ValidationType::Decimal(NumericConstraint::equal_to(3.5)),
        );
        assert!(check("3.5", &eq).is_valid());
        assert!(!check("3.6", &eq).is_valid());
    }

    #[test]
    fn test_text_length() {
        let rule = ValidationRule::new(
            "r1",
            ValidationType::TextLength(NumericConstraint::between(2.0, 4.0)),
        );
        assert!(check("ab", &rule).is_valid());
        assert!(check("abcd", &rule).is_valid());
        assert!(!check("a", &rule).is_valid());
        assert!(!check("abcde", &rule).is_valid());
    }

    #[test]
    fn test_date_range() {
        let rule =
            ValidationRule::date_between("r1", "2024-01-01", "2024-12-31").unwrap();
        assert!(check("2024-06-15", &rule).is_valid());
        assert!(check("2024-01-01", &rule).is_valid());
        assert!(!check("2023-12-31", &rule).is_valid());
        assert!(!check("2025-01-01", &rule).is_valid());
        assert!(!check("junk", &rule).is_valid());
    }

    #[test]
    fn test_list_membership_case_sensitive() {
        let rule = ValidationRule::new(
            "r1",
            ValidationType::List(vec!["Yes".to_string(), "No".to_string()]),
        );
        assert!(check("Yes", &rule).is_valid());
        assert!(!check("yes", &rule).is_valid());
        assert!(!check("Maybe", &rule).is_valid());
    }

    #[test]
    fn test_custom_formula() {
        // The proposed value is bound at A1.
        let rule = ValidationRule::new("r1", ValidationType::Custom("=A1>10".to_string()));
        assert!(check("11", &rule).is_valid());
        assert!(!check("10", &rule).is_valid());

        let rule = ValidationRule::new(
            "r2",
            ValidationType::Custom("=LEN(A1)<=3".to_string()),
        );
        assert!(check("abc", &rule).is_valid());
        assert!(!check("abcd", &rule).is_valid());
    }

    #[test]
    fn test_custom_formula_error_is_invalid() {
        let rule = ValidationRule::new("r1", ValidationType::Custom("=A1+".to_string()));
        match check("5", &rule) {
            ValidationOutcome::Invalid { message, .. } => {
                assert!(message.contains("custom validation"));
            }
            ValidationOutcome::Valid => panic!("broken formula must not validate"),
        }
    }

    #[test]
    fn test_blank_handling() {
        let rule = ValidationRule::new(
            "r1",
            ValidationType::WholeNumber(NumericConstraint::between(1.0, 10.0)),
        );
        assert!(check("", &rule).is_valid());
        assert!(check("   ", &rule).is_valid());

        let strict = rule.with_ignore_blank(false);
        assert!(!check("", &strict).is_valid());
    }

    #[test]
    fn test_severity_and_message_carried() {
        let rule = ValidationRule::new(
            "r1",
            ValidationType::List(vec!["a".to_string()]),
        )
        .with_severity(Severity::Warning)
        .with_message("pick something from the list");

        match check("b", &rule) {
            ValidationOutcome::Invalid { severity, message } => {
                assert_eq!(severity, Severity::Warning);
                assert_eq!(message, "pick something from the list");
            }
            ValidationOutcome::Valid => panic!("expected invalid"),
        }
    }

    #[test]
    fn test_rule_range_metadata() {
        let range = crate::cell_id::parse_ref("A1:A10").unwrap();
        let rule = ValidationRule::new("r1", ValidationType::AnyValue).with_range(range.clone());
        assert_eq!(rule.range, Some(range));
    }
}
