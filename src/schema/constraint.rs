//! Reusable field constraints

use regex::Regex;
use serde_json::{json, Map, Value as JsonValue};

use crate::error::SchemaValidationError;

/// A check applied to a value after its type tag has been verified
///
/// Constraints that do not apply to the value's JSON type pass silently, so
/// a `Length` on a nullable string does not trip on numbers.
#[derive(Debug, Clone)]
pub enum Constraint {
    /// Character count for strings, item count for arrays
    Length { min: Option<usize>, max: Option<usize> },
    /// Inclusive numeric bounds
    Range { min: Option<f64>, max: Option<f64> },
    /// String must match the expression
    Pattern(Regex),
    /// Value must equal one of the listed values
    AllowedValues(Vec<JsonValue>),
}

impl Constraint {
    pub fn max_length(max: usize) -> Self {
        Constraint::Length { min: None, max: Some(max) }
    }

    pub fn length(min: usize, max: usize) -> Self {
        Constraint::Length { min: Some(min), max: Some(max) }
    }

    pub fn range(min: f64, max: f64) -> Self {
        Constraint::Range { min: Some(min), max: Some(max) }
    }

    /// Compile a pattern constraint
    pub fn pattern(expr: &str) -> Result<Self, regex::Error> {
        Regex::new(expr).map(Constraint::Pattern)
    }

    pub fn allowed<I, V>(values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<JsonValue>,
    {
        Constraint::AllowedValues(values.into_iter().map(Into::into).collect())
    }

    /// Check a value, reporting violations against `path`
    pub fn check(&self, value: &JsonValue, path: &str) -> Result<(), SchemaValidationError> {
        let violation = |message: String| SchemaValidationError::ConstraintViolation {
            path: path.to_string(),
            message,
        };

        match self {
            Constraint::Length { min, max } => {
                let len = match value {
                    JsonValue::String(s) => s.chars().count(),
                    JsonValue::Array(items) => items.len(),
                    _ => return Ok(()),
                };
                if let Some(min) = min {
                    if len < *min {
                        return Err(violation(format!("length {} is below minimum {}", len, min)));
                    }
                }
                if let Some(max) = max {
                    if len > *max {
                        return Err(violation(format!("length {} exceeds maximum {}", len, max)));
                    }
                }
                Ok(())
            }
            Constraint::Range { min, max } => {
                let Some(n) = value.as_f64() else {
                    return Ok(());
                };
                if let Some(min) = min {
                    if n < *min {
                        return Err(violation(format!("{} is below minimum {}", n, min)));
                    }
                }
                if let Some(max) = max {
                    if n > *max {
                        return Err(violation(format!("{} exceeds maximum {}", n, max)));
                    }
                }
                Ok(())
            }
            Constraint::Pattern(regex) => match value.as_str() {
                Some(s) if !regex.is_match(s) => Err(violation(format!(
                    "'{}' does not match pattern {}",
                    s,
                    regex.as_str()
                ))),
                _ => Ok(()),
            },
            Constraint::AllowedValues(allowed) => {
                if allowed.contains(value) {
                    Ok(())
                } else {
                    Err(violation(format!(
                        "{} is not one of {}",
                        value,
                        JsonValue::from(allowed.clone())
                    )))
                }
            }
        }
    }

    /// Add the JSON Schema keywords for this constraint to `target`
    pub(crate) fn export(&self, target: &mut Map<String, JsonValue>, is_array: bool) {
        match self {
            Constraint::Length { min, max } => {
                let (min_key, max_key) = if is_array {
                    ("minItems", "maxItems")
                } else {
                    ("minLength", "maxLength")
                };
                if let Some(min) = min {
                    target.insert(min_key.to_string(), json!(min));
                }
                if let Some(max) = max {
                    target.insert(max_key.to_string(), json!(max));
                }
            }
            Constraint::Range { min, max } => {
                if let Some(min) = min {
                    target.insert("minimum".to_string(), json!(min));
                }
                if let Some(max) = max {
                    target.insert("maximum".to_string(), json!(max));
                }
            }
            Constraint::Pattern(regex) => {
                target.insert("pattern".to_string(), json!(regex.as_str()));
            }
            Constraint::AllowedValues(allowed) => {
                target.insert("enum".to_string(), JsonValue::from(allowed.clone()));
            }
        }
    }
}
