//! Conversion of field values into transport-safe values.

use crate::domain::FieldValue;

/// Normalizes one field value. Never fails.
///
/// First match wins:
/// 1. errors become their message text
/// 2. self-serializing values (`Timestamp`, `Json`) pass through
/// 3. text-rendering values become the rendered string
/// 4. everything else passes through unchanged
pub fn normalize(value: &FieldValue) -> FieldValue {
    match value {
        FieldValue::Error(err) => FieldValue::String(err.to_string()),
        FieldValue::Timestamp(_) | FieldValue::Json(_) => value.clone(),
        FieldValue::Display(d) => FieldValue::String(d.to_string()),
        _ => value.clone(),
    }
}

/// Normalizes an owned value without cloning pass-through variants.
pub fn normalize_owned(value: FieldValue) -> FieldValue {
    match value {
        FieldValue::Error(err) => FieldValue::String(err.to_string()),
        FieldValue::Display(d) => FieldValue::String(d.to_string()),
        other => other,
    }
}
