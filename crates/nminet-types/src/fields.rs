//! Ordered key/value detail maps.
//!
//! Alarm payloads carry their parameters as a flat, ordered list of
//! string pairs so they can be rendered, compared and shipped unchanged.

/// A single field-value pair.
pub type FieldValue = (String, String);

/// Ordered detail map.
pub type FieldValues = Vec<FieldValue>;

/// Lookup by field name.
pub trait FieldValuesExt {
    /// Gets the value for a field, if present.
    fn get_field(&self, field: &str) -> Option<&str>;
}

impl FieldValuesExt for FieldValues {
    fn get_field(&self, field: &str) -> Option<&str> {
        self.iter()
            .find(|(f, _)| f == field)
            .map(|(_, v)| v.as_str())
    }
}
