use indexmap::IndexMap;

/// A single output row. Represented as an ordered `name -> String` map so
/// dynamically-shaped tables (audit events, document tabs) can carry a
/// column set that varies from call to call, while fixed-shape tables just
/// populate the same keys every time (SPEC_FULL.md §9).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Row(IndexMap<String, String>);

impl Row {
    pub fn new() -> Self {
        Self(IndexMap::new())
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) -> &mut Self {
        self.0.insert(key.into(), value.into());
        self
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    pub fn iter(&self) -> indexmap::map::Iter<'_, String, String> {
        self.0.iter()
    }

    /// Returns `true` if every named column is present and non-empty — the
    /// primary-key guard every normalizer applies before emitting a row.
    pub fn has_nonempty(&self, keys: &[&str]) -> bool {
        keys.iter()
            .all(|k| self.0.get(*k).is_some_and(|v| !v.is_empty()))
    }
}

impl IntoIterator for Row {
    type Item = (String, String);
    type IntoIter = indexmap::map::IntoIter<String, String>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

/// Coerces any JSON value to its string form the way the source API's string
/// casting does: strings pass through verbatim, other scalars use their
/// default display form, `null`/missing becomes empty, and composite values
/// fall back to their JSON text.
pub fn coerce_to_string(value: Option<&serde_json::Value>) -> String {
    match value {
        None | Some(serde_json::Value::Null) => String::new(),
        Some(serde_json::Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn has_nonempty_detects_missing_and_blank_columns() {
        let mut row = Row::new();
        row.insert("envelope_id", "E1").insert("recipient_id", "");
        assert!(!row.has_nonempty(&["envelope_id", "recipient_id"]));

        row.insert("recipient_id", "R1");
        assert!(row.has_nonempty(&["envelope_id", "recipient_id"]));
        assert!(!row.has_nonempty(&["envelope_id", "missing_id"]));
    }

    #[test]
    fn coerce_to_string_handles_scalars_and_missing() {
        assert_eq!(coerce_to_string(Some(&json!("hello"))), "hello");
        assert_eq!(coerce_to_string(Some(&json!(42))), "42");
        assert_eq!(coerce_to_string(Some(&json!(null))), "");
        assert_eq!(coerce_to_string(None), "");
    }
}
