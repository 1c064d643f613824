//! Typed flow records

use serde::{Deserialize, Serialize};

use crate::schema::normalize_label;

/// Parse a numeric cell.
///
/// Empty cells and NaN/infinity spellings come back as non-finite values; text
/// that is not a number at all yields `None`.
pub fn parse_numeric(cell: &str) -> Option<f64> {
    let cell = cell.trim();
    if cell.is_empty() {
        return Some(f64::NAN);
    }
    cell.parse::<f64>().ok()
}

/// Normalize a categorical cell; empty cells have no value
pub fn parse_categorical(cell: &str) -> Option<String> {
    let cell = cell.trim();
    if cell.is_empty() {
        None
    } else {
        Some(cell.to_string())
    }
}

/// One observed flow, with fields laid out in schema order
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlowRecord {
    /// Numeric fields in schema order; may be non-finite
    numeric: Vec<f64>,

    /// Categorical fields in schema order; `None` for an empty cell
    categorical: Vec<Option<String>>,

    /// Raw label, if the source carried one
    label: Option<String>,
}

impl FlowRecord {
    /// Create a record. Field counts must match the schema it is used with.
    pub fn new(numeric: Vec<f64>, categorical: Vec<Option<String>>, label: Option<String>) -> Self {
        Self {
            numeric,
            categorical,
            label,
        }
    }

    /// Numeric fields in schema order
    pub fn numeric(&self) -> &[f64] {
        &self.numeric
    }

    /// Categorical fields in schema order
    pub fn categorical(&self) -> &[Option<String>] {
        &self.categorical
    }

    /// Raw label
    pub fn label(&self) -> Option<&str> {
        self.label.as_deref()
    }

    /// Trimmed, lowercased label
    pub fn normalized_label(&self) -> Option<String> {
        self.label.as_deref().map(normalize_label)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test_case("12.5", Some(12.5) ; "plain")]
    #[test_case(" 3 ", Some(3.0) ; "padded")]
    #[test_case("-7e2", Some(-700.0) ; "exponent")]
    #[test_case("abc", None ; "text")]
    fn numeric_cells(cell: &str, expected: Option<f64>) {
        assert_eq!(parse_numeric(cell), expected);
    }

    #[test_case("" ; "empty")]
    #[test_case("NaN" ; "nan")]
    #[test_case("Infinity" ; "infinity")]
    #[test_case("-inf" ; "negative inf")]
    fn non_finite_cells(cell: &str) {
        let value = parse_numeric(cell).unwrap();
        assert!(!value.is_finite());
    }

    #[test]
    fn categorical_cells() {
        assert_eq!(parse_categorical(" 1 "), Some("1".to_string()));
        assert_eq!(parse_categorical("  "), None);
    }

    #[test]
    fn label_is_normalized_on_request() {
        let record = FlowRecord::new(vec![1.0], vec![None], Some(" PortScan ".into()));
        assert_eq!(record.label(), Some(" PortScan "));
        assert_eq!(record.normalized_label().as_deref(), Some("portscan"));
    }
}
