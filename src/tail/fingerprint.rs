// ABOUTME: Fingerprint engine - deterministic SHA-256 content hash of a row
// ABOUTME: Canonical encoding escapes separators so NULL never collides with real data

use sha2::{Digest, Sha256};
use std::fmt;

use super::row::{Row, Value};

const SEPARATOR: char = '|';
const ESCAPE: char = '\\';
const NULL_SENTINEL: &str = "\\N";

/// Fixed-length digest of a row's values in column order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Fingerprint([u8; 32]);

impl Fingerprint {
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for byte in &self.0 {
            write!(f, "{:02x}", byte)?;
        }
        Ok(())
    }
}

/// Render a row to the exact text that gets hashed.
///
/// Every value is written in its natural string form with `\` and `|` escaped;
/// NULL is written as `\N`. An escaped value can never start with a bare `\N`,
/// so a column holding the string `"NULL"` (or `"\N"`) stays distinct from a
/// true NULL, and a `|` inside a value cannot move a column boundary.
pub fn canonical_text(row: &Row) -> String {
    let mut out = String::new();
    for (idx, value) in row.values().iter().enumerate() {
        if idx > 0 {
            out.push(SEPARATOR);
        }
        push_value(&mut out, value);
    }
    out
}

fn push_value(out: &mut String, value: &Value) {
    if value.is_null() {
        out.push_str(NULL_SENTINEL);
        return;
    }
    for ch in value.to_string().chars() {
        if ch == ESCAPE || ch == SEPARATOR {
            out.push(ESCAPE);
        }
        out.push(ch);
    }
}

/// Compute the fingerprint of a row. Pure, no I/O.
pub fn fingerprint(row: &Row) -> Fingerprint {
    let mut hasher = Sha256::new();
    hasher.update(canonical_text(row).as_bytes());
    Fingerprint(hasher.finalize().into())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(values: Vec<Value>) -> Row {
        Row::new(values)
    }

    #[test]
    fn test_fingerprint_is_deterministic() {
        let r = row(vec![Value::I32(1), "alice".into(), Value::Null]);
        assert_eq!(fingerprint(&r), fingerprint(&r));
        assert_eq!(fingerprint(&r), fingerprint(&r.clone()));
    }

    #[test]
    fn test_identical_values_share_fingerprint() {
        let a = row(vec![Value::I64(7), "x".into()]);
        let b = row(vec![Value::I64(7), "x".into()]);
        assert_eq!(fingerprint(&a), fingerprint(&b));
    }

    #[test]
    fn test_single_value_change_changes_fingerprint() {
        let a = row(vec![Value::I64(7), "x".into(), Value::Bool(true)]);
        let b = row(vec![Value::I64(7), "y".into(), Value::Bool(true)]);
        let c = row(vec![Value::I64(8), "x".into(), Value::Bool(true)]);
        assert_ne!(fingerprint(&a), fingerprint(&b));
        assert_ne!(fingerprint(&a), fingerprint(&c));
    }

    #[test]
    fn test_null_differs_from_null_string() {
        let real_null = row(vec![Value::I32(1), Value::Null]);
        let null_text = row(vec![Value::I32(1), "NULL".into()]);
        let sentinel_text = row(vec![Value::I32(1), "\\N".into()]);
        assert_ne!(fingerprint(&real_null), fingerprint(&null_text));
        assert_ne!(fingerprint(&real_null), fingerprint(&sentinel_text));
    }

    #[test]
    fn test_null_differs_from_empty_string() {
        let a = row(vec![Value::Null]);
        let b = row(vec![Value::Text(String::new())]);
        assert_ne!(fingerprint(&a), fingerprint(&b));
    }

    #[test]
    fn test_separator_inside_value_does_not_shift_columns() {
        let a = row(vec!["a|b".into(), "c".into()]);
        let b = row(vec!["a".into(), "b|c".into()]);
        assert_ne!(fingerprint(&a), fingerprint(&b));
        assert_eq!(canonical_text(&a), "a\\|b|c");
    }

    #[test]
    fn test_column_order_matters() {
        let a = row(vec!["1".into(), "2".into()]);
        let b = row(vec!["2".into(), "1".into()]);
        assert_ne!(fingerprint(&a), fingerprint(&b));
    }

    #[test]
    fn test_fingerprint_hex_display() {
        let hex = fingerprint(&row(vec![])).to_string();
        assert_eq!(hex.len(), 64);
        // SHA-256 of the empty string
        assert_eq!(
            hex,
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }
}
