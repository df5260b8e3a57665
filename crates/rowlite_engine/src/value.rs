//! Dynamic scalar values stored in table cells.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// A dynamically typed scalar value.
///
/// Cells, bound statement arguments and projection results all carry this
/// type. Cross-class comparisons use numeric affinity: an `Integer` compares
/// equal to a `Text` holding the same number, so arguments bound as text
/// still match integer key columns.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    /// Absent value.
    Null,
    /// Signed integer (full i64 range).
    Integer(i64),
    /// Double-precision float.
    Real(f64),
    /// UTF-8 text.
    Text(String),
    /// Raw bytes.
    Blob(Vec<u8>),
}

impl Value {
    /// Check if this value is null.
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Get this value as an integer, if it is one.
    pub fn as_integer(&self) -> Option<i64> {
        match self {
            Value::Integer(n) => Some(*n),
            _ => None,
        }
    }

    /// Get this value as a float, if it is one.
    pub fn as_real(&self) -> Option<f64> {
        match self {
            Value::Real(f) => Some(*f),
            _ => None,
        }
    }

    /// Get this value as a string slice, if it is text.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Get this value as bytes, if it is a blob.
    pub fn as_blob(&self) -> Option<&[u8]> {
        match self {
            Value::Blob(b) => Some(b),
            _ => None,
        }
    }

    /// Coerce this value to an integer.
    ///
    /// Integers pass through, reals truncate, and text parses if it holds a
    /// number. Nulls and blobs yield `None`.
    pub fn coerce_i64(&self) -> Option<i64> {
        match self {
            Value::Integer(n) => Some(*n),
            #[allow(clippy::cast_possible_truncation)]
            Value::Real(f) => Some(*f as i64),
            Value::Text(s) => {
                let s = s.trim();
                s.parse::<i64>()
                    .ok()
                    .or_else(|| s.parse::<f64>().ok().map(|f| f as i64))
            }
            _ => None,
        }
    }

    /// Coerce this value to a float.
    pub fn coerce_f64(&self) -> Option<f64> {
        match self {
            #[allow(clippy::cast_precision_loss)]
            Value::Integer(n) => Some(*n as f64),
            Value::Real(f) => Some(*f),
            Value::Text(s) => s.trim().parse::<f64>().ok(),
            _ => None,
        }
    }

    /// Coerce this value to an owned string.
    ///
    /// Integers and reals format themselves; nulls and blobs yield `None`.
    pub fn coerce_string(&self) -> Option<String> {
        match self {
            Value::Integer(n) => Some(n.to_string()),
            Value::Real(f) => Some(f.to_string()),
            Value::Text(s) => Some(s.clone()),
            _ => None,
        }
    }

    /// The storage class name, used in diagnostics.
    pub fn storage_class(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Integer(_) => "integer",
            Value::Real(_) => "real",
            Value::Text(_) => "text",
            Value::Blob(_) => "blob",
        }
    }

    /// Compare two values with numeric affinity.
    ///
    /// Same-class values compare directly. An integer or real against text
    /// parses the text as a number. Nulls and any remaining cross-class pair
    /// (blob against anything else) are incomparable and return `None`,
    /// which predicates treat as "not a match".
    pub fn loose_cmp(&self, other: &Value) -> Option<Ordering> {
        match (self, other) {
            (Value::Null, _) | (_, Value::Null) => None,
            (Value::Integer(a), Value::Integer(b)) => Some(a.cmp(b)),
            (Value::Text(a), Value::Text(b)) => Some(a.cmp(b)),
            (Value::Blob(a), Value::Blob(b)) => Some(a.cmp(b)),
            (Value::Blob(_), _) | (_, Value::Blob(_)) => None,
            (a, b) => {
                let a = a.coerce_f64()?;
                let b = b.coerce_f64()?;
                a.partial_cmp(&b)
            }
        }
    }

    /// Check equality with numeric affinity.
    pub fn loose_eq(&self, other: &Value) -> bool {
        self.loose_cmp(other) == Some(Ordering::Equal)
    }

}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Integer(i64::from(b))
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Integer(n)
    }
}

impl From<i32> for Value {
    fn from(n: i32) -> Self {
        Value::Integer(i64::from(n))
    }
}

impl From<u32> for Value {
    fn from(n: u32) -> Self {
        Value::Integer(i64::from(n))
    }
}

impl From<f64> for Value {
    fn from(f: f64) -> Self {
        Value::Real(f)
    }
}

impl From<f32> for Value {
    fn from(f: f32) -> Self {
        Value::Real(f64::from(f))
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Text(s)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Text(s.to_string())
    }
}

impl From<Vec<u8>> for Value {
    fn from(b: Vec<u8>) -> Self {
        Value::Blob(b)
    }
}

impl From<&[u8]> for Value {
    fn from(b: &[u8]) -> Self {
        Value::Blob(b.to_vec())
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(opt: Option<T>) -> Self {
        match opt {
            Some(v) => v.into(),
            None => Value::Null,
        }
    }
}

impl std::fmt::Display for Value {
    /// Renders the value as a literal, for diagnostics. Text is
    /// single-quoted with embedded quotes doubled, blobs render as
    /// `X'..'` hex.
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Value::Null => f.write_str("NULL"),
            Value::Integer(n) => write!(f, "{n}"),
            Value::Real(x) => write!(f, "{x}"),
            Value::Text(s) => write!(f, "'{}'", s.replace('\'', "''")),
            Value::Blob(b) => {
                f.write_str("X'")?;
                for byte in b {
                    write!(f, "{byte:02X}")?;
                }
                f.write_str("'")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn accessors() {
        assert!(Value::Null.is_null());
        assert!(!Value::Integer(0).is_null());

        assert_eq!(Value::Integer(42).as_integer(), Some(42));
        assert_eq!(Value::Text("42".into()).as_integer(), None);
        assert_eq!(Value::Real(1.5).as_real(), Some(1.5));
        assert_eq!(Value::Text("hi".into()).as_text(), Some("hi"));
        assert_eq!(Value::Blob(vec![1, 2]).as_blob(), Some(&[1u8, 2][..]));
    }

    #[test]
    fn renders_as_literals() {
        assert_eq!(Value::Null.to_string(), "NULL");
        assert_eq!(Value::Integer(-3).to_string(), "-3");
        assert_eq!(Value::Text("o'clock".into()).to_string(), "'o''clock'");
        assert_eq!(Value::Blob(vec![0xAB, 0x01]).to_string(), "X'AB01'");
    }

    #[test]
    fn coercions() {
        assert_eq!(Value::Text("7".into()).coerce_i64(), Some(7));
        assert_eq!(Value::Text(" 7 ".into()).coerce_i64(), Some(7));
        assert_eq!(Value::Text("7.9".into()).coerce_i64(), Some(7));
        assert_eq!(Value::Real(7.9).coerce_i64(), Some(7));
        assert_eq!(Value::Text("x".into()).coerce_i64(), None);
        assert_eq!(Value::Null.coerce_i64(), None);

        assert_eq!(Value::Integer(2).coerce_f64(), Some(2.0));
        assert_eq!(Value::Text("2.5".into()).coerce_f64(), Some(2.5));

        assert_eq!(Value::Integer(3).coerce_string(), Some("3".to_string()));
        assert_eq!(Value::Blob(vec![1]).coerce_string(), None);
    }

    #[test]
    fn loose_comparison_affinity() {
        assert!(Value::Integer(1).loose_eq(&Value::Text("1".into())));
        assert!(Value::Text("1".into()).loose_eq(&Value::Integer(1)));
        assert!(Value::Integer(1).loose_eq(&Value::Real(1.0)));
        assert!(!Value::Integer(1).loose_eq(&Value::Text("2".into())));
        assert!(!Value::Integer(1).loose_eq(&Value::Text("one".into())));

        assert_eq!(
            Value::Integer(2).loose_cmp(&Value::Text("10".into())),
            Some(Ordering::Less)
        );
        assert_eq!(
            Value::Text("b".into()).loose_cmp(&Value::Text("a".into())),
            Some(Ordering::Greater)
        );
    }

    #[test]
    fn null_is_incomparable() {
        assert_eq!(Value::Null.loose_cmp(&Value::Null), None);
        assert_eq!(Value::Null.loose_cmp(&Value::Integer(0)), None);
        assert!(!Value::Null.loose_eq(&Value::Null));
    }

    #[test]
    fn blob_only_compares_to_blob() {
        assert!(Value::Blob(vec![1]).loose_eq(&Value::Blob(vec![1])));
        assert_eq!(Value::Blob(vec![1]).loose_cmp(&Value::Integer(1)), None);
        assert_eq!(Value::Blob(vec![1]).loose_cmp(&Value::Text("1".into())), None);
    }

    #[test]
    fn from_impls() {
        assert_eq!(Value::from(true), Value::Integer(1));
        assert_eq!(Value::from(42i64), Value::Integer(42));
        assert_eq!(Value::from(42i32), Value::Integer(42));
        assert_eq!(Value::from(1.5f64), Value::Real(1.5));
        assert_eq!(Value::from("hi"), Value::Text("hi".to_string()));
        assert_eq!(Value::from(vec![1u8, 2]), Value::Blob(vec![1, 2]));
        assert_eq!(Value::from(None::<i64>), Value::Null);
        assert_eq!(Value::from(Some(3i64)), Value::Integer(3));
    }

    proptest! {
        #[test]
        fn integer_text_affinity_round_trip(n in any::<i64>()) {
            let as_text = Value::Text(n.to_string());
            prop_assert!(Value::Integer(n).loose_eq(&as_text));
            prop_assert_eq!(as_text.coerce_i64(), Some(n));
        }

        #[test]
        fn loose_cmp_is_antisymmetric(a in any::<i64>(), b in any::<i64>()) {
            let va = Value::Integer(a);
            let vb = Value::Text(b.to_string());
            let forward = va.loose_cmp(&vb);
            let backward = vb.loose_cmp(&va);
            prop_assert_eq!(forward.map(Ordering::reverse), backward);
        }
    }
}
