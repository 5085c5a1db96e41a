use std::cmp::Ordering;
use std::fmt;

use serde::de::{MapAccess, Visitor};
use serde::ser::{SerializeMap, Serializer};
use serde::{Deserialize, Deserializer, Serialize};

/// A scalar value stored in a table cell.
///
/// Values are self-describing: a cell knows whether it holds an integer,
/// a float, a boolean, a string or NULL, independently of the column
/// definition it was validated against.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// Absence of data. Only valid in nullable columns.
    Null,

    /// A boolean value (true/false).
    Bool(bool),

    /// A 64-bit signed integer value.
    Int(i64),

    /// A 64-bit floating point number.
    Float(f64),

    /// A UTF-8 text string.
    Str(String),
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "NULL"),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Int(i) => write!(f, "{}", i),
            Value::Float(fl) => write!(f, "{}", fl),
            Value::Str(s) => write!(f, "{}", s),
        }
    }
}

impl Value {
    /// Returns a short name for the value's representation type,
    /// used in error messages.
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "boolean",
            Value::Int(_) => "integer",
            Value::Float(_) => "float",
            Value::Str(_) => "string",
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// The numeric reading of this value, if it has one.
    ///
    /// Integers and floats are numeric; so are strings that parse as a
    /// number (the coercion the loose comparison family relies on).
    /// Booleans and NULL have no numeric reading.
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Value::Int(i) => Some(*i as f64),
            Value::Float(f) => Some(*f),
            Value::Str(s) => s.trim().parse::<f64>().ok(),
            _ => None,
        }
    }

    /// Strict equality: identical representation type and identical value.
    ///
    /// `Int(1)` is not strictly equal to `Float(1.0)` or `Str("1")`.
    pub fn strict_eq(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => a == b,
            (Value::Str(a), Value::Str(b)) => a == b,
            _ => false,
        }
    }

    /// Loose equality: values with a numeric reading compare numerically,
    /// so `Int(1)`, `Float(1.0)` and `Str("1")` are all loosely equal.
    /// Everything else falls back to plain value equality.
    pub fn loose_eq(&self, other: &Value) -> bool {
        if let (Some(a), Some(b)) = (self.as_number(), other.as_number()) {
            return a == b;
        }
        self.strict_eq(other)
    }

    /// Ordinal comparison used by the `<`/`<=`/`>`/`>=`/`between` operators
    /// and by ORDER BY.
    ///
    /// NULL is the minimal value. Two values with a numeric reading compare
    /// numerically; everything else compares lexicographically on the
    /// rendered string form.
    pub fn ordinal_cmp(&self, other: &Value) -> Ordering {
        match (self, other) {
            (Value::Null, Value::Null) => Ordering::Equal,
            (Value::Null, _) => Ordering::Less,
            (_, Value::Null) => Ordering::Greater,
            _ => {
                if let (Some(a), Some(b)) = (self.as_number(), other.as_number()) {
                    a.total_cmp(&b)
                } else {
                    self.to_string().cmp(&other.to_string())
                }
            }
        }
    }

    /// Renders the value as a SQL-ish literal for query diagnostics.
    /// Strings are single-quoted; everything else uses the plain form.
    pub fn to_literal(&self) -> String {
        match self {
            Value::Str(s) => format!("'{}'", s),
            other => other.to_string(),
        }
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Int(v as i64)
    }
}

impl From<u64> for Value {
    fn from(v: u64) -> Self {
        Value::Int(v as i64)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Str(v.to_owned())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Str(v)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        match v {
            Some(v) => v.into(),
            None => Value::Null,
        }
    }
}

impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Value::Null => serializer.serialize_none(),
            Value::Bool(b) => serializer.serialize_bool(*b),
            Value::Int(i) => serializer.serialize_i64(*i),
            Value::Float(f) => serializer.serialize_f64(*f),
            Value::Str(s) => serializer.serialize_str(s),
        }
    }
}

impl<'de> Deserialize<'de> for Value {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct ValueVisitor;

        impl<'de> Visitor<'de> for ValueVisitor {
            type Value = Value;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a scalar value (null, bool, number or string)")
            }

            fn visit_bool<E>(self, v: bool) -> Result<Value, E> {
                Ok(Value::Bool(v))
            }

            fn visit_i64<E>(self, v: i64) -> Result<Value, E> {
                Ok(Value::Int(v))
            }

            fn visit_u64<E>(self, v: u64) -> Result<Value, E> {
                Ok(Value::Int(v as i64))
            }

            fn visit_f64<E>(self, v: f64) -> Result<Value, E> {
                Ok(Value::Float(v))
            }

            fn visit_str<E>(self, v: &str) -> Result<Value, E> {
                Ok(Value::Str(v.to_owned()))
            }

            fn visit_string<E>(self, v: String) -> Result<Value, E> {
                Ok(Value::Str(v))
            }

            fn visit_none<E>(self) -> Result<Value, E> {
                Ok(Value::Null)
            }

            fn visit_unit<E>(self) -> Result<Value, E> {
                Ok(Value::Null)
            }
        }

        deserializer.deserialize_any(ValueVisitor)
    }
}

/// A row of data: an ordered map of column name to value.
///
/// Rows are self-describing rather than positional because joins merge
/// columns from several tables into one row and alterations add, drop and
/// rename columns; keeping the names with the values makes both
/// reshape-operations direct.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Row {
    entries: Vec<(String, Value)>,
}

impl Row {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, column: &str) -> bool {
        self.entries.iter().any(|(name, _)| name == column)
    }

    pub fn get(&self, column: &str) -> Option<&Value> {
        self.entries
            .iter()
            .find(|(name, _)| name == column)
            .map(|(_, value)| value)
    }

    /// Sets a column's value, replacing an existing entry in place or
    /// appending a new one at the end of the row.
    pub fn set(&mut self, column: impl Into<String>, value: Value) {
        let column = column.into();
        match self.entries.iter_mut().find(|(name, _)| *name == column) {
            Some((_, slot)) => *slot = value,
            None => self.entries.push((column, value)),
        }
    }

    pub fn remove(&mut self, column: &str) -> Option<Value> {
        let index = self.entries.iter().position(|(name, _)| name == column)?;
        Some(self.entries.remove(index).1)
    }

    /// Renames a column in place, keeping its position and value.
    pub fn rename(&mut self, from: &str, to: &str) {
        if let Some((name, _)) = self.entries.iter_mut().find(|(name, _)| name == from) {
            *name = to.to_owned();
        }
    }

    pub fn columns(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(name, _)| name.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.entries.iter().map(|(name, value)| (name.as_str(), value))
    }
}

impl FromIterator<(String, Value)> for Row {
    fn from_iter<I: IntoIterator<Item = (String, Value)>>(iter: I) -> Self {
        let mut row = Row::new();
        for (column, value) in iter {
            row.set(column, value);
        }
        row
    }
}

impl Serialize for Row {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (name, value) in &self.entries {
            map.serialize_entry(name, value)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for Row {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct RowVisitor;

        impl<'de> Visitor<'de> for RowVisitor {
            type Value = Row;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a map of column name to scalar value")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<Row, A::Error> {
                let mut row = Row::new();
                while let Some((name, value)) = access.next_entry::<String, Value>()? {
                    row.set(name, value);
                }
                Ok(row)
            }
        }

        deserializer.deserialize_map(RowVisitor)
    }
}

/// Builds a [`Row`] from `column => value` pairs, in order.
#[macro_export]
macro_rules! row {
    ($($column:expr => $value:expr),* $(,)?) => {{
        let mut row = $crate::Row::new();
        $(row.set($column, $crate::Value::from($value));)*
        row
    }};
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strict_eq_distinguishes_types() {
        assert!(Value::Int(1).strict_eq(&Value::Int(1)));
        assert!(!Value::Int(1).strict_eq(&Value::Str("1".into())));
        assert!(!Value::Int(1).strict_eq(&Value::Float(1.0)));
        assert!(Value::Null.strict_eq(&Value::Null));
    }

    #[test]
    fn test_loose_eq_coerces_numeric_strings() {
        assert!(Value::Int(1).loose_eq(&Value::Str("1".into())));
        assert!(Value::Int(1).loose_eq(&Value::Float(1.0)));
        assert!(Value::Str("1.5".into()).loose_eq(&Value::Float(1.5)));
        assert!(!Value::Int(1).loose_eq(&Value::Str("one".into())));
        assert!(Value::Null.loose_eq(&Value::Null));
        assert!(!Value::Null.loose_eq(&Value::Int(0)));
    }

    #[test]
    fn test_ordinal_cmp_null_is_minimal() {
        assert_eq!(Value::Null.ordinal_cmp(&Value::Int(-100)), Ordering::Less);
        assert_eq!(
            Value::Str("Eva".into()).ordinal_cmp(&Value::Null),
            Ordering::Greater
        );
        assert_eq!(Value::Null.ordinal_cmp(&Value::Null), Ordering::Equal);
    }

    #[test]
    fn test_ordinal_cmp_numeric_and_lexicographic() {
        assert_eq!(Value::Int(2).ordinal_cmp(&Value::Int(10)), Ordering::Less);
        assert_eq!(
            Value::Str("2".into()).ordinal_cmp(&Value::Int(10)),
            Ordering::Less
        );
        // No numeric reading on either side: string compare ("10" < "9").
        assert_eq!(
            Value::Str("10a".into()).ordinal_cmp(&Value::Str("9a".into())),
            Ordering::Less
        );
    }

    #[test]
    fn test_row_preserves_insertion_order() {
        let row = row! { "id" => 1, "name" => "NOEL", "firstname" => "Mathieu" };
        let columns: Vec<_> = row.columns().collect();
        assert_eq!(columns, vec!["id", "name", "firstname"]);
    }

    #[test]
    fn test_row_set_replaces_in_place() {
        let mut row = row! { "id" => 1, "name" => "NOEL" };
        row.set("id", Value::Int(2));
        assert_eq!(row.get("id"), Some(&Value::Int(2)));
        assert_eq!(row.columns().collect::<Vec<_>>(), vec!["id", "name"]);
    }

    #[test]
    fn test_row_rename_keeps_position() {
        let mut row = row! { "id" => 1, "name" => "NOEL" };
        row.rename("name", "lastname");
        assert_eq!(row.columns().collect::<Vec<_>>(), vec!["id", "lastname"]);
        assert_eq!(row.get("lastname"), Some(&Value::Str("NOEL".into())));
    }

    #[test]
    fn test_row_json_round_trip() {
        let row = row! { "id" => 1, "rate" => 0.5, "active" => true, "note" => Value::Null };
        let json = serde_json::to_string(&row).unwrap();
        let back: Row = serde_json::from_str(&json).unwrap();
        assert_eq!(row, back);
    }
}
