use chrono::{Local, NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::value::Value;

/// Sentinel defaults for date columns, resolved to the current date or
/// datetime at the moment the default is read, not when it is declared.
pub const CURRENT_DATE: &str = "current_date";
pub const CURRENT_DATETIME: &str = "current_datetime";

const DATE_FORMAT: &str = "%Y-%m-%d";
const DATETIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// The closed set of column types.
///
/// Each type knows how to validate and normalize a candidate value, what
/// its default resolves to, and which other types it may be altered into.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldType {
    /// Engine-assigned, monotonically increasing integer. At most one per
    /// table.
    Increment,
    Int,
    Float,
    Bool,
    /// Fixed-length string; the bound is a maximum, not a pad width.
    Char(usize),
    /// Variable-length string with a maximum length.
    String(usize),
    /// Unbounded string.
    Text,
    /// Calendar date, normalized to `YYYY-MM-DD`.
    Date,
    /// Date and time, normalized to `YYYY-MM-DD HH:MM:SS`.
    DateTime,
}

impl FieldType {
    /// The `type` string used in persisted field records.
    pub fn name(&self) -> &'static str {
        match self {
            FieldType::Increment => "increments",
            FieldType::Int => "integer",
            FieldType::Float => "float",
            FieldType::Bool => "boolean",
            FieldType::Char(_) => "char",
            FieldType::String(_) => "string",
            FieldType::Text => "text",
            FieldType::Date => "date",
            FieldType::DateTime => "datetime",
        }
    }

    /// Rebuilds a type from its record form. Fails on unknown type strings
    /// so a corrupted schema record cannot be silently reinterpreted.
    pub fn from_name(name: &str, length: Option<usize>) -> Result<Self> {
        match name {
            "increments" => Ok(FieldType::Increment),
            "integer" => Ok(FieldType::Int),
            "float" => Ok(FieldType::Float),
            "boolean" => Ok(FieldType::Bool),
            "char" => Ok(FieldType::Char(length.unwrap_or(1))),
            "string" => Ok(FieldType::String(length.unwrap_or(255))),
            "text" => Ok(FieldType::Text),
            "date" => Ok(FieldType::Date),
            "datetime" => Ok(FieldType::DateTime),
            other => Err(Error::TableBuilder(format!(
                "Unknown field type `{other}`"
            ))),
        }
    }

    /// The length bound carried by Char/String types.
    pub fn length(&self) -> Option<usize> {
        match self {
            FieldType::Char(len) | FieldType::String(len) => Some(*len),
            _ => None,
        }
    }

    fn is_numeric_kind(&self) -> bool {
        matches!(
            self,
            FieldType::Increment | FieldType::Int | FieldType::Float
        )
    }

    fn is_date_kind(&self) -> bool {
        matches!(self, FieldType::Date | FieldType::DateTime | FieldType::Int)
    }

    /// Whether a column of this type may be altered to `target`.
    ///
    /// Same-kind transitions are always allowed (a length change on Char or
    /// String is a plain modify). Strings may only widen
    /// (Char -> Char/String/Text, String -> String/Text). Numeric types
    /// (Increment/Int/Float) interchange freely, as do date-like types
    /// (Date/DateTime/Int).
    pub fn can_modify_to(&self, target: &FieldType) -> bool {
        if self.name() == target.name() {
            return true;
        }
        match self {
            FieldType::Char(_) => matches!(
                target,
                FieldType::Char(_) | FieldType::String(_) | FieldType::Text
            ),
            FieldType::String(_) => matches!(target, FieldType::String(_) | FieldType::Text),
            _ => {
                (self.is_numeric_kind() && target.is_numeric_kind())
                    || (self.is_date_kind() && target.is_date_kind())
            }
        }
    }

    /// Validates a candidate value against this type, returning the
    /// normalized value to store.
    ///
    /// Integers coerce into Float columns; date strings are parsed and
    /// re-rendered in the column's fixed format; the `current_date` and
    /// `current_datetime` sentinels resolve to the present moment.
    pub fn validate(&self, column: &str, value: &Value) -> Result<Value> {
        match self {
            FieldType::Increment | FieldType::Int => match value {
                Value::Int(_) => Ok(value.clone()),
                other => Err(type_error(column, self, other)),
            },
            FieldType::Float => match value {
                Value::Float(_) => Ok(value.clone()),
                Value::Int(i) => Ok(Value::Float(*i as f64)),
                other => Err(type_error(column, self, other)),
            },
            FieldType::Bool => match value {
                Value::Bool(_) => Ok(value.clone()),
                other => Err(type_error(column, self, other)),
            },
            FieldType::Char(max) | FieldType::String(max) => match value {
                Value::Str(s) => {
                    if s.chars().count() <= *max {
                        Ok(value.clone())
                    } else {
                        Err(Error::ColumnsValue(format!(
                            "Column `{column}` accepts at most {max} characters, got {}",
                            s.chars().count()
                        )))
                    }
                }
                other => Err(type_error(column, self, other)),
            },
            FieldType::Text => match value {
                Value::Str(_) => Ok(value.clone()),
                other => Err(type_error(column, self, other)),
            },
            FieldType::Date => match value {
                Value::Str(s) if s == CURRENT_DATE => {
                    Ok(Value::Str(Local::now().format(DATE_FORMAT).to_string()))
                }
                Value::Str(s) => parse_date(s)
                    .map(|d| Value::Str(d.format(DATE_FORMAT).to_string()))
                    .ok_or_else(|| {
                        Error::ColumnsValue(format!(
                            "Column `{column}` expects a date, `{s}` is not one"
                        ))
                    }),
                other => Err(type_error(column, self, other)),
            },
            FieldType::DateTime => match value {
                Value::Str(s) if s == CURRENT_DATETIME => Ok(Value::Str(
                    Local::now().format(DATETIME_FORMAT).to_string(),
                )),
                Value::Str(s) => parse_datetime(s)
                    .map(|d| Value::Str(d.format(DATETIME_FORMAT).to_string()))
                    .ok_or_else(|| {
                        Error::ColumnsValue(format!(
                            "Column `{column}` expects a datetime, `{s}` is not one"
                        ))
                    }),
                other => Err(type_error(column, self, other)),
            },
        }
    }
}

impl std::fmt::Display for FieldType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

fn type_error(column: &str, expected: &FieldType, got: &Value) -> Error {
    Error::ColumnsValue(format!(
        "Column `{column}` expects a {} value, got {} ({got})",
        expected.name(),
        got.type_name()
    ))
}

fn parse_date(input: &str) -> Option<NaiveDate> {
    for format in [DATE_FORMAT, "%d/%m/%Y", "%d-%m-%Y"] {
        if let Ok(date) = NaiveDate::parse_from_str(input, format) {
            return Some(date);
        }
    }
    None
}

fn parse_datetime(input: &str) -> Option<NaiveDateTime> {
    for format in [DATETIME_FORMAT, "%Y-%m-%dT%H:%M:%S"] {
        if let Ok(datetime) = NaiveDateTime::parse_from_str(input, format) {
            return Some(datetime);
        }
    }
    // A bare date is accepted and lands on midnight.
    parse_date(input).and_then(|d| d.and_hms_opt(0, 0, 0))
}

/// The pending structural operation attached to a field during an
/// alteration. Freshly declared fields are `Create`.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum FieldOp {
    #[default]
    Create,
    Modify,
    Rename(String),
    Drop,
}

/// A typed column definition.
#[derive(Debug, Clone, PartialEq)]
pub struct Field {
    pub name: String,
    pub field_type: FieldType,
    pub nullable: bool,
    pub unsigned: bool,
    pub comment: Option<String>,
    pub default: Option<Value>,
    pub operation: FieldOp,
}

impl Field {
    pub fn new(name: impl Into<String>, field_type: FieldType) -> Self {
        Self {
            name: name.into(),
            field_type,
            nullable: false,
            unsigned: false,
            comment: None,
            default: None,
            operation: FieldOp::Create,
        }
    }

    pub fn nullable(mut self) -> Self {
        self.nullable = true;
        self
    }

    pub fn unsigned(mut self) -> Self {
        self.unsigned = true;
        self
    }

    pub fn comment(mut self, comment: impl Into<String>) -> Self {
        self.comment = Some(comment.into());
        self
    }

    /// Declares a default. The value is checked against the column type
    /// when the table is built, before anything is persisted.
    pub fn default_to(mut self, value: impl Into<Value>) -> Self {
        self.default = Some(value.into());
        self
    }

    /// Validates the declared default against the column type.
    ///
    /// Date sentinels pass through unresolved so they can be re-resolved
    /// every time the default is read.
    pub(crate) fn check_default(&self) -> Result<()> {
        let Some(default) = &self.default else {
            return Ok(());
        };
        if self.is_date_sentinel(default) {
            return Ok(());
        }
        self.field_type.validate(&self.name, default)?;
        Ok(())
    }

    fn is_date_sentinel(&self, value: &Value) -> bool {
        matches!(
            (&self.field_type, value),
            (FieldType::Date, Value::Str(s)) if s == CURRENT_DATE
        ) || matches!(
            (&self.field_type, value),
            (FieldType::DateTime, Value::Str(s)) if s == CURRENT_DATETIME
        )
    }

    /// Validates a candidate cell value for this column.
    pub fn validate_value(&self, value: &Value) -> Result<Value> {
        if value.is_null() {
            if self.nullable {
                return Ok(Value::Null);
            }
            return Err(Error::ColumnsValue(format!(
                "Column `{}` is not nullable",
                self.name
            )));
        }
        if self.unsigned
            && let Value::Int(i) = value
            && *i < 0
        {
            return Err(Error::ColumnsValue(format!(
                "Column `{}` is unsigned, got {i}",
                self.name
            )));
        }
        self.field_type.validate(&self.name, value)
    }

    /// Resolves the value a row gets for this column when none was
    /// supplied: the declared default (sentinels resolved now), NULL for a
    /// nullable column, otherwise a failure.
    pub fn default_value(&self) -> Result<Value> {
        match &self.default {
            Some(default) => self.field_type.validate(&self.name, default),
            None if self.nullable => Ok(Value::Null),
            None => Err(Error::ColumnsValue(format!(
                "Column `{}` is not nullable and has no default",
                self.name
            ))),
        }
    }

    /// The compact persisted form: only non-default keys are emitted.
    pub fn to_record(&self) -> FieldRecord {
        let (opt, to) = match &self.operation {
            FieldOp::Create | FieldOp::Modify => (None, None),
            FieldOp::Rename(to) => (Some("rename".to_owned()), Some(to.clone())),
            FieldOp::Drop => (Some("drop".to_owned()), None),
        };
        FieldRecord {
            field_type: self.field_type.name().to_owned(),
            nullable: self.nullable,
            unsigned: self.unsigned,
            comment: self.comment.clone(),
            default: self.default.clone(),
            length: self.field_type.length(),
            opt,
            to,
        }
    }

    /// Exact inverse of [`Field::to_record`].
    pub fn from_record(name: &str, record: &FieldRecord) -> Result<Self> {
        let field_type = FieldType::from_name(&record.field_type, record.length)?;
        let operation = match record.opt.as_deref() {
            None => FieldOp::Create,
            Some("drop") => FieldOp::Drop,
            Some("rename") => {
                let to = record.to.clone().ok_or_else(|| {
                    Error::TableBuilder(format!(
                        "Field `{name}` is marked for rename without a target name"
                    ))
                })?;
                FieldOp::Rename(to)
            }
            Some(other) => {
                return Err(Error::TableBuilder(format!(
                    "Unknown field operation `{other}` on `{name}`"
                )));
            }
        };
        Ok(Self {
            name: name.to_owned(),
            field_type,
            nullable: record.nullable,
            unsigned: record.unsigned,
            comment: record.comment.clone(),
            default: record.default.clone(),
            operation,
        })
    }
}

fn is_false(value: &bool) -> bool {
    !*value
}

/// Persisted form of a [`Field`], kept compact by skipping keys holding
/// their default value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldRecord {
    #[serde(rename = "type")]
    pub field_type: String,

    #[serde(default, skip_serializing_if = "is_false")]
    pub nullable: bool,

    #[serde(default, skip_serializing_if = "is_false")]
    pub unsigned: bool,

    #[serde(rename = "_comment", default, skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub length: Option<usize>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub opt: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub to: Option<String>,
}
