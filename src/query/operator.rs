use std::fmt;

use regex::Regex;
use strum::EnumString;

use crate::error::{Error, Result};
use crate::value::Value;

/// A comparison operator in a condition leaf.
///
/// Operators are parsed from their SQL-ish spelling; word operators are
/// case-insensitive. `=`/`===` are strict (identical representation type
/// and value), `==` and the ordinal family coerce numeric strings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumString)]
#[strum(ascii_case_insensitive)]
pub enum Operator {
    #[strum(serialize = "=", serialize = "===")]
    Eq,
    #[strum(serialize = "==")]
    LooseEq,
    #[strum(serialize = "<>", serialize = "!=")]
    NotEq,
    #[strum(serialize = "!==")]
    StrictNotEq,
    #[strum(serialize = "<")]
    Lt,
    #[strum(serialize = "<=")]
    Lte,
    #[strum(serialize = ">")]
    Gt,
    #[strum(serialize = ">=")]
    Gte,
    #[strum(serialize = "like")]
    Like,
    #[strum(serialize = "not like")]
    NotLike,
    #[strum(serialize = "ilike")]
    ILike,
    #[strum(serialize = "not ilike")]
    NotILike,
    #[strum(serialize = "between")]
    Between,
    #[strum(serialize = "not between")]
    NotBetween,
    #[strum(serialize = "in")]
    In,
    #[strum(serialize = "not in")]
    NotIn,
    #[strum(serialize = "isnull", serialize = "is null")]
    IsNull,
    #[strum(serialize = "isnotnull", serialize = "is not null")]
    IsNotNull,
    #[strum(serialize = "regex")]
    Regex,
    #[strum(serialize = "not regex")]
    NotRegex,
}

/// The right-hand side of a condition leaf. Most operators take one
/// value; `between` takes a range, `in` a list, the null tests nothing.
/// `Column` references another column of the same (merged) row, which is
/// how join conditions compare the two sides.
#[derive(Debug, Clone, PartialEq)]
pub enum Operand {
    None,
    Value(Value),
    Column(String),
    Range(Value, Value),
    List(Vec<Value>),
}

impl fmt::Display for Operand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operand::None => Ok(()),
            Operand::Value(v) => write!(f, "{}", v.to_literal()),
            Operand::Column(name) => f.write_str(name),
            Operand::Range(min, max) => {
                write!(f, "{} AND {}", min.to_literal(), max.to_literal())
            }
            Operand::List(values) => {
                let rendered: Vec<_> = values.iter().map(Value::to_literal).collect();
                write!(f, "({})", rendered.join(", "))
            }
        }
    }
}

impl Operator {
    /// Parses an operator from its spelling, failing with
    /// [`Error::OperatorNotFound`] on anything unknown.
    pub fn parse(spelling: &str) -> Result<Self> {
        spelling
            .parse()
            .map_err(|_| Error::OperatorNotFound(spelling.to_owned()))
    }

    /// The spelling used when rendering a query back to text.
    pub fn symbol(&self) -> &'static str {
        match self {
            Operator::Eq => "=",
            Operator::LooseEq => "==",
            Operator::NotEq => "<>",
            Operator::StrictNotEq => "!==",
            Operator::Lt => "<",
            Operator::Lte => "<=",
            Operator::Gt => ">",
            Operator::Gte => ">=",
            Operator::Like => "LIKE",
            Operator::NotLike => "NOT LIKE",
            Operator::ILike => "ILIKE",
            Operator::NotILike => "NOT ILIKE",
            Operator::Between => "BETWEEN",
            Operator::NotBetween => "NOT BETWEEN",
            Operator::In => "IN",
            Operator::NotIn => "NOT IN",
            Operator::IsNull => "IS NULL",
            Operator::IsNotNull => "IS NOT NULL",
            Operator::Regex => "REGEXP",
            Operator::NotRegex => "NOT REGEXP",
        }
    }

    /// Evaluates `value <op> operand`.
    pub fn matches(&self, value: &Value, operand: &Operand) -> Result<bool> {
        match self {
            Operator::Eq => Ok(value.strict_eq(self.single(operand)?)),
            Operator::StrictNotEq => Ok(!value.strict_eq(self.single(operand)?)),
            Operator::LooseEq => Ok(value.loose_eq(self.single(operand)?)),
            Operator::NotEq => Ok(!value.loose_eq(self.single(operand)?)),
            Operator::Lt => Ok(value.ordinal_cmp(self.single(operand)?).is_lt()),
            Operator::Lte => Ok(value.ordinal_cmp(self.single(operand)?).is_le()),
            Operator::Gt => Ok(value.ordinal_cmp(self.single(operand)?).is_gt()),
            Operator::Gte => Ok(value.ordinal_cmp(self.single(operand)?).is_ge()),
            Operator::Like => self.like(value, operand, false),
            Operator::NotLike => self.like(value, operand, false).map(|m| !m),
            Operator::ILike => self.like(value, operand, true),
            Operator::NotILike => self.like(value, operand, true).map(|m| !m),
            Operator::Between | Operator::NotBetween => {
                let Operand::Range(min, max) = operand else {
                    return Err(Error::Query(format!(
                        "Operator `{}` expects a range operand",
                        self.symbol()
                    )));
                };
                let inside = value.ordinal_cmp(min).is_ge() && value.ordinal_cmp(max).is_le();
                Ok(if *self == Operator::Between {
                    inside
                } else {
                    !inside
                })
            }
            Operator::In | Operator::NotIn => {
                let Operand::List(values) = operand else {
                    return Err(Error::Query(format!(
                        "Operator `{}` expects a list operand",
                        self.symbol()
                    )));
                };
                let member = values.iter().any(|candidate| value.loose_eq(candidate));
                Ok(if *self == Operator::In { member } else { !member })
            }
            Operator::IsNull => Ok(value.is_null()),
            Operator::IsNotNull => Ok(!value.is_null()),
            Operator::Regex | Operator::NotRegex => {
                let pattern = self.pattern(operand)?;
                let regex = Regex::new(&pattern).map_err(|e| {
                    Error::Query(format!("Invalid regular expression `{pattern}`: {e}"))
                })?;
                let matched = !value.is_null() && regex.is_match(&value.to_string());
                Ok(if *self == Operator::Regex {
                    matched
                } else {
                    !matched
                })
            }
        }
    }

    fn single<'a>(&self, operand: &'a Operand) -> Result<&'a Value> {
        match operand {
            Operand::Value(value) => Ok(value),
            _ => Err(Error::Query(format!(
                "Operator `{}` expects a single operand",
                self.symbol()
            ))),
        }
    }

    fn pattern(&self, operand: &Operand) -> Result<String> {
        match operand {
            Operand::Value(Value::Str(s)) => Ok(s.clone()),
            Operand::Value(other) => Ok(other.to_string()),
            _ => Err(Error::Query(format!(
                "Operator `{}` expects a pattern operand",
                self.symbol()
            ))),
        }
    }

    /// `%` matches any run of characters; the pattern is anchored to the
    /// full value and NULL never matches.
    fn like(&self, value: &Value, operand: &Operand, case_insensitive: bool) -> Result<bool> {
        if value.is_null() {
            return Ok(false);
        }
        let pattern = self.pattern(operand)?;
        let escaped: Vec<_> = pattern.split('%').map(regex::escape).collect();
        let body = escaped.join(".*");
        let anchored = if case_insensitive {
            format!("(?i)^{body}$")
        } else {
            format!("^{body}$")
        };
        let regex = Regex::new(&anchored).map_err(|e| {
            Error::Query(format!("Invalid LIKE pattern `{pattern}`: {e}"))
        })?;
        Ok(regex.is_match(&value.to_string()))
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn one(value: impl Into<Value>) -> Operand {
        Operand::Value(value.into())
    }

    #[test]
    fn test_parse_known_and_unknown() {
        assert_eq!(Operator::parse("=").unwrap(), Operator::Eq);
        assert_eq!(Operator::parse("===").unwrap(), Operator::Eq);
        assert_eq!(Operator::parse("NOT LIKE").unwrap(), Operator::NotLike);
        assert!(matches!(
            Operator::parse("=~"),
            Err(Error::OperatorNotFound(_))
        ));
    }

    #[test]
    fn test_strict_vs_loose_equality() {
        let id = Value::Int(1);
        assert!(!Operator::Eq.matches(&id, &one("1")).unwrap());
        assert!(Operator::Eq.matches(&id, &one(1)).unwrap());
        assert!(Operator::LooseEq.matches(&id, &one("1")).unwrap());
        assert!(Operator::LooseEq.matches(&id, &one(1.0)).unwrap());
    }

    #[test]
    fn test_strict_vs_loose_inequality() {
        let id = Value::Int(1);
        // Type never equal: always unequal under strict.
        assert!(Operator::StrictNotEq.matches(&id, &one("1")).unwrap());
        assert!(!Operator::StrictNotEq.matches(&id, &one(1)).unwrap());
        // Loose inequality coerces either way.
        assert!(!Operator::NotEq.matches(&id, &one("1")).unwrap());
        assert!(!Operator::NotEq.matches(&id, &one(1)).unwrap());
        assert!(Operator::NotEq.matches(&id, &one(2)).unwrap());
    }

    #[test]
    fn test_ordinal_operators() {
        let id = Value::Int(5);
        assert!(Operator::Lt.matches(&id, &one(6)).unwrap());
        assert!(Operator::Lte.matches(&id, &one(5)).unwrap());
        assert!(Operator::Gt.matches(&id, &one(4)).unwrap());
        assert!(Operator::Gte.matches(&id, &one("5")).unwrap());
    }

    #[test]
    fn test_like_is_anchored_and_case_sensitive() {
        let name = Value::Str("DUPOND".into());
        assert!(Operator::Like.matches(&name, &one("DUP%")).unwrap());
        assert!(Operator::Like.matches(&name, &one("%PON%")).unwrap());
        assert!(!Operator::Like.matches(&name, &one("DUP")).unwrap());
        assert!(!Operator::Like.matches(&name, &one("dup%")).unwrap());
        assert!(Operator::ILike.matches(&name, &one("dup%")).unwrap());
        assert!(Operator::NotLike.matches(&name, &one("MEYER%")).unwrap());
    }

    #[test]
    fn test_like_escapes_regex_metacharacters() {
        let label = Value::Str("a.c".into());
        assert!(Operator::Like.matches(&label, &one("a.c")).unwrap());
        assert!(!Operator::Like.matches(&Value::Str("abc".into()), &one("a.c")).unwrap());
    }

    #[test]
    fn test_between_inclusive() {
        let range = Operand::Range(Value::Int(1), Value::Int(4));
        assert!(Operator::Between.matches(&Value::Int(1), &range).unwrap());
        assert!(Operator::Between.matches(&Value::Int(4), &range).unwrap());
        assert!(!Operator::Between.matches(&Value::Int(5), &range).unwrap());
        assert!(Operator::NotBetween.matches(&Value::Int(5), &range).unwrap());
    }

    #[test]
    fn test_in_membership() {
        let list = Operand::List(vec![Value::Int(1), Value::Int(3)]);
        assert!(Operator::In.matches(&Value::Int(3), &list).unwrap());
        assert!(!Operator::In.matches(&Value::Int(2), &list).unwrap());
        assert!(Operator::NotIn.matches(&Value::Int(2), &list).unwrap());
    }

    #[test]
    fn test_null_tests() {
        assert!(Operator::IsNull.matches(&Value::Null, &Operand::None).unwrap());
        assert!(!Operator::IsNull.matches(&Value::Int(0), &Operand::None).unwrap());
        assert!(Operator::IsNotNull.matches(&Value::Int(0), &Operand::None).unwrap());
    }

    #[test]
    fn test_regex_is_unanchored() {
        let name = Value::Str("DUPOND".into());
        assert!(Operator::Regex.matches(&name, &one("UPO")).unwrap());
        assert!(Operator::Regex.matches(&name, &one("^DUP")).unwrap());
        assert!(Operator::NotRegex.matches(&name, &one("xyz")).unwrap());
        assert!(matches!(
            Operator::Regex.matches(&name, &one("(")),
            Err(Error::Query(_))
        ));
    }
}
