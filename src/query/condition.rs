use std::fmt;

use crate::error::{Error, Result};
use crate::query::operator::{Operand, Operator};
use crate::value::{Row, Value};

/// The boolean connector tying a node to its previous sibling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Connector {
    And,
    Or,
}

impl fmt::Display for Connector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Connector::And => f.write_str("AND"),
            Connector::Or => f.write_str("OR"),
        }
    }
}

/// A node of a WHERE/JOIN predicate: either a leaf comparison or a group
/// of boolean-connected children.
#[derive(Debug, Clone, PartialEq)]
pub enum Condition {
    Leaf {
        column: String,
        operator: Operator,
        operand: Operand,
        negate: bool,
        connector: Connector,
    },
    Group {
        connector: Connector,
        negate: bool,
        children: Vec<Condition>,
    },
}

impl Condition {
    fn connector(&self) -> Connector {
        match self {
            Condition::Leaf { connector, .. } | Condition::Group { connector, .. } => *connector,
        }
    }

    /// Evaluates the node against a row.
    ///
    /// A leaf reads the referenced column (absent columns read as NULL;
    /// existence is validated once per execution, not here) and applies
    /// its operator. A group folds its children's results left to right
    /// through their connectors. The negate flag inverts the final
    /// result of the node.
    pub fn evaluate(&self, row: &Row) -> Result<bool> {
        let result = match self {
            Condition::Leaf {
                column,
                operator,
                operand,
                ..
            } => {
                let value = row.get(column).cloned().unwrap_or(Value::Null);
                // Column operands resolve against the same merged row.
                let resolved;
                let operand = match operand {
                    Operand::Column(other) => {
                        resolved =
                            Operand::Value(row.get(other).cloned().unwrap_or(Value::Null));
                        &resolved
                    }
                    other => other,
                };
                operator.matches(&value, operand)?
            }
            Condition::Group { children, .. } => {
                let mut iter = children.iter();
                let mut acc = match iter.next() {
                    Some(first) => first.evaluate(row)?,
                    None => true,
                };
                for child in iter {
                    let value = child.evaluate(row)?;
                    acc = match child.connector() {
                        Connector::And => acc && value,
                        Connector::Or => acc || value,
                    };
                }
                acc
            }
        };
        let negate = match self {
            Condition::Leaf { negate, .. } | Condition::Group { negate, .. } => *negate,
        };
        Ok(if negate { !result } else { result })
    }

    /// Collects every column the tree references, for the
    /// once-per-execution existence check.
    pub fn referenced_columns(&self, out: &mut Vec<String>) {
        match self {
            Condition::Leaf {
                column, operand, ..
            } => {
                if !out.contains(column) {
                    out.push(column.clone());
                }
                if let Operand::Column(other) = operand
                    && !out.contains(other)
                {
                    out.push(other.clone());
                }
            }
            Condition::Group { children, .. } => {
                for child in children {
                    child.referenced_columns(out);
                }
            }
        }
    }
}

impl fmt::Display for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Condition::Leaf {
                column,
                operator,
                operand,
                negate,
                ..
            } => {
                if *negate {
                    write!(f, "NOT ")?;
                }
                match operand {
                    Operand::None => write!(f, "{column} {operator}"),
                    _ => write!(f, "{column} {operator} {operand}"),
                }
            }
            Condition::Group {
                children, negate, ..
            } => {
                if *negate {
                    write!(f, "NOT ")?;
                }
                write!(f, "(")?;
                for (i, child) in children.iter().enumerate() {
                    if i > 0 {
                        write!(f, " {} ", child.connector())?;
                    }
                    write!(f, "{child}")?;
                }
                write!(f, ")")
            }
        }
    }
}

/// Fluent builder for condition trees.
///
/// Leaves are appended with an explicit connector and negation; nested
/// groups are declared through callbacks that receive a fresh owned
/// builder and hand it back:
///
/// ```
/// use reef_db::ConditionBuilder;
///
/// let builder = ConditionBuilder::new()
///     .where_("id", ">", 0)
///     .group(|g| g.where_("name", "like", "DUP%").or_where("name", "like", "MEY%"));
/// ```
///
/// An unknown operator spelling does not panic mid-chain; the error is
/// recorded and surfaces from the terminal call that consumes the tree.
#[derive(Debug, Default)]
pub struct ConditionBuilder {
    children: Vec<Condition>,
    error: Option<Error>,
}

impl ConditionBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.children.is_empty() && self.error.is_none()
    }

    fn push_leaf(
        mut self,
        connector: Connector,
        negate: bool,
        column: &str,
        operator: &str,
        operand: Operand,
    ) -> Self {
        match Operator::parse(operator) {
            Ok(operator) => self.children.push(Condition::Leaf {
                column: column.to_owned(),
                operator,
                operand,
                negate,
                connector,
            }),
            Err(error) => {
                if self.error.is_none() {
                    self.error = Some(error);
                }
            }
        }
        self
    }

    fn push_typed(
        mut self,
        connector: Connector,
        negate: bool,
        column: &str,
        operator: Operator,
        operand: Operand,
    ) -> Self {
        self.children.push(Condition::Leaf {
            column: column.to_owned(),
            operator,
            operand,
            negate,
            connector,
        });
        self
    }

    /// AND-connected comparison with a textual operator.
    pub fn where_(self, column: &str, operator: &str, value: impl Into<Value>) -> Self {
        self.push_leaf(
            Connector::And,
            false,
            column,
            operator,
            Operand::Value(value.into()),
        )
    }

    /// OR-connected comparison.
    pub fn or_where(self, column: &str, operator: &str, value: impl Into<Value>) -> Self {
        self.push_leaf(
            Connector::Or,
            false,
            column,
            operator,
            Operand::Value(value.into()),
        )
    }

    /// AND-connected, negated comparison.
    pub fn not_where(self, column: &str, operator: &str, value: impl Into<Value>) -> Self {
        self.push_leaf(
            Connector::And,
            true,
            column,
            operator,
            Operand::Value(value.into()),
        )
    }

    /// OR-connected, negated comparison.
    pub fn or_not_where(self, column: &str, operator: &str, value: impl Into<Value>) -> Self {
        self.push_leaf(
            Connector::Or,
            true,
            column,
            operator,
            Operand::Value(value.into()),
        )
    }

    /// AND-connected comparison between two columns of the same (merged)
    /// row; this is the shape join conditions take.
    pub fn where_column(self, column: &str, operator: &str, other: &str) -> Self {
        self.push_leaf(
            Connector::And,
            false,
            column,
            operator,
            Operand::Column(other.to_owned()),
        )
    }

    /// OR-connected column-to-column comparison.
    pub fn or_where_column(self, column: &str, operator: &str, other: &str) -> Self {
        self.push_leaf(
            Connector::Or,
            false,
            column,
            operator,
            Operand::Column(other.to_owned()),
        )
    }

    pub fn like(self, column: &str, pattern: &str) -> Self {
        self.push_typed(
            Connector::And,
            false,
            column,
            Operator::Like,
            Operand::Value(pattern.into()),
        )
    }

    pub fn not_like(self, column: &str, pattern: &str) -> Self {
        self.push_typed(
            Connector::And,
            false,
            column,
            Operator::NotLike,
            Operand::Value(pattern.into()),
        )
    }

    pub fn ilike(self, column: &str, pattern: &str) -> Self {
        self.push_typed(
            Connector::And,
            false,
            column,
            Operator::ILike,
            Operand::Value(pattern.into()),
        )
    }

    pub fn not_ilike(self, column: &str, pattern: &str) -> Self {
        self.push_typed(
            Connector::And,
            false,
            column,
            Operator::NotILike,
            Operand::Value(pattern.into()),
        )
    }

    /// Inclusive range test, `min <= column <= max`.
    pub fn between(self, column: &str, min: impl Into<Value>, max: impl Into<Value>) -> Self {
        self.push_typed(
            Connector::And,
            false,
            column,
            Operator::Between,
            Operand::Range(min.into(), max.into()),
        )
    }

    pub fn not_between(self, column: &str, min: impl Into<Value>, max: impl Into<Value>) -> Self {
        self.push_typed(
            Connector::And,
            false,
            column,
            Operator::NotBetween,
            Operand::Range(min.into(), max.into()),
        )
    }

    pub fn in_list(self, column: &str, values: impl IntoIterator<Item = Value>) -> Self {
        self.push_typed(
            Connector::And,
            false,
            column,
            Operator::In,
            Operand::List(values.into_iter().collect()),
        )
    }

    pub fn not_in_list(self, column: &str, values: impl IntoIterator<Item = Value>) -> Self {
        self.push_typed(
            Connector::And,
            false,
            column,
            Operator::NotIn,
            Operand::List(values.into_iter().collect()),
        )
    }

    pub fn is_null(self, column: &str) -> Self {
        self.push_typed(Connector::And, false, column, Operator::IsNull, Operand::None)
    }

    pub fn is_not_null(self, column: &str) -> Self {
        self.push_typed(
            Connector::And,
            false,
            column,
            Operator::IsNotNull,
            Operand::None,
        )
    }

    /// Unanchored regular-expression match.
    pub fn matches(self, column: &str, pattern: &str) -> Self {
        self.push_typed(
            Connector::And,
            false,
            column,
            Operator::Regex,
            Operand::Value(pattern.into()),
        )
    }

    pub fn not_matches(self, column: &str, pattern: &str) -> Self {
        self.push_typed(
            Connector::And,
            false,
            column,
            Operator::NotRegex,
            Operand::Value(pattern.into()),
        )
    }

    fn push_group(
        mut self,
        connector: Connector,
        negate: bool,
        build: impl FnOnce(ConditionBuilder) -> ConditionBuilder,
    ) -> Self {
        let inner = build(ConditionBuilder::new());
        if let Some(error) = inner.error {
            if self.error.is_none() {
                self.error = Some(error);
            }
            return self;
        }
        self.children.push(Condition::Group {
            connector,
            negate,
            children: inner.children,
        });
        self
    }

    /// AND-connected nested group.
    pub fn group(self, build: impl FnOnce(ConditionBuilder) -> ConditionBuilder) -> Self {
        self.push_group(Connector::And, false, build)
    }

    /// OR-connected nested group.
    pub fn or_group(self, build: impl FnOnce(ConditionBuilder) -> ConditionBuilder) -> Self {
        self.push_group(Connector::Or, false, build)
    }

    /// AND-connected, negated nested group.
    pub fn not_group(self, build: impl FnOnce(ConditionBuilder) -> ConditionBuilder) -> Self {
        self.push_group(Connector::And, true, build)
    }

    /// A rendering copy of the tree as built so far, ignoring any recorded
    /// error. Used to print queries inside diagnostics.
    pub(crate) fn snapshot(&self) -> Option<Condition> {
        if self.children.is_empty() {
            return None;
        }
        Some(Condition::Group {
            connector: Connector::And,
            negate: false,
            children: self.children.clone(),
        })
    }

    /// Finishes the tree: the root group, or `None` when no condition was
    /// declared. Surfaces the first builder error recorded mid-chain.
    pub fn build(self) -> Result<Option<Condition>> {
        if let Some(error) = self.error {
            return Err(error);
        }
        if self.children.is_empty() {
            return Ok(None);
        }
        Ok(Some(Condition::Group {
            connector: Connector::And,
            negate: false,
            children: self.children,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::row;

    fn build(builder: ConditionBuilder) -> Condition {
        builder.build().unwrap().unwrap()
    }

    #[test]
    fn test_leaf_evaluation() {
        let tree = build(ConditionBuilder::new().where_("id", "<", 1));
        assert!(tree.evaluate(&row! { "id" => 0 }).unwrap());
        assert!(!tree.evaluate(&row! { "id" => 1 }).unwrap());
    }

    #[test]
    fn test_connector_fold_left_to_right() {
        // id > 0 AND id < 5 OR name = 'MEYER'
        let tree = build(
            ConditionBuilder::new()
                .where_("id", ">", 0)
                .where_("id", "<", 5)
                .or_where("name", "=", "MEYER"),
        );
        assert!(tree.evaluate(&row! { "id" => 3, "name" => "X" }).unwrap());
        assert!(tree.evaluate(&row! { "id" => 9, "name" => "MEYER" }).unwrap());
        assert!(!tree.evaluate(&row! { "id" => 9, "name" => "X" }).unwrap());
    }

    #[test]
    fn test_nested_group() {
        // id >= 1 AND (name = 'DUPOND' OR name = 'MEYER')
        let tree = build(
            ConditionBuilder::new().where_("id", ">=", 1).group(|g| {
                g.where_("name", "=", "DUPOND").or_where("name", "=", "MEYER")
            }),
        );
        assert!(tree.evaluate(&row! { "id" => 1, "name" => "MEYER" }).unwrap());
        assert!(!tree.evaluate(&row! { "id" => 0, "name" => "MEYER" }).unwrap());
        assert!(!tree.evaluate(&row! { "id" => 1, "name" => "NOEL" }).unwrap());
    }

    #[test]
    fn test_negated_nodes() {
        let tree = build(ConditionBuilder::new().not_where("id", "=", 1));
        assert!(tree.evaluate(&row! { "id" => 2 }).unwrap());
        assert!(!tree.evaluate(&row! { "id" => 1 }).unwrap());

        let tree = build(
            ConditionBuilder::new()
                .not_group(|g| g.where_("id", "=", 1).or_where("id", "=", 2)),
        );
        assert!(tree.evaluate(&row! { "id" => 3 }).unwrap());
        assert!(!tree.evaluate(&row! { "id" => 2 }).unwrap());
    }

    #[test]
    fn test_column_operand_resolves_against_row() {
        let tree = build(ConditionBuilder::new().where_column("id", "==", "user_id"));
        assert!(tree.evaluate(&row! { "id" => 1, "user_id" => 1 }).unwrap());
        assert!(!tree.evaluate(&row! { "id" => 1, "user_id" => 2 }).unwrap());

        let mut columns = Vec::new();
        tree.referenced_columns(&mut columns);
        assert_eq!(columns, vec!["id", "user_id"]);
    }

    #[test]
    fn test_unknown_operator_surfaces_at_build() {
        let result = ConditionBuilder::new().where_("id", "=~", 1).build();
        assert!(matches!(result, Err(Error::OperatorNotFound(_))));
    }

    #[test]
    fn test_unknown_operator_inside_group_surfaces() {
        let result = ConditionBuilder::new()
            .group(|g| g.where_("id", "~~", 1))
            .build();
        assert!(matches!(result, Err(Error::OperatorNotFound(_))));
    }

    #[test]
    fn test_referenced_columns() {
        let tree = build(
            ConditionBuilder::new()
                .where_("id", ">", 0)
                .group(|g| g.is_null("name").or_where("id", "<", 9)),
        );
        let mut columns = Vec::new();
        tree.referenced_columns(&mut columns);
        assert_eq!(columns, vec!["id", "name"]);
    }

    #[test]
    fn test_empty_builder_builds_none() {
        assert!(ConditionBuilder::new().build().unwrap().is_none());
    }

    #[test]
    fn test_rendering() {
        let tree = build(
            ConditionBuilder::new()
                .where_("id", ">=", 1)
                .group(|g| g.like("name", "DUP%").or_where("name", "=", "MEYER"))
                .is_null("firstname"),
        );
        assert_eq!(
            tree.to_string(),
            "(id >= 1 AND (name LIKE 'DUP%' OR name = 'MEYER') AND firstname IS NULL)"
        );
    }
}
