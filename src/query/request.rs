use std::fmt;

use crate::error::Error;
use crate::query::condition::{Condition, ConditionBuilder};
use crate::value::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinKind {
    Left,
    Right,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnionKind {
    /// De-duplicates appended rows against the accumulated result.
    Simple,
    /// Keeps duplicates.
    All,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Asc,
    Desc,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Asc => f.write_str("ASC"),
            Direction::Desc => f.write_str("DESC"),
        }
    }
}

#[derive(Debug)]
pub(crate) struct Join {
    pub kind: JoinKind,
    pub table: String,
    pub condition: Condition,
}

#[derive(Debug)]
pub(crate) struct Union {
    pub request: Request,
    pub kind: UnionKind,
}

/// The mutation payload of a request, when it has one.
#[derive(Debug)]
pub(crate) enum Mutation {
    Insert {
        table: String,
        columns: Vec<String>,
        rows: Vec<Vec<Value>>,
    },
    Update {
        table: String,
        assignments: Vec<(String, Value)>,
    },
    Delete,
}

/// A query descriptor: everything one terminal execution needs.
///
/// Requests are assembled through the fluent methods below and consumed
/// exactly once by a terminal call ([`crate::Query::fetch`],
/// [`crate::Query::fetch_all`], [`crate::Query::lists`] or
/// [`crate::Query::execute`]). Builder mistakes (an unknown operator, a
/// `values` call outside an insert) do not panic mid-chain; the first one
/// is recorded and surfaces from the terminal call.
///
/// A standalone `Request` is the form sub-queries take inside
/// [`Request::union`]:
///
/// ```
/// use reef_db::Request;
///
/// let sub = Request::new().select(&["name"]).from("role");
/// let request = Request::new().select(&["name"]).from("user").union(sub);
/// assert_eq!(
///     request.to_string(),
///     "SELECT name FROM user UNION SELECT name FROM role;"
/// );
/// ```
#[derive(Debug, Default)]
pub struct Request {
    pub(crate) from: Option<String>,
    pub(crate) joins: Vec<Join>,
    pub(crate) unions: Vec<Union>,
    pub(crate) columns: Vec<String>,
    pub(crate) conditions: ConditionBuilder,
    pub(crate) order_by: Vec<(String, Direction)>,
    pub(crate) limit: Option<i64>,
    pub(crate) offset: i64,
    pub(crate) mutation: Option<Mutation>,
    pub(crate) error: Option<Error>,
}

impl Request {
    pub fn new() -> Self {
        Self::default()
    }

    fn record_error(&mut self, error: Error) {
        if self.error.is_none() {
            self.error = Some(error);
        }
    }

    /// Projects the result to the given columns. No call, or an empty
    /// list, selects every column.
    pub fn select(mut self, columns: &[&str]) -> Self {
        self.columns = columns.iter().map(|c| (*c).to_owned()).collect();
        self
    }

    /// Sets the source table.
    pub fn from(mut self, table: &str) -> Self {
        self.from = Some(table.to_owned());
        self
    }

    fn join(
        mut self,
        kind: JoinKind,
        table: &str,
        on: impl FnOnce(ConditionBuilder) -> ConditionBuilder,
    ) -> Self {
        match on(ConditionBuilder::new()).build() {
            Ok(Some(condition)) => self.joins.push(Join {
                kind,
                table: table.to_owned(),
                condition,
            }),
            Ok(None) => self.record_error(Error::Query(format!(
                "JOIN on `{table}` requires a condition"
            ))),
            Err(error) => self.record_error(error),
        }
        self
    }

    /// Left join: every current row is retained at least once, with the
    /// joined table's columns null-filled when nothing matches.
    pub fn left_join(
        self,
        table: &str,
        on: impl FnOnce(ConditionBuilder) -> ConditionBuilder,
    ) -> Self {
        self.join(JoinKind::Left, table, on)
    }

    /// Right join: symmetric retention for the joined table's rows.
    pub fn right_join(
        self,
        table: &str,
        on: impl FnOnce(ConditionBuilder) -> ConditionBuilder,
    ) -> Self {
        self.join(JoinKind::Right, table, on)
    }

    /// Appends a unioned sub-request; identical rows are de-duplicated.
    pub fn union(mut self, request: Request) -> Self {
        self.unions.push(Union {
            request,
            kind: UnionKind::Simple,
        });
        self
    }

    /// Appends a unioned sub-request, keeping duplicates.
    pub fn union_all(mut self, request: Request) -> Self {
        self.unions.push(Union {
            request,
            kind: UnionKind::All,
        });
        self
    }

    fn map_conditions(mut self, f: impl FnOnce(ConditionBuilder) -> ConditionBuilder) -> Self {
        self.conditions = f(std::mem::take(&mut self.conditions));
        self
    }

    pub fn where_(self, column: &str, operator: &str, value: impl Into<Value>) -> Self {
        self.map_conditions(|c| c.where_(column, operator, value))
    }

    pub fn or_where(self, column: &str, operator: &str, value: impl Into<Value>) -> Self {
        self.map_conditions(|c| c.or_where(column, operator, value))
    }

    pub fn not_where(self, column: &str, operator: &str, value: impl Into<Value>) -> Self {
        self.map_conditions(|c| c.not_where(column, operator, value))
    }

    pub fn or_not_where(self, column: &str, operator: &str, value: impl Into<Value>) -> Self {
        self.map_conditions(|c| c.or_not_where(column, operator, value))
    }

    pub fn where_column(self, column: &str, operator: &str, other: &str) -> Self {
        self.map_conditions(|c| c.where_column(column, operator, other))
    }

    pub fn or_where_column(self, column: &str, operator: &str, other: &str) -> Self {
        self.map_conditions(|c| c.or_where_column(column, operator, other))
    }

    pub fn like(self, column: &str, pattern: &str) -> Self {
        self.map_conditions(|c| c.like(column, pattern))
    }

    pub fn not_like(self, column: &str, pattern: &str) -> Self {
        self.map_conditions(|c| c.not_like(column, pattern))
    }

    pub fn ilike(self, column: &str, pattern: &str) -> Self {
        self.map_conditions(|c| c.ilike(column, pattern))
    }

    pub fn not_ilike(self, column: &str, pattern: &str) -> Self {
        self.map_conditions(|c| c.not_ilike(column, pattern))
    }

    pub fn between(self, column: &str, min: impl Into<Value>, max: impl Into<Value>) -> Self {
        self.map_conditions(|c| c.between(column, min, max))
    }

    pub fn not_between(self, column: &str, min: impl Into<Value>, max: impl Into<Value>) -> Self {
        self.map_conditions(|c| c.not_between(column, min, max))
    }

    pub fn in_list(self, column: &str, values: impl IntoIterator<Item = Value>) -> Self {
        self.map_conditions(|c| c.in_list(column, values))
    }

    pub fn not_in_list(self, column: &str, values: impl IntoIterator<Item = Value>) -> Self {
        self.map_conditions(|c| c.not_in_list(column, values))
    }

    pub fn is_null(self, column: &str) -> Self {
        self.map_conditions(|c| c.is_null(column))
    }

    pub fn is_not_null(self, column: &str) -> Self {
        self.map_conditions(|c| c.is_not_null(column))
    }

    pub fn matches(self, column: &str, pattern: &str) -> Self {
        self.map_conditions(|c| c.matches(column, pattern))
    }

    pub fn not_matches(self, column: &str, pattern: &str) -> Self {
        self.map_conditions(|c| c.not_matches(column, pattern))
    }

    pub fn group(self, build: impl FnOnce(ConditionBuilder) -> ConditionBuilder) -> Self {
        self.map_conditions(|c| c.group(build))
    }

    pub fn or_group(self, build: impl FnOnce(ConditionBuilder) -> ConditionBuilder) -> Self {
        self.map_conditions(|c| c.or_group(build))
    }

    pub fn not_group(self, build: impl FnOnce(ConditionBuilder) -> ConditionBuilder) -> Self {
        self.map_conditions(|c| c.not_group(build))
    }

    /// Adds an ordering key. Keys declared first take precedence; the
    /// sort is stable.
    pub fn order_by(mut self, column: &str, direction: Direction) -> Self {
        self.order_by.push((column.to_owned(), direction));
        self
    }

    /// Caps and offsets the result. Both values must be non-negative;
    /// a negative value fails the terminal call before any row is read.
    pub fn limit(mut self, limit: i64, offset: i64) -> Self {
        self.limit = Some(limit);
        self.offset = offset;
        self
    }

    /// Switches the request into INSERT mode.
    pub fn insert_into(mut self, table: &str, columns: &[&str]) -> Self {
        self.from = Some(table.to_owned());
        self.mutation = Some(Mutation::Insert {
            table: table.to_owned(),
            columns: columns.iter().map(|c| (*c).to_owned()).collect(),
            rows: Vec::new(),
        });
        self
    }

    /// Appends one VALUES row to an insert.
    pub fn values(mut self, row: Vec<Value>) -> Self {
        match &mut self.mutation {
            Some(Mutation::Insert { rows, .. }) => rows.push(row),
            _ => self.record_error(Error::BadFunction(
                "values() requires an insert context".to_owned(),
            )),
        }
        self
    }

    /// Switches the request into UPDATE mode.
    pub fn update(mut self, table: &str) -> Self {
        self.from = Some(table.to_owned());
        self.mutation = Some(Mutation::Update {
            table: table.to_owned(),
            assignments: Vec::new(),
        });
        self
    }

    /// Adds one assignment to an update.
    pub fn set(mut self, column: &str, value: impl Into<Value>) -> Self {
        match &mut self.mutation {
            Some(Mutation::Update { assignments, .. }) => {
                assignments.push((column.to_owned(), value.into()));
            }
            _ => self.record_error(Error::BadFunction(
                "set() requires an update context".to_owned(),
            )),
        }
        self
    }

    /// Switches the request into DELETE mode, removing the rows the
    /// condition tree matches from the source table.
    pub fn delete(mut self) -> Self {
        self.mutation = Some(Mutation::Delete);
        self
    }

    fn render_where(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(condition) = self.conditions.snapshot() {
            write!(f, " WHERE {condition}")?;
        }
        Ok(())
    }

    fn render_select(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let columns = if self.columns.is_empty() {
            "*".to_owned()
        } else {
            self.columns.join(", ")
        };
        write!(f, "SELECT {columns}")?;
        if let Some(from) = &self.from {
            write!(f, " FROM {from}")?;
        }
        for join in &self.joins {
            let kind = match join.kind {
                JoinKind::Left => "LEFT",
                JoinKind::Right => "RIGHT",
            };
            write!(f, " {kind} JOIN {} ON {}", join.table, join.condition)?;
        }
        self.render_where(f)?;
        for union in &self.unions {
            match union.kind {
                UnionKind::Simple => write!(f, " UNION ")?,
                UnionKind::All => write!(f, " UNION ALL ")?,
            }
            union.request.render(f)?;
        }
        if !self.order_by.is_empty() {
            let keys: Vec<_> = self
                .order_by
                .iter()
                .map(|(column, direction)| format!("{column} {direction}"))
                .collect();
            write!(f, " ORDER BY {}", keys.join(", "))?;
        }
        if let Some(limit) = self.limit {
            write!(f, " LIMIT {limit}")?;
            if self.offset != 0 {
                write!(f, " OFFSET {}", self.offset)?;
            }
        }
        Ok(())
    }

    fn render(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.mutation {
            None => self.render_select(f),
            Some(Mutation::Insert {
                table,
                columns,
                rows,
            }) => {
                write!(f, "INSERT INTO {table} ({})", columns.join(", "))?;
                write!(f, " VALUES ")?;
                for (i, row) in rows.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    let rendered: Vec<_> = row.iter().map(Value::to_literal).collect();
                    write!(f, "({})", rendered.join(", "))?;
                }
                Ok(())
            }
            Some(Mutation::Update { table, assignments }) => {
                write!(f, "UPDATE {table} SET ")?;
                for (i, (column, value)) in assignments.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{column} = {}", value.to_literal())?;
                }
                self.render_where(f)
            }
            Some(Mutation::Delete) => {
                write!(f, "DELETE FROM {}", self.from.as_deref().unwrap_or("?"))?;
                self.render_where(f)
            }
        }
    }
}

impl fmt::Display for Request {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.render(f)?;
        f.write_str(";")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_plain_select() {
        let request = Request::new().from("user");
        assert_eq!(request.to_string(), "SELECT * FROM user;");
    }

    #[test]
    fn test_render_full_select() {
        let request = Request::new()
            .select(&["id", "name"])
            .from("user")
            .left_join("user_role", |on| on.where_column("id", "==", "user_id"))
            .where_("id", ">", 0)
            .is_null("firstname")
            .order_by("name", Direction::Asc)
            .order_by("id", Direction::Desc)
            .limit(10, 5);
        assert_eq!(
            request.to_string(),
            "SELECT id, name FROM user \
             LEFT JOIN user_role ON (id == user_id) \
             WHERE (id > 0 AND firstname IS NULL) \
             ORDER BY name ASC, id DESC LIMIT 10 OFFSET 5;"
        );
    }

    #[test]
    fn test_render_union() {
        let sub = Request::new().select(&["label"]).from("role");
        let request = Request::new()
            .select(&["name"])
            .from("user")
            .union_all(sub);
        assert_eq!(
            request.to_string(),
            "SELECT name FROM user UNION ALL SELECT label FROM role;"
        );
    }

    #[test]
    fn test_render_insert() {
        let request = Request::new()
            .insert_into("user", &["name", "firstname"])
            .values(vec!["NOEL".into(), "Mathieu".into()])
            .values(vec!["DUPOND".into(), "Jean".into()]);
        assert_eq!(
            request.to_string(),
            "INSERT INTO user (name, firstname) VALUES ('NOEL', 'Mathieu'), ('DUPOND', 'Jean');"
        );
    }

    #[test]
    fn test_render_update_and_delete() {
        let update = Request::new()
            .update("user")
            .set("name", "MARTIN")
            .where_("id", "=", 2);
        assert_eq!(
            update.to_string(),
            "UPDATE user SET name = 'MARTIN' WHERE (id = 2);"
        );

        let delete = Request::new().from("user").between("id", 1, 4).delete();
        assert_eq!(
            delete.to_string(),
            "DELETE FROM user WHERE (id BETWEEN 1 AND 4);"
        );
    }

    #[test]
    fn test_values_outside_insert_records_error() {
        let request = Request::new().from("user").values(vec![Value::Int(1)]);
        assert!(matches!(request.error, Some(Error::BadFunction(_))));
    }

    #[test]
    fn test_join_without_condition_records_error() {
        let request = Request::new().from("user").left_join("role", |on| on);
        assert!(matches!(request.error, Some(Error::Query(_))));
    }
}
