use std::cmp::Ordering;

use crate::error::{Error, Result};
use crate::query::condition::{Condition, ConditionBuilder};
use crate::query::request::{Direction, JoinKind, Mutation, Request, UnionKind};
use crate::schema::Schema;
use crate::value::{Row, Value};

/// A [`Request`] bound to the schema that will execute it.
///
/// `Query` exposes the same fluent surface as `Request` through thin
/// forwarding methods plus the terminal calls; each terminal consumes the
/// query, so a request never runs twice.
#[derive(Debug)]
pub struct Query<'a> {
    schema: &'a Schema,
    request: Request,
}

impl<'a> Query<'a> {
    pub(crate) fn new(schema: &'a Schema, request: Request) -> Self {
        Self { schema, request }
    }

    pub fn request(&self) -> &Request {
        &self.request
    }

    fn map(mut self, f: impl FnOnce(Request) -> Request) -> Self {
        self.request = f(self.request);
        self
    }

    pub fn select(self, columns: &[&str]) -> Self {
        self.map(|r| r.select(columns))
    }

    pub fn from(self, table: &str) -> Self {
        self.map(|r| r.from(table))
    }

    pub fn left_join(
        self,
        table: &str,
        on: impl FnOnce(ConditionBuilder) -> ConditionBuilder,
    ) -> Self {
        self.map(|r| r.left_join(table, on))
    }

    pub fn right_join(
        self,
        table: &str,
        on: impl FnOnce(ConditionBuilder) -> ConditionBuilder,
    ) -> Self {
        self.map(|r| r.right_join(table, on))
    }

    pub fn union(self, request: Request) -> Self {
        self.map(|r| r.union(request))
    }

    pub fn union_all(self, request: Request) -> Self {
        self.map(|r| r.union_all(request))
    }

    pub fn where_(self, column: &str, operator: &str, value: impl Into<Value>) -> Self {
        self.map(|r| r.where_(column, operator, value))
    }

    pub fn or_where(self, column: &str, operator: &str, value: impl Into<Value>) -> Self {
        self.map(|r| r.or_where(column, operator, value))
    }

    pub fn not_where(self, column: &str, operator: &str, value: impl Into<Value>) -> Self {
        self.map(|r| r.not_where(column, operator, value))
    }

    pub fn or_not_where(self, column: &str, operator: &str, value: impl Into<Value>) -> Self {
        self.map(|r| r.or_not_where(column, operator, value))
    }

    pub fn where_column(self, column: &str, operator: &str, other: &str) -> Self {
        self.map(|r| r.where_column(column, operator, other))
    }

    pub fn or_where_column(self, column: &str, operator: &str, other: &str) -> Self {
        self.map(|r| r.or_where_column(column, operator, other))
    }

    pub fn like(self, column: &str, pattern: &str) -> Self {
        self.map(|r| r.like(column, pattern))
    }

    pub fn not_like(self, column: &str, pattern: &str) -> Self {
        self.map(|r| r.not_like(column, pattern))
    }

    pub fn ilike(self, column: &str, pattern: &str) -> Self {
        self.map(|r| r.ilike(column, pattern))
    }

    pub fn not_ilike(self, column: &str, pattern: &str) -> Self {
        self.map(|r| r.not_ilike(column, pattern))
    }

    pub fn between(self, column: &str, min: impl Into<Value>, max: impl Into<Value>) -> Self {
        self.map(|r| r.between(column, min, max))
    }

    pub fn not_between(self, column: &str, min: impl Into<Value>, max: impl Into<Value>) -> Self {
        self.map(|r| r.not_between(column, min, max))
    }

    pub fn in_list(self, column: &str, values: impl IntoIterator<Item = Value>) -> Self {
        self.map(|r| r.in_list(column, values))
    }

    pub fn not_in_list(self, column: &str, values: impl IntoIterator<Item = Value>) -> Self {
        self.map(|r| r.not_in_list(column, values))
    }

    pub fn is_null(self, column: &str) -> Self {
        self.map(|r| r.is_null(column))
    }

    pub fn is_not_null(self, column: &str) -> Self {
        self.map(|r| r.is_not_null(column))
    }

    pub fn matches(self, column: &str, pattern: &str) -> Self {
        self.map(|r| r.matches(column, pattern))
    }

    pub fn not_matches(self, column: &str, pattern: &str) -> Self {
        self.map(|r| r.not_matches(column, pattern))
    }

    pub fn group(self, build: impl FnOnce(ConditionBuilder) -> ConditionBuilder) -> Self {
        self.map(|r| r.group(build))
    }

    pub fn or_group(self, build: impl FnOnce(ConditionBuilder) -> ConditionBuilder) -> Self {
        self.map(|r| r.or_group(build))
    }

    pub fn not_group(self, build: impl FnOnce(ConditionBuilder) -> ConditionBuilder) -> Self {
        self.map(|r| r.not_group(build))
    }

    pub fn order_by(self, column: &str, direction: Direction) -> Self {
        self.map(|r| r.order_by(column, direction))
    }

    pub fn limit(self, limit: i64, offset: i64) -> Self {
        self.map(|r| r.limit(limit, offset))
    }

    pub fn insert_into(self, table: &str, columns: &[&str]) -> Self {
        self.map(|r| r.insert_into(table, columns))
    }

    pub fn values(self, row: Vec<Value>) -> Self {
        self.map(|r| r.values(row))
    }

    pub fn update(self, table: &str) -> Self {
        self.map(|r| r.update(table))
    }

    pub fn set(self, column: &str, value: impl Into<Value>) -> Self {
        self.map(|r| r.set(column, value))
    }

    pub fn delete(self) -> Self {
        self.map(|r| r.delete())
    }

    /// Runs the read pipeline and returns the first result row, if any.
    pub fn fetch(self) -> Result<Option<Row>> {
        let rows = run_select(self.schema, self.request)?;
        Ok(rows.into_iter().next())
    }

    /// Runs the read pipeline and returns every result row.
    pub fn fetch_all(self) -> Result<Vec<Row>> {
        run_select(self.schema, self.request)
    }

    /// Runs the read pipeline and plucks one column's values, in row
    /// order.
    pub fn lists(self, column: &str) -> Result<Vec<Value>> {
        let rendered = self.request.to_string();
        let rows = run_select(self.schema, self.request)?;
        rows.into_iter()
            .map(|row| {
                row.get(column).cloned().ok_or_else(|| {
                    Error::ColumnsNotFound(format!("Column `{column}` is not in the result"))
                        .with_query(&rendered)
                })
            })
            .collect()
    }

    /// Runs the mutation path and returns the number of rows written,
    /// updated or deleted.
    pub fn execute(self) -> Result<usize> {
        run_mutation(self.schema, self.request)
    }
}

/// The fixed read pipeline:
/// FROM, JOIN, WHERE, SELECT, UNION, ORDER BY, LIMIT/OFFSET.
///
/// Unions are appended after the parent's projection and re-keyed
/// positionally under the parent's column names, which keeps the arity
/// check, Simple de-duplication and combined ordering/slicing exactly as
/// observable from outside.
pub(crate) fn run_select(schema: &Schema, mut request: Request) -> Result<Vec<Row>> {
    let rendered = request.to_string();
    if let Some(error) = request.error.take() {
        return Err(error.with_query(&rendered));
    }
    if request.mutation.is_some() {
        return Err(Error::BadFunction(
            "fetch on a mutation request; call execute() instead".to_owned(),
        )
        .with_query(&rendered));
    }
    check_bounds(&request, &rendered)?;
    let from = request.from.clone().ok_or_else(|| {
        Error::BadFunction("no source table; call from() first".to_owned()).with_query(&rendered)
    })?;

    let source = schema.get_table(&from).map_err(|e| e.with_query(&rendered))?;
    let mut rows = schema.read_rows(&from).map_err(|e| e.with_query(&rendered))?;
    let mut combined: Vec<String> = source.field_names().map(str::to_owned).collect();

    for join in &request.joins {
        let joined = schema
            .get_table(&join.table)
            .map_err(|e| e.with_query(&rendered))?;
        let joined_rows = schema
            .read_rows(&join.table)
            .map_err(|e| e.with_query(&rendered))?;
        let joined_columns: Vec<String> = joined.field_names().map(str::to_owned).collect();

        let mut merged_columns = combined.clone();
        for column in &joined_columns {
            if !merged_columns.contains(column) {
                merged_columns.push(column.clone());
            }
        }
        validate_columns(&join.condition, &merged_columns, &rendered)?;

        rows = execute_join(
            rows,
            &combined,
            joined_rows,
            &joined_columns,
            join.kind,
            &join.condition,
        )
        .map_err(|e| e.with_query(&rendered))?;
        combined = merged_columns;
    }

    let condition = std::mem::take(&mut request.conditions)
        .build()
        .map_err(|e| e.with_query(&rendered))?;
    if let Some(condition) = &condition {
        validate_columns(condition, &combined, &rendered)?;
        let mut kept = Vec::with_capacity(rows.len());
        for row in rows {
            if condition.evaluate(&row).map_err(|e| e.with_query(&rendered))? {
                kept.push(row);
            }
        }
        rows = kept;
    }

    let projection: Vec<String> = if request.columns.is_empty() {
        combined.clone()
    } else {
        for column in &request.columns {
            if !combined.contains(column) {
                return Err(Error::ColumnsNotFound(format!(
                    "Column `{column}` does not exist among [{}]",
                    combined.join(", ")
                ))
                .with_query(&rendered));
            }
        }
        request.columns.clone()
    };
    let mut result: Vec<Row> = rows
        .into_iter()
        .map(|row| project(&row, &projection))
        .collect();

    for union in std::mem::take(&mut request.unions) {
        let sub_columns =
            effective_columns(schema, &union.request).map_err(|e| e.with_query(&rendered))?;
        if sub_columns.len() != projection.len() {
            return Err(Error::ColumnsNotFound(format!(
                "UNION column count mismatch: [{}] vs [{}]",
                projection.join(", "),
                sub_columns.join(", ")
            ))
            .with_query(&rendered));
        }
        let sub_rows = run_select(schema, union.request)?;
        for sub_row in sub_rows {
            let rekeyed: Row = projection
                .iter()
                .cloned()
                .zip(sub_row.iter().map(|(_, value)| value.clone()))
                .collect();
            match union.kind {
                UnionKind::All => result.push(rekeyed),
                UnionKind::Simple => {
                    if !result.contains(&rekeyed) {
                        result.push(rekeyed);
                    }
                }
            }
        }
    }

    if !request.order_by.is_empty() {
        for (column, _) in &request.order_by {
            if !projection.contains(column) {
                return Err(Error::ColumnsNotFound(format!(
                    "Column `{column}` does not exist among [{}]",
                    projection.join(", ")
                ))
                .with_query(&rendered));
            }
        }
        result.sort_by(|a, b| compare_rows(a, b, &request.order_by));
    }

    let offset = request.offset as usize;
    let result = match request.limit {
        Some(limit) => result
            .into_iter()
            .skip(offset)
            .take(limit as usize)
            .collect(),
        None if offset > 0 => result.into_iter().skip(offset).collect(),
        None => result,
    };
    Ok(result)
}

pub(crate) fn run_mutation(schema: &Schema, mut request: Request) -> Result<usize> {
    let rendered = request.to_string();
    if let Some(error) = request.error.take() {
        return Err(error.with_query(&rendered));
    }
    let conditions = std::mem::take(&mut request.conditions);
    let Some(mutation) = request.mutation.take() else {
        return Err(Error::BadFunction(
            "execute() requires an insert, update or delete context".to_owned(),
        )
        .with_query(&rendered));
    };
    match mutation {
        Mutation::Insert {
            table,
            columns,
            rows,
        } => run_insert(schema, &rendered, &table, &columns, rows),
        Mutation::Update { table, assignments } => {
            run_update(schema, &rendered, conditions, &table, assignments)
        }
        Mutation::Delete => {
            let from = request.from.clone().ok_or_else(|| {
                Error::BadFunction("DELETE requires a source table; call from() first".to_owned())
                    .with_query(&rendered)
            })?;
            run_delete(schema, &rendered, conditions, &from)
        }
    }
}

fn run_insert(
    schema: &Schema,
    rendered: &str,
    table_name: &str,
    columns: &[String],
    value_rows: Vec<Vec<Value>>,
) -> Result<usize> {
    let table = schema
        .get_table(table_name)
        .map_err(|e| e.with_query(&rendered))?;
    for column in columns {
        table
            .get_field(column)
            .map_err(|e| e.with_query(&rendered))?;
    }
    let increment_name = table.increment_field().map(|f| f.name.clone());
    let mut counter = table.increment.unwrap_or(0);

    let mut stored = schema
        .read_rows(table_name)
        .map_err(|e| e.with_query(&rendered))?;
    let inserted = value_rows.len();

    for values in value_rows {
        if values.len() != columns.len() {
            let literals: Vec<_> = values.iter().map(Value::to_literal).collect();
            return Err(Error::ColumnsValue(format!(
                "INSERT arity mismatch: columns ({}) vs values ({})",
                columns.join(", "),
                literals.join(", ")
            ))
            .with_query(&rendered));
        }
        let mut row = Row::new();
        for field in table.fields() {
            let value = match columns.iter().position(|c| c == &field.name) {
                Some(position) => {
                    let value = field
                        .validate_value(&values[position])
                        .map_err(|e| e.with_query(&rendered))?;
                    // An explicit increments value keeps the counter ahead.
                    if increment_name.as_deref() == Some(field.name.as_str())
                        && let Value::Int(explicit) = value
                        && explicit >= counter as i64
                    {
                        counter = explicit as u64 + 1;
                    }
                    value
                }
                None if increment_name.as_deref() == Some(field.name.as_str()) => {
                    let value = Value::Int(counter as i64);
                    counter += 1;
                    value
                }
                None => field
                    .default_value()
                    .map_err(|e| e.with_query(&rendered))?,
            };
            row.set(field.name.clone(), value);
        }
        stored.push(row);
    }

    schema.write_rows(table_name, &stored)?;
    if increment_name.is_some() {
        schema.store_increment(table_name, counter)?;
    }
    Ok(inserted)
}

fn run_update(
    schema: &Schema,
    rendered: &str,
    conditions: ConditionBuilder,
    table_name: &str,
    assignments: Vec<(String, Value)>,
) -> Result<usize> {
    let table = schema
        .get_table(table_name)
        .map_err(|e| e.with_query(&rendered))?;
    let mut validated = Vec::with_capacity(assignments.len());
    for (column, value) in assignments {
        let field = table
            .get_field(&column)
            .map_err(|e| e.with_query(&rendered))?;
        validated.push((
            column,
            field
                .validate_value(&value)
                .map_err(|e| e.with_query(&rendered))?,
        ));
    }

    let condition = conditions.build().map_err(|e| e.with_query(&rendered))?;
    let available: Vec<String> = table.field_names().map(str::to_owned).collect();
    if let Some(condition) = &condition {
        validate_columns(condition, &available, rendered)?;
    }

    let mut rows = schema
        .read_rows(table_name)
        .map_err(|e| e.with_query(&rendered))?;
    let mut updated = 0;
    for row in &mut rows {
        let hit = match &condition {
            Some(condition) => condition.evaluate(row).map_err(|e| e.with_query(&rendered))?,
            None => true,
        };
        if hit {
            for (column, value) in &validated {
                row.set(column.clone(), value.clone());
            }
            updated += 1;
        }
    }

    schema.write_rows(table_name, &rows)?;
    Ok(updated)
}

fn run_delete(
    schema: &Schema,
    rendered: &str,
    conditions: ConditionBuilder,
    table_name: &str,
) -> Result<usize> {
    let table = schema
        .get_table(table_name)
        .map_err(|e| e.with_query(&rendered))?;
    let condition = conditions.build().map_err(|e| e.with_query(&rendered))?;
    let available: Vec<String> = table.field_names().map(str::to_owned).collect();
    if let Some(condition) = &condition {
        validate_columns(condition, &available, rendered)?;
    }

    let rows = schema
        .read_rows(table_name)
        .map_err(|e| e.with_query(&rendered))?;
    let mut kept = Vec::with_capacity(rows.len());
    let mut removed = 0;
    for row in rows {
        let hit = match &condition {
            Some(condition) => condition
                .evaluate(&row)
                .map_err(|e| e.with_query(&rendered))?,
            None => true,
        };
        if hit {
            removed += 1;
        } else {
            kept.push(row);
        }
    }

    schema.write_rows(table_name, &kept)?;
    Ok(removed)
}

fn check_bounds(request: &Request, rendered: &str) -> Result<()> {
    if let Some(limit) = request.limit
        && limit < 0
    {
        return Err(
            Error::Query(format!("LIMIT must be non-negative, got {limit}")).with_query(&rendered)
        );
    }
    if request.offset < 0 {
        return Err(Error::Query(format!(
            "OFFSET must be non-negative, got {}",
            request.offset
        ))
        .with_query(&rendered));
    }
    Ok(())
}

/// Columns a request would produce, without running it. Used for the
/// UNION arity check before the sub-query executes.
fn effective_columns(schema: &Schema, request: &Request) -> Result<Vec<String>> {
    if !request.columns.is_empty() {
        return Ok(request.columns.clone());
    }
    let from = request
        .from
        .clone()
        .ok_or_else(|| Error::BadFunction("no source table; call from() first".to_owned()))?;
    let table = schema.get_table(&from)?;
    let mut columns: Vec<String> = table.field_names().map(str::to_owned).collect();
    for join in &request.joins {
        let joined = schema.get_table(&join.table)?;
        for name in joined.field_names() {
            if !columns.iter().any(|c| c == name) {
                columns.push(name.to_owned());
            }
        }
    }
    Ok(columns)
}

fn validate_columns(condition: &Condition, available: &[String], rendered: &str) -> Result<()> {
    let mut referenced = Vec::new();
    condition.referenced_columns(&mut referenced);
    for column in referenced {
        if !available.iter().any(|c| c == &column) {
            return Err(Error::ColumnsNotFound(format!(
                "Column `{column}` does not exist among [{}]",
                available.join(", ")
            ))
            .with_query(&rendered));
        }
    }
    Ok(())
}

/// Nested-loop join. The retention side depends on the kind: a left join
/// emits every left row at least once with the right columns null-filled,
/// a right join does the symmetric thing for the joined table's rows.
fn execute_join(
    left_rows: Vec<Row>,
    left_columns: &[String],
    right_rows: Vec<Row>,
    right_columns: &[String],
    kind: JoinKind,
    condition: &Condition,
) -> Result<Vec<Row>> {
    let mut out = Vec::new();
    match kind {
        JoinKind::Left => {
            for left in &left_rows {
                let mut matched = false;
                for right in &right_rows {
                    let merged = merge(left, right);
                    if condition.evaluate(&merged)? {
                        out.push(merged);
                        matched = true;
                    }
                }
                if !matched {
                    out.push(merge(left, &null_row(right_columns)));
                }
            }
        }
        JoinKind::Right => {
            for right in &right_rows {
                let mut matched = false;
                for left in &left_rows {
                    let merged = merge(left, right);
                    if condition.evaluate(&merged)? {
                        out.push(merged);
                        matched = true;
                    }
                }
                if !matched {
                    out.push(merge(&null_row(left_columns), right));
                }
            }
        }
    }
    Ok(out)
}

/// Right-hand entries overwrite same-named left-hand columns.
fn merge(left: &Row, right: &Row) -> Row {
    let mut merged = left.clone();
    for (column, value) in right.iter() {
        merged.set(column.to_owned(), value.clone());
    }
    merged
}

fn null_row(columns: &[String]) -> Row {
    columns
        .iter()
        .map(|column| (column.clone(), Value::Null))
        .collect()
}

fn project(row: &Row, columns: &[String]) -> Row {
    columns
        .iter()
        .map(|column| {
            (
                column.clone(),
                row.get(column).cloned().unwrap_or(Value::Null),
            )
        })
        .collect()
}

fn compare_rows(a: &Row, b: &Row, keys: &[(String, Direction)]) -> Ordering {
    for (column, direction) in keys {
        let left = a.get(column).unwrap_or(&Value::Null);
        let right = b.get(column).unwrap_or(&Value::Null);
        let mut ordering = left.ordinal_cmp(right);
        if *direction == Direction::Desc {
            ordering = ordering.reverse();
        }
        if ordering != Ordering::Equal {
            return ordering;
        }
    }
    Ordering::Equal
}
