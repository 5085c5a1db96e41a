use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::schema::field::{Field, FieldOp, FieldRecord, FieldType};

/// An ordered collection of named fields plus the table's auto-increment
/// counter.
///
/// Field names are unique and at most one field is an `increments` column;
/// both invariants are enforced when fields are added, so a `Table` that
/// exists is always well formed.
#[derive(Debug, Clone, PartialEq)]
pub struct Table {
    pub name: String,
    fields: Vec<Field>,
    /// `Some(0)` as soon as an increments field is added, then grows by one
    /// per insert that consumes a value.
    pub(crate) increment: Option<u64>,
}

impl Table {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            fields: Vec::new(),
            increment: None,
        }
    }

    pub fn fields(&self) -> &[Field] {
        &self.fields
    }

    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|f| f.name.as_str())
    }

    pub fn has_field(&self, name: &str) -> bool {
        self.fields.iter().any(|f| f.name == name)
    }

    pub fn get_field(&self, name: &str) -> Result<&Field> {
        self.fields.iter().find(|f| f.name == name).ok_or_else(|| {
            Error::ColumnsNotFound(format!(
                "Column `{name}` does not exist in table `{}`",
                self.name
            ))
        })
    }

    /// The table's increments field, if it has one.
    pub fn increment_field(&self) -> Option<&Field> {
        self.fields
            .iter()
            .find(|f| f.field_type == FieldType::Increment)
    }

    /// Adds a field, enforcing name uniqueness, the single-increments rule
    /// and the default-matches-type invariant.
    pub fn add_field(&mut self, field: Field) -> Result<()> {
        if self.has_field(&field.name) {
            return Err(Error::TableBuilder(format!(
                "Table `{}` already has a field named `{}`",
                self.name, field.name
            )));
        }
        if field.field_type == FieldType::Increment
            && let Some(existing) = self.increment_field()
        {
            return Err(Error::TableBuilder(format!(
                "Table `{}` already has an increments field `{}`, cannot add `{}`",
                self.name, existing.name, field.name
            )));
        }
        field.check_default()?;
        if field.field_type == FieldType::Increment {
            self.increment = Some(self.increment.unwrap_or(0));
        }
        self.fields.push(field);
        Ok(())
    }

    /// Renames a field in place. Fails if the source is absent or the
    /// target name is already taken.
    pub fn rename_field(&mut self, from: &str, to: &str) -> Result<()> {
        if self.has_field(to) {
            return Err(Error::TableBuilder(format!(
                "Table `{}` already has a field named `{to}`, cannot rename `{from}`",
                self.name
            )));
        }
        let field = self
            .fields
            .iter_mut()
            .find(|f| f.name == from)
            .ok_or_else(|| {
                Error::TableBuilder(format!(
                    "Table `{}` has no field named `{from}` to rename",
                    self.name
                ))
            })?;
        field.name = to.to_owned();
        Ok(())
    }

    fn drop_field(&mut self, name: &str) -> Result<Field> {
        let index = self
            .fields
            .iter()
            .position(|f| f.name == name)
            .ok_or_else(|| {
                Error::TableBuilder(format!(
                    "Table `{}` has no field named `{name}` to drop",
                    self.name
                ))
            })?;
        let removed = self.fields.remove(index);
        if removed.field_type == FieldType::Increment {
            self.increment = None;
        }
        Ok(removed)
    }

    fn modify_field(&mut self, replacement: Field) -> Result<()> {
        let current = self.get_field(&replacement.name)?.clone();
        if !current.field_type.can_modify_to(&replacement.field_type) {
            return Err(Error::TableBuilder(format!(
                "Field `{}` of type `{}` cannot be modified to `{}`",
                replacement.name, current.field_type, replacement.field_type
            )));
        }
        if replacement.field_type == FieldType::Increment
            && current.field_type != FieldType::Increment
            && self.increment_field().is_some()
        {
            return Err(Error::TableBuilder(format!(
                "Table `{}` already has an increments field, `{}` cannot become one",
                self.name, replacement.name
            )));
        }
        replacement.check_default()?;
        if replacement.field_type == FieldType::Increment {
            self.increment = Some(self.increment.unwrap_or(0));
        } else if current.field_type == FieldType::Increment {
            self.increment = None;
        }
        let slot = self
            .fields
            .iter_mut()
            .find(|f| f.name == replacement.name)
            .expect("field existence checked above");
        *slot = Field {
            operation: FieldOp::Create,
            ..replacement
        };
        Ok(())
    }

    /// Applies a sequence of alteration operations in declaration order.
    ///
    /// Each produced field carries its pending operation: plain `Create`
    /// fields are added, `Modify` replaces an existing field after the
    /// type-compatibility check, `Rename` rekeys and `Drop` removes.
    pub fn apply_alteration(&mut self, operations: Vec<Field>) -> Result<AlterationLog> {
        let mut log = AlterationLog::default();
        for field in operations {
            match field.operation.clone() {
                FieldOp::Create => {
                    log.added.push(field.name.clone());
                    self.add_field(Field {
                        operation: FieldOp::Create,
                        ..field
                    })?;
                }
                FieldOp::Modify => self.modify_field(field)?,
                FieldOp::Rename(to) => {
                    self.rename_field(&field.name, &to)?;
                    log.renamed.push((field.name.clone(), to));
                }
                FieldOp::Drop => {
                    self.drop_field(&field.name)?;
                    log.dropped.push(field.name.clone());
                }
            }
        }
        Ok(log)
    }

    /// The compact persisted form of the whole table.
    pub fn to_record(&self) -> TableRecord {
        TableRecord {
            fields: self
                .fields
                .iter()
                .map(|f| (f.name.clone(), f.to_record()))
                .collect(),
            increments: self.increment,
        }
    }

    /// Exact inverse of [`Table::to_record`]: re-runs the structural
    /// invariants, so a hand-edited record that violates them is rejected.
    pub fn from_record(name: &str, record: &TableRecord) -> Result<Self> {
        let mut table = Table::new(name);
        for (field_name, field_record) in &record.fields {
            table.add_field(Field::from_record(field_name, field_record)?)?;
        }
        if record.increments.is_some() {
            table.increment = record.increments;
        }
        Ok(table)
    }
}

/// What an alteration changed, used by the schema layer to re-shape
/// existing rows.
#[derive(Debug, Default)]
pub struct AlterationLog {
    pub added: Vec<String>,
    pub renamed: Vec<(String, String)>,
    pub dropped: Vec<String>,
}

/// Persisted form of a [`Table`]: the field map in declaration order plus
/// the increment counter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableRecord {
    #[serde(with = "ordered_map")]
    pub fields: Vec<(String, FieldRecord)>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub increments: Option<u64>,
}

/// Serializes a `Vec<(String, V)>` as a JSON map without giving up
/// insertion order.
pub(crate) mod ordered_map {
    use std::fmt;
    use std::marker::PhantomData;

    use serde::de::{MapAccess, Visitor};
    use serde::ser::SerializeMap;
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<V, S>(entries: &[(String, V)], serializer: S) -> Result<S::Ok, S::Error>
    where
        V: Serialize,
        S: Serializer,
    {
        let mut map = serializer.serialize_map(Some(entries.len()))?;
        for (key, value) in entries {
            map.serialize_entry(key, value)?;
        }
        map.end()
    }

    pub fn deserialize<'de, V, D>(deserializer: D) -> Result<Vec<(String, V)>, D::Error>
    where
        V: Deserialize<'de>,
        D: Deserializer<'de>,
    {
        struct MapVisitor<V>(PhantomData<V>);

        impl<'de, V: Deserialize<'de>> Visitor<'de> for MapVisitor<V> {
            type Value = Vec<(String, V)>;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a map")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<Self::Value, A::Error> {
                let mut entries = Vec::new();
                while let Some(entry) = access.next_entry()? {
                    entries.push(entry);
                }
                Ok(entries)
            }
        }

        deserializer.deserialize_map(MapVisitor(PhantomData))
    }
}

/// Fluent column declaration for table creation and alteration.
///
/// Migration callbacks take the builder by value and hand it back, so
/// declarations chain without shared mutable aliasing:
///
/// ```
/// use reef_db::TableBuilder;
///
/// let builder = TableBuilder::new()
///     .increments("id")
///     .string("name", 255).nullable()
///     .string("firstname", 255).nullable();
/// assert_eq!(builder.fields().len(), 3);
/// ```
#[derive(Debug, Default)]
pub struct TableBuilder {
    fields: Vec<Field>,
}

impl TableBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fields(&self) -> &[Field] {
        &self.fields
    }

    fn push(mut self, field: Field) -> Self {
        self.fields.push(field);
        self
    }

    fn with_last(mut self, apply: impl FnOnce(&mut Field)) -> Self {
        if let Some(last) = self.fields.last_mut() {
            apply(last);
        }
        self
    }

    pub fn increments(self, name: &str) -> Self {
        self.push(Field::new(name, FieldType::Increment))
    }

    pub fn integer(self, name: &str) -> Self {
        self.push(Field::new(name, FieldType::Int))
    }

    pub fn float(self, name: &str) -> Self {
        self.push(Field::new(name, FieldType::Float))
    }

    pub fn boolean(self, name: &str) -> Self {
        self.push(Field::new(name, FieldType::Bool))
    }

    pub fn char(self, name: &str, length: usize) -> Self {
        self.push(Field::new(name, FieldType::Char(length)))
    }

    pub fn string(self, name: &str, length: usize) -> Self {
        self.push(Field::new(name, FieldType::String(length)))
    }

    pub fn text(self, name: &str) -> Self {
        self.push(Field::new(name, FieldType::Text))
    }

    pub fn date(self, name: &str) -> Self {
        self.push(Field::new(name, FieldType::Date))
    }

    pub fn datetime(self, name: &str) -> Self {
        self.push(Field::new(name, FieldType::DateTime))
    }

    /// Marks the last declared column nullable.
    pub fn nullable(self) -> Self {
        self.with_last(|f| f.nullable = true)
    }

    /// Marks the last declared column unsigned.
    pub fn unsigned(self) -> Self {
        self.with_last(|f| f.unsigned = true)
    }

    /// Attaches a comment to the last declared column.
    pub fn comment(self, comment: &str) -> Self {
        let comment = comment.to_owned();
        self.with_last(|f| f.comment = Some(comment))
    }

    /// Declares a default for the last declared column.
    pub fn default_to(self, value: impl Into<crate::Value>) -> Self {
        let value = value.into();
        self.with_last(|f| f.default = Some(value))
    }

    /// Marks the last declared column as a modification of an existing
    /// column of the same name (alteration only).
    pub fn modify(self) -> Self {
        self.with_last(|f| f.operation = FieldOp::Modify)
    }

    /// Declares a column rename (alteration only).
    pub fn rename_column(self, from: &str, to: &str) -> Self {
        let mut field = Field::new(from, FieldType::Text);
        field.operation = FieldOp::Rename(to.to_owned());
        self.push(field)
    }

    /// Declares a column drop (alteration only).
    pub fn drop_column(self, name: &str) -> Self {
        let mut field = Field::new(name, FieldType::Text);
        field.operation = FieldOp::Drop;
        self.push(field)
    }

    /// Builds a fresh table from the declared columns.
    pub(crate) fn into_table(self, name: &str) -> Result<Table> {
        let mut table = Table::new(name);
        for field in self.fields {
            if field.operation != FieldOp::Create {
                return Err(Error::TableBuilder(format!(
                    "Field `{}` carries an alteration operation inside a create",
                    field.name
                )));
            }
            table.add_field(field)?;
        }
        Ok(table)
    }

    pub(crate) fn into_operations(self) -> Vec<Field> {
        self.fields
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user_table() -> Table {
        TableBuilder::new()
            .increments("id")
            .string("name", 255)
            .nullable()
            .string("firstname", 255)
            .nullable()
            .into_table("user")
            .unwrap()
    }

    #[test]
    fn test_field_names_are_unique() {
        let result = TableBuilder::new()
            .integer("id")
            .string("id", 50)
            .into_table("user");
        assert!(matches!(result, Err(Error::TableBuilder(_))));
    }

    #[test]
    fn test_single_increments_field() {
        let result = TableBuilder::new()
            .increments("id")
            .increments("other")
            .into_table("user");
        assert!(matches!(result, Err(Error::TableBuilder(_))));
    }

    #[test]
    fn test_increment_counter_starts_at_zero() {
        let table = user_table();
        assert_eq!(table.increment, Some(0));
        assert_eq!(table.increment_field().unwrap().name, "id");
    }

    #[test]
    fn test_get_field_missing_column() {
        let table = user_table();
        assert!(matches!(
            table.get_field("nope"),
            Err(Error::ColumnsNotFound(_))
        ));
    }

    #[test]
    fn test_rename_field() {
        let mut table = user_table();
        table.rename_field("name", "lastname").unwrap();
        assert!(table.has_field("lastname"));
        assert!(!table.has_field("name"));

        assert!(table.rename_field("gone", "x").is_err());
        assert!(table.rename_field("lastname", "firstname").is_err());
    }

    #[test]
    fn test_modify_incompatible_type_fails() {
        let mut table = user_table();
        let ops = TableBuilder::new()
            .boolean("name")
            .modify()
            .into_operations();
        let err = table.apply_alteration(ops).unwrap_err();
        let Error::TableBuilder(msg) = err else {
            panic!("expected a table builder error")
        };
        assert!(msg.contains("string") && msg.contains("boolean"));
    }

    #[test]
    fn test_modify_widening_string() {
        let mut table = user_table();
        let ops = TableBuilder::new().text("name").modify().into_operations();
        table.apply_alteration(ops).unwrap();
        assert_eq!(table.get_field("name").unwrap().field_type, FieldType::Text);
    }

    #[test]
    fn test_modify_to_second_increment_fails() {
        let mut table = TableBuilder::new()
            .increments("id")
            .integer("rank")
            .into_table("user")
            .unwrap();
        let ops = TableBuilder::new()
            .increments("rank")
            .modify()
            .into_operations();
        assert!(table.apply_alteration(ops).is_err());
    }

    #[test]
    fn test_alteration_add_and_drop() {
        let mut table = user_table();
        let ops = TableBuilder::new()
            .integer("age")
            .nullable()
            .drop_column("firstname")
            .rename_column("name", "lastname")
            .into_operations();
        let log = table.apply_alteration(ops).unwrap();
        assert_eq!(log.added, vec!["age"]);
        assert_eq!(log.dropped, vec!["firstname"]);
        assert_eq!(log.renamed, vec![("name".to_owned(), "lastname".to_owned())]);
        let names: Vec<_> = table.field_names().collect();
        assert_eq!(names, vec!["id", "lastname", "age"]);
    }

    #[test]
    fn test_record_round_trip() {
        let table = TableBuilder::new()
            .increments("id")
            .string("email", 120)
            .default_to("nobody@example.org")
            .boolean("active")
            .default_to(true)
            .comment("soft-delete flag")
            .into_table("account")
            .unwrap();

        let record = table.to_record();
        let back = Table::from_record("account", &record).unwrap();
        assert_eq!(table, back);
    }

    #[test]
    fn test_record_json_shape() {
        let table = user_table();
        let json = serde_json::to_value(table.to_record()).unwrap();
        assert_eq!(json["increments"], 0);
        assert_eq!(json["fields"]["id"]["type"], "increments");
        assert_eq!(json["fields"]["name"]["nullable"], true);
        // Compact layout: keys holding their default are skipped.
        assert!(json["fields"]["name"].get("default").is_none());
        assert!(json["fields"]["id"].get("nullable").is_none());
    }
}
