use std::path::{Path, PathBuf};

use serde::de::{MapAccess, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use tracing::debug;

use crate::error::{Error, Result};
use crate::query::{Query, Request};
use crate::storage::{JsonStorage, StorageBackend};
use crate::value::Row;

pub mod field;
pub mod table;

pub use field::{Field, FieldOp, FieldRecord, FieldType};
pub use table::{Table, TableBuilder, TableRecord};

use table::ordered_map;

/// Persisted form of a whole schema: one object mapping table name to its
/// table record, in declaration order.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SchemaRecord {
    pub tables: Vec<(String, TableRecord)>,
}

impl Serialize for SchemaRecord {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        ordered_map::serialize(&self.tables, serializer)
    }
}

impl<'de> Deserialize<'de> for SchemaRecord {
    fn deserialize<D: Deserializer<'de>>(
        deserializer: D,
    ) -> std::result::Result<Self, D::Error> {
        struct RecordVisitor;

        impl<'de> Visitor<'de> for RecordVisitor {
            type Value = SchemaRecord;

            fn expecting(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str("a map of table name to table record")
            }

            fn visit_map<A: MapAccess<'de>>(
                self,
                mut access: A,
            ) -> std::result::Result<SchemaRecord, A::Error> {
                let mut tables = Vec::new();
                while let Some(entry) = access.next_entry()? {
                    tables.push(entry);
                }
                Ok(SchemaRecord { tables })
            }
        }

        deserializer.deserialize_map(RecordVisitor)
    }
}

/// A named registry of tables backed by one persisted schema record plus
/// one data record per table.
///
/// The schema holds no in-memory table state: every operation re-reads the
/// record through the storage backend and every mutation rewrites it in
/// full, so the files are the single source of truth and concurrent
/// writers degrade to last-writer-wins.
#[derive(Debug)]
pub struct Schema {
    name: String,
    path: PathBuf,
    backend: Box<dyn StorageBackend>,
}

impl Schema {
    pub fn new(
        name: impl Into<String>,
        path: impl AsRef<Path>,
        backend: Box<dyn StorageBackend>,
    ) -> Self {
        Self {
            name: name.into(),
            path: path.as_ref().to_path_buf(),
            backend,
        }
    }

    /// A schema persisted as JSON files under `path`.
    pub fn json(name: impl Into<String>, path: impl AsRef<Path>) -> Self {
        Self::new(name, path, Box::new(JsonStorage::new()))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    fn load_record(&self) -> Result<SchemaRecord> {
        if !self.backend.has(&self.path, &self.name) {
            return Ok(SchemaRecord::default());
        }
        let raw = self.backend.read(&self.path, &self.name)?;
        Ok(serde_json::from_value(raw)?)
    }

    fn save_record(&self, record: &SchemaRecord) -> Result<()> {
        let raw = serde_json::to_value(record)?;
        if self.backend.has(&self.path, &self.name) {
            self.backend.save(&self.path, &self.name, &raw)?;
        } else {
            self.backend.create(&self.path, &self.name, &raw)?;
        }
        Ok(())
    }

    pub fn has_table(&self, name: &str) -> Result<bool> {
        Ok(self.load_record()?.tables.iter().any(|(n, _)| n == name))
    }

    /// The names of every table in the schema, in declaration order.
    pub fn table_names(&self) -> Result<Vec<String>> {
        Ok(self
            .load_record()?
            .tables
            .into_iter()
            .map(|(name, _)| name)
            .collect())
    }

    /// Loads a table's live definition from the persisted record.
    pub fn get_table(&self, name: &str) -> Result<Table> {
        let record = self.load_record()?;
        let (_, table_record) = record
            .tables
            .iter()
            .find(|(n, _)| n == name)
            .ok_or_else(|| Error::TableNotFound(name.to_owned()))?;
        Table::from_record(name, table_record)
    }

    /// Creates a table from the columns declared by `build`, persisting
    /// both the updated schema record and an empty data record. Fails if
    /// the table already exists.
    pub fn create_table(
        &self,
        name: &str,
        build: impl FnOnce(TableBuilder) -> TableBuilder,
    ) -> Result<()> {
        let mut record = self.load_record()?;
        if record.tables.iter().any(|(n, _)| n == name) {
            return Err(Error::TableBuilder(format!(
                "Table `{name}` already exists in schema `{}`",
                self.name
            )));
        }
        let table = build(TableBuilder::new()).into_table(name)?;
        record.tables.push((name.to_owned(), table.to_record()));
        self.save_record(&record)?;
        self.backend
            .create(&self.path, name, &serde_json::Value::Array(Vec::new()))?;
        debug!(schema = %self.name, table = name, "created table");
        Ok(())
    }

    /// Idempotent variant of [`Schema::create_table`].
    pub fn create_table_if_not_exists(
        &self,
        name: &str,
        build: impl FnOnce(TableBuilder) -> TableBuilder,
    ) -> Result<()> {
        if self.has_table(name)? {
            return Ok(());
        }
        self.create_table(name, build)
    }

    /// Applies an alteration to a table and re-shapes every stored row to
    /// the new field set: renamed columns move under their new key,
    /// dropped columns disappear, added columns receive their resolved
    /// default, and every remaining cell is re-validated. The first row
    /// that fails validation aborts the whole alteration with nothing
    /// persisted.
    pub fn alter_table(
        &self,
        name: &str,
        alter: impl FnOnce(TableBuilder) -> TableBuilder,
    ) -> Result<()> {
        let mut table = self.get_table(name)?;
        let operations = alter(TableBuilder::new()).into_operations();
        let log = table.apply_alteration(operations)?;

        let rows = self.read_rows(name)?;
        let mut reshaped = Vec::with_capacity(rows.len());
        for mut row in rows {
            for (from, to) in &log.renamed {
                row.rename(from, to);
            }
            let mut next = Row::new();
            for field in table.fields() {
                let value = match row.get(&field.name) {
                    Some(value) => field.validate_value(value)?,
                    None => field.default_value()?,
                };
                next.set(field.name.clone(), value);
            }
            reshaped.push(next);
        }

        let mut record = self.load_record()?;
        let slot = record
            .tables
            .iter_mut()
            .find(|(n, _)| n == name)
            .ok_or_else(|| Error::TableNotFound(name.to_owned()))?;
        slot.1 = table.to_record();
        self.save_record(&record)?;
        self.write_rows(name, &reshaped)?;
        debug!(schema = %self.name, table = name, "altered table");
        Ok(())
    }

    /// Clears a table's data and resets its increment counter without
    /// touching the field definitions.
    pub fn truncate_table(&self, name: &str) -> Result<()> {
        let mut record = self.load_record()?;
        let slot = record
            .tables
            .iter_mut()
            .find(|(n, _)| n == name)
            .ok_or_else(|| Error::TableNotFound(name.to_owned()))?;
        if slot.1.increments.is_some() {
            slot.1.increments = Some(0);
        }
        self.save_record(&record)?;
        self.write_rows(name, &[])?;
        debug!(schema = %self.name, table = name, "truncated table");
        Ok(())
    }

    /// Removes a table and its data record.
    pub fn drop_table(&self, name: &str) -> Result<()> {
        let mut record = self.load_record()?;
        let index = record
            .tables
            .iter()
            .position(|(n, _)| n == name)
            .ok_or_else(|| Error::TableNotFound(name.to_owned()))?;
        record.tables.remove(index);
        self.save_record(&record)?;
        self.backend.delete(&self.path, name)?;
        debug!(schema = %self.name, table = name, "dropped table");
        Ok(())
    }

    /// Removes the schema record and every table data record.
    pub fn drop_schema(&self) -> Result<()> {
        if !self.backend.has(&self.path, &self.name) {
            return Err(Error::FileNotFound(
                self.path.join(format!("{}.{}", self.name, self.backend.extension())),
            ));
        }
        for name in self.table_names()? {
            self.backend.delete(&self.path, &name)?;
        }
        self.backend.delete(&self.path, &self.name)?;
        debug!(schema = %self.name, "dropped schema");
        Ok(())
    }

    /// The current increment counter of a table. Fails for tables without
    /// an increments field.
    pub fn get_increment(&self, name: &str) -> Result<u64> {
        let table = self.get_table(name)?;
        if table.increment_field().is_none() {
            return Err(Error::TableBuilder(format!(
                "Table `{name}` has no increments field"
            )));
        }
        Ok(table.increment.unwrap_or(0))
    }

    /// Overrides the increment counter of a table. Fails for tables
    /// without an increments field.
    pub fn set_increment(&self, name: &str, value: u64) -> Result<()> {
        let table = self.get_table(name)?;
        if table.increment_field().is_none() {
            return Err(Error::TableBuilder(format!(
                "Table `{name}` has no increments field"
            )));
        }
        self.store_increment(name, value)
    }

    pub(crate) fn store_increment(&self, name: &str, value: u64) -> Result<()> {
        let mut record = self.load_record()?;
        let slot = record
            .tables
            .iter_mut()
            .find(|(n, _)| n == name)
            .ok_or_else(|| Error::TableNotFound(name.to_owned()))?;
        slot.1.increments = Some(value);
        self.save_record(&record)
    }

    /// Materializes a table's full row set from storage.
    pub fn read_rows(&self, name: &str) -> Result<Vec<Row>> {
        if !self.has_table(name)? {
            return Err(Error::TableNotFound(name.to_owned()));
        }
        let raw = self.backend.read(&self.path, name)?;
        Ok(serde_json::from_value(raw)?)
    }

    /// Rewrites a table's data record in full.
    pub(crate) fn write_rows(&self, name: &str, rows: &[Row]) -> Result<()> {
        let raw = serde_json::to_value(rows)?;
        if self.backend.has(&self.path, name) {
            self.backend.save(&self.path, name, &raw)?;
        } else {
            self.backend.create(&self.path, name, &raw)?;
        }
        Ok(())
    }

    /// Starts a query against this schema.
    pub fn query(&self) -> Query<'_> {
        Query::new(self, Request::new())
    }

    /// Starts a SELECT of the given columns.
    pub fn select(&self, columns: &[&str]) -> Query<'_> {
        self.query().select(columns)
    }

    /// Starts a query reading from `table`.
    pub fn from(&self, table: &str) -> Query<'_> {
        self.query().from(table)
    }

    /// Starts an INSERT into `table` for the given columns.
    pub fn insert_into(&self, table: &str, columns: &[&str]) -> Query<'_> {
        self.query().insert_into(table, columns)
    }

    /// Starts an UPDATE of `table`.
    pub fn update(&self, table: &str) -> Query<'_> {
        self.query().update(table)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::row;
    use crate::value::Value;

    fn scratch() -> (tempfile::TempDir, Schema) {
        let dir = tempfile::tempdir().unwrap();
        let schema = Schema::json("app", dir.path());
        (dir, schema)
    }

    fn create_user_table(schema: &Schema) {
        schema
            .create_table("user", |t| {
                t.increments("id")
                    .string("name", 255)
                    .nullable()
                    .string("firstname", 255)
                    .nullable()
            })
            .unwrap();
    }

    #[test]
    fn test_create_table_twice_fails() {
        let (_dir, schema) = scratch();
        create_user_table(&schema);
        let err = schema.create_table("user", |t| t.integer("id"));
        assert!(matches!(err, Err(Error::TableBuilder(_))));
    }

    #[test]
    fn test_create_table_if_not_exists_is_idempotent() {
        let (_dir, schema) = scratch();
        create_user_table(&schema);
        schema
            .create_table_if_not_exists("user", |t| t.integer("id"))
            .unwrap();
        // Original definition untouched.
        let table = schema.get_table("user").unwrap();
        assert_eq!(
            table.get_field("id").unwrap().field_type,
            FieldType::Increment
        );
    }

    #[test]
    fn test_schema_record_round_trip() {
        let (_dir, schema) = scratch();
        create_user_table(&schema);
        schema
            .create_table("role", |t| t.increments("id").string("label", 60))
            .unwrap();

        let names = schema.table_names().unwrap();
        assert_eq!(names, vec!["user", "role"]);

        let table = schema.get_table("user").unwrap();
        let names: Vec<_> = table.field_names().collect();
        assert_eq!(names, vec!["id", "name", "firstname"]);
    }

    #[test]
    fn test_get_missing_table() {
        let (_dir, schema) = scratch();
        assert!(matches!(
            schema.get_table("user"),
            Err(Error::TableNotFound(_))
        ));
    }

    #[test]
    fn test_alter_table_reshapes_rows() {
        let (_dir, schema) = scratch();
        create_user_table(&schema);
        schema
            .write_rows(
                "user",
                &[row! { "id" => 0, "name" => "NOEL", "firstname" => "Mathieu" }],
            )
            .unwrap();

        schema
            .alter_table("user", |t| {
                t.integer("age")
                    .nullable()
                    .rename_column("name", "lastname")
                    .drop_column("firstname")
            })
            .unwrap();

        let rows = schema.read_rows("user").unwrap();
        assert_eq!(rows.len(), 1);
        let columns: Vec<_> = rows[0].columns().collect();
        assert_eq!(columns, vec!["id", "lastname", "age"]);
        assert_eq!(rows[0].get("lastname"), Some(&Value::Str("NOEL".into())));
        assert_eq!(rows[0].get("age"), Some(&Value::Null));
    }

    #[test]
    fn test_alter_table_new_column_needs_default_or_nullable() {
        let (_dir, schema) = scratch();
        create_user_table(&schema);
        schema
            .write_rows("user", &[row! { "id" => 0, "name" => "NOEL", "firstname" => "Mathieu" }])
            .unwrap();

        // Non-nullable addition without a default cannot backfill.
        let err = schema.alter_table("user", |t| t.integer("age"));
        assert!(matches!(err, Err(Error::ColumnsValue(_))));

        // The failed alteration persisted nothing.
        let table = schema.get_table("user").unwrap();
        assert!(!table.has_field("age"));
        let rows = schema.read_rows("user").unwrap();
        assert!(!rows[0].contains("age"));
    }

    #[test]
    fn test_alter_table_backfills_default() {
        let (_dir, schema) = scratch();
        create_user_table(&schema);
        schema
            .write_rows("user", &[row! { "id" => 0, "name" => "NOEL", "firstname" => "Mathieu" }])
            .unwrap();

        schema
            .alter_table("user", |t| t.integer("age").default_to(18))
            .unwrap();
        let rows = schema.read_rows("user").unwrap();
        assert_eq!(rows[0].get("age"), Some(&Value::Int(18)));
    }

    #[test]
    fn test_truncate_resets_increment() {
        let (_dir, schema) = scratch();
        create_user_table(&schema);
        schema
            .write_rows("user", &[row! { "id" => 0, "name" => "NOEL", "firstname" => "Mathieu" }])
            .unwrap();
        schema.set_increment("user", 5).unwrap();

        schema.truncate_table("user").unwrap();
        assert_eq!(schema.read_rows("user").unwrap().len(), 0);
        assert_eq!(schema.get_increment("user").unwrap(), 0);
        // Field definitions survive.
        assert!(schema.get_table("user").unwrap().has_field("name"));
    }

    #[test]
    fn test_drop_table() {
        let (_dir, schema) = scratch();
        create_user_table(&schema);
        schema.drop_table("user").unwrap();
        assert!(!schema.has_table("user").unwrap());
        assert!(matches!(
            schema.drop_table("user"),
            Err(Error::TableNotFound(_))
        ));
    }

    #[test]
    fn test_drop_schema() {
        let (dir, schema) = scratch();
        create_user_table(&schema);
        schema.drop_schema().unwrap();
        assert!(!dir.path().join("app.json").exists());
        assert!(!dir.path().join("user.json").exists());
        assert!(matches!(
            schema.drop_schema(),
            Err(Error::FileNotFound(_))
        ));
    }

    #[test]
    fn test_increment_requires_increment_field() {
        let (_dir, schema) = scratch();
        schema
            .create_table("plain", |t| t.integer("n"))
            .unwrap();
        assert!(matches!(
            schema.get_increment("plain"),
            Err(Error::TableBuilder(_))
        ));
        assert!(matches!(
            schema.set_increment("plain", 3),
            Err(Error::TableBuilder(_))
        ));
    }
}
