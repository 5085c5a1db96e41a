//! An embedded, file-backed relational store.
//!
//! A [`Schema`] is a directory of JSON records managed through a pluggable
//! [`StorageBackend`]: one record for the table definitions plus one data
//! record per table. Tables are declared with [`TableBuilder`], queried
//! and mutated through the fluent [`Query`]/[`Request`] surface, and
//! filtered with structured condition trees instead of SQL strings.
//!
//! ```no_run
//! use reef_db::{Direction, Schema};
//!
//! fn main() -> reef_db::Result<()> {
//!     let schema = Schema::json("app", "./data");
//!     schema.create_table_if_not_exists("user", |t| {
//!         t.increments("id").string("name", 255).nullable()
//!     })?;
//!
//!     schema
//!         .insert_into("user", &["name"])
//!         .values(vec!["NOEL".into()])
//!         .execute()?;
//!
//!     let rows = schema
//!         .select(&["id", "name"])
//!         .from("user")
//!         .where_("name", "like", "N%")
//!         .order_by("id", Direction::Asc)
//!         .fetch_all()?;
//!     println!("{rows:?}");
//!     Ok(())
//! }
//! ```

pub mod error;
pub mod query;
pub mod schema;
pub mod storage;
pub mod value;

pub use error::{Error, Result};
pub use query::{Condition, ConditionBuilder, Direction, Operand, Operator, Query, Request};
pub use schema::{Field, FieldOp, FieldRecord, FieldType, Schema, Table, TableBuilder};
pub use storage::{JsonStorage, StorageBackend};
pub use value::{Row, Value};
