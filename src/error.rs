use std::path::PathBuf;

use miette::Diagnostic;
use thiserror::Error;

/// All failure classes surfaced by the engine.
///
/// The engine is fail-fast: validation happens before any row is returned
/// or any file write is issued, and the first violation aborts the whole
/// call. Query-shaped failures embed the rendered query text so the caller
/// can see exactly which statement misfired.
#[derive(Debug, Error, Diagnostic)]
pub enum Error {
    #[error("Table not found: {0}")]
    #[diagnostic(code(reef_db::table_not_found))]
    TableNotFound(String),

    #[error("Columns not found: {0}")]
    #[diagnostic(code(reef_db::columns_not_found))]
    ColumnsNotFound(String),

    #[error("Invalid column value: {0}")]
    #[diagnostic(code(reef_db::columns_value))]
    ColumnsValue(String),

    #[error("Operator not found: {0}")]
    #[diagnostic(code(reef_db::operator_not_found))]
    OperatorNotFound(String),

    #[error("Bad function call: {0}")]
    #[diagnostic(code(reef_db::bad_function))]
    BadFunction(String),

    #[error("Table builder error: {0}")]
    #[diagnostic(code(reef_db::table_builder))]
    TableBuilder(String),

    #[error("Query error: {0}")]
    #[diagnostic(code(reef_db::query))]
    Query(String),

    #[error("File not found: {0}")]
    #[diagnostic(code(reef_db::file_not_found))]
    FileNotFound(PathBuf),

    #[error("File not readable: {0}")]
    #[diagnostic(code(reef_db::file_not_readable))]
    FileNotReadable(PathBuf),

    #[error("File not writable: {0}")]
    #[diagnostic(code(reef_db::file_not_writable))]
    FileNotWritable(PathBuf),

    #[error("IO error: {0}")]
    #[diagnostic(code(reef_db::io))]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    #[diagnostic(code(reef_db::serialization))]
    Serialization(#[from] serde_json::Error),
}

impl Error {
    /// Attaches the rendered query text to an error raised while executing
    /// that query.
    pub(crate) fn with_query(self, query: &impl std::fmt::Display) -> Self {
        match self {
            Error::TableNotFound(msg) => Error::TableNotFound(format!("{msg} in `{query}`")),
            Error::ColumnsNotFound(msg) => Error::ColumnsNotFound(format!("{msg} in `{query}`")),
            Error::ColumnsValue(msg) => Error::ColumnsValue(format!("{msg} in `{query}`")),
            Error::OperatorNotFound(msg) => Error::OperatorNotFound(format!("{msg} in `{query}`")),
            Error::BadFunction(msg) => Error::BadFunction(format!("{msg} in `{query}`")),
            Error::Query(msg) => Error::Query(format!("{msg} in `{query}`")),
            other => other,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
