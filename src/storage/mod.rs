use std::path::Path;

use crate::error::Result;

pub mod json;

pub use json::JsonStorage;

/// The byte-level persistence contract the engine delegates to.
///
/// Records are keyed by a directory and a logical name; the backend owns
/// the file extension and the encoding. Payloads travel as JSON trees so
/// both the schema record (an object) and table data (an array of row
/// objects) pass through one interface, and any codec that round-trips
/// bool/int/float/string/null without type loss can implement it.
pub trait StorageBackend: std::fmt::Debug {
    /// Writes a fresh record. Returns `false` without touching anything
    /// if the record already exists.
    fn create(&self, dir: &Path, name: &str, data: &serde_json::Value) -> Result<bool>;

    /// Reads a record back. Fails if it is missing or unreadable.
    fn read(&self, dir: &Path, name: &str) -> Result<serde_json::Value>;

    /// Rewrites an existing record in full. Fails if it is missing or
    /// unwritable.
    fn save(&self, dir: &Path, name: &str, data: &serde_json::Value) -> Result<bool>;

    /// Removes a record. Returns `false` if there was nothing to remove.
    fn delete(&self, dir: &Path, name: &str) -> Result<bool>;

    /// Whether the record exists.
    fn has(&self, dir: &Path, name: &str) -> bool;

    /// The file extension this backend writes, without the dot.
    fn extension(&self) -> &'static str;
}
