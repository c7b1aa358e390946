//! acgdb is an embedded document store for an anime and manga catalog.
//! It keeps five tables in memory, persists them as versioned NDJSON files and refuses every write
//!   that would leave a duplicate entry or a dangling reference behind.

#![warn(missing_docs)]

#[macro_use]
mod macros;

pub mod error;
pub mod integrity;
pub mod lock;
pub mod migration;
pub mod ndjson;
pub mod query;
pub mod records;
pub mod store;
pub mod table;
pub mod views;
mod util;

#[cfg(test)]
mod tests;

pub use error::{AcgError, ErrorCode, Status};
pub use query::{Condition, Operator, Query};
pub use records::{
    AnimeEntry, Category, Character, Gender, Id, MangaEntry, Person, Presence, Record, TableKind,
    WorkKind,
};
pub use store::{Store, StoreConfig};
