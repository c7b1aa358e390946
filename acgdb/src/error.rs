//! Provides the `AcgError` type and the `Status` result of mutating operations.

use crate::records::{Id, TableKind};

use serde::Serialize;
use thiserror::Error;

use std::fmt::Display;

/// Represents an unrecoverable error with the store.
///
/// These are programming or environment errors. Expected business failures such as a duplicate
///   entry or a dangling reference are reported through [`Status`] instead.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum AcgError {
    /// An error occurred while reading from or writing to a table file.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    /// A value could not be serialized or deserialized.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    /// A table file was not valid NDJSON.
    #[error("malformed table file at line {line}: {message}")]
    Format {
        /// The 1-based line number of the offending line.
        line: usize,
        /// What was wrong with it.
        message: String,
    },
    /// Two records of a table share the same id.
    #[error("table content is not unique, id {0} appears more than once")]
    NonUniqueIds(Id),
    /// The table was used before `init` registered it.
    #[error("table {0} not registered yet")]
    Unregistered(TableKind),
    /// An operation needed a table that its lock set does not hold.
    #[error("table {0} is not held by this operation")]
    NotLocked(TableKind),
    /// The table holds the largest possible id, so no new one can be assigned.
    #[error("table {0} has run out of ids")]
    IdsExhausted(TableKind),
    /// The table was registered twice in production mode.
    #[error("table {0} is already registered")]
    AlreadyRegistered(TableKind),
    /// The table file is newer than this build or too old to migrate.
    #[error("table {kind} v{found} is incompatible with the supported version v{supported}")]
    IncompatibleVersion {
        /// The table being loaded.
        kind: TableKind,
        /// The version found in the file.
        found: u32,
        /// The version this build reads and writes.
        supported: u32,
    },
    /// A one-step upgrade could not convert the stored records.
    #[error("migration of {kind} from v{from} failed: {reason}")]
    MigrationFailed {
        /// The table being migrated.
        kind: TableKind,
        /// The version migrated from.
        from: u32,
        /// Why the upgrade failed.
        reason: String,
    },
    /// A stored record does not have the shape of its table.
    #[error("schema violation in table {kind}: {reason}")]
    SchemaViolation {
        /// The table being loaded.
        kind: TableKind,
        /// The deserialization error.
        reason: String,
    },
    /// The condition set cannot be evaluated against the record.
    #[error("invalid query: {0}")]
    Query(String),
}

/// Shorthand for results carrying an [`AcgError`].
pub type Result<T> = std::result::Result<T, AcgError>;

/// Stable integer codes surfaced in [`Status::code`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(into = "u8")]
#[repr(u8)]
pub enum ErrorCode {
    /// No specific failure, also carried by successful statuses.
    Unknown = 0,
    /// The addressed row does not exist.
    EntryNotFound = 1,
    /// A foreign reference does not resolve.
    IntegrityTestFailed = 2,
    /// A row with the same uniqueness keys already exists.
    DuplicateEntry = 3,
    /// The patched record is no longer valid.
    PatchFailed = 4,
    /// The input is not a valid record.
    InvalidData = 5,
    /// The row is still referenced by other rows.
    HavingRemoteDependencies = 6,
}

impl From<ErrorCode> for u8 {
    fn from(code: ErrorCode) -> Self {
        code as u8
    }
}

/// The message attached to a [`Status`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum Message {
    /// A human-readable explanation.
    Text(String),
    /// The id of a newly created row.
    Id(Id),
}

/// The uniform result of every mutating operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Status {
    /// Whether the operation was committed.
    pub success: bool,
    /// An optional explanation or the new id.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<Message>,
    /// The failure code, `Unknown` on success.
    pub code: ErrorCode,
}

impl Status {
    /// A successful status without a message.
    pub fn ok() -> Self {
        Self {
            success: true,
            message: None,
            code: ErrorCode::Unknown,
        }
    }

    /// A successful status carrying the id of a new row.
    pub fn created(id: Id) -> Self {
        Self {
            success: true,
            message: Some(Message::Id(id)),
            code: ErrorCode::Unknown,
        }
    }

    /// A failed status.
    pub fn fail(code: ErrorCode, message: impl Display) -> Self {
        Self {
            success: false,
            message: Some(Message::Text(message.to_string())),
            code,
        }
    }

    /// Returns the new row id if this status came from a successful create.
    pub fn id(&self) -> Option<Id> {
        match self.message {
            Some(Message::Id(id)) if self.success => Some(id),
            _ => None,
        }
    }

    /// Returns the text message, if any.
    pub fn text(&self) -> Option<&str> {
        match &self.message {
            Some(Message::Text(text)) => Some(text),
            _ => None,
        }
    }
}
