//! The checks that keep the tables consistent with each other.
//!
//! Every check runs against a [`Held`] lock set, so the tables it consults cannot change between
//!   the check and the commit that follows it.

use crate::error::{ErrorCode, Result, Status};
use crate::query::{Condition, Operator, Query};
use crate::records::{Id, Record, Reference, TableKind, WorkKind};
use crate::store::Held;

use serde_json::{json, Value};

use std::fmt::Display;

/// A dangling reference found by an integrity audit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Violation {
    /// The table of the row carrying the reference.
    pub kind: TableKind,
    /// The row carrying the reference.
    pub id: Id,
    /// The reference that does not resolve.
    pub reference: Reference,
}

impl Display for Violation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Failed to resolve pointer {}{{id={}}} at {}{{id={}}}",
            self.reference.kind, self.reference.id, self.kind, self.id
        )
    }
}

/// Fails with `DUPLICATE_ENTRY` if another row has the same uniqueness keys as the candidate.
///
/// `own` is the id of the row being updated, which never conflicts with itself.
pub(crate) fn check_duplicates<T: Record>(
    held: &Held,
    candidate: &T,
    own: Option<Id>,
) -> Result<Option<Status>> {
    let partner = serde_json::to_value(candidate)?;
    let query = T::uniqueness();
    query.validate(Some(&partner))?;

    let conflict = held.guard::<T>()?.first_match(&query, Some(&partner), own)?;

    Ok(conflict.map(|_| {
        Status::fail(
            ErrorCode::DuplicateEntry,
            "The data might be already in database",
        )
    }))
}

/// Returns the first reference of the record that does not resolve.
pub(crate) fn dangling<T: Record>(held: &Held, record: &T) -> Result<Option<Violation>> {
    for reference in record.references() {
        if !held.contains(reference.kind, reference.id)? {
            return Ok(Some(Violation {
                kind: T::KIND,
                id: record.id(),
                reference,
            }));
        }
    }

    Ok(None)
}

/// Fails with `INTEGRITY_TEST_FAILED` if a foreign id of the record does not resolve.
pub(crate) fn check_references<T: Record>(held: &Held, record: &T) -> Result<Option<Status>> {
    Ok(dangling(held, record)?
        .map(|violation| Status::fail(ErrorCode::IntegrityTestFailed, violation)))
}

/// The query finding rows that point at row `id` of `kind`.
fn referrers_of(kind: TableKind, id: Id) -> Option<Query> {
    match kind {
        TableKind::Category => Some(Query::from(Condition::with_rhs(
            "category",
            Operator::IncludesSet,
            json!([id]),
        ))),
        TableKind::Person => Some(Query::or(vec![
            Condition::with_rhs("publisher", Operator::IncludesSet, json!([id])),
            Condition::with_rhs("author", Operator::IncludesSet, json!([id])),
        ])),
        TableKind::Anime => Some(presence_query(WorkKind::Anime, id)),
        TableKind::Manga => Some(presence_query(WorkKind::Manga, id)),
        TableKind::Character => None,
    }
}

fn presence_query(work: WorkKind, id: Id) -> Query {
    let tag = work.tag();

    Query::from(Condition::custom("presentOn", move |lhs: &Value, _| {
        lhs.as_array().map_or(false, |presences| {
            presences.iter().any(|presence| {
                presence.get("id").and_then(Value::as_u64) == Some(id)
                    && presence.get("type").and_then(Value::as_str) == Some(tag)
            })
        })
    }))
}

/// Fails with `HAVING_REMOTE_DEPENDENCIES` if any row still points at the row about to be removed.
pub(crate) fn check_dependents(held: &Held, kind: TableKind, id: Id) -> Result<Option<Status>> {
    let query = match referrers_of(kind, id) {
        Some(query) => query,
        None => return Ok(None),
    };

    for &referrer in kind.referenced_by() {
        if held.first_match(referrer, &query, None, None)?.is_some() {
            return Ok(Some(Status::fail(
                ErrorCode::HavingRemoteDependencies,
                format!(
                    "Cannot delete the entry because it is referenced by entry in {}",
                    referrer
                ),
            )));
        }
    }

    Ok(None)
}

/// Collects every dangling reference of the rows of one table.
pub(crate) fn audit<T: Record>(held: &Held) -> Result<Vec<Violation>> {
    let mut violations = Vec::new();

    for record in held.guard::<T>()?.entries() {
        for reference in record.references() {
            if !held.contains(reference.kind, reference.id)? {
                violations.push(Violation {
                    kind: T::KIND,
                    id: record.id(),
                    reference,
                });
            }
        }
    }

    Ok(violations)
}
