//! Table schema versions and the one-step upgrades between them.

use crate::error::{AcgError, Result};
use crate::ndjson::NdJsonInfo;
use crate::records::{Character, Gender, Id, Presence, Record, TableKind};

use serde::Deserialize;
use serde_json::Value;

/// The newest `AnimeEntry` table version.
pub const ANIME_TABLE_VERSION: u32 = 1;
/// The newest `MangaEntry` table version.
pub const MANGA_TABLE_VERSION: u32 = 1;
/// The newest `Category` table version.
pub const CATEGORY_TABLE_VERSION: u32 = 1;
/// The newest `Person` table version.
pub const PERSON_TABLE_VERSION: u32 = 1;
/// The newest `Character` table version.
///
/// v2 made `presentOn` a list and added the mandatory `description`.
pub const CHARACTER_TABLE_VERSION: u32 = 2;

/// The version this build reads and writes for a table.
pub fn supported_version(kind: TableKind) -> u32 {
    match kind {
        TableKind::Anime => ANIME_TABLE_VERSION,
        TableKind::Manga => MANGA_TABLE_VERSION,
        TableKind::Category => CATEGORY_TABLE_VERSION,
        TableKind::Person => PERSON_TABLE_VERSION,
        TableKind::Character => CHARACTER_TABLE_VERSION,
    }
}

/// How a stored table relates to the version this build supports.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Compatibility {
    /// The table is at the supported version.
    Ok,
    /// The table is one version behind and can be upgraded.
    NeedsMigration,
    /// The table can be neither read nor upgraded.
    Invalid,
}

/// Classifies a stored version for a table.
pub fn classify(version: u32, kind: TableKind) -> Compatibility {
    let supported = supported_version(kind);

    if version == supported {
        Compatibility::Ok
    } else if supported.checked_sub(1) == Some(version) && upgrader(kind, version).is_some() {
        Compatibility::NeedsMigration
    } else {
        Compatibility::Invalid
    }
}

type Upgrader = fn(Value) -> std::result::Result<Value, String>;

fn upgrader(kind: TableKind, from: u32) -> Option<Upgrader> {
    match (kind, from) {
        (TableKind::Character, 1) => Some(upgrade_character_v1),
        _ => None,
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct CharacterV1 {
    #[serde(default)]
    id: Id,
    name: String,
    name_in_japanese: String,
    gender: Gender,
    present_on: Presence,
}

fn upgrade_character_v1(record: Value) -> std::result::Result<Value, String> {
    let old: CharacterV1 = serde_json::from_value(record).map_err(|e| e.to_string())?;

    let upgraded = Character {
        id: old.id,
        name: old.name,
        name_in_japanese: old.name_in_japanese,
        gender: old.gender,
        description: "<unknown>".to_string(),
        present_on: vec![old.present_on],
    };

    serde_json::to_value(upgraded).map_err(|e| e.to_string())
}

/// Turns the raw content of a table file into typed records, upgrading them first if needed.
///
/// Also returns whether an upgrade happened, in which case the table must be written back.
pub fn decode<T: Record>(info: NdJsonInfo) -> Result<(Vec<T>, bool)> {
    let supported = supported_version(T::KIND);

    let (payload, migrated) = match classify(info.version, T::KIND) {
        Compatibility::Ok => (info.payload, false),
        Compatibility::NeedsMigration => {
            let upgrade = upgrader(T::KIND, info.version).ok_or(AcgError::IncompatibleVersion {
                kind: T::KIND,
                found: info.version,
                supported,
            })?;

            let payload = info
                .payload
                .into_iter()
                .map(upgrade)
                .collect::<std::result::Result<Vec<_>, _>>()
                .map_err(|reason| AcgError::MigrationFailed {
                    kind: T::KIND,
                    from: info.version,
                    reason,
                })?;

            (payload, true)
        }
        Compatibility::Invalid => {
            return Err(AcgError::IncompatibleVersion {
                kind: T::KIND,
                found: info.version,
                supported,
            })
        }
    };

    let records = payload
        .into_iter()
        .map(serde_json::from_value)
        .collect::<std::result::Result<Vec<T>, _>>()
        .map_err(|e| AcgError::SchemaViolation {
            kind: T::KIND,
            reason: e.to_string(),
        })?;

    Ok((records, migrated))
}
