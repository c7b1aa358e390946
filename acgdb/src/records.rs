//! The catalog record types and the per-type metadata the store needs about them.

use crate::lock::{Guard, TableLock};
use crate::query::{Condition, Operator, Query};
use crate::store::{Held, Tables};

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use std::fmt::Display;
use std::sync::Arc;

/// The integer key of a row, unique within its table.
pub type Id = u64;

/// Identifies one of the tables of the store.
///
/// The declaration order is the lock order: whenever several tables are locked together they are
///   locked from `Category` to `Character`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum TableKind {
    /// The `Category` table.
    Category,
    /// The `Person` table.
    Person,
    /// The `AnimeEntry` table.
    Anime,
    /// The `MangaEntry` table.
    Manga,
    /// The `Character` table.
    Character,
}

impl TableKind {
    /// Every table, in lock order.
    pub const ALL: [TableKind; 5] = [
        TableKind::Category,
        TableKind::Person,
        TableKind::Anime,
        TableKind::Manga,
        TableKind::Character,
    ];

    /// The upper-case name used in logs and messages.
    pub fn name(self) -> &'static str {
        match self {
            Self::Category => "CATEGORY",
            Self::Person => "PERSON",
            Self::Anime => "ANIME",
            Self::Manga => "MANGA",
            Self::Character => "CHARACTER",
        }
    }

    /// The name of the table file inside the data directory.
    pub fn file_name(self) -> &'static str {
        match self {
            Self::Category => "categories.ndjson",
            Self::Person => "persons.ndjson",
            Self::Anime => "animes.ndjson",
            Self::Manga => "mangas.ndjson",
            Self::Character => "characters.ndjson",
        }
    }

    /// The tables whose rows this table's rows point at.
    pub fn references(self) -> &'static [TableKind] {
        match self {
            Self::Anime | Self::Manga => &[Self::Category, Self::Person],
            Self::Character => &[Self::Anime, Self::Manga],
            Self::Category | Self::Person => &[],
        }
    }

    /// The tables whose rows may point at this table's rows.
    pub fn referenced_by(self) -> &'static [TableKind] {
        match self {
            Self::Category | Self::Person => &[Self::Anime, Self::Manga],
            Self::Anime | Self::Manga => &[Self::Character],
            Self::Character => &[],
        }
    }
}

impl Display for TableKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.pad(self.name())
    }
}

/// A foreign reference carried by a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Reference {
    /// The table the id lives in.
    pub kind: TableKind,
    /// The referenced row.
    pub id: Id,
}

mod sealed {
    pub trait Sealed {}
}

/// A type stored in one of the tables.
///
/// This trait is sealed: the store only knows the five catalog tables.
pub trait Record:
    sealed::Sealed + Serialize + DeserializeOwned + Clone + Send + Sync + 'static
{
    /// The table holding this type.
    const KIND: TableKind;

    /// The fields an update may overwrite. `id` is never among them.
    const PATCHABLE: &'static [&'static str];

    /// The row id.
    fn id(&self) -> Id;

    /// Overwrites the row id. Only the table assigns ids.
    fn set_id(&mut self, id: Id);

    /// The conditions under which two rows are considered the same entry.
    ///
    /// Evaluated against an existing row with the candidate row as comparison partner.
    fn uniqueness() -> Query;

    /// Every foreign id this record carries.
    fn references(&self) -> Vec<Reference> {
        Vec::new()
    }

    #[doc(hidden)]
    fn slot(tables: &Tables) -> &TableLock<Self>;

    #[doc(hidden)]
    fn held(held: &Held) -> Option<&Guard<Self>>;

    #[doc(hidden)]
    fn held_mut(held: &mut Held) -> Option<&mut Guard<Self>>;
}

/// A category, such as a genre.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Category {
    /// The row id.
    #[serde(default)]
    pub id: Id,
    /// The category name.
    pub name: String,
}

/// A person credited as author or publisher.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Person {
    /// The row id.
    #[serde(default)]
    pub id: Id,
    /// The romanized name.
    pub name: String,
    /// The name in Japanese.
    pub name_in_japanese: String,
}

/// An anime series.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnimeEntry {
    /// The row id.
    #[serde(default)]
    pub id: Id,
    /// The romanized title.
    pub name: String,
    /// The title in Japanese.
    pub name_in_japanese: String,
    /// The release year.
    pub year: i32,
    /// A free-form synopsis.
    pub description: String,
    /// Ids into the `Category` table.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<Vec<Id>>,
    /// Ids into the `Person` table.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author: Option<Vec<Id>>,
    /// Ids into the `Person` table.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub publisher: Option<Vec<Id>>,
}

/// A manga series.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MangaEntry {
    /// The row id.
    #[serde(default)]
    pub id: Id,
    /// The romanized title.
    pub name: String,
    /// The title in Japanese.
    pub name_in_japanese: String,
    /// The year serialization started.
    pub year: i32,
    /// A free-form synopsis.
    pub description: String,
    /// Whether serialization has ended.
    pub is_finished: bool,
    /// Ids into the `Category` table.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<Vec<Id>>,
    /// Ids into the `Person` table.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author: Option<Vec<Id>>,
    /// Ids into the `Person` table.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub publisher: Option<Vec<Id>>,
}

/// The gender of a character.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Gender {
    #[allow(missing_docs)]
    Male,
    #[allow(missing_docs)]
    Female,
}

/// The kind of work a character appears in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkKind {
    /// Points into the `AnimeEntry` table.
    Anime,
    /// Points into the `MangaEntry` table.
    Manga,
}

impl WorkKind {
    /// The table a presence of this kind points into.
    pub fn table(self) -> TableKind {
        match self {
            Self::Anime => TableKind::Anime,
            Self::Manga => TableKind::Manga,
        }
    }

    /// The `type` tag as written in records.
    pub fn tag(self) -> &'static str {
        match self {
            Self::Anime => "anime",
            Self::Manga => "manga",
        }
    }
}

/// One work a character appears in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Presence {
    /// The id of the work, in the table named by `kind`.
    pub id: Id,
    /// Which table the id points into.
    #[serde(rename = "type")]
    pub kind: WorkKind,
}

/// A character appearing in one or more works.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Character {
    /// The row id.
    #[serde(default)]
    pub id: Id,
    /// The romanized name.
    pub name: String,
    /// The name in Japanese.
    pub name_in_japanese: String,
    /// The character's gender.
    pub gender: Gender,
    /// A free-form description.
    pub description: String,
    /// The works the character appears in.
    pub present_on: Vec<Presence>,
}

fn bilingual_uniqueness() -> Query {
    Query::and(vec![
        Condition::new("name", Operator::EqualsInsensitive),
        Condition::new("nameInJapanese", Operator::EqualsInsensitive),
    ])
}

fn work_references(
    category: &Option<Vec<Id>>,
    author: &Option<Vec<Id>>,
    publisher: &Option<Vec<Id>>,
) -> Vec<Reference> {
    let mut people: Vec<Id> = author.clone().unwrap_or_default();
    for id in publisher.iter().flatten() {
        if !people.contains(id) {
            people.push(*id);
        }
    }

    let people = people.into_iter().map(|id| Reference {
        kind: TableKind::Person,
        id,
    });
    let categories = category.iter().flatten().map(|&id| Reference {
        kind: TableKind::Category,
        id,
    });

    people.chain(categories).collect()
}

/// Whether two `presentOn` lists share an `{id, type}` pair.
fn shares_presence(lhs: &Value, rhs: Option<&Value>) -> bool {
    let (Some(lhs), Some(rhs)) = (lhs.as_array(), rhs.and_then(Value::as_array)) else {
        return false;
    };

    rhs.iter().any(|right| {
        lhs.iter()
            .any(|left| left.get("id") == right.get("id") && left.get("type") == right.get("type"))
    })
}

record! {
    Category in Category => category,
    patchable: ["name"],
    uniqueness: Query::from(Condition::new("name", Operator::EqualsInsensitive)),
}

record! {
    Person in Person => person,
    patchable: ["name", "nameInJapanese"],
    uniqueness: bilingual_uniqueness(),
}

record! {
    AnimeEntry in Anime => anime,
    patchable: [
        "name",
        "nameInJapanese",
        "description",
        "year",
        "category",
        "publisher",
        "author"
    ],
    uniqueness: bilingual_uniqueness(),
    references: |entry| work_references(&entry.category, &entry.author, &entry.publisher),
}

record! {
    MangaEntry in Manga => manga,
    patchable: [
        "name",
        "nameInJapanese",
        "description",
        "year",
        "isFinished",
        "category",
        "publisher",
        "author"
    ],
    uniqueness: bilingual_uniqueness(),
    references: |entry| work_references(&entry.category, &entry.author, &entry.publisher),
}

record! {
    Character in Character => character,
    patchable: ["name", "nameInJapanese", "gender", "description", "presentOn"],
    uniqueness: bilingual_uniqueness()
        & Query::from(Condition::new("gender", Operator::Equals))
        & Query::from(Condition::new(
            "presentOn",
            Operator::Custom(Arc::new(shares_presence)),
        )),
    references: |character| character
        .present_on
        .iter()
        .map(|presence| Reference {
            kind: presence.kind.table(),
            id: presence.id,
        })
        .collect(),
}
