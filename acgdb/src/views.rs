//! Converters for [`Store::get_data_with`] that replace foreign ids with the rows they point at.
//!
//! ## Example
//! ```
//! let anime = store.get_data_with(1, views::resolve_anime).await?;
//! ```

use crate::error::Result;
use crate::records::{AnimeEntry, Category, Character, Gender, Id, MangaEntry, Person, Record, WorkKind};
use crate::store::Store;

use serde::Serialize;
use tracing::debug;

/// An anime with its categories and people resolved.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
#[allow(missing_docs)]
pub struct AnimeView {
    pub id: Id,
    pub name: String,
    pub name_in_japanese: String,
    pub year: i32,
    pub description: String,
    pub category: Vec<Category>,
    pub author: Vec<Person>,
    pub publisher: Vec<Person>,
}

/// A manga with its categories and people resolved.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
#[allow(missing_docs)]
pub struct MangaView {
    pub id: Id,
    pub name: String,
    pub name_in_japanese: String,
    pub year: i32,
    pub description: String,
    pub is_finished: bool,
    pub category: Vec<Category>,
    pub author: Vec<Person>,
    pub publisher: Vec<Person>,
}

/// A work a character appears in.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Appearance {
    /// An anime.
    Anime(AnimeEntry),
    /// A manga.
    Manga(MangaEntry),
}

/// A character with the works it appears in resolved.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
#[allow(missing_docs)]
pub struct CharacterView {
    pub id: Id,
    pub name: String,
    pub name_in_japanese: String,
    pub gender: Gender,
    pub description: String,
    pub present_on: Vec<Appearance>,
}

/// Looks up every id of the list, skipping those that no longer resolve.
///
/// Writes never leave a dangling id behind, so a miss means the table file was loaded with one
///   already in it. [`Store::verify_integrity`] reports those.
async fn resolve_all<T: Record>(store: &Store, ids: Option<Vec<Id>>) -> Result<Vec<T>> {
    let mut resolved = Vec::new();

    for id in ids.unwrap_or_default() {
        match store.get_data::<T>(id).await? {
            Some(record) => resolved.push(record),
            None => debug!(table = %T::KIND, id, "skipping dangling reference"),
        }
    }

    Ok(resolved)
}

/// Resolves the categories and people of an anime.
pub async fn resolve_anime(entry: AnimeEntry, store: &Store) -> Result<AnimeView> {
    Ok(AnimeView {
        category: resolve_all(store, entry.category).await?,
        author: resolve_all(store, entry.author).await?,
        publisher: resolve_all(store, entry.publisher).await?,
        id: entry.id,
        name: entry.name,
        name_in_japanese: entry.name_in_japanese,
        year: entry.year,
        description: entry.description,
    })
}

/// Resolves the categories and people of a manga.
pub async fn resolve_manga(entry: MangaEntry, store: &Store) -> Result<MangaView> {
    Ok(MangaView {
        category: resolve_all(store, entry.category).await?,
        author: resolve_all(store, entry.author).await?,
        publisher: resolve_all(store, entry.publisher).await?,
        id: entry.id,
        name: entry.name,
        name_in_japanese: entry.name_in_japanese,
        year: entry.year,
        description: entry.description,
        is_finished: entry.is_finished,
    })
}

/// Resolves the works a character appears in.
pub async fn resolve_character(character: Character, store: &Store) -> Result<CharacterView> {
    let mut present_on = Vec::with_capacity(character.present_on.len());

    for presence in &character.present_on {
        let appearance = match presence.kind {
            WorkKind::Anime => store
                .get_data::<AnimeEntry>(presence.id)
                .await?
                .map(Appearance::Anime),
            WorkKind::Manga => store
                .get_data::<MangaEntry>(presence.id)
                .await?
                .map(Appearance::Manga),
        };

        if appearance.is_none() {
            debug!(character = character.id, work = presence.id, "skipping dangling appearance");
        }
        present_on.extend(appearance);
    }

    Ok(CharacterView {
        id: character.id,
        name: character.name,
        name_in_japanese: character.name_in_japanese,
        gender: character.gender,
        description: character.description,
        present_on,
    })
}
