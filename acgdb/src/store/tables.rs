use crate::error::{AcgError, Result};
use crate::lock::{Access, Guard, TableLock};
use crate::query::Query;
use crate::records::{AnimeEntry, Category, Character, Id, MangaEntry, Person, Record, TableKind};
use crate::table::Table;

use serde_json::Value;

/// The five table locks of a store.
pub struct Tables {
    pub(crate) category: TableLock<Category>,
    pub(crate) person: TableLock<Person>,
    pub(crate) anime: TableLock<AnimeEntry>,
    pub(crate) manga: TableLock<MangaEntry>,
    pub(crate) character: TableLock<Character>,
}

/// The guards one operation holds, at most one per table.
///
/// Helpers that need a table the operation already holds read it through this set instead of
///   locking it again.
#[derive(Default)]
pub struct Held {
    pub(crate) category: Option<Guard<Category>>,
    pub(crate) person: Option<Guard<Person>>,
    pub(crate) anime: Option<Guard<AnimeEntry>>,
    pub(crate) manga: Option<Guard<MangaEntry>>,
    pub(crate) character: Option<Guard<Character>>,
}

impl Tables {
    pub(crate) fn new(concurrent_reads: bool) -> Self {
        Self {
            category: TableLock::new(concurrent_reads),
            person: TableLock::new(concurrent_reads),
            anime: TableLock::new(concurrent_reads),
            manga: TableLock::new(concurrent_reads),
            character: TableLock::new(concurrent_reads),
        }
    }

    pub(crate) fn is_registered(&self, kind: TableKind) -> bool {
        match kind {
            TableKind::Category => self.category.is_registered(),
            TableKind::Person => self.person.is_registered(),
            TableKind::Anime => self.anime.is_registered(),
            TableKind::Manga => self.manga.is_registered(),
            TableKind::Character => self.character.is_registered(),
        }
    }

    /// Locks `write` for writing and every table in `reads` for reading.
    ///
    /// The locks are always taken in `TableKind` order, whatever order the arguments name them in,
    ///   so two operations can never wait on each other.
    pub(crate) async fn acquire(&self, write: Option<TableKind>, reads: &[TableKind]) -> Result<Held> {
        let mut held = Held::default();

        for kind in TableKind::ALL {
            let access = if write == Some(kind) {
                Access::Write
            } else if reads.contains(&kind) {
                Access::Read
            } else {
                continue;
            };

            match kind {
                TableKind::Category => held.category = Some(self.category.lock(access).await?),
                TableKind::Person => held.person = Some(self.person.lock(access).await?),
                TableKind::Anime => held.anime = Some(self.anime.lock(access).await?),
                TableKind::Manga => held.manga = Some(self.manga.lock(access).await?),
                TableKind::Character => {
                    held.character = Some(self.character.lock(access).await?)
                }
            }
        }

        Ok(held)
    }
}

impl Held {
    /// The guard of the table holding `T`.
    pub(crate) fn guard<T: Record>(&self) -> Result<&Guard<T>> {
        T::held(self).ok_or(AcgError::NotLocked(T::KIND))
    }

    /// The table holding `T`, if this set holds it for writing.
    pub(crate) fn table_mut<T: Record>(&mut self) -> Result<&mut Table<T>> {
        T::held_mut(self)
            .and_then(Guard::get_mut)
            .ok_or(AcgError::NotLocked(T::KIND))
    }

    /// Whether row `id` exists in the table named by `kind`.
    pub(crate) fn contains(&self, kind: TableKind, id: Id) -> Result<bool> {
        Ok(match kind {
            TableKind::Category => self.guard::<Category>()?.find(id).is_some(),
            TableKind::Person => self.guard::<Person>()?.find(id).is_some(),
            TableKind::Anime => self.guard::<AnimeEntry>()?.find(id).is_some(),
            TableKind::Manga => self.guard::<MangaEntry>()?.find(id).is_some(),
            TableKind::Character => self.guard::<Character>()?.find(id).is_some(),
        })
    }

    /// The first row of the table named by `kind` that matches the query.
    pub(crate) fn first_match(
        &self,
        kind: TableKind,
        query: &Query,
        partner: Option<&Value>,
        skip: Option<Id>,
    ) -> Result<Option<Id>> {
        match kind {
            TableKind::Category => self.guard::<Category>()?.first_match(query, partner, skip),
            TableKind::Person => self.guard::<Person>()?.first_match(query, partner, skip),
            TableKind::Anime => self.guard::<AnimeEntry>()?.first_match(query, partner, skip),
            TableKind::Manga => self.guard::<MangaEntry>()?.first_match(query, partner, skip),
            TableKind::Character => self.guard::<Character>()?.first_match(query, partner, skip),
        }
    }
}
