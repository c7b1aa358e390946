//! The in-memory indexed table.

use crate::error::{AcgError, Result};
use crate::query::Query;
use crate::records::{Id, Record};
use crate::util::hashing;

use parking_lot::Mutex;
use serde_json::Value;

use std::collections::{HashMap, HashSet};

/// The rows of one record type, in insertion order, with a lazily filled id index and hash cache.
///
/// The caches sit behind their own mutex so that lookups through a shared guard can still fill
///   them in.
#[derive(Debug)]
pub struct Table<T> {
    entries: Vec<T>,
    cache: Mutex<Cache>,
    dirty: bool,
    high_water: Id,
}

#[derive(Debug, Default)]
struct Cache {
    index: HashMap<Id, usize>,
    hashes: HashMap<Id, String>,
}

impl<T: Record> Table<T> {
    /// An empty table with nothing to flush.
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
            cache: Mutex::new(Cache::default()),
            dirty: false,
            high_water: 0,
        }
    }

    /// Builds a table from loaded records.
    ///
    /// A `fresh` table starts dirty so that it is written out on the next flush.
    /// Fails if two records share an id.
    pub fn make(entries: Vec<T>, fresh: bool) -> Result<Self> {
        let mut seen = HashSet::with_capacity(entries.len());
        for entry in &entries {
            if !seen.insert(entry.id()) {
                return Err(AcgError::NonUniqueIds(entry.id()));
            }
        }

        let high_water = entries.iter().map(Record::id).max().unwrap_or(0);

        Ok(Self {
            entries,
            cache: Mutex::new(Cache::default()),
            dirty: fresh,
            high_water,
        })
    }

    /// The rows, in display order.
    pub fn entries(&self) -> &[T] {
        &self.entries
    }

    /// The number of rows.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the table has no rows.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Whether the table has changes that are not on disk yet.
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub(crate) fn mark_clean(&mut self) {
        self.dirty = false;
    }

    /// Finds the position of a row, repairing the index on the way.
    fn position(&self, id: Id) -> Option<usize> {
        let mut cache = self.cache.lock();

        if let Some(&index) = cache.index.get(&id) {
            if self.entries.get(index).map(Record::id) == Some(id) {
                return Some(index);
            }
            cache.index.remove(&id);
        }

        let index = self.entries.iter().position(|entry| entry.id() == id)?;
        cache.index.insert(id, index);

        Some(index)
    }

    /// Returns the row with the given id.
    pub fn find(&self, id: Id) -> Option<&T> {
        self.position(id).map(|index| &self.entries[index])
    }

    /// Records where a row was seen during a scan.
    pub(crate) fn remember(&self, id: Id, position: usize) {
        self.cache.lock().index.insert(id, position);
    }

    /// Appends a copy of the record under a new id and returns that id.
    ///
    /// Ids are never reused within the lifetime of the table, even after the row holding the
    ///   largest one is removed.
    pub fn add(&mut self, mut record: T) -> Result<Id> {
        let exhausted = || AcgError::IdsExhausted(T::KIND);

        let mut id = self.high_water.checked_add(1).ok_or_else(exhausted)?;
        while self.find(id).is_some() {
            id = id.checked_add(1).ok_or_else(exhausted)?;
        }

        record.set_id(id);
        let hash = hashing::hash_of(&record)?;

        self.entries.push(record);
        self.high_water = id;
        self.dirty = true;

        let position = self.entries.len() - 1;
        let cache = self.cache.get_mut();
        cache.index.insert(id, position);
        cache.hashes.insert(id, hash);

        Ok(id)
    }

    /// Replaces the row with the given id, keeping its position and id.
    pub fn replace(&mut self, id: Id, mut record: T) -> bool {
        let index = match self.position(id) {
            Some(index) => index,
            None => return false,
        };

        record.set_id(id);
        self.entries[index] = record;
        self.dirty = true;
        self.cache.get_mut().hashes.remove(&id);

        true
    }

    /// Removes the row with the given id.
    ///
    /// Cached positions after the removed row are shifted down by one, so the index stays warm.
    pub fn remove_by_id(&mut self, id: Id) -> bool {
        let index = match self.position(id) {
            Some(index) => index,
            None => return false,
        };

        self.entries.remove(index);
        self.dirty = true;

        let cache = self.cache.get_mut();
        cache.index.remove(&id);
        cache.hashes.remove(&id);
        for position in cache.index.values_mut() {
            if *position > index {
                *position -= 1;
            }
        }

        true
    }

    /// Returns the content hash of a row, computing and caching it on first use.
    pub fn hash_of(&self, id: Id) -> Result<Option<String>> {
        if let Some(hash) = self.cache.lock().hashes.get(&id) {
            return Ok(Some(hash.clone()));
        }

        let entry = match self.find(id) {
            Some(entry) => entry,
            None => return Ok(None),
        };

        let hash = hashing::hash_of(entry)?;
        self.cache.lock().hashes.insert(id, hash.clone());

        Ok(Some(hash))
    }

    /// Returns the first row, other than `skip`, that matches the query.
    pub(crate) fn first_match(
        &self,
        query: &Query,
        partner: Option<&Value>,
        skip: Option<Id>,
    ) -> Result<Option<Id>> {
        for (position, entry) in self.entries.iter().enumerate() {
            self.remember(entry.id(), position);
            if Some(entry.id()) == skip {
                continue;
            }

            let json = serde_json::to_value(entry)?;
            if query.matches(&json, partner)? {
                return Ok(Some(entry.id()));
            }
        }

        Ok(None)
    }

    #[cfg(test)]
    pub(crate) fn cached_position(&self, id: Id) -> Option<usize> {
        self.cache.lock().index.get(&id).copied()
    }

    #[cfg(test)]
    pub(crate) fn cached_hash(&self, id: Id) -> Option<String> {
        self.cache.lock().hashes.get(&id).cloned()
    }
}

impl<T: Record> Default for Table<T> {
    fn default() -> Self {
        Self::new()
    }
}
