//! The per-table reader/writer lock and its registration state.

use crate::error::{AcgError, Result};
use crate::records::{Record, TableKind};
use crate::table::Table;
use crate::util::quiet_assert;

use tokio::sync::{OwnedRwLockReadGuard, OwnedRwLockWriteGuard, RwLock};

use std::ops::Deref;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

// Registration states of a table.
// 0 - unregistered, 1 - loading, 2 - registered
pub(crate) const UNREGISTERED: u8 = 0;
pub(crate) const LOADING: u8 = 1;
pub(crate) const REGISTERED: u8 = 2;

/// The kind of access requested from a [`TableLock`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    /// Shared access. Exclusive if the lock does not allow concurrent reads.
    Read,
    /// Exclusive access.
    Write,
}

/// Guards a whole table.
///
/// Waiters are served in FIFO order. With concurrent reads enabled any number of readers share
///   the table, and a writer waits until the last of them has left.
pub struct TableLock<T> {
    table: Arc<RwLock<Table<T>>>,
    state: AtomicU8,
    concurrent_reads: bool,
}

/// Holds a table locked for the lifetime of the value.
pub enum Guard<T> {
    /// Shared with other readers.
    Shared(OwnedRwLockReadGuard<Table<T>>),
    /// Held by this owner alone.
    Exclusive(OwnedRwLockWriteGuard<Table<T>>),
}

impl<T: Record> TableLock<T> {
    pub(crate) fn new(concurrent_reads: bool) -> Self {
        Self {
            table: Arc::new(RwLock::new(Table::new())),
            state: AtomicU8::new(UNREGISTERED),
            concurrent_reads,
        }
    }

    /// The table this lock guards.
    pub fn kind(&self) -> TableKind {
        T::KIND
    }

    /// Whether `init` has registered the table.
    pub fn is_registered(&self) -> bool {
        self.state.load(Ordering::SeqCst) == REGISTERED
    }

    /// Waits for the requested access to the registered table.
    pub async fn lock(&self, access: Access) -> Result<Guard<T>> {
        quiet_assert(self.is_registered(), || AcgError::Unregistered(T::KIND))?;

        Ok(self.acquire(access).await)
    }

    async fn acquire(&self, access: Access) -> Guard<T> {
        match access {
            Access::Read if self.concurrent_reads => {
                Guard::Shared(self.table.clone().read_owned().await)
            }
            _ => Guard::Exclusive(self.table.clone().write_owned().await),
        }
    }

    /// Moves the table to the loading state, returning the state it was in.
    pub(crate) fn begin_loading(&self) -> u8 {
        self.state.swap(LOADING, Ordering::SeqCst)
    }

    /// Puts back the state saved by `begin_loading` after a failed load.
    pub(crate) fn abort_loading(&self, previous: u8) {
        self.state.store(previous, Ordering::SeqCst);
    }

    /// Installs a loaded table and makes it available.
    pub(crate) async fn register(&self, table: Table<T>) {
        let mut guard = self.table.clone().write_owned().await;
        *guard = table;
        drop(guard);

        self.state.store(REGISTERED, Ordering::SeqCst);
    }
}

impl<T> Guard<T> {
    /// Whether no other owner can see the table through this guard.
    pub fn is_exclusive(&self) -> bool {
        matches!(self, Self::Exclusive(_))
    }

    /// Mutable access, only available through an exclusive guard.
    pub fn get_mut(&mut self) -> Option<&mut Table<T>> {
        match self {
            Self::Shared(_) => None,
            Self::Exclusive(guard) => Some(&mut *guard),
        }
    }
}

impl<T> Deref for Guard<T> {
    type Target = Table<T>;

    fn deref(&self) -> &Table<T> {
        match self {
            Self::Shared(guard) => guard,
            Self::Exclusive(guard) => guard,
        }
    }
}
