//! The store: five tables on disk, loaded into memory and guarded against inconsistent writes.

mod tables;

pub use tables::{Held, Tables};

use crate::error::{AcgError, ErrorCode, Result, Status};
use crate::integrity::{self, Violation};
use crate::lock::{Access, UNREGISTERED};
use crate::migration;
use crate::ndjson;
use crate::query::{Filter, Keys, Query};
use crate::records::{AnimeEntry, Category, Character, Id, MangaEntry, Person, Record, TableKind};
use crate::table::Table;

use serde_json::Value;
use tracing::{debug, info, warn};

use std::future::Future;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

/// How a [`Store`] finds and persists its tables.
///
/// ## Example
/// ```
/// let config = StoreConfig::default()
///     .with_directory("./data")
///     .with_save_on_close(false);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreConfig {
    directory: PathBuf,
    save_on_close: bool,
    concurrent_reads: bool,
    production: bool,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            directory: PathBuf::from("./data"),
            save_on_close: true,
            concurrent_reads: true,
            production: false,
        }
    }
}

impl StoreConfig {
    /// Sets the directory holding the table files.
    pub fn with_directory(mut self, directory: impl AsRef<Path>) -> Self {
        self.directory = directory.as_ref().to_path_buf();
        self
    }

    /// Sets whether `close` writes dirty tables back. Disable for an ephemeral store.
    pub fn with_save_on_close(mut self, save_on_close: bool) -> Self {
        self.save_on_close = save_on_close;
        self
    }

    /// Sets whether readers may share a table.
    pub fn with_concurrent_reads(mut self, concurrent_reads: bool) -> Self {
        self.concurrent_reads = concurrent_reads;
        self
    }

    /// Sets whether developer mistakes such as loading a table twice are fatal.
    pub fn with_production(mut self, production: bool) -> Self {
        self.production = production;
        self
    }

    /// The directory holding the table files.
    pub fn directory(&self) -> &Path {
        &self.directory
    }

    /// Whether `close` writes dirty tables back.
    pub fn save_on_close(&self) -> bool {
        self.save_on_close
    }

    /// Whether readers may share a table.
    pub fn concurrent_reads(&self) -> bool {
        self.concurrent_reads
    }

    /// Whether the store runs in production mode.
    pub fn production(&self) -> bool {
        self.production
    }
}

/// The catalog store.
///
/// Share it between tasks as `Arc<Store>`. Every operation locks only the tables it needs, always
///   in `TableKind` order.
///
/// ## Example
/// ```
/// let store = Store::new(StoreConfig::default().with_directory("./data"));
/// store.init().await?;
///
/// let status = store.add_data::<Category>(json!({ "name": "Fiction" })).await?;
/// let fiction: Option<Category> = store.get_data(status.id().unwrap()).await?;
///
/// store.close().await?;
/// ```
pub struct Store {
    config: StoreConfig,
    pub(crate) tables: Tables,
}

impl Store {
    /// Creates a store with every table unregistered. Call [`Store::init`] before anything else.
    pub fn new(config: StoreConfig) -> Self {
        Self {
            tables: Tables::new(config.concurrent_reads),
            config,
        }
    }

    /// The configuration the store was created with.
    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    /// Whether `init` has registered the given table.
    pub fn is_registered(&self, kind: TableKind) -> bool {
        self.tables.is_registered(kind)
    }

    /// Loads every table file, upgrading outdated ones, and registers the tables.
    pub async fn init(&self) -> Result<()> {
        self.load::<Category>().await?;
        self.load::<Person>().await?;
        self.load::<AnimeEntry>().await?;
        self.load::<MangaEntry>().await?;
        self.load::<Character>().await?;

        info!(directory = %self.config.directory.display(), "store initialised");

        Ok(())
    }

    fn path_of(&self, kind: TableKind) -> PathBuf {
        self.config.directory.join(kind.file_name())
    }

    async fn load<T: Record>(&self) -> Result<()> {
        let lock = T::slot(&self.tables);
        let previous = lock.begin_loading();

        if previous != UNREGISTERED {
            if self.config.production {
                lock.abort_loading(previous);
                return Err(AcgError::AlreadyRegistered(T::KIND));
            }
            warn!(table = %T::KIND, "overwriting an already registered table");
        }

        match self.read_table::<T>().await {
            Ok(table) => {
                lock.register(table).await;
                Ok(())
            }
            Err(e) => {
                lock.abort_loading(previous);
                Err(e)
            }
        }
    }

    async fn read_table<T: Record>(&self) -> Result<Table<T>> {
        let path = self.path_of(T::KIND);

        let info = match ndjson::read(&path).await {
            Ok(info) => info,
            Err(AcgError::Io(e)) if e.kind() == ErrorKind::NotFound => {
                warn!(
                    table = %T::KIND,
                    path = %path.display(),
                    "table file does not exist, initialising it as an empty table"
                );
                return Table::make(Vec::new(), true);
            }
            Err(e) => return Err(e),
        };

        info!(table = %T::KIND, version = info.version, "registering table");

        let (records, migrated) = migration::decode::<T>(info)?;
        if migrated {
            info!(
                table = %T::KIND,
                version = migration::supported_version(T::KIND),
                "migrated table"
            );
        }

        Table::make(records, migrated)
    }

    /// Writes every dirty table back to its file, unless the store is ephemeral.
    pub async fn flush(&self) -> Result<()> {
        if !self.config.save_on_close {
            debug!("ephemeral store, nothing is written");
            return Ok(());
        }

        self.flush_table::<Category>().await?;
        self.flush_table::<Person>().await?;
        self.flush_table::<AnimeEntry>().await?;
        self.flush_table::<MangaEntry>().await?;
        self.flush_table::<Character>().await?;

        Ok(())
    }

    async fn flush_table<T: Record>(&self) -> Result<()> {
        let lock = T::slot(&self.tables);
        if !lock.is_registered() {
            return Ok(());
        }

        let mut guard = lock.lock(Access::Write).await?;
        let table = guard.get_mut().ok_or(AcgError::NotLocked(T::KIND))?;
        if !table.is_dirty() {
            return Ok(());
        }

        let version = migration::supported_version(T::KIND);
        ndjson::write(self.path_of(T::KIND), table.entries(), version).await?;
        table.mark_clean();

        info!(table = %T::KIND, rows = table.len(), version, "saved table");

        Ok(())
    }

    /// Flushes the store for the last time.
    pub async fn close(&self) -> Result<()> {
        self.flush().await?;
        info!("store closed");

        Ok(())
    }

    /// Returns a copy of row `id`.
    pub async fn get_data<T: Record>(&self, id: Id) -> Result<Option<T>> {
        let guard = T::slot(&self.tables).lock(Access::Read).await?;
        Ok(guard.find(id).cloned())
    }

    /// Returns row `id` passed through a converter.
    ///
    /// The table is released before the converter runs, so the converter may look up other rows
    ///   of the store, including rows of the same table.
    pub async fn get_data_with<'a, T, R, F, Fut>(&'a self, id: Id, converter: F) -> Result<Option<R>>
    where
        T: Record,
        F: FnOnce(T, &'a Store) -> Fut,
        Fut: Future<Output = Result<R>>,
    {
        let record = match self.get_data::<T>(id).await? {
            Some(record) => record,
            None => return Ok(None),
        };

        converter(record, self).await.map(Some)
    }

    /// Returns the content hash of row `id`.
    pub async fn get_hash<T: Record>(&self, id: Id) -> Result<Option<String>> {
        let guard = T::slot(&self.tables).lock(Access::Read).await?;
        guard.hash_of(id)
    }

    /// The number of rows in the table holding `T`.
    pub async fn len<T: Record>(&self) -> Result<usize> {
        let guard = T::slot(&self.tables).lock(Access::Read).await?;
        Ok(guard.len())
    }

    /// Scans the ids of the table, optionally only those accepted by the predicate.
    ///
    /// The table is only locked while its rows are copied, so the caller may freely read or write
    ///   the store between two ids.
    pub async fn iterate_keys<T: Record>(
        &self,
        predicate: Option<Box<dyn Fn(&T) -> bool + Send + Sync>>,
    ) -> Result<Keys<T>> {
        let rows = self.snapshot::<T>().await?;

        let filter = match predicate {
            Some(predicate) => Filter::Predicate(predicate),
            None => Filter::All,
        };

        Ok(Keys::new(rows, filter))
    }

    /// Scans the ids of the rows matching the query, with `partner` supplying the right-hand side
    ///   of conditions that have none.
    ///
    /// Fails before locking if the query can never be evaluated.
    pub async fn iterate_keys_if<T: Record>(
        &self,
        partner: Option<&T>,
        query: Query,
    ) -> Result<Keys<T>> {
        let partner = partner.map(serde_json::to_value).transpose()?;
        query.validate(partner.as_ref())?;

        let rows = self.snapshot::<T>().await?;

        Ok(Keys::new(rows, Filter::Query { query, partner }))
    }

    async fn snapshot<T: Record>(&self) -> Result<Vec<T>> {
        let guard = T::slot(&self.tables).lock(Access::Read).await?;
        Ok(guard.entries().to_vec())
    }

    /// Validates and inserts a raw record. An `id` in the input is ignored.
    ///
    /// The message of a successful status carries the new id.
    pub async fn add_data<T: Record>(&self, raw: Value) -> Result<Status> {
        let record = match parse_record::<T>(raw) {
            Some(record) => record,
            None => return Ok(Status::fail(ErrorCode::InvalidData, "Invalid data")),
        };

        self.add_record(record).await
    }

    /// Inserts an already typed record under a new id.
    pub async fn add_record<T: Record>(&self, record: T) -> Result<Status> {
        let mut held = self
            .tables
            .acquire(Some(T::KIND), T::KIND.references())
            .await?;

        if let Some(status) = integrity::check_duplicates(&held, &record, None)? {
            return Ok(status);
        }
        if let Some(status) = integrity::check_references(&held, &record)? {
            return Ok(status);
        }

        let id = held.table_mut::<T>()?.add(record)?;
        debug!(table = %T::KIND, id, "added entry");

        Ok(Status::created(id))
    }

    /// Overwrites the patchable fields of row `id` with those present in `patch`.
    ///
    /// The patched record goes through the same checks as a new one. Nothing changes unless all of
    ///   them pass.
    pub async fn update_data<T: Record>(&self, id: Id, patch: Value) -> Result<Status> {
        let mut held = self
            .tables
            .acquire(Some(T::KIND), T::KIND.references())
            .await?;

        let current = match held.guard::<T>()?.find(id) {
            Some(current) => current.clone(),
            None => return Ok(Status::fail(ErrorCode::EntryNotFound, "Entry not found")),
        };

        let draft = match patch_record(&current, patch)? {
            Some(draft) => draft,
            None => return Ok(Status::fail(ErrorCode::PatchFailed, "Invalid patch")),
        };

        if let Some(status) = integrity::check_duplicates(&held, &draft, Some(id))? {
            return Ok(patch_failure(status));
        }
        if let Some(status) = integrity::check_references(&held, &draft)? {
            return Ok(patch_failure(status));
        }

        held.table_mut::<T>()?.replace(id, draft);
        debug!(table = %T::KIND, id, "updated entry");

        Ok(Status::ok())
    }

    /// Removes row `id`, unless another row still points at it.
    pub async fn remove_data<T: Record>(&self, id: Id) -> Result<Status> {
        let mut held = self
            .tables
            .acquire(Some(T::KIND), T::KIND.referenced_by())
            .await?;

        if held.guard::<T>()?.find(id).is_none() {
            return Ok(Status::fail(ErrorCode::EntryNotFound, "Entry not found"));
        }

        if let Some(status) = integrity::check_dependents(&held, T::KIND, id)? {
            return Ok(status);
        }

        held.table_mut::<T>()?.remove_by_id(id);
        debug!(table = %T::KIND, id, "removed entry");

        Ok(Status::ok())
    }

    /// Reports every reference of every row that does not resolve.
    ///
    /// Holds every table for reading while it runs.
    pub async fn verify_integrity(&self) -> Result<Vec<Violation>> {
        let held = self.tables.acquire(None, &TableKind::ALL).await?;

        let mut violations = integrity::audit::<AnimeEntry>(&held)?;
        violations.extend(integrity::audit::<MangaEntry>(&held)?);
        violations.extend(integrity::audit::<Character>(&held)?);

        for violation in &violations {
            warn!(%violation, "dangling reference");
        }

        Ok(violations)
    }
}

/// Deserializes an inbound record, discarding any `id` it carries.
fn parse_record<T: Record>(raw: Value) -> Option<T> {
    match raw {
        Value::Object(mut map) => {
            map.remove("id");
            serde_json::from_value(Value::Object(map)).ok()
        }
        _ => None,
    }
}

/// Applies the patchable fields of `patch` to a copy of `current`.
///
/// Returns `None` if the patch is not an object or the result is no longer a valid record.
fn patch_record<T: Record>(current: &T, patch: Value) -> Result<Option<T>> {
    let (mut draft, delta) = match (serde_json::to_value(current)?, patch) {
        (Value::Object(draft), Value::Object(delta)) => (draft, delta),
        _ => return Ok(None),
    };

    for (key, value) in delta {
        if T::PATCHABLE.contains(&key.as_str()) {
            draft.insert(key, value);
        }
    }

    Ok(serde_json::from_value(Value::Object(draft)).ok())
}

fn patch_failure(status: Status) -> Status {
    let reason = status.text().unwrap_or_default().to_string();
    Status::fail(status.code, format!("Cannot patch the data as {}", reason))
}
