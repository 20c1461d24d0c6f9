//! Store handle and connection setup

use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError, TryLockError};
use std::time::Duration;

use rusqlite::Connection;
use tracing::debug;

use crate::error::{Error, Result};
use crate::query::BackendCapabilities;
use crate::schema;

use super::read::ReadSession;
use super::write::WriteSession;

/// Tunables applied to every session the store opens
#[derive(Debug, Clone, Copy)]
pub struct StoreOptions {
    /// How long the engine waits on a locked database file before
    /// reporting contention
    pub busy_timeout: Duration,
    /// When true, a stored cell that cannot be decoded fails the whole
    /// read; when false the cell is skipped and reported alongside the
    /// results
    pub strict_decode: bool,
    /// What predicate shapes the engine evaluates natively
    pub capabilities: BackendCapabilities,
}

impl Default for StoreOptions {
    fn default() -> Self {
        StoreOptions {
            busy_timeout: Duration::from_secs(5),
            strict_decode: false,
            capabilities: BackendCapabilities::SQLITE,
        }
    }
}

/// A document store backed by one database file.
///
/// The handle itself holds no connection; each session opens its own,
/// so sessions on different threads do not share engine state. The
/// handle serializes writers with an in-process lock on top of the
/// engine's own file locking.
pub struct Store {
    path: PathBuf,
    options: StoreOptions,
    write_lock: Mutex<()>,
}

impl Store {
    /// Opens (creating if needed) the store at `path` with default
    /// options
    pub fn open(path: impl AsRef<Path>) -> Result<Store> {
        Store::open_with(path, StoreOptions::default())
    }

    /// Opens the store with explicit options
    pub fn open_with(path: impl AsRef<Path>, options: StoreOptions) -> Result<Store> {
        let path = path.as_ref().to_path_buf();
        let conn = connect(&path, &options)?;
        schema::bootstrap(&conn)?;
        debug!(path = %path.display(), "store opened");
        Ok(Store {
            path,
            options,
            write_lock: Mutex::new(()),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn options(&self) -> &StoreOptions {
        &self.options
    }

    /// Opens a read session pinned to the current committed state
    pub fn read_session(&self) -> Result<ReadSession> {
        let conn = connect(&self.path, &self.options)?;
        ReadSession::begin(conn, self.options)
    }

    /// Opens a write session, waiting for any active writer to finish
    pub fn write_session(&self) -> Result<WriteSession<'_>> {
        let guard = self
            .write_lock
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        self.begin_write(guard)
    }

    /// Opens a write session, failing with [`Error::WriteConflict`]
    /// when another write session is already active
    pub fn try_write_session(&self) -> Result<WriteSession<'_>> {
        let guard = match self.write_lock.try_lock() {
            Ok(guard) => guard,
            Err(TryLockError::WouldBlock) => return Err(Error::WriteConflict),
            Err(TryLockError::Poisoned(poisoned)) => poisoned.into_inner(),
        };
        self.begin_write(guard)
    }

    fn begin_write<'a>(&self, guard: MutexGuard<'a, ()>) -> Result<WriteSession<'a>> {
        let conn = connect(&self.path, &self.options)?;
        WriteSession::begin(conn, guard, self.options)
    }
}

/// Opens a connection with the store's pragmas applied. WAL keeps
/// reader snapshots stable while a writer is active.
fn connect(path: &Path, options: &StoreOptions) -> Result<Connection> {
    let conn = Connection::open(path)
        .map_err(|e| Error::engine(format!("open({})", path.display()), e))?;
    conn.busy_timeout(options.busy_timeout)
        .map_err(|e| Error::engine("busy_timeout", e))?;
    let _mode: String = conn
        .query_row("PRAGMA journal_mode=WAL", [], |row| row.get(0))
        .map_err(|e| Error::engine("journal_mode", e))?;
    Ok(conn)
}
