//! SQLite storage bootstrap, shared connection handle and schema migration
//! entry points.
//!
//! # Responsibility
//! - Open and configure SQLite connections for cellar core.
//! - Apply schema migrations in deterministic order.
//! - Own the single connection every repository shares.
//!
//! # Invariants
//! - Migration version is tracked via `PRAGMA user_version`.
//! - Core code must not read/write application data before migrations succeed.
//! - One `Database` per connection; repositories hold it through `Rc`, never
//!   through a global.

use rusqlite::{CachedStatement, Connection, Params, Transaction};
use serde::{Deserialize, Serialize};
use std::cell::Cell;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::rc::Rc;

pub mod migrations;
mod open;

pub use open::{open_db, open_db_in_memory, open_db_with};

/// Rows written per batch flush unless configured otherwise.
pub const DEFAULT_BATCH_SIZE: usize = 2048;

pub type DbResult<T> = Result<T, DbError>;

#[derive(Debug)]
pub enum DbError {
    Sqlite(rusqlite::Error),
    UnsupportedSchemaVersion {
        db_version: u32,
        latest_supported: u32,
    },
    /// A migration left rows pointing at missing parents.
    ForeignKeyViolation { orphans: i64 },
}

impl Display for DbError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Sqlite(err) => write!(f, "{err}"),
            Self::UnsupportedSchemaVersion {
                db_version,
                latest_supported,
            } => write!(
                f,
                "database schema version {db_version} is newer than supported {latest_supported}"
            ),
            Self::ForeignKeyViolation { orphans } => {
                write!(f, "migration left {orphans} rows with missing parents")
            }
        }
    }
}

impl Error for DbError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Sqlite(err) => Some(err),
            Self::UnsupportedSchemaVersion { .. } | Self::ForeignKeyViolation { .. } => None,
        }
    }
}

impl From<rusqlite::Error> for DbError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Sqlite(value)
    }
}

/// Store-wide knobs shared by every repository.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Route materialization through the identity cache. Disable only for
    /// tools and tests that need guaranteed-fresh objects.
    pub use_cache: bool,
    /// Rows per batch flush for bulk writes.
    pub batch_size: usize,
    /// Switch file databases to write-ahead logging.
    pub use_wal: bool,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            use_cache: true,
            batch_size: DEFAULT_BATCH_SIZE,
            use_wal: false,
        }
    }
}

/// Shared connection handle passed to every repository at construction.
///
/// All statements issued by the core go through [`Database::prepare`], which
/// keeps a running count so callers can observe whether an operation touched
/// storage at all.
pub struct Database {
    conn: Connection,
    config: StoreConfig,
    statements: Cell<u64>,
}

impl Database {
    /// Wraps a migrated connection.
    pub fn new(conn: Connection, config: StoreConfig) -> Rc<Self> {
        Rc::new(Self {
            conn,
            config,
            statements: Cell::new(0),
        })
    }

    /// Raw connection access for callers outside the repository layer.
    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    pub fn use_cache(&self) -> bool {
        self.config.use_cache
    }

    /// Number of statements prepared through this handle since it was opened.
    pub fn statement_count(&self) -> u64 {
        self.statements.get()
    }

    /// Prepares (or reuses) a statement. The returned statement is finalized
    /// back into the connection cache when dropped.
    pub(crate) fn prepare(&self, sql: &str) -> rusqlite::Result<CachedStatement<'_>> {
        self.statements.set(self.statements.get() + 1);
        self.conn.prepare_cached(sql)
    }

    /// Prepares and executes one statement, returning the affected row count.
    pub(crate) fn execute<P: Params>(&self, sql: &str, params: P) -> rusqlite::Result<usize> {
        let mut stmt = self.prepare(sql)?;
        stmt.execute(params)
    }

    /// Opens a transaction on the shared connection.
    ///
    /// Dropping the transaction without committing rolls it back.
    pub(crate) fn transaction(&self) -> rusqlite::Result<Transaction<'_>> {
        self.conn.unchecked_transaction()
    }

    pub(crate) fn last_insert_rowid(&self) -> i64 {
        self.conn.last_insert_rowid()
    }
}
