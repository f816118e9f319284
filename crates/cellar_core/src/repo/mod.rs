//! Repository layer: identity-cached, write-through persistence for every
//! catalogue entity.
//!
//! # Responsibility
//! - Materialize query rows into shared entity instances.
//! - Bind entity properties so field changes reach storage immediately.
//! - Build filtered, paginated queries and bulk writes.
//!
//! # Invariants
//! - Internal helpers return [`RepoResult`] and propagate with `?`.
//! - Public repository methods never return errors: failures are logged at
//!   `error` level and surface as an empty sequence, `None`, `false` or a
//!   negative count. An empty result therefore does not prove the query ran.

use crate::db::DbError;
use std::error::Error;
use std::fmt::{Display, Formatter};

pub mod aggregated_repo;
pub mod batch;
pub(crate) mod binder;
pub(crate) mod cascade;
pub mod geo_repo;
pub mod list_repo;
pub(crate) mod materialize;
pub mod note_repo;
pub(crate) mod query;
pub mod review_repo;
pub mod tour_repo;
pub mod user_repo;
pub mod vineyard_repo;
pub mod wine_repo;

pub type RepoResult<T> = Result<T, RepoError>;

/// Failure inside a repository operation.
#[derive(Debug)]
pub enum RepoError {
    Db(DbError),
    Csv(csv::Error),
    /// A stored value could not be mapped onto the model.
    InvalidData(String),
    /// The operation needs a persisted entity but got an unpersisted one.
    Unpersisted(&'static str),
    /// The operation is not allowed on this entity.
    Rejected(String),
}

impl Display for RepoError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Db(err) => write!(f, "{err}"),
            Self::Csv(err) => write!(f, "csv: {err}"),
            Self::InvalidData(message) => write!(f, "invalid persisted data: {message}"),
            Self::Unpersisted(kind) => write!(f, "{kind} is not persisted"),
            Self::Rejected(message) => write!(f, "rejected: {message}"),
        }
    }
}

impl Error for RepoError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Db(err) => Some(err),
            Self::Csv(err) => Some(err),
            Self::InvalidData(_) | Self::Unpersisted(_) | Self::Rejected(_) => None,
        }
    }
}

impl From<DbError> for RepoError {
    fn from(value: DbError) -> Self {
        Self::Db(value)
    }
}

impl From<rusqlite::Error> for RepoError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Db(DbError::Sqlite(value))
    }
}

impl From<csv::Error> for RepoError {
    fn from(value: csv::Error) -> Self {
        Self::Csv(value)
    }
}

/// Fetch-by-range surface shared by the paged catalogue repositories.
pub trait PagedRepository {
    type Item;
    type Filters;

    /// Rows `begin..end` in key order, optionally filtered.
    fn fetch_range(
        &self,
        begin: usize,
        end: usize,
        filters: Option<&Self::Filters>,
    ) -> Vec<Self::Item>;

    /// Rows matching `filters`, or `-1` when the count query failed.
    fn count(&self, filters: Option<&Self::Filters>) -> i64;
}
