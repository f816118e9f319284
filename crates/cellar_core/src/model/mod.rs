//! Domain model for the wine catalogue.
//!
//! # Responsibility
//! - Define the persisted entities (wines, vineyards, tours, lists, notes,
//!   reviews, users) and the plain value types around them.
//! - Expose mutable entity fields as observable [`Property`] values so the
//!   persistence layer can subscribe write-through listeners.
//!
//! # Invariants
//! - Every cached entity is identified by a numeric surrogate key.
//! - [`UNPERSISTED_KEY`] marks an object with no backing row; such objects
//!   never cause a database write.

pub mod filters;
pub mod geo;
pub mod note;
pub mod property;
pub mod review;
pub mod stats;
pub mod tour;
pub mod user;
pub mod vineyard;
pub mod wine;
pub mod wine_list;

/// Numeric surrogate key of a persisted row.
pub type EntityKey = i64;

/// Key carried by objects that are not (or no longer) backed by a row.
pub const UNPERSISTED_KEY: EntityKey = -1;

/// Common surface of identity-cached entities.
pub trait Entity: 'static {
    /// Human-readable entity name used in log lines.
    const KIND: &'static str;

    /// Current key, [`UNPERSISTED_KEY`] when not backed by a row.
    fn key(&self) -> EntityKey;

    fn is_persisted(&self) -> bool {
        self.key() != UNPERSISTED_KEY
    }
}
