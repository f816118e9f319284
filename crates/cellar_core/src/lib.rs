//! Core storage layer for the wine and vineyard catalogue.
//! Every persistent entity is read, cached, written through and counted here.

pub mod cache;
pub mod db;
pub mod logging;
pub mod model;
pub mod repo;
pub mod service;
pub mod store;

pub use cache::IdentityCache;
pub use db::{Database, DbError, DbResult, StoreConfig, DEFAULT_BATCH_SIZE};
pub use logging::{default_log_level, init_logging, logging_status, LogLevel};
pub use model::filters::{RangeFilter, ReviewFilters, VineyardFilters, WineFilters};
pub use model::geo::{GeoLocation, GeoResolver};
pub use model::note::Note;
pub use model::property::Property;
pub use model::review::WineReview;
pub use model::stats::{Bounds, VineyardStats, WineStats};
pub use model::tour::VineyardTour;
pub use model::user::{User, UserRole};
pub use model::vineyard::{Vineyard, VineyardRecord};
pub use model::wine::{vintage_from_title, Wine, WineRecord};
pub use model::wine_list::{WineList, FAVOURITES_LIST, HISTORY_LIST};
pub use model::{Entity, EntityKey, UNPERSISTED_KEY};
pub use repo::batch::BatchReport;
pub use repo::{PagedRepository, RepoError, RepoResult};
pub use service::list_service::ListService;
pub use service::page_service::{page_count, Pager};
pub use store::Store;

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

#[cfg(test)]
mod tests {
    use super::core_version;

    #[test]
    fn version_is_not_empty() {
        assert!(!core_version().is_empty());
    }
}
