//! Entry point wiring one database handle to every repository.
//!
//! # Invariants
//! - All repositories of a store share the same `Rc<Database>` and therefore
//!   the same connection and configuration.
//! - Repositories that materialize other entities share that entity's
//!   repository, and with it its identity cache.
//! - Repositories caching child rows are subscribed to the deletions of
//!   their parent rows.

use crate::db::{open_db_in_memory, open_db_with, Database, DbResult, StoreConfig};
use crate::repo::aggregated_repo::AggregatedRepository;
use crate::repo::cascade::CascadeTarget;
use crate::repo::geo_repo::GeoLocationRepository;
use crate::repo::list_repo::WineListRepository;
use crate::repo::note_repo::NoteRepository;
use crate::repo::review_repo::ReviewRepository;
use crate::repo::tour_repo::TourRepository;
use crate::repo::user_repo::UserRepository;
use crate::repo::vineyard_repo::VineyardRepository;
use crate::repo::wine_repo::WineRepository;
use crate::service::list_service::ListService;
use rusqlite::Connection;
use std::path::Path;
use std::rc::{Rc, Weak};

pub struct Store {
    db: Rc<Database>,
    wines: Rc<WineRepository>,
    vineyards: Rc<VineyardRepository>,
    notes: Rc<NoteRepository>,
    reviews: Rc<ReviewRepository>,
    geolocations: GeoLocationRepository,
    users: UserRepository,
    lists: Rc<WineListRepository>,
    tours: Rc<TourRepository>,
    aggregated: AggregatedRepository,
}

impl Store {
    /// Opens (and migrates) the database file at `path`.
    pub fn open(path: impl AsRef<Path>, config: StoreConfig) -> DbResult<Self> {
        let conn = open_db_with(path, &config)?;
        Ok(Self::from_connection(conn, config))
    }

    pub fn open_in_memory(config: StoreConfig) -> DbResult<Self> {
        let conn = open_db_in_memory()?;
        Ok(Self::from_connection(conn, config))
    }

    /// Builds a store over an already migrated connection.
    pub fn from_connection(conn: Connection, config: StoreConfig) -> Self {
        let db = Database::new(conn, config);
        let wines = Rc::new(WineRepository::new(Rc::clone(&db)));
        let vineyards = Rc::new(VineyardRepository::new(Rc::clone(&db)));
        let notes = Rc::new(NoteRepository::new(Rc::clone(&db)));
        let reviews = Rc::new(ReviewRepository::new(Rc::clone(&db), Rc::clone(&wines)));
        let lists = Rc::new(WineListRepository::new(Rc::clone(&db)));
        let tours = Rc::new(TourRepository::new(Rc::clone(&db)));
        let users = UserRepository::new(Rc::clone(&db));

        let note_target: Weak<dyn CascadeTarget> = Rc::downgrade(&notes) as Weak<_>;
        let review_target: Weak<dyn CascadeTarget> = Rc::downgrade(&reviews) as Weak<_>;
        let list_target: Weak<dyn CascadeTarget> = Rc::downgrade(&lists) as Weak<_>;
        let tour_target: Weak<dyn CascadeTarget> = Rc::downgrade(&tours) as Weak<_>;
        wines.attach_dependent(note_target.clone());
        wines.attach_dependent(review_target.clone());
        users.attach_dependent(note_target);
        users.attach_dependent(review_target);
        users.attach_dependent(list_target);
        users.attach_dependent(tour_target);

        let aggregated = AggregatedRepository::new(
            Rc::clone(&db),
            Rc::clone(&wines),
            Rc::clone(&vineyards),
            Rc::clone(&notes),
            Rc::clone(&reviews),
        );

        Self {
            geolocations: GeoLocationRepository::new(Rc::clone(&db)),
            users,
            lists,
            tours,
            db,
            wines,
            vineyards,
            notes,
            reviews,
            aggregated,
        }
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    pub fn wines(&self) -> &WineRepository {
        &self.wines
    }

    pub fn vineyards(&self) -> &VineyardRepository {
        &self.vineyards
    }

    pub fn notes(&self) -> &NoteRepository {
        &self.notes
    }

    pub fn reviews(&self) -> &ReviewRepository {
        &self.reviews
    }

    pub fn geolocations(&self) -> &GeoLocationRepository {
        &self.geolocations
    }

    pub fn users(&self) -> &UserRepository {
        &self.users
    }

    pub fn lists(&self) -> &WineListRepository {
        &self.lists
    }

    pub fn tours(&self) -> &TourRepository {
        &self.tours
    }

    pub fn aggregated(&self) -> &AggregatedRepository {
        &self.aggregated
    }

    pub fn list_service(&self) -> ListService<'_> {
        ListService::new(&self.lists)
    }
}
