//! Per-user vineyard tours.

use crate::cache::IdentityCache;
use crate::db::Database;
use crate::model::tour::VineyardTour;
use crate::model::user::User;
use crate::model::vineyard::Vineyard;
use crate::model::{Entity, EntityKey, UNPERSISTED_KEY};
use crate::repo::binder::{text_value, WriteThrough};
use crate::repo::cascade::{Cascade, CascadeTarget};
use crate::repo::materialize::{materialize, query_rows};
use crate::repo::{RepoError, RepoResult};
use log::{debug, error, info};
use rusqlite::types::Value;
use rusqlite::{params, Row};
use std::rc::Rc;

pub struct TourRepository {
    db: Rc<Database>,
    cache: IdentityCache<VineyardTour>,
    writer: WriteThrough,
}

impl TourRepository {
    pub fn new(db: Rc<Database>) -> Self {
        Self {
            writer: WriteThrough::new(Rc::clone(&db), "VINEYARD_TOUR"),
            db,
            cache: IdentityCache::new(VineyardTour::KIND),
        }
    }

    pub fn create(&self, user: &User, name: &str) -> Option<Rc<VineyardTour>> {
        match self.try_create(user, name) {
            Ok(tour) => {
                info!(
                    "event=tour_create module=repo status=ok id={} username={:?}",
                    tour.key(),
                    user.username
                );
                Some(tour)
            }
            Err(err) => {
                error!(
                    "event=tour_create module=repo status=error username={:?} error={}",
                    user.username, err
                );
                None
            }
        }
    }

    /// Deletes `tour`; its items cascade.
    pub fn remove(&self, tour: &VineyardTour) -> bool {
        let id = tour.key();
        if id == UNPERSISTED_KEY {
            debug!("event=tour_remove module=repo status=skip reason=unpersisted");
            return false;
        }
        match self.db.execute("DELETE FROM VINEYARD_TOUR WHERE ID = ?1", params![id]) {
            Ok(changed) => {
                self.cache.release(id);
                tour.unpersist();
                info!("event=tour_remove module=repo status=ok id={id} rows={changed}");
                changed == 1
            }
            Err(err) => {
                error!("event=tour_remove module=repo status=error id={id} error={err}");
                false
            }
        }
    }

    pub fn get_all(&self, user: &User) -> Vec<Rc<VineyardTour>> {
        let fetched = query_rows(
            &self.db,
            "SELECT ID AS tour_id, USERNAME, NAME FROM VINEYARD_TOUR WHERE USERNAME = ?1 ORDER BY ID ASC",
            vec![Value::Text(user.username.clone())],
            |row| self.materialize_row(row),
        );
        fetched.unwrap_or_else(|err| {
            error!(
                "event=tour_get_all module=repo status=error username={:?} error={}",
                user.username, err
            );
            Vec::new()
        })
    }

    pub fn is_vineyard_in_tour(&self, tour: &VineyardTour, vineyard: &Vineyard) -> bool {
        let found = self
            .db
            .prepare(
                "SELECT EXISTS (SELECT 1 FROM VINEYARD_TOUR_ITEM WHERE TOUR_ID = ?1 AND VINEYARD_ID = ?2)",
            )
            .and_then(|mut stmt| {
                stmt.query_row(params![tour.key(), vineyard.key()], |row| {
                    row.get::<_, bool>(0)
                })
            });
        found.unwrap_or_else(|err| {
            error!(
                "event=tour_contains module=repo status=error tour_id={} vineyard_id={} error={}",
                tour.key(),
                vineyard.key(),
                err
            );
            false
        })
    }

    /// Adds `vineyard` to `tour`. Adding it twice is a no-op that returns
    /// `false`.
    pub fn add_vineyard(&self, tour: &VineyardTour, vineyard: &Vineyard) -> bool {
        let inserted = self.db.execute(
            "INSERT OR IGNORE INTO VINEYARD_TOUR_ITEM (TOUR_ID, VINEYARD_ID) VALUES (?1, ?2)",
            params![tour.key(), vineyard.key()],
        );
        match inserted {
            Ok(changed) => changed == 1,
            Err(err) => {
                error!(
                    "event=tour_add_vineyard module=repo status=error tour_id={} vineyard_id={} error={}",
                    tour.key(),
                    vineyard.key(),
                    err
                );
                false
            }
        }
    }

    pub fn remove_vineyard(&self, tour: &VineyardTour, vineyard: &Vineyard) -> bool {
        let removed = self.db.execute(
            "DELETE FROM VINEYARD_TOUR_ITEM WHERE TOUR_ID = ?1 AND VINEYARD_ID = ?2",
            params![tour.key(), vineyard.key()],
        );
        match removed {
            Ok(changed) => changed == 1,
            Err(err) => {
                error!(
                    "event=tour_remove_vineyard module=repo status=error tour_id={} vineyard_id={} error={}",
                    tour.key(),
                    vineyard.key(),
                    err
                );
                false
            }
        }
    }

    fn try_create(&self, user: &User, name: &str) -> RepoResult<Rc<VineyardTour>> {
        if name.trim().is_empty() {
            return Err(RepoError::Rejected("tour name must not be blank".to_string()));
        }
        self.db.execute(
            "INSERT INTO VINEYARD_TOUR (USERNAME, NAME) VALUES (?1, ?2)",
            params![user.username, name],
        )?;
        let id = self.db.last_insert_rowid();
        let tour = VineyardTour::with_key(id, user.username.clone(), name.to_string());
        if self.db.use_cache() {
            self.cache.register(id, &tour);
        }
        self.bind(&tour);
        Ok(tour)
    }

    fn materialize_row(&self, row: &Row<'_>) -> rusqlite::Result<Rc<VineyardTour>> {
        materialize(
            row,
            "tour_id",
            &self.cache,
            self.db.use_cache(),
            tour_from_row,
            |tour| self.bind(tour),
        )
    }

    fn bind(&self, tour: &Rc<VineyardTour>) {
        self.writer.bind(tour, &tour.name, "NAME", text_value);
    }
}

impl CascadeTarget for TourRepository {
    fn parent_deleted(&self, cascade: Cascade) {
        if cascade != Cascade::AllUsers {
            return;
        }
        for tour in self.cache.drain() {
            tour.unpersist();
        }
    }
}

fn tour_from_row(key: EntityKey, row: &Row<'_>) -> rusqlite::Result<Rc<VineyardTour>> {
    Ok(VineyardTour::with_key(key, row.get("USERNAME")?, row.get("NAME")?))
}
