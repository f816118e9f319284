//! Wine reviews, their moderation flags and the derived average rating.
//!
//! # Invariants
//! - One review per (user, wine).
//! - Adding, deleting or re-rating a review recomputes the wine's average
//!   rating and assigns it through the wine's write-through property.
//! - Reviews cascading away with their wine or user are released from the
//!   cache and unpersisted; removing every user also zeroes the averages.
//! - Review columns are selected with fixed aliases (`review_id`,
//!   `review_wine_id`, `review_description`) so they never collide with
//!   wine columns in joins.

use crate::cache::IdentityCache;
use crate::db::Database;
use crate::model::review::{now_epoch_ms, ReviewFields, WineReview, RATING_RANGE};
use crate::model::user::User;
use crate::model::wine::Wine;
use crate::model::{Entity, EntityKey, UNPERSISTED_KEY};
use crate::repo::binder::{flag_value, real_value, text_value, WriteThrough};
use crate::repo::cascade::{Cascade, CascadeTarget};
use crate::repo::materialize::{materialize, query_rows};
use crate::repo::query::QueryBuilder;
use crate::repo::wine_repo::WineRepository;
use crate::repo::{RepoError, RepoResult};
use log::{debug, error, info};
use rusqlite::types::Value;
use rusqlite::{params, Row};
use std::collections::BTreeSet;
use std::rc::Rc;

pub(crate) const REVIEW_COLUMNS: &str = "WINE_REVIEW.ID AS review_id, WINE_REVIEW.USERNAME, \
     WINE_REVIEW.WINE_ID AS review_wine_id, WINE_REVIEW.RATING, \
     WINE_REVIEW.DESCRIPTION AS review_description, WINE_REVIEW.DATE, WINE_REVIEW.FLAGGED";

/// Recomputes average ratings; shared with every review's rating listener.
struct RatingSync {
    db: Rc<Database>,
    wines: Rc<WineRepository>,
}

impl RatingSync {
    fn average(&self, wine_id: EntityKey) -> rusqlite::Result<f64> {
        self.db
            .prepare("SELECT COALESCE(AVG(RATING), 0) FROM WINE_REVIEW WHERE WINE_ID = ?1")?
            .query_row(params![wine_id], |row| row.get(0))
    }

    fn refresh(&self, wine: &Wine) -> bool {
        match self.average(wine.key()) {
            Ok(average) => {
                wine.average_rating.set(average);
                debug!(
                    "event=rating_refresh module=repo status=ok wine_id={} average={}",
                    wine.key(),
                    average
                );
                true
            }
            Err(err) => {
                error!(
                    "event=rating_refresh module=repo status=error wine_id={} error={}",
                    wine.key(),
                    err
                );
                false
            }
        }
    }

    fn refresh_by_id(&self, wine_id: EntityKey) {
        if let Some(wine) = self.wines.get_by_id(wine_id) {
            self.refresh(&wine);
        }
    }

    /// Zeroes every stored average once no review is left.
    fn reset_all(&self) {
        if let Err(err) = self
            .db
            .execute("UPDATE WINE SET AVG_RATING = 0 WHERE AVG_RATING <> 0", [])
        {
            error!("event=rating_reset module=repo status=error error={err}");
            return;
        }
        for wine in self.wines.cache().live() {
            self.refresh(&wine);
        }
    }
}

pub struct ReviewRepository {
    db: Rc<Database>,
    cache: IdentityCache<WineReview>,
    writer: WriteThrough,
    ratings: Rc<RatingSync>,
}

impl ReviewRepository {
    pub fn new(db: Rc<Database>, wines: Rc<WineRepository>) -> Self {
        Self {
            writer: WriteThrough::new(Rc::clone(&db), "WINE_REVIEW"),
            ratings: Rc::new(RatingSync {
                db: Rc::clone(&db),
                wines,
            }),
            db,
            cache: IdentityCache::new(WineReview::KIND),
        }
    }

    pub fn cache(&self) -> &IdentityCache<WineReview> {
        &self.cache
    }

    /// Stores a review dated now and refreshes the wine's average rating.
    ///
    /// Ratings outside 1..=5 and a second review by the same user are
    /// refused.
    pub fn add(
        &self,
        user: &User,
        wine: &Wine,
        rating: f64,
        description: &str,
    ) -> Option<Rc<WineReview>> {
        match self.try_add(user, wine, rating, description) {
            Ok(review) => {
                info!(
                    "event=review_add module=repo status=ok id={} wine_id={}",
                    review.key(),
                    wine.key()
                );
                self.ratings.refresh(wine);
                Some(review)
            }
            Err(err) => {
                error!(
                    "event=review_add module=repo status=error username={:?} wine_id={} error={}",
                    user.username,
                    wine.key(),
                    err
                );
                None
            }
        }
    }

    /// Deletes `review` and refreshes its wine's average rating.
    pub fn delete(&self, review: &WineReview) -> bool {
        let id = review.key();
        if id == UNPERSISTED_KEY {
            return false;
        }
        match self.db.execute("DELETE FROM WINE_REVIEW WHERE ID = ?1", params![id]) {
            Ok(changed) => {
                self.cache.release(id);
                review.unpersist();
                info!("event=review_delete module=repo status=ok id={id} rows={changed}");
                self.ratings.refresh_by_id(review.wine_id());
                changed == 1
            }
            Err(err) => {
                error!("event=review_delete module=repo status=error id={id} error={err}");
                false
            }
        }
    }

    /// Recomputes the mean rating of `wine` and assigns it to
    /// `wine.average_rating`, which writes it through.
    pub fn refresh_average_rating(&self, wine: &Wine) -> bool {
        self.ratings.refresh(wine)
    }

    pub fn get_user_review(&self, user: &User, wine: &Wine) -> Option<Rc<WineReview>> {
        let mut builder = select_builder();
        builder
            .equals("WINE_REVIEW.USERNAME", user.username.clone())
            .equals("WINE_REVIEW.WINE_ID", wine.key());
        self.fetch("review_get_user", &builder).into_iter().next()
    }

    /// Reviews of `wine`, newest first.
    pub fn get_for_wine(&self, wine: &Wine) -> Vec<Rc<WineReview>> {
        let mut builder = select_builder();
        builder
            .equals("WINE_REVIEW.WINE_ID", wine.key())
            .order_by("WINE_REVIEW.DATE DESC, WINE_REVIEW.ID");
        self.fetch("review_for_wine", &builder)
    }

    pub fn get_for_user(&self, user: &User) -> Vec<Rc<WineReview>> {
        let mut builder = select_builder();
        builder
            .equals("WINE_REVIEW.USERNAME", user.username.clone())
            .order_by("WINE_REVIEW.ID");
        self.fetch("review_for_user", &builder)
    }

    pub fn get_all_in_range(&self, begin: usize, end: usize) -> Vec<Rc<WineReview>> {
        let mut builder = select_builder();
        builder.order_by("WINE_REVIEW.ID").range(begin, end);
        self.fetch("review_range", &builder)
    }

    pub fn get_count(&self) -> i64 {
        let counted = self
            .db
            .prepare("SELECT COUNT(*) FROM WINE_REVIEW")
            .and_then(|mut stmt| stmt.query_row([], |row| row.get(0)));
        counted.unwrap_or_else(|err| {
            error!("event=review_count module=repo status=error error={err}");
            -1
        })
    }

    /// Reviews flagged for moderation, in key order.
    pub fn get_flagged(&self) -> Vec<Rc<WineReview>> {
        let mut builder = select_builder();
        builder
            .equals("WINE_REVIEW.FLAGGED", 1_i64)
            .order_by("WINE_REVIEW.ID");
        self.fetch("review_flagged", &builder)
    }

    /// Deletes every flagged review. Returns the number of rows removed, or
    /// `-1` on failure.
    pub fn delete_all_flagged(&self) -> i64 {
        self.delete_where("review_delete_flagged", "FLAGGED = 1", Vec::new())
    }

    /// Deletes every review written by `user`.
    pub fn delete_all_from_user(&self, user: &User) -> i64 {
        self.delete_where(
            "review_delete_user",
            "USERNAME = ?1",
            vec![Value::Text(user.username.clone())],
        )
    }

    /// Materializes the review part of a row selected with
    /// [`REVIEW_COLUMNS`].
    pub(crate) fn materialize_row(
        &self,
        row: &Row<'_>,
        id_column: &str,
    ) -> rusqlite::Result<Rc<WineReview>> {
        materialize(
            row,
            id_column,
            &self.cache,
            self.db.use_cache(),
            review_from_row,
            |review| self.bind(review),
        )
    }

    fn try_add(
        &self,
        user: &User,
        wine: &Wine,
        rating: f64,
        description: &str,
    ) -> RepoResult<Rc<WineReview>> {
        if !wine.is_persisted() {
            return Err(RepoError::Unpersisted(Wine::KIND));
        }
        let (low, high) = RATING_RANGE;
        if !(low..=high).contains(&rating) {
            return Err(RepoError::Rejected(format!(
                "rating {rating} outside {low}..={high}"
            )));
        }

        let date = now_epoch_ms();
        self.db.execute(
            "INSERT INTO WINE_REVIEW (USERNAME, WINE_ID, RATING, DESCRIPTION, DATE) \
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![user.username, wine.key(), rating, description, date],
        )?;
        let id = self.db.last_insert_rowid();
        let review = WineReview::with_key(
            id,
            ReviewFields {
                username: user.username.clone(),
                wine_id: wine.key(),
                rating,
                description: description.to_string(),
                date,
                flagged: false,
            },
        );
        if self.db.use_cache() {
            self.cache.register(id, &review);
        }
        self.bind(&review);
        Ok(review)
    }

    fn delete_where(&self, event: &str, predicate: &str, params: Vec<Value>) -> i64 {
        match self.try_delete_where(predicate, params) {
            Ok(changed) => {
                info!("event={event} module=repo status=ok rows={changed}");
                changed
            }
            Err(err) => {
                error!("event={event} module=repo status=error error={err}");
                -1
            }
        }
    }

    fn try_delete_where(&self, predicate: &str, params: Vec<Value>) -> RepoResult<i64> {
        let tx = self.db.transaction()?;
        let affected = query_rows(
            &self.db,
            &format!("SELECT ID, WINE_ID FROM WINE_REVIEW WHERE {predicate}"),
            params.clone(),
            |row| Ok((row.get::<_, EntityKey>(0)?, row.get::<_, EntityKey>(1)?)),
        )?;
        let changed = self.db.execute(
            &format!("DELETE FROM WINE_REVIEW WHERE {predicate}"),
            rusqlite::params_from_iter(params),
        )?;
        tx.commit()?;

        let mut wine_ids = BTreeSet::new();
        for (id, wine_id) in affected {
            if let Some(review) = self.cache.try_get(id) {
                review.unpersist();
            }
            self.cache.release(id);
            wine_ids.insert(wine_id);
        }
        for wine_id in wine_ids {
            self.ratings.refresh_by_id(wine_id);
        }
        Ok(i64::try_from(changed).unwrap_or(i64::MAX))
    }

    fn fetch(&self, event: &str, builder: &QueryBuilder) -> Vec<Rc<WineReview>> {
        let (sql, params) = builder.build();
        query_rows(&self.db, &sql, params, |row| {
            self.materialize_row(row, "review_id")
        })
        .unwrap_or_else(|err| {
            error!("event={event} module=repo status=error error={err}");
            Vec::new()
        })
    }

    fn bind(&self, review: &Rc<WineReview>) {
        let w = &self.writer;
        w.bind(review, &review.rating, "RATING", real_value);
        w.bind(review, &review.description, "DESCRIPTION", text_value);
        w.bind(review, &review.flagged, "FLAGGED", flag_value);

        let owner = Rc::downgrade(review);
        let ratings = Rc::clone(&self.ratings);
        review.rating.subscribe(move |_, _| {
            if let Some(review) = owner.upgrade() {
                if review.is_persisted() {
                    ratings.refresh_by_id(review.wine_id());
                }
            }
        });
    }
}

impl CascadeTarget for ReviewRepository {
    fn parent_deleted(&self, cascade: Cascade) {
        let released = match cascade {
            Cascade::Wine(wine_id) => self
                .cache
                .release_matching(|review| review.wine_id() == wine_id),
            Cascade::AllWines | Cascade::AllUsers => self.cache.drain(),
        };
        for review in &released {
            review.unpersist();
        }
        debug!(
            "event=review_cascade module=repo status=ok cascade={:?} released={}",
            cascade,
            released.len()
        );
        if cascade == Cascade::AllUsers {
            self.ratings.reset_all();
        }
    }
}

fn select_builder() -> QueryBuilder {
    QueryBuilder::new(&format!("SELECT {REVIEW_COLUMNS} FROM WINE_REVIEW"))
}

fn review_from_row(key: EntityKey, row: &Row<'_>) -> rusqlite::Result<Rc<WineReview>> {
    Ok(WineReview::with_key(
        key,
        ReviewFields {
            username: row.get("USERNAME")?,
            wine_id: row.get("review_wine_id")?,
            rating: row.get("RATING")?,
            description: row.get("review_description")?,
            date: row.get("DATE")?,
            flagged: row.get("FLAGGED")?,
        },
    ))
}
