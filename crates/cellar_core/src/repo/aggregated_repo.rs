//! Queries that materialize more than one entity per row.
//!
//! Each entity in a joined row is read under its aliased key column
//! (`wine_id`, `note_id`, `review_id`, `vineyard_id`) and goes through its
//! own repository's identity cache, so instances are shared with the
//! single-entity queries.

use crate::db::Database;
use crate::model::filters::ReviewFilters;
use crate::model::note::Note;
use crate::model::review::WineReview;
use crate::model::user::User;
use crate::model::vineyard::Vineyard;
use crate::model::wine::Wine;
use crate::model::wine_list::WineList;
use crate::model::Entity;
use crate::repo::materialize::query_rows;
use crate::repo::note_repo::{NoteRepository, NOTE_COLUMNS};
use crate::repo::query::QueryBuilder;
use crate::repo::review_repo::{ReviewRepository, REVIEW_COLUMNS};
use crate::repo::vineyard_repo::{VineyardRepository, VINEYARD_COLUMNS, VINEYARD_GEO_JOIN};
use crate::repo::wine_repo::{WineRepository, WINE_COLUMNS, WINE_GEO_JOIN};
use crate::repo::PagedRepository;
use log::error;
use rusqlite::params_from_iter;
use rusqlite::types::Value;
use std::rc::Rc;

pub struct AggregatedRepository {
    db: Rc<Database>,
    wines: Rc<WineRepository>,
    vineyards: Rc<VineyardRepository>,
    notes: Rc<NoteRepository>,
    reviews: Rc<ReviewRepository>,
}

impl AggregatedRepository {
    pub fn new(
        db: Rc<Database>,
        wines: Rc<WineRepository>,
        vineyards: Rc<VineyardRepository>,
        notes: Rc<NoteRepository>,
        reviews: Rc<ReviewRepository>,
    ) -> Self {
        Self {
            db,
            wines,
            vineyards,
            notes,
            reviews,
        }
    }

    /// Stored notes of `user`, each paired with its wine.
    pub fn notes_with_wines(&self, user: &User) -> Vec<(Rc<Note>, Rc<Wine>)> {
        let sql = format!(
            "SELECT {NOTE_COLUMNS}, {WINE_COLUMNS} FROM NOTES \
             JOIN WINE ON WINE.ID = NOTES.WINE_ID {WINE_GEO_JOIN} \
             WHERE NOTES.USERNAME = ?1 ORDER BY NOTES.ID ASC"
        );
        let fetched = query_rows(
            &self.db,
            &sql,
            vec![Value::Text(user.username.clone())],
            |row| {
                Ok((
                    self.notes.materialize_row(row, "note_id")?,
                    self.wines.materialize_row(row, "wine_id")?,
                ))
            },
        );
        fetched.unwrap_or_else(|err| {
            error!(
                "event=notes_with_wines module=repo status=error username={:?} error={}",
                user.username, err
            );
            Vec::new()
        })
    }

    /// Wines in `list`, in wine key order.
    pub fn wines_in_list(&self, list: &WineList) -> Vec<Rc<Wine>> {
        let sql = format!(
            "SELECT {WINE_COLUMNS} FROM LIST_ITEMS \
             JOIN WINE ON WINE.ID = LIST_ITEMS.WINE_ID {WINE_GEO_JOIN} \
             WHERE LIST_ITEMS.LIST_ID = ?1 ORDER BY WINE.ID ASC"
        );
        let fetched = query_rows(&self.db, &sql, vec![Value::Integer(list.key())], |row| {
            self.wines.materialize_row(row, "wine_id")
        });
        fetched.unwrap_or_else(|err| {
            error!(
                "event=list_wines module=repo status=error list_id={} error={}",
                list.key(),
                err
            );
            Vec::new()
        })
    }

    /// Wines in `list` with the epoch-millisecond time each was added,
    /// most recent first. Items stamped within the same millisecond come
    /// back in reverse insertion order.
    pub fn wines_with_dates(&self, list: &WineList) -> Vec<(Rc<Wine>, i64)> {
        let sql = format!(
            "SELECT {WINE_COLUMNS}, LIST_ITEMS.DATE_ADDED FROM LIST_ITEMS \
             JOIN WINE ON WINE.ID = LIST_ITEMS.WINE_ID {WINE_GEO_JOIN} \
             WHERE LIST_ITEMS.LIST_ID = ?1 \
             ORDER BY LIST_ITEMS.DATE_ADDED DESC, LIST_ITEMS.rowid DESC"
        );
        let fetched = query_rows(&self.db, &sql, vec![Value::Integer(list.key())], |row| {
            Ok((
                self.wines.materialize_row(row, "wine_id")?,
                row.get::<_, i64>("DATE_ADDED")?,
            ))
        });
        fetched.unwrap_or_else(|err| {
            error!(
                "event=list_wines module=repo status=error list_id={} error={}",
                list.key(),
                err
            );
            Vec::new()
        })
    }

    /// Wines whose winery matches the vineyard's name, ignoring case.
    pub fn wines_from_vineyard(&self, vineyard: &Vineyard) -> Vec<Rc<Wine>> {
        let sql = format!(
            "SELECT {WINE_COLUMNS} FROM WINE {WINE_GEO_JOIN} \
             WHERE WINE.WINERY LIKE ?1 ORDER BY WINE.ID ASC"
        );
        let fetched = query_rows(&self.db, &sql, vec![Value::Text(vineyard.name.get())], |row| {
            self.wines.materialize_row(row, "wine_id")
        });
        fetched.unwrap_or_else(|err| {
            error!(
                "event=vineyard_wines module=repo status=error vineyard_id={} error={}",
                vineyard.key(),
                err
            );
            Vec::new()
        })
    }

    /// Vineyards producing the wines in `list`.
    pub fn vineyards_in_list(&self, list: &WineList) -> Vec<Rc<Vineyard>> {
        let sql = format!(
            "SELECT DISTINCT {VINEYARD_COLUMNS} FROM LIST_ITEMS \
             JOIN WINE ON WINE.ID = LIST_ITEMS.WINE_ID \
             JOIN VINEYARD ON LOWER(VINEYARD.NAME) LIKE LOWER(WINE.WINERY) \
             {VINEYARD_GEO_JOIN} \
             WHERE LIST_ITEMS.LIST_ID = ?1 ORDER BY VINEYARD.ID ASC"
        );
        let fetched = query_rows(&self.db, &sql, vec![Value::Integer(list.key())], |row| {
            self.vineyards.materialize_row(row, "vineyard_id")
        });
        fetched.unwrap_or_else(|err| {
            error!(
                "event=list_vineyards module=repo status=error list_id={} error={}",
                list.key(),
                err
            );
            Vec::new()
        })
    }

    /// Reviews `begin..end` in review key order, each paired with its wine.
    pub fn reviews_with_wines(
        &self,
        begin: usize,
        end: usize,
        filters: Option<&ReviewFilters>,
    ) -> Vec<(Rc<WineReview>, Rc<Wine>)> {
        let mut builder = QueryBuilder::new(&format!(
            "SELECT {REVIEW_COLUMNS}, {WINE_COLUMNS} FROM WINE_REVIEW \
             JOIN WINE ON WINE.ID = WINE_REVIEW.WINE_ID {WINE_GEO_JOIN}"
        ));
        if let Some(filters) = filters {
            apply_review_filters(&mut builder, filters);
        }
        builder.order_by("WINE_REVIEW.ID").range(begin, end);

        let (sql, params) = builder.build();
        let fetched = query_rows(&self.db, &sql, params, |row| {
            Ok((
                self.reviews.materialize_row(row, "review_id")?,
                self.wines.materialize_row(row, "wine_id")?,
            ))
        });
        fetched.unwrap_or_else(|err| {
            error!(
                "event=reviews_with_wines module=repo status=error begin={begin} end={end} error={err}"
            );
            Vec::new()
        })
    }

    /// Reviews matching `filters`, `-1` when the count failed.
    pub fn reviews_with_wines_count(&self, filters: Option<&ReviewFilters>) -> i64 {
        let mut builder = QueryBuilder::new(
            "SELECT COUNT(*) FROM WINE_REVIEW JOIN WINE ON WINE.ID = WINE_REVIEW.WINE_ID",
        );
        if let Some(filters) = filters {
            apply_review_filters(&mut builder, filters);
        }
        let (sql, params) = builder.build();
        let counted = self
            .db
            .prepare(&sql)
            .and_then(|mut stmt| stmt.query_row(params_from_iter(params), |row| row.get(0)));
        counted.unwrap_or_else(|err| {
            error!("event=reviews_with_wines_count module=repo status=error error={err}");
            -1
        })
    }
}

impl PagedRepository for AggregatedRepository {
    type Item = (Rc<WineReview>, Rc<Wine>);
    type Filters = ReviewFilters;

    fn fetch_range(
        &self,
        begin: usize,
        end: usize,
        filters: Option<&ReviewFilters>,
    ) -> Vec<Self::Item> {
        self.reviews_with_wines(begin, end, filters)
    }

    fn count(&self, filters: Option<&ReviewFilters>) -> i64 {
        self.reviews_with_wines_count(filters)
    }
}

fn apply_review_filters(builder: &mut QueryBuilder, filters: &ReviewFilters) {
    builder
        .contains("WINE_REVIEW.USERNAME", &filters.username)
        .contains("WINE.TITLE", &filters.wine_title)
        .between("WINE_REVIEW.RATING", &filters.rating);
}
