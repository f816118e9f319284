//! Wine repository: cached reads, write-through updates, bulk loads and
//! catalogue statistics.
//!
//! # Responsibility
//! - Serve wines by id and by filtered, key-ordered ranges.
//! - Insert, delete and bulk-replace wine rows.
//! - Rebuild [`WineStats`] on request.
//!
//! # Invariants
//! - Geolocation is resolved by a case-insensitive pattern join of
//!   `WINE.REGION` on `GEOLOCATION.NAME`; there is no foreign key.
//! - Statistics change only in [`WineRepository::update_uniques`].
//! - Deleting rows resets the key of every affected live instance to the
//!   unpersisted sentinel, including cached notes and reviews of the
//!   deleted wines.

use crate::cache::IdentityCache;
use crate::db::Database;
use crate::model::filters::WineFilters;
use crate::model::stats::WineStats;
use crate::model::wine::{Wine, WineRecord};
use crate::model::{Entity, EntityKey, UNPERSISTED_KEY};
use crate::repo::batch::{BatchReport, BatchWriter};
use crate::repo::binder::{int_value, real_value, text_value, WriteThrough};
use crate::repo::cascade::{Cascade, CascadeTarget, Dependents};
use crate::repo::materialize::{materialize, query_rows, read_geolocation, text_or_empty};
use crate::repo::query::QueryBuilder;
use crate::repo::{PagedRepository, RepoError, RepoResult};
use log::{debug, error, info, warn};
use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, Row};
use std::cell::RefCell;
use std::rc::{Rc, Weak};
use std::time::Instant;

/// Wine columns plus joined coordinates, with the key aliased to `wine_id`.
pub(crate) const WINE_COLUMNS: &str = "WINE.ID AS wine_id, WINE.TITLE, WINE.VARIETY, \
     WINE.COUNTRY, WINE.REGION, WINE.WINERY, WINE.COLOR, WINE.VINTAGE, WINE.DESCRIPTION, \
     WINE.SCORE, WINE.ABV, WINE.PRICE, WINE.AVG_RATING, \
     GEOLOCATION.LATITUDE, GEOLOCATION.LONGITUDE";

pub(crate) const WINE_GEO_JOIN: &str =
    "LEFT JOIN GEOLOCATION ON LOWER(WINE.REGION) LIKE LOWER(GEOLOCATION.NAME)";

const INSERT_WINE_SQL: &str = "INSERT INTO WINE (
    TITLE, VARIETY, COUNTRY, REGION, WINERY, COLOR, VINTAGE,
    DESCRIPTION, SCORE, ABV, PRICE, AVG_RATING
) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)";

const STATS_SQL: &str = "SELECT COUNTRY, WINERY, COLOR, VINTAGE, SCORE, ABV, PRICE FROM WINE";

pub struct WineRepository {
    db: Rc<Database>,
    cache: IdentityCache<Wine>,
    writer: WriteThrough,
    stats: RefCell<WineStats>,
    dependents: Dependents,
}

impl WineRepository {
    pub fn new(db: Rc<Database>) -> Self {
        Self {
            writer: WriteThrough::new(Rc::clone(&db), "WINE"),
            db,
            cache: IdentityCache::new(Wine::KIND),
            stats: RefCell::new(WineStats::default()),
            dependents: Dependents::default(),
        }
    }

    /// Subscribes `target` to wine deletions.
    pub(crate) fn attach_dependent(&self, target: Weak<dyn CascadeTarget>) {
        self.dependents.attach(target);
    }

    pub fn cache(&self) -> &IdentityCache<Wine> {
        &self.cache
    }

    /// Returns the wine with key `id`, or `None` when there is no such row
    /// or the lookup failed.
    pub fn get_by_id(&self, id: EntityKey) -> Option<Rc<Wine>> {
        let mut builder = select_builder();
        builder.equals("WINE.ID", id);
        match self.fetch(&builder) {
            Ok(wines) => wines.into_iter().next(),
            Err(err) => {
                error!("event=wine_get module=repo status=error id={id} error={err}");
                None
            }
        }
    }

    /// Every wine, ordered by key.
    pub fn get_all(&self) -> Vec<Rc<Wine>> {
        let mut builder = select_builder();
        builder.order_by("WINE.ID");
        self.fetch_logged("wine_get_all", &builder)
    }

    /// Wines `begin..end` (zero-based, end exclusive) in key order,
    /// optionally filtered.
    pub fn get_all_in_range(
        &self,
        begin: usize,
        end: usize,
        filters: Option<&WineFilters>,
    ) -> Vec<Rc<Wine>> {
        let mut builder = select_builder();
        if let Some(filters) = filters {
            apply_filters(&mut builder, filters);
        }
        builder.order_by("WINE.ID").range(begin, end);
        self.fetch_logged("wine_range", &builder)
    }

    /// Number of wines matching `filters`, `-1` when the count failed.
    pub fn get_count(&self, filters: Option<&WineFilters>) -> i64 {
        let mut builder = QueryBuilder::new("SELECT COUNT(*) FROM WINE");
        if let Some(filters) = filters {
            apply_filters(&mut builder, filters);
        }
        let (sql, params) = builder.build();
        let counted = self
            .db
            .prepare(&sql)
            .and_then(|mut stmt| stmt.query_row(params_from_iter(params), |row| row.get(0)));
        match counted {
            Ok(count) => count,
            Err(err) => {
                error!("event=wine_count module=repo status=error error={err}");
                -1
            }
        }
    }

    /// Inserts `wine`, assigns its key, caches and binds it.
    ///
    /// Returns `false` if `wine` is already persisted or the insert failed.
    pub fn add(&self, wine: &Rc<Wine>) -> bool {
        if wine.is_persisted() {
            warn!(
                "event=wine_add module=repo status=skip id={} reason=already_persisted",
                wine.key()
            );
            return false;
        }

        let started_at = Instant::now();
        match self.try_add(wine) {
            Ok(id) => {
                info!(
                    "event=wine_add module=repo status=ok id={} duration_ms={}",
                    id,
                    started_at.elapsed().as_millis()
                );
                true
            }
            Err(err) => {
                error!(
                    "event=wine_add module=repo status=error title={:?} duration_ms={} error={}",
                    wine.title.get(),
                    started_at.elapsed().as_millis(),
                    err
                );
                false
            }
        }
    }

    /// Bulk insert in configured chunks, each chunk committed on its own.
    ///
    /// Inserted rows get fresh keys that are not reported back; re-query to
    /// obtain the entities.
    pub fn add_all(&self, records: &[WineRecord]) -> BatchReport {
        BatchWriter::new(&self.db, "wine").insert_chunked(INSERT_WINE_SQL, records, record_params)
    }

    /// Deletes the row behind `wine` and resets its key.
    pub fn remove(&self, wine: &Rc<Wine>) -> bool {
        let id = wine.key();
        if id == UNPERSISTED_KEY {
            debug!("event=wine_remove module=repo status=skip reason=unpersisted");
            return false;
        }

        match self.db.execute("DELETE FROM WINE WHERE ID = ?1", params![id]) {
            Ok(changed) => {
                self.cache.release(id);
                wine.set_key(UNPERSISTED_KEY);
                self.dependents.notify(Cascade::Wine(id));
                info!("event=wine_remove module=repo status=ok id={id} rows={changed}");
                changed == 1
            }
            Err(err) => {
                error!("event=wine_remove module=repo status=error id={id} error={err}");
                false
            }
        }
    }

    /// Deletes every wine. Statistics are left as they were until the next
    /// [`WineRepository::update_uniques`].
    pub fn remove_all(&self) -> bool {
        match self.db.execute("DELETE FROM WINE", []) {
            Ok(changed) => {
                self.forget_cached();
                info!("event=wine_remove_all module=repo status=ok rows={changed}");
                true
            }
            Err(err) => {
                error!("event=wine_remove_all module=repo status=error error={err}");
                false
            }
        }
    }

    /// Atomically replaces the whole table with `records`.
    pub fn replace_all(&self, records: &[WineRecord]) -> BatchReport {
        let report = BatchWriter::new(&self.db, "wine").replace_all(
            "DELETE FROM WINE",
            INSERT_WINE_SQL,
            records,
            record_params,
        );
        if report.completed {
            self.forget_cached();
        }
        report
    }

    /// Rebuilds unique country/winery/color sets and numeric bounds from a
    /// full scan. Previous statistics are discarded first.
    pub fn update_uniques(&self) {
        let started_at = Instant::now();
        *self.stats.borrow_mut() = WineStats::default();

        match self.scan_stats() {
            Ok(stats) => {
                info!(
                    "event=wine_stats module=repo status=ok countries={} wineries={} colors={} duration_ms={}",
                    stats.countries.len(),
                    stats.wineries.len(),
                    stats.colors.len(),
                    started_at.elapsed().as_millis()
                );
                *self.stats.borrow_mut() = stats;
            }
            Err(err) => {
                error!(
                    "event=wine_stats module=repo status=error duration_ms={} error={}",
                    started_at.elapsed().as_millis(),
                    err
                );
            }
        }
    }

    /// Statistics as of the last [`WineRepository::update_uniques`].
    pub fn stats(&self) -> WineStats {
        self.stats.borrow().clone()
    }

    /// Materializes the wine part of a row selected with [`WINE_COLUMNS`].
    pub(crate) fn materialize_row(
        &self,
        row: &Row<'_>,
        id_column: &str,
    ) -> rusqlite::Result<Rc<Wine>> {
        materialize(
            row,
            id_column,
            &self.cache,
            self.db.use_cache(),
            wine_from_row,
            |wine| self.bind(wine),
        )
    }

    fn try_add(&self, wine: &Rc<Wine>) -> RepoResult<EntityKey> {
        let changed = self
            .db
            .execute(INSERT_WINE_SQL, params_from_iter(record_params(&wine.record())))?;
        if changed != 1 {
            return Err(RepoError::InvalidData(format!(
                "wine insert changed {changed} rows"
            )));
        }

        let id = self.db.last_insert_rowid();
        wine.set_key(id);
        if self.db.use_cache() {
            self.cache.register(id, wine);
        }
        self.bind(wine);
        Ok(id)
    }

    fn bind(&self, wine: &Rc<Wine>) {
        if !wine.mark_bound() {
            return;
        }
        let w = &self.writer;
        w.bind(wine, &wine.title, "TITLE", text_value);
        w.bind(wine, &wine.variety, "VARIETY", text_value);
        w.bind(wine, &wine.country, "COUNTRY", text_value);
        w.bind(wine, &wine.region, "REGION", text_value);
        w.bind(wine, &wine.winery, "WINERY", text_value);
        w.bind(wine, &wine.color, "COLOR", text_value);
        w.bind(wine, &wine.vintage, "VINTAGE", int_value);
        w.bind(wine, &wine.description, "DESCRIPTION", text_value);
        w.bind(wine, &wine.score, "SCORE", int_value);
        w.bind(wine, &wine.abv, "ABV", real_value);
        w.bind(wine, &wine.price, "PRICE", real_value);
        w.bind(wine, &wine.average_rating, "AVG_RATING", real_value);
    }

    fn fetch(&self, builder: &QueryBuilder) -> rusqlite::Result<Vec<Rc<Wine>>> {
        let (sql, params) = builder.build();
        query_rows(&self.db, &sql, params, |row| {
            self.materialize_row(row, "wine_id")
        })
    }

    fn fetch_logged(&self, event: &str, builder: &QueryBuilder) -> Vec<Rc<Wine>> {
        let started_at = Instant::now();
        match self.fetch(builder) {
            Ok(wines) => {
                debug!(
                    "event={} module=repo status=ok rows={} duration_ms={}",
                    event,
                    wines.len(),
                    started_at.elapsed().as_millis()
                );
                wines
            }
            Err(err) => {
                error!(
                    "event={} module=repo status=error duration_ms={} error={}",
                    event,
                    started_at.elapsed().as_millis(),
                    err
                );
                Vec::new()
            }
        }
    }

    fn scan_stats(&self) -> rusqlite::Result<WineStats> {
        let mut stats = WineStats::default();
        let mut stmt = self.db.prepare(STATS_SQL)?;
        let mut rows = stmt.query([])?;
        while let Some(row) = rows.next()? {
            for (column, set) in [
                ("COUNTRY", &mut stats.countries),
                ("WINERY", &mut stats.wineries),
                ("COLOR", &mut stats.colors),
            ] {
                let value = text_or_empty(row, column)?;
                if !value.is_empty() {
                    set.insert(value);
                }
            }
            stats.observe_vintage(row.get("VINTAGE")?);
            stats.score.observe(row.get("SCORE")?);
            stats.abv.observe(row.get("ABV")?);
            stats.price.observe(row.get("PRICE")?);
        }
        Ok(stats)
    }

    fn forget_cached(&self) {
        for wine in self.cache.drain() {
            wine.set_key(UNPERSISTED_KEY);
        }
        self.dependents.notify(Cascade::AllWines);
    }
}

impl PagedRepository for WineRepository {
    type Item = Rc<Wine>;
    type Filters = WineFilters;

    fn fetch_range(&self, begin: usize, end: usize, filters: Option<&WineFilters>) -> Vec<Rc<Wine>> {
        self.get_all_in_range(begin, end, filters)
    }

    fn count(&self, filters: Option<&WineFilters>) -> i64 {
        self.get_count(filters)
    }
}

fn select_builder() -> QueryBuilder {
    QueryBuilder::new(&format!("SELECT {WINE_COLUMNS} FROM WINE {WINE_GEO_JOIN}"))
}

fn apply_filters(builder: &mut QueryBuilder, filters: &WineFilters) {
    builder
        .contains("WINE.TITLE", &filters.title)
        .contains("WINE.COUNTRY", &filters.country)
        .contains("WINE.WINERY", &filters.winery)
        .contains("WINE.COLOR", &filters.color)
        .between("WINE.VINTAGE", &filters.vintage)
        .between("WINE.SCORE", &filters.score)
        .between("WINE.ABV", &filters.abv)
        .between("WINE.PRICE", &filters.price);
}

fn record_params(record: &WineRecord) -> Vec<Value> {
    vec![
        Value::Text(record.title.clone()),
        Value::Text(record.variety.clone()),
        Value::Text(record.country.clone()),
        Value::Text(record.region.clone()),
        Value::Text(record.winery.clone()),
        Value::Text(record.color.clone()),
        Value::Integer(i64::from(record.vintage)),
        Value::Text(record.description.clone()),
        Value::Integer(i64::from(record.score)),
        Value::Real(record.abv),
        Value::Real(record.price),
        Value::Real(record.average_rating),
    ]
}

fn wine_from_row(key: EntityKey, row: &Row<'_>) -> rusqlite::Result<Rc<Wine>> {
    let record = WineRecord {
        title: text_or_empty(row, "TITLE")?,
        variety: text_or_empty(row, "VARIETY")?,
        country: text_or_empty(row, "COUNTRY")?,
        region: text_or_empty(row, "REGION")?,
        winery: text_or_empty(row, "WINERY")?,
        color: text_or_empty(row, "COLOR")?,
        vintage: row.get("VINTAGE")?,
        description: text_or_empty(row, "DESCRIPTION")?,
        score: row.get("SCORE")?,
        abv: row.get("ABV")?,
        price: row.get("PRICE")?,
        average_rating: row.get("AVG_RATING")?,
    };
    Ok(Wine::with_key(key, record, read_geolocation(row)?))
}
