//! Vineyard repository.
//!
//! # Invariants
//! - Geolocation comes from a case-insensitive pattern join of
//!   `VINEYARD.ADDRESS` on `GEOLOCATION.NAME`.
//! - Field changes on persisted vineyards write through like wines.

use crate::cache::IdentityCache;
use crate::db::Database;
use crate::model::filters::VineyardFilters;
use crate::model::stats::VineyardStats;
use crate::model::tour::VineyardTour;
use crate::model::vineyard::{Vineyard, VineyardRecord};
use crate::model::{Entity, EntityKey, UNPERSISTED_KEY};
use crate::repo::batch::{BatchReport, BatchWriter};
use crate::repo::binder::{text_value, WriteThrough};
use crate::repo::materialize::{materialize, query_rows, read_geolocation, text_or_empty};
use crate::repo::query::QueryBuilder;
use crate::repo::{PagedRepository, RepoError, RepoResult};
use log::{debug, error, info, warn};
use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, Row};
use std::cell::RefCell;
use std::rc::Rc;
use std::time::Instant;

pub(crate) const VINEYARD_COLUMNS: &str = "VINEYARD.ID AS vineyard_id, VINEYARD.NAME, \
     VINEYARD.ADDRESS, VINEYARD.REGION, VINEYARD.WEBSITE, VINEYARD.DESCRIPTION, \
     VINEYARD.LOGO_URL, GEOLOCATION.LATITUDE, GEOLOCATION.LONGITUDE";

pub(crate) const VINEYARD_GEO_JOIN: &str =
    "LEFT JOIN GEOLOCATION ON LOWER(VINEYARD.ADDRESS) LIKE LOWER(GEOLOCATION.NAME)";

const INSERT_VINEYARD_SQL: &str = "INSERT INTO VINEYARD (
    NAME, ADDRESS, REGION, WEBSITE, DESCRIPTION, LOGO_URL
) VALUES (?1, ?2, ?3, ?4, ?5, ?6)";

pub struct VineyardRepository {
    db: Rc<Database>,
    cache: IdentityCache<Vineyard>,
    writer: WriteThrough,
    stats: RefCell<VineyardStats>,
}

impl VineyardRepository {
    pub fn new(db: Rc<Database>) -> Self {
        Self {
            writer: WriteThrough::new(Rc::clone(&db), "VINEYARD"),
            db,
            cache: IdentityCache::new(Vineyard::KIND),
            stats: RefCell::new(VineyardStats::default()),
        }
    }

    pub fn cache(&self) -> &IdentityCache<Vineyard> {
        &self.cache
    }

    pub fn get_by_id(&self, id: EntityKey) -> Option<Rc<Vineyard>> {
        let mut builder = select_builder();
        builder.equals("VINEYARD.ID", id);
        self.fetch_logged("vineyard_get", &builder).into_iter().next()
    }

    /// First vineyard (by key) with exactly this name.
    pub fn get_by_name(&self, name: &str) -> Option<Rc<Vineyard>> {
        let mut builder = select_builder();
        builder.equals("VINEYARD.NAME", name.to_string()).order_by("VINEYARD.ID");
        self.fetch_logged("vineyard_get_by_name", &builder)
            .into_iter()
            .next()
    }

    pub fn get_all(&self) -> Vec<Rc<Vineyard>> {
        let mut builder = select_builder();
        builder.order_by("VINEYARD.ID");
        self.fetch_logged("vineyard_get_all", &builder)
    }

    pub fn get_all_in_range(
        &self,
        begin: usize,
        end: usize,
        filters: Option<&VineyardFilters>,
    ) -> Vec<Rc<Vineyard>> {
        let mut builder = select_builder();
        if let Some(filters) = filters {
            apply_filters(&mut builder, filters);
        }
        builder.order_by("VINEYARD.ID").range(begin, end);
        self.fetch_logged("vineyard_range", &builder)
    }

    /// Vineyards on `tour`, in key order.
    pub fn get_all_from_tour(&self, tour: &VineyardTour) -> Vec<Rc<Vineyard>> {
        let mut builder = QueryBuilder::new(&format!(
            "SELECT {VINEYARD_COLUMNS} FROM VINEYARD_TOUR_ITEM \
             JOIN VINEYARD ON VINEYARD.ID = VINEYARD_TOUR_ITEM.VINEYARD_ID \
             {VINEYARD_GEO_JOIN}"
        ));
        builder
            .equals("VINEYARD_TOUR_ITEM.TOUR_ID", tour.key())
            .order_by("VINEYARD.ID");
        self.fetch_logged("vineyard_tour_items", &builder)
    }

    pub fn get_count(&self, filters: Option<&VineyardFilters>) -> i64 {
        let mut builder = QueryBuilder::new("SELECT COUNT(*) FROM VINEYARD");
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
                error!("event=vineyard_count module=repo status=error error={err}");
                -1
            }
        }
    }

    /// Whether the table holds any row. A failed check reports `false`.
    pub fn has_data(&self) -> bool {
        let exists = self.db.prepare("SELECT EXISTS (SELECT 1 FROM VINEYARD)").and_then(
            |mut stmt| stmt.query_row([], |row| row.get::<_, bool>(0)),
        );
        exists.unwrap_or_else(|err| {
            error!("event=vineyard_has_data module=repo status=error error={err}");
            false
        })
    }

    pub fn add(&self, vineyard: &Rc<Vineyard>) -> bool {
        if vineyard.is_persisted() {
            warn!(
                "event=vineyard_add module=repo status=skip id={} reason=already_persisted",
                vineyard.key()
            );
            return false;
        }

        match self.try_add(vineyard) {
            Ok(id) => {
                info!("event=vineyard_add module=repo status=ok id={id}");
                true
            }
            Err(err) => {
                error!(
                    "event=vineyard_add module=repo status=error name={:?} error={}",
                    vineyard.name.get(),
                    err
                );
                false
            }
        }
    }

    pub fn add_all(&self, records: &[VineyardRecord]) -> BatchReport {
        BatchWriter::new(&self.db, "vineyard").insert_chunked(
            INSERT_VINEYARD_SQL,
            records,
            record_params,
        )
    }

    pub fn remove(&self, vineyard: &Rc<Vineyard>) -> bool {
        let id = vineyard.key();
        if id == UNPERSISTED_KEY {
            debug!("event=vineyard_remove module=repo status=skip reason=unpersisted");
            return false;
        }

        match self.db.execute("DELETE FROM VINEYARD WHERE ID = ?1", params![id]) {
            Ok(changed) => {
                self.cache.release(id);
                vineyard.set_key(UNPERSISTED_KEY);
                info!("event=vineyard_remove module=repo status=ok id={id} rows={changed}");
                changed == 1
            }
            Err(err) => {
                error!("event=vineyard_remove module=repo status=error id={id} error={err}");
                false
            }
        }
    }

    pub fn remove_all(&self) -> bool {
        match self.db.execute("DELETE FROM VINEYARD", []) {
            Ok(changed) => {
                self.forget_cached();
                info!("event=vineyard_remove_all module=repo status=ok rows={changed}");
                true
            }
            Err(err) => {
                error!("event=vineyard_remove_all module=repo status=error error={err}");
                false
            }
        }
    }

    pub fn replace_all(&self, records: &[VineyardRecord]) -> BatchReport {
        let report = BatchWriter::new(&self.db, "vineyard").replace_all(
            "DELETE FROM VINEYARD",
            INSERT_VINEYARD_SQL,
            records,
            record_params,
        );
        if report.completed {
            self.forget_cached();
        }
        report
    }

    /// Rebuilds the name/address/region sets from a full scan.
    pub fn update_uniques(&self) {
        *self.stats.borrow_mut() = VineyardStats::default();

        let scanned = query_rows(
            &self.db,
            "SELECT NAME, ADDRESS, REGION FROM VINEYARD",
            Vec::new(),
            |row| {
                Ok((
                    text_or_empty(row, "NAME")?,
                    text_or_empty(row, "ADDRESS")?,
                    text_or_empty(row, "REGION")?,
                ))
            },
        );

        match scanned {
            Ok(rows) => {
                let mut stats = VineyardStats::default();
                for (name, address, region) in rows {
                    insert_non_empty(&mut stats.names, name);
                    insert_non_empty(&mut stats.addresses, address);
                    insert_non_empty(&mut stats.regions, region);
                }
                info!(
                    "event=vineyard_stats module=repo status=ok names={} regions={}",
                    stats.names.len(),
                    stats.regions.len()
                );
                *self.stats.borrow_mut() = stats;
            }
            Err(err) => {
                error!("event=vineyard_stats module=repo status=error error={err}");
            }
        }
    }

    pub fn stats(&self) -> VineyardStats {
        self.stats.borrow().clone()
    }

    /// Materializes the vineyard part of a row selected with
    /// [`VINEYARD_COLUMNS`].
    pub(crate) fn materialize_row(
        &self,
        row: &Row<'_>,
        id_column: &str,
    ) -> rusqlite::Result<Rc<Vineyard>> {
        materialize(
            row,
            id_column,
            &self.cache,
            self.db.use_cache(),
            vineyard_from_row,
            |vineyard| self.bind(vineyard),
        )
    }

    fn try_add(&self, vineyard: &Rc<Vineyard>) -> RepoResult<EntityKey> {
        let changed = self.db.execute(
            INSERT_VINEYARD_SQL,
            params_from_iter(record_params(&vineyard.record())),
        )?;
        if changed != 1 {
            return Err(RepoError::InvalidData(format!(
                "vineyard insert changed {changed} rows"
            )));
        }

        let id = self.db.last_insert_rowid();
        vineyard.set_key(id);
        if self.db.use_cache() {
            self.cache.register(id, vineyard);
        }
        self.bind(vineyard);
        Ok(id)
    }

    fn bind(&self, vineyard: &Rc<Vineyard>) {
        if !vineyard.mark_bound() {
            return;
        }
        let w = &self.writer;
        w.bind(vineyard, &vineyard.name, "NAME", text_value);
        w.bind(vineyard, &vineyard.address, "ADDRESS", text_value);
        w.bind(vineyard, &vineyard.region, "REGION", text_value);
        w.bind(vineyard, &vineyard.website, "WEBSITE", text_value);
        w.bind(vineyard, &vineyard.description, "DESCRIPTION", text_value);
        w.bind(vineyard, &vineyard.logo_url, "LOGO_URL", text_value);
    }

    fn fetch_logged(&self, event: &str, builder: &QueryBuilder) -> Vec<Rc<Vineyard>> {
        let started_at = Instant::now();
        let (sql, params) = builder.build();
        let fetched = query_rows(&self.db, &sql, params, |row| {
            self.materialize_row(row, "vineyard_id")
        });
        match fetched {
            Ok(vineyards) => {
                debug!(
                    "event={} module=repo status=ok rows={} duration_ms={}",
                    event,
                    vineyards.len(),
                    started_at.elapsed().as_millis()
                );
                vineyards
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

    fn forget_cached(&self) {
        for vineyard in self.cache.drain() {
            vineyard.set_key(UNPERSISTED_KEY);
        }
    }
}

impl PagedRepository for VineyardRepository {
    type Item = Rc<Vineyard>;
    type Filters = VineyardFilters;

    fn fetch_range(
        &self,
        begin: usize,
        end: usize,
        filters: Option<&VineyardFilters>,
    ) -> Vec<Rc<Vineyard>> {
        self.get_all_in_range(begin, end, filters)
    }

    fn count(&self, filters: Option<&VineyardFilters>) -> i64 {
        self.get_count(filters)
    }
}

fn select_builder() -> QueryBuilder {
    QueryBuilder::new(&format!(
        "SELECT {VINEYARD_COLUMNS} FROM VINEYARD {VINEYARD_GEO_JOIN}"
    ))
}

fn apply_filters(builder: &mut QueryBuilder, filters: &VineyardFilters) {
    builder
        .contains("VINEYARD.NAME", &filters.name)
        .contains("VINEYARD.ADDRESS", &filters.address)
        .contains("VINEYARD.REGION", &filters.region);
}

fn insert_non_empty(set: &mut std::collections::BTreeSet<String>, value: String) {
    if !value.is_empty() {
        set.insert(value);
    }
}

fn record_params(record: &VineyardRecord) -> Vec<Value> {
    vec![
        Value::Text(record.name.clone()),
        Value::Text(record.address.clone()),
        Value::Text(record.region.clone()),
        Value::Text(record.website.clone()),
        Value::Text(record.description.clone()),
        Value::Text(record.logo_url.clone()),
    ]
}

fn vineyard_from_row(key: EntityKey, row: &Row<'_>) -> rusqlite::Result<Rc<Vineyard>> {
    let record = VineyardRecord {
        name: text_or_empty(row, "NAME")?,
        address: text_or_empty(row, "ADDRESS")?,
        region: text_or_empty(row, "REGION")?,
        website: text_or_empty(row, "WEBSITE")?,
        description: text_or_empty(row, "DESCRIPTION")?,
        logo_url: text_or_empty(row, "LOGO_URL")?,
    };
    Ok(Vineyard::with_key(key, record, read_geolocation(row)?))
}
