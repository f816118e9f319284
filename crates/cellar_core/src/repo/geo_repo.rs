//! Geolocation reference data.
//!
//! # Responsibility
//! - Seed place coordinates from CSV and from a [`GeoResolver`].
//! - Look up coordinates by place name.
//!
//! # Invariants
//! - Place names are unique; inserting a known name again is a no-op.
//! - The resolver is only consulted for names not already stored.

use crate::db::Database;
use crate::model::geo::{GeoLocation, GeoResolver};
use crate::repo::batch::{BatchReport, BatchWriter};
use crate::repo::materialize::query_rows;
use crate::repo::RepoResult;
use log::{debug, error, info, warn};
use rusqlite::types::Value;
use rusqlite::{params, OptionalExtension};
use serde::Deserialize;
use std::collections::{BTreeMap, BTreeSet};
use std::io::Read;
use std::rc::Rc;
use std::time::Instant;

const INSERT_GEO_SQL: &str =
    "INSERT OR IGNORE INTO GEOLOCATION (NAME, LATITUDE, LONGITUDE) VALUES (?1, ?2, ?3)";

/// Names per `IN (...)` lookup, below SQLite's bound parameter limit.
const LOOKUP_CHUNK: usize = 500;

#[derive(Debug, Deserialize)]
struct GeoCsvRow {
    name: String,
    latitude: f64,
    longitude: f64,
}

pub struct GeoLocationRepository {
    db: Rc<Database>,
}

impl GeoLocationRepository {
    pub fn new(db: Rc<Database>) -> Self {
        Self { db }
    }

    pub fn get(&self, name: &str) -> Option<GeoLocation> {
        let found = self
            .db
            .prepare("SELECT LATITUDE, LONGITUDE FROM GEOLOCATION WHERE NAME = ?1")
            .and_then(|mut stmt| {
                stmt.query_row(params![name], |row| {
                    Ok(GeoLocation::new(row.get(0)?, row.get(1)?))
                })
                .optional()
            });
        found.unwrap_or_else(|err| {
            error!("event=geo_get module=repo status=error name={name:?} error={err}");
            None
        })
    }

    pub fn count(&self) -> i64 {
        let counted = self
            .db
            .prepare("SELECT COUNT(*) FROM GEOLOCATION")
            .and_then(|mut stmt| stmt.query_row([], |row| row.get(0)));
        counted.unwrap_or_else(|err| {
            error!("event=geo_count module=repo status=error error={err}");
            -1
        })
    }

    pub fn has_data(&self) -> bool {
        self.count() > 0
    }

    /// Stores every entry of `locations` in chunked batches.
    pub fn add_all(&self, locations: &BTreeMap<String, GeoLocation>) -> BatchReport {
        let rows: Vec<(&String, &GeoLocation)> = locations.iter().collect();
        BatchWriter::new(&self.db, "geolocation").insert_chunked(
            INSERT_GEO_SQL,
            &rows,
            |(name, location)| {
                vec![
                    Value::Text((*name).clone()),
                    Value::Real(location.latitude),
                    Value::Real(location.longitude),
                ]
            },
        )
    }

    /// Loads `name,latitude,longitude` rows (with header) when the table is
    /// still empty. A populated table is left alone and reported as a
    /// completed write of zero rows.
    pub fn seed_from_csv(&self, reader: impl Read) -> BatchReport {
        if self.has_data() {
            info!("event=geo_seed module=repo status=skip reason=already_seeded");
            return BatchReport {
                completed: true,
                ..BatchReport::default()
            };
        }

        match parse_csv(reader) {
            Ok(locations) => self.add_all(&locations),
            Err(err) => {
                error!("event=geo_seed module=repo status=error error={err}");
                BatchReport::default()
            }
        }
    }

    /// Subset of `names` already stored.
    pub fn existing_names(&self, names: &BTreeSet<String>) -> BTreeSet<String> {
        let all: Vec<&String> = names.iter().collect();
        let mut existing = BTreeSet::new();
        for chunk in all.chunks(LOOKUP_CHUNK) {
            let placeholders = vec!["?"; chunk.len()].join(", ");
            let sql = format!("SELECT NAME FROM GEOLOCATION WHERE NAME IN ({placeholders})");
            let params = chunk
                .iter()
                .map(|name| Value::Text((*name).clone()))
                .collect();
            match query_rows(&self.db, &sql, params, |row| row.get::<_, String>(0)) {
                Ok(found) => existing.extend(found),
                Err(err) => {
                    error!("event=geo_existing module=repo status=error error={err}");
                    return BTreeSet::new();
                }
            }
        }
        existing
    }

    /// Resolves the names in `names` that are not stored yet and stores the
    /// ones the resolver found. Returns the number of rows added.
    pub fn add_resolved(&self, names: &BTreeSet<String>, resolver: &dyn GeoResolver) -> usize {
        let started_at = Instant::now();
        let existing = self.existing_names(names);

        let mut resolved = BTreeMap::new();
        let mut unresolved = 0_usize;
        for name in names.difference(&existing) {
            match resolver.resolve(name) {
                Some(location) => {
                    resolved.insert(name.clone(), location);
                }
                None => {
                    debug!("event=geo_resolve module=repo status=skip name={name:?} reason=unresolved");
                    unresolved += 1;
                }
            }
        }

        if resolved.is_empty() {
            info!(
                "event=geo_resolve module=repo status=ok added=0 unresolved={unresolved}"
            );
            return 0;
        }

        let report = self.add_all(&resolved);
        if !report.completed {
            warn!(
                "event=geo_resolve module=repo status=error added={} unresolved={}",
                report.rows_affected, unresolved
            );
        } else {
            info!(
                "event=geo_resolve module=repo status=ok added={} unresolved={} duration_ms={}",
                report.rows_affected,
                unresolved,
                started_at.elapsed().as_millis()
            );
        }
        report.rows_affected
    }
}

fn parse_csv(reader: impl Read) -> RepoResult<BTreeMap<String, GeoLocation>> {
    let mut csv = csv::ReaderBuilder::new().trim(csv::Trim::All).from_reader(reader);
    let mut locations = BTreeMap::new();
    for row in csv.deserialize::<GeoCsvRow>() {
        let row = row?;
        locations.insert(row.name, GeoLocation::new(row.latitude, row.longitude));
    }
    Ok(locations)
}
