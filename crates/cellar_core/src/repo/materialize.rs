//! Row to entity materialization through the identity cache.
//!
//! # Invariants
//! - A cache hit returns the cached instance untouched; the row's other
//!   columns are ignored even if they differ.
//! - A miss constructs, registers and binds exactly once.
//! - Geolocation is either fully present or absent; one null coordinate
//!   makes it absent.

use crate::cache::IdentityCache;
use crate::db::Database;
use crate::model::geo::GeoLocation;
use crate::model::EntityKey;
use rusqlite::types::Value;
use rusqlite::{params_from_iter, Row};
use std::rc::Rc;

/// Turns one result row into a shared instance.
///
/// `id_column` names the column that holds this entity's key; joins alias
/// it (`wine_id`, `review_id`, ...) so several entities can come from one
/// row. `construct` builds the instance from the row and `bind` attaches
/// write-through listeners to a freshly constructed one.
pub(crate) fn materialize<T>(
    row: &Row<'_>,
    id_column: &str,
    cache: &IdentityCache<T>,
    use_cache: bool,
    construct: impl FnOnce(EntityKey, &Row<'_>) -> rusqlite::Result<Rc<T>>,
    bind: impl FnOnce(&Rc<T>),
) -> rusqlite::Result<Rc<T>> {
    let key: EntityKey = row.get(id_column)?;

    if use_cache {
        if let Some(hit) = cache.try_get(key) {
            return Ok(hit);
        }
    }

    let instance = construct(key, row)?;
    if use_cache {
        cache.register(key, &instance);
    }
    bind(&instance);
    Ok(instance)
}

/// Reads the joined `LATITUDE`/`LONGITUDE` pair.
pub(crate) fn read_geolocation(row: &Row<'_>) -> rusqlite::Result<Option<GeoLocation>> {
    let latitude: Option<f64> = row.get("LATITUDE")?;
    let longitude: Option<f64> = row.get("LONGITUDE")?;
    Ok(match (latitude, longitude) {
        (Some(latitude), Some(longitude)) => Some(GeoLocation::new(latitude, longitude)),
        _ => None,
    })
}

/// Reads a nullable text column, mapping SQL null to an empty string.
pub(crate) fn text_or_empty(row: &Row<'_>, column: &str) -> rusqlite::Result<String> {
    Ok(row.get::<_, Option<String>>(column)?.unwrap_or_default())
}

/// Runs `sql` and maps every row, closing the cursor before returning.
pub(crate) fn query_rows<T>(
    db: &Database,
    sql: &str,
    params: Vec<Value>,
    mut map: impl FnMut(&Row<'_>) -> rusqlite::Result<T>,
) -> rusqlite::Result<Vec<T>> {
    let mut stmt = db.prepare(sql)?;
    let mut rows = stmt.query(params_from_iter(params))?;
    let mut items = Vec::new();
    while let Some(row) = rows.next()? {
        items.push(map(row)?);
    }
    Ok(items)
}
