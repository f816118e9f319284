//! Write-through binding of entity properties to single-column updates.
//!
//! # Invariants
//! - A change on an unpersisted entity never reaches the database.
//! - One change issues at most one `UPDATE <table> SET <column> = ? WHERE
//!   ID = ?` statement.
//! - The in-memory value is not rolled back when the update fails; the
//!   failure is only logged.

use crate::db::Database;
use crate::model::property::Property;
use crate::model::{Entity, EntityKey};
use log::{debug, error, info, warn};
use rusqlite::params;
use rusqlite::types::Value;
use std::rc::Rc;
use std::time::Instant;

/// Column writer for one table.
#[derive(Clone)]
pub(crate) struct WriteThrough {
    db: Rc<Database>,
    table: &'static str,
}

impl WriteThrough {
    pub(crate) fn new(db: Rc<Database>, table: &'static str) -> Self {
        Self { db, table }
    }

    /// Writes one column of the row `key`. Returns whether exactly one row
    /// was updated.
    pub(crate) fn update_column(&self, key: EntityKey, column: &'static str, value: Value) -> bool {
        let started_at = Instant::now();
        let sql = format!("UPDATE {} SET {} = ?1 WHERE ID = ?2", self.table, column);
        match self.db.execute(&sql, params![value, key]) {
            Ok(1) => {
                info!(
                    "event=write_through module=repo status=ok table={} column={} id={} duration_ms={}",
                    self.table,
                    column,
                    key,
                    started_at.elapsed().as_millis()
                );
                true
            }
            Ok(changed) => {
                warn!(
                    "event=write_through module=repo status=error table={} column={} id={} rows={} error_code=row_not_found",
                    self.table, column, key, changed
                );
                false
            }
            Err(err) => {
                error!(
                    "event=write_through module=repo status=error table={} column={} id={} duration_ms={} error={}",
                    self.table,
                    column,
                    key,
                    started_at.elapsed().as_millis(),
                    err
                );
                false
            }
        }
    }

    /// Subscribes a listener on `property` that writes `column` of `owner`'s
    /// row whenever the value changes.
    ///
    /// The listener holds `owner` weakly so a bound entity can still be
    /// dropped.
    pub(crate) fn bind<E, T>(
        &self,
        owner: &Rc<E>,
        property: &Property<T>,
        column: &'static str,
        to_value: fn(&T) -> Value,
    ) where
        E: Entity,
        T: Clone + PartialEq + 'static,
    {
        let owner = Rc::downgrade(owner);
        let writer = self.clone();
        property.subscribe(move |_, new| {
            let Some(owner) = owner.upgrade() else {
                return;
            };
            if !owner.is_persisted() {
                debug!(
                    "event=write_through module=repo status=skip table={} column={} reason=unpersisted",
                    writer.table, column
                );
                return;
            }
            writer.update_column(owner.key(), column, to_value(new));
        });
    }
}

#[allow(clippy::ptr_arg)]
pub(crate) fn text_value(value: &String) -> Value {
    Value::Text(value.clone())
}

pub(crate) fn int_value(value: &i32) -> Value {
    Value::Integer(i64::from(*value))
}

pub(crate) fn real_value(value: &f64) -> Value {
    Value::Real(*value)
}

pub(crate) fn flag_value(value: &bool) -> Value {
    Value::Integer(i64::from(*value))
}
