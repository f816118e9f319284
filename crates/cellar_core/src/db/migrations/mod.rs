//! Catalogue schema history.
//!
//! - v1: users, wines, vineyards, geolocations and the per-user notes,
//!   reviews, lists and tours.
//! - v2: review moderation flag.
//! - v3: `AUTOINCREMENT` keys on notes, reviews, lists and tours, so a
//!   cached child object can never alias a row inserted after its own was
//!   cascaded away.
//!
//! # Invariants
//! - `version` values must remain monotonic.
//! - Applied migration version is mirrored to `PRAGMA user_version`.
//! - Existing columns keep their meaning; table rebuilds copy every row with
//!   its key.
//! - Pending migrations run in one transaction with foreign-key enforcement
//!   suspended, and commit only when `foreign_key_check` finds no orphan.

use crate::db::{DbError, DbResult};
use log::{error, info};
use rusqlite::{Connection, Transaction};

#[derive(Debug, Clone, Copy)]
struct Migration {
    version: u32,
    sql: &'static str,
}

const MIGRATIONS: &[Migration] = &[
    Migration {
        version: 1,
        sql: include_str!("0001_init.sql"),
    },
    Migration {
        version: 2,
        sql: include_str!("0002_moderation.sql"),
    },
    Migration {
        version: 3,
        sql: include_str!("0003_monotonic_keys.sql"),
    },
];

/// Returns the latest migration version known by this binary.
pub fn latest_version() -> u32 {
    MIGRATIONS.last().map_or(0, |migration| migration.version)
}

/// Applies all pending migrations on the provided connection.
pub fn apply_migrations(conn: &mut Connection) -> DbResult<()> {
    let current_version = current_user_version(conn)?;
    let latest = latest_version();

    if current_version > latest {
        return Err(DbError::UnsupportedSchemaVersion {
            db_version: current_version,
            latest_supported: latest,
        });
    }

    if current_version == latest {
        return Ok(());
    }

    // Table rebuilds drop parents of cascading children; the pragma is
    // ignored inside a transaction, so it is toggled around it.
    let enforce_foreign_keys: bool =
        conn.query_row("PRAGMA foreign_keys;", [], |row| row.get(0))?;
    conn.execute_batch("PRAGMA foreign_keys = OFF;")?;
    let applied = run_pending(conn, current_version);
    if enforce_foreign_keys {
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
    }

    match applied {
        Ok(()) => {
            info!(
                "event=db_migrate module=db status=ok from_version={} to_version={}",
                current_version, latest
            );
            Ok(())
        }
        Err(err) => {
            error!(
                "event=db_migrate module=db status=error from_version={} error={}",
                current_version, err
            );
            Err(err)
        }
    }
}

fn run_pending(conn: &mut Connection, current_version: u32) -> DbResult<()> {
    let tx = conn.transaction()?;
    for migration in MIGRATIONS
        .iter()
        .filter(|migration| migration.version > current_version)
    {
        tx.execute_batch(migration.sql)?;
        tx.execute_batch(&format!("PRAGMA user_version = {};", migration.version))?;
    }
    check_foreign_keys(&tx)?;
    tx.commit()?;
    Ok(())
}

fn check_foreign_keys(tx: &Transaction<'_>) -> DbResult<()> {
    let orphans: i64 = tx.query_row(
        "SELECT COUNT(*) FROM pragma_foreign_key_check",
        [],
        |row| row.get(0),
    )?;
    if orphans > 0 {
        return Err(DbError::ForeignKeyViolation { orphans });
    }
    Ok(())
}

fn current_user_version(conn: &Connection) -> DbResult<u32> {
    let version = conn.query_row("PRAGMA user_version;", [], |row| row.get::<_, u32>(0))?;
    Ok(version)
}
