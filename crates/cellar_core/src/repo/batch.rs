//! Chunked bulk writes.
//!
//! # Invariants
//! - Rows are written in chunks of at most the configured batch size, in
//!   input order.
//! - [`BatchWriter::insert_chunked`] commits chunk by chunk; a failing chunk
//!   leaves the earlier ones committed.
//! - [`BatchWriter::replace_all`] runs the clearing statement and every
//!   chunk in one transaction; any failure leaves the table untouched.

use crate::db::Database;
use log::{error, info};
use rusqlite::params_from_iter;
use rusqlite::types::Value;
use std::time::Instant;

/// Outcome of one bulk write.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchReport {
    /// Rows inserted across all committed chunks.
    pub rows_affected: usize,
    /// Row count of each flushed chunk, in order.
    pub flushed_batches: Vec<usize>,
    /// `false` when the write stopped on an error.
    pub completed: bool,
}

impl BatchReport {
    pub fn batch_count(&self) -> usize {
        self.flushed_batches.len()
    }
}

pub(crate) struct BatchWriter<'db> {
    db: &'db Database,
    target: &'static str,
    chunk_size: usize,
}

impl<'db> BatchWriter<'db> {
    /// Writer for `target` using the store's configured batch size.
    pub(crate) fn new(db: &'db Database, target: &'static str) -> Self {
        Self {
            db,
            target,
            chunk_size: db.config().batch_size.max(1),
        }
    }

    /// Inserts `rows` with `insert_sql`, one transaction per chunk.
    pub(crate) fn insert_chunked<T>(
        &self,
        insert_sql: &str,
        rows: &[T],
        to_params: impl Fn(&T) -> Vec<Value>,
    ) -> BatchReport {
        let started_at = Instant::now();
        let mut report = BatchReport::default();

        for chunk in rows.chunks(self.chunk_size) {
            let outcome = self.db.transaction().and_then(|tx| {
                let written = self.write_chunk(insert_sql, chunk, &to_params)?;
                tx.commit()?;
                Ok(written)
            });
            match outcome {
                Ok(written) => self.record_flush(&mut report, written),
                Err(err) => {
                    self.log_failure(&report, rows.len(), started_at, &err);
                    return report;
                }
            }
        }

        report.completed = true;
        self.log_done(&report, rows.len(), started_at);
        report
    }

    /// Runs `clear_sql`, then inserts every row, all inside one transaction.
    ///
    /// On failure nothing is committed and the returned report has
    /// `rows_affected == 0`.
    pub(crate) fn replace_all<T>(
        &self,
        clear_sql: &str,
        insert_sql: &str,
        rows: &[T],
        to_params: impl Fn(&T) -> Vec<Value>,
    ) -> BatchReport {
        let started_at = Instant::now();
        let mut report = BatchReport::default();

        let outcome = self.db.transaction().and_then(|tx| {
            self.db.execute(clear_sql, [])?;
            for chunk in rows.chunks(self.chunk_size) {
                let written = self.write_chunk(insert_sql, chunk, &to_params)?;
                self.record_flush(&mut report, written);
            }
            tx.commit()
        });

        match outcome {
            Ok(()) => {
                report.completed = true;
                self.log_done(&report, rows.len(), started_at);
            }
            Err(err) => {
                self.log_failure(&report, rows.len(), started_at, &err);
                report = BatchReport::default();
            }
        }
        report
    }

    fn write_chunk<T>(
        &self,
        insert_sql: &str,
        chunk: &[T],
        to_params: &impl Fn(&T) -> Vec<Value>,
    ) -> rusqlite::Result<usize> {
        let mut stmt = self.db.prepare(insert_sql)?;
        let mut written = 0;
        for row in chunk {
            written += stmt.execute(params_from_iter(to_params(row)))?;
        }
        Ok(written)
    }

    fn record_flush(&self, report: &mut BatchReport, written: usize) {
        report.rows_affected += written;
        report.flushed_batches.push(written);
        info!(
            "event=batch_flush module=repo status=ok target={} batch={} rows={} rows_total={}",
            self.target,
            report.flushed_batches.len(),
            written,
            report.rows_affected
        );
    }

    fn log_done(&self, report: &BatchReport, total: usize, started_at: Instant) {
        info!(
            "event=batch_write module=repo status=ok target={} rows_in={} rows_affected={} batches={} duration_ms={}",
            self.target,
            total,
            report.rows_affected,
            report.batch_count(),
            started_at.elapsed().as_millis()
        );
    }

    fn log_failure(
        &self,
        report: &BatchReport,
        total: usize,
        started_at: Instant,
        err: &rusqlite::Error,
    ) {
        error!(
            "event=batch_write module=repo status=error target={} rows_in={} rows_committed={} batches={} duration_ms={} error={}",
            self.target,
            total,
            report.rows_affected,
            report.batch_count(),
            started_at.elapsed().as_millis(),
            err
        );
    }
}

#[cfg(test)]
mod tests {
    use super::BatchWriter;
    use crate::db::{open_db_in_memory, Database, StoreConfig};
    use rusqlite::types::Value;

    fn scratch_db(batch_size: usize) -> std::rc::Rc<Database> {
        let conn = open_db_in_memory().unwrap();
        conn.execute_batch("CREATE TABLE SCRATCH (V INTEGER NOT NULL UNIQUE);")
            .unwrap();
        Database::new(
            conn,
            StoreConfig {
                batch_size,
                ..StoreConfig::default()
            },
        )
    }

    fn count(db: &Database) -> i64 {
        db.connection()
            .query_row("SELECT COUNT(*) FROM SCRATCH", [], |row| row.get(0))
            .unwrap()
    }

    #[test]
    fn chunked_insert_splits_rows_by_batch_size() {
        let db = scratch_db(4);
        let rows: Vec<i64> = (0..10).collect();
        let report = BatchWriter::new(&db, "scratch").insert_chunked(
            "INSERT INTO SCRATCH (V) VALUES (?1)",
            &rows,
            |v| vec![Value::Integer(*v)],
        );

        assert!(report.completed);
        assert_eq!(report.flushed_batches, vec![4, 4, 2]);
        assert_eq!(count(&db), 10);
    }

    #[test]
    fn chunked_insert_keeps_earlier_chunks_on_failure() {
        let db = scratch_db(3);
        // Row six repeats a value and violates the unique constraint.
        let rows = vec![1, 2, 3, 4, 5, 1, 7];
        let report = BatchWriter::new(&db, "scratch").insert_chunked(
            "INSERT INTO SCRATCH (V) VALUES (?1)",
            &rows,
            |v| vec![Value::Integer(*v)],
        );

        assert!(!report.completed);
        assert_eq!(report.flushed_batches, vec![3]);
        assert_eq!(count(&db), 3);
    }

    #[test]
    fn replace_all_is_atomic() {
        let db = scratch_db(2);
        db.connection()
            .execute_batch("INSERT INTO SCRATCH (V) VALUES (100), (200);")
            .unwrap();

        let rows = vec![1, 2, 3, 3];
        let report = BatchWriter::new(&db, "scratch").replace_all(
            "DELETE FROM SCRATCH",
            "INSERT INTO SCRATCH (V) VALUES (?1)",
            &rows,
            |v| vec![Value::Integer(*v)],
        );

        assert!(!report.completed);
        assert_eq!(report.rows_affected, 0);
        assert_eq!(count(&db), 2);

        let report = BatchWriter::new(&db, "scratch").replace_all(
            "DELETE FROM SCRATCH",
            "INSERT INTO SCRATCH (V) VALUES (?1)",
            &[7, 8, 9],
            |v| vec![Value::Integer(*v)],
        );
        assert!(report.completed);
        assert_eq!(report.flushed_batches, vec![2, 1]);
        assert_eq!(count(&db), 3);
    }
}
