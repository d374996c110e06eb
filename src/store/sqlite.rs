//! SQLite metrics writer
//!
//! Append-only persistence for raw predictions, the two fixed-width rate
//! tables, and accuracy snapshots. Rate columns are declared once at open
//! time, one per pre-declared destination in lexicographic order, and the
//! column assignment is recorded in `destination_columns` so consumers can
//! resolve columns back to destinations.

use std::path::Path;

use parking_lot::Mutex;
use rusqlite::{params_from_iter, Connection};

use crate::aggregate::{AccuracySnapshot, DestinationAggregate};
use crate::error::{PipelineError, PipelineResult};
use crate::flow::Prediction;
use crate::store::{time_ordered_id, MetricsWriter, RateKind, RetryPolicy, ACCURACY_ROW_KIND};

// ============================================================================
// WRITER
// ============================================================================

pub struct SqliteMetricsWriter {
    conn: Mutex<Connection>,
    retry: RetryPolicy,
    /// Sorted destinations, position i maps to rate column `col_{i+1:02}`
    destinations: Vec<String>,
    /// Accuracy rows carry this many per-class column groups
    top_n: usize,
}

impl SqliteMetricsWriter {
    /// Open (or create) the metrics database and its append-only tables.
    pub fn open<P: AsRef<Path>>(
        path: P,
        expected_destinations: &[String],
        top_n: usize,
        retry: RetryPolicy,
    ) -> PipelineResult<Self> {
        let mut destinations: Vec<String> = expected_destinations.to_vec();
        destinations.sort();
        destinations.dedup();

        let conn = Connection::open(path).map_err(|e| PipelineError::PersistenceWriteFailure {
            attempts: 1,
            reason: format!("open: {}", e),
        })?;

        let writer = Self { conn: Mutex::new(conn), retry, destinations, top_n };
        writer.create_tables()?;
        Ok(writer)
    }

    fn rate_columns(&self) -> Vec<String> {
        (1..=self.destinations.len()).map(|i| format!("col_{:02}", i)).collect()
    }

    fn create_tables(&self) -> PipelineResult<()> {
        let rate_cols: String = self
            .rate_columns()
            .iter()
            .map(|c| format!(", {} REAL NOT NULL", c))
            .collect();

        let mut accuracy_cols = String::new();
        for i in 1..=self.top_n {
            accuracy_cols.push_str(&format!(
                ", class_{i} TEXT, pct_{i} TEXT, total_{i} INTEGER",
                i = i
            ));
        }

        let schema = format!(
            "CREATE TABLE IF NOT EXISTS raw_predictions (
                id TEXT PRIMARY KEY,
                ts TEXT NOT NULL,
                label TEXT NOT NULL,
                class_id INTEGER NOT NULL,
                predicted_label TEXT,
                source TEXT NOT NULL,
                destination TEXT NOT NULL
            );
            CREATE TABLE IF NOT EXISTS attack_rates (
                kind TEXT NOT NULL,
                id TEXT PRIMARY KEY{rate_cols}
            );
            CREATE TABLE IF NOT EXISTS traffic_rates (
                kind TEXT NOT NULL,
                id TEXT PRIMARY KEY{rate_cols}
            );
            CREATE TABLE IF NOT EXISTS accuracy (
                kind TEXT NOT NULL,
                id TEXT PRIMARY KEY,
                overall_pct TEXT NOT NULL,
                overall_total INTEGER NOT NULL{accuracy_cols}
            );
            CREATE TABLE IF NOT EXISTS destination_columns (
                column_name TEXT PRIMARY KEY,
                destination TEXT NOT NULL
            );",
            rate_cols = rate_cols,
            accuracy_cols = accuracy_cols,
        );

        let conn = self.conn.lock();
        conn.execute_batch(&schema)
            .map_err(|e| PipelineError::PersistenceWriteFailure {
                attempts: 1,
                reason: format!("create tables: {}", e),
            })?;

        // Record the column assignment once; it is stable for the db lifetime
        for (i, destination) in self.destinations.iter().enumerate() {
            conn.execute(
                "INSERT OR IGNORE INTO destination_columns (column_name, destination) VALUES (?1, ?2)",
                rusqlite::params![format!("col_{:02}", i + 1), destination],
            )
            .map_err(|e| PipelineError::PersistenceWriteFailure {
                attempts: 1,
                reason: format!("column mapping: {}", e),
            })?;
        }

        Ok(())
    }

    /// Run one write closure with bounded retry and exponential backoff.
    fn with_retry<F>(&self, what: &str, mut op: F) -> PipelineResult<()>
    where
        F: FnMut(&Connection) -> rusqlite::Result<()>,
    {
        let mut attempt = 0u32;
        loop {
            attempt += 1;
            let result = {
                let conn = self.conn.lock();
                op(&conn)
            };
            match result {
                Ok(()) => return Ok(()),
                Err(e) if attempt < self.retry.max_attempts => {
                    let backoff = self.retry.backoff(attempt);
                    log::warn!(
                        "{} write failed (attempt {}/{}): {}; retrying in {:?}",
                        what,
                        attempt,
                        self.retry.max_attempts,
                        e,
                        backoff
                    );
                    std::thread::sleep(backoff);
                }
                Err(e) => {
                    return Err(PipelineError::PersistenceWriteFailure {
                        attempts: attempt,
                        reason: format!("{}: {}", what, e),
                    });
                }
            }
        }
    }
}

impl MetricsWriter for SqliteMetricsWriter {
    fn write_raw(&self, predictions: &[Prediction]) -> PipelineResult<()> {
        if predictions.is_empty() {
            return Ok(());
        }
        self.with_retry("raw predictions", |conn| {
            // One transaction per batch so a retry never half-applies
            conn.execute_batch("BEGIN")?;
            let result = (|| {
                let mut stmt = conn.prepare_cached(
                    "INSERT INTO raw_predictions
                     (id, ts, label, class_id, predicted_label, source, destination)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                )?;
                for p in predictions {
                    stmt.execute(rusqlite::params![
                        time_ordered_id(),
                        p.timestamp,
                        p.label,
                        p.class_id,
                        p.predicted_label,
                        p.source,
                        p.destination,
                    ])?;
                }
                Ok(())
            })();
            match result {
                Ok(()) => conn.execute_batch("COMMIT"),
                Err(e) => {
                    let _ = conn.execute_batch("ROLLBACK");
                    Err(e)
                }
            }
        })
    }

    fn write_rates(&self, aggregate: &DestinationAggregate, kind: RateKind) -> PipelineResult<()> {
        debug_assert_eq!(aggregate.rows.len(), self.destinations.len());

        let columns = self.rate_columns();
        let placeholders: Vec<String> =
            (1..=columns.len() + 2).map(|i| format!("?{}", i)).collect();
        let sql = format!(
            "INSERT INTO {} (kind, id{}) VALUES ({})",
            kind.table(),
            columns.iter().map(|c| format!(", {}", c)).collect::<String>(),
            placeholders.join(", "),
        );

        let rates: Vec<f64> = match kind {
            RateKind::Attack => aggregate.attack_rates().collect(),
            RateKind::Traffic => aggregate.traffic_rates().collect(),
        };

        self.with_retry(kind.table(), |conn| {
            let mut values: Vec<rusqlite::types::Value> = Vec::with_capacity(rates.len() + 2);
            values.push(kind.row_kind().to_string().into());
            values.push(time_ordered_id().into());
            for rate in &rates {
                values.push((*rate).into());
            }
            conn.execute(&sql, params_from_iter(values)).map(|_| ())
        })
    }

    fn write_accuracy(&self, snapshot: &AccuracySnapshot) -> PipelineResult<()> {
        let mut columns = String::new();
        for i in 1..=self.top_n {
            columns.push_str(&format!(", class_{i}, pct_{i}, total_{i}", i = i));
        }
        let placeholders: Vec<String> =
            (1..=4 + self.top_n * 3).map(|i| format!("?{}", i)).collect();
        let sql = format!(
            "INSERT INTO accuracy (kind, id, overall_pct, overall_total{}) VALUES ({})",
            columns,
            placeholders.join(", "),
        );

        self.with_retry("accuracy", |conn| {
            let mut values: Vec<rusqlite::types::Value> =
                Vec::with_capacity(4 + self.top_n * 3);
            values.push(ACCURACY_ROW_KIND.to_string().into());
            values.push(time_ordered_id().into());
            values.push(snapshot.overall_percent.clone().into());
            values.push((snapshot.overall_total as i64).into());
            // Fixed-width row: pad with NULLs while fewer classes are tracked
            for i in 0..self.top_n {
                match snapshot.classes.get(i) {
                    Some(c) => {
                        values.push(c.class.clone().into());
                        values.push(c.percent.clone().into());
                        values.push((c.total as i64).into());
                    }
                    None => {
                        values.push(rusqlite::types::Value::Null);
                        values.push(rusqlite::types::Value::Null);
                        values.push(rusqlite::types::Value::Null);
                    }
                }
            }
            conn.execute(&sql, params_from_iter(values)).map(|_| ())
        })
    }
}

// ============================================================================
// TESTS
// ============================================================================
