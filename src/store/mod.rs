//! Metrics persistence boundary
//!
//! Three append-only tables (raw predictions, per-destination rates,
//! accuracy snapshots), every row keyed by a time-ordered unique id. The
//! store's own connection/session management sits behind [`MetricsWriter`];
//! this crate ships a SQLite implementation.

pub mod sqlite;

pub use sqlite::SqliteMetricsWriter;

use std::time::Duration;

use uuid::Uuid;

use crate::aggregate::{AccuracySnapshot, DestinationAggregate};
use crate::error::PipelineResult;
use crate::flow::Prediction;

// ============================================================================
// ROW KINDS
// ============================================================================

/// Which fixed-width rate table a batch aggregate lands in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateKind {
    Attack,
    Traffic,
}

impl RateKind {
    pub fn table(self) -> &'static str {
        match self {
            RateKind::Attack => "attack_rates",
            RateKind::Traffic => "traffic_rates",
        }
    }

    /// Row-kind constant stored alongside each row
    pub fn row_kind(self) -> &'static str {
        "rate"
    }
}

/// Row-kind constant for accuracy snapshot rows
pub const ACCURACY_ROW_KIND: &str = "accu";

// ============================================================================
// TIME-ORDERED IDS
// ============================================================================

/// Unique row id that sorts by insertion time: zero-padded hex microseconds
/// since epoch, plus random entropy so concurrent writers never collide.
///
/// The microsecond prefix is forced strictly monotonic within this process,
/// so two rows written back-to-back in the same microsecond still sort in
/// insertion order.
pub fn time_ordered_id() -> String {
    use std::sync::atomic::{AtomicI64, Ordering};
    static LAST_MICROS: AtomicI64 = AtomicI64::new(0);

    let now = chrono::Utc::now().timestamp_micros();
    let micros = LAST_MICROS
        .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |last| {
            Some(now.max(last + 1))
        })
        .map(|last| now.max(last + 1))
        .unwrap_or(now);

    format!("{:016x}-{}", micros, Uuid::new_v4().simple())
}

// ============================================================================
// WRITER TRAIT
// ============================================================================

/// Append-only metrics sink. No updates, no deletes.
pub trait MetricsWriter: Send + Sync {
    /// One row per prediction
    fn write_raw(&self, predictions: &[Prediction]) -> PipelineResult<()>;

    /// One fixed-width row, one rate column per known destination
    fn write_rates(&self, aggregate: &DestinationAggregate, kind: RateKind) -> PipelineResult<()>;

    /// One fixed-width row of per-class percentages and running totals
    fn write_accuracy(&self, snapshot: &AccuracySnapshot) -> PipelineResult<()>;
}

// ============================================================================
// RETRY POLICY
// ============================================================================

/// Bounded retry with exponential backoff for transient write failures.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub backoff_base: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self { max_attempts: 3, backoff_base: Duration::from_millis(100) }
    }
}

impl RetryPolicy {
    /// Backoff before retry `attempt` (1-based): base * 2^(attempt-1)
    pub fn backoff(&self, attempt: u32) -> Duration {
        self.backoff_base * 2u32.saturating_pow(attempt.saturating_sub(1))
    }
}

// ============================================================================
// TESTS
// ============================================================================
