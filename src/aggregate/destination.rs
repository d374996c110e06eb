//! Destination Aggregator
//!
//! Groups one batch's predictions by destination and normalizes attack and
//! total-traffic counts into per-second rates. The persistence layout is a
//! fixed-width row with one column per known destination, so the observed
//! key set must equal the pre-declared set exactly; anything else drops the
//! whole aggregate rather than force-fitting a partial row.

use std::collections::{BTreeSet, HashMap};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::PipelineError;
use crate::flow::Prediction;

// ============================================================================
// OUTPUT
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DestinationRate {
    pub destination: String,
    pub attack_count: u64,
    pub traffic_count: u64,
    /// Attack predictions per second over the batch window
    pub attack_rate: f64,
    /// All records per second over the batch window
    pub traffic_rate: f64,
}

/// Immutable per-batch aggregate, rows in lexicographic destination order.
/// Column assignment is therefore stable across batches.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DestinationAggregate {
    pub rows: Vec<DestinationRate>,
    pub duration_secs: f64,
}

impl DestinationAggregate {
    pub fn attack_rates(&self) -> impl Iterator<Item = f64> + '_ {
        self.rows.iter().map(|r| r.attack_rate)
    }

    pub fn traffic_rates(&self) -> impl Iterator<Item = f64> + '_ {
        self.rows.iter().map(|r| r.traffic_rate)
    }
}

// ============================================================================
// AGGREGATOR
// ============================================================================

pub struct DestinationAggregator {
    /// Pre-declared destination keys, sorted and deduplicated once
    expected: Vec<String>,
}

impl DestinationAggregator {
    pub fn new<I, S>(expected_keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let set: BTreeSet<String> = expected_keys.into_iter().map(Into::into).collect();
        Self { expected: set.into_iter().collect() }
    }

    pub fn cardinality(&self) -> usize {
        self.expected.len()
    }

    pub fn expected_keys(&self) -> &[String] {
        &self.expected
    }

    /// Aggregate one scored batch. Never mutates shared state.
    ///
    /// Fails with `CardinalityMismatch` when the observed destination set is
    /// not exactly the pre-declared one; the caller drops the aggregate and
    /// still writes the raw predictions.
    pub fn aggregate(
        &self,
        predictions: &[Prediction],
        duration: Duration,
    ) -> Result<DestinationAggregate, PipelineError> {
        let mut counts: HashMap<&str, (u64, u64)> = HashMap::new();
        for p in predictions {
            let entry = counts.entry(p.destination.as_str()).or_insert((0, 0));
            entry.1 += 1;
            if p.is_attack() {
                entry.0 += 1;
            }
        }

        if counts.len() != self.expected.len()
            || !self.expected.iter().all(|d| counts.contains_key(d.as_str()))
        {
            return Err(PipelineError::CardinalityMismatch {
                observed: counts.len(),
                expected: self.expected.len(),
            });
        }

        // A zero-length window would blow up the division
        let secs = duration.as_secs_f64().max(1e-6);

        let rows = self
            .expected
            .iter()
            .map(|destination| {
                let (attack, traffic) = counts[destination.as_str()];
                DestinationRate {
                    destination: destination.clone(),
                    attack_count: attack,
                    traffic_count: traffic,
                    attack_rate: attack as f64 / secs,
                    traffic_rate: traffic as f64 / secs,
                }
            })
            .collect();

        Ok(DestinationAggregate { rows, duration_secs: secs })
    }
}

// ============================================================================
// TESTS
// ============================================================================
