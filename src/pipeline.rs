//! Pipeline driver
//!
//! Owns the pull loop: one completed window per iteration through
//! vectorize → score → aggregate → persist. No execution-engine callbacks;
//! the driver decides when a window is processed. Record-level failures are
//! excluded and counted, batch-level failures drop one batch's derived
//! output, and only startup resource acquisition is allowed to be fatal.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::aggregate::{AccuracyAccumulator, DestinationAggregator};
use crate::error::{PipelineError, PipelineResult};
use crate::flow::vectorize::vectorize_batch;
use crate::flow::Prediction;
use crate::ingest::window::{Batch, WindowBatcher};
use crate::ingest::FlowSource;
use crate::model::Classifier;
use crate::store::{MetricsWriter, RateKind};

// ============================================================================
// STATS
// ============================================================================

/// Operator-facing counters. Every excluded record and dropped aggregate is
/// visible here so data loss is never silent.
#[derive(Default)]
pub struct PipelineStats {
    windows: AtomicU64,
    records: AtomicU64,
    rejects: AtomicU64,
    score_failures: AtomicU64,
    aggregates_dropped: AtomicU64,
    write_failures: AtomicU64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatsSnapshot {
    pub windows: u64,
    pub records: u64,
    pub rejects: u64,
    pub score_failures: u64,
    pub aggregates_dropped: u64,
    pub write_failures: u64,
}

impl PipelineStats {
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            windows: self.windows.load(Ordering::Relaxed),
            records: self.records.load(Ordering::Relaxed),
            rejects: self.rejects.load(Ordering::Relaxed),
            score_failures: self.score_failures.load(Ordering::Relaxed),
            aggregates_dropped: self.aggregates_dropped.load(Ordering::Relaxed),
            write_failures: self.write_failures.load(Ordering::Relaxed),
        }
    }
}

// ============================================================================
// SHUTDOWN
// ============================================================================

/// Cooperative cancellation. The in-flight window always finishes its
/// accumulator update and persistence writes before the loop exits.
#[derive(Clone)]
pub struct ShutdownHandle(Arc<AtomicBool>);

impl ShutdownHandle {
    pub fn request(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_requested(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

// ============================================================================
// PIPELINE
// ============================================================================

pub struct Pipeline {
    batcher: WindowBatcher,
    classifier: Arc<dyn Classifier>,
    aggregator: DestinationAggregator,
    accumulator: Arc<AccuracyAccumulator>,
    writer: Arc<dyn MetricsWriter>,
    stats: Arc<PipelineStats>,
    shutdown: Arc<AtomicBool>,
    /// Stop after this many windows; 0 = run until cancelled
    max_windows: u64,
}

impl Pipeline {
    pub fn new(
        batcher: WindowBatcher,
        classifier: Arc<dyn Classifier>,
        aggregator: DestinationAggregator,
        accumulator: Arc<AccuracyAccumulator>,
        writer: Arc<dyn MetricsWriter>,
        max_windows: u64,
    ) -> Self {
        Self {
            batcher,
            classifier,
            aggregator,
            accumulator,
            writer,
            stats: Arc::new(PipelineStats::default()),
            shutdown: Arc::new(AtomicBool::new(false)),
            max_windows,
        }
    }

    pub fn stats(&self) -> Arc<PipelineStats> {
        Arc::clone(&self.stats)
    }

    pub fn shutdown_handle(&self) -> ShutdownHandle {
        ShutdownHandle(Arc::clone(&self.shutdown))
    }

    /// Consume windows until the window budget is spent, shutdown is
    /// requested, or the source ends.
    pub fn run(&mut self, source: &mut dyn FlowSource) -> PipelineResult<StatsSnapshot> {
        loop {
            if self.shutdown.load(Ordering::SeqCst) {
                log::info!("shutdown requested, stopping after completed window");
                break;
            }
            if self.max_windows > 0
                && self.stats.windows.load(Ordering::Relaxed) >= self.max_windows
            {
                log::info!("window budget of {} reached", self.max_windows);
                break;
            }

            match self.batcher.next_batch(source) {
                Ok(batch) => self.process_window(batch),
                Err(PipelineError::QueueUnavailable(reason)) => {
                    log::info!("source ended: {}", reason);
                    break;
                }
                Err(e) => return Err(e),
            }
        }
        Ok(self.stats.snapshot())
    }

    /// Process one closed window end to end. Takes `&self`: with a
    /// partitioned source, multiple windows may run concurrently; only the
    /// accuracy accumulator coordinates across them.
    pub fn process_window(&self, batch: Batch) {
        let window_size = batch.records.len();
        let (kept, vectors, vectorize_rejects) = vectorize_batch(&batch.records);
        let rejects = batch.rejects + vectorize_rejects;

        let scores = self.classifier.score(&vectors);
        let mut predictions: Vec<Prediction> = Vec::with_capacity(kept.len());
        let mut score_failures = 0u64;
        for (record, score) in kept.iter().zip(scores) {
            match score {
                Ok(class_id) => predictions.push(Prediction::new(record, class_id)),
                Err(e) => {
                    log::warn!("record excluded from predictions: {}", e);
                    score_failures += 1;
                }
            }
        }

        // Raw predictions are written even when the aggregate is dropped
        if let Err(e) = self.writer.write_raw(&predictions) {
            self.record_lost_write(&e);
        }

        match self.aggregator.aggregate(&predictions, batch.duration) {
            Ok(aggregate) => {
                for kind in [RateKind::Attack, RateKind::Traffic] {
                    if let Err(e) = self.writer.write_rates(&aggregate, kind) {
                        self.record_lost_write(&e);
                    }
                }
            }
            Err(e) => {
                log::warn!("aggregate dropped for this window: {}", e);
                self.stats.aggregates_dropped.fetch_add(1, Ordering::Relaxed);
            }
        }

        let snapshot = self.accumulator.update(&predictions);
        if let Err(e) = self.writer.write_accuracy(&snapshot) {
            self.record_lost_write(&e);
        }

        self.stats.windows.fetch_add(1, Ordering::Relaxed);
        self.stats.records.fetch_add(window_size as u64, Ordering::Relaxed);
        self.stats.rejects.fetch_add(rejects as u64, Ordering::Relaxed);
        self.stats.score_failures.fetch_add(score_failures, Ordering::Relaxed);

        log::info!(
            "window done: {} records, {} rejects, {} predictions, {:.3}s, overall accuracy {}",
            window_size,
            rejects,
            predictions.len(),
            batch.duration.as_secs_f64(),
            snapshot.overall_percent,
        );
    }

    fn record_lost_write(&self, err: &PipelineError) {
        // Lost but recoverable on the next successful window
        log::warn!("metrics write lost: {}", err);
        self.stats.write_failures.fetch_add(1, Ordering::Relaxed);
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use crate::flow::schema::{FEATURE_COUNT, FEATURE_LAYOUT};
    use crate::flow::vectorize::FeatureVector;
    use crate::ingest::window::WindowPolicy;
    use crate::model::ScoreError;
    use crate::store::{RetryPolicy, SqliteMetricsWriter};

    /// Classifier stub: the producer encodes the intended class in the
    /// "PSH Flag Cnt" feature.
    struct EchoClassifier;

    impl Classifier for EchoClassifier {
        fn score(&self, vectors: &[FeatureVector]) -> Vec<Result<i64, ScoreError>> {
            vectors
                .iter()
                .map(|v| Ok(v.get_by_name("PSH Flag Cnt").unwrap_or(0.0) as i64))
                .collect()
        }
    }

    struct ScriptedSource {
        payloads: std::vec::IntoIter<String>,
    }

    impl FlowSource for ScriptedSource {
        fn poll(&mut self, _t: Duration) -> Result<Option<String>, PipelineError> {
            self.payloads
                .next()
                .map(Some)
                .ok_or_else(|| PipelineError::QueueUnavailable("scripted end".into()))
        }
    }

    fn record_json(destination: &str, label: &str, class: i64) -> String {
        let mut fields = serde_json::Map::new();
        for name in FEATURE_LAYOUT {
            fields.insert(name.to_string(), serde_json::json!(1.0));
        }
        fields.insert("PSH Flag Cnt".into(), serde_json::json!(class as f64));
        fields.insert("Timestamp".into(), serde_json::json!("02/03/2018 10:42:11"));
        fields.insert("Label".into(), serde_json::json!(label));
        fields.insert("Source".into(), serde_json::json!("172.31.64.17"));
        fields.insert("Destination".into(), serde_json::json!(destination));
        serde_json::Value::Object(fields).to_string()
    }

    fn build_pipeline(
        dir: &tempfile::TempDir,
        destinations: Vec<String>,
        window_size: usize,
        max_windows: u64,
    ) -> Pipeline {
        let writer = SqliteMetricsWriter::open(
            dir.path().join("metrics.db"),
            &destinations,
            6,
            RetryPolicy { max_attempts: 2, backoff_base: Duration::from_millis(1) },
        )
        .unwrap();

        Pipeline::new(
            WindowBatcher::new(WindowPolicy::Count(window_size), Duration::from_millis(1)),
            Arc::new(EchoClassifier),
            DestinationAggregator::new(destinations),
            Arc::new(AccuracyAccumulator::new(6)),
            Arc::new(writer),
            max_windows,
        )
    }

    #[test]
    fn test_run_stops_at_window_budget() {
        let dir = tempfile::tempdir().unwrap();
        let destinations = vec!["10.0.0.1".to_string()];
        let mut pipeline = build_pipeline(&dir, destinations, 4, 2);

        let payloads: Vec<String> = (0..100)
            .map(|_| record_json("10.0.0.1", "Benign", 0))
            .collect();
        let mut source = ScriptedSource { payloads: payloads.into_iter() };

        let stats = pipeline.run(&mut source).unwrap();
        assert_eq!(stats.windows, 2);
        assert_eq!(stats.records, 8);
        assert_eq!(stats.rejects, 0);
        assert_eq!(stats.aggregates_dropped, 0);
    }

    #[test]
    fn test_shutdown_finishes_in_flight_window() {
        let dir = tempfile::tempdir().unwrap();
        let destinations = vec!["10.0.0.1".to_string()];
        let mut pipeline = build_pipeline(&dir, destinations, 3, 0);

        let handle = pipeline.shutdown_handle();
        handle.request();

        let payloads: Vec<String> =
            (0..9).map(|_| record_json("10.0.0.1", "Benign", 0)).collect();
        let mut source = ScriptedSource { payloads: payloads.into_iter() };

        let stats = pipeline.run(&mut source).unwrap();
        // Requested before the first window opened, so nothing is processed
        assert_eq!(stats.windows, 0);
        assert!(handle.is_requested());
    }

    #[test]
    fn test_cardinality_mismatch_drops_aggregate_keeps_raw() {
        let dir = tempfile::tempdir().unwrap();
        let destinations = vec!["10.0.0.1".to_string(), "10.0.0.2".to_string()];
        let mut pipeline = build_pipeline(&dir, destinations, 5, 1);

        // Only one of the two declared destinations appears
        let payloads: Vec<String> = (0..5)
            .map(|_| record_json("10.0.0.1", "Benign", 0))
            .collect();
        let mut source = ScriptedSource { payloads: payloads.into_iter() };

        let stats = pipeline.run(&mut source).unwrap();
        assert_eq!(stats.aggregates_dropped, 1);

        let conn = rusqlite::Connection::open(dir.path().join("metrics.db")).unwrap();
        let raw: i64 = conn
            .query_row("SELECT COUNT(*) FROM raw_predictions", [], |r| r.get(0))
            .unwrap();
        let rates: i64 = conn
            .query_row("SELECT COUNT(*) FROM attack_rates", [], |r| r.get(0))
            .unwrap();
        assert_eq!(raw, 5);
        assert_eq!(rates, 0);
    }

    #[test]
    fn test_malformed_and_short_records_counted() {
        let dir = tempfile::tempdir().unwrap();
        let destinations = vec!["10.0.0.1".to_string()];
        let mut pipeline = build_pipeline(&dir, destinations, 3, 1);

        let mut short = serde_json::from_str::<serde_json::Value>(&record_json(
            "10.0.0.1", "Benign", 0,
        ))
        .unwrap();
        short.as_object_mut().unwrap().remove("Flow Duration");

        let payloads = vec![
            record_json("10.0.0.1", "Benign", 0),
            "garbage".to_string(),
            record_json("10.0.0.1", "Benign", 0),
            short.to_string(),
        ];
        let mut source = ScriptedSource { payloads: payloads.into_iter() };

        let stats = pipeline.run(&mut source).unwrap();
        assert_eq!(stats.windows, 1);
        // One malformed message + one record missing a feature
        assert_eq!(stats.rejects, 2);

        let conn = rusqlite::Connection::open(dir.path().join("metrics.db")).unwrap();
        let raw: i64 = conn
            .query_row("SELECT COUNT(*) FROM raw_predictions", [], |r| r.get(0))
            .unwrap();
        assert_eq!(raw, 2);
    }
}
