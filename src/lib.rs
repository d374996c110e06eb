//! flow-insight - Real-time network flow classification pipeline
//!
//! Micro-batches a continuous stream of flow records, scores each record
//! with a pre-trained classifier, and maintains per-destination rate
//! aggregates plus a process-lifetime accuracy accumulator, persisting all
//! three as append-only time-ordered metric rows.
//!
//! Stage order: source → window batcher → vectorizer → inference →
//! {destination aggregator, accuracy accumulator} → metrics writer.

pub mod aggregate;
pub mod config;
pub mod error;
pub mod flow;
pub mod ingest;
pub mod model;
pub mod pipeline;
pub mod store;

pub use config::Config;
pub use error::{PipelineError, PipelineResult};
pub use pipeline::{Pipeline, PipelineStats, ShutdownHandle, StatsSnapshot};
