//! Per-batch aggregation
//!
//! Two consumers of a scored batch: per-destination rate aggregation
//! (stateless, one output per batch) and the process-lifetime accuracy
//! accumulator (shared, mutex-protected).

pub mod accuracy;
pub mod destination;

pub use accuracy::{AccuracyAccumulator, AccuracySnapshot, ClassAccuracy};
pub use destination::{DestinationAggregate, DestinationAggregator, DestinationRate};
