//! Error taxonomy for the streaming pipeline
//!
//! Record-level errors never abort a batch; batch-level errors never abort
//! the process; only resource acquisition at startup is fatal.

use thiserror::Error;

pub type PipelineResult<T> = Result<T, PipelineError>;

#[derive(Debug, Error)]
pub enum PipelineError {
    /// Record-level: a required feature field is absent. The record is
    /// excluded from inference and counted, never fatal to the batch.
    #[error("schema mismatch: missing required field '{field}'")]
    SchemaMismatch { field: String },

    /// Startup-level: the trained model artifact could not be loaded.
    /// Fatal to process start.
    #[error("model unavailable: {0}")]
    ModelUnavailable(String),

    /// Batch-level: observed destination set does not match the fixed
    /// persistence layout. The batch's aggregate is dropped whole.
    #[error("cardinality mismatch: observed {observed} destinations, expected {expected}")]
    CardinalityMismatch { observed: usize, expected: usize },

    /// Transient store error after bounded retries. Surfaced as a
    /// recoverable-loss warning, not fatal.
    #[error("persistence write failed after {attempts} attempts: {reason}")]
    PersistenceWriteFailure { attempts: u32, reason: String },

    /// Queue/broker unreachable. Per configuration this is fatal or retried,
    /// never silently swallowed.
    #[error("queue unavailable: {0}")]
    QueueUnavailable(String),
}

impl PipelineError {
    /// Record-level errors are excluded-and-counted, never propagated upward.
    pub fn is_record_level(&self) -> bool {
        matches!(self, PipelineError::SchemaMismatch { .. })
    }

    /// Batch-level errors drop one batch's derived output only.
    pub fn is_batch_level(&self) -> bool {
        matches!(
            self,
            PipelineError::CardinalityMismatch { .. }
                | PipelineError::PersistenceWriteFailure { .. }
        )
    }
}
