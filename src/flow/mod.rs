//! Flow data model
//!
//! Raw flow records as produced on the queue, and the per-record prediction
//! derived from them. Both are immutable once created.

pub mod schema;
pub mod vectorize;

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::flow::schema::class_name;

// ============================================================================
// FLOW RECORD
// ============================================================================

/// One raw flow event from the ingestion queue.
///
/// The four meta fields are pulled out by name; every other key in the JSON
/// object lands in `features`. A message missing a meta field (or that is not
/// a JSON object of numbers) fails to decode and is counted as malformed by
/// the batcher.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FlowRecord {
    #[serde(rename = "Timestamp")]
    pub timestamp: String,

    #[serde(rename = "Label")]
    pub label: String,

    #[serde(rename = "Source")]
    pub source: String,

    #[serde(rename = "Destination")]
    pub destination: String,

    /// Flow statistics keyed by feature name, as sent by the producer.
    /// Key order on the wire is irrelevant; the vectorizer imposes order.
    #[serde(flatten)]
    pub features: HashMap<String, f64>,
}

impl FlowRecord {
    /// Decode a queue message payload.
    pub fn from_json(payload: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(payload)
    }
}

// ============================================================================
// PREDICTION
// ============================================================================

/// Scored record: the classifier's output re-joined to the source record's
/// identifying fields. Read-only after creation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Prediction {
    pub timestamp: String,
    pub label: String,
    pub class_id: i64,
    pub predicted_label: Option<String>,
    pub source: String,
    pub destination: String,
}

impl Prediction {
    pub fn new(record: &FlowRecord, class_id: i64) -> Self {
        Self {
            timestamp: record.timestamp.clone(),
            label: record.label.clone(),
            class_id,
            predicted_label: class_name(class_id).map(str::to_string),
            source: record.source.clone(),
            destination: record.destination.clone(),
        }
    }

    /// Anything the model does not call benign counts as an attack.
    pub fn is_attack(&self) -> bool {
        self.class_id != schema::BENIGN_CLASS
    }

    /// Predicted class name matches the ground-truth label.
    pub fn is_correct(&self) -> bool {
        self.predicted_label.as_deref() == Some(self.label.as_str())
    }
}

// ============================================================================
// TESTS
// ============================================================================
