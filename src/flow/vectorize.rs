//! Feature Vectorizer
//!
//! Pure transform from a raw flow record to the fixed-order numeric vector
//! the classifier was trained on. Per-record correspondence is preserved so
//! predictions can be re-joined to source/destination/label downstream.

use serde::{Deserialize, Serialize};

use crate::error::PipelineError;
use crate::flow::schema::{layout_hash, FEATURE_COUNT, FEATURE_LAYOUT, SCHEMA_VERSION};
use crate::flow::FlowRecord;

// ============================================================================
// FEATURE VECTOR
// ============================================================================

/// Versioned feature vector with layout metadata.
///
/// Always built through [`vectorize`] so the value order is guaranteed to
/// match [`FEATURE_LAYOUT`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeatureVector {
    /// Feature layout version
    pub version: u8,
    /// CRC32 hash of the feature layout (for mismatch detection)
    pub layout_hash: u32,
    /// Feature values in FEATURE_LAYOUT order
    pub values: [f32; FEATURE_COUNT],
}

impl FeatureVector {
    pub fn from_values(values: [f32; FEATURE_COUNT]) -> Self {
        Self {
            version: SCHEMA_VERSION,
            layout_hash: layout_hash(),
            values,
        }
    }

    pub fn as_slice(&self) -> &[f32] {
        &self.values
    }

    /// Get feature value by name
    pub fn get_by_name(&self, name: &str) -> Option<f32> {
        crate::flow::schema::feature_index(name).map(|i| self.values[i])
    }
}

// ============================================================================
// VECTORIZATION
// ============================================================================

/// Convert one record into a feature vector, selecting and reordering fields
/// to match the training layout and coercing to f32.
///
/// Fails with `SchemaMismatch` naming the first absent feature; the caller
/// excludes the record from inference and counts it.
pub fn vectorize(record: &FlowRecord) -> Result<FeatureVector, PipelineError> {
    let mut values = [0.0f32; FEATURE_COUNT];
    for (i, name) in FEATURE_LAYOUT.iter().enumerate() {
        match record.features.get(*name) {
            Some(v) => values[i] = *v as f32,
            None => {
                return Err(PipelineError::SchemaMismatch { field: (*name).to_string() });
            }
        }
    }
    Ok(FeatureVector::from_values(values))
}

/// Vectorize a whole batch, partitioning it into (kept records with their
/// vectors, reject count). Index correspondence between the returned records
/// and vectors is exact.
pub fn vectorize_batch(records: &[FlowRecord]) -> (Vec<&FlowRecord>, Vec<FeatureVector>, usize) {
    let mut kept = Vec::with_capacity(records.len());
    let mut vectors = Vec::with_capacity(records.len());
    let mut rejects = 0usize;

    for record in records {
        match vectorize(record) {
            Ok(v) => {
                kept.push(record);
                vectors.push(v);
            }
            Err(e) => {
                log::warn!("record excluded from inference: {}", e);
                rejects += 1;
            }
        }
    }

    (kept, vectors, rejects)
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn record_with_all_features() -> FlowRecord {
        let mut features = HashMap::new();
        for (i, name) in FEATURE_LAYOUT.iter().enumerate() {
            features.insert(name.to_string(), i as f64 + 0.5);
        }
        FlowRecord {
            timestamp: "02/03/2018 10:42:11".into(),
            label: "Benign".into(),
            source: "172.31.64.17".into(),
            destination: "172.31.69.25".into(),
            features,
        }
    }

    #[test]
    fn test_vector_length_and_order() {
        let record = record_with_all_features();
        let vector = vectorize(&record).unwrap();

        assert_eq!(vector.values.len(), FEATURE_COUNT);
        // Values appear in declared order, not producer key order
        for (i, name) in FEATURE_LAYOUT.iter().enumerate() {
            assert_eq!(vector.values[i], record.features[*name] as f32);
            assert_eq!(vector.get_by_name(name), Some(vector.values[i]));
        }
        assert_eq!(vector.version, SCHEMA_VERSION);
        assert_eq!(vector.layout_hash, layout_hash());
    }

    #[test]
    fn test_missing_feature_is_schema_mismatch() {
        let mut record = record_with_all_features();
        record.features.remove("Flow Duration");

        match vectorize(&record) {
            Err(PipelineError::SchemaMismatch { field }) => {
                assert_eq!(field, "Flow Duration");
            }
            other => panic!("expected SchemaMismatch, got {:?}", other),
        }
    }

    #[test]
    fn test_batch_excludes_and_counts_rejects() {
        let good = record_with_all_features();
        let mut bad = record_with_all_features();
        bad.features.remove("Flow Duration");

        let records = vec![good.clone(), bad, good];
        let (kept, vectors, rejects) = vectorize_batch(&records);

        assert_eq!(kept.len(), 2);
        assert_eq!(vectors.len(), 2);
        assert_eq!(rejects, 1);
        // Correspondence: kept[i] produced vectors[i]
        for (record, vector) in kept.iter().zip(&vectors) {
            assert_eq!(
                vector.get_by_name("Pkt Size Avg"),
                Some(record.features["Pkt Size Avg"] as f32)
            );
        }
    }
}
