//! Inference Engine - ONNX Runtime integration
//!
//! Wraps the pre-trained classifier behind a narrow scoring trait so the
//! pipeline never touches the runtime directly. The model is loaded once at
//! startup and shared read-only across all workers.

pub mod artifact;

use std::sync::atomic::{AtomicU64, Ordering};

use ndarray::Array2;
use ort::session::{builder::GraphOptimizationLevel, Session};
use ort::value::Value;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::error::PipelineError;
use crate::flow::schema::{layout_hash, FEATURE_COUNT, SCHEMA_VERSION};
use crate::flow::vectorize::FeatureVector;

// ============================================================================
// SCORING TRAIT
// ============================================================================

/// Per-record scoring failure, isolated to the offending vector.
#[derive(Debug, Clone, thiserror::Error)]
#[error("scoring failed: {0}")]
pub struct ScoreError(pub String);

/// Batch scoring interface. One result per input vector, in order; a failed
/// record never poisons its neighbours.
pub trait Classifier: Send + Sync {
    fn score(&self, vectors: &[FeatureVector]) -> Vec<Result<i64, ScoreError>>;
}

// ============================================================================
// ENGINE STATUS
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineStatus {
    pub model_path: String,
    pub feature_count: usize,
    pub inference_count: u64,
    pub avg_latency_ms: f32,
}

// ============================================================================
// ONNX CLASSIFIER
// ============================================================================

#[derive(Debug)]
pub struct OnnxClassifier {
    session: Mutex<Session>,
    output_name: String,
    loaded_from: String,
    inference_count: AtomicU64,
    latency_sum_us: AtomicU64,
}

impl OnnxClassifier {
    /// Load the classifier once at startup. Any failure is `ModelUnavailable`
    /// and fatal to process start.
    pub fn load(location: &str, checksum: Option<&str>) -> Result<Self, PipelineError> {
        let bytes = artifact::fetch(location)?;
        if let Some(expected) = checksum {
            artifact::verify_checksum(&bytes, expected)?;
        }

        let session = Session::builder()
            .map_err(|e| PipelineError::ModelUnavailable(format!("session builder: {}", e)))?
            .with_optimization_level(GraphOptimizationLevel::Level3)
            .map_err(|e| PipelineError::ModelUnavailable(format!("optimization: {}", e)))?
            .commit_from_memory(&bytes)
            .map_err(|e| PipelineError::ModelUnavailable(format!("load model: {}", e)))?;

        let output_name = session
            .outputs()
            .first()
            .map(|o| o.name().to_string())
            .ok_or_else(|| PipelineError::ModelUnavailable("model has no outputs".into()))?;

        log::info!("classifier loaded from {} (output '{}')", location, output_name);

        Ok(Self {
            session: Mutex::new(session),
            output_name,
            loaded_from: location.to_string(),
            inference_count: AtomicU64::new(0),
            latency_sum_us: AtomicU64::new(0),
        })
    }

    pub fn status(&self) -> EngineStatus {
        let count = self.inference_count.load(Ordering::Relaxed);
        let sum = self.latency_sum_us.load(Ordering::Relaxed);
        EngineStatus {
            model_path: self.loaded_from.clone(),
            feature_count: FEATURE_COUNT,
            inference_count: count,
            avg_latency_ms: if count > 0 { (sum as f32 / count as f32) / 1000.0 } else { 0.0 },
        }
    }

    fn run_batch(&self, rows: &[[f32; FEATURE_COUNT]]) -> Result<Vec<i64>, ScoreError> {
        let start = std::time::Instant::now();

        let mut input_data = Vec::with_capacity(rows.len() * FEATURE_COUNT);
        for row in rows {
            input_data.extend_from_slice(row);
        }
        let input_array = Array2::<f32>::from_shape_vec((rows.len(), FEATURE_COUNT), input_data)
            .map_err(|e| ScoreError(format!("array error: {}", e)))?;

        let input_tensor = Value::from_array(input_array)
            .map_err(|e| ScoreError(format!("tensor error: {}", e)))?;

        let mut session = self.session.lock();
        let outputs = session
            .run(ort::inputs![input_tensor])
            .map_err(|e| ScoreError(format!("inference failed: {}", e)))?;

        let output = outputs
            .get(&self.output_name)
            .ok_or_else(|| ScoreError("no output".into()))?;

        // Label tensor directly, or class probabilities to argmax
        let classes = if let Ok((_, labels)) = output.try_extract_tensor::<i64>() {
            labels.to_vec()
        } else {
            let (_, probs) = output
                .try_extract_tensor::<f32>()
                .map_err(|e| ScoreError(format!("extract error: {}", e)))?;
            if probs.len() % rows.len() != 0 {
                return Err(ScoreError(format!(
                    "output size {} not divisible by batch size {}",
                    probs.len(),
                    rows.len()
                )));
            }
            let width = probs.len() / rows.len();
            probs.chunks(width).map(argmax).collect()
        };

        if classes.len() != rows.len() {
            return Err(ScoreError(format!(
                "expected {} predictions, got {}",
                rows.len(),
                classes.len()
            )));
        }

        self.latency_sum_us
            .fetch_add(start.elapsed().as_micros() as u64, Ordering::Relaxed);
        self.inference_count.fetch_add(1, Ordering::Relaxed);

        Ok(classes)
    }
}

impl Classifier for OnnxClassifier {
    fn score(&self, vectors: &[FeatureVector]) -> Vec<Result<i64, ScoreError>> {
        // Validate first so one bad vector cannot poison the tensor run
        let mut results: Vec<Option<Result<i64, ScoreError>>> = Vec::with_capacity(vectors.len());
        let mut valid_rows: Vec<[f32; FEATURE_COUNT]> = Vec::with_capacity(vectors.len());
        let mut valid_slots: Vec<usize> = Vec::with_capacity(vectors.len());

        for (i, vector) in vectors.iter().enumerate() {
            match validate_vector(vector) {
                Ok(()) => {
                    results.push(None);
                    valid_rows.push(vector.values);
                    valid_slots.push(i);
                }
                Err(e) => results.push(Some(Err(e))),
            }
        }

        if !valid_rows.is_empty() {
            match self.run_batch(&valid_rows) {
                Ok(classes) => {
                    for (slot, class) in valid_slots.into_iter().zip(classes) {
                        results[slot] = Some(Ok(class));
                    }
                }
                Err(e) => {
                    for slot in valid_slots {
                        results[slot] = Some(Err(e.clone()));
                    }
                }
            }
        }

        results
            .into_iter()
            .map(|r| r.unwrap_or_else(|| Err(ScoreError("score slot left unfilled".into()))))
            .collect()
    }
}

// ============================================================================
// HELPERS
// ============================================================================

fn validate_vector(vector: &FeatureVector) -> Result<(), ScoreError> {
    if vector.version != SCHEMA_VERSION || vector.layout_hash != layout_hash() {
        return Err(ScoreError(format!(
            "layout mismatch: vector v{} ({:08x}), expected v{} ({:08x})",
            vector.version,
            vector.layout_hash,
            SCHEMA_VERSION,
            layout_hash()
        )));
    }
    if let Some(i) = vector.values.iter().position(|v| !v.is_finite()) {
        return Err(ScoreError(format!("non-finite value at feature {}", i)));
    }
    Ok(())
}

fn argmax(row: &[f32]) -> i64 {
    let mut best = 0usize;
    for (i, v) in row.iter().enumerate() {
        if *v > row[best] {
            best = i;
        }
    }
    best as i64
}

// ============================================================================
// TESTS
// ============================================================================
