//! Configuration module
//!
//! All runtime knobs come from environment variables, with defaults that
//! mirror the reference deployment (5000-record windows, 13 destinations).

use std::env;
use std::time::Duration;

/// Default fixed-count window size.
pub const DEFAULT_WINDOW_SIZE: usize = 5000;

/// Default number of top classes tracked by the accuracy accumulator.
pub const DEFAULT_TOP_CLASSES: usize = 6;

/// Application configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Queue broker address(es), comma separated
    pub broker_addrs: Vec<String>,

    /// Topic to consume flow records from
    pub topic: String,

    /// Consumer group id
    pub group_id: String,

    /// Records per fixed-count window
    pub window_size: usize,

    /// Poll timeout while waiting for new records
    pub poll_timeout: Duration,

    /// Model artifact location (local path or http(s) URL)
    pub model_artifact: String,

    /// Optional hex SHA-256 checksum the artifact must match
    pub model_checksum: Option<String>,

    /// SQLite database path for metric snapshots
    pub metrics_db: String,

    /// Pre-declared destination keys (fixed aggregation cardinality)
    pub expected_destinations: Vec<String>,

    /// Top-N classes tracked by the accuracy accumulator
    pub top_classes: usize,

    /// Stop after this many processed windows (0 = run until cancelled)
    pub max_windows: u64,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Self {
        Self {
            broker_addrs: env::var("BROKER_ADDRS")
                .unwrap_or_else(|_| "localhost:9092".to_string())
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect(),

            topic: env::var("FLOW_TOPIC").unwrap_or_else(|_| "cyber".to_string()),

            group_id: env::var("CONSUMER_GROUP")
                .unwrap_or_else(|_| "flow-insight".to_string()),

            window_size: env::var("WINDOW_SIZE")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(DEFAULT_WINDOW_SIZE),

            poll_timeout: Duration::from_millis(
                env::var("POLL_TIMEOUT_MS")
                    .ok()
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(500),
            ),

            model_artifact: env::var("MODEL_ARTIFACT")
                .unwrap_or_else(|_| "models/rfc_model.onnx".to_string()),

            model_checksum: env::var("MODEL_SHA256").ok().filter(|s| !s.is_empty()),

            metrics_db: env::var("METRICS_DB")
                .unwrap_or_else(|_| "flow_insight.db".to_string()),

            expected_destinations: env::var("EXPECTED_DESTINATIONS")
                .map(|v| {
                    v.split(',')
                        .map(|s| s.trim().to_string())
                        .filter(|s| !s.is_empty())
                        .collect()
                })
                .unwrap_or_default(),

            top_classes: env::var("TOP_CLASSES")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(DEFAULT_TOP_CLASSES),

            max_windows: env::var("MAX_WINDOWS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(0),
        }
    }
}
