//! Feature Schema - Centralized feature layout definition
//!
//! **CRITICAL: this file controls the feature schema the classifier was
//! trained on.**
//!
//! Rules:
//! 1. Add feature → increment SCHEMA_VERSION
//! 2. Change order → increment SCHEMA_VERSION
//! 3. Remove feature → increment SCHEMA_VERSION
//!
//! The column order below must stay byte-for-byte identical to the training
//! pipeline, otherwise every prediction is garbage.

use crc32fast::Hasher;
use serde::{Deserialize, Serialize};

// ============================================================================
// SCHEMA VERSION
// ============================================================================

/// Current feature layout version
pub const SCHEMA_VERSION: u8 = 1;

// ============================================================================
// FEATURE LAYOUT (Authoritative source)
// ============================================================================

/// Feature names in the exact order the classifier expects them.
/// SINGLE SOURCE OF TRUTH for the feature layout.
pub const FEATURE_LAYOUT: &[&str] = &[
    "Bwd Pkt Len Min",
    "Subflow Fwd Byts",
    "TotLen Fwd Pkts",
    "Fwd Pkt Len Mean",
    "Bwd Pkt Len Std",
    "Flow IAT Mean",
    "Fwd IAT Min",
    "Flow Duration",
    "Flow IAT Std",
    "Active Min",
    "Active Mean",
    "Bwd IAT Mean",
    "Fwd IAT Mean",
    "Init Fwd Win Byts",
    "Fwd PSH Flags",
    "SYN Flag Cnt",
    "Fwd Pkts/s",
    "Init Bwd Win Byts",
    "Bwd Pkts/s",
    "PSH Flag Cnt",
    "Pkt Size Avg",
];

/// Total number of model features.
/// IMPORTANT: must match FEATURE_LAYOUT.len()
pub const FEATURE_COUNT: usize = 21;

/// Non-feature fields every flow record must also carry.
pub const META_FIELDS: &[&str] = &["Timestamp", "Label", "Source", "Destination"];

// ============================================================================
// CLASS TABLE
// ============================================================================

/// Class id assigned to benign traffic. Any other class is an attack.
pub const BENIGN_CLASS: i64 = 0;

/// Fixed class-id → class-name table the classifier was trained with.
pub const CLASS_TABLE: &[&str] = &[
    "Benign",
    "DDOS attack-HOIC",
    "DDoS attacks-LOIC-HTTP",
    "DoS attacks-Hulk",
    "Bot",
    "FTP-BruteForce",
    "SSH-Bruteforce",
    "Infilteration",
    "DoS attacks-SlowHTTPTest",
    "DoS attacks-GoldenEye",
    "DoS attacks-Slowloris",
    "Brute Force -Web",
    "DDOS attack-LOIC-UDP",
];

/// Map a predicted class id to its name. Unknown ids map to None so a
/// model/table drift is visible instead of mislabelled.
pub fn class_name(class_id: i64) -> Option<&'static str> {
    usize::try_from(class_id).ok().and_then(|i| CLASS_TABLE.get(i).copied())
}

// ============================================================================
// LAYOUT HASH
// ============================================================================

/// CRC32 hash over version + ordered feature names. Used to detect layout
/// mismatches between producer, model, and this process at runtime.
pub fn layout_hash() -> u32 {
    let mut hasher = Hasher::new();
    hasher.update(&[SCHEMA_VERSION]);
    for name in FEATURE_LAYOUT {
        hasher.update(name.as_bytes());
        hasher.update(&[0]);
    }
    hasher.finalize()
}

// ============================================================================
// LAYOUT INFO
// ============================================================================

/// Complete layout information for logging/diagnostics.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchemaInfo {
    pub version: u8,
    pub hash: u32,
    pub feature_count: usize,
    pub feature_names: Vec<String>,
}

impl SchemaInfo {
    pub fn current() -> Self {
        Self {
            version: SCHEMA_VERSION,
            hash: layout_hash(),
            feature_count: FEATURE_COUNT,
            feature_names: FEATURE_LAYOUT.iter().map(|s| s.to_string()).collect(),
        }
    }
}

// ============================================================================
// FEATURE INDEX LOOKUP
// ============================================================================

/// Get feature index by name (O(n) but the layout is small)
pub fn feature_index(name: &str) -> Option<usize> {
    FEATURE_LAYOUT.iter().position(|&n| n == name)
}

/// Get feature name by index
pub fn feature_name(index: usize) -> Option<&'static str> {
    FEATURE_LAYOUT.get(index).copied()
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_feature_count() {
        assert_eq!(FEATURE_COUNT, 21);
        assert_eq!(FEATURE_LAYOUT.len(), FEATURE_COUNT);
    }

    #[test]
    fn test_layout_hash_consistency() {
        assert_eq!(layout_hash(), layout_hash());
        assert_ne!(layout_hash(), 0);
    }

    #[test]
    fn test_class_table() {
        assert_eq!(CLASS_TABLE.len(), 13);
        assert_eq!(class_name(BENIGN_CLASS), Some("Benign"));
        assert_eq!(class_name(12), Some("DDOS attack-LOIC-UDP"));
        assert_eq!(class_name(13), None);
        assert_eq!(class_name(-1), None);
    }

    #[test]
    fn test_feature_index() {
        assert_eq!(feature_index("Bwd Pkt Len Min"), Some(0));
        assert_eq!(feature_index("Flow Duration"), Some(7));
        assert_eq!(feature_index("Pkt Size Avg"), Some(20));
        assert_eq!(feature_index("nonexistent"), None);
    }

    #[test]
    fn test_feature_name() {
        assert_eq!(feature_name(0), Some("Bwd Pkt Len Min"));
        assert_eq!(feature_name(20), Some("Pkt Size Avg"));
        assert_eq!(feature_name(100), None);
    }

    #[test]
    fn test_schema_info() {
        let info = SchemaInfo::current();
        assert_eq!(info.version, SCHEMA_VERSION);
        assert_eq!(info.feature_count, FEATURE_COUNT);
        assert_eq!(info.feature_names.len(), FEATURE_COUNT);
    }
}
