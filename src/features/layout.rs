//! Feature layout - centralized feature definition.
//!
//! This file controls the feature schema. Add, remove, or reorder a
//! feature and `FEATURE_VERSION` must be incremented, or persisted
//! decision history and any exported training data become unreadable
//! against the wrong schema.

use crc32fast::Hasher;
use serde::{Deserialize, Serialize};

// ============================================================================
// FEATURE VERSION
// ============================================================================

/// Current feature layout version.
pub const FEATURE_VERSION: u8 = 1;

// ============================================================================
// FEATURE LAYOUT (authoritative source)
// ============================================================================

/// Feature names in the exact order they appear in the vector.
pub const FEATURE_LAYOUT: &[&str] = &[
    "length",          // 0: packet length in bytes
    "protocol_code",   // 1: 1=TCP 2=UDP 3=IP 0=other
    "src_port",        // 2: source port, 0 when absent
    "dst_port",        // 3: destination port, 0 when absent
    "dst_port_risk",   // 4: 1 when dst port is in the suspicious set
    "payload_entropy", // 5: Shannon entropy of the excerpt, bits, 0 when absent
];

/// Total number of features. Must match `FEATURE_LAYOUT.len()`.
pub const FEATURE_COUNT: usize = 6;

// ============================================================================
// LAYOUT HASH
// ============================================================================

/// CRC32 over version + ordered feature names; detects layout mismatches
/// between a running engine and data persisted by another build.
pub fn layout_hash() -> u32 {
    let mut hasher = Hasher::new();
    hasher.update(&[FEATURE_VERSION]);
    for name in FEATURE_LAYOUT {
        hasher.update(name.as_bytes());
        hasher.update(&[0]);
    }
    hasher.finalize()
}

/// Index of a feature by name.
pub fn feature_index(name: &str) -> Option<usize> {
    FEATURE_LAYOUT.iter().position(|&n| n == name)
}

// ============================================================================
// LAYOUT INFO
// ============================================================================

/// Layout identity for status reporting and logs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LayoutInfo {
    pub version: u8,
    pub hash: u32,
    pub feature_count: usize,
}

impl LayoutInfo {
    pub fn current() -> Self {
        Self {
            version: FEATURE_VERSION,
            hash: layout_hash(),
            feature_count: FEATURE_COUNT,
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================
