//! Feature vector - the numeric view of one traffic event.

use serde::{Deserialize, Serialize};

use super::layout::{feature_index, layout_hash, FEATURE_COUNT, FEATURE_VERSION};

// ============================================================================
// FEATURE VECTOR
// ============================================================================

/// Fixed-width feature vector carrying its layout identity.
///
/// All model input goes through this type; never a raw `Vec<f32>`, so a
/// vector persisted or buffered under an older layout is detectable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureVector {
    pub version: u8,
    pub layout_hash: u32,
    pub values: [f32; FEATURE_COUNT],
}

impl FeatureVector {
    pub fn from_values(values: [f32; FEATURE_COUNT]) -> Self {
        Self {
            version: FEATURE_VERSION,
            layout_hash: layout_hash(),
            values,
        }
    }

    pub fn as_slice(&self) -> &[f32] {
        &self.values
    }

    pub fn get_by_name(&self, name: &str) -> Option<f32> {
        feature_index(name).and_then(|i| self.values.get(i).copied())
    }

    /// True when this vector was produced under the current layout.
    pub fn is_compatible(&self) -> bool {
        self.version == FEATURE_VERSION && self.layout_hash == layout_hash()
    }
}

impl Default for FeatureVector {
    fn default() -> Self {
        Self::from_values([0.0; FEATURE_COUNT])
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vector_carries_layout_identity() {
        let v = FeatureVector::from_values([1.0; FEATURE_COUNT]);
        assert_eq!(v.version, FEATURE_VERSION);
        assert_eq!(v.layout_hash, layout_hash());
        assert!(v.is_compatible());
    }

    #[test]
    fn test_get_by_name() {
        let mut values = [0.0; FEATURE_COUNT];
        values[0] = 1500.0;
        let v = FeatureVector::from_values(values);
        assert_eq!(v.get_by_name("length"), Some(1500.0));
        assert_eq!(v.get_by_name("unknown"), None);
    }
}
