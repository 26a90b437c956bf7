//! Feature extraction - traffic event to feature vector.
//!
//! Extraction is a total function: unknown protocols, absent ports, and
//! absent payloads all encode as defined sentinel values, never as errors.

use std::collections::HashSet;

use crate::config::RuleConfig;
use crate::event::TrafficEvent;

use super::layout::FEATURE_COUNT;
use super::vector::FeatureVector;

// ============================================================================
// EXTRACTOR
// ============================================================================

/// Deterministic event-to-vector converter.
///
/// Holds the risk-port table injected from configuration; everything else
/// is derived from the event alone.
#[derive(Debug, Clone)]
pub struct FeatureExtractor {
    risk_ports: HashSet<u16>,
}

impl FeatureExtractor {
    pub fn new(rules: &RuleConfig) -> Self {
        Self {
            risk_ports: rules.suspicious_ports.clone(),
        }
    }

    /// Convert one event. Pure; never fails.
    pub fn extract(&self, event: &TrafficEvent) -> FeatureVector {
        let mut values = [0.0f32; FEATURE_COUNT];
        values[0] = event.length as f32;
        values[1] = event.protocol.code();
        values[2] = event.src_port.map(f32::from).unwrap_or(0.0);
        values[3] = event.dst_port.map(f32::from).unwrap_or(0.0);
        values[4] = match event.dst_port {
            Some(port) if self.risk_ports.contains(&port) => 1.0,
            _ => 0.0,
        };
        values[5] = event
            .payload
            .as_deref()
            .map(shannon_entropy)
            .unwrap_or(0.0);
        FeatureVector::from_values(values)
    }
}

/// Shannon entropy of a byte slice, in bits per byte (0.0 - 8.0).
/// Empty input scores 0.0.
fn shannon_entropy(data: &[u8]) -> f32 {
    if data.is_empty() {
        return 0.0;
    }
    let mut counts = [0u32; 256];
    for &b in data {
        counts[b as usize] += 1;
    }
    let len = data.len() as f32;
    let mut entropy = 0.0f32;
    for &count in counts.iter() {
        if count > 0 {
            let p = count as f32 / len;
            entropy -= p * p.log2();
        }
    }
    entropy
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::*;
    use crate::event::Protocol;

    fn extractor() -> FeatureExtractor {
        FeatureExtractor::new(&RuleConfig::default())
    }

    fn event(length: u32, protocol: Protocol) -> TrafficEvent {
        TrafficEvent::new(Utc::now(), "10.0.0.1", "10.0.0.2", protocol, length)
    }

    #[test]
    fn test_extraction_is_deterministic() {
        let e = event(1200, Protocol::Tcp).with_ports(4444, 80);
        let x = extractor();
        assert_eq!(x.extract(&e), x.extract(&e));
    }

    #[test]
    fn test_sentinels_for_missing_fields() {
        let e = event(60, Protocol::Other);
        let v = extractor().extract(&e);
        assert_eq!(v.get_by_name("protocol_code"), Some(0.0));
        assert_eq!(v.get_by_name("src_port"), Some(0.0));
        assert_eq!(v.get_by_name("dst_port"), Some(0.0));
        assert_eq!(v.get_by_name("payload_entropy"), Some(0.0));
    }

    #[test]
    fn test_risk_port_indicator() {
        let x = extractor();
        let risky = x.extract(&event(60, Protocol::Tcp).with_ports(1024, 23));
        let plain = x.extract(&event(60, Protocol::Tcp).with_ports(1024, 80));
        assert_eq!(risky.get_by_name("dst_port_risk"), Some(1.0));
        assert_eq!(plain.get_by_name("dst_port_risk"), Some(0.0));
    }

    #[test]
    fn test_entropy_bounds() {
        assert_eq!(shannon_entropy(&[]), 0.0);
        assert_eq!(shannon_entropy(&[0x41; 64]), 0.0);
        let all_bytes: Vec<u8> = (0..=255).collect();
        let e = shannon_entropy(&all_bytes);
        assert!((e - 8.0).abs() < 1e-4);
    }
}
