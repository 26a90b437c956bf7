//! Built-in heuristic rules.
//!
//! Each rule is an independent check over one event, returning a reason
//! string when it fires. Rules never abort evaluation of the others.

use once_cell::sync::Lazy;
use regex::bytes::Regex;

use crate::config::RuleConfig;
use crate::event::TrafficEvent;

// ============================================================================
// RULE
// ============================================================================

/// One independently evaluable check.
pub trait Rule: Send + Sync {
    /// Reason string when the rule fires, None otherwise.
    fn check(&self, event: &TrafficEvent) -> Option<String>;
}

// ============================================================================
// BUILT-IN RULES
// ============================================================================

/// Fires on `length >= threshold`.
pub struct LargeLengthRule {
    threshold: u32,
    reason: String,
}

impl LargeLengthRule {
    pub fn new(threshold: u32) -> Self {
        Self {
            threshold,
            reason: format!("large_length>={threshold}"),
        }
    }
}

impl Rule for LargeLengthRule {
    fn check(&self, event: &TrafficEvent) -> Option<String> {
        (event.length >= self.threshold).then(|| self.reason.clone())
    }
}

/// Fires when the destination port is in the configured set.
pub struct SuspiciousPortRule {
    ports: std::collections::HashSet<u16>,
}

impl SuspiciousPortRule {
    pub fn new(ports: std::collections::HashSet<u16>) -> Self {
        Self { ports }
    }
}

impl Rule for SuspiciousPortRule {
    fn check(&self, event: &TrafficEvent) -> Option<String> {
        match event.dst_port {
            Some(port) if self.ports.contains(&port) => Some("suspicious_port".to_string()),
            _ => None,
        }
    }
}

/// Fires when any configured pattern matches the payload excerpt.
///
/// Patterns are validated by `EngineConfig::validate`; a pattern that
/// still fails to compile here is skipped rather than tearing the rule
/// set down.
pub struct PayloadSignatureRule {
    patterns: Vec<Regex>,
}

impl PayloadSignatureRule {
    pub fn new(patterns: &[String]) -> Self {
        Self {
            patterns: patterns
                .iter()
                .filter_map(|p| Regex::new(p).ok())
                .collect(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }
}

impl Rule for PayloadSignatureRule {
    fn check(&self, event: &TrafficEvent) -> Option<String> {
        let payload = event.payload.as_deref()?;
        self.patterns
            .iter()
            .any(|re| re.is_match(payload))
            .then(|| "suspicious_payload".to_string())
    }
}

// ============================================================================
// CONSTRUCTION
// ============================================================================

/// Build the rule list from configuration, in evaluation order.
pub fn build_rules(config: &RuleConfig) -> Vec<Box<dyn Rule>> {
    let mut rules: Vec<Box<dyn Rule>> = vec![
        Box::new(LargeLengthRule::new(config.large_length_threshold)),
        Box::new(SuspiciousPortRule::new(config.suspicious_ports.clone())),
    ];
    let payload = PayloadSignatureRule::new(&config.payload_patterns);
    if !payload.is_empty() {
        rules.push(Box::new(payload));
    }
    rules
}

/// Patterns useful as a starting point for `RuleConfig::payload_patterns`.
pub static SAMPLE_PAYLOAD_PATTERNS: Lazy<Vec<&'static str>> = Lazy::new(|| {
    vec![
        r"(?i)/etc/passwd",
        r"(?i)cmd\.exe",
        r"(?-u)\x90{8,}", // NOP sled, raw bytes
    ]
});

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::*;
    use crate::event::Protocol;

    fn event(length: u32) -> TrafficEvent {
        TrafficEvent::new(Utc::now(), "1.1.1.1", "2.2.2.2", Protocol::Tcp, length)
    }

    #[test]
    fn test_large_length_reason_interpolates_threshold() {
        let rule = LargeLengthRule::new(1000);
        assert_eq!(rule.check(&event(1000)), Some("large_length>=1000".into()));
        assert_eq!(rule.check(&event(999)), None);
    }

    #[test]
    fn test_suspicious_port() {
        let rule = SuspiciousPortRule::new([31337].into_iter().collect());
        let hit = event(60).with_ports(1024, 31337);
        let miss = event(60).with_ports(1024, 443);
        assert_eq!(rule.check(&hit), Some("suspicious_port".into()));
        assert_eq!(rule.check(&miss), None);
        assert_eq!(rule.check(&event(60)), None);
    }

    #[test]
    fn test_sample_patterns_compile_and_match() {
        let patterns: Vec<String> =
            SAMPLE_PAYLOAD_PATTERNS.iter().map(|p| p.to_string()).collect();
        let rule = PayloadSignatureRule::new(&patterns);
        assert!(!rule.is_empty());
        let sled = event(60).with_payload(vec![0x90; 16]);
        assert_eq!(rule.check(&sled), Some("suspicious_payload".into()));
    }

    #[test]
    fn test_payload_signature() {
        let rule = PayloadSignatureRule::new(&[r"(?i)cmd\.exe".to_string()]);
        let hit = event(60).with_payload(b"GET /CMD.EXE HTTP/1.0".to_vec());
        let miss = event(60).with_payload(b"GET / HTTP/1.0".to_vec());
        assert_eq!(rule.check(&hit), Some("suspicious_payload".into()));
        assert_eq!(rule.check(&miss), None);
        assert_eq!(rule.check(&event(60)), None);
    }
}
