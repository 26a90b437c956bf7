//! Traffic event types.
//!
//! `TrafficEvent` is the immutable input record handed to the engine by the
//! capture layer, one per observed packet or flow summary.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ============================================================================
// PROTOCOL
// ============================================================================

/// Transport protocol of an observed event.
///
/// Anything the capture layer cannot name maps to `Other`; parsing a label
/// never fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Protocol {
    Tcp,
    Udp,
    Ip,
    Other,
}

impl Protocol {
    /// Numeric feature code. The mapping is part of the feature layout and
    /// must not be reordered.
    pub fn code(&self) -> f32 {
        match self {
            Protocol::Tcp => 1.0,
            Protocol::Udp => 2.0,
            Protocol::Ip => 3.0,
            Protocol::Other => 0.0,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Protocol::Tcp => "TCP",
            Protocol::Udp => "UDP",
            Protocol::Ip => "IP",
            Protocol::Other => "OTHER",
        }
    }

    /// Parse a capture-layer label. Unknown labels are the `Other` sentinel.
    pub fn from_label(label: &str) -> Self {
        match label.to_ascii_uppercase().as_str() {
            "TCP" => Protocol::Tcp,
            "UDP" => Protocol::Udp,
            "IP" => Protocol::Ip,
            _ => Protocol::Other,
        }
    }
}

// ============================================================================
// TRAFFIC EVENT
// ============================================================================

/// One observed network packet / flow summary.
///
/// Owned by the caller; the engine only borrows it for the duration of the
/// analysis call and copies the identifying fields into the Decision.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrafficEvent {
    /// Capture timestamp. Decisions echo this value, so replaying a fixed
    /// event sequence reproduces identical output.
    pub timestamp: DateTime<Utc>,
    pub src_ip: String,
    pub dst_ip: String,
    /// None for protocols without ports.
    pub src_port: Option<u16>,
    pub dst_port: Option<u16>,
    pub protocol: Protocol,
    /// Total length in bytes.
    pub length: u32,
    /// Optional raw payload excerpt (already truncated by the capture layer).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payload: Option<Vec<u8>>,
}

impl TrafficEvent {
    pub fn new(
        timestamp: DateTime<Utc>,
        src_ip: impl Into<String>,
        dst_ip: impl Into<String>,
        protocol: Protocol,
        length: u32,
    ) -> Self {
        Self {
            timestamp,
            src_ip: src_ip.into(),
            dst_ip: dst_ip.into(),
            src_port: None,
            dst_port: None,
            protocol,
            length,
            payload: None,
        }
    }

    pub fn with_ports(mut self, src_port: u16, dst_port: u16) -> Self {
        self.src_port = Some(src_port);
        self.dst_port = Some(dst_port);
        self
    }

    pub fn with_payload(mut self, payload: Vec<u8>) -> Self {
        self.payload = Some(payload);
        self
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_protocol_codes() {
        assert_eq!(Protocol::Tcp.code(), 1.0);
        assert_eq!(Protocol::Udp.code(), 2.0);
        assert_eq!(Protocol::Ip.code(), 3.0);
        assert_eq!(Protocol::Other.code(), 0.0);
    }

    #[test]
    fn test_unknown_label_is_sentinel() {
        assert_eq!(Protocol::from_label("tcp"), Protocol::Tcp);
        assert_eq!(Protocol::from_label("ICMP"), Protocol::Other);
        assert_eq!(Protocol::from_label(""), Protocol::Other);
    }
}
