//! Heuristics module - stateless rule evaluation.
//!
//! Produces a boolean flag plus human-readable reasons. Every rule runs on
//! every event; one triggered rule never suppresses another, so the reason
//! list is always complete.

pub mod rules;

use serde::{Deserialize, Serialize};

use crate::config::RuleConfig;
use crate::event::TrafficEvent;

use rules::{build_rules, Rule};

// ============================================================================
// OUTCOME
// ============================================================================

/// Result of evaluating all rules against one event.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RuleOutcome {
    pub flagged: bool,
    /// Reasons in rule evaluation order.
    pub reasons: Vec<String>,
}

// ============================================================================
// RULE SET
// ============================================================================

/// The configured rule set. Stateless between events.
pub struct HeuristicRuleSet {
    rules: Vec<Box<dyn Rule>>,
}

impl HeuristicRuleSet {
    pub fn new(config: &RuleConfig) -> Self {
        Self {
            rules: build_rules(config),
        }
    }

    /// Evaluate every rule; total over the event domain.
    pub fn evaluate(&self, event: &TrafficEvent) -> RuleOutcome {
        let reasons: Vec<String> = self
            .rules
            .iter()
            .filter_map(|rule| rule.check(event))
            .collect();
        RuleOutcome {
            flagged: !reasons.is_empty(),
            reasons,
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================
