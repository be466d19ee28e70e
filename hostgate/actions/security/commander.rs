use std::sync::Arc;

use hostgate_nlp::interpretation::{Interpretation, SafetyLevel};
use serde::{Deserialize, Serialize};

use crate::{actions::ValidatedAction, config::SafetyPolicy};

use super::{denylist::DenylistAnalyzer, tiers::TierPolicy};

/// What the gate does with a request.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Disposition {
    /// Proceed to the router.
    Allow,
    /// Wait for caller confirmation.
    Hold,
    /// Refuse: denylisted script without confirmation.
    Block,
}

/// Verdict emitted for an interpretation or a request.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SafetyVerdict {
    /// Final tier.
    pub tier: SafetyLevel,
    /// Whether confirmation is required before execution.
    pub requires_confirmation: bool,
    /// Gate decision for the current confirmation state.
    pub disposition: Disposition,
    /// Denylist entries that matched.
    pub matched_patterns: Vec<String>,
    /// Justification.
    pub notes: Vec<String>,
}

impl SafetyVerdict {
    /// Whether the request is refused outright.
    #[must_use]
    pub fn is_blocked(&self) -> bool {
        self.disposition == Disposition::Block
    }
}

/// Aggregates tier rules and denylist hits under the policy.
#[derive(Debug, Clone)]
pub struct SafetyCommander {
    policy: Arc<SafetyPolicy>,
    tiers: TierPolicy,
    denylist: DenylistAnalyzer,
}

impl SafetyCommander {
    /// Creates a commander with the provided components.
    #[must_use]
    pub fn new(policy: Arc<SafetyPolicy>, tiers: TierPolicy, denylist: DenylistAnalyzer) -> Self {
        Self {
            policy,
            tiers,
            denylist,
        }
    }

    /// Shared policy.
    #[must_use]
    pub fn policy(&self) -> &SafetyPolicy {
        &self.policy
    }

    /// Interpretation surface: the claimed tier is kept, escalated when the
    /// suggested command is denylisted, and never blocks.
    #[must_use]
    pub fn evaluate_interpretation(&self, interpretation: &Interpretation) -> SafetyVerdict {
        let mut notes = Vec::new();
        let matched_patterns = self.denylist.scan(&interpretation.suggested_command);
        let mut tier = interpretation.safety_level;
        if !matched_patterns.is_empty() && tier != SafetyLevel::Dangerous {
            notes.push(format!(
                "suggested command matches denylist ({}); escalated from {tier}",
                matched_patterns.join(", ")
            ));
            tier = SafetyLevel::Dangerous;
        }

        let forced = self.policy.confirmation_required(tier);
        if forced && !interpretation.requires_confirmation {
            notes.push(format!("confirmation forced for {tier} tier"));
        }
        SafetyVerdict {
            tier,
            requires_confirmation: forced || interpretation.requires_confirmation,
            disposition: Disposition::Allow,
            matched_patterns,
            notes,
        }
    }

    /// Request surface: scripts are scanned, other kinds follow the tier rules.
    #[must_use]
    pub fn evaluate_request(&self, action: &ValidatedAction, confirmed: bool) -> SafetyVerdict {
        let decision = self.tiers.evaluate(action);
        let mut notes = decision.notes;

        if let ValidatedAction::RunScript {
            script,
            require_confirmation,
        } = action
        {
            let matched_patterns = self.denylist.scan(script);
            if matched_patterns.is_empty() {
                return SafetyVerdict {
                    tier: decision.tier,
                    requires_confirmation: false,
                    disposition: Disposition::Allow,
                    matched_patterns,
                    notes,
                };
            }
            notes.push(format!("denylist hit: {}", matched_patterns.join(", ")));
            let requires_confirmation =
                *require_confirmation && self.policy.require_confirmation_for_privileged;
            return SafetyVerdict {
                tier: SafetyLevel::Dangerous,
                requires_confirmation,
                disposition: if requires_confirmation && !confirmed {
                    Disposition::Block
                } else {
                    Disposition::Allow
                },
                matched_patterns,
                notes,
            };
        }

        let requires_confirmation = self.policy.gates(decision.tier);
        SafetyVerdict {
            tier: decision.tier,
            requires_confirmation,
            disposition: if requires_confirmation && !confirmed {
                Disposition::Hold
            } else {
                Disposition::Allow
            },
            matched_patterns: Vec::new(),
            notes,
        }
    }

    /// Tier of a free-form command string.
    #[must_use]
    pub fn classify_command(&self, text: &str) -> SafetyLevel {
        if self.denylist.scan(text).is_empty() {
            SafetyLevel::Safe
        } else {
            SafetyLevel::Dangerous
        }
    }
}
