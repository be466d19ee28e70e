use hostgate_nlp::interpretation::SafetyLevel;

use crate::actions::{ActionKind, ValidatedAction};

/// Tier assigned by the baseline rules.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TierDecision {
    /// Strictest tier among matching rules.
    pub tier: SafetyLevel,
    /// Rules that fired.
    pub notes: Vec<String>,
}

#[derive(Debug, Clone)]
struct TierRule {
    id: &'static str,
    description: &'static str,
    kinds: &'static [ActionKind],
    mutating_only: bool,
    tier: SafetyLevel,
}

impl TierRule {
    fn matches(&self, action: &ValidatedAction) -> bool {
        if !self.kinds.contains(&action.kind()) {
            return false;
        }
        match action {
            ValidatedAction::ServiceAction { action, .. } if self.mutating_only => {
                action.is_mutating()
            }
            _ => true,
        }
    }
}

/// Baseline tiers per action kind, before script content is considered.
#[derive(Debug, Clone)]
pub struct TierPolicy {
    rules: Vec<TierRule>,
}

impl Default for TierPolicy {
    fn default() -> Self {
        Self {
            rules: vec![
                TierRule {
                    id: "package-change",
                    description: "installing or removing software modifies the host",
                    kinds: &[ActionKind::InstallPackage, ActionKind::UninstallPackage],
                    mutating_only: false,
                    tier: SafetyLevel::Caution,
                },
                TierRule {
                    id: "service-control",
                    description: "starting, stopping or restarting services changes host state",
                    kinds: &[ActionKind::ServiceAction],
                    mutating_only: true,
                    tier: SafetyLevel::Caution,
                },
                TierRule {
                    id: "read-only",
                    description: "queries do not modify the host",
                    kinds: &[
                        ActionKind::QueryInfo,
                        ActionKind::ListPackages,
                        ActionKind::ServiceAction,
                        ActionKind::RunScript,
                    ],
                    mutating_only: false,
                    tier: SafetyLevel::Safe,
                },
            ],
        }
    }
}

impl TierPolicy {
    /// Returns the strictest tier among matching rules.
    #[must_use]
    pub fn evaluate(&self, action: &ValidatedAction) -> TierDecision {
        self.rules
            .iter()
            .filter(|rule| rule.matches(action))
            .fold(
                TierDecision {
                    tier: SafetyLevel::Safe,
                    notes: Vec::new(),
                },
                |mut decision, rule| {
                    decision.tier = decision.tier.escalate(rule.tier);
                    decision
                        .notes
                        .push(format!("{} ({}): {}", rule.id, rule.tier, rule.description));
                    decision
                },
            )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actions::{PackageManager, ServiceVerb};

    fn service(action: ServiceVerb) -> ValidatedAction {
        ValidatedAction::ServiceAction {
            service: "Spooler".into(),
            action,
        }
    }

    #[test]
    fn status_is_safe_and_restart_is_caution() {
        let policy = TierPolicy::default();
        assert_eq!(policy.evaluate(&service(ServiceVerb::Status)).tier, SafetyLevel::Safe);
        let restart = policy.evaluate(&service(ServiceVerb::Restart));
        assert_eq!(restart.tier, SafetyLevel::Caution);
        assert!(restart.notes.iter().any(|note| note.starts_with("service-control")));
    }

    #[test]
    fn package_changes_are_caution() {
        let action = ValidatedAction::UninstallPackage {
            package: "git".into(),
            manager: PackageManager::Winget,
        };
        assert_eq!(TierPolicy::default().evaluate(&action).tier, SafetyLevel::Caution);
    }

    #[test]
    fn queries_are_safe() {
        let policy = TierPolicy::default();
        assert_eq!(policy.evaluate(&ValidatedAction::QueryInfo).tier, SafetyLevel::Safe);
        let list = ValidatedAction::ListPackages {
            manager: PackageManager::Chocolatey,
        };
        assert_eq!(policy.evaluate(&list).tier, SafetyLevel::Safe);
    }
}
