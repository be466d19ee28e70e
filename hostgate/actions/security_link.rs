use std::sync::Arc;

use anyhow::{Context, Result};
use hostgate_nlp::interpretation::{Interpretation, SafetyLevel};

use crate::{
    actions::ValidatedAction,
    config::SafetyPolicy,
    security::{DenylistAnalyzer, SafetyCommander, SafetyVerdict, TierPolicy},
};

/// Config builder for [`SafetyClassifier`].
#[derive(Debug, Default)]
pub struct SafetyClassifierBuilder {
    policy: Option<Arc<SafetyPolicy>>,
    tiers: Option<TierPolicy>,
}

impl SafetyClassifierBuilder {
    /// Overrides the policy.
    #[must_use]
    pub fn policy(mut self, policy: Arc<SafetyPolicy>) -> Self {
        self.policy = Some(policy);
        self
    }

    /// Overrides the tier rules.
    #[must_use]
    pub fn tiers(mut self, tiers: TierPolicy) -> Self {
        self.tiers = Some(tiers);
        self
    }

    /// Compiles the denylist and builds the classifier.
    pub fn build(self) -> Result<SafetyClassifier> {
        let policy = self.policy.unwrap_or_default();
        let denylist = DenylistAnalyzer::new(&policy.denylist).context("compiling denylist")?;
        let commander = SafetyCommander::new(policy, self.tiers.unwrap_or_default(), denylist);
        Ok(SafetyClassifier {
            commander: Arc::new(commander),
        })
    }
}

/// Interpretation with its verdict; the confirmation flag is already enforced.
#[derive(Debug, Clone)]
pub struct ClassifiedInterpretation {
    /// Interpretation after classification.
    pub interpretation: Interpretation,
    /// Verdict on the interpretation surface.
    pub verdict: SafetyVerdict,
}

/// Facade that exposes safety classification to the rest of the crate.
#[derive(Debug, Clone)]
pub struct SafetyClassifier {
    commander: Arc<SafetyCommander>,
}

impl SafetyClassifier {
    /// Creates a builder.
    #[must_use]
    pub fn builder() -> SafetyClassifierBuilder {
        SafetyClassifierBuilder::default()
    }

    /// Shared policy.
    #[must_use]
    pub fn policy(&self) -> &SafetyPolicy {
        self.commander.policy()
    }

    /// Classifies an interpretation, forcing `requires_confirmation` for
    /// every tier the policy does not consider safe.
    #[must_use]
    pub fn classify_interpretation(&self, interpretation: Interpretation) -> ClassifiedInterpretation {
        let verdict = self.commander.evaluate_interpretation(&interpretation);
        let interpretation = Interpretation {
            safety_level: verdict.tier,
            requires_confirmation: verdict.requires_confirmation,
            ..interpretation
        };
        ClassifiedInterpretation {
            interpretation,
            verdict,
        }
    }

    /// Classifies a validated request for direct execution.
    #[must_use]
    pub fn classify_request(&self, action: &ValidatedAction, confirmed: bool) -> SafetyVerdict {
        self.commander.evaluate_request(action, confirmed)
    }

    /// Tier of a free-form command string.
    #[must_use]
    pub fn classify_command(&self, text: &str) -> SafetyLevel {
        self.commander.classify_command(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        actions::{PackageManager, ServiceVerb},
        config::GateConfig,
        security::Disposition,
    };
    use hostgate_nlp::interpretation::Intent;

    fn classifier() -> SafetyClassifier {
        SafetyClassifier::builder().build().unwrap()
    }

    fn script(text: &str, require_confirmation: bool) -> ValidatedAction {
        ValidatedAction::RunScript {
            script: text.into(),
            require_confirmation,
        }
    }

    #[test]
    fn non_safe_interpretations_always_require_confirmation() {
        for tier in [SafetyLevel::Caution, SafetyLevel::Dangerous] {
            let claimed = Interpretation::new(Intent::RunPentest, tier).with_requires_confirmation(false);
            let classified = classifier().classify_interpretation(claimed);
            assert!(classified.interpretation.requires_confirmation);
            assert_eq!(classified.verdict.disposition, Disposition::Allow);
        }
        let safe = Interpretation::new(Intent::SystemInfo, SafetyLevel::Safe);
        assert!(!classifier().classify_interpretation(safe).interpretation.requires_confirmation);
    }

    #[test]
    fn denylisted_suggestion_escalates_interpretation() {
        let interp = Interpretation::new(Intent::RunScript, SafetyLevel::Safe)
            .with_suggested_command("Remove-Item C:\\logs -Recurse");
        let classified = classifier().classify_interpretation(interp);
        assert_eq!(classified.interpretation.safety_level, SafetyLevel::Dangerous);
        assert!(classified.interpretation.requires_confirmation);
        assert_eq!(classified.verdict.matched_patterns, vec!["Remove-Item"]);
    }

    #[test]
    fn denylisted_script_is_blocked_until_confirmed() {
        let action = script("Remove-Item C:\\temp", true);
        let verdict = classifier().classify_request(&action, false);
        assert!(verdict.is_blocked());
        assert_eq!(verdict.tier, SafetyLevel::Dangerous);
        assert!(verdict.requires_confirmation);
        assert_eq!(
            classifier().classify_request(&action, true).disposition,
            Disposition::Allow
        );
    }

    #[test]
    fn denylisted_script_without_confirmation_request_runs() {
        let verdict = classifier().classify_request(&script("Remove-Item C:\\temp", false), false);
        assert_eq!(verdict.disposition, Disposition::Allow);
        assert_eq!(verdict.tier, SafetyLevel::Dangerous);
    }

    #[test]
    fn master_switch_disables_blocking() {
        let config =
            GateConfig::from_toml("[policy]\nrequire_confirmation_for_privileged = false").unwrap();
        let classifier = SafetyClassifier::builder()
            .policy(Arc::new(config.safety_policy()))
            .build()
            .unwrap();
        let verdict = classifier.classify_request(&script("Remove-Item C:\\temp", true), false);
        assert_eq!(verdict.disposition, Disposition::Allow);
    }

    #[test]
    fn service_status_never_gated_restart_always() {
        let status = ValidatedAction::ServiceAction {
            service: "Spooler".into(),
            action: ServiceVerb::Status,
        };
        let restart = ValidatedAction::ServiceAction {
            service: "Spooler".into(),
            action: ServiceVerb::Restart,
        };
        let verdict = classifier().classify_request(&status, false);
        assert!(!verdict.requires_confirmation);
        assert_eq!(verdict.disposition, Disposition::Allow);
        let verdict = classifier().classify_request(&restart, false);
        assert!(verdict.requires_confirmation);
        assert_eq!(verdict.disposition, Disposition::Hold);
    }

    #[test]
    fn package_install_is_held() {
        let action = ValidatedAction::InstallPackage {
            package: "git".into(),
            manager: PackageManager::Chocolatey,
        };
        assert_eq!(
            classifier().classify_request(&action, false).disposition,
            Disposition::Hold
        );
        assert_eq!(
            classifier().classify_request(&action, true).disposition,
            Disposition::Allow
        );
    }

    #[test]
    fn classify_command_flags_denylist() {
        assert_eq!(classifier().classify_command("Get-Date"), SafetyLevel::Safe);
        assert_eq!(
            classifier().classify_command("invoke-expression $x"),
            SafetyLevel::Dangerous
        );
    }
}
