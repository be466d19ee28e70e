use std::sync::Arc;

use anyhow::{Context, Result};
use hostgate_nlp::{
    answer::{ReportedOutcome, ResponseSynthesizer},
    interpretation::{Intent, Interpretation, InterpretationContext, SafetyLevel},
    interpreter::CommandInterpreter,
};
use serde::Serialize;
use serde_json::json;
use shared_event_bus::{EventPublisher, FileEventPublisher};
use tracing::{info, warn};

use crate::{
    actions::{ActionError, ActionTarget, ExecutionRequest, ExecutionResult},
    agents::{ExecutionContext, ExecutionRouter},
    config::{GateConfig, SafetyPolicy},
    identity::{CallerIdentity, Permission},
    launcher::{ProcessLauncher, TokioProcessLauncher},
    security::{Disposition, SafetyVerdict, TierPolicy},
    security_link::{ClassifiedInterpretation, SafetyClassifier},
    telemetry::AuditRecorder,
};

const DEFAULT_MANAGER: &str = "chocolatey";

/// Builder used to configure a [`GateCommander`].
#[derive(Default)]
pub struct GateCommanderBuilder {
    policy: Option<Arc<SafetyPolicy>>,
    tiers: Option<TierPolicy>,
    interpreter: Option<Arc<CommandInterpreter>>,
    launcher: Option<Arc<dyn ProcessLauncher>>,
    router: Option<ExecutionRouter>,
    audit: Option<AuditRecorder>,
}

impl GateCommanderBuilder {
    /// Overrides the safety policy.
    #[must_use]
    pub fn policy(mut self, policy: Arc<SafetyPolicy>) -> Self {
        self.policy = Some(policy);
        self
    }

    /// Overrides the baseline tier rules.
    #[must_use]
    pub fn tiers(mut self, tiers: TierPolicy) -> Self {
        self.tiers = Some(tiers);
        self
    }

    /// Overrides the interpreter.
    #[must_use]
    pub fn interpreter(mut self, interpreter: Arc<CommandInterpreter>) -> Self {
        self.interpreter = Some(interpreter);
        self
    }

    /// Overrides the process launcher used by the production router.
    #[must_use]
    pub fn launcher(mut self, launcher: Arc<dyn ProcessLauncher>) -> Self {
        self.launcher = Some(launcher);
        self
    }

    /// Replaces the production router entirely.
    #[must_use]
    pub fn router(mut self, router: ExecutionRouter) -> Self {
        self.router = Some(router);
        self
    }

    /// Attaches the audit recorder.
    #[must_use]
    pub fn audit(mut self, audit: AuditRecorder) -> Self {
        self.audit = Some(audit);
        self
    }

    /// Finalizes the builder.
    pub fn build(self) -> Result<GateCommander> {
        let policy = self.policy.unwrap_or_default();
        let mut classifier = SafetyClassifier::builder().policy(Arc::clone(&policy));
        if let Some(tiers) = self.tiers {
            classifier = classifier.tiers(tiers);
        }
        let classifier = classifier.build()?;
        let audit = self.audit.unwrap_or_else(AuditRecorder::in_memory);
        let interpreter = self
            .interpreter
            .unwrap_or_else(|| Arc::new(CommandInterpreter::offline()));
        let router = self.router.unwrap_or_else(|| {
            let launcher = self
                .launcher
                .unwrap_or_else(|| Arc::new(TokioProcessLauncher));
            ExecutionRouter::production(launcher, audit.clone())
        });

        Ok(GateCommander {
            policy,
            classifier,
            synthesizer: ResponseSynthesizer::new(Arc::clone(&interpreter)),
            interpreter,
            router,
            audit,
        })
    }
}

/// Reply to a natural-language command.
#[derive(Debug, Clone, Serialize)]
pub struct GateReply {
    /// Interpretation after classification.
    pub interpretation: Interpretation,
    /// Verdict on the interpretation.
    pub verdict: SafetyVerdict,
    /// Execution result, absent when nothing ran.
    pub result: Option<ExecutionResult>,
    /// Caller-facing message.
    pub message: String,
}

impl GateReply {
    /// Whether the reply is waiting for the caller to confirm.
    #[must_use]
    pub fn awaiting_confirmation(&self) -> bool {
        self.result
            .as_ref()
            .map_or(self.interpretation.requires_confirmation, |result| {
                result.requires_confirmation
            })
    }
}

/// Runs the pipeline: interpret, classify, gate, route, audit, synthesize.
///
/// Stages run strictly in sequence for one request. Nothing but the policy and
/// the audit streams is shared between requests.
pub struct GateCommander {
    policy: Arc<SafetyPolicy>,
    classifier: SafetyClassifier,
    interpreter: Arc<CommandInterpreter>,
    synthesizer: ResponseSynthesizer,
    router: ExecutionRouter,
    audit: AuditRecorder,
}

impl GateCommander {
    /// Creates a builder with offline defaults.
    #[must_use]
    pub fn builder() -> GateCommanderBuilder {
        GateCommanderBuilder::default()
    }

    /// Builder wired from configuration: provider, audit sinks and policy.
    pub fn from_config(config: &GateConfig) -> Result<GateCommanderBuilder> {
        let provider = config.provider.build_provider()?;
        let interpreter = CommandInterpreter::builder()
            .provider_opt(provider)
            .retry(config.provider.retry_policy())
            .build();

        let mut audit = AuditRecorder::builder("hostgate")
            .dir(config.audit_dir())
            .excerpt_chars(config.policy.audit_excerpt_chars);
        if let Some(path) = config.event_log() {
            let publisher: Arc<dyn EventPublisher> = Arc::new(
                FileEventPublisher::new(&path)
                    .with_context(|| format!("opening event log {}", path.display()))?,
            );
            audit = audit.event_publisher(publisher);
        }

        Ok(Self::builder()
            .policy(Arc::new(config.safety_policy()))
            .interpreter(Arc::new(interpreter))
            .audit(audit.build()?))
    }

    /// Shared policy.
    #[must_use]
    pub fn policy(&self) -> &SafetyPolicy {
        &self.policy
    }

    /// Audit recorder.
    #[must_use]
    pub const fn audit(&self) -> &AuditRecorder {
        &self.audit
    }

    /// Interprets and classifies `text`, auditing the decision.
    pub async fn interpret(&self, caller: &CallerIdentity, text: &str) -> ClassifiedInterpretation {
        let context = InterpretationContext::for_caller(&caller.id);
        let interpretation = self.interpreter.interpret(text, Some(&context)).await;
        let classified = self.classifier.classify_interpretation(interpretation);
        let interpretation = &classified.interpretation;

        let details = json!({
            "intent": interpretation.intent,
            "safety_level": interpretation.safety_level,
            "confidence": interpretation.confidence,
            "requires_confirmation": interpretation.requires_confirmation,
            "matched_patterns": classified.verdict.matched_patterns,
            "notes": classified.verdict.notes,
        });
        self.audit
            .activity(&caller.id, "INTERPRETATION_CLASSIFIED", text, details.clone())
            .await;
        if interpretation.safety_level == SafetyLevel::Dangerous {
            self.audit
                .security_event(&caller.id, "DANGEROUS_COMMAND_DETECTED", text, details)
                .await;
        }
        classified
    }

    /// Full pipeline for a natural-language command.
    ///
    /// Nothing executes while confirmation is required and not given, or when
    /// the interpretation maps to no executable action.
    pub async fn handle_text(&self, caller: &CallerIdentity, text: &str, confirmed: bool) -> GateReply {
        let ClassifiedInterpretation {
            interpretation,
            verdict,
        } = self.interpret(caller, text).await;

        let Some(target) = action_for(&interpretation) else {
            info!(intent = %interpretation.intent, "interpretation maps to no executable action");
            let message = self.synthesizer.generate_response(&interpretation, None).await;
            return GateReply {
                interpretation,
                verdict,
                result: None,
                message,
            };
        };

        if interpretation.requires_confirmation && !confirmed {
            info!(intent = %interpretation.intent, tier = %interpretation.safety_level, "awaiting confirmation");
            let message = self.synthesizer.generate_response(&interpretation, None).await;
            return GateReply {
                interpretation,
                verdict,
                result: None,
                message,
            };
        }

        let request = ExecutionRequest::builder(caller.clone(), target)
            .confirmed(confirmed)
            .build();
        let result = self.execute(request).await;
        let message = self
            .synthesizer
            .generate_response(&interpretation, Some(&result as &dyn ReportedOutcome))
            .await;
        GateReply {
            interpretation,
            verdict,
            result: Some(result),
            message,
        }
    }

    /// Direct path: permission check, validation, gate, route.
    pub async fn execute(&self, request: ExecutionRequest) -> ExecutionResult {
        let caller = &request.caller;
        let description = request.target.describe();

        if !caller.has(Permission::Execute) {
            let err = ActionError::PermissionDenied {
                caller: caller.id.clone(),
                permission: Permission::Execute.label().to_string(),
            };
            warn!(caller = %caller.id, action = %description, "permission denied");
            let result = ExecutionResult::rejected(request.id, &err);
            self.audit
                .refusal(&caller.id, "PERMISSION_DENIED", &description, &result)
                .await;
            return result;
        }

        let action = match request.target.validate() {
            Ok(action) => action,
            Err(err) => {
                warn!(caller = %caller.id, error = %err, "request rejected by validation");
                let result = ExecutionResult::rejected(request.id, &err);
                self.audit
                    .command_execution(&caller.id, &description, &result)
                    .await;
                return result;
            }
        };

        let verdict = self.classifier.classify_request(&action, request.confirmed);
        match verdict.disposition {
            Disposition::Block => {
                warn!(
                    caller = %caller.id,
                    patterns = ?verdict.matched_patterns,
                    "script blocked by denylist"
                );
                let result =
                    ExecutionResult::blocked(request.id, verdict.tier, verdict.matched_patterns);
                self.audit
                    .refusal(&caller.id, "SCRIPT_BLOCKED", &description, &result)
                    .await;
                return result;
            }
            Disposition::Hold => {
                let result =
                    ExecutionResult::needs_confirmation(request.id, verdict.tier, action.kind().label());
                self.audit
                    .refusal(&caller.id, "CONFIRMATION_REQUIRED", &description, &result)
                    .await;
                return result;
            }
            Disposition::Allow if !verdict.matched_patterns.is_empty() => {
                self.audit
                    .security_event(
                        &caller.id,
                        "DENYLISTED_SCRIPT_ALLOWED",
                        &description,
                        json!({
                            "matched_patterns": verdict.matched_patterns,
                            "confirmed": request.confirmed,
                        }),
                    )
                    .await;
            }
            Disposition::Allow => {}
        }

        let ctx = ExecutionContext {
            request_id: request.id,
            caller: caller.clone(),
            timeout: self.policy.effective_timeout(request.requested_timeout()),
            policy: Arc::clone(&self.policy),
        };
        self.router.dispatch(&action, &ctx, &description).await
    }
}

/// Maps an interpretation onto an executable target, when it has one.
#[must_use]
pub fn action_for(interpretation: &Interpretation) -> Option<ActionTarget> {
    let manager = || {
        interpretation
            .parameter_text(&["manager", "package_manager"])
            .unwrap_or_else(|| DEFAULT_MANAGER.to_string())
    };
    match interpretation.intent {
        Intent::InstallSoftware => Some(ActionTarget::InstallPackage {
            package: interpretation.parameter_text(&["package", "package_name"])?,
            manager: manager(),
        }),
        Intent::UninstallSoftware => Some(ActionTarget::UninstallPackage {
            package: interpretation.parameter_text(&["package", "package_name"])?,
            manager: manager(),
        }),
        Intent::ManageService => Some(ActionTarget::ServiceAction {
            service: interpretation.parameter_text(&["service", "service_name"])?,
            action: interpretation.parameter_text(&["action"])?,
        }),
        Intent::RunScript => {
            let script = interpretation.parameter_text(&["script"]).or_else(|| {
                let suggested = interpretation.suggested_command.trim();
                (!suggested.is_empty()).then(|| suggested.to_string())
            })?;
            Some(ActionTarget::RunScript {
                script,
                require_confirmation: true,
            })
        }
        Intent::SystemInfo => Some(ActionTarget::QueryInfo),
        Intent::ListPackages => Some(ActionTarget::ListPackages { manager: manager() }),
        Intent::RunPentest | Intent::Unknown | Intent::Other(_) => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn install_maps_with_default_manager() {
        let interp = Interpretation::new(Intent::InstallSoftware, SafetyLevel::Caution)
            .with_parameter("package_name", "git");
        assert_eq!(
            action_for(&interp),
            Some(ActionTarget::InstallPackage {
                package: "git".into(),
                manager: "chocolatey".into()
            })
        );
    }

    #[test]
    fn missing_parameters_map_to_nothing() {
        let interp = Interpretation::new(Intent::ManageService, SafetyLevel::Caution)
            .with_parameter("service", "Spooler");
        assert_eq!(action_for(&interp), None);
        let pentest = Interpretation::new(Intent::RunPentest, SafetyLevel::Dangerous);
        assert_eq!(action_for(&pentest), None);
    }

    #[test]
    fn script_falls_back_to_suggested_command() {
        let interp = Interpretation::new(Intent::RunScript, SafetyLevel::Safe)
            .with_suggested_command("Get-Date");
        assert_eq!(
            action_for(&interp),
            Some(ActionTarget::RunScript {
                script: "Get-Date".into(),
                require_confirmation: true
            })
        );
    }

    #[test]
    fn system_info_needs_no_parameters() {
        let interp = Interpretation::new(Intent::SystemInfo, SafetyLevel::Safe);
        assert_eq!(action_for(&interp), Some(ActionTarget::QueryInfo));
    }
}
