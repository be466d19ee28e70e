use std::sync::Arc;

use serde_json::{json, Value};
use tracing::{debug, warn};

use crate::{interpretation::Interpretation, interpreter::CommandInterpreter, prompts::response_prompt};

/// Minimal view of an execution outcome needed to phrase a reply.
///
/// Implemented by the execution layer's result type so this crate does not
/// depend on it.
pub trait ReportedOutcome: Send + Sync {
    /// Whether the action succeeded.
    fn succeeded(&self) -> bool;

    /// Failure text, when there is any.
    fn failure_reason(&self) -> Option<&str>;

    /// JSON rendering handed to the provider as context.
    fn context(&self) -> Value;
}

/// Produces the single caller-facing message for a request.
pub struct ResponseSynthesizer {
    interpreter: Arc<CommandInterpreter>,
}

impl ResponseSynthesizer {
    /// Creates a synthesizer sharing the interpreter's provider and retry policy.
    #[must_use]
    pub const fn new(interpreter: Arc<CommandInterpreter>) -> Self {
        Self { interpreter }
    }

    /// Phrases a reply, preferring the provider and falling back to templates.
    pub async fn generate_response(
        &self,
        interpretation: &Interpretation,
        outcome: Option<&dyn ReportedOutcome>,
    ) -> String {
        if !self.interpreter.has_provider() {
            return fallback_response(interpretation, outcome);
        }

        let context = json!({
            "interpretation": interpretation,
            "execution_result": outcome.map_or(Value::Null, ReportedOutcome::context),
        });
        match self.interpreter.complete(&response_prompt(&context)).await {
            Ok(reply) if !reply.trim().is_empty() => {
                debug!("reply generated by provider");
                reply.trim().to_string()
            }
            Ok(_) => fallback_response(interpretation, outcome),
            Err(err) => {
                warn!(error = %err, "reply generation failed, using template");
                fallback_response(interpretation, outcome)
            }
        }
    }
}

/// Template reply used when no provider can phrase one.
#[must_use]
pub fn fallback_response(
    interpretation: &Interpretation,
    outcome: Option<&dyn ReportedOutcome>,
) -> String {
    let intent = &interpretation.intent;
    match outcome {
        Some(outcome) if outcome.succeeded() => format!("Successfully executed {intent}."),
        Some(outcome) => {
            let reason = outcome
                .failure_reason()
                .filter(|reason| !reason.trim().is_empty())
                .unwrap_or("Unknown error");
            format!("Failed to execute {intent}: {reason}")
        }
        None => format!("I understand you want to perform: {intent}. Please confirm to proceed."),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        interpretation::{Intent, SafetyLevel},
        provider::{InterpretationProvider, Prompt, ProviderError},
        retry::{RetryPolicy, RetryScope},
    };
    use async_trait::async_trait;
    use std::time::Duration;

    struct Outcome {
        ok: bool,
        error: &'static str,
    }

    impl ReportedOutcome for Outcome {
        fn succeeded(&self) -> bool {
            self.ok
        }

        fn failure_reason(&self) -> Option<&str> {
            Some(self.error)
        }

        fn context(&self) -> Value {
            json!({"success": self.ok, "error": self.error})
        }
    }

    struct EchoProvider;

    #[async_trait]
    impl InterpretationProvider for EchoProvider {
        fn name(&self) -> &str {
            "echo"
        }

        async fn complete(&self, prompt: &Prompt) -> Result<String, ProviderError> {
            if prompt.user.contains("\"success\": true") {
                Ok("  All done, git is installed.  ".into())
            } else {
                Err(ProviderError::Unauthorized("nope".into()))
            }
        }
    }

    fn install() -> Interpretation {
        Interpretation::new(Intent::InstallSoftware, SafetyLevel::Caution)
    }

    #[tokio::test]
    async fn templates_without_provider() {
        let synth = ResponseSynthesizer::new(Arc::new(CommandInterpreter::offline()));
        let ok = Outcome { ok: true, error: "" };
        let failed = Outcome { ok: false, error: "exit code 1" };
        let blank = Outcome { ok: false, error: " " };

        assert_eq!(
            synth.generate_response(&install(), Some(&ok)).await,
            "Successfully executed install_software."
        );
        assert_eq!(
            synth.generate_response(&install(), Some(&failed)).await,
            "Failed to execute install_software: exit code 1"
        );
        assert_eq!(
            synth.generate_response(&install(), Some(&blank)).await,
            "Failed to execute install_software: Unknown error"
        );
        assert_eq!(
            synth.generate_response(&install(), None).await,
            "I understand you want to perform: install_software. Please confirm to proceed."
        );
    }

    #[tokio::test]
    async fn provider_reply_is_trimmed_and_errors_fall_back() {
        let interpreter = CommandInterpreter::builder()
            .provider(Arc::new(EchoProvider))
            .retry(RetryPolicy::new(3, Duration::from_millis(1), RetryScope::Transient))
            .build();
        let synth = ResponseSynthesizer::new(Arc::new(interpreter));

        let ok = Outcome { ok: true, error: "" };
        assert_eq!(
            synth.generate_response(&install(), Some(&ok)).await,
            "All done, git is installed."
        );
        let failed = Outcome { ok: false, error: "boom" };
        assert_eq!(
            synth.generate_response(&install(), Some(&failed)).await,
            "Failed to execute install_software: boom"
        );
    }
}
