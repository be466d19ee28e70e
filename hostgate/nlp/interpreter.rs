use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::{
    fallback::KeywordClassifier,
    interpretation::{Interpretation, InterpretationContext, SafetyLevel},
    parser::parse_reply,
    prompts::interpretation_prompt,
    provider::{InterpretationProvider, Prompt, ProviderError},
    retry::RetryPolicy,
};

/// Turns free-form operator text into an [`Interpretation`].
///
/// The remote provider is optional. Whenever it is missing, keeps failing, or
/// replies with something unparsable, the keyword fallback answers instead,
/// so `interpret` never fails.
pub struct CommandInterpreter {
    provider: Option<Arc<dyn InterpretationProvider>>,
    retry: RetryPolicy,
    fallback: KeywordClassifier,
}

impl CommandInterpreter {
    /// Builder entry point.
    #[must_use]
    pub fn builder() -> CommandInterpreterBuilder {
        CommandInterpreterBuilder::default()
    }

    /// Interpreter that only uses the keyword fallback.
    #[must_use]
    pub fn offline() -> Self {
        Self::builder().build()
    }

    /// Whether a remote provider is configured.
    #[must_use]
    pub fn has_provider(&self) -> bool {
        self.provider.is_some()
    }

    /// Retry policy applied to provider calls.
    #[must_use]
    pub const fn retry_policy(&self) -> &RetryPolicy {
        &self.retry
    }

    /// Interprets `text`, never failing.
    pub async fn interpret(
        &self,
        text: &str,
        context: Option<&InterpretationContext>,
    ) -> Interpretation {
        let caller = context
            .and_then(|ctx| ctx.caller.as_deref())
            .unwrap_or("unknown");

        let interpretation = if self.provider.is_some() {
            let prompt = interpretation_prompt(text, context);
            match self.complete(&prompt).await {
                Ok(reply) => parse_reply(&reply).unwrap_or_else(|err| {
                    warn!(error = %err, "provider reply unusable, using keyword fallback");
                    self.fallback(text)
                }),
                Err(err) => {
                    warn!(error = %err, "provider unavailable, using keyword fallback");
                    self.fallback(text)
                }
            }
        } else {
            debug!("no provider configured, using keyword fallback");
            self.fallback(text)
        };

        info!(
            caller,
            intent = %interpretation.intent,
            safety = %interpretation.safety_level,
            confidence = interpretation.confidence,
            "command interpreted"
        );
        if interpretation.safety_level == SafetyLevel::Dangerous {
            warn!(caller, command = text, intent = %interpretation.intent, "dangerous command detected");
        }
        interpretation
    }

    /// Deterministic keyword interpretation of `text`.
    #[must_use]
    pub fn fallback(&self, text: &str) -> Interpretation {
        self.fallback.classify(text)
    }

    /// Sends `prompt` through the retry controller.
    pub async fn complete(&self, prompt: &Prompt) -> Result<String, ProviderError> {
        let provider = self
            .provider
            .as_ref()
            .ok_or_else(|| ProviderError::NotConfigured("no interpretation provider".into()))?;
        debug!(provider = provider.name(), "calling provider");
        self.retry
            .run(|_| async move { provider.complete(prompt).await })
            .await
    }
}

/// Builder for [`CommandInterpreter`].
#[derive(Default)]
pub struct CommandInterpreterBuilder {
    provider: Option<Arc<dyn InterpretationProvider>>,
    retry: RetryPolicy,
}

impl CommandInterpreterBuilder {
    /// Sets the remote provider.
    #[must_use]
    pub fn provider(mut self, provider: Arc<dyn InterpretationProvider>) -> Self {
        self.provider = Some(provider);
        self
    }

    /// Sets the provider if present.
    #[must_use]
    pub fn provider_opt(mut self, provider: Option<Arc<dyn InterpretationProvider>>) -> Self {
        self.provider = provider;
        self
    }

    /// Overrides the retry policy.
    #[must_use]
    pub const fn retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Finalizes the interpreter.
    #[must_use]
    pub fn build(self) -> CommandInterpreter {
        CommandInterpreter {
            provider: self.provider,
            retry: self.retry,
            fallback: KeywordClassifier::new(),
        }
    }
}
