#![deny(
    clippy::all,
    clippy::pedantic,
    clippy::nursery,
    missing_docs,
    rust_2018_idioms
)]

//! Command interpretation for hostgate: provider adapter, reply parsing,
//! keyword fallback, retry control and reply synthesis.

/// Interpretation model: intents, safety tiers and caller context.
#[path = "../interpretation.rs"]
pub mod interpretation;

/// Tolerant parsing of provider replies.
#[path = "../parser.rs"]
pub mod parser;

/// Deterministic keyword classifier.
#[path = "../fallback.rs"]
pub mod fallback;

/// Provider contract and the chat-completions client.
#[path = "../provider.rs"]
pub mod provider;

/// Bounded exponential backoff for provider calls.
#[path = "../retry.rs"]
pub mod retry;

/// Prompt templates.
#[path = "../prompts.rs"]
pub mod prompts;

/// Interpretation entry point combining provider, retry and fallback.
#[path = "../interpreter.rs"]
pub mod interpreter;

/// Caller-facing reply synthesis.
#[path = "../answer.rs"]
pub mod answer;

/// Prelude exports for consumers of the interpretation layer.
pub mod prelude {
    pub use crate::answer::{fallback_response, ReportedOutcome, ResponseSynthesizer};
    pub use crate::interpretation::{Intent, Interpretation, InterpretationContext, SafetyLevel};
    pub use crate::interpreter::{CommandInterpreter, CommandInterpreterBuilder};
    pub use crate::provider::{
        ChatCompletionsProvider, InterpretationProvider, Prompt, ProviderError, ProviderSettings,
    };
    pub use crate::retry::{RetryPolicy, RetryScope};
}
