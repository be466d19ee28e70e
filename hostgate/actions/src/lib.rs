#![deny(
    clippy::all,
    clippy::pedantic,
    clippy::nursery,
    missing_docs,
    rust_2018_idioms
)]

//! Safety-gated execution of host actions: validation, classification,
//! confirmation gating, routing to host executors and auditing.

/// Requests, targets, results and validation errors.
#[path = "../actions.rs"]
pub mod actions;

/// Caller identities and the user directory seam.
#[path = "../identity.rs"]
pub mod identity;

/// TOML configuration and the derived safety policy.
#[path = "../config.rs"]
pub mod config;

/// Denylist scanning, tier rules and the safety verdict.
#[path = "../security/main.rs"]
pub mod security;

/// Classifier facade used by the pipeline.
#[path = "../security_link.rs"]
pub mod security_link;

/// Subprocess launching with deadlines.
#[path = "../launcher.rs"]
pub mod launcher;

/// Executor trait and the dispatch table.
#[path = "../agents.rs"]
pub mod agents;

/// Shell script executor.
#[path = "../scriptact.rs"]
pub mod scriptact;

/// Package manager executor and listing parsers.
#[path = "../packageact.rs"]
pub mod packageact;

/// Service control executor.
#[path = "../serviceact.rs"]
pub mod serviceact;

/// In-process host snapshot.
#[path = "../infoact.rs"]
pub mod infoact;

/// Append-only audit streams.
#[path = "../telemetry.rs"]
pub mod telemetry;

/// End-to-end pipeline.
#[path = "../actioncommander.rs"]
pub mod actioncommander;

/// Prelude exports for consumers of the gate.
pub mod prelude {
    pub use crate::actioncommander::{GateCommander, GateCommanderBuilder, GateReply};
    pub use crate::actions::{
        ActionKind, ActionTarget, ExecutionRequest, ExecutionResult, OutcomeTag, PackageManager,
        ResultDetail, ServiceVerb,
    };
    pub use crate::agents::{ActionExecutor, ExecutionContext, ExecutionRouter};
    pub use crate::config::{GateConfig, SafetyPolicy};
    pub use crate::identity::{CallerIdentity, Permission, StaticUserDirectory, UserDirectory};
    pub use crate::launcher::{CommandSpec, ProcessLauncher, ProcessOutput, TokioProcessLauncher};
    pub use crate::security_link::{SafetyClassifier, SafetyClassifierBuilder};
    pub use crate::telemetry::{AuditKind, AuditRecord, AuditRecorder};
}
