use std::{fmt, str::FromStr, time::Duration};

use chrono::{DateTime, Utc};
use hostgate_nlp::{answer::ReportedOutcome, interpretation::SafetyLevel};
use rand::{distributions::Alphanumeric, thread_rng, Rng};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use uuid::Uuid;

use crate::{
    identity::CallerIdentity, infoact::SystemSnapshot, launcher::ProcessOutput,
    packageact::InstalledPackage,
};

/// Identifier assigned to every execution request.
pub type RequestId = Uuid;

const MAX_NAME_LEN: usize = 256;

/// Kind of host action, used as the routing key.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    /// Ad-hoc shell script.
    RunScript,
    /// Package installation.
    InstallPackage,
    /// Package removal.
    UninstallPackage,
    /// Service control or status query.
    ServiceAction,
    /// Host snapshot.
    QueryInfo,
    /// Installed package listing.
    ListPackages,
}

impl ActionKind {
    /// Returns a short label.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::RunScript => "run_script",
            Self::InstallPackage => "install_package",
            Self::UninstallPackage => "uninstall_package",
            Self::ServiceAction => "service_action",
            Self::QueryInfo => "query_info",
            Self::ListPackages => "list_packages",
        }
    }
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Supported package managers.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum PackageManager {
    /// Chocolatey (`choco`).
    Chocolatey,
    /// Windows Package Manager.
    Winget,
}

impl PackageManager {
    /// Returns the canonical name.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Chocolatey => "chocolatey",
            Self::Winget => "winget",
        }
    }
}

impl FromStr for PackageManager {
    type Err = ActionError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "chocolatey" | "choco" => Ok(Self::Chocolatey),
            "winget" => Ok(Self::Winget),
            _ => Err(ActionError::UnsupportedManager(raw.to_string())),
        }
    }
}

impl fmt::Display for PackageManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Operation applied to a service.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum ServiceVerb {
    /// Start the service.
    Start,
    /// Stop the service.
    Stop,
    /// Restart the service.
    Restart,
    /// Query name, status and start type.
    Status,
}

impl ServiceVerb {
    /// Lowercase label.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Start => "start",
            Self::Stop => "stop",
            Self::Restart => "restart",
            Self::Status => "status",
        }
    }

    /// Whether the verb changes service state.
    #[must_use]
    pub const fn is_mutating(self) -> bool {
        !matches!(self, Self::Status)
    }
}

impl FromStr for ServiceVerb {
    type Err = ActionError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "start" => Ok(Self::Start),
            "stop" => Ok(Self::Stop),
            "restart" => Ok(Self::Restart),
            "status" => Ok(Self::Status),
            _ => Err(ActionError::InvalidServiceAction(raw.to_string())),
        }
    }
}

impl fmt::Display for ServiceVerb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Action as submitted by a caller, before validation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ActionTarget {
    /// Run a shell script.
    RunScript {
        /// Script text.
        script: String,
        /// Whether denylisted content must be confirmed first.
        require_confirmation: bool,
    },
    /// Install a package.
    InstallPackage {
        /// Package identifier.
        package: String,
        /// Manager name.
        manager: String,
    },
    /// Remove a package.
    UninstallPackage {
        /// Package identifier.
        package: String,
        /// Manager name.
        manager: String,
    },
    /// Control or query a service.
    ServiceAction {
        /// Service name.
        service: String,
        /// One of start, stop, restart, status.
        action: String,
    },
    /// Collect a host snapshot.
    QueryInfo,
    /// List installed packages.
    ListPackages {
        /// Manager name.
        manager: String,
    },
}

impl ActionTarget {
    /// Routing key.
    #[must_use]
    pub const fn kind(&self) -> ActionKind {
        match self {
            Self::RunScript { .. } => ActionKind::RunScript,
            Self::InstallPackage { .. } => ActionKind::InstallPackage,
            Self::UninstallPackage { .. } => ActionKind::UninstallPackage,
            Self::ServiceAction { .. } => ActionKind::ServiceAction,
            Self::QueryInfo => ActionKind::QueryInfo,
            Self::ListPackages { .. } => ActionKind::ListPackages,
        }
    }

    /// One-line description used in audit records.
    #[must_use]
    pub fn describe(&self) -> String {
        match self {
            Self::RunScript { script, .. } => format!("run_script: {script}"),
            Self::InstallPackage { package, manager } => {
                format!("install_package: {package} via {manager}")
            }
            Self::UninstallPackage { package, manager } => {
                format!("uninstall_package: {package} via {manager}")
            }
            Self::ServiceAction { service, action } => {
                format!("service_action: {action} {service}")
            }
            Self::QueryInfo => "query_info".into(),
            Self::ListPackages { manager } => format!("list_packages via {manager}"),
        }
    }

    /// Validates names, managers and verbs without touching the host.
    pub fn validate(&self) -> Result<ValidatedAction, ActionError> {
        Ok(match self {
            Self::RunScript {
                script,
                require_confirmation,
            } => {
                if script.trim().is_empty() {
                    return Err(ActionError::EmptyScript);
                }
                ValidatedAction::RunScript {
                    script: script.clone(),
                    require_confirmation: *require_confirmation,
                }
            }
            Self::InstallPackage { package, manager } => ValidatedAction::InstallPackage {
                package: validate_package(package)?,
                manager: manager.parse()?,
            },
            Self::UninstallPackage { package, manager } => ValidatedAction::UninstallPackage {
                package: validate_package(package)?,
                manager: manager.parse()?,
            },
            Self::ServiceAction { service, action } => ValidatedAction::ServiceAction {
                action: action.parse()?,
                service: validate_service(service)?,
            },
            Self::QueryInfo => ValidatedAction::QueryInfo,
            Self::ListPackages { manager } => ValidatedAction::ListPackages {
                manager: manager.parse()?,
            },
        })
    }
}

/// Action whose fields have been checked and parsed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidatedAction {
    /// Run a shell script.
    RunScript {
        /// Script text.
        script: String,
        /// Whether denylisted content must be confirmed first.
        require_confirmation: bool,
    },
    /// Install a package.
    InstallPackage {
        /// Package identifier.
        package: String,
        /// Manager.
        manager: PackageManager,
    },
    /// Remove a package.
    UninstallPackage {
        /// Package identifier.
        package: String,
        /// Manager.
        manager: PackageManager,
    },
    /// Control or query a service.
    ServiceAction {
        /// Service name.
        service: String,
        /// Verb.
        action: ServiceVerb,
    },
    /// Collect a host snapshot.
    QueryInfo,
    /// List installed packages.
    ListPackages {
        /// Manager.
        manager: PackageManager,
    },
}

impl ValidatedAction {
    /// Routing key.
    #[must_use]
    pub const fn kind(&self) -> ActionKind {
        match self {
            Self::RunScript { .. } => ActionKind::RunScript,
            Self::InstallPackage { .. } => ActionKind::InstallPackage,
            Self::UninstallPackage { .. } => ActionKind::UninstallPackage,
            Self::ServiceAction { .. } => ActionKind::ServiceAction,
            Self::QueryInfo => ActionKind::QueryInfo,
            Self::ListPackages { .. } => ActionKind::ListPackages,
        }
    }
}

fn validate_package(raw: &str) -> Result<String, ActionError> {
    let name = raw.trim();
    let reason = if name.is_empty() {
        Some("must not be empty")
    } else if name.starts_with('-') {
        Some("must not start with '-'")
    } else if name.chars().any(|c| c.is_whitespace() || c.is_control()) {
        Some("must not contain whitespace or control characters")
    } else if name.len() > MAX_NAME_LEN {
        Some("is too long")
    } else {
        None
    };
    match reason {
        Some(reason) => Err(ActionError::InvalidPackage {
            name: raw.to_string(),
            reason,
        }),
        None => Ok(name.to_string()),
    }
}

fn validate_service(raw: &str) -> Result<String, ActionError> {
    let name = raw.trim();
    let reason = if name.is_empty() {
        Some("must not be empty")
    } else if name.chars().any(char::is_control) {
        Some("must not contain control characters")
    } else if name.len() > MAX_NAME_LEN {
        Some("is too long")
    } else {
        None
    };
    match reason {
        Some(reason) => Err(ActionError::InvalidService {
            name: raw.to_string(),
            reason,
        }),
        None => Ok(name.to_string()),
    }
}

/// Canonical representation of a request to act on the host.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionRequest {
    /// Unique identifier.
    pub id: RequestId,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Authenticated caller.
    pub caller: CallerIdentity,
    /// Requested action.
    pub target: ActionTarget,
    /// Explicit caller confirmation.
    pub confirmed: bool,
    /// Requested timeout, capped by policy.
    pub timeout_secs: Option<u64>,
    /// Correlation identifier for cross-system tracking.
    pub correlation_id: String,
}

impl ExecutionRequest {
    /// Creates a new builder for the request.
    #[must_use]
    pub fn builder(caller: CallerIdentity, target: ActionTarget) -> ExecutionRequestBuilder {
        ExecutionRequestBuilder {
            request: Self {
                id: RequestId::new_v4(),
                created_at: Utc::now(),
                caller,
                target,
                confirmed: false,
                timeout_secs: None,
                correlation_id: Self::generate_correlation_id(),
            },
        }
    }

    /// Requested timeout as a duration.
    #[must_use]
    pub fn requested_timeout(&self) -> Option<Duration> {
        self.timeout_secs.map(Duration::from_secs)
    }

    fn generate_correlation_id() -> String {
        thread_rng()
            .sample_iter(Alphanumeric)
            .take(16)
            .map(char::from)
            .collect()
    }
}

/// Builder used to construct requests fluently.
#[derive(Debug)]
pub struct ExecutionRequestBuilder {
    request: ExecutionRequest,
}

impl ExecutionRequestBuilder {
    /// Marks the request as confirmed by the caller.
    #[must_use]
    pub const fn confirmed(mut self, confirmed: bool) -> Self {
        self.request.confirmed = confirmed;
        self
    }

    /// Requests a timeout in seconds.
    #[must_use]
    pub const fn timeout_secs(mut self, secs: u64) -> Self {
        self.request.timeout_secs = Some(secs);
        self
    }

    /// Supplies a correlation identifier.
    #[must_use]
    pub fn correlation_id(mut self, correlation_id: impl Into<String>) -> Self {
        self.request.correlation_id = correlation_id.into();
        self
    }

    /// Consumes the builder returning the finalized request.
    #[must_use]
    pub fn build(self) -> ExecutionRequest {
        self.request
    }
}

/// Audit outcome tag.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "UPPERCASE")]
pub enum OutcomeTag {
    /// Completed successfully.
    Success,
    /// Ran, or tried to run, and failed.
    Failed,
    /// Refused before anything ran.
    Blocked,
}

impl OutcomeTag {
    /// Uppercase label.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Success => "SUCCESS",
            Self::Failed => "FAILED",
            Self::Blocked => "BLOCKED",
        }
    }
}

/// Per-kind detail attached to a result.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ResultDetail {
    /// Script run.
    Script {
        /// Argv handed to the launcher.
        argv: Vec<String>,
    },
    /// Package install or removal.
    PackageChange {
        /// Package identifier.
        package: String,
        /// Manager used.
        manager: PackageManager,
        /// Whether this was an install (false for removal).
        install: bool,
    },
    /// Service control or status.
    Service {
        /// Service name.
        service: String,
        /// Verb applied.
        action: ServiceVerb,
        /// Parsed status document for successful `status` calls.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        service_info: Option<Value>,
    },
    /// Installed packages.
    PackageList {
        /// Manager queried.
        manager: PackageManager,
        /// Parsed entries.
        packages: Vec<InstalledPackage>,
    },
    /// Host snapshot.
    SystemSnapshot(Box<SystemSnapshot>),
    /// Refused because the script matched the denylist.
    Blocked {
        /// Tier assigned by the classifier.
        tier: SafetyLevel,
        /// Denylist entries that matched.
        matched_patterns: Vec<String>,
    },
    /// Refused because the tier needs confirmation.
    ConfirmationRequired {
        /// Tier assigned by the classifier.
        tier: SafetyLevel,
    },
    /// Refused because the caller lacks a permission.
    PermissionDenied {
        /// Missing permission.
        permission: String,
    },
    /// Rejected by validation.
    Validation {
        /// Offending field.
        field: String,
        /// Reason.
        reason: String,
    },
    /// No executor is registered for the action.
    Unroutable {
        /// Kind without an executor.
        kind: ActionKind,
    },
}

/// Outcome returned to the caller for every request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionResult {
    /// Request identifier.
    pub request_id: RequestId,
    /// Whether the action succeeded.
    pub success: bool,
    /// Full standard output or rendered result.
    pub output: String,
    /// Error text on failure; stderr, possibly empty, on success.
    pub error: String,
    /// Process exit code, only for process-backed actions.
    pub exit_code: Option<i32>,
    /// Set when a gate refused for lack of confirmation.
    pub requires_confirmation: bool,
    /// Wall time spent executing.
    pub duration_ms: u64,
    /// Typed per-kind detail.
    pub detail: ResultDetail,
}

impl ExecutionResult {
    /// Result of a finished process; success iff the exit code is 0.
    #[must_use]
    pub fn from_process(request_id: RequestId, output: &ProcessOutput, detail: ResultDetail) -> Self {
        let success = output.exit_code == Some(0);
        // stderr of a successful run is kept: warnings and progress land there
        let error = if success || !output.stderr.trim().is_empty() {
            output.stderr.clone()
        } else {
            output.exit_code.map_or_else(
                || "process terminated without exit code".to_string(),
                |code| format!("process exited with code {code}"),
            )
        };
        Self {
            request_id,
            success,
            output: output.stdout.clone(),
            error,
            exit_code: output.exit_code,
            requires_confirmation: false,
            duration_ms: duration_ms(output.duration),
            detail,
        }
    }

    /// Successful in-process result.
    #[must_use]
    pub fn completed(request_id: RequestId, output: String, detail: ResultDetail) -> Self {
        Self {
            request_id,
            success: true,
            output,
            error: String::new(),
            exit_code: None,
            requires_confirmation: false,
            duration_ms: 0,
            detail,
        }
    }

    /// Failure that produced no process output (spawn error, timeout).
    #[must_use]
    pub fn failed(request_id: RequestId, error: impl Into<String>, detail: ResultDetail) -> Self {
        let error = error.into();
        Self {
            request_id,
            success: false,
            output: String::new(),
            error: if error.is_empty() {
                "unknown failure".into()
            } else {
                error
            },
            exit_code: None,
            requires_confirmation: false,
            duration_ms: 0,
            detail,
        }
    }

    /// Validation refusal.
    #[must_use]
    pub fn rejected(request_id: RequestId, err: &ActionError) -> Self {
        let detail = match err {
            ActionError::PermissionDenied { permission, .. } => ResultDetail::PermissionDenied {
                permission: permission.clone(),
            },
            ActionError::NoExecutor(kind) => ResultDetail::Unroutable { kind: *kind },
            other => ResultDetail::Validation {
                field: other.field().into(),
                reason: other.to_string(),
            },
        };
        Self::failed(request_id, err.to_string(), detail)
    }

    /// Denylist block.
    #[must_use]
    pub fn blocked(request_id: RequestId, tier: SafetyLevel, matched_patterns: Vec<String>) -> Self {
        let mut result = Self::failed(
            request_id,
            format!(
                "Script contains potentially dangerous commands ({}). Confirmation required.",
                matched_patterns.join(", ")
            ),
            ResultDetail::Blocked {
                tier,
                matched_patterns,
            },
        );
        result.requires_confirmation = true;
        result
    }

    /// Confirmation gate refusal.
    #[must_use]
    pub fn needs_confirmation(request_id: RequestId, tier: SafetyLevel, action: &str) -> Self {
        let mut result = Self::failed(
            request_id,
            format!("{action} is {tier} tier and requires confirmation"),
            ResultDetail::ConfirmationRequired { tier },
        );
        result.requires_confirmation = true;
        result
    }

    /// Audit outcome tag.
    #[must_use]
    pub const fn outcome(&self) -> OutcomeTag {
        match self.detail {
            ResultDetail::Blocked { .. }
            | ResultDetail::ConfirmationRequired { .. }
            | ResultDetail::PermissionDenied { .. } => OutcomeTag::Blocked,
            _ if self.success => OutcomeTag::Success,
            _ => OutcomeTag::Failed,
        }
    }

    /// Text used for audit excerpts: output on success, error otherwise.
    #[must_use]
    pub fn audit_text(&self) -> &str {
        if self.success || self.error.is_empty() {
            &self.output
        } else {
            &self.error
        }
    }
}

impl ReportedOutcome for ExecutionResult {
    fn succeeded(&self) -> bool {
        self.success
    }

    fn failure_reason(&self) -> Option<&str> {
        (!self.success && !self.error.is_empty()).then_some(self.error.as_str())
    }

    fn context(&self) -> Value {
        serde_json::json!({
            "success": self.success,
            "error": self.error,
            "exit_code": self.exit_code,
            "requires_confirmation": self.requires_confirmation,
            "output": shared_logging::excerpt(&self.output, 2_000),
            "detail": self.detail,
        })
    }
}

fn duration_ms(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

/// Validation and policy errors raised before anything is spawned.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ActionError {
    /// Manager is neither chocolatey nor winget.
    #[error("unsupported package manager: {0}")]
    UnsupportedManager(String),
    /// Service verb outside start/stop/restart/status.
    #[error("invalid service action: {0}")]
    InvalidServiceAction(String),
    /// Malformed package name.
    #[error("invalid package name {name:?}: {reason}")]
    InvalidPackage {
        /// Name as submitted.
        name: String,
        /// Why it was rejected.
        reason: &'static str,
    },
    /// Malformed service name.
    #[error("invalid service name {name:?}: {reason}")]
    InvalidService {
        /// Name as submitted.
        name: String,
        /// Why it was rejected.
        reason: &'static str,
    },
    /// Script text is blank.
    #[error("script is empty")]
    EmptyScript,
    /// Caller lacks a required permission.
    #[error("caller {caller} lacks the {permission} permission")]
    PermissionDenied {
        /// Caller identity.
        caller: String,
        /// Missing permission.
        permission: String,
    },
    /// No executor handles the action kind.
    #[error("no executor registered for {0}")]
    NoExecutor(ActionKind),
}

impl ActionError {
    /// Request field the error refers to.
    #[must_use]
    pub const fn field(&self) -> &'static str {
        match self {
            Self::UnsupportedManager(_) => "manager",
            Self::InvalidServiceAction(_) => "action",
            Self::InvalidPackage { .. } => "package",
            Self::InvalidService { .. } => "service",
            Self::EmptyScript => "script",
            Self::PermissionDenied { .. } => "caller",
            Self::NoExecutor(_) => "kind",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::Permission;

    fn caller() -> CallerIdentity {
        CallerIdentity::new("ops", [Permission::Execute])
    }

    #[test]
    fn builder_assigns_defaults() {
        let request = ExecutionRequest::builder(caller(), ActionTarget::QueryInfo)
            .timeout_secs(30)
            .build();
        assert!(!request.confirmed);
        assert_eq!(request.correlation_id.len(), 16);
        assert_eq!(request.requested_timeout(), Some(Duration::from_secs(30)));
        assert_eq!(request.target.kind(), ActionKind::QueryInfo);
    }

    #[test]
    fn managers_and_verbs_parse_case_insensitively() {
        assert_eq!("Chocolatey".parse::<PackageManager>().unwrap(), PackageManager::Chocolatey);
        assert_eq!("WINGET".parse::<PackageManager>().unwrap(), PackageManager::Winget);
        assert_eq!(
            "apt".parse::<PackageManager>(),
            Err(ActionError::UnsupportedManager("apt".into()))
        );
        assert_eq!("ReStart".parse::<ServiceVerb>().unwrap(), ServiceVerb::Restart);
        assert!("pause".parse::<ServiceVerb>().is_err());
    }

    #[test]
    fn package_names_are_validated() {
        let target = |package: &str| ActionTarget::InstallPackage {
            package: package.into(),
            manager: "chocolatey".into(),
        };
        assert!(target("notepadplusplus").validate().is_ok());
        assert!(target("Git.Git").validate().is_ok());
        for bad in ["", "  ", "--force", "git; rm", "a\u{7}b"] {
            let err = target(bad).validate().unwrap_err();
            assert_eq!(err.field(), "package", "{bad:?} should be rejected");
        }
    }

    #[test]
    fn service_names_reject_control_characters() {
        let target = ActionTarget::ServiceAction {
            service: "Spooler\n".into(),
            action: "status".into(),
        };
        // trailing newline is trimmed, embedded ones are not
        assert!(target.validate().is_ok());
        let target = ActionTarget::ServiceAction {
            service: "Spo\noler".into(),
            action: "status".into(),
        };
        assert_eq!(target.validate().unwrap_err().field(), "service");
    }

    #[test]
    fn process_result_tracks_exit_code() {
        let id = RequestId::new_v4();
        let ok = ProcessOutput {
            exit_code: Some(0),
            stdout: "done".into(),
            stderr: String::new(),
            duration: Duration::from_millis(12),
        };
        let result = ExecutionResult::from_process(id, &ok, ResultDetail::Script { argv: vec![] });
        assert!(result.success);
        assert!(result.error.is_empty());
        assert_eq!(result.outcome(), OutcomeTag::Success);

        let failed = ProcessOutput {
            exit_code: Some(3),
            ..ok
        };
        let result =
            ExecutionResult::from_process(id, &failed, ResultDetail::Script { argv: vec![] });
        assert!(!result.success);
        assert_eq!(result.error, "process exited with code 3");
        assert_eq!(result.outcome(), OutcomeTag::Failed);
    }

    #[test]
    fn successful_run_keeps_stderr() {
        let output = ProcessOutput {
            exit_code: Some(0),
            stdout: "installed".into(),
            stderr: "WARNING: reboot required\n".into(),
            duration: Duration::from_millis(5),
        };
        let result =
            ExecutionResult::from_process(RequestId::new_v4(), &output, ResultDetail::Script { argv: vec![] });
        assert!(result.success);
        assert_eq!(result.output, "installed");
        assert_eq!(result.error, "WARNING: reboot required\n");
        assert_eq!(result.audit_text(), "installed");
        assert_eq!(result.outcome(), OutcomeTag::Success);
    }

    #[test]
    fn blocked_result_requests_confirmation() {
        let result = ExecutionResult::blocked(
            RequestId::new_v4(),
            SafetyLevel::Dangerous,
            vec!["Remove-Item".into()],
        );
        assert!(!result.success);
        assert!(result.requires_confirmation);
        assert!(result.error.contains("Remove-Item"));
        assert_eq!(result.outcome(), OutcomeTag::Blocked);
    }
}
