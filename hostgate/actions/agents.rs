use std::{sync::Arc, time::Duration, time::Instant};

use async_trait::async_trait;
use indexmap::IndexMap;
use tracing::{debug, info};

use crate::{
    actions::{ActionError, ActionKind, ExecutionResult, RequestId, ResultDetail, ValidatedAction},
    config::SafetyPolicy,
    identity::CallerIdentity,
    infoact::SystemInfoExecutor,
    launcher::{CommandSpec, ProcessLauncher},
    packageact::PackageExecutor,
    scriptact::ScriptExecutor,
    serviceact::ServiceExecutor,
    telemetry::AuditRecorder,
};

/// Trait implemented by every kind-specialised executor.
#[async_trait]
pub trait ActionExecutor: Send + Sync {
    /// Kinds handled by this executor.
    fn kinds(&self) -> &'static [ActionKind];
    /// Human readable executor identifier.
    fn name(&self) -> &str;
    /// Performs the action. Failures are reported in the result, never raised.
    async fn execute(&self, action: &ValidatedAction, ctx: &ExecutionContext) -> ExecutionResult;
}

/// Context shared with executors for one request.
#[derive(Debug, Clone)]
pub struct ExecutionContext {
    /// Request being served.
    pub request_id: RequestId,
    /// Caller on whose behalf the action runs.
    pub caller: CallerIdentity,
    /// Effective subprocess deadline.
    pub timeout: Duration,
    /// Read-only policy.
    pub policy: Arc<SafetyPolicy>,
}

/// Dispatch table of executors keyed by action kind.
#[derive(Clone)]
pub struct ExecutionRouter {
    executors: IndexMap<String, Arc<dyn ActionExecutor>>,
    audit: AuditRecorder,
}

impl ExecutionRouter {
    /// Empty router writing to `audit`.
    #[must_use]
    pub fn new(audit: AuditRecorder) -> Self {
        Self {
            executors: IndexMap::new(),
            audit,
        }
    }

    /// Router with the host executors wired to `launcher`.
    #[must_use]
    pub fn production(launcher: Arc<dyn ProcessLauncher>, audit: AuditRecorder) -> Self {
        let mut router = Self::new(audit);
        router.register(Arc::new(ScriptExecutor::new(Arc::clone(&launcher))));
        router.register(Arc::new(PackageExecutor::new(Arc::clone(&launcher))));
        router.register(Arc::new(ServiceExecutor::new(launcher)));
        router.register(Arc::new(SystemInfoExecutor::default()));
        router
    }

    /// Registers an executor for every kind it declares, replacing previous ones.
    pub fn register(&mut self, executor: Arc<dyn ActionExecutor>) {
        for kind in executor.kinds() {
            self.executors
                .insert(kind.label().to_string(), Arc::clone(&executor));
        }
    }

    /// Executor for `kind`.
    #[must_use]
    pub fn resolve(&self, kind: ActionKind) -> Option<Arc<dyn ActionExecutor>> {
        self.executors.get(kind.label()).cloned()
    }

    /// Registered kinds in registration order.
    pub fn kinds(&self) -> impl Iterator<Item = &str> {
        self.executors.keys().map(String::as_str)
    }

    /// Runs `action` and writes exactly one command-execution audit record.
    pub async fn dispatch(
        &self,
        action: &ValidatedAction,
        ctx: &ExecutionContext,
        description: &str,
    ) -> ExecutionResult {
        let kind = action.kind();
        let started = Instant::now();
        let mut result = match self.resolve(kind) {
            Some(executor) => {
                debug!(executor = executor.name(), %kind, request = %ctx.request_id, "dispatching");
                executor.execute(action, ctx).await
            }
            None => ExecutionResult::rejected(ctx.request_id, &ActionError::NoExecutor(kind)),
        };
        if result.duration_ms == 0 {
            result.duration_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
        }
        info!(
            %kind,
            request = %ctx.request_id,
            outcome = result.outcome().label(),
            exit_code = ?result.exit_code,
            "action completed"
        );
        self.audit
            .command_execution(&ctx.caller.id, description, &result)
            .await;
        result
    }
}

/// Runs `spec` and folds launch failures into a failed result.
pub(crate) async fn launch_to_result(
    launcher: &dyn ProcessLauncher,
    request_id: RequestId,
    spec: CommandSpec,
    detail: ResultDetail,
) -> ExecutionResult {
    let started = Instant::now();
    match launcher.launch(spec).await {
        Ok(output) => ExecutionResult::from_process(request_id, &output, detail),
        Err(err) => {
            let mut result = ExecutionResult::failed(request_id, err.to_string(), detail);
            result.duration_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
            result
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{actions::OutcomeTag, telemetry::AuditKind};

    struct EchoExecutor;

    #[async_trait]
    impl ActionExecutor for EchoExecutor {
        fn kinds(&self) -> &'static [ActionKind] {
            &[ActionKind::QueryInfo]
        }

        fn name(&self) -> &str {
            "echo"
        }

        async fn execute(&self, _action: &ValidatedAction, ctx: &ExecutionContext) -> ExecutionResult {
            ExecutionResult::completed(
                ctx.request_id,
                "echo".into(),
                ResultDetail::Script { argv: Vec::new() },
            )
        }
    }

    fn ctx() -> ExecutionContext {
        ExecutionContext {
            request_id: RequestId::new_v4(),
            caller: CallerIdentity::new("ops", []),
            timeout: Duration::from_secs(5),
            policy: Arc::new(SafetyPolicy::default()),
        }
    }

    #[tokio::test]
    async fn dispatch_audits_once() {
        let audit = AuditRecorder::in_memory();
        let mut router = ExecutionRouter::new(audit.clone());
        router.register(Arc::new(EchoExecutor));

        let result = router.dispatch(&ValidatedAction::QueryInfo, &ctx(), "query_info").await;
        assert!(result.success);
        let records = audit.journal_of(AuditKind::CommandExecution);
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].outcome, Some(OutcomeTag::Success));
        assert_eq!(records[0].caller, "ops");
    }

    #[tokio::test]
    async fn unknown_kind_is_unroutable_and_audited() {
        let audit = AuditRecorder::in_memory();
        let router = ExecutionRouter::new(audit.clone());
        let result = router.dispatch(&ValidatedAction::QueryInfo, &ctx(), "query_info").await;
        assert!(!result.success);
        assert!(matches!(result.detail, ResultDetail::Unroutable { kind: ActionKind::QueryInfo }));
        assert_eq!(audit.journal_of(AuditKind::CommandExecution).len(), 1);
    }

    #[test]
    fn production_registers_every_kind() {
        let router = ExecutionRouter::production(
            Arc::new(crate::launcher::TokioProcessLauncher),
            AuditRecorder::in_memory(),
        );
        let kinds: Vec<&str> = router.kinds().collect();
        for kind in [
            ActionKind::RunScript,
            ActionKind::InstallPackage,
            ActionKind::UninstallPackage,
            ActionKind::ServiceAction,
            ActionKind::QueryInfo,
            ActionKind::ListPackages,
        ] {
            assert!(kinds.contains(&kind.label()), "{kind} missing");
        }
    }
}
