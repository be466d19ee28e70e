use std::{sync::Arc, time::Duration};

use async_trait::async_trait;

use crate::{
    actions::{ActionError, ActionKind, ExecutionResult, ResultDetail, ValidatedAction},
    agents::{launch_to_result, ActionExecutor, ExecutionContext},
    config::SafetyPolicy,
    launcher::{CommandSpec, ProcessLauncher},
};

/// Shell invocation for `script`; the script is a single argv entry.
#[must_use]
pub fn script_command(policy: &SafetyPolicy, script: &str, timeout: Duration) -> CommandSpec {
    CommandSpec::new(
        policy.shell.clone(),
        vec![
            "-ExecutionPolicy".into(),
            policy.execution_policy.clone(),
            "-Command".into(),
            script.to_string(),
        ],
        timeout,
    )
}

/// Runs ad-hoc scripts through the configured shell.
pub struct ScriptExecutor {
    launcher: Arc<dyn ProcessLauncher>,
}

impl ScriptExecutor {
    /// Creates the executor.
    #[must_use]
    pub fn new(launcher: Arc<dyn ProcessLauncher>) -> Self {
        Self { launcher }
    }
}

#[async_trait]
impl ActionExecutor for ScriptExecutor {
    fn kinds(&self) -> &'static [ActionKind] {
        &[ActionKind::RunScript]
    }

    fn name(&self) -> &str {
        "script"
    }

    async fn execute(&self, action: &ValidatedAction, ctx: &ExecutionContext) -> ExecutionResult {
        let ValidatedAction::RunScript { script, .. } = action else {
            return ExecutionResult::rejected(ctx.request_id, &ActionError::NoExecutor(action.kind()));
        };
        let spec = script_command(&ctx.policy, script, ctx.timeout);
        let detail = ResultDetail::Script { argv: spec.argv() };
        launch_to_result(self.launcher.as_ref(), ctx.request_id, spec, detail).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn argv_keeps_script_as_one_argument() {
        let policy = SafetyPolicy::default();
        let spec = script_command(&policy, "Get-Date; Get-Process", Duration::from_secs(10));
        assert_eq!(
            spec.argv(),
            vec![
                "powershell.exe",
                "-ExecutionPolicy",
                "RemoteSigned",
                "-Command",
                "Get-Date; Get-Process"
            ]
        );
        assert_eq!(spec.timeout, Duration::from_secs(10));
    }
}
