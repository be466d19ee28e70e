use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use crate::{
    actions::{ActionError, ActionKind, ExecutionResult, ResultDetail, ServiceVerb, ValidatedAction},
    agents::{launch_to_result, ActionExecutor, ExecutionContext},
    launcher::ProcessLauncher,
    scriptact::script_command,
};

/// Environment variable carrying the service name into the control script.
pub const SERVICE_ENV: &str = "HOSTGATE_SERVICE";

/// Control script for `verb`; the service name is read from [`SERVICE_ENV`].
#[must_use]
pub const fn service_script(verb: ServiceVerb) -> &'static str {
    match verb {
        ServiceVerb::Start => "Start-Service -Name $env:HOSTGATE_SERVICE -ErrorAction Stop",
        ServiceVerb::Stop => "Stop-Service -Name $env:HOSTGATE_SERVICE -ErrorAction Stop",
        ServiceVerb::Restart => "Restart-Service -Name $env:HOSTGATE_SERVICE -ErrorAction Stop",
        ServiceVerb::Status => {
            "Get-Service -Name $env:HOSTGATE_SERVICE -ErrorAction Stop | Select-Object Name, Status, StartType | ConvertTo-Json"
        }
    }
}

/// Starts, stops, restarts and queries services.
pub struct ServiceExecutor {
    launcher: Arc<dyn ProcessLauncher>,
}

impl ServiceExecutor {
    /// Creates the executor.
    #[must_use]
    pub fn new(launcher: Arc<dyn ProcessLauncher>) -> Self {
        Self { launcher }
    }
}

#[async_trait]
impl ActionExecutor for ServiceExecutor {
    fn kinds(&self) -> &'static [ActionKind] {
        &[ActionKind::ServiceAction]
    }

    fn name(&self) -> &str {
        "services"
    }

    async fn execute(&self, action: &ValidatedAction, ctx: &ExecutionContext) -> ExecutionResult {
        let ValidatedAction::ServiceAction { service, action: verb } = action else {
            return ExecutionResult::rejected(ctx.request_id, &ActionError::NoExecutor(action.kind()));
        };
        let spec = script_command(&ctx.policy, service_script(*verb), ctx.timeout)
            .with_env(SERVICE_ENV, service.clone());
        let detail = ResultDetail::Service {
            service: service.clone(),
            action: *verb,
            service_info: None,
        };
        let mut result = launch_to_result(self.launcher.as_ref(), ctx.request_id, spec, detail).await;

        if result.success && *verb == ServiceVerb::Status {
            match serde_json::from_str(result.output.trim()) {
                Ok(info) => {
                    result.detail = ResultDetail::Service {
                        service: service.clone(),
                        action: *verb,
                        service_info: Some(info),
                    };
                }
                Err(err) => debug!(service = %service, error = %err, "status output is not JSON"),
            }
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scripts_never_embed_names() {
        for verb in [
            ServiceVerb::Start,
            ServiceVerb::Stop,
            ServiceVerb::Restart,
            ServiceVerb::Status,
        ] {
            assert!(service_script(verb).contains("$env:HOSTGATE_SERVICE"));
        }
        assert!(service_script(ServiceVerb::Status).ends_with("ConvertTo-Json"));
    }
}
