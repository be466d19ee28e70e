use serde_json::Value;

use crate::{interpretation::InterpretationContext, provider::Prompt};

/// Instruction sent with every interpretation request.
pub const INTERPRET_SYSTEM_PROMPT: &str = r#"You translate operator commands for a managed Windows host into structured JSON.

Reply with a single JSON object of this shape:
{
    "intent": "install_software | uninstall_software | run_script | manage_service | system_info | list_packages | run_pentest | unknown",
    "parameters": {"key": "value"},
    "confidence": 0.0,
    "safety_level": "safe | caution | dangerous",
    "requires_confirmation": true,
    "suggested_command": "command that would be run, or empty",
    "explanation": "one sentence describing the action"
}

Safety levels:
- safe: read-only queries such as system information or service status
- caution: reversible state changes
- dangerous: anything that can damage the host or weaken its security

Confirmation is always required for system modifications, network operations,
penetration testing, package installation or removal, registry changes and
service control.

Parameter names:
- install_software / uninstall_software: "package", optional "manager" (chocolatey or winget)
- manage_service: "service" and "action" (start, stop, restart, status)
- run_script: "script" holding the PowerShell text
- list_packages: optional "manager"
"#;

/// Instruction sent when asking for the caller-facing reply.
pub const RESPONSE_SYSTEM_PROMPT: &str = "You are the operator assistant of a managed Windows host. \
Write a short, factual reply to the operator based on the interpretation and execution result you are given.";

/// Builds the interpretation prompt for `text`.
#[must_use]
pub fn interpretation_prompt(text: &str, context: Option<&InterpretationContext>) -> Prompt {
    let mut user = format!("User command: {text}");
    if let Some(context) = context.filter(|ctx| !ctx.is_empty()) {
        if let Ok(rendered) = serde_json::to_string_pretty(context) {
            user.push_str("\nUser context: ");
            user.push_str(&rendered);
        }
    }
    user.push_str("\n\nProvide your interpretation in JSON format:");
    Prompt::new(INTERPRET_SYSTEM_PROMPT, user)
}

/// Builds the reply-generation prompt around a JSON context document.
#[must_use]
pub fn response_prompt(context: &Value) -> Prompt {
    let rendered = serde_json::to_string_pretty(context).unwrap_or_else(|_| context.to_string());
    Prompt::new(
        RESPONSE_SYSTEM_PROMPT,
        format!("Context: {rendered}\n\nWrite the reply to the operator:"),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prompt_without_context() {
        let prompt = interpretation_prompt("restart spooler", None);
        assert_eq!(
            prompt.user,
            "User command: restart spooler\n\nProvide your interpretation in JSON format:"
        );
        assert!(prompt.system.contains("safety_level"));
    }

    #[test]
    fn prompt_embeds_context() {
        let ctx = InterpretationContext::for_caller("ops").with_hint("host", "web-01");
        let prompt = interpretation_prompt("status", Some(&ctx));
        assert!(prompt.user.contains("User context: {"));
        assert!(prompt.user.contains("\"caller\": \"ops\""));
        assert!(prompt.user.ends_with("Provide your interpretation in JSON format:"));
    }

    #[test]
    fn empty_context_is_omitted() {
        let prompt = interpretation_prompt("status", Some(&InterpretationContext::default()));
        assert!(!prompt.user.contains("User context"));
    }
}
