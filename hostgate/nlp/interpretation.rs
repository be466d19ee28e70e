use std::fmt;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Confidence assumed when a provider omits or garbles the field.
pub const DEFAULT_CONFIDENCE: f32 = 0.5;

/// Classified purpose of an operator command.
///
/// The vocabulary is fixed for the intents the router understands and open
/// for anything else a provider may return; unknown labels are preserved in
/// [`Intent::Other`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Intent {
    /// Install a package through a package manager.
    InstallSoftware,
    /// Remove a package through a package manager.
    UninstallSoftware,
    /// Run an ad-hoc shell script.
    RunScript,
    /// Start, stop, restart or query a service.
    ManageService,
    /// Collect a host snapshot.
    SystemInfo,
    /// List installed packages.
    ListPackages,
    /// Penetration-testing or scanning request. Classified, never executed.
    RunPentest,
    /// Nothing recognisable.
    Unknown,
    /// Provider-specific label outside the fixed vocabulary.
    Other(String),
}

impl Intent {
    /// Parses a label, accepting the aliases providers commonly emit.
    #[must_use]
    pub fn parse(raw: &str) -> Self {
        let normalized = raw.trim().to_ascii_lowercase();
        match normalized.as_str() {
            "install_software" | "install_package" => Self::InstallSoftware,
            "uninstall_software" | "uninstall_package" | "remove_software" => {
                Self::UninstallSoftware
            }
            "run_script" | "powershell_script" => Self::RunScript,
            "manage_service" | "manage_services" => Self::ManageService,
            "system_info" => Self::SystemInfo,
            "list_packages" | "installed_software" | "list_installed_software" => {
                Self::ListPackages
            }
            "run_pentest" => Self::RunPentest,
            "" | "unknown" => Self::Unknown,
            _ => Self::Other(normalized),
        }
    }

    /// Canonical snake_case label.
    #[must_use]
    pub fn label(&self) -> &str {
        match self {
            Self::InstallSoftware => "install_software",
            Self::UninstallSoftware => "uninstall_software",
            Self::RunScript => "run_script",
            Self::ManageService => "manage_service",
            Self::SystemInfo => "system_info",
            Self::ListPackages => "list_packages",
            Self::RunPentest => "run_pentest",
            Self::Unknown => "unknown",
            Self::Other(label) => label,
        }
    }
}

impl From<String> for Intent {
    fn from(raw: String) -> Self {
        Self::parse(&raw)
    }
}

impl From<Intent> for String {
    fn from(intent: Intent) -> Self {
        intent.label().to_string()
    }
}

impl fmt::Display for Intent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Safety tier governing whether confirmation is mandatory.
#[derive(
    Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash, Default,
)]
#[serde(rename_all = "lowercase")]
pub enum SafetyLevel {
    /// Read-only or otherwise harmless.
    Safe,
    /// Modifies state but is reversible.
    #[default]
    Caution,
    /// Could damage the host or its security posture.
    Dangerous,
}

impl SafetyLevel {
    /// Parses a tier label case-insensitively.
    #[must_use]
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "safe" => Some(Self::Safe),
            "caution" => Some(Self::Caution),
            "dangerous" => Some(Self::Dangerous),
            _ => None,
        }
    }

    /// Lowercase label.
    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            Self::Safe => "safe",
            Self::Caution => "caution",
            Self::Dangerous => "dangerous",
        }
    }

    /// Returns the stricter of the two tiers.
    #[must_use]
    pub fn escalate(self, other: Self) -> Self {
        self.max(other)
    }
}

impl fmt::Display for SafetyLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Structured, confidence-scored reading of one operator command.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Interpretation {
    /// Classified intent.
    pub intent: Intent,
    /// Extracted parameters; values are JSON primitives.
    #[serde(default)]
    pub parameters: IndexMap<String, Value>,
    /// Confidence in [0, 1].
    pub confidence: f32,
    /// Safety tier claimed by the producer.
    pub safety_level: SafetyLevel,
    /// Whether the producer asked for confirmation.
    pub requires_confirmation: bool,
    /// Command the producer suggests running, possibly empty.
    #[serde(default)]
    pub suggested_command: String,
    /// Short explanation of what would be done.
    #[serde(default)]
    pub explanation: String,
}

impl Interpretation {
    /// Creates an interpretation with empty parameters and default confidence.
    ///
    /// Confirmation starts out as required for every non-safe tier.
    #[must_use]
    pub fn new(intent: Intent, safety_level: SafetyLevel) -> Self {
        Self {
            intent,
            parameters: IndexMap::new(),
            confidence: DEFAULT_CONFIDENCE,
            safety_level,
            requires_confirmation: safety_level != SafetyLevel::Safe,
            suggested_command: String::new(),
            explanation: String::new(),
        }
    }

    /// Sets the confidence, clamped to [0, 1].
    #[must_use]
    pub fn with_confidence(mut self, confidence: f64) -> Self {
        self.confidence = clamp_confidence(confidence);
        self
    }

    /// Adds a parameter.
    #[must_use]
    pub fn with_parameter(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.parameters.insert(key.into(), value.into());
        self
    }

    /// Overrides the confirmation flag as claimed by a producer.
    #[must_use]
    pub fn with_requires_confirmation(mut self, requires_confirmation: bool) -> Self {
        self.requires_confirmation = requires_confirmation;
        self
    }

    /// Sets the explanation.
    #[must_use]
    pub fn with_explanation(mut self, explanation: impl Into<String>) -> Self {
        self.explanation = explanation.into();
        self
    }

    /// Sets the suggested command.
    #[must_use]
    pub fn with_suggested_command(mut self, command: impl Into<String>) -> Self {
        self.suggested_command = command.into();
        self
    }

    /// First non-empty string parameter among `keys`.
    ///
    /// Numbers and booleans are rendered to text so `{"port": 8080}` still
    /// resolves.
    #[must_use]
    pub fn parameter_text(&self, keys: &[&str]) -> Option<String> {
        keys.iter().find_map(|key| match self.parameters.get(*key)? {
            Value::String(text) if !text.trim().is_empty() => Some(text.trim().to_string()),
            Value::Number(number) => Some(number.to_string()),
            Value::Bool(flag) => Some(flag.to_string()),
            _ => None,
        })
    }
}

/// Clamps a raw confidence into [0, 1]; non-finite input maps to the default.
#[must_use]
#[allow(clippy::cast_possible_truncation)]
pub fn clamp_confidence(raw: f64) -> f32 {
    if raw.is_finite() {
        raw.clamp(0.0, 1.0) as f32
    } else {
        DEFAULT_CONFIDENCE
    }
}

/// Optional caller and session hints embedded into the provider prompt.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InterpretationContext {
    /// Caller identity, used for prompts and diagnostic attribution.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub caller: Option<String>,
    /// Free-form session hints.
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub hints: IndexMap<String, String>,
}

impl InterpretationContext {
    /// Context carrying only the caller.
    #[must_use]
    pub fn for_caller(caller: impl Into<String>) -> Self {
        Self {
            caller: Some(caller.into()),
            hints: IndexMap::new(),
        }
    }

    /// Adds a session hint.
    #[must_use]
    pub fn with_hint(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.hints.insert(key.into(), value.into());
        self
    }

    /// Whether there is anything worth sending.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.caller.is_none() && self.hints.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn intent_aliases_resolve_to_canonical_labels() {
        assert_eq!(Intent::parse("powershell_script"), Intent::RunScript);
        assert_eq!(Intent::parse("Manage_Services"), Intent::ManageService);
        assert_eq!(Intent::parse(""), Intent::Unknown);
        assert_eq!(
            Intent::parse("docker_operations"),
            Intent::Other("docker_operations".into())
        );
    }

    #[test]
    fn intent_round_trips_through_json_as_string() {
        let json = serde_json::to_string(&Intent::InstallSoftware).unwrap();
        assert_eq!(json, "\"install_software\"");
        let back: Intent = serde_json::from_str("\"file_operations\"").unwrap();
        assert_eq!(back.label(), "file_operations");
    }

    #[test]
    fn confidence_is_clamped() {
        assert!((clamp_confidence(1.7) - 1.0).abs() < f32::EPSILON);
        assert!(clamp_confidence(-0.2).abs() < f32::EPSILON);
        assert!((clamp_confidence(f64::NAN) - DEFAULT_CONFIDENCE).abs() < f32::EPSILON);
    }

    #[test]
    fn parameter_text_skips_blank_and_renders_numbers() {
        let interp = Interpretation::new(Intent::ManageService, SafetyLevel::Caution)
            .with_parameter("service", "  ")
            .with_parameter("service_name", "Spooler")
            .with_parameter("port", 8080);
        assert_eq!(
            interp.parameter_text(&["service", "service_name"]).as_deref(),
            Some("Spooler")
        );
        assert_eq!(interp.parameter_text(&["port"]).as_deref(), Some("8080"));
        assert!(interp.parameter_text(&["missing"]).is_none());
    }
}
