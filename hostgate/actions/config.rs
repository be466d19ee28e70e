use std::{
    env, fs,
    path::{Path, PathBuf},
    sync::Arc,
    time::Duration,
};

use anyhow::{bail, Context, Result};
use hostgate_nlp::{
    interpretation::SafetyLevel,
    provider::{ChatCompletionsProvider, InterpretationProvider, ProviderSettings},
    retry::{RetryPolicy, RetryScope},
};
use serde::Deserialize;

use crate::{
    actions::PackageManager, identity::Permission, security::DenylistAnalyzer,
};

/// Root configuration document.
#[derive(Debug, Clone, Deserialize)]
pub struct GateConfig {
    /// Safety thresholds.
    #[serde(default)]
    pub policy: PolicyConfig,
    /// Host tool locations.
    #[serde(default)]
    pub tools: ToolsConfig,
    /// Remote interpretation provider.
    #[serde(default)]
    pub provider: ProviderConfig,
    /// Audit sinks.
    #[serde(default)]
    pub audit: AuditConfig,
    /// Static user directory.
    #[serde(default)]
    pub users: Vec<UserConfig>,
    /// Diagnostic log filter, overridden by `RUST_LOG`.
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(skip)]
    source_dir: PathBuf,
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            policy: PolicyConfig::default(),
            tools: ToolsConfig::default(),
            provider: ProviderConfig::default(),
            audit: AuditConfig::default(),
            users: Vec::new(),
            log_level: default_log_level(),
            source_dir: PathBuf::from("."),
        }
    }
}

impl GateConfig {
    /// Loads configuration from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = fs::read_to_string(path)
            .with_context(|| format!("reading gate config {}", path.display()))?;
        let mut config = Self::from_toml(&raw).with_context(|| format!("parsing {}", path.display()))?;
        config.source_dir = path
            .parent()
            .filter(|dir| !dir.as_os_str().is_empty())
            .map_or_else(|| PathBuf::from("."), Path::to_path_buf);
        Ok(config)
    }

    /// Loads `path` when it exists, otherwise returns the defaults.
    pub fn load_or_default(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) if path.exists() => Self::load(path),
            _ => Ok(Self::default()),
        }
    }

    /// Parses and validates a TOML document.
    pub fn from_toml(raw: &str) -> Result<Self> {
        let config: Self = toml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Rejects settings the gate cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.policy.max_command_timeout_secs == 0 {
            bail!("policy.max_command_timeout_secs must be greater than zero");
        }
        if self.tools.shell.trim().is_empty() {
            bail!("tools.shell must not be empty");
        }
        if self.provider.retry_attempts == 0 {
            bail!("provider.retry_attempts must be at least 1");
        }
        DenylistAnalyzer::new(&self.policy.denylist).context("invalid policy.denylist")?;
        for user in &self.users {
            if user.id.trim().is_empty() {
                bail!("users entries need a non-empty id");
            }
        }
        Ok(())
    }

    /// Resolves a path relative to the configuration file.
    #[must_use]
    pub fn resolve_path(&self, candidate: impl AsRef<Path>) -> PathBuf {
        let candidate = candidate.as_ref();
        if candidate.is_absolute() {
            candidate.to_path_buf()
        } else {
            self.source_dir.join(candidate)
        }
    }

    /// Audit directory, resolved against the configuration file.
    #[must_use]
    pub fn audit_dir(&self) -> PathBuf {
        self.resolve_path(&self.audit.dir)
    }

    /// Event log path, resolved against the configuration file.
    #[must_use]
    pub fn event_log(&self) -> Option<PathBuf> {
        self.audit.event_log.as_ref().map(|path| self.resolve_path(path))
    }

    /// Read-only policy shared by the classifier and executors.
    #[must_use]
    pub fn safety_policy(&self) -> SafetyPolicy {
        SafetyPolicy {
            denylist: self.policy.denylist.clone(),
            confirm_tiers: self.policy.confirm_tiers.clone(),
            require_confirmation_for_privileged: self.policy.require_confirmation_for_privileged,
            max_command_timeout: Duration::from_secs(self.policy.max_command_timeout_secs),
            execution_policy: self.policy.execution_policy.clone(),
            shell: self.tools.shell.clone(),
            chocolatey_path: self.tools.chocolatey_path.clone(),
            winget_path: self.tools.winget_path.clone(),
            audit_excerpt_chars: self.policy.audit_excerpt_chars,
            cpu_sample: Duration::from_millis(self.tools.cpu_sample_ms),
        }
    }
}

/// `[policy]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct PolicyConfig {
    /// Case-insensitive regex patterns that make a script dangerous.
    #[serde(default = "default_denylist")]
    pub denylist: Vec<String>,
    /// Master switch for confirmation gating.
    #[serde(default = "default_true")]
    pub require_confirmation_for_privileged: bool,
    /// Tiers that need explicit confirmation.
    #[serde(default = "default_confirm_tiers")]
    pub confirm_tiers: Vec<SafetyLevel>,
    /// Upper bound for any subprocess.
    #[serde(default = "default_max_timeout")]
    pub max_command_timeout_secs: u64,
    /// Value passed to `-ExecutionPolicy`.
    #[serde(default = "default_execution_policy")]
    pub execution_policy: String,
    /// Characters of output kept in audit records.
    #[serde(default = "default_excerpt_chars")]
    pub audit_excerpt_chars: usize,
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            denylist: default_denylist(),
            require_confirmation_for_privileged: true,
            confirm_tiers: default_confirm_tiers(),
            max_command_timeout_secs: default_max_timeout(),
            execution_policy: default_execution_policy(),
            audit_excerpt_chars: default_excerpt_chars(),
        }
    }
}

/// `[tools]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct ToolsConfig {
    /// Shell executable.
    #[serde(default = "default_shell")]
    pub shell: String,
    /// Chocolatey executable.
    #[serde(default = "default_chocolatey_path")]
    pub chocolatey_path: String,
    /// Winget executable.
    #[serde(default = "default_winget_path")]
    pub winget_path: String,
    /// CPU utilisation sampling window in milliseconds.
    #[serde(default = "default_cpu_sample_ms")]
    pub cpu_sample_ms: u64,
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            shell: default_shell(),
            chocolatey_path: default_chocolatey_path(),
            winget_path: default_winget_path(),
            cpu_sample_ms: default_cpu_sample_ms(),
        }
    }
}

/// `[provider]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct ProviderConfig {
    /// Whether to call the remote provider at all.
    #[serde(default)]
    pub enabled: bool,
    /// API root.
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// Model identifier.
    #[serde(default = "default_model")]
    pub model: String,
    /// Environment variable holding the API key.
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
    /// Per-call timeout in milliseconds.
    #[serde(default = "default_provider_timeout_ms")]
    pub timeout_ms: u64,
    /// Reply token cap.
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    /// Sampling temperature.
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    /// Attempts per provider call.
    #[serde(default = "default_retry_attempts")]
    pub retry_attempts: u32,
    /// Backoff base in milliseconds.
    #[serde(default = "default_retry_base_delay_ms")]
    pub retry_base_delay_ms: u64,
    /// Which failures are retried.
    #[serde(default)]
    pub retry_scope: RetryScope,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            base_url: default_base_url(),
            model: default_model(),
            api_key_env: default_api_key_env(),
            timeout_ms: default_provider_timeout_ms(),
            max_tokens: default_max_tokens(),
            temperature: default_temperature(),
            retry_attempts: default_retry_attempts(),
            retry_base_delay_ms: default_retry_base_delay_ms(),
            retry_scope: RetryScope::default(),
        }
    }
}

impl ProviderConfig {
    /// Retry policy for provider calls.
    #[must_use]
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            self.retry_attempts,
            Duration::from_millis(self.retry_base_delay_ms),
            self.retry_scope,
        )
    }

    /// Builds the provider when enabled; the key is read from the environment.
    pub fn build_provider(&self) -> Result<Option<Arc<dyn InterpretationProvider>>> {
        if !self.enabled {
            return Ok(None);
        }
        let api_key = env::var(&self.api_key_env)
            .ok()
            .filter(|key| !key.trim().is_empty());
        let provider = ChatCompletionsProvider::new(ProviderSettings {
            base_url: self.base_url.clone(),
            model: self.model.clone(),
            api_key,
            timeout: Duration::from_millis(self.timeout_ms),
            max_tokens: self.max_tokens,
            temperature: self.temperature,
        })
        .context("building interpretation provider")?;
        Ok(Some(Arc::new(provider)))
    }
}

/// `[audit]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct AuditConfig {
    /// Directory holding one `<stream>.jsonl` file per audit stream.
    #[serde(default = "default_audit_dir")]
    pub dir: PathBuf,
    /// Optional JSON-lines file receiving `audit.<stream>` events.
    #[serde(default)]
    pub event_log: Option<PathBuf>,
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            dir: default_audit_dir(),
            event_log: None,
        }
    }
}

/// `[[users]]` entry.
#[derive(Debug, Clone, Deserialize)]
pub struct UserConfig {
    /// Identity string.
    pub id: String,
    /// Shared secret.
    pub secret: String,
    /// Granted permissions.
    #[serde(default)]
    pub permissions: Vec<Permission>,
}

/// Read-only safety and execution policy.
#[derive(Debug, Clone)]
pub struct SafetyPolicy {
    /// Denylist patterns.
    pub denylist: Vec<String>,
    /// Tiers requiring confirmation.
    pub confirm_tiers: Vec<SafetyLevel>,
    /// Master switch for confirmation gating.
    pub require_confirmation_for_privileged: bool,
    /// Upper bound for any subprocess.
    pub max_command_timeout: Duration,
    /// Value passed to `-ExecutionPolicy`.
    pub execution_policy: String,
    /// Shell executable.
    pub shell: String,
    /// Chocolatey executable.
    pub chocolatey_path: String,
    /// Winget executable.
    pub winget_path: String,
    /// Characters of output kept in audit records.
    pub audit_excerpt_chars: usize,
    /// CPU utilisation sampling window.
    pub cpu_sample: Duration,
}

impl Default for SafetyPolicy {
    fn default() -> Self {
        GateConfig::default().safety_policy()
    }
}

impl SafetyPolicy {
    /// Whether an interpretation at `tier` must carry `requires_confirmation`.
    #[must_use]
    pub fn confirmation_required(&self, tier: SafetyLevel) -> bool {
        tier != SafetyLevel::Safe || self.confirm_tiers.contains(&tier)
    }

    /// Whether a direct request at `tier` is held back until confirmed.
    #[must_use]
    pub fn gates(&self, tier: SafetyLevel) -> bool {
        self.require_confirmation_for_privileged && self.confirm_tiers.contains(&tier)
    }

    /// `min(requested, max_command_timeout)`.
    #[must_use]
    pub fn effective_timeout(&self, requested: Option<Duration>) -> Duration {
        requested.map_or(self.max_command_timeout, |requested| {
            requested.min(self.max_command_timeout)
        })
    }

    /// Executable for `manager`.
    #[must_use]
    pub fn manager_path(&self, manager: PackageManager) -> &str {
        match manager {
            PackageManager::Chocolatey => &self.chocolatey_path,
            PackageManager::Winget => &self.winget_path,
        }
    }
}

const fn default_true() -> bool {
    true
}

fn default_log_level() -> String {
    "info".into()
}

fn default_denylist() -> Vec<String> {
    [
        "Remove-Item",
        "Delete",
        "Format-Volume",
        "Clear-Host",
        "Stop-Service",
        "Disable-Service",
        "Set-ExecutionPolicy",
        "Invoke-Expression",
        "Invoke-Command",
        "New-Object",
        "Registry",
        "HKLM:",
        "HKCU:",
    ]
    .into_iter()
    .map(str::to_string)
    .collect()
}

fn default_confirm_tiers() -> Vec<SafetyLevel> {
    vec![SafetyLevel::Caution, SafetyLevel::Dangerous]
}

const fn default_max_timeout() -> u64 {
    300
}

fn default_execution_policy() -> String {
    "RemoteSigned".into()
}

const fn default_excerpt_chars() -> usize {
    200
}

fn default_shell() -> String {
    "powershell.exe".into()
}

fn default_chocolatey_path() -> String {
    r"C:\ProgramData\chocolatey\bin\choco.exe".into()
}

fn default_winget_path() -> String {
    "winget".into()
}

const fn default_cpu_sample_ms() -> u64 {
    1_000
}

fn default_base_url() -> String {
    "https://api.openai.com/v1".into()
}

fn default_model() -> String {
    "gpt-4".into()
}

fn default_api_key_env() -> String {
    "OPENAI_API_KEY".into()
}

const fn default_provider_timeout_ms() -> u64 {
    30_000
}

const fn default_max_tokens() -> u32 {
    500
}

const fn default_temperature() -> f32 {
    0.1
}

const fn default_retry_attempts() -> u32 {
    3
}

const fn default_retry_base_delay_ms() -> u64 {
    1_000
}

fn default_audit_dir() -> PathBuf {
    PathBuf::from("audit")
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn empty_document_yields_defaults() {
        let config = GateConfig::from_toml("").unwrap();
        let policy = config.safety_policy();
        assert_eq!(policy.max_command_timeout, Duration::from_secs(300));
        assert_eq!(policy.execution_policy, "RemoteSigned");
        assert_eq!(policy.audit_excerpt_chars, 200);
        assert_eq!(policy.denylist.len(), 13);
        assert!(policy.require_confirmation_for_privileged);
        assert_eq!(config.provider.retry_attempts, 3);
        assert_eq!(config.provider.retry_scope, RetryScope::Transient);
        assert!(!config.provider.enabled);
    }

    #[test]
    fn parses_sections_and_users() {
        let config = GateConfig::from_toml(
            r#"
log_level = "debug"

[policy]
max_command_timeout_secs = 60
confirm_tiers = ["dangerous"]

[tools]
shell = "pwsh"

[provider]
retry_scope = "any"
retry_base_delay_ms = 250

[[users]]
id = "ops"
secret = "s3cret"
permissions = ["read", "execute"]
"#,
        )
        .unwrap();
        assert_eq!(config.log_level, "debug");
        assert_eq!(config.tools.shell, "pwsh");
        assert_eq!(config.users[0].permissions, vec![Permission::Read, Permission::Execute]);
        let retry = config.provider.retry_policy();
        assert_eq!(retry.scope(), RetryScope::Any);
        assert_eq!(retry.delay_for(1), Duration::from_millis(500));
        let policy = config.safety_policy();
        assert!(!policy.gates(SafetyLevel::Caution));
        assert!(policy.gates(SafetyLevel::Dangerous));
        // non-safe tiers always carry the confirmation flag
        assert!(policy.confirmation_required(SafetyLevel::Caution));
    }

    #[test]
    fn rejects_unusable_settings() {
        assert!(GateConfig::from_toml("[policy]\nmax_command_timeout_secs = 0").is_err());
        assert!(GateConfig::from_toml("[tools]\nshell = \" \"").is_err());
        assert!(GateConfig::from_toml("[provider]\nretry_attempts = 0").is_err());
        assert!(GateConfig::from_toml("[policy]\ndenylist = [\"(unclosed\"]").is_err());
    }

    #[test]
    fn timeout_is_capped_by_policy() {
        let policy = SafetyPolicy::default();
        assert_eq!(
            policy.effective_timeout(Some(Duration::from_secs(900))),
            Duration::from_secs(300)
        );
        assert_eq!(
            policy.effective_timeout(Some(Duration::from_secs(5))),
            Duration::from_secs(5)
        );
        assert_eq!(policy.effective_timeout(None), Duration::from_secs(300));
    }

    #[test]
    fn relative_audit_paths_follow_the_config_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("gate.toml");
        fs::write(&path, "[audit]\ndir = \"logs\"\nevent_log = \"events.jsonl\"\n").unwrap();
        let config = GateConfig::load(&path).unwrap();
        assert_eq!(config.audit_dir(), dir.path().join("logs"));
        assert_eq!(config.event_log(), Some(dir.path().join("events.jsonl")));
    }

    #[test]
    fn missing_file_falls_back_to_defaults() {
        let dir = tempdir().unwrap();
        let config = GateConfig::load_or_default(Some(&dir.path().join("absent.toml"))).unwrap();
        assert_eq!(config.tools.shell, "powershell.exe");
    }
}
