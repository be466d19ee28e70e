use std::{path::PathBuf, process::ExitCode};

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use hostgate_actions::prelude::*;
use serde_json::json;
use tokio::runtime::Runtime;
use tracing::{debug, warn};
use tracing_subscriber::EnvFilter;

const SECRET_ENV: &str = "HOSTGATE_SECRET";

#[derive(Parser, Debug)]
#[command(name = "hostgate", version, about = "Safety-gated host command runner")]
struct Cli {
    /// Gate configuration file.
    #[arg(long, global = true, default_value = "hostgate.toml")]
    config: PathBuf,
    /// Caller identity.
    #[arg(long, global = true, default_value = "local")]
    caller: String,
    /// Caller secret; falls back to HOSTGATE_SECRET.
    #[arg(long, global = true)]
    secret: Option<String>,
    /// Confirms privileged or dangerous actions up front.
    #[arg(long, visible_alias = "confirm", global = true)]
    yes: bool,
    /// Prints results as JSON.
    #[arg(long, global = true)]
    json: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Interprets a natural-language command and runs it through the gate.
    Ask {
        #[arg(required = true, trailing_var_arg = true)]
        text: Vec<String>,
    },
    /// Interprets and classifies a command without executing anything.
    Interpret {
        #[arg(required = true, trailing_var_arg = true)]
        text: Vec<String>,
    },
    /// Runs a shell script.
    Script {
        script: String,
        /// Timeout in seconds, capped by policy.
        #[arg(long)]
        timeout: Option<u64>,
        /// Skips the denylist confirmation requirement.
        #[arg(long)]
        no_confirmation_check: bool,
    },
    /// Installs a package.
    Install {
        package: String,
        #[arg(long, default_value = "chocolatey")]
        manager: String,
    },
    /// Removes a package.
    Uninstall {
        package: String,
        #[arg(long, default_value = "chocolatey")]
        manager: String,
    },
    /// Starts, stops, restarts or queries a service.
    Service { name: String, action: String },
    /// Prints a host snapshot.
    Info,
    /// Lists installed packages.
    Packages {
        #[arg(long, default_value = "chocolatey")]
        manager: String,
    },
}

fn main() -> Result<ExitCode> {
    let cli = Cli::parse();
    let config = GateConfig::load_or_default(Some(cli.config.as_path()))?;
    init_tracing(&config.log_level)?;
    debug!(config = %cli.config.display(), users = config.users.len(), "configuration loaded");

    let caller = resolve_caller(&cli, &config)?;
    let runtime = Runtime::new().context("starting async runtime")?;
    runtime.block_on(async {
        let gate = GateCommander::from_config(&config)?.build()?;
        tokio::select! {
            outcome = run(&cli, &gate, caller) => outcome,
            signal = tokio::signal::ctrl_c() => {
                signal.context("listening for ctrl-c")?;
                // dropping `run` drops the child handle, which kills the process
                warn!("interrupted, cancelling request");
                Ok(ExitCode::from(130))
            }
        }
    })
}

fn init_tracing(level: &str) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .context("invalid log filter")?;
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|err| anyhow::anyhow!(err))
}

/// Authenticates against `[[users]]`; without configured users the local
/// operator gets full permissions.
fn resolve_caller(cli: &Cli, config: &GateConfig) -> Result<CallerIdentity> {
    if config.users.is_empty() {
        return Ok(CallerIdentity::new(cli.caller.clone(), [Permission::Admin]));
    }
    let secret = cli
        .secret
        .clone()
        .or_else(|| std::env::var(SECRET_ENV).ok())
        .with_context(|| format!("--secret or {SECRET_ENV} is required when users are configured"))?;
    let directory = StaticUserDirectory::from_config(&config.users);
    match directory.authenticate(&cli.caller, &secret) {
        Some(identity) => Ok(identity),
        None => bail!("authentication failed for {}", cli.caller),
    }
}

fn target_for(command: &Commands) -> Option<ActionTarget> {
    Some(match command {
        Commands::Script {
            script,
            no_confirmation_check,
            ..
        } => ActionTarget::RunScript {
            script: script.clone(),
            require_confirmation: !no_confirmation_check,
        },
        Commands::Install { package, manager } => ActionTarget::InstallPackage {
            package: package.clone(),
            manager: manager.clone(),
        },
        Commands::Uninstall { package, manager } => ActionTarget::UninstallPackage {
            package: package.clone(),
            manager: manager.clone(),
        },
        Commands::Service { name, action } => ActionTarget::ServiceAction {
            service: name.clone(),
            action: action.clone(),
        },
        Commands::Info => ActionTarget::QueryInfo,
        Commands::Packages { manager } => ActionTarget::ListPackages {
            manager: manager.clone(),
        },
        Commands::Ask { .. } | Commands::Interpret { .. } => return None,
    })
}

async fn run(cli: &Cli, gate: &GateCommander, caller: CallerIdentity) -> Result<ExitCode> {
    match &cli.command {
        Commands::Ask { text } => {
            let reply = gate.handle_text(&caller, &text.join(" "), cli.yes).await;
            if cli.json {
                println!("{}", serde_json::to_string_pretty(&reply)?);
            } else {
                println!("{}", reply.message);
                if let Some(result) = &reply.result {
                    print_result(result);
                }
            }
            let failed = reply.result.as_ref().is_some_and(|result| !result.success);
            Ok(ExitCode::from(exit_status(failed, reply.awaiting_confirmation())))
        }
        Commands::Interpret { text } => {
            let classified = gate.interpret(&caller, &text.join(" ")).await;
            let interpretation = &classified.interpretation;
            if cli.json {
                let doc = json!({
                    "interpretation": interpretation,
                    "verdict": classified.verdict,
                });
                println!("{}", serde_json::to_string_pretty(&doc)?);
            } else {
                println!(
                    "intent: {}\nsafety: {}\nconfidence: {:.2}\nrequires confirmation: {}\nexplanation: {}",
                    interpretation.intent,
                    interpretation.safety_level,
                    interpretation.confidence,
                    interpretation.requires_confirmation,
                    interpretation.explanation,
                );
                if !interpretation.suggested_command.is_empty() {
                    println!("suggested command: {}", interpretation.suggested_command);
                }
            }
            Ok(ExitCode::SUCCESS)
        }
        command => {
            let Some(target) = target_for(command) else {
                bail!("unsupported command");
            };
            let mut request = ExecutionRequest::builder(caller, target).confirmed(cli.yes);
            if let Commands::Script {
                timeout: Some(secs),
                ..
            } = command
            {
                request = request.timeout_secs(*secs);
            }
            let result = gate.execute(request.build()).await;
            if cli.json {
                println!("{}", serde_json::to_string_pretty(&result)?);
            } else {
                print_result(&result);
                if result.requires_confirmation {
                    eprintln!("re-run with --yes to confirm");
                }
            }
            Ok(ExitCode::from(exit_status(!result.success, result.requires_confirmation)))
        }
    }
}

fn print_result(result: &ExecutionResult) {
    if !result.output.is_empty() {
        print!("{}", result.output);
        if !result.output.ends_with('\n') {
            println!();
        }
    }
    if result.error.trim().is_empty() {
        return;
    }
    if result.success {
        eprintln!("{}", result.error.trim_end());
    } else {
        eprintln!("error: {}", result.error.trim_end());
    }
}

// 2 means nothing ran because confirmation is missing
const fn exit_status(failed: bool, awaiting_confirmation: bool) -> u8 {
    match (failed, awaiting_confirmation) {
        (_, true) => 2,
        (true, false) => 1,
        (false, false) => 0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_global_flags_after_subcommand() {
        let cli = Cli::try_parse_from([
            "hostgate", "service", "Spooler", "restart", "--yes", "--caller", "ops",
        ])
        .unwrap();
        assert!(cli.yes);
        assert_eq!(cli.caller, "ops");
        assert_eq!(
            target_for(&cli.command),
            Some(ActionTarget::ServiceAction {
                service: "Spooler".into(),
                action: "restart".into()
            })
        );
    }

    #[test]
    fn ask_collects_free_text() {
        let cli = Cli::try_parse_from(["hostgate", "ask", "install", "notepad++"]).unwrap();
        match cli.command {
            Commands::Ask { text } => assert_eq!(text.join(" "), "install notepad++"),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn script_requires_confirmation_by_default() {
        let cli = Cli::try_parse_from(["hostgate", "script", "Get-Date", "--timeout", "30"]).unwrap();
        assert_eq!(
            target_for(&cli.command),
            Some(ActionTarget::RunScript {
                script: "Get-Date".into(),
                require_confirmation: true
            })
        );
    }

    #[test]
    fn local_operator_without_users() {
        let cli = Cli::try_parse_from(["hostgate", "info"]).unwrap();
        let caller = resolve_caller(&cli, &GateConfig::default()).unwrap();
        assert!(caller.has(Permission::Execute));
    }

    #[test]
    fn configured_users_must_authenticate() {
        let config = GateConfig::from_toml(
            "[[users]]\nid = \"ops\"\nsecret = \"s3cret\"\npermissions = [\"execute\"]\n",
        )
        .unwrap();
        let ok = Cli::try_parse_from(["hostgate", "info", "--caller", "ops", "--secret", "s3cret"]).unwrap();
        assert_eq!(resolve_caller(&ok, &config).unwrap().id, "ops");
        let bad = Cli::try_parse_from(["hostgate", "info", "--caller", "ops", "--secret", "nope"]).unwrap();
        assert!(resolve_caller(&bad, &config).is_err());
    }

    #[test]
    fn confirmation_wins_exit_code() {
        assert_eq!(exit_status(true, true), 2);
        assert_eq!(exit_status(true, false), 1);
        assert_eq!(exit_status(false, false), 0);
    }
}
