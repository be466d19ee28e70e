use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::{
    actions::{ActionError, ActionKind, ExecutionResult, PackageManager, ResultDetail, ValidatedAction},
    agents::{launch_to_result, ActionExecutor, ExecutionContext},
    launcher::{CommandSpec, ProcessLauncher},
};

/// Entry of an installed-package listing.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct InstalledPackage {
    /// Display name.
    pub name: String,
    /// Installed version.
    pub version: String,
    /// Manager-specific identifier, when the listing has one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
}

/// Manager arguments for installing (`install = true`) or removing a package.
#[must_use]
pub fn change_args(manager: PackageManager, package: &str, install: bool) -> Vec<String> {
    let verb = if install { "install" } else { "uninstall" };
    let mut args = vec![verb.to_string(), package.to_string()];
    match manager {
        PackageManager::Chocolatey => args.push("-y".into()),
        PackageManager::Winget if install => {
            args.push("--accept-package-agreements".into());
            args.push("--accept-source-agreements".into());
        }
        PackageManager::Winget => {}
    }
    args
}

/// Manager arguments for listing installed packages.
#[must_use]
pub fn list_args(manager: PackageManager) -> Vec<String> {
    match manager {
        PackageManager::Chocolatey => vec!["list".into(), "--local-only".into()],
        PackageManager::Winget => vec!["list".into(), "--accept-source-agreements".into()],
    }
}

/// Parses `choco list --local-only` output, one `name version` per line.
#[must_use]
pub fn parse_chocolatey_list(output: &str) -> Vec<InstalledPackage> {
    output
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with("Chocolatey"))
        .filter(|line| !is_chocolatey_summary(line))
        .filter_map(|line| {
            let (name, version) = line.split_once(' ')?;
            let version = version.trim();
            (!version.is_empty()).then(|| InstalledPackage {
                name: name.to_string(),
                version: version.to_string(),
                id: None,
            })
        })
        .collect()
}

fn is_chocolatey_summary(line: &str) -> bool {
    let mut words = line.split_whitespace();
    matches!(
        (words.next(), words.next()),
        (Some(count), Some(noun))
            if count.chars().all(|c| c.is_ascii_digit()) && noun.starts_with("package")
    )
}

/// Parses `winget list` output.
///
/// Rows are cut at the character offsets of the `Id` and `Version` headers,
/// so names containing spaces survive. When the header carries no such
/// labels (localized winget), rows fall back to whitespace columns: with
/// three or more the second is the id and the third the version, with two
/// the second is the version.
#[must_use]
pub fn parse_winget_list(output: &str) -> Vec<InstalledPackage> {
    let lines: Vec<&str> = output.lines().collect();
    let separator = lines
        .iter()
        .position(|line| line.trim_start().starts_with("---"));
    let (header, rows) = match separator {
        Some(idx) if idx > 0 => (Some(lines[idx - 1]), &lines[idx + 1..]),
        _ => (None, lines.get(2..).unwrap_or_default()),
    };
    let layout = header.and_then(WingetLayout::from_header);
    rows.iter()
        .filter(|line| !line.trim().is_empty())
        .filter_map(|line| match &layout {
            Some(layout) => layout.parse_row(line),
            None => parse_winget_columns(line),
        })
        .collect()
}

/// Character offsets of the winget list columns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct WingetLayout {
    id: usize,
    version: usize,
    version_end: Option<usize>,
}

impl WingetLayout {
    fn from_header(header: &str) -> Option<Self> {
        let columns = header_columns(header);
        let position = |label: &str| columns.iter().position(|(_, word)| *word == label);
        let id_idx = position("Id")?;
        let version_idx = position("Version")?;
        if version_idx <= id_idx {
            return None;
        }
        Some(Self {
            id: columns[id_idx].0,
            version: columns[version_idx].0,
            version_end: columns.get(version_idx + 1).map(|(offset, _)| *offset),
        })
    }

    fn parse_row(&self, row: &str) -> Option<InstalledPackage> {
        let chars: Vec<char> = row.chars().collect();
        let cell = |start: usize, end: Option<usize>| -> String {
            let end = end.unwrap_or(chars.len()).min(chars.len());
            chars
                .get(start..end)
                .map(|cell| cell.iter().collect::<String>().trim().to_string())
                .unwrap_or_default()
        };
        let name = cell(0, Some(self.id));
        let id = cell(self.id, Some(self.version));
        let version = cell(self.version, self.version_end);
        if name.is_empty() || version.is_empty() {
            return None;
        }
        Some(InstalledPackage {
            name,
            version,
            id: (!id.is_empty()).then_some(id),
        })
    }
}

// (char offset, label) of every header word
fn header_columns(header: &str) -> Vec<(usize, &str)> {
    let mut columns = Vec::new();
    let mut in_word = false;
    for (offset, (byte, ch)) in header.char_indices().enumerate() {
        if ch.is_whitespace() {
            in_word = false;
        } else if !in_word {
            in_word = true;
            let word = header[byte..].split_whitespace().next().unwrap_or_default();
            columns.push((offset, word));
        }
    }
    columns
}

fn parse_winget_columns(line: &str) -> Option<InstalledPackage> {
    let columns: Vec<&str> = line.split_whitespace().collect();
    match columns.as_slice() {
        [name, id, version, ..] => Some(InstalledPackage {
            name: (*name).to_string(),
            version: (*version).to_string(),
            id: Some((*id).to_string()),
        }),
        [name, version] => Some(InstalledPackage {
            name: (*name).to_string(),
            version: (*version).to_string(),
            id: None,
        }),
        _ => None,
    }
}

/// Dispatches to the manager-specific parser.
#[must_use]
pub fn parse_installed(manager: PackageManager, output: &str) -> Vec<InstalledPackage> {
    match manager {
        PackageManager::Chocolatey => parse_chocolatey_list(output),
        PackageManager::Winget => parse_winget_list(output),
    }
}

fn manager_command(ctx: &ExecutionContext, manager: PackageManager, args: Vec<String>) -> CommandSpec {
    CommandSpec::new(ctx.policy.manager_path(manager), args, ctx.timeout)
}

/// Installs, removes and lists packages through chocolatey or winget.
pub struct PackageExecutor {
    launcher: Arc<dyn ProcessLauncher>,
}

impl PackageExecutor {
    /// Creates the executor.
    #[must_use]
    pub fn new(launcher: Arc<dyn ProcessLauncher>) -> Self {
        Self { launcher }
    }

    async fn change(
        &self,
        package: &str,
        manager: PackageManager,
        install: bool,
        ctx: &ExecutionContext,
    ) -> ExecutionResult {
        let spec = manager_command(ctx, manager, change_args(manager, package, install));
        let detail = ResultDetail::PackageChange {
            package: package.to_string(),
            manager,
            install,
        };
        launch_to_result(self.launcher.as_ref(), ctx.request_id, spec, detail).await
    }

    async fn list(&self, manager: PackageManager, ctx: &ExecutionContext) -> ExecutionResult {
        let spec = manager_command(ctx, manager, list_args(manager));
        let mut result = launch_to_result(
            self.launcher.as_ref(),
            ctx.request_id,
            spec,
            ResultDetail::PackageList {
                manager,
                packages: Vec::new(),
            },
        )
        .await;
        if result.success {
            let packages = parse_installed(manager, &result.output);
            debug!(%manager, count = packages.len(), "parsed package listing");
            result.detail = ResultDetail::PackageList { manager, packages };
        }
        result
    }
}

#[async_trait]
impl ActionExecutor for PackageExecutor {
    fn kinds(&self) -> &'static [ActionKind] {
        &[
            ActionKind::InstallPackage,
            ActionKind::UninstallPackage,
            ActionKind::ListPackages,
        ]
    }

    fn name(&self) -> &str {
        "packages"
    }

    async fn execute(&self, action: &ValidatedAction, ctx: &ExecutionContext) -> ExecutionResult {
        match action {
            ValidatedAction::InstallPackage { package, manager } => {
                self.change(package, *manager, true, ctx).await
            }
            ValidatedAction::UninstallPackage { package, manager } => {
                self.change(package, *manager, false, ctx).await
            }
            ValidatedAction::ListPackages { manager } => self.list(*manager, ctx).await,
            other => ExecutionResult::rejected(ctx.request_id, &ActionError::NoExecutor(other.kind())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn change_args_follow_manager_conventions() {
        assert_eq!(
            change_args(PackageManager::Chocolatey, "git", true),
            vec!["install", "git", "-y"]
        );
        assert_eq!(
            change_args(PackageManager::Chocolatey, "git", false),
            vec!["uninstall", "git", "-y"]
        );
        assert_eq!(
            change_args(PackageManager::Winget, "Git.Git", true),
            vec![
                "install",
                "Git.Git",
                "--accept-package-agreements",
                "--accept-source-agreements"
            ]
        );
        assert_eq!(
            change_args(PackageManager::Winget, "Git.Git", false),
            vec!["uninstall", "Git.Git"]
        );
    }

    #[test]
    fn chocolatey_listing_skips_banner_and_summary() {
        let output = "Chocolatey v1.4.0\n7zip 23.1.0\ngit 2.43.0\nbroken\n\n2 packages installed.\n";
        let packages = parse_chocolatey_list(output);
        assert_eq!(
            packages,
            vec![
                InstalledPackage {
                    name: "7zip".into(),
                    version: "23.1.0".into(),
                    id: None
                },
                InstalledPackage {
                    name: "git".into(),
                    version: "2.43.0".into(),
                    id: None
                },
            ]
        );
    }

    #[test]
    fn winget_listing_uses_header_offsets() {
        let output = "\
Name                         Id                          Version        Available  Source
-----------------------------------------------------------------------------------------
Microsoft Edge               Microsoft.Edge              120.0.2210.91             winget
Git                          Git.Git                     2.43.0         2.44.0     winget
Visual C++ 2015 Redist       {0D3E9E15-DE7A-300B}        14.0.24215
";
        let packages = parse_winget_list(output);
        assert_eq!(packages.len(), 3);
        assert_eq!(
            packages[0],
            InstalledPackage {
                name: "Microsoft Edge".into(),
                version: "120.0.2210.91".into(),
                id: Some("Microsoft.Edge".into()),
            }
        );
        assert_eq!(packages[1].version, "2.43.0");
        assert_eq!(packages[2].name, "Visual C++ 2015 Redist");
        assert_eq!(packages[2].id.as_deref(), Some("{0D3E9E15-DE7A-300B}"));
        assert_eq!(packages[2].version, "14.0.24215");
    }

    #[test]
    fn winget_listing_skips_progress_noise_before_header() {
        let output = "   - \\ |\r\nName  Id       Version\n---------------------\nGit   Git.Git  2.43.0\n";
        let packages = parse_winget_list(output);
        assert_eq!(packages.len(), 1);
        assert_eq!(packages[0].id.as_deref(), Some("Git.Git"));
    }

    #[test]
    fn unlabeled_winget_header_falls_back_to_columns() {
        let output = "Nom    Identifiant   Version\n------------------------------\nGit    Git.Git   2.43.0   winget\nTool   1.0\nlonely\n";
        let packages = parse_winget_list(output);
        assert_eq!(packages.len(), 2);
        assert_eq!(packages[0].name, "Git");
        assert_eq!(packages[0].id.as_deref(), Some("Git.Git"));
        assert_eq!(packages[0].version, "2.43.0");
        assert_eq!(packages[1].version, "1.0");
        assert_eq!(packages[1].id, None);
    }

    #[test]
    fn list_args_per_manager() {
        assert_eq!(list_args(PackageManager::Chocolatey), vec!["list", "--local-only"]);
        assert_eq!(
            list_args(PackageManager::Winget),
            vec!["list", "--accept-source-agreements"]
        );
    }
}
