use crate::config::{CONFIG_FILE_NAME, default_config_toml};
use anyhow::{Context, Result};
use std::fs;
use std::path::{Path, PathBuf};

pub const HOOK_NAME: &str = "commit-msg";
const HOOK_MARKER: &str = "# Installed by commit-tasklog";
const HOOK_CONTENT: &str = "#!/bin/sh
# Installed by commit-tasklog
exec commit-tasklog \"$1\"
";

/// What `install_hook` did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallReport {
    pub hook_path: PathBuf,
    pub backup_path: Option<PathBuf>,
    pub config_path: PathBuf,
    pub config_written: bool,
}

/// Install the commit-msg hook that opens the task dialog.
///
/// An existing hook is backed up to `commit-msg.backup`. A default config
/// file is written to the repository root unless one exists and `force` is
/// not set.
pub fn install_hook(repo_root: &Path, hooks_dir: &Path, force: bool) -> Result<InstallReport> {
    let hook_path = hooks_dir.join(HOOK_NAME);
    let backup = hooks_dir.join(format!("{}.backup", HOOK_NAME));

    fs::create_dir_all(hooks_dir).context("Failed to create hooks directory")?;

    let mut backup_path = None;
    if hook_path.exists() {
        let existing = fs::read_to_string(&hook_path).unwrap_or_default();
        if !existing.contains(HOOK_MARKER) {
            fs::copy(&hook_path, &backup).context("Failed to backup existing commit-msg hook")?;
            backup_path = Some(backup);
        }
    }

    fs::write(&hook_path, HOOK_CONTENT).context("Failed to write commit-msg hook")?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let mut perms = fs::metadata(&hook_path)?.permissions();
        perms.set_mode(0o755);
        fs::set_permissions(&hook_path, perms).context("Failed to make hook executable")?;
    }

    let config_path = repo_root.join(CONFIG_FILE_NAME);
    let config_written = force || !config_path.exists();
    if config_written {
        fs::write(&config_path, default_config_toml())
            .with_context(|| format!("Failed to write {}", config_path.display()))?;
    }

    Ok(InstallReport {
        hook_path,
        backup_path,
        config_path,
        config_written,
    })
}

/// Remove the commit-msg hook if it was installed by commit-tasklog.
///
/// Returns whether a hook was removed. A backed-up hook is restored.
pub fn uninstall_hook(hooks_dir: &Path) -> Result<bool> {
    let hook_path = hooks_dir.join(HOOK_NAME);
    if !hook_path.exists() {
        return Ok(false);
    }

    let content = fs::read_to_string(&hook_path).context("Failed to read commit-msg hook")?;
    if !content.contains(HOOK_MARKER) {
        return Ok(false);
    }

    fs::remove_file(&hook_path).context("Failed to remove commit-msg hook")?;

    let backup = hooks_dir.join(format!("{}.backup", HOOK_NAME));
    if backup.exists() {
        fs::rename(&backup, &hook_path).context("Failed to restore backed-up hook")?;
    }
    Ok(true)
}
