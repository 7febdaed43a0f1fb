use anyhow::{Context, Result};
use std::path::Path;
use std::process::ExitCode;

use commit_tasklog::cli::{self, Commands};
use commit_tasklog::config::{self, Config, ConfigLoad};
use commit_tasklog::dialog::AppContext;
use commit_tasklog::git;
use commit_tasklog::hook::{self, HookExit};
use commit_tasklog::install::{install_hook, uninstall_hook};
use commit_tasklog::logging;
use commit_tasklog::remote::{TaskStore, WebhookClient};
use commit_tasklog::tui::run_dialog;
use commit_tasklog::format_hours;

fn main() -> ExitCode {
    match run() {
        Ok(exit) => exit.into(),
        Err(err) => {
            // Anything unexpected aborts the commit rather than letting it
            // through unlogged.
            eprintln!("✗ commit-tasklog: {err:#}");
            ExitCode::FAILURE
        }
    }
}

fn run() -> Result<HookExit> {
    let args = cli::parse_args();
    let repo_root = git::find_repo_root(None).ok();
    let load = config::load_with_fallback(repo_root.as_deref());

    if let Err(err) = logging::setup(load.config.log_file.as_deref()) {
        eprintln!("⚠ Logging disabled: {err:#}");
    }
    if let Some(err) = &load.error {
        tracing::warn!(error = %err, "falling back to default configuration");
    }
    if load.config.has_placeholder_url() {
        tracing::warn!("webhook_url is not configured; task list will be unavailable");
    }

    match args.command {
        None => match args.message_file {
            Some(path) => handle_hook(&path, load.config),
            None => {
                let ctx = app_context(load.config);
                hook::preview(ctx, run_dialog)
            }
        },
        Some(Commands::Install { force }) => {
            let repo_root = repo_root.context("Not in a git repository")?;
            handle_install(&repo_root, force)
        }
        Some(Commands::Uninstall) => {
            let repo_root = repo_root.context("Not in a git repository")?;
            let hooks_dir = git::hooks_dir(&repo_root)?;
            if uninstall_hook(&hooks_dir)? {
                println!("✓ commit-msg hook removed");
            } else {
                println!("No commit-tasklog hook installed");
            }
            Ok(HookExit::Proceed)
        }
        Some(Commands::Tasks) => {
            handle_tasks(&load.config);
            Ok(HookExit::Proceed)
        }
        Some(Commands::Config) => {
            handle_config(&load)?;
            Ok(HookExit::Proceed)
        }
    }
}

fn app_context(config: Config) -> AppContext {
    let store = WebhookClient::from_config(&config);
    AppContext {
        config,
        store: Box::new(store),
        branch: git::branch_or_placeholder(None),
    }
}

/// Handle a hook invocation for the given commit message file.
fn handle_hook(message_file: &Path, config: Config) -> Result<HookExit> {
    let ctx = app_context(config);
    hook::run(message_file, ctx, run_dialog)
}

fn handle_install(repo_root: &Path, force: bool) -> Result<HookExit> {
    let hooks_dir = git::hooks_dir(repo_root)?;
    let report = install_hook(repo_root, &hooks_dir, force)?;

    if let Some(backup) = &report.backup_path {
        println!("⚠ Existing hook backed up to {}", backup.display());
    }
    println!("✓ Hook installed at {}", report.hook_path.display());
    if report.config_written {
        println!("✓ Config written to {}", report.config_path.display());
        println!("  Set webhook_url in that file before your next commit.");
    } else {
        println!(
            "  Keeping existing config at {} (use --force to overwrite)",
            report.config_path.display()
        );
    }
    Ok(HookExit::Proceed)
}

/// Print the remote task list. Failure is reported but not an error.
fn handle_tasks(config: &Config) {
    let client = WebhookClient::from_config(config);
    match client.get_tasks() {
        Ok(tasks) if tasks.is_empty() => println!("No tasks yet"),
        Ok(tasks) => {
            for task in tasks {
                let time = task
                    .time
                    .map(|t| format!("{} hrs", format_hours(t)))
                    .unwrap_or_else(|| "-".to_string());
                let status = task.status.unwrap_or_default();
                println!("{:40} {:>10}  {}", task.name, time, status);
            }
        }
        Err(err) => {
            eprintln!("⚠ Could not load tasks from {}: {}", client.url(), err);
        }
    }
}

fn handle_config(load: &ConfigLoad) -> Result<()> {
    match &load.source {
        Some(path) => println!("# loaded from {}", path.display()),
        None => println!("# defaults (no config file found)"),
    }
    if let Some(err) = &load.error {
        println!("# error: {}", err);
    }
    let body = toml::to_string_pretty(&load.config).context("Failed to render configuration")?;
    print!("{}", body);
    Ok(())
}
