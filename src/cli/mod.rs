use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    name = "commit-tasklog",
    about = "Log commits against tasks in a spreadsheet-backed webhook"
)]
pub struct Cli {
    /// Commit message file passed by the git hook. Without it the dialog
    /// runs in preview mode and nothing is written.
    pub message_file: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Install the commit-msg hook and a default config file.
    Install {
        /// Overwrite an existing config file.
        #[arg(short, long)]
        force: bool,
    },
    /// Remove the commit-msg hook (restoring any backed-up hook).
    Uninstall,
    /// Print the tasks known to the webhook.
    Tasks,
    /// Print the resolved configuration.
    Config,
}

/// Parse CLI arguments.
pub fn parse_args() -> Cli {
    Cli::parse()
}
