use crate::dialog::{AppContext, DialogController};
use crate::remote::TaskStore;
use crate::{Outcome, Submission, format_hours};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use thiserror::Error;
use tracing::{info, warn};

/// Commit text shown when the driver runs without a message file.
pub const PREVIEW_MESSAGE: &str = "Fixed authentication bug";

#[derive(Debug, Error)]
pub enum HookError {
    #[error("failed to read commit message {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to write commit message {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

pub type Result<T> = std::result::Result<T, HookError>;

/// What git should do with the commit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HookExit {
    Proceed,
    Abort,
}

impl HookExit {
    pub fn code(self) -> u8 {
        match self {
            HookExit::Proceed => 0,
            HookExit::Abort => 1,
        }
    }
}

impl From<HookExit> for ExitCode {
    fn from(exit: HookExit) -> Self {
        ExitCode::from(exit.code())
    }
}

pub fn read_commit_message(path: &Path) -> Result<String> {
    fs::read_to_string(path).map_err(|source| HookError::Read {
        path: path.to_path_buf(),
        source,
    })
}

/// Git's cut line; everything below it (the `-v` diff) is discarded.
const SCISSORS: &str = "------------------------ >8 ------------------------";

fn is_scissors(line: &str) -> bool {
    line.strip_prefix('#')
        .is_some_and(|rest| rest.trim() == SCISSORS)
}

/// Split a message file into the body and git's trailing comment block
/// (comment lines, the scissors line and whatever follows it).
fn split_comment_block(raw: &str) -> (&str, &str) {
    let mut offset = 0;
    let mut block_start = None;
    for line in raw.split_inclusive('\n') {
        let text = line.trim_end_matches(['\n', '\r']);
        if is_scissors(text) {
            let start = block_start.unwrap_or(offset);
            return raw.split_at(start);
        }
        if text.starts_with('#') {
            block_start.get_or_insert(offset);
        } else if !text.trim().is_empty() {
            block_start = None;
        }
        offset += line.len();
    }
    raw.split_at(block_start.unwrap_or(raw.len()))
}

/// Commit text for the dialog: the message without git's comment lines or
/// anything below the scissors line.
pub fn prefill_text(raw: &str) -> String {
    raw.lines()
        .take_while(|line| !is_scissors(line))
        .filter(|line| !line.starts_with('#'))
        .collect::<Vec<_>>()
        .join("\n")
        .trim()
        .to_string()
}

/// Append the task trailer to the message body, ahead of git's comment block.
pub fn annotate(original: &str, submission: &Submission) -> String {
    let (body, comments) = split_comment_block(original);
    let mut message = format!(
        "{}\n\nTask: {}\nTime: {}h\nStatus: {}",
        body.trim_end(),
        submission.task_name,
        format_hours(submission.time_hours),
        submission.status
    );
    if !comments.is_empty() {
        message.push('\n');
        message.push_str(comments);
    }
    message
}

/// Send the submission to the webhook once. Failure is reported, not fatal.
pub fn forward_submission(store: &dyn TaskStore, submission: &Submission) -> bool {
    match store.log_commit(submission) {
        Ok(message) => {
            info!(task = %submission.task_name, %message, "logged commit");
            println!("✓ Logged to task \"{}\"", submission.task_name);
            true
        }
        Err(err) => {
            warn!(task = %submission.task_name, error = %err, "could not log commit");
            eprintln!("⚠ Could not log commit to task manager: {}", err);
            eprintln!("  The commit will proceed; log the time manually.");
            false
        }
    }
}

/// Apply a finished dialog's outcome to the commit message file.
///
/// Only `Submitted` touches the file; `Cancelled` aborts the commit.
pub fn apply_outcome(message_file: &Path, original: &str, outcome: &Outcome) -> Result<HookExit> {
    match outcome {
        Outcome::Cancelled => Ok(HookExit::Abort),
        Outcome::Skipped => Ok(HookExit::Proceed),
        Outcome::Submitted(submission) => {
            fs::write(message_file, annotate(original, submission)).map_err(|source| {
                HookError::Write {
                    path: message_file.to_path_buf(),
                    source,
                }
            })?;
            Ok(HookExit::Proceed)
        }
    }
}

/// Run one hook invocation: read the message, show the dialog, apply the
/// result.
///
/// `run_dialog` drives the controller to an outcome; the terminal UI in
/// production, a script in tests.
pub fn run<F>(message_file: &Path, ctx: AppContext, run_dialog: F) -> anyhow::Result<HookExit>
where
    F: FnOnce(&mut DialogController) -> anyhow::Result<Outcome>,
{
    let original = read_commit_message(message_file)?;
    let mut controller = DialogController::new(ctx, prefill_text(&original));
    // Fail-soft: the dialog offers task creation instead.
    let _ = controller.load_tasks();

    let outcome = run_dialog(&mut controller)?;
    info!(?outcome, "dialog finished");

    if let Outcome::Submitted(submission) = &outcome {
        forward_submission(controller.store(), submission);
    }
    let exit = apply_outcome(message_file, &original, &outcome)?;
    match &outcome {
        Outcome::Cancelled => eprintln!("✗ Dialog cancelled - aborting commit"),
        Outcome::Skipped => println!("⏭ Skipped logging - proceeding with commit"),
        Outcome::Submitted(_) => {}
    }
    Ok(exit)
}

/// Run the dialog against a sample message and print what the hook would do.
pub fn preview<F>(ctx: AppContext, run_dialog: F) -> anyhow::Result<HookExit>
where
    F: FnOnce(&mut DialogController) -> anyhow::Result<Outcome>,
{
    let mut controller = DialogController::new(ctx, PREVIEW_MESSAGE);
    let _ = controller.load_tasks();

    let outcome = run_dialog(&mut controller)?;
    match &outcome {
        Outcome::Submitted(submission) => {
            println!("Task:   {}", submission.task_name);
            println!("Commit: {}", submission.commit_message);
            println!("Time:   {}h", format_hours(submission.time_hours));
            println!("Branch: {}", submission.branch);
            println!("Status: {}", submission.status);
            println!("\nResulting message:\n{}", annotate(PREVIEW_MESSAGE, submission));
        }
        Outcome::Skipped => println!("Skipped"),
        Outcome::Cancelled => println!("Cancelled"),
    }
    Ok(if outcome.allows_commit() {
        HookExit::Proceed
    } else {
        HookExit::Abort
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::TaskStatus;

    fn submission() -> Submission {
        Submission {
            task_name: "Auth".to_string(),
            commit_message: "Fix login".to_string(),
            time_hours: 2.0,
            branch: "main".to_string(),
            status: TaskStatus::Completed,
        }
    }

    #[test]
    fn annotate_appends_trailer() {
        assert_eq!(
            annotate("Fix login bug", &submission()),
            "Fix login bug\n\nTask: Auth\nTime: 2.0h\nStatus: Completed"
        );
    }

    #[test]
    fn annotate_drops_trailing_newlines() {
        assert_eq!(
            annotate("Fix login bug\n\n", &submission()),
            "Fix login bug\n\nTask: Auth\nTime: 2.0h\nStatus: Completed"
        );
    }

    const VERBOSE_MESSAGE: &str = "Fix login bug\n\n\
        # Please enter the commit message for your changes.\n\
        # ------------------------ >8 ------------------------\n\
        # Do not modify or remove the line above.\n\
        diff --git a/x b/x\n\
        +let x = 1;\n";

    #[test]
    fn prefill_stops_at_scissors() {
        assert_eq!(prefill_text(VERBOSE_MESSAGE), "Fix login bug");
    }

    #[test]
    fn annotate_places_trailer_above_comment_block() {
        let annotated = annotate(VERBOSE_MESSAGE, &submission());
        assert_eq!(
            annotated,
            "Fix login bug\n\nTask: Auth\nTime: 2.0h\nStatus: Completed\n\
             # Please enter the commit message for your changes.\n\
             # ------------------------ >8 ------------------------\n\
             # Do not modify or remove the line above.\n\
             diff --git a/x b/x\n\
             +let x = 1;\n"
        );
    }

    #[test]
    fn comment_lines_inside_body_stay_in_place() {
        let (body, comments) = split_comment_block("Fix\n# note\nmore\n\n# tail\n");
        assert_eq!(body, "Fix\n# note\nmore\n\n");
        assert_eq!(comments, "# tail\n");
    }

    #[test]
    fn prefill_strips_git_comments() {
        let raw = "Fix login bug\n# Please enter the commit message\n# On branch main\n";
        assert_eq!(prefill_text(raw), "Fix login bug");
        assert_eq!(prefill_text("# only comments\n"), "");
    }

    #[test]
    fn exit_codes() {
        assert_eq!(HookExit::Proceed.code(), 0);
        assert_eq!(HookExit::Abort.code(), 1);
    }
}
