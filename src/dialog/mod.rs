use crate::config::{Config, FetchFailureNotice};
use crate::remote::{FetchError, RemoteError, TaskStore};
use crate::{Outcome, Submission, Task, TaskStatus, format_hours};
use thiserror::Error;
use tracing::{info, warn};

/// Shown in the task field when nothing is selected. Never a valid name.
pub const CREATE_TASK_PLACEHOLDER: &str = "+ Create a task here";

/// Upper bound for a single commit's time entry.
pub const MAX_HOURS: f64 = 24.0;

/// Everything a dialog session needs from its surroundings.
pub struct AppContext {
    pub config: Config,
    pub store: Box<dyn TaskStore>,
    pub branch: String,
}

/// Form field a validation error refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Field {
    Task,
    Commit,
    Time,
}

/// Local input is malformed. The dialog stays open.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("Please select or create a task")]
    NoTaskSelected,
    #[error("Task name cannot be empty")]
    EmptyTaskName,
    #[error("\"{0}\" is reserved and cannot be used as a task name")]
    ReservedTaskName(String),
    #[error("Please enter a commit message")]
    EmptyCommitMessage,
    #[error("Please enter a valid time value (got \"{0}\")")]
    InvalidTime(String),
    #[error("No task is waiting for delete confirmation")]
    NothingToDelete,
}

impl ValidationError {
    pub fn field(&self) -> Field {
        match self {
            ValidationError::EmptyCommitMessage => Field::Commit,
            ValidationError::InvalidTime(_) => Field::Time,
            _ => Field::Task,
        }
    }
}

/// Failure of a task create/rename/delete.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ControllerError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    Remote(#[from] RemoteError),
}

/// Explicit answer to the delete prompt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Confirmation {
    Yes,
    No,
}

/// Parse the time field: a finite number of hours in `(0, MAX_HOURS]`.
pub fn parse_hours(text: &str) -> Result<f64, ValidationError> {
    let trimmed = text.trim();
    let number = trimmed.strip_suffix('h').unwrap_or(trimmed).trim_end();
    match number.parse::<f64>() {
        Ok(hours) if hours.is_finite() && hours > 0.0 && hours <= MAX_HOURS => Ok(hours),
        _ => Err(ValidationError::InvalidTime(trimmed.to_string())),
    }
}

/// State machine behind the task dialog.
///
/// Holds a snapshot of the remote task list, the form fields, and at most
/// one recorded [`Outcome`]. Remote failures never modify the snapshot.
pub struct DialogController {
    ctx: AppContext,
    tasks: Vec<Task>,
    selected_task: Option<String>,
    commit_text: String,
    time_text: String,
    status: TaskStatus,
    pending_delete: Option<String>,
    fetch_notice: Option<String>,
    outcome: Option<Outcome>,
}

impl DialogController {
    pub fn new(ctx: AppContext, commit_text: impl Into<String>) -> Self {
        let time_text = format_hours(ctx.config.default_time_hours);
        Self {
            ctx,
            tasks: Vec::new(),
            selected_task: None,
            commit_text: commit_text.into(),
            time_text,
            status: TaskStatus::default(),
            pending_delete: None,
            fetch_notice: None,
            outcome: None,
        }
    }

    pub fn config(&self) -> &Config {
        &self.ctx.config
    }

    pub fn store(&self) -> &dyn TaskStore {
        self.ctx.store.as_ref()
    }

    pub fn branch(&self) -> &str {
        &self.ctx.branch
    }

    pub fn tasks(&self) -> &[Task] {
        &self.tasks
    }

    pub fn selected_task(&self) -> Option<&str> {
        self.selected_task.as_deref()
    }

    /// Cached details of the selected task, if it came from the remote list.
    pub fn selected_task_info(&self) -> Option<&Task> {
        let name = self.selected_task.as_deref()?;
        self.tasks.iter().find(|t| t.name == name)
    }

    pub fn selected_index(&self) -> Option<usize> {
        let name = self.selected_task.as_deref()?;
        self.tasks.iter().position(|t| t.name == name)
    }

    pub fn commit_text(&self) -> &str {
        &self.commit_text
    }

    pub fn set_commit_text(&mut self, text: impl Into<String>) {
        self.commit_text = text.into();
    }

    pub fn commit_text_mut(&mut self) -> &mut String {
        &mut self.commit_text
    }

    pub fn time_text(&self) -> &str {
        &self.time_text
    }

    pub fn set_time_text(&mut self, text: impl Into<String>) {
        self.time_text = text.into();
    }

    pub fn time_text_mut(&mut self) -> &mut String {
        &mut self.time_text
    }

    pub fn status(&self) -> TaskStatus {
        self.status
    }

    pub fn set_status(&mut self, status: TaskStatus) {
        self.status = status;
    }

    pub fn pending_delete(&self) -> Option<&str> {
        self.pending_delete.as_deref()
    }

    /// Visible warning left by a failed task fetch.
    pub fn fetch_notice(&self) -> Option<&str> {
        self.fetch_notice.as_deref()
    }

    pub fn dismiss_fetch_notice(&mut self) {
        self.fetch_notice = None;
    }

    pub fn outcome(&self) -> Option<&Outcome> {
        self.outcome.as_ref()
    }

    /// Fetch the task list for this session.
    ///
    /// On failure the cache is left empty and the selection cleared, so the
    /// user is steered to creating or typing a task instead.
    pub fn load_tasks(&mut self) -> Result<&[Task], FetchError> {
        match self.ctx.store.get_tasks() {
            Ok(tasks) => {
                info!(count = tasks.len(), "loaded tasks");
                self.tasks = tasks;
                self.fetch_notice = None;
                self.select_first();
                Ok(&self.tasks)
            }
            Err(err) => {
                warn!(error = %err, "could not load tasks; continuing without them");
                self.tasks.clear();
                self.selected_task = None;
                if self.ctx.config.fetch_failure_notice == FetchFailureNotice::Alert {
                    self.fetch_notice = Some(format!("Could not load tasks: {}", err));
                }
                Err(err)
            }
        }
    }

    /// Re-fetch after a successful mutation. Keeps the old cache on failure.
    fn refresh(&mut self) -> Result<(), FetchError> {
        match self.ctx.store.get_tasks() {
            Ok(tasks) => {
                self.tasks = tasks;
                Ok(())
            }
            Err(err) => {
                warn!(error = %err, "task list refresh failed; keeping cached list");
                Err(err)
            }
        }
    }

    fn select_first(&mut self) {
        self.selected_task = None;
        if let Some(name) = self.tasks.first().map(|t| t.name.clone()) {
            self.select_task(&name);
        }
    }

    /// Select a task from the cached list and adopt its status.
    ///
    /// Returns `false` if no cached task has that name.
    pub fn select_task(&mut self, name: &str) -> bool {
        let Some(task) = self.tasks.iter().find(|t| t.name == name) else {
            return false;
        };
        if let Some(status) = task.status {
            self.status = status;
        }
        self.selected_task = Some(task.name.clone());
        true
    }

    /// Use a typed task name that need not exist remotely yet.
    pub fn use_typed_task(&mut self, name: &str) -> Result<(), ValidationError> {
        let name = checked_name(name)?;
        if !self.select_task(&name) {
            self.selected_task = Some(name);
        }
        Ok(())
    }

    /// Move the selection through the cached list.
    pub fn select_next(&mut self) {
        self.step_selection(1);
    }

    pub fn select_prev(&mut self) {
        self.step_selection(-1);
    }

    fn step_selection(&mut self, delta: isize) {
        if self.tasks.is_empty() {
            return;
        }
        let next = match self.selected_index() {
            Some(idx) => idx
                .saturating_add_signed(delta)
                .min(self.tasks.len() - 1),
            None => 0,
        };
        let name = self.tasks[next].name.clone();
        self.select_task(&name);
    }

    /// Create a task remotely and select it.
    pub fn create_task(&mut self, name: &str) -> Result<Task, ControllerError> {
        let name = checked_name(name)?;
        let message = self.ctx.store.create_task(&name)?;
        info!(task = %name, %message, "created task");

        if self.refresh().is_err() || !self.tasks.iter().any(|t| t.name == name) {
            self.tasks.push(Task::named(name.clone()));
        }
        self.select_task(&name);
        Ok(self
            .selected_task_info()
            .cloned()
            .unwrap_or_else(|| Task::named(name)))
    }

    /// Rename a task remotely. Renaming to the same name does nothing.
    pub fn rename_task(&mut self, old_name: &str, new_name: &str) -> Result<Task, ControllerError> {
        let new_name = checked_name(new_name)?;
        if old_name.trim().is_empty() || old_name.trim() == CREATE_TASK_PLACEHOLDER {
            return Err(ValidationError::NoTaskSelected.into());
        }
        if new_name == old_name.trim() {
            return Ok(self
                .tasks
                .iter()
                .find(|t| t.name == old_name || t.name == new_name)
                .cloned()
                .unwrap_or_else(|| Task::named(new_name.clone())));
        }

        let message = self.ctx.store.update_task(old_name, &new_name)?;
        info!(from = %old_name, to = %new_name, %message, "renamed task");

        if self.refresh().is_err() {
            for task in self.tasks.iter_mut().filter(|t| t.name == old_name) {
                task.name = new_name.clone();
            }
        }
        if self.selected_task.as_deref() == Some(old_name) && !self.select_task(&new_name) {
            self.selected_task = Some(new_name.clone());
        }
        Ok(self
            .tasks
            .iter()
            .find(|t| t.name == new_name)
            .cloned()
            .unwrap_or_else(|| Task::named(new_name)))
    }

    /// Stage a task for deletion. Nothing is sent until [`delete_task`]
    /// receives an explicit answer.
    ///
    /// [`delete_task`]: DialogController::delete_task
    pub fn request_delete(&mut self, name: &str) -> Result<(), ValidationError> {
        let name = name.trim();
        if name.is_empty() || name == CREATE_TASK_PLACEHOLDER {
            return Err(ValidationError::NoTaskSelected);
        }
        self.pending_delete = Some(name.to_string());
        Ok(())
    }

    /// Answer the delete prompt. Returns whether a task was deleted.
    pub fn delete_task(&mut self, answer: Confirmation) -> Result<bool, ControllerError> {
        let name = self
            .pending_delete
            .take()
            .ok_or(ValidationError::NothingToDelete)?;
        if answer == Confirmation::No {
            return Ok(false);
        }

        let message = self.ctx.store.delete_task(&name)?;
        info!(task = %name, %message, "deleted task");

        if self.refresh().is_err() {
            self.tasks.retain(|t| t.name != name);
        }
        if self.selected_task.as_deref() == Some(name.as_str()) {
            self.select_first();
        }
        Ok(true)
    }

    /// Step through the configured time presets.
    pub fn cycle_time(&mut self, forward: bool) {
        let options = &self.ctx.config.time_options;
        if options.is_empty() {
            return;
        }
        let current = parse_hours(&self.time_text).ok();
        let exact = current.and_then(|c| options.iter().position(|o| (o - c).abs() < 1e-9));
        let next = match (exact, current) {
            (Some(idx), _) if forward => (idx + 1) % options.len(),
            (Some(idx), _) => (idx + options.len() - 1) % options.len(),
            (None, Some(c)) => options.iter().position(|o| *o >= c).unwrap_or(0),
            (None, None) => 0,
        };
        self.time_text = format_hours(options[next]);
    }

    /// Validate the form and finish the session with `Submitted`.
    pub fn submit(&mut self) -> Result<Outcome, ValidationError> {
        if let Some(outcome) = &self.outcome {
            return Ok(outcome.clone());
        }

        let task_name = match self.selected_task.as_deref().map(str::trim) {
            Some(name) if !name.is_empty() && name != CREATE_TASK_PLACEHOLDER => name.to_string(),
            _ => return Err(ValidationError::NoTaskSelected),
        };
        let commit_message = self.commit_text.trim();
        if commit_message.is_empty() {
            return Err(ValidationError::EmptyCommitMessage);
        }
        let time_hours = parse_hours(&self.time_text)?;

        let submission = Submission {
            task_name,
            commit_message: commit_message.to_string(),
            time_hours,
            branch: self.ctx.branch.clone(),
            status: self.status,
        };
        Ok(self.finish(Outcome::Submitted(submission)))
    }

    /// Finish without logging; the commit proceeds.
    pub fn skip(&mut self) -> Outcome {
        self.finish(Outcome::Skipped)
    }

    /// Finish by aborting the commit. No secondary prompt.
    pub fn cancel(&mut self) -> Outcome {
        self.finish(Outcome::Cancelled)
    }

    /// Record the first outcome; later calls get the recorded one back.
    fn finish(&mut self, outcome: Outcome) -> Outcome {
        self.outcome.get_or_insert(outcome).clone()
    }
}

fn checked_name(name: &str) -> Result<String, ValidationError> {
    let name = name.trim();
    if name.is_empty() {
        return Err(ValidationError::EmptyTaskName);
    }
    if name == CREATE_TASK_PLACEHOLDER {
        return Err(ValidationError::ReservedTaskName(name.to_string()));
    }
    Ok(name.to_string())
}
