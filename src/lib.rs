pub mod cli;
pub mod config;
pub mod dialog;
pub mod git;
pub mod hook;
pub mod install;
pub mod logging;
pub mod remote;
pub mod tui;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

/// Work status of a task, as stored by the webhook.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TaskStatus {
    #[default]
    InProgress,
    Completed,
    Roadblock,
}

impl TaskStatus {
    pub const ALL: [TaskStatus; 3] = [
        TaskStatus::InProgress,
        TaskStatus::Completed,
        TaskStatus::Roadblock,
    ];

    /// Wire and display label.
    pub fn label(self) -> &'static str {
        match self {
            TaskStatus::InProgress => "In Progress",
            TaskStatus::Completed => "Completed",
            TaskStatus::Roadblock => "Roadblock",
        }
    }

    /// Parse a wire label. Unknown labels fall back to `InProgress`.
    pub fn from_label(label: &str) -> Self {
        match label.trim() {
            "Completed" => TaskStatus::Completed,
            "Roadblock" => TaskStatus::Roadblock,
            _ => TaskStatus::InProgress,
        }
    }

    /// Next status in display order, wrapping around.
    pub fn next(self) -> Self {
        match self {
            TaskStatus::InProgress => TaskStatus::Completed,
            TaskStatus::Completed => TaskStatus::Roadblock,
            TaskStatus::Roadblock => TaskStatus::InProgress,
        }
    }

    pub fn prev(self) -> Self {
        match self {
            TaskStatus::InProgress => TaskStatus::Roadblock,
            TaskStatus::Completed => TaskStatus::InProgress,
            TaskStatus::Roadblock => TaskStatus::Completed,
        }
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl Serialize for TaskStatus {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.label())
    }
}

impl<'de> Deserialize<'de> for TaskStatus {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let label = String::deserialize(deserializer)?;
        Ok(TaskStatus::from_label(&label))
    }
}

/// A task as reported by the remote store.
///
/// Only `name` is guaranteed; the other fields depend on which sheet layout
/// the webhook serves.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    #[serde(alias = "taskName")]
    pub name: String,
    #[serde(default, deserialize_with = "lenient_hours")]
    pub time: Option<f64>,
    #[serde(default)]
    pub status: Option<TaskStatus>,
    #[serde(default)]
    pub description: Option<String>,
}

impl Task {
    /// A task known only by name.
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            time: None,
            status: None,
            description: None,
        }
    }

    /// Number of commit notes accumulated in the description.
    pub fn commit_count(&self) -> usize {
        self.description
            .as_deref()
            .map(|d| d.matches('•').count())
            .unwrap_or(0)
    }
}

/// Spreadsheet cells come back as numbers, numeric strings, or blanks.
fn lenient_hours<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<f64>, D::Error> {
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    let hours = match value {
        Some(serde_json::Value::Number(n)) => n.as_f64(),
        Some(serde_json::Value::String(s)) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    Ok(hours.filter(|h| h.is_finite() && *h > 0.0))
}

/// The record produced by a completed dialog.
#[derive(Debug, Clone, PartialEq)]
pub struct Submission {
    pub task_name: String,
    pub commit_message: String,
    pub time_hours: f64,
    pub branch: String,
    pub status: TaskStatus,
}

/// Terminal result of one dialog session.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    /// The form was completed; log it and annotate the commit.
    Submitted(Submission),
    /// Commit proceeds without logging.
    Skipped,
    /// Commit must be aborted.
    Cancelled,
}

impl Outcome {
    /// Whether the commit may proceed.
    pub fn allows_commit(&self) -> bool {
        !matches!(self, Outcome::Cancelled)
    }
}

/// Format hours the way they appear in commit trailers: `2.0`, `1.5`, `0.25`.
pub fn format_hours(hours: f64) -> String {
    if hours.fract() == 0.0 {
        format!("{:.1}", hours)
    } else {
        format!("{}", hours)
    }
}
