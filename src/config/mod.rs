use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

pub const CONFIG_FILE_NAME: &str = ".commit-tasklog.toml";
pub const CONFIG_ENV_VAR: &str = "COMMIT_TASKLOG_CONFIG";
pub const WEBHOOK_ENV_VAR: &str = "COMMIT_TASKLOG_WEBHOOK_URL";

/// Used when no webhook is configured. Requests against it fail fast and
/// the dialog degrades to the "create a task" path.
pub const PLACEHOLDER_WEBHOOK_URL: &str = "https://script.google.com/macros/s/YOUR_DEPLOYMENT_ID/exec";

const DEFAULT_TIMEOUT_SECS: f64 = 10.0;
/// A hook that waits longer than this is indistinguishable from a hang.
const MAX_TIMEOUT_SECS: f64 = 60.0;
const DEFAULT_TIME_HOURS: f64 = 1.0;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("invalid TOML in {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}

/// How the time field is edited.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TimeInput {
    /// Cycle through `time_options`.
    #[default]
    Presets,
    /// Type any positive number.
    FreeForm,
}

/// What the user sees when the task list cannot be fetched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FetchFailureNotice {
    /// Only written to the log.
    Log,
    /// Logged and shown in the dialog.
    #[default]
    Alert,
}

/// Settings stored in `.commit-tasklog.toml`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Apps Script web app URL (or any endpoint speaking the same protocol).
    pub webhook_url: String,
    /// Upper bound for every webhook call.
    pub request_timeout_secs: f64,
    /// Initial value of the time field.
    pub default_time_hours: f64,
    /// Choices offered in preset mode.
    pub time_options: Vec<f64>,
    pub time_input: TimeInput,
    pub fetch_failure_notice: FetchFailureNotice,
    /// Append log output here instead of stderr.
    pub log_file: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            webhook_url: PLACEHOLDER_WEBHOOK_URL.to_string(),
            request_timeout_secs: DEFAULT_TIMEOUT_SECS,
            default_time_hours: DEFAULT_TIME_HOURS,
            time_options: default_time_options(),
            time_input: TimeInput::default(),
            fetch_failure_notice: FetchFailureNotice::default(),
            log_file: None,
        }
    }
}

/// 0.5 through 8.0 in half-hour steps.
pub fn default_time_options() -> Vec<f64> {
    (1..=16).map(|step| step as f64 * 0.5).collect()
}

impl Config {
    /// Per-call webhook timeout. Values outside `(0, 60]` seconds use the
    /// default.
    pub fn request_timeout(&self) -> Duration {
        let default = Duration::from_secs_f64(DEFAULT_TIMEOUT_SECS);
        if !valid_timeout(self.request_timeout_secs) {
            return default;
        }
        Duration::try_from_secs_f64(self.request_timeout_secs).unwrap_or(default)
    }

    pub fn has_placeholder_url(&self) -> bool {
        self.webhook_url == PLACEHOLDER_WEBHOOK_URL
    }

    /// Replace out-of-range values with defaults.
    fn normalized(mut self) -> Self {
        self.webhook_url = self.webhook_url.trim().to_string();
        if self.webhook_url.is_empty() {
            self.webhook_url = PLACEHOLDER_WEBHOOK_URL.to_string();
        }
        if !valid_timeout(self.request_timeout_secs) {
            self.request_timeout_secs = DEFAULT_TIMEOUT_SECS;
        }
        if !(self.default_time_hours.is_finite() && self.default_time_hours > 0.0) {
            self.default_time_hours = DEFAULT_TIME_HOURS;
        }
        self.time_options
            .retain(|hours| hours.is_finite() && *hours > 0.0);
        if self.time_options.is_empty() {
            self.time_options = default_time_options();
        }
        self
    }
}

fn valid_timeout(secs: f64) -> bool {
    secs.is_finite() && secs > 0.0 && secs <= MAX_TIMEOUT_SECS
}

/// Outcome of loading configuration: always a usable `Config`, plus the
/// error that forced a fallback, if any.
#[derive(Debug)]
pub struct ConfigLoad {
    pub config: Config,
    pub source: Option<PathBuf>,
    pub error: Option<ConfigError>,
}

/// Locate the config file: `$COMMIT_TASKLOG_CONFIG`, else the repo root file.
pub fn config_path(repo_root: Option<&Path>) -> Option<PathBuf> {
    if let Ok(path) = std::env::var(CONFIG_ENV_VAR)
        && !path.trim().is_empty()
    {
        return Some(PathBuf::from(path));
    }
    repo_root.map(|root| root.join(CONFIG_FILE_NAME))
}

/// Load configuration without ever failing. Applies the webhook URL
/// environment override last.
pub fn load_with_fallback(repo_root: Option<&Path>) -> ConfigLoad {
    let mut load = match config_path(repo_root) {
        Some(path) => load_with_fallback_from_path(&path),
        None => ConfigLoad {
            config: Config::default(),
            source: None,
            error: None,
        },
    };

    if let Ok(url) = std::env::var(WEBHOOK_ENV_VAR)
        && !url.trim().is_empty()
    {
        load.config.webhook_url = url.trim().to_string();
    }

    load
}

pub fn load_with_fallback_from_path(path: &Path) -> ConfigLoad {
    match load_from_path(path) {
        Ok(Some(config)) => ConfigLoad {
            config,
            source: Some(path.to_path_buf()),
            error: None,
        },
        Ok(None) => ConfigLoad {
            config: Config::default(),
            source: None,
            error: None,
        },
        Err(err) => ConfigLoad {
            config: Config::default(),
            source: None,
            error: Some(err),
        },
    }
}

/// Read and parse a config file. A missing file is `Ok(None)`.
pub fn load_from_path(path: &Path) -> Result<Option<Config>, ConfigError> {
    let contents = match fs::read_to_string(path) {
        Ok(contents) => contents,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(source) => {
            return Err(ConfigError::Read {
                path: path.to_path_buf(),
                source,
            });
        }
    };
    let config: Config = toml::from_str(&contents).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(Some(config.normalized()))
}

/// Default file contents written by `install`.
pub fn default_config_toml() -> String {
    // Serializing a plain struct of primitives cannot fail.
    let body = toml::to_string_pretty(&Config::default()).unwrap_or_default();
    format!(
        "# commit-tasklog configuration\n# Set webhook_url to your deployed Apps Script web app URL.\n\n{}",
        body
    )
}
