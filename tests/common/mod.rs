#![allow(dead_code)]

use commit_tasklog::config::Config;
use commit_tasklog::dialog::{AppContext, DialogController};
use commit_tasklog::remote::{FetchError, RemoteError, TaskStore};
use commit_tasklog::{Submission, Task};
use std::cell::RefCell;
use std::rc::Rc;

/// One call as seen by the scripted store.
#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    GetTasks,
    Create(String),
    Update(String, String),
    Delete(String),
    LogCommit(Submission),
}

#[derive(Debug, Default)]
pub struct ScriptState {
    pub tasks: Vec<Task>,
    /// Every `get_tasks` times out.
    pub offline: bool,
    /// Every mutation is answered with `success: false` and this error.
    pub reject: Option<String>,
    pub calls: Vec<Call>,
}

/// In-memory task store driven by the test. Clones share state, so the test
/// keeps one handle while the controller owns another.
#[derive(Debug, Clone, Default)]
pub struct ScriptedStore(pub Rc<RefCell<ScriptState>>);

impl ScriptedStore {
    pub fn with_tasks(names: &[&str]) -> Self {
        let store = Self::default();
        store.0.borrow_mut().tasks = names.iter().map(|n| Task::named(*n)).collect();
        store
    }

    pub fn offline() -> Self {
        let store = Self::default();
        store.0.borrow_mut().offline = true;
        store
    }

    pub fn reject_with(&self, error: &str) {
        self.0.borrow_mut().reject = Some(error.to_string());
    }

    pub fn calls(&self) -> Vec<Call> {
        self.0.borrow().calls.clone()
    }

    /// Calls other than `getTasks`.
    pub fn mutations(&self) -> Vec<Call> {
        self.calls()
            .into_iter()
            .filter(|c| *c != Call::GetTasks)
            .collect()
    }

    pub fn task_names(&self) -> Vec<String> {
        self.0.borrow().tasks.iter().map(|t| t.name.clone()).collect()
    }

    fn mutate(&self, call: Call, apply: impl FnOnce(&mut Vec<Task>)) -> Result<String, RemoteError> {
        let mut state = self.0.borrow_mut();
        state.calls.push(call);
        if let Some(error) = state.reject.clone() {
            return Err(RemoteError::Rejected(error));
        }
        if state.offline {
            return Err(FetchError::Transport("timed out".to_string()).into());
        }
        apply(&mut state.tasks);
        Ok("ok".to_string())
    }
}

impl TaskStore for ScriptedStore {
    fn get_tasks(&self) -> Result<Vec<Task>, FetchError> {
        let mut state = self.0.borrow_mut();
        state.calls.push(Call::GetTasks);
        if state.offline {
            return Err(FetchError::Transport("timed out".to_string()));
        }
        Ok(state.tasks.clone())
    }

    fn create_task(&self, name: &str) -> Result<String, RemoteError> {
        self.mutate(Call::Create(name.to_string()), |tasks| {
            tasks.push(Task::named(name))
        })
    }

    fn update_task(&self, old_name: &str, new_name: &str) -> Result<String, RemoteError> {
        self.mutate(
            Call::Update(old_name.to_string(), new_name.to_string()),
            |tasks| {
                for task in tasks.iter_mut().filter(|t| t.name == old_name) {
                    task.name = new_name.to_string();
                }
            },
        )
    }

    fn delete_task(&self, name: &str) -> Result<String, RemoteError> {
        self.mutate(Call::Delete(name.to_string()), |tasks| {
            tasks.retain(|t| t.name != name)
        })
    }

    fn log_commit(&self, submission: &Submission) -> Result<String, RemoteError> {
        self.mutate(Call::LogCommit(submission.clone()), |_| {})
    }
}

pub fn context(store: &ScriptedStore) -> AppContext {
    AppContext {
        config: Config::default(),
        store: Box::new(store.clone()),
        branch: "feature/auth".to_string(),
    }
}

/// A controller with the task list already loaded (or the load failed).
pub fn loaded_controller(store: &ScriptedStore, commit_text: &str) -> DialogController {
    let mut controller = DialogController::new(context(store), commit_text);
    let _ = controller.load_tasks();
    controller
}
