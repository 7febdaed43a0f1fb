use crate::config::Config;
use crate::{Submission, Task, format_hours};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

/// The task list could not be obtained. Never fatal: callers degrade to an
/// empty list.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum FetchError {
    #[error("request failed: {0}")]
    Transport(String),
    #[error("webhook returned HTTP {0}")]
    Status(u16),
    #[error("malformed webhook response: {0}")]
    Malformed(String),
}

/// A mutating call did not take effect.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum RemoteError {
    /// The webhook answered `success: false`; the message is shown verbatim.
    #[error("{0}")]
    Rejected(String),
    #[error(transparent)]
    Fetch(#[from] FetchError),
}

pub type Result<T> = std::result::Result<T, RemoteError>;

/// The remote task store. One call per method, no retries.
pub trait TaskStore {
    fn get_tasks(&self) -> std::result::Result<Vec<Task>, FetchError>;
    fn create_task(&self, name: &str) -> Result<String>;
    fn update_task(&self, old_name: &str, new_name: &str) -> Result<String>;
    fn delete_task(&self, name: &str) -> Result<String>;
    fn log_commit(&self, submission: &Submission) -> Result<String>;
}

/// Body of every POST.
#[derive(Debug, Serialize)]
#[serde(tag = "action", rename_all = "camelCase")]
enum WebhookRequest<'a> {
    #[serde(rename_all = "camelCase")]
    CreateTask { task_name: &'a str },
    #[serde(rename_all = "camelCase")]
    UpdateTask { old_name: &'a str, new_name: &'a str },
    #[serde(rename_all = "camelCase")]
    DeleteTask { task_name: &'a str },
    #[serde(rename_all = "camelCase")]
    LogCommit {
        task_name: &'a str,
        commit_message: &'a str,
        time: String,
        branch: &'a str,
        status: &'a str,
    },
}

#[derive(Debug, Deserialize)]
struct RawResponse {
    success: Option<bool>,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    tasks: Option<Vec<Task>>,
}

/// A webhook reply after validation at the boundary.
#[derive(Debug, Clone, PartialEq)]
pub enum WebhookResponse {
    Success {
        message: Option<String>,
        tasks: Option<Vec<Task>>,
    },
    Failure {
        error: String,
    },
}

impl WebhookResponse {
    /// Decode a response body. Anything without a boolean `success` is
    /// rejected as malformed.
    pub fn parse(body: &str) -> std::result::Result<Self, FetchError> {
        let raw: RawResponse =
            serde_json::from_str(body).map_err(|e| FetchError::Malformed(e.to_string()))?;
        match raw.success {
            Some(true) => Ok(WebhookResponse::Success {
                message: raw.message,
                tasks: raw.tasks,
            }),
            Some(false) => Ok(WebhookResponse::Failure {
                error: raw
                    .error
                    .unwrap_or_else(|| "webhook reported failure".to_string()),
            }),
            None => Err(FetchError::Malformed(
                "missing boolean `success` field".to_string(),
            )),
        }
    }

    /// Extract the task list from a `getTasks` reply.
    pub fn into_tasks(self) -> std::result::Result<Vec<Task>, FetchError> {
        match self {
            WebhookResponse::Success {
                tasks: Some(tasks), ..
            } => Ok(tasks
                .into_iter()
                .filter(|t| !t.name.trim().is_empty())
                .collect()),
            WebhookResponse::Success { tasks: None, .. } => Err(FetchError::Malformed(
                "success without `tasks`".to_string(),
            )),
            WebhookResponse::Failure { error } => Err(FetchError::Malformed(error)),
        }
    }

    /// Extract the confirmation message from a mutation reply.
    pub fn into_message(self, fallback: &str) -> Result<String> {
        match self {
            WebhookResponse::Success { message, .. } => {
                Ok(message.unwrap_or_else(|| fallback.to_string()))
            }
            WebhookResponse::Failure { error } => Err(RemoteError::Rejected(error)),
        }
    }
}

/// Blocking HTTP client for the task webhook.
pub struct WebhookClient {
    agent: ureq::Agent,
    url: String,
}

impl WebhookClient {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Self {
        let agent = ureq::AgentBuilder::new().timeout(timeout).build();
        Self {
            agent,
            url: url.into(),
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(config.webhook_url.clone(), config.request_timeout())
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    fn read_body(
        result: std::result::Result<ureq::Response, ureq::Error>,
    ) -> std::result::Result<String, FetchError> {
        match result {
            Ok(response) => response
                .into_string()
                .map_err(|e| FetchError::Transport(e.to_string())),
            Err(ureq::Error::Status(code, _)) => Err(FetchError::Status(code)),
            Err(ureq::Error::Transport(t)) => Err(FetchError::Transport(t.to_string())),
        }
    }

    fn post(&self, request: &WebhookRequest<'_>, fallback: &str) -> Result<String> {
        tracing::debug!(url = %self.url, ?request, "POST webhook");
        let body = Self::read_body(self.agent.post(&self.url).send_json(request))?;
        WebhookResponse::parse(&body)?.into_message(fallback)
    }
}

impl TaskStore for WebhookClient {
    fn get_tasks(&self) -> std::result::Result<Vec<Task>, FetchError> {
        tracing::debug!(url = %self.url, "GET webhook action=getTasks");
        let body = Self::read_body(
            self.agent
                .get(&self.url)
                .query("action", "getTasks")
                .call(),
        )?;
        WebhookResponse::parse(&body)?.into_tasks()
    }

    fn create_task(&self, name: &str) -> Result<String> {
        self.post(&WebhookRequest::CreateTask { task_name: name }, "Task created")
    }

    fn update_task(&self, old_name: &str, new_name: &str) -> Result<String> {
        self.post(
            &WebhookRequest::UpdateTask { old_name, new_name },
            "Task updated",
        )
    }

    fn delete_task(&self, name: &str) -> Result<String> {
        self.post(&WebhookRequest::DeleteTask { task_name: name }, "Task deleted")
    }

    fn log_commit(&self, submission: &Submission) -> Result<String> {
        self.post(
            &WebhookRequest::LogCommit {
                task_name: &submission.task_name,
                commit_message: &submission.commit_message,
                time: format_hours(submission.time_hours),
                branch: &submission.branch,
                status: submission.status.label(),
            },
            "Task logged",
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::TaskStatus;
    use std::io::{Read, Write};
    use std::net::{TcpListener, TcpStream};
    use std::thread;
    use std::time::Instant;

    fn json_reply(status: &str, body: &str) -> String {
        format!(
            "HTTP/1.1 {status}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
            body.len()
        )
    }

    /// Read one request: headers plus a `Content-Length` body.
    fn read_request(stream: &mut TcpStream) -> String {
        let mut data = Vec::new();
        let mut buf = [0u8; 1024];
        loop {
            let n = stream.read(&mut buf).unwrap();
            if n == 0 {
                break;
            }
            data.extend_from_slice(&buf[..n]);
            let text = String::from_utf8_lossy(&data);
            if let Some(end) = text.find("\r\n\r\n") {
                let length = text[..end]
                    .lines()
                    .filter_map(|line| line.split_once(':'))
                    .find(|(name, _)| name.eq_ignore_ascii_case("content-length"))
                    .and_then(|(_, value)| value.trim().parse::<usize>().ok())
                    .unwrap_or(0);
                if data.len() >= end + 4 + length {
                    break;
                }
            }
        }
        String::from_utf8_lossy(&data).into_owned()
    }

    /// Serve one scripted reply; the handle yields the raw request.
    fn serve_once(reply: String) -> (String, thread::JoinHandle<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let url = format!("http://{}/exec", listener.local_addr().unwrap());
        let handle = thread::spawn(move || {
            let (mut stream, _) = listener.accept().unwrap();
            let request = read_request(&mut stream);
            stream.write_all(reply.as_bytes()).unwrap();
            request
        });
        (url, handle)
    }

    fn client(url: &str) -> WebhookClient {
        WebhookClient::new(url, Duration::from_secs(5))
    }

    #[test]
    fn parses_task_list() {
        let body = r#"{"success": true, "tasks": [{"name": "Auth"}, {"name": ""}, {"taskName": "Billing", "status": "Roadblock"}]}"#;
        let tasks = WebhookResponse::parse(body).unwrap().into_tasks().unwrap();
        assert_eq!(tasks.len(), 2);
        assert_eq!(tasks[0].name, "Auth");
        assert_eq!(tasks[1].status, Some(TaskStatus::Roadblock));
    }

    #[test]
    fn success_without_tasks_is_malformed_for_get() {
        let response = WebhookResponse::parse(r#"{"success": true, "message": "hi"}"#).unwrap();
        assert!(matches!(
            response.into_tasks(),
            Err(FetchError::Malformed(_))
        ));
    }

    #[test]
    fn missing_success_is_malformed() {
        assert!(matches!(
            WebhookResponse::parse(r#"{"tasks": []}"#),
            Err(FetchError::Malformed(_))
        ));
        assert!(matches!(
            WebhookResponse::parse(r#"{"success": "yes"}"#),
            Err(FetchError::Malformed(_))
        ));
        assert!(matches!(
            WebhookResponse::parse("<html>Sign in</html>"),
            Err(FetchError::Malformed(_))
        ));
    }

    #[test]
    fn remote_error_message_is_verbatim() {
        let response =
            WebhookResponse::parse(r#"{"success": false, "error": "Task already exists"}"#)
                .unwrap();
        let err = response.into_message("Task created").unwrap_err();
        assert_eq!(err, RemoteError::Rejected("Task already exists".to_string()));
        assert_eq!(err.to_string(), "Task already exists");
    }

    #[test]
    fn mutation_message_falls_back() {
        let response = WebhookResponse::parse(r#"{"success": true}"#).unwrap();
        assert_eq!(response.into_message("Task deleted").unwrap(), "Task deleted");
    }

    #[test]
    fn request_bodies_match_webhook_protocol() {
        let create = serde_json::to_value(WebhookRequest::CreateTask { task_name: "Auth" }).unwrap();
        assert_eq!(
            create,
            serde_json::json!({"action": "createTask", "taskName": "Auth"})
        );

        let update = serde_json::to_value(WebhookRequest::UpdateTask {
            old_name: "Auth",
            new_name: "Login",
        })
        .unwrap();
        assert_eq!(
            update,
            serde_json::json!({"action": "updateTask", "oldName": "Auth", "newName": "Login"})
        );

        let log = serde_json::to_value(WebhookRequest::LogCommit {
            task_name: "Auth",
            commit_message: "Fix login",
            time: format_hours(2.0),
            branch: "main",
            status: TaskStatus::Completed.label(),
        })
        .unwrap();
        assert_eq!(log["action"], "logCommit");
        assert_eq!(log["commitMessage"], "Fix login");
        assert_eq!(log["time"], "2.0");
    }

    #[test]
    fn unreachable_webhook_is_a_fetch_error() {
        // Port 9 (discard) on localhost is closed in test environments.
        let client = WebhookClient::new("http://127.0.0.1:9/exec", Duration::from_millis(500));
        assert!(client.get_tasks().is_err());
        assert!(matches!(
            client.create_task("Auth"),
            Err(RemoteError::Fetch(_))
        ));
    }

    #[test]
    fn get_tasks_sends_get_with_action_query() {
        let (url, server) = serve_once(json_reply(
            "200 OK",
            r#"{"success": true, "tasks": [{"name": "Auth"}, {"name": "Billing"}]}"#,
        ));
        let tasks = client(&url).get_tasks().unwrap();
        let request = server.join().unwrap();

        assert!(
            request.starts_with("GET /exec?action=getTasks "),
            "unexpected request line: {request}"
        );
        let names: Vec<_> = tasks.iter().map(|t| t.name.as_str()).collect();
        assert_eq!(names, ["Auth", "Billing"]);
    }

    #[test]
    fn create_task_posts_json_body() {
        let (url, server) = serve_once(json_reply(
            "200 OK",
            r#"{"success": true, "message": "Task created successfully"}"#,
        ));
        let message = client(&url).create_task("Auth").unwrap();
        let request = server.join().unwrap();

        assert_eq!(message, "Task created successfully");
        assert!(request.starts_with("POST /exec "), "unexpected request: {request}");
        let (_, body) = request.split_once("\r\n\r\n").unwrap();
        let body: serde_json::Value = serde_json::from_str(body).unwrap();
        assert_eq!(
            body,
            serde_json::json!({"action": "createTask", "taskName": "Auth"})
        );
    }

    #[test]
    fn rejected_write_keeps_server_error() {
        let (url, server) = serve_once(json_reply(
            "200 OK",
            r#"{"success": false, "error": "Task not found: Auth"}"#,
        ));
        let err = client(&url).delete_task("Auth").unwrap_err();
        server.join().unwrap();
        assert_eq!(err, RemoteError::Rejected("Task not found: Auth".to_string()));
    }

    #[test]
    fn server_error_status_is_reported() {
        let (url, server) = serve_once(json_reply("500 Internal Server Error", "{}"));
        let err = client(&url).get_tasks().unwrap_err();
        server.join().unwrap();
        assert_eq!(err, FetchError::Status(500));

        let (url, server) = serve_once(json_reply("500 Internal Server Error", "{}"));
        let err = client(&url).update_task("Auth", "Login").unwrap_err();
        server.join().unwrap();
        assert_eq!(err, RemoteError::Fetch(FetchError::Status(500)));
    }

    #[test]
    fn silent_server_is_cut_off_by_timeout() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let url = format!("http://{}/exec", listener.local_addr().unwrap());
        thread::spawn(move || {
            if let Ok((mut stream, _)) = listener.accept() {
                read_request(&mut stream);
                thread::sleep(Duration::from_secs(5));
            }
        });

        let client = WebhookClient::new(url, Duration::from_millis(300));
        let started = Instant::now();
        let err = client.get_tasks().unwrap_err();
        assert!(matches!(err, FetchError::Transport(_)), "got {err:?}");
        assert!(
            started.elapsed() < Duration::from_secs(3),
            "timeout not honored: {:?}",
            started.elapsed()
        );
    }
}
