use anyhow::{Context, Result, anyhow};
use crossterm::{
    event::{self, Event, KeyCode, KeyEvent, KeyModifiers},
    execute,
    terminal::{EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode},
};
use ratatui::{
    Frame, Terminal,
    backend::CrosstermBackend,
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span, Text},
    widgets::{Block, Borders, Clear, List, ListItem, ListState, Paragraph, Wrap},
};
use std::io;
use std::panic::{self, PanicHookInfo};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::config::TimeInput;
use crate::logging;
use crate::dialog::{
    CREATE_TASK_PLACEHOLDER, Confirmation, ControllerError, DialogController, Field,
};
use crate::{Outcome, TaskStatus, format_hours};

/// Form field with keyboard focus.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Focus {
    Task,
    Commit,
    Time,
    Status,
}

impl Focus {
    fn next(self) -> Self {
        match self {
            Focus::Task => Focus::Commit,
            Focus::Commit => Focus::Time,
            Focus::Time => Focus::Status,
            Focus::Status => Focus::Task,
        }
    }

    fn prev(self) -> Self {
        match self {
            Focus::Task => Focus::Status,
            Focus::Commit => Focus::Task,
            Focus::Time => Focus::Commit,
            Focus::Status => Focus::Time,
        }
    }
}

impl From<Field> for Focus {
    fn from(field: Field) -> Self {
        match field {
            Field::Task => Focus::Task,
            Field::Commit => Focus::Commit,
            Field::Time => Focus::Time,
        }
    }
}

/// Text prompt shown over the form.
#[derive(Debug, Clone, PartialEq, Eq)]
enum PromptKind {
    CreateTask,
    RenameTask { old_name: String },
    TypeTask,
}

/// Overlay that captures input until dismissed.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Modal {
    Prompt { kind: PromptKind, input: String },
    ConfirmDelete { name: String },
    Alert { title: String, message: String },
    Help,
}

/// Terminal front end for a [`DialogController`].
pub struct App<'a> {
    controller: &'a mut DialogController,
    focus: Focus,
    modal: Option<Modal>,
    status_message: Option<(String, Instant)>,
}

impl<'a> App<'a> {
    pub fn new(controller: &'a mut DialogController) -> Self {
        let modal = controller.fetch_notice().map(|notice| Modal::Alert {
            title: "Tasks unavailable".to_string(),
            message: format!(
                "{}\n\nYou can still create a task (n) or type a task name (t).",
                notice
            ),
        });
        controller.dismiss_fetch_notice();
        Self {
            controller,
            focus: Focus::Task,
            modal,
            status_message: None,
        }
    }

    pub fn focus(&self) -> Focus {
        self.focus
    }

    /// The session is over once the controller holds an outcome.
    pub fn should_quit(&self) -> bool {
        self.controller.outcome().is_some()
    }

    fn alert(&mut self, title: &str, message: impl Into<String>) {
        self.modal = Some(Modal::Alert {
            title: title.to_string(),
            message: message.into(),
        });
    }

    fn flash(&mut self, message: impl Into<String>) {
        self.status_message = Some((message.into(), Instant::now()));
    }

    fn report(&mut self, err: ControllerError) {
        match err {
            ControllerError::Validation(err) => self.alert("Invalid input", err.to_string()),
            ControllerError::Remote(err) => self.alert("Error", err.to_string()),
        }
    }

    /// Handle one key press.
    pub fn handle_input(&mut self, key: KeyEvent) {
        if self.should_quit() {
            return;
        }
        if let Some(modal) = self.modal.take() {
            self.handle_modal_input(modal, key);
            return;
        }

        let ctrl = key.modifiers.contains(KeyModifiers::CONTROL);
        match key.code {
            KeyCode::Esc => {
                self.controller.cancel();
            }
            KeyCode::Char('c') if ctrl => {
                self.controller.cancel();
            }
            KeyCode::F(2) => {
                self.controller.skip();
            }
            KeyCode::Char('s') if ctrl => {
                self.controller.skip();
            }
            KeyCode::F(1) => {
                self.modal = Some(Modal::Help);
            }
            KeyCode::Enter => self.submit(),
            KeyCode::Tab => self.focus = self.focus.next(),
            KeyCode::BackTab => self.focus = self.focus.prev(),
            _ => match self.focus {
                Focus::Task => self.handle_task_input(key),
                Focus::Commit => self.handle_commit_input(key),
                Focus::Time => self.handle_time_input(key),
                Focus::Status => self.handle_status_input(key),
            },
        }
    }

    fn submit(&mut self) {
        if let Err(err) = self.controller.submit() {
            self.focus = err.field().into();
            self.alert("Invalid input", err.to_string());
        }
    }

    fn handle_modal_input(&mut self, modal: Modal, key: KeyEvent) {
        match modal {
            Modal::Prompt { kind, mut input } => match key.code {
                KeyCode::Esc => {}
                KeyCode::Enter => self.finish_prompt(kind, &input),
                KeyCode::Backspace => {
                    input.pop();
                    self.modal = Some(Modal::Prompt { kind, input });
                }
                KeyCode::Char(ch) => {
                    input.push(ch);
                    self.modal = Some(Modal::Prompt { kind, input });
                }
                _ => self.modal = Some(Modal::Prompt { kind, input }),
            },
            Modal::ConfirmDelete { name } => {
                let answer = match key.code {
                    KeyCode::Char('y') | KeyCode::Char('Y') => Confirmation::Yes,
                    _ => Confirmation::No,
                };
                match self.controller.delete_task(answer) {
                    Ok(true) => self.flash(format!("Deleted task \"{}\"", name)),
                    Ok(false) => {}
                    Err(err) => self.report(err),
                }
            }
            // Any key closes alerts and help.
            Modal::Alert { .. } | Modal::Help => {}
        }
    }

    fn finish_prompt(&mut self, kind: PromptKind, input: &str) {
        let result = match &kind {
            PromptKind::CreateTask => self
                .controller
                .create_task(input)
                .map(|task| format!("Created task \"{}\"", task.name)),
            PromptKind::RenameTask { old_name } => self
                .controller
                .rename_task(old_name, input)
                .map(|task| format!("Task is now \"{}\"", task.name)),
            PromptKind::TypeTask => self
                .controller
                .use_typed_task(input)
                .map(|()| format!("Using task \"{}\"", input.trim()))
                .map_err(ControllerError::from),
        };
        match result {
            Ok(message) => self.flash(message),
            Err(err) => {
                self.report(err);
            }
        }
    }

    fn handle_task_input(&mut self, key: KeyEvent) {
        match key.code {
            KeyCode::Char('j') | KeyCode::Down => self.controller.select_next(),
            KeyCode::Char('k') | KeyCode::Up => self.controller.select_prev(),
            KeyCode::Char('n') => {
                self.modal = Some(Modal::Prompt {
                    kind: PromptKind::CreateTask,
                    input: String::new(),
                });
            }
            KeyCode::Char('t') => {
                self.modal = Some(Modal::Prompt {
                    kind: PromptKind::TypeTask,
                    input: String::new(),
                });
            }
            KeyCode::Char('e') | KeyCode::Char('r') => {
                match self.controller.selected_task().map(str::to_string) {
                    Some(old_name) => {
                        self.modal = Some(Modal::Prompt {
                            input: old_name.clone(),
                            kind: PromptKind::RenameTask { old_name },
                        });
                    }
                    None => self.alert("No task", "Please select a task to rename"),
                }
            }
            KeyCode::Char('d') => {
                let name = self.controller.selected_task().map(str::to_string);
                match name {
                    Some(name) if self.controller.request_delete(&name).is_ok() => {
                        self.modal = Some(Modal::ConfirmDelete { name });
                    }
                    _ => self.alert("No task", "Please select a task to delete"),
                }
            }
            _ => {}
        }
    }

    fn handle_commit_input(&mut self, key: KeyEvent) {
        match key.code {
            KeyCode::Char(ch) if !key.modifiers.contains(KeyModifiers::CONTROL) => {
                self.controller.commit_text_mut().push(ch);
            }
            KeyCode::Backspace => {
                self.controller.commit_text_mut().pop();
            }
            _ => {}
        }
    }

    fn handle_time_input(&mut self, key: KeyEvent) {
        match (self.controller.config().time_input, key.code) {
            (_, KeyCode::Right) | (_, KeyCode::Up) => self.controller.cycle_time(true),
            (_, KeyCode::Left) | (_, KeyCode::Down) => self.controller.cycle_time(false),
            (TimeInput::FreeForm, KeyCode::Char(ch)) if ch.is_ascii_digit() || ch == '.' => {
                self.controller.time_text_mut().push(ch);
            }
            (TimeInput::FreeForm, KeyCode::Backspace) => {
                self.controller.time_text_mut().pop();
            }
            _ => {}
        }
    }

    fn handle_status_input(&mut self, key: KeyEvent) {
        let status = self.controller.status();
        match key.code {
            KeyCode::Right | KeyCode::Char('l') | KeyCode::Char(' ') => {
                self.controller.set_status(status.next())
            }
            KeyCode::Left | KeyCode::Char('h') => self.controller.set_status(status.prev()),
            _ => {}
        }
    }

    /// Render the dialog, then any overlay.
    fn render(&mut self, frame: &mut Frame) {
        let expired = self
            .status_message
            .as_ref()
            .map(|(_, time)| time.elapsed() >= Duration::from_secs(3))
            .unwrap_or(false);
        if expired {
            self.status_message = None;
        }

        let task_rows = self.controller.tasks().len().clamp(1, 8) as u16;
        let chunks = Layout::default()
            .direction(Direction::Vertical)
            .constraints([
                Constraint::Length(task_rows + 2),
                Constraint::Length(1),
                Constraint::Length(5),
                Constraint::Length(3),
                Constraint::Length(3),
                Constraint::Min(0),
                Constraint::Length(3),
            ])
            .split(frame.area());

        self.render_task_list(frame, chunks[0]);
        self.render_task_info(frame, chunks[1]);
        self.render_commit(frame, chunks[2]);
        self.render_time_and_branch(frame, chunks[3]);
        self.render_status(frame, chunks[4]);
        self.render_status_bar(frame, chunks[6]);

        if let Some(modal) = &self.modal {
            render_modal(frame, modal);
        }
    }

    fn field_block(&self, title: &str, field: Focus) -> Block<'static> {
        let style = if self.focus == field {
            Style::default().fg(Color::Cyan)
        } else {
            Style::default()
        };
        Block::default()
            .borders(Borders::ALL)
            .border_style(style)
            .title(title.to_string())
    }

    fn render_task_list(&self, frame: &mut Frame, area: Rect) {
        let tasks = self.controller.tasks();
        let selected = self.controller.selected_task();

        let mut items: Vec<ListItem> = tasks
            .iter()
            .map(|task| {
                let style = if Some(task.name.as_str()) == selected {
                    Style::default()
                        .fg(Color::Yellow)
                        .add_modifier(Modifier::BOLD)
                } else {
                    Style::default()
                };
                ListItem::new(task.name.clone()).style(style)
            })
            .collect();

        // A typed name that is not in the remote list yet.
        if let Some(name) = selected
            && self.controller.selected_index().is_none()
        {
            items.push(
                ListItem::new(format!("{} (new)", name)).style(
                    Style::default()
                        .fg(Color::Yellow)
                        .add_modifier(Modifier::BOLD),
                ),
            );
        }
        if items.is_empty() {
            items.push(
                ListItem::new(CREATE_TASK_PLACEHOLDER).style(Style::default().fg(Color::DarkGray)),
            );
        }

        let mut state = ListState::default();
        state.select(
            self.controller
                .selected_index()
                .or_else(|| selected.map(|_| tasks.len())),
        );

        let list = List::new(items)
            .block(self.field_block("Task (j/k select, n new, t type, e rename, d delete)", Focus::Task))
            .highlight_symbol("> ");
        frame.render_stateful_widget(list, area, &mut state);
    }

    fn render_task_info(&self, frame: &mut Frame, area: Rect) {
        let text = match self.controller.selected_task_info() {
            Some(task) => {
                let time = task
                    .time
                    .map(|t| format!("{} hrs", format_hours(t)))
                    .unwrap_or_else(|| "- hrs".to_string());
                let status = task.status.unwrap_or_default();
                format!(
                    "  {}  •  {} commits  •  {}",
                    time,
                    task.commit_count(),
                    status
                )
            }
            None => String::new(),
        };
        frame.render_widget(
            Paragraph::new(text).style(Style::default().fg(Color::Gray)),
            area,
        );
    }

    fn render_commit(&self, frame: &mut Frame, area: Rect) {
        let mut text = self.controller.commit_text().to_string();
        if self.focus == Focus::Commit && self.modal.is_none() {
            text.push('▏');
        }
        let paragraph = Paragraph::new(text)
            .block(self.field_block("Commit Message (added as a bullet to the task)", Focus::Commit))
            .wrap(Wrap { trim: false });
        frame.render_widget(paragraph, area);
    }

    fn render_time_and_branch(&self, frame: &mut Frame, area: Rect) {
        let columns = Layout::default()
            .direction(Direction::Horizontal)
            .constraints([Constraint::Percentage(40), Constraint::Percentage(60)])
            .split(area);

        let mut time = format!("{} hours", self.controller.time_text());
        if self.focus == Focus::Time {
            time = match self.controller.config().time_input {
                TimeInput::Presets => format!("◀ {} ▶", time),
                TimeInput::FreeForm => format!("{}▏", self.controller.time_text()),
            };
        }
        frame.render_widget(
            Paragraph::new(time).block(self.field_block("Time Spent", Focus::Time)),
            columns[0],
        );

        let branch = Paragraph::new(Span::styled(
            self.controller.branch().to_string(),
            Style::default().fg(Color::Green),
        ))
        .block(Block::default().borders(Borders::ALL).title("Branch"));
        frame.render_widget(branch, columns[1]);
    }

    fn render_status(&self, frame: &mut Frame, area: Rect) {
        let current = self.controller.status();
        let spans: Vec<Span> = TaskStatus::ALL
            .iter()
            .flat_map(|status| {
                let (mark, style) = if *status == current {
                    (
                        "(•) ",
                        Style::default()
                            .fg(Color::Cyan)
                            .add_modifier(Modifier::BOLD),
                    )
                } else {
                    ("( ) ", Style::default())
                };
                [
                    Span::styled(format!("{}{}", mark, status.label()), style),
                    Span::raw("   "),
                ]
            })
            .collect();
        frame.render_widget(
            Paragraph::new(Line::from(spans)).block(self.field_block("Status", Focus::Status)),
            area,
        );
    }

    fn render_status_bar(&self, frame: &mut Frame, area: Rect) {
        let text = match &self.status_message {
            Some((msg, _)) => msg.clone(),
            None => "Enter: save & commit  F2: skip logging  Esc: cancel commit  Tab: next field  F1: help"
                .to_string(),
        };
        let paragraph = Paragraph::new(text)
            .block(Block::default().borders(Borders::ALL))
            .wrap(Wrap { trim: false });
        frame.render_widget(paragraph, area);
    }
}

fn render_modal(frame: &mut Frame, modal: &Modal) {
    let (title, body, color, height) = match modal {
        Modal::Prompt { kind, input } => {
            let (title, label) = match kind {
                PromptKind::CreateTask => ("Create Task", "Enter task name:".to_string()),
                PromptKind::RenameTask { old_name } => {
                    ("Rename Task", format!("Rename \"{}\" to:", old_name))
                }
                PromptKind::TypeTask => ("Use Task Name", "Task name:".to_string()),
            };
            (
                title.to_string(),
                format!("{}\n\n{}▏\n\nEnter: ok  Esc: back", label, input),
                Color::White,
                30,
            )
        }
        Modal::ConfirmDelete { name } => (
            "Confirm Delete".to_string(),
            format!(
                "Are you sure you want to delete \"{}\"?\nThis cannot be undone.\n\n(y)es / (n)o",
                name
            ),
            Color::Yellow,
            30,
        ),
        Modal::Alert { title, message } => (
            title.clone(),
            format!("{}\n\nPress any key to continue", message),
            Color::Red,
            30,
        ),
        Modal::Help => (
            "Help".to_string(),
            [
                "Task field:",
                "  j / Down, k / Up  - Select task",
                "  n                 - Create task",
                "  t                 - Type a task name",
                "  e / r             - Rename selected task",
                "  d                 - Delete selected task",
                "",
                "Time field:  Left/Right cycle presets (or type in free-form mode)",
                "Status field: Left/Right/Space change status",
                "",
                "Enter        - Save & commit",
                "F2 / Ctrl+S  - Skip logging, commit anyway",
                "Esc / Ctrl+C - Cancel and abort the commit",
                "",
                "Press any key to close this help",
            ]
            .join("\n"),
            Color::White,
            70,
        ),
    };

    let text = Text::from(body.lines().map(Line::from).collect::<Vec<_>>());
    let paragraph = Paragraph::new(text)
        .block(Block::default().borders(Borders::ALL).title(title))
        .wrap(Wrap { trim: false })
        .style(Style::default().fg(color));

    let area = centered_rect(60, height, frame.area());
    frame.render_widget(Clear, area);
    frame.render_widget(paragraph, area);
}

/// Create a centered rectangle.
fn centered_rect(percent_x: u16, percent_y: u16, r: Rect) -> Rect {
    let popup_layout = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Percentage((100 - percent_y) / 2),
            Constraint::Percentage(percent_y),
            Constraint::Percentage((100 - percent_y) / 2),
        ])
        .split(r);

    Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Percentage((100 - percent_x) / 2),
            Constraint::Percentage(percent_x),
            Constraint::Percentage((100 - percent_x) / 2),
        ])
        .split(popup_layout[1])[1]
}

/// Setup the terminal for TUI rendering.
fn setup_terminal() -> Result<Terminal<CrosstermBackend<io::Stdout>>> {
    enable_raw_mode().context("Failed to enable raw mode")?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen).context("Failed to enter alternate screen")?;
    let backend = CrosstermBackend::new(stdout);
    Terminal::new(backend).context("Failed to create terminal")
}

/// Restore the terminal to its original state.
fn restore_terminal(terminal: &mut Terminal<CrosstermBackend<io::Stdout>>) -> Result<()> {
    disable_raw_mode().context("Failed to disable raw mode")?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)
        .context("Failed to leave alternate screen")?;
    terminal.show_cursor().context("Failed to show cursor")?;
    Ok(())
}

/// Restores the terminal if the dialog panics. Dropping it puts the
/// previous panic hook back.
struct PanicGuard {
    previous: Arc<PanicHook>,
}

type PanicHook = dyn Fn(&PanicHookInfo<'_>) + Send + Sync + 'static;

impl PanicGuard {
    fn install(on_panic: fn()) -> Self {
        let previous: Arc<PanicHook> = Arc::from(panic::take_hook());
        let chained = Arc::clone(&previous);
        panic::set_hook(Box::new(move |panic_info| {
            on_panic();
            chained(panic_info);
        }));
        Self { previous }
    }
}

impl Drop for PanicGuard {
    fn drop(&mut self) {
        // set_hook panics when called during unwinding.
        if std::thread::panicking() {
            return;
        }
        let previous = Arc::clone(&self.previous);
        panic::set_hook(Box::new(move |panic_info| previous(panic_info)));
    }
}

fn reset_terminal() {
    let _ = disable_raw_mode();
    let _ = execute!(io::stdout(), LeaveAlternateScreen);
}

/// Show the modal task dialog until the user submits, skips or cancels.
pub fn run_dialog(controller: &mut DialogController) -> Result<Outcome> {
    logging::hold_stderr();
    let result = run_app(controller);
    logging::release_stderr();
    result?;

    controller
        .outcome()
        .cloned()
        .ok_or_else(|| anyhow!("dialog closed without a result"))
}

fn run_app(controller: &mut DialogController) -> Result<()> {
    let mut terminal = setup_terminal()?;
    let guard = PanicGuard::install(reset_terminal);
    let mut app = App::new(controller);

    let result = (|| -> Result<()> {
        loop {
            terminal
                .draw(|f| app.render(f))
                .context("Failed to draw frame")?;

            if app.should_quit() {
                break;
            }

            if event::poll(Duration::from_millis(200)).context("Failed to poll events")?
                && let Event::Key(key) = event::read().context("Failed to read event")?
                && key.kind == event::KeyEventKind::Press
            {
                app.handle_input(key);
            }
        }
        Ok(())
    })();

    let restored = restore_terminal(&mut terminal);
    drop(guard);
    restored?;
    result
}
