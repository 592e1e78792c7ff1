use std::time::{Duration, Instant};

use anyhow::Result;
use crossterm::{event::{self, DisableMouseCapture, EnableMouseCapture, Event, KeyCode, KeyEventKind}, execute, terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen}};
use ratatui::{backend::CrosstermBackend, Terminal, widgets::{Block, Borders, List, ListItem, Paragraph, ListState}, layout::{Layout, Constraint, Direction}, style::{Style, Modifier, Color}};
use tokio::sync::broadcast;

use lifeos::{
    application::{notice::{Notice, NoticeLevel}, reconcile::spawn_reconciler, task_list::{ListView, RemovalTicket, TaskListManager}},
    config::AppConfig,
    domain::{ordering::reorder, store::TaskStore, task::{Task, TaskId, MAX_LABEL_CHARS}},
    infrastructure::{broadcast_feed::BroadcastChangeFeed, sqlite_store::SqliteTaskStore},
};

const TOAST_TTL: Duration = Duration::from_secs(3);

#[tokio::main]
async fn main() -> Result<()> {
    let _ = dotenvy::dotenv();
    let config = AppConfig::from_env()?;
    let feed = BroadcastChangeFeed::default();
    let store = SqliteTaskStore::connect(&config.database_url, feed.clone()).await?;
    store.init().await?;
    let manager = TaskListManager::new(store, config.owner);

    let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
    let reconciler = spawn_reconciler(manager.clone(), &feed, shutdown_rx);
    let first_load = tokio::spawn({
        let manager = manager.clone();
        async move { let _ = manager.load().await; }
    });

    // Terminal setup
    enable_raw_mode()?;
    let mut stdout = std::io::stdout();
    execute!(stdout, EnterAlternateScreen, EnableMouseCapture)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let res = run_app(&mut terminal, manager).await;

    // Restore terminal
    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen, DisableMouseCapture)?;
    terminal.show_cursor()?;

    let _ = shutdown_tx.send(());
    first_load.await?;
    reconciler.await?;
    res
}

#[derive(Clone, PartialEq, Eq)]
enum Mode {
    View,
    Create,
    Confirm(RemovalTicket),
    /// A task picked up and being carried to a new slot.
    Carry { id: TaskId, from: usize },
}

struct App<S: TaskStore> {
    manager: TaskListManager<S>,
    notices: broadcast::Receiver<Notice>,
    view: ListView,
    selected: usize,
    list_state: ListState,
    mode: Mode,
    draft: String,
    toast: Option<(Notice, Instant)>,
}

impl<S: TaskStore> App<S> {
    async fn refresh(&mut self) {
        self.view = self.manager.view().await;
        loop {
            match self.notices.try_recv() {
                Ok(notice) => self.toast = Some((notice, Instant::now())),
                Err(broadcast::error::TryRecvError::Lagged(_)) => continue,
                Err(_) => break,
            }
        }
        if self.toast.as_ref().is_some_and(|(_, at)| at.elapsed() > TOAST_TTL) {
            self.toast = None;
        }
        let len = self.view.tasks.len();
        if len == 0 { self.selected = 0; self.list_state.select(None); }
        else { if self.selected >= len { self.selected = len - 1; } self.list_state.select(Some(self.selected)); }
    }

    /// Tasks in display order, with a carried task previewed at the cursor.
    fn rows(&self) -> Vec<Task> {
        match &self.mode {
            Mode::Carry { from, .. } if *from != self.selected => {
                reorder(&self.view.tasks, *from, self.selected).unwrap_or_else(|_| self.view.tasks.clone())
            }
            _ => self.view.tasks.clone(),
        }
    }

    fn selected_task(&self) -> Option<&Task> { self.view.tasks.get(self.selected) }

    fn spawn<F, Fut>(&self, op: F)
    where
        F: FnOnce(TaskListManager<S>) -> Fut,
        Fut: std::future::Future<Output = ()> + Send + 'static,
    {
        // Outcomes come back as notices.
        tokio::spawn(op(self.manager.clone()));
    }
}

async fn run_app<S: TaskStore>(terminal: &mut Terminal<CrosstermBackend<std::io::Stdout>>, manager: TaskListManager<S>) -> Result<()> {
    let tick_rate = Duration::from_millis(200);
    let notices = manager.subscribe_notices();
    let view = manager.view().await;
    let mut app = App { manager, notices, view, selected: 0, list_state: ListState::default(), mode: Mode::View, draft: String::new(), toast: None };

    loop {
        app.refresh().await;
        let rows = app.rows();
        terminal.draw(|f| {
            let chunks = Layout::default()
                .direction(Direction::Vertical)
                .constraints([
                    Constraint::Length(3),
                    Constraint::Min(1),
                    Constraint::Length(3),
                    Constraint::Length(3),
                ])
                .split(f.size());

            let header = Paragraph::new("Space: toggle, n: new, d: delete, m: move (Up/Down, Enter drops), r: reload, q: quit")
                .block(Block::default().borders(Borders::ALL).title("lifeos"));
            f.render_widget(header, chunks[0]);

            let title = if app.view.tasks.is_empty() { "My Tasks".to_string() } else { format!("My Tasks ({})", app.view.summary) };
            let list_items: Vec<ListItem> = if app.view.skeleton {
                (0..3).map(|_| ListItem::new("░░░░░░░░░░░░░░░░░░░░").style(Style::default().fg(Color::DarkGray))).collect()
            } else if rows.is_empty() {
                vec![ListItem::new("No tasks yet. Add one with n!").style(Style::default().fg(Color::DarkGray))]
            } else {
                rows.iter().map(|t| {
                    let mark = if t.completed { "[x]" } else { "[ ]" };
                    let mut style = Style::default();
                    if t.completed { style = style.fg(Color::DarkGray).add_modifier(Modifier::CROSSED_OUT); }
                    if app.view.deleting.contains(&t.id) { style = style.fg(Color::Red); }
                    if matches!(app.mode, Mode::Carry { id, .. } if id == t.id) { style = style.fg(Color::Yellow); }
                    ListItem::new(format!("{} {}  ({})", mark, t.label, t.created_at.format("%Y-%m-%d"))).style(style)
                }).collect()
            };
            let list = List::new(list_items)
                .block(Block::default().borders(Borders::ALL).title(title))
                .highlight_style(Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD | Modifier::REVERSED))
                .highlight_symbol(">> ");
            f.render_stateful_widget(list, chunks[1], &mut app.list_state);

            let (form_title, form_text) = match &app.mode {
                Mode::Create if app.view.inserting => ("Adding...".to_string(), String::new()),
                Mode::Create => (format!("Add a new task ({}/{})", app.draft.chars().count(), MAX_LABEL_CHARS), format!("{}_", app.draft)),
                Mode::Confirm(ticket) => ("confirm".to_string(), format!("{} (y/n)", ticket.prompt())),
                Mode::Carry { .. } => ("move".to_string(), "Up/Down to carry, Enter to drop, Esc to cancel".to_string()),
                Mode::View => ("add".to_string(), "press n to add a task".to_string()),
            };
            f.render_widget(Paragraph::new(form_text).block(Block::default().borders(Borders::ALL).title(form_title)), chunks[2]);

            let toast = match &app.toast {
                Some((n, _)) => Paragraph::new(n.message.clone()).style(Style::default().fg(match n.level { NoticeLevel::Success => Color::Green, NoticeLevel::Error => Color::Red })),
                None => Paragraph::new(""),
            };
            f.render_widget(toast.block(Block::default().borders(Borders::ALL).title("status")), chunks[3]);
        })?;

        if !event::poll(tick_rate)? { continue; }
        let Event::Key(key) = event::read()? else { continue };
        // Only act on key presses; ignore repeats and releases to prevent duplicate input
        if key.kind != KeyEventKind::Press { continue; }
        match app.mode.clone() {
            Mode::View => match key.code {
                KeyCode::Char('q') => break,
                KeyCode::Up => { if app.selected > 0 { app.selected -= 1; } }
                KeyCode::Down => { if app.selected + 1 < app.view.tasks.len() { app.selected += 1; } }
                KeyCode::Char(' ') | KeyCode::Enter => {
                    if let Some(id) = app.selected_task().map(|t| t.id) {
                        app.spawn(move |m| async move { let _ = m.toggle_completion(id).await; });
                    }
                }
                KeyCode::Char('n') => { app.mode = Mode::Create; app.draft.clear(); }
                KeyCode::Char('d') => {
                    if let Some(id) = app.selected_task().map(|t| t.id) {
                        if let Ok(ticket) = app.manager.request_removal(id).await { app.mode = Mode::Confirm(ticket); }
                    }
                }
                KeyCode::Char('m') => {
                    if let Some(id) = app.selected_task().map(|t| t.id) { app.mode = Mode::Carry { id, from: app.selected }; }
                }
                KeyCode::Char('r') => app.spawn(|m| async move { let _ = m.load().await; }),
                _ => {}
            },
            Mode::Create => match key.code {
                KeyCode::Esc => { app.mode = Mode::View; app.draft.clear(); }
                KeyCode::Enter => {
                    if !app.draft.trim().is_empty() && !app.view.inserting {
                        let label = std::mem::take(&mut app.draft);
                        app.spawn(move |m| async move { let _ = m.insert(&label).await; });
                    }
                }
                _ if app.view.inserting => {}
                KeyCode::Backspace => { app.draft.pop(); }
                KeyCode::Char(c) => { if app.draft.chars().count() < MAX_LABEL_CHARS { app.draft.push(c); } }
                _ => {}
            },
            Mode::Confirm(ticket) => match key.code {
                KeyCode::Char('y') => {
                    app.spawn(move |m| async move { let _ = m.remove(ticket).await; });
                    app.mode = Mode::View;
                }
                KeyCode::Char('n') | KeyCode::Esc => app.mode = Mode::View,
                _ => {}
            },
            Mode::Carry { id, from } => match key.code {
                KeyCode::Up => { if app.selected > 0 { app.selected -= 1; } }
                KeyCode::Down => { if app.selected + 1 < app.view.tasks.len() { app.selected += 1; } }
                KeyCode::Enter => {
                    let to = app.selected;
                    if to != from {
                        app.spawn(move |m| async move { let _ = m.reorder(id, from, to).await; });
                    }
                    app.mode = Mode::View;
                }
                KeyCode::Esc => { app.selected = from; app.mode = Mode::View; }
                _ => {}
            },
        }
    }
    Ok(())
}
