//! Terminal console for remote command sessions.
//!
//! Attaches to a session on the server (creating one when none exists)
//! and renders the live transcript with a single input line.
//!
//! Run with: cargo run -p tui-app -- --server http://127.0.0.1:8000

use std::{io, path::PathBuf, sync::Arc, time::Duration};

use anyhow::Context as _;
use clap::Parser;
use crossterm::{
    event::{self, Event, KeyCode, KeyEvent, KeyModifiers},
    execute,
    terminal::{EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode},
};
use ratatui::{
    Frame, Terminal,
    backend::CrosstermBackend,
    layout::{Constraint, Direction, Layout},
    style::{Color, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Paragraph, Wrap},
};
use tokio::sync::broadcast;

use agent_console_client::{ClientConfig, SessionClient};
use agent_console_core::{
    ClientEvent, ConnectionStatus, EntryKind, NewSession, Session, SessionDirectory,
    TranscriptEntry,
};
use agent_console_session::HttpDirectory;
use agent_console_transport::{WsTransport, ws_url};

#[derive(Parser, Debug)]
#[command(version, about = "Terminal console for remote command sessions")]
struct Args {
    /// Base URL of the session server.
    #[arg(long, default_value = "http://127.0.0.1:8000")]
    server: String,
    /// Session id to attach to; defaults to the most recent session.
    #[arg(long)]
    session: Option<String>,
    /// Title used when a session must be created.
    #[arg(long, default_value = "Console session")]
    title: String,
    /// Working directory for a created session; defaults to the current one.
    #[arg(long)]
    working_dir: Option<PathBuf>,
    /// Model for a created session; the server default applies when omitted.
    #[arg(long)]
    model: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Resolve the session before touching the terminal so failures print
    // as ordinary errors.
    let directory = Arc::new(HttpDirectory::new(&args.server));
    directory
        .health()
        .await
        .with_context(|| format!("server at {} is not reachable", args.server))?;
    let session = resolve_session(directory.as_ref(), &args).await?;

    let client = SessionClient::new(
        ws_url(&args.server)?,
        ClientConfig::from_env(),
        Arc::new(WsTransport),
        directory,
    );
    let events = client.subscribe();
    client.select_session(&session.id).await?;

    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let result = run_app(&mut terminal, &client, events, &session).await;

    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;
    client.close().await;

    result
}

/// Pick the session to attach to: an explicit id, else the most recent,
/// else a freshly created one.
async fn resolve_session(directory: &HttpDirectory, args: &Args) -> anyhow::Result<Session> {
    if let Some(id) = &args.session {
        return directory
            .get_session(id)
            .await?
            .with_context(|| format!("no session with id {id}"));
    }
    let sessions = directory.list_sessions().await?;
    if let Some(session) = sessions.into_iter().next() {
        return Ok(session);
    }
    let working_dir = match &args.working_dir {
        Some(dir) => dir.clone(),
        None => std::env::current_dir().context("cannot determine working directory")?,
    };
    directory
        .create_session(NewSession {
            title: args.title.clone(),
            working_dir,
            model: args.model.clone(),
        })
        .await
        .context("failed to create session")
}

struct App {
    entries: Vec<TranscriptEntry>,
    banner: Option<String>,
    input: String,
    scroll: u16,
    status: ConnectionStatus,
    busy: bool,
    input_enabled: bool,
}

impl App {
    fn new() -> Self {
        Self {
            entries: Vec::new(),
            banner: None,
            input: String::new(),
            scroll: 0,
            status: ConnectionStatus::Idle,
            busy: false,
            input_enabled: false,
        }
    }

    fn apply(&mut self, event: ClientEvent) {
        match event {
            ClientEvent::Entry(entry) => {
                self.upsert(entry);
                self.auto_scroll();
            }
            ClientEvent::Status(status) => self.status = status,
            ClientEvent::Busy(busy) => self.busy = busy,
            ClientEvent::InputEnabled(enabled) => self.input_enabled = enabled,
            ClientEvent::SessionReady(session) => {
                self.banner = Some(format!(
                    "Session '{}' ready (model {})",
                    session.title, session.model
                ));
            }
        }
    }

    /// Streamed snapshots share an id; replace the rendition in place.
    fn upsert(&mut self, entry: TranscriptEntry) {
        if let Some(existing) = self.entries.iter_mut().rev().find(|e| e.id == entry.id) {
            *existing = entry;
        } else {
            self.entries.push(entry);
        }
    }

    fn line_count(&self) -> usize {
        let banner = if self.banner.is_some() { 2 } else { 0 };
        banner
            + self
                .entries
                .iter()
                .map(|e| e.text.split('\n').count())
                .sum::<usize>()
    }

    fn auto_scroll(&mut self) {
        // Approximate visible height; fine-grained scrolling stays manual.
        let visible = 20usize;
        let total = self.line_count();
        if total > visible {
            self.scroll = u16::try_from(total - visible).unwrap_or(u16::MAX);
        }
    }
}

async fn run_app(
    terminal: &mut Terminal<CrosstermBackend<io::Stdout>>,
    client: &SessionClient,
    mut events: broadcast::Receiver<ClientEvent>,
    session: &Session,
) -> anyhow::Result<()> {
    let mut app = App::new();

    loop {
        loop {
            match events.try_recv() {
                Ok(event) => app.apply(event),
                Err(broadcast::error::TryRecvError::Lagged(_)) => {}
                Err(_) => break,
            }
        }

        terminal.draw(|f| ui(f, &app, session))?;

        if event::poll(Duration::from_millis(50))? {
            if let Event::Key(key) = event::read()? {
                match key {
                    KeyEvent {
                        code: KeyCode::Char('c'),
                        modifiers: KeyModifiers::CONTROL,
                        ..
                    } => return Ok(()),
                    KeyEvent {
                        code: KeyCode::Char(c),
                        modifiers: KeyModifiers::NONE | KeyModifiers::SHIFT,
                        ..
                    } => app.input.push(c),
                    KeyEvent {
                        code: KeyCode::Backspace,
                        ..
                    } => {
                        app.input.pop();
                    }
                    KeyEvent {
                        code: KeyCode::Enter,
                        ..
                    } => {
                        let text = app.input.trim().to_string();
                        // Rejections surface as transcript diagnostics;
                        // keep the text so it can be resent.
                        if !text.is_empty() && client.submit(text).await.is_ok() {
                            app.input.clear();
                        }
                    }
                    KeyEvent {
                        code: KeyCode::Up,
                        modifiers: KeyModifiers::NONE,
                        ..
                    } => app.scroll = app.scroll.saturating_sub(1),
                    KeyEvent {
                        code: KeyCode::Down,
                        modifiers: KeyModifiers::NONE,
                        ..
                    } => app.scroll = app.scroll.saturating_add(1),
                    KeyEvent {
                        code: KeyCode::PageUp,
                        ..
                    } => app.scroll = app.scroll.saturating_sub(10),
                    KeyEvent {
                        code: KeyCode::PageDown,
                        ..
                    } => app.scroll = app.scroll.saturating_add(10),
                    _ => {}
                }
            }
        }
    }
}

fn ui(f: &mut Frame, app: &App, session: &Session) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Min(3),    // Transcript
            Constraint::Length(3), // Input
            Constraint::Length(1), // Status
        ])
        .split(f.area());

    let transcript = Paragraph::new(transcript_lines(app))
        .block(Block::default().borders(Borders::ALL).title("Transcript"))
        .wrap(Wrap { trim: false })
        .scroll((app.scroll, 0));
    f.render_widget(transcript, chunks[0]);

    let input_title = if app.input_enabled {
        "Input"
    } else {
        "Input (waiting)"
    };
    let input = Paragraph::new(app.input.as_str())
        .style(Style::default().fg(Color::Yellow))
        .block(Block::default().borders(Borders::ALL).title(input_title));
    f.render_widget(input, chunks[1]);
    f.set_cursor_position((
        chunks[1].x + u16::try_from(app.input.len()).unwrap_or(u16::MAX) + 1,
        chunks[1].y + 1,
    ));

    let status_style = match app.status {
        ConnectionStatus::Live => Style::default().fg(Color::Green),
        ConnectionStatus::Closed => Style::default().fg(Color::Red),
        _ => Style::default().fg(Color::Yellow),
    };
    let mut spans = vec![
        Span::raw(" "),
        Span::raw(session.title.clone()),
        Span::raw(" | "),
        Span::styled(status_label(app.status), status_style),
    ];
    if app.busy {
        spans.push(Span::styled(
            " | processing...",
            Style::default().fg(Color::Yellow),
        ));
    }
    spans.extend([
        Span::raw(" | "),
        Span::styled("Ctrl+C", Style::default().fg(Color::Yellow)),
        Span::raw(" quit | "),
        Span::styled("Up/Down/PgUp/PgDn", Style::default().fg(Color::Yellow)),
        Span::raw(" scroll "),
    ]);
    f.render_widget(Paragraph::new(Line::from(spans)), chunks[2]);
}

fn transcript_lines(app: &App) -> Vec<Line<'_>> {
    let mut lines = Vec::new();
    if let Some(banner) = &app.banner {
        lines.push(Line::from(Span::styled(
            banner.as_str(),
            Style::default().fg(Color::DarkGray),
        )));
        lines.push(Line::from(""));
    }
    for entry in &app.entries {
        lines.extend(entry_lines(entry));
    }
    lines
}

fn entry_lines(entry: &TranscriptEntry) -> Vec<Line<'_>> {
    let (prefix, style) = match entry.kind {
        EntryKind::User => ("> ", Style::default().fg(Color::Cyan)),
        EntryKind::Assistant => ("", Style::default()),
        EntryKind::Tool => ("[tool] ", Style::default().fg(Color::Magenta)),
        EntryKind::Plan => ("[plan] ", Style::default().fg(Color::Blue)),
        EntryKind::Error => ("[error] ", Style::default().fg(Color::Red)),
    };
    let mut lines = Vec::new();
    for (i, part) in entry.text.split('\n').enumerate() {
        let mut spans = Vec::new();
        if i == 0 && !prefix.is_empty() {
            spans.push(Span::styled(prefix, style));
        }
        spans.push(Span::styled(part, style));
        lines.push(Line::from(spans));
    }
    if !entry.sealed {
        if let Some(last) = lines.last_mut() {
            last.spans
                .push(Span::styled("...", Style::default().fg(Color::DarkGray)));
        }
    }
    lines
}

const fn status_label(status: ConnectionStatus) -> &'static str {
    match status {
        ConnectionStatus::Idle => "idle",
        ConnectionStatus::Initializing => "connecting...",
        ConnectionStatus::Handshaking => "handshaking...",
        ConnectionStatus::Live => "connected",
        ConnectionStatus::Closing => "closing...",
        ConnectionStatus::Closed => "disconnected",
    }
}
