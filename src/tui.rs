#![cfg(feature = "tui")]

use crate::app::{describe_error, Resolved};
use crate::client::{ClientEvent, Lane, LlmClient, Transport};
use crate::config::Config;
use crate::provider::{CatalogSpec, ChatMessage, Provider, RequestSpec, Role};
use anyhow::Context;
use crossterm::event::{Event, KeyCode, KeyEvent, KeyModifiers};
use crossterm::terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen};
use crossterm::execute;
use ratatui::backend::CrosstermBackend;
use ratatui::layout::{Constraint, Direction, Layout};
use ratatui::style::{Modifier, Style};
use ratatui::text::{Line, Text};
use ratatui::widgets::{Block, Borders, Paragraph, Wrap};
use ratatui::Terminal;
use std::io;
use std::sync::Arc;
use tokio::sync::mpsc;

const HELP: &str = "Type a message and press Enter. Esc cancels a reply (or quits when idle). \
Commands: /quit, /clear, /model <name>, /models, /provider <name>";

#[derive(Debug, Clone, PartialEq, Eq)]
enum Entry {
    Message(ChatMessage),
    Note(String),
    Error(String),
}

/// What the event loop should do after a key or command.
#[derive(Debug)]
enum Action {
    None,
    Quit,
    Send(RequestSpec),
    Cancel,
    FetchModels(CatalogSpec),
}

/// Conversation state, independent of the terminal.
struct ChatUi {
    resolved: Resolved,
    cfg: Option<Config>,
    entries: Vec<Entry>,
    input: String,
    /// Index in `entries` of the assistant reply being streamed.
    reply: Option<usize>,
}

impl ChatUi {
    fn new(resolved: Resolved, cfg: Option<Config>) -> Self {
        let mut ui = Self {
            resolved,
            cfg,
            entries: Vec::new(),
            input: String::new(),
            reply: None,
        };
        ui.reset();
        ui
    }

    fn reset(&mut self) {
        self.reply = None;
        self.entries = self
            .resolved
            .new_history()
            .into_iter()
            .map(Entry::Message)
            .collect();
        self.entries.push(Entry::Note(HELP.to_string()));
    }

    fn conversation(&self) -> Vec<ChatMessage> {
        self.entries
            .iter()
            .filter_map(|e| match e {
                Entry::Message(m) => Some(m.clone()),
                _ => None,
            })
            .collect()
    }

    fn streaming(&self) -> bool {
        self.reply.is_some()
    }

    fn note(&mut self, text: impl Into<String>) {
        self.entries.push(Entry::Note(text.into()));
    }

    fn key(&mut self, key: KeyEvent) -> Action {
        if key.modifiers.contains(KeyModifiers::CONTROL) && key.code == KeyCode::Char('c') {
            return Action::Quit;
        }

        match key.code {
            KeyCode::Esc if self.streaming() => Action::Cancel,
            KeyCode::Esc => Action::Quit,
            KeyCode::Char(c) => {
                self.input.push(c);
                Action::None
            }
            KeyCode::Backspace => {
                self.input.pop();
                Action::None
            }
            KeyCode::Enter => {
                let line = std::mem::take(&mut self.input);
                self.submit(line.trim())
            }
            _ => Action::None,
        }
    }

    fn submit(&mut self, line: &str) -> Action {
        if line.is_empty() {
            return Action::None;
        }

        match line {
            "/quit" => return Action::Quit,
            "/clear" => {
                let streaming = self.streaming();
                self.reset();
                return if streaming { Action::Cancel } else { Action::None };
            }
            "/models" => {
                self.note(format!("fetching {} models...", self.resolved.provider));
                return Action::FetchModels(self.resolved.catalog_spec());
            }
            _ => {}
        }

        if let Some(rest) = line.strip_prefix("/model ") {
            self.resolved.model = rest.trim().to_string();
            self.note(format!("model set to: {}", self.resolved.model));
            return Action::None;
        }
        if let Some(rest) = line.strip_prefix("/provider ") {
            match rest.parse::<Provider>() {
                Ok(provider) => {
                    self.resolved.switch_provider(provider, self.cfg.as_ref());
                    self.note(format!(
                        "provider set to: {} (model: {})",
                        self.resolved.provider, self.resolved.model
                    ));
                }
                Err(e) => self.entries.push(Entry::Error(format!("{e:#}"))),
            }
            return Action::None;
        }

        // A new message while a reply is streaming replaces that request.
        self.finish_reply();
        self.entries.push(Entry::Message(ChatMessage::new(Role::User, line)));
        let spec = self.resolved.chat_spec(self.conversation());
        self.entries.push(Entry::Message(ChatMessage::new(Role::Assistant, "")));
        self.reply = Some(self.entries.len() - 1);
        Action::Send(spec)
    }

    fn client_event(&mut self, ev: ClientEvent) {
        match ev {
            ClientEvent::TextDelta(text) => {
                if let Some(Entry::Message(m)) = self.reply.and_then(|i| self.entries.get_mut(i)) {
                    m.append(&text);
                }
            }
            ClientEvent::Error { message, .. } => self.entries.push(Entry::Error(describe_error(&message))),
            ClientEvent::Done { lane: Lane::Chat } => self.finish_reply(),
            ClientEvent::Done { lane: Lane::Catalog } => {}
            ClientEvent::ModelsReceived(ids) if ids.is_empty() => self.note("no chat models found"),
            ClientEvent::ModelsReceived(ids) => self.note(format!("available models:\n{}", ids.join("\n"))),
        }
    }

    /// Stop streaming into the current reply, removing it if no text arrived.
    fn finish_reply(&mut self) {
        let Some(pos) = self.reply.take() else {
            return;
        };
        if matches!(self.entries.get(pos), Some(Entry::Message(m)) if m.content.is_empty()) {
            self.entries.remove(pos);
        }
    }

    fn title(&self) -> String {
        let state = if self.streaming() { " (streaming, Esc to cancel)" } else { "" };
        format!(
            "llmchat | {} | model: {}{state}",
            self.resolved.provider, self.resolved.model
        )
    }
}

pub async fn run_tui(
    transport: Arc<dyn Transport>,
    resolved: Resolved,
    cfg: Option<Config>,
) -> anyhow::Result<()> {
    let (client, mut client_rx) = LlmClient::spawn(transport, resolved.settings.clone());
    let mut ui = ChatUi::new(resolved, cfg);

    enable_raw_mode().context("enable raw mode")?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen).context("enter alt screen")?;

    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend).context("create terminal")?;

    let (ev_tx, mut ev_rx) = mpsc::unbounded_channel::<Event>();
    std::thread::spawn(move || {
        while let Ok(ev) = crossterm::event::read() {
            if ev_tx.send(ev).is_err() {
                break;
            }
        }
    });

    let mut ticker = tokio::time::interval(std::time::Duration::from_millis(33));

    let res = loop {
        tokio::select! {
            _ = ticker.tick() => {
                if let Err(e) = draw(&mut terminal, &ui) {
                    break Err(e);
                }
            }
            Some(ev) = ev_rx.recv() => {
                let Event::Key(key) = ev else { continue };
                let sent = match ui.key(key) {
                    Action::None => Ok(()),
                    Action::Quit => break Ok(()),
                    Action::Send(spec) => client.send_chat(spec),
                    Action::Cancel => client.cancel(),
                    Action::FetchModels(spec) => client.fetch_models(spec),
                };
                if let Err(e) = sent {
                    break Err(e);
                }
            }
            Some(ev) = client_rx.recv() => ui.client_event(ev),
        }
    };

    disable_raw_mode().ok();
    execute!(terminal.backend_mut(), LeaveAlternateScreen).ok();
    terminal.show_cursor().ok();

    res
}

fn draw(terminal: &mut Terminal<CrosstermBackend<io::Stdout>>, ui: &ChatUi) -> anyhow::Result<()> {
    terminal.draw(|f| {
        let chunks = Layout::default()
            .direction(Direction::Vertical)
            .constraints([Constraint::Min(1), Constraint::Length(3)])
            .split(f.area());

        let mut text = Text::default();
        for entry in &ui.entries {
            let (label, body, style) = match entry {
                Entry::Message(m) => {
                    let style = match m.role {
                        Role::User => Style::default().add_modifier(Modifier::BOLD),
                        _ => Style::default(),
                    };
                    (m.role.as_str(), m.content.as_str(), style)
                }
                Entry::Note(t) => ("note", t.as_str(), Style::default().add_modifier(Modifier::DIM)),
                Entry::Error(t) => ("error", t.as_str(), Style::default().add_modifier(Modifier::BOLD)),
            };
            text.lines.push(Line::styled(format!("{label}: "), style));
            text.lines.extend(Text::from(body.to_string()).lines);
            text.lines.push(Line::from(""));
        }

        // Keep the newest lines in view.
        let area = chunks[0];
        let visible = area.height.saturating_sub(2) as usize;
        let scroll = text.lines.len().saturating_sub(visible);

        let chat = Paragraph::new(text)
            .block(Block::default().borders(Borders::ALL).title(ui.title()))
            .wrap(Wrap { trim: false })
            .scroll((u16::try_from(scroll).unwrap_or(u16::MAX), 0));

        let input_w = Paragraph::new(ui.input.as_str())
            .block(Block::default().borders(Borders::ALL).title("input"));

        f.render_widget(chat, area);
        f.render_widget(input_w, chunks[1]);

        let x = chunks[1].x + 1 + ui.input.chars().count() as u16;
        let y = chunks[1].y + 1;
        f.set_cursor_position((x.min(chunks[1].x + chunks[1].width.saturating_sub(2)), y));
    })?;
    Ok(())
}
