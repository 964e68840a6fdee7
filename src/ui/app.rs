// Terminal front end: search box, results, queue and player panel.
// Key presses become controller commands; everything the controller needs
// to hear about arrives on its event channel and is drained once per frame.

use std::io;
use std::sync::Arc;
use std::time::Duration;

use crossterm::{
    event::{self, DisableMouseCapture, EnableMouseCapture, Event as TermEvent, KeyCode},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{
    backend::{Backend, CrosstermBackend},
    layout::{Constraint, Direction, Layout},
    style::{Color, Modifier, Style},
    widgets::{Block, Borders, List, ListItem, Paragraph},
    Frame, Terminal,
};
use tracing::info;

use crate::error::Result;
use crate::player::controller::{Controller, PlaybackStatus};
use crate::player::events::{Command, Event, EventReceiver};
use crate::youtube::{search_or_empty, SearchService};

const INPUT_POLL: Duration = Duration::from_millis(100);

const HELP: &str = "Controls: [/]Search [j/k]Select [Enter]Play [a]Add [↑/↓]Queue [p]Play queued [n]Next [Space]Pause [s]Stop [c]Clear [q]Quit";

fn panel(title: &'static str) -> Block<'static> {
    Block::default().borders(Borders::ALL).title(title)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum AppMode {
    Normal,
    Searching,
}

pub struct MusicPlayerApp {
    controller: Controller,
    rx: EventReceiver,
    search: Arc<dyn SearchService>,
    mode: AppMode,
    search_query: String,
    selected_result: usize,
    selected_queue_item: usize,
    should_quit: bool,
    is_searching: bool,
    status_message: String,
}

impl MusicPlayerApp {
    /// `rx` must be the receiving half of the channel the controller was
    /// built with.
    pub fn new(controller: Controller, rx: EventReceiver, search: Arc<dyn SearchService>) -> Self {
        MusicPlayerApp {
            controller,
            rx,
            search,
            mode: AppMode::Normal,
            search_query: String::new(),
            selected_result: 0,
            selected_queue_item: 0,
            should_quit: false,
            is_searching: false,
            status_message: String::new(),
        }
    }

    pub async fn run(&mut self) -> Result<()> {
        enable_raw_mode()?;
        execute!(io::stdout(), EnterAlternateScreen, EnableMouseCapture)?;
        let mut terminal = Terminal::new(CrosstermBackend::new(io::stdout()))?;

        let result = self.event_loop(&mut terminal).await;

        // Restore the terminal even if the loop failed
        disable_raw_mode()?;
        execute!(
            terminal.backend_mut(),
            LeaveAlternateScreen,
            DisableMouseCapture
        )?;
        terminal.show_cursor()?;

        result
    }

    async fn event_loop<B: Backend>(&mut self, terminal: &mut Terminal<B>) -> Result<()> {
        loop {
            self.drain_events();

            terminal.draw(|f| self.draw_ui(f))?;

            if event::poll(INPUT_POLL)? {
                if let TermEvent::Key(key) = event::read()? {
                    self.handle_input(key.code);
                }
            }

            if self.should_quit {
                self.controller.handle(Command::Stop.into());
                info!("Player exiting");
                return Ok(());
            }

            // Let engine and watchdog tasks make progress between frames
            tokio::task::yield_now().await;
        }
    }

    // Feeds everything that arrived since the last frame into the controller
    fn drain_events(&mut self) {
        while let Ok(event) = self.rx.try_recv() {
            if let Event::SearchResults(results) = &event {
                self.is_searching = false;
                self.selected_result = 0;
                self.status_message = format!("Found {} results", results.len());
            }
            self.controller.handle(event);
        }
    }

    fn draw_ui(&self, frame: &mut Frame) {
        let rows = Layout::default()
            .direction(Direction::Vertical)
            .constraints([Constraint::Length(3), Constraint::Min(10), Constraint::Length(5)])
            .split(frame.size());
        let columns = Layout::default()
            .direction(Direction::Horizontal)
            .constraints([Constraint::Percentage(50), Constraint::Percentage(50)])
            .split(rows[1]);

        frame.render_widget(self.header_widget(), rows[0]);
        frame.render_widget(self.results_widget(), columns[0]);
        frame.render_widget(self.queue_widget(), columns[1]);
        frame.render_widget(self.player_widget(), rows[2]);
    }

    fn header_widget(&self) -> Paragraph<'static> {
        let text = match (self.is_searching, self.mode) {
            (true, _) => "Searching... please wait".to_string(),
            (false, AppMode::Searching) => format!("Search: {}_", self.search_query),
            (false, AppMode::Normal) if !self.status_message.is_empty() => self.status_message.clone(),
            (false, AppMode::Normal) => HELP.to_string(),
        };
        Paragraph::new(text).block(panel("YouTube Music Player"))
    }

    fn results_widget(&self) -> List<'static> {
        let items: Vec<ListItem> = self
            .controller
            .results()
            .iter()
            .enumerate()
            .map(|(i, track)| {
                let highlight = i == self.selected_result;
                let style = match highlight {
                    true => Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD),
                    false => Style::default(),
                };
                ListItem::new(format!("{} - {}", track.name, track.artist)).style(style)
            })
            .collect();
        List::new(items).block(panel("Search Results"))
    }

    // The current position gets a marker; the cursor used by `p` is reversed
    fn queue_widget(&self) -> List<'static> {
        let position = self.controller.position();
        let items: Vec<ListItem> = self
            .controller
            .queue()
            .tracks()
            .iter()
            .enumerate()
            .map(|(i, track)| {
                let current = position == Some(i);
                let mut style = match current {
                    true => Style::default().fg(Color::Green),
                    false => Style::default(),
                };
                if i == self.selected_queue_item {
                    style = style.add_modifier(Modifier::BOLD | Modifier::REVERSED);
                }
                let marker = if current { "▶" } else { " " };
                ListItem::new(format!("{} {} - {}", marker, track.name, track.artist)).style(style)
            })
            .collect();
        List::new(items).block(panel("Queue"))
    }

    fn player_widget(&self) -> Paragraph<'static> {
        let controller = &self.controller;
        let now_playing = controller
            .current()
            .map(|track| format!("Now Playing: {} - {}", track.name, track.artist))
            .unwrap_or_else(|| "No track playing".to_string());

        let status = match controller.status() {
            PlaybackStatus::Idle => "⏹ Stopped",
            PlaybackStatus::Loading => "… Loading",
            PlaybackStatus::Playing => "▶ Playing",
            PlaybackStatus::Paused => "⏸ Paused",
            PlaybackStatus::Ended => "⏹ Finished",
        };
        let watchdog = if controller.armed().is_some() { "armed" } else { "idle" };
        let engine = controller
            .engine_instance()
            .map(|instance| format!("#{instance}"))
            .unwrap_or_else(|| "none".to_string());

        let lines = format!(
            "{now_playing}\nState: {status} | Watchdog: {watchdog} | Engine: {engine} | Reloads: {}\nQueue: {} tracks",
            controller.recoveries(),
            controller.queue().len()
        );
        Paragraph::new(lines).block(panel("Player"))
    }

    fn handle_input(&mut self, key: KeyCode) {
        match self.mode {
            AppMode::Searching => match key {
                KeyCode::Char(c) => self.search_query.push(c),
                KeyCode::Backspace => {
                    self.search_query.pop();
                }
                KeyCode::Enter => {
                    let query = std::mem::take(&mut self.search_query);
                    self.perform_search(query);
                    self.mode = AppMode::Normal;
                }
                KeyCode::Esc => {
                    self.mode = AppMode::Normal;
                    self.search_query.clear();
                }
                _ => {}
            },
            AppMode::Normal => {
                self.status_message.clear();

                match key {
                    KeyCode::Char('q') => self.should_quit = true,
                    KeyCode::Char('/') => self.mode = AppMode::Searching,
                    KeyCode::Char('j') => self.next_search_result(),
                    KeyCode::Char('k') => self.prev_search_result(),
                    KeyCode::Down => self.next_queue_item(),
                    KeyCode::Up => self.prev_queue_item(),
                    KeyCode::Enter => self.play_selected(),
                    KeyCode::Char('a') => self.add_selected_to_queue(),
                    KeyCode::Char('p') => {
                        self.send(Command::PlayAt(self.selected_queue_item));
                    }
                    KeyCode::Char(' ') => self.send(Command::TogglePause),
                    KeyCode::Char('n') => {
                        self.status_message = "Playing next track...".to_string();
                        self.send(Command::Skip);
                    }
                    KeyCode::Char('s') => self.send(Command::Stop),
                    KeyCode::Char('c') => {
                        self.send(Command::Clear);
                        self.selected_queue_item = 0;
                        self.status_message = "Queue cleared".to_string();
                    }
                    _ => {}
                }
            }
        }
    }

    fn send(&mut self, command: Command) {
        self.controller.handle(command.into());
    }

    // Runs the search off the UI loop; the results come back as an Event
    fn perform_search(&mut self, query: String) {
        if query.trim().is_empty() {
            return;
        }

        self.is_searching = true;
        let search = self.search.clone();
        let tx = self.controller.sender();

        tokio::spawn(async move {
            let results = search_or_empty(search.as_ref(), &query).await;
            let _ = tx.send(Event::SearchResults(results));
        });
    }

    fn play_selected(&mut self) {
        if let Some(track) = self.controller.results().get(self.selected_result).cloned() {
            self.status_message = format!("Loading: {}...", track.name);
            self.send(Command::InstantPlay(track));
        }
    }

    fn add_selected_to_queue(&mut self) {
        if let Some(track) = self.controller.results().get(self.selected_result).cloned() {
            let name = track.name.clone();
            self.send(Command::AddToQueue(track));
            self.status_message = format!(
                "Added '{}' to queue! ({} total)",
                name,
                self.controller.queue().len()
            );
        }
    }

    fn next_search_result(&mut self) {
        let len = self.controller.results().len();
        if len > 0 {
            self.selected_result = (self.selected_result + 1) % len;
        }
    }

    fn prev_search_result(&mut self) {
        let len = self.controller.results().len();
        if len > 0 {
            self.selected_result = if self.selected_result == 0 {
                len - 1
            } else {
                self.selected_result - 1
            };
        }
    }

    fn next_queue_item(&mut self) {
        let len = self.controller.queue().len();
        if len > 0 {
            self.selected_queue_item = (self.selected_queue_item + 1) % len;
        }
    }

    fn prev_queue_item(&mut self) {
        let len = self.controller.queue().len();
        if len > 0 {
            self.selected_queue_item = if self.selected_queue_item == 0 {
                len - 1
            } else {
                self.selected_queue_item - 1
            };
        }
    }
}
