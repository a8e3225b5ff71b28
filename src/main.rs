mod app;
mod connection;
mod constants;
mod core;
mod framer;
mod headless;
mod highlight;
mod input;
mod transport;
mod tui;

use anyhow::{Context, Result};
use app::App;
use clap::Parser;
use crate::constants::{DEFAULT_BAUD_RATE, DEFAULT_MAX_CHUNK_LENGTH, POLL_INTERVAL_MS};
use crate::core::settings::is_supported_baud_rate;
use crate::core::{InputMode, LogCategory, Settings, SettingsStore};
use crossterm::{
    event::{
        self, DisableMouseCapture, EnableMouseCapture, Event, KeyCode, KeyModifiers, MouseEventKind,
    },
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{backend::CrosstermBackend, Terminal};
use std::fs::File;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{fmt, EnvFilter};

const MOUSE_SCROLL_LINES: usize = 3;

#[derive(Parser)]
#[command(name = "serialterm")]
#[command(about = "Serial port terminal with live filtering")]
struct Cli {
    #[arg(help = "Serial device path, or tcp://host:port for a serial bridge")]
    device: String,

    #[arg(short = 'b', long = "baud", default_value_t = DEFAULT_BAUD_RATE, value_parser = parse_baud_rate)]
    baud: u32,

    #[arg(long = "max-chunk", default_value_t = DEFAULT_MAX_CHUNK_LENGTH, help = "Longest partial line before it is forced out")]
    max_chunk: usize,

    #[arg(long, help = "Tag lines mentioning errors or warnings")]
    classify: bool,

    #[arg(long, help = "Connect immediately and print records as JSON lines")]
    headless: bool,

    #[arg(long = "log-file", help = "Write diagnostics to this file (RUST_LOG sets the level)")]
    log_file: Option<PathBuf>,
}

fn parse_baud_rate(value: &str) -> Result<u32, String> {
    let baud: u32 = value.parse().map_err(|_| format!("'{}' is not a number", value))?;
    if is_supported_baud_rate(baud) {
        Ok(baud)
    } else {
        Err(format!("{} is not a supported baud rate", baud))
    }
}

fn init_tracing(path: &Path) -> Result<()> {
    let log_file = File::create(path).with_context(|| format!("cannot create {}", path.display()))?;
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(Arc::new(log_file)).with_ansi(false))
        .with(env_filter)
        .init();
    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    if let Some(path) = &cli.log_file {
        init_tracing(path)?;
    }

    let mut settings = SettingsStore::new(Settings {
        baud_rate: cli.baud,
        max_chunk_length: cli.max_chunk.max(1),
        classify: cli.classify,
    });
    settings.subscribe(None, |s| {
        tracing::info!(baud = s.baud_rate, classify = s.classify, "settings changed")
    });

    let app = App::new(transport::transport_for(&cli.device), settings);

    if cli.headless {
        return headless::run(app, &mut io::stdout().lock());
    }

    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen, EnableMouseCapture)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let result = run_app(&mut terminal, app);

    disable_raw_mode()?;
    execute!(
        terminal.backend_mut(),
        LeaveAlternateScreen,
        DisableMouseCapture
    )?;
    terminal.show_cursor()?;

    if let Err(e) = result {
        eprintln!("Error: {}", e);
    }

    Ok(())
}

fn run_app(terminal: &mut Terminal<CrosstermBackend<io::Stdout>>, mut app: App) -> Result<()> {
    loop {
        let visible_height = terminal.size()?.height.saturating_sub(tui::CHROME_HEIGHT) as usize;
        app.set_viewport_height(visible_height);
        app.tick();

        terminal.draw(|f| tui::draw(f, &app))?;

        if !event::poll(Duration::from_millis(POLL_INTERVAL_MS))? {
            continue;
        }
        match event::read()? {
            Event::Mouse(mouse) => match mouse.kind {
                MouseEventKind::ScrollUp => app.scroll_up(MOUSE_SCROLL_LINES),
                MouseEventKind::ScrollDown => app.scroll_down(MOUSE_SCROLL_LINES),
                _ => {}
            },
            Event::Key(key) => {
                if app.show_quit_confirm {
                    if key.code == KeyCode::Char('y') {
                        return Ok(());
                    }
                    app.show_quit_confirm = false;
                    continue;
                }
                app.status_message = None;

                match app.input_mode {
                    InputMode::Normal => match key.code {
                        KeyCode::Char('q') => {
                            if app.connection.is_reading() {
                                app.show_quit_confirm = true;
                            } else {
                                return Ok(());
                            }
                        }
                        KeyCode::Char('c') if key.modifiers.contains(KeyModifiers::CONTROL) => {
                            return Ok(())
                        }
                        KeyCode::Char('o') => app.toggle_connection(),
                        KeyCode::Char('b') => app.cycle_baud(true),
                        KeyCode::Char('B') => app.cycle_baud(false),
                        KeyCode::Char('C') => app.toggle_classify(),
                        KeyCode::Char('/') | KeyCode::Char('f') => app.input_mode = InputMode::SearchEdit,
                        KeyCode::Char('i') => app.input_mode = InputMode::SendEdit,
                        KeyCode::Char('c') => app.clear(),
                        KeyCode::Char(c @ '1'..='6') => {
                            let index = c as usize - '1' as usize;
                            app.toggle_category(LogCategory::ALL[index]);
                        }
                        KeyCode::Char('g') | KeyCode::Home => app.jump_to_top(),
                        KeyCode::Char('G') | KeyCode::End => app.jump_to_bottom(),
                        KeyCode::Up | KeyCode::Char('k') => app.scroll_up(1),
                        KeyCode::Down | KeyCode::Char('j') => app.scroll_down(1),
                        KeyCode::PageUp => app.scroll_up(visible_height),
                        KeyCode::PageDown => app.scroll_down(visible_height),
                        _ => {}
                    },
                    InputMode::SearchEdit => {
                        if app.handle_input_key(key.code) {
                            app.input_mode = InputMode::Normal;
                        }
                        app.apply_search();
                    }
                    InputMode::SendEdit => {
                        if app.handle_input_key(key.code) {
                            app.send_message();
                        }
                    }
                }
            }
            _ => {}
        }
    }
}
