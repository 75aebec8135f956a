// Native binary for Tailview - Terminal UI mode

use anyhow::{Context, Result};
use crossterm::{
    event::{self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{backend::CrosstermBackend, Terminal};
use std::{
    fs::OpenOptions,
    io,
    path::Path,
    time::{Duration, Instant},
};

use tailview::{app::App, config::load, ui};

/// Route logs to a file; the terminal belongs to the UI.
fn init_logging(path: &Path) -> Result<()> {
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("Failed to open log file: {}", path.display()))?;
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .target(env_logger::Target::Pipe(Box::new(file)))
        .init();
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if it exists (safe to ignore if not found)
    let _ = dotenvy::dotenv();

    let cfg = load().context("Failed to load configuration")?;
    init_logging(&cfg.log_file)?;
    log::info!("🚀 Starting tailview");
    cfg.log_summary();

    // terminal
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;
    terminal.clear()?;

    let mut app = App::start(&cfg);

    // main loop
    let result = run_loop(&mut app, &mut terminal);

    // cleanup
    app.quit();
    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;
    if let Err(ref e) = result {
        log::error!("❌ UI loop failed: {e:#}");
    }
    log::info!("👋 tailview exiting");
    result
}

fn run_loop(app: &mut App, terminal: &mut Terminal<CrosstermBackend<io::Stdout>>) -> Result<()> {
    let mut last_frame = Instant::now();
    let mut dirty = true;
    loop {
        // frame budget (coalesced renders)
        let frame_ms = 1000u32.saturating_div(app.fps()) as u64;
        let budget = Duration::from_millis(frame_ms.max(1));
        let wait = budget.saturating_sub(last_frame.elapsed());

        // input
        if event::poll(wait)? {
            match event::read()? {
                Event::Key(k) if k.kind == KeyEventKind::Press || k.kind == KeyEventKind::Repeat => {
                    handle_key(app, k);
                    dirty = true;
                }
                Event::Resize(_, _) => dirty = true,
                _ => {}
            }
        }

        // sync events + deferred scroll
        if app.tick() > 0 {
            dirty = true;
        }

        // Toasts expire on their own, so keep redrawing at least once per budget.
        if last_frame.elapsed() >= budget || dirty {
            terminal.draw(|f| ui::draw(f, app))?;
            last_frame = Instant::now();
            dirty = false;
        }
        if app.quit_flag() {
            break;
        }
    }
    Ok(())
}

fn handle_key(app: &mut App, k: KeyEvent) {
    match (k.code, k.modifiers) {
        (KeyCode::Char('q'), _) | (KeyCode::Char('c'), KeyModifiers::CONTROL) => app.quit(),

        // Scrolling
        (KeyCode::Up, _) | (KeyCode::Char('k'), _) => app.up(),
        (KeyCode::Down, _) | (KeyCode::Char('j'), _) => app.down(),
        (KeyCode::PageUp, _) => app.page_up(),
        (KeyCode::PageDown, _) | (KeyCode::Char(' '), _) => app.page_down(),
        (KeyCode::Home, _) | (KeyCode::Char('g'), _) => app.home(),
        (KeyCode::End, _) | (KeyCode::Char('G'), _) => app.end(),

        // Session
        (KeyCode::Char('m'), _) => app.toggle_mode(),
        (KeyCode::Char('n'), _) | (KeyCode::Tab, _) => app.next_source(),
        (KeyCode::Char('p'), _) | (KeyCode::BackTab, _) => app.prev_source(),
        (KeyCode::Char('r'), _) => app.resume(),
        _ => {}
    }
}
