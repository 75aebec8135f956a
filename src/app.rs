use std::collections::BTreeMap;
use std::time::{Duration, Instant};

use chrono::FixedOffset;

use crate::config::Config;
use crate::render::{RenderHost, Renderer};
use crate::session::SessionController;
use crate::transport::DefaultTransportFactory;
use crate::types::{Mode, Record, Role};
use crate::util_text::{default_source_offset, format_clock, preview_line};

/// Widest line kept per mounted row; the UI clips to the terminal width.
const ROW_CHARS: usize = 240;

/// A record prepared for drawing at mount time.
#[derive(Clone, Debug, PartialEq)]
pub struct RowView {
    pub role: Role,
    pub clock: String,
    pub lines: Vec<String>,
}

impl RowView {
    fn build(record: &Record, item_height: u32, clock_offset: FixedOffset) -> Self {
        let body_lines = item_height.saturating_sub(1).max(1) as usize;
        let mut lines: Vec<String> = record
            .content()
            .lines()
            .filter(|l| !l.trim().is_empty())
            .take(body_lines)
            .map(|l| preview_line(l, ROW_CHARS))
            .collect();
        if lines.is_empty() {
            lines.push(String::new());
        }
        Self {
            role: record.role(),
            clock: format_clock(record.timestamp(), clock_offset),
            lines,
        }
    }
}

/// Terminal-side render host: keeps exactly the mounted rows, keyed by position.
pub struct TuiHost {
    item_height: u32,
    /// Clock labels use the source's wall-clock offset.
    clock_offset: FixedOffset,
    rows: BTreeMap<usize, RowView>,
    extent: u64,
    anchor: u64,
    placeholder: bool,
}

impl TuiHost {
    pub fn new(item_height: u32) -> Self {
        Self::with_clock_offset(item_height, default_source_offset())
    }
    pub fn with_clock_offset(item_height: u32, clock_offset: FixedOffset) -> Self {
        Self {
            item_height: item_height.max(1),
            clock_offset,
            rows: BTreeMap::new(),
            extent: 0,
            anchor: 0,
            placeholder: true,
        }
    }
    pub fn clock_offset(&self)->FixedOffset{ self.clock_offset }
    pub fn item_height(&self)->u32{ self.item_height }
    pub fn rows(&self)->&BTreeMap<usize, RowView>{ &self.rows }
    pub fn extent(&self)->u64{ self.extent }
    pub fn anchor(&self)->u64{ self.anchor }
    pub fn placeholder(&self)->bool{ self.placeholder }
}

impl RenderHost for TuiHost {
    fn mount(&mut self, record: &Record, position: usize) {
        self.rows.insert(position, RowView::build(record, self.item_height, self.clock_offset));
    }
    fn unmount(&mut self, position: usize) {
        self.rows.remove(&position);
    }
    fn set_total_extent(&mut self, extent: u64) {
        self.extent = extent;
    }
    fn set_scroll_anchor(&mut self, offset: u64) {
        self.anchor = offset;
    }
    fn set_placeholder(&mut self, visible: bool) {
        self.placeholder = visible;
    }
}

pub struct App {
    quit: bool,
    fps: u32,
    controller: SessionController<TuiHost>,
    sources: Vec<String>,
    source_idx: usize,
    toast_message: Option<(String, Instant)>,  // (message, timestamp)
}

impl App {
    /// Build the controller from config and start the first session. Needs a tokio runtime.
    pub fn start(cfg: &Config) -> Self {
        let host = TuiHost::with_clock_offset(cfg.item_height, cfg.source_utc_offset);
        // Real height arrives with the first frame.
        let renderer = Renderer::new(host, cfg.item_height, cfg.item_height * 10, cfg.buffer_count)
            .with_throttle(cfg.scroll_throttle());
        let first = cfg.sources.first().cloned().unwrap_or_default();
        let controller = SessionController::start(
            renderer,
            Box::new(DefaultTransportFactory::new(cfg.clone())),
            cfg.retry_policy(),
            cfg.anchors(),
            cfg.mode,
            first,
        );
        Self::new(controller, cfg.sources.clone(), cfg.render_fps)
    }

    pub fn new(controller: SessionController<TuiHost>, sources: Vec<String>, fps: u32) -> Self {
        let source_idx = sources.iter().position(|s| s == controller.source_id()).unwrap_or(0);
        Self { quit: false, fps: fps.max(1), controller, sources, source_idx, toast_message: None }
    }

    pub fn fps(&self)->u32{ self.fps }
    pub fn quit_flag(&self)->bool{ self.quit }
    pub fn quit(&mut self){ self.quit = true; self.controller.shutdown(); }
    pub fn controller(&self)->&SessionController<TuiHost>{ &self.controller }
    pub fn sources(&self)->&[String]{ &self.sources }
    pub fn source_index(&self)->usize{ self.source_idx }

    /// Once per frame: apply queued sync events and any deferred scroll.
    pub fn tick(&mut self) -> usize {
        let applied = self.controller.pump();
        self.controller.renderer_mut().flush_pending();
        applied
    }

    pub fn set_viewport_rows(&mut self, rows: u16) {
        self.controller.renderer_mut().set_container_height(rows as u32);
    }

    fn viewport_rows(&self) -> i64 {
        self.controller.renderer().window().container_height as i64
    }

    // ----- scrolling -----
    pub fn scroll_rows(&mut self, delta: i64){ self.controller.renderer_mut().scroll_by(delta); }
    pub fn up(&mut self){
        let h = self.controller.renderer().window().item_height as i64;
        self.scroll_rows(-h);
    }
    pub fn down(&mut self){
        let h = self.controller.renderer().window().item_height as i64;
        self.scroll_rows(h);
    }
    pub fn page_up(&mut self){ let rows = self.viewport_rows(); self.scroll_rows(-rows); }
    pub fn page_down(&mut self){ let rows = self.viewport_rows(); self.scroll_rows(rows); }
    pub fn home(&mut self){ self.controller.renderer_mut().scroll_to_head(); }
    pub fn end(&mut self){ self.controller.renderer_mut().scroll_to_tail(); }

    // ----- session -----
    pub fn toggle_mode(&mut self) {
        let next = self.controller.mode().toggled();
        if self.controller.switch_mode(next) {
            let label = match next {
                Mode::Pull => "Pull mode (polling)",
                Mode::Push => "Push mode (live)",
            };
            self.show_toast(label.to_string());
        }
    }

    pub fn next_source(&mut self){ self.step_source(1); }
    pub fn prev_source(&mut self){ self.step_source(-1); }

    fn step_source(&mut self, step: isize) {
        if self.sources.len() < 2 {
            self.show_toast("No other sources configured".to_string());
            return;
        }
        let n = self.sources.len() as isize;
        self.source_idx = (self.source_idx as isize + step).rem_euclid(n) as usize;
        let source = self.sources[self.source_idx].clone();
        if self.controller.switch_source(source.clone()) {
            self.show_toast(format!("Source: {source}"));
        }
    }

    pub fn resume(&mut self) {
        if self.controller.resume_after_failure() {
            self.show_toast("Reconnecting…".to_string());
        } else {
            self.show_toast(format!("Connection is {}", self.controller.connection_state()));
        }
    }

    /// Show a toast notification for 2 seconds
    pub fn show_toast(&mut self, msg: String) {
        self.toast_message = Some((msg, Instant::now()));
    }

    /// Get current toast message if still active (visible for 2 seconds)
    pub fn toast_message(&self) -> Option<&str> {
        const TOAST_DURATION: Duration = Duration::from_secs(2);
        self.toast_message.as_ref().and_then(|(msg, time)| {
            if time.elapsed() < TOAST_DURATION {
                Some(msg.as_str())
            } else {
                None
            }
        })
    }
}
