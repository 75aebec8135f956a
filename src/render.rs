//! Windowed renderer: keeps only the visible slice (plus a buffer) mounted on
//! the host, whatever the total record count.
//!
//! Items have a fixed height. Positions handed to the host are item indexes;
//! extents and offsets are in host units (rows for the TUI, px elsewhere).

use std::collections::VecDeque;
use std::ops::Range;
use std::time::{Duration, Instant};

use anyhow::anyhow;

use crate::types::Record;

/// Surface provided by the UI layer.
pub trait RenderHost {
    fn mount(&mut self, record: &Record, position: usize);
    fn unmount(&mut self, position: usize);
    fn set_total_extent(&mut self, extent: u64);
    fn set_scroll_anchor(&mut self, offset: u64);
    /// Shown instead of rows while the collection is empty.
    fn set_placeholder(&mut self, _visible: bool) {}
}

/// Which end of the collection a full replace starts at.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Anchor {
    Head,
    Tail,
}

impl std::str::FromStr for Anchor {
    type Err = anyhow::Error;
    fn from_str(s: &str) -> anyhow::Result<Self> {
        match s.to_lowercase().as_str() {
            "head" | "top" | "start" => Ok(Anchor::Head),
            "tail" | "bottom" | "end" => Ok(Anchor::Tail),
            _ => Err(anyhow!("Invalid anchor '{s}'. Valid options: head, tail")),
        }
    }
}

impl std::fmt::Display for Anchor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Anchor::Head => write!(f, "head"),
            Anchor::Tail => write!(f, "tail"),
        }
    }
}

/// Scroll state plus the mounted index range.
///
/// The range never exceeds `capacity() + 2 * buffer_count`. When the offset
/// is not a whole multiple of the item height and `buffer_count` is 0, only
/// one of the two partially visible edge rows fits; the one showing more of
/// itself is kept.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ViewportWindow {
    pub scroll_offset: u64,
    pub item_height: u32,
    pub container_height: u32,
    pub buffer_count: usize,
    pub visible_start: usize,
    pub visible_end: usize,
}

impl ViewportWindow {
    pub fn new(item_height: u32, container_height: u32, buffer_count: usize) -> Self {
        Self {
            scroll_offset: 0,
            item_height: item_height.max(1),
            container_height,
            buffer_count,
            visible_start: 0,
            visible_end: 0,
        }
    }

    /// Items needed to cover the container: `ceil(container / item)`.
    pub fn capacity(&self) -> usize {
        self.container_height.div_ceil(self.item_height) as usize
    }

    /// Upper bound on the mounted range length.
    pub fn max_window(&self) -> usize {
        self.capacity() + 2 * self.buffer_count
    }

    pub fn total_extent(&self, total: usize) -> u64 {
        total as u64 * self.item_height as u64
    }

    pub fn max_offset(&self, total: usize) -> u64 {
        self.total_extent(total)
            .saturating_sub(self.container_height as u64)
    }

    pub fn clamp_offset(&self, offset: u64, total: usize) -> u64 {
        offset.min(self.max_offset(total))
    }

    /// Index of the item under the top edge of the container.
    pub fn first_visible(&self) -> usize {
        (self.scroll_offset / self.item_height as u64) as usize
    }

    pub fn range(&self) -> Range<usize> {
        self.visible_start..self.visible_end
    }

    fn recompute(&mut self, total: usize) {
        if total == 0 {
            self.visible_start = 0;
            self.visible_end = 0;
            return;
        }
        let h = self.item_height as u64;
        let first = self.first_visible().min(total - 1);
        let bottom = self.scroll_offset + self.container_height as u64;
        let last_exclusive = bottom.div_ceil(h) as usize;

        let mut start = first.saturating_sub(self.buffer_count);
        let mut end = (last_exclusive + self.buffer_count).min(total);
        // A partially visible row at each edge exceeds the bound by one.
        // A buffer row gives way first; with none left, the edge row showing
        // less of itself is dropped.
        if end - start > self.max_window() {
            if end > last_exclusive {
                end -= 1;
            } else if start < first {
                start += 1;
            } else {
                let top_shown = h - self.scroll_offset % h;
                let bottom_shown = bottom - (last_exclusive as u64 - 1) * h;
                if top_shown < bottom_shown {
                    start += 1;
                } else {
                    end -= 1;
                }
            }
        }
        end = end.min(start + self.max_window());
        self.visible_start = start;
        self.visible_end = end.max(start);
    }
}

pub struct Renderer<H: RenderHost> {
    host: H,
    records: VecDeque<Record>,
    window: ViewportWindow,
    mounted: Range<usize>,
    anchor: Anchor,
    throttle: Duration,
    last_scroll: Option<Instant>,
    pending_offset: Option<u64>,
}

impl<H: RenderHost> Renderer<H> {
    pub fn new(host: H, item_height: u32, container_height: u32, buffer_count: usize) -> Self {
        let mut renderer = Self {
            host,
            records: VecDeque::new(),
            window: ViewportWindow::new(item_height, container_height, buffer_count),
            mounted: 0..0,
            anchor: Anchor::Tail,
            throttle: Duration::ZERO,
            last_scroll: None,
            pending_offset: None,
        };
        renderer.host.set_total_extent(0);
        renderer.host.set_placeholder(true);
        renderer
    }

    pub fn with_throttle(mut self, throttle: Duration) -> Self {
        self.throttle = throttle;
        self
    }

    // ----- getters -----
    pub fn host(&self) -> &H {
        &self.host
    }
    pub fn host_mut(&mut self) -> &mut H {
        &mut self.host
    }
    pub fn window(&self) -> &ViewportWindow {
        &self.window
    }
    pub fn len(&self) -> usize {
        self.records.len()
    }
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
    pub fn get(&self, index: usize) -> Option<&Record> {
        self.records.get(index)
    }
    pub fn records(&self) -> impl Iterator<Item = &Record> {
        self.records.iter()
    }
    pub fn mounted_range(&self) -> Range<usize> {
        self.mounted.clone()
    }
    pub fn mounted_count(&self) -> usize {
        self.mounted.len()
    }
    pub fn anchor(&self) -> Anchor {
        self.anchor
    }
    pub fn head_timestamp(&self) -> Option<i64> {
        self.records.front().and_then(Record::timestamp)
    }
    pub fn tail_timestamp(&self) -> Option<i64> {
        self.records.back().and_then(Record::timestamp)
    }
    pub fn has_pending_scroll(&self) -> bool {
        self.pending_offset.is_some()
    }

    /// True when the bottom of the collection is in view (or nothing overflows).
    pub fn is_at_tail(&self) -> bool {
        self.window.scroll_offset >= self.window.max_offset(self.records.len())
    }

    // ----- deltas -----

    /// Replace everything and start at `anchor`.
    pub fn set_all(&mut self, records: Vec<Record>, anchor: Anchor) {
        for p in self.mounted.clone() {
            self.host.unmount(p);
        }
        self.mounted = 0..0;
        self.records = records.into();
        self.anchor = anchor;
        self.pending_offset = None;

        self.publish_extent();
        self.window.scroll_offset = match anchor {
            Anchor::Head => 0,
            Anchor::Tail => self.window.max_offset(self.records.len()),
        };
        self.host.set_scroll_anchor(self.window.scroll_offset);
        self.remount(false);
        self.host.set_placeholder(self.records.is_empty());
    }

    /// Add newer records at the tail. Follows the tail only if it was in view.
    pub fn append(&mut self, records: Vec<Record>) {
        if records.is_empty() {
            return;
        }
        if self.records.is_empty() {
            self.set_all(records, self.anchor);
            return;
        }
        let follow = self.is_at_tail();
        self.records.extend(records);
        self.publish_extent();
        if follow {
            self.window.scroll_offset = self.window.max_offset(self.records.len());
            self.host.set_scroll_anchor(self.window.scroll_offset);
        }
        self.remount(false);
    }

    /// Add older records at the head, shifting the offset so the reader's
    /// current item stays where it is on screen.
    pub fn prepend(&mut self, records: Vec<Record>) {
        if records.is_empty() {
            return;
        }
        if self.records.is_empty() {
            self.set_all(records, self.anchor);
            return;
        }
        let shift = records.len() as u64 * self.window.item_height as u64;
        for r in records.into_iter().rev() {
            self.records.push_front(r);
        }
        self.shift_offset(shift);
        self.remount(true);
    }

    /// Merge records that interleave with the collection by timestamp. Rows
    /// landing above the top visible item push the offset down by their height.
    pub fn insert(&mut self, mut records: Vec<Record>) {
        if records.is_empty() {
            return;
        }
        if self.records.is_empty() {
            records.sort_by_key(|r| r.timestamp());
            self.set_all(records, self.anchor);
            return;
        }
        records.sort_by_key(|r| r.timestamp());

        let first_visible = self.window.first_visible();
        let existing: Vec<Record> = self.records.drain(..).collect();
        let mut merged = VecDeque::with_capacity(existing.len() + records.len());
        let mut above = 0usize;
        let mut incoming = records.into_iter().peekable();

        for (idx, old) in existing.into_iter().enumerate() {
            // Ties go after existing rows: they arrived later.
            while let Some(new) = incoming.next_if(|n| n.timestamp() < old.timestamp()) {
                if idx <= first_visible {
                    above += 1;
                }
                merged.push_back(new);
            }
            merged.push_back(old);
        }
        merged.extend(incoming);
        self.records = merged;

        self.shift_offset(above as u64 * self.window.item_height as u64);
        self.remount(true);
    }

    // ----- scrolling -----

    /// Scroll to `offset` (clamped). Calls inside the throttle interval are
    /// deferred until [`Renderer::flush_pending`]. Returns whether it applied now.
    pub fn on_scroll(&mut self, offset: u64) -> bool {
        let now = Instant::now();
        if let Some(last) = self.last_scroll {
            if now.duration_since(last) < self.throttle {
                self.pending_offset = Some(offset);
                return false;
            }
        }
        self.apply_scroll(offset, now);
        true
    }

    pub fn flush_pending(&mut self) -> bool {
        match self.pending_offset.take() {
            Some(offset) => {
                self.apply_scroll(offset, Instant::now());
                true
            }
            None => false,
        }
    }

    pub fn scroll_by(&mut self, delta: i64) -> bool {
        let base = self.pending_offset.unwrap_or(self.window.scroll_offset);
        self.on_scroll(base.saturating_add_signed(delta))
    }

    pub fn scroll_to_head(&mut self) -> bool {
        self.on_scroll(0)
    }

    pub fn scroll_to_tail(&mut self) -> bool {
        self.on_scroll(self.window.max_offset(self.records.len()))
    }

    /// Container resized. Stays pinned to the tail if it was there.
    pub fn set_container_height(&mut self, height: u32) {
        if height == self.window.container_height {
            return;
        }
        let follow = self.is_at_tail();
        self.window.container_height = height;
        let total = self.records.len();
        self.window.scroll_offset = if follow {
            self.window.max_offset(total)
        } else {
            self.window.clamp_offset(self.window.scroll_offset, total)
        };
        self.host.set_scroll_anchor(self.window.scroll_offset);
        self.remount(false);
    }

    fn apply_scroll(&mut self, offset: u64, now: Instant) {
        self.last_scroll = Some(now);
        self.pending_offset = None;
        let offset = self.window.clamp_offset(offset, self.records.len());
        if offset == self.window.scroll_offset {
            return;
        }
        self.window.scroll_offset = offset;
        self.host.set_scroll_anchor(offset);
        self.remount(false);
    }

    fn shift_offset(&mut self, shift: u64) {
        self.publish_extent();
        let total = self.records.len();
        self.window.scroll_offset = self
            .window
            .clamp_offset(self.window.scroll_offset + shift, total);
        self.pending_offset = self.pending_offset.map(|p| p + shift);
        self.host.set_scroll_anchor(self.window.scroll_offset);
    }

    fn publish_extent(&mut self) {
        self.host
            .set_total_extent(self.window.total_extent(self.records.len()));
        if !self.records.is_empty() {
            self.host.set_placeholder(false);
        }
    }

    /// Recompute the window and bring the host's mounted set in line with it.
    /// `reindexed` means positions moved under the host, so every old mount is stale.
    fn remount(&mut self, reindexed: bool) {
        let old = self.mounted.clone();
        self.window.recompute(self.records.len());
        let new = self.window.range();

        for p in old.clone() {
            if reindexed || !new.contains(&p) {
                self.host.unmount(p);
            }
        }
        for p in new.clone() {
            if reindexed || !old.contains(&p) {
                if let Some(record) = self.records.get(p) {
                    self.host.mount(record, p);
                }
            }
        }
        self.mounted = new;
    }
}
