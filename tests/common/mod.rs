//! Shared fakes for integration tests: a scripted transport, a factory that
//! hands it out per mode, and a render host that counts every call.
#![allow(dead_code)]

use std::collections::{BTreeMap, VecDeque};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::time::{sleep, timeout, Duration, Instant};

use tailview::dedup::Cursor;
use tailview::error::{TransportError, TransportResult};
use tailview::net::RetryPolicy;
use tailview::render::{RenderHost, Renderer};
use tailview::session::SessionController;
use tailview::transport::{Transport, TransportFactory};
use tailview::types::{Batch, Mode, Record, Role};

pub fn rec(ts: i64) -> Record {
    Record::new(Some(ts), Role::Secondary, format!("message at {ts}"))
}

pub fn recs(ts: &[i64]) -> Vec<Record> {
    ts.iter().copied().map(rec).collect()
}

pub fn timestamps<'a>(records: impl IntoIterator<Item = &'a Record>) -> Vec<i64> {
    records
        .into_iter()
        .filter_map(Record::timestamp)
        .collect()
}

pub fn policy(max_attempts: u32) -> RetryPolicy {
    RetryPolicy {
        base: Duration::from_millis(1000),
        cap: Duration::from_millis(30_000),
        max_attempts,
        jitter_ms: 0,
    }
}

/// What the next transport call does.
#[derive(Clone, Debug)]
pub enum Step {
    /// Deliver records with these timestamps.
    Batch(Vec<i64>),
    /// Push-style connect: succeeds with no records.
    Connected,
    /// Fail with a disconnect.
    Fail,
    /// Never complete.
    Hang,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CallKind {
    Connect,
    Next,
    Close,
}

#[derive(Clone, Debug)]
pub struct Call {
    pub kind: CallKind,
    pub at: Instant,
    pub cursor: Option<i64>,
}

/// Steps and call log shared between the test and every transport built from it.
#[derive(Clone, Default)]
pub struct Script {
    steps: Arc<Mutex<VecDeque<Step>>>,
    calls: Arc<Mutex<Vec<Call>>>,
}

impl Script {
    pub fn new(steps: Vec<Step>) -> Self {
        let script = Self::default();
        for s in steps {
            script.push(s);
        }
        script
    }

    pub fn push(&self, step: Step) {
        self.steps.lock().unwrap().push_back(step);
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn calls_of(&self, kind: CallKind) -> Vec<Call> {
        self.calls().into_iter().filter(|c| c.kind == kind).collect()
    }

    pub fn count(&self, kind: CallKind) -> usize {
        self.calls_of(kind).len()
    }

    fn record(&self, kind: CallKind, cursor: Option<i64>) {
        self.calls.lock().unwrap().push(Call {
            kind,
            at: Instant::now(),
            cursor,
        });
    }

    fn next_step(&self) -> Step {
        self.steps.lock().unwrap().pop_front().unwrap_or(Step::Hang)
    }
}

pub struct MockTransport {
    mode: Mode,
    script: Script,
    interval: Duration,
}

impl MockTransport {
    /// Waits `interval` before every `next_batch`, like the HTTP poller.
    pub fn pull(script: Script, interval: Duration) -> Self {
        Self {
            mode: Mode::Pull,
            script,
            interval,
        }
    }

    pub fn push(script: Script) -> Self {
        Self {
            mode: Mode::Push,
            script,
            interval: Duration::ZERO,
        }
    }

    async fn play(&self) -> TransportResult<Option<Batch>> {
        match self.script.next_step() {
            Step::Batch(ts) => Ok(Some(Batch {
                records: recs(&ts),
                meta: None,
            })),
            Step::Connected => Ok(None),
            Step::Fail => Err(TransportError::Disconnected),
            Step::Hang => std::future::pending().await,
        }
    }
}

#[async_trait]
impl Transport for MockTransport {
    fn mode(&self) -> Mode {
        self.mode
    }

    async fn connect(&mut self, _source_id: &str, cursor: Cursor) -> TransportResult<Option<Batch>> {
        self.script.record(CallKind::Connect, cursor.last_seen());
        self.play().await
    }

    async fn next_batch(&mut self, _source_id: &str, cursor: Cursor) -> TransportResult<Batch> {
        if !self.interval.is_zero() {
            sleep(self.interval).await;
        }
        self.script.record(CallKind::Next, cursor.last_seen());
        Ok(self.play().await?.unwrap_or_default())
    }

    async fn close(&mut self, _source_id: &str) {
        self.script.record(CallKind::Close, None);
    }
}

/// Hands out mock transports backed by one script per mode.
#[derive(Clone)]
pub struct MockFactory {
    pub pull: Script,
    pub push: Script,
    pub interval: Duration,
    created: Arc<Mutex<Vec<Mode>>>,
}

impl MockFactory {
    pub fn new(pull: Script, push: Script) -> Self {
        Self {
            pull,
            push,
            interval: Duration::from_millis(1000),
            created: Arc::default(),
        }
    }

    pub fn created(&self) -> Vec<Mode> {
        self.created.lock().unwrap().clone()
    }
}

impl TransportFactory for MockFactory {
    fn create(&self, mode: Mode) -> Box<dyn Transport> {
        self.created.lock().unwrap().push(mode);
        match mode {
            Mode::Pull => Box::new(MockTransport::pull(self.pull.clone(), self.interval)),
            Mode::Push => Box::new(MockTransport::push(self.push.clone())),
        }
    }
}

/// Render host that tracks the mounted set and panics on double (un)mounts.
#[derive(Debug, Default)]
pub struct CountingHost {
    pub mounted: BTreeMap<usize, Option<i64>>,
    pub mounts: usize,
    pub unmounts: usize,
    pub extent: u64,
    pub anchor: u64,
    pub placeholder: bool,
}

impl CountingHost {
    pub fn reset_counts(&mut self) {
        self.mounts = 0;
        self.unmounts = 0;
    }

    pub fn mounted_timestamps(&self) -> Vec<i64> {
        self.mounted.values().filter_map(|t| *t).collect()
    }
}

impl RenderHost for CountingHost {
    fn mount(&mut self, record: &Record, position: usize) {
        let prev = self.mounted.insert(position, record.timestamp());
        assert!(prev.is_none(), "position {position} mounted twice");
        self.mounts += 1;
    }

    fn unmount(&mut self, position: usize) {
        assert!(
            self.mounted.remove(&position).is_some(),
            "position {position} unmounted while not mounted"
        );
        self.unmounts += 1;
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

/// Item height 10, container 100 (ten visible), buffer 5.
pub fn renderer() -> Renderer<CountingHost> {
    Renderer::new(CountingHost::default(), 10, 100, 5)
}

/// Apply controller events until `done` holds. Panics if it never does.
pub async fn drive_until<F>(controller: &mut SessionController<CountingHost>, done: F)
where
    F: Fn(&SessionController<CountingHost>) -> bool,
{
    let reached = timeout(Duration::from_secs(600), async {
        while !done(controller) {
            controller.next_event().await;
        }
    })
    .await;
    assert!(reached.is_ok(), "condition not reached before timeout");
}
