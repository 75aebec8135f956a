//! Session controller: owns the renderer and the current sync task, and routes
//! deltas from the one into the other.

use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};

use crate::error::SyncError;
use crate::net::RetryPolicy;
use crate::render::{Anchor, RenderHost, Renderer};
use crate::sync::{SyncClient, SyncHandle};
use crate::transport::TransportFactory;
use crate::types::{ConnectionState, Mode, Record, SessionId, SourceMeta, SyncEvent, SyncEventKind};

/// Where a fresh session starts, per mode.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ModeAnchors {
    pub pull: Anchor,
    pub push: Anchor,
}

impl Default for ModeAnchors {
    fn default() -> Self {
        Self {
            pull: Anchor::Head,
            push: Anchor::Tail,
        }
    }
}

impl ModeAnchors {
    pub fn for_mode(&self, mode: Mode) -> Anchor {
        match mode {
            Mode::Pull => self.pull,
            Mode::Push => self.push,
        }
    }
}

pub struct SessionController<H: RenderHost> {
    renderer: Renderer<H>,
    factory: Box<dyn TransportFactory>,
    policy: RetryPolicy,
    anchors: ModeAnchors,
    mode: Mode,
    source_id: String,
    session: SessionId,
    handle: Option<SyncHandle>,
    events_tx: UnboundedSender<SyncEvent>,
    events_rx: UnboundedReceiver<SyncEvent>,
    state: ConnectionState,
    last_failure: Option<SyncError>,
    meta: Option<SourceMeta>,
    stale_dropped: u64,
}

impl<H: RenderHost> SessionController<H> {
    /// Start the first session. Must be called inside a tokio runtime.
    pub fn start(
        renderer: Renderer<H>,
        factory: Box<dyn TransportFactory>,
        policy: RetryPolicy,
        anchors: ModeAnchors,
        mode: Mode,
        source_id: impl Into<String>,
    ) -> Self {
        let (events_tx, events_rx) = unbounded_channel();
        let mut controller = Self {
            renderer,
            factory,
            policy,
            anchors,
            mode,
            source_id: source_id.into(),
            session: SessionId(0),
            handle: None,
            events_tx,
            events_rx,
            state: ConnectionState::Idle,
            last_failure: None,
            meta: None,
            stale_dropped: 0,
        };
        controller.start_session();
        controller
    }

    // ----- accessors -----
    pub fn connection_state(&self) -> ConnectionState {
        self.state
    }
    pub fn mode(&self) -> Mode {
        self.mode
    }
    pub fn source_id(&self) -> &str {
        &self.source_id
    }
    pub fn session(&self) -> SessionId {
        self.session
    }
    /// Set once retries are exhausted; cleared when the session recovers or is replaced.
    pub fn last_failure(&self) -> Option<&SyncError> {
        self.last_failure.as_ref()
    }
    pub fn source_meta(&self) -> Option<&SourceMeta> {
        self.meta.as_ref()
    }
    pub fn stale_dropped(&self) -> u64 {
        self.stale_dropped
    }
    pub fn renderer(&self) -> &Renderer<H> {
        &self.renderer
    }
    pub fn renderer_mut(&mut self) -> &mut Renderer<H> {
        &mut self.renderer
    }

    // ----- lifecycle -----

    /// Tear down the current session and start over in `mode`. No-op if unchanged.
    pub fn switch_mode(&mut self, mode: Mode) -> bool {
        if mode == self.mode {
            return false;
        }
        log::info!("🔀 Switching mode {} -> {}", self.mode, mode);
        self.mode = mode;
        self.start_session();
        true
    }

    /// Tear down the current session and follow `source_id`. No-op if unchanged.
    pub fn switch_source(&mut self, source_id: impl Into<String>) -> bool {
        let source_id = source_id.into();
        if source_id == self.source_id {
            return false;
        }
        log::info!("🔀 Switching source {} -> {}", self.source_id, source_id);
        self.source_id = source_id;
        self.start_session();
        true
    }

    /// Leave `Failed` and reconnect with the same cursor. Ignored in any other state.
    pub fn resume_after_failure(&mut self) -> bool {
        if self.state != ConnectionState::Failed {
            log::debug!("resume ignored while {}", self.state);
            return false;
        }
        match &self.handle {
            Some(handle) => {
                handle.resume();
                self.last_failure = None;
                true
            }
            None => false,
        }
    }

    /// Stop the current session without starting another.
    pub fn shutdown(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.shutdown();
        }
    }

    fn start_session(&mut self) {
        self.shutdown();
        self.session = SessionId(self.session.0 + 1);
        self.state = ConnectionState::Idle;
        self.last_failure = None;
        self.meta = None;
        self.renderer
            .set_all(Vec::new(), self.anchors.for_mode(self.mode));

        let transport = self.factory.create(self.mode);
        let client = SyncClient::new(
            self.session,
            self.source_id.clone(),
            transport,
            self.policy,
            self.events_tx.clone(),
        );
        self.handle = Some(SyncHandle::spawn(client));
    }

    // ----- events -----

    /// Apply every event already queued. Returns how many were applied.
    pub fn pump(&mut self) -> usize {
        let mut applied = 0;
        while let Ok(event) = self.events_rx.try_recv() {
            if self.handle_event(event) {
                applied += 1;
            }
        }
        applied
    }

    /// Wait for the next event and apply it. Returns false if it was stale.
    pub async fn next_event(&mut self) -> bool {
        match self.events_rx.recv().await {
            Some(event) => self.handle_event(event),
            None => false,
        }
    }

    fn handle_event(&mut self, event: SyncEvent) -> bool {
        if event.session != self.session {
            let stale = SyncError::StaleResponse {
                session: event.session,
            };
            log::debug!("{stale} (current {})", self.session);
            self.stale_dropped += 1;
            return false;
        }

        match event.kind {
            SyncEventKind::RecordsAvailable(records) => self.route(records),
            SyncEventKind::ConnectionStateChanged(state) => {
                self.state = state;
                if state == ConnectionState::Live {
                    self.last_failure = None;
                }
            }
            SyncEventKind::SourceMetaUpdated(meta) => self.meta = Some(meta),
            SyncEventKind::RetriesExhausted {
                attempts,
                last_error,
            } => {
                self.last_failure = Some(SyncError::ExhaustedRetries {
                    attempts,
                    last_error,
                });
            }
        }
        true
    }

    /// Records arrive sorted; pick the cheapest renderer delta that fits them.
    fn route(&mut self, records: Vec<Record>) {
        if records.is_empty() {
            return;
        }
        if self.renderer.is_empty() {
            let anchor = self.anchors.for_mode(self.mode);
            self.renderer.set_all(records, anchor);
            return;
        }

        let bounds = (
            records.first().and_then(Record::timestamp),
            records.last().and_then(Record::timestamp),
            self.renderer.head_timestamp(),
            self.renderer.tail_timestamp(),
        );
        match bounds {
            (_, Some(last), Some(head), _) if last < head => self.renderer.prepend(records),
            (Some(first), _, _, Some(tail)) if first >= tail => self.renderer.append(records),
            _ => self.renderer.insert(records),
        }
    }
}

impl<H: RenderHost> Drop for SessionController<H> {
    fn drop(&mut self) {
        self.shutdown();
    }
}
