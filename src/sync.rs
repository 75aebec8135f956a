//! Incremental synchronization client.
//!
//! One `SyncClient` runs per session as a single task. Everything inside it is
//! sequential: a fetch (or push read) completes and is merged before the next
//! one starts, so the cursor and dedup set never see concurrent writers. The
//! only suspension points are the transport calls and the backoff/poll timers,
//! and each of them also listens for `Shutdown`.

use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};
use tokio::task::JoinHandle;
use tokio::time::sleep;

use crate::dedup::{Cursor, DedupStore};
use crate::error::{SyncError, TransportError, TransportResult};
use crate::net::RetryPolicy;
use crate::transport::Transport;
use crate::types::{
    Batch, ConnectionState, SessionId, SourceMeta, SyncCommand, SyncEvent, SyncEventKind,
};

enum Step {
    Command(Option<SyncCommand>),
    Cycle(TransportResult<Option<Batch>>),
}

pub struct SyncClient {
    session: SessionId,
    source_id: String,
    transport: Box<dyn Transport>,
    store: DedupStore,
    policy: RetryPolicy,
    state: ConnectionState,
    /// Consecutive failures since the last success.
    attempt: u32,
    meta: Option<SourceMeta>,
    events: UnboundedSender<SyncEvent>,
}

impl SyncClient {
    pub fn new(
        session: SessionId,
        source_id: impl Into<String>,
        transport: Box<dyn Transport>,
        policy: RetryPolicy,
        events: UnboundedSender<SyncEvent>,
    ) -> Self {
        Self {
            session,
            source_id: source_id.into(),
            transport,
            store: DedupStore::new(),
            policy,
            state: ConnectionState::Idle,
            attempt: 0,
            meta: None,
            events,
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn cursor(&self) -> Cursor {
        self.store.cursor()
    }

    /// Drive the transport until `Shutdown`, or until either channel closes.
    pub async fn run(mut self, mut commands: UnboundedReceiver<SyncCommand>) {
        self.store.reset();
        log::info!(
            "🚀 {} sync started - source: {}, session: {}",
            self.transport.mode(),
            self.source_id,
            self.session
        );
        self.set_state(ConnectionState::Connecting);

        let mut connected = false;
        while !self.events.is_closed() {
            let step = tokio::select! {
                biased;
                cmd = commands.recv() => Step::Command(cmd),
                res = self.cycle(connected) => Step::Cycle(res),
            };

            match step {
                Step::Command(Some(SyncCommand::Resume)) => {
                    log::debug!("resume ignored while {}", self.state);
                }
                Step::Command(_) => break,
                Step::Cycle(Ok(batch)) => {
                    connected = true;
                    self.attempt = 0;
                    if let Some(batch) = batch {
                        self.apply(batch);
                    }
                    self.set_state(ConnectionState::Live);
                }
                Step::Cycle(Err(err)) => {
                    connected = false;
                    self.transport.close(&self.source_id).await;
                    if !self.recover(err, &mut commands).await {
                        break;
                    }
                }
            }
        }

        self.transport.close(&self.source_id).await;
        log::info!("🛑 sync stopped - session: {}", self.session);
    }

    async fn cycle(&mut self, connected: bool) -> TransportResult<Option<Batch>> {
        let cursor = self.store.cursor();
        if connected {
            self.transport
                .next_batch(&self.source_id, cursor)
                .await
                .map(Some)
        } else {
            self.transport.connect(&self.source_id, cursor).await
        }
    }

    /// Merge one raw batch and forward whatever is new.
    fn apply(&mut self, batch: Batch) {
        if let Some(meta) = batch.meta {
            if self.meta.as_ref() != Some(&meta) {
                self.meta = Some(meta.clone());
                self.emit(SyncEventKind::SourceMetaUpdated(meta));
            }
        }

        let outcome = self.store.merge(batch.records);
        if outcome.malformed > 0 {
            log::warn!(
                "⚠️ {} malformed record(s) skipped from {}",
                outcome.malformed,
                self.source_id
            );
        }
        if outcome.records.is_empty() {
            log::debug!("💤 No new records (cursor: {:?})", outcome.cursor.last_seen());
            return;
        }
        log::info!(
            "🔔 {} new record(s), cursor now {:?}",
            outcome.records.len(),
            outcome.cursor.last_seen()
        );
        self.emit(SyncEventKind::RecordsAvailable(outcome.records));
    }

    /// Back off after a failure. Returns false when the client should stop.
    async fn recover(
        &mut self,
        err: TransportError,
        commands: &mut UnboundedReceiver<SyncCommand>,
    ) -> bool {
        self.attempt += 1;
        let err = SyncError::TransientNetwork(err);

        if self.policy.exhausted(self.attempt) {
            let exhausted = SyncError::ExhaustedRetries {
                attempts: self.attempt,
                last_error: err.to_string(),
            };
            log::error!("❌ {exhausted}");
            self.emit(SyncEventKind::RetriesExhausted {
                attempts: self.attempt,
                last_error: err.to_string(),
            });
            self.set_state(ConnectionState::Failed);

            // Terminal until someone explicitly resumes.
            return match commands.recv().await {
                Some(SyncCommand::Resume) => {
                    log::info!("▶️ Resuming after failure - session: {}", self.session);
                    self.attempt = 0;
                    self.set_state(ConnectionState::Connecting);
                    true
                }
                _ => false,
            };
        }

        let delay = self.policy.delay(self.attempt);
        log::warn!(
            "⚠️ {err}; retry {}/{} in {}ms",
            self.attempt,
            self.policy.max_attempts,
            delay.as_millis()
        );
        self.set_state(ConnectionState::Reconnecting);

        tokio::select! {
            biased;
            cmd = commands.recv() => matches!(cmd, Some(SyncCommand::Resume)),
            _ = sleep(delay) => true,
        }
    }

    fn set_state(&mut self, next: ConnectionState) {
        if self.state == next {
            return;
        }
        log::debug!("state {} -> {} ({})", self.state, next, self.session);
        self.state = next;
        self.emit(SyncEventKind::ConnectionStateChanged(next));
    }

    fn emit(&self, kind: SyncEventKind) {
        // A closed channel means the controller is gone; the run loop notices.
        let _ = self.events.send(SyncEvent {
            session: self.session,
            kind,
        });
    }
}

/// Owner-side handle of a running client.
pub struct SyncHandle {
    commands: UnboundedSender<SyncCommand>,
    task: JoinHandle<()>,
}

impl SyncHandle {
    pub fn spawn(client: SyncClient) -> Self {
        let (commands, rx) = unbounded_channel();
        let task = tokio::spawn(client.run(rx));
        Self { commands, task }
    }

    pub fn resume(&self) {
        let _ = self.commands.send(SyncCommand::Resume);
    }

    /// Ask the client to close its transport and exit. Does not wait.
    pub fn shutdown(&self) {
        let _ = self.commands.send(SyncCommand::Shutdown);
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

impl Drop for SyncHandle {
    fn drop(&mut self) {
        self.shutdown();
    }
}
