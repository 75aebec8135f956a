//! The seam between the sync client and the network.

use async_trait::async_trait;

use crate::config::Config;
use crate::dedup::Cursor;
use crate::error::TransportResult;
use crate::source_http::HttpPoll;
use crate::source_ws::WsPush;
use crate::types::{Batch, Mode};

/// One interchangeable record-delivery strategy.
///
/// The sync client calls `connect` until it succeeds, then `next_batch`
/// repeatedly; any error sends it back through backoff to `connect`. Calls
/// are never concurrent.
#[async_trait]
pub trait Transport: Send {
    fn mode(&self) -> Mode;

    /// Establish the transport for `source_id`. A pull transport performs its
    /// first fetch here and returns the batch; a push transport opens and
    /// subscribes and returns `None`.
    async fn connect(&mut self, source_id: &str, cursor: Cursor) -> TransportResult<Option<Batch>>;

    /// Wait for the next batch (the poll interval for pull, the next pushed
    /// frame for push).
    async fn next_batch(&mut self, source_id: &str, cursor: Cursor) -> TransportResult<Batch>;

    /// Release any connection. Must be safe to call when not connected.
    async fn close(&mut self, source_id: &str);
}

/// Builds a fresh transport for every session.
pub trait TransportFactory: Send {
    fn create(&self, mode: Mode) -> Box<dyn Transport>;
}

/// Factory wired to the configured HTTP and WebSocket endpoints.
pub struct DefaultTransportFactory {
    cfg: Config,
}

impl DefaultTransportFactory {
    pub fn new(cfg: Config) -> Self {
        Self { cfg }
    }
}

impl TransportFactory for DefaultTransportFactory {
    fn create(&self, mode: Mode) -> Box<dyn Transport> {
        match mode {
            Mode::Pull => Box::new(HttpPoll::from_config(&self.cfg)),
            Mode::Push => Box::new(WsPush::from_config(&self.cfg)),
        }
    }
}
