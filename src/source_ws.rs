//! Socket.IO push source.
//!
//! Speaks Engine.IO v4 over a plain WebSocket: waits for the open packet,
//! connects the default namespace, emits `subscribe_file`, then turns
//! `file_update` events for that path into batches. Updates for other paths
//! are dropped here, since the server broadcasts every file change to every
//! client.

use std::collections::VecDeque;
use std::path::Path;

use crate::{
    config::Config,
    dedup::Cursor,
    error::{TransportError, TransportResult},
    socketio::{self, Handshake, Packet},
    transport::Transport,
    types::{decode_records, Batch, Mode, SubscribeFile, WireFormat, WsPayload, SUBSCRIBE_EVENT},
};
use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::time::{timeout, Duration};
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tungstenite::protocol::Message;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

#[derive(Debug)]
enum Frame {
    Open(Handshake),
    Connected,
    Ping,
    Ack,
    Batch(Batch),
    Ignore,
}

pub struct WsPush {
    url: String,
    timeout: Duration,
    format: WireFormat,
    stream: Option<WsStream>,
    /// Silence allowed before the connection counts as lost.
    liveness: Duration,
    /// Updates that arrived before the subscribe acknowledgement.
    pending: VecDeque<Batch>,
}

impl WsPush {
    pub fn new(url: impl Into<String>, timeout: Duration, format: WireFormat) -> Self {
        let liveness = Handshake {
            sid: String::new(),
            ping_interval: 25_000,
            ping_timeout: 20_000,
        }
        .liveness();
        Self {
            url: engine_url(&url.into()),
            timeout,
            format,
            stream: None,
            liveness,
            pending: VecDeque::new(),
        }
    }

    pub fn from_config(cfg: &Config) -> Self {
        Self::new(
            cfg.push_url.clone(),
            Duration::from_millis(cfg.request_timeout_ms),
            cfg.wire_format(),
        )
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

/// Add the Engine.IO query unless the caller already chose one.
fn engine_url(base: &str) -> String {
    if base.contains("EIO=") {
        return base.to_string();
    }
    let sep = if base.contains('?') { '&' } else { '?' };
    format!("{base}{sep}EIO=4&transport=websocket")
}

fn matches_source(file_path: &str, source_id: &str) -> bool {
    file_path == source_id
        || Path::new(file_path)
            .file_name()
            .is_some_and(|name| name == source_id)
}

fn classify(msg: Message, source_id: &str, format: &WireFormat) -> TransportResult<Frame> {
    let text = match msg {
        Message::Text(t) => t,
        Message::Close(_) => return Err(TransportError::Disconnected),
        _ => return Ok(Frame::Ignore),
    };
    let packet = match socketio::decode(&text) {
        Ok(p) => p,
        Err(e) => {
            log::warn!("⚠️ Ignoring unparseable push frame: {e}");
            return Ok(Frame::Ignore);
        }
    };
    let (name, data) = match packet {
        Packet::Open(h) => return Ok(Frame::Open(h)),
        Packet::Connected => return Ok(Frame::Connected),
        Packet::Ping => return Ok(Frame::Ping),
        Packet::Close | Packet::Disconnected => return Err(TransportError::Disconnected),
        Packet::ConnectError(message) => return Err(TransportError::Remote(message)),
        Packet::Pong | Packet::Other => return Ok(Frame::Ignore),
        Packet::Event { name, data } => (name, data),
    };
    let payload = match WsPayload::from_event(&name, data) {
        Ok(p) => p,
        Err(e) => {
            log::debug!("ignoring push event '{name}': {e}");
            return Ok(Frame::Ignore);
        }
    };
    match payload {
        WsPayload::Subscribed { .. } => Ok(Frame::Ack),
        WsPayload::Connected { status } => {
            log::debug!("🔌 push channel greeting: {}", status.unwrap_or_default());
            Ok(Frame::Ignore)
        }
        WsPayload::FileUpdate {
            file_path,
            messages,
            file_info,
        } => {
            if !matches_source(&file_path, source_id) {
                return Ok(Frame::Ignore);
            }
            Ok(Frame::Batch(Batch {
                records: decode_records(messages, format),
                meta: file_info,
            }))
        }
        WsPayload::Error { message } => Err(TransportError::Remote(message)),
    }
}

async fn recv(ws: &mut WsStream) -> TransportResult<Message> {
    match ws.next().await {
        Some(Ok(msg)) => Ok(msg),
        Some(Err(e)) => Err(e.into()),
        None => Err(TransportError::Disconnected),
    }
}

async fn send_text(ws: &mut WsStream, text: impl Into<String>) -> TransportResult<()> {
    ws.send(Message::Text(text.into())).await?;
    Ok(())
}

#[async_trait]
impl Transport for WsPush {
    fn mode(&self) -> Mode {
        Mode::Push
    }

    async fn connect(&mut self, source_id: &str, _cursor: Cursor) -> TransportResult<Option<Batch>> {
        self.stream = None;
        self.pending.clear();

        let (mut ws, _) = timeout(self.timeout, connect_async(self.url.as_str()))
            .await
            .map_err(|_| TransportError::Timeout(self.timeout))??;
        log::info!("🔌 Connected to {}", self.url);

        // The server replays nothing on subscribe; the cursor stays with the
        // dedup store and any overlap in later updates is dropped there.
        let format = self.format;
        let mut early = VecDeque::new();
        let handshake = async {
            let hs = loop {
                if let Frame::Open(hs) = classify(recv(&mut ws).await?, source_id, &format)? {
                    break hs;
                }
            };
            send_text(&mut ws, socketio::CONNECT).await?;
            loop {
                match classify(recv(&mut ws).await?, source_id, &format)? {
                    Frame::Connected => break,
                    Frame::Ping => send_text(&mut ws, socketio::PONG).await?,
                    _ => {}
                }
            }

            let subscribe = SubscribeFile {
                file_path: source_id.to_string(),
            };
            send_text(&mut ws, socketio::encode_event(SUBSCRIBE_EVENT, &subscribe)?).await?;
            loop {
                match classify(recv(&mut ws).await?, source_id, &format)? {
                    Frame::Ack => return Ok::<_, TransportError>(hs),
                    Frame::Batch(b) => early.push_back(b),
                    Frame::Ping => send_text(&mut ws, socketio::PONG).await?,
                    _ => {}
                }
            }
        };
        let hs = timeout(self.timeout, handshake)
            .await
            .map_err(|_| TransportError::Timeout(self.timeout))??;

        log::info!("📬 Subscribed to {source_id} (sid {})", hs.sid);
        self.liveness = hs.liveness();
        self.pending = early;
        self.stream = Some(ws);
        Ok(None)
    }

    async fn next_batch(&mut self, source_id: &str, _cursor: Cursor) -> TransportResult<Batch> {
        if let Some(batch) = self.pending.pop_front() {
            return Ok(batch);
        }
        let format = self.format;
        let liveness = self.liveness;
        let ws = self.stream.as_mut().ok_or(TransportError::Disconnected)?;
        loop {
            // The server pings every interval; silence past that means it is gone.
            let msg = timeout(liveness, recv(ws))
                .await
                .map_err(|_| TransportError::Timeout(liveness))??;
            match classify(msg, source_id, &format)? {
                Frame::Batch(b) => return Ok(b),
                Frame::Ping => send_text(ws, socketio::PONG).await?,
                _ => {}
            }
        }
    }

    async fn close(&mut self, source_id: &str) {
        self.pending.clear();
        let Some(mut ws) = self.stream.take() else {
            return;
        };
        let goodbye = async {
            let _ = send_text(&mut ws, socketio::DISCONNECT).await;
            let _ = ws.close(None).await;
        };
        if timeout(self.timeout, goodbye).await.is_err() {
            log::debug!("close handshake for {source_id} timed out");
        }
    }
}
