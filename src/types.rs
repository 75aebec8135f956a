use anyhow::anyhow;
use chrono::FixedOffset;
use serde::{Deserialize, Serialize};

use crate::error::SyncError;
use crate::fingerprint::{fingerprint, Fingerprint, DEFAULT_PREFIX_BYTES};
use crate::util_text::{default_source_offset, parse_timestamp_ms};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Role {
    /// The human side of the conversation ("user" on the wire).
    Primary,
    /// The responding side ("assistant" on the wire).
    Secondary,
}

impl Role {
    pub fn parse(s: &str) -> Option<Role> {
        match s.trim().to_lowercase().as_str() {
            "user" | "primary" | "human" => Some(Role::Primary),
            "assistant" | "secondary" => Some(Role::Secondary),
            _ => None,
        }
    }

    pub(crate) fn tag(self) -> u8 {
        match self {
            Role::Primary => b'p',
            Role::Secondary => b's',
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Role::Primary => "user",
            Role::Secondary => "assistant",
        }
    }
}

/// One immutable chat/log entry. The fingerprint is derived once at creation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Record {
    timestamp: Option<i64>,
    role: Role,
    content: String,
    fingerprint: Fingerprint,
}

impl Record {
    pub fn new(timestamp: Option<i64>, role: Role, content: impl Into<String>) -> Self {
        Self::with_prefix(timestamp, role, content, DEFAULT_PREFIX_BYTES)
    }

    pub fn with_prefix(
        timestamp: Option<i64>,
        role: Role,
        content: impl Into<String>,
        prefix_bytes: usize,
    ) -> Self {
        let content = content.into();
        let fingerprint = fingerprint(timestamp, role, &content, prefix_bytes);
        Self {
            timestamp,
            role,
            content,
            fingerprint,
        }
    }

    pub fn timestamp(&self) -> Option<i64> {
        self.timestamp
    }
    pub fn role(&self) -> Role {
        self.role
    }
    pub fn content(&self) -> &str {
        &self.content
    }
    pub fn fingerprint(&self) -> Fingerprint {
        self.fingerprint
    }
}

/// A message as served by the record source (pull response or push event).
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct WireRecord {
    #[serde(default)]
    pub timestamp: serde_json::Value,
    #[serde(default)]
    pub role: Option<String>,
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub session_id: Option<String>,
}

/// How wire records become [`Record`]s.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct WireFormat {
    /// Content bytes hashed into the fingerprint.
    pub prefix_bytes: usize,
    /// Offset of naive `YYYY-MM-DD HH:MM:SS` timestamps.
    pub source_offset: FixedOffset,
}

impl Default for WireFormat {
    fn default() -> Self {
        Self {
            prefix_bytes: DEFAULT_PREFIX_BYTES,
            source_offset: default_source_offset(),
        }
    }
}

impl WireRecord {
    /// Convert to a [`Record`]. A missing or unparseable timestamp still yields a
    /// record (it fingerprints as `Unfingerprintable`); an unknown role does not.
    pub fn into_record(self, format: &WireFormat) -> Result<Record, SyncError> {
        let role_str = self.role.unwrap_or_default();
        let role = Role::parse(&role_str).ok_or_else(|| SyncError::MalformedRecord {
            reason: format!("unknown role '{role_str}'"),
        })?;
        let timestamp = parse_timestamp_ms(&self.timestamp, format.source_offset);
        Ok(Record::with_prefix(
            timestamp,
            role,
            self.content.unwrap_or_default(),
            format.prefix_bytes,
        ))
    }
}

/// Decode a wire batch, skipping (and logging) entries that cannot become records.
pub fn decode_records(wire: Vec<WireRecord>, format: &WireFormat) -> Vec<Record> {
    let mut out = Vec::with_capacity(wire.len());
    for w in wire {
        match w.into_record(format) {
            Ok(r) => out.push(r),
            Err(e) => log::warn!("⚠️ Skipping record: {e}"),
        }
    }
    out
}

/// Descriptive data about the source (the `file_info` object of the viewer API).
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct SourceMeta {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub path: Option<String>,
    #[serde(default)]
    pub size: Option<u64>,
    #[serde(default)]
    pub modified: Option<f64>,
}

/// Body of `GET /polling/file/<id>`.
#[derive(Clone, Debug, Deserialize)]
pub struct PollResponse {
    #[serde(default = "default_true")]
    pub success: bool,
    #[serde(default, alias = "records")]
    pub messages: Vec<WireRecord>,
    #[serde(default)]
    pub file_info: Option<SourceMeta>,
    #[serde(default)]
    pub error: Option<String>,
}

fn default_true() -> bool {
    true
}

/// Socket.IO events received on the push channel, keyed by event name.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "event", content = "data")]
pub enum WsPayload {
    #[serde(rename = "connected")]
    Connected {
        #[serde(default)]
        status: Option<String>,
    },
    #[serde(rename = "subscribed")]
    Subscribed {
        #[serde(default)]
        file_path: Option<String>,
    },
    #[serde(rename = "file_update")]
    FileUpdate {
        file_path: String,
        #[serde(default, alias = "records")]
        messages: Vec<WireRecord>,
        #[serde(default)]
        file_info: Option<SourceMeta>,
    },
    #[serde(rename = "error")]
    Error { message: String },
}

impl WsPayload {
    /// Build from a decoded `[name, data]` event.
    pub fn from_event(name: &str, data: serde_json::Value) -> serde_json::Result<Self> {
        serde_json::from_value(serde_json::json!({ "event": name, "data": data }))
    }
}

/// Name of the subscribe event on the push channel.
pub const SUBSCRIBE_EVENT: &str = "subscribe_file";

/// Payload of [`SUBSCRIBE_EVENT`].
#[derive(Debug, Clone, Serialize)]
pub struct SubscribeFile {
    pub file_path: String,
}

/// One unit of raw input for the merge step.
#[derive(Clone, Debug, Default)]
pub struct Batch {
    pub records: Vec<Record>,
    pub meta: Option<SourceMeta>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Mode {
    /// Periodic request against the pull endpoint ("historical").
    Pull,
    /// Subscribed connection on the push channel ("live tailing").
    Push,
}

impl Mode {
    pub fn toggled(self) -> Mode {
        match self {
            Mode::Pull => Mode::Push,
            Mode::Push => Mode::Pull,
        }
    }
}

impl std::str::FromStr for Mode {
    type Err = anyhow::Error;
    fn from_str(s: &str) -> anyhow::Result<Self> {
        match s.to_lowercase().as_str() {
            "pull" | "poll" | "http" => Ok(Mode::Pull),
            "push" | "ws" | "websocket" => Ok(Mode::Push),
            _ => Err(anyhow!("Invalid mode '{s}'. Valid options: pull, push")),
        }
    }
}

impl std::fmt::Display for Mode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Mode::Pull => write!(f, "pull"),
            Mode::Push => write!(f, "push"),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConnectionState {
    Idle,
    Connecting,
    Live,
    Reconnecting,
    Failed,
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ConnectionState::Idle => "idle",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Live => "live",
            ConnectionState::Reconnecting => "reconnecting",
            ConnectionState::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// Identity of one session; events from any other session are stale.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SessionId(pub u64);

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "s{}", self.0)
    }
}

#[derive(Debug, Clone)]
pub struct SyncEvent {
    pub session: SessionId,
    pub kind: SyncEventKind,
}

#[derive(Debug, Clone)]
pub enum SyncEventKind {
    /// Newly merged records, sorted by timestamp.
    RecordsAvailable(Vec<Record>),
    ConnectionStateChanged(ConnectionState),
    SourceMetaUpdated(SourceMeta),
    RetriesExhausted { attempts: u32, last_error: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncCommand {
    Resume,
    Shutdown,
}
