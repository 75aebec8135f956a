//! Minimal Socket.IO v5 framing over a raw WebSocket (Engine.IO v4).
//!
//! Only the default namespace is used. Every text frame starts with an
//! Engine.IO packet type; type `4` carries a Socket.IO packet whose own type
//! digit follows.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::{TransportError, TransportResult};

/// Socket.IO CONNECT for the default namespace.
pub const CONNECT: &str = "40";
/// Socket.IO DISCONNECT for the default namespace.
pub const DISCONNECT: &str = "41";
/// Engine.IO PONG, the answer to a server PING.
pub const PONG: &str = "3";

/// Body of the Engine.IO OPEN packet.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Handshake {
    #[serde(default)]
    pub sid: String,
    #[serde(default = "default_ping_interval")]
    pub ping_interval: u64,
    #[serde(default = "default_ping_timeout")]
    pub ping_timeout: u64,
}

fn default_ping_interval() -> u64 {
    25_000
}

fn default_ping_timeout() -> u64 {
    20_000
}

impl Handshake {
    /// Silence longer than this means the server is gone.
    pub fn liveness(&self) -> Duration {
        Duration::from_millis(self.ping_interval + self.ping_timeout)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Packet {
    Open(Handshake),
    Close,
    Ping,
    Pong,
    /// Namespace connect acknowledged.
    Connected,
    Disconnected,
    Event {
        name: String,
        data: serde_json::Value,
    },
    ConnectError(String),
    /// Noop, upgrade, binary and ack packets; nothing to act on.
    Other,
}

pub fn decode(text: &str) -> TransportResult<Packet> {
    let mut chars = text.chars();
    let packet = match chars.next() {
        Some('0') => Packet::Open(serde_json::from_str(chars.as_str())?),
        Some('1') => Packet::Close,
        Some('2') => Packet::Ping,
        Some('3') => Packet::Pong,
        Some('4') => decode_message(chars.as_str())?,
        Some(_) => Packet::Other,
        None => return Err(TransportError::Protocol("empty frame".to_string())),
    };
    Ok(packet)
}

fn decode_message(body: &str) -> TransportResult<Packet> {
    let mut chars = body.chars();
    let kind = chars.next();
    let rest = skip_namespace(chars.as_str());
    let packet = match kind {
        Some('0') => Packet::Connected,
        Some('1') => Packet::Disconnected,
        Some('2') => {
            // optional ack id before the payload
            let payload = rest.trim_start_matches(|c: char| c.is_ascii_digit());
            let mut items: Vec<serde_json::Value> = serde_json::from_str(payload)?;
            if items.is_empty() {
                return Err(TransportError::Protocol("event without a name".to_string()));
            }
            let name = match items.remove(0) {
                serde_json::Value::String(name) => name,
                other => {
                    return Err(TransportError::Protocol(format!(
                        "event name is not a string: {other}"
                    )))
                }
            };
            let data = if items.is_empty() {
                serde_json::Value::Null
            } else {
                items.remove(0)
            };
            Packet::Event { name, data }
        }
        Some('4') => {
            let message = serde_json::from_str::<serde_json::Value>(rest)
                .ok()
                .and_then(|v| v.get("message").and_then(|m| m.as_str()).map(str::to_string))
                .unwrap_or_else(|| rest.to_string());
            Packet::ConnectError(message)
        }
        _ => Packet::Other,
    };
    Ok(packet)
}

/// Strip a `/namespace,` prefix if present.
fn skip_namespace(s: &str) -> &str {
    if s.starts_with('/') {
        match s.find(',') {
            Some(i) => &s[i + 1..],
            None => "",
        }
    } else {
        s
    }
}

/// `42["name",data]`
pub fn encode_event<T: Serialize>(name: &str, data: &T) -> TransportResult<String> {
    let payload = serde_json::to_string(&(name, data))?;
    Ok(format!("42{payload}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn open_packet_carries_ping_timing() {
        let p = decode(r#"0{"sid":"abc","upgrades":[],"pingInterval":25000,"pingTimeout":5000,"maxPayload":1000000}"#)
            .unwrap();
        match p {
            Packet::Open(h) => {
                assert_eq!(h.sid, "abc");
                assert_eq!(h.liveness(), Duration::from_millis(30_000));
            }
            other => panic!("unexpected packet {other:?}"),
        }
    }

    #[test]
    fn control_packets() {
        assert_eq!(decode("2").unwrap(), Packet::Ping);
        assert_eq!(decode("3").unwrap(), Packet::Pong);
        assert_eq!(decode("1").unwrap(), Packet::Close);
        assert_eq!(decode("6").unwrap(), Packet::Other);
        assert_eq!(decode(r#"40{"sid":"xyz"}"#).unwrap(), Packet::Connected);
        assert_eq!(decode("41").unwrap(), Packet::Disconnected);
        assert!(decode("").is_err());
    }

    #[test]
    fn events_with_namespace_and_ack_id() {
        let plain = decode(r#"42["file_update",{"file_path":"a.jsonl"}]"#).unwrap();
        assert_eq!(
            plain,
            Packet::Event { name: "file_update".into(), data: json!({"file_path": "a.jsonl"}) }
        );

        let namespaced = decode(r#"42/chat,7["subscribed",{"status":"ok"}]"#).unwrap();
        assert_eq!(
            namespaced,
            Packet::Event { name: "subscribed".into(), data: json!({"status": "ok"}) }
        );

        let bare = decode(r#"42["request_latest"]"#).unwrap();
        assert_eq!(bare, Packet::Event { name: "request_latest".into(), data: json!(null) });

        assert!(decode("42[]").is_err());
        assert!(decode("42[1]").is_err());
    }

    #[test]
    fn connect_error_message() {
        assert_eq!(
            decode(r#"44{"message":"Not authorized"}"#).unwrap(),
            Packet::ConnectError("Not authorized".into())
        );
    }

    #[test]
    fn encodes_events() {
        let text = encode_event("subscribe_file", &json!({"file_path": "a.jsonl"})).unwrap();
        assert_eq!(text, r#"42["subscribe_file",{"file_path":"a.jsonl"}]"#);
    }
}
