use std::fmt;

use rand::Rng;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;
use tokio_tungstenite::tungstenite::Utf8Bytes;

/// Signaling server errors
#[derive(Debug, Error)]
pub enum SignalingError {
    #[error("join with a display name first")]
    NotJoined,

    #[error("invalid display name: {0}")]
    InvalidDisplayName(&'static str),

    #[error("cannot call yourself")]
    SelfCall,

    #[error("internal error: {0}")]
    Internal(String),
}

const CONNECTION_ID_LEN: usize = 13;
const CONNECTION_ID_PREFIX: &[u8] = b"conn_";
const HEX_CHARS: &[u8] = b"0123456789abcdef";

/// Display name used when a notification refers to a user who already left.
pub const UNKNOWN_DISPLAY_NAME: &str = "Unknown";

/// Connection ID: 13-byte fixed array ("conn_" + 8 hex)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId {
    bytes: [u8; CONNECTION_ID_LEN],
    len: u8,
}

impl ConnectionId {
    /// Never handed out by `generate`; stands in for ids that cannot name a
    /// connection.
    pub const UNASSIGNED: Self = Self {
        bytes: [0u8; CONNECTION_ID_LEN],
        len: 0,
    };

    pub fn generate() -> Self {
        let mut bytes = [0u8; CONNECTION_ID_LEN];
        bytes[..CONNECTION_ID_PREFIX.len()].copy_from_slice(CONNECTION_ID_PREFIX);

        let mut rng = rand::rng();
        let value: u32 = rng.random();

        for i in 0..8 {
            let nibble = ((value >> (28 - i * 4)) & 0xF) as usize;
            bytes[CONNECTION_ID_PREFIX.len() + i] = HEX_CHARS[nibble];
        }
        Self {
            bytes,
            len: CONNECTION_ID_LEN as u8,
        }
    }

    pub fn as_str(&self) -> &str {
        std::str::from_utf8(&self.bytes[..self.len as usize]).unwrap_or("")
    }

    /// `conn_` followed by exactly 8 lowercase hex digits
    pub fn is_well_formed(s: &str) -> bool {
        s.len() == CONNECTION_ID_LEN
            && s.as_bytes().starts_with(CONNECTION_ID_PREFIX)
            && s.as_bytes()[CONNECTION_ID_PREFIX.len()..]
                .iter()
                .all(|b| HEX_CHARS.contains(b))
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Strings longer than an id map to `UNASSIGNED` rather than being cut short.
impl From<&str> for ConnectionId {
    fn from(s: &str) -> Self {
        let src = s.as_bytes();
        if src.len() > CONNECTION_ID_LEN {
            return Self::UNASSIGNED;
        }
        let mut bytes = [0u8; CONNECTION_ID_LEN];
        let len = src.len();
        bytes[..len].copy_from_slice(src);
        Self {
            bytes,
            len: len as u8,
        }
    }
}

impl Serialize for ConnectionId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for ConnectionId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = <std::borrow::Cow<'de, str>>::deserialize(deserializer)?;
        if ConnectionId::is_well_formed(&s) {
            Ok(ConnectionId::from(s.as_ref()))
        } else {
            Ok(ConnectionId::UNASSIGNED)
        }
    }
}

/// A roster entry as seen by clients. `in_call` is always derived from call
/// membership at the moment the entry is built.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserInfo {
    pub connection_id: ConnectionId,
    pub display_name: String,
    pub in_call: bool,
}

impl UserInfo {
    /// Placeholder for a user that is no longer connected.
    pub fn unknown(connection_id: ConnectionId) -> Self {
        Self {
            connection_id,
            display_name: UNKNOWN_DISPLAY_NAME.to_string(),
            in_call: false,
        }
    }
}

/// Wrapper for outbound WebSocket messages using tungstenite's Utf8Bytes.
#[derive(Debug, Clone)]
pub struct OutboundMessage(Utf8Bytes);

impl OutboundMessage {
    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }

    /// Get the inner Utf8Bytes for tungstenite Message::Text
    pub fn into_inner(self) -> Utf8Bytes {
        self.0
    }
}

impl From<String> for OutboundMessage {
    fn from(s: String) -> Self {
        Self(Utf8Bytes::from(s))
    }
}
