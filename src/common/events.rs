use std::collections::BTreeMap;
use std::fmt;

use serde::Serialize;
use serde_json::Value;

use super::types::{ChatConfig, InboundNotice, MessageEdit, OfflineReport};

/// Opaque auth material owned by the upstream protocol library.
pub type Credentials = Value;

/// Why the upstream session closed, keyed by the protocol's status codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisconnectReason {
    LoggedOut,
    ConnectionLost,
    ConnectionClosed,
    ConnectionReplaced,
    BadSession,
    RestartRequired,
    Other(u16),
    /// The session ended without a recognizable error.
    Unknown,
}

impl DisconnectReason {
    pub fn from_status_code(code: Option<u16>) -> Self {
        match code {
            Some(401) => Self::LoggedOut,
            Some(408) => Self::ConnectionLost,
            Some(428) => Self::ConnectionClosed,
            Some(440) => Self::ConnectionReplaced,
            Some(500) => Self::BadSession,
            Some(515) => Self::RestartRequired,
            Some(code) => Self::Other(code),
            None => Self::Unknown,
        }
    }

    pub fn status_code(&self) -> Option<u16> {
        match self {
            Self::LoggedOut => Some(401),
            Self::ConnectionLost => Some(408),
            Self::ConnectionClosed => Some(428),
            Self::ConnectionReplaced => Some(440),
            Self::BadSession => Some(500),
            Self::RestartRequired => Some(515),
            Self::Other(code) => Some(*code),
            Self::Unknown => None,
        }
    }

    /// Only an explicit logout revokes the credentials; everything else is retried.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::LoggedOut)
    }
}

impl fmt::Display for DisconnectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.status_code() {
            Some(code) => write!(f, "{self:?} ({code})"),
            None => write!(f, "{self:?}"),
        }
    }
}

/// Events produced by the upstream chat session.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    QrIssued(String),
    CredsUpdated(Credentials),
    ConnectionOpen,
    ConnectionClosed(DisconnectReason),
    MessageReceived(Value),
    MessageEdited { id: String, edit: MessageEdit },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ConnectionStatus {
    Connected,
    Reconnecting,
    LoggedOut,
}

/// Frames published to the downstream subscriber as `{type, data}`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", content = "data", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RelayEvent {
    QrCode(String),
    Status(ConnectionStatus),
    NewMessage(InboundNotice),
    OfflineReport(OfflineReport),
    Chats(BTreeMap<String, ChatConfig>),
}

impl RelayEvent {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::QrCode(_) => "QR_CODE",
            Self::Status(_) => "STATUS",
            Self::NewMessage(_) => "NEW_MESSAGE",
            Self::OfflineReport(_) => "OFFLINE_REPORT",
            Self::Chats(_) => "CHATS",
        }
    }
}
