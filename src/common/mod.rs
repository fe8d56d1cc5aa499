pub mod commands;
pub mod events;
pub mod types;

pub use commands::{ChatToggle, RelayCommand};
pub use events::{ConnectionStatus, Credentials, DisconnectReason, RelayEvent, SessionEvent};
pub use types::{
    ChatConfig, InboundNotice, MediaInfo, Message, MessageEdit, OfflineReport, ReportedMessage,
};
