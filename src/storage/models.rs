use std::collections::{BTreeMap, VecDeque};

use serde::{Deserialize, Serialize};

use crate::common::{ChatConfig, Message};

/// The whole persisted document: `{ "messages": [...], "chats": {...} }`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StoreData {
    /// Oldest first.
    #[serde(default)]
    pub messages: VecDeque<Message>,
    #[serde(default)]
    pub chats: BTreeMap<String, ChatConfig>,
}

impl StoreData {
    pub fn message(&self, id: &str) -> Option<&Message> {
        self.messages.iter().find(|message| message.id == id)
    }

    pub fn message_mut(&mut self, id: &str) -> Option<&mut Message> {
        self.messages.iter_mut().find(|message| message.id == id)
    }
}
