//! Durable record of observed messages and per-chat configuration.
//!
//! Every operation loads the whole document, applies its change and writes the
//! document back before returning. The medium lock is held for the complete
//! load/mutate/persist sequence so concurrent callers never interleave.

use std::collections::{BTreeMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};

use crate::common::{ChatConfig, Message, MessageEdit};
use crate::error::{BridgeError, Result};

use super::medium::{BlobMedium, MemoryMedium};
use super::models::StoreData;

/// Number of messages retained; older ones are evicted in insertion order.
pub const MESSAGE_CAPACITY: usize = 2000;

pub struct Store {
    medium: Mutex<Box<dyn BlobMedium>>,
    capacity: usize,
}

impl Store {
    pub fn new(medium: Box<dyn BlobMedium>) -> Self {
        Self {
            medium: Mutex::new(medium),
            capacity: MESSAGE_CAPACITY,
        }
    }

    pub fn in_memory() -> Self {
        Self::new(Box::new(MemoryMedium::default()))
    }

    /// Makes sure the medium holds a well-formed document, writing an empty one
    /// if nothing is there yet.
    pub fn init(&self) -> Result<()> {
        let mut medium = self.lock()?;
        let data = medium.read()?.unwrap_or_default();
        medium.write(&data)?;
        log::info!(
            "Store ready at {} ({} messages, {} chats)",
            medium.describe(),
            data.messages.len(),
            data.chats.len()
        );
        Ok(())
    }

    // ========== Messages ==========

    /// Inserts `message` unless its id is already stored. Returns whether it was inserted.
    pub fn save_message(&self, message: Message) -> Result<bool> {
        let capacity = self.capacity;
        self.update(|data| {
            if data.message(&message.id).is_some() {
                return (false, false);
            }
            data.messages.push_back(message);
            while data.messages.len() > capacity {
                if let Some(evicted) = data.messages.pop_front() {
                    log::debug!("Evicted message {} (capacity {capacity})", evicted.id);
                }
            }
            (true, true)
        })
    }

    pub fn find_message(&self, id: &str) -> Result<Option<Message>> {
        self.read(|data| data.message(id).cloned())
    }

    /// Messages of `chat_id` not yet audited, oldest first.
    pub fn unchecked(&self, chat_id: &str) -> Result<Vec<Message>> {
        self.read(|data| {
            data.messages
                .iter()
                .filter(|message| message.chat_id == chat_id && !message.checked_offline)
                .cloned()
                .collect()
        })
    }

    pub fn mark_checked(&self, id: &str) -> Result<()> {
        self.update(|data| match data.message_mut(id) {
            Some(message) => {
                message.checked_offline = true;
                ((), true)
            }
            None => ((), false),
        })
    }

    pub fn mark_report_sent(&self, id: &str) -> Result<()> {
        self.update(|data| match data.message_mut(id) {
            Some(message) => {
                message.report_sent = true;
                ((), true)
            }
            None => ((), false),
        })
    }

    /// Marks every listed message checked, and report-sent too when `report_sent`
    /// is set, with a single write. Unknown ids are skipped. Returns how many matched.
    pub fn mark_audited(&self, ids: &[String], report_sent: bool) -> Result<usize> {
        let ids: HashSet<&str> = ids.iter().map(String::as_str).collect();
        self.update(|data| {
            let mut matched = 0;
            for message in data
                .messages
                .iter_mut()
                .filter(|message| ids.contains(message.id.as_str()))
            {
                message.checked_offline = true;
                message.report_sent |= report_sent;
                matched += 1;
            }
            (matched, matched > 0)
        })
    }

    /// Records an edit on a stored message. A later edit replaces an earlier one.
    /// Returns whether the message was found.
    pub fn record_edit(&self, id: &str, edit: MessageEdit) -> Result<bool> {
        self.update(|data| match data.message_mut(id) {
            Some(message) => {
                message.edit = Some(edit);
                (true, true)
            }
            None => (false, false),
        })
    }

    pub fn message_count(&self) -> Result<usize> {
        self.read(|data| data.messages.len())
    }

    // ========== Chats ==========

    pub fn ensure_chat(&self, chat_id: &str) -> Result<ChatConfig> {
        self.update_chat(chat_id, |_| {})
    }

    pub fn set_enabled(&self, chat_id: &str, enabled: bool) -> Result<()> {
        self.update_chat(chat_id, |config| config.enabled = enabled)
            .map(|_| ())
    }

    pub fn is_enabled(&self, chat_id: &str) -> Result<bool> {
        self.ensure_chat(chat_id).map(|config| config.enabled)
    }

    pub fn set_offline_guard(&self, chat_id: &str, enabled: bool) -> Result<()> {
        self.update_chat(chat_id, |config| config.offline_guard = enabled)
            .map(|_| ())
    }

    pub fn is_offline_guard_enabled(&self, chat_id: &str) -> Result<bool> {
        self.ensure_chat(chat_id).map(|config| config.offline_guard)
    }

    pub fn list_chats(&self) -> Result<BTreeMap<String, ChatConfig>> {
        self.read(|data| data.chats.clone())
    }

    /// Applies `change` to the config of `chat_id`, creating it with defaults first.
    fn update_chat<F>(&self, chat_id: &str, change: F) -> Result<ChatConfig>
    where
        F: FnOnce(&mut ChatConfig),
    {
        self.update(|data| {
            let created = !data.chats.contains_key(chat_id);
            let config = data.chats.entry(chat_id.to_string()).or_default();
            let before = *config;
            change(config);
            let after = *config;
            (after, created || before != after)
        })
    }

    // ========== Plumbing ==========

    /// Runs store work on the blocking pool so async callers never wait on disk I/O.
    pub async fn blocking<T, F>(self: &Arc<Self>, work: F) -> Result<T>
    where
        F: FnOnce(&Store) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let store = Arc::clone(self);
        tokio::task::spawn_blocking(move || work(&*store))
            .await
            .map_err(|err| BridgeError::StorageUnavailable(format!("store task failed: {err}")))?
    }

    fn lock(&self) -> Result<MutexGuard<'_, Box<dyn BlobMedium>>> {
        self.medium
            .lock()
            .map_err(|_| BridgeError::StorageUnavailable("store lock poisoned".to_string()))
    }

    fn read<T, F>(&self, view: F) -> Result<T>
    where
        F: FnOnce(&StoreData) -> T,
    {
        let mut medium = self.lock()?;
        let data = medium.read()?.unwrap_or_default();
        Ok(view(&data))
    }

    /// Runs `mutate` under the lock and persists the document when it reports a change.
    fn update<T, F>(&self, mutate: F) -> Result<T>
    where
        F: FnOnce(&mut StoreData) -> (T, bool),
    {
        let mut medium = self.lock()?;
        let mut data = medium.read()?.unwrap_or_default();
        let (result, changed) = mutate(&mut data);
        if changed {
            medium.write(&data)?;
        }
        Ok(result)
    }
}

#[cfg(test)]
pub(crate) fn test_message(id: &str, chat_id: &str, content: &str) -> Message {
    Message {
        id: id.to_string(),
        chat_id: chat_id.to_string(),
        sender_id: format!("{id}-sender@s.whatsapp.net"),
        sender_name: "Tester".to_string(),
        content: content.to_string(),
        media: None,
        sent_at: 1_700_000_000_000,
        raw: serde_json::Value::Null,
        checked_offline: false,
        report_sent: false,
        edit: None,
    }
}
