use std::sync::Arc;

use tokio::sync::mpsc;

use crate::common::{RelayCommand, RelayEvent};
use crate::error::Result;
use crate::storage::Store;

use super::relay::Relay;

/// Applies commands sent by the subscriber to the store.
#[derive(Clone)]
pub struct CommandHandler {
    store: Arc<Store>,
    relay: Relay,
}

impl CommandHandler {
    pub fn new(store: Arc<Store>, relay: Relay) -> Self {
        Self { store, relay }
    }

    pub async fn run(self, mut frames: mpsc::Receiver<String>) {
        while let Some(frame) = frames.recv().await {
            // Store writes hit the disk, keep them off the runtime threads.
            let handler = self.clone();
            match tokio::task::spawn_blocking(move || handler.handle_frame(&frame)).await {
                Ok(Ok(())) => {}
                Ok(Err(err)) => log::warn!("Command failed: {err}"),
                Err(err) => log::error!("Command task failed: {err}"),
            }
        }
        log::debug!("Command channel closed");
    }

    pub fn handle_frame(&self, frame: &str) -> Result<()> {
        let command = match serde_json::from_str::<RelayCommand>(frame) {
            Ok(command) => command,
            Err(err) => {
                log::warn!("Ignoring unrecognized command {frame}: {err}");
                return Ok(());
            }
        };
        self.handle(command)
    }

    pub fn handle(&self, command: RelayCommand) -> Result<()> {
        match command {
            RelayCommand::SetEnabled(toggle) => {
                self.store.set_enabled(&toggle.chat_id, toggle.value)?;
                log::info!("Bot enabled={} for {}", toggle.value, toggle.chat_id);
            }
            RelayCommand::SetOfflineGuard(toggle) => {
                self.store.set_offline_guard(&toggle.chat_id, toggle.value)?;
                log::info!("Offline guard={} for {}", toggle.value, toggle.chat_id);
            }
            RelayCommand::ListChats => {
                let chats = self.store.list_chats()?;
                self.relay.publish(&RelayEvent::Chats(chats));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn handler() -> (CommandHandler, mpsc::Receiver<String>) {
        let relay = Relay::new();
        let (tx, rx) = mpsc::channel(8);
        relay.attach(tx);
        (CommandHandler::new(Arc::new(Store::in_memory()), relay), rx)
    }

    #[test]
    fn toggles_update_store() {
        let (handler, _rx) = handler();
        handler
            .handle_frame(r#"{"type":"SET_ENABLED","data":{"chatId":"1@g.us","value":true}}"#)
            .unwrap();
        handler
            .handle_frame(r#"{"type":"SET_OFFLINE_GUARD","data":{"chatId":"1@g.us","value":true}}"#)
            .unwrap();

        assert!(handler.store.is_enabled("1@g.us").unwrap());
        assert!(handler.store.is_offline_guard_enabled("1@g.us").unwrap());
    }

    #[test]
    fn list_chats_replies_with_chats_frame() {
        let (handler, mut rx) = handler();
        handler.store.set_enabled("1@g.us", true).unwrap();
        handler.handle_frame(r#"{"type":"LIST_CHATS"}"#).unwrap();

        let frame: serde_json::Value = serde_json::from_str(&rx.try_recv().unwrap()).unwrap();
        assert_eq!(frame["type"], "CHATS");
        assert_eq!(
            frame["data"]["1@g.us"],
            serde_json::json!({ "enabled": true, "offlineGuard": false })
        );
    }

    #[test]
    fn garbage_is_ignored() {
        let (handler, mut rx) = handler();
        handler.handle_frame("stop the bot").unwrap();
        assert!(rx.try_recv().is_err());
        assert!(handler.store.list_chats().unwrap().is_empty());
    }

    #[tokio::test]
    async fn run_consumes_until_channel_closes() {
        let (handler, _rx) = handler();
        let store = Arc::clone(&handler.store);
        let (tx, frames) = mpsc::channel(4);
        tx.send(r#"{"type":"SET_ENABLED","data":{"chatId":"2@g.us","value":true}}"#.to_string())
            .await
            .unwrap();
        drop(tx);

        handler.run(frames).await;
        assert!(store.is_enabled("2@g.us").unwrap());
    }
}
