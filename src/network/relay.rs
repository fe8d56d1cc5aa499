//! Single-subscriber event relay.
//!
//! At most one subscriber is attached at a time. Publishing never waits: a
//! frame goes to the current subscriber if it can take it right now, and is
//! dropped otherwise. Nothing is queued for subscribers that attach later.

use std::sync::{Arc, Mutex, MutexGuard};

use futures::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use uuid::Uuid;

use crate::common::RelayEvent;
use crate::error::{BridgeError, Result};

/// Frames buffered between the relay and a subscriber's socket writer.
const SUBSCRIBER_BUFFER: usize = 64;

struct Subscriber {
    id: Uuid,
    sender: mpsc::Sender<String>,
}

#[derive(Clone, Default)]
pub struct Relay {
    slot: Arc<Mutex<Option<Subscriber>>>,
}

impl Relay {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attaches `sender` as the subscriber, replacing any previous one.
    pub fn attach(&self, sender: mpsc::Sender<String>) -> Uuid {
        let id = Uuid::new_v4();
        if let Some(previous) = self.slot().replace(Subscriber { id, sender }) {
            log::info!("Subscriber {} replaced by {id}", previous.id);
        }
        id
    }

    pub fn detach(&self) {
        self.slot().take();
    }

    /// Detaches the subscriber only if it is still the one identified by `id`.
    pub fn detach_if(&self, id: Uuid) -> bool {
        let mut slot = self.slot();
        if slot.as_ref().is_some_and(|subscriber| subscriber.id == id) {
            slot.take();
            true
        } else {
            false
        }
    }

    pub fn has_subscriber(&self) -> bool {
        self.slot()
            .as_ref()
            .is_some_and(|subscriber| !subscriber.sender.is_closed())
    }

    /// Returns whether the frame was handed to a subscriber.
    pub fn publish(&self, event: &RelayEvent) -> bool {
        let frame = match serde_json::to_string(event) {
            Ok(frame) => frame,
            Err(err) => {
                log::warn!("Failed to serialize {} frame: {err}", event.kind());
                return false;
            }
        };

        let slot = self.slot();
        let Some(subscriber) = slot.as_ref() else {
            log::debug!("No subscriber attached; dropping {} frame", event.kind());
            return false;
        };
        match subscriber.sender.try_send(frame) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(_)) => {
                log::warn!("Subscriber is not keeping up; dropping {} frame", event.kind());
                false
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                log::debug!("Subscriber went away; dropping {} frame", event.kind());
                false
            }
        }
    }

    fn slot(&self) -> MutexGuard<'_, Option<Subscriber>> {
        // The slot holds no invariant a panicking holder could break.
        self.slot.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

pub async fn bind(addr: &str) -> Result<TcpListener> {
    TcpListener::bind(addr)
        .await
        .map_err(|err| BridgeError::Relay(format!("cannot listen on {addr}: {err}")))
}

/// Accepts subscriber sockets forever. Each new connection becomes the subscriber.
pub async fn serve(listener: TcpListener, relay: Relay, commands: mpsc::Sender<String>) {
    loop {
        match listener.accept().await {
            Ok((stream, addr)) => {
                log::info!("Subscriber connecting from {addr}");
                let relay = relay.clone();
                let commands = commands.clone();
                tokio::spawn(async move {
                    handle_subscriber(stream, relay, commands).await;
                    log::info!("Subscriber {addr} disconnected");
                });
            }
            Err(err) => {
                log::warn!("Failed to accept subscriber connection: {err}");
            }
        }
    }
}

async fn handle_subscriber(stream: TcpStream, relay: Relay, commands: mpsc::Sender<String>) {
    let ws_stream = match tokio_tungstenite::accept_async(stream).await {
        Ok(ws_stream) => ws_stream,
        Err(err) => {
            log::warn!("WebSocket handshake failed: {err}");
            return;
        }
    };
    let (mut sink, mut stream) = ws_stream.split();

    let (frame_tx, mut frame_rx) = mpsc::channel(SUBSCRIBER_BUFFER);
    let id = relay.attach(frame_tx);
    log::info!("Subscriber {id} attached");

    loop {
        tokio::select! {
            frame = frame_rx.recv() => {
                let Some(frame) = frame else {
                    // Replaced by a newer subscriber.
                    break;
                };
                if let Err(err) = sink.send(WsMessage::Text(frame)).await {
                    log::warn!("Failed to write to subscriber {id}: {err}");
                    break;
                }
            }
            incoming = stream.next() => {
                match incoming {
                    Some(Ok(WsMessage::Text(text))) => {
                        log::info!("Command received from subscriber: {text}");
                        if commands.send(text).await.is_err() {
                            log::warn!("Command handler is gone; ignoring command");
                        }
                    }
                    Some(Ok(WsMessage::Close(_))) | None => break,
                    Some(Ok(_)) => {}
                    Some(Err(err)) => {
                        log::warn!("Subscriber {id} read error: {err}");
                        break;
                    }
                }
            }
        }
    }

    relay.detach_if(id);
    let _ = sink.close().await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::ConnectionStatus;

    fn connected() -> RelayEvent {
        RelayEvent::Status(ConnectionStatus::Connected)
    }

    #[test]
    fn publish_without_subscriber_is_dropped() {
        let relay = Relay::new();
        assert!(!relay.publish(&connected()));

        let (tx, mut rx) = mpsc::channel(4);
        relay.attach(tx);
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn attached_subscriber_receives_frames() {
        let relay = Relay::new();
        let (tx, mut rx) = mpsc::channel(4);
        relay.attach(tx);

        assert!(relay.publish(&RelayEvent::QrCode("2@ref".into())));
        assert_eq!(
            rx.try_recv().unwrap(),
            r#"{"type":"QR_CODE","data":"2@ref"}"#
        );
    }

    #[test]
    fn attach_replaces_previous_subscriber() {
        let relay = Relay::new();
        let (old_tx, mut old_rx) = mpsc::channel(4);
        let (new_tx, mut new_rx) = mpsc::channel(4);
        let old_id = relay.attach(old_tx);
        relay.attach(new_tx);

        relay.publish(&connected());
        assert!(new_rx.try_recv().is_ok());
        // The old sender was dropped with the slot, so its channel is closed and empty.
        assert!(matches!(
            old_rx.try_recv(),
            Err(mpsc::error::TryRecvError::Disconnected)
        ));
        assert!(!relay.detach_if(old_id));
        assert!(relay.has_subscriber());
    }

    #[test]
    fn detach_stops_delivery() {
        let relay = Relay::new();
        let (tx, mut rx) = mpsc::channel(4);
        let id = relay.attach(tx);
        assert!(relay.detach_if(id));

        assert!(!relay.publish(&connected()));
        assert!(rx.try_recv().is_err());
        assert!(!relay.has_subscriber());
    }

    #[test]
    fn full_subscriber_drops_instead_of_blocking() {
        let relay = Relay::new();
        let (tx, mut rx) = mpsc::channel(1);
        relay.attach(tx);

        assert!(relay.publish(&connected()));
        assert!(!relay.publish(&connected()));
        assert!(rx.try_recv().is_ok());
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn closed_subscriber_is_not_ready() {
        let relay = Relay::new();
        let (tx, rx) = mpsc::channel(4);
        relay.attach(tx);
        drop(rx);

        assert!(!relay.has_subscriber());
        assert!(!relay.publish(&connected()));
        relay.detach();
    }

    #[tokio::test]
    async fn bind_on_taken_address_is_relay_error() {
        let taken = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = taken.local_addr().unwrap().to_string();

        assert!(matches!(bind(&addr).await, Err(BridgeError::Relay(_))));
    }

    #[tokio::test]
    async fn websocket_subscriber_gets_frames_and_sends_commands() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let relay = Relay::new();
        let (command_tx, mut command_rx) = mpsc::channel(4);
        tokio::spawn(serve(listener, relay.clone(), command_tx));

        let (mut client, _) = tokio_tungstenite::connect_async(format!("ws://{addr}"))
            .await
            .unwrap();

        // Attachment happens on the server task after the handshake.
        for _ in 0..100 {
            if relay.has_subscriber() {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }
        assert!(relay.publish(&connected()));

        let frame = client.next().await.unwrap().unwrap();
        assert_eq!(
            frame,
            WsMessage::Text(r#"{"type":"STATUS","data":"CONNECTED"}"#.to_string())
        );

        client
            .send(WsMessage::Text(r#"{"type":"LIST_CHATS"}"#.to_string()))
            .await
            .unwrap();
        assert_eq!(
            command_rx.recv().await.unwrap(),
            r#"{"type":"LIST_CHATS"}"#
        );

        client.close(None).await.unwrap();
        for _ in 0..100 {
            if !relay.has_subscriber() {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }
        assert!(!relay.has_subscriber());
    }
}
