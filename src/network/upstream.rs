//! Adapter for the chat protocol gateway.
//!
//! The gateway owns the protocol library and speaks JSON frames over a
//! WebSocket: the bridge sends `{"type":"start","credentials":...}` and then
//! receives `{"event": ..., "data": ...}` frames describing the session.

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use serde_json::{Value, json};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message as WsMessage;

use crate::common::{Credentials, DisconnectReason, MessageEdit, SessionEvent};
use crate::error::Result;

const EVENT_BUFFER: usize = 256;

#[async_trait]
pub trait Upstream: Send + Sync {
    /// Opens one session. The returned stream ends when the session is gone.
    async fn connect(
        &self,
        credentials: Option<Credentials>,
    ) -> Result<mpsc::Receiver<SessionEvent>>;
}

/// `{ "event": ..., "data": ... }` with `data` optional.
#[derive(Debug, Deserialize)]
struct GatewayFrame {
    event: String,
    #[serde(default)]
    data: Value,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CloseData {
    #[serde(default)]
    status_code: Option<u16>,
}

#[derive(Debug, Deserialize)]
struct UpsertData {
    messages: Vec<Value>,
}

#[derive(Debug, Deserialize)]
struct EditData {
    id: String,
    edit: MessageEdit,
}

impl GatewayFrame {
    fn into_events(self) -> serde_json::Result<Vec<SessionEvent>> {
        let GatewayFrame { event, data } = self;
        let events = match event.as_str() {
            "qr" => vec![SessionEvent::QrIssued(serde_json::from_value(data)?)],
            "credsUpdate" => vec![SessionEvent::CredsUpdated(data)],
            "connectionOpen" => vec![SessionEvent::ConnectionOpen],
            "connectionClose" => {
                let close = if data.is_null() {
                    CloseData::default()
                } else {
                    serde_json::from_value::<CloseData>(data)?
                };
                vec![SessionEvent::ConnectionClosed(
                    DisconnectReason::from_status_code(close.status_code),
                )]
            }
            "messagesUpsert" => serde_json::from_value::<UpsertData>(data)?
                .messages
                .into_iter()
                .map(SessionEvent::MessageReceived)
                .collect(),
            "messageEdit" => {
                let EditData { id, edit } = serde_json::from_value(data)?;
                vec![SessionEvent::MessageEdited { id, edit }]
            }
            other => {
                log::debug!("Ignoring gateway event {other}");
                Vec::new()
            }
        };
        Ok(events)
    }
}

pub struct WsUpstream {
    url: String,
}

impl WsUpstream {
    pub fn new(url: impl Into<String>) -> Self {
        Self { url: url.into() }
    }
}

#[async_trait]
impl Upstream for WsUpstream {
    async fn connect(
        &self,
        credentials: Option<Credentials>,
    ) -> Result<mpsc::Receiver<SessionEvent>> {
        let (mut ws_stream, _response) = tokio_tungstenite::connect_async(self.url.as_str()).await?;
        log::info!("Connected to gateway at {}", self.url);

        let start = json!({ "type": "start", "credentials": credentials });
        ws_stream.send(WsMessage::Text(start.to_string())).await?;

        let (event_tx, event_rx) = mpsc::channel(EVENT_BUFFER);
        tokio::spawn(async move {
            while let Some(incoming) = ws_stream.next().await {
                let text = match incoming {
                    Ok(WsMessage::Text(text)) => text,
                    Ok(WsMessage::Close(_)) => break,
                    Ok(_) => continue,
                    Err(err) => {
                        log::warn!("Gateway read error: {err}");
                        break;
                    }
                };
                let events = match serde_json::from_str::<GatewayFrame>(&text)
                    .and_then(GatewayFrame::into_events)
                {
                    Ok(events) => events,
                    Err(err) => {
                        log::warn!("Ignoring unrecognized gateway frame: {err}");
                        continue;
                    }
                };
                for event in events {
                    if event_tx.send(event).await.is_err() {
                        // Session moved on to a new connection.
                        return;
                    }
                }
            }
            let _ = event_tx
                .send(SessionEvent::ConnectionClosed(DisconnectReason::Unknown))
                .await;
        });

        Ok(event_rx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    fn decode(text: &str) -> Vec<SessionEvent> {
        serde_json::from_str::<GatewayFrame>(text)
            .unwrap()
            .into_events()
            .unwrap()
    }

    #[test]
    fn decodes_lifecycle_frames() {
        assert_eq!(
            decode(r#"{"event":"qr","data":"2@ref"}"#),
            vec![SessionEvent::QrIssued("2@ref".into())]
        );
        assert_eq!(
            decode(r#"{"event":"connectionOpen"}"#),
            vec![SessionEvent::ConnectionOpen]
        );
        assert_eq!(
            decode(r#"{"event":"connectionClose","data":{"statusCode":401}}"#),
            vec![SessionEvent::ConnectionClosed(DisconnectReason::LoggedOut)]
        );
        assert_eq!(
            decode(r#"{"event":"connectionClose","data":{}}"#),
            vec![SessionEvent::ConnectionClosed(DisconnectReason::Unknown)]
        );
    }

    #[test]
    fn close_without_data_is_unknown_reason() {
        assert_eq!(
            decode(r#"{"event":"connectionClose"}"#),
            vec![SessionEvent::ConnectionClosed(DisconnectReason::Unknown)]
        );
    }

    #[test]
    fn unknown_events_are_skipped_and_bad_data_is_an_error() {
        assert!(decode(r#"{"event":"presenceUpdate","data":{}}"#).is_empty());
        let frame: GatewayFrame = serde_json::from_str(r#"{"event":"qr","data":42}"#).unwrap();
        assert!(frame.into_events().is_err());
    }

    #[test]
    fn edit_frame_carries_edit() {
        let events = decode(
            r#"{"event":"messageEdit","data":{"id":"M1","edit":{"oldContent":"a","newContent":"b","actorId":"1@s.whatsapp.net","actorName":"Ali"}}}"#,
        );
        assert!(matches!(&events[0], SessionEvent::MessageEdited { id, edit } if id == "M1" && edit.new_content == "b"));
    }

    #[test]
    fn upsert_yields_one_event_per_message() {
        let events = decode(
            r#"{"event":"messagesUpsert","data":{"messages":[{"key":{"id":"A"}},{"key":{"id":"B"}}]}}"#,
        );
        assert_eq!(events.len(), 2);
        assert!(matches!(&events[1], SessionEvent::MessageReceived(value) if value["key"]["id"] == "B"));
    }

    #[tokio::test]
    async fn connect_sends_start_and_relays_events() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let gateway = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let mut ws = tokio_tungstenite::accept_async(stream).await.unwrap();
            let start = ws.next().await.unwrap().unwrap();
            ws.send(WsMessage::Text(r#"{"event":"connectionOpen"}"#.into()))
                .await
                .unwrap();
            ws.close(None).await.unwrap();
            start
        });

        let upstream = WsUpstream::new(format!("ws://{addr}"));
        let mut events = upstream
            .connect(Some(json!({ "registered": true })))
            .await
            .unwrap();

        assert_eq!(events.recv().await, Some(SessionEvent::ConnectionOpen));
        assert_eq!(
            events.recv().await,
            Some(SessionEvent::ConnectionClosed(DisconnectReason::Unknown))
        );

        let WsMessage::Text(start) = gateway.await.unwrap() else {
            panic!("start frame should be text");
        };
        let start: Value = serde_json::from_str(&start).unwrap();
        assert_eq!(start["type"], "start");
        assert_eq!(start["credentials"]["registered"], true);
    }
}
