use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Attachment metadata of a stored message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MediaInfo {
    /// Local path once a downloader has stored the file.
    #[serde(default)]
    pub path: Option<String>,
    #[serde(rename = "type")]
    pub media_type: String,
    #[serde(default)]
    pub mime_type: Option<String>,
    #[serde(default)]
    pub file_name: Option<String>,
}

/// Edit applied to a stored message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageEdit {
    pub old_content: String,
    pub new_content: String,
    pub actor_id: String,
    pub actor_name: String,
}

/// A chat message as recorded by the store.
///
/// Everything except `checked_offline`, `report_sent` and `edit` is frozen
/// once the record is inserted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub id: String,
    pub chat_id: String,
    pub sender_id: String,
    pub sender_name: String,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub media: Option<MediaInfo>,
    /// Milliseconds since the Unix epoch.
    pub sent_at: i64,
    /// Upstream payload kept for audit and replay.
    #[serde(default)]
    pub raw: Value,
    #[serde(default)]
    pub checked_offline: bool,
    #[serde(default)]
    pub report_sent: bool,
    #[serde(default)]
    pub edit: Option<MessageEdit>,
}

/// Per-chat switches, created with both flags off.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub offline_guard: bool,
}

/// Payload of a `NEW_MESSAGE` frame sent to the subscriber.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InboundNotice {
    /// Chat id the message arrived in.
    pub sender: String,
    pub content: String,
    /// Milliseconds since the Unix epoch at which the bridge saw the message.
    pub timestamp: i64,
    pub is_group: bool,
}

/// Message summary carried by an `OFFLINE_REPORT` frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportedMessage {
    pub id: String,
    pub sender_id: String,
    pub sender_name: String,
    pub content: String,
    pub sent_at: i64,
}

impl From<&Message> for ReportedMessage {
    fn from(message: &Message) -> Self {
        Self {
            id: message.id.clone(),
            sender_id: message.sender_id.clone(),
            sender_name: message.sender_name.clone(),
            content: message.content.clone(),
            sent_at: message.sent_at,
        }
    }
}

/// Messages of a guarded chat that had not been audited yet.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OfflineReport {
    pub chat_id: String,
    pub messages: Vec<ReportedMessage>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn chat_config_uses_camel_case_keys() {
        let config = ChatConfig {
            enabled: true,
            offline_guard: false,
        };
        assert_eq!(
            serde_json::to_value(config).unwrap(),
            json!({ "enabled": true, "offlineGuard": false })
        );
    }

    #[test]
    fn message_flags_default_to_false_when_absent() {
        let message: Message = serde_json::from_value(json!({
            "id": "ABC",
            "chatId": "123@s.whatsapp.net",
            "senderId": "123@s.whatsapp.net",
            "senderName": "Ali",
            "sentAt": 1_700_000_000_000_i64
        }))
        .unwrap();

        assert!(!message.checked_offline);
        assert!(!message.report_sent);
        assert!(message.edit.is_none());
        assert_eq!(message.content, "");
    }

    #[test]
    fn media_type_serializes_as_type() {
        let media = MediaInfo {
            path: None,
            media_type: "image".into(),
            mime_type: Some("image/jpeg".into()),
            file_name: None,
        };
        let value = serde_json::to_value(media).unwrap();
        assert_eq!(value["type"], "image");
        assert_eq!(value["mimeType"], "image/jpeg");
    }
}
