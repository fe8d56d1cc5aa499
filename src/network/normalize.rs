//! Turns upstream message payloads into stored messages and subscriber notices.
//!
//! Payloads follow the protocol library's message shape:
//! `{ key: { remoteJid, id, participant? }, message: {...}, pushName?, messageTimestamp? }`.

use serde_json::Value;

use crate::common::{InboundNotice, MediaInfo, Message};
use crate::error::{BridgeError, Result};

const GROUP_SUFFIX: &str = "@g.us";

/// Message kinds that carry an attachment, with the media type recorded for each.
const MEDIA_KINDS: [(&str, &str); 5] = [
    ("imageMessage", "image"),
    ("videoMessage", "video"),
    ("audioMessage", "audio"),
    ("documentMessage", "document"),
    ("stickerMessage", "sticker"),
];

#[derive(Debug, Clone, PartialEq)]
pub struct Normalized {
    pub message: Message,
    pub notice: InboundNotice,
}

pub fn is_group_chat(chat_id: &str) -> bool {
    chat_id.ends_with(GROUP_SUFFIX)
}

/// `received_at` is the bridge clock in milliseconds; it stamps the notice and
/// stands in for a missing upstream timestamp.
pub fn normalize(payload: &Value, received_at: i64) -> Result<Normalized> {
    let body = match payload.get("message") {
        Some(body) if body.is_object() => body,
        _ => return Err(malformed("payload has no message body")),
    };

    let key = payload
        .get("key")
        .ok_or_else(|| malformed("payload has no key"))?;
    let chat_id = non_empty_str(key, "remoteJid").ok_or_else(|| malformed("missing remoteJid"))?;
    let id = non_empty_str(key, "id").ok_or_else(|| malformed("missing message id"))?;
    let sender_id = non_empty_str(key, "participant").unwrap_or(chat_id);
    let sender_name = payload
        .get("pushName")
        .and_then(Value::as_str)
        .unwrap_or_default();

    let media = extract_media(body);
    let content = extract_text(body).unwrap_or_default().to_string();
    let sent_at = extract_timestamp(payload).unwrap_or(received_at);

    let message = Message {
        id: id.to_string(),
        chat_id: chat_id.to_string(),
        sender_id: sender_id.to_string(),
        sender_name: sender_name.to_string(),
        content: content.clone(),
        media,
        sent_at,
        raw: payload.clone(),
        checked_offline: false,
        report_sent: false,
        edit: None,
    };
    let notice = InboundNotice {
        sender: chat_id.to_string(),
        content,
        timestamp: received_at,
        is_group: is_group_chat(chat_id),
    };

    Ok(Normalized { message, notice })
}

fn malformed(reason: &str) -> BridgeError {
    BridgeError::MalformedInbound(reason.to_string())
}

fn non_empty_str<'a>(value: &'a Value, field: &str) -> Option<&'a str> {
    value
        .get(field)
        .and_then(Value::as_str)
        .filter(|text| !text.is_empty())
}

fn extract_text(body: &Value) -> Option<&str> {
    if let Some(text) = body.get("conversation").and_then(Value::as_str) {
        return Some(text);
    }
    if let Some(text) = body
        .get("extendedTextMessage")
        .and_then(|extended| extended.get("text"))
        .and_then(Value::as_str)
    {
        return Some(text);
    }
    MEDIA_KINDS
        .iter()
        .filter_map(|(kind, _)| body.get(*kind))
        .find_map(|media| media.get("caption").and_then(Value::as_str))
}

fn extract_media(body: &Value) -> Option<MediaInfo> {
    MEDIA_KINDS.iter().find_map(|(kind, media_type)| {
        let media = body.get(*kind)?;
        let field = |name: &str| media.get(name).and_then(Value::as_str).map(str::to_string);
        Some(MediaInfo {
            path: None,
            media_type: (*media_type).to_string(),
            mime_type: field("mimetype"),
            file_name: field("fileName"),
        })
    })
}

/// Upstream timestamps are seconds, sent either as a number or a numeric string.
/// Values that do not fit in milliseconds are ignored.
fn extract_timestamp(payload: &Value) -> Option<i64> {
    let seconds: i64 = match payload.get("messageTimestamp")? {
        Value::Number(number) => number.as_i64()?,
        Value::String(text) => text.parse().ok()?,
        _ => return None,
    };
    seconds.checked_mul(1000)
}
