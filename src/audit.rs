//! Offline guard: reports messages of guarded chats that nobody has reviewed yet.
//!
//! A chat's unchecked messages are only marked checked once their report has
//! been handed to the subscriber, so an audit without a subscriber leaves them
//! for the next one.

use crate::common::{OfflineReport, RelayEvent, ReportedMessage};
use crate::error::Result;
use crate::network::relay::Relay;
use crate::storage::Store;

/// Audits every chat with the offline guard on. Returns how many messages were reported.
pub fn run_offline_audit(store: &Store, relay: &Relay) -> Result<usize> {
    let mut reported = 0;
    for (chat_id, config) in store.list_chats()? {
        if config.offline_guard {
            reported += audit_chat(store, relay, &chat_id)?;
        }
    }
    Ok(reported)
}

/// Reports and checks the unchecked messages of one chat with a single store write.
pub fn audit_chat(store: &Store, relay: &Relay, chat_id: &str) -> Result<usize> {
    let unchecked = store.unchecked(chat_id)?;
    if unchecked.is_empty() {
        return Ok(0);
    }

    let pending: Vec<_> = unchecked.iter().filter(|message| !message.report_sent).collect();
    let reported = !pending.is_empty();
    if reported {
        if !relay.has_subscriber() {
            log::info!(
                "No subscriber for the offline report of {chat_id}; {} messages stay unchecked",
                pending.len()
            );
            return Ok(0);
        }
        let report = OfflineReport {
            chat_id: chat_id.to_string(),
            messages: pending.iter().map(|message| ReportedMessage::from(*message)).collect(),
        };
        if !relay.publish(&RelayEvent::OfflineReport(report)) {
            log::info!(
                "Offline report for {chat_id} not delivered; {} messages stay unchecked",
                pending.len()
            );
            return Ok(0);
        }
    }

    // Messages reported earlier already carry `report_sent`, so flagging the
    // whole batch is equivalent to flagging only the pending ones.
    let ids: Vec<String> = unchecked.iter().map(|message| message.id.clone()).collect();
    store.mark_audited(&ids, reported)?;
    log::debug!(
        "Audited {} messages in {chat_id}, reported {}",
        unchecked.len(),
        pending.len()
    );
    Ok(pending.len())
}
