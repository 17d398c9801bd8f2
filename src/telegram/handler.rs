//! Telegram message handling.

use teloxide::types::Message;

use crate::transport::InboundMessage;

/// Convert a Telegram update into an inbound message. Non-text updates are
/// skipped.
pub fn inbound_from(msg: &Message) -> Option<InboundMessage> {
    let text = msg.text()?;

    let sender = msg
        .from
        .as_ref()
        .map(|u| u.full_name())
        .unwrap_or_else(|| "Unknown".to_string());

    Some(InboundMessage::new(&sender, text, msg.chat.id.0))
}
