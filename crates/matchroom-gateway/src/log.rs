use anyhow::Result;
use tracing::warn;

use matchroom_db::Database;
use matchroom_db::models::{MessageRow, NewMessage};
use matchroom_types::channels::ConversationKey;
use matchroom_types::models::ChatMessage;

/// Append-only message store, keyed by conversation pair.
///
/// Calls block; the gateway runs them on the blocking pool.
pub trait MessageLog: Send + Sync + 'static {
    /// Durably append one message.
    fn append(&self, message: &ChatMessage) -> Result<()>;

    /// The most recent `limit` messages of a conversation, oldest first.
    fn recent_for_pair(&self, key: ConversationKey, limit: u32) -> Result<Vec<ChatMessage>>;
}

impl MessageLog for Database {
    fn append(&self, message: &ChatMessage) -> Result<()> {
        self.insert_message(&NewMessage {
            a_id: message.conversation.low(),
            b_id: message.conversation.high(),
            from_id: message.from_id,
            to_id: message.to_id,
            text: &message.text,
            ts: message.ts,
        })?;
        Ok(())
    }

    fn recent_for_pair(&self, key: ConversationKey, limit: u32) -> Result<Vec<ChatMessage>> {
        let rows = self.get_recent_messages(key.low(), key.high(), limit)?;
        Ok(rows.into_iter().filter_map(|row| row_to_message(key, row)).collect())
    }
}

fn row_to_message(key: ConversationKey, row: MessageRow) -> Option<ChatMessage> {
    let message = ChatMessage::new(row.from_id, row.to_id, row.text, row.ts);
    match message {
        Some(m) if m.conversation == key => Some(m),
        _ => {
            warn!(
                "Skipping corrupt message row {} (a={}, b={}, from={}, to={})",
                row.id, row.a_id, row.b_id, row.from_id, row.to_id
            );
            None
        }
    }
}
