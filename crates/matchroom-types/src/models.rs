use serde::{Deserialize, Serialize};

use crate::UserId;
use crate::channels::{Channel, ConversationKey};

/// A persisted direct message. Immutable once written to the message log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatMessage {
    pub conversation: ConversationKey,
    pub from_id: UserId,
    pub to_id: UserId,
    pub text: String,
    /// Milliseconds since the Unix epoch, assigned by the server.
    pub ts: i64,
}

impl ChatMessage {
    /// Builds a message between two distinct users. Returns `None` for a self-addressed message.
    pub fn new(from_id: UserId, to_id: UserId, text: impl Into<String>, ts: i64) -> Option<Self> {
        let conversation = ConversationKey::new(from_id, to_id)?;
        Some(Self {
            conversation,
            from_id,
            to_id,
            text: text.into(),
            ts,
        })
    }

    /// The three fanout targets: the conversation and both participants' inboxes.
    pub fn fanout_targets(&self) -> [Channel; 3] {
        [
            Channel::Conversation(self.conversation),
            Channel::Inbox(self.from_id),
            Channel::Inbox(self.to_id),
        ]
    }

    pub fn to_wire(&self) -> DirectMessage {
        DirectMessage {
            from: self.from_id,
            to: self.to_id,
            text: self.text.clone(),
            ts: self.ts,
        }
    }
}

/// A direct message as clients see it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirectMessage {
    pub from: UserId,
    pub to: UserId,
    pub text: String,
    pub ts: i64,
}
