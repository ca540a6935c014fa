use std::collections::HashSet;

use matchroom_types::UserId;
use matchroom_types::channels::{Channel, ConversationKey};

use crate::dispatcher::Fanout;

/// Channel subscriptions of a single connection.
///
/// Owned by the connection and dropped with it; nothing outside the
/// connection's own tasks ever mutates it.
#[derive(Debug)]
pub struct Membership {
    user_id: UserId,
    channels: HashSet<Channel>,
}

impl Membership {
    /// Membership of a freshly admitted connection: its own inbox only.
    pub fn admit(user_id: UserId) -> Self {
        let mut channels = HashSet::new();
        channels.insert(Channel::Inbox(user_id));
        Self { user_id, channels }
    }

    /// Subscribe to the conversation with `other`. Returns `None` (and changes
    /// nothing) when `other` is not a positive id or is the caller.
    pub fn join_conversation(&mut self, other: UserId) -> Option<ConversationKey> {
        if other <= 0 {
            return None;
        }
        let key = ConversationKey::new(self.user_id, other)?;
        self.channels.insert(Channel::Conversation(key));
        Some(key)
    }

    pub fn is_member(&self, channel: &Channel) -> bool {
        self.channels.contains(channel)
    }

    /// Whether a fanout item should be delivered to this connection.
    pub fn accepts(&self, fanout: &Fanout) -> bool {
        fanout.targets.iter().any(|c| self.channels.contains(c))
    }

    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }
}
