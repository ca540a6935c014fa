use std::fmt;

use serde::{Deserialize, Serialize};

use crate::UserId;

/// Canonical key of a two-party conversation: the sorted pair of participants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ConversationKey {
    low: UserId,
    high: UserId,
}

impl ConversationKey {
    /// Returns `None` when both ids are the same user.
    pub fn new(a: UserId, b: UserId) -> Option<Self> {
        if a == b {
            return None;
        }
        Some(Self {
            low: a.min(b),
            high: a.max(b),
        })
    }

    pub fn low(&self) -> UserId {
        self.low
    }

    pub fn high(&self) -> UserId {
        self.high
    }
}

/// A fanout target. Channels have no state beyond who is subscribed to them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Channel {
    /// Per-user inbox, joined automatically for every connection of that user.
    Inbox(UserId),
    /// Per-conversation channel, joined on request.
    Conversation(ConversationKey),
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Inbox(user) => write!(f, "user:{}", user),
            Self::Conversation(key) => write!(f, "dm:{}:{}", key.low, key.high),
        }
    }
}

/// `dm:<min>:<max>` for any pair of users, independent of argument order.
pub fn channel_key(a: UserId, b: UserId) -> String {
    format!("dm:{}:{}", a.min(b), a.max(b))
}

/// `user:<id>`.
pub fn inbox_key(user: UserId) -> String {
    format!("user:{}", user)
}
