use serde::{Deserialize, Serialize};

use crate::UserId;
use crate::models::DirectMessage;

/// Events sent FROM server TO client over the gateway.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum ServerEvent {
    /// Connection admitted; the inbox subscription is live.
    Ready { user_id: UserId, email: String },

    /// Backlog of a conversation, oldest first. Sent only to the joining connection.
    History {
        other_user_id: UserId,
        messages: Vec<DirectMessage>,
    },

    /// A message was persisted and fanned out
    MessageDelivered(DirectMessage),

    /// Credential missing or invalid. Sent as the body of the refused upgrade.
    AdmissionRejected { reason: String },
}

/// Commands sent FROM client TO server over the gateway.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum ClientCommand {
    /// Open a conversation with another user and request its backlog
    Join {
        #[serde(default)]
        other_user_id: Option<UserRef>,
    },

    /// Send a direct message
    Send {
        #[serde(default)]
        to: Option<UserRef>,
        #[serde(default)]
        text: String,
    },
}

/// A user id as supplied by a client: either a JSON number or a numeric string.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum UserRef {
    Id(i64),
    Text(String),
}

impl UserRef {
    /// The referenced id, if it is a well-formed positive identity.
    pub fn user_id(&self) -> Option<UserId> {
        let id = match self {
            Self::Id(id) => *id,
            Self::Text(s) => s.trim().parse().ok()?,
        };
        (id > 0).then_some(id)
    }
}

impl From<UserId> for UserRef {
    fn from(id: UserId) -> Self {
        Self::Id(id)
    }
}
