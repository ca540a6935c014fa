use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};

use thiserror::Error;
use tracing::{debug, error};

use matchroom_types::UserId;
use matchroom_types::events::UserRef;
use matchroom_types::models::ChatMessage;

use crate::dispatcher::{Dispatcher, Fanout};
use crate::log::MessageLog;

/// A send rejected before it touched the log. Dropped without telling the sender.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("recipient is not a valid user id")]
    InvalidRecipient,

    #[error("cannot send a message to yourself")]
    SelfAddressed,

    #[error("message text is empty")]
    EmptyText,
}

#[derive(Debug, Error)]
pub enum SendError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// The append failed; nothing was fanned out.
    #[error("failed to persist message: {0:#}")]
    Persistence(anyhow::Error),

    #[error("failed to encode message event: {0}")]
    Encode(#[from] serde_json::Error),
}

/// A send that passed validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutgoingMessage {
    pub to: UserId,
    pub text: String,
}

/// Check a send request from `from`. The returned text is trimmed.
pub fn validate(from: UserId, to: Option<&UserRef>, text: &str) -> Result<OutgoingMessage, ValidationError> {
    let to = to
        .and_then(UserRef::user_id)
        .ok_or(ValidationError::InvalidRecipient)?;
    if to == from {
        return Err(ValidationError::SelfAddressed);
    }

    let text = text.trim();
    if text.is_empty() {
        return Err(ValidationError::EmptyText);
    }

    Ok(OutgoingMessage {
        to,
        text: text.to_string(),
    })
}

fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// Validate, timestamp, persist, then fan out.
pub struct SendPipeline {
    log: Arc<dyn MessageLog>,
    dispatcher: Dispatcher,
    clock: fn() -> i64,
    /// Last timestamp handed out; timestamps never go backwards.
    last_ts: AtomicI64,
}

impl SendPipeline {
    pub fn new(log: Arc<dyn MessageLog>, dispatcher: Dispatcher) -> Self {
        Self::with_clock(log, dispatcher, now_millis)
    }

    pub fn with_clock(log: Arc<dyn MessageLog>, dispatcher: Dispatcher, clock: fn() -> i64) -> Self {
        Self {
            log,
            dispatcher,
            clock,
            last_ts: AtomicI64::new(i64::MIN),
        }
    }

    fn next_timestamp(&self) -> i64 {
        let now = (self.clock)();
        let prev = self.last_ts.fetch_max(now, Ordering::AcqRel);
        prev.max(now)
    }

    /// Run one send from `from`. On success the message is in the log and has
    /// been published; on any error nothing was published.
    pub async fn send(&self, from: UserId, to: Option<&UserRef>, text: &str) -> Result<ChatMessage, SendError> {
        let outgoing = validate(from, to, text)?;
        let ts = self.next_timestamp();

        let message = ChatMessage::new(from, outgoing.to, outgoing.text, ts)
            .ok_or(ValidationError::SelfAddressed)?;

        // Persist before fanout: a client that sees the live event must find
        // the same message in its next history load.
        let log = self.log.clone();
        let to_store = message.clone();
        tokio::task::spawn_blocking(move || log.append(&to_store))
            .await
            .map_err(|e| {
                error!("spawn_blocking join error: {}", e);
                SendError::Persistence(anyhow::anyhow!("append task failed: {}", e))
            })?
            .map_err(SendError::Persistence)?;

        let receivers = self.dispatcher.publish(Fanout::new(&message)?);
        debug!(
            "Message {} -> {} at {} fanned out to {} connections",
            message.from_id, message.to_id, message.ts, receivers
        );

        Ok(message)
    }
}
