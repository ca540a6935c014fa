use std::sync::Arc;

use anyhow::{Result, anyhow};
use tracing::error;

use matchroom_types::channels::ConversationKey;
use matchroom_types::models::ChatMessage;

use crate::log::MessageLog;

/// Size of the backlog delivered on join.
pub const HISTORY_LIMIT: u32 = 200;

/// Loads the bounded backlog of a conversation from the message log.
#[derive(Clone)]
pub struct HistoryLoader {
    log: Arc<dyn MessageLog>,
    limit: u32,
}

impl HistoryLoader {
    pub fn new(log: Arc<dyn MessageLog>, limit: u32) -> Self {
        Self { log, limit }
    }

    /// The last `limit` messages of the conversation, oldest first.
    pub async fn load(&self, key: ConversationKey) -> Result<Vec<ChatMessage>> {
        // Run the blocking query off the async runtime
        let log = self.log.clone();
        let limit = self.limit;
        let mut messages = tokio::task::spawn_blocking(move || log.recent_for_pair(key, limit))
            .await
            .map_err(|e| {
                error!("spawn_blocking join error: {}", e);
                anyhow!("history query task failed: {}", e)
            })??;

        // Timestamp is authoritative regardless of what order the store handed back
        messages.sort_by_key(|m| m.ts);
        let excess = messages.len().saturating_sub(limit as usize);
        messages.drain(..excess);

        Ok(messages)
    }
}
