use std::sync::Arc;

use tokio::sync::broadcast;

use matchroom_types::channels::Channel;
use matchroom_types::events::ServerEvent;
use matchroom_types::models::ChatMessage;

/// Capacity of the fanout bus. A connection lagging further behind skips items.
const FANOUT_CAPACITY: usize = 1024;

/// One persisted message on its way to live subscribers.
///
/// Carries all three target channels in a single item, so a connection that
/// is subscribed to more than one of them still receives the message once.
#[derive(Debug, Clone)]
pub struct Fanout {
    pub targets: [Channel; 3],
    /// `MessageDelivered` event, serialized once for every connection.
    pub json: Arc<str>,
}

impl Fanout {
    pub fn new(message: &ChatMessage) -> Result<Self, serde_json::Error> {
        let json = serde_json::to_string(&ServerEvent::MessageDelivered(message.to_wire()))?;
        Ok(Self {
            targets: message.fanout_targets(),
            json: json.into(),
        })
    }
}

/// Fans persisted messages out to connected clients.
///
/// Holds no membership state: every connection filters the bus against its
/// own subscriptions.
#[derive(Clone)]
pub struct Dispatcher {
    inner: Arc<DispatcherInner>,
}

struct DispatcherInner {
    fanout_tx: broadcast::Sender<Fanout>,
}

impl Default for Dispatcher {
    fn default() -> Self {
        Self::new()
    }
}

impl Dispatcher {
    pub fn new() -> Self {
        Self::with_capacity(FANOUT_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let (fanout_tx, _) = broadcast::channel(capacity);
        Self {
            inner: Arc::new(DispatcherInner { fanout_tx }),
        }
    }

    /// Subscribe to the fanout bus. Returns a broadcast receiver.
    pub fn subscribe(&self) -> broadcast::Receiver<Fanout> {
        self.inner.fanout_tx.subscribe()
    }

    /// Publish a fanout item. Returns how many connections were listening.
    pub fn publish(&self, fanout: Fanout) -> usize {
        // No receivers is fine: the message is already in the log
        self.inner.fanout_tx.send(fanout).unwrap_or(0)
    }

    pub fn connection_count(&self) -> usize {
        self.inner.fanout_tx.receiver_count()
    }
}
