use std::sync::Arc;
use std::time::Duration;

use crate::connection::HEARTBEAT_INTERVAL;
use crate::dispatcher::Dispatcher;
use crate::history::HistoryLoader;
use crate::log::MessageLog;
use crate::pipeline::SendPipeline;

/// Everything a gateway connection needs, cheap to clone per connection.
#[derive(Clone)]
pub struct GatewayState {
    pub dispatcher: Dispatcher,
    pub pipeline: Arc<SendPipeline>,
    pub history: HistoryLoader,
    pub heartbeat_interval: Duration,
}

impl GatewayState {
    pub fn new(log: Arc<dyn MessageLog>, history_limit: u32) -> Self {
        let dispatcher = Dispatcher::new();
        Self {
            pipeline: Arc::new(SendPipeline::new(log.clone(), dispatcher.clone())),
            history: HistoryLoader::new(log, history_limit),
            dispatcher,
            heartbeat_interval: HEARTBEAT_INTERVAL,
        }
    }

    pub fn with_heartbeat_interval(mut self, interval: Duration) -> Self {
        self.heartbeat_interval = interval;
        self
    }
}
