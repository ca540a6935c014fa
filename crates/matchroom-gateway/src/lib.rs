pub mod auth;
pub mod connection;
pub mod dispatcher;
pub mod history;
pub mod log;
pub mod membership;
pub mod pipeline;
pub mod state;

pub use state::GatewayState;
