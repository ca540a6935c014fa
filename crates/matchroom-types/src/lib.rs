pub mod api;
pub mod channels;
pub mod events;
pub mod models;

/// Users are identified by the positive integer id issued by the auth service.
pub type UserId = i64;
