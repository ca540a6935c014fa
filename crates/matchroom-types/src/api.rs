use serde::{Deserialize, Serialize};

use crate::UserId;

// -- JWT Claims --

/// Claims carried by the bearer token the auth service issues at login.
/// Shared by the gateway verifier and the token issuing helper.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub id: UserId,
    pub email: String,
    pub exp: usize,
}

// -- Health --

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
}
