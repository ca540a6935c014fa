use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation, decode, encode};
use thiserror::Error;

use matchroom_types::UserId;
use matchroom_types::api::Claims;

/// Default lifetime of tokens issued by [`issue_token`], matching the login endpoint.
pub const TOKEN_TTL_DAYS: i64 = 7;

/// Verified caller identity, bound to a connection for its whole lifetime.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub user_id: UserId,
    pub email: String,
}

/// Why a connection attempt was refused. Admission failures are terminal.
#[derive(Debug, Error)]
pub enum AdmissionError {
    #[error("missing credential")]
    MissingCredential,

    #[error("credential expired")]
    Expired,

    #[error("invalid credential: {0}")]
    Invalid(String),

    #[error("credential does not carry a positive user id")]
    BadIdentity,
}

/// Validate a bearer token (HS256) and extract the caller's identity.
pub fn verify_token(token: Option<&str>, secret: &str) -> Result<Identity, AdmissionError> {
    let token = token
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .ok_or(AdmissionError::MissingCredential)?;

    let token_data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::default(),
    )
    .map_err(|e| match e.kind() {
        ErrorKind::ExpiredSignature => AdmissionError::Expired,
        _ => AdmissionError::Invalid(e.to_string()),
    })?;

    if token_data.claims.id <= 0 {
        return Err(AdmissionError::BadIdentity);
    }

    Ok(Identity {
        user_id: token_data.claims.id,
        email: token_data.claims.email,
    })
}

/// Sign a token the way the auth service does at login.
pub fn issue_token(
    secret: &str,
    user_id: UserId,
    email: &str,
    ttl: chrono::Duration,
) -> anyhow::Result<String> {
    let claims = Claims {
        id: user_id,
        email: email.to_string(),
        exp: (chrono::Utc::now() + ttl).timestamp().max(0) as usize,
    };

    let token = encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )?;

    Ok(token)
}
