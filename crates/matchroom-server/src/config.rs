use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};

use matchroom_gateway::connection::HEARTBEAT_INTERVAL;
use matchroom_gateway::history::HISTORY_LIMIT;

/// Placeholder JWT secrets that should never reach production.
const PLACEHOLDER_SECRETS: &[&str] = &["dev_secret_change_me", "change-me-to-a-random-string"];

/// Server configuration, read from `MATCHROOM_*` environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    pub jwt_secret: String,
    pub db_path: PathBuf,
    pub host: String,
    pub port: u16,
    pub history_limit: u32,
    pub heartbeat_interval: Duration,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let jwt_secret = lookup("MATCHROOM_JWT_SECRET")
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| "dev_secret_change_me".into());
        let db_path = lookup("MATCHROOM_DB_PATH")
            .unwrap_or_else(|| "matchroom.db".into())
            .into();
        let host = lookup("MATCHROOM_HOST").unwrap_or_else(|| "0.0.0.0".into());
        let port: u16 = lookup("MATCHROOM_PORT")
            .unwrap_or_else(|| "3001".into())
            .parse()
            .context("MATCHROOM_PORT must be a port number")?;
        let history_limit: u32 = match lookup("MATCHROOM_HISTORY_LIMIT") {
            Some(v) => v.parse().context("MATCHROOM_HISTORY_LIMIT must be a positive integer")?,
            None => HISTORY_LIMIT,
        };
        if history_limit == 0 {
            anyhow::bail!("MATCHROOM_HISTORY_LIMIT must be a positive integer");
        }
        let heartbeat_interval = match lookup("MATCHROOM_HEARTBEAT_SECS") {
            Some(v) => {
                let secs: u64 = v
                    .parse()
                    .context("MATCHROOM_HEARTBEAT_SECS must be a positive integer")?;
                if secs == 0 {
                    anyhow::bail!("MATCHROOM_HEARTBEAT_SECS must be a positive integer");
                }
                Duration::from_secs(secs)
            }
            None => HEARTBEAT_INTERVAL,
        };

        Ok(Self {
            jwt_secret,
            db_path,
            host,
            port,
            history_limit,
            heartbeat_interval,
        })
    }

    pub fn addr(&self) -> Result<SocketAddr> {
        format!("{}:{}", self.host, self.port)
            .parse()
            .with_context(|| format!("invalid listen address {}:{}", self.host, self.port))
    }

    pub fn uses_placeholder_secret(&self) -> bool {
        PLACEHOLDER_SECRETS.contains(&self.jwt_secret.as_str())
    }
}
