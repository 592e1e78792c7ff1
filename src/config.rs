use std::net::SocketAddr;

use thiserror::Error;
use uuid::Uuid;

use crate::domain::task::OwnerId;

pub const DEFAULT_DATABASE_URL: &str = "sqlite://lifeos.db";
pub const DEFAULT_BIND_ADDR: &str = "127.0.0.1:3000";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("failed to parse environment variable '{key}': {details}")]
    Parse { key: &'static str, details: String },
}

/// Runtime settings, read from the environment (after `.env` is loaded).
///
/// - `DATABASE_URL`: sqlx SQLite url, default `sqlite://lifeos.db`
/// - `BIND_ADDR`: HTTP listen address, default `127.0.0.1:3000`
/// - `LIFEOS_OWNER_ID`: UUID whose list is managed, default the nil UUID
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppConfig {
    pub database_url: String,
    pub bind_addr: SocketAddr,
    pub owner: OwnerId,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let database_url = lookup("DATABASE_URL").unwrap_or_else(|| DEFAULT_DATABASE_URL.to_string());
        let bind_addr = lookup("BIND_ADDR")
            .unwrap_or_else(|| DEFAULT_BIND_ADDR.to_string())
            .parse()
            .map_err(|e: std::net::AddrParseError| ConfigError::Parse { key: "BIND_ADDR", details: e.to_string() })?;
        let owner = match lookup("LIFEOS_OWNER_ID") {
            Some(raw) => Uuid::parse_str(raw.trim())
                .map(OwnerId)
                .map_err(|e| ConfigError::Parse { key: "LIFEOS_OWNER_ID", details: e.to_string() })?,
            None => OwnerId::default(),
        };
        Ok(Self { database_url, bind_addr, owner })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        move |key: &str| vars.get(key).cloned()
    }

    #[test]
    fn defaults_apply_when_unset() {
        let config = AppConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config.database_url, DEFAULT_DATABASE_URL);
        assert_eq!(config.bind_addr.to_string(), DEFAULT_BIND_ADDR);
        assert_eq!(config.owner, OwnerId(Uuid::nil()));
    }

    #[test]
    fn reads_overrides() {
        let owner = "9b2f1f4e-0d5c-4c3e-8a57-1f0c8f0e2b11";
        let config = AppConfig::from_lookup(lookup(&[
            ("DATABASE_URL", "sqlite::memory:"),
            ("BIND_ADDR", "0.0.0.0:8080"),
            ("LIFEOS_OWNER_ID", owner),
        ]))
        .unwrap();
        assert_eq!(config.database_url, "sqlite::memory:");
        assert_eq!(config.bind_addr.port(), 8080);
        assert_eq!(config.owner.to_string(), owner);
    }

    #[test]
    fn rejects_malformed_values() {
        let err = AppConfig::from_lookup(lookup(&[("LIFEOS_OWNER_ID", "me")])).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { key: "LIFEOS_OWNER_ID", .. }));
        let err = AppConfig::from_lookup(lookup(&[("BIND_ADDR", "nowhere")])).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { key: "BIND_ADDR", .. }));
    }
}
