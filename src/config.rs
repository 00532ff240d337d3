// src/config.rs
use std::{
    env,
    fmt::Display,
    net::{SocketAddr, ToSocketAddrs},
    str::FromStr,
};

use thiserror::Error;
use tracing::info;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),

    #[error("invalid {key} value {value:?}: {reason}")]
    Invalid {
        key: &'static str,
        value: String,
        reason: String,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreBackend {
    Postgres,
    Memory,
}

impl FromStr for StoreBackend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "postgres" | "postgresql" => Ok(StoreBackend::Postgres),
            "memory" => Ok(StoreBackend::Memory),
            other => Err(format!("unknown store backend {other}")),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub bind_addr: SocketAddr,
    pub store: StoreBackend,
    pub database_url: Option<String>,
    pub max_connections: u32,
    pub jwt_secret: String,
    pub jwt_audience: Option<String>,
    pub cors_origin: Option<String>,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let host: String = try_load(&lookup, "HOST", "0.0.0.0")?;
        let port: u16 = try_load(&lookup, "PORT", "3030")?;
        let bind_addr = resolve_bind_addr(&host, port)?;

        let store: StoreBackend = try_load(&lookup, "POLLY_STORE", "postgres")?;
        let database_url = lookup("DATABASE_URL").filter(|url| !url.is_empty());
        if store == StoreBackend::Postgres && database_url.is_none() {
            return Err(ConfigError::Missing("DATABASE_URL"));
        }

        let jwt_secret = lookup("JWT_SECRET")
            .filter(|secret| !secret.is_empty())
            .ok_or(ConfigError::Missing("JWT_SECRET"))?;

        Ok(Self {
            bind_addr,
            store,
            database_url,
            max_connections: try_load(&lookup, "DATABASE_MAX_CONNECTIONS", "5")?,
            jwt_secret,
            jwt_audience: lookup("JWT_AUDIENCE").filter(|aud| !aud.is_empty()),
            cors_origin: lookup("CORS_ORIGIN").filter(|origin| !origin.is_empty()),
        })
    }
}

/// HOST may be an IP literal or a name such as `localhost`; the first
/// resolved address wins.
fn resolve_bind_addr(host: &str, port: u16) -> Result<SocketAddr, ConfigError> {
    let invalid = |reason: String| ConfigError::Invalid {
        key: "HOST",
        value: host.to_string(),
        reason,
    };

    (host, port)
        .to_socket_addrs()
        .map_err(|e| invalid(e.to_string()))?
        .next()
        .ok_or_else(|| invalid("resolved to no addresses".to_string()))
}

fn try_load<F, T>(lookup: &F, key: &'static str, default: &str) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: Display,
{
    let value = lookup(key).unwrap_or_else(|| {
        info!("{key} not set, using default: {default}");
        default.to_string()
    });

    value.parse().map_err(|e: T::Err| ConfigError::Invalid {
        key,
        value: value.clone(),
        reason: e.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn load(pairs: &[(&str, &str)]) -> Result<Config, ConfigError> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn defaults_apply() {
        let config = load(&[
            ("DATABASE_URL", "postgres://localhost/polly"),
            ("JWT_SECRET", "s3cret"),
        ])
        .expect("config");

        assert_eq!(config.bind_addr, "0.0.0.0:3030".parse::<SocketAddr>().unwrap());
        assert_eq!(config.store, StoreBackend::Postgres);
        assert_eq!(config.max_connections, 5);
        assert!(config.jwt_audience.is_none());
        assert!(config.cors_origin.is_none());
    }

    #[test]
    fn memory_store_needs_no_database() {
        let config = load(&[("POLLY_STORE", "memory"), ("JWT_SECRET", "s3cret"), ("PORT", "8080")])
            .expect("config");
        assert_eq!(config.store, StoreBackend::Memory);
        assert_eq!(config.bind_addr.port(), 8080);
    }

    #[test]
    fn host_may_be_a_name() {
        let config = load(&[
            ("POLLY_STORE", "memory"),
            ("JWT_SECRET", "s3cret"),
            ("HOST", "localhost"),
        ])
        .expect("localhost should resolve");
        assert!(config.bind_addr.ip().is_loopback());
        assert_eq!(config.bind_addr.port(), 3030);

        let config = load(&[
            ("POLLY_STORE", "memory"),
            ("JWT_SECRET", "s3cret"),
            ("HOST", "127.0.0.1"),
            ("PORT", "9000"),
        ])
        .expect("ip literal");
        assert_eq!(config.bind_addr, "127.0.0.1:9000".parse::<SocketAddr>().unwrap());
    }

    #[test]
    fn missing_and_invalid_values_are_errors() {
        assert!(matches!(
            load(&[("JWT_SECRET", "s3cret")]),
            Err(ConfigError::Missing("DATABASE_URL"))
        ));
        assert!(matches!(
            load(&[("POLLY_STORE", "memory")]),
            Err(ConfigError::Missing("JWT_SECRET"))
        ));
        assert!(matches!(
            load(&[("POLLY_STORE", "memory"), ("JWT_SECRET", "x"), ("PORT", "eighty")]),
            Err(ConfigError::Invalid { key: "PORT", .. })
        ));
        assert!(matches!(
            load(&[("POLLY_STORE", "sqlite"), ("JWT_SECRET", "x")]),
            Err(ConfigError::Invalid { key: "POLLY_STORE", .. })
        ));
    }
}
