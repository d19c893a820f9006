use std::net::{IpAddr, SocketAddr};

use anyhow::{bail, Context};
use chrono::Duration;

use crate::auth::RegistrationPolicy;

/// Longest session token lifetime accepted from the environment (one week).
pub const MAX_TOKEN_TTL_SECS: i64 = 7 * 24 * 60 * 60;

/// Settings read once at startup. Nothing here is reloaded.
pub struct AppConfig {
    /// Postgres URL. Without one the server keeps everything in memory.
    pub database_url: Option<String>,
    pub max_connections: u32,
    pub bind_addr: IpAddr,
    pub port: u16,
    /// HMAC key for session tokens.
    pub token_secret: String,
    pub token_lifetime: Duration,
    pub registration: RegistrationPolicy,
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> anyhow::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let token_secret = lookup("TOKEN_SECRET")
            .filter(|s| !s.is_empty())
            .context("TOKEN_SECRET environment variable required")?;
        if token_secret.len() < 32 {
            log::warn!("TOKEN_SECRET is shorter than 32 bytes");
        }

        let token_ttl: i64 = parse_or(&lookup, "TOKEN_TTL_SECS", 60)?;
        if token_ttl <= 0 {
            bail!("TOKEN_TTL_SECS must be positive");
        }
        if token_ttl > MAX_TOKEN_TTL_SECS {
            bail!("TOKEN_TTL_SECS must not exceed {}", MAX_TOKEN_TTL_SECS);
        }
        let token_lifetime =
            Duration::try_seconds(token_ttl).context("TOKEN_TTL_SECS is out of range")?;

        Ok(Self {
            database_url: lookup("DATABASE_URL").filter(|s| !s.is_empty()),
            max_connections: parse_or(&lookup, "DATABASE_MAX_CONNECTIONS", 10)?,
            bind_addr: parse_or(&lookup, "BIND_ADDR", IpAddr::from([0, 0, 0, 0]))?,
            port: parse_or(&lookup, "PORT", 3001)?,
            token_secret,
            token_lifetime,
            registration: RegistrationPolicy {
                allow_duplicate_usernames: parse_or(&lookup, "ALLOW_DUPLICATE_USERNAMES", true)?,
            },
        })
    }

    pub fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.bind_addr, self.port)
    }
}

fn parse_or<F, T>(lookup: &F, key: &str, default: T) -> anyhow::Result<T>
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .with_context(|| format!("Invalid {}: `{}`", key, raw)),
        None => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_apply() {
        let config = AppConfig::from_lookup(env(&[("TOKEN_SECRET", "s3cret")])).unwrap();
        assert_eq!(config.port, 3001);
        assert_eq!(config.token_lifetime, Duration::seconds(60));
        assert!(config.database_url.is_none());
        assert!(config.registration.allow_duplicate_usernames);
        assert_eq!(config.socket_addr().to_string(), "0.0.0.0:3001");
    }

    #[test]
    fn secret_is_required() {
        assert!(AppConfig::from_lookup(env(&[])).is_err());
        assert!(AppConfig::from_lookup(env(&[("TOKEN_SECRET", "")])).is_err());
    }

    #[test]
    fn overrides_are_parsed() {
        let config = AppConfig::from_lookup(env(&[
            ("TOKEN_SECRET", "s3cret"),
            ("PORT", "8080"),
            ("DATABASE_URL", "postgres://localhost/students"),
            ("TOKEN_TTL_SECS", "300"),
            ("ALLOW_DUPLICATE_USERNAMES", "false"),
        ]))
        .unwrap();
        assert_eq!(config.port, 8080);
        assert_eq!(config.token_lifetime, Duration::seconds(300));
        assert_eq!(
            config.database_url.as_deref(),
            Some("postgres://localhost/students")
        );
        assert!(!config.registration.allow_duplicate_usernames);
    }

    #[test]
    fn bad_values_fail() {
        assert!(AppConfig::from_lookup(env(&[("TOKEN_SECRET", "s"), ("PORT", "http")])).is_err());
        assert!(
            AppConfig::from_lookup(env(&[("TOKEN_SECRET", "s"), ("TOKEN_TTL_SECS", "0")])).is_err()
        );
    }

    #[test]
    fn token_ttl_is_capped() {
        let week = MAX_TOKEN_TTL_SECS.to_string();
        let config =
            AppConfig::from_lookup(env(&[("TOKEN_SECRET", "s"), ("TOKEN_TTL_SECS", &week)])).unwrap();
        assert_eq!(config.token_lifetime, Duration::seconds(MAX_TOKEN_TTL_SECS));

        let over = (MAX_TOKEN_TTL_SECS + 1).to_string();
        assert!(AppConfig::from_lookup(env(&[("TOKEN_SECRET", "s"), ("TOKEN_TTL_SECS", &over)])).is_err());
        assert!(AppConfig::from_lookup(env(&[
            ("TOKEN_SECRET", "s"),
            ("TOKEN_TTL_SECS", "9000000000000000"),
        ]))
        .is_err());
    }
}
