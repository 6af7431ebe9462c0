use anyhow::{Context, Result};

use crate::pagination::MAX_PER_PAGE;

/// Application configuration loaded from environment variables.
/// Fails at startup if required variables are missing.
#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub database_max_connections: u32,
    pub jwt_secret: String,
    pub port: u16,
    pub rust_log: String,
    pub default_page_size: u32,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok(); // load .env if present; ignore if missing

        Ok(Config {
            database_url: require_env("DATABASE_URL")?,
            database_max_connections: parse_env("DATABASE_MAX_CONNECTIONS", 10)?,
            jwt_secret: require_env("JWT_SECRET")?,
            port: parse_env("PORT", 8080)?,
            rust_log: std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string()),
            default_page_size: parse_env::<u32>("DEFAULT_PAGE_SIZE", 20)?.clamp(1, MAX_PER_PAGE),
        })
    }
}

fn require_env(key: &str) -> Result<String> {
    std::env::var(key).with_context(|| format!("Required environment variable '{key}' is not set"))
}

fn parse_env<T>(key: &str, default: T) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match std::env::var(key) {
        Ok(raw) => raw
            .parse::<T>()
            .with_context(|| format!("{key} has an invalid value '{raw}'")),
        Err(_) => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_env_default_when_unset() {
        let v: u16 = parse_env("CARDHUB_TEST_SURELY_UNSET_VAR", 8080).unwrap();
        assert_eq!(v, 8080);
    }

    #[test]
    fn test_parse_env_rejects_garbage() {
        std::env::set_var("CARDHUB_TEST_BAD_PORT", "not-a-port");
        let r: Result<u16> = parse_env("CARDHUB_TEST_BAD_PORT", 8080);
        assert!(r.is_err());
    }
}
