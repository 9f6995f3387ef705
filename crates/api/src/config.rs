use std::net::{IpAddr, SocketAddr};
use std::str::FromStr;
use std::time::Duration;

use coursecast_events::delivery::email::app_base_url_from_env;
use coursecast_events::{DeliveryConfig, EmailLinks};

use crate::auth::jwt::JwtConfig;

/// Everything the server binary reads from the environment.
///
/// Only `JWT_SECRET` is required; the rest defaults to values that suit
/// local development.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Allowed CORS origins, parsed from comma-separated `CORS_ORIGINS`.
    pub cors_origins: Vec<String>,
    /// Applies to HTTP requests. WebSocket sessions are not cut off by it.
    pub request_timeout: Duration,
    /// How long shutdown waits for background loops and in-flight email
    /// sends.
    pub shutdown_timeout: Duration,
    /// Interval between pings to connected sockets.
    pub heartbeat_interval: Duration,
    /// Front-end origin used for links in notification emails.
    pub app_base_url: String,
    pub jwt: JwtConfig,
    /// Quiet-hours clock and background loop intervals.
    pub delivery: DeliveryConfig,
}

impl ServerConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                     | Default                 |
    /// |-----------------------------|-------------------------|
    /// | `HOST`                      | `0.0.0.0`               |
    /// | `PORT`                      | `3000`                  |
    /// | `CORS_ORIGINS`              | `http://localhost:5173` |
    /// | `REQUEST_TIMEOUT_SECS`      | `30`                    |
    /// | `SHUTDOWN_TIMEOUT_SECS`     | `30`                    |
    /// | `WS_HEARTBEAT_INTERVAL_SECS`| `30`                    |
    /// | `APP_BASE_URL`              | `http://localhost:5173` |
    ///
    /// JWT settings come from [`JwtConfig::from_env`] and delivery settings
    /// from [`DeliveryConfig::from_env`].
    ///
    /// # Panics
    ///
    /// Panics on a value that does not parse, naming the variable.
    pub fn from_env() -> Self {
        Self {
            host: std::env::var("HOST").unwrap_or_else(|_| "0.0.0.0".into()),
            port: parse_env("PORT", 3000),
            cors_origins: parse_origins(
                &std::env::var("CORS_ORIGINS").unwrap_or_else(|_| "http://localhost:5173".into()),
            ),
            request_timeout: Duration::from_secs(parse_env("REQUEST_TIMEOUT_SECS", 30)),
            shutdown_timeout: Duration::from_secs(parse_env("SHUTDOWN_TIMEOUT_SECS", 30)),
            heartbeat_interval: Duration::from_secs(parse_env("WS_HEARTBEAT_INTERVAL_SECS", 30)),
            app_base_url: app_base_url_from_env(),
            jwt: JwtConfig::from_env(),
            delivery: DeliveryConfig::from_env(),
        }
    }

    /// Socket address to bind. Fails if `host` is not an IP address.
    pub fn bind_addr(&self) -> Result<SocketAddr, std::net::AddrParseError> {
        Ok(SocketAddr::new(IpAddr::from_str(&self.host)?, self.port))
    }

    pub fn email_links(&self) -> EmailLinks {
        EmailLinks::new(self.app_base_url.clone())
    }
}

fn parse_env<T>(name: &str, default: T) -> T
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match std::env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse()
            .unwrap_or_else(|e| panic!("{name} must be a valid value, got '{raw}': {e}")),
        Err(_) => default,
    }
}

/// Split a comma-separated origin list, dropping blanks.
pub fn parse_origins(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn origins_are_trimmed_and_blanks_dropped() {
        assert_eq!(
            parse_origins(" https://app.example.com, ,http://localhost:5173,"),
            vec!["https://app.example.com", "http://localhost:5173"]
        );
        assert!(parse_origins("").is_empty());
    }

    #[test]
    fn bind_addr_requires_an_ip_host() {
        let mut config = ServerConfig {
            host: "127.0.0.1".into(),
            port: 8080,
            cors_origins: Vec::new(),
            request_timeout: Duration::from_secs(30),
            shutdown_timeout: Duration::from_secs(30),
            heartbeat_interval: Duration::from_secs(30),
            app_base_url: "http://localhost:5173".into(),
            jwt: JwtConfig {
                secret: "s".into(),
                access_token_expiry_mins: 15,
                leeway_secs: 60,
                issuer: None,
            },
            delivery: DeliveryConfig::default(),
        };
        assert_eq!(config.bind_addr().unwrap().to_string(), "127.0.0.1:8080");

        config.host = "localhost".into();
        assert!(config.bind_addr().is_err());
    }
}
