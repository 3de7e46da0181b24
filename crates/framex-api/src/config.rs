//! API server settings read from the environment.

use std::net::{AddrParseError, SocketAddr};
use std::str::FromStr;

const DEFAULT_PORT: u16 = 8082;
const DEFAULT_RPS: u32 = 20;
const DEFAULT_BODY_LIMIT: usize = 1 << 20;

#[derive(Debug, Clone)]
pub struct ApiConfig {
    pub host: String,
    pub port: u16,
    /// Allowed CORS origins; `*` allows any.
    pub cors_origins: Vec<String>,
    /// Sustained requests per second allowed per client IP on job routes.
    pub rate_limit_rps: u32,
    pub max_body_size: usize,
    /// `production` hides internal error details from responses.
    pub environment: String,
    pub metrics_enabled: bool,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".into(),
            port: DEFAULT_PORT,
            cors_origins: vec!["*".into()],
            rate_limit_rps: DEFAULT_RPS,
            max_body_size: DEFAULT_BODY_LIMIT,
            environment: "development".into(),
            metrics_enabled: true,
        }
    }
}

/// Parsed value of `key`, or `default` when unset or unparsable.
fn env_parse<T: FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|raw| raw.trim().parse().ok())
        .unwrap_or(default)
}

fn env_flag(key: &str, default: bool) -> bool {
    match std::env::var(key) {
        Ok(raw) => matches!(raw.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes"),
        Err(_) => default,
    }
}

fn split_origins(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|origin| !origin.is_empty())
        .map(String::from)
        .collect()
}

impl ApiConfig {
    /// Reads `API_HOST`, `API_PORT`, `CORS_ORIGINS`, `RATE_LIMIT_RPS`,
    /// `MAX_BODY_SIZE`, `ENVIRONMENT` and `METRICS_ENABLED`.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            host: std::env::var("API_HOST").unwrap_or(defaults.host),
            port: env_parse("API_PORT", defaults.port),
            cors_origins: std::env::var("CORS_ORIGINS")
                .map(|raw| split_origins(&raw))
                .unwrap_or(defaults.cors_origins),
            rate_limit_rps: env_parse("RATE_LIMIT_RPS", defaults.rate_limit_rps),
            max_body_size: env_parse("MAX_BODY_SIZE", defaults.max_body_size),
            environment: std::env::var("ENVIRONMENT").unwrap_or(defaults.environment),
            metrics_enabled: env_flag("METRICS_ENABLED", defaults.metrics_enabled),
        }
    }

    pub fn is_production(&self) -> bool {
        self.environment.eq_ignore_ascii_case("production")
    }

    pub fn bind_addr(&self) -> Result<SocketAddr, AddrParseError> {
        format!("{}:{}", self.host, self.port).parse()
    }
}
