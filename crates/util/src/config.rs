use std::{env, fmt, net::SocketAddr};

use super::server_bind_address;

pub const DEFAULT_DATABASE_URL: &str = "sqlite://kennel.db";
pub const DEFAULT_PAGE_SIZE: u32 = 10;
pub const DEFAULT_ADMIN_USERNAME: &str = "admin";
pub const DEFAULT_ADMIN_PASSWORD: &str = "admin";

/// Application runtime environment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Environment {
    Development,
    Production,
    Test,
}

impl Environment {
    fn from_str(value: &str) -> Result<Self, ConfigError> {
        match value {
            "development" | "dev" => Ok(Self::Development),
            "production" | "prod" => Ok(Self::Production),
            "test" => Ok(Self::Test),
            other => Err(ConfigError::InvalidEnvironment(other.to_string())),
        }
    }

    /// Returns the canonical name used for logging/metrics labels.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Development => "development",
            Self::Production => "production",
            Self::Test => "test",
        }
    }
}

/// Runtime configuration resolved from environment variables.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub bind_addr: SocketAddr,
    pub environment: Environment,
    pub database_url: String,
    /// Number of items per collection page.
    pub page_size: u32,
    /// Absolute origin used when rendering resource links. When unset the
    /// request `Host` header is used instead.
    pub public_url: Option<String>,
}

impl AppConfig {
    /// Constructs the configuration by reading and validating environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        let env_value = env::var("APP_ENV").unwrap_or_else(|_| "development".to_string());
        let environment = Environment::from_str(&env_value)?;
        let bind_addr = server_bind_address().map_err(ConfigError::BindAddress)?;
        let database_url =
            env::var("APP_DATABASE_URL").unwrap_or_else(|_| DEFAULT_DATABASE_URL.to_string());

        let page_size = match env::var("APP_PAGE_SIZE") {
            Ok(raw) => match raw.trim().parse::<u32>() {
                Ok(value) if value > 0 => value,
                _ => return Err(ConfigError::InvalidPageSize(raw)),
            },
            Err(_) => DEFAULT_PAGE_SIZE,
        };

        let public_url = match env::var("APP_PUBLIC_URL") {
            Ok(raw) if raw.trim().is_empty() => None,
            Ok(raw) => Some(parse_public_url(&raw)?),
            Err(_) => None,
        };

        Ok(Self {
            bind_addr,
            environment,
            database_url,
            page_size,
            public_url,
        })
    }
}

fn parse_public_url(raw: &str) -> Result<String, ConfigError> {
    let trimmed = raw.trim().trim_end_matches('/');
    let host = trimmed
        .strip_prefix("http://")
        .or_else(|| trimmed.strip_prefix("https://"));
    match host {
        Some(host) if !host.is_empty() => Ok(trimmed.to_string()),
        _ => Err(ConfigError::InvalidPublicUrl(raw.to_string())),
    }
}

/// Credentials for the account created by `kennel init-admin`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdminCredentials {
    pub username: String,
    pub email: String,
    pub password: String,
}

impl AdminCredentials {
    pub fn from_env() -> Self {
        Self {
            username: env::var("APP_ADMIN_USERNAME")
                .unwrap_or_else(|_| DEFAULT_ADMIN_USERNAME.to_string()),
            email: env::var("APP_ADMIN_EMAIL").unwrap_or_default(),
            password: env::var("APP_ADMIN_PASSWORD")
                .unwrap_or_else(|_| DEFAULT_ADMIN_PASSWORD.to_string()),
        }
    }
}

/// Errors that can occur during configuration loading.
#[derive(Debug)]
pub enum ConfigError {
    InvalidEnvironment(String),
    BindAddress(std::net::AddrParseError),
    InvalidPageSize(String),
    InvalidPublicUrl(String),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidEnvironment(value) => write!(
                f,
                "APP_ENV must be one of 'development', 'production', or 'test' (got {value})"
            ),
            Self::BindAddress(err) => write!(f, "invalid APP_BIND_ADDR value: {err}"),
            Self::InvalidPageSize(value) => {
                write!(f, "APP_PAGE_SIZE must be a positive integer (got {value})")
            }
            Self::InvalidPublicUrl(value) => write!(
                f,
                "APP_PUBLIC_URL must be an absolute http(s) origin (got {value})"
            ),
        }
    }
}

impl std::error::Error for ConfigError {}
