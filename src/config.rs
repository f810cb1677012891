//! Configuration module
//!
//! Loads configuration from environment variables.

use std::env;
use std::time::Duration;

/// Application configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Database connection URL
    pub database_url: String,

    /// Maximum database connections in pool
    pub database_max_connections: u32,

    /// Server host
    pub host: String,

    /// Server port
    pub port: u16,

    /// Environment (development, production)
    pub environment: String,

    /// Which event bus to use
    pub bus_type: BusType,

    /// NATS server URL (only used with `BusType::Nats`)
    pub nats_url: String,

    /// Subject carrying inbound saga commands
    pub saga_commands_subject: String,

    /// Subject the outbox relay publishes outcomes to
    pub saga_responses_subject: String,

    /// Fixed interval between outbox relay sweeps
    pub outbox_poll_interval: Duration,

    /// Failed publishes before an event is dead-lettered (None = retry forever)
    pub outbox_max_attempts: Option<u32>,

    /// Apply migrations at startup
    pub run_migrations: bool,
}

/// Event bus backend
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BusType {
    Nats,
    InMemory,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        let database_url = env::var("DATABASE_URL")
            .map_err(|_| ConfigError::MissingEnv("DATABASE_URL"))?;

        let database_max_connections = env::var("DATABASE_MAX_CONNECTIONS")
            .unwrap_or_else(|_| "10".to_string())
            .parse()
            .map_err(|_| ConfigError::InvalidValue("DATABASE_MAX_CONNECTIONS"))?;

        let host = env::var("HOST").unwrap_or_else(|_| "127.0.0.1".to_string());

        let port = env::var("PORT")
            .unwrap_or_else(|_| "3000".to_string())
            .parse()
            .map_err(|_| ConfigError::InvalidValue("PORT"))?;

        let environment = env::var("ENVIRONMENT").unwrap_or_else(|_| "development".to_string());

        let bus_type = parse_bus_type(&env::var("BUS_TYPE").unwrap_or_else(|_| "nats".to_string()))?;

        let nats_url = env::var("NATS_URL").unwrap_or_else(|_| "nats://localhost:4222".to_string());

        let saga_commands_subject =
            env::var("SAGA_COMMANDS_SUBJECT").unwrap_or_else(|_| "saga_events".to_string());

        let saga_responses_subject =
            env::var("SAGA_RESPONSES_SUBJECT").unwrap_or_else(|_| "saga_responses".to_string());

        let poll_interval_ms: u64 = env::var("OUTBOX_POLL_INTERVAL_MS")
            .unwrap_or_else(|_| "2000".to_string())
            .parse()
            .map_err(|_| ConfigError::InvalidValue("OUTBOX_POLL_INTERVAL_MS"))?;
        if poll_interval_ms == 0 {
            return Err(ConfigError::InvalidValue("OUTBOX_POLL_INTERVAL_MS"));
        }

        let outbox_max_attempts = match env::var("OUTBOX_MAX_ATTEMPTS") {
            Ok(raw) => parse_max_attempts(&raw)?,
            Err(_) => None,
        };

        let run_migrations = env::var("RUN_MIGRATIONS")
            .map(|v| v == "true" || v == "1")
            .unwrap_or(false);

        Ok(Self {
            database_url,
            database_max_connections,
            host,
            port,
            environment,
            bus_type,
            nats_url,
            saga_commands_subject,
            saga_responses_subject,
            outbox_poll_interval: Duration::from_millis(poll_interval_ms),
            outbox_max_attempts,
            run_migrations,
        })
    }
}

fn parse_bus_type(raw: &str) -> Result<BusType, ConfigError> {
    match raw.to_lowercase().as_str() {
        "nats" => Ok(BusType::Nats),
        "inmemory" | "in-memory" | "memory" => Ok(BusType::InMemory),
        _ => Err(ConfigError::InvalidValue("BUS_TYPE")),
    }
}

/// `0` or empty means unbounded retries.
fn parse_max_attempts(raw: &str) -> Result<Option<u32>, ConfigError> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Ok(None);
    }
    let attempts: u32 = raw
        .parse()
        .map_err(|_| ConfigError::InvalidValue("OUTBOX_MAX_ATTEMPTS"))?;
    Ok((attempts > 0).then_some(attempts))
}

/// Configuration error types
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingEnv(&'static str),

    #[error("Invalid value for environment variable: {0}")]
    InvalidValue(&'static str),
}
