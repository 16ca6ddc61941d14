//! Configuration module for the NoteTaker backend.
//!
//! All configuration is loaded from environment variables with sensible defaults.

use std::env;
use std::net::SocketAddr;
use std::path::PathBuf;

const DEFAULT_DB_PATH: &str = "./data/notetaker.sqlite";
const DEFAULT_BIND_ADDR: &str = "127.0.0.1:8080";
const DEFAULT_LOG_LEVEL: &str = "info";
const DEFAULT_SESSION_TTL_HOURS: i64 = 720;

/// Application configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// Pre-shared key required to sign in (sign-in is open when unset)
    pub api_psk: Option<String>,
    /// Path to SQLite database file
    pub db_path: PathBuf,
    /// Address to bind the server to
    pub bind_addr: SocketAddr,
    /// Log level (trace, debug, info, warn, error)
    pub log_level: String,
    /// Lifetime of a session issued at sign-in
    pub session_ttl_hours: i64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_psk: None,
            db_path: PathBuf::from(DEFAULT_DB_PATH),
            bind_addr: default_bind_addr(),
            log_level: DEFAULT_LOG_LEVEL.to_string(),
            session_ttl_hours: DEFAULT_SESSION_TTL_HOURS,
        }
    }
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();

        let api_psk = env::var("NOTETAKER_API_PSK")
            .ok()
            .filter(|psk| !psk.is_empty());

        let db_path = env::var("NOTETAKER_DB_PATH")
            .unwrap_or_else(|_| DEFAULT_DB_PATH.to_string())
            .into();

        let bind_addr = match env::var("NOTETAKER_BIND_ADDR") {
            Ok(raw) => raw.parse().unwrap_or_else(|_| {
                tracing::warn!("Invalid NOTETAKER_BIND_ADDR {:?}, using default", raw);
                default_bind_addr()
            }),
            Err(_) => default_bind_addr(),
        };

        let log_level =
            env::var("NOTETAKER_LOG_LEVEL").unwrap_or_else(|_| DEFAULT_LOG_LEVEL.to_string());

        let session_ttl_hours = match env::var("NOTETAKER_SESSION_TTL_HOURS") {
            Ok(raw) => match raw.parse::<i64>() {
                Ok(hours) if hours > 0 => hours,
                _ => {
                    tracing::warn!("Invalid NOTETAKER_SESSION_TTL_HOURS {:?}, using default", raw);
                    DEFAULT_SESSION_TTL_HOURS
                }
            },
            Err(_) => DEFAULT_SESSION_TTL_HOURS,
        };

        Self {
            api_psk,
            db_path,
            bind_addr,
            log_level,
            session_ttl_hours,
        }
    }
}

fn default_bind_addr() -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], 8080))
}
