use gemini_live::SessionConfig;
use std::net::SocketAddr;
use tracing::Level;

/// A custom error type for configuration loading failures.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingVar(String),
    #[error("Invalid value for environment variable {0}: {1}")]
    InvalidValue(String, String),
}

/// Holds all configuration loaded from the environment at startup.
#[derive(Clone, Debug)]
pub struct Config {
    pub bind_address: SocketAddr,
    /// Upstream Live API endpoint every client connection is relayed to.
    pub service_url: String,
    /// Used for every upstream connection when set; otherwise tokens come from gcloud.
    pub access_token: Option<String>,
    pub gcloud_path: String,
    pub log_level: Level,
}

impl Config {
    /// Loads configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        // Only load from .env in non-test mode to avoid contamination
        if !cfg!(test) {
            dotenvy::dotenv().ok();
        }

        let bind_address_str =
            std::env::var("PROXY_BIND_ADDRESS").unwrap_or_else(|_| "127.0.0.1:8080".to_string());
        let bind_address = bind_address_str.parse::<SocketAddr>().map_err(|e| {
            ConfigError::InvalidValue("PROXY_BIND_ADDRESS".to_string(), e.to_string())
        })?;

        let service_url = match std::env::var("LIVE_SERVICE_URL") {
            Ok(url) => url,
            Err(_) => {
                let mut session = SessionConfig::default();
                if let Ok(host) = std::env::var("LIVE_API_HOST") {
                    session.api_host = host;
                }
                session.service_url()
            }
        };
        if !(service_url.starts_with("ws://") || service_url.starts_with("wss://")) {
            return Err(ConfigError::InvalidValue(
                "LIVE_SERVICE_URL".to_string(),
                format!("'{}' is not a WebSocket URL", service_url),
            ));
        }

        let access_token = std::env::var("ACCESS_TOKEN")
            .ok()
            .filter(|token| !token.trim().is_empty());

        let gcloud_path = std::env::var("GCLOUD_PATH").unwrap_or_else(|_| "gcloud".to_string());

        let log_level_str = std::env::var("RUST_LOG").unwrap_or_else(|_| "INFO".to_string());
        let log_level = log_level_str.parse::<Level>().map_err(|_| {
            ConfigError::InvalidValue(
                "RUST_LOG".to_string(),
                format!("'{}' is not a valid log level", log_level_str),
            )
        })?;

        Ok(Self {
            bind_address,
            service_url,
            access_token,
            gcloud_path,
            log_level,
        })
    }
}
