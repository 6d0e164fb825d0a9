use gemini_live::{ResponseModality, SessionConfig};
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
    pub session: SessionConfig,
    pub access_token: Option<String>,
    pub log_level: Level,
}

fn var_or(name: &str, default: &str) -> String {
    std::env::var(name).unwrap_or_else(|_| default.to_string())
}

fn parse_modalities(raw: &str) -> Result<Vec<ResponseModality>, ConfigError> {
    let modalities = raw
        .split(',')
        .filter(|s| !s.trim().is_empty())
        .map(|s| s.parse::<ResponseModality>())
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| ConfigError::InvalidValue("LIVE_RESPONSE_MODALITIES".to_string(), e))?;
    if modalities.is_empty() {
        return Err(ConfigError::InvalidValue(
            "LIVE_RESPONSE_MODALITIES".to_string(),
            "at least one modality is required".to_string(),
        ));
    }
    Ok(modalities)
}

impl Config {
    /// Loads configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        // Only load from .env in non-test mode to avoid contamination
        if !cfg!(test) {
            dotenvy::dotenv().ok();
        }

        let defaults = SessionConfig::default();

        let project_id = std::env::var("LIVE_PROJECT_ID")
            .map_err(|_| ConfigError::MissingVar("LIVE_PROJECT_ID".to_string()))?;

        let response_modalities = match std::env::var("LIVE_RESPONSE_MODALITIES") {
            Ok(raw) => parse_modalities(&raw)?,
            Err(_) => defaults.response_modalities.clone(),
        };

        let send_auth_frame = match std::env::var("LIVE_SEND_AUTH_FRAME") {
            Ok(raw) => raw.parse::<bool>().map_err(|_| {
                ConfigError::InvalidValue(
                    "LIVE_SEND_AUTH_FRAME".to_string(),
                    format!("'{}' is not true or false", raw),
                )
            })?,
            Err(_) => defaults.send_auth_frame,
        };

        let session = SessionConfig {
            endpoint: var_or("LIVE_ENDPOINT", &defaults.endpoint),
            project_id,
            location: var_or("LIVE_LOCATION", &defaults.location),
            model: var_or("LIVE_MODEL", &defaults.model),
            api_host: var_or("LIVE_API_HOST", &defaults.api_host),
            response_modalities,
            system_instruction: var_or("LIVE_SYSTEM_INSTRUCTIONS", &defaults.system_instruction),
            voice_name: var_or("LIVE_VOICE_NAME", &defaults.voice_name),
            language_code: var_or("LIVE_LANGUAGE_CODE", &defaults.language_code),
            send_auth_frame,
        };

        let access_token = std::env::var("LIVE_ACCESS_TOKEN").ok();

        let log_level_str = std::env::var("RUST_LOG").unwrap_or_else(|_| "INFO".to_string());
        let log_level = log_level_str.parse::<Level>().map_err(|_| {
            ConfigError::InvalidValue(
                "RUST_LOG".to_string(),
                format!("'{}' is not a valid log level", log_level_str),
            )
        })?;

        Ok(Self {
            session,
            access_token,
            log_level,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::env;

    const VARS: &[&str] = &[
        "LIVE_ENDPOINT",
        "LIVE_PROJECT_ID",
        "LIVE_LOCATION",
        "LIVE_MODEL",
        "LIVE_API_HOST",
        "LIVE_RESPONSE_MODALITIES",
        "LIVE_SYSTEM_INSTRUCTIONS",
        "LIVE_VOICE_NAME",
        "LIVE_LANGUAGE_CODE",
        "LIVE_SEND_AUTH_FRAME",
        "LIVE_ACCESS_TOKEN",
        "RUST_LOG",
    ];

    fn clear_env_vars() {
        for var in VARS {
            unsafe { env::remove_var(var) };
        }
    }

    #[test]
    #[serial]
    fn test_config_from_env_minimal() {
        clear_env_vars();
        unsafe { env::set_var("LIVE_PROJECT_ID", "my-project") };

        let config = Config::from_env().expect("Config should load successfully");

        assert_eq!(config.session.project_id, "my-project");
        assert_eq!(config.session.endpoint, "ws://localhost:8080");
        assert_eq!(config.session.location, "us-central1");
        assert_eq!(config.session.response_modalities, vec![ResponseModality::Audio]);
        assert!(!config.session.send_auth_frame);
        assert_eq!(config.access_token, None);
        assert_eq!(config.log_level, Level::INFO);
    }

    #[test]
    #[serial]
    fn test_config_from_env_custom_values() {
        clear_env_vars();
        unsafe {
            env::set_var("LIVE_PROJECT_ID", "p");
            env::set_var("LIVE_ENDPOINT", "ws://relay:9000");
            env::set_var("LIVE_MODEL", "gemini-live-test");
            env::set_var("LIVE_RESPONSE_MODALITIES", "text, audio");
            env::set_var("LIVE_SYSTEM_INSTRUCTIONS", "Speak like a pirate.");
            env::set_var("LIVE_VOICE_NAME", "charon");
            env::set_var("LIVE_LANGUAGE_CODE", "fr-FR");
            env::set_var("LIVE_SEND_AUTH_FRAME", "true");
            env::set_var("LIVE_ACCESS_TOKEN", "ya29.token");
            env::set_var("RUST_LOG", "debug");
        }

        let config = Config::from_env().expect("Config should load successfully");

        assert_eq!(config.session.endpoint, "ws://relay:9000");
        assert_eq!(
            config.session.model_uri(),
            "projects/p/locations/us-central1/publishers/google/models/gemini-live-test"
        );
        assert_eq!(
            config.session.response_modalities,
            vec![ResponseModality::Text, ResponseModality::Audio]
        );
        assert_eq!(config.session.system_instruction, "Speak like a pirate.");
        assert_eq!(config.session.voice_name, "charon");
        assert_eq!(config.session.language_code, "fr-FR");
        assert!(config.session.send_auth_frame);
        assert_eq!(config.access_token.as_deref(), Some("ya29.token"));
        assert_eq!(config.log_level, Level::DEBUG);
    }

    #[test]
    #[serial]
    fn test_config_missing_project() {
        clear_env_vars();

        let err = Config::from_env().unwrap_err();
        match err {
            ConfigError::MissingVar(var) => assert_eq!(var, "LIVE_PROJECT_ID"),
            _ => panic!("Expected MissingVar for LIVE_PROJECT_ID"),
        }
    }

    #[test]
    #[serial]
    fn test_config_invalid_modality() {
        clear_env_vars();
        unsafe {
            env::set_var("LIVE_PROJECT_ID", "p");
            env::set_var("LIVE_RESPONSE_MODALITIES", "AUDIO,VIDEO");
        }

        let err = Config::from_env().unwrap_err();
        match err {
            ConfigError::InvalidValue(var, detail) => {
                assert_eq!(var, "LIVE_RESPONSE_MODALITIES");
                assert!(detail.contains("VIDEO"));
            }
            _ => panic!("Expected InvalidValue for LIVE_RESPONSE_MODALITIES"),
        }
    }

    #[test]
    #[serial]
    fn test_config_invalid_auth_flag_and_log_level() {
        clear_env_vars();
        unsafe {
            env::set_var("LIVE_PROJECT_ID", "p");
            env::set_var("LIVE_SEND_AUTH_FRAME", "sometimes");
        }
        match Config::from_env().unwrap_err() {
            ConfigError::InvalidValue(var, _) => assert_eq!(var, "LIVE_SEND_AUTH_FRAME"),
            _ => panic!("Expected InvalidValue for LIVE_SEND_AUTH_FRAME"),
        }

        unsafe {
            env::remove_var("LIVE_SEND_AUTH_FRAME");
            env::set_var("RUST_LOG", "not-a-level");
        }
        match Config::from_env().unwrap_err() {
            ConfigError::InvalidValue(var, _) => assert_eq!(var, "RUST_LOG"),
            _ => panic!("Expected InvalidValue for RUST_LOG"),
        }
    }

    #[test]
    fn test_empty_modality_list_is_rejected() {
        assert!(parse_modalities(" , ").is_err());
    }
}
