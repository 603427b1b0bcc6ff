use openai_realtime::DEFAULT_REALTIME_URL;
use std::path::PathBuf;
use tracing::Level;

pub const DEFAULT_TOKEN_URL: &str = "http://localhost:8000/api/token";

/// Raised when an environment variable holds an unusable value.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid value for environment variable {0}: {1}")]
    InvalidValue(String, String),
}

/// Client settings taken from the environment (and `.env`) at startup.
#[derive(Clone, Debug)]
pub struct Config {
    pub token_url: String,
    pub realtime_url: String,
    /// Overrides the platform settings file when set.
    pub settings_path: Option<PathBuf>,
    pub log_level: Level,
}

impl Config {
    /// Reads the environment, falling back to defaults for unset variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        // Tests control the environment themselves.
        if !cfg!(test) {
            dotenvy::dotenv().ok();
        }

        let token_url = url_var("TOKEN_URL", DEFAULT_TOKEN_URL)?;
        let realtime_url = url_var("REALTIME_URL", DEFAULT_REALTIME_URL)?;

        let settings_path = match std::env::var("SETTINGS_PATH") {
            Ok(path) if path.trim().is_empty() => {
                return Err(ConfigError::InvalidValue(
                    "SETTINGS_PATH".to_string(),
                    "path must not be empty".to_string(),
                ));
            }
            Ok(path) => Some(PathBuf::from(path)),
            Err(_) => None,
        };

        let log_level_str = std::env::var("RUST_LOG").unwrap_or_else(|_| "INFO".to_string());
        let log_level = log_level_str.parse::<Level>().map_err(|_| {
            ConfigError::InvalidValue(
                "RUST_LOG".to_string(),
                format!("'{}' is not a valid log level", log_level_str),
            )
        })?;

        Ok(Self {
            token_url,
            realtime_url,
            settings_path,
            log_level,
        })
    }
}

fn url_var(name: &str, default: &str) -> Result<String, ConfigError> {
    let value = std::env::var(name).unwrap_or_else(|_| default.to_string());
    reqwest::Url::parse(&value)
        .map_err(|e| ConfigError::InvalidValue(name.to_string(), e.to_string()))?;
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::env;

    fn clear_env_vars() {
        unsafe {
            env::remove_var("TOKEN_URL");
            env::remove_var("REALTIME_URL");
            env::remove_var("SETTINGS_PATH");
            env::remove_var("RUST_LOG");
        }
    }

    #[test]
    fn test_config_error_display() {
        let invalid_value =
            ConfigError::InvalidValue("TEST_VAR".to_string(), "bad_value".to_string());
        assert_eq!(
            format!("{}", invalid_value),
            "Invalid value for environment variable TEST_VAR: bad_value"
        );
    }

    #[test]
    #[serial]
    fn test_config_from_env_defaults() {
        clear_env_vars();

        let config = Config::from_env().expect("Config should load successfully");

        assert_eq!(config.token_url, "http://localhost:8000/api/token");
        assert_eq!(config.realtime_url, "https://api.openai.com/v1/realtime");
        assert_eq!(config.settings_path, None);
        assert_eq!(config.log_level, Level::INFO);
    }

    #[test]
    #[serial]
    fn test_config_from_env_custom_values() {
        clear_env_vars();
        unsafe {
            env::set_var("TOKEN_URL", "https://tokens.example.com/api/token");
            env::set_var("REALTIME_URL", "http://127.0.0.1:9000/v1/realtime");
            env::set_var("SETTINGS_PATH", "/custom/settings.json");
            env::set_var("RUST_LOG", "debug");
        }

        let config = Config::from_env().expect("Config should load successfully");

        assert_eq!(config.token_url, "https://tokens.example.com/api/token");
        assert_eq!(config.realtime_url, "http://127.0.0.1:9000/v1/realtime");
        assert_eq!(
            config.settings_path,
            Some(PathBuf::from("/custom/settings.json"))
        );
        assert_eq!(config.log_level, Level::DEBUG);
        clear_env_vars();
    }

    #[test]
    #[serial]
    fn test_config_invalid_token_url() {
        clear_env_vars();
        unsafe {
            env::set_var("TOKEN_URL", "not a url");
        }

        let err = Config::from_env().unwrap_err();
        match err {
            ConfigError::InvalidValue(var, _) => assert_eq!(var, "TOKEN_URL"),
        }
        clear_env_vars();
    }

    #[test]
    #[serial]
    fn test_config_empty_settings_path() {
        clear_env_vars();
        unsafe {
            env::set_var("SETTINGS_PATH", "  ");
        }

        let err = Config::from_env().unwrap_err();
        match err {
            ConfigError::InvalidValue(var, _) => assert_eq!(var, "SETTINGS_PATH"),
        }
        clear_env_vars();
    }

    #[test]
    #[serial]
    fn test_config_invalid_log_level() {
        clear_env_vars();
        unsafe {
            env::set_var("RUST_LOG", "not-a-level");
        }

        let err = Config::from_env().unwrap_err();
        match err {
            ConfigError::InvalidValue(var, _) => assert_eq!(var, "RUST_LOG"),
        }
        clear_env_vars();
    }
}
