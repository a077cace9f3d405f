use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::AuthError;

const CONFIG_FILE_NAME: &str = "config.toml";

/// Directory name shared by the config file and the credential store.
pub const APP_DIR_NAME: &str = "mediakeys-spotify-connect";

pub const DEFAULT_API_BASE: &str = "https://api.spotify.com";

/// Application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub auth: AuthorizationConfig,
    pub api: ApiConfig,
}

/// Auth server settings. Every field must be present before a login
/// can start or a refresh token can be exchanged.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthorizationConfig {
    /// Base URI of the auth server that brokers the Spotify login
    #[serde(rename = "authServerURI", skip_serializing_if = "Option::is_none")]
    pub auth_server_uri: Option<String>,
    /// Spotify application client ID
    #[serde(rename = "spotifyClientID", skip_serializing_if = "Option::is_none")]
    pub client_id: Option<String>,
    /// URI the auth server redirects back to (custom URL scheme)
    #[serde(rename = "redirectURI", skip_serializing_if = "Option::is_none")]
    pub redirect_uri: Option<String>,
}

/// An [`AuthorizationConfig`] with every field known to be present.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedAuth {
    pub auth_server_uri: String,
    pub client_id: String,
    pub redirect_uri: String,
}

impl AuthorizationConfig {
    pub fn new(auth_server_uri: &str, client_id: &str, redirect_uri: &str) -> Self {
        Self {
            auth_server_uri: Some(auth_server_uri.to_string()),
            client_id: Some(client_id.to_string()),
            redirect_uri: Some(redirect_uri.to_string()),
        }
    }

    pub fn resolve(&self) -> Result<ResolvedAuth, AuthError> {
        fn present(value: &Option<String>, name: &'static str) -> Result<String, AuthError> {
            match value.as_deref().map(str::trim) {
                Some(v) if !v.is_empty() => Ok(v.to_string()),
                _ => Err(AuthError::MissingConfig(name)),
            }
        }

        let auth_server_uri = present(&self.auth_server_uri, "authServerURI")?
            .trim_end_matches('/')
            .to_string();

        Ok(ResolvedAuth {
            auth_server_uri,
            client_id: present(&self.client_id, "spotifyClientID")?,
            redirect_uri: present(&self.redirect_uri, "redirectURI")?,
        })
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(v) = std::env::var("MEDIAKEYS_AUTH_SERVER_URI") {
            self.auth_server_uri = Some(v);
        }
        if let Ok(v) = std::env::var("MEDIAKEYS_CLIENT_ID") {
            self.client_id = Some(v);
        }
        if let Ok(v) = std::env::var("MEDIAKEYS_REDIRECT_URI") {
            self.redirect_uri = Some(v);
        }
    }
}

/// Web API settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    /// Base URL for playback endpoints
    pub base_url: String,
    /// Per-request timeout in seconds, applied to the auth server too
    pub request_timeout_secs: u64,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_API_BASE.to_string(),
            request_timeout_secs: 10,
        }
    }
}

impl ApiConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs.max(1))
    }
}

impl Config {
    /// Get the configuration file path
    pub fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .context("Failed to get config directory")?
            .join(APP_DIR_NAME);

        fs::create_dir_all(&config_dir)
            .context("Failed to create config directory")?;

        Ok(config_dir.join(CONFIG_FILE_NAME))
    }

    /// Load configuration from the default location, creating it if missing.
    /// `MEDIAKEYS_*` environment variables override the auth fields.
    pub fn load() -> Result<Self> {
        let path = Self::config_path()?;
        let mut config = Self::load_from(&path)?;
        config.auth.apply_env_overrides();
        Ok(config)
    }

    /// Load configuration from file, or create default if not exists
    pub fn load_from(path: &Path) -> Result<Self> {
        if path.exists() {
            let contents = fs::read_to_string(path)
                .context("Failed to read config file")?;

            let config: Config = toml::from_str(&contents)
                .context("Failed to parse config file")?;

            Ok(config)
        } else {
            let config = Config::default();
            config.save_to(path)?;
            tracing::info!(path = %path.display(), "Wrote default config");
            Ok(config)
        }
    }

    /// Save configuration to file
    pub fn save_to(&self, path: &Path) -> Result<()> {
        let contents = toml::to_string_pretty(self)
            .context("Failed to serialize config")?;

        fs::write(path, contents)
            .context("Failed to write config file")?;

        Ok(())
    }

    /// Generate example config content for documentation
    pub fn example_config() -> String {
        let config = Config {
            auth: AuthorizationConfig::new(
                "https://auth.example.com",
                "your-spotify-client-id",
                "mediakeys-spotify-connect://callback",
            ),
            api: ApiConfig::default(),
        };
        toml::to_string_pretty(&config).unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();

        assert!(config.auth.auth_server_uri.is_none());
        assert!(config.auth.client_id.is_none());
        assert!(config.auth.redirect_uri.is_none());
        assert_eq!(config.api.base_url, "https://api.spotify.com");
        assert_eq!(config.api.request_timeout_secs, 10);
    }

    #[test]
    fn test_full_config_parsing() {
        let full_toml = r#"
[auth]
authServerURI = "https://auth.example.com/"
spotifyClientID = "abc123"
redirectURI = "mediakeys://cb"

[api]
base_url = "http://127.0.0.1:9000"
request_timeout_secs = 3
"#;

        let config: Config = toml::from_str(full_toml).unwrap();

        assert_eq!(config.auth.client_id.as_deref(), Some("abc123"));
        assert_eq!(config.api.base_url, "http://127.0.0.1:9000");
        assert_eq!(config.api.request_timeout(), Duration::from_secs(3));

        let resolved = config.auth.resolve().unwrap();
        assert_eq!(resolved.auth_server_uri, "https://auth.example.com");
        assert_eq!(resolved.redirect_uri, "mediakeys://cb");
    }

    #[test]
    fn test_partial_config_is_missing_config() {
        let partial_toml = r#"
[auth]
authServerURI = "https://auth.example.com"
"#;

        let config: Config = toml::from_str(partial_toml).unwrap();

        assert_eq!(
            config.auth.resolve(),
            Err(AuthError::MissingConfig("spotifyClientID"))
        );
        // Defaults still apply to the other section
        assert_eq!(config.api.base_url, DEFAULT_API_BASE);
    }

    #[test]
    fn test_blank_value_counts_as_missing() {
        let auth = AuthorizationConfig::new("https://auth.example.com", "id", "  ");
        assert_eq!(auth.resolve(), Err(AuthError::MissingConfig("redirectURI")));
    }

    #[test]
    fn test_example_config_is_valid() {
        let example = Config::example_config();
        let parsed: Config = toml::from_str(&example).expect("Example config should be valid TOML");
        assert!(parsed.auth.resolve().is_ok());
    }

    #[test]
    fn test_load_from_creates_default_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");

        let config = Config::load_from(&path).unwrap();
        assert!(path.exists());
        assert!(config.auth.resolve().is_err());

        let reloaded = Config::load_from(&path).unwrap();
        assert_eq!(reloaded.api.base_url, config.api.base_url);
    }

    #[test]
    fn test_invalid_toml_returns_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "this is not valid [[ toml").unwrap();

        assert!(Config::load_from(&path).is_err());
    }
}
