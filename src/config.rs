use serde::Deserialize;
use std::net::SocketAddr;
use std::time::Duration;

use crate::error::{NasaError, Result};

pub const DEMO_KEY: &str = "DEMO_KEY";
pub const APOD_ENDPOINT: &str = "https://api.nasa.gov/planetary/apod";
pub const NEO_ENDPOINT: &str = "https://api.nasa.gov/neo/rest/v1/feed";

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub api: ApiConfig,
    pub server: ServerConfig,
    pub wallpaper: WallpaperConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    pub api_key: String,
    pub apod_endpoint: String,
    pub neo_endpoint: String,
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Minimum age of the random image before `/random-apod/` samples a new one.
    pub random_refresh_ms: u64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct WallpaperConfig {
    pub interval_secs: f64,
    pub command: Option<String>,
    pub download_timeout_secs: u64,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            api_key: DEMO_KEY.to_string(),
            apod_endpoint: APOD_ENDPOINT.to_string(),
            neo_endpoint: NEO_ENDPOINT.to_string(),
            timeout_secs: 20,
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8080,
            random_refresh_ms: 1000,
        }
    }
}

impl Default for WallpaperConfig {
    fn default() -> Self {
        Self {
            interval_secs: 600.0, // 10 minutes
            command: None,
            download_timeout_secs: 40,
        }
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        // CONFIG_PATH wins over the built-in defaults, NASAKEY over both
        let mut config = match std::env::var("CONFIG_PATH") {
            Ok(path) => Self::from_file(&path)?,
            Err(_) => Self::default(),
        };

        if let Ok(key) = std::env::var("NASAKEY") {
            if !key.trim().is_empty() {
                config.api.api_key = key.trim().to_string();
            }
        }
        config.validate()?;
        Ok(config)
    }

    /// Rejects settings that would make every request or tick fail.
    pub fn validate(&self) -> Result<()> {
        if self.api.timeout_secs == 0 {
            return Err(NasaError::ConfigInvalid("api.timeout_secs must be at least 1".into()));
        }
        if self.wallpaper.download_timeout_secs == 0 {
            return Err(NasaError::ConfigInvalid(
                "wallpaper.download_timeout_secs must be at least 1".into(),
            ));
        }
        if self.api.api_key.is_empty() {
            return Err(NasaError::ConfigInvalid("api.api_key is empty".into()));
        }
        Ok(())
    }

    fn from_file(path: &str) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| NasaError::ConfigInvalid(format!("unable to read {}: {}", path, e)))?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| NasaError::ConfigInvalid(e.to_string()))
    }

    pub fn using_demo_key(&self) -> bool {
        self.api.api_key == DEMO_KEY
    }
}

impl ApiConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl ServerConfig {
    pub fn addr(&self) -> Result<SocketAddr> {
        format!("{}:{}", self.host, self.port)
            .parse()
            .map_err(|e| NasaError::ConfigInvalid(format!("invalid listen address: {}", e)))
    }

    pub fn random_refresh(&self) -> Duration {
        Duration::from_millis(self.random_refresh_ms)
    }
}

impl WallpaperConfig {
    pub fn interval(&self) -> Result<Duration> {
        secs_to_duration(self.interval_secs)
    }

    pub fn download_timeout(&self) -> Duration {
        Duration::from_secs(self.download_timeout_secs)
    }
}

/// Converts user supplied seconds into a `Duration`, rejecting values
/// `Duration::from_secs_f64` would panic on.
pub fn secs_to_duration(secs: f64) -> Result<Duration> {
    Duration::try_from_secs_f64(secs)
        .map_err(|_| NasaError::ConfigInvalid(format!("invalid interval: {}s", secs)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.api.api_key, DEMO_KEY);
        assert!(config.using_demo_key());
        assert_eq!(config.api.timeout(), Duration::from_secs(20));
        assert_eq!(config.server.random_refresh(), Duration::from_secs(1));
        assert_eq!(config.wallpaper.interval().unwrap(), Duration::from_secs(600));
        assert_eq!(config.server.addr().unwrap().port(), 8080);
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = Config::from_toml(
            r#"
            [api]
            api_key = "abc123"

            [wallpaper]
            interval_secs = 0.5
            command = "feh --bg-scale %s"
            "#,
        )
        .unwrap();

        assert_eq!(config.api.api_key, "abc123");
        assert!(!config.using_demo_key());
        assert_eq!(config.api.apod_endpoint, APOD_ENDPOINT);
        assert_eq!(config.wallpaper.interval().unwrap(), Duration::from_millis(500));
        assert_eq!(config.wallpaper.command.as_deref(), Some("feh --bg-scale %s"));
        assert_eq!(config.server.port, 8080);
    }

    #[test]
    fn test_zero_timeouts_are_rejected() {
        assert!(Config::default().validate().is_ok());

        let config = Config::from_toml("[api]\ntimeout_secs = 0").unwrap();
        assert!(matches!(config.validate(), Err(NasaError::ConfigInvalid(_))));

        let config = Config::from_toml("[wallpaper]\ndownload_timeout_secs = 0").unwrap();
        assert!(matches!(config.validate(), Err(NasaError::ConfigInvalid(_))));

        let config = Config::from_toml("[api]\ntimeout_secs = 15").unwrap();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_invalid_toml() {
        let err = Config::from_toml("[api\napi_key = 1").unwrap_err();
        assert!(matches!(err, NasaError::ConfigInvalid(_)));
    }

    #[test]
    fn test_secs_to_duration_rejects_negative() {
        assert!(secs_to_duration(-1.0).is_err());
        assert!(secs_to_duration(f64::NAN).is_err());
        assert_eq!(secs_to_duration(2.0).unwrap(), Duration::from_secs(2));
    }
}
