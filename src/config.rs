use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use anyhow::{Result, anyhow};

/// Matches the development default of the reply service.
pub const DEFAULT_ENDPOINT: &str = "http://localhost:8000/api/chat";

const ENDPOINT_ENV: &str = "FINCHAT_ENDPOINT";

#[derive(Serialize, Deserialize, Debug, Clone, Default)]
pub struct Config {
    pub endpoint: Option<String>,
}

impl Config {
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::config_path()?)
    }

    fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = fs::read_to_string(path)?;
        let config: Config = serde_json::from_str(&content)?;
        Ok(config)
    }

    /// Resolve the reply endpoint: env var first, then config file, then the
    /// built-in default.
    pub fn endpoint(&self) -> String {
        resolve_endpoint(std::env::var(ENDPOINT_ENV).ok(), self.endpoint.as_deref())
    }

    fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| anyhow!("Could not determine config directory"))?;

        Ok(config_dir.join("finchat").join("config.json"))
    }
}

fn resolve_endpoint(env_value: Option<String>, file_value: Option<&str>) -> String {
    env_value
        .or_else(|| file_value.map(str::to_string))
        .unwrap_or_else(|| DEFAULT_ENDPOINT.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::load_from(&dir.path().join("config.json")).unwrap();
        assert!(config.endpoint.is_none());
        assert_eq!(resolve_endpoint(None, config.endpoint.as_deref()), DEFAULT_ENDPOINT);
    }

    #[test]
    fn loads_endpoint_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, r#"{"endpoint": "http://example.com/api/chat"}"#).unwrap();

        let loaded = Config::load_from(&path).unwrap();
        assert_eq!(
            loaded.endpoint.as_deref(),
            Some("http://example.com/api/chat")
        );
        assert_eq!(
            resolve_endpoint(None, loaded.endpoint.as_deref()),
            "http://example.com/api/chat"
        );
    }

    #[test]
    fn rejects_malformed_config() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, "not json").unwrap();

        assert!(Config::load_from(&path).is_err());
    }

    #[test]
    fn endpoint_precedence_is_env_then_file_then_default() {
        assert_eq!(
            resolve_endpoint(Some("http://env".to_string()), Some("http://file")),
            "http://env"
        );
        assert_eq!(
            resolve_endpoint(None, Some("http://file")),
            "http://file"
        );
        assert_eq!(resolve_endpoint(None, None), DEFAULT_ENDPOINT);
    }
}
