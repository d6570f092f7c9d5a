//! Provider configuration

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Provider configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderConfig {
    /// Organization service URL, e.g. `https://dev.azure.com/contoso`
    pub organization_url: Option<String>,

    /// Logging configuration
    pub logging: LoggingConfig,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            organization_url: None,
            logging: LoggingConfig::default(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Filter directive used when `RUST_LOG` is unset
    pub filter: String,

    /// Emit JSON lines instead of human-readable output
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: "info".to_string(),
            json: false,
        }
    }
}

impl ProviderConfig {
    /// Load configuration from file, falling back to defaults when it is missing
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        if path.exists() {
            let content = std::fs::read_to_string(path)?;
            let config: Self = toml::from_str(&content)?;
            config.validate()?;
            Ok(config)
        } else {
            Ok(Self::default())
        }
    }

    /// Save configuration to file
    pub fn save(&self, path: &Path) -> anyhow::Result<()> {
        let content = toml::to_string_pretty(self)?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Check field values
    pub fn validate(&self) -> crate::Result<()> {
        if let Some(url) = &self.organization_url {
            let url = url.trim();
            if !(url.starts_with("https://") || url.starts_with("http://")) {
                return Err(crate::Error::InvalidConfig(format!(
                    "organization_url must be an http(s) URL, got {:?}",
                    url
                )));
            }
        }
        if self.logging.filter.trim().is_empty() {
            return Err(crate::Error::InvalidConfig(
                "logging.filter must not be empty".to_string(),
            ));
        }
        Ok(())
    }

    /// Default config file location
    pub fn default_path() -> PathBuf {
        crate::default_config_dir().join("config.toml")
    }
}
