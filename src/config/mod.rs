//! Configuration management for the garden engine.
//!
//! Configuration lives in a TOML file with one section per concern:
//!
//! - [`GardenConfig`] - game knobs (growth schedule, gift achievement ids)
//! - [`StorageConfig`] - where the sled database lives
//! - [`LoggingConfig`] - log level and optional log file
//!
//! All values have sensible defaults; `Config::create_default` writes a
//! starter file and `Config::load` validates on read.

use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};
use tokio::fs;

use crate::garden::scheduler::GrowthFrequency;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub garden: GardenConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Game-facing knobs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GardenConfig {
    /// Growth tick schedule: "daily", "12h", "6h", "hourly", or "disabled".
    #[serde(default = "default_growth_frequency")]
    pub growth_frequency: String,
    /// Achievement ids whose grants unwrap as crop gifts.
    #[serde(default = "default_gift_achievement_ids")]
    pub gift_achievement_ids: Vec<u32>,
}

fn default_growth_frequency() -> String {
    "daily".to_string()
}

fn default_gift_achievement_ids() -> Vec<u32> {
    vec![30, 50]
}

impl Default for GardenConfig {
    fn default() -> Self {
        Self {
            growth_frequency: default_growth_frequency(),
            gift_achievement_ids: default_gift_achievement_ids(),
        }
    }
}

impl GardenConfig {
    /// The parsed growth schedule. Validation guarantees this succeeds
    /// for a loaded config.
    pub fn frequency(&self) -> GrowthFrequency {
        GrowthFrequency::parse(&self.growth_frequency).unwrap_or_default()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Directory holding the sled database.
    #[serde(default = "default_data_dir")]
    pub data_dir: String,
}

fn default_data_dir() -> String {
    "data/garden".to_string()
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level: error, warn, info, debug, or trace.
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Optional log file; stderr when unset.
    #[serde(default)]
    pub file: Option<String>,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            file: None,
        }
    }
}

impl Config {
    /// Load and validate configuration from a TOML file.
    pub async fn load(path: &str) -> Result<Self> {
        let content = fs::read_to_string(path)
            .await
            .map_err(|e| anyhow!("cannot read config file '{}': {}", path, e))?;
        let config: Config =
            toml::from_str(&content).map_err(|e| anyhow!("invalid config file '{}': {}", path, e))?;
        config.validate()?;
        Ok(config)
    }

    /// Write a default configuration file, refusing to overwrite.
    pub async fn create_default(path: &str) -> Result<()> {
        if fs::try_exists(path).await? {
            return Err(anyhow!("config file '{}' already exists", path));
        }
        let config = Config::default();
        let content = toml::to_string_pretty(&config)?;
        fs::write(path, content).await?;
        Ok(())
    }

    fn validate(&self) -> Result<()> {
        if GrowthFrequency::parse(&self.garden.growth_frequency).is_none() {
            return Err(anyhow!(
                "unknown growth_frequency '{}'; expected daily, 12h, 6h, hourly, or disabled",
                self.garden.growth_frequency
            ));
        }
        if self.garden.gift_achievement_ids.is_empty() {
            return Err(anyhow!("gift_achievement_ids must name at least one achievement"));
        }
        match self.logging.level.as_str() {
            "error" | "warn" | "info" | "debug" | "trace" => {}
            other => return Err(anyhow!("unknown log level '{}'", other)),
        }
        if self.storage.data_dir.trim().is_empty() {
            return Err(anyhow!("storage.data_dir must not be empty"));
        }
        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            garden: GardenConfig::default(),
            storage: StorageConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.garden.frequency(), GrowthFrequency::Daily);
    }

    #[test]
    fn rejects_unknown_frequency() {
        let mut config = Config::default();
        config.garden.growth_frequency = "fortnightly".into();
        assert!(config.validate().is_err());
    }

    #[test]
    fn round_trips_through_toml() {
        let config = Config::default();
        let text = toml::to_string_pretty(&config).expect("serialize");
        let parsed: Config = toml::from_str(&text).expect("parse");
        assert_eq!(parsed.garden.gift_achievement_ids, vec![30, 50]);
        assert_eq!(parsed.storage.data_dir, "data/garden");
    }

    #[test]
    fn partial_files_fill_in_defaults() {
        let parsed: Config = toml::from_str("[garden]\ngrowth_frequency = \"6h\"\n").expect("parse");
        assert_eq!(parsed.garden.frequency(), GrowthFrequency::Every6Hours);
        assert_eq!(parsed.logging.level, "info");
    }

    #[test]
    fn load_reports_a_missing_file() {
        let err = tokio_test::block_on(Config::load("/nonexistent/gardenbot.toml"))
            .expect_err("no such file");
        assert!(err.to_string().contains("cannot read config"));
    }

    #[test]
    fn create_default_then_load_round_trips() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("config.toml");
        let path = path.to_str().expect("utf-8 path");

        tokio_test::block_on(Config::create_default(path)).expect("create");
        let loaded = tokio_test::block_on(Config::load(path)).expect("load");
        assert_eq!(loaded.garden.frequency(), GrowthFrequency::Daily);

        // A second init must refuse to clobber the existing file.
        assert!(tokio_test::block_on(Config::create_default(path)).is_err());
    }
}
