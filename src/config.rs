//! Configuration using Figment
//!
//! Configuration is loaded from:
//! 1. built-in defaults
//! 2. a TOML file (`config/dio-aggregator.toml` unless another path is given)
//! 3. environment variables prefixed with `DIO_AGG_`, nested keys split on `__`
//!
//! # Example
//! ```no_run
//! use dio_aggregator::config::AppConfig;
//!
//! let config = AppConfig::load()?;
//! config.validate()?;
//! println!("Application: {}", config.application.name);
//! # Ok::<(), dio_aggregator::AggregatorError>(())
//! ```

use std::collections::HashSet;
use std::path::Path;

use dio_driver_mock::MockChipConfig;
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::{AggregatorError, AggregatorResult};
use crate::forwarder::{ForwarderFeatures, DELAY_CELLS};
use crate::registry::{AggregatorRegistry, DEFAULT_DEVICE_PREFIX};

/// Default configuration file path.
pub const DEFAULT_CONFIG_PATH: &str = "config/dio-aggregator.toml";

/// Environment variable prefix.
pub const ENV_PREFIX: &str = "DIO_AGG_";

/// Top-level configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AppConfig {
    /// Application settings
    #[serde(default)]
    pub application: ApplicationConfig,
    /// Registry settings
    #[serde(default)]
    pub registry: RegistryConfig,
    /// Simulated line controllers
    #[serde(default)]
    pub chips: Vec<MockChipConfig>,
    /// Aggregators created at start-up
    #[serde(default)]
    pub aggregators: Vec<AggregatorDefinition>,
}

/// Application-level configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApplicationConfig {
    /// Application name
    #[serde(default = "default_name")]
    pub name: String,
    /// Logging level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for ApplicationConfig {
    fn default() -> Self {
        Self {
            name: default_name(),
            log_level: default_log_level(),
        }
    }
}

/// Registry settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegistryConfig {
    /// Device name prefix; devices are named `<prefix>.<id>`
    #[serde(default = "default_device_prefix")]
    pub device_prefix: String,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            device_prefix: default_device_prefix(),
        }
    }
}

/// Aggregator created when the application starts
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AggregatorDefinition {
    /// Request text, same grammar as `new_device`
    pub request: String,
    /// Enable the per-line ramp delay table
    #[serde(default)]
    pub delay: bool,
    /// Delay specifiers: `[line, rising_us, falling_us]`
    #[serde(default)]
    pub ramps: Vec<Vec<u32>>,
}

impl AggregatorDefinition {
    /// Forwarder features this definition asks for.
    pub fn features(&self) -> ForwarderFeatures {
        if self.delay {
            ForwarderFeatures::DELAY
        } else {
            ForwarderFeatures::empty()
        }
    }
}

// Default value functions
fn default_name() -> String {
    "dio-aggregator".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_device_prefix() -> String {
    DEFAULT_DEVICE_PREFIX.to_string()
}

impl AppConfig {
    /// Load configuration from the default path and environment variables
    pub fn load() -> AggregatorResult<Self> {
        Self::load_from(DEFAULT_CONFIG_PATH)
    }

    /// Load configuration from a specific file path
    ///
    /// A missing file leaves the defaults in place.
    /// Example override: `DIO_AGG_APPLICATION__LOG_LEVEL=debug`
    pub fn load_from<P: AsRef<Path>>(path: P) -> AggregatorResult<Self> {
        let config = Figment::from(Serialized::defaults(AppConfig::default()))
            .merge(Toml::file(path.as_ref()))
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
            .extract()?;
        Ok(config)
    }

    /// Validate configuration after loading
    pub fn validate(&self) -> AggregatorResult<()> {
        crate::logging::level_from_str(&self.application.log_level)?;

        let prefix = &self.registry.device_prefix;
        if prefix.is_empty() || prefix.contains(char::is_whitespace) {
            return Err(AggregatorError::Configuration(format!(
                "Invalid device_prefix '{}'",
                prefix
            )));
        }

        let mut labels = HashSet::new();
        for chip in &self.chips {
            if !labels.insert(chip.label.as_str()) {
                return Err(AggregatorError::Configuration(format!(
                    "Duplicate chip label: {}",
                    chip.label
                )));
            }
            if chip.names.len() > chip.lines as usize {
                return Err(AggregatorError::Configuration(format!(
                    "Chip '{}' names {} lines but has {}",
                    chip.label,
                    chip.names.len(),
                    chip.lines
                )));
            }
        }

        for (index, def) in self.aggregators.iter().enumerate() {
            if !def.ramps.is_empty() && !def.delay {
                return Err(AggregatorError::Configuration(format!(
                    "Aggregator {} has ramps but delay is disabled",
                    index
                )));
            }
            if let Some(ramp) = def.ramps.iter().find(|r| r.len() != DELAY_CELLS) {
                return Err(AggregatorError::Configuration(format!(
                    "Aggregator {}: ramp {:?} must have {} cells (line, rising_us, falling_us)",
                    index, ramp, DELAY_CELLS
                )));
            }
        }

        Ok(())
    }

    /// Render as TOML.
    pub fn to_toml_string(&self) -> AggregatorResult<String> {
        toml::to_string_pretty(self).map_err(|e| AggregatorError::Configuration(e.to_string()))
    }

    /// Create every configured aggregator. On failure, the ones created by
    /// this call are destroyed again.
    pub fn create_aggregators(&self, registry: &AggregatorRegistry) -> AggregatorResult<Vec<u32>> {
        let mut created = Vec::with_capacity(self.aggregators.len());
        for def in &self.aggregators {
            match create_one(registry, def) {
                Ok(id) => created.push(id),
                Err(e) => {
                    for id in created.into_iter().rev() {
                        registry.destroy(id)?;
                    }
                    return Err(e);
                }
            }
        }
        info!(count = created.len(), "Created configured aggregators");
        Ok(created)
    }
}

fn create_one(registry: &AggregatorRegistry, def: &AggregatorDefinition) -> AggregatorResult<u32> {
    let id = registry.create_with(&def.request, def.features())?;
    let Some(device) = registry.device(id) else {
        return Err(AggregatorError::NoSuchDevice { id });
    };
    for ramp in &def.ramps {
        if let Err(e) = device.xlate_delay(ramp) {
            registry.destroy(id)?;
            return Err(e.into());
        }
    }
    Ok(id)
}
