//! Configuration loading using Figment
//!
//! Configuration is loaded from:
//! 1. a TOML file (`config/tdc.toml` by default)
//! 2. Environment variables prefixed with `TDC_DAQ_`, nested keys separated
//!    by a double underscore (`TDC_DAQ_APPLICATION__LOG_LEVEL=debug`,
//!    `TDC_DAQ_CRATE__MODULES=4`)
//!
//! # Example
//! ```no_run
//! use tdc_daq::config::TdcConfig;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = TdcConfig::load()?;
//! config.validate()?;
//! println!("Modules: {}", config.layout.modules);
//! # Ok(())
//! # }
//! ```

use std::path::Path;

use daq_driver_c775::registers::{MAX_FSR_NS, MIN_FSR_NS};
use daq_driver_c775::{CrateLayout, MAX_MODULES};
use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

use crate::error::{AppError, AppResult};

/// Default configuration file, relative to the working directory.
pub const DEFAULT_CONFIG_PATH: &str = "config/tdc.toml";

/// Top-level configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TdcConfig {
    /// Application settings
    pub application: ApplicationConfig,
    /// Where the modules sit on the bus
    #[serde(rename = "crate")]
    pub layout: CrateLayout,
    /// Settings applied to every module after discovery
    #[serde(default)]
    pub acquisition: AcquisitionConfig,
    /// Interrupt-driven readout
    #[serde(default)]
    pub interrupt: InterruptConfig,
    /// Simulated hit generation
    #[serde(default)]
    pub simulation: SimulationConfig,
}

/// Application-level configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApplicationConfig {
    /// Application name
    pub name: String,
    /// Logging level (trace, debug, info, warn, error)
    pub log_level: String,
    /// Log output format (pretty, compact, json)
    #[serde(default = "default_log_format")]
    pub log_format: String,
}

/// Per-module acquisition settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AcquisitionConfig {
    /// Full-scale range in ns (140-1200)
    #[serde(default = "default_fsr")]
    pub full_scale_range_ns: u32,
    /// Keep over-range conversions instead of suppressing them
    #[serde(default)]
    pub keep_overflow: bool,
    /// Keep conversions under threshold instead of suppressing them
    #[serde(default)]
    pub keep_underflow: bool,
    /// End block transfers with a bus error
    #[serde(default = "default_true")]
    pub berr_enable: bool,
    /// Common stop instead of common start
    #[serde(default)]
    pub common_stop: bool,
}

/// Interrupt settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InterruptConfig {
    /// Use interrupt-driven readout
    #[serde(default)]
    pub enabled: bool,
    /// Module id that raises the interrupt
    #[serde(default)]
    pub source: usize,
    /// Events buffered before the module interrupts (1-31)
    #[serde(default = "default_threshold")]
    pub threshold: u16,
    /// VME level, 0 for the default
    #[serde(default)]
    pub level: u16,
    /// Vector, 0 for the default
    #[serde(default)]
    pub vector: u16,
}

/// Hits produced by the simulated modules on every gate
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SimulationConfig {
    /// Seed for the hit generator
    #[serde(default = "default_seed")]
    pub seed: u64,
    /// Channels hit per event (1-32)
    #[serde(default = "default_hits")]
    pub hits_per_event: usize,
}

// Default value functions
fn default_log_format() -> String {
    "pretty".to_string()
}

fn default_fsr() -> u32 {
    MIN_FSR_NS
}

fn default_true() -> bool {
    true
}

fn default_threshold() -> u16 {
    1
}

fn default_seed() -> u64 {
    0x775
}

fn default_hits() -> usize {
    8
}

impl Default for AcquisitionConfig {
    fn default() -> Self {
        Self {
            full_scale_range_ns: default_fsr(),
            keep_overflow: false,
            keep_underflow: false,
            berr_enable: true,
            common_stop: false,
        }
    }
}

impl Default for InterruptConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            source: 0,
            threshold: default_threshold(),
            level: 0,
            vector: 0,
        }
    }
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            seed: default_seed(),
            hits_per_event: default_hits(),
        }
    }
}

/// Accepted `log_level` values.
pub const LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];
/// Accepted `log_format` values.
pub const LOG_FORMATS: [&str; 3] = ["pretty", "compact", "json"];

impl TdcConfig {
    /// Load configuration from the default file and environment variables
    pub fn load() -> AppResult<Self> {
        Self::load_from(DEFAULT_CONFIG_PATH)
    }

    /// Load configuration from a specific file path
    pub fn load_from<P: AsRef<Path>>(path: P) -> AppResult<Self> {
        let config = Figment::new()
            .merge(Toml::file(path.as_ref()))
            .merge(Env::prefixed("TDC_DAQ_").split("__"))
            .extract()?;
        Ok(config)
    }

    /// Parse configuration from a TOML string (no environment overrides)
    pub fn from_toml_str(text: &str) -> AppResult<Self> {
        let config = Figment::new().merge(Toml::string(text)).extract()?;
        Ok(config)
    }

    /// Render the configuration back to TOML
    pub fn to_toml(&self) -> AppResult<String> {
        toml::to_string_pretty(self).map_err(|e| AppError::Configuration(e.to_string()))
    }

    /// Validate configuration after loading
    pub fn validate(&self) -> AppResult<()> {
        let invalid = |msg: String| Err(AppError::Configuration(msg));

        let level = self.application.log_level.to_lowercase();
        if !LOG_LEVELS.contains(&level.as_str()) {
            return invalid(format!(
                "Invalid log_level '{}'. Must be one of: {}",
                self.application.log_level,
                LOG_LEVELS.join(", ")
            ));
        }
        if !LOG_FORMATS.contains(&self.application.log_format.as_str()) {
            return invalid(format!(
                "Invalid log_format '{}'. Must be one of: {}",
                self.application.log_format,
                LOG_FORMATS.join(", ")
            ));
        }

        if self.layout.base_address == 0 {
            return invalid("crate.base_address must be non-zero".to_string());
        }
        if self.layout.modules == 0 || self.layout.modules > MAX_MODULES {
            return invalid(format!(
                "Invalid crate.modules {}. Must be 1-{}",
                self.layout.modules, MAX_MODULES
            ));
        }

        let fsr = self.acquisition.full_scale_range_ns;
        if !(MIN_FSR_NS..=MAX_FSR_NS).contains(&fsr) {
            return invalid(format!(
                "Invalid full_scale_range_ns {fsr}. Must be {MIN_FSR_NS}-{MAX_FSR_NS}"
            ));
        }

        let irq = &self.interrupt;
        if !(1..=31).contains(&irq.threshold) {
            return invalid(format!(
                "Invalid interrupt.threshold {}. Must be 1-31",
                irq.threshold
            ));
        }
        if irq.source >= self.layout.effective_modules() {
            return invalid(format!(
                "interrupt.source {} is not one of the {} configured modules",
                irq.source,
                self.layout.effective_modules()
            ));
        }
        if irq.level > 7 {
            return invalid(format!("Invalid interrupt.level {}. Must be 0-7", irq.level));
        }
        if irq.vector != 0 && !(32..=255).contains(&irq.vector) {
            return invalid(format!(
                "Invalid interrupt.vector {}. Must be 0 or 32-255",
                irq.vector
            ));
        }

        if !(1..=32).contains(&self.simulation.hits_per_event) {
            return invalid(format!(
                "Invalid simulation.hits_per_event {}. Must be 1-32",
                self.simulation.hits_per_event
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL: &str = r#"
        [application]
        name = "test"
        log_level = "info"

        [crate]
        base_address = 0x180000
        address_increment = 0x10000
        modules = 2
    "#;

    #[test]
    fn test_defaults_fill_missing_sections() {
        let config = TdcConfig::from_toml_str(MINIMAL).unwrap();
        assert_eq!(config.application.log_format, "pretty");
        assert_eq!(config.layout.crate_id, 0);
        assert_eq!(config.acquisition, AcquisitionConfig::default());
        assert_eq!(config.interrupt.threshold, 1);
        assert!(!config.interrupt.enabled);
        assert_eq!(config.simulation.hits_per_event, 8);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_invalid_log_level() {
        let mut config = TdcConfig::from_toml_str(MINIMAL).unwrap();
        config.application.log_level = "loud".to_string();
        assert!(matches!(config.validate(), Err(AppError::Configuration(_))));
    }

    #[test]
    fn test_invalid_acquisition_values() {
        let base = TdcConfig::from_toml_str(MINIMAL).unwrap();

        let mut config = base.clone();
        config.acquisition.full_scale_range_ns = 1204;
        assert!(config.validate().is_err());

        let mut config = base.clone();
        config.interrupt.threshold = 32;
        assert!(config.validate().is_err());

        let mut config = base.clone();
        config.interrupt.source = 2;
        assert!(config.validate().is_err());

        let mut config = base.clone();
        config.interrupt.vector = 16;
        assert!(config.validate().is_err());

        let mut config = base;
        config.layout.modules = 21;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_toml_round_trip() {
        let config = TdcConfig::from_toml_str(MINIMAL).unwrap();
        let text = config.to_toml().unwrap();
        assert_eq!(TdcConfig::from_toml_str(&text).unwrap(), config);
    }
}
