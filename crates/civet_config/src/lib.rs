//! Runtime configuration
//!
//! Centralized options for the array runtime: bespoke layouts, logging-array
//! sampling, and profile export.

use std::path::Path;

use once_cell::sync::Lazy;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

/// Options consumed by the array runtime.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuntimeOptions {
    /// Master switch for bespoke array layouts and profiling.
    pub bespoke_enabled: bool,

    /// Wrap one in N arrays allocated at a profiled source as a logging
    /// array. 1 wraps every allocation.
    pub logging_array_sample_rate: u32,

    /// Destination for the profile report. Empty disables export.
    pub export_logging_array_data_path: String,
}

impl Default for RuntimeOptions {
    fn default() -> Self {
        Self {
            bespoke_enabled: true,
            logging_array_sample_rate: 17,
            export_logging_array_data_path: String::new(),
        }
    }
}

impl RuntimeOptions {
    /// Load options from environment variables.
    pub fn from_env() -> Self {
        let mut options = Self::default();

        if let Ok(val) = std::env::var("CIVET_BESPOKE_ENABLED") {
            options.bespoke_enabled = val.parse().unwrap_or(true);
        }

        if let Ok(val) = std::env::var("CIVET_LOGGING_ARRAY_SAMPLE_RATE") {
            options.logging_array_sample_rate = val.parse().unwrap_or(17);
        }

        if let Ok(val) = std::env::var("CIVET_EXPORT_LOGGING_ARRAY_DATA_PATH") {
            options.export_logging_array_data_path = val;
        }

        options
    }

    /// Load options from a TOML file.
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let options: RuntimeOptions = toml::from_str(&contents)?;
        Ok(options)
    }
}

static OPTIONS: Lazy<RwLock<RuntimeOptions>> = Lazy::new(|| RwLock::new(RuntimeOptions::from_env()));

/// Current options snapshot.
pub fn options() -> RuntimeOptions {
    OPTIONS.read().clone()
}

/// Replace the process-wide options.
pub fn set_options(options: RuntimeOptions) {
    *OPTIONS.write() = options;
}

/// Mutate the process-wide options in place.
pub fn update_options(f: impl FnOnce(&mut RuntimeOptions)) {
    let mut guard = OPTIONS.write();
    f(&mut guard);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let options = RuntimeOptions::default();
        assert!(options.bespoke_enabled);
        assert_eq!(options.logging_array_sample_rate, 17);
        assert!(options.export_logging_array_data_path.is_empty());
    }

    #[test]
    fn test_toml_round_trip() {
        let options = RuntimeOptions::default();
        let text = toml::to_string(&options).unwrap();
        let parsed: RuntimeOptions = toml::from_str(&text).unwrap();
        assert_eq!(parsed.logging_array_sample_rate, options.logging_array_sample_rate);
    }
}
