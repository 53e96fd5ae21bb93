// Copyright 2025 eraflo
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Residency configuration.
//!
//! The configuration is usually authored as a RON file next to the game's
//! asset directory:
//!
//! ```ron
//! (
//!     sweep_period_ms: 5000,
//!     defaults: (policy: Storage, active_time_limit_ms: 10000, cache_time_limit_ms: 60000),
//!     overrides: {
//!         "texture": (policy: Cached, active_time_limit_ms: 5000, cache_time_limit_ms: 30000),
//!     },
//! )
//! ```

use crate::asset::{ResidencyError, ResidencySettings};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

/// Default interval between two eviction sweeps.
pub const DEFAULT_SWEEP_PERIOD_MS: u64 = 5000;

/// Engine-wide residency settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResidencyConfig {
    /// Minimum interval between two sweeps. Zero sweeps on every tick.
    pub sweep_period_ms: u64,
    /// Settings for every resource kind without an override.
    pub defaults: ResidencySettings,
    /// Per-kind settings, keyed by the kind name a resource type registers with.
    pub overrides: HashMap<String, ResidencySettings>,
}

impl ResidencyConfig {
    /// Parses and validates a RON document.
    ///
    /// # Errors
    /// Returns [`ResidencyError::Config`] for malformed RON and
    /// [`ResidencyError::InvalidPolicyConfiguration`] for bad thresholds.
    pub fn from_ron_str(source: &str) -> Result<Self, ResidencyError> {
        let config: Self =
            ron::from_str(source).map_err(|err| ResidencyError::Config(err.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Reads, parses and validates a RON file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ResidencyError> {
        let path = path.as_ref();
        let source = std::fs::read_to_string(path).map_err(|err| {
            ResidencyError::Config(format!("failed to read '{}': {err}", path.display()))
        })?;
        let config = Self::from_ron_str(&source)?;
        log::info!(
            "Loaded residency configuration from '{}' ({} overrides)",
            path.display(),
            config.overrides.len()
        );
        Ok(config)
    }

    /// Checks the thresholds of the defaults and of every override.
    pub fn validate(&self) -> Result<(), ResidencyError> {
        self.defaults.time_limits()?;
        for (kind, settings) in &self.overrides {
            settings.time_limits().map_err(|err| {
                log::error!("Residency override for '{kind}' is invalid: {err}");
                err
            })?;
        }
        Ok(())
    }

    /// Returns the override for `kind`, or the defaults.
    pub fn settings_for(&self, kind: &str) -> &ResidencySettings {
        self.overrides.get(kind).unwrap_or(&self.defaults)
    }

    /// Adds or replaces the override for `kind`.
    pub fn with_override(mut self, kind: impl Into<String>, settings: ResidencySettings) -> Self {
        self.overrides.insert(kind.into(), settings);
        self
    }
}

impl Default for ResidencyConfig {
    fn default() -> Self {
        Self {
            sweep_period_ms: DEFAULT_SWEEP_PERIOD_MS,
            defaults: ResidencySettings::default(),
            overrides: HashMap::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::asset::{PolicyError, ResidencyPolicy};

    const SAMPLE: &str = r#"(
        sweep_period_ms: 2500,
        defaults: (policy: Storage, active_time_limit_ms: 1000, cache_time_limit_ms: 4000),
        overrides: {
            "texture": (policy: Cached, active_time_limit_ms: 500, cache_time_limit_ms: 9000),
        },
    )"#;

    #[test]
    fn test_parse_sample() {
        let config = ResidencyConfig::from_ron_str(SAMPLE).unwrap();
        assert_eq!(config.sweep_period_ms, 2500);
        assert_eq!(config.settings_for("texture").policy, ResidencyPolicy::Cached);
        assert_eq!(config.settings_for("mesh").active_time_limit_ms, 1000);
    }

    #[test]
    fn test_missing_fields_fall_back_to_defaults() {
        let config = ResidencyConfig::from_ron_str("(sweep_period_ms: 100)").unwrap();
        assert_eq!(config.sweep_period_ms, 100);
        assert_eq!(config.defaults, ResidencySettings::default());
        assert!(config.overrides.is_empty());
    }

    #[test]
    fn test_inverted_override_is_rejected() {
        let source = r#"(
            overrides: {
                "mesh": (policy: Storage, active_time_limit_ms: 5000, cache_time_limit_ms: 3000),
            },
        )"#;
        let result = ResidencyConfig::from_ron_str(source);
        assert!(matches!(
            result,
            Err(ResidencyError::InvalidPolicyConfiguration(
                PolicyError::ThresholdOrder { .. }
            ))
        ));
    }

    #[test]
    fn test_malformed_ron_is_a_config_error() {
        let result = ResidencyConfig::from_ron_str("(sweep_period_ms: )");
        assert!(matches!(result, Err(ResidencyError::Config(_))));
    }

    #[test]
    fn test_load_from_file() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("residency.ron");
        std::fs::write(&path, SAMPLE)?;

        let config = ResidencyConfig::load(&path)?;
        assert_eq!(config.overrides.len(), 1);

        assert!(ResidencyConfig::load(dir.path().join("missing.ron")).is_err());
        Ok(())
    }

    #[test]
    fn test_serialized_default_parses_back() {
        let config = ResidencyConfig::default().with_override(
            "audio",
            ResidencySettings::default().with_policy(ResidencyPolicy::Cached),
        );
        let text = ron::ser::to_string_pretty(&config, ron::ser::PrettyConfig::default()).unwrap();
        assert_eq!(ResidencyConfig::from_ron_str(&text).unwrap(), config);
    }
}
