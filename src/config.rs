// Copyright 2025 dentsusoken
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

use crate::driver::Parameters;
use crate::error::{RelayError, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

const CONFIG_FILE_NAME: &str = "relay.toml";
const CONFIG_DIR_ENV: &str = "RELAYKIT_CONFIG_DIR";
const DEFAULT_SHUTDOWN_TIMEOUT_MS: u64 = 5_000;
const DEFAULT_STALE_AFTER_MS: u64 = 60_000;

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct RelayConfig {
    #[serde(default)]
    pub auto_open: bool,

    #[serde(default)]
    pub handle_term_signal: bool,

    /// Name of the registered driver to prefer during resolution.
    #[serde(default)]
    pub driver: Option<String>,

    #[serde(default)]
    pub discovery: DiscoveryConfig,

    #[serde(default)]
    pub lock: LockConfig,

    #[serde(default)]
    pub processor: ProcessorConfig,

    #[serde(default)]
    pub devices: BTreeMap<String, DeviceConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiscoveryConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Upper bound for the first enumeration. Unbounded when absent.
    #[serde(default)]
    pub timeout_ms: Option<u64>,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            timeout_ms: None,
        }
    }
}

impl DiscoveryConfig {
    pub fn timeout(&self) -> Duration {
        self.timeout_ms
            .map(Duration::from_millis)
            .unwrap_or(Duration::MAX)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LockConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default)]
    pub directory: Option<PathBuf>,

    #[serde(default = "default_stale_after_ms")]
    pub stale_after_ms: u64,
}

impl Default for LockConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            directory: None,
            stale_after_ms: DEFAULT_STALE_AFTER_MS,
        }
    }
}

impl LockConfig {
    /// Directory holding relay lock files; the platform temp dir unless overridden.
    pub fn directory(&self) -> PathBuf {
        self.directory.clone().unwrap_or_else(std::env::temp_dir)
    }

    pub fn stale_after(&self) -> Duration {
        Duration::from_millis(self.stale_after_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessorConfig {
    #[serde(default = "default_shutdown_timeout_ms")]
    pub shutdown_timeout_ms: u64,
}

impl Default for ProcessorConfig {
    fn default() -> Self {
        Self {
            shutdown_timeout_ms: DEFAULT_SHUTDOWN_TIMEOUT_MS,
        }
    }
}

impl ProcessorConfig {
    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_millis(self.shutdown_timeout_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct DeviceConfig {
    #[serde(default)]
    pub parameters: BTreeMap<String, toml::Value>,
}

impl DeviceConfig {
    /// Converts the TOML table into the driver-facing parameter map.
    pub fn parameters(&self) -> Result<Parameters> {
        let mut parameters = Parameters::new();
        for (key, value) in &self.parameters {
            parameters.insert(key.clone(), serde_json::to_value(value)?);
        }
        Ok(parameters)
    }
}

fn default_true() -> bool {
    true
}

fn default_shutdown_timeout_ms() -> u64 {
    DEFAULT_SHUTDOWN_TIMEOUT_MS
}

fn default_stale_after_ms() -> u64 {
    DEFAULT_STALE_AFTER_MS
}

impl RelayConfig {
    /// Directory searched for `relay.toml` when none is given explicitly.
    pub fn default_dir() -> Option<PathBuf> {
        if let Some(dir) = std::env::var_os(CONFIG_DIR_ENV) {
            return Some(PathBuf::from(dir));
        }
        dirs::config_dir().map(|dir| dir.join("relaykit"))
    }

    pub fn load(config_dir: &Path) -> Result<Self> {
        let config_path = config_dir.join(CONFIG_FILE_NAME);

        if !config_path.exists() {
            log::debug!("Config file not found at {config_path:?}, using defaults");
            return Ok(Self::default());
        }

        let contents = fs::read_to_string(&config_path)?;
        let config: RelayConfig = toml::from_str(&contents)
            .map_err(|e| RelayError::ConfigError(format!("Failed to parse relay.toml: {e}")))?;

        log::debug!("Loaded config from {config_path:?}");
        Ok(config)
    }

    /// Loads from [`RelayConfig::default_dir`], falling back to defaults.
    pub fn load_default() -> Result<Self> {
        match Self::default_dir() {
            Some(dir) => Self::load(&dir),
            None => Ok(Self::default()),
        }
    }

    pub fn save(&self, config_dir: &Path) -> Result<()> {
        let config_path = config_dir.join(CONFIG_FILE_NAME);

        if let Some(parent) = config_path.parent() {
            fs::create_dir_all(parent)?;
        }

        let contents = toml::to_string_pretty(self)
            .map_err(|e| RelayError::ConfigError(format!("Failed to serialize config: {e}")))?;

        fs::write(&config_path, contents)?;
        log::debug!("Saved config to {config_path:?}");
        Ok(())
    }

    /// Parameters configured for the named device, if any.
    pub fn device_parameters(&self, name: &str) -> Result<Option<Parameters>> {
        self.devices
            .get(name)
            .map(DeviceConfig::parameters)
            .transpose()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_default_config() {
        let config = RelayConfig::default();
        assert!(!config.auto_open);
        assert!(!config.handle_term_signal);
        assert!(config.discovery.enabled);
        assert_eq!(config.discovery.timeout(), Duration::MAX);
        assert!(config.lock.enabled);
        assert_eq!(config.lock.directory(), std::env::temp_dir());
        assert_eq!(
            config.processor.shutdown_timeout(),
            Duration::from_millis(DEFAULT_SHUTDOWN_TIMEOUT_MS)
        );
    }

    #[test]
    fn test_load_missing_config() {
        let temp_dir = TempDir::new().unwrap();
        let config = RelayConfig::load(temp_dir.path()).unwrap();
        assert!(config.driver.is_none());
        assert!(config.devices.is_empty());
    }

    #[test]
    fn test_save_and_load_config() {
        let temp_dir = TempDir::new().unwrap();

        let mut config = RelayConfig {
            auto_open: true,
            driver: Some("dummy".to_string()),
            ..RelayConfig::default()
        };
        config.discovery.timeout_ms = Some(1500);

        config.save(temp_dir.path()).unwrap();

        let loaded = RelayConfig::load(temp_dir.path()).unwrap();
        assert!(loaded.auto_open);
        assert_eq!(loaded.driver, Some("dummy".to_string()));
        assert_eq!(loaded.discovery.timeout(), Duration::from_millis(1500));
    }

    #[test]
    fn test_partial_config() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join(CONFIG_FILE_NAME);

        fs::write(&config_path, r#"driver = "usbhid""#).unwrap();

        let loaded = RelayConfig::load(temp_dir.path()).unwrap();
        assert_eq!(loaded.driver, Some("usbhid".to_string()));
        assert!(loaded.lock.enabled);
        assert_eq!(loaded.lock.stale_after_ms, DEFAULT_STALE_AFTER_MS);
    }

    #[test]
    fn test_config_with_sections() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join(CONFIG_FILE_NAME);

        fs::write(
            &config_path,
            r#"
auto_open = true

[lock]
enabled = false
directory = "/var/run/relays"

[devices."Dummy-0".parameters]
channels = 4
label = "bench"
"#,
        )
        .unwrap();

        let loaded = RelayConfig::load(temp_dir.path()).unwrap();
        assert!(loaded.auto_open);
        assert!(!loaded.lock.enabled);
        assert_eq!(loaded.lock.directory(), PathBuf::from("/var/run/relays"));

        let parameters = loaded.device_parameters("Dummy-0").unwrap().unwrap();
        assert_eq!(parameters["channels"], serde_json::json!(4));
        assert_eq!(parameters["label"], serde_json::json!("bench"));
        assert!(loaded.device_parameters("Dummy-1").unwrap().is_none());
    }

    #[test]
    fn test_invalid_config_reports_error() {
        let temp_dir = TempDir::new().unwrap();
        fs::write(temp_dir.path().join(CONFIG_FILE_NAME), "auto_open = [").unwrap();

        let err = RelayConfig::load(temp_dir.path()).unwrap_err();
        assert!(matches!(err, RelayError::ConfigError(_)));
    }
}
