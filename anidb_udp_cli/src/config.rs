//! Layered configuration for the AniDB UDP CLI
//!
//! Settings are merged from the built-in defaults, the TOML config file and
//! `ANIDB_UDP_*` environment variables, later layers winning. The file uses
//! the flat [`UdpSettings`] keys:
//!
//! ```toml
//! username = "myuser"
//! password = "secret"
//! client_name = "myclient"
//! client_version = 1
//! ```

use anidb_udp_core::UdpSettings;
use anyhow::{Context, Result};
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use std::fs;
use std::path::PathBuf;

/// Directory name under the platform config directory
const APP_CONFIG_DIR: &str = "anidb-udp";

/// Prefix of environment variable overrides, e.g. `ANIDB_UDP_USERNAME`
pub const ENV_PREFIX: &str = "ANIDB_UDP_";

/// Keys whose values are never shown in full
const SECRET_KEYS: &[&str] = &["password"];

/// Keys stored as strings even when the value looks numeric
const STRING_KEYS: &[&str] = &["server_host", "username", "password", "client_name"];

/// Keys stored as floats even when written without a fraction
const FLOAT_KEYS: &[&str] = &["window_secs", "ban_reset_hours"];

/// Configuration manager that handles XDG-compliant paths and layered configuration
pub struct ConfigManager {
    config_path: PathBuf,
}

impl Default for ConfigManager {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigManager {
    /// Create a new ConfigManager with the default config file location
    pub fn new() -> Self {
        Self {
            config_path: Self::default_config_path(),
        }
    }

    /// Create a ConfigManager with a specific path
    pub fn with_path(path: PathBuf) -> Self {
        Self { config_path: path }
    }

    pub fn get_config_path(&self) -> PathBuf {
        self.config_path.clone()
    }

    fn default_config_path() -> PathBuf {
        #[cfg(not(target_os = "windows"))]
        if let Ok(xdg_config) = std::env::var("XDG_CONFIG_HOME") {
            return PathBuf::from(xdg_config)
                .join(APP_CONFIG_DIR)
                .join("config.toml");
        }

        #[cfg(not(target_os = "windows"))]
        {
            dirs::home_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join(".config")
                .join(APP_CONFIG_DIR)
                .join("config.toml")
        }

        #[cfg(target_os = "windows")]
        {
            dirs::config_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join(APP_CONFIG_DIR)
                .join("config.toml")
        }
    }

    /// Load settings with layered priority: ENV > File > Defaults
    pub fn load(&self) -> Result<UdpSettings> {
        let mut figment = Figment::new().merge(Serialized::defaults(UdpSettings::default()));

        if self.config_path.exists() {
            figment = figment.merge(Toml::file(&self.config_path));
        }

        figment = figment.merge(Env::prefixed(ENV_PREFIX));

        figment.extract().context("Failed to load configuration")
    }

    /// Get one effective value by key
    pub fn get(&self, key: &str) -> Result<String> {
        let settings = self.load()?;
        let table = settings_table(&settings)?;
        let value = table
            .get(key)
            .ok_or_else(|| anyhow::anyhow!("Unknown configuration key '{key}'"))?;
        simple_value(value).ok_or_else(|| anyhow::anyhow!("Value at '{key}' is not a simple type"))
    }

    /// Set a value in the config file
    ///
    /// The file is only written if the resulting settings still deserialize
    /// and pass validation.
    pub fn set(&mut self, key: &str, value: &str) -> Result<()> {
        if !settings_table(&UdpSettings::default())?.contains_key(key) {
            anyhow::bail!("Unknown configuration key '{key}'");
        }

        let mut table: toml::Table = if self.config_path.exists() {
            let content = fs::read_to_string(&self.config_path).with_context(|| {
                format!("Failed to read {}", self.config_path.display())
            })?;
            toml::from_str(&content).context("Config file is not valid TOML")?
        } else {
            toml::Table::new()
        };
        table.insert(key.to_string(), parse_config_value(key, value));

        let candidate: UdpSettings = toml::Value::Table(table.clone())
            .try_into()
            .with_context(|| format!("Invalid value for '{key}': {value}"))?;
        candidate
            .validate()
            .with_context(|| format!("Invalid value for '{key}': {value}"))?;

        if let Some(parent) = self.config_path.parent() {
            fs::create_dir_all(parent)?;
        }
        let toml_string = toml::to_string_pretty(&table)?;
        fs::write(&self.config_path, toml_string)
            .with_context(|| format!("Failed to write {}", self.config_path.display()))?;

        Ok(())
    }

    /// All effective values, sorted by key, secrets masked
    pub fn list(&self) -> Result<Vec<(String, String)>> {
        let settings = self.load()?;
        let mut items: Vec<(String, String)> = settings_table(&settings)?
            .iter()
            .filter_map(|(key, value)| {
                simple_value(value).map(|v| (key.clone(), display_value(key, &v)))
            })
            .collect();
        items.sort_by(|a, b| a.0.cmp(&b.0));
        Ok(items)
    }
}

/// Value as shown to the operator
pub fn display_value(key: &str, value: &str) -> String {
    if SECRET_KEYS.contains(&key) && !value.is_empty() {
        "********".to_string()
    } else {
        value.to_string()
    }
}

fn settings_table(settings: &UdpSettings) -> Result<toml::Table> {
    let toml_string = toml::to_string(settings)?;
    Ok(toml::from_str(&toml_string)?)
}

fn simple_value(value: &toml::Value) -> Option<String> {
    match value {
        toml::Value::String(s) => Some(s.clone()),
        toml::Value::Integer(i) => Some(i.to_string()),
        toml::Value::Float(f) => Some(f.to_string()),
        toml::Value::Boolean(b) => Some(b.to_string()),
        _ => None,
    }
}

/// Parse a value to the TOML type the key expects
fn parse_config_value(key: &str, value: &str) -> toml::Value {
    if STRING_KEYS.contains(&key) {
        return toml::Value::String(value.to_string());
    }
    if FLOAT_KEYS.contains(&key) {
        if let Ok(f) = value.parse::<f64>() {
            return toml::Value::Float(f);
        }
    }
    if let Ok(i) = value.parse::<i64>() {
        toml::Value::Integer(i)
    } else if let Ok(f) = value.parse::<f64>() {
        toml::Value::Float(f)
    } else if let Ok(b) = value.parse::<bool>() {
        toml::Value::Boolean(b)
    } else {
        toml::Value::String(value.to_string())
    }
}
