//! User configuration stored as JSON in `~/.shellwise/config.json`.

use anyhow::{Context, Result, anyhow};
use dirs::home_dir;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::info;

use crate::chat::SamplingDefaults;
use crate::credentials::Credentials;
use crate::decision::BlockPolicy;
use crate::error::Error;
use crate::profile::DEFAULT_MODEL;
use crate::rate_limiter::RateLimitSettings;
use crate::router::RouterSettings;

const CONFIG_DIR: &str = ".shellwise";
const CONFIG_FILE: &str = "config.json";

#[derive(Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub model: String,
    pub temperature: f32,
    pub top_p: f32,
    pub request_timeout_secs: u64,
    pub command_timeout_secs: u64,
    pub rate_limit_rpm: usize,
    pub rate_limit_rph: usize,
    pub rate_limit_rpd: usize,
    pub rate_limit_enabled: bool,
    pub block_policy: BlockPolicy,
    pub quiet_mode: bool,
    /// Append executed commands and their output to a daily log file.
    pub command_log: bool,
    /// Tokens keyed by provider id or by environment variable name.
    pub api_keys: HashMap<String, String>,
}

impl Default for Config {
    fn default() -> Self {
        let sampling = SamplingDefaults::default();
        let limits = RateLimitSettings::default();
        Self {
            model: DEFAULT_MODEL.to_string(),
            temperature: sampling.temperature,
            top_p: sampling.top_p,
            request_timeout_secs: 30,
            command_timeout_secs: 60,
            rate_limit_rpm: limits.rpm,
            rate_limit_rph: limits.rph,
            rate_limit_rpd: limits.rpd,
            rate_limit_enabled: limits.enabled,
            block_policy: BlockPolicy::default(),
            quiet_mode: false,
            command_log: true,
            api_keys: HashMap::new(),
        }
    }
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("model", &self.model)
            .field("temperature", &self.temperature)
            .field("top_p", &self.top_p)
            .field("request_timeout_secs", &self.request_timeout_secs)
            .field("command_timeout_secs", &self.command_timeout_secs)
            .field("rate_limit", &self.rate_limit_settings())
            .field("block_policy", &self.block_policy)
            .field("quiet_mode", &self.quiet_mode)
            .field("command_log", &self.command_log)
            .field("api_keys", &self.api_keys.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl Config {
    /// Loads `path`, or the default location when `path` is `None`.
    ///
    /// A missing file yields the defaults; a file that exists but cannot be
    /// parsed is an error.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path = match path {
            Some(p) => p.to_path_buf(),
            None => Self::get_config_path()?,
        };

        if !path.exists() {
            info!("No config file at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = fs::read_to_string(&path).with_context(|| format!("Failed to read {}", path.display()))?;
        let config: Config =
            serde_json::from_str(&content).with_context(|| format!("Invalid config file {}", path.display()))?;
        info!("Loaded config from: {}", path.display());
        Ok(config)
    }

    /// Writes the config as pretty JSON, readable only by the owner on Unix.
    pub fn save(&self, path: Option<&Path>) -> Result<()> {
        let path = match path {
            Some(p) => p.to_path_buf(),
            None => Self::get_config_path()?,
        };

        // Create parent directory if it doesn't exist
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let content = serde_json::to_string_pretty(self)?;
        fs::write(&path, content)?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(&path, fs::Permissions::from_mode(0o600))?;
        }

        info!("Saved config to: {}", path.display());
        Ok(())
    }

    pub fn get_config_dir() -> Result<PathBuf> {
        let home = home_dir().ok_or_else(|| anyhow!("Could not find home directory"))?;
        Ok(home.join(CONFIG_DIR))
    }

    pub fn get_config_path() -> Result<PathBuf> {
        Ok(Self::get_config_dir()?.join(CONFIG_FILE))
    }

    /// Checks value ranges the rest of the program relies on.
    pub fn validate(&self) -> crate::error::Result<()> {
        for (name, value) in [("temperature", self.temperature), ("top_p", self.top_p)] {
            if !(0.0..=1.0).contains(&value) {
                return Err(Error::Config(format!("{} must be within [0, 1], got {}", name, value)));
            }
        }
        if self.request_timeout_secs == 0 || self.command_timeout_secs == 0 {
            return Err(Error::Config("timeouts must be at least one second".into()));
        }
        self.rate_limit_settings().validate()
    }

    /// Updates one setting from its text form, as typed at the prompt.
    ///
    /// The value is parsed and range-checked first; on error the config is
    /// left unchanged. `api_keys` cannot be set this way.
    pub fn set(&mut self, key: &str, value: &str) -> crate::error::Result<()> {
        let mut updated = self.clone();
        let value = value.trim();
        match key {
            "model" => {
                if value.is_empty() {
                    return Err(Error::Config("model must not be empty".into()));
                }
                updated.model = value.to_string();
            }
            "temperature" => updated.temperature = parse_unit_float(key, value)?,
            "top_p" => updated.top_p = parse_unit_float(key, value)?,
            "request_timeout_secs" => updated.request_timeout_secs = parse_positive(key, value)?,
            "command_timeout_secs" => updated.command_timeout_secs = parse_positive(key, value)?,
            "rate_limit_rpm" => updated.rate_limit_rpm = parse_positive(key, value)?,
            "rate_limit_rph" => updated.rate_limit_rph = parse_positive(key, value)?,
            "rate_limit_rpd" => updated.rate_limit_rpd = parse_positive(key, value)?,
            "rate_limit_enabled" => updated.rate_limit_enabled = parse_switch(key, value)?,
            "quiet_mode" => updated.quiet_mode = parse_switch(key, value)?,
            "command_log" => updated.command_log = parse_switch(key, value)?,
            "block_policy" => updated.block_policy = value.parse().map_err(Error::Config)?,
            _ => {
                return Err(Error::Config(format!(
                    "unknown config key '{}', valid keys: {}",
                    key,
                    SETTABLE_KEYS.join(", ")
                )));
            }
        }
        updated.validate()?;
        *self = updated;
        Ok(())
    }

    pub fn rate_limit_settings(&self) -> RateLimitSettings {
        RateLimitSettings {
            rpm: self.rate_limit_rpm,
            rph: self.rate_limit_rph,
            rpd: self.rate_limit_rpd,
            enabled: self.rate_limit_enabled,
        }
    }

    pub fn sampling(&self) -> SamplingDefaults {
        SamplingDefaults {
            temperature: self.temperature,
            top_p: self.top_p,
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn command_timeout(&self) -> Duration {
        Duration::from_secs(self.command_timeout_secs)
    }

    pub fn router_settings(&self) -> RouterSettings {
        RouterSettings {
            initial_model: self.model.clone(),
            request_timeout: self.request_timeout(),
            rate_limit: self.rate_limit_settings(),
        }
    }

    /// Prints the effective settings. Token values are never shown.
    pub fn show_config_with_io<W: Write>(
        &self,
        path: &Path,
        credentials: &Credentials,
        provider_ids: &[&str],
        output: &mut W,
    ) -> Result<()> {
        writeln!(output, "Configuration file: {}", path.display())?;
        writeln!(output, "Status: {}", if path.exists() { "Found" } else { "Not found (using defaults)" })?;
        writeln!(output)?;
        writeln!(output, "Model: {}", self.model)?;
        writeln!(output, "Temperature: {}  top_p: {}", self.temperature, self.top_p)?;
        writeln!(output, "Request timeout: {}s", self.request_timeout_secs)?;
        writeln!(output, "Command timeout: {}s", self.command_timeout_secs)?;
        writeln!(
            output,
            "Rate limit: {} ({}/min, {}/hour, {}/day)",
            if self.rate_limit_enabled { "on" } else { "off" },
            self.rate_limit_rpm,
            self.rate_limit_rph,
            self.rate_limit_rpd
        )?;
        writeln!(output, "Block policy: {}", self.block_policy)?;
        writeln!(output, "Quiet mode: {}", self.quiet_mode)?;
        writeln!(output, "Command log: {}", if self.command_log { "on" } else { "off" })?;
        writeln!(output)?;

        for id in provider_ids {
            let state = if credentials.get(id).is_some() { "Set" } else { "Not set" };
            match Credentials::env_var_for(id) {
                Some(var) => writeln!(output, "API key [{}] ({}): {}", id, var, state)?,
                None => writeln!(output, "API key [{}]: {}", id, state)?,
            }
        }
        Ok(())
    }
}

/// Keys accepted by [`Config::set`].
pub const SETTABLE_KEYS: &[&str] = &[
    "model",
    "temperature",
    "top_p",
    "request_timeout_secs",
    "command_timeout_secs",
    "rate_limit_rpm",
    "rate_limit_rph",
    "rate_limit_rpd",
    "rate_limit_enabled",
    "block_policy",
    "quiet_mode",
    "command_log",
];

fn parse_unit_float(key: &str, value: &str) -> crate::error::Result<f32> {
    value
        .parse::<f32>()
        .ok()
        .filter(|v| (0.0..=1.0).contains(v))
        .ok_or_else(|| Error::Config(format!("{} must be a number between 0 and 1, got '{}'", key, value)))
}

fn parse_positive<T: std::str::FromStr + PartialOrd + Default>(key: &str, value: &str) -> crate::error::Result<T> {
    value
        .parse::<T>()
        .ok()
        .filter(|v| *v > T::default())
        .ok_or_else(|| Error::Config(format!("{} must be a positive integer, got '{}'", key, value)))
}

fn parse_switch(key: &str, value: &str) -> crate::error::Result<bool> {
    match value.to_ascii_lowercase().as_str() {
        "on" | "true" | "yes" | "1" => Ok(true),
        "off" | "false" | "no" | "0" => Ok(false),
        _ => Err(Error::Config(format!("{} must be on or off, got '{}'", key, value))),
    }
}
