//! Configuration loading for bunkbot.
//!
//! Settings live in a `settings.json` file with kebab-case keys. Every section
//! is optional and falls back to defaults, so a file holding only the account
//! and server blocks is enough to start the agent.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{Error, Result};

/// File name looked up in the working directory and the config directory.
pub const SETTINGS_FILE: &str = "settings.json";

/// Get the platform config directory for bunkbot.
pub fn get_config_dir() -> Result<PathBuf> {
    let dirs = directories::ProjectDirs::from("com", "bunkbot", "bunkbot")
        .ok_or_else(|| Error::Config("Could not determine home directory".to_string()))?;

    Ok(dirs.config_dir().to_path_buf())
}

/// Resolve the settings file: explicit path, then `./settings.json`, then the
/// platform config directory.
pub fn resolve_settings_path(explicit: Option<&Path>) -> Result<PathBuf> {
    if let Some(path) = explicit {
        return Ok(path.to_path_buf());
    }

    let local = PathBuf::from(SETTINGS_FILE);
    if local.exists() {
        return Ok(local);
    }

    Ok(get_config_dir()?.join(SETTINGS_FILE))
}

/// Load and validate settings.
pub fn load_settings(explicit: Option<&Path>) -> Result<Settings> {
    let path = resolve_settings_path(explicit)?;

    if !path.exists() {
        return Err(Error::Config(format!(
            "Settings file not found at {}",
            path.display()
        )));
    }

    let settings = load_settings_from(&path)?;
    tracing::debug!("Loaded settings from {}", path.display());
    Ok(settings)
}

/// Like [`load_settings`], but a missing file found by lookup yields the
/// defaults. An explicit path must exist.
pub fn load_settings_or_default(explicit: Option<&Path>) -> Result<Settings> {
    if explicit.is_some() {
        return load_settings(explicit);
    }

    let path = resolve_settings_path(None)?;
    if !path.exists() {
        tracing::warn!("No settings at {}, using defaults", path.display());
        return Ok(Settings::default());
    }
    load_settings_from(&path)
}

/// Load and validate settings from a specific file.
pub fn load_settings_from(path: &Path) -> Result<Settings> {
    let content = std::fs::read_to_string(path)?;
    let settings: Settings = serde_json::from_str(&content)?;
    validate_settings(&settings)?;
    Ok(settings)
}

fn validate_settings(settings: &Settings) -> Result<()> {
    if settings.bot_account.username.trim().is_empty() {
        return Err(Error::Config("bot-account.username must not be empty".to_string()));
    }
    if settings.server.port == 0 {
        return Err(Error::Config("server.port must be non-zero".to_string()));
    }

    let tasks = &settings.tasks;
    if tasks.rest_search_radius <= 0.0 || tasks.placement_confirm_radius <= 0.0 {
        return Err(Error::Config("tasks search radii must be positive".to_string()));
    }
    if tasks.container_search_radius <= 0 {
        return Err(Error::Config(
            "tasks.container-search-radius must be positive".to_string(),
        ));
    }
    if tasks.container_search_height < 0 {
        return Err(Error::Config(
            "tasks.container-search-height must not be negative".to_string(),
        ));
    }

    let utils = &settings.utils;
    if utils.auto_reconnect_delay == 0 {
        return Err(Error::Config(
            "utils.auto-reconnect-delay must be positive".to_string(),
        ));
    }
    if let Some(max) = utils.auto_reconnect_max_delay {
        if max < utils.auto_reconnect_delay {
            return Err(Error::Config(format!(
                "utils.auto-reconnect-max-delay ({}) is below auto-reconnect-delay ({})",
                max, utils.auto_reconnect_delay
            )));
        }
    }

    Ok(())
}

/// Account the agent logs in with.
#[derive(Serialize, Deserialize, Clone, Debug)]
#[serde(rename_all = "kebab-case")]
pub struct BotAccount {
    pub username: String,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(rename = "type", default = "default_auth_type")]
    pub auth_type: String,
}

fn default_auth_type() -> String {
    "offline".to_string()
}

impl Default for BotAccount {
    fn default() -> Self {
        Self {
            username: "bunkbot".to_string(),
            password: None,
            auth_type: default_auth_type(),
        }
    }
}

/// Server to connect to.
#[derive(Serialize, Deserialize, Clone, Debug)]
#[serde(rename_all = "kebab-case")]
pub struct Server {
    #[serde(default = "default_server_ip")]
    pub ip: String,
    #[serde(default = "default_server_port")]
    pub port: u16,
    #[serde(default)]
    pub version: Option<String>,
}

fn default_server_ip() -> String {
    "localhost".to_string()
}

fn default_server_port() -> u16 {
    25565
}

impl Default for Server {
    fn default() -> Self {
        Self {
            ip: default_server_ip(),
            port: default_server_port(),
            version: None,
        }
    }
}

/// Reconnect behaviour.
#[derive(Serialize, Deserialize, Clone, Debug)]
#[serde(rename_all = "kebab-case")]
pub struct Utils {
    #[serde(default = "default_auto_reconnect")]
    pub auto_reconnect: bool,
    /// Milliseconds.
    #[serde(default = "default_auto_reconnect_delay")]
    pub auto_reconnect_delay: u64,
    /// Milliseconds. Unset means a fixed delay.
    #[serde(default)]
    pub auto_reconnect_max_delay: Option<u64>,
}

fn default_auto_reconnect() -> bool {
    true
}

fn default_auto_reconnect_delay() -> u64 {
    5000
}

impl Default for Utils {
    fn default() -> Self {
        Self {
            auto_reconnect: default_auto_reconnect(),
            auto_reconnect_delay: default_auto_reconnect_delay(),
            auto_reconnect_max_delay: None,
        }
    }
}

impl Utils {
    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_millis(self.auto_reconnect_delay)
    }

    pub fn max_reconnect_delay(&self) -> Duration {
        Duration::from_millis(
            self.auto_reconnect_max_delay
                .unwrap_or(self.auto_reconnect_delay),
        )
    }
}

/// Tuning for the rest and collection tasks.
#[derive(Serialize, Deserialize, Clone, Debug)]
#[serde(rename_all = "kebab-case")]
pub struct TaskSettings {
    #[serde(default = "default_rest_search_radius")]
    pub rest_search_radius: f64,
    #[serde(default = "default_placement_confirm_radius")]
    pub placement_confirm_radius: f64,
    #[serde(default = "default_navigation_wait_ticks")]
    pub navigation_wait_ticks: u32,
    #[serde(default = "default_container_search_radius")]
    pub container_search_radius: i32,
    #[serde(default = "default_container_search_height")]
    pub container_search_height: i32,
}

fn default_rest_search_radius() -> f64 {
    20.0
}

fn default_placement_confirm_radius() -> f64 {
    5.0
}

fn default_navigation_wait_ticks() -> u32 {
    20
}

fn default_container_search_radius() -> i32 {
    8
}

fn default_container_search_height() -> i32 {
    1
}

impl Default for TaskSettings {
    fn default() -> Self {
        Self {
            rest_search_radius: default_rest_search_radius(),
            placement_confirm_radius: default_placement_confirm_radius(),
            navigation_wait_ticks: default_navigation_wait_ticks(),
            container_search_radius: default_container_search_radius(),
            container_search_height: default_container_search_height(),
        }
    }
}

/// bunkbot settings.
#[derive(Serialize, Deserialize, Clone, Debug, Default)]
#[serde(rename_all = "kebab-case")]
pub struct Settings {
    #[serde(default)]
    pub bot_account: BotAccount,

    #[serde(default)]
    pub server: Server,

    #[serde(default)]
    pub utils: Utils,

    #[serde(default)]
    pub tasks: TaskSettings,
}
