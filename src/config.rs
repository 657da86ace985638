use std::{fs, path::PathBuf, sync::Mutex};

use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

use crate::utils;

pub const DEFAULT_EVENT_SOURCE: &str = "events.json";
pub const DEFAULT_TIMEZONE: &str = "Asia/Kathmandu";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AppConfig {
    pub event_source: String,
    pub site_base_url: Option<String>,
    pub timezone: String,
    pub share_command: Option<String>,
    pub clipboard_command: Option<String>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            event_source: DEFAULT_EVENT_SOURCE.to_string(),
            site_base_url: None,
            timezone: DEFAULT_TIMEZONE.to_string(),
            share_command: None,
            clipboard_command: None,
        }
    }
}

impl AppConfig {
    pub fn display_timezone(&self) -> Result<Tz, String> {
        self.timezone
            .trim()
            .parse::<Tz>()
            .map_err(|_| format!("unknown timezone: {}", self.timezone))
    }

    /// Environment variables win over the persisted file.
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(source) = std::env::var("EVENTS_SOURCE") {
            if !source.trim().is_empty() {
                self.event_source = source.trim().to_string();
            }
        }
        if let Ok(base) = std::env::var("EVENTS_SITE_BASE_URL") {
            if !base.trim().is_empty() {
                self.site_base_url = Some(base.trim().to_string());
            }
        }
        if let Ok(tz) = std::env::var("EVENTS_TIMEZONE") {
            if !tz.trim().is_empty() {
                self.timezone = tz.trim().to_string();
            }
        }
        self
    }
}

pub struct ConfigStore {
    path: PathBuf,
    data: Mutex<AppConfig>,
}

impl ConfigStore {
    pub fn load() -> Self {
        Self::load_from(utils::config_path())
    }

    pub fn load_from(path: PathBuf) -> Self {
        let data = read_config(&path).unwrap_or_default();
        Self {
            path,
            data: Mutex::new(data),
        }
    }

    pub fn read(&self) -> AppConfig {
        match self.data.lock() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn update<F>(&self, transform: F) -> Result<AppConfig, String>
    where
        F: FnOnce(&mut AppConfig),
    {
        let mut guard = self
            .data
            .lock()
            .map_err(|_| "config mutex poisoned".to_string())?;
        transform(&mut guard);
        write_config(&self.path, &guard)?;
        Ok(guard.clone())
    }
}

fn read_config(path: &PathBuf) -> Result<AppConfig, String> {
    if !path.exists() {
        return Ok(AppConfig::default());
    }
    let contents = fs::read_to_string(path).map_err(|err| err.to_string())?;
    serde_json::from_str(&contents).map_err(|err| err.to_string())
}

fn write_config(path: &PathBuf, config: &AppConfig) -> Result<(), String> {
    if let Some(parent) = path.parent() {
        if let Err(err) = fs::create_dir_all(parent) {
            return Err(err.to_string());
        }
    }
    let contents = serde_json::to_string_pretty(config).map_err(|err| err.to_string())?;
    fs::write(path, contents).map_err(|err| err.to_string())
}
