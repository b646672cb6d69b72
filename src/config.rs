// Configuration management

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::connection::ClientConfig;
use crate::protocol::DEFAULT_TARGET_PAGES;
use crate::reassembler::ChunkMode;
use crate::session::SessionOptions;

pub const URL_ENV_VAR: &str = "DRAFTSTREAM_URL";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AppConfig {
    /// WebSocket endpoint of the generation backend
    #[serde(default)]
    pub server_url: Option<String>,
    #[serde(default = "default_reconnect_delay_ms")]
    pub reconnect_delay_ms: u64,
    #[serde(default = "default_render_tick_ms")]
    pub render_tick_ms: u64,
    #[serde(default = "default_target_pages")]
    pub target_pages: u32,
    #[serde(default)]
    pub chunk_mode: ChunkMode,
    #[serde(default)]
    pub export_dir: Option<PathBuf>,
}

const fn default_reconnect_delay_ms() -> u64 {
    3000
}

const fn default_render_tick_ms() -> u64 {
    10
}

const fn default_target_pages() -> u32 {
    DEFAULT_TARGET_PAGES
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server_url: None,
            reconnect_delay_ms: default_reconnect_delay_ms(),
            render_tick_ms: default_render_tick_ms(),
            target_pages: default_target_pages(),
            chunk_mode: ChunkMode::default(),
            export_dir: None,
        }
    }
}

impl AppConfig {
    pub fn client_config(&self) -> ClientConfig {
        ClientConfig {
            url: self.server_url.clone().filter(|url| !url.trim().is_empty()),
            reconnect_delay: Duration::from_millis(self.reconnect_delay_ms),
        }
    }

    pub fn session_options(&self) -> SessionOptions {
        SessionOptions {
            tick: Duration::from_millis(self.render_tick_ms.max(1)),
            chunk_mode: self.chunk_mode,
        }
    }

    /// Where exported documents go, falling back to the user's data directory.
    pub fn export_dir(&self) -> PathBuf {
        self.export_dir.clone().unwrap_or_else(|| {
            dirs::data_dir()
                .unwrap_or_else(std::env::temp_dir)
                .join("draftstream")
                .join("exports")
        })
    }

    /// Apply `DRAFTSTREAM_URL` when it is set and non-empty.
    pub fn apply_env_override(&mut self, value: Option<String>) {
        if let Some(url) = value.filter(|v| !v.trim().is_empty()) {
            self.server_url = Some(url);
        }
    }
}

pub fn get_config_dir() -> Result<PathBuf> {
    let config_dir = dirs::config_dir()
        .ok_or_else(|| anyhow::anyhow!("Could not determine config directory"))?
        .join("draftstream");

    fs::create_dir_all(&config_dir).context("Failed to create config directory")?;

    Ok(config_dir)
}

pub fn get_config_path() -> Result<PathBuf> {
    Ok(get_config_dir()?.join("config.toml"))
}

/// Load the user's config, writing defaults on first run, then apply the
/// environment override.
pub fn load_config() -> Result<AppConfig> {
    let mut config = load_config_from(&get_config_path()?)?;
    config.apply_env_override(std::env::var(URL_ENV_VAR).ok());
    Ok(config)
}

pub fn load_config_from(path: &Path) -> Result<AppConfig> {
    if !path.exists() {
        let default_config = AppConfig::default();
        save_config_to(path, &default_config)?;
        return Ok(default_config);
    }

    let contents = fs::read_to_string(path).context("Failed to read config file")?;

    let config: AppConfig = toml::from_str(&contents).context("Failed to parse config file")?;

    Ok(config)
}

pub fn save_config_to(path: &Path, config: &AppConfig) -> Result<()> {
    let contents = toml::to_string_pretty(config).context("Failed to serialize config")?;

    fs::write(path, contents).context("Failed to write config file")?;

    Ok(())
}
