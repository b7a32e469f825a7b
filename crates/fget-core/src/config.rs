//! User-facing configuration, loaded from an XDG-located TOML file.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Proxy transport kind. `None` means direct connections.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ProxyKind {
    #[default]
    None,
    Http,
    Socks4,
    Socks5,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProxyConfig {
    #[serde(rename = "type")]
    pub kind: ProxyKind,
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
}

impl Default for ProxyConfig {
    fn default() -> Self {
        ProxyConfig {
            kind: ProxyKind::None,
            host: String::new(),
            port: 0,
            username: String::new(),
            password: String::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    None,
    Error,
    Warning,
    #[default]
    Info,
    Debug,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: LogLevel,
    pub log_to_file: bool,
    pub log_to_console: bool,
    pub log_file_path: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        LoggingConfig {
            level: LogLevel::Info,
            log_to_file: false,
            log_to_console: true,
            log_file_path: None,
        }
    }
}

/// Top-level engine configuration. Every field has a spec-mandated default,
/// so a missing or partial config file is filled in rather than rejected.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub max_concurrent_downloads: u32,
    pub speed_limit_kb: u32,
    pub default_thread_count: u32,
    pub default_save_path: PathBuf,
    pub proxy: ProxyConfig,
    pub max_retries: u32,
    pub retry_delay_ms: u32,
    pub verify_ssl: bool,
    pub verify_checksum: bool,
    pub connect_timeout_ms: u32,
    pub read_timeout_ms: u32,
    pub logging: LoggingConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            max_concurrent_downloads: 3,
            speed_limit_kb: 0,
            default_thread_count: 4,
            default_save_path: default_save_dir(),
            proxy: ProxyConfig::default(),
            max_retries: 3,
            retry_delay_ms: 1000,
            verify_ssl: true,
            verify_checksum: true,
            connect_timeout_ms: 30_000,
            read_timeout_ms: 30_000,
            logging: LoggingConfig::default(),
        }
    }
}

impl EngineConfig {
    /// Clamps `default_thread_count` into `[1, 16]` as every task's
    /// thread count must be.
    pub fn clamped_default_thread_count(&self) -> u32 {
        self.default_thread_count.clamp(1, 16)
    }

    /// Path to the config file under the XDG config home (`fget/config.toml`).
    pub fn config_path() -> Result<PathBuf> {
        let dirs = xdg::BaseDirectories::with_prefix("fget")
            .context("failed to resolve XDG base directories")?;
        dirs.place_config_file("config.toml")
            .context("failed to resolve config file path")
    }

    /// Loads the config file if present, otherwise writes and returns the
    /// default configuration.
    pub fn load_or_init() -> Result<Self> {
        let path = Self::config_path()?;
        if path.exists() {
            let text = std::fs::read_to_string(&path)
                .with_context(|| format!("failed to read config file: {}", path.display()))?;
            let cfg: EngineConfig = toml::from_str(&text)
                .with_context(|| format!("failed to parse config file: {}", path.display()))?;
            Ok(cfg)
        } else {
            let cfg = EngineConfig::default();
            cfg.save(&path)?;
            Ok(cfg)
        }
    }

    /// Serializes and writes this config to `path`.
    pub fn save(&self, path: &std::path::Path) -> Result<()> {
        let text = toml::to_string_pretty(self).context("failed to serialize config")?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("failed to create config dir: {}", parent.display()))?;
        }
        std::fs::write(path, text)
            .with_context(|| format!("failed to write config file: {}", path.display()))?;
        Ok(())
    }
}

fn default_save_dir() -> PathBuf {
    xdg::BaseDirectories::new()
        .ok()
        .map(|d| d.get_data_home().join("fget").join("downloads"))
        .unwrap_or_else(|| PathBuf::from("."))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_matches_documented_defaults() {
        let cfg = EngineConfig::default();
        assert_eq!(cfg.max_concurrent_downloads, 3);
        assert_eq!(cfg.speed_limit_kb, 0);
        assert_eq!(cfg.default_thread_count, 4);
        assert_eq!(cfg.max_retries, 3);
        assert_eq!(cfg.retry_delay_ms, 1000);
        assert!(cfg.verify_ssl);
        assert!(cfg.verify_checksum);
        assert_eq!(cfg.connect_timeout_ms, 30_000);
        assert_eq!(cfg.read_timeout_ms, 30_000);
        assert_eq!(cfg.proxy.kind, ProxyKind::None);
        assert_eq!(cfg.logging.level, LogLevel::Info);
    }

    #[test]
    fn thread_count_clamped() {
        let mut cfg = EngineConfig::default();
        cfg.default_thread_count = 64;
        assert_eq!(cfg.clamped_default_thread_count(), 16);
        cfg.default_thread_count = 0;
        assert_eq!(cfg.clamped_default_thread_count(), 1);
    }

    #[test]
    fn save_and_reload_roundtrips() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        let mut cfg = EngineConfig::default();
        cfg.max_retries = 7;
        cfg.proxy.kind = ProxyKind::Socks5;
        cfg.proxy.host = "proxy.example.com".to_string();
        cfg.proxy.port = 1080;
        cfg.save(&path).unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        let loaded: EngineConfig = toml::from_str(&text).unwrap();
        assert_eq!(loaded.max_retries, 7);
        assert_eq!(loaded.proxy.kind, ProxyKind::Socks5);
        assert_eq!(loaded.proxy.port, 1080);
    }

    #[test]
    fn partial_toml_fills_defaults() {
        let partial = "max_retries = 9\n";
        let cfg: EngineConfig = toml::from_str(partial).unwrap();
        assert_eq!(cfg.max_retries, 9);
        assert_eq!(cfg.max_concurrent_downloads, 3);
    }
}
