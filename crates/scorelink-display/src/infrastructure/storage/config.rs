//! TOML-based configuration for the display client.
//!
//! Reads and writes `AppConfig` to the platform-appropriate config file:
//! - Windows:  `%APPDATA%\ScoreLink\config.toml`
//! - Linux:    `~/.config/scorelink/config.toml`
//! - macOS:    `~/Library/Application Support/ScoreLink/config.toml`
//!
//! Every field carries a `#[serde(default = "...")]` helper, so the display
//! works on first run (no config file yet) and keeps working when a file
//! written by an older version is missing newer fields. The defaults encode
//! the protocol constants: the multicast group, the four service ports, and
//! the two media categories.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use scorelink_core::protocol::messages::{
    DISCOVERY_GROUP, DISCOVERY_PORT, LOGO_SYNC_PORT, SCORE_SERVICE_PORT, SLIDESHOW_SYNC_PORT,
};

/// Error type for configuration file operations.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The platform config directory could not be determined.
    #[error("could not determine platform config directory")]
    NoPlatformConfigDir,

    /// A file system I/O error occurred.
    #[error("I/O error accessing config at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The TOML content could not be parsed.
    #[error("failed to parse config TOML: {0}")]
    Parse(#[from] toml::de::Error),

    /// The config could not be serialized to TOML.
    #[error("failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),
}

// ── Config schema types ───────────────────────────────────────────────────────

/// Top-level application configuration stored on disk.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AppConfig {
    pub display: DisplayConfig,
    pub network: NetworkConfig,
    /// Media categories, one sync engine instance each.
    #[serde(default = "default_media_categories")]
    pub media: Vec<MediaCategory>,
    pub timer: TimerConfig,
}

/// General display behaviour settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DisplayConfig {
    /// `tracing` log level: `"error"`, `"warn"`, `"info"`, `"debug"`, `"trace"`.
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Host name advertised in the discovery datagram; the OS host name when
    /// absent.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_name: Option<String>,
    /// Root directory the media category subdirectories live under.
    #[serde(default = "default_media_root")]
    pub media_root: String,
}

/// Discovery and service port settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NetworkConfig {
    /// Multicast group for server discovery.
    #[serde(default = "default_discovery_group")]
    pub discovery_group: String,
    /// UDP port the discovery request is sent to.
    #[serde(default = "default_discovery_port")]
    pub discovery_port: u16,
    /// TCP port of the score channel on a discovered server.
    #[serde(default = "default_score_port")]
    pub score_port: u16,
    /// Scheme used when rendering candidate endpoints.
    #[serde(default = "default_scheme")]
    pub scheme: String,
    /// Milliseconds between network availability checks / discovery retries.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    /// Collapse repeated discovered addresses within one discovery round.
    #[serde(default)]
    pub dedupe_endpoints: bool,
}

/// One synchronized media category.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MediaCategory {
    /// Display name, also used in file-ready notifications.
    pub name: String,
    /// TCP port of this category's sync service.
    pub port: u16,
    /// Subdirectory under the media root.
    pub dir: String,
    /// Extension allow-list for local scans.
    pub extensions: Vec<String>,
}

/// Timer peripheral settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TimerConfig {
    /// Whether to probe for the peripheral at all.
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Serial speed; the peripheral always talks at 115200.
    #[serde(default = "default_baud")]
    pub baud: u32,
    /// Milliseconds to wait after opening a port (device reset).
    #[serde(default = "default_settle_ms")]
    pub settle_ms: u64,
    /// Milliseconds allowed for the handshake reply.
    #[serde(default = "default_response_timeout_ms")]
    pub response_timeout_ms: u64,
    /// Optional port-name pattern overriding the platform default.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub port_pattern: Option<String>,
}

// ── Default helpers ───────────────────────────────────────────────────────────

fn default_log_level() -> String {
    "info".to_string()
}
fn default_media_root() -> String {
    "media".to_string()
}
fn default_discovery_group() -> String {
    DISCOVERY_GROUP.to_string()
}
fn default_discovery_port() -> u16 {
    DISCOVERY_PORT
}
fn default_score_port() -> u16 {
    SCORE_SERVICE_PORT
}
fn default_scheme() -> String {
    "tcp".to_string()
}
fn default_poll_interval_ms() -> u64 {
    3000
}
fn default_true() -> bool {
    true
}
fn default_baud() -> u32 {
    115_200
}
fn default_settle_ms() -> u64 {
    2000
}
fn default_response_timeout_ms() -> u64 {
    1000
}

fn default_media_categories() -> Vec<MediaCategory> {
    vec![
        MediaCategory {
            name: "logos".to_string(),
            port: LOGO_SYNC_PORT,
            dir: "logos".to_string(),
            extensions: vec![
                "png".to_string(),
                "jpg".to_string(),
                "jpeg".to_string(),
                "bmp".to_string(),
            ],
        },
        MediaCategory {
            name: "slideshow".to_string(),
            port: SLIDESHOW_SYNC_PORT,
            dir: "slideshow".to_string(),
            extensions: vec!["png".to_string(), "jpg".to_string(), "jpeg".to_string()],
        },
    ]
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            display: DisplayConfig::default(),
            network: NetworkConfig::default(),
            media: default_media_categories(),
            timer: TimerConfig::default(),
        }
    }
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            client_name: None,
            media_root: default_media_root(),
        }
    }
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            discovery_group: default_discovery_group(),
            discovery_port: default_discovery_port(),
            score_port: default_score_port(),
            scheme: default_scheme(),
            poll_interval_ms: default_poll_interval_ms(),
            dedupe_endpoints: false,
        }
    }
}

impl Default for TimerConfig {
    fn default() -> Self {
        Self {
            enabled: default_true(),
            baud: default_baud(),
            settle_ms: default_settle_ms(),
            response_timeout_ms: default_response_timeout_ms(),
            port_pattern: None,
        }
    }
}

// ── Config repository ─────────────────────────────────────────────────────────

/// Determines the platform-appropriate directory for the config file.
///
/// # Errors
///
/// Returns [`ConfigError::NoPlatformConfigDir`] when the platform config base
/// directory cannot be determined from the environment.
pub fn config_dir() -> Result<PathBuf, ConfigError> {
    platform_config_dir().ok_or(ConfigError::NoPlatformConfigDir)
}

/// Resolves the full path to the config file.
///
/// # Errors
///
/// Returns [`ConfigError::NoPlatformConfigDir`] if the base directory cannot
/// be determined.
pub fn config_file_path() -> Result<PathBuf, ConfigError> {
    Ok(config_dir()?.join("config.toml"))
}

/// Loads `AppConfig` from `path`, returning `AppConfig::default()` if the
/// file does not yet exist.
///
/// # Errors
///
/// Returns [`ConfigError::Io`] for file-system errors other than "not found",
/// and [`ConfigError::Parse`] if the TOML is malformed.
pub fn load_config(path: &PathBuf) -> Result<AppConfig, ConfigError> {
    match std::fs::read_to_string(path) {
        Ok(content) => {
            let cfg: AppConfig = toml::from_str(&content)?;
            Ok(cfg)
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(AppConfig::default()),
        Err(e) => Err(ConfigError::Io {
            path: path.clone(),
            source: e,
        }),
    }
}

/// Persists `config` to `path`, creating parent directories as needed.
///
/// # Errors
///
/// Returns [`ConfigError::Io`] for file-system failures or
/// [`ConfigError::Serialize`] if serialization fails.
pub fn save_config(config: &AppConfig, path: &PathBuf) -> Result<(), ConfigError> {
    if let Some(dir) = path.parent() {
        std::fs::create_dir_all(dir).map_err(|source| ConfigError::Io {
            path: dir.to_path_buf(),
            source,
        })?;
    }
    let content = toml::to_string_pretty(config)?;
    std::fs::write(path, content).map_err(|source| ConfigError::Io {
        path: path.clone(),
        source,
    })?;
    Ok(())
}

/// Resolves the platform config base directory.
fn platform_config_dir() -> Option<PathBuf> {
    #[cfg(target_os = "windows")]
    {
        std::env::var_os("APPDATA").map(|p| PathBuf::from(p).join("ScoreLink"))
    }

    #[cfg(target_os = "linux")]
    {
        let base = std::env::var_os("XDG_CONFIG_HOME")
            .map(PathBuf::from)
            .or_else(|| std::env::var_os("HOME").map(|h| PathBuf::from(h).join(".config")))?;
        Some(base.join("scorelink"))
    }

    #[cfg(target_os = "macos")]
    {
        std::env::var_os("HOME").map(|h| {
            PathBuf::from(h)
                .join("Library")
                .join("Application Support")
                .join("ScoreLink")
        })
    }

    #[cfg(not(any(target_os = "windows", target_os = "linux", target_os = "macos")))]
    {
        None
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
