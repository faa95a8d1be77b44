//! Engine settings.
//!
//! Settings sources (highest priority first):
//! 1. Environment variables (`FOSSIL_*`)
//! 2. Settings file (`.fossil/config.yaml`)
//! 3. Defaults (`~/.fossil`)
//!
//! Settings file discovery:
//! - Searches current directory and parents for .fossil/config.yaml
//! - Relative paths in the file are resolved against the `.fossil/` directory
//!
//! Settings are loaded once by the binary and handed to the engine; nothing
//! here is global.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Deserialize;

pub const ENV_CONFIG_DIR: &str = "FOSSIL_SERVER_CONFIG_DIR";
pub const ENV_DATA_DIR: &str = "FOSSIL_SERVER_DATA_DIR";
pub const ENV_PLUGIN_DIR: &str = "FOSSIL_PLUGIN_DIR";
pub const ENV_PORT: &str = "FOSSIL_SERVER_SERVICE_PORT";
pub const ENV_DEBUG: &str = "FOSSIL_SERVER_DEBUG";
pub const ENV_PLUGIN_TIMEOUT: &str = "FOSSIL_PLUGIN_TIMEOUT_SECONDS";

const DEFAULT_PORT: u16 = 8000;

/// Raw settings file schema (matches YAML structure)
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SettingsFile {
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default)]
    pub paths: PathsSection,
    #[serde(default)]
    pub server: ServerSection,
    #[serde(default)]
    pub plugins: PluginsSection,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PathsSection {
    pub config_dir: Option<String>,
    pub data_dir: Option<String>,
    pub plugin_dir: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ServerSection {
    pub port: Option<u16>,
    pub debug: Option<bool>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PluginsSection {
    /// Kill out-of-process plugins running longer than this
    pub timeout_seconds: Option<u64>,
}

/// Resolved engine settings with absolute paths
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerSettings {
    /// Root of `{profile}/{config}/...` backup configs
    pub config_dir: PathBuf,
    /// Working data of the server, created at startup
    pub data_dir: PathBuf,
    /// Root of `{type}/{name}` plugin executables
    pub plugin_dir: PathBuf,
    pub port: u16,
    pub debug: bool,
    pub plugin_timeout: Option<Duration>,
    /// Settings file in effect, if one was found
    pub settings_file: Option<PathBuf>,
}

impl ServerSettings {
    /// Defaults rooted at `home`
    pub fn with_home(home: &Path) -> Self {
        let root = home.join(".fossil");
        Self {
            config_dir: root.join("configs"),
            data_dir: root.join("data"),
            plugin_dir: root.join("plugins"),
            port: DEFAULT_PORT,
            debug: false,
            plugin_timeout: None,
            settings_file: None,
        }
    }

    /// Load settings from the environment, the discovered settings file and defaults
    pub fn load() -> Result<Self> {
        let home = dirs::home_dir().context("Failed to determine home directory")?;
        let file = match find_settings_file() {
            Some(path) => {
                let parsed = load_settings_file(&path)?;
                Some((path, parsed))
            }
            None => None,
        };
        Self::from_sources(&home, file, |key| std::env::var(key).ok())
    }

    /// Merge the three sources; `env` looks up an environment variable
    pub fn from_sources<F>(home: &Path, file: Option<(PathBuf, SettingsFile)>, env: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut settings = Self::with_home(home);

        if let Some((path, file)) = file {
            let base = path.parent().unwrap_or(Path::new("."));
            if let Some(dir) = &file.paths.config_dir {
                settings.config_dir = resolve_path(base, dir);
            }
            if let Some(dir) = &file.paths.data_dir {
                settings.data_dir = resolve_path(base, dir);
            }
            if let Some(dir) = &file.paths.plugin_dir {
                settings.plugin_dir = resolve_path(base, dir);
            }
            if let Some(port) = file.server.port {
                settings.port = port;
            }
            if let Some(debug) = file.server.debug {
                settings.debug = debug;
            }
            if let Some(secs) = file.plugins.timeout_seconds {
                settings.plugin_timeout = timeout_from_secs(secs);
            }
            settings.settings_file = Some(path);
        }

        if let Some(dir) = env(ENV_CONFIG_DIR) {
            settings.config_dir = PathBuf::from(dir);
        }
        if let Some(dir) = env(ENV_DATA_DIR) {
            settings.data_dir = PathBuf::from(dir);
        }
        if let Some(dir) = env(ENV_PLUGIN_DIR) {
            settings.plugin_dir = PathBuf::from(dir);
        }
        if let Some(port) = env(ENV_PORT) {
            settings.port = port
                .trim()
                .parse()
                .with_context(|| format!("Invalid {}: {}", ENV_PORT, port))?;
        }
        if let Some(debug) = env(ENV_DEBUG) {
            settings.debug = parse_bool(&debug)
                .with_context(|| format!("Invalid {}: {}", ENV_DEBUG, debug))?;
        }
        if let Some(secs) = env(ENV_PLUGIN_TIMEOUT) {
            let secs: u64 = secs
                .trim()
                .parse()
                .with_context(|| format!("Invalid {}: {}", ENV_PLUGIN_TIMEOUT, secs))?;
            settings.plugin_timeout = timeout_from_secs(secs);
        }

        Ok(settings)
    }
}

impl ServerSettings {
    /// Create the config and data directories if they are missing
    pub fn ensure_dirs(&self) -> Result<()> {
        for dir in [&self.config_dir, &self.data_dir] {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("Failed to create directory {}", dir.display()))?;
        }
        Ok(())
    }
}

/// 0 means no timeout
fn timeout_from_secs(secs: u64) -> Option<Duration> {
    (secs > 0).then(|| Duration::from_secs(secs))
}

fn parse_bool(value: &str) -> Result<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" | "" => Ok(false),
        other => anyhow::bail!("expected a boolean, got '{}'", other),
    }
}

/// Find settings file by searching current directory and parents
fn find_settings_file() -> Option<PathBuf> {
    let mut current = std::env::current_dir().ok()?;

    loop {
        let path = current.join(".fossil").join("config.yaml");
        if path.exists() {
            return Some(path);
        }

        if !current.pop() {
            break;
        }
    }

    None
}

/// Load and parse a settings file
pub fn load_settings_file(path: &Path) -> Result<SettingsFile> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read settings file: {}", path.display()))?;

    serde_yaml::from_str(&content)
        .with_context(|| format!("Failed to parse settings file: {}", path.display()))
}

/// Resolve a path that may be relative to the settings directory
fn resolve_path(base: &Path, path_str: &str) -> PathBuf {
    let path = PathBuf::from(path_str);
    if path.is_absolute() {
        path
    } else {
        base.join(path)
            .canonicalize()
            .unwrap_or_else(|_| base.join(path_str))
    }
}
