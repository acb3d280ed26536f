use crate::domain::{
    config::UartMonConfig,
    error::{UartMonError, UartMonResult},
};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Locates, loads and writes the configuration file
pub struct ConfigManager {
    global_config_path: PathBuf,
    project_config_path: Option<PathBuf>,
}

impl ConfigManager {
    /// Use `~/.config/uartmon/config.toml`, overridden by the nearest `.uartmon/config.toml`
    pub fn new() -> UartMonResult<Self> {
        Ok(Self {
            global_config_path: Self::get_global_config_path()?,
            project_config_path: Self::find_project_config_path(),
        })
    }

    /// Use exactly `path`, ignoring the global and project locations
    pub fn with_path(path: impl Into<PathBuf>) -> Self {
        Self {
            global_config_path: path.into(),
            project_config_path: None,
        }
    }

    /// The file `load_config` reads from; defaults apply when it does not exist
    pub fn active_path(&self) -> &Path {
        match &self.project_config_path {
            Some(project) if project.exists() => project,
            _ => &self.global_config_path,
        }
    }

    /// Load and validate configuration
    pub fn load_config(&self) -> UartMonResult<UartMonConfig> {
        let path = self.active_path();
        let config = if path.exists() {
            debug!("Loading configuration from {}", path.display());
            Self::load_config_from_path(path)?
        } else {
            UartMonConfig::default()
        };

        config.validate()?;
        Ok(config)
    }

    /// Write `config` to the active location, creating parent directories
    pub fn save_config(&self, config: &UartMonConfig) -> UartMonResult<()> {
        Self::save_config_to_path(self.active_path(), config)
    }

    /// Write a default configuration file, refusing to clobber one unless `force`
    pub fn init_config(&self, force: bool) -> UartMonResult<PathBuf> {
        let path = self.active_path().to_path_buf();
        if path.exists() && !force {
            return Err(UartMonError::config(format!(
                "Configuration already exists at {}",
                path.display()
            )));
        }

        Self::save_config_to_path(&path, &UartMonConfig::default())?;
        Ok(path)
    }

    pub fn load_config_from_path(path: &Path) -> UartMonResult<UartMonConfig> {
        let content = fs::read_to_string(path).map_err(|e| {
            UartMonError::config(format!(
                "Failed to read config file {}: {}",
                path.display(),
                e
            ))
        })?;

        toml::from_str(&content).map_err(|e| {
            UartMonError::config(format!(
                "Failed to parse config file {}: {}",
                path.display(),
                e
            ))
        })
    }

    pub fn save_config_to_path(path: &Path, config: &UartMonConfig) -> UartMonResult<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| {
                UartMonError::config(format!("Failed to create config directory: {}", e))
            })?;
        }

        let content = toml::to_string_pretty(config)
            .map_err(|e| UartMonError::config(format!("Failed to serialize config: {}", e)))?;

        fs::write(path, content).map_err(|e| {
            UartMonError::config(format!(
                "Failed to write config file {}: {}",
                path.display(),
                e
            ))
        })
    }

    fn get_global_config_path() -> UartMonResult<PathBuf> {
        let home = dirs::home_dir()
            .ok_or_else(|| UartMonError::config("Could not determine home directory"))?;
        Ok(home.join(".config").join("uartmon").join("config.toml"))
    }

    /// Walk up from the working directory looking for `.uartmon/config.toml`
    fn find_project_config_path() -> Option<PathBuf> {
        let current_dir = std::env::current_dir().ok()?;
        let mut path = current_dir.as_path();

        loop {
            let config_path = path.join(".uartmon").join("config.toml");
            if config_path.exists() {
                return Some(config_path);
            }
            path = path.parent()?;
        }
    }
}
