//! Application settings management

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing::debug;

/// Flatpak id of the application whose instances are managed
pub const DEFAULT_APP_ID: &str = "org.vinegarhq.Sober";

/// Directory name the application uses under its Flatpak config dir
pub const DEFAULT_APP_CONFIG_NAME: &str = "sober";

/// Program used to start an instance
pub const DEFAULT_LAUNCH_PROGRAM: &str = "flatpak";

/// File name of the application config inside its config directory
pub const CONFIG_FILE_NAME: &str = "config.json";

/// Application settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Directory holding one subdirectory per instance
    pub instances_directory: Option<PathBuf>,
    /// Real home directory, where the shared application config lives
    pub user_home: Option<PathBuf>,
    /// Flatpak application id
    pub app_id: String,
    /// Name of the application's directory under `config/`
    pub app_config_name: String,
    /// Program started for each instance
    pub launch_program: String,
    /// Arguments for `launch_program`; defaults to `run <app_id>`
    pub launch_args: Option<Vec<String>>,
    /// Create the instance directory when running an instance that was never added
    pub create_missing_on_launch: bool,
    /// Enable debug logging
    pub debug_logging: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            instances_directory: None,
            user_home: None,
            app_id: DEFAULT_APP_ID.to_string(),
            app_config_name: DEFAULT_APP_CONFIG_NAME.to_string(),
            launch_program: DEFAULT_LAUNCH_PROGRAM.to_string(),
            launch_args: None,
            create_missing_on_launch: true,
            debug_logging: false,
        }
    }
}

impl Settings {
    /// Default location of the settings file
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("Withdrawal").join("settings.json"))
    }

    /// Load settings from `path`, falling back to defaults when the file is absent
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            debug!("No settings file at {:?}, using defaults", path);
            return Ok(Self::default());
        }

        let json = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read settings from {:?}", path))?;
        let mut settings: Settings = serde_json::from_str(&json)
            .with_context(|| format!("Failed to deserialize settings from {:?}", path))?;
        settings.validate();
        Ok(settings)
    }

    /// Validate settings and fix any invalid values
    pub fn validate(&mut self) {
        if self.app_id.trim().is_empty() {
            self.app_id = DEFAULT_APP_ID.to_string();
        }
        if self.app_config_name.trim().is_empty() {
            self.app_config_name = DEFAULT_APP_CONFIG_NAME.to_string();
        }
        if self.launch_program.trim().is_empty() {
            self.launch_program = DEFAULT_LAUNCH_PROGRAM.to_string();
        }
    }

    /// Get the real home directory
    pub fn get_user_home(&self) -> PathBuf {
        self.user_home
            .clone()
            .or_else(dirs::home_dir)
            .unwrap_or_else(|| PathBuf::from("."))
    }

    /// Get the instances directory, using the default if not set
    pub fn get_instances_directory(&self) -> PathBuf {
        self.instances_directory.clone().unwrap_or_else(|| {
            self.get_user_home().join("Withdrawal").join("Instances")
        })
    }

    /// Path of the application config relative to a home directory
    pub fn config_relative_path(&self) -> PathBuf {
        PathBuf::from(".var")
            .join("app")
            .join(&self.app_id)
            .join("config")
            .join(&self.app_config_name)
            .join(CONFIG_FILE_NAME)
    }

    /// The shared config file that gets imported into instances
    pub fn source_config_path(&self) -> PathBuf {
        self.get_user_home().join(self.config_relative_path())
    }

    /// Arguments passed to the launch program
    pub fn get_launch_args(&self) -> Vec<String> {
        self.launch_args
            .clone()
            .unwrap_or_else(|| vec!["run".to_string(), self.app_id.clone()])
    }
}
