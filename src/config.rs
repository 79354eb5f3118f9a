//! TOML configuration: the transfer schema plus default file locations.
use crate::error::ResultOptionChain;
use crate::transfer::Columns;
use crate::transfer::Schema;
use crate::transfer::SheetSpec;
use serde::Deserialize;
use serde::Serialize;
use std::path::Path;
use std::path::PathBuf;
use thiserror::Error;

/// File names looked up in the working directory when no config path is given
pub const DEFAULT_CONFIG_FILES: [&str; 2] = ["sheet-transfer.toml", ".sheet-transfer.toml"];

/// Environment variable naming a config file
pub const CONFIG_ENV: &str = "SHEET_TRANSFER_CONFIG";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Configuration file not found: {0}")]
    NotFound(PathBuf),

    #[error("Failed to read config file {path}: {source}")]
    Read { path: PathBuf, source: std::io::Error },

    #[error("Failed to parse config file {path}: {source}")]
    Parse { path: PathBuf, source: toml::de::Error },

    #[error("Failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("Failed to write config file {path}: {source}")]
    Write { path: PathBuf, source: std::io::Error },
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    pub source: SheetSpec,
    pub destination: SheetSpec,
    pub columns: Columns,
    pub defaults: Defaults,
}

/// Files used when the command line names none.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct Defaults {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_path: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub destination_path: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        let schema = Schema::default();
        Self {
            source: schema.source,
            destination: schema.destination,
            columns: schema.columns,
            defaults: Defaults::default(),
        }
    }
}

impl Config {
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(ConfigError::NotFound(path.to_path_buf()));
        }
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config = Self::parse(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        log::debug!("Loaded configuration from {}", path.display());
        Ok(config)
    }

    pub fn parse(content: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(content)
    }

    /// Loads `config_path` if given, else the first file found through
    /// `SHEET_TRANSFER_CONFIG` or the working directory, else the defaults.
    pub fn load_with_defaults(config_path: Option<&Path>) -> Result<Self, ConfigError> {
        if let Some(path) = config_path {
            return Self::load_from_file(path);
        }
        match Self::from_env().ok_none_else(|| Ok(Self::find_in(Path::new("."))))? {
            Some(path) => Self::load_from_file(path),
            None => {
                log::debug!("No configuration file found, using defaults");
                Ok(Self::default())
            }
        }
    }

    fn from_env() -> Result<Option<PathBuf>, ConfigError> {
        match std::env::var_os(CONFIG_ENV) {
            Some(value) if !value.is_empty() => {
                let path = PathBuf::from(value);
                if path.exists() {
                    Ok(Some(path))
                } else {
                    Err(ConfigError::NotFound(path))
                }
            }
            _ => Ok(None),
        }
    }

    fn find_in(directory: &Path) -> Option<PathBuf> {
        DEFAULT_CONFIG_FILES
            .iter()
            .map(|name| directory.join(name))
            .find(|path| path.is_file())
    }

    pub fn schema(&self) -> Schema {
        Schema {
            source: self.source.clone(),
            destination: self.destination.clone(),
            columns: self.columns.clone(),
        }
    }

    pub fn to_toml(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }

    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        let path = path.as_ref();
        std::fs::write(path, self.to_toml()?).map_err(|source| ConfigError::Write {
            path: path.to_path_buf(),
            source,
        })
    }
}
