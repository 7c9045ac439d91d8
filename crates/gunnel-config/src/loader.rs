//! Reading a tunnel configuration file.
//!
//! The format follows the file extension. Every error carries the path so
//! a daemon that refuses to start says which file it choked on.

use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use crate::Config;

/// On-disk formats a tunnel config may use.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigFormat {
    /// `.json`, or `.jsonc` with `//` and `/* */` comments.
    Json,
    /// `.yaml` / `.yml`
    Yaml,
    /// `.toml`
    Toml,
}

impl ConfigFormat {
    /// Pick the format from the file extension.
    pub fn from_path(path: &Path) -> Option<Self> {
        match path.extension().and_then(|s| s.to_str())? {
            "json" | "jsonc" => Some(ConfigFormat::Json),
            "yaml" | "yml" => Some(ConfigFormat::Yaml),
            "toml" => Some(ConfigFormat::Toml),
            _ => None,
        }
    }

    /// Decode `data` into a [`Config`], returning the parser's message on failure.
    fn parse(self, data: &str) -> Result<Config, String> {
        match self {
            ConfigFormat::Json => {
                let stripped = json_comments::StripComments::new(data.as_bytes());
                serde_json::from_reader(stripped).map_err(|e| e.to_string())
            }
            ConfigFormat::Yaml => serde_yaml::from_str(data).map_err(|e| e.to_string()),
            ConfigFormat::Toml => toml::from_str(data).map_err(|e| e.to_string()),
        }
    }
}

impl fmt::Display for ConfigFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ConfigFormat::Json => "json",
            ConfigFormat::Yaml => "yaml",
            ConfigFormat::Toml => "toml",
        })
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("cannot open {}: {source}", path.display())]
    Io { path: PathBuf, source: io::Error },

    #[error("{} is not valid {format}: {message}", path.display())]
    Parse {
        path: PathBuf,
        format: ConfigFormat,
        message: String,
    },

    #[error("{}: unsupported config format (use .json, .jsonc, .yaml, .yml or .toml)", path.display())]
    UnsupportedFormat { path: PathBuf },

    #[error("invalid settings: {0}")]
    Validation(String),
}

impl ConfigError {
    /// The file the error refers to, when there is one.
    pub fn path(&self) -> Option<&Path> {
        match self {
            ConfigError::Io { path, .. }
            | ConfigError::Parse { path, .. }
            | ConfigError::UnsupportedFormat { path } => Some(path),
            ConfigError::Validation(_) => None,
        }
    }
}

/// Load a tunnel configuration file.
///
/// The extension is checked before the file is opened, so a misnamed file
/// is reported as such even when it does not exist.
pub fn load_config(path: impl AsRef<Path>) -> Result<Config, ConfigError> {
    let path = path.as_ref();
    let format = ConfigFormat::from_path(path).ok_or_else(|| ConfigError::UnsupportedFormat {
        path: path.to_path_buf(),
    })?;
    let data = fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    format.parse(&data).map_err(|message| ConfigError::Parse {
        path: path.to_path_buf(),
        format,
        message,
    })
}
