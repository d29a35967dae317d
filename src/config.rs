//! TOML configuration for labkit.
//!
//! The configuration is loaded once at startup, validated, and then passed by
//! reference to whatever needs it. Validation is an explicit list of required
//! fields; the first missing one is reported by its dotted path, e.g.
//! `nodes.mars.user_ssh_key`.

use crate::constants::{CONFIG_ENV, CONFIG_NAME, ENV_FILE_NAME, PKG_NAME};
use path_clean::PathClean;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::{env, fs, io};
use thiserror::Error;

/// Errors raised while loading or validating the configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Config file '{}' can't be read: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("Can't decode the config file '{}': {source}", .path.display())]
    Decode {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("Can't load the environment from '{}': {source}", .path.display())]
    Env {
        path: PathBuf,
        #[source]
        source: dotenvy::Error,
    },
    #[error("Couldn't determine the configuration directory")]
    NoConfigDir,
    #[error("string {0} is empty")]
    EmptyString(String),
    #[error("integer {0} is empty")]
    EmptyInteger(String),
    #[error("list {0} is empty")]
    EmptyList(String),
    #[error("no nodes are defined")]
    NoNodes,
    #[error("node {0} is not defined")]
    UnknownNode(String),
}

/// The whole configuration file.
#[derive(Serialize, Deserialize, Debug, Clone, Default)]
#[serde(default)]
pub struct Config {
    pub common: Common,
    /// Managed hosts, keyed by node name.
    pub nodes: BTreeMap<String, Node>,
}

/// Settings shared by every node.
#[derive(Serialize, Deserialize, Debug, Clone, Default)]
#[serde(default)]
pub struct Common {
    pub project_name: String,
    pub package_name: String,
    pub log_to_file: bool,
    pub log_file: PathBuf,
    pub log_level: String,
    pub telegram_chat_id: i64,
    pub telegram_max_characters: usize,
    pub nextcloud_hostname: String,
    pub nextcloud_directory: String,
    /// Paths backed up on every node.
    pub backup: Vec<PathBuf>,
}

/// Per-node settings.
#[derive(Serialize, Deserialize, Debug, Clone, Default)]
#[serde(default)]
pub struct Node {
    pub service_directory: PathBuf,
    pub user_ssh_key: PathBuf,
    pub root_ssh_key: PathBuf,
    pub log_directory: PathBuf,
    pub network_interface: String,
    pub firewall_rules: Vec<String>,
    pub backup: Vec<PathBuf>,
}

impl Config {
    /// Reads and decodes the configuration file. No validation is done here.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let toml_str = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&toml_str).map_err(|source| ConfigError::Decode {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Checks that every required field is set.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let common = &self.common;
        require_string("common.project_name", &common.project_name)?;
        require_string("common.package_name", &common.package_name)?;
        require_path("common.log_file", &common.log_file)?;
        require_string("common.log_level", &common.log_level)?;
        require_string("common.nextcloud_hostname", &common.nextcloud_hostname)?;
        require_string("common.nextcloud_directory", &common.nextcloud_directory)?;
        require_integer("common.telegram_chat_id", common.telegram_chat_id)?;
        require_integer(
            "common.telegram_max_characters",
            common.telegram_max_characters as i64,
        )?;
        require_list("common.backup", &common.backup)?;

        if self.nodes.is_empty() {
            return Err(ConfigError::NoNodes);
        }
        for (name, node) in &self.nodes {
            node.validate(name)?;
        }
        Ok(())
    }

    /// Looks up a node by name.
    pub fn node(&self, name: &str) -> Result<&Node, ConfigError> {
        self.nodes
            .get(name)
            .ok_or_else(|| ConfigError::UnknownNode(name.to_string()))
    }

    /// Paths to back up on `node`: the common list followed by the node's own.
    pub fn backup_paths(&self, node: &str) -> Result<Vec<PathBuf>, ConfigError> {
        let node = self.node(node)?;
        Ok(self
            .common
            .backup
            .iter()
            .chain(node.backup.iter())
            .cloned()
            .collect())
    }
}

impl Node {
    fn validate(&self, name: &str) -> Result<(), ConfigError> {
        let field = |key: &str| format!("nodes.{name}.{key}");
        require_path(&field("service_directory"), &self.service_directory)?;
        require_path(&field("user_ssh_key"), &self.user_ssh_key)?;
        require_path(&field("root_ssh_key"), &self.root_ssh_key)?;
        require_path(&field("log_directory"), &self.log_directory)?;
        require_string(&field("network_interface"), &self.network_interface)?;
        require_list(&field("firewall_rules"), &self.firewall_rules)?;
        require_list(&field("backup"), &self.backup)?;
        Ok(())
    }
}

fn require_string(field: &str, value: &str) -> Result<(), ConfigError> {
    if value.trim().is_empty() {
        return Err(ConfigError::EmptyString(field.to_string()));
    }
    Ok(())
}

fn require_path(field: &str, value: &Path) -> Result<(), ConfigError> {
    require_string(field, &value.to_string_lossy())
}

fn require_integer(field: &str, value: i64) -> Result<(), ConfigError> {
    if value == 0 {
        return Err(ConfigError::EmptyInteger(field.to_string()));
    }
    Ok(())
}

fn require_list<T>(field: &str, value: &[T]) -> Result<(), ConfigError> {
    if value.is_empty() {
        return Err(ConfigError::EmptyList(field.to_string()));
    }
    Ok(())
}

/// Resolves the configuration file: the explicit path if given, then
/// `LABKIT_CONFIG`, then the platform default.
pub fn config_file(explicit: Option<&Path>) -> Result<PathBuf, ConfigError> {
    if let Some(path) = explicit {
        return Ok(path.to_path_buf());
    }
    if let Some(path) = env::var_os(CONFIG_ENV).filter(|p| !p.is_empty()) {
        return Ok(PathBuf::from(path));
    }
    Ok(config_dir()?.join(CONFIG_NAME))
}

/// Makes `path` absolute against the current directory and removes `.` and
/// `..` components. The path does not need to exist.
pub fn absolute_path(path: &Path) -> io::Result<PathBuf> {
    let path = if path.is_absolute() {
        path.to_path_buf()
    } else {
        env::current_dir()?.join(path)
    };
    Ok(path.clean())
}

/// Returns the configuration directory for the application, platform-specific.
#[cfg(not(target_os = "macos"))]
fn config_dir() -> Result<PathBuf, ConfigError> {
    let config_dir = dirs::config_dir().ok_or(ConfigError::NoConfigDir)?;
    Ok(config_dir.join(PKG_NAME))
}

/// Returns the configuration directory for the application, platform-specific.
#[cfg(target_os = "macos")]
fn config_dir() -> Result<PathBuf, ConfigError> {
    let home_dir = dirs::home_dir().ok_or(ConfigError::NoConfigDir)?;
    Ok(home_dir.join(".config").join(PKG_NAME))
}

/// Loads the `.env` file sitting next to `config_file` into the process environment.
///
/// Returns the path that was loaded. Variables already set are not overridden.
pub fn load_env_file(config_file: &Path) -> Result<PathBuf, ConfigError> {
    let path = config_file
        .parent()
        .unwrap_or_else(|| Path::new(""))
        .join(ENV_FILE_NAME);
    dotenvy::from_path(&path).map_err(|source| ConfigError::Env {
        path: path.clone(),
        source,
    })?;
    Ok(path)
}
