//! Recovery configuration via `pitr.toml`
//!
//! Every field has a default, so an empty file is a valid configuration.
//! Use [`PitrConfig::default_toml`] to get a commented starting point.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::engine::Engine;
use crate::error::{PitrError, Result};

/// Config file name
pub const CONFIG_FILE_NAME: &str = "pitr.toml";

/// Where the external tools live
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ToolsConfig {
    /// Directory containing `mysqlbinlog` and `mysql`; empty means `PATH`
    #[serde(default)]
    pub bin_dir: PathBuf,
}

impl ToolsConfig {
    /// Resolve a tool name against `bin_dir`
    pub fn tool_path(&self, tool: &str) -> PathBuf {
        if self.bin_dir.as_os_str().is_empty() {
            PathBuf::from(tool)
        } else {
            self.bin_dir.join(tool)
        }
    }
}

/// Local storage for downloaded log files
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Directory holding binlog files and their `.meta` sidecars
    #[serde(default = "default_binlog_dir")]
    pub binlog_dir: PathBuf,
}

fn default_binlog_dir() -> PathBuf {
    PathBuf::from("binlog")
}

impl Default for StorageConfig {
    fn default() -> Self {
        StorageConfig {
            binlog_dir: default_binlog_dir(),
        }
    }
}

/// How to reach the database server
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConnectionConfig {
    /// Server host
    #[serde(default = "default_host")]
    pub host: String,
    /// Server port
    #[serde(default = "default_port")]
    pub port: u16,
    /// User name
    #[serde(default = "default_user")]
    pub user: String,
    /// Password, may be empty
    #[serde(default)]
    pub password: String,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    3306
}

fn default_user() -> String {
    "root".to_string()
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        ConnectionConfig {
            host: default_host(),
            port: default_port(),
            user: default_user(),
            password: String::new(),
        }
    }
}

/// Recovery behavior
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecoveryConfig {
    /// Engine name, see [`Engine`]
    #[serde(default = "default_engine")]
    pub engine: String,
    /// Also download the newest (still open) log file
    #[serde(default = "default_true")]
    pub download_latest: bool,
    /// Maximum decoded log text accepted when generating rollback SQL
    #[serde(default = "default_rollback_size_limit")]
    pub rollback_size_limit: u64,
}

fn default_engine() -> String {
    "mysql".to_string()
}

fn default_true() -> bool {
    true
}

fn default_rollback_size_limit() -> u64 {
    8 * 1024 * 1024
}

impl Default for RecoveryConfig {
    fn default() -> Self {
        RecoveryConfig {
            engine: default_engine(),
            download_latest: true,
            rollback_size_limit: default_rollback_size_limit(),
        }
    }
}

/// Complete configuration loaded from `pitr.toml`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PitrConfig {
    /// External tools
    #[serde(default)]
    pub tools: ToolsConfig,
    /// Local log storage
    #[serde(default)]
    pub storage: StorageConfig,
    /// Server connection
    #[serde(default)]
    pub connection: ConnectionConfig,
    /// Recovery behavior
    #[serde(default)]
    pub recovery: RecoveryConfig,
}

impl PitrConfig {
    /// Returns the default config file content with comments.
    pub fn default_toml() -> &'static str {
        r#"# Point-in-time recovery configuration

[tools]
# Directory containing mysqlbinlog and mysql. Empty means look them up in PATH.
bin_dir = ""

[storage]
# Local cache of downloaded binlog files and their .meta sidecars.
binlog_dir = "binlog"

[connection]
host = "127.0.0.1"
port = 3306
user = "root"
password = ""

[recovery]
# Engine selects the identifier length limit and the registered driver.
engine = "mysql"
# Also download the newest binlog file, which may still be growing.
download_latest = true
# Bytes of decoded binlog text accepted when generating rollback SQL.
rollback_size_limit = 8388608
"#
    }

    /// Parse a TOML document and validate it
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: PitrConfig = toml::from_str(content)
            .map_err(|e| PitrError::Config(format!("failed to parse config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a config file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            PitrError::Config(format!(
                "failed to read config file '{}': {}",
                path.display(),
                e
            ))
        })?;
        Self::from_toml_str(&content)
    }

    /// Serialize this config to TOML and write it to the given path
    pub fn write_to_file(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| PitrError::Config(format!("failed to serialize config: {}", e)))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Config with log files under `dir`, for tests
    pub fn for_testing(dir: &Path) -> Self {
        PitrConfig::default().with_binlog_dir(dir.join("binlog"))
    }

    /// Set the local binlog directory
    pub fn with_binlog_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.storage.binlog_dir = dir.into();
        self
    }

    /// Set the tool directory
    pub fn with_bin_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.tools.bin_dir = dir.into();
        self
    }

    /// Set the connection parameters
    pub fn with_connection(mut self, connection: ConnectionConfig) -> Self {
        self.connection = connection;
        self
    }

    /// Parsed engine
    pub fn engine(&self) -> Result<Engine> {
        self.recovery.engine.parse()
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        self.engine()?;
        if self.connection.host.is_empty() {
            return Err(PitrError::Config("connection.host must not be empty".into()));
        }
        if self.connection.user.is_empty() {
            return Err(PitrError::Config("connection.user must not be empty".into()));
        }
        if self.connection.port == 0 {
            return Err(PitrError::Config("connection.port must not be 0".into()));
        }
        if self.storage.binlog_dir.as_os_str().is_empty() {
            return Err(PitrError::Config("storage.binlog_dir must not be empty".into()));
        }
        if self.recovery.rollback_size_limit == 0 {
            return Err(PitrError::Config(
                "recovery.rollback_size_limit must be positive".into(),
            ));
        }
        Ok(())
    }
}
