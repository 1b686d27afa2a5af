//! Configuration file management for maestro.
//!
//! Provides a TOML-based config file at `~/.config/maestro/config.toml`
//! and a resolution chain: CLI flag > env var > config file > default.

use std::path::PathBuf;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

// -----------------------------------------------------------------------
// Config file types
// -----------------------------------------------------------------------

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct ConfigFile {
    #[serde(default)]
    pub store: StoreSection,
    #[serde(default)]
    pub agents: AgentSection,
}

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct StoreSection {
    /// Path to the SQLite learning store.
    pub path: Option<PathBuf>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct AgentSection {
    /// Path to the agent CLI binary.
    pub binary: Option<String>,
    /// Agent names known to be installed (gates QC language reviewers).
    #[serde(default)]
    pub installed: Vec<String>,
}

// -----------------------------------------------------------------------
// Paths
// -----------------------------------------------------------------------

/// Return the maestro config directory.
///
/// Always uses XDG layout: `$XDG_CONFIG_HOME/maestro` or
/// `~/.config/maestro`.
pub fn config_dir() -> PathBuf {
    if let Ok(xdg) = std::env::var("XDG_CONFIG_HOME") {
        return PathBuf::from(xdg).join("maestro");
    }
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".config")
        .join("maestro")
}

/// Return the path to the maestro config file.
pub fn config_path() -> PathBuf {
    config_dir().join("config.toml")
}

fn default_store_path() -> PathBuf {
    config_dir().join("learning.db")
}

// -----------------------------------------------------------------------
// Read / write
// -----------------------------------------------------------------------

/// Load and parse the config file; absent file yields defaults.
pub fn load_config() -> Result<ConfigFile> {
    let path = config_path();
    if !path.exists() {
        return Ok(ConfigFile::default());
    }
    let contents = std::fs::read_to_string(&path)
        .with_context(|| format!("failed to read config file at {}", path.display()))?;
    let config: ConfigFile = toml::from_str(&contents).context("failed to parse config file")?;
    Ok(config)
}

/// Serialize and write the config file, creating parent dirs as needed.
/// Sets file permissions to 0600 on Unix.
pub fn save_config(config: &ConfigFile) -> Result<()> {
    let path = config_path();
    let dir = config_dir();
    std::fs::create_dir_all(&dir)
        .with_context(|| format!("failed to create config directory {}", dir.display()))?;

    let contents = toml::to_string_pretty(config).context("failed to serialize config")?;
    std::fs::write(&path, &contents)
        .with_context(|| format!("failed to write config file at {}", path.display()))?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let perms = std::fs::Permissions::from_mode(0o600);
        std::fs::set_permissions(&path, perms)
            .with_context(|| format!("failed to set permissions on {}", path.display()))?;
    }

    Ok(())
}

// -----------------------------------------------------------------------
// Resolved config
// -----------------------------------------------------------------------

/// Fully resolved configuration, ready for use.
#[derive(Debug, Clone)]
pub struct MaestroConfig {
    pub store_path: PathBuf,
    pub agent_binary: String,
    pub installed_agents: Vec<String>,
}

impl MaestroConfig {
    /// Resolve using the chain: CLI flag > env var > config file > default.
    pub fn resolve(db_flag: Option<PathBuf>, binary_flag: Option<String>) -> Result<Self> {
        let file = load_config()?;

        let store_path = db_flag
            .or_else(|| std::env::var("MAESTRO_DB_PATH").ok().map(PathBuf::from))
            .or(file.store.path)
            .unwrap_or_else(default_store_path);

        let agent_binary = binary_flag
            .or_else(|| std::env::var("MAESTRO_AGENT_BINARY").ok())
            .or(file.agents.binary)
            .unwrap_or_else(|| "claude".to_owned());

        Ok(Self {
            store_path,
            agent_binary,
            installed_agents: file.agents.installed,
        })
    }
}
