//! Weaver configuration
//!
//! Optional TOML file at `~/.config/weaver/config.toml`; every field
//! has a default so a missing file is a valid configuration.

use anyhow::{Context, Result};
use reconcile::ConflictPolicy;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WeaverConfig {
    /// Directory for per-spec engine state files.
    pub state_dir: String,

    /// Path to the JSON inventory file the default backend uses.
    pub inventory: String,

    /// Default fan-out width during apply.
    pub jobs: usize,

    /// Plans deleting more than this many objects require approval.
    pub max_deletes: usize,

    /// Default conflict policy.
    pub conflict_policy: ConflictPolicy,
}

impl Default for WeaverConfig {
    fn default() -> Self {
        Self {
            state_dir: "~/.local/state/weaver".to_string(),
            inventory: "~/.local/state/weaver/inventory.json".to_string(),
            jobs: 4,
            max_deletes: 10,
            conflict_policy: ConflictPolicy::default(),
        }
    }
}

/// Get the config directory path
pub fn config_dir() -> Result<PathBuf> {
    let home = dirs::home_dir().context("Could not determine home directory")?;
    Ok(home.join(".config").join("weaver"))
}

impl WeaverConfig {
    /// Load the config file, or defaults when it does not exist.
    pub fn load(path: Option<&std::path::Path>) -> Result<Self> {
        let path = match path {
            Some(path) => path.to_path_buf(),
            None => config_dir()?.join("config.toml"),
        };
        if !path.exists() {
            log::debug!("no config at {}, using defaults", path.display());
            return Ok(Self::default());
        }
        let content = fs::read_to_string(&path)
            .with_context(|| format!("Could not read {}", path.display()))?;
        toml::from_str(&content)
            .with_context(|| format!("Invalid config format in {}", path.display()))
    }

    /// State directory with `~` expanded.
    pub fn state_path(&self) -> PathBuf {
        PathBuf::from(shellexpand::tilde(&self.state_dir).as_ref())
    }

    /// Inventory file with `~` expanded.
    pub fn inventory_path(&self) -> PathBuf {
        PathBuf::from(shellexpand::tilde(&self.inventory).as_ref())
    }
}
