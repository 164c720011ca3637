//! Engine state persistence
//!
//! One JSON file per spec id under the configured state directory,
//! holding the ownership map and the last-applied snapshot. Callers
//! mutate state only between a matching load/save pair, and only while
//! holding the spec's lock.

use anyhow::{Context, Result};
use reconcile::EngineState;
use std::fs;
use std::path::{Path, PathBuf};

pub fn state_file(state_dir: &Path, spec_id: &str) -> PathBuf {
    state_dir.join(format!("{}.state.json", spec_id))
}

/// Load the persisted state for a spec, or a fresh one if none exists.
pub fn load(state_dir: &Path, spec_id: &str) -> Result<EngineState> {
    let path = state_file(state_dir, spec_id);
    if !path.exists() {
        log::debug!("no state for spec {} at {}", spec_id, path.display());
        return Ok(EngineState::new());
    }
    let content = fs::read_to_string(&path)
        .with_context(|| format!("Could not read {}", path.display()))?;
    serde_json::from_str(&content)
        .with_context(|| format!("Corrupt state file {}", path.display()))
}

/// Persist state for a spec, creating the directory if needed.
pub fn save(state_dir: &Path, spec_id: &str, state: &EngineState) -> Result<()> {
    fs::create_dir_all(state_dir)
        .with_context(|| format!("Could not create {}", state_dir.display()))?;
    let path = state_file(state_dir, spec_id);
    let content = serde_json::to_string_pretty(state)?;
    fs::write(&path, content).with_context(|| format!("Could not write {}", path.display()))?;
    log::debug!("saved state for spec {} ({} mappings)", spec_id, state.ownership.len());
    Ok(())
}
