//! Field mapping file lookup
//!
//! Order: `--mapping`, the config `mapping_path`, `./config/mapping.json`,
//! then `<config dir>/sat-declaration/mapping.json`. Unlike the config file
//! there is no built-in default, so a missing mapping is an error.

use action_locator::FieldMapping;
use anyhow::{bail, Context, Result};
use std::path::{Path, PathBuf};
use tracing::info;

pub fn load_mapping(explicit: Option<&Path>, configured: Option<&Path>) -> Result<FieldMapping> {
    let path = match explicit.or(configured) {
        Some(path) => {
            if !path.exists() {
                bail!("mapping file not found: {}", path.display());
            }
            path.to_path_buf()
        }
        None => match default_locations().into_iter().find(|p| p.exists()) {
            Some(path) => path,
            None => bail!("no mapping file: pass --mapping or set mapping_path"),
        },
    };

    let raw = std::fs::read_to_string(&path)
        .with_context(|| format!("failed to read mapping file {}", path.display()))?;
    let mapping = FieldMapping::from_json_str(&raw)
        .with_context(|| format!("failed to parse mapping file {}", path.display()))?;
    info!(path = %path.display(), keys = mapping.len(), "field mapping loaded");
    Ok(mapping)
}

fn default_locations() -> Vec<PathBuf> {
    let mut paths = vec![PathBuf::from("config/mapping.json")];
    if let Some(mut dir) = dirs::config_dir() {
        dir.push("sat-declaration");
        dir.push("mapping.json");
        paths.push(dir);
    }
    paths
}
