use anyhow::{Context, Result};
use std::path::PathBuf;

use crate::runtime::Runtime;

const APP_DIR: &str = "fleetwheel";
const CONFIG_FILE: &str = "fleet.toml";

/// Get the default location of the fleet configuration
#[tracing::instrument(skip(runtime))]
pub fn default_config_path<R: Runtime>(runtime: &R) -> Result<PathBuf> {
    let config_dir = match runtime.config_dir() {
        Some(dir) => dir,
        None => runtime
            .home_dir()
            .context("Could not find home directory")?
            .join(".config"),
    };
    Ok(config_dir.join(APP_DIR).join(CONFIG_FILE))
}
