use anyhow::{Context, Result, bail};
use log::debug;

use std::path::{Path, PathBuf};

use crate::{
    fleet::{Fleet, FleetFile, resolve_path},
    remote::{Remote, SshRemote},
    runtime::Runtime,
};

use super::paths::default_config_path;

/// Settings given on the command line or through the environment.
#[derive(Debug, Clone, Default)]
pub struct ConfigOptions {
    pub config: Option<PathBuf>,
    pub wheels: Option<PathBuf>,
    pub release_log: Option<PathBuf>,
}

pub struct Config<R: Runtime, M: Remote> {
    pub runtime: R,
    pub remote: M,
    /// The local wheel store.
    pub wheels: PathBuf,
    pub release_log: PathBuf,
    pub fleet: Fleet,
}

impl<R: Runtime> Config<R, SshRemote> {
    pub fn new(runtime: R, options: ConfigOptions) -> Result<Self> {
        Self::with_remote(runtime, SshRemote::new(), options)
    }
}

impl<R: Runtime, M: Remote> Config<R, M> {
    #[tracing::instrument(skip(runtime, remote))]
    pub fn with_remote(runtime: R, remote: M, options: ConfigOptions) -> Result<Self> {
        let path = match options.config {
            Some(path) => {
                if !runtime.exists(&path) {
                    bail!("Fleet configuration {} does not exist", path.display());
                }
                path
            }
            None => default_config_path(&runtime)?,
        };
        debug!("Using fleet configuration {}", path.display());

        let mut file = FleetFile::load(&runtime, &path)?;
        let base = path.parent().unwrap_or(Path::new(".")).to_path_buf();

        let wheels = match (options.wheels, file.wheels.take()) {
            (Some(wheels), _) => wheels,
            (None, Some(wheels)) => resolve_path(&runtime, &wheels, &base)?,
            (None, None) => bail!(
                "No wheel store configured: set `wheels` in {} or pass --wheels",
                path.display()
            ),
        };
        let release_log = match (options.release_log, file.release_log.take()) {
            (Some(log), _) => log,
            (None, Some(log)) => resolve_path(&runtime, &log, &base)?,
            (None, None) => wheels.join("releases.log"),
        };

        let fleet = file
            .into_fleet(&runtime, &base)
            .with_context(|| format!("Invalid fleet configuration {}", path.display()))?;

        Ok(Self {
            runtime,
            remote,
            wheels,
            release_log,
            fleet,
        })
    }
}
