//! The fleet configuration file (TOML).
//!
//! ```toml
//! wheels = "~/wheels"
//! release_log = "~/wheels/releases.log"
//! requirements = "requirements.txt"
//! always_install = ["site-theme"]
//!
//! [[hosts]]
//! hostname = "web1"
//! reload_cmd = "sudo systemctl reload apache2"
//!
//! [[hosts.targets]]
//! path = "/srv/venv"
//! user = "yoda"
//!
//! [[hosts.targets.projects]]
//! settings = "site.settings"
//! ```

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use log::debug;
use serde::Deserialize;

use super::{DEFAULT_MIGRATE_COMMAND, DEFAULT_SETTINGS_ENV, Fleet, Project, Target};
use crate::package::{Requirement, parse_requirements};
use crate::runtime::Runtime;

fn default_true() -> bool {
    true
}

fn default_migrate_command() -> String {
    DEFAULT_MIGRATE_COMMAND.to_string()
}

fn default_settings_env() -> String {
    DEFAULT_SETTINGS_ENV.to_string()
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct FleetFile {
    /// The wheel store directory.
    pub wheels: Option<PathBuf>,
    pub release_log: Option<PathBuf>,
    /// Default requirements file for targets that do not name their own.
    pub requirements: Option<PathBuf>,
    #[serde(default)]
    pub always_install: Vec<String>,
    #[serde(default = "default_migrate_command")]
    pub migrate_command: String,
    #[serde(default = "default_settings_env")]
    pub settings_env: String,
    #[serde(default)]
    pub hosts: Vec<HostFile>,
}

impl Default for FleetFile {
    fn default() -> Self {
        Self {
            wheels: None,
            release_log: None,
            requirements: None,
            always_install: Vec::new(),
            migrate_command: default_migrate_command(),
            settings_env: default_settings_env(),
            hosts: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct HostFile {
    pub hostname: String,
    pub reload_cmd: Option<String>,
    #[serde(default = "default_true")]
    pub reload_once: bool,
    #[serde(default)]
    pub targets: Vec<TargetFile>,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct TargetFile {
    pub path: PathBuf,
    pub user: Option<String>,
    pub ssh_user: Option<String>,
    pub requirements: Option<PathBuf>,
    #[serde(default)]
    pub packages: Vec<String>,
    #[serde(default)]
    pub projects: Vec<ProjectFile>,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct ProjectFile {
    pub settings: String,
    pub user: Option<String>,
    #[serde(default = "default_true")]
    pub migrate: bool,
}

/// Expands a leading `~/` and resolves relative paths against `base`.
pub(crate) fn resolve_path<R: Runtime>(runtime: &R, path: &Path, base: &Path) -> Result<PathBuf> {
    if let Ok(rest) = path.strip_prefix("~") {
        let home = runtime
            .home_dir()
            .context("Could not find home directory")?;
        return Ok(home.join(rest));
    }
    if path.is_relative() {
        return Ok(base.join(path));
    }
    Ok(path.to_path_buf())
}

impl FleetFile {
    pub fn parse(text: &str) -> Result<Self> {
        Ok(toml::from_str(text)?)
    }

    /// Reads the configuration at `path`; a missing file is an empty fleet.
    #[tracing::instrument(skip(runtime))]
    pub fn load<R: Runtime>(runtime: &R, path: &Path) -> Result<Self> {
        if !runtime.exists(path) {
            debug!("No fleet configuration at {}", path.display());
            return Ok(Self::default());
        }
        let text = runtime.read_to_string(path)?;
        Self::parse(&text)
            .with_context(|| format!("Failed to parse fleet configuration {}", path.display()))
    }

    /// Builds the fleet, reading requirements files relative to `base`.
    #[tracing::instrument(skip(self, runtime))]
    pub fn into_fleet<R: Runtime>(self, runtime: &R, base: &Path) -> Result<Fleet> {
        let default_requirements = match &self.requirements {
            Some(path) => Some(read_requirements(runtime, path, base)?),
            None => None,
        };

        let mut fleet = Fleet::new(self.always_install, self.migrate_command, self.settings_env);
        for host in self.hosts {
            let id = fleet.add_host(host.hostname, host.reload_cmd, host.reload_once);
            for target in host.targets {
                let requirements = match &target.requirements {
                    Some(path) => read_requirements(runtime, path, base)?,
                    None => default_requirements.clone().unwrap_or_default(),
                };
                let projects = target
                    .projects
                    .into_iter()
                    .map(|p| Project {
                        settings: p.settings,
                        user: p.user,
                        migrate: p.migrate,
                    })
                    .collect();
                fleet.add_target(Target {
                    host: id,
                    path: target.path,
                    user: target.user,
                    ssh_user: target.ssh_user,
                    requirements,
                    packages: target.packages,
                    projects,
                });
            }
        }
        Ok(fleet)
    }
}

fn read_requirements<R: Runtime>(runtime: &R, path: &Path, base: &Path) -> Result<Vec<Requirement>> {
    let path = resolve_path(runtime, path, base)?;
    let text = runtime
        .read_to_string(&path)
        .with_context(|| format!("Failed to read requirements file {}", path.display()))?;
    Ok(parse_requirements(&text))
}
