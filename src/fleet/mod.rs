//! The deployment fleet: hosts, the virtualenvs on them, and the projects
//! living in each virtualenv.
//!
//! Targets refer to their host by [`HostId`]; [`Fleet::select`] resolves
//! that id and hands out [`TargetRef`]s that carry both sides.

mod config;
mod filter;

use std::path::{Path, PathBuf};

use crate::package::Requirement;
use crate::remote::{Connection, quote};

pub use config::{FleetFile, HostFile, ProjectFile, TargetFile};
pub(crate) use config::resolve_path;
pub use filter::TargetFilter;

pub const DEFAULT_MIGRATE_COMMAND: &str = "bin/django-admin.py migrate";
pub const DEFAULT_SETTINGS_ENV: &str = "DJANGO_SETTINGS_MODULE";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct HostId(usize);

#[derive(Debug, Clone, PartialEq)]
pub struct Host {
    pub id: HostId,
    /// As used for ssh; `localhost` runs commands locally.
    pub hostname: String,
    /// Command reloading the web service. `{venv}` is replaced by the
    /// virtualenv path of the target it runs for.
    pub reload_cmd: Option<String>,
    /// Reload once per host instead of once per updated target.
    pub reload_once: bool,
}

/// A Django project deployed in a virtualenv.
#[derive(Debug, Clone, PartialEq)]
pub struct Project {
    /// Settings module, exported to commands run for this project.
    pub settings: String,
    /// User to run project commands as; defaults to the target owner.
    pub user: Option<String>,
    pub migrate: bool,
}

/// A virtualenv on a host that receives deployments.
#[derive(Debug, Clone, PartialEq)]
pub struct Target {
    pub host: HostId,
    pub path: PathBuf,
    /// Owner of the virtualenv; commands run as this user.
    pub user: Option<String>,
    /// User to log in as.
    pub ssh_user: Option<String>,
    pub requirements: Vec<Requirement>,
    /// Installed regardless of the requirements file.
    pub packages: Vec<String>,
    pub projects: Vec<Project>,
}

impl Target {
    fn bin(&self, name: &str) -> PathBuf {
        self.path.join("bin").join(name)
    }

    pub fn pip(&self) -> PathBuf {
        self.bin("pip")
    }

    pub fn python(&self) -> PathBuf {
        self.bin("python")
    }

    /// Where wheels are uploaded before installation.
    pub fn staging_dir(&self) -> PathBuf {
        self.path.join("wheels")
    }

    /// Package names to bring up to date, requirements first, without duplicates.
    pub fn wanted_packages<'a>(&'a self, always_install: &'a [String]) -> Vec<&'a str> {
        let mut wanted: Vec<&str> = Vec::new();
        let names = self
            .requirements
            .iter()
            .map(|r| r.name.as_str())
            .chain(always_install.iter().map(String::as_str))
            .chain(self.packages.iter().map(String::as_str));
        for name in names {
            if !wanted.contains(&name) {
                wanted.push(name);
            }
        }
        wanted
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Fleet {
    hosts: Vec<Host>,
    targets: Vec<Target>,
    /// Fleet-wide packages every target receives.
    pub always_install: Vec<String>,
    /// Relative to the virtualenv.
    pub migrate_command: String,
    pub settings_env: String,
}

impl Fleet {
    pub fn new(always_install: Vec<String>, migrate_command: String, settings_env: String) -> Self {
        Self {
            hosts: Vec::new(),
            targets: Vec::new(),
            always_install,
            migrate_command,
            settings_env,
        }
    }

    pub fn add_host(
        &mut self,
        hostname: impl Into<String>,
        reload_cmd: Option<String>,
        reload_once: bool,
    ) -> HostId {
        let id = HostId(self.hosts.len());
        self.hosts.push(Host {
            id,
            hostname: hostname.into(),
            reload_cmd,
            reload_once,
        });
        id
    }

    pub fn add_target(&mut self, target: Target) {
        self.targets.push(target);
    }

    pub fn host(&self, id: HostId) -> &Host {
        &self.hosts[id.0]
    }

    pub fn targets(&self) -> impl Iterator<Item = TargetRef<'_>> {
        self.targets.iter().map(|target| TargetRef {
            host: self.host(target.host),
            target,
        })
    }

    /// Targets matching `filter`, in configuration order.
    pub fn select(&self, filter: &TargetFilter) -> Vec<TargetRef<'_>> {
        self.targets().filter(|t| filter.matches(t)).collect()
    }
}

/// A target together with its resolved host.
#[derive(Debug, Clone, Copy)]
pub struct TargetRef<'a> {
    pub host: &'a Host,
    pub target: &'a Target,
}

impl<'a> TargetRef<'a> {
    /// `<host>:<path>`, used in prompts, logs and the release log.
    pub fn id(&self) -> String {
        format!("{}:{}", self.host.hostname, self.target.path.display())
    }

    pub fn is_local(&self) -> bool {
        self.connection().is_local()
    }

    /// Connection running commands as the target owner.
    pub fn connection(&self) -> Connection {
        Connection::new(&self.host.hostname, self.target.ssh_user.clone())
            .run_as(self.target.user.as_deref())
    }

    /// Connection for commands of `project`, with its settings exported.
    pub fn project_connection(&self, project: &Project, settings_env: &str) -> Connection {
        self.connection()
            .run_as(project.user.as_deref())
            .with_env(settings_env, &project.settings)
    }

    /// The host's reload command specialised for this target.
    pub fn reload_command(&self) -> Option<String> {
        let venv = quote(&self.target.path.to_string_lossy());
        self.host
            .reload_cmd
            .as_ref()
            .map(|cmd| cmd.replace("{venv}", &venv))
    }

    pub fn migrate_command(&self, relative: &str) -> String {
        let (program, args) = relative.split_once(' ').unwrap_or((relative, ""));
        let program = if Path::new(program).is_absolute() {
            PathBuf::from(program)
        } else {
            self.target.path.join(program)
        };
        format!("{} {}", quote(&program.to_string_lossy()), args)
            .trim_end()
            .to_string()
    }
}
