//! Rolling released wheels out to targets.
//!
//! Each target walks through planning, confirmation, transfer, install and
//! migration. Every stage returns a [`Step`]: `Skip` ends the target and the
//! run moves on, `Abort` records the reason in the release log and ends the
//! whole run with [`DeployAborted`].
//!
//! A host is reloaded once its last selected target is done, provided at
//! least one of its targets was updated.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use anyhow::Result;
use log::{info, warn};

use super::planner::{InstallPlan, Planner};
use crate::fleet::{Fleet, HostId, TargetRef};
use crate::release::ReleaseLog;
use crate::remote::{Remote, quote};
use crate::runtime::Runtime;

/// Result of one workflow stage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Step<T> {
    Proceed(T),
    Skip(String),
    Abort(String),
}

/// Returned when a deployment run stops early.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeployAborted {
    pub target: String,
    pub reason: String,
}

impl std::fmt::Display for DeployAborted {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Deployment aborted at {}: {}", self.target, self.reason)
    }
}

impl std::error::Error for DeployAborted {}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Updated {
        installed: Vec<String>,
        failed_migrations: usize,
    },
    Skipped(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetReport {
    pub target: String,
    pub outcome: Outcome,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunReport {
    pub targets: Vec<TargetReport>,
    /// Targets whose reload command ran, in order.
    pub reloaded: Vec<String>,
}

impl RunReport {
    pub fn updated(&self) -> usize {
        self.targets
            .iter()
            .filter(|t| matches!(t.outcome, Outcome::Updated { .. }))
            .count()
    }
}

/// A wheel ready to be installed, by file name and path on the target.
struct Staged {
    file_name: String,
    path: PathBuf,
}

fn batch(installed: &[String]) -> String {
    if installed.is_empty() {
        "nothing".to_string()
    } else {
        installed.join(", ")
    }
}

fn abort<L: Runtime>(log: &ReleaseLog<'_, L>, target: &str, reason: String) -> anyhow::Error {
    match log.log_abort(target, &reason) {
        Ok(()) => DeployAborted {
            target: target.to_string(),
            reason,
        }
        .into(),
        Err(e) => e,
    }
}

pub struct Orchestrator<'a, R: Runtime, M: Remote> {
    runtime: &'a R,
    remote: &'a M,
    fleet: &'a Fleet,
    wheels: &'a Path,
    assume_yes: bool,
}

impl<'a, R: Runtime, M: Remote> Orchestrator<'a, R, M> {
    /// `wheels` is the local wheel store.
    pub fn new(runtime: &'a R, remote: &'a M, fleet: &'a Fleet, wheels: &'a Path) -> Self {
        Self {
            runtime,
            remote,
            fleet,
            wheels,
            assume_yes: false,
        }
    }

    /// Answer every confirmation prompt with yes.
    pub fn assume_yes(mut self, yes: bool) -> Self {
        self.assume_yes = yes;
        self
    }

    /// Deploys to `targets` in order.
    pub async fn run<L: Runtime>(
        &self,
        log: &ReleaseLog<'_, L>,
        targets: &[TargetRef<'_>],
    ) -> Result<RunReport> {
        let mut last_of_host: HashMap<HostId, usize> = HashMap::new();
        for (index, target) in targets.iter().enumerate() {
            last_of_host.insert(target.host.id, index);
        }

        let mut report = RunReport::default();
        // Finished targets per host, and whether any of them was updated.
        let mut finished: HashMap<HostId, (bool, Vec<TargetRef<'_>>)> = HashMap::new();

        for (index, target) in targets.iter().enumerate() {
            let outcome = self.deploy(log, target).await?;
            let host = finished.entry(target.host.id).or_default();
            host.0 |= matches!(outcome, Outcome::Updated { .. });
            host.1.push(*target);
            report.targets.push(TargetReport {
                target: target.id(),
                outcome,
            });

            if last_of_host.get(&target.host.id) == Some(&index) {
                if let Some((true, done)) = finished.remove(&target.host.id) {
                    report.reloaded.extend(self.reload(&done).await);
                }
            }
        }

        Ok(report)
    }

    async fn deploy<L: Runtime>(
        &self,
        log: &ReleaseLog<'_, L>,
        target: &TargetRef<'_>,
    ) -> Result<Outcome> {
        let id = target.id();
        info!("Deploying to {}", id);

        let plan = match self.planning(log, target).await? {
            Step::Proceed(plan) => plan,
            Step::Skip(reason) => return Ok(skipped(&id, reason)),
            Step::Abort(reason) => return Err(abort(log, &id, reason)),
        };
        match self.confirming(target, &plan)? {
            Step::Proceed(()) => {}
            Step::Skip(reason) => return Ok(skipped(&id, reason)),
            Step::Abort(reason) => return Err(abort(log, &id, reason)),
        }
        let staged = match self.transferring(target, &plan).await {
            Step::Proceed(staged) => staged,
            Step::Skip(reason) => return Ok(skipped(&id, reason)),
            Step::Abort(reason) => return Err(abort(log, &id, reason)),
        };
        let installed = match self.installing(log, target, &staged).await? {
            Step::Proceed(installed) => installed,
            Step::Skip(reason) => return Ok(skipped(&id, reason)),
            Step::Abort(reason) => return Err(abort(log, &id, reason)),
        };
        let failed_migrations = self.migrating(log, target, &installed).await?;

        Ok(Outcome::Updated {
            installed,
            failed_migrations,
        })
    }

    async fn planning<L: Runtime>(
        &self,
        log: &ReleaseLog<'_, L>,
        target: &TargetRef<'_>,
    ) -> Result<Step<InstallPlan>> {
        let id = target.id();
        let planner = Planner::new(self.remote, &self.fleet.always_install);
        let plan = match planner.plan(target, log.catalog()).await {
            Ok(plan) => plan,
            Err(e) => return Ok(Step::Skip(format!("cannot inspect target: {:#}", e))),
        };

        for ahead in &plan.ahead {
            warn!(
                "{}: installed {} is newer than released {} ({})",
                id, ahead.installed, ahead.released, ahead.wheel
            );
        }

        if !plan.missing.is_empty() {
            let message = format!("missing packages: {}", plan.missing.join(", "));
            log.log_warning(&id, &message)?;
            return Ok(Step::Skip(message));
        }
        if plan.is_up_to_date() {
            return Ok(Step::Skip("up to date".to_string()));
        }
        Ok(Step::Proceed(plan))
    }

    fn confirming(&self, target: &TargetRef<'_>, plan: &InstallPlan) -> Result<Step<()>> {
        if self.assume_yes {
            return Ok(Step::Proceed(()));
        }
        println!("{} (python {}):", target.id(), plan.interpreter);
        for wheel in &plan.installables {
            println!("  {}", wheel);
        }
        if self.runtime.confirm(&format!("Install into {}?", target.id()))? {
            Ok(Step::Proceed(()))
        } else {
            Ok(Step::Skip("declined".to_string()))
        }
    }

    async fn transferring(&self, target: &TargetRef<'_>, plan: &InstallPlan) -> Step<Vec<Staged>> {
        if target.is_local() {
            let mut staged = Vec::new();
            for file_name in &plan.installables {
                let path = self.wheels.join(file_name);
                if !self.runtime.exists(&path) {
                    return Step::Abort(format!("{} is not in the wheel store", file_name));
                }
                staged.push(Staged {
                    file_name: file_name.clone(),
                    path,
                });
            }
            return Step::Proceed(staged);
        }

        let conn = target.connection();
        let dir = target.target.staging_dir();
        let mkdir = format!("mkdir -p {}", quote(&dir.to_string_lossy()));
        match self.remote.exec(&conn, &mkdir).await {
            Ok(output) if output.success => {}
            Ok(output) => {
                return Step::Abort(format!(
                    "cannot create wheel directory {}: {}",
                    dir.display(),
                    output.failure_summary()
                ));
            }
            Err(e) => {
                return Step::Abort(format!(
                    "cannot create wheel directory {}: {:#}",
                    dir.display(),
                    e
                ));
            }
        }

        let mut staged = Vec::new();
        for file_name in &plan.installables {
            let local = self.wheels.join(file_name);
            let remote = dir.join(file_name);
            info!("Uploading {} to {}", file_name, target.id());
            let failure = match self.remote.transfer(&conn, &local, &remote).await {
                Ok(output) if output.success => None,
                Ok(output) => Some(output.failure_summary()),
                Err(e) => Some(format!("{:#}", e)),
            };
            if let Some(failure) = failure {
                return Step::Abort(format!("could not put {}: {}", file_name, failure));
            }
            staged.push(Staged {
                file_name: file_name.clone(),
                path: remote,
            });
        }
        Step::Proceed(staged)
    }

    async fn installing<L: Runtime>(
        &self,
        log: &ReleaseLog<'_, L>,
        target: &TargetRef<'_>,
        staged: &[Staged],
    ) -> Result<Step<Vec<String>>> {
        let id = target.id();
        let conn = target.connection();
        let pip = quote(&target.target.pip().to_string_lossy());

        let mut installed: Vec<String> = Vec::new();
        for wheel in staged {
            info!("Installing {} into {}", wheel.file_name, id);
            let command = format!(
                "{} install --upgrade {}",
                pip,
                quote(&wheel.path.to_string_lossy())
            );
            let failure = match self.remote.exec(&conn, &command).await {
                Ok(output) if output.success => None,
                Ok(output) => Some(output.failure_summary()),
                Err(e) => Some(format!("{:#}", e)),
            };
            if let Some(failure) = failure {
                return Ok(Step::Abort(format!(
                    "could not install {} after installing {}: {}",
                    wheel.file_name,
                    batch(&installed),
                    failure
                )));
            }
            log.add_install(&id, &wheel.file_name)?;
            installed.push(wheel.file_name.clone());
        }
        Ok(Step::Proceed(installed))
    }

    /// Runs migrations for every project that wants them. Failures are
    /// recorded and counted but never stop the run.
    async fn migrating<L: Runtime>(
        &self,
        log: &ReleaseLog<'_, L>,
        target: &TargetRef<'_>,
        installed: &[String],
    ) -> Result<usize> {
        let id = target.id();
        let command = target.migrate_command(&self.fleet.migrate_command);
        let mut failed = 0;

        for project in target.target.projects.iter().filter(|p| p.migrate) {
            info!("Migrating {} on {}", project.settings, id);
            let conn = target.project_connection(project, &self.fleet.settings_env);
            let failure = match self.remote.exec(&conn, &command).await {
                Ok(output) if output.success => None,
                Ok(output) => Some(output.failure_summary()),
                Err(e) => Some(format!("{:#}", e)),
            };
            if let Some(failure) = failure {
                let message = format!(
                    "could not migrate in {} after installing {}: {}",
                    project.settings,
                    batch(installed),
                    failure
                );
                log.log_error(&id, &message)?;
                failed += 1;
            }
        }
        Ok(failed)
    }

    /// Reloads the web service for the finished targets of one host and
    /// returns the ids of the targets it ran for.
    async fn reload(&self, done: &[TargetRef<'_>]) -> Vec<String> {
        let Some(first) = done.first() else {
            return Vec::new();
        };
        let targets = if first.host.reload_once {
            &done[..1]
        } else {
            done
        };

        let mut reloaded = Vec::new();
        for target in targets {
            let Some(command) = target.reload_command() else {
                continue;
            };
            info!("Reloading {} for {}", target.host.hostname, target.id());
            match self.remote.exec(&target.connection(), &command).await {
                Ok(output) if output.success => reloaded.push(target.id()),
                Ok(output) => warn!(
                    "{}: reload failed: {}",
                    target.id(),
                    output.failure_summary()
                ),
                Err(e) => warn!("{}: reload failed: {:#}", target.id(), e),
            }
        }
        reloaded
    }
}

fn skipped(target: &str, reason: String) -> Outcome {
    warn!("Skipping {}: {}", target, reason);
    Outcome::Skipped(reason)
}
