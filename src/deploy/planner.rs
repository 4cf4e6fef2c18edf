//! Working out what a target needs.

use std::collections::HashMap;

use anyhow::{Result, bail};
use log::debug;
use serde::Serialize;

use crate::fleet::TargetRef;
use crate::package::{PackageVersion, Version, normalize_name, parse_freeze};
use crate::release::{Catalog, CatalogEntry, Interpreter, select};
use crate::remote::{Remote, quote};

/// A package installed in a newer version than the catalog knows about.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AheadPackage {
    pub installed: PackageVersion,
    pub released: Version,
    /// Wheel of the released version that matches the interpreter.
    pub wheel: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InstallPlan {
    pub interpreter: Interpreter,
    /// Wheel file names to install, in requirement order.
    pub installables: Vec<String>,
    /// Packages with no release or no wheel for the interpreter.
    pub missing: Vec<String>,
    pub ahead: Vec<AheadPackage>,
}

impl InstallPlan {
    pub fn is_up_to_date(&self) -> bool {
        self.installables.is_empty()
    }
}

fn find_installed<'a>(
    installed: &'a HashMap<String, Option<Version>>,
    name: &str,
) -> Option<&'a Option<Version>> {
    installed.get(name).or_else(|| {
        let wanted = normalize_name(name).to_ascii_lowercase();
        installed
            .iter()
            .find(|(k, _)| normalize_name(k).to_ascii_lowercase() == wanted)
            .map(|(_, v)| v)
    })
}

fn find_release<'c>(catalog: &'c Catalog, name: &str) -> Option<&'c CatalogEntry> {
    catalog
        .lookup(name)
        .or_else(|| catalog.lookup(&normalize_name(name)))
}

pub struct Planner<'a, M: Remote> {
    remote: &'a M,
    always_install: &'a [String],
}

impl<'a, M: Remote> Planner<'a, M> {
    pub fn new(remote: &'a M, always_install: &'a [String]) -> Self {
        Self {
            remote,
            always_install,
        }
    }

    #[tracing::instrument(skip(self, target))]
    async fn interpreter(&self, target: &TargetRef<'_>) -> Result<Interpreter> {
        let python = quote(&target.target.python().to_string_lossy());
        let output = self
            .remote
            .exec(&target.connection(), &format!("{} --version", python))
            .await?;
        if !output.success {
            bail!("{} --version failed: {}", python, output.failure_summary());
        }
        // Python 2 prints its version on stderr.
        Interpreter::from_version_output(&format!("{}\n{}", output.stdout, output.stderr))
    }

    #[tracing::instrument(skip(self, target))]
    async fn installed(&self, target: &TargetRef<'_>) -> Result<HashMap<String, Option<Version>>> {
        let pip = quote(&target.target.pip().to_string_lossy());
        let output = self
            .remote
            .exec(&target.connection(), &format!("{} freeze", pip))
            .await?;
        if !output.success {
            bail!("{} freeze failed: {}", pip, output.failure_summary());
        }
        Ok(parse_freeze(&output.stdout))
    }

    /// Compares what `target` has installed with the newest releases in
    /// `catalog`. An error means the target could not be inspected.
    pub async fn plan(&self, target: &TargetRef<'_>, catalog: &Catalog) -> Result<InstallPlan> {
        let interpreter = self.interpreter(target).await?;
        let installed = self.installed(target).await?;
        debug!(
            "{}: python {}, {} package(s) installed",
            target.id(),
            interpreter,
            installed.len()
        );

        let mut plan = InstallPlan {
            interpreter,
            installables: Vec::new(),
            missing: Vec::new(),
            ahead: Vec::new(),
        };

        for requirement in &target.target.requirements {
            if let Some(pin) = &requirement.pin {
                debug!(
                    "{}: {} is pinned to {}, planning with the newest release",
                    target.id(),
                    requirement.name,
                    pin
                );
            }
        }

        for name in target.target.wanted_packages(self.always_install) {
            let Some(release) = find_release(catalog, name) else {
                plan.missing.push(name.to_string());
                continue;
            };
            let Some(wheel) = select(release, interpreter) else {
                plan.missing.push(name.to_string());
                continue;
            };

            match find_installed(&installed, name) {
                Some(Some(current)) if current > release.version() => {
                    plan.ahead.push(AheadPackage {
                        installed: PackageVersion::new(name, current.clone()),
                        released: release.version().clone(),
                        wheel: wheel.file_name.clone(),
                    });
                }
                Some(Some(current)) if current == release.version() => {}
                _ => plan.installables.push(wheel.file_name.clone()),
            }
        }

        Ok(plan)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fleet::{Fleet, Target};
    use crate::package::Requirement;
    use crate::release::WheelEntry;
    use crate::remote::{ExecOutput, MockRemote};
    use std::path::PathBuf;

    fn ok(stdout: &str) -> ExecOutput {
        ExecOutput {
            stdout: stdout.to_string(),
            stderr: String::new(),
            success: true,
        }
    }

    fn fleet(requirements: &[&str]) -> Fleet {
        let mut fleet = Fleet::default();
        let host = fleet.add_host("web1", None, true);
        fleet.add_target(Target {
            host,
            path: PathBuf::from("/srv/venv"),
            user: None,
            ssh_user: None,
            requirements: requirements
                .iter()
                .map(|name| Requirement {
                    name: name.to_string(),
                    pin: None,
                })
                .collect(),
            packages: Vec::new(),
            projects: Vec::new(),
        });
        fleet
    }

    fn release(catalog: &mut Catalog, package: &str, wheel: &str) {
        let entry = WheelEntry::from_file_name(wheel).unwrap();
        let version = crate::package::WheelName::parse(wheel).unwrap().version;
        catalog.record_release(package, version, entry);
    }

    fn mock_target(remote: &mut MockRemote, version: &'static str, freeze: &'static str) {
        remote
            .expect_exec()
            .withf(|_, cmd| cmd == "/srv/venv/bin/python --version")
            .returning(move |_, _| Ok(ok(version)));
        remote
            .expect_exec()
            .withf(|_, cmd| cmd == "/srv/venv/bin/pip freeze")
            .returning(move |_, _| Ok(ok(freeze)));
    }

    #[tokio::test]
    async fn test_plan_fresh_install() {
        // --- Setup ---
        let mut remote = MockRemote::new();
        mock_target(&mut remote, "Python 3.7.3\n", "");
        let mut catalog = Catalog::default();
        release(&mut catalog, "mypkg", "mypkg-1.0-py3-none-any.whl");
        let fleet = fleet(&["mypkg"]);
        let target = fleet.targets().next().unwrap();

        // --- Execute ---
        let plan = Planner::new(&remote, &[]).plan(&target, &catalog).await.unwrap();

        // --- Verify ---
        assert_eq!(plan.interpreter, Interpreter::new(3, 7));
        assert_eq!(plan.installables, vec!["mypkg-1.0-py3-none-any.whl"]);
        assert!(plan.missing.is_empty());
        assert!(plan.ahead.is_empty());
    }

    #[tokio::test]
    async fn test_plan_classifies_packages() {
        // --- Setup ---
        let mut remote = MockRemote::new();
        mock_target(
            &mut remote,
            "Python 3.8.10\n",
            "Django==1.11.29\nsite-theme==3.0\nold-pkg==2.0\n-e git+https://example.org/x#egg=x\n",
        );
        let mut catalog = Catalog::default();
        release(&mut catalog, "Django", "Django-1.11.29-py3-none-any.whl");
        release(&mut catalog, "site-theme", "site_theme-3.1-py3-none-any.whl");
        release(&mut catalog, "old-pkg", "old_pkg-1.0-py3-none-any.whl");
        release(&mut catalog, "py2only", "py2only-1.0-py2-none-any.whl");
        let fleet = fleet(&["Django", "old-pkg", "py2only", "unreleased"]);
        let target = fleet.targets().next().unwrap();
        let always = vec!["site-theme".to_string()];

        // --- Execute ---
        let plan = Planner::new(&remote, &always)
            .plan(&target, &catalog)
            .await
            .unwrap();

        // --- Verify ---
        assert_eq!(plan.installables, vec!["site_theme-3.1-py3-none-any.whl"]);
        assert_eq!(plan.missing, vec!["py2only", "unreleased"]);
        assert_eq!(plan.ahead.len(), 1);
        assert_eq!(plan.ahead[0].installed.to_string(), "old-pkg==2.0");
        assert_eq!(plan.ahead[0].released.as_str(), "1.0");
        assert_eq!(plan.ahead[0].wheel, "old_pkg-1.0-py3-none-any.whl");
    }

    #[tokio::test]
    async fn test_plan_is_idempotent() {
        let mut remote = MockRemote::new();
        mock_target(&mut remote, "Python 3.9.1\n", "mypkg==0.9\n");
        let mut catalog = Catalog::default();
        release(&mut catalog, "mypkg", "mypkg-1.0-cp39-cp39-manylinux1_x86_64.whl");
        release(&mut catalog, "mypkg", "mypkg-1.0-py3-none-any.whl");
        let fleet = fleet(&["mypkg"]);
        let target = fleet.targets().next().unwrap();
        let planner = Planner::new(&remote, &[]);

        let first = planner.plan(&target, &catalog).await.unwrap();
        let second = planner.plan(&target, &catalog).await.unwrap();

        assert_eq!(first, second);
        assert_eq!(first.installables, vec!["mypkg-1.0-cp39-cp39-manylinux1_x86_64.whl"]);
    }

    #[tokio::test]
    async fn test_plan_reads_python2_version_from_stderr() {
        let mut remote = MockRemote::new();
        remote
            .expect_exec()
            .withf(|_, cmd| cmd.ends_with("--version"))
            .returning(|_, _| {
                Ok(ExecOutput {
                    stdout: String::new(),
                    stderr: "Python 2.7.18\n".to_string(),
                    success: true,
                })
            });
        remote
            .expect_exec()
            .withf(|_, cmd| cmd.ends_with("freeze"))
            .returning(|_, _| Ok(ok("")));
        let fleet = fleet(&[]);
        let target = fleet.targets().next().unwrap();

        let plan = Planner::new(&remote, &[])
            .plan(&target, &Catalog::default())
            .await
            .unwrap();
        assert_eq!(plan.interpreter, Interpreter::new(2, 7));
        assert!(plan.is_up_to_date());
    }

    #[tokio::test]
    async fn test_plan_fails_when_pip_fails() {
        let mut remote = MockRemote::new();
        remote
            .expect_exec()
            .withf(|_, cmd| cmd.ends_with("--version"))
            .returning(|_, _| Ok(ok("Python 3.8.0")));
        remote
            .expect_exec()
            .withf(|_, cmd| cmd.ends_with("freeze"))
            .returning(|_, _| {
                Ok(ExecOutput {
                    stderr: "bash: pip: No such file or directory".to_string(),
                    ..Default::default()
                })
            });
        let fleet = fleet(&["mypkg"]);
        let target = fleet.targets().next().unwrap();

        let err = Planner::new(&remote, &[])
            .plan(&target, &Catalog::default())
            .await
            .unwrap_err();
        assert!(err.to_string().contains("No such file"));
    }
}
