//! Taking new wheels into the wheel store and the release log.

use std::path::Path;

use anyhow::{Context, Result};
use log::{info, warn};

use crate::package::{WHEEL_SUFFIX, WheelName};
use crate::release::ReleaseLog;
use crate::runtime::Runtime;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IntakeOutcome {
    Added { package: String, version: String },
    NotAWheel,
    AlreadyInStore,
    /// The catalog already has a newer version of the package.
    OutOfDate,
    /// Same version with the same tags already released.
    DuplicatePlatform,
}

pub struct Intake<'a, R: Runtime> {
    runtime: &'a R,
    store: &'a Path,
}

impl<'a, R: Runtime> Intake<'a, R> {
    pub fn new(runtime: &'a R, store: &'a Path) -> Self {
        Self { runtime, store }
    }

    /// Adds every wheel in `paths`. Rejected files are warned about and
    /// do not stop the batch.
    pub fn add_wheels<P: AsRef<Path>>(
        &self,
        log: &mut ReleaseLog<'_, R>,
        paths: &[P],
    ) -> Result<Vec<IntakeOutcome>> {
        paths
            .iter()
            .map(|path| self.add_wheel(log, path.as_ref()))
            .collect()
    }

    #[tracing::instrument(skip(self, log))]
    pub fn add_wheel(&self, log: &mut ReleaseLog<'_, R>, path: &Path) -> Result<IntakeOutcome> {
        let file_name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();
        if !file_name.ends_with(WHEEL_SUFFIX) {
            warn!("{} is not a wheel, skipping", path.display());
            return Ok(IntakeOutcome::NotAWheel);
        }
        let wheel = match WheelName::parse(&file_name) {
            Ok(wheel) => wheel,
            Err(e) => {
                warn!("Skipping {}: {:#}", path.display(), e);
                return Ok(IntakeOutcome::NotAWheel);
            }
        };

        let stored = self.store.join(&file_name);
        if self.runtime.exists(&stored) {
            warn!("{} is already in the wheel store", file_name);
            return Ok(IntakeOutcome::AlreadyInStore);
        }

        let package = wheel.normalized_name();
        if let Some(current) = log.catalog().lookup(&package) {
            if current.version() > &wheel.version {
                warn!(
                    "{} is older than the released {}, skipping",
                    file_name, current.package
                );
                return Ok(IntakeOutcome::OutOfDate);
            }
            if current.version() == &wheel.version && current.has_tags(&wheel.tags) {
                warn!(
                    "{} has already been released for {}, skipping",
                    current.package, wheel.tags
                );
                return Ok(IntakeOutcome::DuplicatePlatform);
            }
        }

        self.runtime.create_dir_all(self.store)?;
        self.runtime
            .copy(path, &stored)
            .with_context(|| format!("Failed to copy {} into the wheel store", path.display()))?;
        if let Err(e) = log.add_release(&package, &wheel) {
            // Unrecorded wheels must not linger in the store.
            if let Err(remove) = self.runtime.remove_file(&stored) {
                warn!("Could not remove {}: {:#}", stored.display(), remove);
            }
            return Err(e);
        }
        info!("Released {}=={} ({})", package, wheel.version, file_name);

        Ok(IntakeOutcome::Added {
            package,
            version: wheel.version.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::release::LedgerEntry;
    use crate::runtime::RealRuntime;
    use std::path::PathBuf;
    use std::sync::atomic::{AtomicBool, Ordering};
    use tempfile::{TempDir, tempdir};

    /// Real file system whose first append fails.
    #[derive(Default)]
    struct FailFirstAppend {
        failed: AtomicBool,
    }

    impl Runtime for FailFirstAppend {
        fn read_to_string(&self, path: &Path) -> Result<String> {
            RealRuntime.read_to_string(path)
        }
        fn append(&self, path: &Path, contents: &[u8]) -> Result<()> {
            if !self.failed.swap(true, Ordering::SeqCst) {
                anyhow::bail!("disk full");
            }
            RealRuntime.append(path, contents)
        }
        fn copy(&self, from: &Path, to: &Path) -> Result<u64> {
            RealRuntime.copy(from, to)
        }
        fn create_dir_all(&self, path: &Path) -> Result<()> {
            RealRuntime.create_dir_all(path)
        }
        fn remove_file(&self, path: &Path) -> Result<()> {
            RealRuntime.remove_file(path)
        }
        fn exists(&self, path: &Path) -> bool {
            RealRuntime.exists(path)
        }
        fn open(&self, path: &Path) -> Result<Box<dyn std::io::Read + Send>> {
            RealRuntime.open(path)
        }
        fn home_dir(&self) -> Option<PathBuf> {
            None
        }
        fn config_dir(&self) -> Option<PathBuf> {
            None
        }
        fn confirm(&self, _prompt: &str) -> Result<bool> {
            Ok(false)
        }
    }

    struct Fixture {
        dir: TempDir,
        runtime: RealRuntime,
    }

    impl Fixture {
        fn new() -> Self {
            let dir = tempdir().unwrap();
            std::fs::create_dir(dir.path().join("incoming")).unwrap();
            Self {
                dir,
                runtime: RealRuntime,
            }
        }

        fn store(&self) -> PathBuf {
            self.dir.path().join("store")
        }

        fn log_path(&self) -> PathBuf {
            self.dir.path().join("releases.log")
        }

        fn incoming(&self, file_name: &str) -> PathBuf {
            let path = self.dir.path().join("incoming").join(file_name);
            std::fs::write(&path, file_name.as_bytes()).unwrap();
            path
        }
    }

    fn releases(entries: &[LedgerEntry]) -> usize {
        entries
            .iter()
            .filter(|e| matches!(e, LedgerEntry::Release { .. }))
            .count()
    }

    #[test]
    fn test_add_wheel_to_empty_catalog() {
        // --- Setup ---
        let fx = Fixture::new();
        let store = fx.store();
        let mut log = ReleaseLog::open(&fx.runtime, fx.log_path()).unwrap();
        let intake = Intake::new(&fx.runtime, &store);

        // --- Execute ---
        let outcome = intake
            .add_wheel(&mut log, &fx.incoming("mypkg-1.0-py3-none-any.whl"))
            .unwrap();

        // --- Verify ---
        assert_eq!(
            outcome,
            IntakeOutcome::Added {
                package: "mypkg".into(),
                version: "1.0".into()
            }
        );
        assert!(store.join("mypkg-1.0-py3-none-any.whl").exists());
        let entry = log.catalog().lookup("mypkg").unwrap();
        assert_eq!(entry.version().as_str(), "1.0");
        assert_eq!(entry.wheels.len(), 1);
    }

    #[test]
    fn test_add_same_wheel_twice() {
        let fx = Fixture::new();
        let store = fx.store();
        let mut log = ReleaseLog::open(&fx.runtime, fx.log_path()).unwrap();
        let intake = Intake::new(&fx.runtime, &store);
        let wheel = fx.incoming("mypkg-1.0-py3-none-any.whl");

        intake.add_wheel(&mut log, &wheel).unwrap();
        let second = intake.add_wheel(&mut log, &wheel).unwrap();

        assert_eq!(second, IntakeOutcome::AlreadyInStore);
        assert_eq!(releases(&log.entries().unwrap()), 1);
    }

    #[test]
    fn test_rejects_non_wheels_and_continues_batch() {
        let fx = Fixture::new();
        let store = fx.store();
        let mut log = ReleaseLog::open(&fx.runtime, fx.log_path()).unwrap();
        let intake = Intake::new(&fx.runtime, &store);

        let outcomes = intake
            .add_wheels(
                &mut log,
                &[
                    fx.incoming("mypkg-1.0.tar.gz"),
                    fx.incoming("broken.whl"),
                    fx.incoming("mypkg-1.0-py3-none-any.whl"),
                ],
            )
            .unwrap();

        assert_eq!(outcomes[0], IntakeOutcome::NotAWheel);
        assert_eq!(outcomes[1], IntakeOutcome::NotAWheel);
        assert!(matches!(outcomes[2], IntakeOutcome::Added { .. }));
    }

    #[test]
    fn test_version_and_platform_rules() {
        let fx = Fixture::new();
        let store = fx.store();
        let mut log = ReleaseLog::open(&fx.runtime, fx.log_path()).unwrap();
        let intake = Intake::new(&fx.runtime, &store);

        assert!(matches!(
            intake.add_wheel(&mut log, &fx.incoming("my_pkg-2.0-cp38-cp38-manylinux1_x86_64.whl")).unwrap(),
            IntakeOutcome::Added { .. }
        ));
        // Another platform for the same version joins the entry.
        assert!(matches!(
            intake.add_wheel(&mut log, &fx.incoming("my_pkg-2.0-cp39-cp39-manylinux1_x86_64.whl")).unwrap(),
            IntakeOutcome::Added { .. }
        ));
        assert_eq!(
            intake.add_wheel(&mut log, &fx.incoming("my_pkg-1.5-py3-none-any.whl")).unwrap(),
            IntakeOutcome::OutOfDate
        );
        // Same tags under a different build number.
        assert_eq!(
            intake.add_wheel(&mut log, &fx.incoming("my_pkg-2.0-1-cp38-cp38-manylinux1_x86_64.whl")).unwrap(),
            IntakeOutcome::DuplicatePlatform
        );

        let entry = log.catalog().lookup("my-pkg").unwrap();
        assert_eq!(entry.wheels.len(), 2);
        assert_eq!(releases(&log.entries().unwrap()), 2);
    }

    #[test]
    fn test_newer_version_replaces_catalog_entry() {
        let fx = Fixture::new();
        let store = fx.store();
        let mut log = ReleaseLog::open(&fx.runtime, fx.log_path()).unwrap();
        let intake = Intake::new(&fx.runtime, &store);

        intake
            .add_wheel(&mut log, &fx.incoming("mypkg-1.0-py3-none-any.whl"))
            .unwrap();
        intake
            .add_wheel(&mut log, &fx.incoming("mypkg-1.1-py3-none-any.whl"))
            .unwrap();

        let reopened = ReleaseLog::open(&fx.runtime, fx.log_path()).unwrap();
        let entry = reopened.catalog().lookup("mypkg").unwrap();
        assert_eq!(entry.version().as_str(), "1.1");
        assert_eq!(entry.wheels[0].file_name, "mypkg-1.1-py3-none-any.whl");
    }

    #[test]
    fn test_failed_release_record_leaves_store_clean() {
        // --- Setup ---
        let fx = Fixture::new();
        let store = fx.store();
        let runtime = FailFirstAppend::default();
        let mut log = ReleaseLog::open(&runtime, fx.log_path()).unwrap();
        let intake = Intake::new(&runtime, &store);
        let wheel = fx.incoming("mypkg-1.0-py3-none-any.whl");

        // --- Execute ---
        let first = intake.add_wheel(&mut log, &wheel);
        let second = intake.add_wheel(&mut log, &wheel).unwrap();

        // --- Verify ---
        assert!(first.is_err());
        assert!(matches!(second, IntakeOutcome::Added { .. }));
        assert!(store.join("mypkg-1.0-py3-none-any.whl").exists());
        assert!(log.catalog().lookup("mypkg").is_some());
        assert_eq!(releases(&log.entries().unwrap()), 1);
    }
}
