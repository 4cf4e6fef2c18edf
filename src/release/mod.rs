//! Release tracking
//!
//! The release log ([`Ledger`]) is the single source of truth for what has
//! been released and deployed. The [`Catalog`] is derived from it and is
//! never changed except by replaying or appending release records.

mod catalog;
mod ledger;
pub mod matcher;

use std::path::{Path, PathBuf};

use anyhow::Result;
use log::{debug, error};

use crate::package::{PackageVersion, WheelName};
use crate::runtime::Runtime;

pub use catalog::{Catalog, CatalogEntry, Merge, WheelEntry};
pub use ledger::{Ledger, LedgerEntry};
pub use matcher::{Interpreter, select};

/// The release log together with the catalog replayed from it.
///
/// Writes take `&mut self` or go through the ledger's append, so there is
/// exactly one writer and the catalog cannot drift from the file.
pub struct ReleaseLog<'a, R: Runtime> {
    ledger: Ledger<'a, R>,
    catalog: Catalog,
}

impl<'a, R: Runtime> ReleaseLog<'a, R> {
    /// Opens the release log at `path` and rebuilds the catalog from it.
    pub fn open(runtime: &'a R, path: impl Into<PathBuf>) -> Result<Self> {
        let ledger = Ledger::new(runtime, path);
        let catalog = Catalog::from_entries(ledger.replay()?);
        debug!(
            "Loaded {} package(s) from {}",
            catalog.len(),
            ledger.path().display()
        );
        Ok(Self { ledger, catalog })
    }

    pub fn path(&self) -> &Path {
        self.ledger.path()
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    /// Records a new release of `package`. The caller must already have
    /// placed the wheel file into the wheel store.
    pub fn add_release(&mut self, package: &str, wheel: &WheelName) -> Result<Option<Merge>> {
        let entry = LedgerEntry::release(
            PackageVersion::new(package, wheel.version.clone()),
            &wheel.file_name,
        );
        self.ledger.append(&entry)?;
        Ok(self.catalog.apply(&entry))
    }

    /// Notes that `wheel` has been installed into `target`.
    pub fn add_install(&self, target: &str, wheel: &str) -> Result<()> {
        self.ledger.append(&LedgerEntry::install(target, wheel))
    }

    pub fn log_warning(&self, target: &str, message: &str) -> Result<()> {
        self.ledger.append(&LedgerEntry::Warning {
            target: target.to_string(),
            message: message.to_string(),
        })
    }

    pub fn log_error(&self, target: &str, message: &str) -> Result<()> {
        error!("{}: {}", target, message);
        self.ledger.append(&LedgerEntry::Error {
            target: target.to_string(),
            message: message.to_string(),
        })
    }

    /// Records the reason a deployment run is being aborted. Stopping the
    /// run is up to the caller.
    pub fn log_abort(&self, target: &str, message: &str) -> Result<()> {
        error!("Aborting at {}: {}", target, message);
        self.ledger.append(&LedgerEntry::Abort {
            target: target.to_string(),
            message: message.to_string(),
        })
    }

    /// All records currently in the release log.
    pub fn entries(&self) -> Result<Vec<LedgerEntry>> {
        Ok(self.ledger.replay()?.collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::RealRuntime;
    use tempfile::tempdir;

    fn wheel(name: &str) -> WheelName {
        WheelName::parse(name).unwrap()
    }

    #[test]
    fn test_reopen_rebuilds_same_catalog() {
        let runtime = RealRuntime;
        let dir = tempdir().unwrap();
        let path = dir.path().join("releases.log");

        let mut log = ReleaseLog::open(&runtime, &path).unwrap();
        assert!(log.catalog().is_empty());

        log.add_release("pkg", &wheel("pkg-1.0-py3-none-any.whl")).unwrap();
        log.add_release("pkg", &wheel("pkg-2.0-py3-none-any.whl")).unwrap();
        let merge = log.add_release("pkg", &wheel("pkg-1.5-py3-none-any.whl")).unwrap();
        assert_eq!(merge, Some(Merge::Ignored));
        log.add_install("web1:/srv/venv", "pkg-2.0-py3-none-any.whl").unwrap();

        let reopened = ReleaseLog::open(&runtime, &path).unwrap();
        assert_eq!(reopened.catalog(), log.catalog());

        let entry = reopened.catalog().lookup("pkg").unwrap();
        assert_eq!(entry.version().as_str(), "2.0");
        assert!(
            entry
                .wheels
                .iter()
                .all(|w| w.file_name != "pkg-1.5-py3-none-any.whl")
        );
    }

    #[test]
    fn test_audit_records_are_kept_in_order() {
        let runtime = RealRuntime;
        let dir = tempdir().unwrap();
        let log = ReleaseLog::open(&runtime, dir.path().join("releases.log")).unwrap();

        log.add_install("web1:/srv/venv", "a-1.0-py3-none-any.whl").unwrap();
        log.log_warning("web2:/srv/venv", "missing packages: b").unwrap();
        log.log_error("web1:/srv/venv", "could not migrate").unwrap();
        log.log_abort("web3:/srv/venv", "could not put a-1.0-py3-none-any.whl")
            .unwrap();

        let entries = log.entries().unwrap();
        assert_eq!(entries.len(), 4);
        assert!(matches!(entries[0], LedgerEntry::Install { .. }));
        assert!(matches!(entries[1], LedgerEntry::Warning { .. }));
        assert!(matches!(entries[2], LedgerEntry::Error { .. }));
        assert!(matches!(entries[3], LedgerEntry::Abort { .. }));
        assert!(log.catalog().is_empty());
    }
}
