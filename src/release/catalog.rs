//! The package catalog: newest known wheels per package.
//!
//! The catalog is a materialized view of the release log. It is only ever
//! changed through [`Catalog::apply`], which is used both when replaying the
//! log at startup and right after a new release has been appended.

use std::collections::BTreeMap;

use anyhow::Result;
use log::warn;

use crate::package::{PackageVersion, Version, WheelName, WheelTags};

use super::LedgerEntry;

/// One physical wheel file.
#[derive(Debug, Clone, PartialEq)]
pub struct WheelEntry {
    pub tags: WheelTags,
    pub file_name: String,
}

impl WheelEntry {
    pub fn from_file_name(file_name: &str) -> Result<Self> {
        let wheel = WheelName::parse(file_name)?;
        Ok(Self {
            tags: wheel.tags,
            file_name: wheel.file_name,
        })
    }
}

/// The best-known release of one package and all wheels built for it.
#[derive(Debug, Clone, PartialEq)]
pub struct CatalogEntry {
    pub package: PackageVersion,
    /// In release log order.
    pub wheels: Vec<WheelEntry>,
}

impl CatalogEntry {
    pub fn name(&self) -> &str {
        &self.package.name
    }

    pub fn version(&self) -> &Version {
        &self.package.version
    }

    pub fn has_tags(&self, tags: &WheelTags) -> bool {
        self.wheels.iter().any(|w| &w.tags == tags)
    }
}

/// What [`Catalog::record_release`] did with a release.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Merge {
    /// First release or strictly newer version: the entry was rebuilt.
    Replaced,
    /// Same version: the wheel joined the existing entry.
    Appended,
    /// Older version: nothing changed.
    Ignored,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Catalog {
    entries: BTreeMap<String, CatalogEntry>,
}

impl Catalog {
    /// Folds a sequence of release log records into a catalog.
    pub fn from_entries(entries: impl IntoIterator<Item = LedgerEntry>) -> Self {
        entries.into_iter().fold(Self::default(), |mut catalog, entry| {
            catalog.apply(&entry);
            catalog
        })
    }

    /// Applies one release log record. Audit records and releases whose
    /// wheel name cannot be parsed leave the catalog untouched and return `None`.
    pub fn apply(&mut self, entry: &LedgerEntry) -> Option<Merge> {
        let LedgerEntry::Release { package, wheel, .. } = entry else {
            return None;
        };
        match WheelEntry::from_file_name(wheel) {
            Ok(wheel) => Some(self.record_release(&package.name, package.version.clone(), wheel)),
            Err(e) => {
                warn!("Ignoring release of {} with unusable wheel name: {}", package, e);
                None
            }
        }
    }

    pub fn record_release(&mut self, package: &str, version: Version, wheel: WheelEntry) -> Merge {
        if let Some(existing) = self.entries.get_mut(package) {
            if version == existing.package.version {
                existing.wheels.push(wheel);
                return Merge::Appended;
            }
            if version < existing.package.version {
                return Merge::Ignored;
            }
        }

        self.entries.insert(
            package.to_string(),
            CatalogEntry {
                package: PackageVersion::new(package, version),
                wheels: vec![wheel],
            },
        );
        Merge::Replaced
    }

    pub fn lookup(&self, package: &str) -> Option<&CatalogEntry> {
        self.entries.get(package)
    }

    /// Entries sorted by package name.
    pub fn iter(&self) -> impl Iterator<Item = &CatalogEntry> {
        self.entries.values()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
