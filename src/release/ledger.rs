//! The release log file.
//!
//! One record per line, tagged by a literal prefix:
//!
//! ```text
//! release: <pkg>==<version> <wheel> at <timestamp>
//! install: <target>: <wheel> at <timestamp>
//! warning: <target>: <message>
//! error: <target>: <message>
//! aborting: <target>: <message>
//! ```
//!
//! Records are only ever appended. Replay reads the file front to back and
//! silently drops lines it cannot make sense of.

use std::fmt;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{Local, NaiveDateTime};
use log::debug;

use crate::package::{PackageVersion, Version};
use crate::runtime::Runtime;

const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.6f";

#[derive(Debug, Clone, PartialEq)]
pub enum LedgerEntry {
    Release {
        package: PackageVersion,
        wheel: String,
        at: NaiveDateTime,
    },
    Install {
        target: String,
        wheel: String,
        at: NaiveDateTime,
    },
    Warning {
        target: String,
        message: String,
    },
    Error {
        target: String,
        message: String,
    },
    Abort {
        target: String,
        message: String,
    },
}

impl LedgerEntry {
    pub fn release(package: PackageVersion, wheel: impl Into<String>) -> Self {
        Self::Release {
            package,
            wheel: wheel.into(),
            at: now(),
        }
    }

    pub fn install(target: impl Into<String>, wheel: impl Into<String>) -> Self {
        Self::Install {
            target: target.into(),
            wheel: wheel.into(),
            at: now(),
        }
    }

    /// Parses one line of the release log. Returns `None` for anything that
    /// is not a well-formed record of a known kind.
    pub fn parse(line: &str) -> Option<Self> {
        let line = line.trim_end_matches(['\r', '\n']);
        let (tag, rest) = line.split_once(": ")?;

        match tag {
            "release" => {
                let (body, at) = split_timestamp(rest)?;
                let (spec, wheel) = body.split_once(' ')?;
                let (name, version) = spec.split_once("==")?;
                if name.is_empty() || wheel.is_empty() || wheel.contains(' ') {
                    return None;
                }
                Some(Self::Release {
                    package: PackageVersion::new(name, Version::parse(version).ok()?),
                    wheel: wheel.to_string(),
                    at,
                })
            }
            "install" => {
                let (body, at) = split_timestamp(rest)?;
                let (target, wheel) = body.split_once(": ")?;
                Some(Self::Install {
                    target: target.to_string(),
                    wheel: wheel.to_string(),
                    at,
                })
            }
            "warning" | "error" | "aborting" => {
                let (target, message) = rest.split_once(": ")?;
                let (target, message) = (target.to_string(), message.to_string());
                Some(match tag {
                    "warning" => Self::Warning { target, message },
                    "error" => Self::Error { target, message },
                    _ => Self::Abort { target, message },
                })
            }
            _ => None,
        }
    }
}

impl fmt::Display for LedgerEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Release { package, wheel, at } => write!(
                f,
                "release: {} {} at {}",
                package,
                wheel,
                at.format(TIMESTAMP_FORMAT)
            ),
            Self::Install { target, wheel, at } => write!(
                f,
                "install: {}: {} at {}",
                target,
                wheel,
                at.format(TIMESTAMP_FORMAT)
            ),
            Self::Warning { target, message } => write!(f, "warning: {}: {}", target, message),
            Self::Error { target, message } => write!(f, "error: {}: {}", target, message),
            Self::Abort { target, message } => write!(f, "aborting: {}: {}", target, message),
        }
    }
}

fn now() -> NaiveDateTime {
    Local::now().naive_local()
}

fn split_timestamp(rest: &str) -> Option<(&str, NaiveDateTime)> {
    let (body, stamp) = rest.rsplit_once(" at ")?;
    Some((body, stamp.trim().parse().ok()?))
}

/// Append-only access to the release log file.
pub struct Ledger<'a, R: Runtime> {
    runtime: &'a R,
    path: PathBuf,
}

impl<'a, R: Runtime> Ledger<'a, R> {
    pub fn new(runtime: &'a R, path: impl Into<PathBuf>) -> Self {
        Self {
            runtime,
            path: path.into(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Writes one record. The record is on disk when this returns `Ok`.
    pub fn append(&self, entry: &LedgerEntry) -> Result<()> {
        // Messages come from command output and must not break the
        // one-record-per-line format.
        let line = format!("{}\n", entry.to_string().replace(['\r', '\n'], " "));
        self.runtime
            .append(&self.path, line.as_bytes())
            .with_context(|| format!("Failed to write to release log {}", self.path.display()))
    }

    /// Reads every record in file order. Each call starts from the beginning
    /// of the file; a missing file replays as empty.
    pub fn replay(&self) -> Result<impl Iterator<Item = LedgerEntry> + use<'a, R>> {
        let reader: Box<dyn std::io::Read + Send> = if self.runtime.exists(&self.path) {
            self.runtime
                .open(&self.path)
                .with_context(|| format!("Failed to open release log {}", self.path.display()))?
        } else {
            debug!("Release log {} does not exist yet", self.path.display());
            Box::new(std::io::empty())
        };

        Ok(BufReader::new(reader)
            .split(b'\n')
            .map_while(|line| line.ok())
            .enumerate()
            .filter_map(|(index, bytes)| {
                let line = String::from_utf8_lossy(&bytes);
                if line.trim().is_empty() {
                    return None;
                }
                let entry = LedgerEntry::parse(&line);
                if entry.is_none() {
                    debug!("Skipping unrecognized release log line {}: {}", index + 1, line);
                }
                entry
            }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::{MockRuntime, RealRuntime};
    use std::sync::{Arc, Mutex};
    use tempfile::tempdir;

    fn stamp() -> NaiveDateTime {
        "2024-03-01T10:15:30.123456".parse().unwrap()
    }

    fn release(name: &str, version: &str, wheel: &str) -> LedgerEntry {
        LedgerEntry::Release {
            package: PackageVersion::new(name, Version::parse(version).unwrap()),
            wheel: wheel.to_string(),
            at: stamp(),
        }
    }

    #[test]
    fn test_format_release() {
        let entry = release("mypkg", "1.0", "mypkg-1.0-py3-none-any.whl");
        assert_eq!(
            entry.to_string(),
            "release: mypkg==1.0 mypkg-1.0-py3-none-any.whl at 2024-03-01T10:15:30.123456"
        );
    }

    #[test]
    fn test_format_audit_records() {
        let install = LedgerEntry::Install {
            target: "web1:/srv/venv".into(),
            wheel: "mypkg-1.0-py3-none-any.whl".into(),
            at: stamp(),
        };
        assert_eq!(
            install.to_string(),
            "install: web1:/srv/venv: mypkg-1.0-py3-none-any.whl at 2024-03-01T10:15:30.123456"
        );

        let abort = LedgerEntry::Abort {
            target: "web1:/srv/venv".into(),
            message: "could not put x.whl".into(),
        };
        assert_eq!(abort.to_string(), "aborting: web1:/srv/venv: could not put x.whl");
    }

    #[test]
    fn test_parse_roundtrips_every_kind() {
        let entries = vec![
            release("mypkg", "1.0", "mypkg-1.0-py3-none-any.whl"),
            LedgerEntry::Install {
                target: "web1:/srv/venv".into(),
                wheel: "mypkg-1.0-py3-none-any.whl".into(),
                at: stamp(),
            },
            LedgerEntry::Warning {
                target: "web1:/srv/venv".into(),
                message: "missing packages: a, b".into(),
            },
            LedgerEntry::Error {
                target: "web1:/srv/venv".into(),
                message: "could not migrate in settings: see log".into(),
            },
            LedgerEntry::Abort {
                target: "web1:/srv/venv".into(),
                message: "cannot create wheel directory".into(),
            },
        ];
        for entry in entries {
            assert_eq!(LedgerEntry::parse(&entry.to_string()), Some(entry));
        }
    }

    #[test]
    fn test_parse_python_style_timestamp_without_fraction() {
        let entry =
            LedgerEntry::parse("release: mypkg==1.0 mypkg-1.0-py3-none-any.whl at 2016-05-01T12:00:00")
                .unwrap();
        match entry {
            LedgerEntry::Release { package, .. } => assert_eq!(package.version.as_str(), "1.0"),
            other => panic!("expected release, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_rejects_malformed_lines() {
        assert_eq!(LedgerEntry::parse(""), None);
        assert_eq!(LedgerEntry::parse("garbage"), None);
        assert_eq!(LedgerEntry::parse("release: mypkg-1.0 x.whl at 2024-01-01T00:00:00"), None);
        assert_eq!(LedgerEntry::parse("release: mypkg==1.0 x.whl"), None);
        assert_eq!(LedgerEntry::parse("release: mypkg==1.0 x.whl at yesterday"), None);
        assert_eq!(LedgerEntry::parse("deployed: web1: x.whl"), None);
    }

    #[test]
    fn test_append_then_replay_with_real_file() {
        let runtime = RealRuntime;
        let dir = tempdir().unwrap();
        let ledger = Ledger::new(&runtime, dir.path().join("releases.log"));

        ledger.append(&release("a", "1.0", "a-1.0-py3-none-any.whl")).unwrap();
        ledger
            .append(&LedgerEntry::Error {
                target: "web1:/srv/venv".into(),
                message: "line one\nline two".into(),
            })
            .unwrap();

        let entries: Vec<_> = ledger.replay().unwrap().collect();
        assert_eq!(entries.len(), 2);
        assert_eq!(
            entries[1],
            LedgerEntry::Error {
                target: "web1:/srv/venv".into(),
                message: "line one line two".into(),
            }
        );

        // Replay is restartable
        assert_eq!(ledger.replay().unwrap().count(), 2);
    }

    #[test]
    fn test_replay_skips_malformed_lines() {
        let runtime = RealRuntime;
        let dir = tempdir().unwrap();
        let path = dir.path().join("releases.log");
        std::fs::write(
            &path,
            "release: a==1.0 a-1.0-py3-none-any.whl at 2024-01-01T00:00:00\n\
             this is not a record\n\
             \n\
             release: broken\n\
             install: web1:/srv/venv: a-1.0-py3-none-any.whl at 2024-01-02T00:00:00\n",
        )
        .unwrap();

        let ledger = Ledger::new(&runtime, path);
        let entries: Vec<_> = ledger.replay().unwrap().collect();
        assert_eq!(entries.len(), 2);
        assert!(matches!(entries[0], LedgerEntry::Release { .. }));
        assert!(matches!(entries[1], LedgerEntry::Install { .. }));
    }

    #[test]
    fn test_replay_missing_file_is_empty() {
        let mut runtime = MockRuntime::new();
        runtime.expect_exists().returning(|_| false);

        let ledger = Ledger::new(&runtime, "/srv/releases.log");
        assert_eq!(ledger.replay().unwrap().count(), 0);
    }

    #[test]
    fn test_append_failure_is_reported() {
        let mut runtime = MockRuntime::new();
        runtime
            .expect_append()
            .returning(|_, _| Err(anyhow::anyhow!("disk full")));

        let ledger = Ledger::new(&runtime, "/srv/releases.log");
        let err = ledger
            .append(&release("a", "1.0", "a-1.0-py3-none-any.whl"))
            .unwrap_err();
        assert!(err.to_string().contains("/srv/releases.log"));
    }

    #[test]
    fn test_append_writes_one_line() {
        let written = Arc::new(Mutex::new(Vec::<u8>::new()));
        let sink = Arc::clone(&written);

        let mut runtime = MockRuntime::new();
        runtime.expect_append().returning(move |_, bytes| {
            sink.lock().unwrap().extend_from_slice(bytes);
            Ok(())
        });

        let ledger = Ledger::new(&runtime, "/srv/releases.log");
        ledger
            .append(&LedgerEntry::Abort {
                target: "web1:/srv/venv".into(),
                message: "could not install b.whl after installing a.whl".into(),
            })
            .unwrap();

        let text = String::from_utf8(written.lock().unwrap().clone()).unwrap();
        assert_eq!(
            text,
            "aborting: web1:/srv/venv: could not install b.whl after installing a.whl\n"
        );
    }
}
