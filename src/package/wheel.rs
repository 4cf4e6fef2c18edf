//! Wheel file name parsing.
//!
//! A wheel file is named
//! `<distribution>-<version>[-<build>]-<python tags>-<abi>-<platform>.whl`,
//! where the python tag may hold several dot-separated tags (`py2.py3`).

use std::fmt;
use std::str::FromStr;

use anyhow::{Context, Result, bail};

use super::Version;

pub const WHEEL_SUFFIX: &str = ".whl";

/// One interpreter tag, e.g. `cp38`, `py3` or `py2`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PythonTag {
    raw: String,
    /// Interpreter family prefix (`py`, `cp`, `pp`, ...).
    pub family: String,
    pub major: Option<u32>,
    /// Absent for version-independent tags such as `py3`.
    pub minor: Option<u32>,
}

impl PythonTag {
    /// Tag built for exactly this interpreter version.
    pub fn is_exact(&self, major: u32, minor: u32) -> bool {
        self.major == Some(major) && self.minor == Some(minor)
    }

    /// Tag built for any interpreter of this major version.
    pub fn is_generic(&self, major: u32) -> bool {
        self.major == Some(major) && self.minor.is_none()
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }
}

impl FromStr for PythonTag {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        if s.is_empty() {
            bail!("Empty python tag");
        }
        let split = s.find(|c: char| c.is_ascii_digit()).unwrap_or(s.len());
        let (family, digits) = s.split_at(split);

        let (major, minor) = if digits.is_empty() || !digits.chars().all(|c| c.is_ascii_digit())
        {
            (None, None)
        } else {
            let (major, minor) = digits.split_at(1);
            let minor = if minor.is_empty() {
                None
            } else {
                minor.parse().ok()
            };
            (major.parse().ok(), minor)
        };

        Ok(Self {
            raw: s.to_string(),
            family: family.to_string(),
            major,
            minor,
        })
    }
}

/// The compatibility tags of one wheel file.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct WheelTags {
    pub python: Vec<PythonTag>,
    pub abi: String,
    pub platform: String,
}

impl fmt::Display for WheelTags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let python: Vec<_> = self.python.iter().map(PythonTag::as_str).collect();
        write!(f, "{}-{}-{}", python.join("."), self.abi, self.platform)
    }
}

/// Everything that can be read off a wheel file name.
#[derive(Debug, Clone, PartialEq)]
pub struct WheelName {
    pub file_name: String,
    /// Distribution name exactly as spelled in the file name.
    pub distribution: String,
    pub version: Version,
    pub tags: WheelTags,
}

impl WheelName {
    pub fn parse(file_name: &str) -> Result<Self> {
        let stem = file_name
            .strip_suffix(WHEEL_SUFFIX)
            .with_context(|| format!("{} is not a wheel file", file_name))?;

        let parts: Vec<&str> = stem.split('-').collect();
        let (distribution, version, tags) = match parts.as_slice() {
            [dist, version, python, abi, platform]
            | [dist, version, _, python, abi, platform] => {
                (*dist, *version, (*python, *abi, *platform))
            }
            _ => bail!(
                "Malformed wheel file name {}: expected name-version-python-abi-platform",
                file_name
            ),
        };

        if distribution.is_empty() {
            bail!("Malformed wheel file name {}: empty package name", file_name);
        }

        let python = tags
            .0
            .split('.')
            .map(PythonTag::from_str)
            .collect::<Result<Vec<_>>>()
            .with_context(|| format!("Malformed python tag in {}", file_name))?;

        Ok(Self {
            file_name: file_name.to_string(),
            distribution: distribution.to_string(),
            version: Version::parse(version)
                .with_context(|| format!("Malformed version in {}", file_name))?,
            tags: WheelTags {
                python,
                abi: tags.1.to_string(),
                platform: tags.2.to_string(),
            },
        })
    }

    /// Package name as recorded in the release log (underscores become hyphens).
    pub fn normalized_name(&self) -> String {
        normalize_name(&self.distribution)
    }
}

pub fn normalize_name(name: &str) -> String {
    name.replace('_', "-")
}
