//! Choosing the wheel that fits an interpreter.

use std::fmt;

use anyhow::{Context, Result};
use serde::Serialize;

use super::{CatalogEntry, WheelEntry};

/// Interpreter version of a target environment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Interpreter {
    pub major: u32,
    pub minor: u32,
}

impl Interpreter {
    pub fn new(major: u32, minor: u32) -> Self {
        Self { major, minor }
    }

    /// Parses the output of `python --version`, e.g. `Python 3.8.10`.
    pub fn from_version_output(output: &str) -> Result<Self> {
        let version = output
            .split_whitespace()
            .skip_while(|word| !word.eq_ignore_ascii_case("python"))
            .nth(1)
            .with_context(|| format!("Unexpected interpreter version output: {:?}", output.trim()))?;

        let mut parts = version.split('.');
        let mut number = |what: &str| -> Result<u32> {
            parts
                .next()
                .and_then(|p| p.parse().ok())
                .with_context(|| format!("Missing {} version in {:?}", what, version))
        };
        Ok(Self::new(number("major")?, number("minor")?))
    }
}

impl fmt::Display for Interpreter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.major, self.minor)
    }
}

/// Picks a wheel for `interpreter`: a wheel tagged for exactly this
/// major.minor wins, then one tagged for the whole major version. The first
/// matching wheel in release order is taken within each tier.
pub fn select(entry: &CatalogEntry, interpreter: Interpreter) -> Option<&WheelEntry> {
    let Interpreter { major, minor } = interpreter;
    entry
        .wheels
        .iter()
        .find(|w| w.tags.python.iter().any(|t| t.is_exact(major, minor)))
        .or_else(|| {
            entry
                .wheels
                .iter()
                .find(|w| w.tags.python.iter().any(|t| t.is_generic(major)))
        })
}
