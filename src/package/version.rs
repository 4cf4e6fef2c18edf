//! Comparable package versions.
//!
//! Versions are split into numeric and alphabetic components. Numeric
//! components compare numerically, alphabetic ones lexically, and a number
//! always sorts before text at the same position. A version that is a strict
//! prefix of another is the smaller one (`1.0 < 1.0.0`).

use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::str::FromStr;

use anyhow::{Result, bail};
use serde::{Serialize, Serializer};

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
enum Component {
    Number(u64),
    Text(String),
}

/// A parsed version that keeps its original spelling for display.
#[derive(Debug, Clone)]
pub struct Version {
    raw: String,
    components: Vec<Component>,
}

impl Version {
    pub fn parse(raw: &str) -> Result<Self> {
        raw.parse()
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    fn split(raw: &str) -> Vec<Component> {
        let mut components = Vec::new();
        let mut chars = raw.chars().peekable();

        while let Some(&c) = chars.peek() {
            if c == '.' {
                chars.next();
            } else if c.is_ascii_digit() {
                let mut digits = String::new();
                while let Some(&d) = chars.peek().filter(|d| d.is_ascii_digit()) {
                    digits.push(d);
                    chars.next();
                }
                components.push(match digits.parse() {
                    Ok(n) => Component::Number(n),
                    Err(_) => Component::Text(digits),
                });
            } else if c.is_ascii_alphabetic() {
                let mut word = String::new();
                while let Some(&a) = chars.peek().filter(|a| a.is_ascii_alphabetic()) {
                    word.push(a);
                    chars.next();
                }
                components.push(Component::Text(word));
            } else {
                components.push(Component::Text(c.to_string()));
                chars.next();
            }
        }

        components
    }
}

impl FromStr for Version {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        let raw = s.trim();
        if raw.is_empty() {
            bail!("Empty version string");
        }
        Ok(Self {
            raw: raw.to_string(),
            components: Self::split(raw),
        })
    }
}

impl PartialEq for Version {
    fn eq(&self, other: &Self) -> bool {
        self.components == other.components
    }
}

impl Eq for Version {}

impl Hash for Version {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.components.hash(state);
    }
}

impl PartialOrd for Version {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Version {
    fn cmp(&self, other: &Self) -> Ordering {
        self.components.cmp(&other.components)
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

impl Serialize for Version {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.raw)
    }
}

/// A package name together with one of its versions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PackageVersion {
    pub name: String,
    pub version: Version,
}

impl PackageVersion {
    pub fn new(name: impl Into<String>, version: Version) -> Self {
        Self {
            name: name.into(),
            version,
        }
    }
}

impl fmt::Display for PackageVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}=={}", self.name, self.version)
    }
}
