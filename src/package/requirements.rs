//! Simplified requirement lists and `pip freeze` output.
//!
//! Only two forms are understood: a bare package name (any version) and
//! `name==version`. Anything after `==` that is not a usable version is
//! treated as "no version".

use std::collections::HashMap;

use super::Version;

/// One line of a requirements file.
#[derive(Debug, Clone, PartialEq)]
pub struct Requirement {
    pub name: String,
    /// Exact pin, if the line used `==`.
    pub pin: Option<Version>,
}

fn split_line(line: &str) -> Option<(String, Option<Version>)> {
    let line = line.trim();
    if line.is_empty() || line.starts_with('#') {
        return None;
    }
    match line.split_once("==") {
        Some((name, version)) => Some((name.trim().to_string(), Version::parse(version).ok())),
        None => Some((line.to_string(), None)),
    }
}

/// Parses a requirements file, keeping file order and the last pin for
/// duplicate names.
pub fn parse_requirements(text: &str) -> Vec<Requirement> {
    let mut requirements: Vec<Requirement> = Vec::new();
    for (name, pin) in text.lines().filter_map(split_line) {
        match requirements.iter_mut().find(|r| r.name == name) {
            Some(existing) => existing.pin = pin,
            None => requirements.push(Requirement { name, pin }),
        }
    }
    requirements
}

/// Installed packages as reported by `pip freeze`.
///
/// A line without `==` (editable installs, direct URLs) maps the whole line
/// to an unknown version.
pub fn parse_freeze(output: &str) -> HashMap<String, Option<Version>> {
    output.lines().filter_map(split_line).collect()
}
