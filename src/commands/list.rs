use anyhow::Result;
use log::debug;

use crate::{release::ReleaseLog, remote::Remote, runtime::Runtime};

use super::config::{Config, ConfigOptions};

/// List the newest release of every package
#[tracing::instrument(skip(runtime, options))]
pub fn list<R: Runtime>(runtime: R, options: ConfigOptions) -> Result<()> {
    let config = Config::new(runtime, options)?;
    for line in run(&config)? {
        println!("{}", line);
    }
    Ok(())
}

pub(crate) fn run<R: Runtime, M: Remote>(config: &Config<R, M>) -> Result<Vec<String>> {
    let log = ReleaseLog::open(&config.runtime, &config.release_log)?;
    let catalog = log.catalog();
    debug!("Listing {} package(s) from {:?}", catalog.len(), log.path());

    if catalog.is_empty() {
        return Ok(vec!["No releases recorded.".to_string()]);
    }

    let mut lines = Vec::new();
    for entry in catalog.iter() {
        lines.push(format!("{} {}", entry.name(), entry.version()));
        for wheel in &entry.wheels {
            lines.push(format!("  {}", wheel.file_name));
        }
    }
    Ok(lines)
}
