use anyhow::Result;
use log::debug;
use std::path::PathBuf;

use crate::{
    deploy::{Intake, IntakeOutcome},
    release::ReleaseLog,
    remote::Remote,
    runtime::Runtime,
};

use super::config::{Config, ConfigOptions};

/// Add wheels to the wheel store and record their release
#[tracing::instrument(skip(runtime, options))]
pub fn add_wheel<R: Runtime>(runtime: R, options: ConfigOptions, paths: &[PathBuf]) -> Result<()> {
    let config = Config::new(runtime, options)?;
    run(&config, paths)
}

pub(crate) fn run<R: Runtime, M: Remote>(config: &Config<R, M>, paths: &[PathBuf]) -> Result<()> {
    let mut log = ReleaseLog::open(&config.runtime, &config.release_log)?;
    let intake = Intake::new(&config.runtime, &config.wheels);

    let outcomes = intake.add_wheels(&mut log, paths)?;
    let added = outcomes
        .iter()
        .filter(|o| matches!(o, IntakeOutcome::Added { .. }))
        .count();
    debug!("Intake outcomes: {:?}", outcomes);

    println!("Added {} of {} wheel(s).", added, outcomes.len());
    Ok(())
}
