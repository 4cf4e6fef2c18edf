use anyhow::{Result, bail};
use log::info;

use crate::{
    deploy::{Orchestrator, Outcome, RunReport},
    fleet::TargetFilter,
    release::ReleaseLog,
    remote::Remote,
    runtime::Runtime,
};

use super::config::{Config, ConfigOptions};

/// Deploy the newest releases to the selected targets
#[tracing::instrument(skip(runtime, options))]
pub async fn deploy<R: Runtime>(
    runtime: R,
    options: ConfigOptions,
    filter: TargetFilter,
    assume_yes: bool,
) -> Result<()> {
    let config = Config::new(runtime, options)?;
    let report = run(&config, &filter, assume_yes).await?;
    print_report(&report);
    Ok(())
}

pub(crate) async fn run<R: Runtime, M: Remote>(
    config: &Config<R, M>,
    filter: &TargetFilter,
    assume_yes: bool,
) -> Result<RunReport> {
    let targets = config.fleet.select(filter);
    if targets.is_empty() {
        bail!("No deployment targets match {:?}", filter);
    }
    if filter.is_empty() {
        info!("Deploying to all {} target(s)", targets.len());
    } else {
        info!("Deploying to {} of {} target(s)", targets.len(), config.fleet.targets().count());
    }

    let log = ReleaseLog::open(&config.runtime, &config.release_log)?;
    Orchestrator::new(&config.runtime, &config.remote, &config.fleet, &config.wheels)
        .assume_yes(assume_yes)
        .run(&log, &targets)
        .await
}

fn print_report(report: &RunReport) {
    for target in &report.targets {
        match &target.outcome {
            Outcome::Updated {
                installed,
                failed_migrations,
            } => {
                println!("{}: installed {}", target.target, installed.join(", "));
                if *failed_migrations > 0 {
                    println!("  {} migration(s) failed", failed_migrations);
                }
            }
            Outcome::Skipped(reason) => println!("{}: skipped ({})", target.target, reason),
        }
    }
    for target in &report.reloaded {
        println!("{}: reloaded", target);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fleet::Fleet;
    use crate::remote::MockRemote;
    use crate::runtime::MockRuntime;
    use std::path::PathBuf;

    #[tokio::test]
    async fn test_deploy_without_matching_targets() {
        let config = Config {
            runtime: MockRuntime::new(),
            remote: MockRemote::new(),
            wheels: PathBuf::from("/srv/wheels"),
            release_log: PathBuf::from("/srv/wheels/releases.log"),
            fleet: Fleet::default(),
        };
        let filter = TargetFilter {
            host: Some("web1".into()),
            ..Default::default()
        };

        let err = run(&config, &filter, true).await.unwrap_err();
        assert!(err.to_string().contains("No deployment targets"));
    }
}
