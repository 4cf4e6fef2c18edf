use anyhow::{Result, bail};
use log::warn;
use serde::Serialize;

use crate::{
    deploy::{InstallPlan, Planner},
    fleet::TargetFilter,
    release::ReleaseLog,
    remote::Remote,
    runtime::Runtime,
};

use super::config::{Config, ConfigOptions};

#[derive(Debug, Serialize)]
pub struct TargetPlan {
    pub target: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub plan: Option<InstallPlan>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Show what a deployment would do, without changing anything
#[tracing::instrument(skip(runtime, options))]
pub async fn plan<R: Runtime>(
    runtime: R,
    options: ConfigOptions,
    filter: TargetFilter,
    json: bool,
) -> Result<()> {
    let config = Config::new(runtime, options)?;
    let plans = run(&config, &filter).await?;
    if json {
        println!("{}", serde_json::to_string_pretty(&plans)?);
    } else {
        print_plans(&plans);
    }
    Ok(())
}

pub(crate) async fn run<R: Runtime, M: Remote>(
    config: &Config<R, M>,
    filter: &TargetFilter,
) -> Result<Vec<TargetPlan>> {
    let targets = config.fleet.select(filter);
    if targets.is_empty() {
        bail!("No deployment targets match {:?}", filter);
    }

    let log = ReleaseLog::open(&config.runtime, &config.release_log)?;
    let planner = Planner::new(&config.remote, &config.fleet.always_install);

    let mut plans = Vec::new();
    for target in &targets {
        let (plan, error) = match planner.plan(target, log.catalog()).await {
            Ok(plan) => (Some(plan), None),
            Err(e) => {
                warn!("{}: {:#}", target.id(), e);
                (None, Some(format!("{:#}", e)))
            }
        };
        plans.push(TargetPlan {
            target: target.id(),
            plan,
            error,
        });
    }
    Ok(plans)
}

fn print_plans(plans: &[TargetPlan]) {
    for entry in plans {
        let Some(plan) = &entry.plan else {
            println!("{}: {}", entry.target, entry.error.as_deref().unwrap_or("unknown error"));
            continue;
        };
        println!("{} (python {})", entry.target, plan.interpreter);
        if plan.is_up_to_date() && plan.missing.is_empty() {
            println!("  up to date");
        }
        for wheel in &plan.installables {
            println!("  install {}", wheel);
        }
        for package in &plan.missing {
            println!("  missing {}", package);
        }
        for ahead in &plan.ahead {
            println!(
                "  ahead   {} (released {}, {})",
                ahead.installed, ahead.released, ahead.wheel
            );
        }
    }
}
