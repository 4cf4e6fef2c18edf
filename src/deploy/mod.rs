//! Getting wheels from the operator's machine onto the fleet.
//!
//! - `intake` - accepting new wheels into the store and release log
//! - `planner` - what a target is missing
//! - `orchestrator` - the deployment run itself

mod intake;
mod orchestrator;
mod planner;

pub use intake::{Intake, IntakeOutcome};
pub use orchestrator::{DeployAborted, Orchestrator, Outcome, RunReport, Step, TargetReport};
pub use planner::{AheadPackage, InstallPlan, Planner};
