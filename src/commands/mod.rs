//! Entry points for the command line, one module per subcommand.
//!
//! Each command builds a [`Config`] from the given options and hands it to a
//! `run` function that tests can call with mocked collaborators.

mod add_wheel;
pub mod config;
mod deploy;
mod list;
mod paths;
mod plan;

pub use add_wheel::add_wheel;
pub use config::{Config, ConfigOptions};
pub use deploy::deploy;
pub use list::list;
pub use paths::default_config_path;
pub use plan::{TargetPlan, plan};
