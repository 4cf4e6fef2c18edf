use anyhow::Result;
use clap::Parser;
use fleetwheel::commands::{self, ConfigOptions};
use fleetwheel::fleet::TargetFilter;
use std::path::PathBuf;

/// fleetwheel - release Python wheels and deploy them to a fleet of virtualenvs
///
/// Wheels are added to a local wheel store and recorded in an append-only
/// release log. Deploying brings every configured virtualenv up to the
/// newest released versions of its requirements.
///
/// Examples:
///   fleetwheel add-wheel dist/*.whl     # Release new wheels
///   fleetwheel plan --host web1         # Show what would be installed
///   fleetwheel deploy                   # Deploy to every target
#[derive(Parser, Debug)]
#[command(author, version = env!("FLEETWHEEL_VERSION"), about)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Fleet configuration file (also via FLEETWHEEL_CONFIG)
    #[arg(
        long,
        short = 'c',
        env = "FLEETWHEEL_CONFIG",
        value_name = "PATH",
        global = true
    )]
    pub config: Option<PathBuf>,

    /// Local wheel store (overrides the configuration file)
    #[arg(long, env = "FLEETWHEEL_WHEELS", value_name = "PATH", global = true)]
    pub wheels: Option<PathBuf>,

    /// Release log (overrides the configuration file)
    #[arg(long, env = "FLEETWHEEL_RELEASE_LOG", value_name = "PATH", global = true)]
    pub release_log: Option<PathBuf>,
}

impl Cli {
    fn options(&self) -> ConfigOptions {
        ConfigOptions {
            config: self.config.clone(),
            wheels: self.wheels.clone(),
            release_log: self.release_log.clone(),
        }
    }
}

#[derive(clap::Subcommand, Debug)]
enum Commands {
    /// Add wheel files to the wheel store and release them
    AddWheel(AddWheelArgs),

    /// Install the newest releases on the selected targets
    Deploy(DeployArgs),

    /// Show what a deployment would install, without changing anything
    Plan(PlanArgs),

    /// List the newest release of every package
    List,
}

#[derive(clap::Args, Debug)]
pub struct AddWheelArgs {
    /// Wheel files to add
    #[arg(value_name = "PATH", required = true)]
    pub paths: Vec<PathBuf>,
}

#[derive(clap::Args, Debug)]
pub struct FilterArgs {
    /// Only targets on this host
    #[arg(long)]
    pub host: Option<String>,

    /// Only targets owned by this user
    #[arg(long)]
    pub user: Option<String>,

    /// Only the virtualenv at this path
    #[arg(long)]
    pub path: Option<String>,
}

impl From<FilterArgs> for TargetFilter {
    fn from(args: FilterArgs) -> Self {
        TargetFilter {
            user: args.user,
            host: args.host,
            path: args.path,
        }
    }
}

#[derive(clap::Args, Debug)]
pub struct DeployArgs {
    #[command(flatten)]
    pub filter: FilterArgs,

    /// Do not ask for confirmation
    #[arg(long, short = 'y')]
    pub yes: bool,
}

#[derive(clap::Args, Debug)]
pub struct PlanArgs {
    #[command(flatten)]
    pub filter: FilterArgs,

    /// Print the plans as JSON
    #[arg(long)]
    pub json: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let cli = Cli::parse();
    let options = cli.options();
    let runtime = fleetwheel::runtime::RealRuntime;

    match cli.command {
        Commands::AddWheel(args) => commands::add_wheel(runtime, options, &args.paths)?,
        Commands::Deploy(args) => {
            commands::deploy(runtime, options, args.filter.into(), args.yes).await?
        }
        Commands::Plan(args) => {
            commands::plan(runtime, options, args.filter.into(), args.json).await?
        }
        Commands::List => commands::list(runtime, options)?,
    }
    Ok(())
}
