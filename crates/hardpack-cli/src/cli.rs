use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

const HELP_TEMPLATE: &str = "\
{before-help}{name} {version}
{author-with-newline}{about-with-newline}
{usage-heading} {usage}

{all-args}{after-help}
";

#[derive(Parser, Debug)]
#[command(
    author = "hardpack developers",
    version,
    about = "hardpack CLI - Monte Carlo simulation of dense hard-sphere and hard-disk packings, with pair correlation measurement.",
    help_template = HELP_TEMPLATE,
)]
#[command(propagate_version = true)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Increase verbosity level (-v for INFO, -vv for DEBUG, -vvv for TRACE)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress all log output
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Write logs to a specified file in addition to the console output
    #[arg(long, global = true, value_name = "PATH")]
    pub log_file: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Fill a periodic domain, relax it with Monte Carlo sweeps and measure g(r).
    Simulate(SimulateArgs),
    /// Fill and sweep a domain while validating the spatial grid bookkeeping.
    Check(CheckArgs),
}

/// Arguments shared by every command that builds a world.
#[derive(Args, Debug, Clone)]
pub struct SystemArgs {
    /// Number of particles.
    #[arg(value_name = "NUM_PARTICLES")]
    pub num_particles: usize,

    /// Fraction of the domain covered by particles.
    #[arg(value_name = "PACKING_DENSITY")]
    pub packing_density: f64,

    /// Path to an optional configuration file in TOML format.
    #[arg(short, long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Simulate disks in a square instead of spheres in a cube.
    #[arg(long)]
    pub two_dimensional: bool,

    /// Requested cell edge length; stretched so whole cells tile the domain.
    #[arg(long, value_name = "FLOAT", conflicts_with = "cell_count")]
    pub cell_size: Option<f64>,

    /// Explicit number of cells per axis.
    #[arg(long, value_name = "INT")]
    pub cell_count: Option<usize>,

    /// Maximum trial displacement; each axis moves by up to half of it.
    #[arg(short, long = "step-size", value_name = "FLOAT")]
    pub step_size: Option<f64>,

    /// Give up filling after this many rejected positions for one particle.
    #[arg(long, value_name = "INT")]
    pub fill_attempts: Option<u64>,

    /// Seed for the random number generator. Random when omitted.
    #[arg(long, value_name = "INT")]
    pub seed: Option<u64>,

    /// Set a specific configuration value, overriding the config file.
    /// Can be used multiple times. Example: -S monte-carlo.step-size=0.2
    #[arg(short = 'S', long = "set", value_name = "KEY=VALUE", num_args(0..))]
    pub set_values: Vec<String>,
}

/// Arguments for the `simulate` subcommand.
#[derive(Args, Debug)]
pub struct SimulateArgs {
    #[command(flatten)]
    pub system: SystemArgs,

    /// Iterations to run before sampling starts.
    #[arg(long, value_name = "INT")]
    pub relax: Option<u64>,

    /// Iterations between two samples. 0 disables measurement.
    #[arg(long, value_name = "INT")]
    pub sample_interval: Option<u64>,

    /// Length of the sampling period in iterations.
    #[arg(long, value_name = "INT", conflicts_with = "sample_forever")]
    pub sample_iterations: Option<u64>,

    /// Keep sampling until the iteration limit or an interrupt.
    #[arg(long)]
    pub sample_forever: bool,

    /// Number of g(r) histogram bins.
    #[arg(long, value_name = "INT")]
    pub bins: Option<usize>,

    /// Largest separation included in g(r).
    #[arg(long, value_name = "FLOAT")]
    pub max_radius: Option<f64>,

    /// Write the g(r) table to this CSV file instead of standard output.
    #[arg(short, long, value_name = "PATH")]
    pub output: Option<PathBuf>,

    /// Stop after this many iterations even if sampling is not finished.
    #[arg(long, value_name = "INT")]
    pub max_iterations: Option<u64>,
}

/// Arguments for the `check` subcommand.
#[derive(Args, Debug)]
pub struct CheckArgs {
    #[command(flatten)]
    pub system: SystemArgs,

    /// Number of Monte Carlo sweeps between the two self-checks.
    #[arg(long, value_name = "INT", default_value_t = 10)]
    pub sweeps: u64,
}
