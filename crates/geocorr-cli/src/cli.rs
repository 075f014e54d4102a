use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use geocorr_core::config::{parse_extrapolation_policy, parse_label_list, CliConfigOverrides};
use std::path::PathBuf;

/// geocorr - Correlate geophysics survey lines with borehole logs and lab results
#[derive(Parser, Debug)]
#[command(name = "geocorr")]
#[command(about = "Correlate geophysics survey lines with borehole logs and lab results", long_about = None)]
#[command(version)]
pub struct Cli {
    /// Output results in JSON format
    #[arg(long, global = true)]
    pub json: bool,

    /// TOML configuration file
    #[arg(long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run registration, consistency merge and lab merge
    Run(RunArgs),

    /// Register boreholes against survey lines only
    Register(RegisterArgs),

    /// Inspect or clear the persistent cache
    Cache(CacheArgs),

    /// Show the effective configuration and where each value comes from
    Config(ConfigArgs),
}

/// Input tables; each path is a CSV file or a directory of CSV files
#[derive(Args, Debug)]
pub struct InputArgs {
    /// Geophysics sample tables
    #[arg(long, short = 'g', required = true, num_args = 1..)]
    pub geophysics: Vec<PathBuf>,

    /// Borehole interpretation tables
    #[arg(long, short = 'b', required = true, num_args = 1..)]
    pub boreholes: Vec<PathBuf>,

    /// Lab summary tables
    #[arg(long, short = 'l', num_args = 1..)]
    pub lab: Vec<PathBuf>,
}

/// Parameter overrides; they take precedence over environment and file values
#[derive(Args, Debug, Default)]
pub struct ParamArgs {
    /// Maximum distance past a line end for extrapolated matches
    #[arg(long, value_name = "METRES")]
    pub tangent_threshold: Option<f64>,

    /// Maximum perpendicular offset from the line
    #[arg(long, value_name = "METRES")]
    pub perpendicular_threshold: Option<f64>,

    /// Half-width of the chainage window read around each borehole
    #[arg(long, value_name = "METRES")]
    pub chainage_range: Option<f64>,

    /// Tolerance on interval boundaries when matching lab depths
    #[arg(long, value_name = "METRES")]
    pub lab_depth_tolerance: Option<f64>,

    /// Comma separated consistency labels to rank first (e.g. "H,VSt,St")
    #[arg(long, value_name = "LABELS")]
    pub consistency_order: Option<String>,

    /// Treatment of extrapolated matches: include, exclude or downweight:<weight>
    #[arg(long, value_name = "POLICY")]
    pub extrapolation: Option<String>,

    /// Keep only samples whose velocity is a multiple of this interval
    #[arg(long, value_name = "M/S")]
    pub velocity_interval: Option<f64>,

    /// Number of parallel workers
    #[arg(long)]
    pub workers: Option<usize>,

    /// Directory of the persistent cache
    #[arg(long, value_name = "DIR")]
    pub cache_dir: Option<PathBuf>,
}

impl ParamArgs {
    pub fn overrides(&self) -> Result<CliConfigOverrides> {
        let extrapolation = match &self.extrapolation {
            Some(policy) => Some(parse_extrapolation_policy(policy)?),
            None => None,
        };

        Ok(CliConfigOverrides {
            tangent_threshold: self.tangent_threshold,
            perpendicular_threshold: self.perpendicular_threshold,
            chainage_range: self.chainage_range,
            lab_depth_tolerance: self.lab_depth_tolerance,
            consistency_order: self.consistency_order.as_deref().map(parse_label_list),
            extrapolation,
            velocity_interval: self.velocity_interval,
            workers: self.workers,
            cache_dir: self.cache_dir.clone(),
        })
    }
}

#[derive(Parser, Debug)]
pub struct RunArgs {
    #[command(flatten)]
    pub inputs: InputArgs,

    #[command(flatten)]
    pub params: ParamArgs,

    /// Directory for the result tables and run summary
    #[arg(long, short = 'o', default_value = "geocorr-out")]
    pub output: PathBuf,
}

#[derive(Parser, Debug)]
pub struct RegisterArgs {
    /// Geophysics sample tables
    #[arg(long, short = 'g', required = true, num_args = 1..)]
    pub geophysics: Vec<PathBuf>,

    /// Borehole interpretation tables
    #[arg(long, short = 'b', required = true, num_args = 1..)]
    pub boreholes: Vec<PathBuf>,

    #[command(flatten)]
    pub params: ParamArgs,

    /// Write the registration table to this CSV file
    #[arg(long, short = 'o', value_name = "FILE")]
    pub output: Option<PathBuf>,
}

#[derive(Parser, Debug)]
pub struct CacheArgs {
    /// Cache directory (defaults to the configured cache_dir)
    #[arg(long, value_name = "DIR")]
    pub cache_dir: Option<PathBuf>,

    #[command(subcommand)]
    pub command: CacheCommands,
}

#[derive(Subcommand, Debug)]
pub enum CacheCommands {
    /// Show entry count and size of the persistent cache
    Stats,

    /// Remove every cached entry
    Clear,
}

#[derive(Parser, Debug)]
pub struct ConfigArgs {
    #[command(flatten)]
    pub params: ParamArgs,
}
