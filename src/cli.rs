use clap::{Parser, Subcommand, ValueEnum};
use clap_complete::Shell;
use reconcile::ConflictPolicy;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "weaver")]
#[command(version)]
#[command(about = "Declarative network fabric topology engine", long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Verbosity level
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress non-essential output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Config file (default: ~/.config/weaver/config.toml)
    #[arg(long, global = true, env = "WEAVER_CONFIG")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Validate a fabric spec without touching anything
    Validate(SpecArgs),

    /// Compute and preview the reconciliation plan
    Plan(PlanArgs),

    /// Reconcile the inventory onto the spec
    Apply(ApplyArgs),

    /// Report drift between the inventory and the last apply
    Drift(SpecArgs),

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

#[derive(Parser)]
pub struct SpecArgs {
    /// Path to the fabric spec (TOML)
    pub spec: PathBuf,
}

#[derive(Parser)]
pub struct PlanArgs {
    /// Path to the fabric spec (TOML)
    pub spec: PathBuf,

    /// How to settle externally-edited managed fields
    #[arg(long, value_enum)]
    pub policy: Option<PolicyArg>,

    /// Delete externally referenced objects instead of orphaning them
    #[arg(long)]
    pub force_delete: bool,
}

#[derive(Parser)]
pub struct ApplyArgs {
    /// Path to the fabric spec (TOML)
    pub spec: PathBuf,

    /// Preview only; touch nothing
    #[arg(short = 'n', long)]
    pub dry_run: bool,

    /// Parallel operations per batch
    #[arg(short, long)]
    pub jobs: Option<usize>,

    /// Skip the confirmation prompt for large delete sets
    #[arg(short, long)]
    pub yes: bool,

    /// Approval token from a previously blocked plan
    #[arg(long)]
    pub approve: Option<String>,

    /// How to settle externally-edited managed fields
    #[arg(long, value_enum)]
    pub policy: Option<PolicyArg>,

    /// Delete externally referenced objects instead of orphaning them
    #[arg(long)]
    pub force_delete: bool,
}

/// CLI-side mirror of [`ConflictPolicy`].
#[derive(Clone, Copy, ValueEnum)]
pub enum PolicyArg {
    /// Keep the external value and stop managing the field
    PreserveExternal,
    /// Reassert the desired value
    ForceDesired,
    /// Refuse to plan while conflicts exist
    Fail,
}

impl From<PolicyArg> for ConflictPolicy {
    fn from(arg: PolicyArg) -> Self {
        match arg {
            PolicyArg::PreserveExternal => Self::PreserveExternal,
            PolicyArg::ForceDesired => Self::ForceDesired,
            PolicyArg::Fail => Self::Fail,
        }
    }
}
