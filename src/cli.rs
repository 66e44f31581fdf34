//! Command-line surface: `clap` derive, `-v`/`-q` verbosity flags plus one
//! override flag per field `Config::with_overrides` accepts.

use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(name = "cqi-pipeline")]
#[command(about = "Collaboration Quality Index analysis pipeline")]
#[command(version)]
pub struct Cli {
    /// Increase log verbosity (-v, -vv)
    #[arg(short = 'v', long, action = clap::ArgAction::Count)]
    pub verbosity: u8,

    /// Suppress all but error-level logging
    #[arg(short = 'q', long)]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run analysis for one exercise against fixed/in-memory collaborators
    Analyze(AnalyzeArgs),
    /// Print the effective configuration (env + overrides) and exit
    ShowConfig,
}

#[derive(clap::Args, Debug, Clone)]
pub struct AnalyzeArgs {
    /// Exercise identifier to analyze
    #[arg(long)]
    pub exercise_id: String,

    /// Override CQI_AI_ENABLED
    #[arg(long)]
    pub ai_enabled: Option<bool>,

    /// Override CQI_AI_MODEL
    #[arg(long)]
    pub ai_model: Option<String>,

    /// Override CQI_AI_BASE_URL
    #[arg(long)]
    pub ai_base_url: Option<String>,

    /// Override CQI_ORCHESTRATOR_WORKERS
    #[arg(long)]
    pub orchestrator_workers: Option<usize>,

    /// Override CQI_AI_WORKERS
    #[arg(long)]
    pub ai_workers: Option<usize>,

    /// Override CQI_PENALTIES_ENABLED
    #[arg(long)]
    pub penalties_enabled: Option<bool>,
}
