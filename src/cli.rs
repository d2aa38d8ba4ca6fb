use std::path::PathBuf;

use clap::{ArgAction, Args, Parser, Subcommand};

use crate::{orchestrator::PipelineMode, planner::PlanShape};

#[derive(Parser, Debug, Clone)]
#[command(name = "exprun", about = "Plan, run and summarize training experiments", version)]
pub struct Cli {
    /// Large language model to use.
    #[arg(long, global = true)]
    pub model: Option<String>,

    /// More log output on stderr (-v info, -vv debug).
    #[arg(short = 'v', long, action = ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Run experiments described in natural language against the training script.
    Run(RunArgs),
    /// Render a plot from raw training logs with generated code.
    Plot(PlotArgs),
}

#[derive(Args, Debug, Clone)]
pub struct RunArgs {
    /// What to try, e.g. "compare three learning rates". Read from stdin when piped.
    #[arg(value_name = "REQUEST")]
    pub request: Option<String>,

    /// Training script; the only script commands may invoke.
    #[arg(long)]
    pub script: Option<PathBuf>,

    /// Interpreter that runs the training script.
    #[arg(long)]
    pub interpreter: Option<String>,

    /// Upper bound on planned commands.
    #[arg(short = 'n', long = "max-commands")]
    pub max_commands: Option<usize>,

    /// Per-command time budget in seconds.
    #[arg(long)]
    pub timeout: Option<u64>,

    /// single_stage (local report) or two_stage (oracle-structured report).
    #[arg(long, value_parser = clap::value_parser!(PipelineMode))]
    pub mode: Option<PipelineMode>,

    /// Ask the planner for tool-call actions or a JSON document.
    #[arg(long, value_parser = clap::value_parser!(PlanShape))]
    pub shape: Option<PlanShape>,

    /// Print the report as JSON.
    #[arg(long)]
    pub json: bool,

    /// Disable Markdown rendering of the summary.
    #[arg(long = "no-md")]
    pub no_md: bool,
}

#[derive(Args, Debug, Clone)]
pub struct PlotArgs {
    /// What to plot, e.g. "log-log scaling law for validation loss with a line of best fit".
    #[arg(value_name = "REQUEST")]
    pub request: String,

    /// Log file to plot from, `-` for stdin.
    #[arg(long, default_value = "-")]
    pub logs: String,

    /// Output name; the image is written to <PLOT_OUTPUT_DIR>/<name>.png.
    #[arg(long, default_value = "plot")]
    pub name: String,

    /// Directory for the image.
    #[arg(long = "output-dir")]
    pub output_dir: Option<PathBuf>,

    /// Rendering time budget in seconds.
    #[arg(long)]
    pub timeout: Option<u64>,

    /// Also write the generated code next to the image.
    #[arg(long = "save-code")]
    pub save_code: bool,
}

impl Cli {
    pub fn parse() -> Self {
        <Self as Parser>::parse()
    }
}
