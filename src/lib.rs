//! Natural-language experiment orchestration for a training script.
//!
//! A request is planned into commands by an [`Oracle`](llm::Oracle), each
//! command passes the [`CommandPolicy`](policy::CommandPolicy) and runs in a
//! child process under a time budget, and the collected output becomes a
//! [`StructuredReport`](report::StructuredReport). [`plot`] is a separate
//! pipeline that turns raw logs into an image through generated code.

pub mod cli;
pub mod config;
pub mod error;
pub mod execution;
pub mod functions;
pub mod handlers;
pub mod llm;
pub mod orchestrator;
pub mod planner;
pub mod plot;
pub mod policy;
pub mod printer;
pub mod process;
pub mod report;
pub mod role;
pub mod utils;

pub use error::{PipelineError, Stage};
pub use execution::{ExecutionResult, Executor, ExitStatus};
pub use orchestrator::{Orchestrator, PipelineMode, RunOutcome, RunSettings, RunState};
pub use planner::{Plan, PlanShape, Planner};
pub use plot::{PlotArtifact, PlotRenderer, PlotSettings};
pub use policy::CommandPolicy;
pub use report::{ExperimentRecord, StructuredReport, Structurer};
