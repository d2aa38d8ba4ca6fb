//! Planning -> Executing -> Structuring -> Done, with Failed reachable from every stage.
//!
//! One [`Orchestrator`] serves one request: [`Orchestrator::run`] takes it by
//! value. Commands run strictly one after another, in plan order.

use std::{fmt, path::PathBuf, str::FromStr, sync::Arc, time::Duration};

use crate::{
    error::PipelineError,
    execution::{ExecutionResult, Executor},
    llm::Oracle,
    planner::{PlanShape, Planner},
    report::{local_report, local_summary, StructuredReport, Structurer},
    utils::read_script,
};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum PipelineMode {
    /// Plan, execute, then a local report from the fixed log grammar.
    SingleStage,
    /// Plan, execute, then structure the results with a second oracle call.
    #[default]
    TwoStage,
}

impl FromStr for PipelineMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "single_stage" | "single" => Ok(PipelineMode::SingleStage),
            "two_stage" | "two" => Ok(PipelineMode::TwoStage),
            other => Err(format!("unknown pipeline mode `{other}` (expected single_stage|two_stage)")),
        }
    }
}

impl fmt::Display for PipelineMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PipelineMode::SingleStage => f.write_str("single_stage"),
            PipelineMode::TwoStage => f.write_str("two_stage"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Planning,
    Executing,
    Structuring,
    Done,
    Failed,
}

#[derive(Debug, Clone)]
pub struct RunSettings {
    pub max_commands: usize,
    pub command_timeout: Duration,
    pub mode: PipelineMode,
    pub shape: PlanShape,
}

impl Default for RunSettings {
    fn default() -> Self {
        Self {
            max_commands: 3,
            command_timeout: Duration::from_secs(600),
            mode: PipelineMode::default(),
            shape: PlanShape::default(),
        }
    }
}

/// Why a run failed, plus everything it collected before failing.
#[derive(Debug)]
pub struct RunFailure {
    pub stage: RunState,
    pub error: PipelineError,
    pub results: Vec<ExecutionResult>,
}

#[derive(Debug)]
pub enum RunOutcome {
    Done(StructuredReport),
    Failed(RunFailure),
}

impl RunOutcome {
    pub fn state(&self) -> RunState {
        match self {
            RunOutcome::Done(_) => RunState::Done,
            RunOutcome::Failed(_) => RunState::Failed,
        }
    }

    pub fn report(&self) -> Option<&StructuredReport> {
        match self {
            RunOutcome::Done(report) => Some(report),
            RunOutcome::Failed(_) => None,
        }
    }
}

pub struct Orchestrator {
    oracle: Arc<dyn Oracle>,
    executor: Executor,
    settings: RunSettings,
    state: RunState,
}

impl Orchestrator {
    pub fn new(oracle: Arc<dyn Oracle>, executor: Executor, settings: RunSettings) -> Self {
        Self { oracle, executor, settings, state: RunState::Planning }
    }

    pub fn state(&self) -> RunState {
        self.state
    }

    fn enter(&mut self, next: RunState) {
        tracing::debug!(from = ?self.state, to = ?next, "state change");
        self.state = next;
    }

    fn fail(mut self, error: PipelineError, results: Vec<ExecutionResult>) -> RunOutcome {
        let stage = self.state;
        tracing::error!(?stage, "run failed: {}", error);
        self.enter(RunState::Failed);
        RunOutcome::Failed(RunFailure { stage, error, results })
    }

    /// Run experiments for `request` against the script fixed by the executor's policy.
    pub async fn run(self, request: &str) -> RunOutcome {
        let script_path: PathBuf = self.executor.policy().script_path().to_path_buf();
        let script_source = match read_script(&script_path) {
            Ok(s) => s,
            Err(e) => return self.fail(e, Vec::new()),
        };
        self.run_with_source(&script_source, request).await
    }

    /// Same as [`run`](Self::run) with the script source already in hand.
    pub async fn run_with_source(mut self, script_source: &str, request: &str) -> RunOutcome {
        tracing::info!(mode = %self.settings.mode, "planning");
        let planner = Planner::new(
            self.oracle.clone(),
            self.executor.policy().prefix(),
            self.settings.shape,
        );
        let plan = match planner.plan(script_source, request, self.settings.max_commands).await {
            Ok(plan) => plan,
            Err(e) => return self.fail(e, Vec::new()),
        };
        if plan.is_empty() {
            self.enter(RunState::Done);
            return RunOutcome::Done(StructuredReport::empty(local_summary(&[])));
        }
        tracing::info!("planned {} commands", plan.len());

        self.enter(RunState::Executing);
        let mut results = Vec::with_capacity(plan.len());
        for command in &plan.commands {
            let result = if self.executor.policy().is_admissible(command) {
                self.executor.execute(command, self.settings.command_timeout).await
            } else {
                tracing::warn!(%command, "blocked inadmissible command");
                ExecutionResult::blocked(command)
            };
            tracing::info!(%command, status = %result.exit_status, "executed");
            results.push(result);
        }

        self.enter(RunState::Structuring);
        let report = match self.settings.mode {
            PipelineMode::SingleStage => local_report(&results),
            PipelineMode::TwoStage => {
                match Structurer::new(self.oracle.clone()).structure(&results).await {
                    Ok(report) => report,
                    Err(e) => return self.fail(e, results),
                }
            }
        };

        self.enter(RunState::Done);
        RunOutcome::Done(report)
    }
}
