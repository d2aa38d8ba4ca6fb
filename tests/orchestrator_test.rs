mod common;

use std::time::Duration;

use anyhow::Result;
use exprun::{
    llm::Completion, CommandPolicy, Executor, ExitStatus, Orchestrator, PipelineError, PipelineMode,
    RunOutcome, RunSettings, RunState, Stage,
};

use common::{actions, write_script, ScriptedOracle};

const TRAIN: &str = "case \"$2\" in\n  fail) echo crashed >&2; exit 2 ;;\n  *) echo \"lr $2 acc: 0.8\" ;;\nesac\n";

fn settings(mode: PipelineMode) -> RunSettings {
    RunSettings { command_timeout: Duration::from_secs(20), mode, ..RunSettings::default() }
}

#[tokio::test]
async fn test_prose_plan_finishes_with_empty_report() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let script = write_script(dir.path(), "train.sh", TRAIN);
    let executor = Executor::new(CommandPolicy::new("sh", &script));
    let oracle = ScriptedOracle::new(vec![Completion::text("I think the defaults are already good.")]);

    let orchestrator = Orchestrator::new(oracle.clone(), executor.clone(), settings(PipelineMode::TwoStage));
    assert_eq!(orchestrator.state(), RunState::Planning);
    let outcome = orchestrator.run("is the model any good?").await;

    assert_eq!(outcome.state(), RunState::Done);
    let report = outcome.report().expect("done run has a report");
    assert!(report.experiments.is_empty());
    assert!(!report.summary.is_empty());
    assert_eq!(executor.spawned(), 0);
    assert_eq!(oracle.requests().len(), 1);
    Ok(())
}

#[tokio::test]
async fn test_every_planned_command_gets_a_result_in_order() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let script = write_script(dir.path(), "train.sh", TRAIN);
    let prefix = format!("sh {}", script.display());
    let executor = Executor::new(CommandPolicy::new("sh", &script));

    let planned = [
        format!("{prefix} --lr 0.1"),
        "rm -rf /".to_string(),
        format!("{prefix} --lr fail"),
    ];
    let planned_refs: Vec<&str> = planned.iter().map(String::as_str).collect();
    let structured = serde_json::json!({
        "experiments": [
            {"command": planned[0], "hyperparameters": {"lr": 0.1}, "accuracy": 0.8},
            {"command": planned[1], "hyperparameters": {}, "accuracy": null},
            {"command": planned[2], "hyperparameters": {}, "accuracy": null}
        ],
        "summary": "Only the first configuration trained successfully."
    });
    let oracle = ScriptedOracle::new(vec![
        actions(&planned_refs),
        Completion::text(structured.to_string()),
    ]);

    let outcome = Orchestrator::new(oracle.clone(), executor.clone(), settings(PipelineMode::TwoStage))
        .run("try a few learning rates")
        .await;

    let report = outcome.report().expect("run should finish");
    let statuses: Vec<ExitStatus> = report.experiments.iter().map(|e| e.status).collect();
    assert_eq!(statuses, vec![ExitStatus::Ok, ExitStatus::Blocked, ExitStatus::Nonzero]);
    let commands: Vec<&str> = report.experiments.iter().map(|e| e.command.as_str()).collect();
    assert_eq!(commands, planned_refs);
    assert!(report.experiments[0].stdout.contains("acc: 0.8"));
    assert!(report.experiments[2].stderr.contains("crashed"));
    assert_eq!(executor.spawned(), 2);

    let requests = oracle.requests();
    assert_eq!(requests.len(), 2);
    assert!(requests[0].user.contains("exit 2"), "planner sees the script source");
    Ok(())
}

#[tokio::test]
async fn test_single_stage_reports_locally() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let script = write_script(dir.path(), "train.sh", TRAIN);
    let prefix = format!("sh {}", script.display());
    let executor = Executor::new(CommandPolicy::new("sh", &script));
    let oracle = ScriptedOracle::new(vec![actions(&[format!("{prefix} --lr 0.05").as_str()])]);

    let outcome = Orchestrator::new(oracle.clone(), executor, settings(PipelineMode::SingleStage))
        .run("one quick run")
        .await;

    let report = outcome.report().expect("run should finish");
    assert_eq!(report.experiments.len(), 1);
    let record = &report.experiments[0];
    assert_eq!(record.accuracy, Some(0.8));
    assert_eq!(record.hyperparameters.get("lr"), Some(&0.05));
    assert!(report.summary.contains("0.8"));
    assert_eq!(oracle.requests().len(), 1);
    Ok(())
}

#[tokio::test]
async fn test_structuring_failure_keeps_raw_results() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let script = write_script(dir.path(), "train.sh", TRAIN);
    let prefix = format!("sh {}", script.display());
    let executor = Executor::new(CommandPolicy::new("sh", &script));
    let oracle = ScriptedOracle::new(vec![
        actions(&[format!("{prefix} --lr 0.1").as_str(), format!("{prefix} --lr 0.2").as_str()]),
        Completion::text("Sorry, I cannot produce JSON right now."),
    ]);

    let outcome = Orchestrator::new(oracle, executor, settings(PipelineMode::TwoStage))
        .run("two runs")
        .await;

    let RunOutcome::Failed(failure) = outcome else {
        panic!("structuring should have failed");
    };
    assert_eq!(failure.stage, RunState::Structuring);
    assert!(matches!(failure.error, PipelineError::OracleUnparseable { stage: Stage::Structuring, .. }));
    assert_eq!(failure.error.raw_oracle_text(), Some("Sorry, I cannot produce JSON right now."));
    assert_eq!(failure.results.len(), 2);
    assert!(failure.results.iter().all(|r| r.is_ok()));
    Ok(())
}

#[tokio::test]
async fn test_missing_script_fails_before_planning() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let executor = Executor::new(CommandPolicy::new("sh", dir.path().join("nope.sh")));
    let oracle = ScriptedOracle::new(vec![]);

    let outcome = Orchestrator::new(oracle.clone(), executor, RunSettings::default())
        .run("anything")
        .await;

    let RunOutcome::Failed(failure) = outcome else {
        panic!("missing script must fail the run");
    };
    assert_eq!(failure.stage, RunState::Planning);
    assert!(matches!(failure.error, PipelineError::ScriptUnavailable { .. }));
    assert!(failure.results.is_empty());
    assert!(oracle.requests().is_empty());
    Ok(())
}

#[tokio::test]
async fn test_planner_transport_error_fails_in_planning() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let script = write_script(dir.path(), "train.sh", TRAIN);
    let executor = Executor::new(CommandPolicy::new("sh", &script));
    let oracle = ScriptedOracle::failing("503 from upstream");

    let outcome = Orchestrator::new(oracle, executor.clone(), RunSettings::default())
        .run("anything")
        .await;

    let RunOutcome::Failed(failure) = outcome else {
        panic!("oracle error must fail the run");
    };
    assert_eq!(failure.stage, RunState::Planning);
    assert!(matches!(failure.error, PipelineError::Oracle { stage: Stage::Planning, .. }));
    assert_eq!(executor.spawned(), 0);
    Ok(())
}
