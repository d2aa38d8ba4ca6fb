mod common;

use anyhow::Result;
use exprun::{
    llm::{Completion, ResponseFormat},
    ExecutionResult, ExitStatus, PipelineError, Stage, Structurer,
};

use common::ScriptedOracle;

fn result(command: &str, stdout: &str, exit_status: ExitStatus) -> ExecutionResult {
    ExecutionResult {
        command: command.into(),
        stdout: stdout.into(),
        stderr: String::new(),
        exit_status,
        exit_code: match exit_status {
            ExitStatus::Ok => Some(0),
            ExitStatus::Nonzero => Some(1),
            _ => None,
        },
    }
}

fn two_runs() -> Vec<ExecutionResult> {
    vec![
        result("python train.py --lr 0.1", "epoch 1 val_loss: 0.40\n", ExitStatus::Ok),
        result("python train.py --lr 0.01", "epoch 1 val_loss: 0.05\n", ExitStatus::Ok),
    ]
}

#[tokio::test]
async fn test_raw_fields_come_from_execution_not_oracle() -> Result<()> {
    // The oracle rewrites stdout and commands; none of that may leak into the report.
    let reply = serde_json::json!({
        "experiments": [
            {"run_id": 1, "command": "python train.py --lr 0.1", "hyperparameters": {"lr": 0.1}, "accuracy": null, "stdout": "made up"},
            {"run_id": 2, "command": "python train.py --lr 0.01", "hyperparameters": {"lr": 0.01}, "accuracy": null, "stdout": "made up"}
        ],
        "summary": "The lower learning rate reached a much lower validation loss."
    });
    let oracle = ScriptedOracle::new(vec![Completion::text(reply.to_string())]);
    let inputs = two_runs();

    let report = Structurer::new(oracle.clone()).structure(&inputs).await?;

    assert_eq!(report.experiments.len(), 2);
    for (record, input) in report.experiments.iter().zip(&inputs) {
        assert_eq!(record.command, input.command);
        assert_eq!(record.stdout, input.stdout);
        assert_eq!(record.stderr, input.stderr);
        assert_eq!(record.status, input.exit_status);
        assert_eq!(record.accuracy, None);
    }
    assert_eq!(report.experiments[1].hyperparameters.get("lr"), Some(&0.01));
    assert!(!report.summary.is_empty());

    let request = &oracle.requests()[0];
    assert!(matches!(request.format, ResponseFormat::JsonObject));
    assert!(request.user.contains("val_loss: 0.05"));
    Ok(())
}

#[tokio::test]
async fn test_entries_are_matched_by_command_text() -> Result<()> {
    let reply = serde_json::json!({
        "experiments": [
            {"command": "python train.py --lr 0.01", "hyperparameters": {"lr": 0.01}, "accuracy": 0.93},
            {"command": "python train.py --lr 0.1", "hyperparameters": {"lr": 0.1}, "accuracy": 0.71}
        ],
        "summary": "lr=0.01 wins."
    });
    let oracle = ScriptedOracle::new(vec![Completion::text(reply.to_string())]);

    let report = Structurer::new(oracle).structure(&two_runs()).await?;
    assert_eq!(report.experiments[0].accuracy, Some(0.71));
    assert_eq!(report.experiments[1].accuracy, Some(0.93));
    assert_eq!(report.best().map(|b| b.run_id), Some(2));
    assert_eq!(report.summary, "lr=0.01 wins.");
    Ok(())
}

#[tokio::test]
async fn test_non_numeric_hyperparameters_are_dropped() -> Result<()> {
    let reply = r#"{"experiments": [{"hyperparameters": {"lr": 0.1, "optimizer": "adam"}, "accuracy": 0.5}], "summary": ""}"#;
    let oracle = ScriptedOracle::new(vec![Completion::text(reply)]);
    let inputs = vec![result("python train.py --lr 0.1 --optimizer adam", "acc: 0.5\n", ExitStatus::Ok)];

    let report = Structurer::new(oracle).structure(&inputs).await?;
    let record = &report.experiments[0];
    assert_eq!(record.hyperparameters.get("lr"), Some(&0.1));
    assert!(!record.hyperparameters.contains_key("optimizer"));
    // blank oracle summary falls back to a locally written one
    assert!(!report.summary.is_empty());
    Ok(())
}

#[tokio::test]
async fn test_prose_answer_is_unparseable_with_raw_text() -> Result<()> {
    let prose = "Both runs look fine, the second one is better.";
    let oracle = ScriptedOracle::new(vec![Completion::text(prose)]);

    let err = Structurer::new(oracle).structure(&two_runs()).await.unwrap_err();
    match &err {
        PipelineError::OracleUnparseable { stage, raw } => {
            assert_eq!(*stage, Stage::Structuring);
            assert_eq!(raw, prose);
        }
        other => panic!("unexpected error {other:?}"),
    }
    assert_eq!(err.raw_oracle_text(), Some(prose));
    Ok(())
}

#[tokio::test]
async fn test_string_accuracy_rejects_the_document() -> Result<()> {
    let reply = r#"{"experiments": [{"accuracy": "0.9"}], "summary": "ok"}"#;
    let oracle = ScriptedOracle::new(vec![Completion::text(reply)]);
    let inputs = vec![result("python train.py", "acc: 0.9\n", ExitStatus::Ok)];

    let err = Structurer::new(oracle).structure(&inputs).await.unwrap_err();
    assert!(matches!(err, PipelineError::OracleUnparseable { stage: Stage::Structuring, .. }));
    Ok(())
}
