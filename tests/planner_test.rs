mod common;

use anyhow::Result;
use exprun::{
    llm::{Completion, ResponseFormat},
    PipelineError, PlanShape, Planner, Stage,
};

use common::{actions, document, ScriptedOracle};

const PREFIX: &str = "python train.py";
const SCRIPT: &str = "import argparse\np = argparse.ArgumentParser()\np.add_argument('--lr', type=float)\n";

#[tokio::test]
async fn test_both_response_shapes_give_the_same_plan() -> Result<()> {
    let commands = ["python train.py --lr 0.1", "python train.py --lr 0.01"];

    let oracle = ScriptedOracle::new(vec![actions(&commands)]);
    let from_actions = Planner::new(oracle, PREFIX, PlanShape::Actions)
        .plan(SCRIPT, "try two learning rates", 3)
        .await?;

    let oracle = ScriptedOracle::new(vec![document(&commands)]);
    let from_document = Planner::new(oracle, PREFIX, PlanShape::Document)
        .plan(SCRIPT, "try two learning rates", 3)
        .await?;

    assert_eq!(from_actions, from_document);
    assert_eq!(from_actions.commands, commands);
    Ok(())
}

#[tokio::test]
async fn test_plan_is_truncated_in_order() -> Result<()> {
    let oracle = ScriptedOracle::new(vec![actions(&[
        "python train.py --lr 1",
        "python train.py --lr 2",
        "python train.py --lr 3",
        "python train.py --lr 4",
    ])]);
    let plan = Planner::new(oracle, PREFIX, PlanShape::Actions).plan(SCRIPT, "sweep", 2).await?;
    assert_eq!(plan.commands, vec!["python train.py --lr 1", "python train.py --lr 2"]);
    Ok(())
}

#[tokio::test]
async fn test_prose_answer_is_an_empty_plan() -> Result<()> {
    let oracle = ScriptedOracle::new(vec![Completion::text("You could try a lower learning rate.")]);
    let plan = Planner::new(oracle, PREFIX, PlanShape::Actions).plan(SCRIPT, "help", 3).await?;
    assert!(plan.is_empty());
    Ok(())
}

#[tokio::test]
async fn test_request_carries_script_request_and_prefix() -> Result<()> {
    let oracle = ScriptedOracle::new(vec![actions(&["python train.py --lr 0.1"])]);
    Planner::new(oracle.clone(), PREFIX, PlanShape::Actions)
        .plan(SCRIPT, "compare learning rates", 3)
        .await?;

    let requests = oracle.requests();
    assert_eq!(requests.len(), 1);
    let request = &requests[0];
    assert!(request.user.contains(SCRIPT));
    assert!(request.user.contains("compare learning rates"));
    assert!(request.system.contains(PREFIX));
    assert!(request.system.contains("at most 3"));
    match &request.format {
        ResponseFormat::Actions(tools) => {
            assert_eq!(tools.len(), 1);
            assert_eq!(tools[0].function.name, "run_safe_command");
        }
        other => panic!("expected actions format, got {other:?}"),
    }
    Ok(())
}

#[tokio::test]
async fn test_document_shape_asks_for_json() -> Result<()> {
    let oracle = ScriptedOracle::new(vec![document(&["python train.py"])]);
    Planner::new(oracle.clone(), PREFIX, PlanShape::Document).plan(SCRIPT, "baseline", 1).await?;
    assert!(matches!(oracle.requests()[0].format, ResponseFormat::JsonObject));
    Ok(())
}

#[tokio::test]
async fn test_oracle_failure_is_a_planning_error() -> Result<()> {
    let oracle = ScriptedOracle::failing("connection reset");
    let err = Planner::new(oracle, PREFIX, PlanShape::Actions)
        .plan(SCRIPT, "anything", 3)
        .await
        .unwrap_err();
    assert!(matches!(err, PipelineError::Oracle { stage: Stage::Planning, .. }));
    Ok(())
}
