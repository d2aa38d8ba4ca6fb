//! Turns (script source, user request) into a bounded list of candidate commands.

use std::{fmt, str::FromStr, sync::Arc};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{
    error::{PipelineError, Stage},
    functions::{command_argument, run_safe_command_schema},
    llm::{Completion, Oracle, OracleRequest, ResponseFormat},
    role::{default_role_text, planner_user_text, DefaultRole},
    utils::fenced_blocks,
};

/// Ordered, unvalidated commands proposed for one request.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Plan {
    pub commands: Vec<String>,
}

impl Plan {
    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    pub fn len(&self) -> usize {
        self.commands.len()
    }
}

/// Which response shape the planner asks for. Both shapes are accepted on the way back.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum PlanShape {
    #[default]
    Actions,
    Document,
}

impl FromStr for PlanShape {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "actions" | "tools" | "tool_calls" => Ok(PlanShape::Actions),
            "document" | "json" => Ok(PlanShape::Document),
            other => Err(format!("unknown planner shape `{other}` (expected actions|document)")),
        }
    }
}

impl fmt::Display for PlanShape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PlanShape::Actions => f.write_str("actions"),
            PlanShape::Document => f.write_str("document"),
        }
    }
}

pub struct Planner {
    oracle: Arc<dyn Oracle>,
    prefix: String,
    shape: PlanShape,
}

impl Planner {
    pub fn new(oracle: Arc<dyn Oracle>, prefix: impl Into<String>, shape: PlanShape) -> Self {
        Self { oracle, prefix: prefix.into(), shape }
    }

    /// Ask the oracle for at most `max_commands` invocations. An answer in
    /// neither known shape yields an empty plan; only a failed oracle call is
    /// an error.
    pub async fn plan(
        &self,
        script_source: &str,
        user_request: &str,
        max_commands: usize,
    ) -> Result<Plan, PipelineError> {
        let (role, format) = match self.shape {
            PlanShape::Actions => (
                DefaultRole::PlannerActions,
                ResponseFormat::Actions(vec![run_safe_command_schema(&self.prefix)]),
            ),
            PlanShape::Document => (DefaultRole::PlannerDocument, ResponseFormat::JsonObject),
        };
        let request = OracleRequest::new(
            default_role_text(role, &self.prefix, max_commands),
            planner_user_text(script_source, user_request),
            format,
        );

        let completion = self
            .oracle
            .complete(request)
            .await
            .map_err(|source| PipelineError::Oracle { stage: Stage::Planning, source })?;

        match collect_commands(&completion) {
            Some(mut commands) => {
                if commands.len() > max_commands {
                    tracing::info!(
                        "oracle proposed {} commands, keeping the first {}",
                        commands.len(),
                        max_commands
                    );
                    commands.truncate(max_commands);
                }
                Ok(Plan { commands })
            }
            None => {
                tracing::warn!(raw = %completion.content, "planner response had no usable commands");
                Ok(Plan::default())
            }
        }
    }
}

/// Commands from either response shape: requested actions first, else a JSON
/// document in the content (bare or fenced).
pub fn collect_commands(completion: &Completion) -> Option<Vec<String>> {
    if !completion.actions.is_empty() {
        let commands: Vec<String> = completion
            .actions
            .iter()
            .filter_map(command_argument)
            .map(|c| c.trim().to_string())
            .filter(|c| !c.is_empty())
            .collect();
        if !commands.is_empty() {
            return Some(commands);
        }
    }

    let content = completion.content.trim();
    if content.is_empty() {
        return None;
    }
    std::iter::once(content.to_string())
        .chain(fenced_blocks(content))
        .find_map(|candidate| commands_from_document(&candidate))
}

fn commands_from_document(text: &str) -> Option<Vec<String>> {
    let value: Value = serde_json::from_str(text.trim()).ok()?;
    let list = match &value {
        Value::Array(items) => items,
        Value::Object(map) => map.get("commands")?.as_array()?,
        _ => return None,
    };
    let commands: Vec<String> = list
        .iter()
        .filter_map(|item| match item {
            Value::String(s) => Some(s.as_str()),
            Value::Object(o) => o.get("command").and_then(Value::as_str),
            _ => None,
        })
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect();
    if commands.is_empty() {
        None
    } else {
        Some(commands)
    }
}
