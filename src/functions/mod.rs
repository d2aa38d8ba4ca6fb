//! The one action the planner may request: `run_safe_command`.

use serde::Deserialize;

use crate::llm::{FunctionCall, FunctionSchema, ToolSchema};

pub const RUN_SAFE_COMMAND: &str = "run_safe_command";

#[derive(Debug, Deserialize)]
struct RunSafeCommandArgs {
    command: String,
}

pub fn run_safe_command_schema(prefix: &str) -> ToolSchema {
    ToolSchema {
        r#type: "function".into(),
        function: FunctionSchema {
            name: RUN_SAFE_COMMAND.into(),
            description: Some(format!(
                "Run one `{prefix} ...` training command and return raw stdout/stderr."
            )),
            parameters: serde_json::json!({
                "type": "object",
                "properties": {
                    "command": {
                        "type": "string",
                        "description": format!("Full command to execute, e.g. '{prefix} --lr 0.001'")
                    }
                },
                "required": ["command"]
            }),
        },
    }
}

/// The `command` argument of a `run_safe_command` call; `None` for any other
/// call or for arguments that are not the expected JSON object.
pub fn command_argument(call: &FunctionCall) -> Option<String> {
    if call.name != RUN_SAFE_COMMAND {
        tracing::debug!(name = %call.name, "ignoring unknown action");
        return None;
    }
    match serde_json::from_str::<RunSafeCommandArgs>(&call.arguments) {
        Ok(args) => Some(args.command),
        Err(e) => {
            tracing::warn!("invalid {} arguments {:?}: {}", RUN_SAFE_COMMAND, call.arguments, e);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn call(name: &str, arguments: &str) -> FunctionCall {
        FunctionCall { name: name.into(), arguments: arguments.into() }
    }

    #[test]
    fn decodes_command_argument() {
        let c = call(RUN_SAFE_COMMAND, r#"{"command": "python train.py --lr 0.1"}"#);
        assert_eq!(command_argument(&c).as_deref(), Some("python train.py --lr 0.1"));
    }

    #[test]
    fn rejects_other_tools_and_bad_json() {
        assert_eq!(command_argument(&call("execute_shell_command", r#"{"command": "ls"}"#)), None);
        assert_eq!(command_argument(&call(RUN_SAFE_COMMAND, "{\"command\": ")), None);
        assert_eq!(command_argument(&call(RUN_SAFE_COMMAND, r#"{"cmd": "x"}"#)), None);
    }

    #[test]
    fn schema_names_the_prefix() {
        let s = run_safe_command_schema("python mnist67/train.py");
        assert_eq!(s.function.name, RUN_SAFE_COMMAND);
        assert!(s.function.description.unwrap().contains("python mnist67/train.py"));
    }
}
