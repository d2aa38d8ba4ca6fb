//! System prompts for each oracle call.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DefaultRole {
    /// Plan by calling `run_safe_command` once per experiment.
    PlannerActions,
    /// Plan by returning `{"commands": [...]}`.
    PlannerDocument,
    Analyzer,
    Plotter,
}

pub fn default_role_text(role: DefaultRole, prefix: &str, max_commands: usize) -> String {
    match role {
        DefaultRole::PlannerActions => format!(
            "You are an ML experiment planner.\n\nYour tasks:\n1. Read the provided training script.\n2. Infer valid hyperparameters from its command-line argument definitions.\n3. Generate at most {max_commands} commands as specified by the user's request.\n4. Each command MUST begin with:\n{prefix}\n5. For each command, call the function run_safe_command with:\n{{ \"command\": \"...\" }}\n\nCRITICAL RULES:\n- Output ONLY tool calls.\n- Do NOT summarize.\n- Do NOT produce JSON.\n- Do NOT write explanations.\n- Do NOT use pipes, redirection, environment assignments or chained commands."
        ),
        DefaultRole::PlannerDocument => format!(
            "You are an ML experiment planner.\n\nYour tasks:\n1. Read the provided training script.\n2. Infer valid hyperparameters from its command-line argument definitions.\n3. Generate at most {max_commands} commands as specified by the user's request.\n4. Each command MUST begin with:\n{prefix}\n\nReturn ONLY a JSON object of the form:\n{{ \"commands\": [\"{prefix} --flag value\", ...] }}\n\nDo NOT use pipes, redirection, environment assignments or chained commands."
        ),
        DefaultRole::Analyzer => "You are an ML experiment analyzer.\n\nYou will receive raw experiment results including:\n- command\n- stdout\n- stderr\n- exit_status\n\nYour tasks:\n1. Parse hyperparameters by reading --flags from each command.\n2. Extract accuracy values from stdout (look for patterns like \"acc:\" or \"accuracy\").\n3. Produce a STRICT JSON OBJECT in the exact format below:\n\n{\n  \"experiments\": [\n    {\n      \"run_id\": 1,\n      \"command\": \"...\",\n      \"hyperparameters\": {\"lr\": 0.01},\n      \"accuracy\": 0.97\n    }\n  ],\n  \"summary\": \"...\"\n}\n\nRules:\n- NO extra text.\n- Only valid JSON.\n- One experiment per input result, in input order.\n- Hyperparameters must be numbers.\n- accuracy must be a number, or null when the run produced none.\n- summary is one sentence comparing the configurations.".to_string(),
        DefaultRole::Plotter => "You are a helpful assistant that generates Python code for data visualization. Always return code wrapped in ```python code blocks.".to_string(),
    }
}

/// User message for the planner: the literal script source and the request.
pub fn planner_user_text(script_source: &str, request: &str) -> String {
    format!("Training script:\n{script_source}\n\nUser request:\n{request}\n")
}

/// User message for the plotter.
pub fn plotter_user_text(request: &str, logs: &str, output_path: &str) -> String {
    format!(
        "{request}\n\nHere are the console logs:\n{logs}\n\nPlease generate Python code using matplotlib to create the plot. The code should:\n1. Use matplotlib and numpy\n2. Parse the data from the console logs\n3. Create the requested plot\n4. Save the figure to '{output_path}'\n\nReturn ONLY the Python code, wrapped in ```python code blocks."
    )
}
