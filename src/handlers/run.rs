//! `exprun run`: plan, execute and report experiments.

use std::{
    io::{self, Read},
    sync::Arc,
    time::Duration,
};

use anyhow::{anyhow, bail, Context, Result};
use is_terminal::IsTerminal;

use crate::{
    cli::RunArgs,
    config::Config,
    execution::Executor,
    llm::Oracle,
    orchestrator::{Orchestrator, PipelineMode, RunOutcome, RunSettings},
    planner::PlanShape,
    policy::CommandPolicy,
    printer::{print_failure, print_report},
};

pub async fn run(args: RunArgs, cfg: &Config, oracle: Arc<dyn Oracle>) -> Result<()> {
    let request = resolve_request(args.request.as_deref())?;
    if request.trim().is_empty() {
        bail!("Provide an experiment request as an argument or via stdin");
    }

    let policy = policy_from(cfg, &args);
    let settings = settings_from(cfg, &args)?;
    let markdown = !args.no_md && cfg.get_bool("PRETTIFY_MARKDOWN");
    tracing::info!(prefix = policy.prefix(), max = settings.max_commands, "starting run");

    let orchestrator = Orchestrator::new(oracle, Executor::new(policy), settings);
    match orchestrator.run(&request).await {
        RunOutcome::Done(report) => {
            if args.json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                print_report(&report, markdown);
            }
            Ok(())
        }
        RunOutcome::Failed(failure) => {
            print_failure(&failure);
            Err(anyhow!("experiment run failed during {:?}", failure.stage))
        }
    }
}

fn resolve_request(arg: Option<&str>) -> Result<String> {
    // stdin handling (pipe support), prepended to the positional request
    let mut from_stdin = String::new();
    if !io::stdin().is_terminal() {
        io::stdin()
            .read_to_string(&mut from_stdin)
            .context("reading request from stdin")?;
    }
    let arg = arg.unwrap_or_default();
    Ok(match (from_stdin.trim().is_empty(), arg.is_empty()) {
        (false, false) => format!("{}\n\n{}", from_stdin.trim(), arg),
        (false, true) => from_stdin.trim().to_string(),
        _ => arg.to_string(),
    })
}

fn policy_from(cfg: &Config, args: &RunArgs) -> CommandPolicy {
    let base = CommandPolicy::from_config(cfg);
    let interpreter = args.interpreter.clone().unwrap_or_else(|| base.interpreter().to_string());
    let script = args.script.clone().unwrap_or_else(|| base.script_path().to_path_buf());
    CommandPolicy::new(interpreter, script)
}

pub fn settings_from(cfg: &Config, args: &RunArgs) -> Result<RunSettings> {
    let defaults = RunSettings::default();
    let mode = match args.mode {
        Some(m) => m,
        None => cfg
            .get("PIPELINE_MODE")
            .map(|s| s.parse::<PipelineMode>())
            .transpose()
            .map_err(|e| anyhow!("PIPELINE_MODE: {e}"))?
            .unwrap_or(defaults.mode),
    };
    let shape = match args.shape {
        Some(s) => s,
        None => cfg
            .get("PLANNER_SHAPE")
            .map(|s| s.parse::<PlanShape>())
            .transpose()
            .map_err(|e| anyhow!("PLANNER_SHAPE: {e}"))?
            .unwrap_or(defaults.shape),
    };
    let max_commands = args
        .max_commands
        .or_else(|| cfg.get_usize("MAX_COMMANDS"))
        .unwrap_or(defaults.max_commands);
    if max_commands == 0 {
        bail!("max commands must be at least 1");
    }
    let command_timeout = args
        .timeout
        .or_else(|| cfg.get_u64("COMMAND_TIMEOUT"))
        .map(Duration::from_secs)
        .unwrap_or(defaults.command_timeout);

    Ok(RunSettings { max_commands, command_timeout, mode, shape })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args() -> RunArgs {
        RunArgs {
            request: None,
            script: None,
            interpreter: None,
            max_commands: None,
            timeout: None,
            mode: None,
            shape: None,
            json: false,
            no_md: false,
        }
    }

    #[test]
    fn flags_override_config() {
        let cfg = Config::from_pairs([("PIPELINE_MODE", "single_stage"), ("MAX_COMMANDS", "4")]);
        let s = settings_from(&cfg, &args()).unwrap();
        assert_eq!(s.mode, PipelineMode::SingleStage);
        assert_eq!(s.max_commands, 4);
        assert_eq!(s.shape, PlanShape::Actions);

        let mut a = args();
        a.max_commands = Some(2);
        a.mode = Some(PipelineMode::TwoStage);
        a.timeout = Some(5);
        let s = settings_from(&cfg, &a).unwrap();
        assert_eq!(s.mode, PipelineMode::TwoStage);
        assert_eq!(s.max_commands, 2);
        assert_eq!(s.command_timeout, Duration::from_secs(5));
    }

    #[test]
    fn bad_config_values_are_errors() {
        let cfg = Config::from_pairs([("PLANNER_SHAPE", "yaml")]);
        assert!(settings_from(&cfg, &args()).is_err());
    }

    #[test]
    fn policy_uses_cli_script() {
        let cfg = Config::from_pairs([("TRAIN_INTERPRETER", "python3")]);
        let mut a = args();
        a.script = Some("mnist67/train.py".into());
        assert_eq!(policy_from(&cfg, &a).prefix(), "python3 mnist67/train.py");
    }
}
