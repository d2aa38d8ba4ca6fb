//! `exprun plot`: turn raw logs into an image through generated code.

use std::{fs, sync::Arc, time::Duration};

use anyhow::{Context, Result};

use crate::{
    cli::PlotArgs,
    config::Config,
    error::PipelineError,
    llm::Oracle,
    plot::{PlotRenderer, PlotSettings},
    printer::TextPrinter,
    utils::read_logs,
};

pub async fn run(args: PlotArgs, cfg: &Config, oracle: Arc<dyn Oracle>) -> Result<()> {
    let logs = read_logs(&args.logs)?;
    let mut settings = PlotSettings::from_config(cfg);
    if let Some(dir) = args.output_dir.clone() {
        settings.output_dir = dir;
    }
    if let Some(secs) = args.timeout {
        settings.timeout = Duration::from_secs(secs);
    }

    let renderer = PlotRenderer::new(oracle, settings);
    let artifact = match renderer.render(&logs, &args.request, &args.name).await {
        Ok(a) => a,
        Err(e) => {
            report_error(&e);
            return Err(e).context("plot rendering failed");
        }
    };

    let printer = TextPrinter { color: cfg.get("DEFAULT_COLOR") };
    printer.print(&format!("Plot saved to {}", artifact.path.display()));
    if args.save_code {
        let code_path = artifact.path.with_extension("py");
        fs::write(&code_path, &artifact.code)
            .with_context(|| format!("writing {}", code_path.display()))?;
        printer.print(&format!("Code saved to {}", code_path.display()));
    }
    Ok(())
}

fn report_error(e: &PipelineError) {
    match e {
        PipelineError::OracleUnparseable { raw, .. } => {
            eprintln!("No code block in the oracle response:\n{}", raw);
        }
        PipelineError::ArtifactMissing { stdout, stderr, .. } => {
            if !stdout.is_empty() {
                eprintln!("----- STDOUT -----\n{}", stdout);
            }
            if !stderr.is_empty() {
                eprintln!("----- STDERR -----\n{}", stderr);
            }
        }
        PipelineError::Timeout { stderr, .. } | PipelineError::NonZeroExit { stderr, .. } => {
            eprintln!("----- STDERR -----\n{}", stderr);
        }
        _ => {}
    }
}
