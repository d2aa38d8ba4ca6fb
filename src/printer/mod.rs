//! Printers: colored report table and markdown summary (termimad).

use owo_colors::OwoColorize;
use termimad::MadSkin;

use crate::{
    execution::ExitStatus,
    orchestrator::RunFailure,
    report::StructuredReport,
};

pub struct TextPrinter {
    pub color: Option<String>,
}

impl TextPrinter {
    pub fn print(&self, text: &str) {
        match self.color.as_deref() {
            Some("green") => println!("{}", text.green()),
            Some("cyan") => println!("{}", text.cyan()),
            Some("magenta") => println!("{}", text.magenta()),
            Some("yellow") => println!("{}", text.yellow()),
            _ => println!("{}", text),
        }
    }
}

#[derive(Default)]
pub struct MarkdownPrinter {
    pub skin: MadSkin,
}

impl MarkdownPrinter {
    pub fn print(&self, text: &str) {
        self.skin.print_text(text);
        println!();
    }
}

fn status_label(status: ExitStatus) -> String {
    let text = format!("{:<9}", status.to_string());
    match status {
        ExitStatus::Ok => text.green().to_string(),
        ExitStatus::Nonzero => text.red().to_string(),
        ExitStatus::TimedOut => text.yellow().to_string(),
        ExitStatus::Blocked => text.magenta().to_string(),
    }
}

pub fn print_report(report: &StructuredReport, markdown: bool) {
    if !report.experiments.is_empty() {
        let best = report.best().map(|b| b.run_id);
        println!("{}", "Experiments".bold());
        for e in &report.experiments {
            let params = e
                .hyperparameters
                .iter()
                .map(|(k, v)| format!("{k}={v}"))
                .collect::<Vec<_>>()
                .join(" ");
            let acc = e.accuracy.map_or_else(|| "-".to_string(), |a| format!("{a:.4}"));
            let marker = if Some(e.run_id) == best { "*" } else { " " };
            println!(
                "{marker}{:>3}  {}  acc {:>8}  {}",
                e.run_id,
                status_label(e.status),
                acc,
                params.dimmed()
            );
            println!("      {}", e.command.cyan());
        }
        println!();
    }

    println!("{}", "Summary".bold());
    if markdown {
        MarkdownPrinter::default().print(&report.summary);
    } else {
        println!("{}", report.summary);
    }
}

pub fn print_failure(failure: &RunFailure) {
    eprintln!("{} {} ({:?})", "error:".red().bold(), failure.error, failure.stage);
    if let Some(raw) = failure.error.raw_oracle_text() {
        eprintln!("{}", "raw oracle response:".yellow());
        eprintln!("{}", raw);
    }
    if !failure.results.is_empty() {
        eprintln!("{}", "collected results:".yellow());
        match serde_json::to_string_pretty(&failure.results) {
            Ok(json) => println!("{}", json),
            Err(e) => eprintln!("could not serialize results: {}", e),
        }
    }
}
