//! Structured reports over a batch of executed commands.
//!
//! Two ways to build one: [`Structurer`] asks the oracle (hyperparameters and
//! accuracy by its judgement), [`local_report`] uses the fixed grammar in
//! [`extract`]. In both, `command`, `stdout` and `stderr` of each record are
//! copied from the execution results, never from oracle text.

use std::{collections::BTreeMap, sync::Arc};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{
    error::{PipelineError, Stage},
    execution::{ExecutionResult, ExitStatus},
    llm::{Oracle, OracleRequest, ResponseFormat},
    role::{default_role_text, DefaultRole},
};

pub mod extract;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExperimentRecord {
    pub run_id: usize,
    pub command: String,
    pub hyperparameters: BTreeMap<String, f64>,
    pub accuracy: Option<f64>,
    pub status: ExitStatus,
    pub stdout: String,
    pub stderr: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StructuredReport {
    pub experiments: Vec<ExperimentRecord>,
    pub summary: String,
}

impl StructuredReport {
    pub fn empty(summary: impl Into<String>) -> Self {
        Self { experiments: Vec::new(), summary: summary.into() }
    }

    /// Record with the highest accuracy, if any run reported one.
    pub fn best(&self) -> Option<&ExperimentRecord> {
        best_of(&self.experiments).map(|(e, _)| e)
    }
}

/// What the oracle must return. Unknown fields are ignored; a non-numeric
/// `accuracy` or a missing `experiments`/`summary` rejects the whole document.
#[derive(Debug, Deserialize)]
struct WireReport {
    experiments: Vec<WireExperiment>,
    summary: String,
}

#[derive(Debug, Deserialize)]
struct WireExperiment {
    #[serde(default)]
    command: Option<String>,
    #[serde(default)]
    hyperparameters: serde_json::Map<String, Value>,
    #[serde(default)]
    accuracy: Option<f64>,
}

#[derive(Serialize)]
struct RawResult<'a> {
    command: &'a str,
    stdout: &'a str,
    stderr: &'a str,
    exit_status: ExitStatus,
}

pub struct Structurer {
    oracle: Arc<dyn Oracle>,
}

impl Structurer {
    pub fn new(oracle: Arc<dyn Oracle>) -> Self {
        Self { oracle }
    }

    /// Send all raw results to the oracle in strict JSON mode and validate the
    /// answer. Not retried: an unusable answer comes back as
    /// [`PipelineError::OracleUnparseable`] with the raw text.
    pub async fn structure(&self, results: &[ExecutionResult]) -> Result<StructuredReport, PipelineError> {
        let raw: Vec<RawResult<'_>> = results
            .iter()
            .map(|r| RawResult {
                command: &r.command,
                stdout: &r.stdout,
                stderr: &r.stderr,
                exit_status: r.exit_status,
            })
            .collect();
        let payload = serde_json::to_string_pretty(&raw)
            .map_err(|e| PipelineError::Io(std::io::Error::other(e)))?;

        let request = OracleRequest::new(
            default_role_text(DefaultRole::Analyzer, "", results.len()),
            payload,
            ResponseFormat::JsonObject,
        );
        let completion = self
            .oracle
            .complete(request)
            .await
            .map_err(|source| PipelineError::Oracle { stage: Stage::Structuring, source })?;

        let wire: WireReport = serde_json::from_str(completion.content.trim()).map_err(|e| {
            tracing::error!("structuring response rejected: {}", e);
            PipelineError::OracleUnparseable { stage: Stage::Structuring, raw: completion.content.clone() }
        })?;

        if wire.experiments.len() != results.len() {
            tracing::warn!(
                "oracle described {} experiments for {} results",
                wire.experiments.len(),
                results.len()
            );
        }
        Ok(merge(results, wire))
    }
}

fn merge(results: &[ExecutionResult], wire: WireReport) -> StructuredReport {
    let mut used = vec![false; wire.experiments.len()];
    let experiments = results
        .iter()
        .enumerate()
        .map(|(i, result)| {
            // Same command text first, then same position.
            let pick = wire
                .experiments
                .iter()
                .enumerate()
                .position(|(j, w)| {
                    !used[j] && w.command.as_deref().map(str::trim) == Some(result.command.trim())
                })
                .or_else(|| (i < used.len() && !used[i]).then_some(i));

            let mut record = local_record(i, result);
            record.accuracy = None;
            if let Some(j) = pick {
                used[j] = true;
                let w = &wire.experiments[j];
                for (name, value) in &w.hyperparameters {
                    match value.as_f64() {
                        Some(v) => {
                            record.hyperparameters.insert(name.clone(), v);
                        }
                        None => tracing::debug!(%name, %value, "dropping non-numeric hyperparameter"),
                    }
                }
                record.accuracy = w.accuracy;
            }
            record
        })
        .collect::<Vec<_>>();

    let summary = if wire.summary.trim().is_empty() {
        local_summary(&experiments)
    } else {
        wire.summary.trim().to_string()
    };
    StructuredReport { experiments, summary }
}

fn local_record(index: usize, result: &ExecutionResult) -> ExperimentRecord {
    ExperimentRecord {
        run_id: index + 1,
        command: result.command.clone(),
        hyperparameters: extract::parse_hyperparameters(&result.command),
        accuracy: extract::extract_accuracy(&result.stdout),
        status: result.exit_status,
        stdout: result.stdout.clone(),
        stderr: result.stderr.clone(),
    }
}

/// Report built without the oracle, from the fixed log grammar.
pub fn local_report(results: &[ExecutionResult]) -> StructuredReport {
    let experiments: Vec<ExperimentRecord> =
        results.iter().enumerate().map(|(i, r)| local_record(i, r)).collect();
    let summary = local_summary(&experiments);
    StructuredReport { experiments, summary }
}

pub fn local_summary(experiments: &[ExperimentRecord]) -> String {
    if experiments.is_empty() {
        return "No experiments could be planned for this request.".to_string();
    }
    let mut counts: BTreeMap<String, usize> = BTreeMap::new();
    for e in experiments {
        *counts.entry(e.status.to_string()).or_default() += 1;
    }
    let breakdown = counts
        .iter()
        .map(|(status, n)| format!("{n} {status}"))
        .collect::<Vec<_>>()
        .join(", ");

    match best_of(experiments) {
        Some((b, acc)) => format!(
            "Ran {} experiments ({}); best accuracy {:.4} from `{}`.",
            experiments.len(),
            breakdown,
            acc,
            b.command
        ),
        None => format!(
            "Ran {} experiments ({}); no accuracy could be extracted from their output.",
            experiments.len(),
            breakdown
        ),
    }
}

fn best_of(experiments: &[ExperimentRecord]) -> Option<(&ExperimentRecord, f64)> {
    experiments
        .iter()
        .filter_map(|e| e.accuracy.filter(|a| a.is_finite()).map(|a| (e, a)))
        .max_by(|(_, a), (_, b)| a.total_cmp(b))
}
