//! Log text -> generated plotting code -> image file.
//!
//! The generated code is untrusted. Before it runs it is contained: the
//! plotting backend is forced headless and every `savefig` call is pointed at
//! the caller's output path. It runs in a throwaway working directory that is
//! removed afterwards, and a run only counts if the image actually exists.

use std::{
    env, fs,
    path::{Path, PathBuf},
    sync::Arc,
    time::Duration,
};

use crate::{
    config::Config,
    error::{PipelineError, Stage},
    execution::{python, ExitStatus},
    llm::{Oracle, OracleRequest, ResponseFormat},
    role::{default_role_text, plotter_user_text, DefaultRole},
    utils::fenced_blocks,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlotArtifact {
    pub path: PathBuf,
    /// The code that produced `path`, after rewriting.
    pub code: String,
}

#[derive(Debug, Clone)]
pub struct PlotSettings {
    pub interpreter: String,
    pub timeout: Duration,
    pub output_dir: PathBuf,
    /// Parent for the per-run working directory; the system temp dir if unset.
    pub scratch_dir: Option<PathBuf>,
}

impl PlotSettings {
    pub fn from_config(cfg: &Config) -> Self {
        Self {
            interpreter: cfg.get("PLOT_INTERPRETER").unwrap_or_else(|| "python3".into()),
            timeout: Duration::from_secs(cfg.get_u64("PLOT_TIMEOUT").unwrap_or(30)),
            output_dir: cfg.plot_output_dir(),
            scratch_dir: None,
        }
    }
}

pub struct PlotRenderer {
    oracle: Arc<dyn Oracle>,
    settings: PlotSettings,
}

impl PlotRenderer {
    pub fn new(oracle: Arc<dyn Oracle>, settings: PlotSettings) -> Self {
        Self { oracle, settings }
    }

    /// Where `render(.., output_name)` writes its image.
    pub fn output_path(&self, output_name: &str) -> Result<PathBuf, PipelineError> {
        let mut path = self.settings.output_dir.join(output_name);
        if path.extension().is_none() {
            path.set_extension("png");
        }
        if path.is_relative() {
            path = env::current_dir()?.join(path);
        }
        Ok(path)
    }

    pub async fn render(
        &self,
        raw_logs: &str,
        rendering_request: &str,
        output_name: &str,
    ) -> Result<PlotArtifact, PipelineError> {
        let path = self.output_path(output_name)?;
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir)?;
        }
        let target = path.to_string_lossy().into_owned();

        tracing::info!(output = %path.display(), "requesting plotting code");
        let request = OracleRequest::new(
            default_role_text(DefaultRole::Plotter, "", 1),
            plotter_user_text(rendering_request, raw_logs, &target),
            ResponseFormat::Text,
        );
        let completion = self
            .oracle
            .complete(request)
            .await
            .map_err(|source| PipelineError::Oracle { stage: Stage::Rendering, source })?;

        let Some(block) = select_code_block(&completion.content) else {
            return Err(PipelineError::OracleUnparseable {
                stage: Stage::Rendering,
                raw: completion.content,
            });
        };
        let code = rewrite_save_calls(&force_headless(&block), &path);

        let workdir = match &self.settings.scratch_dir {
            Some(parent) => tempfile::Builder::new().prefix("exprun-plot-").tempdir_in(parent)?,
            None => tempfile::Builder::new().prefix("exprun-plot-").tempdir()?,
        };
        let script = workdir.path().join("plot.py");
        // A leftover image from an earlier run must not pass the existence check.
        let prepared = fs::write(&script, &code).and_then(|()| match fs::remove_file(&path) {
            Err(e) if e.kind() != std::io::ErrorKind::NotFound => Err(e),
            _ => Ok(()),
        });
        let run = match prepared {
            Ok(()) => {
                python::run_file(&self.settings.interpreter, &script, self.settings.timeout, workdir.path())
                    .await
            }
            Err(e) => {
                let _ = workdir.close();
                return Err(e.into());
            }
        };
        if let Err(e) = workdir.close() {
            tracing::warn!("could not remove plot working directory: {}", e);
        }

        match run.exit_status {
            ExitStatus::Ok | ExitStatus::Blocked => {}
            ExitStatus::TimedOut => {
                return Err(PipelineError::Timeout {
                    command: run.command,
                    timeout: self.settings.timeout,
                    stdout: run.stdout,
                    stderr: run.stderr,
                })
            }
            ExitStatus::Nonzero => {
                return Err(PipelineError::NonZeroExit {
                    command: run.command,
                    code: run.exit_code,
                    stderr: run.stderr,
                })
            }
        }

        if !path.exists() {
            tracing::error!(output = %path.display(), "generated code exited cleanly but wrote nothing");
            return Err(PipelineError::ArtifactMissing { path, stdout: run.stdout, stderr: run.stderr });
        }
        tracing::info!(output = %path.display(), "plot saved");
        Ok(PlotArtifact { path, code })
    }
}

/// The longest fenced block in `response`; on equal length the earlier one.
pub fn select_code_block(response: &str) -> Option<String> {
    let mut best: Option<String> = None;
    for block in fenced_blocks(response) {
        let block = block.trim();
        if block.is_empty() {
            continue;
        }
        if best.as_ref().map_or(true, |b| block.len() > b.len()) {
            best = Some(block.to_string());
        }
    }
    best
}

/// Select the Agg backend when the code uses matplotlib without choosing one.
pub fn force_headless(code: &str) -> String {
    let uses_matplotlib = code.lines().any(|l| {
        let l = l.trim_start();
        l.starts_with("import matplotlib") || l.starts_with("from matplotlib")
    });
    if !uses_matplotlib || code.contains("matplotlib.use(") {
        return code.to_string();
    }

    // `from __future__` imports must stay first.
    let lines: Vec<&str> = code.lines().collect();
    let insert_at = lines
        .iter()
        .rposition(|l| l.trim_start().starts_with("from __future__"))
        .map_or(0, |i| i + 1);
    let mut out = String::with_capacity(code.len() + 48);
    for line in &lines[..insert_at] {
        out.push_str(line);
        out.push('\n');
    }
    out.push_str("import matplotlib\nmatplotlib.use(\"Agg\")\n");
    for line in &lines[insert_at..] {
        out.push_str(line);
        out.push('\n');
    }
    out
}

/// Point every `savefig(...)` call, bare or `<expr>.savefig(...)`, at `output`,
/// keeping its other arguments. Text inside comments and string literals is
/// never touched.
pub fn rewrite_save_calls(code: &str, output: &Path) -> String {
    let target = python_string(&output.to_string_lossy());
    let lexed = lex(code);
    let mut out = String::with_capacity(code.len() + target.len());
    let mut copied = 0;
    let mut i = 0;
    while i < lexed.len() {
        let Some(open) = save_call_at(code, &lexed, i) else {
            i += 1;
            continue;
        };
        let Some(close) = closing_paren(&lexed, open) else {
            // Unbalanced call: leave it to the interpreter, keep scanning.
            i = open + 1;
            continue;
        };

        let mut args = vec![target.clone()];
        for (n, arg) in split_args(&lexed[open + 1..close]).into_iter().enumerate() {
            match keyword_name(&arg) {
                Some("fname") => {}
                Some(_) => args.push(arg),
                None if n == 0 => {}
                None => args.push(arg),
            }
        }
        out.push_str(&code[copied..=lexed[open].0]);
        out.push_str(&args.join(", "));
        copied = lexed[close].0;
        i = close + 1;
    }
    out.push_str(&code[copied..]);
    out
}

fn python_string(s: &str) -> String {
    // JSON string escapes are valid Python string escapes.
    serde_json::to_string(s).unwrap_or_else(|_| format!("'{}'", s.replace('\\', "\\\\").replace('\'', "\\'")))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Lex {
    Code,
    Comment,
    Str,
}

/// One entry per char of `src`: byte offset, char, and what it belongs to.
fn lex(src: &str) -> Vec<(usize, char, Lex)> {
    let chars: Vec<(usize, char)> = src.char_indices().collect();
    let is = |k: usize, q: char| chars.get(k).is_some_and(|&(_, c)| c == q);
    let mut out = Vec::with_capacity(chars.len());
    let mut i = 0;
    while i < chars.len() {
        let (b, c) = chars[i];
        match c {
            '#' => {
                while i < chars.len() && chars[i].1 != '\n' {
                    out.push((chars[i].0, chars[i].1, Lex::Comment));
                    i += 1;
                }
            }
            '\'' | '"' => {
                let width = if is(i + 1, c) && is(i + 2, c) { 3 } else { 1 };
                out.extend(chars[i..i + width].iter().map(|&(b, c)| (b, c, Lex::Str)));
                i += width;
                while i < chars.len() {
                    let (b, ch) = chars[i];
                    if ch == '\\' {
                        out.extend(chars[i..(i + 2).min(chars.len())].iter().map(|&(b, c)| (b, c, Lex::Str)));
                        i += 2;
                        continue;
                    }
                    // an unterminated one-line string ends at the newline
                    if ch == '\n' && width == 1 {
                        break;
                    }
                    if ch == c && (width == 1 || (is(i + 1, c) && is(i + 2, c))) {
                        out.extend(chars[i..i + width].iter().map(|&(b, c)| (b, c, Lex::Str)));
                        i += width;
                        break;
                    }
                    out.push((b, ch, Lex::Str));
                    i += 1;
                }
            }
            _ => {
                out.push((b, c, Lex::Code));
                i += 1;
            }
        }
    }
    out
}

fn is_ident_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_'
}

/// If a `savefig` call starts at `lexed[i]`, the index of its `(`.
fn save_call_at(code: &str, lexed: &[(usize, char, Lex)], i: usize) -> Option<usize> {
    const NAME: &str = "savefig";
    let (b, _, kind) = lexed[i];
    if kind != Lex::Code || !code[b..].starts_with(NAME) {
        return None;
    }
    if i > 0 && is_ident_char(lexed[i - 1].1) {
        return None;
    }
    let end = i + NAME.len();
    if lexed.get(end).is_some_and(|e| is_ident_char(e.1)) {
        return None;
    }
    // `def savefig(...)` defines one
    if let Some(rest) = code[..b].trim_end().strip_suffix("def") {
        if !rest.ends_with(is_ident_char) {
            return None;
        }
    }
    let open = (end..lexed.len()).find(|&j| !matches!(lexed[j].1, ' ' | '\t'))?;
    (lexed[open].1 == '(' && lexed[open].2 == Lex::Code).then_some(open)
}

/// Index of the `)` closing the call opened at `lexed[open]`.
fn closing_paren(lexed: &[(usize, char, Lex)], open: usize) -> Option<usize> {
    let mut depth = 0usize;
    for (j, &(_, c, kind)) in lexed.iter().enumerate().skip(open) {
        if kind != Lex::Code {
            continue;
        }
        match c {
            '(' | '[' | '{' => depth += 1,
            ')' | ']' | '}' => {
                depth = depth.saturating_sub(1);
                if depth == 0 && c == ')' {
                    return Some(j);
                }
            }
            _ => {}
        }
    }
    None
}

/// Top-level arguments of a call, comments dropped.
fn split_args(inner: &[(usize, char, Lex)]) -> Vec<String> {
    let mut parts = Vec::new();
    let mut current = String::new();
    let mut depth = 0usize;
    for &(_, c, kind) in inner {
        match kind {
            Lex::Comment => continue,
            Lex::Str => {}
            Lex::Code => match c {
                '(' | '[' | '{' => depth += 1,
                ')' | ']' | '}' => depth = depth.saturating_sub(1),
                ',' if depth == 0 => {
                    parts.push(current.trim().to_string());
                    current.clear();
                    continue;
                }
                _ => {}
            },
        }
        current.push(c);
    }
    parts.push(current.trim().to_string());
    parts.retain(|p| !p.is_empty());
    parts
}

fn keyword_name(arg: &str) -> Option<&str> {
    let (name, value) = arg.split_once('=')?;
    let name = name.trim();
    let is_ident = !name.is_empty()
        && !name.starts_with(|c: char| c.is_ascii_digit())
        && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_');
    (is_ident && !value.starts_with('=')).then_some(name)
}
