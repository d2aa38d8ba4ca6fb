//! Fixed log grammar used when no oracle structures the results.

use std::{collections::BTreeMap, sync::OnceLock};

use regex::Regex;

/// Numeric `--flag value` / `--flag=value` / `-f value` pairs from a command line.
/// Flags whose value is not a number are skipped.
pub fn parse_hyperparameters(command: &str) -> BTreeMap<String, f64> {
    let tokens = shlex::split(command)
        .unwrap_or_else(|| command.split_whitespace().map(str::to_string).collect());
    let mut params = BTreeMap::new();
    let mut i = 0;
    while i < tokens.len() {
        let token = &tokens[i];
        i += 1;
        let Some(flag) = flag_name(token) else { continue };

        if let Some((name, value)) = flag.split_once('=') {
            if let Ok(v) = value.parse::<f64>() {
                params.insert(name.to_string(), v);
            }
            continue;
        }
        if let Some(v) = tokens.get(i).and_then(|next| next.parse::<f64>().ok()) {
            params.insert(flag.to_string(), v);
            i += 1;
        }
    }
    params
}

fn flag_name(token: &str) -> Option<&str> {
    let name = token.strip_prefix("--").or_else(|| token.strip_prefix('-'))?;
    // "-1" and "-0.5" are values, not flags
    if name.is_empty() || name.starts_with(|c: char| c.is_ascii_digit() || c == '.') {
        return None;
    }
    Some(name)
}

/// Last accuracy-like value in `text`: `acc`, `accuracy`, `val_acc`, `val accuracy`
/// followed by `:` or `=`. A trailing `%` is divided out.
pub fn extract_accuracy(text: &str) -> Option<f64> {
    static ACC: OnceLock<Regex> = OnceLock::new();
    let re = ACC.get_or_init(|| {
        Regex::new(r"(?i)\b(?:val(?:idation)?[_ ]?)?acc(?:uracy)?\s*[:=]\s*(-?\d+(?:\.\d+)?(?:[eE][-+]?\d+)?)\s*(%)?")
            .expect("accuracy pattern is valid")
    });
    re.captures_iter(text).filter_map(|c| {
        let value = c.get(1)?.as_str().parse::<f64>().ok()?;
        Some(if c.get(2).is_some() { value / 100.0 } else { value })
    })
    .last()
}
