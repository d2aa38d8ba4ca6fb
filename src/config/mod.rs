use std::{collections::HashMap, env, fs, path::PathBuf};

use directories::BaseDirs;

/// Every known key with its built-in value. `OPENAI_API_KEY` has none.
const DEFAULTS: &[(&str, &str)] = &[
    ("REQUEST_TIMEOUT", "120"),
    ("MAX_COMMANDS", "3"),
    ("COMMAND_TIMEOUT", "600"),
    ("PLOT_TIMEOUT", "30"),
    ("DEFAULT_MODEL", "gpt-4o"),
    ("DEFAULT_COLOR", "magenta"),
    ("API_BASE_URL", "default"),
    ("TRAIN_INTERPRETER", "python"),
    ("TRAIN_SCRIPT_PATH", "train.py"),
    ("PIPELINE_MODE", "two_stage"),
    ("PLANNER_SHAPE", "actions"),
    ("PLOT_INTERPRETER", "python3"),
    ("PLOT_OUTPUT_DIR", "gpt_png"),
    ("LOG_LEVEL", "warn"),
    ("PRETTIFY_MARKDOWN", "true"),
];

/// Settings layered as built-in defaults, then `~/.config/exprun/.exprc`,
/// then environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    inner: HashMap<String, String>,
    /// When false, environment variables are ignored on lookup (tests).
    read_env: bool,
}

impl Config {
    pub fn load() -> Self {
        let mut map = default_map();

        let path = rc_path();
        match fs::read_to_string(&path) {
            Ok(text) => map.extend(parse_rc(&text)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => eprintln!("warning: ignoring {}: {}", path.display(), e),
        }

        map.extend(env::vars().filter(|(k, _)| is_config_key(k)));
        Self { inner: map, read_env: true }
    }

    /// Defaults overlaid with the given pairs; never reads disk or environment.
    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let mut map = default_map();
        map.extend(pairs.into_iter().map(|(k, v)| (k.into(), v.into())));
        Self { inner: map, read_env: false }
    }

    pub fn get(&self, key: &str) -> Option<String> {
        if self.read_env {
            if let Ok(v) = env::var(key) {
                return Some(v);
            }
        }
        self.inner.get(key).cloned()
    }

    pub fn get_bool(&self, key: &str) -> bool {
        self.get(key).is_some_and(|v| v.eq_ignore_ascii_case("true"))
    }

    pub fn get_usize(&self, key: &str) -> Option<usize> {
        self.get(key).and_then(|v| v.parse().ok())
    }

    pub fn get_u64(&self, key: &str) -> Option<u64> {
        self.get(key).and_then(|v| v.parse().ok())
    }

    pub fn get_path(&self, key: &str) -> Option<PathBuf> {
        self.get(key).map(PathBuf::from)
    }

    pub fn plot_output_dir(&self) -> PathBuf {
        self.get_path("PLOT_OUTPUT_DIR").unwrap_or_else(|| PathBuf::from("gpt_png"))
    }
}

/// `KEY=value` lines; blank lines and `#` comments are skipped.
fn parse_rc(text: &str) -> impl Iterator<Item = (String, String)> + '_ {
    text.lines()
        .map(str::trim)
        .filter(|l| !l.is_empty() && !l.starts_with('#'))
        .filter_map(|l| l.split_once('='))
        .map(|(k, v)| (k.trim().to_string(), v.trim().to_string()))
}

fn is_config_key(k: &str) -> bool {
    DEFAULTS.iter().any(|(key, _)| *key == k) || k.starts_with("EXPRUN_") || k.starts_with("OPENAI_")
}

fn rc_path() -> PathBuf {
    BaseDirs::new()
        .map(|b| b.config_dir().to_path_buf())
        .unwrap_or_else(|| PathBuf::from("~/.config"))
        .join("exprun")
        .join(".exprc")
}

fn default_map() -> HashMap<String, String> {
    DEFAULTS.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
}
