use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;

/// Top-level configuration as read verbatim from TOML.
///
/// Mirrors the upstream daemon's shape: everything under `[rules.*]` is kept
/// as an ordered list of strings and handed to `Rule::initialize` unparsed.
/// Semantic validation (duration literals, backend names, placeholder counts)
/// happens during rule/runner initialization, not here.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawConfig {
    pub backend: String,

    #[serde(default)]
    pub save_file_path: Option<PathBuf>,

    #[serde(default = "default_log_level")]
    pub log_level: String,

    #[serde(default)]
    pub rules: HashMap<String, RawRule>,
}

fn default_log_level() -> String {
    "info".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawRule {
    pub source: Vec<String>,
    pub regexp: Vec<String>,
    pub action: Vec<String>,

    #[serde(default)]
    pub aggregate: Option<Vec<String>>,

    #[serde(default)]
    pub occurrences: Option<Vec<String>>,
}
