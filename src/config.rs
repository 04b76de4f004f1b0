//! Run configuration.
//!
//! A run is described by a TOML document naming the two taxonomy files, the
//! group lists that define the index and outcome categories, and the window
//! length. See `data/config.toml` for a working example.

use crate::Result;
use qu::ick_use::*;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::fs;

/// One year, in seconds. The default window either side of an index event.
pub const DEFAULT_WINDOW: i64 = 365 * 24 * 60 * 60;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub parser: ParserConfig,
    pub code_groups: CodeGroupsConfig,
    /// Length of the before/after windows, in seconds.
    #[serde(default = "default_window_seconds")]
    pub window_seconds: i64,
    /// Also emit one serialised document per index record.
    #[serde(default)]
    pub save_records: bool,
    /// How many patients to process between cancellation checks.
    #[serde(default = "default_cancel_interval")]
    pub cancel_interval: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ParserConfig {
    pub diagnoses: CodeFileConfig,
    pub procedures: CodeFileConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CodeFileConfig {
    /// Path to the taxonomy YAML file.
    pub file: PathBuf,
}

/// The group names behind each clinical category used by the extraction
/// pass. Each name must be declared by one of the taxonomies.
#[derive(Debug, Clone, Deserialize)]
pub struct CodeGroupsConfig {
    pub acs: Vec<String>,
    pub pci: Vec<String>,
    pub stemi: Vec<String>,
    pub cardiac_death: Vec<String>,
}

fn default_window_seconds() -> i64 {
    DEFAULT_WINDOW
}

fn default_cancel_interval() -> usize {
    10
}

impl Config {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = fs::read_to_string(path)
            .with_context(|| format!("reading config file \"{}\"", path.display()))?;
        toml::from_str(&text)
            .with_context(|| format!("parsing config file \"{}\"", path.display()))
    }
}

#[cfg(test)]
mod test {
    use super::{Config, DEFAULT_WINDOW};

    #[test]
    fn parses_with_defaults() {
        let config: Config = toml::from_str(
            r#"
[parser.diagnoses]
file = "data/icd10.yaml"

[parser.procedures]
file = "data/opcs4.yaml"

[code_groups]
acs = ["acs_stemi", "acs_nstemi"]
pci = ["pci"]
stemi = ["acs_stemi"]
cardiac_death = ["cardiac_death"]
"#,
        )
        .unwrap();
        assert_eq!(config.window_seconds, DEFAULT_WINDOW);
        assert!(!config.save_records);
        assert_eq!(config.cancel_interval, 10);
        assert_eq!(config.code_groups.acs.len(), 2);
    }

    #[test]
    fn overrides_apply() {
        let config: Config = toml::from_str(
            r#"
window_seconds = 86400
save_records = true
cancel_interval = 100

[parser.diagnoses]
file = "icd.yaml"

[parser.procedures]
file = "opcs.yaml"

[code_groups]
acs = []
pci = []
stemi = []
cardiac_death = []
"#,
        )
        .unwrap();
        assert_eq!(config.window_seconds, 86400);
        assert!(config.save_records);
        assert_eq!(config.cancel_interval, 100);
    }
}
