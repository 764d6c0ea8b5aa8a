//! Configuration for elrover.
//!
//! Configuration sources (highest priority first):
//! 1. Explicit path (`--config`) or the ELROVER_CONFIG environment variable
//! 2. Config file (.elrover/config.yaml)
//! 3. Built-in defaults (config/default.yaml, embedded at build time)
//!
//! Config file discovery:
//! - Searches current directory and parents for .elrover/config.yaml
//! - Input paths in a config file are relative to the project root (the
//!   parent of .elrover/)

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, OnceLock};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::core::{ClusterMode, CombinationSettings, CombineError, MentionSelection, Ranking};

/// Environment variable naming an explicit config file
pub const CONFIG_ENV: &str = "ELROVER_CONFIG";

/// Embedded default configuration
const DEFAULT_CONFIG: &str = include_str!("../config/default.yaml");

/// Global cached configuration (stores Result to handle init errors)
static CONFIG: OnceLock<Result<ResolvedConfig, String>> = OnceLock::new();

/// Raw config file schema (matches YAML structure)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigFile {
    pub version: String,
    #[serde(default)]
    pub combination: CombinationConfig,
    /// Service display order
    #[serde(default)]
    pub linker_order: Vec<String>,
    /// Service pairs that must not be ranked together
    #[serde(default)]
    pub exclusive: Vec<(String, String)>,
    /// Per-service category re-enrichment flag
    #[serde(default)]
    pub redo_categories: BTreeMap<String, bool>,
    #[serde(default)]
    pub schemes: BTreeMap<String, SchemeConfig>,
    /// Service name to result file
    #[serde(default)]
    pub inputs: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CombinationConfig {
    #[serde(default = "default_scheme")]
    pub scheme: String,
    #[serde(default = "default_eval_mode")]
    pub eval_mode: String,
    #[serde(default)]
    pub mention_selection: MentionSelection,
    #[serde(default)]
    pub clustering: ClusterMode,
    /// Overrides the scheme's spacer when set
    #[serde(default)]
    pub rank_spacer: Option<f64>,
    #[serde(default)]
    pub use_confidence: bool,
    #[serde(default = "default_output_prefix")]
    pub output_prefix: String,
}

fn default_scheme() -> String {
    "conll".to_string()
}

fn default_eval_mode() -> String {
    "sam".to_string()
}

fn default_output_prefix() -> String {
    "combined".to_string()
}

fn default_rank_spacer() -> f64 {
    -1.75
}

impl Default for CombinationConfig {
    fn default() -> Self {
        Self {
            scheme: default_scheme(),
            eval_mode: default_eval_mode(),
            mention_selection: MentionSelection::default(),
            clustering: ClusterMode::default(),
            rank_spacer: None,
            use_confidence: false,
            output_prefix: default_output_prefix(),
        }
    }
}

/// One weighting scheme (usually named after its development corpus)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchemeConfig {
    #[serde(default = "default_rank_spacer")]
    pub rank_spacer: f64,
    /// Services eligible to vote
    pub ranked: Vec<String>,
    /// Evaluation mode -> service -> weight
    pub weights: BTreeMap<String, BTreeMap<String, f64>>,
    /// Service -> evaluation mode -> minimum confidence
    #[serde(default)]
    pub min_confidence: BTreeMap<String, BTreeMap<String, f64>>,
}

/// Command-line overrides applied on top of the file
#[derive(Debug, Clone, Default)]
pub struct SettingsOverrides {
    pub scheme: Option<String>,
    pub eval_mode: Option<String>,
    pub mention_selection: Option<MentionSelection>,
    pub clustering: Option<ClusterMode>,
    pub rank_spacer: Option<f64>,
    pub use_confidence: bool,
}

/// Loaded configuration and where it came from
#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    pub file: ConfigFile,
    /// Path to config file (None for built-in defaults)
    pub config_file: Option<PathBuf>,
}

impl ResolvedConfig {
    /// Resolve combination settings for the configured (or overridden)
    /// scheme and evaluation mode
    pub fn settings(&self, overrides: &SettingsOverrides) -> Result<CombinationSettings> {
        let combination = &self.file.combination;
        let scheme_name = overrides.scheme.as_deref().unwrap_or(&combination.scheme);
        let eval_mode = overrides.eval_mode.as_deref().unwrap_or(&combination.eval_mode);

        let scheme = self
            .file
            .schemes
            .get(scheme_name)
            .ok_or_else(|| CombineError::UnknownScheme(scheme_name.to_string()))?;

        let weights = scheme
            .weights
            .get(eval_mode)
            .ok_or_else(|| CombineError::UnknownEvalMode {
                scheme: scheme_name.to_string(),
                mode: eval_mode.to_string(),
            })?;

        let rank_spacer = overrides
            .rank_spacer
            .or(combination.rank_spacer)
            .unwrap_or(scheme.rank_spacer);

        let ranking = Ranking::new(&scheme.ranked, weights, rank_spacer)
            .with_context(|| format!("Invalid ranking for scheme '{}'", scheme_name))?;

        let min_confidence = scheme
            .min_confidence
            .iter()
            .filter_map(|(service, modes)| modes.get(eval_mode).map(|v| (service.clone(), *v)))
            .collect();

        let settings = CombinationSettings {
            scheme: scheme_name.to_string(),
            eval_mode: eval_mode.to_string(),
            ranking: Arc::new(ranking),
            mention_selection: overrides
                .mention_selection
                .unwrap_or(combination.mention_selection),
            clustering: overrides.clustering.unwrap_or(combination.clustering),
            linker_order: self.file.linker_order.clone(),
            exclusive: self.file.exclusive.clone(),
            redo_categories: self
                .file
                .redo_categories
                .iter()
                .filter(|(_, enabled)| **enabled)
                .map(|(service, _)| service.clone())
                .collect(),
            min_confidence,
            use_confidence: overrides.use_confidence || combination.use_confidence,
        };

        settings.validate()?;
        Ok(settings)
    }

    /// Input files from the config, resolved against the project root
    pub fn input_paths(&self) -> BTreeMap<String, PathBuf> {
        let base = self.base_dir();
        self.file
            .inputs
            .iter()
            .map(|(service, path)| (service.clone(), resolve_path(&base, path)))
            .collect()
    }

    pub fn output_prefix(&self) -> &str {
        &self.file.combination.output_prefix
    }

    /// Project root: parent of .elrover/, or the current directory
    fn base_dir(&self) -> PathBuf {
        self.config_file
            .as_deref()
            .and_then(Path::parent) // .elrover/
            .and_then(Path::parent) // project root
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."))
    }
}

/// Find config file by searching current directory and parents
fn find_config_file() -> Option<PathBuf> {
    let mut current = std::env::current_dir().ok()?;

    loop {
        let config_path = current.join(".elrover").join("config.yaml");
        if config_path.exists() {
            return Some(config_path);
        }

        if !current.pop() {
            break;
        }
    }

    None
}

/// Parse the embedded defaults
pub fn builtin_config() -> Result<ConfigFile> {
    serde_yaml::from_str(DEFAULT_CONFIG).context("Failed to parse built-in configuration")
}

/// Load and parse config file
fn load_config_file(path: &Path) -> Result<ConfigFile> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    serde_yaml::from_str(&content)
        .with_context(|| format!("Failed to parse config file: {}", path.display()))
}

/// Fill sections a user file leaves empty from the built-in defaults
fn with_builtin_fallbacks(mut file: ConfigFile, builtin: ConfigFile) -> ConfigFile {
    if file.schemes.is_empty() {
        file.schemes = builtin.schemes;
    }
    if file.linker_order.is_empty() {
        file.linker_order = builtin.linker_order;
    }
    if file.exclusive.is_empty() {
        file.exclusive = builtin.exclusive;
    }
    if file.redo_categories.is_empty() {
        file.redo_categories = builtin.redo_categories;
    }
    file
}

/// Resolve a path that may be relative to the config file's project root
/// or to the home directory (`~/`)
fn resolve_path(base: &Path, path_str: &str) -> PathBuf {
    if let Some(rest) = path_str.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    }

    let path = PathBuf::from(path_str);
    if path.is_absolute() {
        path
    } else {
        base.join(path)
    }
}

/// Load configuration from all sources
pub fn load_config(explicit: Option<&Path>) -> Result<ResolvedConfig> {
    let config_file = explicit
        .map(Path::to_path_buf)
        .or_else(|| std::env::var(CONFIG_ENV).ok().map(PathBuf::from))
        .or_else(find_config_file);

    let builtin = builtin_config()?;

    let file = match config_file {
        Some(ref path) => with_builtin_fallbacks(load_config_file(path)?, builtin),
        None => builtin,
    };

    Ok(ResolvedConfig { file, config_file })
}

/// Get the global configuration (loads once, then cached)
pub fn config() -> Result<&'static ResolvedConfig> {
    let result = CONFIG.get_or_init(|| load_config(None).map_err(|e| e.to_string()));

    match result {
        Ok(config) => Ok(config),
        Err(e) => anyhow::bail!("{}", e),
    }
}

/// Force reload configuration (useful for testing)
pub fn reload_config() -> Result<ResolvedConfig> {
    load_config(None)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::TempDir;

    fn builtin() -> ResolvedConfig {
        ResolvedConfig {
            file: builtin_config().unwrap(),
            config_file: None,
        }
    }

    #[test]
    fn test_builtin_config_parses() {
        let file = builtin_config().unwrap();
        assert_eq!(file.version, "1.0");
        assert_eq!(file.combination.scheme, "conll");
        assert_eq!(file.combination.mention_selection, MentionSelection::Votes);
        assert_eq!(file.combination.clustering, ClusterMode::Components);
        assert!(file.schemes.contains_key("tweets"));
        assert_eq!(file.linker_order[0], "tagme");
    }

    #[test]
    fn test_conll_settings() {
        let settings = builtin().settings(&SettingsOverrides::default()).unwrap();

        assert_eq!(settings.ranking.best_service(), "aida");
        assert_eq!(settings.ranking.len(), 5);
        assert_eq!(settings.ranking.rank_spacer(), -1.75);
        // raida is not ranked but still sets the ceiling
        assert_eq!(settings.ranking.ceiling(), 0.767);
        assert!(settings.redo_categories.contains("spotlight"));
        assert!(!settings.redo_categories.contains("tagme"));
        assert_eq!(settings.min_confidence["tagme"], 0.219);
    }

    #[test]
    fn test_overrides_apply() {
        let overrides = SettingsOverrides {
            scheme: Some("tweets".to_string()),
            mention_selection: Some(MentionSelection::Longest),
            clustering: Some(ClusterMode::Chained),
            use_confidence: true,
            ..Default::default()
        };
        let settings = builtin().settings(&overrides).unwrap();

        assert_eq!(settings.scheme, "tweets");
        assert_eq!(settings.ranking.rank_spacer(), -2.5);
        assert_eq!(settings.ranking.best_service(), "raida");
        assert_eq!(settings.mention_selection, MentionSelection::Longest);
        assert_eq!(settings.clustering, ClusterMode::Chained);
        assert_eq!(settings.confidence_filter("raida"), Some(0.2));
    }

    #[test]
    fn test_unknown_scheme_and_mode() {
        let overrides = SettingsOverrides {
            scheme: Some("msnbc".to_string()),
            ..Default::default()
        };
        let err = builtin().settings(&overrides).unwrap_err();
        assert!(err.to_string().contains("msnbc"));

        let overrides = SettingsOverrides {
            scheme: Some("tweets".to_string()),
            eval_mode: Some("ent".to_string()),
            ..Default::default()
        };
        assert!(builtin().settings(&overrides).is_err());
    }

    #[test]
    fn test_config_file_parsing() {
        let temp = TempDir::new().unwrap();
        let elrover_dir = temp.path().join(".elrover");
        std::fs::create_dir_all(&elrover_dir).unwrap();

        let config_path = elrover_dir.join("config.yaml");
        let mut file = std::fs::File::create(&config_path).unwrap();
        writeln!(
            file,
            r#"
version: "1.0"
combination:
  scheme: small
  mention_selection: longest
schemes:
  small:
    ranked: [A, B]
    weights:
      sam: {{ A: 0.6, B: 0.4 }}
inputs:
  A: results/a.tsv
"#
        )
        .unwrap();

        let config = load_config(Some(&config_path)).unwrap();
        assert_eq!(config.config_file.as_deref(), Some(config_path.as_path()));
        // linker order falls back to the built-in one
        assert_eq!(config.file.linker_order[0], "tagme");
        assert_eq!(config.input_paths()["A"], temp.path().join("results/a.tsv"));

        let settings = config.settings(&SettingsOverrides::default()).unwrap();
        assert_eq!(settings.ranking.best_service(), "A");
        assert_eq!(settings.ranking.rank_spacer(), -1.75);
        assert_eq!(settings.mention_selection, MentionSelection::Longest);
    }

    #[test]
    fn test_resolve_relative_path() {
        let base = PathBuf::from("/home/user/project");

        assert_eq!(
            resolve_path(&base, "./subdir"),
            PathBuf::from("/home/user/project/./subdir")
        );
        assert_eq!(
            resolve_path(&base, "/absolute/path"),
            PathBuf::from("/absolute/path")
        );
        assert_eq!(
            resolve_path(&base, "~/results/tagme.tsv"),
            dirs::home_dir().unwrap().join("results/tagme.tsv")
        );
    }
}
