//! Configuration for hypersweep.
//!
//! Uses `figment` for layered configuration: defaults -> user config file ->
//! workspace config file -> environment -> explicit overrides.

use crate::hyperparams::Device;
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Top-level configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SweepConfig {
    pub search: SearchConfig,
    pub random: RandomConfig,
    pub output: OutputConfig,
    pub tracker: TrackerConfig,
}

/// How each combination is trained and recorded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    pub device: Device,
    /// Shuffle the training loader. The validation loader never shuffles.
    pub shuffle: bool,
    /// Train every combination once per seed. `None` trains once, unseeded.
    pub seeds: Option<Vec<u64>>,
    /// Record `train_loss` / `val_loss` columns.
    pub save_loss_values: bool,
    pub show_progress: bool,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            device: Device::Cpu,
            shuffle: true,
            seeds: None,
            save_loss_values: false,
            show_progress: false,
        }
    }
}

/// Randomized-search sampling.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RandomConfig {
    pub sampler_seed: Option<u64>,
    pub max_attempts_per_run: usize,
}

impl Default for RandomConfig {
    fn default() -> Self {
        Self {
            sampler_seed: None,
            max_attempts_per_run: 100,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    /// `.csv` or `.json`.
    pub results_path: PathBuf,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            results_path: PathBuf::from("results.csv"),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrackerBackend {
    #[default]
    Jsonl,
    Http,
}

/// Experiment-tracker settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackerConfig {
    pub enabled: bool,
    pub backend: TrackerBackend,
    pub project: String,
    pub entity: Option<String>,
    /// Base URL for the http backend.
    pub endpoint: Option<String>,
    /// Name of the environment variable holding the API key.
    pub api_key_env: Option<String>,
    /// Directory for the jsonl backend.
    pub log_dir: PathBuf,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            backend: TrackerBackend::Jsonl,
            project: "hypersweep".to_string(),
            entity: None,
            endpoint: None,
            api_key_env: Some("HYPERSWEEP_TRACKER_API_KEY".to_string()),
            log_dir: PathBuf::from(".hypersweep/runs"),
        }
    }
}

fn user_config_path() -> Option<PathBuf> {
    directories::ProjectDirs::from("dev", "hypersweep", "hypersweep")
        .map(|dirs| dirs.config_dir().join("config.toml"))
}

fn workspace_config_path(workspace: &Path) -> PathBuf {
    workspace.join(".hypersweep").join("config.toml")
}

/// Load configuration with layered merging.
pub fn load_config(
    workspace: Option<&Path>,
    overrides: Option<&SweepConfig>,
) -> Result<SweepConfig, Box<figment::Error>> {
    let mut figment = Figment::from(Serialized::defaults(SweepConfig::default()));

    if let Some(user_config) = user_config_path().filter(|p| p.exists()) {
        figment = figment.merge(Toml::file(&user_config));
    }

    if let Some(ws) = workspace {
        let ws_config = workspace_config_path(ws);
        if ws_config.exists() {
            figment = figment.merge(Toml::file(&ws_config));
        }
    }

    // HYPERSWEEP_SEARCH__DEVICE, HYPERSWEEP_TRACKER__ENABLED, ...
    figment = figment.merge(Env::prefixed("HYPERSWEEP_").split("__"));

    if let Some(overrides) = overrides {
        figment = figment.merge(Serialized::defaults(overrides));
    }

    figment.extract().map_err(Box::new)
}

/// Whether a user-level or workspace-level config file exists.
pub fn config_exists(workspace: Option<&Path>) -> bool {
    if user_config_path().is_some_and(|p| p.exists()) {
        return true;
    }
    workspace.is_some_and(|ws| workspace_config_path(ws).exists())
}
