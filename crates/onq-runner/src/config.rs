use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Config {
    pub resources: ResourcesConfig,
    pub scoring: ScoringConfig,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ResourcesConfig {
    /// Root holding `production/`, `fallback/` and `codelists.json`.
    pub root: PathBuf,
    /// Optional external codelist resource; the bundled issue otherwise.
    #[serde(default)]
    pub codelists: Option<PathBuf>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ScoringConfig {
    /// Profiles evaluated when a run does not name its own set.
    pub default_retailers: Vec<String>,
}

impl Config {
    pub fn default_for(resources_root: &Path) -> Self {
        Self {
            resources: ResourcesConfig { root: resources_root.to_path_buf(), codelists: None },
            scoring: ScoringConfig {
                default_retailers: onq_score::profile_keys()
                    .into_iter()
                    .map(str::to_string)
                    .collect(),
            },
        }
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        let s = std::fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
        let cfg: Config = toml::from_str(&s).with_context(|| "parse onq.toml")?;
        Ok(cfg)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).ok();
        }
        let s = toml::to_string_pretty(self).context("serialize onq.toml")?;
        std::fs::write(path, s).with_context(|| format!("write {}", path.display()))?;
        Ok(())
    }
}
