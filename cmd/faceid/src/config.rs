//! Optional YAML defaults for the search command.
//!
//! ```yaml
//! search_type: person_level_max
//! top_k: 5
//! min_score: 0.6
//! ```

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use giztoy_faceid::SearchType;
use serde::Deserialize;

/// Default number of results.
pub const DEFAULT_TOP_K: usize = 10;

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct Config {
    pub search_type: SearchType,
    pub top_k: usize,
    pub min_score: Option<f32>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            search_type: SearchType::PersonLevelAvg,
            top_k: DEFAULT_TOP_K,
            min_score: None,
        }
    }
}

impl Config {
    pub fn from_yaml(s: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(s)?)
    }

    /// Loads `path`, or returns the defaults when no path is given.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let Some(path) = path else {
            return Ok(Self::default());
        };
        let data = fs::read_to_string(path)
            .with_context(|| format!("read config {}", path.display()))?;
        Self::from_yaml(&data).with_context(|| format!("parse config {}", path.display()))
    }
}

/// Reads a feature vector stored as a JSON array of numbers.
pub fn read_feature(path: &Path) -> Result<Vec<f32>> {
    let data = fs::read_to_string(path)
        .with_context(|| format!("read feature {}", path.display()))?;
    let feature: Vec<f32> = serde_json::from_str(&data)
        .with_context(|| format!("parse feature {}", path.display()))?;
    anyhow::ensure!(!feature.is_empty(), "feature {} is empty", path.display());
    Ok(feature)
}
