use std::path::{Path, PathBuf};

use anyhow::Context;
use serde::{Deserialize, Serialize};

use crate::aggregate::CompetitionScope;
use crate::classify::DEFAULT_BATCH_SIZE;
use crate::normalize::{EngagementSource, ImpressionsMidpoint, NoEngagement};

pub const DEFAULT_CONFIG_FILE: &str = "gap-scanner.toml";
pub const ENV_COUNTRY: &str = "GAP_SCANNER_COUNTRY";
pub const ENV_TOP_N: &str = "GAP_SCANNER_TOP_N";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EngagementSourceKind {
    #[default]
    None,
    ImpressionsMidpoint,
}

impl EngagementSourceKind {
    pub fn source(self) -> Box<dyn EngagementSource> {
        match self {
            EngagementSourceKind::None => Box::new(NoEngagement),
            EngagementSourceKind::ImpressionsMidpoint => Box::new(ImpressionsMidpoint),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanConfig {
    pub country: String,
    pub top_n: usize,
    pub batch_size: usize,
    pub competition_scope: CompetitionScope,
    pub engagement_source: EngagementSourceKind,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            country: "JO".to_string(),
            top_n: 25,
            batch_size: DEFAULT_BATCH_SIZE,
            competition_scope: CompetitionScope::AllAds,
            engagement_source: EngagementSourceKind::None,
        }
    }
}

impl ScanConfig {
    /// Reads `path`, or `gap-scanner.toml` in the working directory when no
    /// path is given. A missing default file falls back to built-in values.
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        let mut config = match path {
            Some(path) => Self::read(path)?,
            None => {
                let default_path = PathBuf::from(DEFAULT_CONFIG_FILE);
                if default_path.exists() {
                    Self::read(&default_path)?
                } else {
                    ScanConfig::default()
                }
            }
        };
        config.apply_overrides(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    fn read(path: &Path) -> anyhow::Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config {}", path.display()))?;
        Self::parse(&contents).with_context(|| format!("failed to parse config {}", path.display()))
    }

    pub fn parse(contents: &str) -> anyhow::Result<Self> {
        Ok(toml::from_str(contents)?)
    }

    pub fn apply_overrides<F>(&mut self, lookup: F) -> anyhow::Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(country) = lookup(ENV_COUNTRY) {
            let country = country.trim();
            if !country.is_empty() {
                self.country = country.to_uppercase();
            }
        }
        if let Some(top_n) = lookup(ENV_TOP_N) {
            self.top_n = top_n
                .trim()
                .parse()
                .with_context(|| format!("{ENV_TOP_N} must be a positive integer"))?;
        }
        Ok(())
    }
}
