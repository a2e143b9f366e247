//! Settings for an analysis run.
//!
//! Values are layered with the `config` crate: built-in defaults, then an
//! optional settings file (`cartwise.toml`, `cartwise.json`, ... in the working
//! directory, or an explicit path), then `CARTWISE_*` environment variables
//! using `__` between section and key, e.g. `CARTWISE_MINING__MIN_SUPPORT=0.1`.
//!
//! The defaults mirror the usual market-basket policy: 5% minimum support and
//! rules ranked by lift with a threshold of 1.0.

use std::path::Path;

use ::config::{Config, Environment, File, FileFormat};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::encode::{DEFAULT_MISSING_MARKERS, Encoder};
use crate::error::Result;
use crate::index::QueryMode;
use crate::mine::{DEFAULT_SHARD_SIZE, Miner, validate_min_support};
use crate::rules::{DEFAULT_EXHAUSTIVE_SPLIT_CAP, Metric, RuleGenerator};

pub const ENV_PREFIX: &str = "CARTWISE";
pub const DEFAULT_FILE_NAME: &str = "cartwise";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MiningSettings {
    pub min_support: f64,
    pub max_len: Option<usize>,
    pub shard_size: usize,
}
impl Default for MiningSettings {
    fn default() -> Self {
        Self {
            min_support: 0.05,
            max_len: None,
            shard_size: DEFAULT_SHARD_SIZE,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuleSettings {
    pub metric: Metric,
    pub min_threshold: f64,
    pub exhaustive_split_cap: usize,
}
impl Default for RuleSettings {
    fn default() -> Self {
        Self {
            metric: Metric::Lift,
            min_threshold: 1.0,
            exhaustive_split_cap: DEFAULT_EXHAUSTIVE_SPLIT_CAP,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EncoderSettings {
    pub missing_markers: Vec<String>,
}
impl Default for EncoderSettings {
    fn default() -> Self {
        Self {
            missing_markers: DEFAULT_MISSING_MARKERS.iter().map(|m| m.to_string()).collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexSettings {
    pub default_mode: QueryMode,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub mining: MiningSettings,
    pub rules: RuleSettings,
    pub encoder: EncoderSettings,
    pub index: IndexSettings,
}

impl Settings {
    /// Loads settings from `path` when given (it must exist), otherwise from an
    /// optional `cartwise.*` file, and then applies environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let file = match path {
            Some(path) => File::from(path).required(true),
            None => File::with_name(DEFAULT_FILE_NAME).required(false),
        };
        let layered = Config::builder()
            .add_source(file)
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;
        let settings = Self::from_config(layered)?;
        debug!(?settings, "settings loaded");
        Ok(settings)
    }

    /// Parses settings from an in-memory document, without environment overrides.
    pub fn parse(source: &str, format: FileFormat) -> Result<Self> {
        let document = Config::builder()
            .add_source(File::from_str(source, format))
            .build()?;
        Self::from_config(document)
    }

    fn from_config(source: Config) -> Result<Self> {
        // Names are checked first so that a misspelt one is reported as an
        // invalid argument rather than a deserialization failure.
        if let Ok(metric) = source.get_string("rules.metric") {
            metric.parse::<Metric>()?;
        }
        if let Ok(mode) = source.get_string("index.default_mode") {
            mode.parse::<QueryMode>()?;
        }
        let settings: Settings = source.try_deserialize()?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<()> {
        validate_min_support(self.mining.min_support)?;
        self.rules.metric.validate_threshold(self.rules.min_threshold)
    }

    pub fn encoder(&self) -> Encoder {
        Encoder::with_missing_markers(&self.encoder.missing_markers)
    }

    pub fn miner(&self) -> Result<Miner> {
        Ok(Miner::new(self.mining.min_support)?
            .with_max_len(self.mining.max_len)
            .with_shard_size(self.mining.shard_size))
    }

    pub fn rule_generator(&self) -> Result<RuleGenerator> {
        Ok(RuleGenerator::new(self.rules.metric, self.rules.min_threshold)?
            .with_exhaustive_split_cap(self.rules.exhaustive_split_cap))
    }
}
