//! TOML backtest configuration.
//!
//! Every section falls back to its defaults, so an empty file is a valid
//! config. `validate()` runs before any data is touched.

use diplab_core::engine::ExecutionConfig;
use diplab_core::entry::EntryConfig;
use diplab_core::signals::SignalConfig;
use diplab_core::ConfigError;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Content-addressed identifier for a run (BLAKE3 hex of the config).
pub type RunId = String;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DataConfig {
    /// Hourly OHLCV CSV.
    pub hourly_path: PathBuf,
    /// Pre-computed daily permissions. The signal stage runs when absent.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub signals_path: Option<PathBuf>,
    /// Fill missing hours with flat candles before validation.
    pub repair_gaps: bool,
}

impl Default for DataConfig {
    fn default() -> Self {
        Self {
            hourly_path: PathBuf::from("data/hourly.csv"),
            signals_path: None,
            repair_gaps: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    pub dir: PathBuf,
    pub save_config_snapshot: bool,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("results"),
            save_config_snapshot: true,
        }
    }
}

/// Full pipeline configuration, one section per stage.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BacktestConfig {
    pub data: DataConfig,
    pub signals: SignalConfig,
    pub entry: EntryConfig,
    pub execution: ExecutionConfig,
    pub output: OutputConfig,
}

impl BacktestConfig {
    /// Parse and validate a TOML document.
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(s).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::Parse(format!("reading {}: {e}", path.display())))?;
        Self::from_toml_str(&text)
    }

    /// Range checks per stage, plus agreement between the entry scan and the
    /// simulator on the dip threshold.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.signals.validate()?;
        self.entry.validate()?;
        self.execution.validate()?;
        if self.entry.dip_pct != self.execution.dip_pct {
            return Err(ConfigError::OutOfRange {
                field: "entry.dip_pct",
                reason: format!(
                    "{} differs from execution.dip_pct {}",
                    self.entry.dip_pct, self.execution.dip_pct
                ),
            });
        }
        Ok(())
    }

    pub fn to_toml_string(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    /// Deterministic id: identical configs give identical ids.
    pub fn run_id(&self) -> RunId {
        let json = serde_json::to_string(self).unwrap_or_else(|_| format!("{self:?}"));
        blake3::hash(json.as_bytes()).to_hex().to_string()
    }
}

/// First 12 hex chars of a run id, used for directory names.
pub fn short_id(run_id: &str) -> &str {
    &run_id[..run_id.len().min(12)]
}
