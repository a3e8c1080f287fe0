use anyhow::{Context, Result};
use bpseg_lib::{BpRanges, QualityConfig, Thresholds, WindowingParams};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// Batch run settings, read from TOML. Every field has a default.
///
/// ```toml
/// min_duration_minutes = 8
/// parallelism = 10
///
/// [thresholds]
/// nans_th = 0.05
/// flat_th = 0.05
///
/// [windowing]
/// win_len_seconds = 20
/// win_overlap = 0.5
///
/// [bp_ranges]
/// low_sbp = 60.0
/// up_sbp = 220.0
/// low_dbp = 30.0
/// up_dbp = 140.0
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    pub thresholds: Thresholds,
    pub windowing: WindowingParams,
    pub bp_ranges: BpRanges,
    /// Records shorter than this are rejected before the quality gate.
    pub min_duration_minutes: f64,
    /// Worker count; `None` uses every available core.
    pub parallelism: Option<usize>,
    /// Overrides the database named on the manifest's first line.
    pub database: Option<String>,
    /// Channel holding arterial blood pressure.
    pub abp_signal: String,
    /// Channel holding the photoplethysmogram.
    pub ppg_signal: String,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            thresholds: Thresholds::default(),
            windowing: WindowingParams::default(),
            bp_ranges: BpRanges::default(),
            min_duration_minutes: 8.0,
            parallelism: None,
            database: None,
            abp_signal: "ABP".into(),
            ppg_signal: "PLETH".into(),
        }
    }
}

impl RunConfig {
    pub fn quality(&self) -> QualityConfig {
        QualityConfig {
            thresholds: self.thresholds,
            windowing: self.windowing,
            bp_ranges: self.bp_ranges,
        }
    }

    /// Worker count bounded by the machine's available parallelism.
    pub fn worker_count(&self) -> usize {
        let available = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1);
        self.parallelism.unwrap_or(available).clamp(1, available)
    }
}

pub fn parse_config(text: &str) -> Result<RunConfig> {
    toml::from_str(text).context("parsing run configuration")
}

pub fn read_config(path: &Path) -> Result<RunConfig> {
    let contents = fs::read_to_string(path)
        .with_context(|| format!("failed to read config {}", path.display()))?;
    let config: RunConfig =
        toml::from_str(&contents).with_context(|| format!("parsing config {}", path.display()))?;
    Ok(config)
}
