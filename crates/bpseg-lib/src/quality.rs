use crate::interp::interpolate_missing;
use crate::signal::SignalPair;
use serde::{Deserialize, Serialize};

/// Permitted share of anomalies in a segment and the flat-line detector settings.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Thresholds {
    /// Maximum fraction of missing samples.
    pub nans_th: f64,
    /// Maximum fraction of flat samples.
    pub flat_th: f64,
    /// Two samples closer than this are considered equal.
    pub flat_tolerance: f64,
    /// Lookahead (samples) of the flat-line comparison.
    pub flat_window: usize,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            nans_th: 0.05,
            flat_th: 0.05,
            flat_tolerance: 1e-5,
            flat_window: 3,
        }
    }
}

/// Why a segment was discarded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RejectReason {
    TooManyMissing,
    TooFlat,
    ImplausibleBp,
    TooShort,
}

impl RejectReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            RejectReason::TooManyMissing => "too_many_missing",
            RejectReason::TooFlat => "too_flat",
            RejectReason::ImplausibleBp => "implausible_bp",
            RejectReason::TooShort => "too_short",
        }
    }
}

impl std::fmt::Display for RejectReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Fraction of `NaN` samples. Empty and fully missing signals yield 1.0.
pub fn fraction_missing(signal: &[f64]) -> f64 {
    if signal.is_empty() {
        return 1.0;
    }
    signal.iter().filter(|x| x.is_nan()).count() as f64 / signal.len() as f64
}

/// Flat-line mask: position `j` is flagged when `|x[j - window] - x[j]| < tolerance`.
/// The first `window` positions are never flagged.
pub fn detect_flat_regions(signal: &[f64], tolerance: f64, window: usize) -> Vec<bool> {
    let mut mask = vec![false; signal.len()];
    for j in window..signal.len() {
        mask[j] = (signal[j - window] - signal[j]).abs() < tolerance;
    }
    mask
}

/// Share of samples flagged by [`detect_flat_regions`].
pub fn fraction_flat(signal: &[f64], tolerance: f64, window: usize) -> f64 {
    if signal.is_empty() {
        return 0.0;
    }
    let flagged = detect_flat_regions(signal, tolerance, window)
        .into_iter()
        .filter(|&flat| flat)
        .count();
    flagged as f64 / signal.len() as f64
}

/// Completeness and flatness figures collected while gating a pair.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct QualityMetrics {
    pub abp_missing: f64,
    pub ppg_missing: f64,
    pub abp_flat: Option<f64>,
    pub ppg_flat: Option<f64>,
}

/// Outcome of the quality gate.
#[derive(Debug, Clone)]
pub enum GateOutcome {
    /// Both signals, fully interpolated.
    Pass(SignalPair),
    Reject(RejectReason),
}

/// Missingness check, interpolation and flatness check, in that order.
///
/// The pressure channel is rejected only above a threshold while the
/// plethysmogram is rejected at or above it.
pub fn apply_gate(pair: &SignalPair, th: &Thresholds) -> (GateOutcome, QualityMetrics) {
    let mut metrics = QualityMetrics {
        abp_missing: fraction_missing(&pair.abp),
        ppg_missing: fraction_missing(&pair.ppg),
        ..QualityMetrics::default()
    };
    if metrics.abp_missing > th.nans_th || metrics.ppg_missing >= th.nans_th {
        return (GateOutcome::Reject(RejectReason::TooManyMissing), metrics);
    }

    let mut abp = pair.abp.clone();
    let mut ppg = pair.ppg.clone();
    if interpolate_missing(&mut abp).is_err() || interpolate_missing(&mut ppg).is_err() {
        return (GateOutcome::Reject(RejectReason::TooManyMissing), metrics);
    }

    let abp_flat = fraction_flat(&abp, th.flat_tolerance, th.flat_window);
    let ppg_flat = fraction_flat(&ppg, th.flat_tolerance, th.flat_window);
    metrics.abp_flat = Some(abp_flat);
    metrics.ppg_flat = Some(ppg_flat);
    if abp_flat > th.flat_th || ppg_flat >= th.flat_th {
        return (GateOutcome::Reject(RejectReason::TooFlat), metrics);
    }

    (GateOutcome::Pass(SignalPair::new(pair.fs, abp, ppg)), metrics)
}
