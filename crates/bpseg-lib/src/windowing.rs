use crate::error::{Error, Result};
use crate::interp::interpolate_missing;
use crate::peaks::{local_maxima, local_minima};
use crate::signal::BpEstimate;
use log::debug;
use serde::{Deserialize, Serialize};

/// Sliding window parameters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WindowingParams {
    /// Window length in seconds.
    pub win_len_seconds: f64,
    /// Fraction of a window shared with its neighbour.
    pub win_overlap: f64,
}

impl Default for WindowingParams {
    fn default() -> Self {
        Self {
            win_len_seconds: 20.0,
            win_overlap: 0.5,
        }
    }
}

/// Physiologically plausible blood-pressure ranges (mmHg, inclusive).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BpRanges {
    pub low_sbp: f64,
    pub up_sbp: f64,
    pub low_dbp: f64,
    pub up_dbp: f64,
}

impl Default for BpRanges {
    fn default() -> Self {
        Self {
            low_sbp: 60.0,
            up_sbp: 220.0,
            low_dbp: 30.0,
            up_dbp: 140.0,
        }
    }
}

impl BpRanges {
    /// `NaN` estimates are never plausible.
    pub fn contains(&self, bp: &BpEstimate) -> bool {
        bp.sbp >= self.low_sbp
            && bp.sbp <= self.up_sbp
            && bp.dbp >= self.low_dbp
            && bp.dbp <= self.up_dbp
    }
}

/// Half-open sample range `[start, stop)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Window {
    pub start: usize,
    pub stop: usize,
}

impl Window {
    pub fn len(&self) -> usize {
        self.stop - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.stop == self.start
    }

    pub fn slice<'a>(&self, data: &'a [f64]) -> &'a [f64] {
        &data[self.start..self.stop]
    }
}

/// Overlapping windows over a signal of `n_samples`.
///
/// With `L = window_seconds * fs` and `S = L - round(overlap * L)`, starts are
/// `round(k * S)` while `k * S < n_samples - L + 1` and each stop is
/// `round(start + L - 1)`. Rounding is half-to-even.
pub fn generate_windows(
    window_seconds: f64,
    fs: f64,
    n_samples: usize,
    overlap: f64,
) -> Result<Vec<Window>> {
    let win_len = window_seconds * fs;
    if win_len < 1.0 || !win_len.is_finite() {
        return Err(Error::InvalidParameter(format!(
            "window must span at least one sample, got {} s at {} Hz",
            window_seconds, fs
        )));
    }
    let step = win_len - (overlap * win_len).round_ties_even();
    if step <= 0.0 || step.is_nan() {
        return Err(Error::InvalidParameter(format!(
            "overlap {} leaves no step between windows",
            overlap
        )));
    }
    let span = n_samples as f64 - win_len + 1.0;
    if span <= 0.0 {
        return Ok(Vec::new());
    }
    let count = (span / step).ceil() as usize;
    let windows = (0..count)
        .map(|k| {
            let start = (k as f64 * step).round_ties_even();
            let stop = (start + win_len - 1.0).round_ties_even();
            Window {
                start: start as usize,
                stop: (stop as usize).min(n_samples),
            }
        })
        .collect();
    Ok(windows)
}

/// Systolic/diastolic estimate of one pressure window: mean pressure at the
/// peaks and at the valleys. Windows without peaks or valleys, and windows
/// that cannot be interpolated, yield [`BpEstimate::SENTINEL`].
pub fn summarize_window(window: &[f64]) -> BpEstimate {
    let mut sig = window.to_vec();
    if let Err(err) = interpolate_missing(&mut sig) {
        debug!("window of {} samples left unsummarized: {}", window.len(), err);
        return BpEstimate::SENTINEL;
    }
    let peaks = local_maxima(&sig);
    let valleys = local_minima(&sig);
    if peaks.is_empty() || valleys.is_empty() {
        return BpEstimate::SENTINEL;
    }
    BpEstimate {
        sbp: mean_at(&sig, &peaks),
        dbp: mean_at(&sig, &valleys),
    }
}

fn mean_at(sig: &[f64], idx: &[usize]) -> f64 {
    idx.iter().map(|&i| sig[i]).sum::<f64>() / idx.len() as f64
}

/// Mean of the window estimates, sentinels included. `NaN` when empty.
pub fn segment_summary(summaries: &[BpEstimate]) -> BpEstimate {
    // TODO: sentinel windows drag the mean towards zero; exclude them once
    // previously curated datasets no longer need to be reproduced.
    if summaries.is_empty() {
        return BpEstimate::new(f64::NAN, f64::NAN);
    }
    let n = summaries.len() as f64;
    BpEstimate {
        sbp: summaries.iter().map(|b| b.sbp).sum::<f64>() / n,
        dbp: summaries.iter().map(|b| b.dbp).sum::<f64>() / n,
    }
}

/// Summaries for every window of `abp`.
pub fn summarize_windows(abp: &[f64], windows: &[Window]) -> Vec<BpEstimate> {
    windows
        .iter()
        .map(|w| summarize_window(w.slice(abp)))
        .collect()
}
