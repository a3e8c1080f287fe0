use crate::quality::{apply_gate, GateOutcome, QualityMetrics, RejectReason, Thresholds};
use crate::signal::{BpEstimate, SignalPair};
use crate::windowing::{
    generate_windows, segment_summary, summarize_windows, BpRanges, WindowingParams,
};
use serde::{Deserialize, Serialize};

/// Every knob of the quality and segmentation pipeline.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QualityConfig {
    pub thresholds: Thresholds,
    pub windowing: WindowingParams,
    pub bp_ranges: BpRanges,
}

/// Figures gathered while evaluating a segment.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct GateMetrics {
    #[serde(flatten)]
    pub quality: QualityMetrics,
    pub window_count: usize,
    pub sentinel_windows: usize,
    pub summary: Option<BpEstimate>,
}

#[derive(Debug, Clone)]
pub enum Decision {
    /// The interpolated pair and its segment-level estimate.
    Accepted {
        pair: SignalPair,
        summary: BpEstimate,
    },
    Rejected(RejectReason),
}

#[derive(Debug, Clone)]
pub struct Evaluation {
    pub decision: Decision,
    pub metrics: GateMetrics,
}

impl Evaluation {
    pub fn is_accepted(&self) -> bool {
        matches!(self.decision, Decision::Accepted { .. })
    }

    pub fn reject_reason(&self) -> Option<RejectReason> {
        match self.decision {
            Decision::Rejected(reason) => Some(reason),
            Decision::Accepted { .. } => None,
        }
    }
}

/// Quality gate, windowing, per-window BP estimation and plausibility gate.
pub fn evaluate_segment(pair: &SignalPair, cfg: &QualityConfig) -> Evaluation {
    let (outcome, quality) = apply_gate(pair, &cfg.thresholds);
    let mut metrics = GateMetrics {
        quality,
        ..GateMetrics::default()
    };
    let clean = match outcome {
        GateOutcome::Pass(clean) => clean,
        GateOutcome::Reject(reason) => {
            return Evaluation {
                decision: Decision::Rejected(reason),
                metrics,
            }
        }
    };

    // Invalid window parameters leave no windows, which the plausibility gate rejects.
    let windows = generate_windows(
        cfg.windowing.win_len_seconds,
        clean.fs,
        clean.len(),
        cfg.windowing.win_overlap,
    )
    .unwrap_or_else(|err| {
        log::warn!("no windows generated: {}", err);
        Vec::new()
    });
    let summaries = summarize_windows(&clean.abp, &windows);
    let summary = segment_summary(&summaries);
    metrics.window_count = windows.len();
    metrics.sentinel_windows = summaries.iter().filter(|s| s.is_sentinel()).count();
    metrics.summary = Some(summary);

    let decision = if cfg.bp_ranges.contains(&summary) {
        Decision::Accepted {
            pair: clean,
            summary,
        }
    } else {
        Decision::Rejected(RejectReason::ImplausibleBp)
    };
    Evaluation { decision, metrics }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f64::consts::PI;

    fn sine(n: usize, fs: f64, freq: f64, lo: f64, hi: f64) -> Vec<f64> {
        let mid = (hi + lo) / 2.0;
        let amp = (hi - lo) / 2.0;
        (0..n)
            .map(|i| mid + amp * (2.0 * PI * freq * i as f64 / fs).sin())
            .collect()
    }

    fn synthetic_pair() -> SignalPair {
        SignalPair::new(
            125.0,
            sine(5000, 125.0, 1.0, 80.0, 160.0),
            sine(5000, 125.0, 1.2, 0.2, 1.8),
        )
    }

    #[test]
    fn sinusoidal_pressure_is_accepted() {
        let eval = evaluate_segment(&synthetic_pair(), &QualityConfig::default());
        let summary = match eval.decision {
            Decision::Accepted { summary, ref pair } => {
                assert_eq!(pair.len(), 5000);
                summary
            }
            Decision::Rejected(reason) => panic!("rejected: {}", reason),
        };
        assert!((summary.sbp - 160.0).abs() < 0.5, "sbp {}", summary.sbp);
        assert!((summary.dbp - 80.0).abs() < 0.5, "dbp {}", summary.dbp);
        assert_eq!(eval.metrics.window_count, 3);
        assert_eq!(eval.metrics.sentinel_windows, 0);
    }

    #[test]
    fn ten_percent_missing_is_rejected() {
        let mut pair = synthetic_pair();
        for v in pair.abp.iter_mut().step_by(10) {
            *v = f64::NAN;
        }
        let eval = evaluate_segment(&pair, &QualityConfig::default());
        assert_eq!(eval.reject_reason(), Some(RejectReason::TooManyMissing));
        assert!(eval.metrics.summary.is_none());
    }

    #[test]
    fn constant_pressure_is_rejected_as_flat() {
        let mut pair = synthetic_pair();
        pair.abp = vec![120.0; 5000];
        let eval = evaluate_segment(&pair, &QualityConfig::default());
        assert_eq!(eval.reject_reason(), Some(RejectReason::TooFlat));
    }

    #[test]
    fn out_of_range_pressure_is_implausible() {
        let mut pair = synthetic_pair();
        pair.abp = sine(5000, 125.0, 1.0, 150.0, 260.0);
        let eval = evaluate_segment(&pair, &QualityConfig::default());
        assert_eq!(eval.reject_reason(), Some(RejectReason::ImplausibleBp));
        assert!(eval.metrics.summary.unwrap().sbp > 220.0);
    }

    #[test]
    fn too_short_for_one_window_is_implausible() {
        let pair = SignalPair::new(
            125.0,
            sine(1000, 125.0, 1.0, 80.0, 160.0),
            sine(1000, 125.0, 1.2, 0.2, 1.8),
        );
        let eval = evaluate_segment(&pair, &QualityConfig::default());
        assert_eq!(eval.metrics.window_count, 0);
        assert_eq!(eval.reject_reason(), Some(RejectReason::ImplausibleBp));
    }

    #[test]
    fn sub_sample_window_rejects_the_segment_only() {
        let mut cfg = QualityConfig::default();
        cfg.windowing.win_len_seconds = 0.004;
        let eval = evaluate_segment(&synthetic_pair(), &cfg);
        assert_eq!(eval.metrics.window_count, 0);
        assert_eq!(eval.reject_reason(), Some(RejectReason::ImplausibleBp));
    }
}
