use anyhow::{Context, Result};
use bpseg_lib::{GateMetrics, RejectReason, SegmentId};
use csv::WriterBuilder;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

pub const OUTCOMES_FILE: &str = "outcomes.csv";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    Saved,
    Rejected,
    FetchFailed,
    PersistFailed,
    Skipped,
}

impl Outcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Outcome::Saved => "saved",
            Outcome::Rejected => "rejected",
            Outcome::FetchFailed => "fetch_failed",
            Outcome::PersistFailed => "persist_failed",
            Outcome::Skipped => "skipped",
        }
    }
}

/// What happened to one identity of the manifest.
#[derive(Debug, Clone, Serialize)]
pub struct SegmentReport {
    pub id: SegmentId,
    pub outcome: Outcome,
    pub reason: Option<RejectReason>,
    pub metrics: Option<GateMetrics>,
    pub detail: Option<String>,
}

impl SegmentReport {
    pub fn new(id: SegmentId, outcome: Outcome) -> Self {
        Self {
            id,
            outcome,
            reason: None,
            metrics: None,
            detail: None,
        }
    }

    pub fn rejected(id: SegmentId, reason: RejectReason, metrics: Option<GateMetrics>) -> Self {
        Self {
            reason: Some(reason),
            metrics,
            ..Self::new(id, Outcome::Rejected)
        }
    }

    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }
}

/// Counts per outcome and per rejection reason.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    pub database: String,
    pub total: usize,
    pub saved: usize,
    pub rejected: usize,
    pub fetch_failed: usize,
    pub persist_failed: usize,
    pub skipped: usize,
    pub reasons: BTreeMap<String, usize>,
}

#[derive(Debug, Clone)]
pub struct RunReport {
    pub database: String,
    pub segments: Vec<SegmentReport>,
}

impl RunReport {
    pub fn summary(&self) -> RunSummary {
        let mut summary = RunSummary {
            database: self.database.clone(),
            total: self.segments.len(),
            ..RunSummary::default()
        };
        for seg in &self.segments {
            match seg.outcome {
                Outcome::Saved => summary.saved += 1,
                Outcome::Rejected => summary.rejected += 1,
                Outcome::FetchFailed => summary.fetch_failed += 1,
                Outcome::PersistFailed => summary.persist_failed += 1,
                Outcome::Skipped => summary.skipped += 1,
            }
            if let Some(reason) = seg.reason {
                *summary.reasons.entry(reason.as_str().to_string()).or_insert(0) += 1;
            }
        }
        summary
    }

    /// One row per identity, in manifest order.
    pub fn write_csv(&self, path: &Path) -> Result<()> {
        let file = fs::File::create(path)
            .with_context(|| format!("failed to create {}", path.display()))?;
        let mut writer = WriterBuilder::new().from_writer(file);
        writer.write_record([
            "segment",
            "outcome",
            "reason",
            "sbp",
            "dbp",
            "windows",
            "sentinel_windows",
            "abp_missing",
            "ppg_missing",
            "abp_flat",
            "ppg_flat",
            "detail",
        ])?;
        let opt = |v: Option<f64>| v.map(|v| v.to_string()).unwrap_or_default();
        for seg in &self.segments {
            let m = seg.metrics;
            let summary = m.and_then(|m| m.summary);
            writer.write_record(&[
                seg.id.to_string(),
                seg.outcome.as_str().to_string(),
                seg.reason.map(|r| r.as_str().to_string()).unwrap_or_default(),
                opt(summary.map(|s| s.sbp)),
                opt(summary.map(|s| s.dbp)),
                m.map(|m| m.window_count.to_string()).unwrap_or_default(),
                m.map(|m| m.sentinel_windows.to_string()).unwrap_or_default(),
                opt(m.map(|m| m.quality.abp_missing)),
                opt(m.map(|m| m.quality.ppg_missing)),
                opt(m.and_then(|m| m.quality.abp_flat)),
                opt(m.and_then(|m| m.quality.ppg_flat)),
                seg.detail.clone().unwrap_or_default(),
            ])?;
        }
        writer.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bpseg_lib::{BpEstimate, QualityMetrics};
    use csv::ReaderBuilder;

    fn report() -> RunReport {
        let metrics = GateMetrics {
            quality: QualityMetrics {
                abp_missing: 0.0,
                ppg_missing: 0.01,
                abp_flat: Some(0.0),
                ppg_flat: Some(0.0),
            },
            window_count: 59,
            sentinel_windows: 1,
            summary: Some(BpEstimate::new(121.5, 79.25)),
        };
        let mut saved = SegmentReport::new("p01/p011018/3195243_0010".parse().unwrap(), Outcome::Saved);
        saved.metrics = Some(metrics);
        RunReport {
            database: "mimic3wdb-matched/1.0".into(),
            segments: vec![
                saved,
                SegmentReport::rejected(
                    "p01/p011018/3195243_0011".parse().unwrap(),
                    RejectReason::TooFlat,
                    None,
                ),
                SegmentReport::rejected(
                    "p01/p011018/3195243_0012".parse().unwrap(),
                    RejectReason::TooFlat,
                    None,
                ),
                SegmentReport::new("p04/p040000/3506991_0001".parse().unwrap(), Outcome::FetchFailed)
                    .with_detail("segment p04/p040000/3506991_0001 not found"),
            ],
        }
    }

    #[test]
    fn summary_counts_outcomes_and_reasons() {
        let summary = report().summary();
        assert_eq!(summary.total, 4);
        assert_eq!(summary.saved, 1);
        assert_eq!(summary.rejected, 2);
        assert_eq!(summary.fetch_failed, 1);
        assert_eq!(summary.reasons.get("too_flat"), Some(&2));
        assert_eq!(summary.reasons.len(), 1);
    }

    #[test]
    fn csv_keeps_manifest_order() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(OUTCOMES_FILE);
        report().write_csv(&path).unwrap();
        let mut reader = ReaderBuilder::new().from_path(&path).unwrap();
        let rows: Vec<csv::StringRecord> = reader.records().map(|r| r.unwrap()).collect();
        assert_eq!(rows.len(), 4);
        assert_eq!(&rows[0][0], "p01/p011018/3195243_0010");
        assert_eq!(&rows[0][1], "saved");
        assert_eq!(&rows[0][3], "121.5");
        assert_eq!(&rows[0][5], "59");
        assert_eq!(&rows[1][2], "too_flat");
        assert_eq!(&rows[1][3], "");
        assert_eq!(&rows[3][1], "fetch_failed");
        assert!(rows[3][11].contains("not found"));
    }
}
