use crate::config::RunConfig;
use crate::report::{Outcome, RunReport, SegmentReport};
use crate::source::{FetchError, SegmentSource};
use crate::store::OutputStore;
use anyhow::{Context, Result};
use bpseg_lib::io::manifest::Manifest;
use bpseg_lib::{evaluate_segment, Decision, QualityConfig, RejectReason, SegmentId};
use log::{error, info, warn};
use rayon::prelude::*;

/// Drives every segment of a manifest through fetch, evaluation and persistence.
pub struct Runner<'a> {
    config: &'a RunConfig,
    quality: QualityConfig,
    source: &'a dyn SegmentSource,
    store: OutputStore,
    resume: bool,
}

impl<'a> Runner<'a> {
    pub fn new(config: &'a RunConfig, source: &'a dyn SegmentSource, store: OutputStore) -> Self {
        Self {
            config,
            quality: config.quality(),
            source,
            store,
            resume: false,
        }
    }

    /// Skip identities whose output is already complete.
    pub fn resume(mut self, resume: bool) -> Self {
        self.resume = resume;
        self
    }

    pub fn store(&self) -> &OutputStore {
        &self.store
    }

    /// Process the manifest on a pool of workers. Reports come back in manifest order.
    pub fn run(&self, manifest: &Manifest) -> Result<RunReport> {
        let database = self
            .config
            .database
            .clone()
            .unwrap_or_else(|| manifest.database.clone());
        let ids = manifest.unique_segments();
        let workers = self.config.worker_count();
        info!(
            "Processing {} segment(s) of {} from {} with {} worker(s)",
            ids.len(),
            database,
            self.source.describe(),
            workers
        );
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(workers)
            .build()
            .context("building worker pool")?;
        let segments = pool.install(|| {
            ids.par_iter()
                .map(|id| self.process_segment(&database, id))
                .collect::<Vec<_>>()
        });
        Ok(RunReport { database, segments })
    }

    /// Evaluate one segment end to end. Never fails: every problem becomes an outcome.
    pub fn process_segment(&self, database: &str, id: &SegmentId) -> SegmentReport {
        if self.resume && self.store.is_complete(id) {
            info!("Already complete {}", id);
            return SegmentReport::new(id.clone(), Outcome::Skipped);
        }
        info!("Processing {}", id);

        let record = match self.source.fetch(database, id) {
            Ok(record) => record,
            Err(err) => {
                warn!("{}", err);
                return SegmentReport::new(id.clone(), Outcome::FetchFailed)
                    .with_detail(err.to_string());
            }
        };
        let pair = match record.signal_pair(&self.config.abp_signal, &self.config.ppg_signal) {
            Ok(pair) => pair,
            Err(missing) => {
                let err = FetchError::MissingSignal {
                    id: id.clone(),
                    signal: missing.0,
                };
                warn!("{}", err);
                return SegmentReport::new(id.clone(), Outcome::FetchFailed)
                    .with_detail(err.to_string());
            }
        };

        if pair.duration_minutes() < self.config.min_duration_minutes {
            info!(
                "Too short ({:.1} min) for {}",
                pair.duration_minutes(),
                id
            );
            return SegmentReport::rejected(id.clone(), RejectReason::TooShort, None);
        }

        let evaluation = evaluate_segment(&pair, &self.quality);
        let metrics = evaluation.metrics;
        match evaluation.decision {
            Decision::Rejected(reason) => {
                info!("Rejected {}: {}", id, reason);
                SegmentReport::rejected(id.clone(), reason, Some(metrics))
            }
            Decision::Accepted { pair, summary } => {
                match self
                    .store
                    .persist(id, &pair, summary, metrics.window_count)
                {
                    Ok(path) => {
                        info!("Saved {}", path.display());
                        let mut report = SegmentReport::new(id.clone(), Outcome::Saved);
                        report.metrics = Some(metrics);
                        report
                    }
                    Err(err) => {
                        error!("{}", err);
                        let mut report = SegmentReport::new(id.clone(), Outcome::PersistFailed)
                            .with_detail(err.to_string());
                        report.metrics = Some(metrics);
                        report
                    }
                }
            }
        }
    }
}
