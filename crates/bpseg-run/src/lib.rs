//! Batch processing of MIMIC-III matched waveform segments: configuration,
//! record sources, the worker pool and the on-disk output tree.

pub mod config;
pub mod report;
pub mod runner;
pub mod source;
pub mod store;

pub use config::{parse_config, read_config, RunConfig};
pub use report::{Outcome, RunReport, RunSummary, SegmentReport, OUTCOMES_FILE};
pub use runner::Runner;
pub use source::{
    FetchError, LocalWfdbSource, PhysionetSource, SegmentSource, SyntheticSource,
    PHYSIONET_FILES,
};
pub use store::{OutputStore, PersistError, SegmentMeta};
