use bpseg_lib::io::npy;
use bpseg_lib::{BpEstimate, SegmentId, SignalPair};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

pub const ABP_FILE: &str = "abp.npy";
pub const PPG_FILE: &str = "ppg.npy";
/// Written last; its presence marks a complete artifact.
pub const MARKER_FILE: &str = "segment.json";

#[derive(Error, Debug)]
#[error("failed to persist {id} under {path}: {message}")]
pub struct PersistError {
    pub id: SegmentId,
    pub path: PathBuf,
    pub message: String,
}

/// Metadata stored next to the arrays of an accepted segment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SegmentMeta {
    pub id: String,
    pub fs: f64,
    pub samples: usize,
    pub sbp: f64,
    pub dbp: f64,
    pub window_count: usize,
}

/// Output tree `<root>/<subfolder>/<patient>/<segment>/`, one directory per accepted segment.
#[derive(Debug, Clone)]
pub struct OutputStore {
    root: PathBuf,
}

impl OutputStore {
    /// Store rooted at `<output_dir>/records`.
    pub fn new(output_dir: &Path) -> Self {
        Self {
            root: output_dir.join("records"),
        }
    }

    pub fn segment_dir(&self, id: &SegmentId) -> PathBuf {
        self.root
            .join(&id.subfolder)
            .join(&id.patient)
            .join(&id.segment)
    }

    /// Replace whatever exists for `id` with the given signals.
    pub fn persist(
        &self,
        id: &SegmentId,
        pair: &SignalPair,
        summary: BpEstimate,
        window_count: usize,
    ) -> Result<PathBuf, PersistError> {
        let dir = self.segment_dir(id);
        let fail = |path: &Path, message: String| PersistError {
            id: id.clone(),
            path: path.to_path_buf(),
            message,
        };
        if dir.exists() {
            fs::remove_dir_all(&dir).map_err(|e| fail(&dir, e.to_string()))?;
        }
        fs::create_dir_all(&dir).map_err(|e| fail(&dir, e.to_string()))?;

        let abp_path = dir.join(ABP_FILE);
        npy::write_f64(&abp_path, &pair.abp).map_err(|e| fail(&abp_path, format!("{:#}", e)))?;
        let ppg_path = dir.join(PPG_FILE);
        npy::write_f64(&ppg_path, &pair.ppg).map_err(|e| fail(&ppg_path, format!("{:#}", e)))?;

        let meta = SegmentMeta {
            id: id.to_string(),
            fs: pair.fs,
            samples: pair.len(),
            sbp: summary.sbp,
            dbp: summary.dbp,
            window_count,
        };
        let marker = dir.join(MARKER_FILE);
        let json = serde_json::to_string_pretty(&meta).map_err(|e| fail(&marker, e.to_string()))?;
        fs::write(&marker, json).map_err(|e| fail(&marker, e.to_string()))?;
        Ok(dir)
    }

    /// Both arrays and the completion marker are present.
    pub fn is_complete(&self, id: &SegmentId) -> bool {
        let dir = self.segment_dir(id);
        [MARKER_FILE, ABP_FILE, PPG_FILE]
            .iter()
            .all(|f| dir.join(f).is_file())
    }

    /// Identities from `ids` without complete output, in their original order.
    pub fn pending<'a>(&self, ids: &'a [SegmentId]) -> Vec<&'a SegmentId> {
        ids.iter().filter(|id| !self.is_complete(id)).collect()
    }

    pub fn read_meta(&self, id: &SegmentId) -> anyhow::Result<SegmentMeta> {
        let path = self.segment_dir(id).join(MARKER_FILE);
        let file = fs::File::open(&path)?;
        Ok(serde_json::from_reader(file)?)
    }

    pub fn read_pair(&self, id: &SegmentId, fs_hz: f64) -> anyhow::Result<SignalPair> {
        let dir = self.segment_dir(id);
        let abp = npy::read_f64(&dir.join(ABP_FILE))?;
        let ppg = npy::read_f64(&dir.join(PPG_FILE))?;
        Ok(SignalPair::new(fs_hz, abp, ppg))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn id() -> SegmentId {
        SegmentId::new("p04", "p040000", "3506991_0001")
    }

    #[test]
    fn persists_arrays_and_marker() {
        let dir = tempdir().unwrap();
        let store = OutputStore::new(dir.path());
        let pair = SignalPair::new(125.0, vec![120.0, 80.0, 121.0], vec![0.1, 0.9, 0.2]);
        let path = store
            .persist(&id(), &pair, BpEstimate::new(121.0, 80.0), 1)
            .unwrap();
        assert!(path.ends_with("records/p04/p040000/3506991_0001"));
        assert!(store.is_complete(&id()));
        let back = store.read_pair(&id(), 125.0).unwrap();
        assert_eq!(back.abp, pair.abp);
        assert_eq!(back.ppg, pair.ppg);
        let meta = store.read_meta(&id()).unwrap();
        assert_eq!(meta.samples, 3);
        assert_eq!(meta.id, "p04/p040000/3506991_0001");
    }

    #[test]
    fn persist_replaces_previous_artifact() {
        let dir = tempdir().unwrap();
        let store = OutputStore::new(dir.path());
        let seg_dir = store.segment_dir(&id());
        fs::create_dir_all(&seg_dir).unwrap();
        fs::write(seg_dir.join("stale.txt"), "partial").unwrap();
        let pair = SignalPair::new(125.0, vec![1.0, 2.0], vec![3.0, 4.0]);
        store
            .persist(&id(), &pair, BpEstimate::new(2.0, 1.0), 0)
            .unwrap();
        assert!(!seg_dir.join("stale.txt").exists());
        assert!(store.is_complete(&id()));
    }

    #[test]
    fn partial_output_is_pending() {
        let dir = tempdir().unwrap();
        let store = OutputStore::new(dir.path());
        let done = SegmentId::new("p01", "p011018", "3195243_0010");
        let partial = id();
        let untouched = SegmentId::new("p09", "p090000", "3000000_0001");
        let pair = SignalPair::new(125.0, vec![1.0, 2.0], vec![3.0, 4.0]);
        store
            .persist(&done, &pair, BpEstimate::new(2.0, 1.0), 0)
            .unwrap();
        let partial_dir = store.segment_dir(&partial);
        fs::create_dir_all(&partial_dir).unwrap();
        npy::write_f64(&partial_dir.join(ABP_FILE), &[1.0]).unwrap();

        let ids = vec![done, partial.clone(), untouched.clone()];
        let pending = store.pending(&ids);
        assert_eq!(pending, vec![&partial, &untouched]);
    }
}
