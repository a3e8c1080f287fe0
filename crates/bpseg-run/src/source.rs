use bpseg_lib::io::wfdb;
use bpseg_lib::{Record, SegmentId};
use log::debug;
use rand::{rngs::StdRng, Rng, SeedableRng};
use std::f64::consts::PI;
use std::fs;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Why a segment could not be obtained from its source.
#[derive(Error, Debug)]
pub enum FetchError {
    #[error("segment {0} not found")]
    NotFound(SegmentId),
    #[error("segment {id} has no '{signal}' signal")]
    MissingSignal { id: SegmentId, signal: String },
    #[error("transport failure for {id}: {message}")]
    Transport { id: SegmentId, message: String },
    #[error("unreadable record {id}: {message}")]
    Format { id: SegmentId, message: String },
}

impl FetchError {
    fn format(id: &SegmentId, err: anyhow::Error) -> Self {
        FetchError::Format {
            id: id.clone(),
            message: format!("{:#}", err),
        }
    }
}

/// Anything able to deliver the recording of a segment.
pub trait SegmentSource: Sync {
    fn fetch(&self, database: &str, id: &SegmentId) -> Result<Record, FetchError>;

    fn describe(&self) -> String;
}

/// Reads records from a local mirror laid out as `<root>/<subfolder>/<patient>/<segment>.hea`.
#[derive(Debug, Clone)]
pub struct LocalWfdbSource {
    pub root: PathBuf,
}

impl LocalWfdbSource {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn header_path(&self, id: &SegmentId) -> PathBuf {
        self.root
            .join(&id.subfolder)
            .join(&id.patient)
            .join(format!("{}.hea", id.segment))
    }
}

impl SegmentSource for LocalWfdbSource {
    fn fetch(&self, _database: &str, id: &SegmentId) -> Result<Record, FetchError> {
        let header = self.header_path(id);
        if !header.exists() {
            return Err(FetchError::NotFound(id.clone()));
        }
        wfdb::load_record(&header).map_err(|err| FetchError::format(id, err))
    }

    fn describe(&self) -> String {
        format!("local WFDB mirror at {}", self.root.display())
    }
}

pub const PHYSIONET_FILES: &str = "https://physionet.org/files";

/// Downloads records over HTTP from PhysioNet (or a compatible mirror).
pub struct PhysionetSource {
    pub base_url: String,
    client: reqwest::blocking::Client,
}

impl PhysionetSource {
    pub fn new(base_url: impl Into<String>) -> anyhow::Result<Self> {
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(300))
            .build()?;
        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client,
        })
    }

    pub fn file_url(&self, database: &str, id: &SegmentId, file: &str) -> String {
        format!(
            "{}/{}/{}/{}",
            self.base_url,
            database.trim_matches('/'),
            id.patient_dir(),
            file
        )
    }

    fn download(&self, url: &str, id: &SegmentId) -> Result<Vec<u8>, FetchError> {
        debug!("GET {}", url);
        let transport = |message: String| FetchError::Transport {
            id: id.clone(),
            message,
        };
        let response = self
            .client
            .get(url)
            .send()
            .map_err(|e| transport(e.to_string()))?;
        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Err(FetchError::NotFound(id.clone()));
        }
        if !response.status().is_success() {
            return Err(transport(format!("{} returned {}", url, response.status())));
        }
        let bytes = response.bytes().map_err(|e| transport(e.to_string()))?;
        Ok(bytes.to_vec())
    }
}

impl SegmentSource for PhysionetSource {
    fn fetch(&self, database: &str, id: &SegmentId) -> Result<Record, FetchError> {
        let header_name = format!("{}.hea", id.segment);
        let header_bytes = self.download(&self.file_url(database, id, &header_name), id)?;
        let header_text = String::from_utf8_lossy(&header_bytes).into_owned();
        let header = wfdb::parse_header(&header_text).map_err(|e| FetchError::format(id, e))?;

        let scratch = tempfile::tempdir().map_err(|e| FetchError::Transport {
            id: id.clone(),
            message: format!("creating scratch directory: {}", e),
        })?;
        let io_err = |e: std::io::Error| FetchError::Transport {
            id: id.clone(),
            message: e.to_string(),
        };
        let header_path = scratch.path().join(&header_name);
        fs::write(&header_path, header_bytes).map_err(io_err)?;
        for file in header.data_files() {
            let bytes = self.download(&self.file_url(database, id, &file), id)?;
            fs::write(scratch.path().join(&file), bytes).map_err(io_err)?;
        }
        wfdb::load_record(&header_path).map_err(|e| FetchError::format(id, e))
    }

    fn describe(&self) -> String {
        format!("PhysioNet at {}", self.base_url)
    }
}

/// Deterministic synthetic ABP/PLETH recordings for dry runs.
///
/// Every identity gets its own seeded generator, so repeated fetches of the
/// same segment return identical samples.
#[derive(Debug, Clone)]
pub struct SyntheticSource {
    pub seed: u64,
    pub fs: f64,
    pub duration_s: f64,
    pub heart_rate_hz: f64,
    pub sbp: f64,
    pub dbp: f64,
    /// Share of samples dropped to `NaN` at random positions.
    pub missing_fraction: f64,
    /// Share of the record, at its end, held at a constant value.
    pub flat_fraction: f64,
    /// Peak-to-peak noise added to both channels.
    pub noise: f64,
}

impl Default for SyntheticSource {
    fn default() -> Self {
        Self {
            seed: 0,
            fs: 125.0,
            duration_s: 600.0,
            heart_rate_hz: 1.2,
            sbp: 120.0,
            dbp: 80.0,
            missing_fraction: 0.0,
            flat_fraction: 0.0,
            noise: 0.5,
        }
    }
}

impl SyntheticSource {
    fn segment_seed(&self, id: &SegmentId) -> u64 {
        // FNV-1a over the identity keeps seeds stable across platforms
        id.to_string()
            .bytes()
            .fold(0xcbf2_9ce4_8422_2325u64 ^ self.seed, |h, b| {
                (h ^ b as u64).wrapping_mul(0x0000_0100_0000_01b3)
            })
    }

    pub fn generate(&self, id: &SegmentId) -> Record {
        let mut rng = StdRng::seed_from_u64(self.segment_seed(id));
        let n = (self.duration_s * self.fs).round() as usize;
        let mid = (self.sbp + self.dbp) / 2.0;
        let amp = (self.sbp - self.dbp) / 2.0;
        let phase = rng.gen_range(0.0..2.0 * PI);
        let half_noise = self.noise / 2.0;
        let jitter = |rng: &mut StdRng| {
            if half_noise > 0.0 {
                rng.gen_range(-half_noise..=half_noise)
            } else {
                0.0
            }
        };

        let mut abp = Vec::with_capacity(n);
        let mut ppg = Vec::with_capacity(n);
        for i in 0..n {
            let theta = 2.0 * PI * self.heart_rate_hz * i as f64 / self.fs + phase;
            abp.push(mid + amp * theta.sin() + jitter(&mut rng));
            ppg.push(1.0 + 0.5 * (theta - 0.6).sin() + jitter(&mut rng) / 100.0);
        }

        let flat_from = n - ((n as f64 * self.flat_fraction).round() as usize).min(n);
        if flat_from < n {
            let hold = flat_from.saturating_sub(1);
            let (abp_hold, ppg_hold) = (abp[hold], ppg[hold]);
            abp[flat_from..].fill(abp_hold);
            ppg[flat_from..].fill(ppg_hold);
        }

        let missing = (n as f64 * self.missing_fraction).round() as usize;
        for _ in 0..missing {
            let i = rng.gen_range(0..n);
            abp[i] = f64::NAN;
            ppg[i] = f64::NAN;
        }

        Record {
            sig_names: vec!["II".into(), "ABP".into(), "PLETH".into()],
            units: vec!["mV".into(), "mmHg".into(), "NU".into()],
            fs: self.fs,
            channels: vec![vec![0.0; n], abp, ppg],
        }
    }
}

impl SegmentSource for SyntheticSource {
    fn fetch(&self, _database: &str, id: &SegmentId) -> Result<Record, FetchError> {
        Ok(self.generate(id))
    }

    fn describe(&self) -> String {
        format!("synthetic generator (seed {})", self.seed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bpseg_lib::fraction_missing;

    fn id() -> SegmentId {
        SegmentId::new("p01", "p011018", "3195243_0010")
    }

    #[test]
    fn local_source_reports_absent_segment() {
        let dir = tempfile::tempdir().unwrap();
        let source = LocalWfdbSource::new(dir.path());
        assert!(source
            .header_path(&id())
            .ends_with("p01/p011018/3195243_0010.hea"));
        assert!(matches!(
            source.fetch("mimic3wdb-matched/1.0", &id()),
            Err(FetchError::NotFound(_))
        ));
    }

    #[test]
    fn local_source_loads_mirrored_record() {
        let dir = tempfile::tempdir().unwrap();
        let source = LocalWfdbSource::new(dir.path());
        let header_path = source.header_path(&id());
        let patient_dir = header_path.parent().unwrap();
        fs::create_dir_all(patient_dir).unwrap();
        fs::write(
            &header_path,
            "3195243_0010 2 125 3\n\
3195243_0010.dat 80 1(0)/mmHg 8 0 -8 0 0 ABP\n\
3195243_0010.dat 80 100(-128)/NU 8 0 -128 0 0 PLETH\n",
        )
        .unwrap();
        // (ABP + 128, PLETH + 128) per frame
        fs::write(
            patient_dir.join("3195243_0010.dat"),
            [248u8, 0, 0, 28, 238, 128],
        )
        .unwrap();

        let record = source.fetch("mimic3wdb-matched/1.0", &id()).unwrap();
        let pair = record.signal_pair("ABP", "PLETH").unwrap();
        assert_eq!(pair.fs, 125.0);
        assert_eq!(pair.abp[0], 120.0);
        assert!(pair.abp[1].is_nan());
        assert_eq!(pair.abp[2], 110.0);
        assert!(pair.ppg[0].is_nan());
        assert_eq!(pair.ppg[1], 0.28);
        assert_eq!(pair.ppg[2], 1.28);
    }

    #[test]
    fn physionet_urls_follow_archive_layout() {
        let source = PhysionetSource::new("https://physionet.org/files/").unwrap();
        assert_eq!(
            source.file_url("mimic3wdb-matched/1.0", &id(), "3195243_0010.hea"),
            "https://physionet.org/files/mimic3wdb-matched/1.0/p01/p011018/3195243_0010.hea"
        );
    }

    #[test]
    fn synthetic_records_are_reproducible() {
        let source = SyntheticSource {
            duration_s: 60.0,
            ..SyntheticSource::default()
        };
        let a = source.generate(&id());
        let b = source.generate(&id());
        assert_eq!(a.channels[1], b.channels[1]);
        assert_eq!(a.channels[1].len(), 7500);
        let other = source.generate(&SegmentId::new("p01", "p011018", "3195243_0011"));
        assert_ne!(a.channels[1], other.channels[1]);
    }

    #[test]
    fn synthetic_dropouts_and_flat_tail() {
        let source = SyntheticSource {
            duration_s: 60.0,
            missing_fraction: 0.1,
            flat_fraction: 0.5,
            ..SyntheticSource::default()
        };
        let record = source.generate(&id());
        let pair = record.signal_pair("ABP", "PLETH").unwrap();
        let missing = fraction_missing(&pair.abp);
        assert!(missing > 0.05 && missing <= 0.1, "missing {}", missing);
        let tail: Vec<f64> = pair.abp[7000..].iter().copied().filter(|v| !v.is_nan()).collect();
        assert!(tail.windows(2).all(|w| w[0] == w[1]));
    }
}
