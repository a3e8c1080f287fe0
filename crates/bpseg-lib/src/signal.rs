use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Basic typed time series. `NaN` marks a missing sample.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimeSeries {
    /// Uniform sampling frequency in Hz
    pub fs: f64,
    /// Samples
    pub data: Vec<f64>,
}

/// Co-temporal arterial pressure and plethysmogram of one recording segment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignalPair {
    pub fs: f64,
    pub abp: Vec<f64>,
    pub ppg: Vec<f64>,
}

impl SignalPair {
    pub fn new(fs: f64, abp: Vec<f64>, ppg: Vec<f64>) -> Self {
        Self { fs, abp, ppg }
    }

    pub fn len(&self) -> usize {
        self.abp.len()
    }

    pub fn is_empty(&self) -> bool {
        self.abp.is_empty()
    }

    /// Duration in minutes, based on the pressure channel.
    pub fn duration_minutes(&self) -> f64 {
        self.abp.len() as f64 / (self.fs * 60.0)
    }
}

/// Multi-channel recording as delivered by a segment source.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Record {
    /// Channel names in storage order, e.g. `["II", "ABP", "PLETH"]`.
    pub sig_names: Vec<String>,
    /// Physical units, aligned with `sig_names`.
    pub units: Vec<String>,
    pub fs: f64,
    /// One column of physical samples per channel.
    pub channels: Vec<Vec<f64>>,
}

impl Record {
    pub fn channel_index(&self, name: &str) -> Option<usize> {
        self.sig_names.iter().position(|n| n == name)
    }

    pub fn channel(&self, name: &str) -> Option<TimeSeries> {
        let idx = self.channel_index(name)?;
        Some(TimeSeries {
            fs: self.fs,
            data: self.channels.get(idx)?.clone(),
        })
    }

    /// Extract the pressure/plethysmogram pair, or report the first absent channel.
    pub fn signal_pair(&self, abp: &str, ppg: &str) -> Result<SignalPair, MissingChannel> {
        let abp = self
            .channel(abp)
            .ok_or_else(|| MissingChannel(abp.to_string()))?;
        let ppg = self
            .channel(ppg)
            .ok_or_else(|| MissingChannel(ppg.to_string()))?;
        Ok(SignalPair::new(self.fs, abp.data, ppg.data))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("record has no '{0}' channel")]
pub struct MissingChannel(pub String);

/// Address of a segment inside the archive: `subfolder/patient/segment`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SegmentId {
    pub subfolder: String,
    pub patient: String,
    pub segment: String,
}

impl SegmentId {
    pub fn new(
        subfolder: impl Into<String>,
        patient: impl Into<String>,
        segment: impl Into<String>,
    ) -> Self {
        Self {
            subfolder: subfolder.into(),
            patient: patient.into(),
            segment: segment.into(),
        }
    }

    /// Directory of the patient inside the archive, e.g. `p01/p011018`.
    pub fn patient_dir(&self) -> String {
        format!("{}/{}", self.subfolder, self.patient)
    }
}

impl fmt::Display for SegmentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.subfolder, self.patient, self.segment)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("segment identity must look like subfolder/patient/segment, got '{0}'")]
pub struct ParseSegmentIdError(pub String);

impl FromStr for SegmentId {
    type Err = ParseSegmentIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        let parts: Vec<&str> = trimmed.split('/').map(str::trim).collect();
        match parts.as_slice() {
            [subfolder, patient, segment]
                if !subfolder.is_empty() && !patient.is_empty() && !segment.is_empty() =>
            {
                Ok(SegmentId::new(*subfolder, *patient, *segment))
            }
            _ => Err(ParseSegmentIdError(trimmed.to_string())),
        }
    }
}

/// Systolic/diastolic pair, either for one window or for a whole segment.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BpEstimate {
    pub sbp: f64,
    pub dbp: f64,
}

impl BpEstimate {
    /// Marker used when a window has no usable extrema.
    pub const SENTINEL: BpEstimate = BpEstimate { sbp: 0.0, dbp: 0.0 };

    pub fn new(sbp: f64, dbp: f64) -> Self {
        Self { sbp, dbp }
    }

    pub fn is_sentinel(&self) -> bool {
        *self == Self::SENTINEL
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_segment_identity() {
        let id: SegmentId = "p01/p011018/3195243_0010\n".parse().unwrap();
        assert_eq!(id.subfolder, "p01");
        assert_eq!(id.patient, "p011018");
        assert_eq!(id.segment, "3195243_0010");
        assert_eq!(id.to_string(), "p01/p011018/3195243_0010");
        assert_eq!(id.patient_dir(), "p01/p011018");
    }

    #[test]
    fn rejects_malformed_identity() {
        assert!("p01/p011018".parse::<SegmentId>().is_err());
        assert!("p01//3195243_0010".parse::<SegmentId>().is_err());
        assert!("a/b/c/d".parse::<SegmentId>().is_err());
    }

    #[test]
    fn extracts_named_pair() {
        let record = Record {
            sig_names: vec!["II".into(), "PLETH".into(), "ABP".into()],
            units: vec!["mV".into(), "NU".into(), "mmHg".into()],
            fs: 125.0,
            channels: vec![vec![0.1, 0.2], vec![0.5, 0.6], vec![120.0, 80.0]],
        };
        let pair = record.signal_pair("ABP", "PLETH").unwrap();
        assert_eq!(pair.abp, vec![120.0, 80.0]);
        assert_eq!(pair.ppg, vec![0.5, 0.6]);
        assert_eq!(
            record.signal_pair("ABP", "RESP").unwrap_err(),
            MissingChannel("RESP".into())
        );
        assert_eq!(
            record.signal_pair("CVP", "RESP").unwrap_err().to_string(),
            "record has no 'CVP' channel"
        );
    }
}
