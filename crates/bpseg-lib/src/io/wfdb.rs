use crate::signal::Record;
use anyhow::{bail, Context, Result};
use log::warn;
use std::fs;
use std::path::Path;

/// Signal description line of a WFDB header.
#[derive(Debug, Clone, PartialEq)]
pub struct SignalSpec {
    pub file_name: String,
    pub format: u16,
    /// Samples of this signal in each frame.
    pub samples_per_frame: usize,
    /// Bytes to skip at the start of the data file.
    pub byte_offset: usize,
    /// ADC units per physical unit.
    pub gain: f64,
    pub baseline: i64,
    pub units: String,
    pub description: String,
}

impl SignalSpec {
    /// Raw value the storage format reserves for "no sample".
    pub fn invalid_sample(&self) -> Option<f64> {
        match self.format {
            80 => Some(-128.0),
            16 | 61 | 160 => Some(-32768.0),
            212 => Some(-2048.0),
            310 | 311 => Some(-512.0),
            24 => Some(-8_388_608.0),
            32 => Some(-2_147_483_648.0),
            _ => None,
        }
    }

    fn to_physical(&self, raw: f64) -> f64 {
        if self.invalid_sample() == Some(raw) {
            f64::NAN
        } else {
            (raw - self.baseline as f64) / self.gain
        }
    }
}

/// Parsed single-segment WFDB header (`.hea`).
#[derive(Debug, Clone, PartialEq)]
pub struct WfdbHeader {
    pub record_name: String,
    pub fs: f64,
    pub n_samples: Option<usize>,
    pub signals: Vec<SignalSpec>,
}

impl WfdbHeader {
    pub fn sig_names(&self) -> Vec<String> {
        self.signals.iter().map(|s| s.description.clone()).collect()
    }

    /// Distinct data files referenced by the signal lines, in order of appearance.
    pub fn data_files(&self) -> Vec<String> {
        let mut files: Vec<String> = Vec::new();
        for spec in &self.signals {
            if !files.contains(&spec.file_name) {
                files.push(spec.file_name.clone());
            }
        }
        files
    }

    pub fn duration_minutes(&self) -> Option<f64> {
        self.n_samples.map(|n| n as f64 / (self.fs * 60.0))
    }
}

const DEFAULT_FS: f64 = 250.0;
const DEFAULT_GAIN: f64 = 200.0;

/// Parse the text of a WFDB header. Multi-segment headers are not supported.
pub fn parse_header(text: &str) -> Result<WfdbHeader> {
    let mut lines = text
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty() && !l.starts_with('#'));
    let record_line = lines.next().context("empty WFDB header")?;
    let fields: Vec<&str> = record_line.split_whitespace().collect();
    let record_name = fields[0];
    if record_name.contains('/') {
        bail!("multi-segment record '{}' is not supported", record_name);
    }
    let n_sig: usize = fields
        .get(1)
        .context("record line lacks the signal count")?
        .parse()
        .with_context(|| format!("bad signal count in '{}'", record_line))?;
    let fs = match fields.get(2) {
        Some(field) => leading_number(field)
            .with_context(|| format!("bad sampling frequency in '{}'", record_line))?,
        None => DEFAULT_FS,
    };
    let n_samples = match fields.get(3) {
        Some(field) => Some(
            field
                .parse()
                .with_context(|| format!("bad sample count in '{}'", record_line))?,
        ),
        None => None,
    };

    let mut signals = Vec::with_capacity(n_sig);
    for (idx, line) in lines.take(n_sig).enumerate() {
        signals.push(
            parse_signal_line(line).with_context(|| format!("signal line {}", idx + 1))?,
        );
    }
    if signals.len() != n_sig {
        bail!(
            "header declares {} signals but describes {}",
            n_sig,
            signals.len()
        );
    }
    Ok(WfdbHeader {
        record_name: record_name.to_string(),
        fs,
        n_samples,
        signals,
    })
}

fn parse_signal_line(line: &str) -> Result<SignalSpec> {
    let fields: Vec<&str> = line.split_whitespace().collect();
    if fields.len() < 2 {
        bail!("incomplete signal line '{}'", line);
    }
    // format[xsamples][:skew][+offset]
    let (format_part, offset_part) = match fields[1].split_once('+') {
        Some((f, o)) => (f, Some(o)),
        None => (fields[1], None),
    };
    let format_part = format_part.split(':').next().unwrap_or(format_part);
    let (format_str, spf_str) = match format_part.split_once('x') {
        Some((f, n)) => (f, Some(n)),
        None => (format_part, None),
    };
    let format: u16 = format_str
        .parse()
        .with_context(|| format!("bad storage format '{}'", fields[1]))?;
    let samples_per_frame = match spf_str {
        Some(n) => n
            .parse::<usize>()
            .with_context(|| format!("bad samples per frame '{}'", fields[1]))?
            .max(1),
        None => 1,
    };
    let byte_offset = match offset_part {
        Some(o) => o
            .parse()
            .with_context(|| format!("bad byte offset '{}'", fields[1]))?,
        None => 0,
    };

    // gain[(baseline)][/units]
    let (mut gain, mut baseline, mut units) = (DEFAULT_GAIN, None, String::from("mV"));
    if let Some(field) = fields.get(2) {
        let (gain_part, unit_part) = match field.split_once('/') {
            Some((g, u)) => (g, Some(u)),
            None => (*field, None),
        };
        let (gain_str, base_str) = match gain_part.split_once('(') {
            Some((g, b)) => (g, Some(b.trim_end_matches(')'))),
            None => (gain_part, None),
        };
        let parsed: f64 = gain_str
            .parse()
            .with_context(|| format!("bad gain '{}'", field))?;
        if parsed != 0.0 {
            gain = parsed;
        }
        if let Some(b) = base_str {
            baseline = Some(
                b.parse::<i64>()
                    .with_context(|| format!("bad baseline '{}'", field))?,
            );
        }
        if let Some(u) = unit_part {
            units = u.to_string();
        }
    }
    let adc_zero = match fields.get(4) {
        Some(z) => z.parse::<i64>().unwrap_or(0),
        None => 0,
    };
    let description = if fields.len() > 8 {
        fields[8..].join(" ")
    } else {
        String::new()
    };
    Ok(SignalSpec {
        file_name: fields[0].to_string(),
        format,
        samples_per_frame,
        byte_offset,
        gain,
        baseline: baseline.unwrap_or(adc_zero),
        units,
        description,
    })
}

fn leading_number(field: &str) -> Option<f64> {
    let end = field.find(['/', '(']).unwrap_or(field.len());
    field[..end].parse().ok()
}

pub fn read_header(path: &Path) -> Result<WfdbHeader> {
    let text = fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    parse_header(&text).with_context(|| format!("parsing {}", path.display()))
}

/// Raw sample stream of a data file in the given storage format.
///
/// Format 212 packs two 12-bit samples in three bytes and is unpacked by
/// `wfdb_rust`; trailing bytes that do not form a whole sample are dropped.
pub fn decode_samples(buf: &[u8], format: u16) -> Result<Vec<i32>> {
    let samples = match format {
        80 => buf.iter().map(|&b| b as i32 - 128).collect(),
        16 => buf
            .chunks_exact(2)
            .map(|c| i16::from_le_bytes([c[0], c[1]]) as i32)
            .collect(),
        61 => buf
            .chunks_exact(2)
            .map(|c| i16::from_be_bytes([c[0], c[1]]) as i32)
            .collect(),
        212 => wfdb_rust::signal::parse_212_format(buf)
            .into_iter()
            .map(i32::from)
            .collect(),
        24 => buf
            .chunks_exact(3)
            .map(|c| i32::from_le_bytes([0, c[0], c[1], c[2]]) >> 8)
            .collect(),
        32 => buf
            .chunks_exact(4)
            .map(|c| i32::from_le_bytes([c[0], c[1], c[2], c[3]]))
            .collect(),
        other => bail!("unsupported storage format {}", other),
    };
    Ok(samples)
}

/// Load every channel of a WFDB record into physical units. Invalid samples become `NaN`.
pub fn load_record(header_path: &Path) -> Result<Record> {
    let header = read_header(header_path)?;
    let dir = header_path.parent().unwrap_or_else(|| Path::new(""));
    let mut channels: Vec<Vec<f64>> = vec![Vec::new(); header.signals.len()];

    for file in header.data_files() {
        let data_path = dir.join(&file);
        if !data_path.exists() {
            bail!("missing data file {}", data_path.display());
        }
        let members: Vec<usize> = header
            .signals
            .iter()
            .enumerate()
            .filter(|(_, s)| s.file_name == file)
            .map(|(i, _)| i)
            .collect();
        let Some(&first) = members.first() else {
            continue;
        };
        let lead = &header.signals[first];
        if members
            .iter()
            .any(|&i| header.signals[i].format != lead.format)
        {
            bail!("signals of {} mix storage formats", file);
        }

        let buf = fs::read(&data_path)
            .with_context(|| format!("failed to read {}", data_path.display()))?;
        let start = lead.byte_offset.min(buf.len());
        let raw = decode_samples(&buf[start..], lead.format)
            .with_context(|| format!("decoding {}", data_path.display()))?;

        // frames interleave the signals stored in this file, in header order
        let frame_len: usize = members
            .iter()
            .map(|&i| header.signals[i].samples_per_frame)
            .sum();
        let mut n_frames = raw.len() / frame_len;
        if let Some(n) = header.n_samples.filter(|&n| n > 0) {
            if n > n_frames {
                warn!(
                    "{} holds {} frames, header declares {}",
                    data_path.display(),
                    n_frames,
                    n
                );
            }
            n_frames = n_frames.min(n);
        }
        for frame in raw.chunks_exact(frame_len).take(n_frames) {
            let mut pos = 0;
            for &i in &members {
                let spec = &header.signals[i];
                for &sample in &frame[pos..pos + spec.samples_per_frame] {
                    channels[i].push(spec.to_physical(sample as f64));
                }
                pos += spec.samples_per_frame;
            }
        }
    }

    Ok(Record {
        sig_names: header.sig_names(),
        units: header.signals.iter().map(|s| s.units.clone()).collect(),
        fs: header.fs,
        channels,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const MIMIC_HEADER: &str = "\
3195243_0010 3 125 75000
# comment lines are skipped
3195243_0010.dat 80 100(0)/mmHg 8 0 -128 0 0 ABP
3195243_0010.dat 80 1023(-512)/NU 8 0 -128 0 0 PLETH
3195243_0010.dat 80x2 200/mV 8 0 0 0 0 II
";

    #[test]
    fn parses_record_and_signal_lines() {
        let header = parse_header(MIMIC_HEADER).unwrap();
        assert_eq!(header.record_name, "3195243_0010");
        assert_eq!(header.fs, 125.0);
        assert_eq!(header.n_samples, Some(75000));
        assert_eq!(header.sig_names(), vec!["ABP", "PLETH", "II"]);
        assert_eq!(header.signals[1].gain, 1023.0);
        assert_eq!(header.signals[1].baseline, -512);
        assert_eq!(header.signals[1].units, "NU");
        assert_eq!(header.signals[2].format, 80);
        assert_eq!(header.signals[2].samples_per_frame, 2);
        assert_eq!(header.signals[0].samples_per_frame, 1);
        assert_eq!(header.data_files(), vec!["3195243_0010.dat"]);
        assert!((header.duration_minutes().unwrap() - 10.0).abs() < 1e-12);
    }

    #[test]
    fn baseline_defaults_to_adc_zero_and_gain_to_200() {
        let header = parse_header("rec 1 360/1(0) 10\nrec.dat 16 0 12 1024 0 0 0 MLII\n").unwrap();
        let spec = &header.signals[0];
        assert_eq!(header.fs, 360.0);
        assert_eq!(spec.gain, 200.0);
        assert_eq!(spec.baseline, 1024);
        assert_eq!(spec.units, "mV");
    }

    #[test]
    fn invalid_sample_maps_to_nan() {
        let header = parse_header(MIMIC_HEADER).unwrap();
        let abp = &header.signals[0];
        assert!(abp.to_physical(-128.0).is_nan());
        assert!((abp.to_physical(12000.0) - 120.0).abs() < 1e-12);
        let pleth = &header.signals[1];
        assert!((pleth.to_physical(511.0) - 1.0).abs() < 1e-12);
    }

    #[test]
    fn rejects_multi_segment_and_truncated_headers() {
        assert!(parse_header("3195243/4 2 125 1000\n").is_err());
        assert!(parse_header("rec 2 125 10\nrec.dat 16 200 12 0 0 0 0 ABP\n").is_err());
        assert!(parse_header("# only a comment\n").is_err());
    }

    #[test]
    fn load_reports_missing_data_file() {
        let dir = tempfile::tempdir().unwrap();
        let hea = dir.path().join("3195243_0010.hea");
        fs::write(&hea, MIMIC_HEADER).unwrap();
        let err = load_record(&hea).unwrap_err();
        assert!(err.to_string().contains("missing data file"));
    }

    fn write_record(dir: &Path, name: &str, header: &str, data: &[u8]) -> std::path::PathBuf {
        let hea = dir.join(format!("{}.hea", name));
        fs::write(&hea, header).unwrap();
        fs::write(dir.join(format!("{}.dat", name)), data).unwrap();
        hea
    }

    fn assert_close(a: f64, b: f64, tol: f64) {
        assert!((a - b).abs() <= tol, "{} vs {} (tol {})", a, b, tol);
    }

    #[test]
    fn loads_interleaved_format_80() {
        let dir = tempfile::tempdir().unwrap();
        let header = "rec 2 125 4\n\
rec.dat 80 1(0)/mmHg 8 0 -128 0 0 ABP\n\
rec.dat 80 100(-50)/NU 8 0 -128 0 0 PLETH\n";
        // frames of (ABP + 128, PLETH + 128); the last ABP byte is the invalid marker
        let data = [228, 138, 238, 148, 218, 158, 0, 168];
        let hea = write_record(dir.path(), "rec", header, &data);
        let record = load_record(&hea).unwrap();
        assert_eq!(record.sig_names, vec!["ABP", "PLETH"]);
        assert_eq!(record.fs, 125.0);
        let abp = &record.channels[0];
        assert_eq!(&abp[..3], &[100.0, 110.0, 90.0]);
        assert!(abp[3].is_nan());
        let pleth = &record.channels[1];
        for (got, want) in pleth.iter().zip([0.6, 0.7, 0.8, 0.9]) {
            assert_close(*got, want, 1e-12);
        }
    }

    #[test]
    fn loads_format_16_and_stops_at_declared_length() {
        let dir = tempfile::tempdir().unwrap();
        let header = "rec16 2 360 3\n\
rec16.dat 16 200(-10)/mV 16 0 -5 0 0 MLII\n\
rec16.dat 16 2/mmHg 16 0 0 0 0 ABP\n";
        let raw: [i16; 8] = [-10, 240, 190, 260, -32768, 200, 7, 7];
        let data: Vec<u8> = raw.iter().flat_map(|v| v.to_le_bytes()).collect();
        let hea = write_record(dir.path(), "rec16", header, &data);
        let record = load_record(&hea).unwrap();
        let mlii = &record.channels[0];
        assert_eq!(mlii.len(), 3);
        assert_close(mlii[0], 0.0, 1e-12);
        assert_close(mlii[1], 1.0, 1e-12);
        assert!(mlii[2].is_nan());
        assert_eq!(record.channels[1], vec![120.0, 130.0, 100.0]);
    }

    #[test]
    fn honours_samples_per_frame_and_byte_offset() {
        let dir = tempfile::tempdir().unwrap();
        let header = "mixed 2 125 2\n\
mixed.dat 80+2 1/mmHg 8 0 0 0 0 ABP\n\
mixed.dat 80x2+2 1/mV 8 0 0 0 0 II\n";
        let data = [0, 0, 129, 130, 131, 132, 133, 134];
        let hea = write_record(dir.path(), "mixed", header, &data);
        let record = load_record(&hea).unwrap();
        assert_eq!(record.channels[0], vec![1.0, 4.0]);
        assert_eq!(record.channels[1], vec![2.0, 3.0, 5.0, 6.0]);
    }

    #[test]
    fn decodes_packed_212_and_rejects_unknown_formats() {
        // samples 1 and -1 packed into three bytes
        assert_eq!(decode_samples(&[0x01, 0xF0, 0xFF], 212).unwrap(), vec![1, -1]);
        assert_eq!(decode_samples(&[0x80, 0x00], 61).unwrap(), vec![-32768]);
        assert_eq!(decode_samples(&[0xFF, 0xFF, 0xFF], 24).unwrap(), vec![-1]);
        assert!(decode_samples(&[1, 2, 3], 8).is_err());
    }
}
