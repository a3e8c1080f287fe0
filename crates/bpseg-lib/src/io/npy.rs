use anyhow::{bail, Context, Result};
use std::fs;
use std::io::Write;
use std::path::Path;

const MAGIC: &[u8] = b"\x93NUMPY";
const ALIGN: usize = 64;

/// Encode a one-dimensional little-endian `f64` array in NumPy `.npy` v1.0 format.
pub fn encode_f64(data: &[f64]) -> Vec<u8> {
    let dict = format!(
        "{{'descr': '<f8', 'fortran_order': False, 'shape': ({},), }}",
        data.len()
    );
    // magic(6) + version(2) + header length(2) + dict + padding + '\n'
    let unpadded = MAGIC.len() + 4 + dict.len() + 1;
    let padding = (ALIGN - unpadded % ALIGN) % ALIGN;
    let header_len = dict.len() + padding + 1;

    let mut out = Vec::with_capacity(MAGIC.len() + 4 + header_len + data.len() * 8);
    out.extend_from_slice(MAGIC);
    out.extend_from_slice(&[1, 0]);
    out.extend_from_slice(&(header_len as u16).to_le_bytes());
    out.extend_from_slice(dict.as_bytes());
    out.extend(std::iter::repeat(b' ').take(padding));
    out.push(b'\n');
    for value in data {
        out.extend_from_slice(&value.to_le_bytes());
    }
    out
}

/// Decode a one-dimensional `<f8` array written by NumPy or [`encode_f64`].
pub fn decode_f64(buf: &[u8]) -> Result<Vec<f64>> {
    if buf.len() < 10 || &buf[..MAGIC.len()] != MAGIC {
        bail!("not an NPY file");
    }
    let (header_len, header_start) = match buf[6] {
        1 => (u16::from_le_bytes([buf[8], buf[9]]) as usize, 10),
        2 | 3 => {
            if buf.len() < 12 {
                bail!("truncated NPY header");
            }
            (
                u32::from_le_bytes([buf[8], buf[9], buf[10], buf[11]]) as usize,
                12,
            )
        }
        v => bail!("unsupported NPY version {}", v),
    };
    let data_start = header_start + header_len;
    if buf.len() < data_start {
        bail!("truncated NPY header");
    }
    let dict = std::str::from_utf8(&buf[header_start..data_start]).context("NPY header")?;
    if !dict.contains("'descr': '<f8'") {
        bail!("unsupported NPY dtype in {}", dict.trim());
    }
    if dict.contains("'fortran_order': True") {
        bail!("fortran-ordered arrays are not supported");
    }
    let len = shape_len(dict).with_context(|| format!("bad NPY shape in {}", dict.trim()))?;
    let body = &buf[data_start..];
    if body.len() != len * 8 {
        bail!("NPY body holds {} bytes, expected {}", body.len(), len * 8);
    }
    Ok(body
        .chunks_exact(8)
        .map(|c| f64::from_le_bytes([c[0], c[1], c[2], c[3], c[4], c[5], c[6], c[7]]))
        .collect())
}

fn shape_len(dict: &str) -> Option<usize> {
    let start = dict.find("'shape':")? + "'shape':".len();
    let rest = &dict[start..];
    let open = rest.find('(')?;
    let close = rest.find(')')?;
    let dims: Vec<&str> = rest[open + 1..close]
        .split(',')
        .map(str::trim)
        .filter(|d| !d.is_empty())
        .collect();
    match dims.as_slice() {
        [n] => n.parse().ok(),
        _ => None,
    }
}

pub fn write_f64(path: &Path, data: &[f64]) -> Result<()> {
    let mut file =
        fs::File::create(path).with_context(|| format!("creating {}", path.display()))?;
    file.write_all(&encode_f64(data))
        .with_context(|| format!("writing {}", path.display()))?;
    file.sync_all()?;
    Ok(())
}

pub fn read_f64(path: &Path) -> Result<Vec<f64>> {
    let buf = fs::read(path).with_context(|| format!("failed to read {}", path.display()))?;
    decode_f64(&buf).with_context(|| format!("decoding {}", path.display()))
}
