use crate::signal::SegmentId;
use anyhow::{Context, Result};
use std::collections::HashSet;
use std::fmt::Write as _;
use std::path::Path;

/// List of segments to process: the database name followed by one
/// `subfolder/patient/segment` identity per line.
#[derive(Debug, Clone, PartialEq)]
pub struct Manifest {
    pub database: String,
    pub segments: Vec<SegmentId>,
}

impl Manifest {
    /// Number of distinct patients.
    pub fn patient_count(&self) -> usize {
        self.segments
            .iter()
            .map(|s| s.patient.as_str())
            .collect::<HashSet<_>>()
            .len()
    }

    pub fn record_count(&self) -> usize {
        self.segments.len()
    }

    /// Segments with later duplicates removed, first occurrence kept.
    pub fn unique_segments(&self) -> Vec<SegmentId> {
        let mut seen = HashSet::new();
        self.segments
            .iter()
            .filter(|s| seen.insert((*s).clone()))
            .cloned()
            .collect()
    }
}

pub fn parse_manifest(text: &str) -> Result<Manifest> {
    let mut lines = text.lines().enumerate();
    let database = lines
        .by_ref()
        .map(|(_, l)| l.trim())
        .find(|l| !l.is_empty())
        .context("manifest is empty")?
        .to_string();
    let mut segments = Vec::new();
    for (idx, line) in lines {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        let id: SegmentId = trimmed
            .parse()
            .with_context(|| format!("manifest line {}", idx + 1))?;
        segments.push(id);
    }
    Ok(Manifest { database, segments })
}

pub fn read_manifest(path: &Path) -> Result<Manifest> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read manifest {}", path.display()))?;
    parse_manifest(&text).with_context(|| format!("parsing manifest {}", path.display()))
}

pub fn write_manifest(path: &Path, manifest: &Manifest) -> Result<()> {
    let mut text = format!("{}\n", manifest.database);
    for id in &manifest.segments {
        writeln!(text, "{}", id)?;
    }
    std::fs::write(path, text)
        .with_context(|| format!("failed to write manifest {}", path.display()))
}
