use anyhow::{bail, Context, Result};
use bpseg_lib::io::{manifest as manifest_io, npy, text as text_io};
use bpseg_lib::{evaluate_segment, Decision, GateMetrics, RejectReason, SignalPair};
use bpseg_run::{
    read_config, LocalWfdbSource, OutputStore, PhysionetSource, RunConfig, Runner, SegmentSource,
    SyntheticSource, OUTCOMES_FILE, PHYSIONET_FILES,
};
use clap::{Args, Parser, Subcommand, ValueEnum};
use env_logger::Env;
use log::info;
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(
    name = "bpseg",
    version,
    about = "ABP/PLETH quality gate and blood pressure segmentation for MIMIC-III matched waveforms"
)]
struct Cli {
    /// Log filter used when RUST_LOG is unset
    #[arg(long, default_value = "info", global = true)]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Copy, Clone, Debug, ValueEnum)]
enum SourceKind {
    /// Download from PhysioNet (or --base-url)
    Physionet,
    /// Read a local WFDB mirror under --wfdb-root
    Local,
    /// Generate deterministic synthetic recordings
    Synthetic,
}

#[derive(Subcommand)]
enum Commands {
    /// Gate, segment and persist every segment listed in a manifest
    Process(ProcessArgs),
    /// Evaluate one ABP/PLETH pair from newline-delimited text or .npy files
    Evaluate {
        #[arg(long)]
        abp: PathBuf,
        #[arg(long)]
        ppg: PathBuf,
        #[arg(long, default_value_t = 125.0)]
        fs: f64,
        #[arg(long)]
        config: Option<PathBuf>,
    },
    /// List manifest identities without complete output
    Pending {
        #[arg(long)]
        manifest: PathBuf,
        #[arg(long)]
        output_dir: PathBuf,
    },
    /// Count patients and records listed in a manifest
    ManifestStats {
        #[arg(long)]
        manifest: PathBuf,
    },
}

#[derive(Args)]
struct ProcessArgs {
    #[arg(long)]
    manifest: PathBuf,
    #[arg(long)]
    output_dir: PathBuf,
    #[arg(long)]
    config: Option<PathBuf>,
    #[arg(long, value_enum, default_value_t = SourceKind::Physionet)]
    source: SourceKind,
    #[arg(long)]
    wfdb_root: Option<PathBuf>,
    #[arg(long, default_value = PHYSIONET_FILES)]
    base_url: String,
    /// Seed of the synthetic source
    #[arg(long, default_value_t = 0)]
    seed: u64,
    /// Share of samples the synthetic source drops to NaN
    #[arg(long, default_value_t = 0.0)]
    synthetic_missing: f64,
    #[arg(long)]
    database: Option<String>,
    #[arg(long)]
    parallelism: Option<usize>,
    /// Skip segments whose output is already complete
    #[arg(long)]
    resume: bool,
    /// Ignore the first N manifest entries
    #[arg(long, default_value_t = 0)]
    skip: usize,
    /// Process at most N manifest entries
    #[arg(long)]
    limit: Option<usize>,
    #[arg(long)]
    nans_th: Option<f64>,
    #[arg(long)]
    flat_th: Option<f64>,
    #[arg(long)]
    min_duration_minutes: Option<f64>,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    env_logger::Builder::from_env(Env::default().default_filter_or(&cli.log_level)).init();

    match cli.command {
        Commands::Process(args) => cmd_process(args)?,
        Commands::Evaluate {
            abp,
            ppg,
            fs,
            config,
        } => cmd_evaluate(&abp, &ppg, fs, config.as_deref())?,
        Commands::Pending {
            manifest,
            output_dir,
        } => cmd_pending(&manifest, &output_dir)?,
        Commands::ManifestStats { manifest } => cmd_manifest_stats(&manifest)?,
    }
    Ok(())
}

fn load_config(path: Option<&Path>) -> Result<RunConfig> {
    match path {
        Some(path) => read_config(path),
        None => Ok(RunConfig::default()),
    }
}

fn build_source(args: &ProcessArgs) -> Result<Box<dyn SegmentSource>> {
    let source: Box<dyn SegmentSource> = match args.source {
        SourceKind::Physionet => Box::new(PhysionetSource::new(args.base_url.as_str())?),
        SourceKind::Local => {
            let Some(root) = &args.wfdb_root else {
                bail!("--source local requires --wfdb-root");
            };
            Box::new(LocalWfdbSource::new(root))
        }
        SourceKind::Synthetic => Box::new(SyntheticSource {
            seed: args.seed,
            missing_fraction: args.synthetic_missing,
            ..SyntheticSource::default()
        }),
    };
    Ok(source)
}

fn cmd_process(args: ProcessArgs) -> Result<()> {
    let mut config = load_config(args.config.as_deref())?;
    if let Some(v) = args.nans_th {
        config.thresholds.nans_th = v;
    }
    if let Some(v) = args.flat_th {
        config.thresholds.flat_th = v;
    }
    if let Some(v) = args.min_duration_minutes {
        config.min_duration_minutes = v;
    }
    if args.parallelism.is_some() {
        config.parallelism = args.parallelism;
    }
    if args.database.is_some() {
        config.database = args.database.clone();
    }

    let mut manifest = manifest_io::read_manifest(&args.manifest)?;
    let limit = args.limit.unwrap_or(usize::MAX);
    manifest.segments = manifest
        .segments
        .into_iter()
        .skip(args.skip)
        .take(limit)
        .collect();

    let source = build_source(&args)?;
    fs::create_dir_all(&args.output_dir)
        .with_context(|| format!("failed to create {}", args.output_dir.display()))?;
    let store = OutputStore::new(&args.output_dir);
    let runner = Runner::new(&config, source.as_ref(), store).resume(args.resume);
    let report = runner.run(&manifest)?;

    let outcomes = args.output_dir.join(OUTCOMES_FILE);
    report.write_csv(&outcomes)?;
    info!("Wrote {}", outcomes.display());
    println!("{}", serde_json::to_string_pretty(&report.summary())?);
    Ok(())
}

fn read_channel(path: &Path) -> Result<Vec<f64>> {
    let is_npy = path
        .extension()
        .and_then(|s| s.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("npy"));
    if is_npy {
        npy::read_f64(path)
    } else {
        text_io::read_f64_series(path)
    }
}

#[derive(Serialize)]
struct EvaluateOutput {
    accepted: bool,
    reason: Option<RejectReason>,
    duration_minutes: f64,
    #[serde(flatten)]
    metrics: GateMetrics,
}

fn cmd_evaluate(abp: &Path, ppg: &Path, fs: f64, config: Option<&Path>) -> Result<()> {
    let config = load_config(config)?;
    let abp = read_channel(abp)?;
    let ppg = read_channel(ppg)?;
    if abp.len() != ppg.len() {
        bail!(
            "ABP has {} samples but PLETH has {}",
            abp.len(),
            ppg.len()
        );
    }
    let pair = SignalPair::new(fs, abp, ppg);
    let duration_minutes = pair.duration_minutes();
    let evaluation = evaluate_segment(&pair, &config.quality());
    let reason = match evaluation.decision {
        Decision::Accepted { .. } => None,
        Decision::Rejected(reason) => Some(reason),
    };
    let out = EvaluateOutput {
        accepted: reason.is_none(),
        reason,
        duration_minutes,
        metrics: evaluation.metrics,
    };
    println!("{}", serde_json::to_string(&out)?);
    Ok(())
}

fn cmd_pending(manifest: &Path, output_dir: &Path) -> Result<()> {
    let manifest = manifest_io::read_manifest(manifest)?;
    let store = OutputStore::new(output_dir);
    let unique = manifest.unique_segments();
    for id in store.pending(&unique) {
        println!("{}", id);
    }
    Ok(())
}

#[derive(Serialize)]
struct ManifestStats {
    database: String,
    patients: usize,
    records: usize,
    unique_records: usize,
}

fn cmd_manifest_stats(path: &Path) -> Result<()> {
    let manifest = manifest_io::read_manifest(path)?;
    let stats = ManifestStats {
        database: manifest.database.clone(),
        patients: manifest.patient_count(),
        records: manifest.record_count(),
        unique_records: manifest.unique_segments().len(),
    };
    println!("{}", serde_json::to_string(&stats)?);
    Ok(())
}
