//! cuttime CLI
//!
//! Estimates machining time for single parts or batches, inspects how a
//! feature detail string is read, and optionally serves the estimator over
//! HTTP.

use anyhow::{bail, Context, Result};
use chrono::Utc;
use clap::{Parser, Subcommand};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use cuttime::batch::{BatchOrchestrator, BatchRequest};
use cuttime::diagnostics;
use cuttime::export::ExportDocument;
use cuttime::features::{parse_feature, FeatureInput};
use cuttime::{Catalog, EngineConfig, EstimateRequest, Estimator};

#[derive(Parser)]
#[command(name = "cuttime")]
#[command(about = "Deterministic machining-time estimation", long_about = None)]
struct Cli {
    /// Cutting-condition catalog (JSON); the built-in catalog when omitted
    #[arg(long, global = true)]
    catalog: Option<PathBuf>,

    /// Engine configuration (TOML); falls back to $CUTTIME_CONFIG
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Estimate one part and print the result as JSON
    Estimate {
        /// Estimation request (JSON)
        request: PathBuf,
    },
    /// Estimate a batch of parts and write the export bundle
    Batch {
        /// Batch request (JSON)
        request: PathBuf,
        /// Directory for results.json, results.csv, features.csv, consistency.log
        #[arg(short, long, default_value = "cuttime-out")]
        out_dir: PathBuf,
        /// Re-run a sample of parts and require identical results
        #[arg(long)]
        verify: bool,
    },
    /// Show how a feature detail string is read
    Parse {
        /// Feature type, e.g. outer_diameter
        feature_type: String,
        /// Detail text, e.g. "ø30 h7, L=100"
        detail: String,
    },
    /// List catalog materials
    Materials,
    /// Serve the estimator over HTTP
    #[cfg(feature = "serve")]
    Serve {
        #[arg(long, default_value = "127.0.0.1:3030")]
        addr: std::net::SocketAddr,
    },
}

fn init_logging() {
    FmtSubscriber::builder()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();
}

fn load_estimator(catalog: Option<&Path>, config: Option<&Path>) -> Result<Estimator> {
    let catalog = match catalog {
        Some(path) => Catalog::from_file(path)
            .with_context(|| format!("loading catalog {}", path.display()))?,
        None => Catalog::builtin(),
    };

    let config_path = config
        .map(Path::to_path_buf)
        .or_else(|| env::var_os("CUTTIME_CONFIG").map(PathBuf::from));
    let config = match config_path {
        Some(path) => EngineConfig::from_file(&path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => EngineConfig::default(),
    };

    info!(
        "catalog {} ({} materials, {} conditions)",
        &catalog.fingerprint()[..12],
        catalog.list_materials().len(),
        catalog.condition_count()
    );
    Ok(Estimator::new(Arc::new(catalog), Arc::new(config)))
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T> {
    let source = fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    serde_json::from_str(&source).with_context(|| format!("parsing {}", path.display()))
}

fn estimate(estimator: &Estimator, path: &Path) -> Result<()> {
    let req: EstimateRequest = read_json(path)?;
    let result = estimator
        .estimate(&req)
        .with_context(|| format!("estimating part {}", req.part_id))?;
    println!("{}", serde_json::to_string_pretty(&result)?);
    Ok(())
}

fn batch(estimator: Estimator, path: &Path, out_dir: &Path, verify: bool) -> Result<()> {
    let mut req: BatchRequest = read_json(path)?;
    req.verify_determinism |= verify;

    let fingerprint = estimator.catalog().fingerprint().to_string();
    let total = req.parts.len();
    let done = AtomicUsize::new(0);
    let response = BatchOrchestrator::new(estimator)
        .with_progress(move |part_id| {
            let n = done.fetch_add(1, Ordering::Relaxed) + 1;
            info!("[{}/{}] {}", n, total, part_id);
        })
        .run(&req)?;

    let document = ExportDocument::new(&response, &fingerprint, Utc::now());
    document.write_bundle(out_dir)?;

    let summary = &response.summary;
    info!(
        "{} parts estimated, {} failed, avg {:.2} min",
        summary.count,
        response.failures.len(),
        summary.avg_time
    );
    for failure in &response.failures {
        eprintln!("  - {} ({}): {}", failure.part_id, failure.code, failure.error);
    }
    Ok(())
}

fn parse(estimator: &Estimator, feature_type: &str, detail: &str) -> Result<()> {
    let input = FeatureInput::new(feature_type, detail);

    match parse_feature(0, &input, &estimator.config().kinematics) {
        Ok(parsed) => {
            println!("{} ({:?})", parsed.feature.kind, parsed.feature.kind.family());
            println!("{}", diagnostics::describe_dimensions(&parsed.feature.dims));
            let report = diagnostics::render(detail, &parsed.warnings);
            if !report.is_empty() {
                eprint!("{}", report);
            }
            Ok(())
        }
        Err(warning) => {
            eprint!("{}", diagnostics::render(detail, std::slice::from_ref(&warning)));
            bail!("{}", warning.message)
        }
    }
}

fn materials(estimator: &Estimator) {
    println!("{:<12} {:<10} {:>8} {:>8} {:>8}", "code", "group", "rough", "finish", "setup");
    for m in estimator.catalog().materials() {
        println!(
            "{:<12} {:<10} {:>8} {:>8} {:>8}",
            m.code, m.group, m.mrr_roughing, m.mrr_finishing, m.base_setup_time
        );
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging();

    let estimator = load_estimator(cli.catalog.as_deref(), cli.config.as_deref())?;

    match cli.command {
        Commands::Estimate { request } => estimate(&estimator, &request)?,
        Commands::Batch {
            request,
            out_dir,
            verify,
        } => batch(estimator, &request, &out_dir, verify)?,
        Commands::Parse {
            feature_type,
            detail,
        } => parse(&estimator, &feature_type, &detail)?,
        Commands::Materials => materials(&estimator),
        #[cfg(feature = "serve")]
        Commands::Serve { addr } => {
            let runtime = tokio::runtime::Runtime::new().context("starting runtime")?;
            runtime.block_on(cuttime::serve::run(addr, estimator, cli.catalog));
        }
    }

    Ok(())
}
