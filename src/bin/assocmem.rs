//! assocmem
//!
//! Decodes associative-memory dumps and prints JSON lines on stdout.
//!
//! Exit status: 0 on success (warnings included), 1 if any file violates
//! the block layout, 2 on usage, configuration or I/O errors.

use anyhow::Context;
use assocmem::{analyze_files, AnalysisConfig, Analyzer, ByteSource, JsonLines};
use clap::Parser;
use std::io::{BufWriter, Write};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "assocmem")]
#[command(about = "Decode associative-memory files and recover residual text")]
struct Args {
    /// Files to analyse
    #[arg(required = true)]
    files: Vec<PathBuf>,

    /// Shortest printable run reported as a string
    #[arg(short = 'n', long)]
    min_len: Option<usize>,

    /// Offset of the first active block (decimal or 0x-prefixed hex)
    #[arg(long, value_parser = parse_offset)]
    active_root: Option<u32>,

    /// Do not walk an active list
    #[arg(long, conflicts_with = "active_root")]
    no_active_root: bool,

    /// Offset of the first free block (decimal or 0x-prefixed hex)
    #[arg(long, value_parser = parse_offset)]
    free_root: Option<u32>,

    /// Also extract strings from unclassified bytes
    #[arg(long)]
    scan_unclassified: bool,

    /// TOML configuration file; flags override its values
    #[arg(short = 'c', long)]
    config: Option<PathBuf>,

    /// Treat the files as successive dumps of one store, oldest first
    #[arg(long)]
    lineage: bool,

    /// Files analysed in parallel [default: available cores]
    #[arg(short = 'j', long)]
    jobs: Option<usize>,
}

/// Parse a byte offset from CLI string
fn parse_offset(s: &str) -> Result<u32, String> {
    let parsed = match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        Some(hex) => u32::from_str_radix(hex, 16),
        None => s.parse(),
    };
    parsed.map_err(|e| format!("Invalid offset '{}': {}", s, e))
}

fn load_config(args: &Args) -> anyhow::Result<AnalysisConfig> {
    let mut config = match &args.config {
        Some(path) => AnalysisConfig::load(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => AnalysisConfig::default(),
    };

    if let Some(n) = args.min_len {
        config.min_string_len = n;
    }
    if let Some(offset) = args.active_root {
        config.active_root = Some(offset);
    }
    if args.no_active_root {
        config.active_root = None;
    }
    if let Some(offset) = args.free_root {
        config.free_root = Some(offset);
    }
    if args.scan_unclassified {
        config.scan_unclassified = true;
    }
    if args.lineage {
        config.lineage = true;
    }

    config.validate()?;
    Ok(config)
}

fn run_batch<W: Write>(
    analyzer: &Analyzer,
    args: &Args,
    out: &mut JsonLines<W>,
) -> anyhow::Result<ExitCode> {
    let jobs = args.jobs.unwrap_or_else(|| {
        std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1)
    });

    let (mut violations, mut failures) = (0, 0);
    for file in analyze_files(analyzer, &args.files, jobs) {
        match file.result {
            Ok((source, analysis)) => {
                out.write_analysis(&source, 0, &analysis)?;
                out.write_edges(&analysis.order)?;
            }
            Err(e) => {
                eprintln!("{}: {}", file.path.display(), e);
                if e.is_format_violation() {
                    violations += 1;
                } else {
                    failures += 1;
                }
            }
        }
    }

    info!(
        "Analysed {} files, {} with format violations, {} unreadable",
        args.files.len(),
        violations,
        failures
    );
    Ok(if failures > 0 {
        ExitCode::from(2)
    } else if violations > 0 {
        ExitCode::from(1)
    } else {
        ExitCode::SUCCESS
    })
}

fn run_lineage<W: Write>(
    analyzer: &Analyzer,
    args: &Args,
    out: &mut JsonLines<W>,
) -> anyhow::Result<ExitCode> {
    let sources = args
        .files
        .iter()
        .map(|p| ByteSource::open(p).with_context(|| format!("opening {}", p.display())))
        .collect::<anyhow::Result<Vec<_>>>()?;

    let lineage = match analyzer.analyze_lineage(&sources) {
        Ok(lineage) => lineage,
        Err(e) if e.is_format_violation() => {
            eprintln!("lineage: {}", e);
            return Ok(ExitCode::from(1));
        }
        Err(e) => return Err(e.into()),
    };

    for (source, analysis) in sources.iter().zip(&lineage.analyses) {
        out.write_analysis(source, analysis.origin, analysis)?;
    }
    out.write_edges(&lineage.order)?;
    out.write_warnings(&lineage.warnings)?;
    Ok(ExitCode::SUCCESS)
}

fn run(args: Args) -> anyhow::Result<ExitCode> {
    let config = load_config(&args)?;
    let analyzer = Analyzer::from_config(&config)?;
    info!("Analysing {} files with {:?}", args.files.len(), config);

    let stdout = std::io::stdout();
    let mut out = JsonLines::new(BufWriter::new(stdout.lock()));
    let code = if config.lineage {
        run_lineage(&analyzer, &args, &mut out)?
    } else {
        run_batch(&analyzer, &args, &mut out)?
    };
    out.flush()?;
    Ok(code)
}

fn main() -> ExitCode {
    // Logs go to stderr; stdout carries only records
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::WARN.into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    match run(args) {
        Ok(code) => code,
        Err(e) => {
            eprintln!("error: {:#}", e);
            ExitCode::from(2)
        }
    }
}
