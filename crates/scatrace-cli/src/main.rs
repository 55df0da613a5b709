#![forbid(unsafe_code)]
#![deny(
    rust_2018_idioms,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::todo
)]

mod params;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use params::AnalysisParams;
use scatrace_core::{
    Batch, Materialized, ReadOptions, Trace, TraceSource, TraceStore, ValidityKind,
};
use scatrace_kernels::{Kernel, KernelKind, KernelOutput};
use scatrace_scheduler::{AnyTrace, DistributedTrace};
use scatrace_trace::file::FileTrace;
use scatrace_trace::generator::{generate_trace, SimParams};
use scatrace_trace::io::{write_trace_auto, write_trace_jsonl_to};
use scatrace_trace::pipe::PipeTrace;
use serde::Serialize;
use std::io::{BufWriter, Write};
use std::ops::Range;
use std::path::{Path, PathBuf};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(
    name = "scatrace-cli",
    about = "scatrace reference CLI",
    long_about = "scatrace reference CLI.\n\nUse this tool to generate synthetic leakage traces, materialize trace ranges into matrices, and run aggregation kernels locally or across workers.\nA path of `-` reads a JSON Lines trace from stdin (or writes to stdout).",
    version = env!("CARGO_PKG_VERSION"),
    disable_help_subcommand = true
)]
struct Cli {
    /// Never draw progress bars (overrides SCATRACE_PROGRESS).
    #[arg(long, global = true, default_value_t = false)]
    no_progress: bool,

    #[command(subcommand)]
    cmd: Cmd,
}

#[derive(Subcommand, Debug)]
enum Cmd {
    /// Generate a synthetic Hamming-weight leakage trace.
    /// Output format follows the extension (.json/.cbor/.jsonl); `-` writes JSONL to stdout.
    Simulate {
        /// Number of rows (>0)
        #[arg(long, default_value_t = 1000, value_parser = clap::value_parser!(u64).range(1..))]
        rows: u64,

        /// Data bytes per row (>0)
        #[arg(long, default_value_t = 16, value_parser = clap::value_parser!(u64).range(1..))]
        data_len: u64,

        /// Sample points per row
        #[arg(long, default_value_t = 64)]
        samples_len: usize,

        /// Leakage gain per Hamming-weight unit
        #[arg(long, default_value_t = 8)]
        gain: i16,

        /// Uniform integer noise amplitude
        #[arg(long, default_value_t = 2, value_parser = clap::value_parser!(i16).range(0..))]
        noise: i16,

        /// Store every n-th row with empty samples (0 = never)
        #[arg(long, default_value_t = 0)]
        gap_every: usize,

        /// RNG seed
        #[arg(long, default_value_t = 42)]
        seed: u64,

        /// Output path
        #[arg(long, default_value = "traces.cbor")]
        out: PathBuf,
    },

    /// Materialize the valid rows of a range into dense matrices (JSON).
    Materialize {
        /// Input trace (.json/.cbor/.jsonl, or `-` for stdin)
        #[arg(long)]
        input: PathBuf,

        /// Analysis parameters; falls back to `<stem>.params.toml`, else no passes
        #[arg(long)]
        params: Option<PathBuf>,

        /// First row (inclusive); defaults to the params range or 0
        #[arg(long)]
        lo: Option<usize>,

        /// Last row (exclusive); defaults to the params range or the trace length
        #[arg(long)]
        hi: Option<usize>,

        /// Output JSON path (`-` for stdout)
        #[arg(long, default_value = "-")]
        out: PathBuf,
    },

    /// Run an aggregation kernel over a range, locally or across workers.
    Aggregate {
        /// Input trace (.json/.cbor/.jsonl, or `-` for stdin)
        #[arg(long)]
        input: PathBuf,

        /// Analysis parameters; falls back to `<stem>.params.toml`
        #[arg(long)]
        params: Option<PathBuf>,

        /// Kernel to run (`mean-var` or `cond-avg`; overrides params)
        #[arg(long)]
        kernel: Option<KernelKind>,

        /// Worker count (overrides params and SCATRACE_WORKERS)
        #[arg(long, value_parser = clap::value_parser!(u64).range(1..))]
        workers: Option<u64>,

        /// Output JSON path (`-` for stdout)
        #[arg(long, default_value = "-")]
        out: PathBuf,
    },

    /// Print the index of the first row satisfying a validity kind.
    FirstValid {
        /// Input trace (.json/.cbor/.jsonl, or `-` for stdin)
        #[arg(long)]
        input: PathBuf,

        /// Validity kind (defaults to SCATRACE_VALIDITY, else both)
        #[arg(long, value_enum)]
        validity: Option<ValidityOpt>,
    },
}

#[derive(Copy, Clone, Eq, PartialEq, Debug, ValueEnum)]
enum ValidityOpt {
    /// Non-empty data
    Data,
    /// Non-empty samples
    Samples,
    /// Both non-empty
    Both,
}

impl From<ValidityOpt> for ValidityKind {
    fn from(v: ValidityOpt) -> Self {
        match v {
            ValidityOpt::Data => Self::NonzeroData,
            ValidityOpt::Samples => Self::NonzeroSamples,
            ValidityOpt::Both => Self::NonzeroDataSamples,
        }
    }
}

/// Aggregation result as written to disk.
#[derive(Serialize)]
struct AggregateReport<'a> {
    input: String,
    range: [usize; 2],
    workers: usize,
    batches: usize,
    traces: u64,
    params: &'a AnalysisParams,
    statistic: KernelOutput,
}

/// Materialization result as written to disk.
#[derive(Serialize)]
struct MaterializeReport {
    input: String,
    range: [usize; 2],
    eof: bool,
    matrices: Materialized,
}

fn main() -> Result<()> {
    init_tracing();

    let cli = Cli::parse();
    let mut opts = ReadOptions::from_env()?;
    if cli.no_progress {
        opts.progress = false;
    }

    match cli.cmd {
        Cmd::Simulate {
            rows,
            data_len,
            samples_len,
            gain,
            noise,
            gap_every,
            seed,
            out,
        } => {
            let p = SimParams {
                rows: usize::try_from(rows).context("rows does not fit in usize")?,
                data_len: usize::try_from(data_len).context("data_len does not fit in usize")?,
                samples_len,
                gain,
                noise,
                gap_every,
                seed,
            };
            simulate(&p, &out)
        }

        Cmd::Materialize {
            input,
            params,
            lo,
            hi,
            out,
        } => materialize(&input, params.as_deref(), lo, hi, &out, opts),

        Cmd::Aggregate {
            input,
            params,
            kernel,
            workers,
            out,
        } => {
            let workers = workers
                .map(usize::try_from)
                .transpose()
                .context("workers does not fit in usize")?;
            aggregate(&input, params.as_deref(), kernel, workers, &out, opts)
        }

        Cmd::FirstValid { input, validity } => {
            let kind = validity.map_or(opts.validity, ValidityKind::from);
            first_valid(&input, kind, opts)
        }
    }
}

/// Initialize tracing with an env-driven filter (default INFO).
fn init_tracing() {
    use tracing_subscriber::{fmt, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let fmt_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_level(true)
        .compact();

    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(fmt_layer)
        .try_init();
}

/// Ensure the parent directory for a file exists.
fn ensure_parent_dir(path: &Path) -> Result<()> {
    if let Some(dir) = path.parent() {
        if !dir.as_os_str().is_empty() {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("creating parent directory {}", dir.display()))?;
        }
    }
    Ok(())
}

fn is_stdio(path: &Path) -> bool {
    path == Path::new("-")
}

/// Pretty JSON to `out` (`-` is stdout).
fn write_json<T: Serialize>(out: &Path, value: &T) -> Result<()> {
    if is_stdio(out) {
        let stdout = std::io::stdout();
        let mut w = BufWriter::new(stdout.lock());
        serde_json::to_writer_pretty(&mut w, value).context("serialize JSON to stdout")?;
        w.write_all(b"\n")?;
        w.flush()?;
        return Ok(());
    }
    ensure_parent_dir(out)?;
    let f = std::fs::File::create(out).with_context(|| format!("create {}", out.display()))?;
    let mut w = BufWriter::new(f);
    serde_json::to_writer_pretty(&mut w, value)
        .with_context(|| format!("serialize JSON to {}", out.display()))?;
    w.flush()?;
    Ok(())
}

/// Open `input` as a trace source (`-` is a stdin pipe).
fn open_source(input: &Path) -> Result<Box<dyn TraceSource>> {
    if is_stdio(input) {
        Ok(Box::new(PipeTrace::stdin().context("open stdin trace stream")?))
    } else {
        Ok(Box::new(FileTrace::open(input)?))
    }
}

/// Store over `input` with the passes `params` asks for.
fn open_store(input: &Path, params: Option<&AnalysisParams>) -> Result<TraceStore> {
    let mut store = TraceStore::from_boxed(open_source(input)?);
    if let Some(p) = params {
        p.install_passes(&mut store);
    }
    Ok(store)
}

fn simulate(p: &SimParams, out: &Path) -> Result<()> {
    info!(
        rows = p.rows,
        data_len = p.data_len,
        samples_len = p.samples_len,
        seed = p.seed,
        "generating synthetic trace"
    );
    let trace = generate_trace(p)?;

    if is_stdio(out) {
        let stdout = std::io::stdout();
        write_trace_jsonl_to(BufWriter::new(stdout.lock()), &trace)?;
        return Ok(());
    }
    write_trace_auto(out, &trace).with_context(|| format!("writing trace to {}", out.display()))?;
    println!(
        "Simulated {} rows ({} data bytes, {} samples) → {}",
        trace.len(),
        p.data_len,
        p.samples_len,
        out.display()
    );
    Ok(())
}

fn materialize(
    input: &Path,
    params: Option<&Path>,
    lo: Option<usize>,
    hi: Option<usize>,
    out: &Path,
    opts: ReadOptions,
) -> Result<()> {
    // Params are optional here: explicit file, else sidecar, else none.
    let params = match params {
        Some(p) => Some(AnalysisParams::load(p)?),
        None if is_stdio(input) => None,
        None => AnalysisParams::sidecar(input)
            .filter(|s| s.is_file())
            .map(|s| AnalysisParams::load(&s))
            .transpose()?,
    };

    let mut trace: Trace = Trace::from_store(open_store(input, params.as_ref())?).with_options(opts);
    let default = params
        .as_ref()
        .map_or(0..trace.len(), |p| p.rows(trace.len()));
    let range = lo.unwrap_or(default.start)..hi.unwrap_or(default.end);
    info!(input = %input.display(), lo = range.start, hi = range.end, "materializing");

    let out_batch = trace.read_batch(range.clone())?;
    let matrices = match out_batch.batch {
        Batch::Matrices(m) => m,
        Batch::Statistic(never) => match never {},
    };
    info!(rows = matrices.rows(), traces = trace.traces_returned(), "materialized");
    write_json(
        out,
        &MaterializeReport {
            input: input.display().to_string(),
            range: [range.start, range.end],
            eof: out_batch.eof,
            matrices,
        },
    )
}

fn aggregate(
    input: &Path,
    params: Option<&Path>,
    kernel: Option<KernelKind>,
    workers: Option<usize>,
    out: &Path,
    mut opts: ReadOptions,
) -> Result<()> {
    // Resolved before any trace I/O.
    let mut params = AnalysisParams::for_input(input, params)?;
    if let Some(k) = kernel {
        params.kernel = k;
    }
    if let Some(w) = workers.or(params.workers) {
        opts.workers = w;
    }
    if is_stdio(input) && opts.workers > 1 {
        warn!(workers = opts.workers, "stdin traces are read by a single worker");
        opts.workers = 1;
    }

    let kernel = Kernel::new(params.kernel, params.work_split);
    let mut trace: AnyTrace<Kernel> = if opts.workers > 1 {
        let (input, params, kernel) = (input.to_owned(), params.clone(), kernel.clone());
        AnyTrace::Distributed(DistributedTrace::spawn(opts, move |_| {
            let mut t = Trace::from_store(open_store(&input, Some(&params))?)
                .with_options(ReadOptions { progress: false, ..opts });
            t.attach(kernel.clone());
            Ok(t)
        })?)
    } else {
        let mut t = Trace::from_store(open_store(input, Some(&params))?).with_options(opts);
        t.attach(kernel);
        AnyTrace::Local(t)
    };

    let range = params.rows(trace.len());
    let step = params.batch.unwrap_or(range.len()).max(1);
    info!(
        input = %input.display(),
        kernel = %params.kernel,
        lo = range.start,
        hi = range.end,
        workers = opts.workers,
        "aggregating"
    );

    let (statistic, batches) = run_batches(&mut trace, range.clone(), step)?;
    let traces = trace.traces_returned()?;
    info!(batches, traces, "aggregation done");

    write_json(
        out,
        &AggregateReport {
            input: input.display().to_string(),
            range: [range.start, range.end],
            workers: opts.workers,
            batches,
            traces,
            params: &params,
            statistic,
        },
    )
}

/// Feed `range` in `step`-row batches; the last batch's statistic covers all.
fn run_batches(
    trace: &mut AnyTrace<Kernel>,
    range: Range<usize>,
    step: usize,
) -> Result<(KernelOutput, usize)> {
    let mut lo = range.start;
    let mut batches = 0usize;
    loop {
        let hi = (lo + step).min(range.end);
        let out = trace.read_batch(lo..hi)?;
        batches += 1;
        lo = hi;
        if lo >= range.end || out.eof {
            let statistic = match out.batch {
                Batch::Statistic(s) => s,
                Batch::Matrices(_) => anyhow::bail!("aggregation produced matrices"),
            };
            return Ok((statistic, batches));
        }
    }
}

fn first_valid(input: &Path, kind: ValidityKind, opts: ReadOptions) -> Result<()> {
    let mut trace: Trace = Trace::from_store(open_store(input, None)?).with_options(opts);
    let index = trace.first_valid(kind)?;
    info!(input = %input.display(), %kind, index, "first valid row");
    println!("{index}");
    Ok(())
}
