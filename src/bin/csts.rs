use std::fs::File;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use csts::core::series::read_header;
use csts::core::{Number, TimeSeriesFile, DOTEXT};
use csts::etl::{import_csv, CsvImportOptions, CsvSink, ParquetSink, RowSink, TimeConversion};
use csts::table::{DataDirOptions, TimeSeriesDataDir, CONFIG_FILE};
use log::info;

#[derive(Parser)]
#[command(name = "csts")]
#[command(about = "Inspect, import and export fixed-step time series")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Describe a .csts file or a data directory
    Info {
        path: PathBuf,
    },
    /// Print the (when, value) pairs of a .csts file
    Dump {
        file: PathBuf,

        /// Only slots at or after this UNIX time
        #[arg(long)]
        start: Option<f64>,

        /// Only slots before this UNIX time
        #[arg(long)]
        stop: Option<f64>,
    },
    /// Import a CSV file into a data directory, one key per column
    Import {
        datadir: PathBuf,
        csv: PathBuf,

        /// Column holding the timestamps
        #[arg(long, default_value = "when")]
        time_column: String,

        /// Timestamps are ISO 8601 rather than UNIX seconds
        #[arg(long)]
        iso8601: bool,

        /// Grid step in seconds (required for a new data directory)
        #[arg(long)]
        step: Option<f64>,

        /// Partition policy: daily, weekly, monthly or annual
        #[arg(long)]
        policy: Option<String>,

        /// Timezone for partition boundaries, e.g. UTC or +1000
        #[arg(long)]
        timezone: Option<String>,
    },
    /// Export keys of a data directory to .parquet or .csv
    Export {
        datadir: PathBuf,
        output: PathBuf,

        #[arg(long)]
        start: Option<f64>,

        #[arg(long)]
        stop: Option<f64>,

        /// Keys or glob patterns to export (default: all)
        #[arg(long = "key")]
        keys: Vec<String>,
    },
}

fn main() -> Result<()> {
    env_logger::init();
    let cli = Cli::parse();

    match cli.command {
        Commands::Info { path } => info_cmd(&path),
        Commands::Dump { file, start, stop } => dump_cmd(&file, start, stop),
        Commands::Import {
            datadir,
            csv,
            time_column,
            iso8601,
            step,
            policy,
            timezone,
        } => {
            let mut options = DataDirOptions::new();
            options.epoch = step.map(step_number).map(Into::into);
            options.policy = policy.map(Into::into);
            options.timezone = timezone;
            let mut datadir = TimeSeriesDataDir::open(&datadir, options)
                .with_context(|| format!("open data directory {}", datadir.display()))?;
            let reader = File::open(&csv).with_context(|| format!("open {}", csv.display()))?;
            let import = CsvImportOptions {
                time_column,
                conversion: if iso8601 {
                    TimeConversion::Iso8601
                } else {
                    TimeConversion::Seconds
                },
                ..CsvImportOptions::default()
            };
            let stats = import_csv(&mut datadir, reader, &import)?;
            datadir.close()?;
            println!(
                "imported rows={} values={} empty_cells={} keys={}",
                stats.rows,
                stats.values,
                stats.empty_cells,
                stats.keys.join(",")
            );
            Ok(())
        }
        Commands::Export {
            datadir,
            output,
            start,
            stop,
            keys,
        } => export_cmd(&datadir, &output, start, stop, &keys),
    }
}

/// Integral steps keep an integer epoch.
fn step_number(step: f64) -> Number {
    if step.fract() == 0.0 && step.abs() < 1e15 {
        Number::Int(step as i64)
    } else {
        Number::Float(step)
    }
}

fn info_cmd(path: &Path) -> Result<()> {
    if path.is_file() {
        let header = read_header(path)?.context("file vanished")?;
        let ts = TimeSeriesFile::open(path, None, None)?;
        println!("file:      {}", path.display());
        println!("typecode:  {}", header.typecode);
        println!("endian:    {:?}", header.endian);
        println!("start:     {}", header.epoch.start());
        println!("step:      {}", header.epoch.step());
        println!("samples:   {}", ts.stored_len()?);
        println!("stop:      {}", ts.stop()?);
        return Ok(());
    }
    if path.join(CONFIG_FILE).is_file() {
        let mut datadir = TimeSeriesDataDir::open(path, DataDirOptions::new())?;
        println!("datadir:   {}", path.display());
        println!("epoch:     {}", datadir.epoch());
        println!(
            "policy:    {} ({})",
            datadir.policy().name(),
            datadir.policy().timezone()
        );
        for key in datadir.keys(&[])? {
            let series = datadir.get(&key)?;
            let names = series.partition_names()?;
            match (series.start()?, series.stop()?) {
                (Some(start), Some(stop)) => println!(
                    "  {key}: {} partitions, {start} .. {stop}",
                    names.len()
                ),
                _ => println!("  {key}: empty"),
            }
        }
        return Ok(());
    }
    if path.is_dir() {
        for entry in std::fs::read_dir(path)? {
            let entry_path = entry?.path();
            if entry_path.to_string_lossy().ends_with(DOTEXT) {
                if let Some(header) = read_header(&entry_path)? {
                    println!(
                        "{}: {} start={} step={}",
                        entry_path.display(),
                        header.typecode,
                        header.epoch.start(),
                        header.epoch.step()
                    );
                }
            }
        }
        return Ok(());
    }
    bail!("{} does not exist", path.display())
}

fn dump_cmd(file: &Path, start: Option<f64>, stop: Option<f64>) -> Result<()> {
    let mut ts = TimeSeriesFile::open(file, None, None)
        .with_context(|| format!("open {}", file.display()))?;
    let start = start.unwrap_or(f64::NEG_INFINITY);
    let stop = stop.unwrap_or(f64::INFINITY);
    for (when, value) in ts.items()? {
        if when >= start && when < stop {
            println!("{when}\t{value}");
        }
    }
    Ok(())
}

fn export_cmd(
    datadir: &Path,
    output: &Path,
    start: Option<f64>,
    stop: Option<f64>,
    patterns: &[String],
) -> Result<()> {
    let mut datadir = TimeSeriesDataDir::open(datadir, DataDirOptions::new())
        .with_context(|| format!("open data directory {}", datadir.display()))?;
    let globs: Vec<&str> = patterns.iter().map(String::as_str).collect();
    let keys = datadir.keys(&globs)?;
    if keys.is_empty() {
        bail!("no keys to export");
    }

    let (mut lo, mut hi) = (f64::INFINITY, f64::NEG_INFINITY);
    for key in &keys {
        let series = datadir.get(key)?;
        if let (Some(a), Some(b)) = (series.start()?, series.stop()?) {
            lo = lo.min(a);
            hi = hi.max(b);
        }
    }
    let start = start.unwrap_or(lo);
    let stop = stop.unwrap_or(hi);
    if !start.is_finite() || !stop.is_finite() {
        bail!("no data to export, give --start and --stop");
    }

    let key_refs: Vec<&str> = keys.iter().map(String::as_str).collect();
    let batch = datadir.to_record_batch(start, stop, Some(key_refs.as_slice()), None)?;
    let mut sink: Box<dyn RowSink> = match output.extension().and_then(|ext| ext.to_str()) {
        Some("parquet") => Box::new(ParquetSink::try_new(output, batch.schema())?),
        Some("csv") => Box::new(CsvSink::try_new(output)?),
        _ => bail!("output must end in .parquet or .csv"),
    };
    let rows = batch.num_rows();
    sink.write_batch(batch)?;
    sink.finish()?;
    info!("exported {rows} rows of {} keys to {}", keys.len(), output.display());
    println!("exported rows={rows} keys={}", keys.join(","));
    Ok(())
}
