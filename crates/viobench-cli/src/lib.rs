//! viobench CLI - runs the VIO pipelines and prints the accuracy and latency tables.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use std::path::{Path, PathBuf};
use tracing::{info, warn};
use viobench_core::{AlignConfig, ErrorKind, ErrorStats, Trajectory};
use viobench_eval::{
    precompute_optical_flow, read_euroc_ground_truth, read_hybvio_jsonl, read_vins_csv,
    single_column_table, threshold_table, AssociatedMetric, BenchConfig, DatasetKind, EpeErrors,
    EstimateFormat, EurocDatasetManager, EvalError, HybvioPipeline, InterpolatedMetric,
    InterruptFlag, LatencyReport, MetricSelection, PowerEmulatorMode, PowerExperiment,
    SequenceRunner, Table, TimeBase, TrajectoryMetric, VinsPipeline,
};

/// Public function that can be called from the main binary
pub fn run_cli_main(args: &[&str]) -> Result<()> {
    let args = Args::parse_from(args);
    main_inner(args)
}

#[derive(Parser, Debug)]
#[command(name = "viobench-cli")]
#[command(about = "Accuracy and latency benchmarks for HybVIO and VINS-Mono on EuRoC")]
#[command(version)]
pub struct Args {
    /// YAML file overriding the default paths
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run HybVIO on the benchmark sequences and report the metric
    Accuracy {
        /// Single sequence to run. Default: every folder in the benchmark directory
        #[arg(long)]
        sequence: Option<String>,

        /// Delete existing output folders and rerun the sequences
        #[arg(long)]
        rerun: bool,

        /// MAE, RMSE, average or evoRMSE
        #[arg(long, default_value = "RMSE", value_parser = parse_metric)]
        metric: MetricSelection,
    },

    /// Run VINS-Mono on the rosbag sequences and report the evo RMSE
    VinsAccuracy {
        #[arg(long)]
        sequence: Option<String>,

        #[arg(long)]
        rerun: bool,
    },

    /// Single-column RMSE table over every sequence
    Table10 {
        #[arg(long, value_enum, default_value = "hybvio")]
        pipeline: Pipeline,

        #[arg(long)]
        rerun: bool,
    },

    /// HybVIO RMSE for every edge threshold, with the best value per sequence
    Table11 {
        #[arg(long)]
        rerun: bool,
    },

    /// Per-frame latency breakdown from HybVIO timing logs
    Latency {
        /// Folder with `<sequence>/stdout/*.txt`
        #[arg(long)]
        root: Option<PathBuf>,
    },

    /// Run HybVIO with the SEAL power emulator and report the run times
    Power {
        /// `store` serialises the optical flow, `load` replays it
        #[arg(long, value_enum, default_value = "load")]
        mode: PowerMode,

        #[arg(long)]
        sequence: Option<String>,

        /// Runs per sequence. Default: from the config
        #[arg(long)]
        repetitions: Option<u32>,
    },

    /// Store the optical flow of every sequence that has none yet
    PrecomputeFlow {
        #[arg(long)]
        sequence: Option<String>,
    },

    /// Optical flow EPE report: best fixed threshold against the best per sequence
    EpeTable {
        /// Simulator csv. Default: from the config
        csv: Option<PathBuf>,
    },

    /// Download EuRoC and convert it for the chosen pipeline
    Prepare {
        /// vins (raw only) or hybvio (raw + benchmark conversion)
        #[arg(long = "type", value_parser = parse_dataset_kind)]
        kind: DatasetKind,

        /// Do not encode the frame videos
        #[arg(long)]
        skip_video: bool,
    },

    /// Compare one estimate against ground truth
    Evaluate {
        /// EuRoC ground-truth csv
        ground_truth: PathBuf,

        /// HybVIO jsonl or VINS-Mono csv
        estimate: PathBuf,

        #[arg(long, value_enum, default_value = "hybvio")]
        format: Pipeline,

        #[arg(long, default_value = "RMSE", value_parser = parse_metric)]
        metric: MetricSelection,

        // ── Alignment (interpolated metrics) ──────────────────────
        #[arg(long)]
        fix_origin: bool,

        /// Rotate in the x/y plane only
        #[arg(long)]
        planar: bool,

        /// Estimate a similarity scale
        #[arg(long)]
        free_scale: bool,

        /// Fit the alignment on this leading fraction of the estimate
        #[arg(long)]
        rel_align_time: Option<f64>,

        // ── Association (evoRMSE) ─────────────────────────────────
        #[arg(long, default_value_t = viobench_eval::metric::DEFAULT_MAX_TIME_DIFF)]
        max_time_diff: f64,

        // ── Output ────────────────────────────────────────────────
        /// Append a row to this csv summary
        #[arg(long)]
        summary: Option<PathBuf>,

        /// Print the statistics as JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Pipeline {
    Hybvio,
    Vins,
}

impl Pipeline {
    fn estimate_format(self) -> EstimateFormat {
        match self {
            Self::Hybvio => EstimateFormat::Hybvio,
            Self::Vins => EstimateFormat::Vins,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum PowerMode {
    Store,
    Load,
}

impl From<PowerMode> for PowerEmulatorMode {
    fn from(mode: PowerMode) -> Self {
        match mode {
            PowerMode::Store => Self::Store,
            PowerMode::Load => Self::Load,
        }
    }
}

fn parse_metric(s: &str) -> std::result::Result<MetricSelection, String> {
    s.parse().map_err(|e: viobench_eval::EvalError| e.to_string())
}

fn parse_dataset_kind(s: &str) -> std::result::Result<DatasetKind, String> {
    s.parse().map_err(|e: viobench_eval::EvalError| e.to_string())
}

pub fn main_inner(args: Args) -> Result<()> {
    let config = BenchConfig::load_or_default(args.config.as_deref())
        .with_context(|| format!("Failed to load config {:?}", args.config))?;

    match args.command {
        Command::Accuracy {
            sequence,
            rerun,
            metric,
        } => run_accuracy(&config, sequence, rerun, metric),
        Command::VinsAccuracy { sequence, rerun } => run_vins_accuracy(&config, sequence, rerun),
        Command::Table10 { pipeline, rerun } => run_table10(&config, pipeline, rerun),
        Command::Table11 { rerun } => run_table11(&config, rerun),
        Command::Latency { root } => run_latency(&config, root),
        Command::Power {
            mode,
            sequence,
            repetitions,
        } => run_power(&config, mode.into(), sequence, repetitions),
        Command::PrecomputeFlow { sequence } => run_precompute_flow(&config, sequence),
        Command::EpeTable { csv } => run_epe_table(&config, csv),
        Command::Prepare { kind, skip_video } => run_prepare(&config, kind, skip_video),
        Command::Evaluate {
            ground_truth,
            estimate,
            format,
            metric,
            fix_origin,
            planar,
            free_scale,
            rel_align_time,
            max_time_diff,
            summary,
            json,
        } => {
            let align = AlignConfig {
                fix_origin,
                align_3d: !planar,
                fix_scale: !free_scale,
                rel_align_time,
            };
            let stats = run_evaluate(
                &ground_truth,
                &estimate,
                format,
                metric,
                align,
                max_time_diff,
            )?;
            if json {
                println!("{}", serde_json::to_string_pretty(&stats)?);
            } else {
                print_stats(&metric.to_string(), &stats);
            }
            if let Some(path) = summary {
                append_summary(&path, &ground_truth, &estimate, &metric.to_string(), &stats)?;
            }
            Ok(())
        }
    }
}

/// Ctrl-C handler for commands that spawn child processes.
fn install_interrupt() -> InterruptFlag {
    InterruptFlag::install().unwrap_or_else(|e| {
        warn!("{e}, Ctrl-C will not clean up partial output");
        InterruptFlag::new()
    })
}

// ---------------------------------------------------------------------------
// Accuracy
// ---------------------------------------------------------------------------
fn run_accuracy(
    config: &BenchConfig,
    sequence: Option<String>,
    rerun: bool,
    metric: MetricSelection,
) -> Result<()> {
    let pipeline = HybvioPipeline::new(config.hybvio.clone(), install_interrupt());
    let runner = SequenceRunner::new(pipeline, metric.build(EstimateFormat::Hybvio));
    let sequences = sequence.map(|s| vec![s]);
    runner
        .run_sequences(sequences.as_deref(), rerun)
        .context("HybVIO accuracy run failed")?;
    Ok(())
}

fn run_vins_accuracy(config: &BenchConfig, sequence: Option<String>, rerun: bool) -> Result<()> {
    let sequences = sequence.map_or_else(|| config.vins.sequences.clone(), |s| vec![s]);
    let pipeline = VinsPipeline::new(config.vins.clone(), install_interrupt());
    let runner = SequenceRunner::new(pipeline, MetricSelection::EvoRmse.build(EstimateFormat::Vins));
    runner
        .run_sequences(Some(sequences.as_slice()), rerun)
        .context("VINS-Mono accuracy run failed")?;
    Ok(())
}

// ---------------------------------------------------------------------------
// Tables
// ---------------------------------------------------------------------------
fn run_table10(config: &BenchConfig, pipeline: Pipeline, rerun: bool) -> Result<()> {
    let interrupt = install_interrupt();
    let (summary, column, title) = match pipeline {
        Pipeline::Hybvio => {
            let mut hybvio = config.hybvio.clone();
            hybvio.output_root_folder = hybvio.output_root_folder.join("table10");
            let sequences = hybvio.sequences.clone();
            let mut runner = SequenceRunner::new(
                HybvioPipeline::new(hybvio, interrupt),
                MetricSelection::Interpolated(ErrorKind::Rmse).build(EstimateFormat::Hybvio),
            );
            runner.print_metrics = false;
            let summary = runner.run_sequences(Some(sequences.as_slice()), rerun)?;
            (summary, "SEAL + HybVIO", "SEAL + HybVIO RMSE Results:")
        }
        Pipeline::Vins => {
            let mut vins = config.vins.clone();
            vins.output_root_folder = vins.output_root_folder.join("table10");
            let sequences = vins.sequences.clone();
            let mut runner = SequenceRunner::new(
                VinsPipeline::new(vins, interrupt),
                MetricSelection::EvoRmse.build(EstimateFormat::Vins),
            );
            runner.print_metrics = false;
            let summary = runner.run_sequences(Some(sequences.as_slice()), rerun)?;
            (summary, "SEAL + VINS-Mono", "VINS-Mono RMSE Results:")
        }
    };

    // The HybVIO table only summarises more than one sequence
    let min_summary_rows = match pipeline {
        Pipeline::Hybvio => 2,
        Pipeline::Vins => 1,
    };
    println!("\n{title}");
    println!("{}", single_column_table(column, &summary.results, min_summary_rows));
    Ok(())
}

fn run_table11(config: &BenchConfig, rerun: bool) -> Result<()> {
    let interrupt = install_interrupt();
    let sequences = config.hybvio.sequences.clone();
    let table_root = config.hybvio.output_root_folder.join("table11");

    let mut names = Vec::new();
    let mut values = Vec::new();
    for threshold in &config.hybvio.edge_thresholds {
        if interrupt.is_set() {
            return Err(EvalError::Interrupted.into());
        }
        println!();
        println!("{0} Running for edge threshold: {1} {0}", "*".repeat(10), threshold.name);

        let mut hybvio = config.hybvio.clone();
        hybvio.output_root_folder = table_root.join(&threshold.name);
        hybvio.seal_params_path = threshold.seal_params_path.clone();
        std::fs::create_dir_all(&hybvio.output_root_folder)
            .with_context(|| format!("Failed to create {:?}", hybvio.output_root_folder))?;

        let mut runner = SequenceRunner::new(
            HybvioPipeline::new(hybvio, interrupt.clone()),
            MetricSelection::Interpolated(ErrorKind::Rmse).build(EstimateFormat::Hybvio),
        );
        runner.print_metrics = false;
        let summary = runner.run_sequences(Some(sequences.as_slice()), rerun)?;

        names.push(threshold.name.clone());
        values.push(sequences.iter().map(|s| summary.get(s)).collect::<Vec<_>>());
    }

    println!("\nRMSE Results:");
    println!("{}", threshold_table(&names, &sequences, &values));
    Ok(())
}

// ---------------------------------------------------------------------------
// Latency
// ---------------------------------------------------------------------------
fn run_latency(config: &BenchConfig, root: Option<PathBuf>) -> Result<()> {
    let root = root.unwrap_or_else(|| config.latency.root.clone());
    let report = LatencyReport::collect(&root, &config.latency.sequences)
        .with_context(|| format!("Failed to read latency logs under {:?}", root))?;
    for (path, reason) in &report.failures {
        println!("Error processing file {}: {reason}", path.display());
    }
    println!("{report}");
    Ok(())
}

// ---------------------------------------------------------------------------
// Power
// ---------------------------------------------------------------------------
fn run_power(
    config: &BenchConfig,
    mode: PowerEmulatorMode,
    sequence: Option<String>,
    repetitions: Option<u32>,
) -> Result<()> {
    let interrupt = install_interrupt();
    let sequences = sequence.map_or_else(|| config.power.sequences.clone(), |s| vec![s]);
    let repetitions = repetitions.unwrap_or(config.power.repetitions);

    let mut table = Table::new([
        "Sequence",
        "Run",
        "Mode",
        "PID",
        "Time (s)",
        "Odometry TOTAL (ms)",
        "Main TOTAL (ms)",
        "Frames",
    ]);
    for sequence in &sequences {
        for id in 0..repetitions {
            if interrupt.is_set() {
                return Err(EvalError::Interrupted.into());
            }
            let experiment =
                PowerExperiment::new(&config.hybvio, &config.power, sequence, id, interrupt.clone());
            if mode == PowerEmulatorMode::Load {
                experiment
                    .ensure_flow_available()
                    .with_context(|| format!("Failed to store the optical flow of {sequence}"))?;
            }
            let run = experiment
                .run(mode)
                .with_context(|| format!("Power run {id} of {sequence} failed"))?;
            let seconds = run.duration.as_secs_f64();
            println!("Run {id} of {sequence}: pid {}, {seconds:.2} s", run.pid);
            table.push_row(vec![
                sequence.clone(),
                id.to_string(),
                mode.to_string(),
                run.pid.to_string(),
                format!("{seconds:.2}"),
                format!("{:.3}", run.timings.odometry_total_ms),
                format!("{:.3}", run.timings.main_total_ms),
                format!("{}", run.timings.main_frames),
            ]);
        }
    }

    println!("\nPower Runs:");
    println!("{table}");
    Ok(())
}

fn run_precompute_flow(config: &BenchConfig, sequence: Option<String>) -> Result<()> {
    let sequences = sequence.map_or_else(|| config.power.sequences.clone(), |s| vec![s]);
    let computed = precompute_optical_flow(
        &config.hybvio,
        &config.power,
        &sequences,
        &install_interrupt(),
    )
    .context("Failed to precompute the optical flow")?;
    info!(computed = computed.len(), "Optical flow stored");
    Ok(())
}

// ---------------------------------------------------------------------------
// Optical flow EPE
// ---------------------------------------------------------------------------
fn run_epe_table(config: &BenchConfig, csv: Option<PathBuf>) -> Result<()> {
    let path = csv.unwrap_or_else(|| config.epe.errors_csv.clone());
    let errors = EpeErrors::read(&path, &config.epe).with_context(|| {
        format!(
            "{:?} is not usable. Run the SEAL optical flow simulator with no flags to \
             generate results for all sequences and thresholds",
            path
        )
    })?;
    let report = errors
        .report(config.epe.min_difference)
        .context("No threshold column holds any EPE value")?;
    println!("{report}");
    Ok(())
}

// ---------------------------------------------------------------------------
// Dataset preparation
// ---------------------------------------------------------------------------
fn run_prepare(config: &BenchConfig, kind: DatasetKind, skip_video: bool) -> Result<()> {
    let mut manager = EurocDatasetManager::new(config.dataset.clone(), install_interrupt());
    manager.encode_video = !skip_video;
    manager
        .prepare(kind)
        .with_context(|| format!("Failed to prepare {kind} data"))?;
    println!("Data preparation complete.");
    Ok(())
}

// ---------------------------------------------------------------------------
// Single evaluation
// ---------------------------------------------------------------------------
fn load_pair(ground_truth: &Path, estimate: &Path, format: Pipeline) -> Result<(Trajectory, Trajectory)> {
    let (gt, est) = match format {
        Pipeline::Hybvio => (
            read_euroc_ground_truth(ground_truth, TimeBase::Relative),
            read_hybvio_jsonl(estimate, true),
        ),
        Pipeline::Vins => (
            read_euroc_ground_truth(ground_truth, TimeBase::Absolute),
            read_vins_csv(estimate),
        ),
    };
    let gt = gt.with_context(|| format!("Failed to read ground truth {:?}", ground_truth))?;
    let est = est.with_context(|| format!("Failed to read estimate {:?}", estimate))?;
    info!(ground_truth = gt.len(), estimate = est.len(), "Loaded trajectories");
    Ok((gt, est))
}

fn run_evaluate(
    ground_truth: &Path,
    estimate: &Path,
    format: Pipeline,
    metric: MetricSelection,
    align: AlignConfig,
    max_time_diff: f64,
) -> Result<ErrorStats> {
    let (gt, est) = load_pair(ground_truth, estimate, format)?;
    let strategy: Box<dyn TrajectoryMetric> = match metric {
        MetricSelection::Interpolated(kind) => Box::new(InterpolatedMetric::new(kind).with_align(align)),
        MetricSelection::EvoRmse => Box::new(AssociatedMetric {
            max_time_diff,
            ..AssociatedMetric::new(format.estimate_format())
        }),
    };
    let stats = strategy
        .evaluate_stats(&gt, &est)
        .context("Trajectories could not be compared")?;
    Ok(stats)
}

fn print_stats(metric: &str, stats: &ErrorStats) {
    println!("\nTrajectory Error ({metric} alignment):");
    println!("  Pairs:  {}", stats.count);
    println!("  RMSE:   {:.4} m", stats.rmse);
    println!("  MAE:    {:.4} m", stats.mae);
    println!("  Median: {:.4} m", stats.median);
    println!("  Std:    {:.4} m", stats.std);
    println!("  Min:    {:.4} m", stats.min);
    println!("  Max:    {:.4} m", stats.max);
    println!("-----------------------------");
}

fn append_summary(
    path: &Path,
    ground_truth: &Path,
    estimate: &Path,
    metric: &str,
    stats: &ErrorStats,
) -> Result<()> {
    let new_file = !path.exists();
    let file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("Failed to open {:?}", path))?;
    let mut wtr = csv::Writer::from_writer(file);
    if new_file {
        wtr.write_record([
            "ground_truth", "estimate", "metric", "count", "rmse", "mae", "median", "std", "min",
            "max",
        ])?;
    }
    wtr.write_record(&[
        ground_truth.display().to_string(),
        estimate.display().to_string(),
        metric.to_string(),
        stats.count.to_string(),
        format!("{:.6}", stats.rmse),
        format!("{:.6}", stats.mae),
        format!("{:.6}", stats.median),
        format!("{:.6}", stats.std),
        format!("{:.6}", stats.min),
        format!("{:.6}", stats.max),
    ])?;
    wtr.flush()?;
    println!("Summary appended to {:?}", path);
    Ok(())
}
