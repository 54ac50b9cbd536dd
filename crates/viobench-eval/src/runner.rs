//! Batch evaluation over a set of sequences.
//!
//! A [`VioPipeline`] knows where one VIO system reads and writes its files and
//! how to run it; [`SequenceRunner`] drives it over every sequence and reduces
//! the per-sequence metrics to an average.

use crate::config::{seal_params_differ, HybvioConfig, VinsConfig};
use crate::error::{EvalError, Result};
use crate::executor::{HybvioExecutor, VinsExecutor, ESTIMATED_TRAJECTORY_FILE};
use crate::fsutil::{is_non_empty_dir, list_names, remove_dir_if_exists};
use crate::interrupt::InterruptFlag;
use crate::metric::{EstimateFormat, TrajectoryMetric};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

pub const GROUND_TRUTH_RELATIVE_PATH: &str = "mav0/state_groundtruth_estimate0/data.csv";

pub trait VioPipeline {
    fn name(&self) -> &str;

    fn estimate_format(&self) -> EstimateFormat;

    fn output_folder(&self, sequence: &str) -> PathBuf;

    fn seal_params_path(&self) -> &Path;

    fn ground_truth_path(&self, sequence: &str) -> PathBuf;

    fn estimate_path(&self, sequence: &str) -> PathBuf;

    /// Sequences available on disk, sorted.
    fn discover_sequences(&self) -> Result<Vec<String>>;

    fn execute(&self, sequence: &str) -> Result<()>;

    /// Ctrl-C flag shared with the executors.
    fn interrupt(&self) -> &InterruptFlag;
}

// ---------------------------------------------------------------------------
// HybVIO
// ---------------------------------------------------------------------------
pub struct HybvioPipeline {
    pub config: HybvioConfig,
    interrupt: InterruptFlag,
}

impl HybvioPipeline {
    pub fn new(config: HybvioConfig, interrupt: InterruptFlag) -> Self {
        Self { config, interrupt }
    }
}

/// Mono benchmark folders share the raw recording of the stereo sequence.
pub fn raw_sequence_name(sequence: &str) -> &str {
    sequence
        .strip_suffix("-cam0")
        .or_else(|| sequence.strip_suffix("-cam1"))
        .unwrap_or(sequence)
}

impl VioPipeline for HybvioPipeline {
    fn name(&self) -> &str {
        "SEAL + HybVIO"
    }

    fn estimate_format(&self) -> EstimateFormat {
        EstimateFormat::Hybvio
    }

    fn output_folder(&self, sequence: &str) -> PathBuf {
        self.config.output_root_folder.join(sequence)
    }

    fn seal_params_path(&self) -> &Path {
        &self.config.seal_params_path
    }

    fn ground_truth_path(&self, sequence: &str) -> PathBuf {
        self.config
            .raw_data_folder
            .join(raw_sequence_name(sequence))
            .join(GROUND_TRUTH_RELATIVE_PATH)
    }

    fn estimate_path(&self, sequence: &str) -> PathBuf {
        self.output_folder(sequence).join(ESTIMATED_TRAJECTORY_FILE)
    }

    fn discover_sequences(&self) -> Result<Vec<String>> {
        list_names(&self.config.benchmark_folder, |p| p.is_dir())
    }

    fn execute(&self, sequence: &str) -> Result<()> {
        HybvioExecutor::new(&self.config, sequence, self.interrupt.clone())
            .execute()
            .map(|_| ())
    }

    fn interrupt(&self) -> &InterruptFlag {
        &self.interrupt
    }
}

// ---------------------------------------------------------------------------
// VINS-Mono
// ---------------------------------------------------------------------------
pub struct VinsPipeline {
    pub config: VinsConfig,
    interrupt: InterruptFlag,
}

impl VinsPipeline {
    pub fn new(config: VinsConfig, interrupt: InterruptFlag) -> Self {
        Self { config, interrupt }
    }
}

impl VioPipeline for VinsPipeline {
    fn name(&self) -> &str {
        "VINS-Mono"
    }

    fn estimate_format(&self) -> EstimateFormat {
        EstimateFormat::Vins
    }

    fn output_folder(&self, sequence: &str) -> PathBuf {
        self.config.output_root_folder.join(sequence)
    }

    fn seal_params_path(&self) -> &Path {
        &self.config.seal_params_path
    }

    fn ground_truth_path(&self, sequence: &str) -> PathBuf {
        self.config
            .ground_truth_root_folder
            .join(sequence)
            .join("data.csv")
    }

    fn estimate_path(&self, sequence: &str) -> PathBuf {
        self.output_folder(sequence)
            .join("vins_output")
            .join("vins_result_no_loop.csv")
    }

    fn discover_sequences(&self) -> Result<Vec<String>> {
        let bags = list_names(&self.config.data_folder, |p| {
            p.extension().is_some_and(|ext| ext == "bag")
        })?;
        Ok(bags
            .into_iter()
            .map(|name| name.trim_end_matches(".bag").to_string())
            .collect())
    }

    fn execute(&self, sequence: &str) -> Result<()> {
        VinsExecutor::new(&self.config, sequence, self.interrupt.clone()).execute()
    }

    fn interrupt(&self) -> &InterruptFlag {
        &self.interrupt
    }
}

// ---------------------------------------------------------------------------
// Runner
// ---------------------------------------------------------------------------
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RunSummary {
    /// `(sequence, metric)` in processing order.
    pub results: Vec<(String, f64)>,
    pub skipped: Vec<String>,
}

impl RunSummary {
    pub fn average(&self) -> Option<f64> {
        if self.results.is_empty() {
            return None;
        }
        Some(self.results.iter().map(|(_, v)| v).sum::<f64>() / self.results.len() as f64)
    }

    pub fn get(&self, sequence: &str) -> Option<f64> {
        self.results
            .iter()
            .find(|(name, _)| name == sequence)
            .map(|(_, v)| *v)
    }
}

pub struct SequenceRunner<P> {
    pub pipeline: P,
    metric: Box<dyn TrajectoryMetric>,
    /// Print `Metric for sequence ...` lines while running.
    pub print_metrics: bool,
}

impl<P: VioPipeline> SequenceRunner<P> {
    pub fn new(pipeline: P, metric: Box<dyn TrajectoryMetric>) -> Self {
        Self {
            pipeline,
            metric,
            print_metrics: true,
        }
    }

    /// Metric of one sequence from the files already on disk.
    pub fn metric_for(&self, sequence: &str) -> Result<f64> {
        let ground_truth = self.pipeline.ground_truth_path(sequence);
        let estimate = self.pipeline.estimate_path(sequence);
        for path in [&ground_truth, &estimate] {
            if !path.exists() {
                return Err(EvalError::MissingFile(path.clone()));
            }
        }
        self.metric.calculate_metric(&ground_truth, &estimate)
    }

    /// Runs the pipeline where needed and evaluates every sequence.
    ///
    /// `sequences = None` evaluates everything [`VioPipeline::discover_sequences`]
    /// finds. With `rerun`, previous output is discarded first. A sequence that
    /// fails to run or evaluate is reported and skipped. Ctrl-C stops the batch
    /// before the next sequence starts, or as soon as a running pipeline exits.
    pub fn run_sequences(&self, sequences: Option<&[String]>, rerun: bool) -> Result<RunSummary> {
        let sequences = match sequences {
            Some(list) => list.to_vec(),
            None => self.pipeline.discover_sequences()?,
        };

        let mut summary = RunSummary::default();
        for sequence in &sequences {
            self.check_interrupt()?;
            println!("Processing sequence: {sequence}");
            match self.process(sequence, rerun) {
                Ok(value) => {
                    if self.print_metrics {
                        println!("Metric for sequence '{sequence}': {value:.2}");
                    }
                    summary.results.push((sequence.clone(), value));
                }
                Err(EvalError::Interrupted) => return Err(EvalError::Interrupted),
                Err(e) => {
                    warn!(sequence = %sequence, "Skipping sequence: {e}");
                    summary.skipped.push(sequence.clone());
                }
            }
        }

        self.check_interrupt()?;
        match summary.average() {
            Some(avg) => println!(
                "\nOverall average metric across {} sequences: {avg:.3}",
                summary.results.len()
            ),
            None => println!("No sequences processed."),
        }
        Ok(summary)
    }

    fn check_interrupt(&self) -> Result<()> {
        if self.pipeline.interrupt().is_set() {
            warn!(pipeline = self.pipeline.name(), "Interrupted, stopping the batch");
            return Err(EvalError::Interrupted);
        }
        Ok(())
    }

    /// Existing non-empty output is evaluated as is; a folder without an
    /// estimate then fails in [`Self::metric_for`] and the sequence is skipped.
    fn process(&self, sequence: &str, rerun: bool) -> Result<f64> {
        let output = self.pipeline.output_folder(sequence);
        if rerun || !is_non_empty_dir(&output) {
            if remove_dir_if_exists(&output)? {
                info!("Removed previous output {}", output.display());
            }
            info!(pipeline = self.pipeline.name(), sequence, "Running pipeline");
            self.pipeline.execute(sequence)?;
        } else {
            self.warn_on_changed_params(&output)?;
        }
        self.metric_for(sequence)
    }

    fn warn_on_changed_params(&self, output: &Path) -> Result<()> {
        let current = self.pipeline.seal_params_path();
        let Some(name) = current.file_name() else {
            return Ok(());
        };
        if !current.exists() {
            return Ok(());
        }
        let stored = output.join(name);
        if seal_params_differ(current, &stored)? {
            println!(
                "WARNING: SEAL parameters file {} differs from the one used for {}. \
                 Consider rerunning with --rerun.",
                current.display(),
                output.display()
            );
        }
        Ok(())
    }
}
