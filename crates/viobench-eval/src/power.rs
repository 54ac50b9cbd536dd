//! Power measurement runs with the SEAL optical-flow emulator.
//!
//! In `store` mode HybVIO serialises the optical flow of a sequence under
//! `<storage>/<sequence>`. In `load` mode it replays that flow instead of
//! computing it, so a power meter only sees the rest of the pipeline.

use crate::config::{HybvioConfig, PowerConfig};
use crate::error::{EvalError, Result};
use crate::executor::{describe, log_files};
use crate::fsutil::{is_non_empty_dir, remove_dir_if_exists};
use crate::interrupt::InterruptFlag;
use crate::latency::{TimingParser, MAIN_SECTION_HEADER, ODOMETRY_SECTION_HEADER};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::PathBuf;
use std::process::Command;
use std::time::{Duration, Instant};
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PowerEmulatorMode {
    Store,
    Load,
}

impl fmt::Display for PowerEmulatorMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Store => f.write_str("store"),
            Self::Load => f.write_str("load"),
        }
    }
}

/// `TOTAL` and `FRAMES` of the two timing sections HybVIO prints on exit.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct RunTimings {
    pub odometry_total_ms: f64,
    pub odometry_frames: f64,
    pub main_total_ms: f64,
    pub main_frames: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PowerRun {
    pub sequence: String,
    pub id: u32,
    pub mode: PowerEmulatorMode,
    pub pid: u32,
    pub duration: Duration,
    pub timings: RunTimings,
}

pub struct PowerExperiment<'a> {
    hybvio: &'a HybvioConfig,
    power: &'a PowerConfig,
    sequence: String,
    id: u32,
    interrupt: InterruptFlag,
}

impl<'a> PowerExperiment<'a> {
    pub fn new(
        hybvio: &'a HybvioConfig,
        power: &'a PowerConfig,
        sequence: &str,
        id: u32,
        interrupt: InterruptFlag,
    ) -> Self {
        Self {
            hybvio,
            power,
            sequence: sequence.to_string(),
            id,
            interrupt,
        }
    }

    /// Flow of this sequence only. HybVIO itself is given the storage root.
    pub fn sequence_storage_path(&self) -> PathBuf {
        self.power.storage_path.join(&self.sequence)
    }

    pub fn log_path(&self, mode: PowerEmulatorMode) -> PathBuf {
        self.power
            .output_root_folder
            .join(&self.sequence)
            .join("stdout")
            .join(format!("run{}_{mode}.txt", self.id))
    }

    pub fn is_flow_available(&self) -> bool {
        is_non_empty_dir(&self.sequence_storage_path())
    }

    pub fn command(&self, mode: PowerEmulatorMode) -> Command {
        let mut cmd = Command::new(&self.hybvio.binary_path);
        cmd.arg(format!("-vocabularyPath={}", self.hybvio.orb_vocab_path.display()))
            .arg(format!(
                "-i={}",
                self.hybvio.benchmark_folder.join(&self.sequence).display()
            ))
            .arg("-displayVideo=false")
            .arg("-timer=true")
            .arg(format!(
                "-sealPowerEmulatorStoragePath={}",
                self.power.storage_path.display()
            ))
            .arg(format!("-sealPowerEmulatorMode={mode}"));
        cmd
    }

    /// Stores the flow first when a `load` run would find none.
    pub fn ensure_flow_available(&self) -> Result<()> {
        if self.is_flow_available() {
            return Ok(());
        }
        info!(sequence = %self.sequence, "No stored optical flow, computing it first");
        self.run(PowerEmulatorMode::Store)?;
        if !self.is_flow_available() {
            return Err(self.invalid("storing the optical flow left nothing behind".into()));
        }
        Ok(())
    }

    /// Runs HybVIO once and checks its timing output.
    ///
    /// Any failure, an interrupt included, removes the stored flow of this
    /// sequence so a partial serialisation is never replayed.
    pub fn run(&self, mode: PowerEmulatorMode) -> Result<PowerRun> {
        match self.run_inner(mode) {
            Ok(run) => Ok(run),
            Err(e) => {
                let storage = self.sequence_storage_path();
                warn!("Error occurred: {e}. Deleting sequence folder: {}", storage.display());
                remove_dir_if_exists(&storage)?;
                Err(e)
            }
        }
    }

    fn run_inner(&self, mode: PowerEmulatorMode) -> Result<PowerRun> {
        if mode == PowerEmulatorMode::Load && !self.is_flow_available() {
            return Err(EvalError::MissingFile(self.sequence_storage_path()));
        }

        let log = self.log_path(mode);
        if let Some(dir) = log.parent() {
            fs::create_dir_all(dir).map_err(|e| EvalError::io(dir, e))?;
        }
        let (stdout, stderr) = log_files(&log, false)?;
        let mut cmd = self.command(mode);
        info!("Running {}", describe(&cmd));

        let start = Instant::now();
        let mut child = cmd
            .stdout(stdout)
            .stderr(stderr)
            .spawn()
            .map_err(|e| EvalError::io(&self.hybvio.binary_path, e))?;
        let pid = child.id();
        let status = child.wait().map_err(|e| EvalError::io(&self.hybvio.binary_path, e))?;
        let duration = start.elapsed();

        if self.interrupt.is_set() {
            return Err(EvalError::Interrupted);
        }
        if !status.success() {
            return Err(EvalError::CommandFailed {
                command: describe(&cmd),
                status: status.to_string(),
            });
        }

        let output = fs::read_to_string(&log).map_err(|e| EvalError::io(&log, e))?;
        let timings = self.validate_output(&output)?;
        Ok(PowerRun {
            sequence: self.sequence.clone(),
            id: self.id,
            mode,
            pid,
            duration,
            timings,
        })
    }

    /// A run counts when both sections report a plausible total time and
    /// frame count.
    pub fn validate_output(&self, output: &str) -> Result<RunTimings> {
        let parser = TimingParser::new()?;
        let section = |header: &str, name: &str| -> Result<(f64, f64)> {
            let values = parser
                .parse_named_section(output, header)
                .ok_or_else(|| self.invalid(format!("no {name} timing section")))?
                .values;
            let get = |key: &str| {
                values
                    .get(key)
                    .copied()
                    .ok_or_else(|| self.invalid(format!("{name} section has no {key}")))
            };
            Ok((get("TOTAL")?, get("FRAMES")?))
        };
        let (odometry_total_ms, odometry_frames) = section(ODOMETRY_SECTION_HEADER, "odometry")?;
        let (main_total_ms, main_frames) = section(MAIN_SECTION_HEADER, "main")?;

        let checks = [
            ("odometry TOTAL", odometry_total_ms, self.power.min_total_ms),
            ("odometry FRAMES", odometry_frames, self.power.min_frames),
            ("main TOTAL", main_total_ms, self.power.min_total_ms),
            ("main FRAMES", main_frames, self.power.min_frames),
        ];
        for (key, value, min) in checks {
            if value < min {
                return Err(self.invalid(format!("timing measurement {value} for {key} is too low")));
            }
        }
        Ok(RunTimings {
            odometry_total_ms,
            odometry_frames,
            main_total_ms,
            main_frames,
        })
    }

    fn invalid(&self, reason: String) -> EvalError {
        EvalError::InvalidRun {
            sequence: self.sequence.clone(),
            reason,
        }
    }
}

/// Stores the optical flow of every sequence that has none yet.
///
/// Returns the sequences that were computed.
pub fn precompute_optical_flow(
    hybvio: &HybvioConfig,
    power: &PowerConfig,
    sequences: &[String],
    interrupt: &InterruptFlag,
) -> Result<Vec<String>> {
    println!("Running experiments with -sealPowerEmulatorMode=store...");
    let mut computed = Vec::new();
    for sequence in sequences {
        if interrupt.is_set() {
            return Err(EvalError::Interrupted);
        }
        let experiment = PowerExperiment::new(hybvio, power, sequence, 0, interrupt.clone());
        if experiment.is_flow_available() {
            println!("  Pre-computed optical flow for {sequence} found. Continue..");
            continue;
        }
        println!("  Started storing optical flow for: {sequence}");
        experiment.run(PowerEmulatorMode::Store)?;
        println!("    Done!");
        computed.push(sequence.clone());
    }
    println!("DONE: Optical flow for all maps serialized!");
    Ok(computed)
}

#[cfg(test)]
mod tests {
    use super::*;

    const GOOD_OUTPUT: &str = "\
Odometry Per-frame average timings [ms]:
  findKeypoints   1.2
  TOTAL           8.5
  FRAMES          2700
Main Per-frame average timings [ms]:
  TOTAL           11.0
  FRAMES          2700
";

    fn configs(root: &std::path::Path) -> (HybvioConfig, PowerConfig) {
        let hybvio = HybvioConfig {
            benchmark_folder: PathBuf::from("bench"),
            binary_path: root.join("does-not-exist"),
            orb_vocab_path: PathBuf::from("vocab.dbow2"),
            ..HybvioConfig::default()
        };
        let power = PowerConfig {
            storage_path: root.join("flow"),
            output_root_folder: root.join("power"),
            ..PowerConfig::default()
        };
        (hybvio, power)
    }

    #[test]
    fn test_command_line() {
        let (hybvio, mut power) = configs(std::path::Path::new("/tmp/x"));
        power.storage_path = PathBuf::from("flow");
        let experiment = PowerExperiment::new(&hybvio, &power, "euroc-v1-01-easy", 3, InterruptFlag::new());
        let args: Vec<_> = experiment
            .command(PowerEmulatorMode::Load)
            .get_args()
            .map(|a| a.to_string_lossy().into_owned())
            .collect();
        assert_eq!(
            args,
            vec![
                "-vocabularyPath=vocab.dbow2",
                "-i=bench/euroc-v1-01-easy",
                "-displayVideo=false",
                "-timer=true",
                "-sealPowerEmulatorStoragePath=flow",
                "-sealPowerEmulatorMode=load",
            ]
        );
        assert_eq!(experiment.sequence_storage_path(), PathBuf::from("flow/euroc-v1-01-easy"));
        assert!(experiment
            .log_path(PowerEmulatorMode::Store)
            .ends_with("euroc-v1-01-easy/stdout/run3_store.txt"));
    }

    #[test]
    fn test_validate_output() {
        let root = tempfile::tempdir().unwrap();
        let (hybvio, power) = configs(root.path());
        let experiment = PowerExperiment::new(&hybvio, &power, "seq", 0, InterruptFlag::new());

        let timings = experiment.validate_output(GOOD_OUTPUT).unwrap();
        assert_eq!(timings.odometry_total_ms, 8.5);
        assert_eq!(timings.main_frames, 2700.0);

        let short = GOOD_OUTPUT.replace("2700", "40");
        assert!(matches!(
            experiment.validate_output(&short),
            Err(EvalError::InvalidRun { reason, .. }) if reason.contains("odometry FRAMES")
        ));

        let no_main = GOOD_OUTPUT.split("Main").next().unwrap().to_string();
        assert!(matches!(
            experiment.validate_output(&no_main),
            Err(EvalError::InvalidRun { reason, .. }) if reason.contains("main")
        ));
    }

    #[test]
    fn test_load_without_flow_is_refused() {
        let root = tempfile::tempdir().unwrap();
        let (hybvio, power) = configs(root.path());
        let experiment = PowerExperiment::new(&hybvio, &power, "seq", 0, InterruptFlag::new());
        assert!(!experiment.is_flow_available());
        assert!(matches!(
            experiment.run(PowerEmulatorMode::Load),
            Err(EvalError::MissingFile(p)) if p.ends_with("flow/seq")
        ));
    }

    #[test]
    fn test_failed_store_removes_partial_flow() {
        let root = tempfile::tempdir().unwrap();
        let (hybvio, power) = configs(root.path());
        let experiment = PowerExperiment::new(&hybvio, &power, "seq", 0, InterruptFlag::new());
        let storage = experiment.sequence_storage_path();
        fs::create_dir_all(&storage).unwrap();
        fs::write(storage.join("frame_0.bin"), "partial").unwrap();

        // The binary does not exist, so spawning fails
        assert!(experiment.run(PowerEmulatorMode::Store).is_err());
        assert!(!storage.exists());
    }

    #[test]
    fn test_precompute_skips_stored_sequences() {
        let root = tempfile::tempdir().unwrap();
        let (hybvio, power) = configs(root.path());
        let stored = power.storage_path.join("seq-a");
        fs::create_dir_all(&stored).unwrap();
        fs::write(stored.join("frame_0.bin"), "flow").unwrap();

        let sequences = vec!["seq-a".to_string()];
        let computed = precompute_optical_flow(&hybvio, &power, &sequences, &InterruptFlag::new()).unwrap();
        assert!(computed.is_empty());

        let interrupt = InterruptFlag::new();
        interrupt.trigger();
        assert!(matches!(
            precompute_optical_flow(&hybvio, &power, &sequences, &interrupt),
            Err(EvalError::Interrupted)
        ));
    }
}
