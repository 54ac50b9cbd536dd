//! Runs the external VIO pipelines for one sequence.
//!
//! Both executors block until the pipeline exits. A failed HybVIO run leaves
//! its output behind as `invalid_<sequence>` for inspection; an interrupted run
//! removes everything it wrote.

use crate::config::{HybvioConfig, VinsConfig};
use crate::error::{EvalError, Result};
use crate::fsutil::{copy_into, is_non_empty_dir, move_dir, remove_dir_if_exists, write_json_pretty};
use crate::interrupt::InterruptFlag;
use serde::Serialize;
use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::time::{Duration, Instant};
use tracing::{info, warn};

pub const ESTIMATED_TRAJECTORY_FILE: &str = "estimated_trajectory.jsonl";
pub const EXECUTION_INFO_FILE: &str = "execution_info.json";

fn timestamp() -> String {
    chrono::Local::now().format("%Y-%m-%dT%H:%M:%S%.6f").to_string()
}

/// Program and arguments joined with spaces, for messages.
pub fn describe(cmd: &Command) -> String {
    std::iter::once(cmd.get_program())
        .chain(cmd.get_args())
        .map(|s| s.to_string_lossy().into_owned())
        .collect::<Vec<_>>()
        .join(" ")
}

pub(crate) fn log_files(path: &Path, append: bool) -> Result<(File, File)> {
    let file = OpenOptions::new()
        .create(true)
        .write(true)
        .append(append)
        .truncate(!append)
        .open(path)
        .map_err(|e| EvalError::io(path, e))?;
    let stderr = file.try_clone().map_err(|e| EvalError::io(path, e))?;
    Ok((file, stderr))
}

// ---------------------------------------------------------------------------
// HybVIO
// ---------------------------------------------------------------------------
#[derive(Debug, Serialize)]
pub struct ExecutionInfo {
    pub sequence_name: String,
    pub execution_time: String,
    pub binary_path: PathBuf,
    pub orb_vocab_path: PathBuf,
    pub seal_params_path: PathBuf,
    pub benchmark_folder: PathBuf,
    pub raw_data_folder: PathBuf,
    pub output_folder: PathBuf,
}

pub struct HybvioExecutor<'a> {
    config: &'a HybvioConfig,
    sequence: String,
    interrupt: InterruptFlag,
}

impl<'a> HybvioExecutor<'a> {
    pub fn new(config: &'a HybvioConfig, sequence: &str, interrupt: InterruptFlag) -> Self {
        Self {
            config,
            sequence: sequence.to_string(),
            interrupt,
        }
    }

    pub fn benchmark_folder(&self) -> PathBuf {
        self.config.benchmark_folder.join(&self.sequence)
    }

    pub fn raw_data_folder(&self) -> PathBuf {
        self.config.raw_data_folder.join(&self.sequence)
    }

    pub fn output_folder(&self) -> PathBuf {
        self.config.output_root_folder.join(&self.sequence)
    }

    pub fn estimated_trajectory_path(&self) -> PathBuf {
        self.output_folder().join(ESTIMATED_TRAJECTORY_FILE)
    }

    pub fn invalid_folder(&self) -> PathBuf {
        self.config
            .output_root_folder
            .join(format!("invalid_{}", self.sequence))
    }

    pub fn command(&self) -> Command {
        let mut cmd = Command::new(&self.config.binary_path);
        cmd.arg(format!("-vocabularyPath={}", self.config.orb_vocab_path.display()))
            .arg(format!("-sealParamsFile={}", self.config.seal_params_path.display()))
            .arg(format!(
                "-maxSuccessfulVisualUpdates={}",
                self.config.max_successful_visual_updates
            ))
            .arg(format!("-i={}", self.benchmark_folder().display()))
            .arg(format!("-o={}", self.estimated_trajectory_path().display()))
            .arg("-timer=true")
            .arg("-displayVideo=false");
        cmd
    }

    /// Runs HybVIO for the sequence.
    ///
    /// Returns `Ok(None)` without running anything when the output folder
    /// already holds results.
    pub fn execute(&self) -> Result<Option<PathBuf>> {
        let output = self.output_folder();
        if is_non_empty_dir(&output) {
            info!(
                sequence = %self.sequence,
                "Output folder already exists and is not empty, skipping execution"
            );
            return Ok(None);
        }
        fs::create_dir_all(&output).map_err(|e| EvalError::io(&output, e))?;

        match self.run() {
            Ok(path) => Ok(Some(path)),
            Err(EvalError::Interrupted) => {
                warn!("Interrupt detected, cleaning up {}", output.display());
                remove_dir_if_exists(&output)?;
                Err(EvalError::Interrupted)
            }
            Err(e) => {
                warn!(sequence = %self.sequence, "HybVIO execution failed: {e}");
                self.mark_invalid()?;
                Err(e)
            }
        }
    }

    fn run(&self) -> Result<PathBuf> {
        let output = self.output_folder();
        copy_into(&self.config.seal_params_path, &output)?;

        let (stdout, stderr) = log_files(&output.join("stdout.txt"), false)?;
        let mut cmd = self.command();
        info!("Running {}", describe(&cmd));
        let status = cmd
            .stdout(stdout)
            .stderr(stderr)
            .status()
            .map_err(|e| EvalError::io(&self.config.binary_path, e))?;

        if self.interrupt.is_set() {
            return Err(EvalError::Interrupted);
        }
        if !status.success() {
            return Err(EvalError::CommandFailed {
                command: describe(&cmd),
                status: status.to_string(),
            });
        }

        self.write_execution_info()?;

        let estimate = self.estimated_trajectory_path();
        info!("Estimated trajectory: {}", estimate.display());
        info!(
            "Ground truth: {}",
            self.raw_data_folder()
                .join("mav0/state_groundtruth_estimate0/data.csv")
                .display()
        );
        Ok(estimate)
    }

    fn write_execution_info(&self) -> Result<()> {
        let info = ExecutionInfo {
            sequence_name: self.sequence.clone(),
            execution_time: timestamp(),
            binary_path: self.config.binary_path.clone(),
            orb_vocab_path: self.config.orb_vocab_path.clone(),
            seal_params_path: self.config.seal_params_path.clone(),
            benchmark_folder: self.benchmark_folder(),
            raw_data_folder: self.raw_data_folder(),
            output_folder: self.output_folder(),
        };
        write_json_pretty(&self.output_folder().join(EXECUTION_INFO_FILE), &info)
    }

    fn mark_invalid(&self) -> Result<()> {
        let invalid = self.invalid_folder();
        remove_dir_if_exists(&invalid)?;
        let output = self.output_folder();
        fs::rename(&output, &invalid).map_err(|e| EvalError::io(&output, e))?;
        warn!("Renamed output folder to '{}'", invalid.display());
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// VINS-Mono
// ---------------------------------------------------------------------------
#[derive(Debug, Serialize)]
pub struct VinsExecutionInfo {
    pub timestamp: String,
    pub rosbag_path: PathBuf,
    pub vins_launch_file: String,
    pub seal_params_path: PathBuf,
    pub output_folder: PathBuf,
    pub setup_script_path: PathBuf,
}

/// Child processes owned by one VINS-Mono run.
#[derive(Default)]
struct RosProcesses {
    master: Option<Child>,
    rosbag: Option<Child>,
}

impl RosProcesses {
    fn stop_all(&mut self) {
        for child in [self.rosbag.take(), self.master.take()].into_iter().flatten() {
            stop_process(child);
        }
    }
}

fn stop_process(mut child: Child) {
    info!("Stopping process {}", child.id());
    if let Err(e) = child.kill() {
        warn!("Could not kill process {}: {e}", child.id());
    }
    let _ = child.wait();
}

/// Parses `env` output into key/value pairs.
pub fn parse_env(output: &str) -> Vec<(String, String)> {
    output
        .lines()
        .filter_map(|line| line.split_once('='))
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

pub struct VinsExecutor<'a> {
    config: &'a VinsConfig,
    sequence: String,
    interrupt: InterruptFlag,
}

impl<'a> VinsExecutor<'a> {
    pub fn new(config: &'a VinsConfig, sequence: &str, interrupt: InterruptFlag) -> Self {
        Self {
            config,
            sequence: sequence.to_string(),
            interrupt,
        }
    }

    pub fn output_folder(&self) -> PathBuf {
        self.config.output_root_folder.join(&self.sequence)
    }

    pub fn rosbag_path(&self) -> PathBuf {
        self.config.data_folder.join(format!("{}.bag", self.sequence))
    }

    fn stdout_path(&self) -> PathBuf {
        self.output_folder().join("vins_stdout.txt")
    }

    /// Runs roslaunch + rosbag for the sequence. On any failure everything the
    /// run created is removed again.
    pub fn execute(&self) -> Result<()> {
        let mut procs = RosProcesses::default();
        let result = self.run(&mut procs);
        if let Err(e) = &result {
            warn!(sequence = %self.sequence, "VINS-Mono run failed: {e}");
            self.cleanup(&mut procs);
        }
        procs.stop_all();
        result
    }

    fn run(&self, procs: &mut RosProcesses) -> Result<()> {
        let env = self.source_setup_script()?;
        self.prepare_output_folder()?;

        let (stdout, stderr) = log_files(&self.stdout_path(), false)?;
        let mut launch = Command::new("roslaunch");
        launch
            .arg(&self.config.vins_package)
            .arg(&self.config.vins_launch_file)
            .envs(env.iter().map(|(k, v)| (k, v)))
            .stdout(stdout)
            .stderr(stderr);
        info!("Starting ROS master: {}", describe(&launch));
        procs.master = Some(
            launch
                .spawn()
                .map_err(|e| EvalError::io("roslaunch", e))?,
        );

        info!(
            "Waiting {} s for the ROS master to start",
            self.config.wait_for_ros_master_s
        );
        self.sleep(Duration::from_secs(self.config.wait_for_ros_master_s))?;

        self.feed_rosbag(&env, procs)
    }

    fn source_setup_script(&self) -> Result<Vec<(String, String)>> {
        let script = &self.config.setup_script_path;
        if !script.exists() {
            return Err(EvalError::MissingFile(script.clone()));
        }
        let mut cmd = Command::new("bash");
        cmd.arg("-c")
            .arg(format!("source {} && env", script.display()))
            .stderr(Stdio::inherit());
        info!("Sourcing {}", script.display());
        let output = cmd.output().map_err(|e| EvalError::io(script, e))?;
        if !output.status.success() {
            return Err(EvalError::CommandFailed {
                command: describe(&cmd),
                status: output.status.to_string(),
            });
        }
        Ok(parse_env(&String::from_utf8_lossy(&output.stdout)))
    }

    fn prepare_output_folder(&self) -> Result<()> {
        let output = self.output_folder();
        remove_dir_if_exists(&output)?;
        fs::create_dir_all(&output).map_err(|e| EvalError::io(&output, e))?;

        if !self.config.seal_params_path.exists() {
            return Err(EvalError::MissingFile(self.config.seal_params_path.clone()));
        }
        copy_into(&self.config.seal_params_path, &output)?;

        let info = VinsExecutionInfo {
            timestamp: timestamp(),
            rosbag_path: self.rosbag_path(),
            vins_launch_file: self.config.vins_launch_file.clone(),
            seal_params_path: self.config.seal_params_path.clone(),
            output_folder: output.clone(),
            setup_script_path: self.config.setup_script_path.clone(),
        };
        write_json_pretty(&output.join(EXECUTION_INFO_FILE), &info)
    }

    fn feed_rosbag(&self, env: &[(String, String)], procs: &mut RosProcesses) -> Result<()> {
        let bag = self.rosbag_path();
        if !bag.exists() {
            return Err(EvalError::MissingFile(bag));
        }

        let (stdout, stderr) = log_files(&self.stdout_path(), true)?;
        let mut play = Command::new("rosbag");
        play.arg("play")
            .arg(&bag)
            .envs(env.iter().map(|(k, v)| (k, v)))
            .stdout(stdout)
            .stderr(stderr);
        info!("Feeding rosbag {}", bag.display());
        let child = procs.rosbag.insert(play.spawn().map_err(|e| EvalError::io("rosbag", e))?);
        let status = child.wait().map_err(|e| EvalError::io(&bag, e))?;
        procs.rosbag = None;

        if self.interrupt.is_set() {
            return Err(EvalError::Interrupted);
        }
        if !status.success() {
            return Err(EvalError::CommandFailed {
                command: describe(&play),
                status: status.to_string(),
            });
        }

        if self.config.default_output_folder.exists() {
            move_dir(
                &self.config.default_output_folder,
                &self.output_folder().join("vins_output"),
            )?;
        }
        Ok(())
    }

    /// Sleeps in short steps so an interrupt is noticed promptly.
    fn sleep(&self, total: Duration) -> Result<()> {
        let start = Instant::now();
        while start.elapsed() < total {
            if self.interrupt.is_set() {
                return Err(EvalError::Interrupted);
            }
            std::thread::sleep(Duration::from_millis(100).min(total.saturating_sub(start.elapsed())));
        }
        Ok(())
    }

    fn cleanup(&self, procs: &mut RosProcesses) {
        procs.stop_all();
        for dir in [self.config.default_output_folder.clone(), self.output_folder()] {
            if let Err(e) = remove_dir_if_exists(&dir) {
                warn!("Cleanup of {} failed: {e}", dir.display());
            }
        }
    }
}
