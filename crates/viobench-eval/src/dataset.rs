//! EuRoC download and preparation.
//!
//! `raw/<name>` holds the extracted ASL recording used by VINS-Mono (and as
//! ground truth); `benchmark/<name>` holds the converted HybVIO layout. A
//! non-empty folder counts as prepared, so every step removes its partial
//! output when it fails.

use crate::config::DatasetConfig;
use crate::converter::{BenchmarkConverter, VisionKind};
use crate::error::{EvalError, Result};
use crate::executor::describe;
use crate::fsutil::{is_non_empty_dir, remove_dir_if_exists};
use crate::interrupt::InterruptFlag;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::str::FromStr;
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DatasetKind {
    /// Raw recordings only.
    Vins,
    /// Raw recordings converted to the benchmark layout.
    Hybvio,
}

impl FromStr for DatasetKind {
    type Err = EvalError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "vins" => Ok(Self::Vins),
            "hybvio" => Ok(Self::Hybvio),
            other => Err(EvalError::UnknownDatasetKind(other.to_string())),
        }
    }
}

impl fmt::Display for DatasetKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Vins => "vins",
            Self::Hybvio => "hybvio",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EurocSequence {
    pub name: &'static str,
    /// Archive path below the dataset link prefix.
    pub link: &'static str,
}

pub const EUROC_DATASETS: [EurocSequence; 11] = [
    EurocSequence { name: "euroc-mh-01-easy", link: "machine_hall/MH_01_easy/MH_01_easy.zip" },
    EurocSequence { name: "euroc-mh-02-easy", link: "machine_hall/MH_02_easy/MH_02_easy.zip" },
    EurocSequence { name: "euroc-mh-03-medium", link: "machine_hall/MH_03_medium/MH_03_medium.zip" },
    EurocSequence { name: "euroc-mh-04-difficult", link: "machine_hall/MH_04_difficult/MH_04_difficult.zip" },
    EurocSequence { name: "euroc-mh-05-difficult", link: "machine_hall/MH_05_difficult/MH_05_difficult.zip" },
    EurocSequence { name: "euroc-v1-01-easy", link: "vicon_room1/V1_01_easy/V1_01_easy.zip" },
    EurocSequence { name: "euroc-v1-02-medium", link: "vicon_room1/V1_02_medium/V1_02_medium.zip" },
    EurocSequence { name: "euroc-v1-03-difficult", link: "vicon_room1/V1_03_difficult/V1_03_difficult.zip" },
    EurocSequence { name: "euroc-v2-01-easy", link: "vicon_room2/V2_01_easy/V2_01_easy.zip" },
    EurocSequence { name: "euroc-v2-02-medium", link: "vicon_room2/V2_02_medium/V2_02_medium.zip" },
    EurocSequence { name: "euroc-v2-03-difficult", link: "vicon_room2/V2_03_difficult/V2_03_difficult.zip" },
];

pub struct EurocDatasetManager {
    pub config: DatasetConfig,
    pub datasets: Vec<EurocSequence>,
    /// Passed on to the converter.
    pub encode_video: bool,
    interrupt: InterruptFlag,
}

impl EurocDatasetManager {
    pub fn new(config: DatasetConfig, interrupt: InterruptFlag) -> Self {
        Self {
            config,
            datasets: EUROC_DATASETS.to_vec(),
            encode_video: true,
            interrupt,
        }
    }

    pub fn raw_path(&self, dataset: &EurocSequence) -> PathBuf {
        self.config.raw_dir().join(dataset.name)
    }

    pub fn benchmark_path(&self, dataset: &EurocSequence) -> PathBuf {
        self.config.benchmark_dir().join(dataset.name)
    }

    pub fn download_url(&self, dataset: &EurocSequence) -> String {
        format!("{}/{}", self.config.link_prefix.trim_end_matches('/'), dataset.link)
    }

    pub fn prepare(&self, kind: DatasetKind) -> Result<()> {
        for dataset in &self.datasets {
            match kind {
                DatasetKind::Vins => self.ensure_raw(dataset)?,
                DatasetKind::Hybvio => self.ensure_benchmark(dataset)?,
            }
        }
        Ok(())
    }

    fn ensure_raw(&self, dataset: &EurocSequence) -> Result<()> {
        if is_non_empty_dir(&self.raw_path(dataset)) {
            info!("{} has been already downloaded and extracted.", dataset.name);
            return Ok(());
        }
        info!("Downloading and extracting {}...", dataset.name);
        self.download_and_extract(dataset)
    }

    fn ensure_benchmark(&self, dataset: &EurocSequence) -> Result<()> {
        let benchmark_path = self.benchmark_path(dataset);
        if is_non_empty_dir(&benchmark_path) {
            info!("{} is already prepared for hybvio.", dataset.name);
            return Ok(());
        }
        info!("Preparing {} for hybvio...", dataset.name);
        self.ensure_raw(dataset)?;

        let mut converter =
            BenchmarkConverter::new(dataset.name, &self.raw_path(dataset), &benchmark_path);
        converter.encode_video = self.encode_video;
        let result = converter
            .convert(VisionKind::Stereo)
            .and_then(|_| self.check_interrupt());
        if let Err(e) = result {
            warn!("Error during conversion: {e}. Cleaning up...");
            remove_dir_if_exists(&benchmark_path)?;
            return Err(e);
        }
        Ok(())
    }

    fn check_interrupt(&self) -> Result<()> {
        if self.interrupt.is_set() {
            return Err(EvalError::Interrupted);
        }
        Ok(())
    }

    fn download_and_extract(&self, dataset: &EurocSequence) -> Result<()> {
        let raw_dir = self.raw_path(dataset);
        let zip_path = raw_dir.with_extension("zip");

        if !zip_path.exists() {
            fs::create_dir_all(&raw_dir).map_err(|e| EvalError::io(&raw_dir, e))?;
            let mut wget = Command::new("wget");
            wget.arg(self.download_url(dataset)).arg("-O").arg(&zip_path);
            if let Err(e) = self.run_quiet(&mut wget) {
                warn!("Error during download: {e}. Cleaning up...");
                if zip_path.exists() {
                    fs::remove_file(&zip_path).map_err(|e| EvalError::io(&zip_path, e))?;
                }
                return Err(e);
            }
        }

        let extracted = fs::create_dir_all(&raw_dir)
            .map_err(|e| EvalError::io(&raw_dir, e))
            .and_then(|_| {
                let mut unzip = Command::new("unzip");
                unzip.arg(&zip_path).arg("-d").arg(&raw_dir);
                self.run_quiet(&mut unzip)
            })
            .and_then(|_| fs::remove_file(&zip_path).map_err(|e| EvalError::io(&zip_path, e)));
        if let Err(e) = extracted {
            warn!("Error during extraction: {e}. Cleaning up...");
            remove_dir_if_exists(&raw_dir)?;
            return Err(e);
        }
        Ok(())
    }

    fn run_quiet(&self, cmd: &mut Command) -> Result<()> {
        info!("Running {}", describe(cmd));
        let status = cmd
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .map_err(|e| EvalError::io(Path::new(cmd.get_program()), e))?;
        self.check_interrupt()?;
        if !status.success() {
            return Err(EvalError::CommandFailed {
                command: describe(cmd),
                status: status.to_string(),
            });
        }
        Ok(())
    }
}
