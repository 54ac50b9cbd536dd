//! Paths and knobs for the benchmark runners.
//!
//! Every record has defaults matching the repository layout, so a config file
//! only needs to name what differs:
//!
//! ```yaml
//! hybvio:
//!   binary_path: /opt/hybvio/main
//!   sequences: [euroc-mh-01-easy]
//! vins:
//!   wait_for_ros_master_s: 10
//! ```

use crate::error::{EvalError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// EuRoC sequence names as used by the HybVIO benchmark layout.
pub const EUROC_SEQUENCES: [&str; 11] = [
    "euroc-mh-01-easy",
    "euroc-mh-02-easy",
    "euroc-mh-03-medium",
    "euroc-mh-04-difficult",
    "euroc-mh-05-difficult",
    "euroc-v1-01-easy",
    "euroc-v1-02-medium",
    "euroc-v1-03-difficult",
    "euroc-v2-01-easy",
    "euroc-v2-02-medium",
    "euroc-v2-03-difficult",
];

/// The same sequences under their rosbag names.
pub const VINS_SEQUENCES: [&str; 11] = [
    "MH_01_easy",
    "MH_02_easy",
    "MH_03_medium",
    "MH_04_difficult",
    "MH_05_difficult",
    "V1_01_easy",
    "V1_02_medium",
    "V1_03_difficult",
    "V2_01_easy",
    "V2_02_medium",
    "V2_03_difficult",
];

/// Edge-filter thresholds compared in the threshold sweep table.
pub const EDGE_THRESHOLDS: [u32; 6] = [17, 18, 21, 22, 24, 30];

fn owned(names: &[&str]) -> Vec<String> {
    names.iter().map(|s| s.to_string()).collect()
}

// ---------------------------------------------------------------------------
// HybVIO
// ---------------------------------------------------------------------------
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HybvioConfig {
    pub benchmark_folder: PathBuf,
    pub raw_data_folder: PathBuf,
    pub output_root_folder: PathBuf,
    pub binary_path: PathBuf,
    pub orb_vocab_path: PathBuf,
    pub seal_params_path: PathBuf,
    pub max_successful_visual_updates: u32,
    pub sequences: Vec<String>,
    pub edge_thresholds: Vec<EdgeThreshold>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EdgeThreshold {
    /// Used as the output sub-folder and the table column header.
    pub name: String,
    pub seal_params_path: PathBuf,
}

impl Default for HybvioConfig {
    fn default() -> Self {
        Self {
            benchmark_folder: PathBuf::from("data/benchmark"),
            raw_data_folder: PathBuf::from("data/raw"),
            output_root_folder: PathBuf::from("output_accuracy"),
            binary_path: PathBuf::from("HybVIO/build/main"),
            orb_vocab_path: PathBuf::from("HybVIO/data/orb_vocab.dbow2"),
            seal_params_path: PathBuf::from("HybVIO/SEAL/seal_params.yaml"),
            max_successful_visual_updates: 20,
            sequences: owned(&EUROC_SEQUENCES),
            edge_thresholds: EDGE_THRESHOLDS
                .iter()
                .map(|n| EdgeThreshold {
                    name: n.to_string(),
                    seal_params_path: PathBuf::from(format!(
                        "HybVIO/SEAL/table11_edges/seal_params_edge_{n}.yaml"
                    )),
                })
                .collect(),
        }
    }
}

// ---------------------------------------------------------------------------
// VINS-Mono
// ---------------------------------------------------------------------------
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VinsConfig {
    /// Folder with one `<sequence>.bag` per sequence.
    pub data_folder: PathBuf,
    pub output_root_folder: PathBuf,
    pub seal_params_path: PathBuf,
    pub vins_package: String,
    pub vins_launch_file: String,
    /// Where VINS-Mono writes its results; moved into the sequence folder afterwards.
    pub default_output_folder: PathBuf,
    /// Folder with `<sequence>/data.csv` ground truth.
    pub ground_truth_root_folder: PathBuf,
    pub setup_script_path: PathBuf,
    pub wait_for_ros_master_s: u64,
    pub sequences: Vec<String>,
}

impl Default for VinsConfig {
    fn default() -> Self {
        Self {
            data_folder: PathBuf::from("data/bag"),
            output_root_folder: PathBuf::from("output_accuracy"),
            seal_params_path: PathBuf::from("src/VINS-Mono/config/SEALparams/seal_params.yaml"),
            vins_package: "vins_estimator".to_string(),
            vins_launch_file: "euroc.launch".to_string(),
            default_output_folder: PathBuf::from("output"),
            ground_truth_root_folder: PathBuf::from("src/VINS-Mono/benchmark_publisher/config"),
            setup_script_path: PathBuf::from("devel/setup.bash"),
            wait_for_ros_master_s: 5,
            sequences: owned(&VINS_SEQUENCES),
        }
    }
}

// ---------------------------------------------------------------------------
// Dataset
// ---------------------------------------------------------------------------
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatasetConfig {
    pub data_dir: PathBuf,
    pub link_prefix: String,
}

impl Default for DatasetConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("data"),
            link_prefix: "http://robotics.ethz.ch/~asl-datasets/ijrr_euroc_mav_dataset".to_string(),
        }
    }
}

impl DatasetConfig {
    pub fn raw_dir(&self) -> PathBuf {
        self.data_dir.join("raw")
    }

    pub fn benchmark_dir(&self) -> PathBuf {
        self.data_dir.join("benchmark")
    }
}

// ---------------------------------------------------------------------------
// Latency
// ---------------------------------------------------------------------------
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LatencyConfig {
    /// Folder with `<sequence>/stdout/*.txt` logs.
    pub root: PathBuf,
    pub sequences: Vec<String>,
}

impl Default for LatencyConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("output_latency"),
            sequences: owned(&EUROC_SEQUENCES),
        }
    }
}

// ---------------------------------------------------------------------------
// Power
// ---------------------------------------------------------------------------
/// Power runs reuse the binary, vocabulary and benchmark folder of [`HybvioConfig`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PowerConfig {
    /// Root of the serialised optical flow, one sub-folder per sequence.
    pub storage_path: PathBuf,
    /// Run logs go to `<output_root_folder>/<sequence>/stdout/`.
    pub output_root_folder: PathBuf,
    pub repetitions: u32,
    pub sequences: Vec<String>,
    /// A run whose `TOTAL` time is below this is treated as failed.
    pub min_total_ms: f64,
    pub min_frames: f64,
}

impl Default for PowerConfig {
    fn default() -> Self {
        Self {
            storage_path: PathBuf::from("HybVIO/data/pcl_serial_storage/optical_flow"),
            output_root_folder: PathBuf::from("output_power"),
            repetitions: 1,
            sequences: owned(&EUROC_SEQUENCES),
            min_total_ms: 5.0,
            min_frames: 1000.0,
        }
    }
}

// ---------------------------------------------------------------------------
// Optical flow EPE
// ---------------------------------------------------------------------------
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EpeConfig {
    /// CSV written by the SEAL optical flow simulator.
    pub errors_csv: PathBuf,
    /// Threshold columns `first_threshold..=last_threshold`.
    pub first_threshold: u32,
    pub last_threshold: u32,
    pub expected_sequences: usize,
    /// Sequences whose baseline and fixed-threshold EPE differ by at least
    /// this much are listed in the report.
    pub min_difference: f64,
}

impl Default for EpeConfig {
    fn default() -> Self {
        Self {
            errors_csv: PathBuf::from("output/epe_errors.csv"),
            first_threshold: 20,
            last_threshold: 45,
            expected_sequences: 36,
            min_difference: 2.0,
        }
    }
}

impl EpeConfig {
    pub fn threshold_names(&self) -> Vec<String> {
        (self.first_threshold..=self.last_threshold)
            .map(|n| n.to_string())
            .collect()
    }
}

// ---------------------------------------------------------------------------
// Top level
// ---------------------------------------------------------------------------
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BenchConfig {
    #[serde(default)]
    pub hybvio: HybvioConfig,
    #[serde(default)]
    pub vins: VinsConfig,
    #[serde(default)]
    pub dataset: DatasetConfig,
    #[serde(default)]
    pub latency: LatencyConfig,
    #[serde(default)]
    pub power: PowerConfig,
    #[serde(default)]
    pub epe: EpeConfig,
}

impl BenchConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| EvalError::io(path, e))?;
        Self::from_yaml(&contents)
    }

    pub fn from_yaml(yaml: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(yaml)?)
    }

    /// Loads `path` when given, defaults otherwise.
    pub fn load_or_default(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(p) => Self::load(p),
            None => Ok(Self::default()),
        }
    }
}

// ---------------------------------------------------------------------------
// SEAL parameter comparison
// ---------------------------------------------------------------------------
/// Drops an OpenCV-style `%YAML:1.0` directive, which YAML parsers reject.
pub fn strip_yaml_directive(text: &str) -> &str {
    if text.starts_with("%YAML") {
        text.find('\n').map_or("", |i| &text[i + 1..])
    } else {
        text
    }
}

/// Whether the parameter file stored next to a previous run differs from the
/// current one. A missing stored copy counts as "no difference".
pub fn seal_params_differ(current: &Path, stored: &Path) -> Result<bool> {
    if !stored.exists() {
        return Ok(false);
    }
    let a = std::fs::read_to_string(current).map_err(|e| EvalError::io(current, e))?;
    let b = std::fs::read_to_string(stored).map_err(|e| EvalError::io(stored, e))?;
    let a: serde_yaml::Value = serde_yaml::from_str(strip_yaml_directive(&a))?;
    let b: serde_yaml::Value = serde_yaml::from_str(strip_yaml_directive(&b))?;
    Ok(a != b)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = BenchConfig::default();
        assert_eq!(config.hybvio.sequences.len(), 11);
        assert_eq!(config.hybvio.edge_thresholds.len(), 6);
        assert_eq!(
            config.hybvio.edge_thresholds[2].seal_params_path,
            PathBuf::from("HybVIO/SEAL/table11_edges/seal_params_edge_21.yaml")
        );
        assert_eq!(config.vins.wait_for_ros_master_s, 5);
        assert_eq!(config.dataset.raw_dir(), PathBuf::from("data/raw"));
        assert_eq!(config.power.min_frames, 1000.0);
        let names = config.epe.threshold_names();
        assert_eq!(names.len(), 26);
        assert_eq!((names[0].as_str(), names[25].as_str()), ("20", "45"));
    }

    #[test]
    fn test_partial_yaml_keeps_defaults() {
        let config = BenchConfig::from_yaml(
            "hybvio:\n  binary_path: /opt/hybvio/main\n  sequences: [euroc-mh-01-easy]\nvins:\n  wait_for_ros_master_s: 10\n",
        )
        .unwrap();
        assert_eq!(config.hybvio.binary_path, PathBuf::from("/opt/hybvio/main"));
        assert_eq!(config.hybvio.sequences, vec!["euroc-mh-01-easy"]);
        assert_eq!(config.hybvio.max_successful_visual_updates, 20);
        assert_eq!(config.vins.wait_for_ros_master_s, 10);
        assert_eq!(config.vins.vins_package, "vins_estimator");
        assert_eq!(config.latency, LatencyConfig::default());
    }

    #[test]
    fn test_strip_directive() {
        assert_eq!(strip_yaml_directive("%YAML:1.0\na: 1\n"), "a: 1\n");
        assert_eq!(strip_yaml_directive("a: 1\n"), "a: 1\n");
        assert_eq!(strip_yaml_directive("%YAML:1.0"), "");
    }

    #[test]
    fn test_seal_params_differ() {
        let dir = tempfile::tempdir().unwrap();
        let current = dir.path().join("current.yaml");
        let stored = dir.path().join("stored.yaml");
        std::fs::write(&current, "%YAML:1.0\nedge_threshold: 21\nlevels: 3\n").unwrap();

        // No stored copy
        assert!(!seal_params_differ(&current, &stored).unwrap());

        // Same values, different formatting and no directive
        std::fs::write(&stored, "levels: 3\nedge_threshold:   21\n").unwrap();
        assert!(!seal_params_differ(&current, &stored).unwrap());

        std::fs::write(&stored, "%YAML:1.0\nedge_threshold: 30\nlevels: 3\n").unwrap();
        assert!(seal_params_differ(&current, &stored).unwrap());
    }
}
