use std::path::PathBuf;
use thiserror::Error;
use viobench_core::CoreError;

#[derive(Error, Debug)]
pub enum EvalError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Invalid JSON in {path} line {line}: {source}")]
    Json {
        path: PathBuf,
        line: usize,
        #[source]
        source: serde_json::Error,
    },

    #[error("JSON serialization failed: {0}")]
    JsonWrite(#[from] serde_json::Error),

    #[error("Invalid pattern: {0}")]
    Regex(#[from] regex::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error(transparent)]
    Core(#[from] CoreError),

    #[error("Malformed row in {path} line {line}: {reason}")]
    MalformedRow {
        path: PathBuf,
        line: usize,
        reason: String,
    },

    #[error("Invalid camera calibration in {path}: {reason}")]
    InvalidCalibration { path: PathBuf, reason: String },

    #[error("Unknown metric '{0}', expected one of MAE, RMSE, average, evoRMSE")]
    UnknownMetric(String),

    #[error("Unknown dataset type '{0}', expected 'vins' or 'hybvio'")]
    UnknownDatasetKind(String),

    #[error("No overlapping samples between estimate and ground truth")]
    NoOverlap,

    #[error("Odometry timing section not found in {0}")]
    MissingLatencySection(PathBuf),

    #[error("File not found: {0}")]
    MissingFile(PathBuf),

    #[error("`{command}` failed with {status}")]
    CommandFailed { command: String, status: String },

    #[error("Invalid HybVIO run for {sequence}: {reason}")]
    InvalidRun { sequence: String, reason: String },

    #[error("Malformed EPE table {path}: {}", .problems.join("; "))]
    MalformedEpeTable { path: PathBuf, problems: Vec<String> },

    #[error("Interrupted")]
    Interrupted,

    #[error("Could not install interrupt handler: {0}")]
    Signal(#[from] ctrlc::Error),
}

impl EvalError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

pub type Result<T> = std::result::Result<T, EvalError>;
