//! # viobench eval
//!
//! Everything around the numerical core:
//! - Trajectory file formats (EuRoC ground truth, HybVIO JSONL, VINS-Mono CSV)
//! - Metric strategies behind [`TrajectoryMetric`]
//! - Path configuration, loadable from YAML
//! - External pipeline executors and the batch [`SequenceRunner`]
//! - HybVIO latency log parsing and power-emulator runs
//! - EuRoC download and benchmark conversion
//! - Result tables, including the optical flow EPE report

pub mod config;
pub mod converter;
pub mod dataset;
pub mod epe;
pub mod error;
pub mod executor;
pub mod formats;
pub mod fsutil;
pub mod interrupt;
pub mod latency;
pub mod metric;
pub mod power;
pub mod runner;
pub mod table;

pub use config::{
    BenchConfig, DatasetConfig, EdgeThreshold, EpeConfig, HybvioConfig, LatencyConfig, PowerConfig,
    VinsConfig,
};
pub use converter::{BenchmarkConverter, VisionKind};
pub use dataset::{DatasetKind, EurocDatasetManager};
pub use epe::{EpeErrors, EpeReport};
pub use error::{EvalError, Result};
pub use executor::{HybvioExecutor, VinsExecutor};
pub use formats::{read_euroc_ground_truth, read_hybvio_jsonl, read_vins_csv, TimeBase};
pub use interrupt::InterruptFlag;
pub use latency::{LatencyBreakdown, LatencyReport, PaperLatency};
pub use metric::{AssociatedMetric, EstimateFormat, InterpolatedMetric, MetricSelection, TrajectoryMetric};
pub use power::{precompute_optical_flow, PowerEmulatorMode, PowerExperiment, PowerRun};
pub use runner::{HybvioPipeline, RunSummary, SequenceRunner, VinsPipeline, VioPipeline};
pub use table::{single_column_table, threshold_table, Table};
