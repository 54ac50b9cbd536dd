//! Per-sequence accuracy metrics.
//!
//! Two strategies share the [`TrajectoryMetric`] trait:
//! - [`InterpolatedMetric`]: similarity alignment, then the estimate is
//!   interpolated onto the ground-truth timestamps.
//! - [`AssociatedMetric`]: nearest-timestamp association, Umeyama alignment
//!   and the RMSE of the translation error.
//!
//! They are not expected to agree to the last digit.

use crate::error::{EvalError, Result};
use crate::formats::{read_euroc_ground_truth, read_hybvio_jsonl, read_vins_csv, TimeBase};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::str::FromStr;
use tracing::debug;
use viobench_core::{
    align_to_ground_truth, associate, resample_to_ground_truth, umeyama, AlignConfig, ErrorKind,
    ErrorStats, Trajectory,
};

/// Default association window in seconds.
pub const DEFAULT_MAX_TIME_DIFF: f64 = 0.01;

pub trait TrajectoryMetric {
    fn name(&self) -> String;

    fn load_ground_truth(&self, path: &Path) -> Result<Trajectory>;

    fn load_estimate(&self, path: &Path) -> Result<Trajectory>;

    /// Error of `estimate` against `ground_truth`, in meters.
    fn evaluate(&self, ground_truth: &Trajectory, estimate: &Trajectory) -> Result<f64>;

    /// Full distance statistics after alignment.
    fn evaluate_stats(&self, ground_truth: &Trajectory, estimate: &Trajectory) -> Result<ErrorStats>;

    fn calculate_metric(&self, ground_truth_path: &Path, estimate_path: &Path) -> Result<f64> {
        let ground_truth = self.load_ground_truth(ground_truth_path)?;
        let estimate = self.load_estimate(estimate_path)?;
        debug!(
            metric = %self.name(),
            ground_truth = ground_truth.len(),
            estimate = estimate.len(),
            "Loaded trajectories"
        );
        self.evaluate(&ground_truth, &estimate)
    }
}

// ---------------------------------------------------------------------------
// Interpolated
// ---------------------------------------------------------------------------
#[derive(Debug, Clone)]
pub struct InterpolatedMetric {
    pub kind: ErrorKind,
    pub align: AlignConfig,
}

impl InterpolatedMetric {
    pub fn new(kind: ErrorKind) -> Self {
        Self {
            kind,
            align: AlignConfig::default(),
        }
    }

    pub fn with_align(mut self, align: AlignConfig) -> Self {
        self.align = align;
        self
    }

    fn paired(
        &self,
        ground_truth: &Trajectory,
        estimate: &Trajectory,
    ) -> viobench_core::PairedPositions {
        let aligned = align_to_ground_truth(estimate, ground_truth, &self.align);
        resample_to_ground_truth(&aligned, ground_truth)
    }
}

impl TrajectoryMetric for InterpolatedMetric {
    fn name(&self) -> String {
        self.kind.to_string()
    }

    fn load_ground_truth(&self, path: &Path) -> Result<Trajectory> {
        read_euroc_ground_truth(path, TimeBase::Relative)
    }

    fn load_estimate(&self, path: &Path) -> Result<Trajectory> {
        read_hybvio_jsonl(path, true)
    }

    fn evaluate(&self, ground_truth: &Trajectory, estimate: &Trajectory) -> Result<f64> {
        let paired = self.paired(ground_truth, estimate);
        self.kind
            .reduce(&paired.estimate, &paired.ground_truth)
            .ok_or(EvalError::NoOverlap)
    }

    fn evaluate_stats(&self, ground_truth: &Trajectory, estimate: &Trajectory) -> Result<ErrorStats> {
        let paired = self.paired(ground_truth, estimate);
        ErrorStats::from_pairs(&paired.estimate, &paired.ground_truth).ok_or(EvalError::NoOverlap)
    }
}

// ---------------------------------------------------------------------------
// Associated
// ---------------------------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EstimateFormat {
    /// HybVIO JSONL, compared against relative ground-truth time.
    Hybvio,
    /// VINS-Mono CSV, compared against absolute ground-truth time.
    Vins,
}

#[derive(Debug, Clone)]
pub struct AssociatedMetric {
    pub format: EstimateFormat,
    pub max_time_diff: f64,
}

impl AssociatedMetric {
    pub fn new(format: EstimateFormat) -> Self {
        Self {
            format,
            max_time_diff: DEFAULT_MAX_TIME_DIFF,
        }
    }

    fn aligned_pairs(
        &self,
        ground_truth: &Trajectory,
        estimate: &Trajectory,
    ) -> Result<(Vec<nalgebra::Vector3<f64>>, Vec<nalgebra::Vector3<f64>>)> {
        let (gt, est) = associate(ground_truth, estimate, self.max_time_diff);
        if gt.is_empty() {
            return Err(EvalError::NoOverlap);
        }
        debug!(pairs = gt.len(), "Associated trajectories");

        let gt_positions = gt.positions();
        let est_positions = est.positions();
        let transform = umeyama(&est_positions, &gt_positions, false).ok_or(EvalError::NoOverlap)?;
        let aligned = est_positions.iter().map(|p| transform.apply_point(p)).collect();
        Ok((aligned, gt_positions))
    }
}

impl TrajectoryMetric for AssociatedMetric {
    fn name(&self) -> String {
        "evoRMSE".to_string()
    }

    fn load_ground_truth(&self, path: &Path) -> Result<Trajectory> {
        let time_base = match self.format {
            EstimateFormat::Hybvio => TimeBase::Relative,
            EstimateFormat::Vins => TimeBase::Absolute,
        };
        read_euroc_ground_truth(path, time_base)
    }

    fn load_estimate(&self, path: &Path) -> Result<Trajectory> {
        match self.format {
            EstimateFormat::Hybvio => read_hybvio_jsonl(path, true),
            EstimateFormat::Vins => read_vins_csv(path),
        }
    }

    fn evaluate(&self, ground_truth: &Trajectory, estimate: &Trajectory) -> Result<f64> {
        Ok(self.evaluate_stats(ground_truth, estimate)?.rmse)
    }

    fn evaluate_stats(&self, ground_truth: &Trajectory, estimate: &Trajectory) -> Result<ErrorStats> {
        let (aligned, gt) = self.aligned_pairs(ground_truth, estimate)?;
        ErrorStats::from_pairs(&aligned, &gt).ok_or(EvalError::NoOverlap)
    }
}

// ---------------------------------------------------------------------------
// Selection
// ---------------------------------------------------------------------------
/// Metric named on the command line or in a config file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetricSelection {
    Interpolated(ErrorKind),
    /// Association + Umeyama + APE RMSE.
    EvoRmse,
}

impl MetricSelection {
    /// Builds the strategy. `format` only matters for [`MetricSelection::EvoRmse`].
    pub fn build(&self, format: EstimateFormat) -> Box<dyn TrajectoryMetric> {
        match self {
            Self::Interpolated(kind) => Box::new(InterpolatedMetric::new(*kind)),
            Self::EvoRmse => Box::new(AssociatedMetric::new(format)),
        }
    }
}

impl Default for MetricSelection {
    fn default() -> Self {
        Self::Interpolated(ErrorKind::Rmse)
    }
}

impl FromStr for MetricSelection {
    type Err = EvalError;

    fn from_str(s: &str) -> Result<Self> {
        if s.eq_ignore_ascii_case("evormse") {
            return Ok(Self::EvoRmse);
        }
        s.parse::<ErrorKind>()
            .map(Self::Interpolated)
            .map_err(|_| EvalError::UnknownMetric(s.to_string()))
    }
}

impl fmt::Display for MetricSelection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Interpolated(kind) => write!(f, "{kind}"),
            Self::EvoRmse => f.write_str("evoRMSE"),
        }
    }
}
