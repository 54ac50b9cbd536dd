//! Time-grid resampling.
//!
//! The estimate is linearly interpolated onto the ground-truth timestamps that
//! fall inside the overlap of both trajectories, so every ground-truth sample
//! in the window gets exactly one partner.

use crate::trajectory::{OverlapWindow, Trajectory};
use nalgebra::Vector3;

/// Positions paired on a common time grid. All three vectors have equal length.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PairedPositions {
    pub times: Vec<f64>,
    pub estimate: Vec<Vector3<f64>>,
    pub ground_truth: Vec<Vector3<f64>>,
}

impl PairedPositions {
    pub fn len(&self) -> usize {
        self.times.len()
    }

    pub fn is_empty(&self) -> bool {
        self.times.is_empty()
    }

    /// Iterates `(estimate, ground_truth)` pairs.
    pub fn pairs(&self) -> impl Iterator<Item = (&Vector3<f64>, &Vector3<f64>)> {
        self.estimate.iter().zip(self.ground_truth.iter())
    }

    /// Keeps only the first `n` pairs.
    pub fn truncate(&mut self, n: usize) {
        self.times.truncate(n);
        self.estimate.truncate(n);
        self.ground_truth.truncate(n);
    }
}

/// Intersection of both time spans, `None` if empty.
pub fn overlap_window(a: &Trajectory, b: &Trajectory) -> Option<OverlapWindow> {
    OverlapWindow::between(a, b)
}

/// Per-axis linear interpolation of `values` sampled at `times`.
///
/// Outside the sampled range the end values are held. `times` must be
/// non-decreasing. Returns `None` only when there is nothing to interpolate.
pub fn interpolate(times: &[f64], values: &[Vector3<f64>], t: f64) -> Option<Vector3<f64>> {
    let n = times.len().min(values.len());
    if n == 0 {
        return None;
    }
    if t <= times[0] {
        return Some(values[0]);
    }
    if t >= times[n - 1] {
        return Some(values[n - 1]);
    }

    // First index strictly after t; guaranteed in 1..n-1 by the checks above
    let hi = times[..n].partition_point(|&x| x <= t);
    let lo = hi - 1;
    let dt = times[hi] - times[lo];
    if dt <= 0.0 {
        return Some(values[lo]);
    }
    let frac = (t - times[lo]) / dt;
    Some(values[lo] + (values[hi] - values[lo]) * frac)
}

/// Samples `estimate` at every ground-truth timestamp inside the overlap window.
///
/// Empty inputs and disjoint time spans produce an empty result.
pub fn resample_to_ground_truth(estimate: &Trajectory, ground_truth: &Trajectory) -> PairedPositions {
    let window = match OverlapWindow::between(estimate, ground_truth) {
        Some(w) => w,
        None => return PairedPositions::default(),
    };

    let est_times = estimate.times();
    let est_positions = estimate.positions();

    let mut paired = PairedPositions::default();
    for gt in ground_truth.iter().filter(|s| window.contains(s.time)) {
        if let Some(p) = interpolate(&est_times, &est_positions, gt.time) {
            paired.times.push(gt.time);
            paired.estimate.push(p);
            paired.ground_truth.push(gt.position);
        }
    }
    paired
}
