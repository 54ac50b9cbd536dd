use crate::error::{CoreError, Result};
use nalgebra::{UnitQuaternion, Vector3};

// ---------------------------------------------------------------------------
// Samples
// ---------------------------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrajectorySample {
    /// Seconds. Relative to the first sample of the source file when the
    /// format asks for it, absolute otherwise.
    pub time: f64,
    pub position: Vector3<f64>,
    pub orientation: Option<UnitQuaternion<f64>>,
}

impl TrajectorySample {
    pub fn new(time: f64, position: Vector3<f64>) -> Self {
        Self {
            time,
            position,
            orientation: None,
        }
    }

    pub fn with_orientation(mut self, orientation: UnitQuaternion<f64>) -> Self {
        self.orientation = Some(orientation);
        self
    }
}

// ---------------------------------------------------------------------------
// Trajectory
// ---------------------------------------------------------------------------
/// Time-ordered sequence of samples.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Trajectory {
    samples: Vec<TrajectorySample>,
}

impl Trajectory {
    /// Builds a trajectory, rejecting samples that go back in time.
    pub fn new(samples: Vec<TrajectorySample>) -> Result<Self> {
        for (i, pair) in samples.windows(2).enumerate() {
            if pair[1].time < pair[0].time {
                return Err(CoreError::UnorderedTimestamps {
                    index: i + 1,
                    time: pair[1].time,
                    previous: pair[0].time,
                });
            }
        }
        Ok(Self { samples })
    }

    pub fn from_positions(times: &[f64], positions: &[Vector3<f64>]) -> Result<Self> {
        if times.len() != positions.len() {
            return Err(CoreError::LengthMismatch {
                times: times.len(),
                positions: positions.len(),
            });
        }
        let samples = times
            .iter()
            .zip(positions)
            .map(|(&t, &p)| TrajectorySample::new(t, p))
            .collect();
        Self::new(samples)
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn samples(&self) -> &[TrajectorySample] {
        &self.samples
    }

    pub fn iter(&self) -> impl Iterator<Item = &TrajectorySample> {
        self.samples.iter()
    }

    pub fn times(&self) -> Vec<f64> {
        self.samples.iter().map(|s| s.time).collect()
    }

    pub fn positions(&self) -> Vec<Vector3<f64>> {
        self.samples.iter().map(|s| s.position).collect()
    }

    /// First and last timestamp, `None` when empty.
    pub fn time_span(&self) -> Option<(f64, f64)> {
        match (self.samples.first(), self.samples.last()) {
            (Some(first), Some(last)) => Some((first.time, last.time)),
            _ => None,
        }
    }

    /// Keeps the samples at `indices`, in that order. Indices may repeat.
    pub fn select(&self, indices: &[usize]) -> Self {
        Self {
            samples: indices.iter().map(|&i| self.samples[i]).collect(),
        }
    }

    /// Rewrites every sample through `f`. Timestamps are left as they are.
    pub fn map_samples<F>(&self, mut f: F) -> Self
    where
        F: FnMut(&TrajectorySample) -> TrajectorySample,
    {
        Self {
            samples: self
                .samples
                .iter()
                .map(|s| TrajectorySample { time: s.time, ..f(s) })
                .collect(),
        }
    }
}

impl<'a> IntoIterator for &'a Trajectory {
    type Item = &'a TrajectorySample;
    type IntoIter = core::slice::Iter<'a, TrajectorySample>;

    fn into_iter(self) -> Self::IntoIter {
        self.samples.iter()
    }
}

// ---------------------------------------------------------------------------
// Overlap Window
// ---------------------------------------------------------------------------
/// Closed interval `[start, end]` covered by both trajectories.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OverlapWindow {
    pub start: f64,
    pub end: f64,
}

impl OverlapWindow {
    /// `None` when either side is empty or the spans do not intersect.
    pub fn between(a: &Trajectory, b: &Trajectory) -> Option<Self> {
        let (a_min, a_max) = a.time_span()?;
        let (b_min, b_max) = b.time_span()?;
        let start = a_min.max(b_min);
        let end = a_max.min(b_max);
        if start > end {
            return None;
        }
        Some(Self { start, end })
    }

    pub fn contains(&self, t: f64) -> bool {
        t >= self.start && t <= self.end
    }

    pub fn duration(&self) -> f64 {
        self.end - self.start
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn line(times: &[f64]) -> Trajectory {
        let positions: Vec<_> = times.iter().map(|&t| Vector3::new(t, 0.0, 0.0)).collect();
        Trajectory::from_positions(times, &positions).unwrap()
    }

    #[test]
    fn test_rejects_unordered_timestamps() {
        let samples = vec![
            TrajectorySample::new(0.0, Vector3::zeros()),
            TrajectorySample::new(2.0, Vector3::zeros()),
            TrajectorySample::new(1.0, Vector3::zeros()),
        ];
        let err = Trajectory::new(samples).unwrap_err();
        assert_eq!(
            err,
            CoreError::UnorderedTimestamps {
                index: 2,
                time: 1.0,
                previous: 2.0
            }
        );
    }

    #[test]
    fn test_length_mismatch() {
        let err = Trajectory::from_positions(&[0.0, 1.0], &[Vector3::zeros()]).unwrap_err();
        assert!(matches!(err, CoreError::LengthMismatch { times: 2, positions: 1 }));
    }

    #[test]
    fn test_overlap_window() {
        let a = line(&[0.0, 1.0, 2.0, 3.0]);
        let b = line(&[1.5, 2.5, 4.0]);
        let w = OverlapWindow::between(&a, &b).unwrap();
        assert_eq!(w.start, 1.5);
        assert_eq!(w.end, 3.0);
        assert!(w.contains(2.0));
        assert!(!w.contains(3.5));
        assert!((w.duration() - 1.5).abs() < 1e-12);
    }

    #[test]
    fn test_disjoint_and_empty_windows() {
        let a = line(&[0.0, 1.0]);
        let b = line(&[2.0, 3.0]);
        assert!(OverlapWindow::between(&a, &b).is_none());
        assert!(OverlapWindow::between(&a, &Trajectory::default()).is_none());
    }

    #[test]
    fn test_single_point_window() {
        let a = line(&[0.0, 1.0]);
        let b = line(&[1.0, 2.0]);
        let w = OverlapWindow::between(&a, &b).unwrap();
        assert_eq!(w.start, w.end);
    }
}
