//! Procrustes / Wahba alignment of an estimated trajectory onto ground truth.
//!
//! The transform is fitted on the time-paired overlap (see [`crate::resample`])
//! and then applied to every sample of the original estimate, including the
//! parts outside the overlap window.

use crate::resample::{resample_to_ground_truth, PairedPositions};
use crate::trajectory::{Trajectory, TrajectorySample};
use nalgebra::{Complex, Matrix3, Rotation3, UnitQuaternion, Vector3};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------
/// Magnitudes at or below this are treated as degenerate.
const MIN_NORM: f64 = 1e-5;
/// Upper clamp on the estimated similarity scale.
const MAX_SCALE: f64 = 100.0;

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AlignConfig {
    /// Use the first paired sample as reference point instead of the centroids.
    pub fix_origin: bool,
    /// Full 3D similarity alignment. When false only x/y are rotated.
    pub align_3d: bool,
    /// Force scale to 1.
    pub fix_scale: bool,
    /// Fit only on the prefix up to this fraction of the estimate length.
    pub rel_align_time: Option<f64>,
}

impl Default for AlignConfig {
    fn default() -> Self {
        Self {
            fix_origin: false,
            align_3d: true,
            fix_scale: true,
            rel_align_time: None,
        }
    }
}

impl AlignConfig {
    /// Index into the paired samples selected by `rel_align_time`.
    fn relative_index(&self, estimate_len: usize) -> Option<usize> {
        self.rel_align_time
            .filter(|&r| r > 0.0)
            .map(|r| (estimate_len as f64 * r) as usize)
    }
}

// ---------------------------------------------------------------------------
// Transform
// ---------------------------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum AlignmentTransform {
    /// `p' = scale * R * (p - source_origin) + target_origin`
    Spatial {
        rotation: Rotation3<f64>,
        scale: f64,
        source_origin: Vector3<f64>,
        target_origin: Vector3<f64>,
    },
    /// x/y rotated (and scaled) by a complex factor, z only translated.
    Planar {
        rotation: Complex<f64>,
        source_origin: Vector3<f64>,
        target_origin: Vector3<f64>,
    },
}

impl AlignmentTransform {
    pub fn scale(&self) -> f64 {
        match self {
            Self::Spatial { scale, .. } => *scale,
            Self::Planar { rotation, .. } => rotation.norm(),
        }
    }

    /// Proper rotation part, without scale.
    pub fn rotation_matrix(&self) -> Matrix3<f64> {
        match self {
            Self::Spatial { rotation, .. } => *rotation.matrix(),
            Self::Planar { rotation, .. } => {
                *Rotation3::from_axis_angle(&Vector3::z_axis(), rotation.arg()).matrix()
            }
        }
    }

    pub fn apply_point(&self, p: &Vector3<f64>) -> Vector3<f64> {
        match self {
            Self::Spatial {
                rotation,
                scale,
                source_origin,
                target_origin,
            } => rotation * (p - source_origin) * *scale + target_origin,
            Self::Planar {
                rotation,
                source_origin,
                target_origin,
            } => {
                let local = p - source_origin;
                let xy = Complex::new(local.x, local.y) * *rotation;
                Vector3::new(xy.re, xy.im, local.z) + target_origin
            }
        }
    }

    fn apply_orientation(&self, q: &UnitQuaternion<f64>) -> UnitQuaternion<f64> {
        let r = match self {
            Self::Spatial { rotation, .. } => UnitQuaternion::from_rotation_matrix(rotation),
            Self::Planar { rotation, .. } => {
                UnitQuaternion::from_axis_angle(&Vector3::z_axis(), rotation.arg())
            }
        };
        r * q
    }

    /// Transforms every sample of `trajectory`.
    pub fn apply(&self, trajectory: &Trajectory) -> Trajectory {
        trajectory.map_samples(|s| TrajectorySample {
            time: s.time,
            position: self.apply_point(&s.position),
            orientation: s.orientation.map(|q| self.apply_orientation(&q)),
        })
    }
}

// ---------------------------------------------------------------------------
// Estimation
// ---------------------------------------------------------------------------
/// Fits the transform mapping `estimate` onto `ground_truth`.
///
/// Returns `None` when there is nothing to fit: an empty input or no
/// ground-truth sample inside the overlap window.
pub fn estimate_alignment(
    estimate: &Trajectory,
    ground_truth: &Trajectory,
    config: &AlignConfig,
) -> Option<AlignmentTransform> {
    if estimate.is_empty() || ground_truth.is_empty() {
        return None;
    }

    let mut paired = resample_to_ground_truth(estimate, ground_truth);
    if paired.is_empty() {
        return None;
    }

    let (source_origin, target_origin) = if config.fix_origin {
        (paired.estimate[0], paired.ground_truth[0])
    } else {
        (centroid(&paired.estimate), centroid(&paired.ground_truth))
    };

    let rel_index = config.relative_index(estimate.len());

    if config.align_3d {
        if let Some(t) = rel_index {
            if paired.len() > t && t > 0 {
                paired.truncate(t);
            }
        }
        estimate_spatial(&paired, source_origin, target_origin, config.fix_scale)
    } else {
        Some(estimate_planar(
            &paired,
            source_origin,
            target_origin,
            rel_index,
            config.fix_scale,
        ))
    }
}

/// Aligns `estimate` onto `ground_truth`, or returns it unchanged when no
/// alignment can be fitted.
pub fn align_to_ground_truth(
    estimate: &Trajectory,
    ground_truth: &Trajectory,
    config: &AlignConfig,
) -> Trajectory {
    match estimate_alignment(estimate, ground_truth, config) {
        Some(transform) => transform.apply(estimate),
        None => estimate.clone(),
    }
}

fn estimate_spatial(
    paired: &PairedPositions,
    source_origin: Vector3<f64>,
    target_origin: Vector3<f64>,
    fix_scale: bool,
) -> Option<AlignmentTransform> {
    let est: Vec<Vector3<f64>> = paired.estimate.iter().map(|p| p - source_origin).collect();
    let gt: Vec<Vector3<f64>> = paired.ground_truth.iter().map(|p| p - target_origin).collect();
    if est.is_empty() {
        return None;
    }

    let scale = if fix_scale {
        1.0
    } else {
        (mean_norm(&gt) / mean_norm(&est).max(MIN_NORM)).min(MAX_SCALE)
    };

    // Cross-covariance B = gt * (scale * est)^T
    let mut b = Matrix3::zeros();
    for (g, e) in gt.iter().zip(est.iter()) {
        b += g * (e * scale).transpose();
    }

    let svd = b.svd(true, true);
    let u = svd.u?;
    let v_t = svd.v_t?;

    let mut r = u * v_t;
    if r.determinant() < 0.0 {
        // svd() sorts singular values in descending order, so the last column
        // is the weakest direction, also when the two smallest values tie
        r = u * Matrix3::from_diagonal(&Vector3::new(1.0, 1.0, -1.0)) * v_t;
    }

    Some(AlignmentTransform::Spatial {
        rotation: Rotation3::from_matrix_unchecked(r),
        scale,
        source_origin,
        target_origin,
    })
}

fn estimate_planar(
    paired: &PairedPositions,
    source_origin: Vector3<f64>,
    target_origin: Vector3<f64>,
    rel_index: Option<usize>,
    fix_scale: bool,
) -> AlignmentTransform {
    let to_complex = |p: &Vector3<f64>| Complex::new(p.x, p.y);
    let gt: Vec<Complex<f64>> = paired
        .ground_truth
        .iter()
        .map(|p| to_complex(&(p - target_origin)))
        .collect();
    let est: Vec<Complex<f64>> = paired
        .estimate
        .iter()
        .map(|p| to_complex(&(p - source_origin)))
        .collect();

    let at_index = rel_index.and_then(|t| {
        let valid = t < gt.len().min(est.len()) && gt[t].norm().min(est[t].norm()) > MIN_NORM;
        valid.then(|| gt[t] / est[t])
    });

    let mut rotation = at_index.unwrap_or_else(|| mean_unit_rotation(&gt, &est));

    if fix_scale {
        let n = rotation.norm();
        if n > 0.0 {
            rotation /= n;
        }
    }

    AlignmentTransform::Planar {
        rotation,
        source_origin,
        target_origin,
    }
}

/// Mean of per-point unit rotations, skipping pairs with a near-zero magnitude.
fn mean_unit_rotation(gt: &[Complex<f64>], est: &[Complex<f64>]) -> Complex<f64> {
    let units: Vec<Complex<f64>> = gt
        .iter()
        .zip(est.iter())
        .filter(|(g, e)| g.norm().min(e.norm()) > MIN_NORM)
        .map(|(g, e)| {
            let r = g / e;
            r / r.norm()
        })
        .collect();

    if units.is_empty() {
        return Complex::new(1.0, 0.0);
    }
    units.iter().sum::<Complex<f64>>() / units.len() as f64
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------
fn centroid(points: &[Vector3<f64>]) -> Vector3<f64> {
    if points.is_empty() {
        return Vector3::zeros();
    }
    points.iter().sum::<Vector3<f64>>() / points.len() as f64
}

fn mean_norm(points: &[Vector3<f64>]) -> f64 {
    if points.is_empty() {
        return 0.0;
    }
    points.iter().map(|p| p.norm()).sum::<f64>() / points.len() as f64
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stats::{mae, rmse};
    use rand::{Rng, SeedableRng};
    use rand_distr::{Distribution, Normal};

    fn curve(n: usize, dt: f64) -> Trajectory {
        let times: Vec<f64> = (0..n).map(|i| i as f64 * dt).collect();
        let positions: Vec<_> = times
            .iter()
            .map(|&t| Vector3::new(3.0 * t.cos(), 2.0 * (0.7 * t).sin(), 0.5 * t))
            .collect();
        Trajectory::from_positions(&times, &positions).unwrap()
    }

    fn transformed(
        trajectory: &Trajectory,
        rotation: &Rotation3<f64>,
        scale: f64,
        translation: Vector3<f64>,
    ) -> Trajectory {
        trajectory.map_samples(|s| TrajectorySample::new(s.time, rotation * s.position * scale + translation))
    }

    fn residuals(estimate: &Trajectory, ground_truth: &Trajectory) -> (f64, f64) {
        let paired = resample_to_ground_truth(estimate, ground_truth);
        (
            rmse(&paired.estimate, &paired.ground_truth).unwrap(),
            mae(&paired.estimate, &paired.ground_truth).unwrap(),
        )
    }

    #[test]
    fn test_self_alignment_is_exact() {
        let gt = curve(200, 0.05);
        let aligned = align_to_ground_truth(&gt, &gt, &AlignConfig::default());
        let (e_rmse, e_mae) = residuals(&aligned, &gt);
        assert!(e_rmse < 1e-9, "rmse {e_rmse}");
        assert!(e_mae < 1e-9, "mae {e_mae}");
    }

    #[test]
    fn test_recovers_rigid_transform() {
        let gt = curve(300, 0.05);
        let rotation = Rotation3::from_euler_angles(0.3, -0.8, 2.1);
        let est = transformed(&gt, &rotation, 1.0, Vector3::new(4.0, -2.0, 7.5));

        let transform = estimate_alignment(&est, &gt, &AlignConfig::default()).unwrap();
        // The fitted rotation undoes the applied one
        let recovered = transform.rotation_matrix();
        assert!((recovered - rotation.inverse().matrix()).norm() < 1e-9);
        assert!((transform.scale() - 1.0).abs() < 1e-12);

        let (e_rmse, _) = residuals(&transform.apply(&est), &gt);
        assert!(e_rmse < 1e-9, "rmse {e_rmse}");
    }

    #[test]
    fn test_rotation_is_always_proper() {
        let mut rng = rand::rngs::StdRng::seed_from_u64(7);
        let noise = Normal::new(0.0, 5.0).unwrap();

        for trial in 0..200 {
            let n = rng.gen_range(3..40);
            let times: Vec<f64> = (0..n).map(|i| i as f64 * 0.1).collect();
            let gt_pos: Vec<_> = (0..n)
                .map(|_| Vector3::from_fn(|_, _| noise.sample(&mut rng)))
                .collect();
            let est_pos: Vec<_> = (0..n)
                .map(|_| Vector3::from_fn(|_, _| noise.sample(&mut rng)))
                .collect();
            let gt = Trajectory::from_positions(&times, &gt_pos).unwrap();
            let est = Trajectory::from_positions(&times, &est_pos).unwrap();

            let config = AlignConfig {
                fix_scale: trial % 2 == 0,
                fix_origin: trial % 3 == 0,
                ..AlignConfig::default()
            };
            let transform = estimate_alignment(&est, &gt, &config).unwrap();
            let r = transform.rotation_matrix();
            assert!((r.determinant() - 1.0).abs() < 1e-9, "trial {trial}: det {}", r.determinant());
            assert!((r * r.transpose() - Matrix3::identity()).norm() < 1e-9);
        }
    }

    #[test]
    fn test_reflected_input_still_gives_rotation() {
        // A mirrored copy would be matched best by a reflection
        let gt = curve(100, 0.1);
        let est = gt.map_samples(|s| {
            TrajectorySample::new(s.time, Vector3::new(s.position.x, s.position.y, -s.position.z))
        });
        let transform = estimate_alignment(&est, &gt, &AlignConfig::default()).unwrap();
        assert!((transform.rotation_matrix().determinant() - 1.0).abs() < 1e-9);
    }

    /// Corners of a flat box, so z is the weakest direction with no coupling to x or y.
    fn flat_box() -> (Vec<f64>, Vec<Vector3<f64>>) {
        let mut positions = Vec::new();
        for x in [-3.0, 3.0] {
            for y in [-2.0, 2.0] {
                for z in [-0.1, 0.1] {
                    positions.push(Vector3::new(x, y, z));
                }
            }
        }
        let times = (0..positions.len()).map(|i| i as f64).collect();
        (times, positions)
    }

    #[test]
    fn test_mirror_flips_weakest_direction() {
        let (times, gt_pos) = flat_box();
        let est_pos: Vec<_> = gt_pos.iter().map(|p| Vector3::new(p.x, p.y, -p.z)).collect();
        let gt = Trajectory::from_positions(&times, &gt_pos).unwrap();
        let est = Trajectory::from_positions(&times, &est_pos).unwrap();

        // The best proper rotation gives up on the thin z axis and keeps x and y
        let transform = estimate_alignment(&est, &gt, &AlignConfig::default()).unwrap();
        let r = transform.rotation_matrix();
        assert!((r - Matrix3::identity()).norm() < 1e-9, "{r}");

        let (e_rmse, _) = residuals(&transform.apply(&est), &gt);
        assert!((e_rmse - 0.2).abs() < 1e-9, "rmse {e_rmse}");
    }

    #[test]
    fn test_recovers_scale_when_free() {
        let gt = curve(250, 0.05);
        let k = 3.5;
        let rotation = Rotation3::from_euler_angles(0.1, 0.2, -1.2);
        let est = transformed(&gt, &rotation, 1.0 / k, Vector3::new(-1.0, 0.5, 2.0));

        let free = AlignConfig {
            fix_scale: false,
            ..AlignConfig::default()
        };
        let transform = estimate_alignment(&est, &gt, &free).unwrap();
        assert!((transform.scale() - k).abs() < 1e-6, "scale {}", transform.scale());
        let (e_rmse, _) = residuals(&transform.apply(&est), &gt);
        assert!(e_rmse < 1e-6, "rmse {e_rmse}");

        let fixed = estimate_alignment(&est, &gt, &AlignConfig::default()).unwrap();
        assert_eq!(fixed.scale(), 1.0);
        let (fixed_rmse, _) = residuals(&fixed.apply(&est), &gt);
        assert!(fixed_rmse > 0.5, "fixed-scale rmse {fixed_rmse} should show the scale error");
    }

    #[test]
    fn test_scale_is_clamped() {
        let gt = curve(50, 0.1);
        let est = transformed(&gt, &Rotation3::identity(), 1e-4, Vector3::zeros());
        let free = AlignConfig {
            fix_scale: false,
            ..AlignConfig::default()
        };
        let transform = estimate_alignment(&est, &gt, &free).unwrap();
        assert_eq!(transform.scale(), MAX_SCALE);
    }

    #[test]
    fn test_collinear_example() {
        let times = [0.0, 1.0, 2.0];
        let gt_pos = [
            Vector3::new(0.0, 0.0, 0.0),
            Vector3::new(1.0, 0.0, 0.0),
            Vector3::new(2.0, 0.0, 0.0),
        ];
        let rz90 = Rotation3::from_axis_angle(&Vector3::z_axis(), std::f64::consts::FRAC_PI_2);
        let offset = Vector3::new(5.0, 5.0, 0.0);
        let est_pos: Vec<_> = gt_pos.iter().map(|p| rz90 * p + offset).collect();

        let gt = Trajectory::from_positions(&times, &gt_pos).unwrap();
        let est = Trajectory::from_positions(&times, &est_pos).unwrap();

        let transform = estimate_alignment(&est, &gt, &AlignConfig::default()).unwrap();
        let (e_rmse, _) = residuals(&transform.apply(&est), &gt);
        assert!(e_rmse < 1e-9, "rmse {e_rmse}");

        // Points on a line only pin down the rotation along that line
        let r = transform.rotation_matrix();
        assert!((r.determinant() - 1.0).abs() < 1e-9);
        assert!((r * Vector3::y() - Vector3::x()).norm() < 1e-9);
    }

    #[test]
    fn test_z_rotation_recovered_with_off_axis_point() {
        let times = [0.0, 1.0, 2.0, 3.0];
        let gt_pos = [
            Vector3::new(0.0, 0.0, 0.0),
            Vector3::new(1.0, 0.0, 0.0),
            Vector3::new(2.0, 0.0, 0.0),
            Vector3::new(2.0, 1.0, 0.5),
        ];
        let rz90 = Rotation3::from_axis_angle(&Vector3::z_axis(), std::f64::consts::FRAC_PI_2);
        let est_pos: Vec<_> = gt_pos
            .iter()
            .map(|p| rz90 * p + Vector3::new(5.0, 5.0, 0.0))
            .collect();
        let gt = Trajectory::from_positions(&times, &gt_pos).unwrap();
        let est = Trajectory::from_positions(&times, &est_pos).unwrap();

        let transform = estimate_alignment(&est, &gt, &AlignConfig::default()).unwrap();
        assert!((transform.rotation_matrix() - rz90.matrix().transpose()).norm() < 1e-9);
    }

    #[test]
    fn test_alignment_applies_outside_overlap() {
        let gt = curve(100, 0.1); // 0 .. 9.9 s
        let times: Vec<f64> = (0..150).map(|i| i as f64 * 0.1).collect(); // runs past gt
        let rotation = Rotation3::from_euler_angles(0.0, 0.0, 0.7);
        let positions: Vec<_> = times
            .iter()
            .map(|&t| rotation * Vector3::new(3.0 * t.cos(), 2.0 * (0.7 * t).sin(), 0.5 * t))
            .collect();
        let est = Trajectory::from_positions(&times, &positions).unwrap();

        let aligned = align_to_ground_truth(&est, &gt, &AlignConfig::default());
        assert_eq!(aligned.len(), est.len());
        let last = aligned.samples().last().unwrap();
        let t = last.time;
        let expected = Vector3::new(3.0 * t.cos(), 2.0 * (0.7 * t).sin(), 0.5 * t);
        assert!((last.position - expected).norm() < 1e-9);
    }

    #[test]
    fn test_no_overlap_is_noop() {
        let gt = curve(10, 0.1);
        let est = gt.map_samples(|s| TrajectorySample::new(s.time + 100.0, s.position * 2.0));
        assert!(estimate_alignment(&est, &gt, &AlignConfig::default()).is_none());
        assert_eq!(align_to_ground_truth(&est, &gt, &AlignConfig::default()), est);
        assert_eq!(
            align_to_ground_truth(&Trajectory::default(), &gt, &AlignConfig::default()),
            Trajectory::default()
        );
    }

    #[test]
    fn test_partial_alignment_fits_prefix() {
        let gt = curve(200, 0.05);
        let rotation = Rotation3::from_euler_angles(0.4, 0.1, -0.6);
        let offset = Vector3::new(1.0, 2.0, 3.0);
        // Rigid copy for the first half, drifting afterwards
        let est = gt.map_samples(|s| {
            let drift = if s.time > 5.0 {
                Vector3::new(0.8, -0.5, 0.3) * (s.time - 5.0)
            } else {
                Vector3::zeros()
            };
            TrajectorySample::new(s.time, rotation * s.position + offset + drift)
        });

        let config = AlignConfig {
            fix_origin: true,
            rel_align_time: Some(0.4),
            ..AlignConfig::default()
        };
        let aligned = align_to_ground_truth(&est, &gt, &config);
        for (a, g) in aligned.iter().zip(gt.iter()).take(80) {
            assert!((a.position - g.position).norm() < 1e-9);
        }

        // Fitting on everything spreads the drift over the prefix
        let full = AlignConfig {
            fix_origin: true,
            ..AlignConfig::default()
        };
        let aligned_full = align_to_ground_truth(&est, &gt, &full);
        let prefix_err: f64 = aligned_full
            .iter()
            .zip(gt.iter())
            .take(80)
            .map(|(a, g)| (a.position - g.position).norm())
            .sum();
        assert!(prefix_err > 1e-3);
    }

    #[test]
    fn test_out_of_range_relative_time_falls_back_to_full_fit() {
        let gt = curve(100, 0.1);
        let est = transformed(
            &gt,
            &Rotation3::from_euler_angles(0.2, 0.0, 1.0),
            1.0,
            Vector3::new(0.0, 1.0, 0.0),
        );
        let full = estimate_alignment(&est, &gt, &AlignConfig::default()).unwrap();
        let too_late = AlignConfig {
            rel_align_time: Some(2.0),
            ..AlignConfig::default()
        };
        let partial = estimate_alignment(&est, &gt, &too_late).unwrap();
        assert!((full.rotation_matrix() - partial.rotation_matrix()).norm() < 1e-12);
    }

    #[test]
    fn test_planar_alignment() {
        let gt = curve(120, 0.1);
        let yaw = Rotation3::from_axis_angle(&Vector3::z_axis(), -1.1);
        let est = transformed(&gt, &yaw, 1.0, Vector3::new(3.0, -4.0, 1.0));

        let config = AlignConfig {
            align_3d: false,
            ..AlignConfig::default()
        };
        let transform = estimate_alignment(&est, &gt, &config).unwrap();
        assert!(matches!(transform, AlignmentTransform::Planar { .. }));
        assert!((transform.scale() - 1.0).abs() < 1e-9);
        assert!((transform.rotation_matrix() - yaw.inverse().matrix()).norm() < 1e-9);

        let (e_rmse, _) = residuals(&transform.apply(&est), &gt);
        assert!(e_rmse < 1e-9, "rmse {e_rmse}");
    }

    #[test]
    fn test_planar_leaves_z_unrotated() {
        let times = [0.0, 1.0, 2.0];
        let gt_pos = [
            Vector3::new(1.0, 0.0, 0.0),
            Vector3::new(0.0, 1.0, 1.0),
            Vector3::new(-1.0, 0.0, 2.0),
        ];
        let gt = Trajectory::from_positions(&times, &gt_pos).unwrap();
        let config = AlignConfig {
            align_3d: false,
            ..AlignConfig::default()
        };
        let transform = estimate_alignment(&gt, &gt, &config).unwrap();
        let p = Vector3::new(0.3, -0.2, 9.0);
        assert!((transform.apply_point(&p) - p).norm() < 1e-12);
    }

    #[test]
    fn test_planar_skips_degenerate_points() {
        // The middle sample sits exactly on the centroid and must not
        // contribute a NaN rotation
        let times = [0.0, 1.0, 2.0];
        let gt_pos = [
            Vector3::new(-1.0, 0.0, 0.0),
            Vector3::new(0.0, 0.0, 0.0),
            Vector3::new(1.0, 0.0, 0.0),
        ];
        let gt = Trajectory::from_positions(&times, &gt_pos).unwrap();
        let config = AlignConfig {
            align_3d: false,
            ..AlignConfig::default()
        };
        let transform = estimate_alignment(&gt, &gt, &config).unwrap();
        match transform {
            AlignmentTransform::Planar { rotation, .. } => {
                assert!(rotation.re.is_finite() && rotation.im.is_finite());
                assert!((rotation - Complex::new(1.0, 0.0)).norm() < 1e-12);
            }
            _ => panic!("expected planar transform"),
        }
    }

    #[test]
    fn test_planar_relative_time_uses_single_sample() {
        let gt = curve(100, 0.1);
        let mut rng = rand::rngs::StdRng::seed_from_u64(3);
        let yaw = Rotation3::from_axis_angle(&Vector3::z_axis(), 0.5);
        // Noisy everywhere except the sample used for the fit
        let est = gt.map_samples(|s| {
            let jitter = if (s.time - 2.0).abs() < 1e-9 {
                Vector3::zeros()
            } else {
                Vector3::new(rng.gen_range(-0.5..0.5), rng.gen_range(-0.5..0.5), 0.0)
            };
            TrajectorySample::new(s.time, yaw * s.position + jitter)
        });
        let config = AlignConfig {
            align_3d: false,
            fix_origin: true,
            rel_align_time: Some(0.2),
            ..AlignConfig::default()
        };
        let transform = estimate_alignment(&est, &gt, &config).unwrap();
        // fix_origin pins the reference to sample 0, which is also noisy, so
        // only check that a finite unit rotation came out
        assert!((transform.scale() - 1.0).abs() < 1e-9);
        assert!(transform.rotation_matrix().iter().all(|v| v.is_finite()));
    }

    #[test]
    fn test_orientation_is_rotated() {
        let times = [0.0, 1.0, 2.0, 3.0];
        let gt_pos = [
            Vector3::new(0.0, 0.0, 0.0),
            Vector3::new(1.0, 0.0, 0.0),
            Vector3::new(1.0, 1.0, 0.0),
            Vector3::new(1.0, 1.0, 1.0),
        ];
        let gt = Trajectory::from_positions(&times, &gt_pos).unwrap();
        let rot = Rotation3::from_axis_angle(&Vector3::z_axis(), 0.9);
        let q_rot = UnitQuaternion::from_rotation_matrix(&rot);
        let est = gt.map_samples(|s| {
            TrajectorySample::new(s.time, rot * s.position).with_orientation(q_rot)
        });
        let aligned = align_to_ground_truth(&est, &gt, &AlignConfig::default());
        for s in aligned.iter() {
            let q = s.orientation.unwrap();
            assert!(q.angle_to(&UnitQuaternion::identity()) < 1e-9);
        }
    }
}
