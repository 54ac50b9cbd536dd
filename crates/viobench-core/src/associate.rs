//! Timestamp association and least-squares similarity alignment.
//!
//! This is the second, independent evaluation path: instead of interpolating
//! the estimate onto the ground-truth grid, samples are matched to their
//! nearest neighbour in time and aligned with Umeyama's method.

use crate::trajectory::Trajectory;
use nalgebra::{Matrix3, Rotation3, Vector3};

/// Matches samples of `a` and `b` whose timestamps differ by at most `max_diff`.
///
/// Every sample of the shorter trajectory is matched with the nearest sample of
/// the longer one. The returned pair keeps the argument order: the first
/// trajectory holds samples of `a`, the second the matched samples of `b`.
pub fn associate(a: &Trajectory, b: &Trajectory, max_diff: f64) -> (Trajectory, Trajectory) {
    let a_is_shorter = a.len() <= b.len();
    let (short, long) = if a_is_shorter { (a, b) } else { (b, a) };
    let long_times = long.times();

    let mut short_idx = Vec::new();
    let mut long_idx = Vec::new();
    for (i, s) in short.iter().enumerate() {
        if let Some(j) = nearest(&long_times, s.time) {
            if (long_times[j] - s.time).abs() <= max_diff {
                short_idx.push(i);
                long_idx.push(j);
            }
        }
    }

    let short_sel = short.select(&short_idx);
    let long_sel = long.select(&long_idx);
    if a_is_shorter {
        (short_sel, long_sel)
    } else {
        (long_sel, short_sel)
    }
}

/// Index of the timestamp closest to `t` in a sorted slice.
fn nearest(times: &[f64], t: f64) -> Option<usize> {
    if times.is_empty() {
        return None;
    }
    let hi = times.partition_point(|&x| x < t);
    if hi == 0 {
        return Some(0);
    }
    if hi == times.len() {
        return Some(times.len() - 1);
    }
    let lo = hi - 1;
    if (t - times[lo]) <= (times[hi] - t) {
        Some(lo)
    } else {
        Some(hi)
    }
}

// ---------------------------------------------------------------------------
// Umeyama
// ---------------------------------------------------------------------------
/// `p' = scale * R * p + translation`
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RigidTransform {
    pub rotation: Rotation3<f64>,
    pub translation: Vector3<f64>,
    pub scale: f64,
}

impl RigidTransform {
    pub fn identity() -> Self {
        Self {
            rotation: Rotation3::identity(),
            translation: Vector3::zeros(),
            scale: 1.0,
        }
    }

    pub fn apply_point(&self, p: &Vector3<f64>) -> Vector3<f64> {
        self.rotation * p * self.scale + self.translation
    }
}

/// Least-squares similarity mapping `source` onto `target`.
///
/// Returns `None` for empty or mismatched inputs, or when scale is requested
/// and the source points have no spread.
pub fn umeyama(
    source: &[Vector3<f64>],
    target: &[Vector3<f64>],
    with_scale: bool,
) -> Option<RigidTransform> {
    if source.is_empty() || source.len() != target.len() {
        return None;
    }
    let n = source.len() as f64;
    let mean_s = source.iter().sum::<Vector3<f64>>() / n;
    let mean_t = target.iter().sum::<Vector3<f64>>() / n;

    let mut cov = Matrix3::zeros();
    let mut sigma_s = 0.0;
    for (s, t) in source.iter().zip(target.iter()) {
        let ds = s - mean_s;
        cov += (t - mean_t) * ds.transpose();
        sigma_s += ds.norm_squared();
    }
    cov /= n;
    sigma_s /= n;

    let svd = cov.svd(true, true);
    let u = svd.u?;
    let v_t = svd.v_t?;

    let mut signs = Vector3::repeat(1.0);
    if u.determinant() * v_t.determinant() < 0.0 {
        // Singular values come sorted in descending order
        signs[2] = -1.0;
    }
    let r = u * Matrix3::from_diagonal(&signs) * v_t;

    let scale = if with_scale {
        if sigma_s <= f64::EPSILON {
            return None;
        }
        svd.singular_values.dot(&signs) / sigma_s
    } else {
        1.0
    };

    let rotation = Rotation3::from_matrix_unchecked(r);
    let translation = mean_t - rotation * mean_s * scale;
    Some(RigidTransform {
        rotation,
        translation,
        scale,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_distr::{Distribution, Normal};

    fn trajectory(times: &[f64]) -> Trajectory {
        let positions: Vec<_> = times.iter().map(|&t| Vector3::new(t, t * t, 1.0)).collect();
        Trajectory::from_positions(times, &positions).unwrap()
    }

    #[test]
    fn test_associate_respects_max_diff() {
        let a = trajectory(&[0.0, 0.1, 0.2, 0.3]);
        let b = trajectory(&[0.005, 0.12, 0.195, 0.5, 0.6]);

        let (ma, mb) = associate(&a, &b, 0.01);
        assert_eq!(ma.times(), vec![0.0, 0.2]);
        assert_eq!(mb.times(), vec![0.005, 0.195]);
    }

    #[test]
    fn test_associate_keeps_argument_order() {
        let longer = trajectory(&[0.0, 0.1, 0.2, 0.3, 0.4]);
        let shorter = trajectory(&[0.101, 0.299]);

        let (first, second) = associate(&longer, &shorter, 0.01);
        assert_eq!(first.times(), vec![0.1, 0.3]);
        assert_eq!(second.times(), vec![0.101, 0.299]);
    }

    #[test]
    fn test_associate_empty() {
        let a = trajectory(&[0.0, 1.0]);
        let (ma, mb) = associate(&a, &Trajectory::default(), 1.0);
        assert!(ma.is_empty() && mb.is_empty());
    }

    #[test]
    fn test_nearest_picks_closest_neighbour() {
        let times = [0.0, 1.0, 2.0];
        assert_eq!(nearest(&times, -1.0), Some(0));
        assert_eq!(nearest(&times, 0.4), Some(0));
        assert_eq!(nearest(&times, 0.6), Some(1));
        assert_eq!(nearest(&times, 5.0), Some(2));
        assert_eq!(nearest(&[], 5.0), None);
    }

    fn random_points(n: usize, seed: u64) -> Vec<Vector3<f64>> {
        let mut rng = rand::rngs::StdRng::seed_from_u64(seed);
        let normal = Normal::new(0.0, 2.0).unwrap();
        (0..n)
            .map(|_| Vector3::from_fn(|_, _| normal.sample(&mut rng)))
            .collect()
    }

    #[test]
    fn test_umeyama_recovers_rigid_transform() {
        let source = random_points(50, 1);
        let rotation = Rotation3::from_euler_angles(-0.4, 0.9, 2.5);
        let translation = Vector3::new(1.0, -3.0, 0.25);
        let target: Vec<_> = source.iter().map(|p| rotation * p + translation).collect();

        let t = umeyama(&source, &target, false).unwrap();
        assert!((t.rotation.matrix() - rotation.matrix()).norm() < 1e-9);
        assert!((t.translation - translation).norm() < 1e-9);
        assert_eq!(t.scale, 1.0);
        for (s, g) in source.iter().zip(&target) {
            assert!((t.apply_point(s) - g).norm() < 1e-9);
        }
    }

    #[test]
    fn test_umeyama_recovers_scale() {
        let source = random_points(40, 2);
        let rotation = Rotation3::from_euler_angles(0.3, 0.0, -1.0);
        let target: Vec<_> = source
            .iter()
            .map(|p| rotation * p * 0.25 + Vector3::new(0.0, 2.0, 0.0))
            .collect();
        let t = umeyama(&source, &target, true).unwrap();
        assert!((t.scale - 0.25).abs() < 1e-9, "scale {}", t.scale);
    }

    #[test]
    fn test_umeyama_never_reflects() {
        let source = random_points(30, 3);
        let target: Vec<_> = source.iter().map(|p| Vector3::new(p.x, p.y, -p.z)).collect();
        let t = umeyama(&source, &target, false).unwrap();
        assert!((t.rotation.matrix().determinant() - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_umeyama_mirror_flips_weakest_direction() {
        let mut source = Vec::new();
        for x in [-3.0, 3.0] {
            for y in [-2.0, 2.0] {
                for z in [-0.1, 0.1] {
                    source.push(Vector3::new(x, y, z));
                }
            }
        }
        let target: Vec<_> = source.iter().map(|p| Vector3::new(p.x, p.y, -p.z)).collect();
        let t = umeyama(&source, &target, false).unwrap();
        assert!((t.rotation.matrix() - Matrix3::identity()).norm() < 1e-9);
        assert!(t.translation.norm() < 1e-9);
    }

    #[test]
    fn test_umeyama_degenerate_inputs() {
        assert!(umeyama(&[], &[], false).is_none());
        let p = vec![Vector3::new(1.0, 1.0, 1.0); 3];
        assert!(umeyama(&p, &p[..2], false).is_none());
        assert!(umeyama(&p, &p, true).is_none());
    }
}
