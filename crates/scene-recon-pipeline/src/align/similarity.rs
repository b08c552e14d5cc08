//! Weighted similarity fitting between corresponding point sets.

use anyhow::{Context, Result, ensure};
use nalgebra::{Rotation3, UnitQuaternion};

use scene_recon_core::{Mat3, Mat4, Pt3, Real, Vec3, similarity_matrix};

/// `p' = scale * rotation * p + translation`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Similarity {
    pub rotation: Rotation3<Real>,
    pub translation: Vec3,
    pub scale: Real,
}

impl Similarity {
    pub fn identity() -> Self {
        Self {
            rotation: Rotation3::identity(),
            translation: Vec3::zeros(),
            scale: 1.0,
        }
    }

    pub fn apply(&self, p: &Pt3) -> Pt3 {
        Pt3::from(self.rotation * p.coords * self.scale + self.translation)
    }

    /// `self ∘ other`: apply `other` first.
    pub fn compose(&self, other: &Similarity) -> Similarity {
        Similarity {
            rotation: self.rotation * other.rotation,
            translation: self.rotation * other.translation * self.scale + self.translation,
            scale: self.scale * other.scale,
        }
    }

    pub fn to_matrix(&self) -> Mat4 {
        similarity_matrix(&self.rotation, &self.translation, self.scale)
    }

    /// Rigid camera-to-world pose of a camera whose frame is mapped to the
    /// world by this similarity. The scale is dropped.
    pub fn rigid_pose(&self) -> Mat4 {
        similarity_matrix(&self.rotation, &self.translation, 1.0)
    }

    /// Move a fraction `alpha` of the way towards `target`.
    ///
    /// Rotations are slerped, translations and log-scales interpolated linearly.
    pub fn interpolate(&self, target: &Similarity, alpha: Real) -> Similarity {
        let q0 = UnitQuaternion::from_rotation_matrix(&self.rotation);
        let q1 = UnitQuaternion::from_rotation_matrix(&target.rotation);
        let q = q0.try_slerp(&q1, alpha, 1e-9).unwrap_or(q1);
        Similarity {
            rotation: q.to_rotation_matrix(),
            translation: self.translation.lerp(&target.translation, alpha),
            scale: (self.scale.ln() * (1.0 - alpha) + target.scale.ln() * alpha).exp(),
        }
    }
}

/// Fit the similarity that best maps `src` onto `dst` in the weighted
/// least-squares sense (Umeyama).
///
/// Weights must be non-negative; at least three points with positive weight
/// are required.
///
/// # Errors
///
/// Returns an error on mismatched lengths, too few weighted points, or a
/// degenerate (collapsed) source set.
pub fn fit_similarity(src: &[Pt3], dst: &[Pt3], weights: &[Real]) -> Result<Similarity> {
    ensure!(
        src.len() == dst.len() && src.len() == weights.len(),
        "similarity fit needs matching lengths (src={}, dst={}, weights={})",
        src.len(),
        dst.len(),
        weights.len()
    );
    let used = weights.iter().filter(|&&w| w > 0.0).count();
    ensure!(used >= 3, "similarity fit needs at least 3 weighted points, got {used}");

    let total: Real = weights.iter().filter(|w| **w > 0.0).sum();
    let mut mu_s = Vec3::zeros();
    let mut mu_d = Vec3::zeros();
    for ((s, d), &w) in src.iter().zip(dst).zip(weights) {
        if w > 0.0 {
            mu_s += s.coords * w;
            mu_d += d.coords * w;
        }
    }
    mu_s /= total;
    mu_d /= total;

    let mut cov = Mat3::zeros();
    let mut var_s = 0.0;
    for ((s, d), &w) in src.iter().zip(dst).zip(weights) {
        if w > 0.0 {
            let ds = s.coords - mu_s;
            let dd = d.coords - mu_d;
            cov += dd * ds.transpose() * w;
            var_s += ds.norm_squared() * w;
        }
    }
    cov /= total;
    var_s /= total;
    ensure!(var_s > 1e-18, "similarity fit: source points are degenerate");

    let svd = cov.svd(true, true);
    let u = svd.u.context("similarity fit: SVD did not produce U")?;
    let v_t = svd.v_t.context("similarity fit: SVD did not produce V^T")?;
    let mut d = Vec3::new(1.0, 1.0, 1.0);
    if (u * v_t).determinant() < 0.0 {
        d[2] = -1.0;
    }
    let r = u * Mat3::from_diagonal(&d) * v_t;
    let scale = svd.singular_values.dot(&d) / var_s;
    let rotation = Rotation3::from_matrix_unchecked(r);
    let translation = mu_d - rotation * mu_s * scale;

    Ok(Similarity {
        rotation,
        translation,
        scale,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn cloud() -> Vec<Pt3> {
        vec![
            Pt3::new(0.0, 0.0, 1.0),
            Pt3::new(1.0, 0.0, 2.0),
            Pt3::new(0.0, 1.0, 3.0),
            Pt3::new(1.0, 1.0, 1.5),
            Pt3::new(-0.5, 0.3, 2.2),
        ]
    }

    #[test]
    fn recovers_known_similarity() {
        let truth = Similarity {
            rotation: Rotation3::from_euler_angles(0.1, -0.4, 0.7),
            translation: Vec3::new(0.5, -1.0, 2.0),
            scale: 1.7,
        };
        let src = cloud();
        let dst: Vec<Pt3> = src.iter().map(|p| truth.apply(p)).collect();
        let fit = fit_similarity(&src, &dst, &vec![1.0; src.len()]).unwrap();
        assert_relative_eq!(fit.scale, truth.scale, epsilon = 1e-9);
        assert_relative_eq!(fit.translation, truth.translation, epsilon = 1e-9);
        assert_relative_eq!(fit.rotation.matrix(), truth.rotation.matrix(), epsilon = 1e-9);
    }

    #[test]
    fn zero_weight_points_are_ignored() {
        let src = cloud();
        let mut dst = src.clone();
        dst[4] = Pt3::new(100.0, 100.0, 100.0);
        let mut w = vec![1.0; src.len()];
        w[4] = 0.0;
        let fit = fit_similarity(&src, &dst, &w).unwrap();
        assert_relative_eq!(fit.scale, 1.0, epsilon = 1e-9);
        assert_relative_eq!(fit.translation, Vec3::zeros(), epsilon = 1e-9);
    }

    #[test]
    fn too_few_points_fail() {
        let src = cloud();
        assert!(fit_similarity(&src[..2], &src[..2], &[1.0, 1.0]).is_err());
        let collapsed = vec![Pt3::origin(); 4];
        assert!(fit_similarity(&collapsed, &collapsed, &[1.0; 4]).is_err());
    }

    #[test]
    fn compose_and_interpolate() {
        let a = Similarity {
            rotation: Rotation3::from_euler_angles(0.0, 0.3, 0.0),
            translation: Vec3::new(1.0, 0.0, 0.0),
            scale: 2.0,
        };
        let b = Similarity::identity();
        let p = Pt3::new(0.2, 0.4, 0.6);
        assert_relative_eq!(a.compose(&b).apply(&p), a.apply(&p), epsilon = 1e-12);
        assert_relative_eq!(b.interpolate(&a, 1.0).apply(&p), a.apply(&p), epsilon = 1e-9);
        let half = b.interpolate(&a, 0.5);
        assert_relative_eq!(half.scale, 2.0_f64.sqrt(), epsilon = 1e-12);
    }
}
