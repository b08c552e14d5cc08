use anyhow::{Result, ensure};

use scene_recon_core::{Grid, Pt3, Real};

/// Least-squares focal length of a pinhole camera whose principal point
/// sits at the image centre, given the point map in that camera's frame.
///
/// Minimizes `Σ w |(u, v) - c - f (X/Z, Y/Z)|²` over points in front of the
/// camera, which has the closed form `f = Σ w d·q / Σ w q·q`.
///
/// # Errors
///
/// Returns an error if the sizes differ or no point constrains the focal.
pub fn estimate_focal(points: &Grid<Pt3>, weights: &Grid<Real>) -> Result<Real> {
    ensure!(
        points.same_size(weights),
        "focal estimation: points {:?} and weights {:?} differ in size",
        points.size(),
        weights.size()
    );
    let (w, h) = points.size();
    let (cx, cy) = (w as Real / 2.0, h as Real / 2.0);

    let mut num = 0.0;
    let mut den = 0.0;
    for ((x, y, p), &wt) in points.enumerate().zip(weights.iter()) {
        if p.z <= 0.0 || !p.coords.iter().all(|c| c.is_finite()) || wt.is_nan() || wt <= 0.0 {
            continue;
        }
        let (qx, qy) = (p.x / p.z, p.y / p.z);
        let (dx, dy) = (x as Real - cx, y as Real - cy);
        num += wt * (dx * qx + dy * qy);
        den += wt * (qx * qx + qy * qy);
    }
    ensure!(den > 1e-12, "focal estimation: no usable points");
    let focal = num / den;
    ensure!(focal.is_finite() && focal > 0.0, "focal estimation diverged ({focal})");
    Ok(focal)
}
