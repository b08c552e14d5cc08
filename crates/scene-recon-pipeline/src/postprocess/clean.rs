//! Multi-view depth consistency cleanup.

use scene_recon_core::{Grid, Real, SceneState, transform_point};

/// Relative depth tolerance of the visibility test.
pub const DEFAULT_DEPTH_TOLERANCE: Real = 0.001;
/// Confidence assigned to points flagged as occluding outliers.
pub const DEFAULT_MAX_BAD_CONF: Real = 0.0;

/// Parameters of [`clean_depth`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DepthCleanup {
    pub tolerance: Real,
    pub max_bad_conf: Real,
}

impl Default for DepthCleanup {
    fn default() -> Self {
        Self {
            tolerance: DEFAULT_DEPTH_TOLERANCE,
            max_bad_conf: DEFAULT_MAX_BAD_CONF,
        }
    }
}

/// Result of [`clean_depth`]: clipped confidences plus the outlier masks.
#[derive(Debug, Clone, PartialEq)]
pub struct DepthOutliers {
    /// Scene confidences with outliers clipped to `max_bad_conf`.
    pub confidences: Vec<Grid<Real>>,
    /// `true` where a point was rejected as an occluding outlier.
    pub outliers: Vec<Grid<bool>>,
}

impl DepthOutliers {
    pub fn count(&self) -> usize {
        self.outliers.iter().map(|m| m.count()).sum()
    }
}

/// Flag depth outliers of every view against every other camera.
///
/// A point of view `i` is an outlier when, projected into another camera
/// `j`, it lands inside `j`'s image in front of the camera, noticeably
/// closer than what `j` observed at that pixel, and with lower confidence
/// than `j`'s observation. Confidences are compared as cleaning proceeds,
/// so a pixel already clipped in view `j` no longer rejects points of `i`.
///
/// The scene itself is not modified, so repeated calls give the same result.
pub fn clean_depth(scene: &SceneState, params: DepthCleanup) -> DepthOutliers {
    let depths = scene.depth_maps();
    let mut confidences: Vec<Grid<Real>> = scene.confidences().to_vec();
    let mut outliers: Vec<Grid<bool>> = confidences
        .iter()
        .map(|c| Grid::filled(c.width(), c.height(), false))
        .collect();

    for (i, pts) in scene.points().iter().enumerate() {
        for j in 0..scene.num_views() {
            if i == j {
                continue;
            }
            let w2c = scene.world_to_camera(j);
            let k = scene.intrinsics(j);
            let (w, h) = depths[j].size();
            let mut flagged = 0usize;
            for (x, y, p) in pts.enumerate() {
                let cam = transform_point(&w2c, p);
                let depth = cam.z;
                if depth.is_nan() || depth <= 0.0 {
                    continue;
                }
                let proj = k * cam.coords;
                let u = (proj.x / proj.z).round();
                let v = (proj.y / proj.z).round();
                let inside = u >= 0.0 && v >= 0.0 && u < w as Real && v < h as Real;
                if !inside {
                    continue;
                }
                let (u, v) = (u as usize, v as usize);
                let occludes = depth < (1.0 - params.tolerance) * depths[j][(u, v)];
                if occludes && confidences[i][(x, y)] < confidences[j][(u, v)] {
                    let c = &mut confidences[i][(x, y)];
                    *c = c.min(params.max_bad_conf);
                    outliers[i][(x, y)] = true;
                    flagged += 1;
                }
            }
            if flagged > 0 {
                log::debug!("depth cleanup: {flagged} points of view {i} occlude view {j}");
            }
        }
    }
    DepthOutliers {
        confidences,
        outliers,
    }
}

/// Return a copy of the scene confidences with depth outliers clipped.
pub fn clean_confidences(scene: &SceneState, params: DepthCleanup) -> Vec<Grid<Real>> {
    clean_depth(scene, params).confidences
}

#[cfg(test)]
mod tests {
    use super::*;
    use nalgebra::Translation3;
    use scene_recon_core::{Mat4, Pt3, rotation_y};

    /// Two identical cameras at the origin looking down +z.
    fn stacked(depth0: Real, depth1: Real, conf0: Real, conf1: Real) -> SceneState {
        let (w, h) = (4, 4);
        let f = 4.0;
        let plane = |z: Real| {
            Grid::from_fn(w, h, |x, y| {
                Pt3::new((x as Real - 2.0) * z / f, (y as Real - 2.0) * z / f, z)
            })
        };
        SceneState::new(
            vec![Grid::filled(w, h, [0u8; 3]); 2],
            vec![plane(depth0), plane(depth1)],
            vec![Grid::filled(w, h, conf0), Grid::filled(w, h, conf1)],
            vec![Mat4::identity(); 2],
            vec![f; 2],
        )
        .unwrap()
    }

    #[test]
    fn occluding_low_confidence_points_are_clipped() {
        let scene = stacked(1.0, 2.0, 2.0, 5.0);
        let cleaned = clean_confidences(&scene, DepthCleanup::default());
        assert!(cleaned[0].iter().all(|&c| c == 0.0));
        assert_eq!(cleaned[1], scene.confidences()[1]);
    }

    #[test]
    fn confident_points_survive() {
        let scene = stacked(1.0, 2.0, 9.0, 5.0);
        let cleaned = clean_confidences(&scene, DepthCleanup::default());
        assert_eq!(cleaned, scene.confidences());
    }

    #[test]
    fn within_tolerance_is_not_an_outlier() {
        let scene = stacked(2.0, 2.0, 1.0, 5.0);
        let cleaned = clean_confidences(&scene, DepthCleanup::default());
        assert_eq!(cleaned[0], scene.confidences()[0]);
    }

    #[test]
    fn outliers_are_flagged_in_a_mask() {
        let scene = stacked(1.0, 2.0, 2.0, 5.0);
        let res = clean_depth(&scene, DepthCleanup::default());
        assert_eq!(res.count(), 16);
        assert!(res.outliers[0].iter().all(|&b| b));
        assert!(res.outliers[1].iter().all(|&b| !b));
    }

    #[test]
    fn clipped_pixels_no_longer_reject_others() {
        // Cameras 0 and 2 sit at the origin; camera 1 at z = 10 looks back.
        // Every view observes a single on-axis point.
        let on_axis = |z: Real| Grid::filled(2, 2, Pt3::new(0.0, 0.0, z));
        let facing_back = Translation3::new(0.0, 0.0, 10.0).to_homogeneous() * rotation_y(180.0);
        let scene = SceneState::new(
            vec![Grid::filled(2, 2, [0u8; 3]); 3],
            vec![on_axis(1.0), on_axis(0.5), on_axis(0.3)],
            vec![
                Grid::filled(2, 2, 3.0),
                Grid::filled(2, 2, 5.0),
                Grid::filled(2, 2, 2.0),
            ],
            vec![Mat4::identity(), facing_back, Mat4::identity()],
            vec![1.0; 3],
        )
        .unwrap();
        let res = clean_depth(&scene, DepthCleanup::default());
        // View 0 occludes view 1 as seen from camera 1.
        assert!(res.outliers[0].iter().all(|&b| b));
        assert!(res.outliers[1].iter().all(|&b| !b));
        // View 2 is in front of view 0, but view 0 was already rejected.
        assert!(res.outliers[2].iter().all(|&b| !b));
        assert_eq!(res.confidences[2], scene.confidences()[2]);
    }

    #[test]
    fn scene_is_left_untouched() {
        let scene = stacked(1.0, 2.0, 2.0, 5.0);
        let before = scene.confidences().to_vec();
        let a = clean_confidences(&scene, DepthCleanup::default());
        let b = clean_confidences(&scene, DepthCleanup::default());
        assert_eq!(a, b);
        assert_eq!(scene.confidences(), before.as_slice());
    }
}
