//! User-tunable post-processing of a retained scene.
//!
//! Everything here narrows the per-view masks and works on copies: the
//! scene's confidences are never rewritten, so running the same
//! post-processing twice yields the same masks.

mod clean;
mod sky;

pub use clean::{
    DEFAULT_DEPTH_TOLERANCE, DEFAULT_MAX_BAD_CONF, DepthCleanup, DepthOutliers, clean_confidences,
    clean_depth,
};
pub use sky::{HsvSkySegmenter, SkySegmenter};

use anyhow::{Context, Result, ensure};

use scene_recon_core::{Grid, SceneState};

/// Transient per-view validity masks for one export.
#[derive(Debug, Clone, PartialEq)]
pub struct MaskedGeometry {
    pub masks: Vec<Grid<bool>>,
}

impl MaskedGeometry {
    /// Total number of valid pixels over all views.
    pub fn count(&self) -> usize {
        self.masks.iter().map(|m| m.count()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.count() == 0
    }
}

/// Masks at the scene's active threshold, optionally after depth cleanup
/// and sky removal.
///
/// # Errors
///
/// Returns an error if the sky segmenter fails or returns a mask whose size
/// does not match its image.
pub fn compute_masks(
    scene: &SceneState,
    clean_depth: Option<DepthCleanup>,
    sky: Option<&dyn SkySegmenter>,
) -> Result<MaskedGeometry> {
    let mut masks = scene.masks();

    if let Some(params) = clean_depth {
        let cleaned = clean::clean_depth(scene, params);
        for (mask, outliers) in masks.iter_mut().zip(&cleaned.outliers) {
            mask.and_not(outliers);
        }
    }

    if let Some(segmenter) = sky {
        for (v, (mask, image)) in masks.iter_mut().zip(scene.images()).enumerate() {
            let sky = segmenter
                .segment(image)
                .with_context(|| format!("sky segmentation failed for view {v}"))?;
            ensure!(
                sky.same_size(mask),
                "sky mask of view {v} is {:?}, image is {:?}",
                sky.size(),
                mask.size()
            );
            mask.and_not(&sky);
        }
    }

    Ok(MaskedGeometry { masks })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::SyntheticScene;

    struct LeftHalf;

    impl SkySegmenter for LeftHalf {
        fn segment(&self, image: &scene_recon_core::RgbGrid) -> Result<Grid<bool>> {
            let w = image.width();
            Ok(Grid::from_fn(w, image.height(), |x, _| x < w / 2))
        }
    }

    #[test]
    fn sky_only_narrows_the_mask() {
        let mut scene = SyntheticScene::orbit(2, 8, 4).scene().unwrap();
        scene.apply_threshold(1.0);
        let plain = compute_masks(&scene, None, None).unwrap();
        assert_eq!(plain.count(), 2 * 8 * 4);
        let no_sky = compute_masks(&scene, None, Some(&LeftHalf)).unwrap();
        assert_eq!(no_sky.count(), 2 * 4 * 4);
    }

    /// View 0 sits in front of view 1 with lower confidence: all of its
    /// points are depth outliers.
    fn occluding_pair() -> SceneState {
        use scene_recon_core::{Mat4, Pt3, Real};
        let (w, h, f) = (4, 4, 4.0);
        let plane = |z: Real| {
            Grid::from_fn(w, h, |x, y| {
                Pt3::new((x as Real - 2.0) * z / f, (y as Real - 2.0) * z / f, z)
            })
        };
        SceneState::new(
            vec![Grid::filled(w, h, [0u8; 3]); 2],
            vec![plane(1.0), plane(2.0)],
            vec![Grid::filled(w, h, 2.0), Grid::filled(w, h, 5.0)],
            vec![Mat4::identity(); 2],
            vec![f; 2],
        )
        .unwrap()
    }

    #[test]
    fn depth_outliers_are_dropped_at_any_threshold() {
        for threshold in [3.0, 1.0, 0.5] {
            let mut scene = occluding_pair();
            scene.apply_threshold(threshold);
            let plain = compute_masks(&scene, None, None).unwrap();
            assert_eq!(plain.masks[0].count(), 16, "threshold {threshold}");
            let cleaned = compute_masks(&scene, Some(DepthCleanup::default()), None).unwrap();
            assert_eq!(cleaned.masks[0].count(), 0, "threshold {threshold}");
            assert_eq!(cleaned.masks[1].count(), 16, "threshold {threshold}");
        }
    }

    #[test]
    fn repeated_postprocessing_is_stable() {
        let mut scene = SyntheticScene::orbit(3, 8, 6).scene().unwrap();
        scene.apply_threshold(4.0);
        let sky = HsvSkySegmenter::default();
        let a = compute_masks(&scene, Some(DepthCleanup::default()), Some(&sky)).unwrap();
        let b = compute_masks(&scene, Some(DepthCleanup::default()), Some(&sky)).unwrap();
        assert_eq!(a, b);
        assert!(a.count() <= scene.masks().iter().map(|m| m.count()).sum());
    }
}
