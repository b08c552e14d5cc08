//! Per-view diagnostic images: RGB input, normalized depth and colorized
//! confidence.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use image::RgbImage;

use scene_recon_core::{Grid, Real, SceneState, gray, jet};

/// Largest finite value over all grids, or `None` if there is none.
fn global_max(grids: &[Grid<Real>]) -> Option<Real> {
    grids
        .iter()
        .filter_map(|g| g.max_finite())
        .reduce(Real::max)
}

/// Divide every grid by the same value: the largest finite entry over all
/// of them. A non-positive or missing maximum leaves values unchanged.
fn normalize_globally(grids: &[Grid<Real>]) -> Vec<Grid<Real>> {
    let scale = match global_max(grids) {
        Some(m) if m > 0.0 => m,
        _ => 1.0,
    };
    grids.iter().map(|g| g.map(|&v| v / scale)).collect()
}

/// Depth maps of all views divided by the largest depth of any view.
pub fn normalized_depth_maps(scene: &SceneState) -> Vec<Grid<Real>> {
    normalize_globally(&scene.depth_maps())
}

/// Confidence maps of all views divided by the largest confidence of any view.
pub fn normalized_confidence_maps(scene: &SceneState) -> Vec<Grid<Real>> {
    normalize_globally(scene.confidences())
}

/// Render `[rgb_0, depth_0, conf_0, rgb_1, depth_1, conf_1, ...]`.
///
/// Depth is rendered as gray levels, confidence through the jet colormap.
pub fn render_channels(scene: &SceneState) -> Vec<RgbImage> {
    let depths = normalized_depth_maps(scene);
    let confs = normalized_confidence_maps(scene);
    let mut out = Vec::with_capacity(3 * scene.num_views());
    for ((img, depth), conf) in scene.images().iter().zip(&depths).zip(&confs) {
        out.push(img.to_rgb_image());
        out.push(depth.map(|&d| gray(d)).to_rgb_image());
        out.push(conf.map(|&c| jet(c)).to_rgb_image());
    }
    out
}

/// Write the channels of [`render_channels`] as
/// `{prefix}_{view}_{rgb|depth|conf}.png` into `dir`.
///
/// # Errors
///
/// Returns an error if the directory cannot be created or an image fails
/// to encode.
pub fn save_channels(scene: &SceneState, dir: &Path, prefix: &str) -> Result<Vec<PathBuf>> {
    fs::create_dir_all(dir)
        .with_context(|| format!("failed to create {}", dir.display()))?;
    let mut paths = Vec::new();
    for (i, img) in render_channels(scene).into_iter().enumerate() {
        let channel = ["rgb", "depth", "conf"][i % 3];
        let path = dir.join(format!("{prefix}_{}_{channel}.png", i / 3));
        img.save(&path)
            .with_context(|| format!("failed to write {}", path.display()))?;
        paths.push(path);
    }
    log::debug!("wrote {} diagnostic images to {}", paths.len(), dir.display());
    Ok(paths)
}
