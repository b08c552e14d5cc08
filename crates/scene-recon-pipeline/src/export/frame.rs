use anyhow::{Context, Result};

use scene_recon_core::{Mat4, opengl_flip, rotation_y};

/// Fixed correction between the first camera and the exported frame:
/// computer-vision to OpenGL axes followed by a half turn about y.
pub fn first_camera_correction() -> Mat4 {
    opengl_flip() * rotation_y(180.0)
}

/// Transform taking world coordinates into the exported frame,
/// `inverse(pose_0 · OPENGL · RotY(180°))`.
///
/// After applying it, the first camera's pose equals the inverse of
/// [`first_camera_correction`], whatever frame the aligner chose.
///
/// # Errors
///
/// Returns an error if `first_pose` is singular.
pub fn canonical_transform(first_pose: &Mat4) -> Result<Mat4> {
    (first_pose * first_camera_correction())
        .try_inverse()
        .context("first camera pose is not invertible")
}
