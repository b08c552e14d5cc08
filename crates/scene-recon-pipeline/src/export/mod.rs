//! Export of a retained scene to a GLB artifact.
//!
//! An export applies the user's post-processing choices to a working copy
//! of the masks, builds either a point cloud or a mesh from the valid
//! pixels, adds camera frustums, moves everything into the canonical frame
//! and writes `{name}_{pointcloud|mesh}.glb`.
//!
//! The only change made to the scene is storing the transformed
//! confidence threshold, so exporting twice with the same options yields
//! the same geometry.

mod frame;
mod frustum;
mod geometry;
mod glb;

pub use frame::{canonical_transform, first_camera_correction};
pub use frustum::camera_frustum;
pub use geometry::{Mesh, PointCloud, mesh_from_views};
pub use glb::{GlbNode, encode_glb, write_glb};

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, ensure};
use serde::{Deserialize, Serialize};

use scene_recon_core::{CameraColors, DEFAULT_MIN_CONF_THR, Mat4, Real, SceneState};

use crate::postprocess::{
    DepthCleanup, HsvSkySegmenter, MaskedGeometry, SkySegmenter, compute_masks,
};

/// Default frustum base width in world units.
pub const DEFAULT_CAMERA_SIZE: Real = 0.05;

/// What an export produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GeometryKind {
    PointCloud,
    Mesh,
}

impl GeometryKind {
    /// Suffix used in the artifact file name.
    pub fn suffix(self) -> &'static str {
        match self {
            Self::PointCloud => "pointcloud",
            Self::Mesh => "mesh",
        }
    }
}

/// User-facing export controls.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExportOptions {
    /// Raw confidence threshold, transformed by the scene before masking.
    pub threshold: Real,
    pub as_point_cloud: bool,
    pub mask_sky: bool,
    pub clean_depth: bool,
    /// Skip camera frustums.
    pub transparent_cameras: bool,
    /// Frustum base width in world units.
    pub camera_size: Real,
    pub camera_colors: CameraColors,
}

impl Default for ExportOptions {
    fn default() -> Self {
        Self {
            threshold: DEFAULT_MIN_CONF_THR,
            as_point_cloud: false,
            mask_sky: false,
            clean_depth: false,
            transparent_cameras: false,
            camera_size: DEFAULT_CAMERA_SIZE,
            camera_colors: CameraColors::default(),
        }
    }
}

impl ExportOptions {
    pub fn kind(&self) -> GeometryKind {
        if self.as_point_cloud {
            GeometryKind::PointCloud
        } else {
            GeometryKind::Mesh
        }
    }

    /// # Errors
    ///
    /// Returns an error for a negative or non-finite threshold or camera size.
    pub fn validate(&self) -> Result<()> {
        ensure!(
            self.threshold.is_finite() && self.threshold >= 0.0,
            "threshold must be a non-negative number (got {})",
            self.threshold
        );
        ensure!(
            self.camera_size.is_finite() && self.camera_size > 0.0,
            "camera_size must be positive (got {})",
            self.camera_size
        );
        Ok(())
    }

    /// Options that change which pixels are kept.
    pub(crate) fn mask_key(&self) -> (u64, bool, bool) {
        (self.threshold.to_bits(), self.mask_sky, self.clean_depth)
    }
}

/// Result of a successful export.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExportSummary {
    pub path: PathBuf,
    pub kind: GeometryKind,
    /// Valid pixels over all views after post-processing.
    pub masked_points: usize,
    /// Vertices in the main geometry (points for a point cloud).
    pub vertices: usize,
    /// Triangles in the main geometry (0 for a point cloud).
    pub faces: usize,
    pub cameras: usize,
}

/// Geometry of one export, before encoding.
#[derive(Debug, Clone, PartialEq)]
pub struct SceneGeometry {
    pub kind: GeometryKind,
    pub cloud: PointCloud,
    pub mesh: Mesh,
    pub cameras: Vec<Mesh>,
}

impl SceneGeometry {
    /// Build the exported geometry from `masked` in world coordinates.
    ///
    /// # Errors
    ///
    /// Returns an error if the masks do not match the scene.
    pub fn build(scene: &SceneState, masked: &MaskedGeometry, opts: &ExportOptions) -> Result<Self> {
        let kind = opts.kind();
        let (cloud, mesh) = match kind {
            GeometryKind::PointCloud => (
                PointCloud::from_masked(scene.points(), scene.images(), &masked.masks)?,
                Mesh::default(),
            ),
            GeometryKind::Mesh => (
                PointCloud::default(),
                mesh_from_views(scene.points(), scene.images(), &masked.masks)?,
            ),
        };

        let cameras = if opts.transparent_cameras {
            Vec::new()
        } else {
            (0..scene.num_views())
                .map(|v| {
                    camera_frustum(
                        &scene.poses()[v],
                        scene.focals()[v],
                        scene.images()[v].size(),
                        opts.camera_size,
                        opts.camera_colors.color_for(v),
                    )
                })
                .collect()
        };

        Ok(Self {
            kind,
            cloud,
            mesh,
            cameras,
        })
    }

    pub fn transform(&mut self, m: &Mat4) {
        self.cloud.transform(m);
        self.mesh.transform(m);
        for cam in &mut self.cameras {
            cam.transform(m);
        }
    }

    fn into_nodes(self) -> Vec<GlbNode> {
        let mut nodes = Vec::with_capacity(1 + self.cameras.len());
        match self.kind {
            GeometryKind::PointCloud => nodes.push(GlbNode::Points {
                name: "pointcloud".into(),
                cloud: self.cloud,
            }),
            GeometryKind::Mesh => nodes.push(GlbNode::Triangles {
                name: "mesh".into(),
                mesh: self.mesh,
            }),
        }
        for (i, mesh) in self.cameras.into_iter().enumerate() {
            nodes.push(GlbNode::Triangles {
                name: format!("camera_{i}"),
                mesh,
            });
        }
        nodes
    }
}

/// Path of the artifact an export with `kind` writes.
pub fn artifact_path(outdir: &Path, name: &str, kind: GeometryKind) -> PathBuf {
    outdir.join(format!("{name}_{}.glb", kind.suffix()))
}

/// Export with the default sky segmenter. See [`export_scene_with`].
///
/// # Errors
///
/// See [`export_scene_with`].
pub fn export_scene(
    scene: Option<&mut SceneState>,
    outdir: &Path,
    name: &str,
    opts: &ExportOptions,
) -> Result<Option<ExportSummary>> {
    export_scene_with(scene, outdir, name, opts, &HsvSkySegmenter::default())
}

/// Write the scene as a GLB artifact into `outdir`.
///
/// Returns `Ok(None)` without touching the filesystem when there is no
/// scene. Empty masks produce a valid artifact with no geometry.
///
/// # Errors
///
/// Returns an error for invalid options, a failing sky segmenter, a
/// singular first pose, or a failed write.
pub fn export_scene_with(
    scene: Option<&mut SceneState>,
    outdir: &Path,
    name: &str,
    opts: &ExportOptions,
    sky: &dyn SkySegmenter,
) -> Result<Option<ExportSummary>> {
    let Some(scene) = scene else {
        log::debug!("export of '{name}' skipped: no reconstructed scene");
        return Ok(None);
    };
    opts.validate()?;
    ensure!(scene.num_views() > 0, "cannot export a scene without views");

    let thr = scene.apply_threshold(opts.threshold);
    let masked = compute_masks(
        scene,
        opts.clean_depth.then(DepthCleanup::default),
        opts.mask_sky.then_some(sky),
    )?;

    let mut geometry = SceneGeometry::build(scene, &masked, opts)?;
    geometry.transform(&canonical_transform(&scene.poses()[0])?);

    let summary_base = (
        geometry.kind,
        match geometry.kind {
            GeometryKind::PointCloud => geometry.cloud.len(),
            GeometryKind::Mesh => geometry.mesh.vertices.len(),
        },
        geometry.mesh.num_faces(),
        geometry.cameras.len(),
    );

    fs::create_dir_all(outdir)
        .with_context(|| format!("failed to create output directory {}", outdir.display()))?;
    let path = artifact_path(outdir, name, geometry.kind);
    write_glb(&path, &geometry.into_nodes())?;

    let (kind, vertices, faces, cameras) = summary_base;
    log::info!(
        "exported {} ({} valid pixels at threshold {:.3}, {vertices} vertices, {faces} faces)",
        path.display(),
        masked.count(),
        thr
    );
    Ok(Some(ExportSummary {
        path,
        kind,
        masked_points: masked.count(),
        vertices,
        faces,
        cameras,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::SyntheticScene;
    use tempfile::TempDir;

    #[test]
    fn missing_scene_is_a_no_op() {
        let dir = TempDir::new().unwrap();
        let out = dir.path().join("never-created");
        let res = export_scene(None, &out, "x", &ExportOptions::default()).unwrap();
        assert!(res.is_none());
        assert!(!out.exists());
    }

    #[test]
    fn threshold_is_stored_transformed() {
        let dir = TempDir::new().unwrap();
        let mut scene = SyntheticScene::orbit(2, 6, 4).scene().unwrap();
        let opts = ExportOptions {
            threshold: 5.0,
            ..Default::default()
        };
        export_scene(Some(&mut scene), dir.path(), "s", &opts).unwrap();
        assert!((scene.min_conf_thr - 5.0_f64.ln()).abs() < 1e-12);
    }

    #[test]
    fn writes_named_artifacts() {
        let dir = TempDir::new().unwrap();
        let mut scene = SyntheticScene::orbit(2, 6, 4).scene().unwrap();
        let mesh = export_scene(Some(&mut scene), dir.path(), "box", &ExportOptions::default())
            .unwrap()
            .unwrap();
        assert_eq!(mesh.path, dir.path().join("box_mesh.glb"));
        assert_eq!(mesh.cameras, 2);
        assert!(mesh.faces > 0);

        let opts = ExportOptions {
            as_point_cloud: true,
            transparent_cameras: true,
            ..Default::default()
        };
        let cloud = export_scene(Some(&mut scene), dir.path(), "box", &opts)
            .unwrap()
            .unwrap();
        assert_eq!(cloud.path, dir.path().join("box_pointcloud.glb"));
        assert_eq!(cloud.cameras, 0);
        assert_eq!(cloud.vertices, cloud.masked_points);

        let (json, _) = glb::tests::parse(&fs::read(&cloud.path).unwrap());
        assert_eq!(json["nodes"].as_array().unwrap().len(), 1);
    }

    #[test]
    fn explicit_camera_colors_win() {
        let scene = SyntheticScene::orbit(3, 4, 4).scene().unwrap();
        let opts = ExportOptions {
            camera_colors: CameraColors {
                palette: vec![[1, 1, 1]],
                per_view: Some(vec![[9, 9, 9]]),
            },
            ..Default::default()
        };
        let masked = MaskedGeometry {
            masks: scene.masks(),
        };
        let geom = SceneGeometry::build(&scene, &masked, &opts).unwrap();
        assert_eq!(geom.cameras[0].colors[0], [9, 9, 9]);
        assert_eq!(geom.cameras[1].colors[0], [1, 1, 1]);
        assert_eq!(geom.cameras[2].colors[0], [1, 1, 1]);
    }

    #[test]
    fn invalid_options_are_rejected() {
        let dir = TempDir::new().unwrap();
        let mut scene = SyntheticScene::orbit(2, 4, 4).scene().unwrap();
        let opts = ExportOptions {
            camera_size: 0.0,
            ..Default::default()
        };
        assert!(export_scene(Some(&mut scene), dir.path(), "x", &opts).is_err());
    }
}
