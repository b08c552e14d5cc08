//! Retained reconstruction state.
//!
//! A [`SceneState`] is what the global aligner hands back: per-view images,
//! world-frame point maps, confidence maps, camera-to-world poses and focal
//! lengths. It is reused across export calls; the only field export mutates
//! is [`SceneState::min_conf_thr`].

use anyhow::Result;
use serde::{Deserialize, Serialize};

use crate::{Grid, Mat3, Mat4, Pt3, Real, ReconError, RgbGrid, transform_point};

/// Confidence threshold applied by a freshly aligned scene.
pub const DEFAULT_MIN_CONF_THR: Real = 3.0;

/// Maps a user-facing threshold into the scene's confidence domain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfidenceTransform {
    /// `ln(threshold)`.
    #[default]
    Log,
    /// Threshold is used as given.
    Identity,
}

impl ConfidenceTransform {
    pub fn apply(self, value: Real) -> Real {
        match self {
            Self::Log => value.ln(),
            Self::Identity => value,
        }
    }
}

/// The retained, optimized reconstruction of one scene.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SceneState {
    images: Vec<RgbGrid>,
    points: Vec<Grid<Pt3>>,
    confidences: Vec<Grid<Real>>,
    poses: Vec<Mat4>,
    focals: Vec<Real>,
    /// Last applied confidence threshold, already transformed.
    pub min_conf_thr: Real,
    pub conf_transform: ConfidenceTransform,
}

impl SceneState {
    /// Assemble a scene from per-view attributes.
    ///
    /// # Errors
    ///
    /// Returns [`ReconError::InconsistentScene`] if the per-view lists differ
    /// in length, or a point/confidence map does not match its image size.
    pub fn new(
        images: Vec<RgbGrid>,
        points: Vec<Grid<Pt3>>,
        confidences: Vec<Grid<Real>>,
        poses: Vec<Mat4>,
        focals: Vec<Real>,
    ) -> Result<Self> {
        let n = images.len();
        if points.len() != n || confidences.len() != n || poses.len() != n || focals.len() != n
        {
            return Err(ReconError::InconsistentScene(format!(
                "images={}, points={}, confidences={}, poses={}, focals={}",
                n,
                points.len(),
                confidences.len(),
                poses.len(),
                focals.len()
            ))
            .into());
        }
        for (i, ((img, pts), conf)) in images.iter().zip(&points).zip(&confidences).enumerate() {
            if !img.same_size(pts) || !img.same_size(conf) {
                return Err(ReconError::InconsistentScene(format!(
                    "view {i}: image {:?}, points {:?}, confidence {:?}",
                    img.size(),
                    pts.size(),
                    conf.size()
                ))
                .into());
            }
        }
        Ok(Self {
            images,
            points,
            confidences,
            poses,
            focals,
            min_conf_thr: DEFAULT_MIN_CONF_THR,
            conf_transform: ConfidenceTransform::default(),
        })
    }

    /// Replace the confidence transform (builder style).
    pub fn with_conf_transform(mut self, conf_transform: ConfidenceTransform) -> Self {
        self.conf_transform = conf_transform;
        self
    }

    pub fn num_views(&self) -> usize {
        self.images.len()
    }

    pub fn images(&self) -> &[RgbGrid] {
        &self.images
    }

    /// World-frame point maps.
    pub fn points(&self) -> &[Grid<Pt3>] {
        &self.points
    }

    pub fn confidences(&self) -> &[Grid<Real>] {
        &self.confidences
    }

    /// Camera-to-world poses.
    pub fn poses(&self) -> &[Mat4] {
        &self.poses
    }

    pub fn focals(&self) -> &[Real] {
        &self.focals
    }

    /// Principal point of view `v`, fixed at the image centre.
    pub fn principal_point(&self, v: usize) -> (Real, Real) {
        let (w, h) = self.images[v].size();
        (w as Real / 2.0, h as Real / 2.0)
    }

    /// Pinhole intrinsics matrix of view `v`.
    pub fn intrinsics(&self, v: usize) -> Mat3 {
        let f = self.focals[v];
        let (cx, cy) = self.principal_point(v);
        Mat3::new(f, 0.0, cx, 0.0, f, cy, 0.0, 0.0, 1.0)
    }

    /// World-to-camera transform of view `v`.
    ///
    /// Falls back to identity for a singular pose.
    pub fn world_to_camera(&self, v: usize) -> Mat4 {
        self.poses[v].try_inverse().unwrap_or_else(Mat4::identity)
    }

    /// Per-view depth maps: z coordinate of each point in its own camera frame.
    pub fn depth_maps(&self) -> Vec<Grid<Real>> {
        (0..self.num_views())
            .map(|v| {
                let w2c = self.world_to_camera(v);
                self.points[v].map(|p| transform_point(&w2c, p).z)
            })
            .collect()
    }

    /// Transform a raw threshold and store it as the active threshold.
    ///
    /// Returns the transformed value.
    pub fn apply_threshold(&mut self, threshold: Real) -> Real {
        self.min_conf_thr = self.conf_transform.apply(threshold);
        self.min_conf_thr
    }

    /// Per-view masks `confidence >= min_conf_thr` (NaN confidences are masked out).
    pub fn masks(&self) -> Vec<Grid<bool>> {
        self.masks_from(&self.confidences)
    }

    /// Threshold an alternative set of confidence maps with the active threshold.
    pub fn masks_from(&self, confidences: &[Grid<Real>]) -> Vec<Grid<bool>> {
        let thr = self.min_conf_thr;
        confidences.iter().map(|c| c.map(|&v| v >= thr)).collect()
    }

    /// Every point of every view, unmasked, in view order.
    pub fn all_points(&self) -> Vec<Pt3> {
        self.points
            .iter()
            .flat_map(|g| g.iter().copied())
            .collect()
    }
}
