//! Deterministic fakes for the pairwise model and the global aligner.
//!
//! This module is public so integration tests across the workspace can use
//! it; it is not intended for production use.

use anyhow::{Result, anyhow};
use nalgebra::{Rotation3, Translation3};

use scene_recon_core::{
    Grid, Mat4, PairwiseResult, Pt3, Real, RgbGrid, SceneState, View, transform_point,
};

use crate::align::{Alignment, AlignmentMode, AlignmentParams, GlobalAligner};
use crate::inference::{PairInput, PairwiseModel};

/// Ground-truth scene: a ring of cameras, each looking at a gently curved
/// surface at depth ~4.
#[derive(Debug, Clone)]
pub struct SyntheticScene {
    pub width: usize,
    pub height: usize,
    /// Shared focal length in pixels (equal to the image width).
    pub focal: Real,
    /// Camera-to-world poses.
    pub poses: Vec<Mat4>,
    /// World-frame point maps.
    pub world: Vec<Grid<Pt3>>,
    pub confidences: Vec<Grid<Real>>,
    pub images: Vec<RgbGrid>,
}

impl SyntheticScene {
    pub fn orbit(num_views: usize, width: usize, height: usize) -> Self {
        let focal = width as Real;
        let (cx, cy) = (width as Real / 2.0, height as Real / 2.0);
        let mut poses = Vec::with_capacity(num_views);
        let mut world = Vec::with_capacity(num_views);
        let mut confidences = Vec::with_capacity(num_views);
        let mut images = Vec::with_capacity(num_views);

        for v in 0..num_views {
            let angle = 0.25 * v as Real;
            let rot = Rotation3::from_euler_angles(0.05 * v as Real, angle, 0.0);
            let centre = Translation3::new(-3.0 * angle.sin(), 0.1 * v as Real, 3.0 - 3.0 * angle.cos());
            let pose = (centre * rot).to_homogeneous();

            let depth = |x: usize, y: usize| {
                4.0 + 0.5 * (0.7 * x as Real).sin() * (0.5 * y as Real).cos()
            };
            let local = Grid::from_fn(width, height, |x, y| {
                let z = depth(x, y);
                Pt3::new((x as Real - cx) * z / focal, (y as Real - cy) * z / focal, z)
            });
            world.push(local.map(|p| transform_point(&pose, p)));
            poses.push(pose);
            confidences.push(Grid::from_fn(width, height, |x, y| {
                2.0 + ((x + 2 * y + v) % 7) as Real
            }));
            images.push(Grid::from_fn(width, height, |x, y| {
                [
                    (x * 255 / width.max(1)) as u8,
                    (y * 255 / height.max(1)) as u8,
                    (40 * v % 256) as u8,
                ]
            }));
        }

        Self {
            width,
            height,
            focal,
            poses,
            world,
            confidences,
            images,
        }
    }

    pub fn num_views(&self) -> usize {
        self.poses.len()
    }

    pub fn views(&self) -> Vec<View> {
        self.images
            .iter()
            .enumerate()
            .map(|(i, img)| View::new(i, format!("view_{i}.png"), img.clone()))
            .collect()
    }

    /// The scene as a perfect aligner would return it.
    pub fn scene(&self) -> Result<SceneState> {
        SceneState::new(
            self.images.clone(),
            self.world.clone(),
            self.confidences.clone(),
            self.poses.clone(),
            vec![self.focal; self.num_views()],
        )
    }

    /// Exact prediction for the ordered pair `(a, b)`.
    pub fn predict(&self, a: usize, b: usize) -> PairwiseResult {
        let to_a = self.poses[a].try_inverse().unwrap_or_else(Mat4::identity);
        PairwiseResult {
            pair: scene_recon_core::Pair::new(a, b, true),
            pts_a: self.world[a].map(|p| transform_point(&to_a, p)),
            pts_b: self.world[b].map(|p| transform_point(&to_a, p)),
            conf_a: self.confidences[a].clone(),
            conf_b: self.confidences[b].clone(),
        }
    }
}

/// Pairwise model returning exact predictions of a [`SyntheticScene`].
#[derive(Debug, Clone)]
pub struct SyntheticModel {
    scene: SyntheticScene,
    calls: usize,
    failure: Option<String>,
}

impl SyntheticModel {
    pub fn new(scene: &SyntheticScene) -> Self {
        Self {
            scene: scene.clone(),
            calls: 0,
            failure: None,
        }
    }

    /// Make every batch fail with `message`.
    pub fn failing(mut self, message: impl Into<String>) -> Self {
        self.failure = Some(message.into());
        self
    }

    /// Number of `infer_batch` calls so far.
    pub fn calls(&self) -> usize {
        self.calls
    }
}

impl PairwiseModel for SyntheticModel {
    fn name(&self) -> &str {
        "synthetic"
    }

    fn infer_batch(&mut self, batch: &[PairInput<'_>]) -> Result<Vec<PairwiseResult>> {
        self.calls += 1;
        if let Some(msg) = &self.failure {
            return Err(anyhow!("{msg}"));
        }
        Ok(batch
            .iter()
            .map(|input| {
                let mut res = self.scene.predict(input.pair.view_a, input.pair.view_b);
                res.pair = input.pair;
                res
            })
            .collect())
    }
}

/// Aligner that records how it was called and returns the ground truth.
#[derive(Debug, Clone)]
pub struct RecordingAligner {
    scene: SyntheticScene,
    /// `(mode, params, number of pairwise results)` per call.
    pub calls: Vec<(AlignmentMode, AlignmentParams, usize)>,
    failure: Option<String>,
}

impl RecordingAligner {
    pub fn new(scene: &SyntheticScene) -> Self {
        Self {
            scene: scene.clone(),
            calls: Vec::new(),
            failure: None,
        }
    }

    pub fn failing(mut self, message: impl Into<String>) -> Self {
        self.failure = Some(message.into());
        self
    }
}

impl GlobalAligner for RecordingAligner {
    fn align(
        &mut self,
        views: &[View],
        results: &[PairwiseResult],
        mode: AlignmentMode,
        params: &AlignmentParams,
    ) -> Result<Alignment> {
        self.calls.push((mode, params.clone(), results.len()));
        if let Some(msg) = &self.failure {
            return Err(anyhow!("{msg}"));
        }
        let mut truth = self.scene.clone();
        let n = views.len().min(truth.num_views());
        truth.poses.truncate(n);
        truth.world.truncate(n);
        truth.confidences.truncate(n);
        truth.images.truncate(n);
        let loss = match mode {
            AlignmentMode::PairViewer => None,
            AlignmentMode::Iterative => Some(0.0),
        };
        Ok(Alignment {
            scene: truth.scene()?,
            loss,
        })
    }
}
