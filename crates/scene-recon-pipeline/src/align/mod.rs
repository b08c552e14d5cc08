//! Global alignment boundary.
//!
//! A [`GlobalAligner`] turns the full set of pairwise predictions into one
//! [`SceneState`] with shared poses and focals. The orchestrator chooses the
//! [`AlignmentMode`] and supplies [`AlignmentParams`]; the aligner owns the
//! numerical method.
//!
//! [`MstAligner`] is the bundled implementation: a spanning-tree
//! initialization followed by scheduled pose relaxation.

mod focal;
mod mst;
mod reference;
mod schedule;
mod similarity;

pub use focal::estimate_focal;
pub use mst::{SpanningTree, maximum_spanning_tree};
pub use reference::MstAligner;
pub use schedule::{LR_MIN, Schedule};
pub use similarity::{Similarity, fit_similarity};

use anyhow::{Result, ensure};
use serde::{Deserialize, Serialize};

use scene_recon_core::{PairwiseResult, Real, SceneState, View};

/// How the aligner consumes pairwise results.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlignmentMode {
    /// Two views: read the single pair directly, no iterations.
    PairViewer,
    /// Three or more views: iterative global alignment.
    Iterative,
}

impl AlignmentMode {
    /// Mode for a resolved view count.
    pub fn for_view_count(num_views: usize) -> Self {
        if num_views > 2 {
            Self::Iterative
        } else {
            Self::PairViewer
        }
    }
}

/// Pose graph initialization policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InitPolicy {
    /// Chain pairwise estimates along the maximum-confidence spanning tree.
    #[default]
    Mst,
}

/// Parameters forwarded to the aligner in iterative mode.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AlignmentParams {
    pub init: InitPolicy,
    /// Fixed iteration budget.
    pub iterations: usize,
    pub schedule: Schedule,
    /// Initial learning rate; decays towards [`LR_MIN`].
    pub learning_rate: Real,
    /// Pixel stride used when sampling correspondences for pose fits.
    pub sample_stride: usize,
}

impl Default for AlignmentParams {
    fn default() -> Self {
        Self {
            init: InitPolicy::Mst,
            iterations: 300,
            schedule: Schedule::Linear,
            learning_rate: 0.01,
            sample_stride: 4,
        }
    }
}

impl AlignmentParams {
    /// # Errors
    ///
    /// Returns an error for a non-positive learning rate or zero stride.
    pub fn validate(&self) -> Result<()> {
        ensure!(
            self.learning_rate > 0.0 && self.learning_rate.is_finite(),
            "learning_rate must be positive (got {})",
            self.learning_rate
        );
        ensure!(self.sample_stride > 0, "sample_stride must be positive");
        Ok(())
    }
}

/// What an aligner hands back.
#[derive(Debug, Clone)]
pub struct Alignment {
    pub scene: SceneState,
    /// Final loss of the iterative optimization; `None` in pair-viewer mode.
    pub loss: Option<Real>,
}

/// Reconciles pairwise predictions into a single world frame.
///
/// `views` are the resolved views (at least two); `results` holds one
/// prediction per directed pair of the scene graph.
pub trait GlobalAligner {
    fn align(
        &mut self,
        views: &[View],
        results: &[PairwiseResult],
        mode: AlignmentMode,
        params: &AlignmentParams,
    ) -> Result<Alignment>;
}

impl<A: GlobalAligner + ?Sized> GlobalAligner for &mut A {
    fn align(
        &mut self,
        views: &[View],
        results: &[PairwiseResult],
        mode: AlignmentMode,
        params: &AlignmentParams,
    ) -> Result<Alignment> {
        (**self).align(views, results, mode, params)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mode_follows_view_count() {
        assert_eq!(AlignmentMode::for_view_count(2), AlignmentMode::PairViewer);
        assert_eq!(AlignmentMode::for_view_count(3), AlignmentMode::Iterative);
        assert_eq!(AlignmentMode::for_view_count(10), AlignmentMode::Iterative);
    }

    #[test]
    fn params_validation() {
        assert!(AlignmentParams::default().validate().is_ok());
        let bad = AlignmentParams {
            learning_rate: 0.0,
            ..Default::default()
        };
        assert!(bad.validate().is_err());
    }

    #[test]
    fn params_deserialize_with_defaults() {
        let p: AlignmentParams =
            serde_json::from_str(r#"{"iterations": 10, "schedule": "cosine"}"#).unwrap();
        assert_eq!(p.iterations, 10);
        assert_eq!(p.schedule, Schedule::Cosine);
        assert_eq!(p.sample_stride, 4);
    }
}
