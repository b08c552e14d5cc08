//! Pairwise inference adapter boundary.
//!
//! The pairwise model is an external collaborator: given two images it
//! predicts per-pixel 3D points for both, expressed in the first image's
//! camera frame, plus per-pixel confidences. This module defines the trait
//! the orchestrator calls and the batching driver around it.

mod precomputed;

pub use precomputed::PrecomputedPairs;

use anyhow::{Result, ensure};

use scene_recon_core::{Pair, PairwiseResult, View};

/// One ordered pair handed to the model, with borrowed images.
#[derive(Debug, Clone, Copy)]
pub struct PairInput<'a> {
    pub pair: Pair,
    pub view_a: &'a View,
    pub view_b: &'a View,
}

/// A pairwise 3D prediction model.
///
/// Implementations must return exactly one result per input, in input
/// order. Batching is a throughput concern only: results must not depend
/// on how pairs are grouped.
pub trait PairwiseModel {
    /// Short identifier used in logs.
    fn name(&self) -> &str {
        "pairwise-model"
    }

    /// Predict point maps and confidences for a batch of ordered pairs.
    fn infer_batch(&mut self, batch: &[PairInput<'_>]) -> Result<Vec<PairwiseResult>>;
}

impl<M: PairwiseModel + ?Sized> PairwiseModel for &mut M {
    fn name(&self) -> &str {
        (**self).name()
    }

    fn infer_batch(&mut self, batch: &[PairInput<'_>]) -> Result<Vec<PairwiseResult>> {
        (**self).infer_batch(batch)
    }
}

/// Run the model over all pairs in batches of `batch_size`.
///
/// Each returned result is checked against its originating pair and the
/// image sizes of both views. Model errors are returned unchanged.
///
/// # Errors
///
/// Returns an error if a pair references a missing view, the model fails,
/// or a result does not match its pair.
pub fn run_inference<M>(
    model: &mut M,
    views: &[View],
    pairs: &[Pair],
    batch_size: usize,
) -> Result<Vec<PairwiseResult>>
where
    M: PairwiseModel + ?Sized,
{
    ensure!(batch_size > 0, "batch_size must be positive");
    let mut inputs = Vec::with_capacity(pairs.len());
    for pair in pairs {
        ensure!(
            pair.view_a < views.len() && pair.view_b < views.len(),
            "pair ({}, {}) references a view outside 0..{}",
            pair.view_a,
            pair.view_b,
            views.len()
        );
        inputs.push(PairInput {
            pair: *pair,
            view_a: &views[pair.view_a],
            view_b: &views[pair.view_b],
        });
    }

    log::info!(
        "running {} on {} pairs (batch size {})",
        model.name(),
        inputs.len(),
        batch_size
    );

    let mut results = Vec::with_capacity(inputs.len());
    for batch in inputs.chunks(batch_size) {
        let out = model.infer_batch(batch)?;
        ensure!(
            out.len() == batch.len(),
            "{} returned {} results for a batch of {}",
            model.name(),
            out.len(),
            batch.len()
        );
        for (input, res) in batch.iter().zip(out) {
            ensure!(
                res.pair.view_a == input.pair.view_a && res.pair.view_b == input.pair.view_b,
                "result for pair ({}, {}) returned in place of ({}, {})",
                res.pair.view_a,
                res.pair.view_b,
                input.pair.view_a,
                input.pair.view_b
            );
            res.validate(input.view_a.size(), input.view_b.size())?;
            results.push(res);
        }
    }
    Ok(results)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{SyntheticScene, SyntheticModel};

    #[test]
    fn batching_does_not_change_results() {
        let synth = SyntheticScene::orbit(3, 8, 6);
        let views = synth.views();
        let pairs = crate::make_pairs(3, &crate::Topology::Complete).unwrap();

        let mut model = SyntheticModel::new(&synth);
        let one = run_inference(&mut model, &views, &pairs, 1).unwrap();
        let four = run_inference(&mut model, &views, &pairs, 4).unwrap();
        assert_eq!(one.len(), pairs.len());
        assert_eq!(model.calls(), pairs.len() + pairs.len().div_ceil(4));
        for (a, b) in one.iter().zip(&four) {
            assert_eq!(a.pair, b.pair);
            assert_eq!(a.pts_b, b.pts_b);
        }
    }

    #[test]
    fn rejects_pairs_outside_view_range() {
        let synth = SyntheticScene::orbit(2, 4, 4);
        let views = synth.views();
        let mut model = SyntheticModel::new(&synth);
        let pairs = [Pair::new(0, 5, true)];
        assert!(run_inference(&mut model, &views, &pairs, 1).is_err());
    }

    #[test]
    fn model_errors_propagate() {
        let synth = SyntheticScene::orbit(2, 4, 4);
        let views = synth.views();
        let mut model = SyntheticModel::new(&synth).failing("device lost");
        let pairs = crate::make_pairs(2, &crate::Topology::Complete).unwrap();
        let err = run_inference(&mut model, &views, &pairs, 2).unwrap_err();
        assert_eq!(err.to_string(), "device lost");
    }
}
