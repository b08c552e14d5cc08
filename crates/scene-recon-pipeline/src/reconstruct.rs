//! Reconstruction orchestration: scene graph, pairwise inference, global
//! alignment.

use anyhow::{Context, Result, ensure};
use serde::{Deserialize, Serialize};

use scene_recon_core::{Real, SceneState, View, validate_views};

use crate::align::{AlignmentMode, AlignmentParams, GlobalAligner};
use crate::inference::{PairwiseModel, run_inference};
use crate::io::ImageLoadOptions;
use crate::scene_graph::{Topology, make_pairs, resolve_views};
use crate::session::ReconstructionSession;

/// Parameters of one reconstruction run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconstructionConfig {
    pub topology: Topology,
    pub alignment: AlignmentParams,
    /// Pairs per model call. Affects throughput only.
    pub batch_size: usize,
    pub images: ImageLoadOptions,
}

impl Default for ReconstructionConfig {
    fn default() -> Self {
        Self {
            topology: Topology::Complete,
            alignment: AlignmentParams::default(),
            batch_size: 1,
            images: ImageLoadOptions::default(),
        }
    }
}

impl ReconstructionConfig {
    /// # Errors
    ///
    /// Returns an error for a zero batch size, a too small image size or
    /// invalid alignment parameters.
    pub fn validate(&self) -> Result<()> {
        ensure!(self.batch_size > 0, "batch_size must be positive");
        ensure!(
            self.images.long_side >= 16,
            "images.long_side must be at least 16 (got {})",
            self.images.long_side
        );
        self.alignment.validate()
    }
}

/// Output of [`reconstruct`].
#[derive(Debug, Clone)]
pub struct Reconstruction {
    pub scene: SceneState,
    /// Final optimization loss, `None` in pair-viewer mode.
    pub loss: Option<Real>,
    pub mode: AlignmentMode,
    /// Directed pairs sent to the model.
    pub num_pairs: usize,
}

/// Reconstruct a scene from `views`.
///
/// A single view is duplicated so that one non-trivial pair exists. Two
/// resolved views are aligned in pair-viewer mode, more in iterative mode.
/// Topology errors are raised before the model is called; model and
/// aligner errors are returned unchanged.
///
/// # Errors
///
/// Returns an error for invalid views or config, an out-of-range topology
/// parameter, or a failing model or aligner.
pub fn reconstruct<M, A>(
    views: &[View],
    config: &ReconstructionConfig,
    model: &mut M,
    aligner: &mut A,
) -> Result<Reconstruction>
where
    M: PairwiseModel + ?Sized,
    A: GlobalAligner + ?Sized,
{
    config.validate()?;
    validate_views(views)?;

    let pairs = make_pairs(views.len(), &config.topology)?;
    let resolved = resolve_views(views);
    log::info!(
        "reconstructing {} views with {} scene graph ({} directed pairs)",
        resolved.len(),
        config.topology,
        pairs.len()
    );

    let results = run_inference(model, &resolved, &pairs, config.batch_size)?;

    let mode = AlignmentMode::for_view_count(resolved.len());
    let alignment = aligner.align(&resolved, &results, mode, &config.alignment)?;
    ensure!(
        alignment.scene.num_views() == resolved.len(),
        "aligner returned {} views for {} inputs",
        alignment.scene.num_views(),
        resolved.len()
    );
    match alignment.loss {
        Some(loss) => log::info!("{mode:?} alignment finished, loss {loss:.6}"),
        None => log::info!("{mode:?} alignment finished"),
    }

    Ok(Reconstruction {
        scene: alignment.scene,
        loss: alignment.loss,
        mode,
        num_pairs: pairs.len(),
    })
}

/// Run [`reconstruct`] on the session's views and retain the scene.
///
/// On failure the previously retained scene is dropped, so no partial
/// state survives a failed run.
///
/// # Errors
///
/// Returns an error if the session has no views or reconstruction fails.
pub fn step_reconstruct<M, A>(
    session: &mut ReconstructionSession,
    model: &mut M,
    aligner: &mut A,
) -> Result<()>
where
    M: PairwiseModel + ?Sized,
    A: GlobalAligner + ?Sized,
{
    session.clear_scene();
    let views = session.require_views().context("nothing to reconstruct")?;
    let config = session.config.clone();

    let rec = match reconstruct(views, &config, model, aligner) {
        Ok(rec) => rec,
        Err(e) => {
            session.log_failure("reconstruct", e.to_string());
            return Err(e);
        }
    };

    let notes = match rec.loss {
        Some(loss) => format!(
            "{} views, {} pairs, {:?}, loss={loss:.6}",
            rec.scene.num_views(),
            rec.num_pairs,
            rec.mode
        ),
        None => format!("{} views, {} pairs, {:?}", rec.scene.num_views(), rec.num_pairs, rec.mode),
    };
    session.set_scene(rec.scene, rec.mode, rec.loss);
    session.log_success_with_notes("reconstruct", notes);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{RecordingAligner, SyntheticModel, SyntheticScene};
    use scene_recon_core::ReconError;

    #[test]
    fn mode_depends_on_resolved_view_count() {
        for (n, mode, pairs) in [
            (1, AlignmentMode::PairViewer, 2),
            (2, AlignmentMode::PairViewer, 2),
            (3, AlignmentMode::Iterative, 6),
        ] {
            let synth = SyntheticScene::orbit(n.max(2), 6, 4);
            let views = &synth.views()[..n];
            let mut model = SyntheticModel::new(&synth);
            let mut aligner = RecordingAligner::new(&synth);
            let rec = reconstruct(views, &ReconstructionConfig::default(), &mut model, &mut aligner).unwrap();
            assert_eq!(rec.mode, mode);
            assert_eq!(rec.num_pairs, pairs);
            assert_eq!(aligner.calls.len(), 1);
            assert_eq!(aligner.calls[0].0, mode);
            assert_eq!(aligner.calls[0].2, pairs);
            assert_eq!(rec.scene.num_views(), 2.max(n));
        }
    }

    #[test]
    fn bad_topology_fails_before_inference() {
        let synth = SyntheticScene::orbit(3, 4, 4);
        let mut model = SyntheticModel::new(&synth);
        let mut aligner = RecordingAligner::new(&synth);
        let config = ReconstructionConfig {
            topology: Topology::OneReference { reference: 3 },
            ..Default::default()
        };
        let err = reconstruct(&synth.views(), &config, &mut model, &mut aligner).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<ReconError>(),
            Some(ReconError::InvalidTopologyParameter { .. })
        ));
        assert_eq!(model.calls(), 0);
        assert!(aligner.calls.is_empty());
    }

    #[test]
    fn alignment_params_reach_the_aligner() {
        let synth = SyntheticScene::orbit(4, 4, 4);
        let mut model = SyntheticModel::new(&synth);
        let mut aligner = RecordingAligner::new(&synth);
        let mut config = ReconstructionConfig::default();
        config.alignment.iterations = 17;
        config.alignment.schedule = crate::align::Schedule::Cosine;
        config.batch_size = 3;
        reconstruct(&synth.views(), &config, &mut model, &mut aligner).unwrap();
        assert_eq!(aligner.calls[0].1, config.alignment);
        assert_eq!(model.calls(), 12_usize.div_ceil(3));
    }

    #[test]
    fn failed_step_drops_previous_scene() {
        let synth = SyntheticScene::orbit(3, 4, 4);
        let mut session = ReconstructionSession::new();
        session.set_input(synth.views()).unwrap();

        let mut model = SyntheticModel::new(&synth);
        step_reconstruct(&mut session, &mut model, &mut RecordingAligner::new(&synth)).unwrap();
        assert!(session.has_scene());
        assert_eq!(session.mode, Some(AlignmentMode::Iterative));

        let mut broken = RecordingAligner::new(&synth).failing("diverged");
        let err = step_reconstruct(&mut session, &mut model, &mut broken).unwrap_err();
        assert_eq!(err.to_string(), "diverged");
        assert!(!session.has_scene());
        assert!(session.final_loss.is_none());
        let last = session.log.last().unwrap();
        assert!(!last.success);
        assert_eq!(last.operation, "reconstruct");
    }
}
