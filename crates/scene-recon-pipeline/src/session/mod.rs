//! Reconstruction session: an explicit owner for the retained scene.
//!
//! The session holds the loaded views, the run configuration and the last
//! reconstructed [`SceneState`]. Step functions such as
//! [`step_reconstruct`](crate::reconstruct::step_reconstruct) mutate it in
//! place; exports borrow it mutably, so they are serialized by the borrow
//! checker.
//!
//! ```no_run
//! use std::path::Path;
//! use scene_recon_pipeline::export::ExportOptions;
//! use scene_recon_pipeline::reconstruct::step_reconstruct;
//! use scene_recon_pipeline::session::ReconstructionSession;
//! use scene_recon_pipeline::align::MstAligner;
//! use scene_recon_pipeline::inference::PrecomputedPairs;
//! # fn main() -> anyhow::Result<()> {
//! # let views = unimplemented!();
//! let mut session = ReconstructionSession::new();
//! session.set_input(views)?;
//! let mut model = PrecomputedPairs::new("predictions")?;
//! step_reconstruct(&mut session, &mut model, &mut MstAligner::new())?;
//! session.export_model(Path::new("out"), "scene", &ExportOptions::default())?;
//! # Ok(())
//! # }
//! ```

mod types;

pub use types::{ExportRecord, LogEntry, SessionMetadata, current_timestamp};

use std::path::Path;

use anyhow::{Result, bail, ensure};
use serde::{Deserialize, Serialize};

use scene_recon_core::{Real, ReconError, SceneState, View, validate_views};

use crate::align::AlignmentMode;
use crate::export::{ExportOptions, ExportSummary, export_scene_with};
use crate::postprocess::{HsvSkySegmenter, SkySegmenter};
use crate::reconstruct::ReconstructionConfig;

const SESSION_KIND: &str = "scene_reconstruction";
const SCHEMA_VERSION: u32 = 1;

/// Mutable container for one scene's reconstruction and its exports.
///
/// Views and scene buffers are not part of the JSON snapshot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReconstructionSession {
    pub metadata: SessionMetadata,
    pub config: ReconstructionConfig,
    #[serde(skip)]
    views: Vec<View>,
    #[serde(skip)]
    scene: Option<SceneState>,
    /// Mode of the run that produced the current scene.
    pub mode: Option<AlignmentMode>,
    pub final_loss: Option<Real>,
    /// Bumped whenever the scene or its active mask changes.
    pub version: u64,
    #[serde(skip)]
    mask_key: Option<(u64, bool, bool)>,
    pub exports: Vec<ExportRecord<ExportSummary>>,
    pub log: Vec<LogEntry>,
}

impl Default for ReconstructionSession {
    fn default() -> Self {
        Self::new()
    }
}

impl ReconstructionSession {
    pub fn new() -> Self {
        Self {
            metadata: SessionMetadata::new(SESSION_KIND, SCHEMA_VERSION),
            config: ReconstructionConfig::default(),
            views: Vec::new(),
            scene: None,
            mode: None,
            final_loss: None,
            version: 0,
            mask_key: None,
            exports: Vec::new(),
            log: Vec::new(),
        }
    }

    pub fn with_description(description: impl Into<String>) -> Self {
        let mut session = Self::new();
        session.metadata.description = Some(description.into());
        session
    }

    /// Replace the input views. Drops any scene reconstructed from the old ones.
    ///
    /// # Errors
    ///
    /// Returns an error if the views are empty or not indexed `0..n`.
    pub fn set_input(&mut self, views: Vec<View>) -> Result<()> {
        validate_views(&views)?;
        self.views = views;
        self.clear_scene();
        Ok(())
    }

    pub fn views(&self) -> &[View] {
        &self.views
    }

    /// # Errors
    ///
    /// Returns an error if no views have been set.
    pub fn require_views(&self) -> Result<&[View]> {
        ensure!(!self.views.is_empty(), "input views not set");
        Ok(&self.views)
    }

    /// Validate and store a new configuration. The current scene is kept.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid.
    pub fn set_config(&mut self, config: ReconstructionConfig) -> Result<()> {
        config.validate()?;
        self.config = config;
        self.metadata.touch();
        Ok(())
    }

    /// Edit the configuration in place, then validate it.
    ///
    /// # Errors
    ///
    /// Returns an error if the edited configuration is invalid; the old one
    /// is kept.
    pub fn update_config<F>(&mut self, f: F) -> Result<()>
    where
        F: FnOnce(&mut ReconstructionConfig),
    {
        let mut config = self.config.clone();
        f(&mut config);
        self.set_config(config)
    }

    pub fn scene(&self) -> Option<&SceneState> {
        self.scene.as_ref()
    }

    pub fn has_scene(&self) -> bool {
        self.scene.is_some()
    }

    /// # Errors
    ///
    /// Returns [`ReconError::MissingSceneState`] if nothing was reconstructed.
    pub fn require_scene(&self) -> Result<&SceneState> {
        self.scene
            .as_ref()
            .ok_or_else(|| ReconError::MissingSceneState.into())
    }

    /// Retain a freshly reconstructed scene.
    pub fn set_scene(&mut self, scene: SceneState, mode: AlignmentMode, loss: Option<Real>) {
        self.scene = Some(scene);
        self.mode = Some(mode);
        self.final_loss = loss;
        self.mask_key = None;
        self.version += 1;
        self.metadata.touch();
    }

    pub fn clear_scene(&mut self) {
        if self.scene.take().is_some() {
            self.version += 1;
        }
        self.mode = None;
        self.final_loss = None;
        self.mask_key = None;
        self.metadata.touch();
    }

    /// Export the retained scene with the default sky segmenter.
    ///
    /// # Errors
    ///
    /// See [`export_model_with`](Self::export_model_with).
    pub fn export_model(
        &mut self,
        outdir: &Path,
        name: &str,
        opts: &ExportOptions,
    ) -> Result<Option<ExportSummary>> {
        self.export_model_with(outdir, name, opts, &HsvSkySegmenter::default())
    }

    /// Export the retained scene and record the artifact.
    ///
    /// Without a scene this is a no-op returning `Ok(None)`.
    ///
    /// # Errors
    ///
    /// Returns an error if the export itself fails; the failure is logged.
    pub fn export_model_with(
        &mut self,
        outdir: &Path,
        name: &str,
        opts: &ExportOptions,
        sky: &dyn SkySegmenter,
    ) -> Result<Option<ExportSummary>> {
        let result = export_scene_with(self.scene.as_mut(), outdir, name, opts, sky);
        let summary = match result {
            Ok(Some(summary)) => summary,
            Ok(None) => return Ok(None),
            Err(e) => {
                self.log_failure("export", e.to_string());
                return Err(e);
            }
        };

        let key = opts.mask_key();
        if self.mask_key != Some(key) {
            self.mask_key = Some(key);
            self.version += 1;
        }
        self.exports
            .push(ExportRecord::new(summary.clone(), self.version));
        self.log_success_with_notes(
            "export",
            format!(
                "{} ({} points, {} faces)",
                summary.path.display(),
                summary.masked_points,
                summary.faces
            ),
        );
        Ok(Some(summary))
    }

    pub fn log_success(&mut self, operation: impl Into<String>) {
        self.log.push(LogEntry::success(operation, None));
        self.metadata.touch();
    }

    pub fn log_success_with_notes(&mut self, operation: impl Into<String>, notes: impl Into<String>) {
        self.log
            .push(LogEntry::success(operation, Some(notes.into())));
        self.metadata.touch();
    }

    pub fn log_failure(&mut self, operation: impl Into<String>, error: impl Into<String>) {
        self.log.push(LogEntry::failure(operation, error));
        self.metadata.touch();
    }

    /// Drop views, scene, exports and log; keep config and description.
    pub fn reset(&mut self) {
        self.views.clear();
        self.clear_scene();
        self.exports.clear();
        self.log.clear();
    }

    /// Serialize the session snapshot (without views or scene buffers).
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self).map_err(Into::into)
    }

    /// # Errors
    ///
    /// Returns an error for malformed JSON or a newer schema version.
    pub fn from_json(json: &str) -> Result<Self> {
        let session: Self = serde_json::from_str(json)?;
        if session.metadata.schema_version > SCHEMA_VERSION {
            bail!(
                "session schema version {} is newer than supported version {}",
                session.metadata.schema_version,
                SCHEMA_VERSION
            );
        }
        Ok(session)
    }
}
