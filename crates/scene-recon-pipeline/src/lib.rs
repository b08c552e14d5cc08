//! Reconstruction pipeline: scene graph, pairwise inference, global
//! alignment, export and persistence.
//!
//! ## Session API
//!
//! ```no_run
//! use std::path::Path;
//! use scene_recon_pipeline::{
//!     ExportOptions, MstAligner, PrecomputedPairs, ReconstructionSession, step_reconstruct,
//! };
//! # fn main() -> anyhow::Result<()> {
//! # let views = unimplemented!();
//! let mut session = ReconstructionSession::new();
//! session.set_input(views)?;
//!
//! let mut model = PrecomputedPairs::new("predictions")?;
//! step_reconstruct(&mut session, &mut model, &mut MstAligner::new())?;
//!
//! let opts = ExportOptions {
//!     as_point_cloud: true,
//!     ..Default::default()
//! };
//! session.export_model(Path::new("out"), "scene", &opts)?;
//! # Ok(())
//! # }
//! ```
//!
//! The pairwise model and the global aligner are injected through the
//! [`PairwiseModel`] and [`GlobalAligner`] traits.

pub mod align;
pub mod diagnostics;
pub mod export;
pub mod inference;
pub mod io;
pub mod persistence;
pub mod postprocess;
pub mod reconstruct;
pub mod scene_graph;
pub mod session;
pub mod test_utils;

pub use crate::align::{
    Alignment, AlignmentMode, AlignmentParams, GlobalAligner, InitPolicy, MstAligner, Schedule,
};
pub use crate::diagnostics::{normalized_depth_maps, render_channels, save_channels};
pub use crate::export::{ExportOptions, ExportSummary, GeometryKind, export_scene, export_scene_with};
pub use crate::inference::{PairInput, PairwiseModel, PrecomputedPairs, run_inference};
pub use crate::io::{ImageLoadOptions, list_images, load_views};
pub use crate::persistence::{save_point_cloud, save_points, save_poses};
pub use crate::postprocess::{DepthCleanup, HsvSkySegmenter, SkySegmenter};
pub use crate::reconstruct::{Reconstruction, ReconstructionConfig, reconstruct, step_reconstruct};
pub use crate::scene_graph::{Topology, TopologyBounds, make_pairs, resolve_views, topology_bounds};
pub use crate::session::{ExportRecord, LogEntry, ReconstructionSession, SessionMetadata};
