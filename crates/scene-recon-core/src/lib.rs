//! Core types for `scene-recon`.
//!
//! This crate provides the building blocks shared by the pipeline and CLI
//! crates:
//!
//! - linear algebra type aliases (`Real`, `Pt3`, `Mat4`, and friends) and
//!   pose helpers,
//! - dense row-major per-pixel [`Grid`]s for images, point maps,
//!   confidence maps and masks,
//! - the data model: [`View`], [`Pair`], [`PairwiseResult`], [`SceneState`],
//! - the [`ReconError`] taxonomy,
//! - colour helpers (jet colormap, camera palette).
//!
//! # Example
//!
//! ```
//! use scene_recon_core::{Grid, Mat4, Pt3, SceneState};
//!
//! let image = Grid::filled(4, 3, [128u8, 128, 128]);
//! let points = Grid::filled(4, 3, Pt3::new(0.0, 0.0, 1.0));
//! let conf = Grid::filled(4, 3, 5.0);
//! let mut scene = SceneState::new(
//!     vec![image],
//!     vec![points],
//!     vec![conf],
//!     vec![Mat4::identity()],
//!     vec![200.0],
//! )
//! .unwrap();
//! scene.apply_threshold(3.0);
//! assert_eq!(scene.masks()[0].count(), 12);
//! ```

mod colormap;
mod error;
mod grid;
mod math;
mod pair;
mod scene;
mod view;

pub use colormap::*;
pub use error::ReconError;
pub use grid::Grid;
pub use math::*;
pub use pair::{Pair, PairwiseResult};
pub use scene::{ConfidenceTransform, DEFAULT_MIN_CONF_THR, SceneState};
pub use view::{Rgb, RgbGrid, View, validate_views};
