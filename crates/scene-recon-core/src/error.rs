use thiserror::Error;

/// Typed failures surfaced by the reconstruction pipeline.
///
/// Step functions return `anyhow::Result`; these values travel inside the
/// `anyhow::Error` and can be recovered with `downcast_ref::<ReconError>()`.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ReconError {
    /// Sliding-window size or reference index out of range for the view count.
    #[error("invalid {parameter} = {value} for {num_views} views (valid range {min}..={max})")]
    InvalidTopologyParameter {
        parameter: &'static str,
        value: usize,
        num_views: usize,
        min: usize,
        max: usize,
    },
    /// Two persistence inputs that must be parallel have different lengths.
    #[error("{left} count {left_len} does not match {right} count {right_len}")]
    CountMismatch {
        left: &'static str,
        left_len: usize,
        right: &'static str,
        right_len: usize,
    },
    /// A scene was required but no reconstruction has been run yet.
    ///
    /// Export entry points treat this as a no-op and return `None`; only
    /// `require_*` accessors surface it as an error.
    #[error("no reconstructed scene available")]
    MissingSceneState,
    /// Per-view scene attributes disagree in length.
    #[error("scene state is inconsistent: {0}")]
    InconsistentScene(String),
    /// Point rows must have 3 or 4 columns.
    #[error("point row {row} has {columns} columns (expected 3 or 4)")]
    InvalidPointColumns { row: usize, columns: usize },
    /// Pipeline input is empty or malformed.
    #[error("invalid input: {0}")]
    InvalidInput(String),
}
