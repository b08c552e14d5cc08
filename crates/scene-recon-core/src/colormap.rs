//! Colour helpers: the jet colormap for diagnostics and the camera palette.

use serde::{Deserialize, Serialize};

use crate::{Real, Rgb};

/// Matplotlib-compatible `jet` colormap for `t` in `[0, 1]` (clamped).
pub fn jet(t: Real) -> Rgb {
    let t = if t.is_finite() { t.clamp(0.0, 1.0) } else { 0.0 };
    let channel = |x: Real| -> u8 {
        let v = (1.5 - (4.0 * t - x).abs()).clamp(0.0, 1.0);
        (v * 255.0).round() as u8
    };
    [channel(3.0), channel(2.0), channel(1.0)]
}

/// Map `t` in `[0, 1]` to an 8-bit gray level replicated on three channels.
pub fn gray(t: Real) -> Rgb {
    let t = if t.is_finite() { t.clamp(0.0, 1.0) } else { 0.0 };
    let v = (t * 255.0).round() as u8;
    [v, v, v]
}

/// Default camera frustum colours, cycled by view index.
pub const DEFAULT_CAMERA_PALETTE: [Rgb; 11] = [
    [255, 0, 0],
    [0, 0, 255],
    [0, 255, 0],
    [255, 0, 255],
    [255, 204, 0],
    [0, 204, 204],
    [128, 255, 255],
    [255, 128, 255],
    [255, 255, 128],
    [0, 0, 0],
    [128, 128, 128],
];

/// Colour policy for camera frustums.
///
/// `per_view`, when set, wins over the cycled `palette`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CameraColors {
    pub palette: Vec<Rgb>,
    pub per_view: Option<Vec<Rgb>>,
}

impl Default for CameraColors {
    fn default() -> Self {
        Self {
            palette: DEFAULT_CAMERA_PALETTE.to_vec(),
            per_view: None,
        }
    }
}

impl CameraColors {
    /// Colour for view `index`.
    ///
    /// An explicit per-view entry is used when present; otherwise the palette
    /// is cycled. An empty palette yields black.
    pub fn color_for(&self, index: usize) -> Rgb {
        if let Some(c) = self.per_view.as_ref().and_then(|v| v.get(index)) {
            return *c;
        }
        if self.palette.is_empty() {
            return [0, 0, 0];
        }
        self.palette[index % self.palette.len()]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn jet_endpoints() {
        assert_eq!(jet(0.0), [0, 0, 128]);
        assert_eq!(jet(0.5), [128, 255, 128]);
        assert_eq!(jet(1.0), [128, 0, 0]);
        assert_eq!(jet(f64::NAN), jet(0.0));
    }

    #[test]
    fn palette_cycles() {
        let colors = CameraColors::default();
        assert_eq!(colors.color_for(0), [255, 0, 0]);
        assert_eq!(colors.color_for(11), [255, 0, 0]);
        assert_eq!(colors.color_for(12), [0, 0, 255]);
    }

    #[test]
    fn per_view_overrides_palette() {
        let colors = CameraColors {
            per_view: Some(vec![[1, 2, 3]]),
            ..Default::default()
        };
        assert_eq!(colors.color_for(0), [1, 2, 3]);
        assert_eq!(colors.color_for(1), [0, 0, 255]);
    }
}
