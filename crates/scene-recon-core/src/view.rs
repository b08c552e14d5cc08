//! Input views and RGB pixel grids.

use anyhow::{Result, ensure};
use serde::{Deserialize, Serialize};

use crate::Grid;

/// One 8-bit RGB pixel.
pub type Rgb = [u8; 3];

/// A dense RGB image in row-major order.
pub type RgbGrid = Grid<Rgb>;

impl RgbGrid {
    /// Copy pixels out of an `image` crate buffer.
    pub fn from_rgb_image(img: &image::RgbImage) -> Self {
        let (w, h) = img.dimensions();
        Grid::from_fn(w as usize, h as usize, |x, y| {
            img.get_pixel(x as u32, y as u32).0
        })
    }

    /// Copy pixels into an `image` crate buffer.
    pub fn to_rgb_image(&self) -> image::RgbImage {
        let mut out = image::RgbImage::new(self.width() as u32, self.height() as u32);
        for (x, y, px) in self.enumerate() {
            out.put_pixel(x as u32, y as u32, image::Rgb(*px));
        }
        out
    }
}

/// A loaded input image.
///
/// Views are immutable once loaded; `index` is the view's position in the
/// resolved view list and is what [`Pair`](crate::Pair) refers to.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct View {
    pub index: usize,
    /// Display name (usually the source file name), used as the pose JSON key.
    pub name: String,
    pub image: RgbGrid,
}

impl View {
    pub fn new(index: usize, name: impl Into<String>, image: RgbGrid) -> Self {
        Self {
            index,
            name: name.into(),
            image,
        }
    }

    /// `(width, height)` of the image.
    pub fn size(&self) -> (usize, usize) {
        self.image.size()
    }
}

/// Check that views are indexed `0..n` in order and non-empty.
///
/// # Errors
///
/// Returns an error if the list is empty, an index is out of place, or an
/// image has zero area.
pub fn validate_views(views: &[View]) -> Result<()> {
    ensure!(!views.is_empty(), "need at least one view");
    for (i, view) in views.iter().enumerate() {
        ensure!(
            view.index == i,
            "view {} ({}) has index {}",
            i,
            view.name,
            view.index
        );
        ensure!(!view.image.is_empty(), "view {} ({}) has an empty image", i, view.name);
    }
    Ok(())
}
