//! Sky segmentation.

use std::collections::VecDeque;

use anyhow::Result;

use scene_recon_core::{Grid, Real, Rgb, RgbGrid};

/// Produces a per-pixel sky mask for an image.
pub trait SkySegmenter {
    fn segment(&self, image: &RgbGrid) -> Result<Grid<bool>>;
}

/// Colour-heuristic sky detector.
///
/// A pixel is sky-coloured when it is bluish and bright enough, or bright
/// with low saturation. The raw mask is cleaned with a morphological
/// opening, then only the large connected regions are kept.
#[derive(Debug, Clone, PartialEq)]
pub struct HsvSkySegmenter {
    /// Accepted hue range in degrees.
    pub hue_range: (Real, Real),
    /// Minimum value (0..=255) for bluish pixels.
    pub min_blue_value: Real,
    /// `(max saturation, min value)` rules for whitish sky, both on 0..=255.
    pub whitish: Vec<(Real, Real)>,
    /// Side of the square opening kernel.
    pub kernel: usize,
    /// Regions smaller than this fraction of the largest one are dropped.
    pub min_region_fraction: Real,
}

impl Default for HsvSkySegmenter {
    fn default() -> Self {
        Self {
            hue_range: (180.0, 240.0),
            min_blue_value: 100.0,
            whitish: vec![(10.0, 150.0), (30.0, 180.0), (50.0, 220.0)],
            kernel: 5,
            min_region_fraction: 0.5,
        }
    }
}

/// `(hue in degrees, saturation 0..=255, value 0..=255)`.
fn hsv([r, g, b]: Rgb) -> (Real, Real, Real) {
    let (r, g, b) = (r as Real, g as Real, b as Real);
    let max = r.max(g).max(b);
    let min = r.min(g).min(b);
    let delta = max - min;
    let sat = if max > 0.0 { 255.0 * delta / max } else { 0.0 };
    let hue = if delta == 0.0 {
        0.0
    } else if max == r {
        60.0 * ((g - b) / delta).rem_euclid(6.0)
    } else if max == g {
        60.0 * ((b - r) / delta + 2.0)
    } else {
        60.0 * ((r - g) / delta + 4.0)
    };
    (hue, sat, max)
}

impl HsvSkySegmenter {
    fn is_sky_colour(&self, px: Rgb) -> bool {
        let (h, s, v) = hsv(px);
        let bluish = h >= self.hue_range.0 && h <= self.hue_range.1 && v >= self.min_blue_value;
        bluish || self.whitish.iter().any(|&(max_s, min_v)| s < max_s && v > min_v)
    }
}

impl SkySegmenter for HsvSkySegmenter {
    fn segment(&self, image: &RgbGrid) -> Result<Grid<bool>> {
        let raw = image.map(|&px| self.is_sky_colour(px));
        let opened = dilate(&erode(&raw, self.kernel), self.kernel);
        Ok(keep_large_regions(&opened, self.min_region_fraction))
    }
}

/// Binary erosion with a `k×k` square; outside the image counts as `false`.
fn erode(mask: &Grid<bool>, k: usize) -> Grid<bool> {
    let r = (k / 2) as isize;
    let (w, h) = mask.size();
    Grid::from_fn(w, h, |x, y| {
        (-r..=r).all(|dy| {
            (-r..=r).all(|dx| {
                let (nx, ny) = (x as isize + dx, y as isize + dy);
                nx >= 0
                    && ny >= 0
                    && (nx as usize) < w
                    && (ny as usize) < h
                    && mask[(nx as usize, ny as usize)]
            })
        })
    })
}

fn dilate(mask: &Grid<bool>, k: usize) -> Grid<bool> {
    let r = (k / 2) as isize;
    let (w, h) = mask.size();
    Grid::from_fn(w, h, |x, y| {
        (-r..=r).any(|dy| {
            (-r..=r).any(|dx| {
                let (nx, ny) = (x as isize + dx, y as isize + dy);
                nx >= 0
                    && ny >= 0
                    && (nx as usize) < w
                    && (ny as usize) < h
                    && mask[(nx as usize, ny as usize)]
            })
        })
    })
}

/// Keep 8-connected regions larger than `fraction` of the largest region.
fn keep_large_regions(mask: &Grid<bool>, fraction: Real) -> Grid<bool> {
    let (w, h) = mask.size();
    let mut labels: Grid<usize> = Grid::filled(w, h, 0);
    let mut sizes = vec![0usize];
    let mut queue = VecDeque::new();

    for (x, y, &set) in mask.enumerate() {
        if !set || labels[(x, y)] != 0 {
            continue;
        }
        let label = sizes.len();
        let mut size = 0;
        labels[(x, y)] = label;
        queue.push_back((x, y));
        while let Some((cx, cy)) = queue.pop_front() {
            size += 1;
            for ny in cy.saturating_sub(1)..=(cy + 1).min(h - 1) {
                for nx in cx.saturating_sub(1)..=(cx + 1).min(w - 1) {
                    if mask[(nx, ny)] && labels[(nx, ny)] == 0 {
                        labels[(nx, ny)] = label;
                        queue.push_back((nx, ny));
                    }
                }
            }
        }
        sizes.push(size);
    }

    let largest = sizes.iter().copied().max().unwrap_or(0);
    let min_size = largest as Real * fraction;
    labels.map(|&l| l != 0 && sizes[l] as Real > min_size)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SKY: Rgb = [90, 150, 230];
    const GROUND: Rgb = [90, 70, 40];

    #[test]
    fn hsv_matches_reference_values() {
        let (h, s, v) = hsv([0, 0, 255]);
        assert!((h - 240.0).abs() < 1e-9);
        assert!((s - 255.0).abs() < 1e-9);
        assert!((v - 255.0).abs() < 1e-9);
        assert_eq!(hsv([200, 200, 200]), (0.0, 0.0, 200.0));
    }

    #[test]
    fn upper_half_sky_is_detected() {
        let img = Grid::from_fn(20, 20, |_, y| if y < 10 { SKY } else { GROUND });
        let sky = HsvSkySegmenter::default().segment(&img).unwrap();
        assert!(sky[(10, 3)]);
        assert!(!sky[(10, 15)]);
        assert_eq!(sky.count(), 200);
    }

    #[test]
    fn small_speckles_are_removed() {
        let img = Grid::from_fn(20, 20, |x, y| if x == 5 && y == 15 { SKY } else { GROUND });
        let sky = HsvSkySegmenter::default().segment(&img).unwrap();
        assert_eq!(sky.count(), 0);
    }

    #[test]
    fn only_large_regions_survive() {
        let mut mask = Grid::filled(12, 4, false);
        for x in 0..6 {
            for y in 0..4 {
                mask[(x, y)] = true;
            }
        }
        mask[(10, 1)] = true;
        mask[(10, 2)] = true;
        let kept = keep_large_regions(&mask, 0.5);
        assert_eq!(kept.count(), 24);
        assert!(!kept[(10, 1)]);
    }
}
