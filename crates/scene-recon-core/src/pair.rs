//! View pairs and raw pairwise predictions.

use anyhow::{Result, ensure};
use serde::{Deserialize, Serialize};

use crate::{Grid, Pt3, Real};

/// An ordered pair of views fed to the pairwise model.
///
/// `symmetric` records that the reverse direction `(view_b, view_a)` is part
/// of the same pair set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Pair {
    pub view_a: usize,
    pub view_b: usize,
    pub symmetric: bool,
}

impl Pair {
    pub fn new(view_a: usize, view_b: usize, symmetric: bool) -> Self {
        Self {
            view_a,
            view_b,
            symmetric,
        }
    }

    /// The same pair in the opposite direction.
    pub fn reversed(&self) -> Self {
        Self {
            view_a: self.view_b,
            view_b: self.view_a,
            symmetric: self.symmetric,
        }
    }

    /// Unordered key `(min, max)`.
    pub fn edge(&self) -> (usize, usize) {
        if self.view_a <= self.view_b {
            (self.view_a, self.view_b)
        } else {
            (self.view_b, self.view_a)
        }
    }
}

/// Raw output of the pairwise model for one ordered [`Pair`].
///
/// Both point maps are expressed in the camera frame of `pair.view_a`:
/// `pts_a[x, y]` is the 3D point seen at pixel `(x, y)` of view A, and
/// `pts_b[x, y]` the point seen at pixel `(x, y)` of view B.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PairwiseResult {
    pub pair: Pair,
    pub pts_a: Grid<Pt3>,
    pub pts_b: Grid<Pt3>,
    pub conf_a: Grid<Real>,
    pub conf_b: Grid<Real>,
}

impl PairwiseResult {
    /// Check internal consistency and agreement with the view image sizes.
    ///
    /// # Errors
    ///
    /// Returns an error if a point map and its confidence map differ in size,
    /// or a map does not match the corresponding image.
    pub fn validate(&self, size_a: (usize, usize), size_b: (usize, usize)) -> Result<()> {
        let (a, b) = (self.pair.view_a, self.pair.view_b);
        ensure!(
            self.pts_a.same_size(&self.conf_a),
            "pair ({a},{b}): pts_a and conf_a differ in size"
        );
        ensure!(
            self.pts_b.same_size(&self.conf_b),
            "pair ({a},{b}): pts_b and conf_b differ in size"
        );
        ensure!(
            self.pts_a.size() == size_a,
            "pair ({a},{b}): view {a} prediction is {:?}, image is {:?}",
            self.pts_a.size(),
            size_a
        );
        ensure!(
            self.pts_b.size() == size_b,
            "pair ({a},{b}): view {b} prediction is {:?}, image is {:?}",
            self.pts_b.size(),
            size_b
        );
        Ok(())
    }

    /// Edge strength used to build the spanning tree: product of the mean
    /// confidences of both views.
    pub fn score(&self) -> Real {
        self.conf_a.mean() * self.conf_b.mean()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pair_edge_is_unordered() {
        let p = Pair::new(3, 1, true);
        assert_eq!(p.edge(), (1, 3));
        assert_eq!(p.reversed().edge(), (1, 3));
        assert_eq!(p.reversed().view_a, 1);
    }

    #[test]
    fn validate_checks_sizes() {
        let res = PairwiseResult {
            pair: Pair::new(0, 1, true),
            pts_a: Grid::filled(4, 3, Pt3::origin()),
            pts_b: Grid::filled(4, 3, Pt3::origin()),
            conf_a: Grid::filled(4, 3, 1.0),
            conf_b: Grid::filled(4, 3, 2.0),
        };
        assert!(res.validate((4, 3), (4, 3)).is_ok());
        assert!(res.validate((4, 3), (3, 4)).is_err());
        assert!((res.score() - 2.0).abs() < 1e-12);
    }
}
