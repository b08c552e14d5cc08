//! Scene graph construction: which view pairs are sent to the pairwise model.

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use anyhow::{Result, anyhow, bail};
use serde::{Deserialize, Serialize};

use scene_recon_core::{Pair, ReconError, View};

/// Pairing topology.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Topology {
    /// Every unordered pair of views.
    #[default]
    Complete,
    /// Each view paired with its neighbours `i-w..=i+w` (clamped to the sequence).
    SlidingWindow { window: usize },
    /// Every view paired with a single reference view.
    OneReference { reference: usize },
}

impl fmt::Display for Topology {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Complete => write!(f, "complete"),
            Self::SlidingWindow { window } => write!(f, "swin-{window}"),
            Self::OneReference { reference } => write!(f, "oneref-{reference}"),
        }
    }
}

impl FromStr for Topology {
    type Err = anyhow::Error;

    /// Parses `complete`, `swin-<w>` and `oneref-<r>`.
    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        if s == "complete" {
            return Ok(Self::Complete);
        }
        let (kind, arg) = s
            .split_once('-')
            .ok_or_else(|| anyhow!("unknown scene graph '{s}' (expected complete, swin-<w>, oneref-<r>)"))?;
        let value: usize = arg
            .parse()
            .map_err(|_| anyhow!("scene graph '{s}': '{arg}' is not a non-negative integer"))?;
        match kind {
            "swin" => Ok(Self::SlidingWindow { window: value }),
            "oneref" => Ok(Self::OneReference { reference: value }),
            _ => bail!("unknown scene graph '{s}' (expected complete, swin-<w>, oneref-<r>)"),
        }
    }
}

/// Valid parameter ranges for `num_views` inputs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TopologyBounds {
    /// Largest admissible sliding-window size (the minimum is 1).
    pub max_window: usize,
    /// Largest admissible reference index (the minimum is 0).
    pub max_reference: usize,
}

/// Parameter bounds offered to a user for `num_views` inputs.
///
/// A missing or empty input list is treated as a single view.
pub fn topology_bounds(num_views: usize) -> TopologyBounds {
    let n = num_views.max(1);
    TopologyBounds {
        max_window: ((n - 1) / 2).max(1),
        max_reference: n - 1,
    }
}

impl Topology {
    /// Check the topology parameter against `num_views`.
    ///
    /// # Errors
    ///
    /// Returns [`ReconError::InvalidTopologyParameter`] for an out-of-range
    /// window size or reference index.
    pub fn validate(&self, num_views: usize) -> Result<(), ReconError> {
        let bounds = topology_bounds(num_views);
        match *self {
            Self::Complete => Ok(()),
            Self::SlidingWindow { window } if (1..=bounds.max_window).contains(&window) => Ok(()),
            Self::SlidingWindow { window } => Err(ReconError::InvalidTopologyParameter {
                parameter: "window",
                value: window,
                num_views,
                min: 1,
                max: bounds.max_window,
            }),
            Self::OneReference { reference } if reference < num_views => Ok(()),
            Self::OneReference { reference } => Err(ReconError::InvalidTopologyParameter {
                parameter: "reference",
                value: reference,
                num_views,
                min: 0,
                max: bounds.max_reference,
            }),
        }
    }
}

/// Duplicate a lone view so downstream stages always see at least two.
///
/// The copy gets index 1 and the same name; lists with two or more views are
/// returned unchanged.
pub fn resolve_views(views: &[View]) -> Vec<View> {
    let mut resolved = views.to_vec();
    if resolved.len() == 1 {
        let mut copy = resolved[0].clone();
        copy.index = 1;
        log::debug!("single input view '{}': duplicating it as view 1", copy.name);
        resolved.push(copy);
    }
    resolved
}

/// Build the symmetrized pair list for `num_views` views.
///
/// Every selected unordered pair `{a, b}` is emitted as `(a, b)` followed by
/// `(b, a)`. Ordering is deterministic (sorted by the unordered pair).
///
/// `num_views == 1` is treated as a duplicated view, producing the single
/// non-trivial pair `{0, 1}`; callers pair this with [`resolve_views`].
///
/// # Errors
///
/// Returns [`ReconError::InvalidTopologyParameter`] when the window size or
/// reference index is out of range for `num_views`, and
/// [`ReconError::InvalidInput`] when `num_views == 0`.
pub fn make_pairs(num_views: usize, topology: &Topology) -> Result<Vec<Pair>, ReconError> {
    if num_views == 0 {
        return Err(ReconError::InvalidInput(
            "cannot build a scene graph without views".into(),
        ));
    }
    topology.validate(num_views)?;
    let n = num_views.max(2);

    let mut edges = BTreeSet::new();
    match *topology {
        Topology::Complete => {
            for a in 0..n {
                for b in (a + 1)..n {
                    edges.insert((a, b));
                }
            }
        }
        Topology::SlidingWindow { window } => {
            for i in 0..n {
                for j in (i + 1)..=(i + window).min(n - 1) {
                    edges.insert((i, j));
                }
            }
        }
        Topology::OneReference { reference } => {
            for j in (0..n).filter(|&j| j != reference) {
                edges.insert((reference.min(j), reference.max(j)));
            }
        }
    }

    let pairs: Vec<Pair> = edges
        .into_iter()
        .flat_map(|(a, b)| [Pair::new(a, b, true), Pair::new(b, a, true)])
        .collect();
    log::debug!(
        "scene graph {topology} over {n} views: {} directed pairs",
        pairs.len()
    );
    Ok(pairs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use scene_recon_core::Grid;

    #[test]
    fn complete_has_n_times_n_minus_one_pairs() {
        for n in 2..8 {
            let pairs = make_pairs(n, &Topology::Complete).unwrap();
            assert_eq!(pairs.len(), n * (n - 1), "n = {n}");
        }
    }

    #[test]
    fn one_reference_has_two_n_minus_one_pairs() {
        for n in 2..8 {
            for r in 0..n {
                let pairs = make_pairs(n, &Topology::OneReference { reference: r }).unwrap();
                assert_eq!(pairs.len(), 2 * (n - 1));
                assert!(pairs.iter().all(|p| p.view_a == r || p.view_b == r));
            }
        }
    }

    #[test]
    fn pairs_are_symmetric_without_self_pairs() {
        let pairs = make_pairs(6, &Topology::SlidingWindow { window: 2 }).unwrap();
        for p in &pairs {
            assert_ne!(p.view_a, p.view_b);
            assert!(p.symmetric);
            assert!(pairs.contains(&p.reversed()));
        }
    }

    #[test]
    fn sliding_window_clamps_at_sequence_ends() {
        let pairs = make_pairs(5, &Topology::SlidingWindow { window: 2 }).unwrap();
        let edges: BTreeSet<_> = pairs.iter().map(|p| p.edge()).collect();
        let expected: BTreeSet<_> = [(0, 1), (0, 2), (1, 2), (1, 3), (2, 3), (2, 4), (3, 4)]
            .into_iter()
            .collect();
        assert_eq!(edges, expected);
    }

    #[test]
    fn single_view_builds_one_nontrivial_pair() {
        let pairs = make_pairs(1, &Topology::Complete).unwrap();
        let edges: BTreeSet<_> = pairs.iter().map(|p| p.edge()).collect();
        assert_eq!(edges.len(), 1);
        assert!(edges.contains(&(0, 1)));

        let view = View::new(0, "only.png", Grid::filled(2, 2, [0u8; 3]));
        let resolved = resolve_views(&[view]);
        assert_eq!(resolved.len(), 2);
        assert_eq!(resolved[1].index, 1);
        assert_eq!(resolved[1].image, resolved[0].image);
    }

    #[test]
    fn single_view_bounds_apply_before_duplication() {
        let err = make_pairs(1, &Topology::OneReference { reference: 1 }).unwrap_err();
        assert!(matches!(
            err,
            ReconError::InvalidTopologyParameter { parameter: "reference", max: 0, num_views: 1, .. }
        ));
        assert_eq!(topology_bounds(1).max_reference, 0);
        assert_eq!(make_pairs(1, &Topology::OneReference { reference: 0 }).unwrap().len(), 2);
        assert_eq!(make_pairs(1, &Topology::SlidingWindow { window: 1 }).unwrap().len(), 2);
    }

    #[test]
    fn out_of_range_parameters_are_rejected() {
        let err = make_pairs(5, &Topology::SlidingWindow { window: 3 }).unwrap_err();
        assert!(matches!(
            err,
            ReconError::InvalidTopologyParameter {
                parameter: "window",
                max: 2,
                ..
            }
        ));
        assert!(make_pairs(5, &Topology::SlidingWindow { window: 0 }).is_err());
        assert!(make_pairs(3, &Topology::OneReference { reference: 3 }).is_err());
        assert!(make_pairs(0, &Topology::Complete).is_err());
    }

    #[test]
    fn bounds_match_slider_ranges() {
        assert_eq!(
            topology_bounds(0),
            TopologyBounds {
                max_window: 1,
                max_reference: 0
            }
        );
        assert_eq!(topology_bounds(7).max_window, 3);
        assert_eq!(topology_bounds(7).max_reference, 6);
    }

    #[test]
    fn topology_string_roundtrip() {
        for t in [
            Topology::Complete,
            Topology::SlidingWindow { window: 3 },
            Topology::OneReference { reference: 0 },
        ] {
            assert_eq!(t.to_string().parse::<Topology>().unwrap(), t);
        }
        assert!("ring-2".parse::<Topology>().is_err());
        assert!("swin-x".parse::<Topology>().is_err());
    }
}
