//! Spanning-tree global aligner.

use std::collections::HashMap;

use anyhow::{Context, Result, anyhow, bail, ensure};

use scene_recon_core::{Grid, Mat4, PairwiseResult, Pt3, Real, RgbGrid, SceneState, View};

use super::{
    Alignment, AlignmentMode, AlignmentParams, GlobalAligner, LR_MIN, Similarity, estimate_focal,
    fit_similarity, maximum_spanning_tree,
};

/// Global aligner built on closed-form similarity fits.
///
/// Pair-viewer mode reads the strongest direction of the single pair.
/// Iterative mode chains pairwise predictions along the maximum-confidence
/// spanning tree, then relaxes every camera towards the consensus of all
/// pairs it takes part in, with the step size following the learning-rate
/// schedule.
#[derive(Debug, Clone, Default)]
pub struct MstAligner;

impl MstAligner {
    pub fn new() -> Self {
        Self
    }
}

impl GlobalAligner for MstAligner {
    fn align(
        &mut self,
        views: &[View],
        results: &[PairwiseResult],
        mode: AlignmentMode,
        params: &AlignmentParams,
    ) -> Result<Alignment> {
        ensure!(views.len() >= 2, "alignment needs at least two views, got {}", views.len());
        ensure!(!results.is_empty(), "alignment needs at least one pairwise result");
        let graph = PairGraph::new(views, results)?;
        match mode {
            AlignmentMode::PairViewer => pair_viewer(views, &graph),
            AlignmentMode::Iterative => {
                params.validate()?;
                iterative(views, &graph, params)
            }
        }
    }
}

struct PairGraph<'a> {
    results: &'a [PairwiseResult],
    by_pair: HashMap<(usize, usize), usize>,
    confidences: Vec<Grid<Real>>,
}

impl<'a> PairGraph<'a> {
    fn new(views: &[View], results: &'a [PairwiseResult]) -> Result<Self> {
        let n = views.len();
        let mut by_pair = HashMap::with_capacity(results.len());
        let mut confidences: Vec<Option<Grid<Real>>> = vec![None; n];
        for (i, r) in results.iter().enumerate() {
            let (a, b) = (r.pair.view_a, r.pair.view_b);
            ensure!(a < n && b < n, "pair ({a}, {b}) references a view outside 0..{n}");
            ensure!(a != b, "self pair ({a}, {a}) cannot be aligned");
            r.validate(views[a].size(), views[b].size())?;
            by_pair.insert((a, b), i);
            for (v, conf) in [(a, &r.conf_a), (b, &r.conf_b)] {
                confidences[v] = Some(match confidences[v].take() {
                    Some(acc) => acc.zip_map(conf, |x, y| x.max(*y))?,
                    None => conf.clone(),
                });
            }
        }
        let confidences = confidences
            .into_iter()
            .enumerate()
            .map(|(v, c)| c.ok_or_else(|| anyhow!("view {v} is not part of any pair")))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self {
            results,
            by_pair,
            confidences,
        })
    }

    fn get(&self, a: usize, b: usize) -> Option<&'a PairwiseResult> {
        self.by_pair.get(&(a, b)).map(|&i| &self.results[i])
    }

    /// View `v`'s own-frame point map and confidence from its strongest
    /// outgoing pair.
    fn local(&self, v: usize) -> Result<(&'a Grid<Pt3>, &'a Grid<Real>)> {
        self.results
            .iter()
            .filter(|r| r.pair.view_a == v)
            .fold(None::<&PairwiseResult>, |best, r| match best {
                Some(b) if b.score() >= r.score() => Some(b),
                _ => Some(r),
            })
            .map(|r| (&r.pts_a, &r.conf_a))
            .ok_or_else(|| anyhow!("view {v} is never the first view of a pair"))
    }

    fn strongest(&self) -> Option<&'a PairwiseResult> {
        self.results.iter().fold(None, |best, r| match best {
            Some(b) if b.score() >= r.score() => Some(b),
            _ => Some(r),
        })
    }
}

fn weight(conf: Real, p: &Pt3) -> Real {
    if conf.is_finite() && conf > 0.0 && p.coords.iter().all(|c| c.is_finite()) {
        conf
    } else {
        0.0
    }
}

fn sample_offsets(size: (usize, usize), stride: usize) -> Vec<usize> {
    let (w, h) = size;
    (0..h)
        .step_by(stride)
        .flat_map(|y| (0..w).step_by(stride).map(move |x| y * w + x))
        .collect()
}

/// Fit `src → dst` over sampled pixels weighted by `conf`.
fn fit_grids(src: &Grid<Pt3>, dst: &Grid<Pt3>, conf: &Grid<Real>, stride: usize) -> Result<Similarity> {
    ensure!(src.same_size(dst), "point maps differ in size");
    let offsets = sample_offsets(src.size(), stride);
    let (s, d, w) = (src.as_slice(), dst.as_slice(), conf.as_slice());
    let src_pts: Vec<Pt3> = offsets.iter().map(|&o| s[o]).collect();
    let dst_pts: Vec<Pt3> = offsets.iter().map(|&o| d[o]).collect();
    let weights: Vec<Real> = offsets
        .iter()
        .map(|&o| if weight(1.0, &d[o]) > 0.0 { weight(w[o], &s[o]) } else { 0.0 })
        .collect();
    fit_similarity(&src_pts, &dst_pts, &weights)
}

fn pair_viewer(views: &[View], graph: &PairGraph<'_>) -> Result<Alignment> {
    ensure!(
        views.len() == 2,
        "pair-viewer mode expects exactly two views, got {}",
        views.len()
    );
    let best = graph
        .strongest()
        .context("pair-viewer mode needs a pairwise result")?;
    let (a, b) = (best.pair.view_a, best.pair.view_b);
    log::debug!("pair viewer: reading pair ({a}, {b}), score {:.4}", best.score());

    let (local_b, conf_b) = graph.local(b)?;
    let to_world = fit_grids(local_b, &best.pts_b, conf_b, 1)
        .with_context(|| format!("failed to place view {b} relative to view {a}"))?;

    let mut points = vec![best.pts_a.clone(), best.pts_b.clone()];
    let mut poses = vec![Mat4::identity(), to_world.rigid_pose()];
    let mut focals = vec![
        estimate_focal(&best.pts_a, &best.conf_a)?,
        estimate_focal(local_b, conf_b)?,
    ];
    if a == 1 {
        points.swap(0, 1);
        poses.swap(0, 1);
        focals.swap(0, 1);
    }

    let scene = SceneState::new(
        images(views),
        points,
        graph.confidences.clone(),
        poses,
        focals,
    )?;
    Ok(Alignment { scene, loss: None })
}

/// Sampled pixels of one ordered pair, both views expressed in `view_a`'s frame.
struct EdgeSamples {
    a: usize,
    b: usize,
    pts: Vec<Pt3>,
    weights: Vec<Real>,
    /// Entries before `split` belong to view `a`.
    split: usize,
}

fn iterative(views: &[View], graph: &PairGraph<'_>, params: &AlignmentParams) -> Result<Alignment> {
    let n = views.len();
    let stride = params.sample_stride;

    let scored: Vec<(usize, usize, Real)> = graph
        .results
        .iter()
        .map(|r| (r.pair.view_a, r.pair.view_b, r.score()))
        .collect();
    let tree = maximum_spanning_tree(n, &scored)?;
    log::debug!("spanning tree rooted at view {}: {:?}", tree.root, tree.edges);

    let locals = (0..n).map(|v| graph.local(v)).collect::<Result<Vec<_>>>()?;

    // Chain pairwise predictions into the root frame.
    let mut world: Vec<Option<Grid<Pt3>>> = vec![None; n];
    world[tree.root] = Some(locals[tree.root].0.clone());
    for &(parent, child) in &tree.edges {
        let placed = world[parent]
            .as_ref()
            .ok_or_else(|| anyhow!("view {parent} was not placed before view {child}"))?;
        let child_pts = if let Some(r) = graph.get(parent, child) {
            let s = fit_grids(&r.pts_a, placed, &r.conf_a, stride)?;
            r.pts_b.map(|p| s.apply(p))
        } else if let Some(r) = graph.get(child, parent) {
            let s = fit_grids(&r.pts_b, placed, &r.conf_b, stride)?;
            r.pts_a.map(|p| s.apply(p))
        } else {
            bail!("spanning tree edge ({parent}, {child}) has no pairwise result");
        };
        world[child] = Some(child_pts);
    }

    let mut sims = Vec::with_capacity(n);
    for (v, placed) in world.iter().enumerate() {
        let placed = placed
            .as_ref()
            .ok_or_else(|| anyhow!("view {v} was not reached by the spanning tree"))?;
        let (local, conf) = locals[v];
        sims.push(
            fit_grids(local, placed, conf, stride)
                .with_context(|| format!("failed to initialize pose of view {v}"))?,
        );
    }

    let offsets: Vec<Vec<usize>> = views.iter().map(|v| sample_offsets(v.size(), stride)).collect();
    let local_samples: Vec<Vec<Pt3>> = (0..n)
        .map(|v| {
            let pts = locals[v].0.as_slice();
            offsets[v].iter().map(|&o| pts[o]).collect()
        })
        .collect();
    let edges: Vec<EdgeSamples> = graph
        .results
        .iter()
        .map(|r| {
            let (a, b) = (r.pair.view_a, r.pair.view_b);
            let mut pts = Vec::with_capacity(offsets[a].len() + offsets[b].len());
            let mut weights = Vec::with_capacity(pts.capacity());
            for (v, grid, conf) in [(a, &r.pts_a, &r.conf_a), (b, &r.pts_b, &r.conf_b)] {
                let (g, c) = (grid.as_slice(), conf.as_slice());
                for (k, &o) in offsets[v].iter().enumerate() {
                    pts.push(g[o]);
                    let usable = weight(1.0, &local_samples[v][k]) > 0.0;
                    weights.push(if usable { weight(c[o], &g[o]) } else { 0.0 });
                }
            }
            EdgeSamples {
                a,
                b,
                pts,
                weights,
                split: offsets[a].len(),
            }
        })
        .collect();

    let mut loss = 0.0;
    for iter in 0..=params.iterations {
        let (targets, pass_loss) = consensus_pass(&sims, &local_samples, &edges)?;
        loss = pass_loss;
        if iter == params.iterations {
            break;
        }
        let alpha = params
            .schedule
            .learning_rate(iter, params.iterations, params.learning_rate, LR_MIN)
            .clamp(0.0, 1.0);
        for (v, (src, dst, w)) in targets.into_iter().enumerate() {
            let target = fit_similarity(&src, &dst, &w)
                .with_context(|| format!("failed to refine pose of view {v}"))?;
            sims[v] = sims[v].interpolate(&target, alpha);
        }
        if iter % 50 == 0 {
            log::debug!("alignment iteration {iter}: loss {pass_loss:.6}, step {alpha:.3e}");
        }
    }
    log::info!("global alignment finished after {} iterations, loss {loss:.6}", params.iterations);

    let mut points = Vec::with_capacity(n);
    let mut poses = Vec::with_capacity(n);
    let mut focals = Vec::with_capacity(n);
    for (v, sim) in sims.iter().enumerate() {
        let (local, conf) = locals[v];
        points.push(local.map(|p| sim.apply(p)));
        poses.push(sim.rigid_pose());
        focals.push(estimate_focal(local, conf).with_context(|| format!("view {v}"))?);
    }

    let scene = SceneState::new(images(views), points, graph.confidences.clone(), poses, focals)?;
    Ok(Alignment {
        scene,
        loss: Some(loss),
    })
}

type Targets = (Vec<Pt3>, Vec<Pt3>, Vec<Real>);

/// Fit every pair onto the current world and collect, per view, where the
/// pairs place its sampled pixels. Also returns the weighted mean squared
/// residual of those fits.
fn consensus_pass(
    sims: &[Similarity],
    local_samples: &[Vec<Pt3>],
    edges: &[EdgeSamples],
) -> Result<(Vec<Targets>, Real)> {
    let current: Vec<Vec<Pt3>> = sims
        .iter()
        .zip(local_samples)
        .map(|(s, pts)| pts.iter().map(|p| s.apply(p)).collect())
        .collect();

    let mut targets: Vec<Targets> = vec![(Vec::new(), Vec::new(), Vec::new()); sims.len()];
    let mut residual = 0.0;
    let mut total = 0.0;
    for e in edges {
        let dst: Vec<Pt3> = current[e.a].iter().chain(&current[e.b]).copied().collect();
        let fit = fit_similarity(&e.pts, &dst, &e.weights)
            .with_context(|| format!("failed to fit pair ({}, {})", e.a, e.b))?;
        for (k, ((p, d), &w)) in e.pts.iter().zip(&dst).zip(&e.weights).enumerate() {
            if w <= 0.0 {
                continue;
            }
            let moved = fit.apply(p);
            residual += w * (moved - d).norm_squared();
            total += w;
            let (v, idx) = if k < e.split { (e.a, k) } else { (e.b, k - e.split) };
            let t = &mut targets[v];
            t.0.push(local_samples[v][idx]);
            t.1.push(moved);
            t.2.push(w);
        }
    }
    let loss = if total > 0.0 { residual / total } else { 0.0 };
    Ok((targets, loss))
}

fn images(views: &[View]) -> Vec<RgbGrid> {
    views.iter().map(|v| v.image.clone()).collect()
}
