//! Maximum-confidence spanning tree over the view graph.

use std::collections::VecDeque;

use anyhow::{Result, bail, ensure};

use scene_recon_core::Real;

/// Spanning tree rooted at one endpoint of the strongest edge.
#[derive(Debug, Clone, PartialEq)]
pub struct SpanningTree {
    pub root: usize,
    /// Tree edges as `(parent, child)` in breadth-first order from the root.
    pub edges: Vec<(usize, usize)>,
}

struct UnionFind {
    parent: Vec<usize>,
    rank: Vec<u8>,
}

impl UnionFind {
    fn new(n: usize) -> Self {
        Self {
            parent: (0..n).collect(),
            rank: vec![0; n],
        }
    }

    fn find(&mut self, mut x: usize) -> usize {
        while self.parent[x] != x {
            self.parent[x] = self.parent[self.parent[x]];
            x = self.parent[x];
        }
        x
    }

    fn union(&mut self, a: usize, b: usize) -> bool {
        let (ra, rb) = (self.find(a), self.find(b));
        if ra == rb {
            return false;
        }
        match self.rank[ra].cmp(&self.rank[rb]) {
            std::cmp::Ordering::Less => self.parent[ra] = rb,
            std::cmp::Ordering::Greater => self.parent[rb] = ra,
            std::cmp::Ordering::Equal => {
                self.parent[rb] = ra;
                self.rank[ra] += 1;
            }
        }
        true
    }
}

/// Kruskal's algorithm on undirected edges `(a, b, score)`, keeping the
/// highest scores.
///
/// Ties are broken by edge order, so the result is deterministic.
///
/// # Errors
///
/// Returns an error if an edge references a view `>= num_views` or the
/// graph does not connect every view.
pub fn maximum_spanning_tree(num_views: usize, edges: &[(usize, usize, Real)]) -> Result<SpanningTree> {
    ensure!(num_views > 0, "spanning tree needs at least one view");
    for &(a, b, _) in edges {
        ensure!(
            a < num_views && b < num_views,
            "edge ({a}, {b}) references a view outside 0..{num_views}"
        );
    }

    let mut order: Vec<usize> = (0..edges.len()).collect();
    order.sort_by(|&i, &j| edges[j].2.total_cmp(&edges[i].2).then(i.cmp(&j)));

    let mut uf = UnionFind::new(num_views);
    let mut adjacency = vec![Vec::new(); num_views];
    let mut root = None;
    for i in order {
        let (a, b, _) = edges[i];
        if a != b && uf.union(a, b) {
            root.get_or_insert(a);
            adjacency[a].push(b);
            adjacency[b].push(a);
        }
    }
    let root = root.unwrap_or(0);

    let mut visited = vec![false; num_views];
    let mut tree_edges = Vec::with_capacity(num_views.saturating_sub(1));
    let mut queue = VecDeque::from([root]);
    visited[root] = true;
    while let Some(v) = queue.pop_front() {
        for &next in &adjacency[v] {
            if !visited[next] {
                visited[next] = true;
                tree_edges.push((v, next));
                queue.push_back(next);
            }
        }
    }

    if let Some(missing) = visited.iter().position(|&seen| !seen) {
        bail!("view graph is disconnected: view {missing} is not reachable from view {root}");
    }
    Ok(SpanningTree {
        root,
        edges: tree_edges,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn picks_strongest_edges() {
        let edges = [
            (0, 1, 1.0),
            (1, 2, 5.0),
            (0, 2, 4.0),
            (2, 3, 2.0),
            (1, 3, 0.5),
        ];
        let tree = maximum_spanning_tree(4, &edges).unwrap();
        assert_eq!(tree.root, 1);
        assert_eq!(tree.edges, vec![(1, 2), (2, 0), (2, 3)]);
    }

    #[test]
    fn disconnected_graph_fails() {
        let edges = [(0, 1, 1.0), (2, 3, 1.0)];
        let err = maximum_spanning_tree(4, &edges).unwrap_err();
        assert!(err.to_string().contains("disconnected"));
    }

    #[test]
    fn rejects_out_of_range_views() {
        assert!(maximum_spanning_tree(2, &[(0, 2, 1.0)]).is_err());
    }
}
