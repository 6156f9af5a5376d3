//! Least-common-ancestor solver over the compiled policy DAG.
//!
//! Works on the raw adjacency matrix (not a transitive closure). For every
//! vertex the set of vertices it reaches is computed by BFS over a
//! [`petgraph::graph::DiGraph`] mirror of the matrix; ancestors are the
//! transpose of that relation. The result is dense: one LCA index per
//! ordered pair.

use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::Bfs;

/// Computes `lca[i][j]` for all pairs over the adjacency matrix of a DAG.
///
/// `Ancestors(v)` is every vertex that reaches `v`, self included. For a
/// pair the candidate set is the intersection of both ancestor sets; the
/// selected vertex is the least candidate, the one that reaches no other
/// candidate, with ties broken toward the smallest index so the solver is
/// deterministic. An empty candidate set defaults to vertex 0 (the
/// `unknown` tag once the policy has inserted it).
///
/// O(N³) over N ≤ 256 vertices.
pub fn compute_lca(matrix: &[Vec<u8>]) -> Vec<Vec<usize>> {
    let n = matrix.len();
    let mut graph = DiGraph::<(), ()>::with_capacity(n, n);
    let nodes: Vec<NodeIndex> = (0..n).map(|_| graph.add_node(())).collect();
    for (i, row) in matrix.iter().enumerate() {
        for (j, &cell) in row.iter().enumerate() {
            if i != j && cell != 0 {
                graph.add_edge(nodes[i], nodes[j], ());
            }
        }
    }

    // reaches[v][u]: v reaches u (reflexively).
    let mut reaches = vec![vec![false; n]; n];
    for (v, row) in reaches.iter_mut().enumerate() {
        let mut bfs = Bfs::new(&graph, nodes[v]);
        while let Some(found) = bfs.next(&graph) {
            row[found.index()] = true;
        }
    }

    let mut lca = vec![vec![0usize; n]; n];
    for i in 0..n {
        for j in i..n {
            let candidates: Vec<usize> =
                (0..n).filter(|&u| reaches[u][i] && reaches[u][j]).collect();
            let least = candidates
                .iter()
                .copied()
                .find(|&c| {
                    candidates
                        .iter()
                        .all(|&other| other == c || !reaches[c][other])
                })
                .unwrap_or(0);
            lca[i][j] = least;
            lca[j][i] = least;
        }
    }
    lca
}
