//! Topology algebra over dense adjacency matrices.
//!
//! A topology is a directed graph whose vertices are canonical tag names
//! (whitespace-stripped, prefixed with the owning topology's name). The
//! matrix is the data model: `matrix[i][j] == 1` means tag `i` may flow to
//! tag `j`, and the diagonal is always 1 (self-reachability). Composition
//! is by disjoint union (`+`) and Cartesian product (`*`).

use std::collections::HashMap;

/// Strips all whitespace from a tag name; the result is the canonical
/// form used for storage, lookup, and output.
pub fn canonical(tag: &str) -> String {
    tag.chars().filter(|c| !c.is_whitespace()).collect()
}

/// A totally ordered chain of tags; coerced to a basic topology on use.
#[derive(Debug, Clone)]
pub struct LinearTopology {
    name: String,
    tags: Vec<String>,
}

impl LinearTopology {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            tags: Vec::new(),
        }
    }

    /// Appends a tag to the chain under this topology's name prefix.
    pub fn push_tag(&mut self, tag: &str) {
        self.tags.push(canonical(&format!("{}.{}", self.name, tag)));
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn tags(&self) -> &[String] {
        &self.tags
    }
}

/// A directed graph of tags as a dense byte adjacency matrix with
/// bidirectional name/index maps. `fromindex[i]` and `toindex` are mutual
/// inverses; indices are dense and insertion-order stable.
#[derive(Debug, Clone)]
pub struct BasicTopology {
    name: String,
    matrix: Vec<Vec<u8>>,
    toindex: HashMap<String, usize>,
    fromindex: Vec<String>,
}

impl BasicTopology {
    /// An empty topology; the identity of disjoint union.
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            matrix: Vec::new(),
            toindex: HashMap::new(),
            fromindex: Vec::new(),
        }
    }

    /// Builds a topology from enumerated edges. The vertex set is the union
    /// of all endpoints in first-occurrence order; every vertex gets a
    /// self-loop, then each edge sets its cell.
    pub fn from_edges(name: &str, edges: &[(String, String)]) -> Self {
        let mut topology = Self::new(name);
        for (source, end) in edges {
            topology.intern_vertex(source);
            topology.intern_vertex(end);
        }
        for (source, end) in edges {
            let i = topology.toindex[&topology.fullname(source)];
            let j = topology.toindex[&topology.fullname(end)];
            topology.matrix[i][j] = 1;
        }
        topology
    }

    /// Coerces a linear topology: vertices in declared order, an edge from
    /// each tag to its successor, self-loops on the diagonal.
    pub fn from_linear(linear: &LinearTopology) -> Self {
        let n = linear.tags().len();
        let mut matrix = vec![vec![0u8; n]; n];
        let mut toindex = HashMap::with_capacity(n);
        let mut fromindex = Vec::with_capacity(n);
        for (i, tag) in linear.tags().iter().enumerate() {
            matrix[i][i] = 1;
            if i + 1 < n {
                matrix[i][i + 1] = 1;
            }
            toindex.insert(tag.clone(), i);
            fromindex.push(tag.clone());
        }
        Self {
            name: linear.name().to_string(),
            matrix,
            toindex,
            fromindex,
        }
    }

    /// Registers a vertex under this topology's name prefix if it is new.
    fn intern_vertex(&mut self, tag: &str) {
        let full = self.fullname(tag);
        if self.toindex.contains_key(&full) {
            return;
        }
        let index = self.fromindex.len();
        self.toindex.insert(full.clone(), index);
        self.fromindex.push(full);
        for row in &mut self.matrix {
            row.push(0);
        }
        let mut row = vec![0u8; index + 1];
        row[index] = 1;
        self.matrix.push(row);
    }

    fn fullname(&self, tag: &str) -> String {
        canonical(&format!("{}.{}", self.name, tag))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn size(&self) -> usize {
        self.fromindex.len()
    }

    pub fn matrix(&self) -> &[Vec<u8>] {
        &self.matrix
    }

    /// Canonical vertex names in index order.
    pub fn vertex_names(&self) -> &[String] {
        &self.fromindex
    }

    /// Index of a tag, after canonicalizing the query.
    pub fn index_of(&self, tag: &str) -> Option<usize> {
        self.toindex.get(&canonical(tag)).copied()
    }

    pub fn tag_at(&self, index: usize) -> &str {
        &self.fromindex[index]
    }

    /// Block-diagonal sum of `a` and `b`: `b`'s indices are re-based by
    /// `|a|`, vertex names are kept as-is, the off-diagonal blocks stay 0.
    pub fn disjoint_union(a: &Self, b: &Self) -> Self {
        let n = a.size();
        let m = b.size();
        let mut matrix = vec![vec![0u8; n + m]; n + m];
        for i in 0..n {
            matrix[i][..n].copy_from_slice(&a.matrix[i]);
        }
        for i in 0..m {
            matrix[n + i][n..].copy_from_slice(&b.matrix[i]);
        }

        let mut fromindex = Vec::with_capacity(n + m);
        fromindex.extend(a.fromindex.iter().cloned());
        fromindex.extend(b.fromindex.iter().cloned());
        let toindex = fromindex
            .iter()
            .enumerate()
            .map(|(i, tag)| (tag.clone(), i))
            .collect();

        Self {
            name: a.name.clone(),
            matrix,
            toindex,
            fromindex,
        }
    }

    /// Cartesian product `A ⊗ Iₘ | Iₙ ⊗ B`. Vertex `(aᵢ, bⱼ)` lives at
    /// row-major index `i·m + j` and is named `"(a,b)"` with whitespace
    /// stripped.
    pub fn cartesian_product(a: &Self, b: &Self) -> Self {
        let n = a.size();
        let m = b.size();
        let mut matrix = vec![vec![0u8; n * m]; n * m];

        // A ⊗ I: an A-edge i→j connects (i, r) to (j, r) for every r.
        for i in 0..n {
            for j in 0..n {
                if a.matrix[i][j] != 0 {
                    for r in 0..m {
                        matrix[i * m + r][j * m + r] = 1;
                    }
                }
            }
        }
        // I ⊗ B: within each block, the B adjacency.
        for block in 0..n {
            for i in 0..m {
                for j in 0..m {
                    matrix[block * m + i][block * m + j] |= b.matrix[i][j];
                }
            }
        }

        let mut fromindex = Vec::with_capacity(n * m);
        for left in &a.fromindex {
            for right in &b.fromindex {
                fromindex.push(canonical(&format!("({left},{right})")));
            }
        }
        let toindex = fromindex
            .iter()
            .enumerate()
            .map(|(i, tag)| (tag.clone(), i))
            .collect();

        Self {
            name: a.name.clone(),
            matrix,
            toindex,
            fromindex,
        }
    }

    /// Rewrites every vertex name to `prefix.name`. Applied to an
    /// expression topology's result so its vertices carry the owning name.
    pub fn apply_name_prefix(&mut self, prefix: &str) {
        for tag in &mut self.fromindex {
            *tag = canonical(&format!("{prefix}.{tag}"));
        }
        self.toindex = self
            .fromindex
            .iter()
            .enumerate()
            .map(|(i, tag)| (tag.clone(), i))
            .collect();
    }

    /// Inserts the distinguished `unknown` vertex at index 0: every
    /// existing index shifts up by one, row 0 becomes all 1 (unknown
    /// dominates every tag), column 0 stays 0 below the diagonal.
    pub fn add_unknown(&mut self) {
        let n = self.size();
        for row in &mut self.matrix {
            row.insert(0, 0);
        }
        self.matrix.insert(0, vec![1u8; n + 1]);
        self.fromindex.insert(0, "unknown".to_string());
        self.toindex = self
            .fromindex
            .iter()
            .enumerate()
            .map(|(i, tag)| (tag.clone(), i))
            .collect();
    }

    /// Depth-first post-order cycle check, self-loops ignored. Assigns an
    /// end time to every vertex and rejects on the back-edge condition:
    /// distinct `i`, `j` with an edge `i→j` and `end_time[i] <= end_time[j]`.
    pub fn is_acyclic(&self) -> bool {
        let n = self.size();
        let mut discovered = vec![false; n];
        let mut end_time = vec![0usize; n];
        let mut time = 0usize;

        for start in 0..n {
            if discovered[start] {
                continue;
            }
            discovered[start] = true;
            let mut stack: Vec<(usize, usize)> = vec![(start, 0)];
            while let Some(frame) = stack.last_mut() {
                let vertex = frame.0;
                let next = (frame.1..n).find(|&j| self.matrix[vertex][j] != 0 && !discovered[j]);
                match next {
                    Some(j) => {
                        frame.1 = j + 1;
                        discovered[j] = true;
                        stack.push((j, 0));
                    }
                    None => {
                        end_time[vertex] = time;
                        time += 1;
                        stack.pop();
                    }
                }
            }
        }

        for i in 0..n {
            for j in 0..n {
                if i != j && self.matrix[i][j] != 0 && end_time[i] <= end_time[j] {
                    return false;
                }
            }
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn edges(pairs: &[(&str, &str)]) -> Vec<(String, String)> {
        pairs
            .iter()
            .map(|&(a, b)| (a.to_string(), b.to_string()))
            .collect()
    }

    fn chain(name: &str, tags: &[&str]) -> BasicTopology {
        let mut linear = LinearTopology::new(name);
        for tag in tags {
            linear.push_tag(tag);
        }
        BasicTopology::from_linear(&linear)
    }

    #[test]
    fn test_canonical_strips_all_whitespace() {
        assert_eq!(canonical(" PP . private "), "PP.private");
        assert_eq!(canonical("a\tb\nc"), "abc");
    }

    #[test]
    fn test_from_edges_first_occurrence_order() {
        let t = BasicTopology::from_edges("D", &edges(&[("a", "b"), ("a", "c"), ("b", "d")]));
        assert_eq!(t.vertex_names(), &["D.a", "D.b", "D.c", "D.d"]);
        assert_eq!(t.index_of("D.a"), Some(0));
        assert_eq!(t.index_of("D.d"), Some(3));
    }

    #[test]
    fn test_diagonal_is_all_ones() {
        let t = BasicTopology::from_edges("D", &edges(&[("a", "b"), ("b", "c")]));
        for i in 0..t.size() {
            assert_eq!(t.matrix()[i][i], 1);
        }
    }

    #[test]
    fn test_linear_coercion_builds_chain() {
        let t = chain("PP", &["A", "B", "C"]);
        assert_eq!(t.vertex_names(), &["PP.A", "PP.B", "PP.C"]);
        assert_eq!(t.matrix()[0][1], 1);
        assert_eq!(t.matrix()[1][2], 1);
        assert_eq!(t.matrix()[0][2], 0);
        assert_eq!(t.matrix()[2][2], 1);
    }

    #[test]
    fn test_index_maps_are_inverses() {
        let t = chain("PP", &["A", "B", "C"]);
        for (i, tag) in t.vertex_names().iter().enumerate() {
            assert_eq!(t.index_of(tag), Some(i));
            assert_eq!(t.tag_at(i), tag);
        }
    }

    #[test]
    fn test_disjoint_union_sizes_and_blocks() {
        let a = chain("L", &["x", "y"]);
        let b = chain("R", &["p", "q", "r"]);
        let u = BasicTopology::disjoint_union(&a, &b);
        assert_eq!(u.size(), 5);
        // A block intact, re-based B block intact, off-diagonal zero.
        assert_eq!(u.matrix()[0][1], 1);
        assert_eq!(u.matrix()[2][3], 1);
        assert_eq!(u.matrix()[3][4], 1);
        for i in 0..2 {
            for j in 2..5 {
                assert_eq!(u.matrix()[i][j], 0);
                assert_eq!(u.matrix()[j][i], 0);
            }
        }
        assert_eq!(u.index_of("R.p"), Some(2));
    }

    #[test]
    fn test_cartesian_product_structure() {
        let a = chain("L", &["x", "y"]);
        let b = chain("R", &["p", "q"]);
        let p = BasicTopology::cartesian_product(&a, &b);
        assert_eq!(p.size(), 4);
        assert_eq!(
            p.vertex_names(),
            &["(L.x,R.p)", "(L.x,R.q)", "(L.y,R.p)", "(L.y,R.q)"]
        );
        // M[(i,j)][(i',j')] = 1 iff (A[i][i']=1 ∧ j=j') ∨ (i=i' ∧ B[j][j']=1).
        for i in 0..2 {
            for j in 0..2 {
                for i2 in 0..2 {
                    for j2 in 0..2 {
                        let expected = (a.matrix()[i][i2] == 1 && j == j2)
                            || (i == i2 && b.matrix()[j][j2] == 1);
                        assert_eq!(
                            p.matrix()[i * 2 + j][i2 * 2 + j2] == 1,
                            expected,
                            "cell ({i},{j}) -> ({i2},{j2})"
                        );
                    }
                }
            }
        }
    }

    #[test]
    fn test_apply_name_prefix() {
        let a = chain("L", &["x", "y"]);
        let b = chain("R", &["p", "q"]);
        let mut p = BasicTopology::cartesian_product(&a, &b);
        p.apply_name_prefix("T");
        assert_eq!(
            p.vertex_names(),
            &["T.(L.x,R.p)", "T.(L.x,R.q)", "T.(L.y,R.p)", "T.(L.y,R.q)"]
        );
        assert_eq!(p.index_of("T.(L.y,R.p)"), Some(2));
    }

    #[test]
    fn test_add_unknown_dominates() {
        let mut t = chain("PP", &["A", "B"]);
        t.add_unknown();
        assert_eq!(t.size(), 3);
        assert_eq!(t.tag_at(0), "unknown");
        assert_eq!(t.index_of("unknown"), Some(0));
        assert_eq!(t.matrix()[0], vec![1, 1, 1]);
        // Column 0 is zero below the diagonal; old edges are shifted.
        assert_eq!(t.matrix()[1], vec![0, 1, 1]);
        assert_eq!(t.matrix()[2], vec![0, 0, 1]);
        assert_eq!(t.index_of("PP.A"), Some(1));
    }

    #[test]
    fn test_chain_is_acyclic() {
        assert!(chain("PP", &["A", "B", "C"]).is_acyclic());
    }

    #[test]
    fn test_two_cycle_is_rejected() {
        let t = BasicTopology::from_edges("C", &edges(&[("a", "b"), ("b", "a")]));
        assert!(!t.is_acyclic());
    }

    #[test]
    fn test_long_cycle_is_rejected() {
        let t = BasicTopology::from_edges("C", &edges(&[("a", "b"), ("b", "c"), ("c", "a")]));
        assert!(!t.is_acyclic());
    }

    #[test]
    fn test_diamond_is_acyclic() {
        let t = BasicTopology::from_edges(
            "D",
            &edges(&[("a", "b"), ("a", "c"), ("b", "d"), ("c", "d")]),
        );
        assert!(t.is_acyclic());
    }

    #[test]
    fn test_self_loops_do_not_count_as_cycles() {
        let t = BasicTopology::from_edges("S", &edges(&[("a", "a"), ("a", "b")]));
        assert!(t.is_acyclic());
    }

    #[test]
    fn test_union_with_empty_is_identity() {
        let a = BasicTopology::new("total");
        let b = chain("PP", &["A", "B"]);
        let u = BasicTopology::disjoint_union(&a, &b);
        assert_eq!(u.size(), 2);
        assert_eq!(u.vertex_names(), b.vertex_names());
        assert_eq!(u.matrix(), b.matrix());
    }
}
