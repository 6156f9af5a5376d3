//! Typed AST for the policy language.
//!
//! Declarations, topologies, and expressions are tagged variants; dispatch
//! is by `match`. The builder walks the derivation tree shapes produced by
//! [`crate::parser`] and is total over them, so it has no error path:
//! every syntactically valid policy has an AST.

use crate::parser::{DerivationTree, Nont};

/// A whole policy file: its declarations in source order.
#[derive(Debug, Clone)]
pub struct Source {
    pub decls: Vec<Decl>,
}

/// One top-level declaration.
#[derive(Debug, Clone)]
pub enum Decl {
    Topology(TopologyDecl),
    PerimeterGuard {
        name: String,
        file: String,
        tag: String,
    },
    Aware {
        name: String,
        topology: TopologyDecl,
    },
}

/// The three topology forms.
#[derive(Debug, Clone)]
pub enum TopologyDecl {
    /// Enumerated edges; the vertex set is the union of all endpoints.
    Basic {
        name: String,
        edges: Vec<(String, String)>,
    },
    /// A totally ordered chain of tags.
    Linear { name: String, tags: Vec<String> },
    /// An algebraic combination of previously declared topologies.
    Expr { name: String, expr: Expr },
}

impl TopologyDecl {
    pub fn name(&self) -> &str {
        match self {
            TopologyDecl::Basic { name, .. }
            | TopologyDecl::Linear { name, .. }
            | TopologyDecl::Expr { name, .. } => name,
        }
    }
}

/// Topology expression: named reference or binary combination.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Expr {
    Tag(String),
    Bin {
        op: BinOp,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOp {
    /// `+`: disjoint union.
    Add,
    /// `*`: Cartesian product. Binds tighter than `+`.
    Mul,
}

/// Builds the typed AST from a derivation tree rooted at `Source`.
pub fn build(tree: &DerivationTree) -> Source {
    Source {
        decls: build_decls(&tree.subtrees[0]),
    }
}

/// Flattens the `Decls`/`DeclRest` spine into a declaration list.
fn build_decls(tree: &DerivationTree) -> Vec<Decl> {
    let mut decls = Vec::new();
    let mut node = tree;
    while !node.subtrees.is_empty() {
        decls.push(build_decl(&node.subtrees[0]));
        node = &node.subtrees[1];
    }
    decls
}

fn build_decl(tree: &DerivationTree) -> Decl {
    let inner = &tree.subtrees[0];
    match inner.label {
        Nont::Topology => {
            let name = inner.leaves[1].text.clone();
            Decl::Topology(build_topo_rest(&inner.subtrees[0], name))
        }
        Nont::Aware => {
            let name = inner.leaves[1].text.clone();
            Decl::Aware {
                topology: build_topo_rest(&inner.subtrees[0], name.clone()),
                name,
            }
        }
        Nont::Pg => {
            let rest = &inner.subtrees[0];
            Decl::PerimeterGuard {
                name: inner.leaves[1].text.clone(),
                file: rest.leaves[2].text.clone(),
                tag: rest.leaves[5].text.clone(),
            }
        }
        other => unreachable!("declaration node labeled {other:?}"),
    }
}

fn build_topo_rest(tree: &DerivationTree, name: String) -> TopologyDecl {
    match tree.subtrees[0].label {
        Nont::Basic => TopologyDecl::Basic {
            name,
            edges: build_edges(&tree.subtrees[0]),
        },
        Nont::Linear => TopologyDecl::Linear {
            name,
            tags: build_linear_tags(&tree.subtrees[0]),
        },
        Nont::Expr => TopologyDecl::Expr {
            name,
            expr: build_sum(&tree.subtrees[0].subtrees[0]),
        },
        other => unreachable!("topology body labeled {other:?}"),
    }
}

/// Collects edges from the `Basic` node and its `EdgeRest` spine,
/// preserving source order.
fn build_edges(tree: &DerivationTree) -> Vec<(String, String)> {
    let mut edges = vec![build_edge(&tree.subtrees[0])];
    let mut rest = &tree.subtrees[1];
    while !rest.subtrees.is_empty() {
        edges.push(build_edge(&rest.subtrees[0]));
        rest = &rest.subtrees[1];
    }
    edges
}

fn build_edge(tree: &DerivationTree) -> (String, String) {
    (tree.leaves[0].text.clone(), tree.leaves[2].text.clone())
}

/// Collects the chain of a `Linear` node; declared order is the chain order.
fn build_linear_tags(tree: &DerivationTree) -> Vec<String> {
    let mut tags = Vec::new();
    let mut node = tree;
    loop {
        tags.push(node.leaves[0].text.clone());
        let rest = &node.subtrees[0];
        if rest.subtrees.is_empty() {
            return tags;
        }
        node = &rest.subtrees[0];
    }
}

/// Folds a `Sum` node left-associatively: the accumulator is threaded
/// through the `SumRest` spine, so `a + b + c` becomes `(a + b) + c`.
fn build_sum(tree: &DerivationTree) -> Expr {
    let mut acc = build_mul(&tree.subtrees[0]);
    let mut rest = &tree.subtrees[1];
    while !rest.subtrees.is_empty() {
        acc = Expr::Bin {
            op: BinOp::Add,
            lhs: Box::new(acc),
            rhs: Box::new(build_mul(&rest.subtrees[0])),
        };
        rest = &rest.subtrees[1];
    }
    acc
}

fn build_mul(tree: &DerivationTree) -> Expr {
    let mut acc = build_elem(&tree.subtrees[0]);
    let mut rest = &tree.subtrees[1];
    while !rest.subtrees.is_empty() {
        acc = Expr::Bin {
            op: BinOp::Mul,
            lhs: Box::new(acc),
            rhs: Box::new(build_elem(&rest.subtrees[0])),
        };
        rest = &rest.subtrees[1];
    }
    acc
}

fn build_elem(tree: &DerivationTree) -> Expr {
    if tree.subtrees.is_empty() {
        Expr::Tag(tree.leaves[0].text.clone())
    } else {
        build_sum(&tree.subtrees[0])
    }
}
